//! CORS Middleware Configuration

use std::time::Duration;

use axum::http::{header, HeaderValue, Method};
use tower_http::cors::{Any, CorsLayer};

use crate::config::CorsSettings;

/// Create CORS layer from settings. An empty list or `*` allows any origin.
pub fn create_cors_layer(settings: &CorsSettings) -> CorsLayer {
    let methods = [Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS];
    let headers = [header::AUTHORIZATION, header::CONTENT_TYPE, header::ACCEPT];

    let origins: Vec<HeaderValue> = settings
        .allowed_origins
        .iter()
        .filter(|o| o.as_str() != "*")
        .filter_map(|o| o.parse().ok())
        .collect();

    let wildcard = settings.allowed_origins.iter().any(|o| o == "*");
    let layer = CorsLayer::new()
        .allow_methods(methods)
        .allow_headers(headers)
        .max_age(Duration::from_secs(3600));

    if wildcard || origins.is_empty() {
        layer.allow_origin(Any)
    } else {
        layer.allow_origin(origins)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layer_builds_for_listed_and_wildcard_origins() {
        let _ = create_cors_layer(&CorsSettings {
            allowed_origins: vec!["http://localhost:3000".into(), "not a header\n".into()],
        });
        let _ = create_cors_layer(&CorsSettings {
            allowed_origins: vec!["*".into()],
        });
    }
}
