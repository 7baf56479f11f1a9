//! Authentication Gate
//!
//! Turns a bearer credential into a user identity before any room logic
//! runs. Decoding is delegated to an `IdentityProvider`; the gate then checks
//! the user against the directory.

use std::sync::Arc;

use async_trait::async_trait;
use jsonwebtoken::{decode, DecodingKey, Validation};
use serde::{Deserialize, Serialize};

use crate::domain::{UserDirectory, UserProfile};
use crate::shared::error::AppError;

/// WebSocket close code for credential / identity failures
pub const CLOSE_UNAUTHORIZED: u16 = 4001;
/// WebSocket close code for any other authentication failure
pub const CLOSE_AUTH_FAILED: u16 = 4000;

/// JWT claims issued by the identity service
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    /// Subject (user ID)
    pub sub: String,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
    /// Issued at time (Unix timestamp)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,
    /// Token type; only `access` tokens open a session
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
}

/// Authentication errors
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Missing credential")]
    MissingCredential,

    #[error("Invalid credential: {0}")]
    InvalidCredential(String),

    #[error("User not found")]
    UnknownUser,

    #[error("User is inactive")]
    InactiveUser,

    #[error("Authentication unavailable: {0}")]
    Unavailable(String),
}

impl AuthError {
    /// Close code sent to a WebSocket client rejected with this error.
    pub fn close_code(&self) -> u16 {
        match self {
            Self::MissingCredential
            | Self::InvalidCredential(_)
            | Self::UnknownUser
            | Self::InactiveUser => CLOSE_UNAUTHORIZED,
            Self::Unavailable(_) => CLOSE_AUTH_FAILED,
        }
    }
}

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::Unavailable(detail) => AppError::Internal(detail),
            other => AppError::Unauthorized(other.to_string()),
        }
    }
}

/// Decodes and verifies a credential into a user ID.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn identify(&self, credential: &str) -> Result<i64, AuthError>;
}

/// HS256 JWT verification with a shared secret.
pub struct JwtIdentityProvider {
    decoding_key: DecodingKey,
    validation: Validation,
}

impl JwtIdentityProvider {
    pub fn new(secret: &str) -> Self {
        Self {
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation: Validation::default(),
        }
    }
}

#[async_trait]
impl IdentityProvider for JwtIdentityProvider {
    async fn identify(&self, credential: &str) -> Result<i64, AuthError> {
        let token_data = decode::<Claims>(credential, &self.decoding_key, &self.validation)
            .map_err(|e| match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => {
                    AuthError::InvalidCredential("token expired".into())
                }
                _ => AuthError::InvalidCredential("invalid token".into()),
            })?;

        let claims = token_data.claims;
        if let Some(token_type) = claims.token_type.as_deref() {
            if token_type != "access" {
                return Err(AuthError::InvalidCredential("not an access token".into()));
            }
        }

        claims
            .sub
            .parse()
            .map_err(|_| AuthError::InvalidCredential("invalid subject".into()))
    }
}

/// Admits a connection or request only for known, active users.
pub struct AuthGate {
    provider: Arc<dyn IdentityProvider>,
    users: Arc<dyn UserDirectory>,
}

impl AuthGate {
    pub fn new(provider: Arc<dyn IdentityProvider>, users: Arc<dyn UserDirectory>) -> Self {
        Self { provider, users }
    }

    /// Authenticate a credential, returning the caller's profile.
    pub async fn authenticate(&self, credential: Option<&str>) -> Result<UserProfile, AuthError> {
        let credential = credential
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .ok_or(AuthError::MissingCredential)?;

        let user_id = self.provider.identify(credential).await?;

        let profile = self
            .users
            .find_by_id(user_id)
            .await
            .map_err(|e| AuthError::Unavailable(e.to_string()))?
            .ok_or(AuthError::UnknownUser)?;

        if !profile.is_active {
            return Err(AuthError::InactiveUser);
        }

        tracing::debug!(user_id = profile.id, "Credential accepted");
        Ok(profile)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::repositories::InMemoryChatStore;
    use chrono::Utc;
    use jsonwebtoken::{encode, EncodingKey, Header};

    const SECRET: &str = "test-secret-that-is-at-least-32-characters";

    fn token(sub: &str, exp_offset: i64, token_type: Option<&str>) -> String {
        let claims = Claims {
            sub: sub.to_string(),
            exp: Utc::now().timestamp() + exp_offset,
            iat: Some(Utc::now().timestamp()),
            token_type: token_type.map(str::to_string),
        };
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(SECRET.as_bytes()),
        )
        .unwrap()
    }

    fn directory() -> Arc<InMemoryChatStore> {
        let store = InMemoryChatStore::new();
        store.insert_user(UserProfile {
            id: 7,
            name: "Alice".into(),
            email: "alice@example.com".into(),
            avatar_url: None,
            is_active: true,
        });
        store.insert_user(UserProfile {
            id: 8,
            name: "Bob".into(),
            email: "bob@example.com".into(),
            avatar_url: None,
            is_active: false,
        });
        Arc::new(store)
    }

    fn gate() -> AuthGate {
        AuthGate::new(Arc::new(JwtIdentityProvider::new(SECRET)), directory())
    }

    #[tokio::test]
    async fn test_valid_access_token() {
        let profile = gate()
            .authenticate(Some(&token("7", 3600, Some("access"))))
            .await
            .unwrap();
        assert_eq!(profile.id, 7);

        // The type claim is optional
        let profile = gate()
            .authenticate(Some(&token("7", 3600, None)))
            .await
            .unwrap();
        assert_eq!(profile.name, "Alice");
    }

    #[tokio::test]
    async fn test_rejections_map_to_close_codes() {
        let gate = gate();

        let err = gate.authenticate(None).await.unwrap_err();
        assert!(matches!(err, AuthError::MissingCredential));
        assert_eq!(err.close_code(), 4001);

        let err = gate.authenticate(Some("garbage")).await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidCredential(_)));

        let err = gate
            .authenticate(Some(&token("7", -3600, None)))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::InvalidCredential(_)));

        let err = gate
            .authenticate(Some(&token("7", 3600, Some("refresh"))))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::InvalidCredential(_)));

        let err = gate
            .authenticate(Some(&token("99", 3600, None)))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::UnknownUser));
        assert_eq!(err.close_code(), 4001);

        let err = gate
            .authenticate(Some(&token("8", 3600, None)))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::InactiveUser));
        assert_eq!(err.close_code(), 4001);
    }

    #[tokio::test]
    async fn test_provider_outage_uses_generic_close_code() {
        let mut provider = MockIdentityProvider::new();
        provider
            .expect_identify()
            .returning(|_| Err(AuthError::Unavailable("identity service down".into())));

        let gate = AuthGate::new(Arc::new(provider), directory());
        let err = gate.authenticate(Some("anything")).await.unwrap_err();
        assert_eq!(err.close_code(), 4000);
        assert!(matches!(AppError::from(err), AppError::Internal(_)));
    }
}
