//! Application settings and configuration structures.

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

/// Root configuration structure containing all application settings.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// Server configuration (host, port)
    pub server: ServerSettings,

    /// Database configuration (PostgreSQL)
    pub database: DatabaseSettings,

    /// JWT authentication settings
    pub jwt: JwtSettings,

    /// Snowflake ID generator settings
    pub snowflake: SnowflakeSettings,

    /// CORS configuration
    pub cors: CorsSettings,

    /// WebSocket gateway configuration
    pub websocket: WebSocketSettings,

    /// Attachment validation and storage
    pub attachments: AttachmentSettings,

    /// Current environment (development, staging, production)
    pub environment: String,

    /// Log output format: "pretty" or "json"
    pub log_format: String,
}

/// Server binding configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    /// Host address to bind to (e.g., "0.0.0.0")
    pub host: String,

    /// Port number to listen on
    pub port: u16,
}

/// PostgreSQL database configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseSettings {
    /// Database connection URL. When absent the engine runs on the
    /// in-process store (single serving process, nothing survives restart).
    pub url: Option<String>,

    /// Maximum number of connections in the pool
    pub max_connections: u32,

    /// Minimum number of connections to maintain
    pub min_connections: u32,

    /// Connection acquire timeout in seconds
    pub acquire_timeout: u64,

    /// Apply embedded migrations on startup
    pub run_migrations: bool,
}

/// JWT authentication configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct JwtSettings {
    /// Secret key the identity service signs access tokens with
    pub secret: String,
}

/// Snowflake ID generator configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct SnowflakeSettings {
    /// Machine/worker ID (0-1023)
    pub machine_id: u16,

    /// Custom epoch timestamp in milliseconds
    pub epoch: u64,
}

/// CORS configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct CorsSettings {
    /// Allowed origins (comma-separated in env)
    pub allowed_origins: Vec<String>,
}

/// WebSocket gateway configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct WebSocketSettings {
    /// Maximum message size in bytes. Attachments travel inline as base64,
    /// so this bounds the total size of one `send_message` frame.
    pub max_message_size: usize,

    /// Maximum frame size in bytes
    pub max_frame_size: usize,

    /// Capacity of each connection's outbound queue. A consumer that lets
    /// it fill up is disconnected.
    pub outbound_buffer: usize,

    /// Time allowed for credential validation after the upgrade
    pub auth_timeout_secs: u64,

    /// Close connections that send nothing for this long
    pub idle_timeout_secs: u64,

    /// Delay before a user whose last connection closed is marked offline
    pub presence_grace_secs: u64,

    /// Lifetime of a typing indicator without a refresh
    pub typing_ttl_secs: u64,

    /// Interval of the typing expiry sweep
    pub typing_sweep_ms: u64,
}

/// Attachment limits and object store location.
#[derive(Debug, Clone, Deserialize)]
pub struct AttachmentSettings {
    /// Maximum image size in bytes
    pub max_image_size: u64,

    /// Maximum voice note size in bytes
    pub max_voice_size: u64,

    /// Maximum generic file size in bytes
    pub max_file_size: u64,

    /// Allowed image MIME types
    pub image_types: Vec<String>,

    /// Allowed voice MIME types
    pub voice_types: Vec<String>,

    /// Allowed generic file MIME types
    pub file_types: Vec<String>,

    /// Directory the local object store writes into
    pub storage_root: String,

    /// Public URL prefix under which stored objects are served
    pub public_base_url: String,
}

/// Minimum required length for JWT secret (256 bits = 32 bytes)
pub const MIN_JWT_SECRET_LENGTH: usize = 32;

impl Settings {
    /// Load settings from environment variables and configuration files.
    ///
    /// The loading order is:
    /// 1. built-in defaults
    /// 2. config/default.toml
    /// 3. config/{RUN_ENV}.toml
    /// 4. Environment variables (highest priority)
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if configuration cannot be loaded or parsed,
    /// or if the JWT secret is too short.
    pub fn load() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let environment = std::env::var("RUN_ENV").unwrap_or_else(|_| "development".into());

        Self::builder(&environment)?
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", environment)).required(false))
            // APP__WEBSOCKET__OUTBOUND_BUFFER=64 -> websocket.outbound_buffer = 64
            .add_source(
                Environment::default()
                    .prefix("APP")
                    .prefix_separator("__")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("cors.allowed_origins")
                    .try_parsing(true),
            )
            .set_override_option("server.host", std::env::var("SERVER_HOST").ok())?
            .set_override_option("server.port", std::env::var("SERVER_PORT").ok())?
            .set_override_option("database.url", std::env::var("DATABASE_URL").ok())?
            .set_override_option("jwt.secret", std::env::var("JWT_SECRET").ok())?
            .set_override_option(
                "snowflake.machine_id",
                std::env::var("SNOWFLAKE_MACHINE_ID").ok(),
            )?
            .build()?
            .try_deserialize()
            .and_then(Self::validate)
    }

    /// Defaults only, with the given JWT secret. Used by tests and tools that
    /// must not read the environment.
    pub fn with_defaults(jwt_secret: &str) -> Result<Self, ConfigError> {
        Self::builder("test")?
            .set_override("jwt.secret", jwt_secret)?
            .build()?
            .try_deserialize()
            .and_then(Self::validate)
    }

    fn builder(
        environment: &str,
    ) -> Result<config::ConfigBuilder<config::builder::DefaultState>, ConfigError> {
        Config::builder()
            .set_default("environment", environment)?
            .set_default("log_format", "pretty")?
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 8000)?
            .set_default("database.max_connections", 10)?
            .set_default("database.min_connections", 2)?
            .set_default("database.acquire_timeout", 30)?
            .set_default("database.run_migrations", true)?
            .set_default("jwt.secret", "")?
            .set_default("snowflake.machine_id", 1)?
            .set_default("snowflake.epoch", 1_704_067_200_000_u64)?
            .set_default("cors.allowed_origins", vec!["http://localhost:3000"])?
            // Base64 inflates by 4/3; 96MB covers a maximum-size file frame
            .set_default("websocket.max_message_size", 96 * 1024 * 1024_i64)?
            .set_default("websocket.max_frame_size", 16 * 1024 * 1024_i64)?
            .set_default("websocket.outbound_buffer", 256_i64)?
            .set_default("websocket.auth_timeout_secs", 10_i64)?
            .set_default("websocket.idle_timeout_secs", 120_i64)?
            .set_default("websocket.presence_grace_secs", 5_i64)?
            .set_default("websocket.typing_ttl_secs", 6_i64)?
            .set_default("websocket.typing_sweep_ms", 1000_i64)?
            .set_default("attachments.max_image_size", 10 * 1024 * 1024_i64)?
            .set_default("attachments.max_voice_size", 20 * 1024 * 1024_i64)?
            .set_default("attachments.max_file_size", 50 * 1024 * 1024_i64)?
            .set_default(
                "attachments.image_types",
                vec!["image/jpeg", "image/jpg", "image/png", "image/gif", "image/webp"],
            )?
            .set_default(
                "attachments.voice_types",
                vec![
                    "audio/mpeg",
                    "audio/mp4",
                    "audio/aac",
                    "audio/ogg",
                    "audio/webm",
                    "audio/wav",
                    "audio/x-m4a",
                ],
            )?
            .set_default(
                "attachments.file_types",
                vec![
                    "application/pdf",
                    "application/msword",
                    "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
                    "application/vnd.ms-excel",
                    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
                    "text/plain",
                    "application/zip",
                    "application/x-rar-compressed",
                ],
            )?
            .set_default("attachments.storage_root", "static/chat_files")?
            .set_default(
                "attachments.public_base_url",
                "http://localhost:8000/chat_files",
            )
    }

    fn validate(settings: Self) -> Result<Self, ConfigError> {
        if settings.jwt.secret.len() < MIN_JWT_SECRET_LENGTH {
            return Err(ConfigError::Message(format!(
                "JWT secret must be at least {} characters for security. Current length: {}",
                MIN_JWT_SECRET_LENGTH,
                settings.jwt.secret.len()
            )));
        }
        if settings.websocket.outbound_buffer == 0 {
            return Err(ConfigError::Message(
                "websocket.outbound_buffer must be greater than zero".into(),
            ));
        }
        Ok(settings)
    }

    /// Get the full server address as a string.
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}
