use std::path::PathBuf;

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct CorsConfig {
    pub allow_origins: Vec<String>,
    pub max_age: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub cors: CorsConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    pub jwt_secret: String,
    /// Login attempts allowed per username per minute. 0 disables the limiter.
    pub login_attempts_per_minute: u32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    /// Root directory for stored photos and profile icons.
    pub media_root: PathBuf,
    /// Maximum accepted photo upload size in bytes.
    pub max_photo_size: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct UploadConfig {
    /// Minimum seconds between two submissions by the same user. 0 disables.
    pub min_submission_interval_secs: u64,
    /// Longest edge of a stored photo after recompression.
    pub photo_max_dimension: u32,
    /// JPEG quality (1-100) for recompressed photos.
    pub photo_jpeg_quality: u8,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    pub storage: StorageConfig,
    pub upload: UploadConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        let s = Config::builder()
            .set_default("server.host", "127.0.0.1")?
            .set_default("server.port", 3000)?
            .set_default("server.cors.allow_origins", Vec::<String>::new())?
            .set_default("server.cors.max_age", 3600)?
            .set_default("auth.login_attempts_per_minute", 5)?
            .set_default("storage.media_root", "./media")?
            .set_default("storage.max_photo_size", 10 * 1024 * 1024)?
            .set_default("upload.min_submission_interval_secs", 30)?
            .set_default("upload.photo_max_dimension", 1280)?
            .set_default("upload.photo_jpeg_quality", 70)?
            // Load from config/config.toml
            .add_source(File::with_name("config/config").required(false))
            // Override from environment (e.g., CAUDAL__AUTH__JWT_SECRET)
            .add_source(Environment::with_prefix("CAUDAL").separator("__"))
            .build()?;

        s.try_deserialize()
    }
}
