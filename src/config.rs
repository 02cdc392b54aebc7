//! # Configuration Management
//!
//! Loads application configuration from layered sources:
//! - Built-in defaults (the `Default` impl below)
//! - A `config.toml` file next to the binary (optional)
//! - Environment variables with an `APP_` prefix
//! - Bare `HOST` / `PORT` variables, honored for deployment platforms
//!
//! ## Configuration Priority (highest to lowest):
//! 1. Environment variables (APP_SERVER__HOST, APP_LIMITS__MAX_UPLOAD_BYTES,
//!    ...); a double underscore separates the section from the key so that
//!    multi-word keys stay unambiguous
//! 2. Configuration file (config.toml)
//! 3. Default values

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;

/// Top-level application configuration.
///
/// Broken into logical groups so the file reads the way the service is
/// structured: where the server listens, which model it serves, and how much
/// work it admits at once.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub model: ModelConfig,
    pub limits: LimitsConfig,
}

/// Where the HTTP server binds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Which Whisper model is loaded at startup and how it decodes.
///
/// ## Fields:
/// - `whisper_model`: model size ("tiny", "base", "small", "medium", "large")
/// - `device`: compute device preference ("auto", "cpu", "cuda", "metal")
/// - `language`: spoken language passed to the decoder (ISO 639-1)
///
/// The decoding parameters themselves (greedy, temperature 0, beam 1,
/// best-of 1) are fixed by the service contract and are not configurable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    pub whisper_model: String,
    pub device: String,
    pub language: String,
}

/// Admission and upload limits.
///
/// - `max_concurrent_transcriptions`: how many inferences may hold the
///   accelerator at once. Defaults to 1 since a single GPU serializes the
///   work anyway.
/// - `max_upload_bytes`: cap on a single uploaded file.
/// - `temp_dir`: where uploads are spooled before transcription.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    pub max_concurrent_transcriptions: usize,
    pub max_upload_bytes: usize,
    pub temp_dir: PathBuf,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 8080,
            },
            model: ModelConfig {
                whisper_model: "medium".to_string(),
                device: "auto".to_string(),
                language: "en".to_string(),
            },
            limits: LimitsConfig {
                max_concurrent_transcriptions: 1,
                // 64 MiB covers typical audio clips without being unbounded
                max_upload_bytes: 64 * 1024 * 1024,
                temp_dir: env::temp_dir(),
            },
        }
    }
}

impl AppConfig {
    /// Load configuration from defaults, config.toml, and the environment.
    ///
    /// `HOST` and `PORT` are handled as overrides outside the `APP_` prefix
    /// convention because deployment platforms commonly inject them bare.
    pub fn load() -> Result<Self> {
        let mut settings = config::Config::builder()
            .add_source(config::Config::try_from(&AppConfig::default())?)
            .add_source(config::File::with_name("config").required(false))
            .add_source(env_source());

        if let Ok(host) = env::var("HOST") {
            settings = settings.set_override("server.host", host)?;
        }

        if let Ok(port) = env::var("PORT") {
            settings = settings.set_override("server.port", port)?;
        }

        let config = settings.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Validate that the configuration values make sense before the server
    /// starts serving with them.
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(anyhow::anyhow!("Server port cannot be 0"));
        }

        if self.limits.max_concurrent_transcriptions == 0 {
            return Err(anyhow::anyhow!(
                "Max concurrent transcriptions must be greater than 0"
            ));
        }

        if self.limits.max_upload_bytes == 0 {
            return Err(anyhow::anyhow!("Max upload size must be greater than 0"));
        }

        if self.model.language.is_empty() {
            return Err(anyhow::anyhow!("Model language cannot be empty"));
        }

        Ok(())
    }
}

/// Build the `APP_`-prefixed environment source.
///
/// A double underscore separates nesting levels so snake_case keys keep
/// their underscores: `APP_LIMITS__MAX_UPLOAD_BYTES` maps onto
/// `limits.max_upload_bytes`, `APP_SERVER__HOST` onto `server.host`.
/// Values are parsed into their native types, not kept as strings.
fn env_source() -> config::Environment {
    config::Environment::with_prefix("APP")
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true)
}
