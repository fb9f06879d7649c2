//! Environment-driven configuration with collected, non-fatal warnings.
//!
//! Everything has a usable default except secrets; anything surprising
//! (unset key, unparsable value, persistence disabled) becomes a warning
//! surfaced once at startup instead of a hard failure.

use std::path::PathBuf;
use std::time::Duration;

use oculex_core::AnalysisSettings;
use oculex_core::backend::VisionApiConfig;
use oculex_core::retry::RetryPolicy;

pub const DEFAULT_PORT: u16 = 8420;
/// Multipart body cap, comfortably above the 100 MiB video limit.
pub const DEFAULT_BODY_LIMIT: usize = 256 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    pub body_limit_bytes: usize,
    /// Allowed CORS origins; empty means permissive.
    pub cors_origins: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct DatabaseSettings {
    /// Postgres URL; persistence is disabled when unset.
    pub url: Option<String>,
}

#[derive(Debug, Clone)]
pub struct BackendSettings {
    pub base_url: String,
    pub api_key: Option<String>,
    pub model: String,
    pub max_tokens: u32,
}

#[derive(Debug, Clone)]
pub struct AnalysisConfig {
    pub resolve_batch_size: usize,
    pub max_retries: u32,
    pub retry_base_delay: Duration,
    pub staging_dir: PathBuf,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerSettings,
    pub database: DatabaseSettings,
    pub backend: BackendSettings,
    pub analysis: AnalysisConfig,
}

/// A loaded config plus everything worth telling the operator about.
#[derive(Debug, Clone)]
pub struct ConfigLoad {
    pub config: Config,
    pub warnings: Vec<String>,
}

impl Config {
    pub fn from_env() -> ConfigLoad {
        let mut warnings = Vec::new();

        let host = var_or("OCULEX_HOST", "0.0.0.0");
        let port = parse_or("OCULEX_PORT", DEFAULT_PORT, &mut warnings);
        let body_limit_bytes =
            parse_or("OCULEX_BODY_LIMIT_BYTES", DEFAULT_BODY_LIMIT, &mut warnings);
        let cors_origins = std::env::var("OCULEX_CORS_ORIGINS")
            .ok()
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        let database_url = std::env::var("DATABASE_URL").ok();
        if database_url.is_none() {
            warnings.push(
                "DATABASE_URL is not set; analysis results will not be persisted".to_string(),
            );
        }

        let backend_url = var_or("OCULEX_VISION_URL", "https://api.openai.com/v1");
        let api_key = std::env::var("OCULEX_VISION_KEY").ok();
        if api_key.is_none() {
            warnings.push(
                "OCULEX_VISION_KEY is not set; backend calls will be unauthenticated".to_string(),
            );
        }

        let config = Config {
            server: ServerSettings {
                host,
                port,
                body_limit_bytes,
                cors_origins,
            },
            database: DatabaseSettings { url: database_url },
            backend: BackendSettings {
                base_url: backend_url,
                api_key,
                model: var_or("OCULEX_VISION_MODEL", "gpt-4o"),
                max_tokens: parse_or("OCULEX_VISION_MAX_TOKENS", 4096, &mut warnings),
            },
            analysis: AnalysisConfig {
                resolve_batch_size: parse_or("OCULEX_RESOLVE_BATCH", 50, &mut warnings),
                max_retries: parse_or("OCULEX_BACKEND_RETRIES", 3, &mut warnings),
                retry_base_delay: Duration::from_millis(parse_or(
                    "OCULEX_BACKEND_RETRY_BASE_MS",
                    500,
                    &mut warnings,
                )),
                staging_dir: std::env::var("OCULEX_STAGING_DIR")
                    .map(PathBuf::from)
                    .unwrap_or_else(|_| std::env::temp_dir().join("oculex")),
            },
        };

        ConfigLoad { config, warnings }
    }

    pub fn vision_api(&self) -> VisionApiConfig {
        VisionApiConfig {
            base_url: self.backend.base_url.clone(),
            api_key: self.backend.api_key.clone(),
            model: self.backend.model.clone(),
            max_tokens: self.backend.max_tokens,
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.analysis.max_retries, self.analysis.retry_base_delay)
    }

    pub fn analysis_settings(&self) -> AnalysisSettings {
        AnalysisSettings {
            resolve_batch_size: self.analysis.resolve_batch_size,
            staging_dir: Some(self.analysis.staging_dir.clone()),
        }
    }
}

fn var_or(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

fn parse_or<T: std::str::FromStr + Copy>(
    name: &str,
    default: T,
    warnings: &mut Vec<String>,
) -> T {
    match std::env::var(name) {
        Ok(raw) => match raw.trim().parse() {
            Ok(value) => value,
            Err(_) => {
                warnings.push(format!("{name}={raw:?} is not valid, using the default"));
                default
            }
        },
        Err(_) => default,
    }
}
