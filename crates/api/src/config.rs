use std::env;
use std::path::PathBuf;
use std::time::Duration;

use sanitation_desk::{DeskSettings, DEFAULT_MUNICIPAL_LINK};
use sanitation_ml::VisionConfig;

const DEFAULT_API_KEY: &str = "dev-sanitation-key";
const DEFAULT_MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

/// Everything the server reads from the environment, resolved once at startup.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub bind: String,
    pub database_url: Option<String>,
    pub api_key: String,
    pub tables_path: Option<PathBuf>,
    pub vision: VisionConfig,
    pub desk: DeskSettings,
    pub rate_limit_window: Duration,
    pub rate_limit_max_requests: usize,
    pub max_upload_bytes: usize,
    pub allowed_origins: Vec<String>,
}

impl ApiConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let draft_ttl = env_parse::<i64>("SANITATION_DRAFT_TTL_SECONDS")
            .filter(|secs| *secs > 0)
            .map(chrono::Duration::seconds)
            .unwrap_or(defaults.desk.draft_ttl);

        Self {
            bind: env::var("SANITATION_BIND").unwrap_or(defaults.bind),
            database_url: env_string("SANITATION_DATABASE_URL"),
            api_key: env_string("SANITATION_API_KEY").unwrap_or(defaults.api_key),
            tables_path: env_string("SANITATION_TABLES_PATH").map(PathBuf::from),
            vision: VisionConfig::from_env(),
            desk: DeskSettings {
                draft_ttl,
                municipal_link: env_string("SANITATION_MUNICIPAL_URL")
                    .unwrap_or(defaults.desk.municipal_link),
            },
            rate_limit_window: env_parse::<u64>("SANITATION_RATE_LIMIT_WINDOW_SECONDS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.rate_limit_window),
            rate_limit_max_requests: env_parse("SANITATION_RATE_LIMIT_MAX_REQUESTS")
                .unwrap_or(defaults.rate_limit_max_requests),
            max_upload_bytes: env_parse("SANITATION_MAX_UPLOAD_BYTES")
                .unwrap_or(defaults.max_upload_bytes),
            allowed_origins: env_string("SANITATION_ALLOWED_ORIGINS")
                .map(|raw| {
                    raw.split(',')
                        .map(str::trim)
                        .filter(|origin| !origin.is_empty())
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default(),
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8080".to_string(),
            database_url: None,
            api_key: DEFAULT_API_KEY.to_string(),
            tables_path: None,
            vision: VisionConfig::from_env(),
            desk: DeskSettings {
                draft_ttl: chrono::Duration::hours(24),
                municipal_link: DEFAULT_MUNICIPAL_LINK.to_string(),
            },
            rate_limit_window: Duration::from_secs(60),
            rate_limit_max_requests: 120,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            allowed_origins: Vec::new(),
        }
    }
}

fn env_string(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    env_string(key).and_then(|value| value.parse().ok())
}
