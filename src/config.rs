//! Configuration file parser for ~/.config/flick/config.toml.
//!
//! Every key is optional. A missing or empty file yields `Config::default()`,
//! and unknown keys are logged as warnings rather than rejected.
use crate::feed::FeedOptions;
use secrecy::SecretString;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Environment variable that overrides `api_token` from the file.
pub const TOKEN_ENV_VAR: &str = "FLICK_API_TOKEN";

const KNOWN_KEYS: &[&str] = &[
    "api_base_url",
    "api_token",
    "initial_batch_size",
    "page_size",
    "preload_threshold",
    "preload_batch_size",
    "load_more_lookahead",
    "prefetch_delay_ms",
    "cache_ttl_secs",
    "request_timeout_secs",
    "clear_cache_on_refresh",
    "item_height",
];

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Config file too large: {size} bytes (max {max} bytes)")]
    TooLarge { size: u64, max: u64 },

    #[error("Invalid config value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

/// Top-level application configuration.
///
/// Custom `Debug` masks `api_token` so the config can be logged.
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Base URL of the feed API. HTTPS is required except for localhost.
    pub api_base_url: String,

    /// Bearer token for the feed API. `FLICK_API_TOKEN` takes precedence.
    pub api_token: Option<String>,

    pub initial_batch_size: usize,
    pub page_size: usize,
    pub preload_threshold: usize,
    pub preload_batch_size: usize,

    /// How close to the end of the list (in items) scrolling asks for more.
    pub load_more_lookahead: usize,

    pub prefetch_delay_ms: u64,
    pub cache_ttl_secs: u64,
    pub request_timeout_secs: u64,
    pub clear_cache_on_refresh: bool,

    /// Card height in terminal rows.
    pub item_height: u16,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: "http://localhost:8080/api".to_string(),
            api_token: None,
            initial_batch_size: 5,
            page_size: 10,
            preload_threshold: 2,
            preload_batch_size: 10,
            load_more_lookahead: 3,
            prefetch_delay_ms: 300,
            cache_ttl_secs: 300,
            request_timeout_secs: 20,
            clear_cache_on_refresh: false,
            item_height: 8,
        }
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("api_base_url", &self.api_base_url)
            .field("api_token", &self.api_token.as_ref().map(|_| "[REDACTED]"))
            .field("initial_batch_size", &self.initial_batch_size)
            .field("page_size", &self.page_size)
            .field("preload_threshold", &self.preload_threshold)
            .field("preload_batch_size", &self.preload_batch_size)
            .field("load_more_lookahead", &self.load_more_lookahead)
            .field("prefetch_delay_ms", &self.prefetch_delay_ms)
            .field("cache_ttl_secs", &self.cache_ttl_secs)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("clear_cache_on_refresh", &self.clear_cache_on_refresh)
            .field("item_height", &self.item_height)
            .finish()
    }
}

impl Config {
    /// Maximum config file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    /// `~/.config/flick/config.toml`, or `None` if `HOME` is unset.
    pub fn default_path() -> Option<PathBuf> {
        let home = std::env::var_os("HOME")?;
        Some(
            PathBuf::from(home)
                .join(".config")
                .join("flick")
                .join("config.toml"),
        )
    }

    /// Load configuration from a TOML file.
    ///
    /// - Missing or blank file → `Ok(Config::default())`
    /// - Over 1 MB → `Err(ConfigError::TooLarge)` without reading it
    /// - Invalid TOML or wrong types → `Err(ConfigError::Parse)`
    /// - Zero batch sizes → `Err(ConfigError::Invalid)`
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = match std::fs::metadata(path) {
            Ok(meta) if meta.len() > Self::MAX_FILE_SIZE => {
                return Err(ConfigError::TooLarge {
                    size: meta.len(),
                    max: Self::MAX_FILE_SIZE,
                });
            }
            Ok(_) => std::fs::read_to_string(path),
            Err(e) => Err(e),
        };
        let content = match content {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No config file found, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
        };

        let config = Self::parse(&content)?;
        tracing::info!(
            path = %path.display(),
            api_base_url = %config.api_base_url,
            "Loaded configuration"
        );
        Ok(config)
    }

    /// Parses config text. Blank input yields the defaults.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }

        if let Ok(raw) = content.parse::<toml::Table>() {
            for key in raw.keys().filter(|k| !KNOWN_KEYS.contains(&k.as_str())) {
                tracing::warn!(key = %key, "Unknown key in config file, ignoring");
            }
        }

        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let positive = [
            ("initial_batch_size", self.initial_batch_size),
            ("page_size", self.page_size),
            ("preload_batch_size", self.preload_batch_size),
        ];
        for (key, value) in positive {
            if value == 0 {
                return Err(ConfigError::Invalid {
                    key,
                    reason: "must be at least 1".to_string(),
                });
            }
        }
        if self.item_height == 0 {
            return Err(ConfigError::Invalid {
                key: "item_height",
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    /// The API token, preferring `FLICK_API_TOKEN` over the file.
    pub fn api_token(&self) -> Option<SecretString> {
        resolve_token(std::env::var(TOKEN_ENV_VAR).ok(), self.api_token.as_deref())
    }

    pub fn feed_options(&self) -> FeedOptions {
        FeedOptions {
            initial_batch_size: self.initial_batch_size,
            page_size: self.page_size,
            preload_threshold: self.preload_threshold,
            preload_batch_size: self.preload_batch_size,
            prefetch_delay: Duration::from_millis(self.prefetch_delay_ms),
            clear_cache_on_refresh: self.clear_cache_on_refresh,
        }
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }
}

/// Non-empty env value wins over a non-empty file value.
fn resolve_token(env: Option<String>, file: Option<&str>) -> Option<SecretString> {
    env.filter(|v| !v.trim().is_empty())
        .or_else(|| file.filter(|v| !v.trim().is_empty()).map(str::to_string))
        .map(SecretString::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    fn write_config(name: &str, content: &str) -> (PathBuf, PathBuf) {
        let dir = std::env::temp_dir().join(format!("flick_config_test_{name}"));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.toml");
        std::fs::write(&path, content).unwrap();
        (dir, path)
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.initial_batch_size, 5);
        assert_eq!(config.page_size, 10);
        assert_eq!(config.preload_threshold, 2);
        assert_eq!(config.preload_batch_size, 10);
        assert_eq!(config.load_more_lookahead, 3);
        assert_eq!(config.cache_ttl(), Duration::from_secs(300));
        assert_eq!(config.request_timeout(), Duration::from_secs(20));
        assert!(!config.clear_cache_on_refresh);
        assert!(config.api_token.is_none());
    }

    #[test]
    fn test_default_feed_options_match() {
        assert_eq!(Config::default().feed_options(), FeedOptions::default());
    }

    #[test]
    fn test_missing_file_returns_default() {
        let path = Path::new("/tmp/flick_test_nonexistent_config.toml");
        let config = Config::load(path).unwrap();
        assert_eq!(config.page_size, 10);
    }

    #[test]
    fn test_blank_file_returns_default() {
        let (dir, path) = write_config("blank", "  \n\n ");
        let config = Config::load(&path).unwrap();
        assert_eq!(config.initial_batch_size, 5);
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_partial_config_keeps_other_defaults() {
        let config = Config::parse("page_size = 20\nprefetch_delay_ms = 0\n").unwrap();
        assert_eq!(config.page_size, 20);
        assert_eq!(config.feed_options().prefetch_delay, Duration::ZERO);
        assert_eq!(config.preload_batch_size, 10);
    }

    #[test]
    fn test_full_config() {
        let content = r#"
api_base_url = "https://feed.example.com/v2"
api_token = "file-token"
initial_batch_size = 3
page_size = 15
preload_threshold = 4
preload_batch_size = 20
load_more_lookahead = 5
prefetch_delay_ms = 150
cache_ttl_secs = 60
request_timeout_secs = 5
clear_cache_on_refresh = true
item_height = 10
"#;
        let (dir, path) = write_config("full", content);
        let config = Config::load(&path).unwrap();

        assert_eq!(config.api_base_url, "https://feed.example.com/v2");
        assert_eq!(config.api_token.as_deref(), Some("file-token"));
        let options = config.feed_options();
        assert_eq!(options.initial_batch_size, 3);
        assert_eq!(options.page_size, 15);
        assert_eq!(options.preload_threshold, 4);
        assert_eq!(options.preload_batch_size, 20);
        assert_eq!(options.prefetch_delay, Duration::from_millis(150));
        assert!(options.clear_cache_on_refresh);
        assert_eq!(config.load_more_lookahead, 5);
        assert_eq!(config.cache_ttl(), Duration::from_secs(60));
        assert_eq!(config.request_timeout(), Duration::from_secs(5));
        assert_eq!(config.item_height, 10);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_invalid_toml_returns_error() {
        let err = Config::parse("this is not [valid toml").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
        assert!(err.to_string().contains("Invalid TOML"));
    }

    #[test]
    fn test_wrong_type_returns_error() {
        assert!(matches!(
            Config::parse("page_size = \"ten\"\n"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_unknown_keys_accepted() {
        let config = Config::parse("page_size = 12\ntheme = \"dark\"\n").unwrap();
        assert_eq!(config.page_size, 12);
    }

    #[test]
    fn test_zero_batch_size_rejected() {
        let err = Config::parse("page_size = 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "page_size", .. }));
    }

    #[test]
    fn test_too_large_file_rejected() {
        let (dir, path) = write_config("too_large", &"a".repeat(1_048_577));
        let err = Config::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::TooLarge { size: 1_048_577, .. }));
        assert!(err.to_string().contains("too large"));
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_debug_masks_api_token() {
        let config = Config {
            api_token: Some("super-secret-token".to_string()),
            ..Config::default()
        };
        let debug_output = format!("{config:?}");
        assert!(!debug_output.contains("super-secret-token"));
        assert!(debug_output.contains("[REDACTED]"));

        let debug_output = format!("{:?}", Config::default());
        assert!(!debug_output.contains("[REDACTED]"));
    }

    #[test]
    fn test_env_token_overrides_file() {
        let token = resolve_token(Some("from-env".to_string()), Some("from-file")).unwrap();
        assert_eq!(token.expose_secret(), "from-env");

        let token = resolve_token(None, Some("from-file")).unwrap();
        assert_eq!(token.expose_secret(), "from-file");

        let token = resolve_token(Some("  ".to_string()), Some("from-file")).unwrap();
        assert_eq!(token.expose_secret(), "from-file");

        assert!(resolve_token(None, Some("")).is_none());
    }
}
