//! Fetcher configuration, optionally loaded from a TOML file.
//!
//! The config file is optional: a missing file yields `Config::default()`.
//! Unknown keys are accepted by serde but logged, since they are usually typos.
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    /// SEC-014: Config file exceeds maximum allowed size.
    #[error("Config file too large: {0}")]
    TooLarge(String),
}

// ============================================================================
// Configuration Struct
// ============================================================================

/// Settings for [`crate::fetcher::Fetcher`] and [`crate::fetcher::build_client`].
///
/// All fields use `#[serde(default)]` so any subset of keys can be specified.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// `User-Agent` header sent with every request.
    pub user_agent: String,

    /// Per-request timeout when the caller sets no deadline.
    pub request_timeout_secs: u64,

    /// Upper bound on fetches in flight during a batch.
    pub max_concurrent_fetches: usize,

    /// How many HTML pages may be followed to reach a feed. 0 disables discovery.
    pub max_discovery_depth: usize,

    /// Response bodies larger than this are rejected.
    pub max_response_bytes: usize,

    /// Treat validation failures as fetch errors instead of warnings.
    pub strict_validation: bool,

    /// SEC: Refuse localhost and private network addresses.
    pub block_private_addresses: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            user_agent: concat!("feedsift/", env!("CARGO_PKG_VERSION")).to_string(),
            request_timeout_secs: 30,
            max_concurrent_fetches: 10,
            max_discovery_depth: 1,
            max_response_bytes: 10 * 1024 * 1024,
            strict_validation: false,
            block_private_addresses: true,
        }
    }
}

impl Config {
    /// SEC-014: Maximum config file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    const KNOWN_KEYS: [&'static str; 7] = [
        "user_agent",
        "request_timeout_secs",
        "max_concurrent_fetches",
        "max_discovery_depth",
        "max_response_bytes",
        "strict_validation",
        "block_private_addresses",
    ];

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Load configuration from a TOML file.
    ///
    /// - Missing file → `Ok(Config::default())`
    /// - Empty file → `Ok(Config::default())`
    /// - Invalid TOML → `Err(ConfigError::Parse)` with line number info
    /// - Unknown keys → accepted, logged as warning
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        // SEC-014: Check file size before reading to prevent memory exhaustion
        match std::fs::metadata(path) {
            Ok(meta) if meta.len() > Self::MAX_FILE_SIZE => {
                return Err(ConfigError::TooLarge(format!(
                    "Config file is {} bytes (max {} bytes)",
                    meta.len(),
                    Self::MAX_FILE_SIZE
                )));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No config file found, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
            Ok(_) => {}
        }

        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                // Race condition: file deleted between metadata and read
                tracing::debug!(path = %path.display(), "Config file disappeared, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
        };

        Self::from_toml(&content, path)
    }

    fn from_toml(content: &str, path: &Path) -> Result<Self, ConfigError> {
        if content.trim().is_empty() {
            tracing::debug!(path = %path.display(), "Config file is empty, using defaults");
            return Ok(Self::default());
        }

        if let Ok(raw) = content.parse::<toml::Table>() {
            for key in raw.keys() {
                if !Self::KNOWN_KEYS.contains(&key.as_str()) {
                    tracing::warn!(key = %key, "Unknown key in config file, ignoring");
                }
            }
        }

        let config: Config = toml::from_str(content)?;
        tracing::info!(
            path = %path.display(),
            max_concurrent_fetches = config.max_concurrent_fetches,
            strict_validation = config.strict_validation,
            "Loaded configuration"
        );
        Ok(config)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn write_config(name: &str, content: &str) -> std::path::PathBuf {
        let dir = std::env::temp_dir().join(format!("feedsift_config_test_{name}"));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.toml");
        std::fs::write(&path, content).unwrap();
        path
    }

    fn cleanup(path: &Path) {
        if let Some(dir) = path.parent() {
            std::fs::remove_dir_all(dir).ok();
        }
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.user_agent.starts_with("feedsift/"));
        assert_eq!(config.request_timeout(), Duration::from_secs(30));
        assert_eq!(config.max_concurrent_fetches, 10);
        assert_eq!(config.max_discovery_depth, 1);
        assert_eq!(config.max_response_bytes, 10 * 1024 * 1024);
        assert!(!config.strict_validation);
        assert!(config.block_private_addresses);
    }

    #[test]
    fn test_missing_file_returns_default() {
        let path = Path::new("/tmp/feedsift_test_nonexistent_config.toml");
        let config = Config::load(path).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_empty_file_returns_default() {
        let path = write_config("empty", "   \n  \n");
        assert_eq!(Config::load(&path).unwrap(), Config::default());
        cleanup(&path);
    }

    #[test]
    fn test_partial_config_uses_defaults_for_missing() {
        let path = write_config("partial", "strict_validation = true\n");
        let config = Config::load(&path).unwrap();
        assert!(config.strict_validation);
        assert_eq!(config.max_concurrent_fetches, 10); // default
        cleanup(&path);
    }

    #[test]
    fn test_full_config() {
        let content = r#"
user_agent = "MyReader/2.0"
request_timeout_secs = 5
max_concurrent_fetches = 4
max_discovery_depth = 0
max_response_bytes = 1024
strict_validation = true
block_private_addresses = false
"#;
        let path = write_config("full", content);
        let config = Config::load(&path).unwrap();
        assert_eq!(
            config,
            Config {
                user_agent: "MyReader/2.0".into(),
                request_timeout_secs: 5,
                max_concurrent_fetches: 4,
                max_discovery_depth: 0,
                max_response_bytes: 1024,
                strict_validation: true,
                block_private_addresses: false,
            }
        );
        cleanup(&path);
    }

    #[test]
    fn test_invalid_toml_returns_error() {
        let path = write_config("invalid", "this is not [valid toml");
        let err = Config::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
        assert!(err.to_string().contains("Invalid TOML"));
        cleanup(&path);
    }

    #[test]
    fn test_unknown_keys_accepted() {
        let path = write_config("unknown", "max_concurrent_fetches = 2\ntheme = \"dark\"\n");
        let config = Config::load(&path).unwrap();
        assert_eq!(config.max_concurrent_fetches, 2);
        cleanup(&path);
    }

    #[test]
    fn test_wrong_type_returns_error() {
        let path = write_config("wrongtype", "max_concurrent_fetches = \"many\"\n");
        assert!(Config::load(&path).is_err());
        cleanup(&path);
    }

    // SEC-014: File size limit
    #[test]
    fn test_too_large_file_rejected() {
        let path = write_config("too_large", &"a".repeat(1_048_577));
        let err = Config::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::TooLarge(_)));
        assert!(err.to_string().contains("too large"));
        cleanup(&path);
    }
}
