//! Configuration loading for the `aisle` CLI.
//!
//! Configuration is loaded from TOML files with the following resolution order:
//! 1. `--config <path>` (CLI flag, must exist)
//! 2. `~/.aisle/config.toml` (user)
//! 3. `/etc/aisle/config.toml` (system)
//! 4. built-in defaults
//!
//! Secrets are loaded separately with mandatory permission checks:
//! 1. `~/.aisle/secrets.toml` (user, must be 0600)
//! 2. `/etc/aisle/secrets.toml` (system, must be 0600)

use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::{AisleError, CacheConfig, Result, RetryConfig};

/// CLI configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub classifier: ClassifierConfig,
    #[serde(default)]
    pub retry: RetrySection,
    #[serde(default)]
    pub store: StoreConfig,
}

/// Which classifier answers cache misses.
#[derive(Debug, Clone, Deserialize)]
pub struct ClassifierConfig {
    /// One of "gemini", "google", "openai", "anthropic", "openrouter",
    /// "ollama", "none" (default: "gemini").
    #[serde(default = "default_provider")]
    pub provider: String,
    /// Model id; each provider has its own default.
    #[serde(default)]
    pub model: Option<String>,
    /// Endpoint override (Gemini and Ollama).
    #[serde(default)]
    pub base_url: Option<String>,
    /// Upper bound on one classification, retries included (default: 10).
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            base_url: None,
            timeout_secs: default_timeout(),
        }
    }
}

fn default_provider() -> String {
    "gemini".to_string()
}

fn default_timeout() -> u64 {
    10
}

/// Retry policy for transient classifier errors.
#[derive(Debug, Clone, Deserialize)]
pub struct RetrySection {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

impl Default for RetrySection {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_delay_ms() -> u64 {
    250
}

fn default_max_delay_ms() -> u64 {
    2_000
}

/// Where list snapshots are kept between runs.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StoreConfig {
    /// Snapshot directory (default: `<data dir>/aisle`).
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
}

/// Secrets configuration (API keys).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Secrets {
    #[serde(default)]
    pub gemini: Option<ApiKeySecret>,
    #[serde(default)]
    pub openai: Option<ApiKeySecret>,
    #[serde(default)]
    pub anthropic: Option<ApiKeySecret>,
    #[serde(default)]
    pub openrouter: Option<ApiKeySecret>,
}

/// A single API key secret.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiKeySecret {
    pub api_key: String,
}

/// Provider name → environment variable name mapping.
const PROVIDER_ENV_VARS: &[(&str, &str)] = &[
    ("gemini", "GEMINI_API_KEY"),
    ("openai", "OPENAI_API_KEY"),
    ("anthropic", "ANTHROPIC_API_KEY"),
    ("openrouter", "OPENROUTER_API_KEY"),
];

impl Config {
    /// Load configuration from the standard locations, or defaults if none
    /// exists. An explicit path that does not exist is an error.
    pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
        match Self::resolve_config_path(explicit_path)? {
            Some(path) => Self::load_from_file(&path),
            None => Ok(Config::default()),
        }
    }

    fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            AisleError::Configuration(format!("Failed to read config file {path:?}: {e}"))
        })?;
        toml::from_str(&content).map_err(|e| {
            AisleError::Configuration(format!("Failed to parse config file {path:?}: {e}"))
        })
    }

    fn resolve_config_path(explicit: Option<&Path>) -> Result<Option<PathBuf>> {
        if let Some(path) = explicit {
            if path.exists() {
                return Ok(Some(path.to_path_buf()));
            }
            return Err(AisleError::Configuration(format!(
                "Config file not found: {path:?}"
            )));
        }

        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".aisle").join("config.toml");
            if user_config.exists() {
                return Ok(Some(user_config));
            }
        }

        let system_config = PathBuf::from("/etc/aisle/config.toml");
        if system_config.exists() {
            return Ok(Some(system_config));
        }

        Ok(None)
    }

    /// Cache settings derived from `[classifier]`.
    pub fn cache_config(&self) -> CacheConfig {
        CacheConfig::new().classify_timeout(Duration::from_secs(self.classifier.timeout_secs))
    }

    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig::new()
            .max_attempts(self.retry.max_attempts)
            .initial_delay(Duration::from_millis(self.retry.initial_delay_ms))
            .max_delay(Duration::from_millis(self.retry.max_delay_ms))
    }

    /// Snapshot directory, falling back to the platform data dir.
    pub fn data_dir(&self) -> PathBuf {
        if let Some(dir) = &self.store.data_dir {
            return dir.clone();
        }
        dirs::data_dir()
            .or_else(|| dirs::home_dir().map(|h| h.join(".aisle")))
            .unwrap_or_else(|| PathBuf::from("."))
            .join("aisle")
    }
}

impl Secrets {
    /// Load secrets from the standard locations with permission checks.
    ///
    /// Returns empty secrets if no file exists (keys may come from env vars).
    pub fn load() -> Result<Self> {
        if let Some(home) = dirs::home_dir() {
            let user_secrets = home.join(".aisle").join("secrets.toml");
            if user_secrets.exists() {
                return Self::load_from_file(&user_secrets);
            }
        }

        let system_secrets = PathBuf::from("/etc/aisle/secrets.toml");
        if system_secrets.exists() {
            return Self::load_from_file(&system_secrets);
        }

        Ok(Secrets::default())
    }

    /// Load a secrets file after checking its permissions.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        Self::check_permissions(path)?;
        let content = fs::read_to_string(path).map_err(|e| {
            AisleError::Configuration(format!("Failed to read secrets file {path:?}: {e}"))
        })?;
        toml::from_str(&content).map_err(|e| {
            AisleError::Configuration(format!("Failed to parse secrets file {path:?}: {e}"))
        })
    }

    /// Check that the secrets file has secure permissions (0600 or 0400).
    #[cfg(unix)]
    fn check_permissions(path: &Path) -> Result<()> {
        use std::os::unix::fs::PermissionsExt;

        let metadata = fs::metadata(path).map_err(|e| {
            AisleError::Configuration(format!("Failed to stat secrets file {path:?}: {e}"))
        })?;

        let mode = metadata.permissions().mode();
        // group or other bits set
        if mode & 0o077 != 0 {
            return Err(AisleError::Configuration(format!(
                "Secrets file {path:?} has insecure permissions {:o}. Must be 0600 or 0400.",
                mode & 0o777
            )));
        }

        Ok(())
    }

    #[cfg(not(unix))]
    fn check_permissions(_path: &Path) -> Result<()> {
        Ok(())
    }

    /// API key for a provider, falling back to its environment variable.
    pub fn api_key(&self, provider: &str) -> Option<String> {
        let from_file = match provider {
            "gemini" => self.gemini.as_ref(),
            "openai" => self.openai.as_ref(),
            "anthropic" => self.anthropic.as_ref(),
            "openrouter" => self.openrouter.as_ref(),
            _ => None,
        }
        .map(|s| s.api_key.clone());

        from_file.or_else(|| {
            PROVIDER_ENV_VARS
                .iter()
                .find(|(name, _)| *name == provider)
                .and_then(|(_, env_var)| std::env::var(env_var).ok())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_expected_values() {
        let config = Config::default();
        assert_eq!(config.classifier.provider, "gemini");
        assert_eq!(config.classifier.timeout_secs, 10);
        assert_eq!(config.retry.max_attempts, 3);
        assert!(config.store.data_dir.is_none());
    }

    #[test]
    fn parse_minimal_config() {
        let toml = r#"
            [classifier]
            provider = "ollama"
        "#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.classifier.provider, "ollama");
        // Defaults preserved
        assert_eq!(config.classifier.timeout_secs, 10);
        assert_eq!(config.retry.initial_delay_ms, 250);
    }

    #[test]
    fn parse_full_config() {
        let toml = r#"
            [classifier]
            provider = "openrouter"
            model = "google/gemini-2.5-flash"
            timeout_secs = 4

            [retry]
            max_attempts = 5
            initial_delay_ms = 100
            max_delay_ms = 800

            [store]
            data_dir = "/var/lib/aisle"
        "#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(
            config.classifier.model,
            Some("google/gemini-2.5-flash".to_string())
        );
        assert_eq!(config.data_dir(), PathBuf::from("/var/lib/aisle"));

        let cache = config.cache_config();
        assert_eq!(cache.classify_timeout, Duration::from_secs(4));

        let retry = config.retry_config();
        assert_eq!(retry.max_attempts, 5);
        assert_eq!(retry.initial_delay, Duration::from_millis(100));
        assert_eq!(retry.max_delay, Duration::from_millis(800));
    }

    #[test]
    fn explicit_config_not_found_returns_error() {
        let result = Config::load(Some(Path::new("/nonexistent/config.toml")));
        let err = result.unwrap_err().to_string();
        assert!(err.contains("Config file not found"));
    }

    #[test]
    fn explicit_config_is_loaded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[classifier]\nprovider = \"none\"\n").unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.classifier.provider, "none");
    }

    #[test]
    fn parse_secrets() {
        let toml = r#"
            [gemini]
            api_key = "gm-test-key"

            [anthropic]
            api_key = "sk-ant-test-key"
        "#;
        let secrets: Secrets = toml::from_str(toml).unwrap();
        assert_eq!(secrets.gemini.as_ref().unwrap().api_key, "gm-test-key");
        assert_eq!(
            secrets.anthropic.as_ref().unwrap().api_key,
            "sk-ant-test-key"
        );
        assert!(secrets.openai.is_none());
    }

    #[test]
    fn api_key_from_secrets() {
        let secrets = Secrets {
            gemini: Some(ApiKeySecret {
                api_key: "from-file".to_string(),
            }),
            ..Default::default()
        };
        assert_eq!(secrets.api_key("gemini"), Some("from-file".to_string()));
        assert_eq!(secrets.api_key("nonexistent"), None);
    }

    #[cfg(unix)]
    #[test]
    fn world_readable_secrets_are_rejected() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("secrets.toml");
        fs::write(&path, "[gemini]\napi_key = \"k\"\n").unwrap();

        fs::set_permissions(&path, fs::Permissions::from_mode(0o644)).unwrap();
        let err = Secrets::load_from_file(&path).unwrap_err().to_string();
        assert!(err.contains("insecure permissions"));

        fs::set_permissions(&path, fs::Permissions::from_mode(0o600)).unwrap();
        let secrets = Secrets::load_from_file(&path).unwrap();
        assert_eq!(secrets.api_key("gemini"), Some("k".to_string()));
    }
}
