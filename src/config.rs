//! Configuration system using TOML files.
//!
//! Config is stored in the OS-standard config directory:
//! - Windows: %APPDATA%\spotiflac\config.toml
//! - macOS: ~/Library/Application Support/spotiflac/config.toml
//! - Linux: ~/.config/spotiflac/config.toml
//!
//! The config file is human-readable and editable. Command-line flags
//! override whatever the file provides for a single run.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Retrieval service addresses
    pub endpoints: EndpointsConfig,

    /// Spotify Web API credentials
    pub spotify: SpotifyConfig,

    /// Catalog candidate matching
    pub matching: MatchingConfig,

    /// Batch retry and concurrency
    pub retry: RetryConfig,

    /// HTTP timeouts
    pub network: NetworkConfig,

    /// Lossless verifier thresholds
    pub verifier: VerifierConfig,
}

/// Primary/backup pair for the retrieval service
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointsConfig {
    pub primary: String,
    pub backup: String,
}

impl Default for EndpointsConfig {
    fn default() -> Self {
        Self {
            primary: "https://lucida.to".to_string(),
            backup: "https://lucida.su".to_string(),
        }
    }
}

/// Spotify client-credentials pair (keep separate for potential future encryption)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SpotifyConfig {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
}

/// Candidate matching settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchingConfig {
    /// Minimum combined title/artist similarity (0.0 - 1.0)
    pub similarity_threshold: f32,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: 0.6,
        }
    }
}

/// Retry loop and fallback settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Pause between retry rounds, in seconds
    pub backoff_secs: u64,

    /// Tracks downloaded concurrently within a round
    pub workers: usize,

    /// Consecutive timeouts on one service that count as an endpoint failure
    pub timeout_promotion_after: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            backoff_secs: 30,
            workers: 3,
            timeout_promotion_after: 2,
        }
    }
}

impl RetryConfig {
    pub fn backoff(&self) -> Duration {
        Duration::from_secs(self.backoff_secs)
    }
}

/// HTTP client settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Per-request timeout, in seconds
    pub request_timeout_secs: u64,

    /// Upper bound on waiting for the retrieval service to prepare a file
    pub poll_timeout_secs: u64,

    /// Delay between preparation status polls, in milliseconds
    pub poll_interval_ms: u64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: 30,
            poll_timeout_secs: 180,
            poll_interval_ms: 1000,
        }
    }
}

/// Spectral analysis thresholds for the lossless verifier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VerifierConfig {
    /// FFT window length in samples (power of two)
    pub fft_size: usize,

    /// Width of the frequency bands the spectrum is grouped into, in Hz
    pub band_hz: f32,

    /// Bands quieter than this many dB below the loudest band count as empty
    pub floor_db: f32,

    /// Minimum level drop across the cutoff for a lossy verdict, in dB
    pub cliff_db: f32,

    /// Cutoffs below this are treated as band-limited masters, not codec cutoffs
    pub lossy_min_hz: f32,

    /// Content reaching this frequency counts as full bandwidth
    pub lossless_min_hz: f32,

    /// Fewer non-silent windows than this yields an inconclusive verdict
    pub min_windows: usize,

    /// Stop analysing after this many non-silent windows
    pub max_windows: usize,

    /// Windows with RMS below this are skipped as silence
    pub silence_rms: f32,
}

impl Default for VerifierConfig {
    fn default() -> Self {
        Self {
            fft_size: 4096,
            band_hz: 250.0,
            floor_db: 90.0,
            cliff_db: 30.0,
            lossy_min_hz: 11_000.0,
            lossless_min_hz: 20_500.0,
            min_windows: 4,
            max_windows: 256,
            silence_rms: 1e-4,
        }
    }
}

impl Config {
    /// Check values that would make a run meaningless.
    ///
    /// Called before any network activity.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.endpoints.primary.trim().is_empty() {
            return Err(ConfigError::Invalid("endpoints.primary is empty".to_string()));
        }
        for (name, value) in [
            ("endpoints.primary", &self.endpoints.primary),
            ("endpoints.backup", &self.endpoints.backup),
        ] {
            if !value.is_empty() && reqwest::Url::parse(value).is_err() {
                return Err(ConfigError::Invalid(format!("{} is not a URL: {}", name, value)));
            }
        }
        if !(0.0..=1.0).contains(&self.matching.similarity_threshold) {
            return Err(ConfigError::Invalid(
                "matching.similarity_threshold must be within 0.0 - 1.0".to_string(),
            ));
        }
        if self.retry.workers == 0 {
            return Err(ConfigError::Invalid("retry.workers must be at least 1".to_string()));
        }
        if self.retry.timeout_promotion_after == 0 {
            return Err(ConfigError::Invalid(
                "retry.timeout_promotion_after must be at least 1".to_string(),
            ));
        }
        if !self.verifier.fft_size.is_power_of_two() || self.verifier.fft_size < 256 {
            return Err(ConfigError::Invalid(
                "verifier.fft_size must be a power of two >= 256".to_string(),
            ));
        }
        Ok(())
    }
}

// ============================================================================
// Config File Operations
// ============================================================================

/// Get the config directory path
pub fn config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("spotiflac"))
}

/// Get the full path to the config file
pub fn config_path() -> Option<PathBuf> {
    config_dir().map(|d| d.join("config.toml"))
}

/// Load configuration from the default location
///
/// Returns default config if file doesn't exist or can't be parsed.
/// Logs warnings but doesn't fail - we always return a usable config.
pub fn load() -> Config {
    let Some(path) = config_path() else {
        tracing::warn!("Could not determine config directory, using defaults");
        return Config::default();
    };
    load_from(&path)
}

/// Load configuration from a path, falling back to defaults
pub fn load_from(path: &Path) -> Config {
    if !path.exists() {
        tracing::info!("No config file found at {:?}, using defaults", path);
        return Config::default();
    }

    match try_load_from(path) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("{}", e);
            tracing::warn!("Using default configuration");
            Config::default()
        }
    }
}

/// Load configuration from a path the user named explicitly
///
/// Unlike [`load_from`], a missing, unreadable or malformed file is an error.
pub fn try_load_from(path: &Path) -> Result<Config, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::Read(path.to_path_buf(), e))?;
    let config = toml::from_str(&contents).map_err(|e| ConfigError::Parse(path.to_path_buf(), e))?;
    tracing::info!("Loaded config from {:?}", path);
    Ok(config)
}

/// Save configuration to the default location
pub fn save(config: &Config) -> Result<PathBuf, ConfigError> {
    let path = config_path().ok_or(ConfigError::NoConfigDir)?;
    save_to(config, &path)?;
    Ok(path)
}

/// Save configuration to an explicit path
///
/// Creates the parent directory if it doesn't exist.
pub fn save_to(config: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|e| ConfigError::CreateDir(dir.to_path_buf(), e))?;
    }

    // Serialize to pretty TOML
    let contents = toml::to_string_pretty(config).map_err(ConfigError::Serialize)?;

    // Write atomically (write to temp, then rename)
    let temp_path = path.with_extension("toml.tmp");
    std::fs::write(&temp_path, &contents).map_err(|e| ConfigError::Write(temp_path.clone(), e))?;
    std::fs::rename(&temp_path, path)
        .map_err(|e| ConfigError::Rename(temp_path, path.to_path_buf(), e))?;

    tracing::info!("Saved config to {:?}", path);
    Ok(())
}

// ============================================================================
// Error Types
// ============================================================================

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Could not determine config directory")]
    NoConfigDir,

    #[error("Failed to read config file {0}: {1}")]
    Read(PathBuf, std::io::Error),

    #[error("Failed to parse config file {0}: {1}")]
    Parse(PathBuf, toml::de::Error),

    #[error("Failed to create config directory {0}: {1}")]
    CreateDir(PathBuf, std::io::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(toml::ser::Error),

    #[error("Failed to write config to {0}: {1}")]
    Write(PathBuf, std::io::Error),

    #[error("Failed to rename temp file {0} to {1}: {2}")]
    Rename(PathBuf, PathBuf, std::io::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

impl From<ConfigError> for crate::error::Error {
    fn from(e: ConfigError) -> Self {
        crate::error::Error::config(e.to_string())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_serializes() {
        let config = Config::default();
        let toml = toml::to_string_pretty(&config).unwrap();
        assert!(toml.contains("[endpoints]"));
        assert!(toml.contains("[matching]"));
        assert!(toml.contains("[retry]"));
        assert!(toml.contains("[verifier]"));
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let toml = r#"
[endpoints]
primary = "https://mirror.example"

[retry]
workers = 8
"#;
        let config: Config = toml::from_str(toml).unwrap();

        assert_eq!(config.endpoints.primary, "https://mirror.example");
        assert_eq!(config.endpoints.backup, "https://lucida.su");
        assert_eq!(config.retry.workers, 8);
        assert_eq!(config.retry.backoff_secs, 30);
        assert_eq!(config.verifier, VerifierConfig::default());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = Config::default();
        config.retry.workers = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.matching.similarity_threshold = 1.5;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.endpoints.backup = "not a url".to_string();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.verifier.fft_size = 1000;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = Config::default();
        config.spotify.client_id = Some("abc".to_string());
        config.retry.backoff_secs = 5;
        save_to(&config, &path).unwrap();

        let loaded = load_from(&path);
        assert_eq!(loaded.spotify.client_id.as_deref(), Some("abc"));
        assert_eq!(loaded.retry.backoff_secs, 5);
        assert!(!path.with_extension("toml.tmp").exists());
    }

    #[test]
    fn test_load_unparseable_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "this is [not toml").unwrap();
        let config = load_from(&path);
        assert_eq!(config.retry.workers, RetryConfig::default().workers);
    }

    #[test]
    fn test_try_load_rejects_mistyped_value() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[retry]\nworkers = \"eight\"\n").unwrap();

        assert!(matches!(try_load_from(&path), Err(ConfigError::Parse(..))));
        // The lenient loader still falls back
        assert_eq!(load_from(&path).retry.workers, 3);
    }

    #[test]
    fn test_try_load_rejects_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = try_load_from(&dir.path().join("absent.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read(..)));
        assert!(err.to_string().contains("absent.toml"));
    }
}
