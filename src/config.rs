//! Configuration management

use std::{env, path::Path, time::Duration};

use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Main configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
#[derive(Default)]
pub struct Config {
    /// Environment files to load before processing config.
    /// Paths support ~ expansion. Loaded in order, later files override earlier.
    #[serde(default)]
    pub env_files: Vec<String>,
    /// Server configuration
    pub server: ServerConfig,
    /// Object storage configuration
    pub storage: StorageConfig,
    /// Market-data API configuration
    pub market: MarketConfig,
    /// Analysis backend configuration
    pub backend: BackendConfig,
    /// Job submission and polling
    pub jobs: JobsConfig,
    /// Token monitor (refresh loop, baseline prices)
    pub monitor: MonitorConfig,
}

impl Config {
    /// Load configuration from file and environment
    ///
    /// # Errors
    ///
    /// Returns an error if the config file does not exist or cannot be parsed.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::new();

        // Load from file if provided
        if let Some(p) = path {
            if !p.exists() {
                return Err(Error::Config(format!(
                    "Config file not found: {}",
                    p.display()
                )));
            }
            figment = figment.merge(Yaml::file(p));
        }

        // Merge environment variables (ALPHA_DASH_ prefix)
        figment = figment.merge(Env::prefixed("ALPHA_DASH_").split("__"));

        let mut config: Self = figment
            .extract()
            .map_err(|e| Error::Config(e.to_string()))?;

        // Load env files into process environment (before env var expansion)
        config.load_env_files();

        // Deployment variables shared with the grading jobs
        config.apply_env_overrides();

        // Expand ${VAR} in string values
        config.expand_env_vars();

        Ok(config)
    }

    /// Load environment files into the process environment.
    /// Supports ~ expansion. Files that don't exist are silently skipped.
    fn load_env_files(&self) {
        for path_str in &self.env_files {
            let expanded = if path_str.starts_with('~') {
                if let Some(home) = dirs::home_dir() {
                    path_str.replacen('~', &home.display().to_string(), 1)
                } else {
                    path_str.clone()
                }
            } else {
                path_str.clone()
            };

            let path = Path::new(&expanded);
            if path.exists() {
                match dotenvy::from_path(path) {
                    Ok(()) => {
                        tracing::info!("Loaded env file: {expanded}");
                    }
                    Err(e) => {
                        tracing::warn!("Failed to load env file {expanded}: {e}");
                    }
                }
            } else {
                tracing::debug!("Env file not found (skipped): {expanded}");
            }
        }
    }

    /// `SUPABASE_URL`, `SUPABASE_KEY` and `ALPHA_API_URL` fill in whatever
    /// the file and prefixed variables left unset
    fn apply_env_overrides(&mut self) {
        fn non_empty(key: &str) -> Option<String> {
            env::var(key).ok().filter(|v| !v.trim().is_empty())
        }

        if self.storage.url.is_none() {
            self.storage.url = non_empty("SUPABASE_URL");
        }
        if self.storage.key.is_none() {
            self.storage.key = non_empty("SUPABASE_KEY");
        }
        if self.backend.url.is_none() {
            self.backend.url = non_empty("ALPHA_API_URL");
        }
    }

    /// Expand ${VAR} and ${VAR:-default} patterns in config values
    fn expand_env_vars(&mut self) {
        // Pattern: ${VAR} or ${VAR:-default}
        let Ok(re) = Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)(?::-([^}]*))?\}") else {
            return;
        };

        for value in [
            &mut self.storage.url,
            &mut self.storage.key,
            &mut self.storage.local_root,
            &mut self.backend.url,
        ]
        .into_iter()
        .flatten()
        {
            *value = Self::expand_string(&re, value);
        }

        self.monitor.baseline_path = Self::expand_string(&re, &self.monitor.baseline_path);
    }

    /// Expand environment variables in a string
    fn expand_string(re: &Regex, value: &str) -> String {
        re.replace_all(value, |caps: &regex::Captures| {
            let var_name = &caps[1];
            let default = caps.get(2).map_or("", |m| m.as_str());
            env::var(var_name).unwrap_or_else(|_| default.to_string())
        })
        .into_owned()
    }
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
    /// Run the token monitor refresh loop inside the server
    pub monitor_enabled: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
            monitor_enabled: true,
        }
    }
}

/// Object storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Supabase project URL
    pub url: Option<String>,
    /// Supabase service key
    pub key: Option<String>,
    /// Serve the bucket from this local directory instead of Supabase
    pub local_root: Option<String>,
    /// Bucket name
    pub bucket: String,
    /// Overlap feed file inside the bucket
    pub overlap_file: String,
    /// Folder holding saved ROI analyses
    pub analyses_folder: String,
    /// Max entries fetched when listing the analyses folder
    pub list_limit: usize,
    /// Max token records returned by the feed reader
    pub max_records: usize,
    /// Serve sample tokens when storage is unconfigured or empty
    pub sample_fallback: bool,
    /// Request timeout
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            url: None,
            key: None,
            local_root: None,
            bucket: "monitor-data".to_string(),
            overlap_file: "overlap_results.json".to_string(),
            analyses_folder: "recent_analyses".to_string(),
            list_limit: 100,
            max_records: 100,
            sample_fallback: true,
            timeout: Duration::from_secs(20),
        }
    }
}

/// Market-data API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MarketConfig {
    /// Enable enrichment
    pub enabled: bool,
    /// DexScreener API base URL
    pub base_url: String,
    /// Request timeout
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
}

impl Default for MarketConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: "https://api.dexscreener.com".to_string(),
            timeout: Duration::from_secs(10),
        }
    }
}

/// Analysis backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Base URL of the analysis service
    pub url: Option<String>,
    /// Request timeout (per call, not per job)
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            url: None,
            timeout: Duration::from_secs(60),
        }
    }
}

/// Job submission and polling configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JobsConfig {
    /// Status poll interval
    #[serde(with = "humantime_serde")]
    pub poll_interval: Duration,
    /// Overall time a job may take before it is marked failed
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
    /// Max tokens per request
    pub max_tokens: usize,
    /// Max age of a token's pair at submission time
    #[serde(with = "humantime_serde")]
    pub max_token_age: Duration,
    /// How long finished jobs stay listed
    #[serde(with = "humantime_serde")]
    pub retain_finished: Duration,
    /// Completed results kept in memory; older ones are served from the
    /// archive
    pub max_results: usize,
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            timeout: Duration::from_secs(30 * 60),
            max_tokens: 3,
            max_token_age: Duration::from_secs(2 * 24 * 60 * 60),
            retain_finished: Duration::from_secs(60 * 60),
            max_results: 200,
        }
    }
}

/// Token monitor configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Refresh interval
    #[serde(with = "humantime_serde")]
    pub refresh_interval: Duration,
    /// File holding first-seen prices
    pub baseline_path: String,
    /// Consecutive refreshes a token may be missing before its baseline
    /// is dropped
    pub eviction_misses: u32,
    /// How long a newly seen token stays highlighted
    #[serde(with = "humantime_serde")]
    pub highlight_for: Duration,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            refresh_interval: Duration::from_secs(15),
            baseline_path: "state/baseline_prices.json".to_string(),
            eviction_misses: 2,
            highlight_for: Duration::from_secs(2),
        }
    }
}

/// Custom humantime serde module for Duration
pub mod humantime_serde {
    use std::time::Duration;

    use serde::{self, Deserialize, Deserializer, Serializer};

    /// Serialize Duration to human-readable string (e.g., "30s", "250ms")
    ///
    /// # Errors
    ///
    /// Returns a serialization error if the serializer fails.
    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        if duration.subsec_millis() == 0 {
            serializer.serialize_str(&format!("{}s", duration.as_secs()))
        } else {
            serializer.serialize_str(&format!("{}ms", duration.as_millis()))
        }
    }

    /// Deserialize human-readable duration string (e.g., "30s", "5m", "100ms", "2d")
    ///
    /// # Errors
    ///
    /// Returns a deserialization error if the string cannot be parsed as a duration.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        parse(&s).map_err(serde::de::Error::custom)
    }

    /// Parse "100ms", "30s", "5m", "2h", "2d" or bare seconds
    ///
    /// # Errors
    ///
    /// Returns the parse error for the numeric part.
    pub fn parse(s: &str) -> Result<Duration, std::num::ParseIntError> {
        let s = s.trim();
        if let Some(ms) = s.strip_suffix("ms") {
            ms.trim().parse::<u64>().map(Duration::from_millis)
        } else if let Some(secs) = s.strip_suffix('s') {
            secs.trim().parse::<u64>().map(Duration::from_secs)
        } else if let Some(mins) = s.strip_suffix('m') {
            mins.trim().parse::<u64>().map(|m| Duration::from_secs(m * 60))
        } else if let Some(hours) = s.strip_suffix('h') {
            hours.trim().parse::<u64>().map(|h| Duration::from_secs(h * 3600))
        } else if let Some(days) = s.strip_suffix('d') {
            days.trim().parse::<u64>().map(|d| Duration::from_secs(d * 86_400))
        } else {
            // Assume seconds
            s.parse::<u64>().map(Duration::from_secs)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_match_deployment_layout() {
        let config = Config::default();
        assert_eq!(config.storage.bucket, "monitor-data");
        assert_eq!(config.storage.overlap_file, "overlap_results.json");
        assert_eq!(config.storage.analyses_folder, "recent_analyses");
        assert_eq!(config.jobs.max_tokens, 3);
        assert_eq!(config.jobs.max_token_age, Duration::from_secs(172_800));
        assert_eq!(config.monitor.refresh_interval, Duration::from_secs(15));
    }

    #[test]
    fn test_humantime_parse() {
        assert_eq!(humantime_serde::parse("100ms").unwrap(), Duration::from_millis(100));
        assert_eq!(humantime_serde::parse("30s").unwrap(), Duration::from_secs(30));
        assert_eq!(humantime_serde::parse("5m").unwrap(), Duration::from_secs(300));
        assert_eq!(humantime_serde::parse("2h").unwrap(), Duration::from_secs(7200));
        assert_eq!(humantime_serde::parse("2d").unwrap(), Duration::from_secs(172_800));
        assert_eq!(humantime_serde::parse("7").unwrap(), Duration::from_secs(7));
        assert!(humantime_serde::parse("soon").is_err());
    }

    #[test]
    fn test_yaml_sections_deserialize() {
        let yaml = r#"
server:
  port: 8080
storage:
  local_root: ./data
  max_records: 50
jobs:
  poll_interval: 2s
  timeout: 10m
monitor:
  baseline_path: /tmp/prices.json
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.storage.local_root.as_deref(), Some("./data"));
        assert_eq!(config.storage.max_records, 50);
        assert_eq!(config.storage.bucket, "monitor-data");
        assert_eq!(config.jobs.poll_interval, Duration::from_secs(2));
        assert_eq!(config.jobs.timeout, Duration::from_secs(600));
        assert_eq!(config.monitor.baseline_path, "/tmp/prices.json");
    }

    #[test]
    fn test_load_env_files_sets_env_vars() {
        let dir = tempfile::tempdir().unwrap();
        let env_path = dir.path().join("test.env");
        let mut f = std::fs::File::create(&env_path).unwrap();
        writeln!(f, "ALPHA_DASH_TEST_KEY_A=hello_from_env_file").unwrap();
        drop(f);

        let config = Config {
            env_files: vec![env_path.to_string_lossy().to_string()],
            ..Default::default()
        };
        config.load_env_files();

        assert_eq!(env::var("ALPHA_DASH_TEST_KEY_A").unwrap(), "hello_from_env_file");
    }

    #[test]
    fn test_load_env_files_skips_missing() {
        let config = Config {
            env_files: vec!["/nonexistent/path/.env".to_string()],
            ..Default::default()
        };
        config.load_env_files();
    }

    #[test]
    fn test_expand_string_uses_default() {
        let re = Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)(?::-([^}]*))?\}").unwrap();
        let out = Config::expand_string(&re, "${ALPHA_DASH_SURELY_UNSET_VAR:-https://fallback}/x");
        assert_eq!(out, "https://fallback/x");
    }

    #[test]
    fn test_missing_config_file_is_an_error() {
        let err = Config::load(Some(Path::new("/nonexistent/alpha-dash.yaml"))).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
