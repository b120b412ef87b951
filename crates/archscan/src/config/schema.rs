use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Environment variable the scanner itself reads its pro-tier token from.
pub const DEFAULT_TOKEN_ENV_VAR: &str = "SEMGREP_APP_TOKEN";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    pub version: String,
    #[serde(default)]
    pub database_path: Option<String>,
    #[serde(default)]
    pub temp_directory: Option<String>,
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,
    #[serde(default)]
    pub scanner: ScannerConfig,
    #[serde(default)]
    pub unpack: UnpackConfig,
    #[serde(default)]
    pub pro: ProConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: "1.0".to_string(),
            database_path: None,
            temp_directory: None,
            worker_count: default_worker_count(),
            scanner: ScannerConfig::default(),
            unpack: UnpackConfig::default(),
            pro: ProConfig::default(),
        }
    }
}

impl Config {
    /// Database location, falling back to `~/.archscan/data/archscan.db`.
    pub fn resolved_database_path(&self) -> Option<PathBuf> {
        match &self.database_path {
            Some(path) => Some(PathBuf::from(path)),
            None => crate::db::default_database_path(),
        }
    }

    /// Root for uploads and unpacked trees, falling back to `<tmp>/archscan`.
    pub fn resolved_temp_directory(&self) -> PathBuf {
        match &self.temp_directory {
            Some(dir) => PathBuf::from(dir),
            None => std::env::temp_dir().join("archscan"),
        }
    }
}

fn default_worker_count() -> usize {
    3
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScannerConfig {
    #[serde(default = "default_scanner_binary")]
    pub binary: String,
    /// Seconds before a running scan is killed. `0` disables the limit.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl ScannerConfig {
    pub fn timeout(&self) -> Option<Duration> {
        if self.timeout_secs == 0 {
            None
        } else {
            Some(Duration::from_secs(self.timeout_secs))
        }
    }
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            binary: default_scanner_binary(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_scanner_binary() -> String {
    "semgrep".to_string()
}

fn default_timeout_secs() -> u64 {
    30 * 60
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnpackConfig {
    #[serde(default = "default_unzip_binary")]
    pub unzip_binary: String,
    #[serde(default = "default_tar_binary")]
    pub tar_binary: String,
}

impl Default for UnpackConfig {
    fn default() -> Self {
        Self {
            unzip_binary: default_unzip_binary(),
            tar_binary: default_tar_binary(),
        }
    }
}

fn default_unzip_binary() -> String {
    "unzip".to_string()
}

fn default_tar_binary() -> String {
    "tar".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProConfig {
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub token_file: Option<String>,
    #[serde(default = "default_token_env_var")]
    pub token_env_var: Option<String>,
}

impl Default for ProConfig {
    fn default() -> Self {
        Self {
            token: None,
            token_file: None,
            token_env_var: default_token_env_var(),
        }
    }
}

fn default_token_env_var() -> Option<String> {
    Some(DEFAULT_TOKEN_ENV_VAR.to_string())
}
