//! Secret resolution for the scanner's pro-tier token.
//!
//! Secrets are resolved from multiple sources in priority order:
//!
//! 1. **Direct value** - For quick local testing (e.g., `"token": "..."`)
//! 2. **File reference** - For Docker secrets pattern (e.g., `"tokenFile": "/run/secrets/semgrep"`)
//! 3. **Env var reference** - The scanner's own convention (`SEMGREP_APP_TOKEN`)

use secrecy::SecretString;
use std::fs;

use crate::config::ProConfig;

/// Error type for secret resolution failures.
#[derive(Debug, thiserror::Error)]
pub enum SecretError {
    #[error("No secret source provided (need one of: direct value, file path, or env var name)")]
    NoSourceProvided,

    #[error("Failed to read secret from file '{path}': {source}")]
    FileReadError {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Environment variable '{name}' not set")]
    EnvVarNotSet { name: String },

    #[error("Environment variable '{name}' contains invalid UTF-8")]
    EnvVarNotUnicode { name: String },

    #[error("Secret from {origin} is empty")]
    Empty { origin: String },
}

/// Result type for secret resolution.
pub type Result<T> = std::result::Result<T, SecretError>;

/// Resolves a secret from multiple sources in priority order:
/// 1. Direct value (if provided and non-empty)
/// 2. File contents (if path provided)
/// 3. Environment variable (if name provided)
///
/// # Examples
///
/// ```ignore
/// use archscan::secrets::resolve_secret;
///
/// // File path used if no direct value
/// let secret = resolve_secret(None, Some("~/.secrets/semgrep"), Some("SEMGREP_APP_TOKEN"))?;
/// ```
pub fn resolve_secret(
    direct: Option<&str>,
    file_path: Option<&str>,
    env_var: Option<&str>,
) -> Result<SecretString> {
    // Priority 1: Direct value
    if let Some(value) = direct {
        if !value.is_empty() {
            return Ok(SecretString::from(value.to_string()));
        }
    }

    // Priority 2: File
    if let Some(path) = file_path {
        if !path.is_empty() {
            let expanded = expand_home(path);
            return match fs::read_to_string(&expanded) {
                Ok(content) => {
                    let trimmed = content.trim();
                    if trimmed.is_empty() {
                        return Err(SecretError::Empty {
                            origin: format!("file '{}'", expanded),
                        });
                    }
                    Ok(SecretString::from(trimmed.to_string()))
                }
                Err(e) => Err(SecretError::FileReadError {
                    path: expanded,
                    source: e,
                }),
            };
        }
    }

    // Priority 3: Environment variable
    if let Some(var_name) = env_var {
        if !var_name.is_empty() {
            return match std::env::var(var_name) {
                Ok(value) if !value.trim().is_empty() => {
                    Ok(SecretString::from(value.trim().to_string()))
                }
                // Set-but-blank is treated like unset.
                Ok(_) | Err(std::env::VarError::NotPresent) => Err(SecretError::EnvVarNotSet {
                    name: var_name.to_string(),
                }),
                Err(std::env::VarError::NotUnicode(_)) => Err(SecretError::EnvVarNotUnicode {
                    name: var_name.to_string(),
                }),
            };
        }
    }

    Err(SecretError::NoSourceProvided)
}

/// Resolves the scanner token configured in `pro`.
///
/// The pro tier is opt-in: an unset environment variable (or no configured
/// source at all) yields `Ok(None)`. A configured file that cannot be read is
/// still an error, since the operator explicitly asked for it.
pub fn resolve_scanner_token(pro: &ProConfig) -> Result<Option<SecretString>> {
    match resolve_secret(
        pro.token.as_deref(),
        pro.token_file.as_deref(),
        pro.token_env_var.as_deref(),
    ) {
        Ok(secret) => Ok(Some(secret)),
        Err(SecretError::NoSourceProvided) | Err(SecretError::EnvVarNotSet { .. }) => Ok(None),
        Err(e) => Err(e),
    }
}

/// Expands `~` to the user's home directory.
///
/// Only `~` and `~/path` are supported, not `~user/path`.
fn expand_home(path: &str) -> String {
    if path == "~" || path.starts_with("~/") {
        if let Some(home) = dirs::home_dir() {
            if path == "~" {
                return home.to_string_lossy().into_owned();
            }
            return path.replacen('~', &home.to_string_lossy(), 1);
        }
    }
    path.to_string()
}
