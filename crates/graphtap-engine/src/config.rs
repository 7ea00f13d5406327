//! Tap configuration: YAML parsing with environment variable substitution.

use std::path::Path;
use std::sync::LazyLock;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

static ENV_VAR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("valid env var regex"));

/// Default Graph API base URL.
pub const DEFAULT_API_BASE: &str = "https://graph.facebook.com";

fn default_api_base() -> String {
    DEFAULT_API_BASE.to_string()
}

fn default_lookback_days() -> u32 {
    60
}

fn default_max_retries() -> u32 {
    3
}

fn default_timeout_seconds() -> u64 {
    30
}

/// Loaded tap configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TapConfig {
    /// Long-lived user access token; exchanged per account before any
    /// stream for that account begins.
    pub access_token: String,
    /// Account identifiers to replicate.
    pub user_ids: Vec<u64>,
    /// Incremental media requests re-read this many days behind the
    /// bookmark so late-arriving insight data is refreshed.
    #[serde(default = "default_lookback_days")]
    pub media_lookback_days: u32,
    /// Earliest record date to sync; overrides each stream's historical
    /// bound when later than it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_date: Option<DateTime<Utc>>,
    /// Optional User-Agent header.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    /// API base URL override (tests).
    #[serde(default = "default_api_base")]
    pub api_base: String,
    /// Maximum retry attempts for retryable request failures.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
}

impl Default for TapConfig {
    fn default() -> Self {
        Self {
            access_token: String::new(),
            user_ids: Vec::new(),
            media_lookback_days: default_lookback_days(),
            start_date: None,
            user_agent: None,
            api_base: default_api_base(),
            max_retries: default_max_retries(),
            timeout_seconds: default_timeout_seconds(),
        }
    }
}

impl TapConfig {
    /// Validate invariants that serde cannot express.
    ///
    /// # Errors
    ///
    /// Returns an error naming the first offending field.
    pub fn validate(&self) -> Result<()> {
        if self.access_token.trim().is_empty() {
            anyhow::bail!("access_token must not be empty");
        }
        if self.user_ids.is_empty() {
            anyhow::bail!("user_ids must list at least one account");
        }
        if self.timeout_seconds == 0 {
            anyhow::bail!("timeout_seconds must be positive");
        }
        Ok(())
    }
}

/// Substitute `${VAR_NAME}` patterns with environment variable values.
///
/// # Errors
///
/// Returns an error listing every referenced variable that is not set.
pub fn substitute_env_vars(input: &str) -> Result<String> {
    let mut result = input.to_string();
    let mut missing = Vec::new();

    for cap in ENV_VAR_RE.captures_iter(input) {
        let var_name = &cap[1];
        match std::env::var(var_name) {
            Ok(val) => {
                result = result.replace(&cap[0], &val);
            }
            Err(_) => {
                missing.push(var_name.to_string());
            }
        }
    }

    if !missing.is_empty() {
        anyhow::bail!("Missing environment variable(s): {}", missing.join(", "));
    }

    Ok(result)
}

/// Parse a tap YAML string (after env var substitution).
///
/// # Errors
///
/// Returns an error if substitution fails, the YAML is invalid, or
/// validation fails.
pub fn parse_config_str(yaml_str: &str) -> Result<TapConfig> {
    let substituted = substitute_env_vars(yaml_str)?;
    let config: TapConfig =
        serde_yaml::from_str(&substituted).context("Failed to parse tap config YAML")?;
    config.validate()?;
    Ok(config)
}

/// Parse a tap YAML file.
///
/// # Errors
///
/// Returns an error if the file cannot be read or the YAML is invalid.
pub fn parse_config(path: &Path) -> Result<TapConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    parse_config_str(&content)
}
