//! Pipeline configuration.
//!
//! Configuration is loaded from a TOML file at:
//! 1. `$MAILSCRUB_CONFIG` (environment variable)
//! 2. `~/.config/mailscrub/config.toml` (Linux/macOS)
//!    `%APPDATA%\mailscrub\config.toml` (Windows)
//! 3. Built-in defaults

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, ScrubError};

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General behavior settings.
    pub general: GeneralConfig,
    /// Resource limits protecting the pipeline against runaway input.
    pub limits: LimitsConfig,
    /// Address rewriting and mapping.
    pub address: AddressConfig,
    /// Content inspection tables.
    pub inspect: InspectConfig,
}

/// General behavior settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Generate a local failure notification for undeliverable messages
    /// instead of returning the raw status to the caller.
    pub bounce_on_error: bool,
    /// Seconds after posting at which a delay warning is scheduled
    /// (0 disables the warning record).
    pub delay_warn_time: u64,
    /// Blind-carbon-copy address appended to every delivered message.
    pub always_bcc: Option<String>,
    /// Content filter transport the next stage should hand the message to.
    pub content_filter: Option<String>,
    /// Redirect all delivery of every message to this address.
    pub redirect_recipient: Option<String>,
    /// Log level: "error", "warn", "info", "debug", "trace".
    pub log_level: String,
}

/// Resource limits guarding the pipeline against runaway input.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Maximum payload length of a single record, in bytes.
    pub line_length_limit: u32,
    /// Maximum accumulated size of one logical (folded) header, in bytes.
    pub header_size_limit: usize,
    /// Maximum number of Received: headers before the message is
    /// considered to be looping.
    pub hopcount_limit: u32,
    /// Capacity of the duplicate-recipient filter. Past this many
    /// distinct recipients, deduplication degrades gracefully.
    pub duplicate_filter_limit: usize,
    /// Maximum expansion depth for one seed address in a one-to-many map.
    pub expansion_recursion_limit: usize,
    /// Maximum total number of addresses produced by expanding one seed.
    pub expansion_fanout_limit: usize,
    /// Maximum number of envelope recipients extracted from headers when
    /// the envelope itself carried none.
    pub extract_recipient_limit: usize,
}

/// Address rewriting and mapping.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AddressConfig {
    /// Domain appended to unqualified addresses. Defaults to the local
    /// hostname when empty.
    pub origin_domain: String,
    /// Domains to which addresses are masqueraded (subdomain detail
    /// stripped). Empty disables masquerading.
    pub masquerade_domains: Vec<String>,
    /// Local parts exempt from masquerading (exposed users).
    pub masquerade_exceptions: Vec<String>,
    /// Canonical mapping applied to all addresses (one-to-one).
    pub canonical_map: Option<PathBuf>,
    /// Canonical mapping applied to recipients only (one-to-one).
    pub recipient_canonical_map: Option<PathBuf>,
    /// Canonical mapping applied to senders only (one-to-one).
    pub sender_canonical_map: Option<PathBuf>,
    /// Virtual alias mapping (one-to-many).
    pub virtual_alias_map: Option<PathBuf>,
}

/// Content inspection tables.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct InspectConfig {
    /// Rule file applied to each logical header.
    pub header_checks: Option<PathBuf>,
    /// Rule file applied to each body line.
    pub body_checks: Option<PathBuf>,
}

// ── Default implementations ─────────────────────────────────────

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            bounce_on_error: false,
            delay_warn_time: 0,
            always_bcc: None,
            content_filter: None,
            redirect_recipient: None,
            log_level: "warn".to_string(),
        }
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            line_length_limit: 2048,
            header_size_limit: 102_400,
            hopcount_limit: 50,
            duplicate_filter_limit: 1000,
            expansion_recursion_limit: 1000,
            expansion_fanout_limit: 1000,
            extract_recipient_limit: 10_240,
        }
    }
}

impl Default for AddressConfig {
    fn default() -> Self {
        Self {
            origin_domain: String::new(),
            masquerade_domains: Vec::new(),
            masquerade_exceptions: Vec::new(),
            canonical_map: None,
            recipient_canonical_map: None,
            sender_canonical_map: None,
            virtual_alias_map: None,
        }
    }
}

// ── Loading ─────────────────────────────────────────────────────

impl Config {
    /// Load configuration following the documented precedence chain.
    pub fn load() -> Result<Self> {
        if let Ok(path) = std::env::var("MAILSCRUB_CONFIG") {
            return Self::load_from(Path::new(&path));
        }
        if let Some(dir) = dirs::config_dir() {
            let path = dir.join("mailscrub").join("config.toml");
            if path.exists() {
                return Self::load_from(&path);
            }
        }
        Ok(Self::default())
    }

    /// Load configuration from a specific TOML file.
    pub fn load_from(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| ScrubError::io(path, e))?;
        let config: Config =
            toml::from_str(&text).map_err(|e| ScrubError::BadConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations that would disable the pipeline's safety caps.
    fn validate(&self) -> Result<()> {
        if self.limits.line_length_limit == 0 {
            return Err(ScrubError::BadConfig(
                "line_length_limit must be positive".into(),
            ));
        }
        if self.limits.duplicate_filter_limit == 0 {
            return Err(ScrubError::BadConfig(
                "duplicate_filter_limit must be positive".into(),
            ));
        }
        if self.limits.expansion_recursion_limit == 0 || self.limits.expansion_fanout_limit == 0 {
            return Err(ScrubError::BadConfig(
                "expansion limits must be positive".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_documented_limits() {
        let config = Config::default();
        assert_eq!(config.limits.line_length_limit, 2048);
        assert_eq!(config.limits.header_size_limit, 102_400);
        assert_eq!(config.limits.hopcount_limit, 50);
        assert_eq!(config.limits.duplicate_filter_limit, 1000);
        assert_eq!(config.limits.extract_recipient_limit, 10_240);
        assert!(!config.general.bounce_on_error);
        assert!(config.general.always_bcc.is_none());
    }

    #[test]
    fn test_parse_partial_toml() {
        let text = r#"
            [general]
            bounce_on_error = true

            [limits]
            hopcount_limit = 25
        "#;
        let config: Config = toml::from_str(text).unwrap();
        assert!(config.general.bounce_on_error);
        assert_eq!(config.limits.hopcount_limit, 25);
        // Untouched sections keep their defaults
        assert_eq!(config.limits.line_length_limit, 2048);
    }

    #[test]
    fn test_validate_rejects_zero_caps() {
        let mut config = Config::default();
        config.limits.expansion_fanout_limit = 0;
        assert!(config.validate().is_err());
    }
}
