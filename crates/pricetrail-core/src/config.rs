#![forbid(unsafe_code)]

//! Tunables as data.
//!
//! [`LensConfig`] gathers every knob of the render lifecycle and the lazy
//! loader. Differences between deployments (which providers to show, whether
//! a privileged proxy exists, how aggressive the throttle is) are expressed
//! here instead of in code.
//!
//! ```toml
//! throttle_window_ms = 300
//! proxy_fallback = false
//!
//! [[providers]]
//! name = "keepa"
//! label = "Keepa:"
//! image_template = "https://graph.keepa.com/pricehistory.png?domain={domain}&asin={asin}"
//! link_template = "https://keepa.com/#!product/{domain}-{asin}"
//! alt_text = "Price history"
//! ```
//!
//! Every field has a default, so a partial file only overrides what it names.

use std::path::Path;

use core::time::Duration;

use serde::{Deserialize, Serialize};

use crate::provider::ProviderConfig;

/// Errors produced while loading or validating a [`LensConfig`].
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("config JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("config TOML error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("invalid config: {}", .0.join("; "))]
    Invalid(Vec<String>),
}

/// Complete runtime configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LensConfig {
    /// Class carried by the panel container; at most one such element exists.
    pub marker_class: String,
    /// Root attribute used as the process guard.
    pub guard_attribute: String,
    /// Minimum interval between reconciles triggered by page changes.
    pub throttle_window_ms: u64,
    /// Delay after a navigation before the page is measured.
    pub navigation_settle_ms: u64,
    /// Viewport lookahead before an image counts as near-visible.
    pub lookahead_margin_px: u32,
    /// Deadline for the direct image load.
    pub load_deadline_ms: u64,
    /// Deadline for the privileged proxy round trip.
    pub proxy_deadline_ms: u64,
    /// Upper bound hosts should pass to idle scheduling.
    pub idle_timeout_ms: u64,
    /// Whether to ask a privileged context to fetch blocked charts.
    pub proxy_fallback: bool,
    /// Chart providers, one panel section each.
    pub providers: Vec<ProviderConfig>,
}

impl Default for LensConfig {
    fn default() -> Self {
        Self {
            marker_class: "pricetrail-panel".into(),
            guard_attribute: "data-pricetrail-active".into(),
            throttle_window_ms: 250,
            navigation_settle_ms: 50,
            lookahead_margin_px: 200,
            load_deadline_ms: 2000,
            proxy_deadline_ms: 10_000,
            idle_timeout_ms: 1000,
            proxy_fallback: true,
            providers: vec![ProviderConfig::keepa()],
        }
    }
}

impl LensConfig {
    pub fn from_json_str(s: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(s)?)
    }

    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(s)?)
    }

    /// Load a `.toml` or `.json` file, picking the format by extension.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => Self::from_json_str(&content),
            _ => Self::from_toml_str(&content),
        }
    }

    /// Every problem with this config; empty means valid.
    #[must_use]
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if !is_css_identifier(&self.marker_class) {
            errors.push(format!(
                "marker_class must be a CSS identifier, got {:?}",
                self.marker_class
            ));
        }
        if !self.guard_attribute.starts_with("data-")
            || !is_css_identifier(&self.guard_attribute)
        {
            errors.push(format!(
                "guard_attribute must be a data- attribute, got {:?}",
                self.guard_attribute
            ));
        }
        if self.throttle_window_ms == 0 {
            errors.push("throttle_window_ms must be > 0".into());
        }
        if self.load_deadline_ms == 0 {
            errors.push("load_deadline_ms must be > 0".into());
        }
        if self.proxy_fallback && self.proxy_deadline_ms == 0 {
            errors.push("proxy_deadline_ms must be > 0 when proxy_fallback is on".into());
        }
        if self.providers.is_empty() {
            errors.push("providers must not be empty".into());
        }
        for (idx, provider) in self.providers.iter().enumerate() {
            errors.extend(provider.problems(&format!("providers[{idx}]")));
        }

        errors
    }

    /// Validate and return `self`, or every problem as one error.
    pub fn validated(self) -> Result<Self, ConfigError> {
        let errors = self.validate();
        if errors.is_empty() {
            Ok(self)
        } else {
            Err(ConfigError::Invalid(errors))
        }
    }

    #[must_use]
    pub fn throttle_window(&self) -> Duration {
        Duration::from_millis(self.throttle_window_ms)
    }

    #[must_use]
    pub fn navigation_settle(&self) -> Duration {
        Duration::from_millis(self.navigation_settle_ms)
    }

    #[must_use]
    pub fn load_deadline(&self) -> Duration {
        Duration::from_millis(self.load_deadline_ms)
    }

    #[must_use]
    pub fn proxy_deadline(&self) -> Duration {
        Duration::from_millis(self.proxy_deadline_ms)
    }

    #[must_use]
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_timeout_ms)
    }

    /// `IntersectionObserver` root margin string, e.g. `"200px"`.
    #[must_use]
    pub fn root_margin(&self) -> String {
        format!("{}px", self.lookahead_margin_px)
    }

    /// Lower-cased image hosts of every provider.
    #[must_use]
    pub fn image_hosts(&self) -> Vec<String> {
        let mut hosts: Vec<String> = self
            .providers
            .iter()
            .filter_map(ProviderConfig::image_host)
            .collect();
        hosts.sort();
        hosts.dedup();
        hosts
    }
}

fn is_css_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}
