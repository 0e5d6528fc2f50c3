//! Engine configuration.
//!
//! ## Environment
//!
//! [`EngineConfig::from_env`] reads:
//! - `TEMPLATE_UNLINK_STRATEGY`: `exact` or `cascade` (default: exact)
//! - `TEMPLATE_FORBID_DOUBLE_LINKAGE`: `true` or `false` (default: false)
//!
//! Unparseable values fall back to the defaults.

use serde::{Deserialize, Serialize};
use crate::canonical::canonical_hash_hex;
use crate::DEFAULT_CONFIG_VERSION;

/// How closure rows are chosen for deletion when links are removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnlinkStrategy {
    /// Remove the unlinked parent and everything recorded above it, from the
    /// child and all its descendants, without checking other paths.
    Cascade,
    /// Like `Cascade`, but keep rows still reachable through surviving links.
    Exact,
}

impl UnlinkStrategy {
    /// Parse strategy from string.
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "cascade" => Some(Self::Cascade),
            "exact" => Some(Self::Exact),
            _ => None,
        }
    }
}

impl Default for UnlinkStrategy {
    fn default() -> Self {
        Self::Exact
    }
}

impl std::fmt::Display for UnlinkStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cascade => write!(f, "cascade"),
            Self::Exact => write!(f, "exact"),
        }
    }
}

/// Configuration of a [`crate::LinkEngine`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Configuration version identifier.
    pub version: String,
    /// Deletion strategy for removed links.
    pub unlink_strategy: UnlinkStrategy,
    /// Reject batches after which a node inherits a template twice.
    pub forbid_double_linkage: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            version: DEFAULT_CONFIG_VERSION.to_string(),
            unlink_strategy: UnlinkStrategy::default(),
            forbid_double_linkage: false,
        }
    }
}

impl EngineConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            unlink_strategy: std::env::var("TEMPLATE_UNLINK_STRATEGY")
                .ok()
                .and_then(|s| UnlinkStrategy::from_str(&s))
                .unwrap_or(defaults.unlink_strategy),
            forbid_double_linkage: std::env::var("TEMPLATE_FORBID_DOUBLE_LINKAGE")
                .ok()
                .and_then(|s| s.trim().parse().ok())
                .unwrap_or(defaults.forbid_double_linkage),
            ..defaults
        }
    }

    /// Configuration matching the original cascade semantics.
    pub fn cascade() -> Self {
        Self::default().with_unlink_strategy(UnlinkStrategy::Cascade)
    }

    /// Set the unlink strategy.
    pub fn with_unlink_strategy(mut self, strategy: UnlinkStrategy) -> Self {
        self.unlink_strategy = strategy;
        self
    }

    /// Enable or disable the double-linkage check.
    pub fn with_forbid_double_linkage(mut self, forbid: bool) -> Self {
        self.forbid_double_linkage = forbid;
        self
    }

    /// Hash of the configuration, for logs and audit reports.
    pub fn params_hash(&self) -> String {
        canonical_hash_hex(self)
    }
}
