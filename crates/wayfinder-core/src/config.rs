//! Engine configuration model.
//!
//! Loaded from `config.toml` by the infrastructure layer; every field has a
//! default so a missing or partial file is valid.

use crate::quota::Tier;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Monthly usage limits for a single tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierLimits {
    pub text_limit: u32,
    pub image_limit: u32,
}

/// Per-tier monthly limits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaConfig {
    #[serde(default = "default_free_limits")]
    pub free: TierLimits,
    #[serde(default = "default_plus_limits")]
    pub plus: TierLimits,
    #[serde(default = "default_premium_limits")]
    pub premium: TierLimits,
}

impl QuotaConfig {
    pub fn limits_for(&self, tier: Tier) -> TierLimits {
        match tier {
            Tier::Free => self.free,
            Tier::Plus => self.plus,
            Tier::Premium => self.premium,
        }
    }
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self {
            free: default_free_limits(),
            plus: default_plus_limits(),
            premium: default_premium_limits(),
        }
    }
}

fn default_free_limits() -> TierLimits {
    TierLimits {
        text_limit: 55,
        image_limit: 5,
    }
}

fn default_plus_limits() -> TierLimits {
    TierLimits {
        text_limit: 1_500,
        image_limit: 150,
    }
}

fn default_premium_limits() -> TierLimits {
    TierLimits {
        text_limit: 5_000,
        image_limit: 500,
    }
}

/// Top-level engine configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Trailing quiet period before the thread tree is written.
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
    /// Serialized size above which a persistence warning is logged.
    #[serde(default = "default_soft_size_limit_bytes")]
    pub soft_size_limit_bytes: usize,
    /// Length of the provider rate-limit cooldown.
    #[serde(default = "default_cooldown_secs")]
    pub cooldown_secs: u64,
    /// Number of prior exchanges sent as history.
    #[serde(default = "default_history_window")]
    pub history_window: usize,
    /// Provider model name.
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default)]
    pub quota: QuotaConfig,
}

impl EngineConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
            soft_size_limit_bytes: default_soft_size_limit_bytes(),
            cooldown_secs: default_cooldown_secs(),
            history_window: default_history_window(),
            model: default_model(),
            quota: QuotaConfig::default(),
        }
    }
}

fn default_debounce_ms() -> u64 {
    500
}

fn default_soft_size_limit_bytes() -> usize {
    4_500_000
}

fn default_cooldown_secs() -> u64 {
    3_600
}

fn default_history_window() -> usize {
    20
}

fn default_model() -> String {
    "gemini-2.5-flash".to_string()
}
