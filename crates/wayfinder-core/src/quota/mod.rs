//! Tiered usage quota and provider cooldown.

pub mod model;
pub mod repository;

pub use model::{evaluate, QueryKind, QuotaDecision, Tier, UsageSnapshot};
pub use repository::{CooldownRepository, CooldownState, UsageStore};
