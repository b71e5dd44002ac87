//! Usage tiers and the pure quota decision.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Subscription tier of the current user.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Tier {
    #[default]
    Free,
    Plus,
    Premium,
}

impl Tier {
    /// Premium dispatches use the single-shot completion instead of streaming.
    pub fn prefers_single_shot(self) -> bool {
        matches!(self, Tier::Premium)
    }
}

/// Counted operation type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum QueryKind {
    Text,
    Image,
}

/// Current monthly usage and limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageSnapshot {
    pub tier: Tier,
    pub text_count: u32,
    pub text_limit: u32,
    pub image_count: u32,
    pub image_limit: u32,
}

impl UsageSnapshot {
    pub fn remaining(&self, kind: QueryKind) -> u32 {
        match kind {
            QueryKind::Text => self.text_limit.saturating_sub(self.text_count),
            QueryKind::Image => self.image_limit.saturating_sub(self.image_count),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuotaDecision {
    Allowed,
    LimitReached { kind: QueryKind },
}

impl QuotaDecision {
    pub fn is_allowed(self) -> bool {
        matches!(self, QuotaDecision::Allowed)
    }
}

/// Decides whether a send with `image_count` images may be dispatched.
///
/// Every send counts as one text query plus one image query per image. Only
/// the free tier is ever refused.
pub fn evaluate(snapshot: &UsageSnapshot, image_count: u32) -> QuotaDecision {
    if snapshot.tier != Tier::Free {
        return QuotaDecision::Allowed;
    }
    if snapshot.remaining(QueryKind::Text) < 1 {
        return QuotaDecision::LimitReached {
            kind: QueryKind::Text,
        };
    }
    if image_count > 0 && snapshot.remaining(QueryKind::Image) < image_count {
        return QuotaDecision::LimitReached {
            kind: QueryKind::Image,
        };
    }
    QuotaDecision::Allowed
}
