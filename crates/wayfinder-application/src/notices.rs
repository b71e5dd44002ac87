//! User-facing texts written into threads by the engine.

use std::time::Duration;
use wayfinder_core::quota::{QueryKind, UsageSnapshot};

pub const CANCELLED_TEXT: &str = "Response cancelled.";

pub fn upgrade_prompt(kind: QueryKind, usage: &UsageSnapshot) -> String {
    let limit = match kind {
        QueryKind::Text => usage.text_limit,
        QueryKind::Image => usage.image_limit,
    };
    format!(
        "You've used all {} free {} questions this month. Upgrade to keep exploring.",
        limit, kind
    )
}

pub fn resting(remaining: Duration) -> String {
    let minutes = remaining.as_secs().div_ceil(60).max(1);
    format!(
        "Wayfinder is resting after hitting the provider's rate limit. Try again in about {} minute{}.",
        minutes,
        if minutes == 1 { "" } else { "s" }
    )
}

pub fn failure(error: &str) -> String {
    format!("Sorry, something went wrong: {}", error)
}

pub fn panel_exists(slug: &str) -> String {
    if slug.is_empty() {
        "That panel title can't be used. Overwrite the existing panel or dismiss the suggestion."
            .to_string()
    } else {
        format!(
            "A panel called '{}' already exists. Overwrite it or dismiss the suggestion.",
            slug
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wayfinder_core::quota::Tier;

    #[test]
    fn test_resting_rounds_up_to_minutes() {
        assert!(resting(Duration::from_secs(61)).contains("about 2 minutes"));
        assert!(resting(Duration::from_secs(5)).contains("about 1 minute."));
    }

    #[test]
    fn test_upgrade_prompt_names_the_limit() {
        let usage = UsageSnapshot {
            tier: Tier::Free,
            text_count: 55,
            text_limit: 55,
            image_count: 0,
            image_limit: 5,
        };
        assert_eq!(
            upgrade_prompt(QueryKind::Text, &usage),
            "You've used all 55 free text questions this month. Upgrade to keep exploring."
        );
    }
}
