//! The closed directive grammar table.

use strum::{AsRefStr, Display, EnumIter, EnumString, IntoEnumIterator};

/// How a directive's payload is written after the `NAME:` separator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadShape {
    /// Plain text up to the closing bracket.
    Bare,
    /// A JSON object or array.
    Json,
    /// Either of the above.
    JsonOrBare,
}

/// Every directive name the model is allowed to emit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, EnumIter, AsRefStr)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum DirectiveName {
    TopicId,
    Confidence,
    Category,
    Progress,
    Unreleased,
    Milestone,
    Inventory,
    PanelUpdate,
    PanelModify,
    PanelDelete,
    Suggestions,
    GoalSet,
    GoalComplete,
}

impl DirectiveName {
    pub fn payload_shape(self) -> PayloadShape {
        match self {
            Self::TopicId
            | Self::Confidence
            | Self::Category
            | Self::Progress
            | Self::Unreleased
            | Self::GoalComplete => PayloadShape::Bare,
            Self::Milestone
            | Self::Inventory
            | Self::PanelUpdate
            | Self::PanelModify
            | Self::Suggestions => PayloadShape::Json,
            Self::PanelDelete | Self::GoalSet => PayloadShape::JsonOrBare,
        }
    }

    /// Flag-like directives may be written without a payload (`[GOAL_COMPLETE]`).
    pub fn allows_empty_payload(self) -> bool {
        matches!(self, Self::Unreleased | Self::GoalComplete)
    }

    pub fn lookup(name: &str) -> Option<Self> {
        name.parse().ok()
    }

    /// True when `fragment` could still grow into a directive name.
    pub fn is_prefix_of_any(fragment: &str) -> bool {
        Self::iter().any(|name| name.as_ref().starts_with(fragment))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_render_in_screaming_snake_case() {
        assert_eq!(DirectiveName::TopicId.to_string(), "TOPIC_ID");
        assert_eq!(DirectiveName::GoalComplete.as_ref(), "GOAL_COMPLETE");
    }

    #[test]
    fn test_lookup_is_exact() {
        assert_eq!(
            DirectiveName::lookup("PANEL_UPDATE"),
            Some(DirectiveName::PanelUpdate)
        );
        assert_eq!(DirectiveName::lookup("panel_update"), None);
        assert_eq!(DirectiveName::lookup("NOTE"), None);
    }

    #[test]
    fn test_prefix_detection() {
        assert!(DirectiveName::is_prefix_of_any("TOP"));
        assert!(DirectiveName::is_prefix_of_any(""));
        assert!(!DirectiveName::is_prefix_of_any("TOPX"));
    }
}
