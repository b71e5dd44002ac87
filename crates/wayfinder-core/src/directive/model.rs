//! Directive payload types.

use serde::{Deserialize, Serialize};

/// Confidence attached to a topic identification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    High,
    Low,
}

/// A progress milestone reported by the model (boss defeated, chapter reached...).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Milestone {
    #[serde(rename = "type")]
    pub kind: String,
    pub name: String,
}

/// One entry of an inventory snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "RawInventoryItem")]
pub struct InventoryItem {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quantity: Option<u32>,
}

/// Inventory entries arrive either as plain names or as objects.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawInventoryItem {
    Name(String),
    Detailed {
        name: String,
        #[serde(default)]
        quantity: Option<u32>,
    },
}

impl From<RawInventoryItem> for InventoryItem {
    fn from(raw: RawInventoryItem) -> Self {
        match raw {
            RawInventoryItem::Name(name) => Self {
                name,
                quantity: None,
            },
            RawInventoryItem::Detailed { name, quantity } => Self { name, quantity },
        }
    }
}

/// A typed control directive extracted from model output.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Directive {
    TopicIdentified {
        name: String,
        confidence: Confidence,
    },
    Category {
        name: String,
    },
    ProgressEstimate {
        value: u8,
    },
    UnreleasedFlag,
    Milestone(Milestone),
    InventorySnapshot {
        items: Vec<InventoryItem>,
    },
    PanelUpdate {
        panel_id: String,
        content_delta: String,
    },
    PanelModifyRequest {
        panel_id: String,
        proposed_title: String,
        proposed_content: String,
    },
    PanelDeleteRequest {
        panel_id: String,
    },
    GoalSet {
        description: String,
    },
    GoalComplete,
    SuggestedFollowUps {
        suggestions: Vec<String>,
    },
}

/// The deduplicated directives of one model response.
///
/// Single-valued directives (topic, category, progress...) resolve to the last
/// occurrence in the buffer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DirectiveSet {
    directives: Vec<Directive>,
}

impl DirectiveSet {
    pub fn new(directives: impl IntoIterator<Item = Directive>) -> Self {
        let mut unique: Vec<Directive> = Vec::new();
        for directive in directives {
            if !unique.contains(&directive) {
                unique.push(directive);
            }
        }
        Self { directives: unique }
    }

    pub fn is_empty(&self) -> bool {
        self.directives.is_empty()
    }

    pub fn len(&self) -> usize {
        self.directives.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Directive> {
        self.directives.iter()
    }

    pub fn topic(&self) -> Option<(&str, Confidence)> {
        self.directives.iter().rev().find_map(|d| match d {
            Directive::TopicIdentified { name, confidence } => Some((name.as_str(), *confidence)),
            _ => None,
        })
    }

    pub fn category(&self) -> Option<&str> {
        self.directives.iter().rev().find_map(|d| match d {
            Directive::Category { name } => Some(name.as_str()),
            _ => None,
        })
    }

    pub fn progress(&self) -> Option<u8> {
        self.directives.iter().rev().find_map(|d| match d {
            Directive::ProgressEstimate { value } => Some(*value),
            _ => None,
        })
    }

    pub fn inventory(&self) -> Option<&[InventoryItem]> {
        self.directives.iter().rev().find_map(|d| match d {
            Directive::InventorySnapshot { items } => Some(items.as_slice()),
            _ => None,
        })
    }

    pub fn suggestions(&self) -> Option<&[String]> {
        self.directives.iter().rev().find_map(|d| match d {
            Directive::SuggestedFollowUps { suggestions } => Some(suggestions.as_slice()),
            _ => None,
        })
    }

    pub fn milestone(&self) -> Option<&Milestone> {
        self.directives.iter().rev().find_map(|d| match d {
            Directive::Milestone(milestone) => Some(milestone),
            _ => None,
        })
    }

    pub fn is_unreleased(&self) -> bool {
        self.directives
            .iter()
            .any(|d| matches!(d, Directive::UnreleasedFlag))
    }
}

impl IntoIterator for DirectiveSet {
    type Item = Directive;
    type IntoIter = std::vec::IntoIter<Directive>;

    fn into_iter(self) -> Self::IntoIter {
        self.directives.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inventory_accepts_names_and_objects() {
        let items: Vec<InventoryItem> =
            serde_json::from_str(r#"["Rope", {"name": "Potion", "quantity": 3}]"#).unwrap();
        assert_eq!(items[0].name, "Rope");
        assert_eq!(items[0].quantity, None);
        assert_eq!(items[1].quantity, Some(3));
    }

    #[test]
    fn test_directive_set_deduplicates_and_keeps_last_single_value() {
        let set = DirectiveSet::new(vec![
            Directive::ProgressEstimate { value: 10 },
            Directive::GoalComplete,
            Directive::GoalComplete,
            Directive::ProgressEstimate { value: 20 },
        ]);
        assert_eq!(set.len(), 3);
        assert_eq!(set.progress(), Some(20));
    }
}
