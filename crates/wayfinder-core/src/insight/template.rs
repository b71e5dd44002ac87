//! Per-category panel templates.

use std::str::FromStr;
use strum::EnumString;

/// A panel created when a thread's category becomes known.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PanelTemplate {
    pub id: &'static str,
    pub title: &'static str,
    pub instruction: &'static str,
    pub search_grounded: bool,
}

/// Panel id whose content is injected into the prompt as story context.
pub const STORY_SO_FAR_PANEL_ID: &str = "story-so-far";

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString)]
#[strum(ascii_case_insensitive)]
enum KnownCategory {
    #[strum(serialize = "rpg", serialize = "jrpg", serialize = "role-playing")]
    Rpg,
    Strategy,
    Action,
    Puzzle,
}

const RPG: &[PanelTemplate] = &[
    PanelTemplate {
        id: STORY_SO_FAR_PANEL_ID,
        title: "Story So Far",
        instruction: "Summarize the story events the player has reached so far. Do not reveal anything beyond their current progress.",
        search_grounded: false,
    },
    PanelTemplate {
        id: "character-builds",
        title: "Character Builds",
        instruction: "Recommend party or character builds that suit the player's current progress, with brief reasoning.",
        search_grounded: true,
    },
    PanelTemplate {
        id: "side-quests",
        title: "Side Quests",
        instruction: "List worthwhile side quests available around the player's current progress and what they reward.",
        search_grounded: true,
    },
];

const STRATEGY: &[PanelTemplate] = &[
    PanelTemplate {
        id: "build-orders",
        title: "Build Orders",
        instruction: "Give strong opening build orders for the player's current situation.",
        search_grounded: true,
    },
    PanelTemplate {
        id: "unit-counters",
        title: "Unit Counters",
        instruction: "Explain which units or tactics counter the threats the player is facing.",
        search_grounded: true,
    },
    PanelTemplate {
        id: "economy-tips",
        title: "Economy Tips",
        instruction: "Give concise resource and economy management tips.",
        search_grounded: false,
    },
];

const ACTION: &[PanelTemplate] = &[
    PanelTemplate {
        id: "boss-patterns",
        title: "Boss Patterns",
        instruction: "Describe the attack patterns of the next boss and how to punish them.",
        search_grounded: true,
    },
    PanelTemplate {
        id: "combos",
        title: "Combos & Techniques",
        instruction: "List useful combos and movement techniques for the player's current loadout.",
        search_grounded: false,
    },
    PanelTemplate {
        id: "upgrade-path",
        title: "Upgrade Path",
        instruction: "Recommend which upgrades to prioritize next.",
        search_grounded: true,
    },
];

const PUZZLE: &[PanelTemplate] = &[
    PanelTemplate {
        id: "current-puzzle",
        title: "Current Puzzle",
        instruction: "Restate the puzzle the player is stuck on and the rules that apply to it.",
        search_grounded: false,
    },
    PanelTemplate {
        id: "hint-ladder",
        title: "Hint Ladder",
        instruction: "Give a ladder of progressively stronger hints, ending just short of the full solution.",
        search_grounded: false,
    },
    PanelTemplate {
        id: "collectibles",
        title: "Collectibles",
        instruction: "List collectibles in the current area and where to find them.",
        search_grounded: true,
    },
];

const DEFAULT: &[PanelTemplate] = &[
    PanelTemplate {
        id: "overview",
        title: "Overview",
        instruction: "Give a short overview of where the player is and what they should focus on next.",
        search_grounded: false,
    },
    PanelTemplate {
        id: "tips",
        title: "Tips",
        instruction: "List practical tips for the player's current situation.",
        search_grounded: true,
    },
    PanelTemplate {
        id: "secrets",
        title: "Secrets",
        instruction: "Mention optional secrets nearby without spoiling story events.",
        search_grounded: true,
    },
];

/// Returns the template set for `category`, falling back to the default set.
pub fn templates_for(category: &str) -> &'static [PanelTemplate] {
    match KnownCategory::from_str(category.trim()) {
        Ok(KnownCategory::Rpg) => RPG,
        Ok(KnownCategory::Strategy) => STRATEGY,
        Ok(KnownCategory::Action) => ACTION,
        Ok(KnownCategory::Puzzle) => PUZZLE,
        Err(_) => DEFAULT,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_lookup_is_case_insensitive() {
        assert_eq!(templates_for("RPG"), RPG);
        assert_eq!(templates_for("rpg"), RPG);
        assert_eq!(templates_for(" Puzzle "), PUZZLE);
    }

    #[test]
    fn test_unknown_category_uses_default_set() {
        assert_eq!(templates_for("Rhythm"), DEFAULT);
    }

    #[test]
    fn test_every_set_has_three_unique_panels() {
        for set in [RPG, STRATEGY, ACTION, PUZZLE, DEFAULT] {
            assert_eq!(set.len(), 3);
            let mut ids: Vec<_> = set.iter().map(|t| t.id).collect();
            ids.dedup();
            assert_eq!(ids.len(), 3);
        }
    }
}
