//! Prompt composition.
//!
//! System instructions are rendered from a minijinja template. Thread
//! context (goal, story so far, inventory) travels as `::meta::` prefix lines
//! in front of the user's message so it never reaches visible text.

use minijinja::{context, Environment};
use wayfinder_core::insight::{InsightPanel, PanelStatus, STORY_SO_FAR_PANEL_ID};
use wayfinder_core::thread::{EntryStatus, Thread};
use wayfinder_core::{Result, WayfinderError};
use wayfinder_interaction::HistoryTurn;

/// Prefix marking a hidden context line.
pub const META_PREFIX: &str = "::meta::";

const SYSTEM_TEMPLATE: &str = r#"You are Wayfinder, a spoiler-aware companion for video games.
Answer the player's question directly and concisely.
{% if topic %}The player is playing {{ topic }}{% if category %} ({{ category }}){% endif %}, roughly {{ progress }}% through.
{% endif %}Lines starting with {{ meta_prefix }} are context from the app, not from the player. Never quote them.

Besides your answer, emit control tags. They are removed before the player sees the text.
- [TOPIC_ID: <game title>] and [CONFIDENCE: high|low] once you know which game the player means.
- [CATEGORY: <RPG|Strategy|Action|Puzzle|other genre>]
- [PROGRESS: <0-100>] your estimate of the player's progress.
- [UNRELEASED: true] if the game is not publicly released yet.
- [MILESTONE: {"type": "...", "name": "..."}] when the player reaches a notable milestone.
- [INVENTORY: [...]] the player's current inventory when they describe it.
- [PANEL_UPDATE: {"id": "...", "content": "..."}] to add to an insight panel.
{% if panels %}  Current panels: {% for panel in panels %}{{ panel }}{% if not loop.last %}, {% endif %}{% endfor %}.
{% endif %}- [PANEL_MODIFY: {"id": "...", "title": "...", "content": "..."}] to propose rewriting a panel.
- [PANEL_DELETE: {"id": "..."}] to propose removing a panel.
- [GOAL_SET: {"description": "..."}] and [GOAL_COMPLETE: true] to track the player's current goal.
- [SUGGESTIONS: ["...", "...", "..."]] up to three short follow-up questions."#;

const PANEL_TEMPLATE: &str = r#"You are Wayfinder, a spoiler-aware companion for video games.
You are writing the "{{ title }}" panel for {{ topic }}{% if category %} ({{ category }}){% endif %}.
The player is roughly {{ progress }}% through the game. Do not reveal anything beyond that point.
{{ instruction }}
Reply with the panel content only, without control tags."#;

pub struct PromptComposer {
    env: Environment<'static>,
    history_window: usize,
}

impl PromptComposer {
    pub fn new(history_window: usize) -> Result<Self> {
        let mut env = Environment::new();
        env.add_template("system", SYSTEM_TEMPLATE)
            .map_err(|e| WayfinderError::internal(format!("Invalid system template: {}", e)))?;
        env.add_template("panel", PANEL_TEMPLATE)
            .map_err(|e| WayfinderError::internal(format!("Invalid panel template: {}", e)))?;
        Ok(Self {
            env,
            history_window,
        })
    }

    /// Renders the system instructions for a conversation turn in `thread`.
    pub fn system_instructions(&self, thread: &Thread) -> Result<String> {
        let panels: Vec<&str> = thread.insights.ordered().map(|p| p.id.as_str()).collect();
        self.render(
            "system",
            context! {
                topic => &thread.topic_name,
                category => &thread.category,
                progress => thread.progress,
                panels => &panels,
                meta_prefix => META_PREFIX,
            },
        )
    }

    /// Renders the instructions for an on-demand refresh of `panel`.
    pub fn panel_instructions(&self, thread: &Thread, panel: &InsightPanel) -> Result<String> {
        self.render(
            "panel",
            context! {
                title => &panel.title,
                topic => thread.topic_name.as_deref().unwrap_or(&thread.title),
                category => &thread.category,
                progress => thread.progress,
                instruction => &panel.instruction,
            },
        )
    }

    /// The hidden context lines for `thread`.
    pub fn meta_lines(&self, thread: &Thread) -> Vec<String> {
        let mut lines = Vec::new();
        if let Some(goal) = thread.active_goal() {
            lines.push(format!("{} Active goal: {}", META_PREFIX, goal.description));
        }
        if let Some(story) = thread
            .insights
            .panel(STORY_SO_FAR_PANEL_ID)
            .filter(|panel| panel.status == PanelStatus::Loaded && !panel.content.trim().is_empty())
        {
            lines.push(format!(
                "{} Story so far: {}",
                META_PREFIX,
                single_line(&story.content)
            ));
        }
        if !thread.inventory.is_empty() {
            let items: Vec<String> = thread
                .inventory
                .iter()
                .map(|item| match item.quantity {
                    Some(quantity) => format!("{} x{}", item.name, quantity),
                    None => item.name.clone(),
                })
                .collect();
            lines.push(format!("{} Inventory: {}", META_PREFIX, items.join(", ")));
        }
        lines
    }

    /// Prefixes the user's text with the thread's meta lines.
    pub fn compose_message(&self, thread: &Thread, user_text: &str) -> String {
        let meta = self.meta_lines(thread);
        if meta.is_empty() {
            user_text.to_string()
        } else {
            format!("{}\n\n{}", meta.join("\n"), user_text)
        }
    }

    /// Prior completed exchanges of `thread`, oldest first, capped at the
    /// configured window.
    pub fn history(&self, thread: &Thread) -> Vec<HistoryTurn> {
        let completed: Vec<_> = thread
            .exchanges
            .iter()
            .filter(|exchange| exchange.model.status == EntryStatus::Complete)
            .collect();
        let skip = completed.len().saturating_sub(self.history_window);
        completed
            .into_iter()
            .skip(skip)
            .flat_map(|exchange| {
                [
                    HistoryTurn::user(exchange.user.text.clone()),
                    HistoryTurn::model(exchange.model.text.clone()),
                ]
            })
            .collect()
    }

    fn render(&self, name: &str, ctx: minijinja::Value) -> Result<String> {
        self.env
            .get_template(name)
            .and_then(|template| template.render(ctx))
            .map_err(|e| {
                WayfinderError::internal(format!("Failed to render {} prompt: {}", name, e))
            })
    }
}

fn single_line(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use wayfinder_core::directive::InventoryItem;
    use wayfinder_core::thread::{ActiveGoal, Exchange};

    fn composer() -> PromptComposer {
        PromptComposer::new(2).unwrap()
    }

    fn topic_thread() -> Thread {
        let mut thread = Thread::new("shadow-realm", "Shadow Realm", Utc::now());
        thread.topic_name = Some("Shadow Realm".to_string());
        thread.category = Some("RPG".to_string());
        thread.progress = 40;
        thread
    }

    #[test]
    fn test_system_instructions_mention_topic_and_grammar() {
        let mut thread = topic_thread();
        thread.insights.seed("RPG");
        let text = composer().system_instructions(&thread).unwrap();
        assert!(text.contains("Shadow Realm (RPG), roughly 40% through"));
        assert!(text.contains("[TOPIC_ID: <game title>]"));
        assert!(text.contains("story-so-far, character-builds, side-quests"));
    }

    #[test]
    fn test_meta_lines_cover_goal_story_and_inventory() {
        let mut thread = topic_thread();
        thread.insights.seed("RPG");
        thread
            .insights
            .apply_update(STORY_SO_FAR_PANEL_ID, "The gate\nopened.");
        thread.goal = Some(ActiveGoal {
            description: "Find the moon key".to_string(),
            completed: false,
        });
        thread.inventory = vec![
            InventoryItem {
                name: "Lantern".to_string(),
                quantity: None,
            },
            InventoryItem {
                name: "Ether".to_string(),
                quantity: Some(2),
            },
        ];

        let message = composer().compose_message(&thread, "What now?");
        assert_eq!(
            message,
            "::meta:: Active goal: Find the moon key\n\
             ::meta:: Story so far: The gate opened.\n\
             ::meta:: Inventory: Lantern, Ether x2\n\
             \n\
             What now?"
        );
    }

    #[test]
    fn test_message_without_context_is_unchanged() {
        let thread = Thread::catch_all(Utc::now());
        assert_eq!(composer().compose_message(&thread, "help"), "help");
    }

    #[test]
    fn test_history_keeps_last_completed_exchanges() {
        let mut thread = topic_thread();
        for text in ["one", "two", "three"] {
            let mut exchange = Exchange::begin(text, Vec::new(), false, Utc::now());
            exchange.model.text = format!("re: {}", text);
            exchange.model.status = EntryStatus::Complete;
            thread.exchanges.push(exchange);
        }
        thread
            .exchanges
            .push(Exchange::begin("in flight", Vec::new(), false, Utc::now()));

        let history = composer().history(&thread);
        let texts: Vec<_> = history.iter().map(|turn| turn.text.as_str()).collect();
        assert_eq!(texts, ["two", "re: two", "three", "re: three"]);
    }
}
