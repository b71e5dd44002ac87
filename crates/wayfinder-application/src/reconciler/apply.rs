//! Pure directive application and thread migration.
//!
//! Nothing here awaits or persists; the reconciler runs it inside a single
//! tree mutation so sorting and the persisted revision stay consistent.

use chrono::{DateTime, Utc};
use wayfinder_core::directive::{Confidence, Directive, DirectiveSet, Extraction};
use wayfinder_core::insight::PendingModify;
use wayfinder_core::slug::slugify;
use wayfinder_core::thread::{
    ActiveGoal, EntryStatus, Thread, ThreadTree, CATCH_ALL_THREAD_ID,
};
use wayfinder_core::{Result, WayfinderError};

/// What finalizing an exchange did to the tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinalizeReport {
    /// Thread the exchange was in while streaming.
    pub source: String,
    /// Thread the exchange lives in now.
    pub target: String,
    pub migrated: bool,
    /// Panels created by a first category assignment.
    pub seeded_panels: Vec<String>,
    /// False when the exchange had already been finalized.
    pub applied: bool,
}

/// Finalizes the model entry `entry_id` from the full-buffer extraction.
///
/// Sets the visible text, picks the target thread, migrates the exchange if
/// the target differs and applies the directive set to the target. Calling it
/// again for the same entry changes nothing.
pub fn finalize_exchange(
    tree: &mut ThreadTree,
    entry_id: &str,
    extraction: &Extraction,
    now: DateTime<Utc>,
) -> Result<FinalizeReport> {
    let source = tree
        .locate(entry_id)
        .ok_or_else(|| WayfinderError::not_found("exchange", entry_id))?
        .to_string();

    let entry = tree.find_model_entry_mut(entry_id)?;
    if entry.directives_applied {
        return Ok(FinalizeReport {
            target: source.clone(),
            source,
            migrated: false,
            seeded_panels: Vec::new(),
            applied: false,
        });
    }
    entry.text = extraction.display_text.clone();
    entry.status = EntryStatus::Complete;

    let directives = DirectiveSet::new(extraction.directives.iter().cloned());
    let target = resolve_target(tree, &source, &directives, now)?;
    let migrated = target != source;
    if migrated {
        tree.migrate_exchange(entry_id, &source, &target, now)?;
    }

    let thread = tree.thread_mut(&target)?;
    let seeded_panels = apply_to_thread(thread, &directives);
    if let Some(exchange) = thread.exchanges.iter_mut().find(|e| e.id() == entry_id) {
        if let Some(suggestions) = directives.suggestions() {
            exchange.model.suggestions = suggestions.to_vec();
        }
        exchange.model.milestone = directives.milestone().cloned();
        exchange.model.directives_applied = true;
    }
    thread.last_interaction_at = now;
    tree.resort();

    tracing::debug!(
        "[Reconciler] Finalized {} in '{}' ({} directives, migrated: {})",
        entry_id,
        target,
        directives.len(),
        migrated
    );

    Ok(FinalizeReport {
        source,
        target,
        migrated,
        seeded_panels,
        applied: true,
    })
}

/// Picks the thread an exchange belongs to.
///
/// Only a high-confidence topic moves an exchange, and only out of the
/// catch-all thread or out of a thread for a different topic.
pub fn resolve_target(
    tree: &mut ThreadTree,
    source: &str,
    directives: &DirectiveSet,
    now: DateTime<Utc>,
) -> Result<String> {
    let Some((name, Confidence::High)) = directives.topic() else {
        return Ok(source.to_string());
    };
    let slug = slugify(name);
    if slug.is_empty() || slug == CATCH_ALL_THREAD_ID {
        return Ok(source.to_string());
    }
    if source != CATCH_ALL_THREAD_ID && slug == source {
        return Ok(source.to_string());
    }
    tree.ensure_topic_thread(name, now)
}

/// Applies thread-scoped directives. Returns the ids of newly seeded panels.
///
/// Single-valued state goes first so that panels seeded by a category in the
/// same response can receive updates from it.
fn apply_to_thread(thread: &mut Thread, directives: &DirectiveSet) -> Vec<String> {
    let is_topic_thread = !thread.is_catch_all();
    let mut seeded = Vec::new();

    if is_topic_thread {
        if let Some((name, Confidence::High)) = directives.topic() {
            if slugify(name) == thread.id {
                thread.topic_name = Some(name.trim().to_string());
            }
        }
        if let Some(category) = directives.category() {
            thread.category = Some(category.to_string());
            seeded = thread.insights.seed(category);
        }
    }
    if let Some(progress) = directives.progress() {
        thread.progress = progress.min(100);
    }
    if directives.is_unreleased() {
        thread.is_unreleased = true;
    }
    if let Some(items) = directives.inventory() {
        thread.inventory = items.to_vec();
    }

    for directive in directives.iter() {
        match directive {
            Directive::Milestone(milestone) => {
                thread.record_milestone(milestone.clone());
            }
            Directive::GoalSet { description } => {
                thread.goal = Some(ActiveGoal {
                    description: description.clone(),
                    completed: false,
                });
            }
            Directive::GoalComplete => {
                if let Some(goal) = thread.goal.as_mut() {
                    goal.completed = true;
                }
            }
            Directive::PanelUpdate {
                panel_id,
                content_delta,
            } if is_topic_thread => {
                thread.insights.apply_update(panel_id, content_delta);
            }
            Directive::PanelModifyRequest {
                panel_id,
                proposed_title,
                proposed_content,
            } if is_topic_thread => {
                thread.insights.request_modify(PendingModify {
                    panel_id: panel_id.clone(),
                    proposed_title: proposed_title.clone(),
                    proposed_content: proposed_content.clone(),
                });
            }
            Directive::PanelDeleteRequest { panel_id } if is_topic_thread => {
                if thread.insights.delete(panel_id) {
                    tracing::info!("[Reconciler] Deleted panel '{}' in '{}'", panel_id, thread.id);
                }
            }
            _ => {}
        }
    }

    seeded
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use wayfinder_core::directive::{scan, Finality};
    use wayfinder_core::insight::{ModifyOutcome, ModifyResolution, PanelStatus};
    use wayfinder_core::thread::Exchange;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 7, 1, 18, 0, 0).unwrap()
    }

    fn start_exchange(tree: &mut ThreadTree, thread_id: &str, text: &str) -> String {
        let exchange = Exchange::begin(text, Vec::new(), false, t0());
        let id = exchange.id().to_string();
        tree.append_exchange(thread_id, exchange, t0()).unwrap();
        id
    }

    fn finalize(tree: &mut ThreadTree, entry_id: &str, raw: &str) -> FinalizeReport {
        let extraction = scan(raw, Finality::Final);
        finalize_exchange(tree, entry_id, &extraction, t0() + Duration::seconds(5)).unwrap()
    }

    #[test]
    fn test_high_confidence_topic_migrates_out_of_catch_all() {
        let mut tree = ThreadTree::new(t0());
        let entry = start_exchange(&mut tree, CATCH_ALL_THREAD_ID, "where is the moon key");

        let raw = r#"[TOPIC_ID: Shadow Realm][CONFIDENCE: high][CATEGORY: RPG][PROGRESS: 10]Welcome, traveler.[SUGGESTIONS: ["What now?","Inventory?","Lore?"]]"#;
        let report = finalize(&mut tree, &entry, raw);

        assert!(report.migrated);
        assert_eq!(report.target, "shadow-realm");
        assert_eq!(report.seeded_panels.len(), 3);
        assert!(tree.thread(CATCH_ALL_THREAD_ID).unwrap().exchanges.is_empty());

        let thread = tree.thread("shadow-realm").unwrap();
        assert_eq!(thread.topic_name.as_deref(), Some("Shadow Realm"));
        assert_eq!(thread.category.as_deref(), Some("RPG"));
        assert_eq!(thread.progress, 10);
        assert!(thread
            .insights
            .ordered()
            .all(|panel| panel.status == PanelStatus::Loading));

        let exchange = &thread.exchanges[0];
        assert_eq!(exchange.user.text, "where is the moon key");
        assert_eq!(exchange.model.text, "Welcome, traveler.");
        assert_eq!(exchange.model.suggestions.len(), 3);
        assert_eq!(exchange.model.status, EntryStatus::Complete);
        assert_eq!(tree.order()[..2], ["general", "shadow-realm"]);
    }

    #[test]
    fn test_low_confidence_topic_stays_in_source() {
        let mut tree = ThreadTree::new(t0());
        let entry = start_exchange(&mut tree, CATCH_ALL_THREAD_ID, "hm");

        let report = finalize(&mut tree, &entry, "[TOPIC_ID: Shadow Realm]Maybe?");
        assert!(!report.migrated);
        assert_eq!(tree.len(), 1);
        assert_eq!(tree.thread(CATCH_ALL_THREAD_ID).unwrap().exchanges.len(), 1);
    }

    #[test]
    fn test_same_topic_in_topic_thread_does_not_migrate() {
        let mut tree = ThreadTree::new(t0());
        let id = tree.ensure_topic_thread("Shadow Realm", t0()).unwrap();
        let entry = start_exchange(&mut tree, &id, "next?");

        let report = finalize(
            &mut tree,
            &entry,
            "[TOPIC_ID: shadow realm][CONFIDENCE: high][PROGRESS: 30]Onward.",
        );
        assert!(!report.migrated);
        assert_eq!(tree.thread(&id).unwrap().progress, 30);
    }

    #[test]
    fn test_different_topic_moves_between_topic_threads_append_only() {
        let mut tree = ThreadTree::new(t0());
        let a = tree.ensure_topic_thread("Shadow Realm", t0()).unwrap();
        let b = tree.ensure_topic_thread("Star Forge", t0()).unwrap();
        let existing = start_exchange(&mut tree, &b, "older");
        let entry = start_exchange(&mut tree, &a, "actually star forge");

        let report = finalize(
            &mut tree,
            &entry,
            "[TOPIC_ID: Star Forge][CONFIDENCE: high]Got it.",
        );
        assert!(report.migrated);
        let target = tree.thread(&b).unwrap();
        assert_eq!(target.exchanges[0].id(), existing);
        assert_eq!(target.exchanges[1].id(), entry);
        assert!(tree.thread(&a).unwrap().exchanges.is_empty());
    }

    #[test]
    fn test_finalize_is_idempotent() {
        let mut tree = ThreadTree::new(t0());
        let entry = start_exchange(&mut tree, CATCH_ALL_THREAD_ID, "hi");
        let raw = r#"[TOPIC_ID: Shadow Realm][CONFIDENCE: high][CATEGORY: RPG][MILESTONE: {"type": "boss", "name": "Warden"}]Hi."#;

        finalize(&mut tree, &entry, raw);
        let again = finalize(&mut tree, &entry, raw);

        assert!(!again.applied);
        let thread = tree.thread("shadow-realm").unwrap();
        assert_eq!(thread.exchanges.len(), 1);
        assert_eq!(thread.milestones.len(), 1);
        assert_eq!(thread.insights.len(), 3);
    }

    #[test]
    fn test_catch_all_ignores_category_and_panels() {
        let mut tree = ThreadTree::new(t0());
        let entry = start_exchange(&mut tree, CATCH_ALL_THREAD_ID, "help");
        finalize(
            &mut tree,
            &entry,
            r#"[CATEGORY: RPG][GOAL_SET: {"description": "Pick a game"}]Which game?"#,
        );

        let general = tree.thread(CATCH_ALL_THREAD_ID).unwrap();
        assert!(general.insights.is_empty());
        assert_eq!(general.category, None);
        assert_eq!(general.active_goal().unwrap().description, "Pick a game");
    }

    #[test]
    fn test_category_then_update_in_same_response() {
        let mut tree = ThreadTree::new(t0());
        let id = tree.ensure_topic_thread("Shadow Realm", t0()).unwrap();
        let entry = start_exchange(&mut tree, &id, "story?");
        finalize(
            &mut tree,
            &entry,
            r#"[PANEL_UPDATE: {"id": "story-so-far", "content": "You woke in the crypt."}][CATEGORY: RPG]Here you go."#,
        );

        let panel = tree
            .thread(&id)
            .unwrap()
            .insights
            .panel("story-so-far")
            .unwrap()
            .clone();
        assert_eq!(panel.status, PanelStatus::Loaded);
        assert_eq!(panel.content, "You woke in the crypt.");
        assert!(panel.is_unread);
    }

    #[test]
    fn test_delete_then_modify_with_same_slug_creates_panel() {
        let mut tree = ThreadTree::new(t0());
        let id = tree.ensure_topic_thread("Shadow Realm", t0()).unwrap();
        tree.thread_mut(&id).unwrap().insights.seed("RPG");

        let first = start_exchange(&mut tree, &id, "drop side quests");
        finalize(&mut tree, &first, r#"[PANEL_DELETE: {"id": "side-quests"}]Done."#);
        let second = start_exchange(&mut tree, &id, "bring it back");
        finalize(
            &mut tree,
            &second,
            r#"[PANEL_MODIFY: {"id": "story-so-far", "title": "Side Quests", "content": "Fresh list"}]Proposed."#,
        );

        let board = &mut tree.thread_mut(&id).unwrap().insights;
        assert!(board.panel("side-quests").is_none());
        let outcome = board
            .resolve_modify("story-so-far", ModifyResolution::CreateNew)
            .unwrap();
        assert_eq!(
            outcome,
            ModifyOutcome::Created {
                panel_id: "side-quests".to_string()
            }
        );
        assert_eq!(board.panel("side-quests").unwrap().content, "Fresh list");
    }

    #[test]
    fn test_goal_complete_and_inventory_replacement() {
        let mut tree = ThreadTree::new(t0());
        let id = tree.ensure_topic_thread("Shadow Realm", t0()).unwrap();
        let first = start_exchange(&mut tree, &id, "goal");
        finalize(
            &mut tree,
            &first,
            r#"[GOAL_SET: {"description": "Reach the tower"}][INVENTORY: ["Rope", "Lamp"]]Ok."#,
        );
        let second = start_exchange(&mut tree, &id, "made it");
        finalize(&mut tree, &second, r#"[GOAL_COMPLETE: true][INVENTORY: ["Lamp"]]Nice."#);

        let thread = tree.thread(&id).unwrap();
        assert!(thread.active_goal().is_none());
        assert!(thread.goal.as_ref().unwrap().completed);
        assert_eq!(thread.inventory.len(), 1);
        assert_eq!(thread.inventory[0].name, "Lamp");
    }
}
