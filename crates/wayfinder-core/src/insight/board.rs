//! Per-thread insight board state machine.
//!
//! All transitions are synchronous and pure; the application layer drives
//! on-demand fetches and feeds their results back through
//! [`InsightBoard::stream_chunk`], [`InsightBoard::finish_fetch`] and
//! [`InsightBoard::fail_fetch`].

use super::model::{
    InsightPanel, ModifyOutcome, ModifyResolution, PanelStatus, PendingModify,
    PLACEHOLDER_CONTENT,
};
use super::template::templates_for;
use crate::error::{Result, WayfinderError};
use crate::slug::slugify;
use crate::thread::FeedbackVote;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

const CUSTOM_PANEL_INSTRUCTION: &str =
    "Keep this panel up to date with what is relevant to the player's current progress.";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InsightBoard {
    /// Panel ids in display order.
    #[serde(default)]
    order: Vec<String>,
    #[serde(default)]
    panels: HashMap<String, InsightPanel>,
    #[serde(default)]
    pending_modify: Vec<PendingModify>,
    /// Set once the category template has been applied.
    #[serde(default)]
    seeded: bool,
}

impl InsightBoard {
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_seeded(&self) -> bool {
        self.seeded
    }

    pub fn panel(&self, panel_id: &str) -> Option<&InsightPanel> {
        self.panels.get(panel_id)
    }

    /// Panels in display order.
    pub fn ordered(&self) -> impl Iterator<Item = &InsightPanel> {
        self.order.iter().filter_map(|id| self.panels.get(id))
    }

    pub fn pending_modifications(&self) -> &[PendingModify] {
        &self.pending_modify
    }

    pub fn unread_count(&self) -> usize {
        self.panels.values().filter(|p| p.is_unread).count()
    }

    /// Creates one loading panel per template entry for `category`.
    ///
    /// Only the first call on a board has any effect. Returns the ids of the
    /// created panels.
    pub fn seed(&mut self, category: &str) -> Vec<String> {
        if self.seeded {
            return Vec::new();
        }
        self.seeded = true;

        let mut created = Vec::new();
        for template in templates_for(category) {
            if self.panels.contains_key(template.id) {
                continue;
            }
            self.insert(InsightPanel::loading(
                template.id,
                template.title,
                template.instruction,
                template.search_grounded,
            ));
            created.push(template.id.to_string());
        }
        tracing::debug!(
            "[InsightBoard] Seeded {} panels for category '{}'",
            created.len(),
            category
        );
        created
    }

    /// Appends inline content to an existing panel.
    ///
    /// The placeholder is replaced rather than appended to. Unknown panel ids
    /// are ignored and reported as `false`.
    pub fn apply_update(&mut self, panel_id: &str, content_delta: &str) -> bool {
        let Some(panel) = self.panels.get_mut(panel_id) else {
            tracing::debug!("[InsightBoard] Ignoring update for unknown panel '{}'", panel_id);
            return false;
        };
        if panel.status == PanelStatus::Loading || panel.status == PanelStatus::Error {
            panel.content.clear();
        }
        panel.content.push_str(content_delta);
        panel.status = PanelStatus::Loaded;
        panel.is_unread = true;
        true
    }

    /// Moves a panel into `loading` ahead of an on-demand fetch.
    pub fn begin_fetch(&mut self, panel_id: &str) -> Result<&InsightPanel> {
        let panel = self.panel_mut(panel_id)?;
        panel.status = PanelStatus::Loading;
        panel.content = PLACEHOLDER_CONTENT.to_string();
        Ok(&*panel)
    }

    /// Appends a streamed fetch chunk; the first chunk replaces the placeholder.
    pub fn stream_chunk(&mut self, panel_id: &str, chunk: &str) -> Result<()> {
        let panel = self.panel_mut(panel_id)?;
        match panel.status {
            PanelStatus::Loading => {
                panel.content.clear();
                panel.status = PanelStatus::Streaming;
            }
            PanelStatus::Streaming => {}
            status => {
                return Err(WayfinderError::invalid_operation(format!(
                    "panel '{}' is not fetching (status {:?})",
                    panel_id, status
                )));
            }
        }
        panel.content.push_str(chunk);
        Ok(())
    }

    /// Completes a fetch. `content` replaces whatever was streamed when given.
    pub fn finish_fetch(&mut self, panel_id: &str, content: Option<String>) -> Result<()> {
        let panel = self.panel_mut(panel_id)?;
        if let Some(content) = content {
            panel.content = content;
        } else if panel.status == PanelStatus::Loading {
            panel.content.clear();
        }
        panel.status = PanelStatus::Loaded;
        panel.is_unread = true;
        Ok(())
    }

    /// Records a failed fetch with the error text as content.
    pub fn fail_fetch(&mut self, panel_id: &str, error: &str) -> Result<()> {
        let panel = self.panel_mut(panel_id)?;
        panel.status = PanelStatus::Error;
        panel.content = error.to_string();
        Ok(())
    }

    /// Queues a model-proposed modification for the user to confirm.
    ///
    /// A newer request for the same panel replaces the older one.
    pub fn request_modify(&mut self, request: PendingModify) {
        self.pending_modify
            .retain(|pending| pending.panel_id != request.panel_id);
        self.pending_modify.push(request);
    }

    /// Applies the user's decision on a pending modification.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if no modification is pending for `panel_id`, or if
    /// `Overwrite` targets a panel that no longer exists. In both cases the
    /// request stays queued.
    pub fn resolve_modify(
        &mut self,
        panel_id: &str,
        resolution: ModifyResolution,
    ) -> Result<ModifyOutcome> {
        let index = self
            .pending_modify
            .iter()
            .position(|pending| pending.panel_id == panel_id)
            .ok_or_else(|| WayfinderError::not_found("pending panel modification", panel_id))?;

        let outcome = match resolution {
            ModifyResolution::Overwrite => {
                let request = &self.pending_modify[index];
                let (title, content) =
                    (request.proposed_title.clone(), request.proposed_content.clone());
                let panel = self.panel_mut(panel_id)?;
                panel.title = title;
                panel.content = content;
                panel.status = PanelStatus::Loaded;
                panel.is_unread = true;
                ModifyOutcome::Overwritten {
                    panel_id: panel_id.to_string(),
                }
            }
            ModifyResolution::CreateNew => {
                let request = &self.pending_modify[index];
                let slug = slugify(&request.proposed_title);
                if slug.is_empty() || self.panels.contains_key(&slug) {
                    return Ok(ModifyOutcome::SlugCollision { slug });
                }
                let mut panel = InsightPanel::loading(
                    slug.clone(),
                    request.proposed_title.clone(),
                    CUSTOM_PANEL_INSTRUCTION,
                    false,
                );
                panel.content = request.proposed_content.clone();
                panel.status = PanelStatus::Loaded;
                panel.is_unread = true;
                self.insert(panel);
                ModifyOutcome::Created { panel_id: slug }
            }
        };

        self.pending_modify.remove(index);
        Ok(outcome)
    }

    /// Drops a pending modification without applying it.
    pub fn dismiss_modify(&mut self, panel_id: &str) -> bool {
        let before = self.pending_modify.len();
        self.pending_modify
            .retain(|pending| pending.panel_id != panel_id);
        before != self.pending_modify.len()
    }

    /// Removes a panel from both the content map and the order list.
    pub fn delete(&mut self, panel_id: &str) -> bool {
        let removed = self.panels.remove(panel_id).is_some();
        self.order.retain(|id| id != panel_id);
        removed
    }

    pub fn mark_read(&mut self, panel_id: &str) -> Result<()> {
        self.panel_mut(panel_id)?.is_unread = false;
        Ok(())
    }

    pub fn set_feedback(&mut self, panel_id: &str, vote: Option<FeedbackVote>) -> Result<()> {
        self.panel_mut(panel_id)?.feedback = vote;
        Ok(())
    }

    /// Any panel still `loading`/`streaming` after a restart is reset to an
    /// error so the user can retry it.
    pub fn recover_interrupted(&mut self) -> usize {
        let mut recovered = 0;
        for panel in self.panels.values_mut() {
            if panel.status == PanelStatus::Streaming {
                panel.status = PanelStatus::Error;
                panel.content = "Refresh was interrupted.".to_string();
                recovered += 1;
            }
        }
        recovered
    }

    fn insert(&mut self, panel: InsightPanel) {
        if !self.order.contains(&panel.id) {
            self.order.push(panel.id.clone());
        }
        self.panels.insert(panel.id.clone(), panel);
    }

    fn panel_mut(&mut self, panel_id: &str) -> Result<&mut InsightPanel> {
        self.panels
            .get_mut(panel_id)
            .ok_or_else(|| WayfinderError::not_found("insight panel", panel_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded_rpg() -> InsightBoard {
        let mut board = InsightBoard::default();
        board.seed("RPG");
        board
    }

    fn modify(panel_id: &str, title: &str) -> PendingModify {
        PendingModify {
            panel_id: panel_id.to_string(),
            proposed_title: title.to_string(),
            proposed_content: "New content".to_string(),
        }
    }

    #[test]
    fn test_seed_creates_loading_panels_once() {
        let mut board = seeded_rpg();
        assert_eq!(board.len(), 3);
        assert!(board.ordered().all(|p| p.status == PanelStatus::Loading));
        assert!(board.seed("Puzzle").is_empty());
        assert_eq!(board.len(), 3);
    }

    #[test]
    fn test_inline_update_replaces_placeholder_and_marks_unread() {
        let mut board = seeded_rpg();
        assert!(board.apply_update("story-so-far", "You left the village."));
        assert!(board.apply_update("story-so-far", " Then the bridge fell."));
        let panel = board.panel("story-so-far").unwrap();
        assert_eq!(panel.content, "You left the village. Then the bridge fell.");
        assert_eq!(panel.status, PanelStatus::Loaded);
        assert!(panel.is_unread);
        assert!(!board.apply_update("missing", "x"));
    }

    #[test]
    fn test_fetch_lifecycle() {
        let mut board = seeded_rpg();
        board.begin_fetch("side-quests").unwrap();
        board.stream_chunk("side-quests", "1. Lost ").unwrap();
        assert_eq!(
            board.panel("side-quests").unwrap().status,
            PanelStatus::Streaming
        );
        board.stream_chunk("side-quests", "cat").unwrap();
        board.finish_fetch("side-quests", None).unwrap();

        let panel = board.panel("side-quests").unwrap();
        assert_eq!(panel.content, "1. Lost cat");
        assert_eq!(panel.status, PanelStatus::Loaded);
    }

    #[test]
    fn test_fetch_failure_shows_error_text() {
        let mut board = seeded_rpg();
        board.begin_fetch("character-builds").unwrap();
        board.fail_fetch("character-builds", "network down").unwrap();
        let panel = board.panel("character-builds").unwrap();
        assert_eq!(panel.status, PanelStatus::Error);
        assert_eq!(panel.content, "network down");
        assert!(board.stream_chunk("character-builds", "late").is_err());
    }

    #[test]
    fn test_overwrite_modify() {
        let mut board = seeded_rpg();
        board.request_modify(modify("side-quests", "Optional Bosses"));
        let outcome = board
            .resolve_modify("side-quests", ModifyResolution::Overwrite)
            .unwrap();
        assert_eq!(
            outcome,
            ModifyOutcome::Overwritten {
                panel_id: "side-quests".to_string()
            }
        );
        assert_eq!(board.panel("side-quests").unwrap().title, "Optional Bosses");
        assert!(board.pending_modifications().is_empty());
    }

    #[test]
    fn test_create_new_refuses_slug_collision_and_keeps_request() {
        let mut board = seeded_rpg();
        board.request_modify(modify("story-so-far", "Side Quests"));
        let outcome = board
            .resolve_modify("story-so-far", ModifyResolution::CreateNew)
            .unwrap();
        assert_eq!(
            outcome,
            ModifyOutcome::SlugCollision {
                slug: "side-quests".to_string()
            }
        );
        assert_eq!(board.pending_modifications().len(), 1);
        assert_eq!(board.len(), 3);
    }

    #[test]
    fn test_delete_then_create_with_same_slug_succeeds() {
        let mut board = seeded_rpg();
        assert!(board.delete("side-quests"));
        assert!(board.panel("side-quests").is_none());
        assert!(!board.ordered().any(|p| p.id == "side-quests"));

        board.request_modify(modify("story-so-far", "Side Quests"));
        let outcome = board
            .resolve_modify("story-so-far", ModifyResolution::CreateNew)
            .unwrap();
        assert_eq!(
            outcome,
            ModifyOutcome::Created {
                panel_id: "side-quests".to_string()
            }
        );
        assert_eq!(board.panel("side-quests").unwrap().content, "New content");
    }

    #[test]
    fn test_resolve_without_pending_request_is_not_found() {
        let mut board = seeded_rpg();
        let err = board
            .resolve_modify("story-so-far", ModifyResolution::Overwrite)
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_mark_read_and_feedback() {
        let mut board = seeded_rpg();
        board.apply_update("story-so-far", "text");
        board.mark_read("story-so-far").unwrap();
        board
            .set_feedback("story-so-far", Some(FeedbackVote::Up))
            .unwrap();
        let panel = board.panel("story-so-far").unwrap();
        assert!(!panel.is_unread);
        assert_eq!(panel.feedback, Some(FeedbackVote::Up));
        assert_eq!(board.unread_count(), 0);
    }
}
