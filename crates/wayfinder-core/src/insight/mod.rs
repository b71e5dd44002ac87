//! Knowledge panels attached to topic threads.

pub mod board;
pub mod model;
pub mod template;

pub use board::InsightBoard;
pub use model::{
    InsightPanel, ModifyOutcome, ModifyResolution, PanelStatus, PendingModify, PLACEHOLDER_CONTENT,
};
pub use template::{templates_for, PanelTemplate, STORY_SO_FAR_PANEL_ID};
