//! Application layer: conversation reconciliation, insight refresh, quota
//! and cooldown gates, and debounced persistence.

pub mod cooldown;
pub mod engine;
pub mod insight_service;
pub mod notices;
pub mod persistence;
pub mod prompt;
pub mod quota_gate;
pub mod reconciler;
pub mod state;

pub use cooldown::CooldownGate;
pub use engine::Engine;
pub use insight_service::InsightService;
pub use persistence::PersistenceDebouncer;
pub use prompt::{PromptComposer, META_PREFIX};
pub use quota_gate::{QuotaCheck, QuotaGate};
pub use reconciler::{ConversationReconciler, FinalizeReport, SendOutcome, UserMessage};
pub use state::TreeHandle;
