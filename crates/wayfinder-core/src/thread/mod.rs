//! Conversation threads, exchanges and the thread tree.

pub mod exchange;
pub mod model;
pub mod repository;
pub mod tree;

pub use exchange::{EntryStatus, Exchange, FeedbackVote, ImageAttachment, ModelEntry, UserEntry};
pub use model::{ActiveGoal, SystemMessage, SystemMessageKind, Thread, CATCH_ALL_THREAD_ID};
pub use repository::ThreadTreeRepository;
pub use tree::ThreadTree;
