//! Provider-facing side of the engine.
//!
//! [`CompletionDispatcher`] is the contract the reconciler dispatches
//! through; [`GeminiDispatcher`] implements it against the Gemini REST API.

pub mod dispatcher;
pub mod gemini;
pub mod session_registry;
pub mod sse;

pub use dispatcher::{
    CompletionDispatcher, CompletionRequest, DispatchError, HistoryTurn, TextStream, TurnRole,
    cancellable,
};
pub use gemini::GeminiDispatcher;
pub use session_registry::{SessionHandle, SessionRegistry};
