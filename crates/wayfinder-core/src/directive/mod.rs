//! Inline control directives embedded in model output.
//!
//! The model interleaves bracketed tokens such as `[TOPIC_ID: Shadow Realm]`
//! with its prose. [`scan`] separates the two: it returns the typed
//! [`Directive`]s and the text with every token removed.

pub mod extractor;
pub mod grammar;
pub mod model;

pub use extractor::{scan, strip, Extraction, Finality};
pub use grammar::{DirectiveName, PayloadShape};
pub use model::{Confidence, Directive, DirectiveSet, InventoryItem, Milestone};
