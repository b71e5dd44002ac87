//! One user message paired with one model response.

use crate::directive::Milestone;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Thumbs up / thumbs down on a model entry or panel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedbackVote {
    Up,
    Down,
}

/// An image attached to a user message, already base64 encoded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageAttachment {
    pub mime_type: String,
    pub data_base64: String,
}

impl ImageAttachment {
    /// Encodes raw image bytes, e.g. a screenshot relayed from a companion device.
    pub fn from_bytes(mime_type: impl Into<String>, bytes: &[u8]) -> Self {
        Self {
            mime_type: mime_type.into(),
            data_base64: BASE64_STANDARD.encode(bytes),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserEntry {
    pub id: String,
    pub text: String,
    #[serde(default)]
    pub images: Vec<ImageAttachment>,
    /// True when the message was relayed from a companion device.
    #[serde(default)]
    pub from_companion: bool,
    pub created_at: DateTime<Utc>,
}

/// Where a model entry is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryStatus {
    /// Placeholder created, no delta received yet.
    Pending,
    Streaming,
    Complete,
    Cancelled,
    Failed,
    /// Left in flight by a previous process.
    Interrupted,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelEntry {
    pub id: String,
    /// Visible text with every directive removed.
    pub text: String,
    #[serde(default)]
    pub suggestions: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub milestone: Option<Milestone>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feedback: Option<FeedbackVote>,
    pub status: EntryStatus,
    /// Set once this response's directives have been applied.
    #[serde(default)]
    pub directives_applied: bool,
    pub created_at: DateTime<Utc>,
}

impl ModelEntry {
    pub fn placeholder(now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            text: String::new(),
            suggestions: Vec::new(),
            milestone: None,
            feedback: None,
            status: EntryStatus::Pending,
            directives_applied: false,
            created_at: now,
        }
    }

    pub fn is_in_flight(&self) -> bool {
        matches!(self.status, EntryStatus::Pending | EntryStatus::Streaming)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Exchange {
    pub user: UserEntry,
    pub model: ModelEntry,
}

impl Exchange {
    /// Creates a user entry and an empty in-flight model placeholder.
    pub fn begin(
        text: impl Into<String>,
        images: Vec<ImageAttachment>,
        from_companion: bool,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            user: UserEntry {
                id: Uuid::new_v4().to_string(),
                text: text.into(),
                images,
                from_companion,
                created_at: now,
            },
            model: ModelEntry::placeholder(now),
        }
    }

    /// The exchange is identified by its model entry id.
    pub fn id(&self) -> &str {
        &self.model.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_image_from_bytes_is_base64() {
        let image = ImageAttachment::from_bytes("image/png", b"\x89PNG");
        assert_eq!(image.data_base64, "iVBORw==");
    }

    #[test]
    fn test_exchange_begins_with_in_flight_placeholder() {
        let exchange = Exchange::begin("help", Vec::new(), false, Utc::now());
        assert!(exchange.model.is_in_flight());
        assert!(exchange.model.text.is_empty());
        assert_eq!(exchange.id(), exchange.model.id);
    }
}
