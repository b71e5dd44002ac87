//! GeminiDispatcher - Direct REST API implementation for Gemini.
//!
//! Streaming uses `streamGenerateContent?alt=sse`; the single-shot path uses
//! `generateContent`. Search grounding attaches the `google_search` tool.

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::dispatcher::{
    CompletionDispatcher, CompletionRequest, DispatchError, TextStream, TurnRole, cancellable,
};
use crate::session_registry::SessionRegistry;
use crate::sse::SseDecoder;

const DEFAULT_GEMINI_MODEL: &str = "gemini-2.5-flash";
const BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";
const API_KEY_ENV: &str = "GEMINI_API_KEY";

/// Dispatcher implementation that talks to the Gemini HTTP API.
#[derive(Clone)]
pub struct GeminiDispatcher {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
    sessions: Arc<SessionRegistry>,
}

impl GeminiDispatcher {
    /// Creates a new dispatcher with the provided API key and model.
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.into(),
            model: model.into(),
            base_url: BASE_URL.to_string(),
            sessions: Arc::new(SessionRegistry::new()),
        }
    }

    /// Reads the API key from `GEMINI_API_KEY`.
    ///
    /// Model name defaults to `gemini-2.5-flash`.
    pub fn try_from_env() -> Result<Self, DispatchError> {
        let api_key = std::env::var(API_KEY_ENV)
            .map_err(|_| DispatchError::Other(format!("{} is not set", API_KEY_ENV)))?;
        Ok(Self::new(api_key, DEFAULT_GEMINI_MODEL))
    }

    /// Overrides the model after construction.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Overrides the API base URL (for proxies and tests).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn sessions(&self) -> &SessionRegistry {
        &self.sessions
    }

    fn endpoint(&self, method: &str) -> String {
        format!(
            "{}/{model}:{method}",
            self.base_url,
            model = self.model,
            method = method
        )
    }

    async fn post(
        &self,
        url: String,
        body: &GenerateContentRequest,
    ) -> Result<reqwest::Response, DispatchError> {
        let response = self
            .client
            .post(url)
            .header("x-goog-api-key", &self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|err| DispatchError::Other(format!("Gemini API request failed: {err}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to read Gemini error body".to_string());
            return Err(map_http_error(status, body_text));
        }
        Ok(response)
    }
}

#[async_trait]
impl CompletionDispatcher for GeminiDispatcher {
    async fn stream_complete(
        &self,
        request: CompletionRequest,
        cancel: CancellationToken,
    ) -> Result<TextStream, DispatchError> {
        let session = self.sessions.acquire(&request.thread_id);
        tracing::debug!(
            "[GeminiDispatcher] Streaming for thread '{}' (session {}, turn {})",
            request.thread_id,
            session.id,
            session.turns
        );

        let body = build_request_body(&request);
        let url = format!("{}?alt=sse", self.endpoint("streamGenerateContent"));
        let response = tokio::select! {
            _ = cancel.cancelled() => return Err(DispatchError::Cancelled),
            response = self.post(url, &body) => response?,
        };

        let mut decoder = SseDecoder::new();
        let deltas = response
            .bytes_stream()
            .map(move |chunk| match chunk {
                Ok(bytes) => decoder
                    .push(&bytes)
                    .into_iter()
                    .map(|event| parse_stream_event(&event))
                    .collect::<Vec<_>>(),
                Err(err) => vec![Err(DispatchError::Other(format!(
                    "Gemini stream interrupted: {err}"
                )))],
            })
            .flat_map(futures::stream::iter)
            .filter_map(|delta| async move {
                match delta {
                    Ok(Some(text)) => Some(Ok(text)),
                    Ok(None) => None,
                    Err(err) => Some(Err(err)),
                }
            })
            .boxed();

        Ok(cancellable(deltas, cancel))
    }

    async fn complete(
        &self,
        request: CompletionRequest,
        cancel: CancellationToken,
    ) -> Result<String, DispatchError> {
        self.sessions.acquire(&request.thread_id);
        let body = build_request_body(&request);
        let url = self.endpoint("generateContent");

        let call = async {
            let response = self.post(url, &body).await?;
            let parsed: GenerateContentResponse = response.json().await.map_err(|err| {
                DispatchError::Other(format!("Failed to parse Gemini response: {err}"))
            })?;
            extract_text_response(parsed)?.ok_or_else(|| {
                DispatchError::Other(
                    "Gemini API returned no text in the response candidates".into(),
                )
            })
        };

        tokio::select! {
            _ = cancel.cancelled() => Err(DispatchError::Cancelled),
            result = call => result,
        }
    }

    fn rekey_session(&self, from: &str, to: &str) {
        self.sessions.rekey(from, to);
    }

    fn release_session(&self, thread_id: &str) {
        self.sessions.release(thread_id);
    }
}

#[derive(Serialize)]
struct GenerateContentRequest {
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<Tool>,
}

#[derive(Serialize)]
struct Content {
    role: String,
    parts: Vec<Part>,
}

#[derive(Serialize)]
#[serde(untagged)]
enum Part {
    Text {
        text: String,
    },
    InlineData {
        #[serde(rename = "inlineData")]
        inline_data: InlineDataPayload,
    },
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct InlineDataPayload {
    mime_type: String,
    data: String,
}

#[derive(Serialize)]
struct Tool {
    google_search: GoogleSearch,
}

#[derive(Serialize)]
struct GoogleSearch {}

#[derive(Deserialize)]
struct GenerateContentResponse {
    candidates: Option<Vec<Candidate>>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<ContentResponse>,
}

#[derive(Deserialize)]
struct ContentResponse {
    #[serde(default)]
    parts: Vec<PartResponse>,
}

#[derive(Deserialize)]
struct PartResponse {
    text: Option<String>,
}

#[derive(Deserialize)]
struct ErrorWrapper {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: Option<String>,
    status: Option<String>,
}

fn build_request_body(request: &CompletionRequest) -> GenerateContentRequest {
    let mut contents: Vec<Content> = request
        .history
        .iter()
        .filter(|turn| !turn.text.trim().is_empty())
        .map(|turn| Content {
            role: match turn.role {
                TurnRole::User => "user",
                TurnRole::Model => "model",
            }
            .to_string(),
            parts: vec![Part::Text {
                text: turn.text.clone(),
            }],
        })
        .collect();

    let mut parts = Vec::new();
    if !request.message.trim().is_empty() {
        parts.push(Part::Text {
            text: request.message.clone(),
        });
    }
    for image in &request.images {
        parts.push(Part::InlineData {
            inline_data: InlineDataPayload {
                mime_type: image.mime_type.clone(),
                data: image.data_base64.clone(),
            },
        });
    }
    contents.push(Content {
        role: "user".to_string(),
        parts,
    });

    let system_instruction = (!request.system_instructions.trim().is_empty()).then(|| Content {
        role: "system".to_string(),
        parts: vec![Part::Text {
            text: request.system_instructions.clone(),
        }],
    });

    let tools = if request.search_grounded {
        vec![Tool {
            google_search: GoogleSearch {},
        }]
    } else {
        Vec::new()
    };

    GenerateContentRequest {
        contents,
        system_instruction,
        tools,
    }
}

/// Concatenates the text parts of the first candidate.
fn extract_text_response(
    response: GenerateContentResponse,
) -> Result<Option<String>, DispatchError> {
    let text: String = response
        .candidates
        .and_then(|candidates| candidates.into_iter().next())
        .and_then(|candidate| candidate.content)
        .map(|content| content.parts.into_iter().filter_map(|part| part.text).collect())
        .unwrap_or_default();
    Ok((!text.is_empty()).then_some(text))
}

fn parse_stream_event(event: &str) -> Result<Option<String>, DispatchError> {
    if let Ok(wrapper) = serde_json::from_str::<ErrorWrapper>(event) {
        return Err(error_from_body(None, wrapper.error));
    }
    let parsed: GenerateContentResponse = serde_json::from_str(event)
        .map_err(|err| {
            DispatchError::Other(format!("Failed to parse Gemini stream event: {err}"))
        })?;
    extract_text_response(parsed)
}

fn map_http_error(status: StatusCode, body: String) -> DispatchError {
    match serde_json::from_str::<ErrorWrapper>(&body) {
        Ok(wrapper) => error_from_body(Some(status), wrapper.error),
        Err(_) if status == StatusCode::TOO_MANY_REQUESTS => DispatchError::QuotaExceeded(body),
        Err(_) => DispatchError::Other(format!("Gemini API error {}: {}", status.as_u16(), body)),
    }
}

fn error_from_body(status: Option<StatusCode>, error: ErrorBody) -> DispatchError {
    let status_text = error.status.unwrap_or_default();
    let message = error.message.unwrap_or_default();
    let message = if status_text.is_empty() {
        message
    } else {
        format!("{status_text}: {message}")
    };

    if status == Some(StatusCode::TOO_MANY_REQUESTS) || status_text == "RESOURCE_EXHAUSTED" {
        DispatchError::QuotaExceeded(message)
    } else {
        DispatchError::Other(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatcher::HistoryTurn;
    use wayfinder_core::thread::ImageAttachment;

    #[test]
    fn test_request_body_includes_history_images_and_search_tool() {
        let mut request = CompletionRequest::new("general", "What is this boss?");
        request.system_instructions = "You are a guide.".to_string();
        request.history = vec![HistoryTurn::user("hi"), HistoryTurn::model("Hello!")];
        request.images = vec![ImageAttachment::from_bytes("image/png", b"png")];
        request.search_grounded = true;

        let body = serde_json::to_value(build_request_body(&request)).unwrap();
        let contents = body["contents"].as_array().unwrap();
        assert_eq!(contents.len(), 3);
        assert_eq!(contents[1]["role"], "model");
        assert_eq!(contents[2]["parts"][1]["inlineData"]["mimeType"], "image/png");
        assert_eq!(body["system_instruction"]["parts"][0]["text"], "You are a guide.");
        assert!(body["tools"][0].get("google_search").is_some());
    }

    #[test]
    fn test_request_body_omits_tools_without_grounding() {
        let request = CompletionRequest::new("general", "hi");
        let body = serde_json::to_value(build_request_body(&request)).unwrap();
        assert!(body.get("tools").is_none());
        assert!(body.get("system_instruction").is_none());
    }

    #[test]
    fn test_rate_limit_maps_to_quota_exceeded() {
        let err = map_http_error(StatusCode::TOO_MANY_REQUESTS, "slow down".to_string());
        assert!(err.is_quota_exceeded());

        let body = r#"{"error":{"code":400,"message":"quota","status":"RESOURCE_EXHAUSTED"}}"#;
        assert!(map_http_error(StatusCode::BAD_REQUEST, body.to_string()).is_quota_exceeded());

        let err = map_http_error(StatusCode::INTERNAL_SERVER_ERROR, "boom".to_string());
        assert_eq!(err, DispatchError::Other("Gemini API error 500: boom".to_string()));
    }

    #[test]
    fn test_stream_event_text_extraction() {
        let event = r#"{"candidates":[{"content":{"parts":[{"text":"Wel"},{"text":"come"}],"role":"model"}}]}"#;
        assert_eq!(parse_stream_event(event).unwrap(), Some("Welcome".to_string()));

        let empty = r#"{"candidates":[{"finishReason":"STOP"}]}"#;
        assert_eq!(parse_stream_event(empty).unwrap(), None);
    }
}
