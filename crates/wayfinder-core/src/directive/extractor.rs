//! Token-scanning directive extractor.
//!
//! The extractor is a pure function over the whole accumulated buffer. Callers
//! re-run it on every streamed delta: the display text is re-derived from the
//! full buffer each time and every complete directive is re-parsed, so the
//! result only depends on the buffer contents, never on chunk boundaries.
//!
//! A token is `[` + a name from [`DirectiveName`] + `:` + payload + `]`.
//! Brackets whose name is not in the grammar are ordinary prose.

use super::grammar::{DirectiveName, PayloadShape};
use super::model::{Confidence, Directive, InventoryItem, Milestone};
use serde::Deserialize;
use thiserror::Error;

const MAX_SUGGESTIONS: usize = 3;

/// Separators left orphaned at the edges of the text when a token is removed.
const EDGE_SEPARATORS: [char; 4] = [',', ';', ':', '.'];
/// Punctuation that should hug the word before a removed token.
const CLOSING_PUNCTUATION: [char; 6] = ['.', ',', ';', ':', '!', '?'];

/// Whether more text may still arrive after this buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Finality {
    /// The stream is still open; unterminated trailing tokens are held back.
    Streaming,
    /// The stream has ended; unterminated tokens are resolved or dropped.
    Final,
}

/// Result of scanning a buffer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Extraction {
    /// Successfully parsed directives in buffer order.
    pub directives: Vec<Directive>,
    /// The buffer with every directive token removed.
    pub display_text: String,
    /// Byte offset of an unterminated trailing token left for the next call.
    pub pending_from: Option<usize>,
    /// Number of directive tokens dropped because their payload was invalid.
    pub malformed: usize,
}

#[derive(Debug, Error)]
enum PayloadError {
    #[error("invalid JSON payload: {0}")]
    Json(#[from] serde_json::Error),
    #[error("{0}")]
    Invalid(String),
}

enum Token<'a> {
    /// Not a directive; keep the bracket as prose.
    Prose,
    /// A complete token ending (exclusive) at `end`.
    Complete {
        name: DirectiveName,
        payload: &'a str,
        end: usize,
    },
    /// A complete token whose payload could not be delimited.
    Malformed { name: DirectiveName, end: usize },
    /// An unterminated token that runs to the end of the buffer.
    Unterminated,
}

/// Scans `buffer` for directives.
pub fn scan(buffer: &str, finality: Finality) -> Extraction {
    let mut extraction = Extraction::default();
    let mut display = String::with_capacity(buffer.len());
    let mut confidence: Option<Confidence> = None;
    // Offsets in `display` where a token was cut out.
    let mut seams: Vec<usize> = Vec::new();
    let mut copied_until = 0;
    let mut search_from = 0;

    while let Some(offset) = buffer[search_from..].find('[') {
        let open = search_from + offset;
        match classify(buffer, open, finality) {
            Token::Prose => {
                search_from = open + 1;
            }
            Token::Complete { name, payload, end } => {
                display.push_str(&buffer[copied_until..open]);
                seams.push(display.len());
                copied_until = end;
                search_from = end;

                match parse_payload(name, payload) {
                    Ok(Parsed::Directive(directive)) => extraction.directives.push(directive),
                    Ok(Parsed::Confidence(value)) => confidence = Some(value),
                    Ok(Parsed::Nothing) => {}
                    Err(err) => {
                        tracing::warn!(
                            "[Extractor] Dropping malformed {} directive: {}",
                            name,
                            err
                        );
                        extraction.malformed += 1;
                    }
                }
            }
            Token::Malformed { name, end } => {
                tracing::warn!("[Extractor] Dropping unterminated {} payload", name);
                display.push_str(&buffer[copied_until..open]);
                seams.push(display.len());
                copied_until = end;
                search_from = end;
                extraction.malformed += 1;
            }
            Token::Unterminated => {
                display.push_str(&buffer[copied_until..open]);
                seams.push(display.len());
                copied_until = buffer.len();
                if finality == Finality::Streaming {
                    extraction.pending_from = Some(open);
                }
                break;
            }
        }
    }

    if copied_until < buffer.len() {
        display.push_str(&buffer[copied_until..]);
    }

    let confidence = confidence.unwrap_or(Confidence::Low);
    for directive in &mut extraction.directives {
        if let Directive::TopicIdentified {
            confidence: slot, ..
        } = directive
        {
            *slot = confidence;
        }
    }

    extraction.display_text = if seams.is_empty() {
        display
    } else {
        tidy(&display, &seams)
    };
    extraction
}

/// Cleans up the text around removed tokens.
///
/// Whitespace left between a word and the punctuation that followed a token
/// is dropped (`Hi [X].` reads `Hi.`), and separators orphaned at either edge
/// of the text are trimmed.
fn tidy(display: &str, seams: &[usize]) -> String {
    let is_edge = |c: char| c.is_whitespace() || EDGE_SEPARATORS.contains(&c);
    let starts_at_seam = display[..seams[0]].trim().is_empty();
    let last_seam = seams[seams.len() - 1];
    let ends_at_seam = display[last_seam..].trim_matches(is_edge).is_empty();

    let mut text = String::with_capacity(display.len());
    let mut copied = 0;
    for &seam in seams {
        if seam < copied {
            continue;
        }
        let after = &display[seam..];
        let rest = after.trim_start();
        if rest.starts_with(CLOSING_PUNCTUATION) {
            text.push_str(display[copied..seam].trim_end());
            copied = seam + (after.len() - rest.len());
        } else {
            text.push_str(&display[copied..seam]);
            copied = seam;
        }
    }
    text.push_str(&display[copied..]);

    let mut visible = text.as_str();
    if starts_at_seam {
        visible = visible.trim_start_matches(is_edge);
    }
    if ends_at_seam {
        visible =
            visible.trim_end_matches(|c: char| c.is_whitespace() || matches!(c, ',' | ';' | ':'));
    }
    visible.trim().to_string()
}

/// Convenience for callers that only need the visible text.
pub fn strip(buffer: &str, finality: Finality) -> String {
    scan(buffer, finality).display_text
}

fn classify(buffer: &str, open: usize, finality: Finality) -> Token<'_> {
    let rest = &buffer[open + 1..];
    let name_len = rest
        .find(|c: char| !(c.is_ascii_uppercase() || c == '_'))
        .unwrap_or(rest.len());
    let fragment = &rest[..name_len];

    if name_len == rest.len() {
        // The buffer ends inside the name.
        return match finality {
            Finality::Streaming if DirectiveName::is_prefix_of_any(fragment) => {
                Token::Unterminated
            }
            Finality::Final
                if !fragment.is_empty() && DirectiveName::is_prefix_of_any(fragment) =>
            {
                Token::Unterminated
            }
            _ => Token::Prose,
        };
    }

    let Some(name) = DirectiveName::lookup(fragment) else {
        return Token::Prose;
    };

    let after_name = open + 1 + name_len;
    match buffer.as_bytes()[after_name] {
        b']' if name.allows_empty_payload() => {
            return Token::Complete {
                name,
                payload: "",
                end: after_name + 1,
            };
        }
        b':' => {}
        _ => return Token::Prose,
    }

    let payload_start = skip_whitespace(buffer, after_name + 1);
    if payload_start >= buffer.len() {
        return Token::Unterminated;
    }

    let first = buffer.as_bytes()[payload_start];
    let json_like = matches!(first, b'{' | b'[');
    if json_like && name.payload_shape() != PayloadShape::Bare {
        return classify_json(buffer, name, payload_start, finality);
    }

    let close = match bare_payload_end(buffer, payload_start) {
        Some(close) => Some(close),
        None if finality == Finality::Streaming => return Token::Unterminated,
        None => buffer[payload_start..]
            .find(']')
            .map(|offset| payload_start + offset),
    };
    match close {
        Some(close) => Token::Complete {
            name,
            payload: &buffer[payload_start..close],
            end: close + 1,
        },
        None => Token::Unterminated,
    }
}

/// Finds the `]` closing a bare payload, skipping bracket pairs nested in it.
fn bare_payload_end(buffer: &str, start: usize) -> Option<usize> {
    let mut depth = 0usize;
    for (index, byte) in buffer.bytes().enumerate().skip(start) {
        match byte {
            b'[' => depth += 1,
            b']' if depth == 0 => return Some(index),
            b']' => depth -= 1,
            _ => {}
        }
    }
    None
}

fn classify_json(
    buffer: &str,
    name: DirectiveName,
    payload_start: usize,
    finality: Finality,
) -> Token<'_> {
    match json_value_end(buffer, payload_start) {
        JsonEnd::Mismatched { at, unclosed } => {
            // Consume the closers the token still owes so they do not leak
            // into the visible text.
            let mut end = at + 1;
            for _ in 0..unclosed {
                let next = skip_whitespace(buffer, end);
                if next < buffer.len() && buffer.as_bytes()[next] == b']' {
                    end = next + 1;
                } else {
                    break;
                }
            }
            Token::Malformed { name, end }
        }
        JsonEnd::Closed(json_end) => {
            let close = skip_whitespace(buffer, json_end);
            if close < buffer.len() && buffer.as_bytes()[close] == b']' {
                return Token::Complete {
                    name,
                    payload: &buffer[payload_start..json_end],
                    end: close + 1,
                };
            }
            if close >= buffer.len() {
                return match finality {
                    Finality::Streaming => Token::Unterminated,
                    Finality::Final => Token::Malformed {
                        name,
                        end: buffer.len(),
                    },
                };
            }
            // Trailing junk after the JSON value: resynchronise on the next bracket.
            match buffer[json_end..].find(']') {
                Some(offset) => Token::Malformed {
                    name,
                    end: json_end + offset + 1,
                },
                None => Token::Unterminated,
            }
        }
        JsonEnd::Open => match finality {
            Finality::Streaming => Token::Unterminated,
            Finality::Final => match buffer[payload_start..].find(']') {
                Some(offset) => Token::Malformed {
                    name,
                    end: payload_start + offset + 1,
                },
                None => Token::Unterminated,
            },
        },
    }
}

enum JsonEnd {
    /// Offset just past the closing bracket of the value.
    Closed(usize),
    /// A closer at `at` that does not match the innermost opener.
    ///
    /// `unclosed` counts the `]` still expected after it, including the one
    /// closing the directive token.
    Mismatched { at: usize, unclosed: usize },
    /// The value is still open at the end of the buffer.
    Open,
}

fn json_value_end(buffer: &str, start: usize) -> JsonEnd {
    let bytes = buffer.as_bytes();
    let mut closers: Vec<u8> = Vec::new();
    let mut in_string = false;
    let mut escaped = false;

    for (index, &byte) in bytes.iter().enumerate().skip(start) {
        if in_string {
            match byte {
                _ if escaped => escaped = false,
                b'\\' => escaped = true,
                b'"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match byte {
            b'"' => in_string = true,
            b'{' => closers.push(b'}'),
            b'[' => closers.push(b']'),
            b'}' | b']' => {
                if closers.pop() != Some(byte) {
                    let still_open = closers.iter().filter(|&&c| c == b']').count();
                    let token_close = usize::from(byte == b'}');
                    return JsonEnd::Mismatched {
                        at: index,
                        unclosed: still_open + token_close,
                    };
                }
                if closers.is_empty() {
                    return JsonEnd::Closed(index + 1);
                }
            }
            _ => {}
        }
    }
    JsonEnd::Open
}

fn skip_whitespace(buffer: &str, from: usize) -> usize {
    buffer[from..]
        .find(|c: char| !c.is_whitespace())
        .map(|offset| from + offset)
        .unwrap_or(buffer.len())
}

enum Parsed {
    Directive(Directive),
    Confidence(Confidence),
    Nothing,
}

#[derive(Deserialize)]
struct PanelUpdatePayload {
    id: String,
    content: String,
}

#[derive(Deserialize)]
struct PanelModifyPayload {
    id: String,
    title: String,
    content: String,
}

#[derive(Deserialize)]
struct PanelIdPayload {
    id: String,
}

#[derive(Deserialize)]
struct GoalPayload {
    description: String,
}

fn parse_payload(name: DirectiveName, raw: &str) -> Result<Parsed, PayloadError> {
    let text = unquote(raw.trim());
    let directive = match name {
        DirectiveName::TopicId => Directive::TopicIdentified {
            name: non_empty(text, "topic name")?,
            confidence: Confidence::Low,
        },
        DirectiveName::Confidence => {
            return match text.to_ascii_lowercase().as_str() {
                "high" => Ok(Parsed::Confidence(Confidence::High)),
                "low" => Ok(Parsed::Confidence(Confidence::Low)),
                other => Err(PayloadError::Invalid(format!("unknown confidence '{other}'"))),
            };
        }
        DirectiveName::Category => Directive::Category {
            name: non_empty(text, "category")?,
        },
        DirectiveName::Progress => {
            let value: i64 = text
                .trim_end_matches('%')
                .trim()
                .parse()
                .map_err(|_| PayloadError::Invalid(format!("progress '{text}' is not a number")))?;
            Directive::ProgressEstimate {
                value: value.clamp(0, 100) as u8,
            }
        }
        DirectiveName::Unreleased => {
            if is_falsy(text) {
                return Ok(Parsed::Nothing);
            }
            Directive::UnreleasedFlag
        }
        DirectiveName::GoalComplete => {
            if is_falsy(text) {
                return Ok(Parsed::Nothing);
            }
            Directive::GoalComplete
        }
        DirectiveName::Milestone => Directive::Milestone(serde_json::from_str::<Milestone>(text)?),
        DirectiveName::Inventory => Directive::InventorySnapshot {
            items: serde_json::from_str::<Vec<InventoryItem>>(text)?,
        },
        DirectiveName::PanelUpdate => {
            let payload: PanelUpdatePayload = serde_json::from_str(text)?;
            Directive::PanelUpdate {
                panel_id: non_empty(&payload.id, "panel id")?,
                content_delta: payload.content,
            }
        }
        DirectiveName::PanelModify => {
            let payload: PanelModifyPayload = serde_json::from_str(text)?;
            Directive::PanelModifyRequest {
                panel_id: non_empty(&payload.id, "panel id")?,
                proposed_title: non_empty(&payload.title, "panel title")?,
                proposed_content: payload.content,
            }
        }
        DirectiveName::PanelDelete => {
            let panel_id = if text.starts_with('{') {
                serde_json::from_str::<PanelIdPayload>(text)?.id
            } else {
                text.to_string()
            };
            Directive::PanelDeleteRequest {
                panel_id: non_empty(&panel_id, "panel id")?,
            }
        }
        DirectiveName::GoalSet => {
            let description = if text.starts_with('{') {
                serde_json::from_str::<GoalPayload>(text)?.description
            } else {
                text.to_string()
            };
            Directive::GoalSet {
                description: non_empty(&description, "goal description")?,
            }
        }
        DirectiveName::Suggestions => {
            let suggestions: Vec<String> = serde_json::from_str(text)?;
            Directive::SuggestedFollowUps {
                suggestions: suggestions
                    .into_iter()
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .take(MAX_SUGGESTIONS)
                    .collect(),
            }
        }
    };
    Ok(Parsed::Directive(directive))
}

fn unquote(text: &str) -> &str {
    text.strip_prefix('"')
        .and_then(|t| t.strip_suffix('"'))
        .unwrap_or(text)
}

fn is_falsy(text: &str) -> bool {
    matches!(text.to_ascii_lowercase().as_str(), "false" | "no" | "0")
}

fn non_empty(value: &str, what: &str) -> Result<String, PayloadError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        Err(PayloadError::Invalid(format!("empty {what}")))
    } else {
        Ok(trimmed.to_string())
    }
}
