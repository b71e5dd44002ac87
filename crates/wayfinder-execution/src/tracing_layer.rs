//! Tracing layer that forwards engine log events to a UI channel.
//!
//! Engine components prefix their messages with `[Component]`; the layer
//! splits that prefix off so a UI can group or filter by component.

use serde_json::Value;
use std::collections::HashMap;
use tokio::sync::mpsc;
use tracing::span::{Attributes, Id};
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::Context;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::Layer;

/// One forwarded log event.
#[derive(Debug, Clone, serde::Serialize)]
pub struct EngineEvent {
    /// Module path of the emitting code (e.g. `wayfinder_application::reconciler`).
    pub target: String,
    pub level: String,
    /// The `[Component]` prefix of the message, without brackets.
    pub component: Option<String>,
    /// Message text with the component prefix removed.
    pub message: String,
    pub fields: HashMap<String, Value>,
    /// Fields of the enclosing span, if any.
    pub span: HashMap<String, Value>,
    pub timestamp: String,
}

pub struct EngineEventLayer {
    sender: mpsc::UnboundedSender<EngineEvent>,
}

impl EngineEventLayer {
    pub fn new(sender: mpsc::UnboundedSender<EngineEvent>) -> Self {
        Self { sender }
    }
}

/// Span fields stored in the span's extensions.
struct SpanFields(HashMap<String, Value>);

impl<S> Layer<S> for EngineEventLayer
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_new_span(&self, attrs: &Attributes<'_>, id: &Id, ctx: Context<'_, S>) {
        let mut fields = HashMap::new();
        attrs.record(&mut FieldVisitor(&mut fields));
        if let Some(span) = ctx.span(id) {
            span.extensions_mut().insert(SpanFields(fields));
        }
    }

    fn on_event(&self, event: &Event<'_>, ctx: Context<'_, S>) {
        let mut fields = HashMap::new();
        event.record(&mut FieldVisitor(&mut fields));

        let span = ctx
            .event_span(event)
            .and_then(|span| span.extensions().get::<SpanFields>().map(|f| f.0.clone()))
            .unwrap_or_default();

        let raw = fields
            .remove("message")
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_default();
        let (component, message) = split_component(&raw);

        let engine_event = EngineEvent {
            target: event.metadata().target().to_string(),
            level: event.metadata().level().to_string(),
            component,
            message,
            fields,
            span,
            timestamp: chrono::Utc::now().to_rfc3339(),
        };

        // A dropped receiver just means nobody is listening.
        let _ = self.sender.send(engine_event);
    }
}

fn split_component(message: &str) -> (Option<String>, String) {
    if let Some(rest) = message.strip_prefix('[') {
        if let Some((component, tail)) = rest.split_once(']') {
            if !component.is_empty() && !component.contains(char::is_whitespace) {
                return (Some(component.to_string()), tail.trim_start().to_string());
            }
        }
    }
    (None, message.to_string())
}

struct FieldVisitor<'a>(&'a mut HashMap<String, Value>);

impl tracing::field::Visit for FieldVisitor<'_> {
    fn record_f64(&mut self, field: &tracing::field::Field, value: f64) {
        self.0.insert(field.name().to_string(), serde_json::json!(value));
    }

    fn record_i64(&mut self, field: &tracing::field::Field, value: i64) {
        self.0.insert(field.name().to_string(), serde_json::json!(value));
    }

    fn record_u64(&mut self, field: &tracing::field::Field, value: u64) {
        self.0.insert(field.name().to_string(), serde_json::json!(value));
    }

    fn record_bool(&mut self, field: &tracing::field::Field, value: bool) {
        self.0.insert(field.name().to_string(), serde_json::json!(value));
    }

    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        self.0.insert(field.name().to_string(), serde_json::json!(value));
    }

    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        self.0.insert(
            field.name().to_string(),
            serde_json::json!(format!("{:?}", value)),
        );
    }
}
