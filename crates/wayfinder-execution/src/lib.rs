//! Process-level wiring: engine launch, tracing bootstrap and the engine
//! event layer.

pub mod launch;
pub mod tracing_layer;

pub use launch::{launch, launch_with, run_until, run_until_signal, LaunchPaths};
pub use tracing_layer::{EngineEvent, EngineEventLayer};

use tokio::sync::mpsc;
use tracing_subscriber::util::TryInitError;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Installs the global subscriber.
///
/// The filter comes from `RUST_LOG` and defaults to `info`. With `json` the
/// console output is one JSON object per line. When `events` is given, every
/// event is also forwarded to it through [`EngineEventLayer`].
///
/// # Errors
///
/// Fails if a global subscriber is already installed.
pub fn init_tracing(
    json: bool,
    events: Option<mpsc::UnboundedSender<EngineEvent>>,
) -> Result<(), TryInitError> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry()
        .with(filter)
        .with(events.map(EngineEventLayer::new));

    if json {
        registry.with(fmt::layer().json()).try_init()
    } else {
        registry.with(fmt::layer()).try_init()
    }
}
