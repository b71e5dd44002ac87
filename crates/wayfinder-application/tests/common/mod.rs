#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use futures::stream::{self, StreamExt};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use wayfinder_application::Engine;
use wayfinder_core::clock::ManualClock;
use wayfinder_core::config::EngineConfig;
use wayfinder_infrastructure::InMemoryBlobStore;
use wayfinder_interaction::{CompletionDispatcher, CompletionRequest, DispatchError, TextStream};

/// One scripted provider response.
pub enum Script {
    /// Stream these chunks, then end.
    Stream(Vec<&'static str>),
    /// Stream these chunks, then never finish.
    Hang(Vec<&'static str>),
    /// Return this text from the single-shot call.
    Single(&'static str),
    Fail(DispatchError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Call {
    Stream,
    Single,
}

/// Plays back scripted responses in order and records every call.
#[derive(Default)]
pub struct ScriptedDispatcher {
    scripts: Mutex<VecDeque<Script>>,
    pub requests: Mutex<Vec<(Call, CompletionRequest)>>,
    pub rekeys: Mutex<Vec<(String, String)>>,
    pub released: Mutex<Vec<String>>,
}

impl ScriptedDispatcher {
    pub fn new(scripts: Vec<Script>) -> Arc<Self> {
        Arc::new(Self {
            scripts: Mutex::new(scripts.into()),
            ..Self::default()
        })
    }

    pub fn push(&self, script: Script) {
        self.scripts.lock().unwrap().push_back(script);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.requests.lock().unwrap().iter().map(|(c, _)| *c).collect()
    }

    pub fn last_request(&self) -> CompletionRequest {
        self.requests
            .lock()
            .unwrap()
            .last()
            .map(|(_, r)| r.clone())
            .expect("Should have dispatched at least once")
    }

    fn next(&self) -> Script {
        self.scripts
            .lock()
            .unwrap()
            .pop_front()
            .expect("Dispatcher ran out of scripted responses")
    }
}

#[async_trait]
impl CompletionDispatcher for ScriptedDispatcher {
    async fn stream_complete(
        &self,
        request: CompletionRequest,
        _cancel: CancellationToken,
    ) -> Result<TextStream, DispatchError> {
        self.requests.lock().unwrap().push((Call::Stream, request));
        match self.next() {
            Script::Stream(chunks) => {
                Ok(stream::iter(chunks.into_iter().map(|c| Ok(c.to_string()))).boxed())
            }
            Script::Hang(chunks) => Ok(stream::iter(chunks.into_iter().map(|c| Ok(c.to_string())))
                .chain(stream::pending())
                .boxed()),
            Script::Single(text) => Ok(stream::iter(vec![Ok(text.to_string())]).boxed()),
            Script::Fail(error) => Err(error),
        }
    }

    async fn complete(
        &self,
        request: CompletionRequest,
        _cancel: CancellationToken,
    ) -> Result<String, DispatchError> {
        self.requests.lock().unwrap().push((Call::Single, request));
        match self.next() {
            Script::Single(text) => Ok(text.to_string()),
            Script::Stream(chunks) | Script::Hang(chunks) => Ok(chunks.concat()),
            Script::Fail(error) => Err(error),
        }
    }

    fn rekey_session(&self, from: &str, to: &str) {
        self.rekeys
            .lock()
            .unwrap()
            .push((from.to_string(), to.to_string()));
    }

    fn release_session(&self, thread_id: &str) {
        self.released.lock().unwrap().push(thread_id.to_string());
    }
}

pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 8, 14, 20, 0, 0).unwrap()
}

pub struct Harness {
    pub engine: Engine,
    pub dispatcher: Arc<ScriptedDispatcher>,
    pub store: Arc<InMemoryBlobStore>,
    pub clock: Arc<ManualClock>,
}

pub async fn start(scripts: Vec<Script>) -> Harness {
    start_with_store(scripts, Arc::new(InMemoryBlobStore::new())).await
}

pub async fn start_with_store(scripts: Vec<Script>, store: Arc<InMemoryBlobStore>) -> Harness {
    let dispatcher = ScriptedDispatcher::new(scripts);
    let clock = Arc::new(ManualClock::new(t0()));
    let engine = Engine::start(
        &EngineConfig::default(),
        store.clone(),
        dispatcher.clone(),
        clock.clone(),
    )
    .await
    .expect("Engine should start");
    Harness {
        engine,
        dispatcher,
        store,
        clock,
    }
}

/// Polls `condition` until it holds or a second has passed.
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    for _ in 0..200 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("Condition was not reached in time");
}
