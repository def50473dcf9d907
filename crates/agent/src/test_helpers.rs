//! Shared test helpers: a scripted in-process stand-in for the inference service.

use futures::stream::{self, StreamExt};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use zema_core::error::ProviderError;
use zema_core::message::Message;
use zema_core::provider::{ChunkStream, Provider, ProviderRequest, ProviderResponse, StreamChunk};

/// How a scripted stream finishes after its fragments.
#[derive(Debug, Clone)]
pub enum StreamEnd {
    /// A final chunk with `done: true`.
    Done,
    /// The connection just stops.
    Truncated,
    /// A transport error in place of the done marker.
    Error(ProviderError),
}

/// One scripted reply, consumed by the next `complete` or `stream` call.
#[derive(Debug, Clone)]
pub enum Scripted {
    Text(String),
    Error(ProviderError),
    Stream { fragments: Vec<String>, end: StreamEnd },
}

impl Scripted {
    pub fn text(text: &str) -> Self {
        Self::Text(text.to_string())
    }

    pub fn stream(fragments: &[&str], end: StreamEnd) -> Self {
        Self::Stream {
            fragments: fragments.iter().map(|f| f.to_string()).collect(),
            end,
        }
    }
}

#[derive(Debug, Clone)]
enum Health {
    Healthy,
    Unhealthy,
    Unreachable,
}

/// Counts opened and closed streaming connections.
#[derive(Debug, Default)]
pub struct ConnectionCounter {
    opened: AtomicUsize,
    closed: AtomicUsize,
}

impl ConnectionCounter {
    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }
}

/// Held by a scripted stream; closing the connection is dropping the stream.
struct ConnectionGuard(Arc<ConnectionCounter>);

impl ConnectionGuard {
    fn open(counter: &Arc<ConnectionCounter>) -> Self {
        counter.opened.fetch_add(1, Ordering::SeqCst);
        Self(Arc::clone(counter))
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.0.closed.fetch_add(1, Ordering::SeqCst);
    }
}

/// A provider that replays a script and records every request it receives.
///
/// Panics if called more often than the script allows.
pub struct ScriptedProvider {
    script: Mutex<VecDeque<Scripted>>,
    health: Mutex<Health>,
    requests: Mutex<Vec<ProviderRequest>>,
    health_checks: AtomicUsize,
    delay: Option<Duration>,
    connections: Arc<ConnectionCounter>,
}

impl ScriptedProvider {
    pub fn new(script: Vec<Scripted>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            health: Mutex::new(Health::Healthy),
            requests: Mutex::new(Vec::new()),
            health_checks: AtomicUsize::new(0),
            delay: None,
            connections: Arc::new(ConnectionCounter::default()),
        }
    }

    pub fn replies(texts: &[&str]) -> Self {
        Self::new(texts.iter().map(|t| Scripted::text(t)).collect())
    }

    /// Sleep this long inside every `complete`, to widen race windows.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Health probe answers, but reports not healthy.
    pub fn unhealthy(self) -> Self {
        *self.health.lock().unwrap() = Health::Unhealthy;
        self
    }

    /// Health probe fails as if the service were down.
    pub fn unreachable(self) -> Self {
        *self.health.lock().unwrap() = Health::Unreachable;
        self
    }

    pub fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn health_checks(&self) -> usize {
        self.health_checks.load(Ordering::SeqCst)
    }

    pub fn connections(&self) -> Arc<ConnectionCounter> {
        Arc::clone(&self.connections)
    }

    fn next_reply(&self, request: ProviderRequest) -> Scripted {
        self.requests.lock().unwrap().push(request);
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .expect("ScriptedProvider: script exhausted")
    }
}

#[async_trait::async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        let model = request.model.clone();
        let reply = self.next_reply(request);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        match reply {
            Scripted::Text(text) => Ok(ProviderResponse {
                message: Message::assistant(text),
                usage: None,
                model,
            }),
            Scripted::Error(e) => Err(e),
            Scripted::Stream { .. } => panic!("ScriptedProvider: stream scripted for complete()"),
        }
    }

    async fn stream(&self, request: ProviderRequest) -> Result<ChunkStream, ProviderError> {
        let (fragments, end) = match self.next_reply(request) {
            Scripted::Stream { fragments, end } => (fragments, end),
            Scripted::Error(e) => return Err(e),
            Scripted::Text(_) => panic!("ScriptedProvider: text scripted for stream()"),
        };

        let mut items: Vec<Result<StreamChunk, ProviderError>> = fragments
            .into_iter()
            .map(|text| {
                Ok(StreamChunk {
                    content: Some(text),
                    ..Default::default()
                })
            })
            .collect();
        match end {
            StreamEnd::Done => items.push(Ok(StreamChunk {
                done: true,
                ..Default::default()
            })),
            StreamEnd::Truncated => {}
            StreamEnd::Error(e) => items.push(Err(e)),
        }

        let guard = ConnectionGuard::open(&self.connections);
        Ok(stream::iter(items)
            .map(move |item| {
                let _held = &guard;
                item
            })
            .boxed())
    }

    async fn health_check(&self) -> Result<bool, ProviderError> {
        self.health_checks.fetch_add(1, Ordering::SeqCst);
        match *self.health.lock().unwrap() {
            Health::Healthy => Ok(true),
            Health::Unhealthy => Ok(false),
            Health::Unreachable => Err(ProviderError::ServiceUnavailable(
                "connection refused".into(),
            )),
        }
    }
}
