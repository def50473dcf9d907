//! The inference client: one conversation session against the local model.
//!
//! Every call runs the same state machine:
//!
//! ```text
//! Idle ─▶ AwaitingHealthCheck ─┬─▶ RequestInFlight ──▶ Idle      (generate)
//!                              ├─▶ StreamingResponse ─▶ Idle     (generate_stream, on done)
//!                              └─▶ Failed                        (probe failed)
//! RequestInFlight / StreamingResponse ─▶ Failed                  (transport or API error)
//! ```
//!
//! The conversation store sits behind an async mutex held for the whole
//! call, including the lifetime of a response stream, so calls on one client
//! never interleave. A turn is recorded only after the full answer arrived.

use crate::context::ContextAssembler;
use crate::history::ConversationStore;
use futures::stream::{self, BoxStream, StreamExt};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info, warn};
use zema_config::{HistoryConfig, LlmConfig};
use zema_core::error::{Error, ProviderError, Result};
use zema_core::message::{ConversationTurn, TurnContext};
use zema_core::provider::{ChunkStream, Provider, ProviderRequest};

/// Text fragments of a streamed answer, in arrival order.
pub type TextStream = BoxStream<'static, Result<String>>;

/// Where the client is in its request cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ClientState {
    Idle = 0,
    AwaitingHealthCheck = 1,
    RequestInFlight = 2,
    StreamingResponse = 3,
    Failed = 4,
}

impl ClientState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            1 => Self::AwaitingHealthCheck,
            2 => Self::RequestInFlight,
            3 => Self::StreamingResponse,
            4 => Self::Failed,
            _ => Self::Idle,
        }
    }
}

/// Shared so a live stream can report its own transitions.
#[derive(Debug, Clone)]
struct StateCell(Arc<AtomicU8>);

impl StateCell {
    fn new() -> Self {
        Self(Arc::new(AtomicU8::new(ClientState::Idle as u8)))
    }

    fn get(&self) -> ClientState {
        ClientState::from_u8(self.0.load(Ordering::SeqCst))
    }

    fn set(&self, state: ClientState) {
        self.0.store(state as u8, Ordering::SeqCst);
    }
}

/// Returns the client to `Idle` if a call's future is dropped before it
/// settles into `Idle` or `Failed`.
struct InFlight {
    state: StateCell,
    armed: bool,
}

impl InFlight {
    fn new(state: &StateCell) -> Self {
        Self {
            state: state.clone(),
            armed: true,
        }
    }

    /// Hand state tracking over to a live stream.
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        let pending = matches!(
            self.state.get(),
            ClientState::AwaitingHealthCheck
                | ClientState::RequestInFlight
                | ClientState::StreamingResponse
        );
        if self.armed && pending {
            debug!("Call cancelled before completion; turn not recorded");
            self.state.set(ClientState::Idle);
        }
    }
}

/// Talks to the inference service and owns the conversation history.
pub struct InferenceClient {
    provider: Arc<dyn Provider>,
    assembler: ContextAssembler,
    model: String,
    temperature: f32,
    max_tokens: u32,
    /// Prior turns sent with each request.
    request_window: usize,
    /// Turns returned by [`InferenceClient::context_window`].
    context_window: usize,
    store: Arc<Mutex<ConversationStore>>,
    state: StateCell,
}

impl InferenceClient {
    pub fn new(provider: Arc<dyn Provider>, llm: &LlmConfig, history: &HistoryConfig) -> Self {
        Self {
            provider,
            assembler: ContextAssembler::new(llm.system_prompt.clone()),
            model: llm.model.clone(),
            temperature: llm.temperature,
            max_tokens: llm.max_tokens,
            request_window: history.request_window,
            context_window: history.context_window,
            store: Arc::new(Mutex::new(ConversationStore::new(history.retention_cap))),
            state: StateCell::new(),
        }
    }

    /// Replace the configured system prompt.
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.assembler = ContextAssembler::new(prompt);
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Switch models for subsequent requests. Streams already started keep
    /// the model they were opened with.
    pub fn set_model(&mut self, model: impl Into<String>) {
        let model = model.into();
        info!(from = %self.model, to = %model, "Switching model");
        self.model = model;
    }

    pub fn state(&self) -> ClientState {
        self.state.get()
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    /// Generate a complete answer and record the exchange.
    pub async fn generate(&self, user_input: &str, context: Option<&TurnContext>) -> Result<String> {
        let mut store = self.store.lock().await;
        let _in_flight = InFlight::new(&self.state);
        self.ensure_healthy().await?;

        let request = self.build_request(&store, user_input, context, false);
        self.state.set(ClientState::RequestInFlight);
        debug!(model = %request.model, messages = request.messages.len(), "Sending chat request");

        let response = match self.provider.complete(request).await {
            Ok(response) => response,
            Err(e) => {
                self.state.set(ClientState::Failed);
                warn!(error = %e, "Chat request failed");
                return Err(e.into());
            }
        };

        let text = response.message.content;
        store.append(user_input, text.clone(), context_map(context));
        self.state.set(ClientState::Idle);

        if let Some(usage) = response.usage {
            debug!(
                prompt_tokens = usage.prompt_tokens,
                completion_tokens = usage.completion_tokens,
                "Chat request complete"
            );
        }
        Ok(text)
    }

    /// Generate an answer as a stream of text fragments.
    ///
    /// The exchange is recorded when the service marks the stream done. A
    /// stream that errors, ends early, or is dropped records nothing. The
    /// client stays locked until the returned stream is finished or dropped.
    pub async fn generate_stream(
        &self,
        user_input: &str,
        context: Option<&TurnContext>,
    ) -> Result<TextStream> {
        let store = Arc::clone(&self.store).lock_owned().await;
        let in_flight = InFlight::new(&self.state);
        self.ensure_healthy().await?;

        let request = self.build_request(&store, user_input, context, true);
        self.state.set(ClientState::StreamingResponse);
        debug!(model = %request.model, messages = request.messages.len(), "Opening chat stream");

        let chunks = match self.provider.stream(request).await {
            Ok(chunks) => chunks,
            Err(e) => {
                self.state.set(ClientState::Failed);
                warn!(error = %e, "Chat stream failed to open");
                return Err(e.into());
            }
        };

        let session = StreamSession {
            chunks,
            store,
            user_input: user_input.to_string(),
            context: context_map(context),
            transcript: String::new(),
            state: self.state.clone(),
            finished: false,
        };
        in_flight.disarm();

        Ok(stream::unfold(session, |mut session| async move {
            let item = session.next_fragment().await?;
            Some((item, session))
        })
        .boxed())
    }

    /// Forget the whole conversation.
    pub async fn clear_history(&self) {
        let mut store = self.store.lock().await;
        let dropped = store.len();
        store.clear();
        info!(turns = dropped, "Conversation history cleared");
    }

    /// Copy of the last `limit` turns, oldest first.
    pub async fn history(&self, limit: usize) -> Vec<ConversationTurn> {
        self.store.lock().await.recent(limit).to_vec()
    }

    /// The configured display window of recent turns.
    pub async fn context_window(&self) -> Vec<ConversationTurn> {
        self.history(self.context_window).await
    }

    pub async fn history_len(&self) -> usize {
        self.store.lock().await.len()
    }

    async fn ensure_healthy(&self) -> Result<()> {
        self.state.set(ClientState::AwaitingHealthCheck);
        let reason = match self.provider.health_check().await {
            Ok(true) => return Ok(()),
            Ok(false) => "health check reported the service as not ready".to_string(),
            Err(e) => e.to_string(),
        };
        self.state.set(ClientState::Failed);
        warn!(provider = self.provider.name(), %reason, "Inference service unavailable");
        Err(Error::Provider(ProviderError::ServiceUnavailable(reason)))
    }

    fn build_request(
        &self,
        store: &ConversationStore,
        user_input: &str,
        context: Option<&TurnContext>,
        stream: bool,
    ) -> ProviderRequest {
        let window = store.recent(self.request_window);
        ProviderRequest {
            model: self.model.clone(),
            messages: self.assembler.build_messages(window, user_input, context),
            temperature: self.temperature,
            max_tokens: Some(self.max_tokens),
            stream,
        }
    }
}

fn context_map(context: Option<&TurnContext>) -> BTreeMap<String, serde_json::Value> {
    context.map(TurnContext::to_map).unwrap_or_default()
}

/// A live streamed answer. Owns the store lock and the connection; dropping
/// it releases both.
struct StreamSession {
    chunks: ChunkStream,
    store: OwnedMutexGuard<ConversationStore>,
    user_input: String,
    context: BTreeMap<String, serde_json::Value>,
    transcript: String,
    state: StateCell,
    finished: bool,
}

impl StreamSession {
    async fn next_fragment(&mut self) -> Option<Result<String>> {
        if self.finished {
            return None;
        }

        loop {
            match self.chunks.next().await {
                Some(Ok(chunk)) => {
                    let text = chunk.content.filter(|t| !t.is_empty());
                    if chunk.done {
                        if let Some(text) = &text {
                            self.transcript.push_str(text);
                        }
                        self.complete();
                        return text.map(Ok);
                    }
                    if let Some(text) = text {
                        self.transcript.push_str(&text);
                        return Some(Ok(text));
                    }
                }
                Some(Err(e)) => {
                    self.fail(&e);
                    return Some(Err(e.into()));
                }
                None => {
                    let e = ProviderError::StreamInterrupted(
                        "stream ended before the completion marker".into(),
                    );
                    self.fail(&e);
                    return Some(Err(e.into()));
                }
            }
        }
    }

    fn complete(&mut self) {
        let transcript = std::mem::take(&mut self.transcript);
        let context = std::mem::take(&mut self.context);
        self.store.append(self.user_input.as_str(), transcript, context);
        self.finished = true;
        self.state.set(ClientState::Idle);
    }

    fn fail(&mut self, error: &ProviderError) {
        warn!(error = %error, "Chat stream failed; turn not recorded");
        self.finished = true;
        self.state.set(ClientState::Failed);
    }
}

impl Drop for StreamSession {
    fn drop(&mut self) {
        if !self.finished {
            debug!(received = self.transcript.len(), "Chat stream abandoned; turn not recorded");
            self.state.set(ClientState::Idle);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{Scripted, ScriptedProvider, StreamEnd};
    use std::time::Duration;
    use zema_core::message::{Message, Role};

    fn client_with(provider: Arc<ScriptedProvider>) -> InferenceClient {
        client_with_history(provider, HistoryConfig::default())
    }

    fn client_with_history(provider: Arc<ScriptedProvider>, history: HistoryConfig) -> InferenceClient {
        let llm = LlmConfig {
            system_prompt: "You are X".into(),
            ..LlmConfig::default()
        };
        InferenceClient::new(provider, &llm, &history)
    }

    async fn collect(stream: TextStream) -> Vec<Result<String>> {
        stream.collect().await
    }

    #[tokio::test]
    async fn first_turn_is_recorded() {
        let provider = Arc::new(ScriptedProvider::replies(&["Hi there"]));
        let client = client_with(provider.clone());

        let text = client.generate("Hello", None).await.unwrap();
        assert_eq!(text, "Hi there");

        let history = client.history(10).await;
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].user_input, "Hello");
        assert_eq!(history[0].assistant_response, "Hi there");
        assert_eq!(client.state(), ClientState::Idle);

        let request = &provider.requests()[0];
        assert_eq!(request.model, "llama2:13b");
        assert_eq!(request.max_tokens, Some(512));
        assert!(!request.stream);
        assert_eq!(
            request.messages,
            vec![Message::system("You are X"), Message::user("Hello")]
        );
    }

    #[tokio::test]
    async fn failed_health_check_leaves_history_untouched() {
        let provider = Arc::new(ScriptedProvider::replies(&["first"]));
        let mut client = client_with(provider);
        client.generate("one", None).await.unwrap();
        let before = client.history(100).await;

        let down = Arc::new(ScriptedProvider::replies(&[]).unhealthy());
        client.provider = down.clone() as Arc<dyn Provider>;

        let err = client.generate("two", None).await.unwrap_err();
        assert!(err.is_unavailable());
        assert_eq!(client.state(), ClientState::Failed);
        assert_eq!(client.history(100).await, before);
        assert_eq!(down.health_checks(), 1);
        assert!(down.requests().is_empty());
    }

    #[tokio::test]
    async fn unreachable_service_is_unavailable() {
        let provider = Arc::new(ScriptedProvider::replies(&[]).unreachable());
        let client = client_with(provider.clone());

        let err = client.generate("hello", None).await.unwrap_err();
        assert!(matches!(
            err,
            Error::Provider(ProviderError::ServiceUnavailable(_))
        ));
        assert_eq!(client.history_len().await, 0);

        let err = client.generate_stream("hello", None).await.err().unwrap();
        assert!(err.is_unavailable());
        assert!(provider.requests().is_empty());
    }

    #[tokio::test]
    async fn request_carries_vision_then_history_then_input() {
        let provider = Arc::new(ScriptedProvider::replies(&["a cup", "blue"]));
        let client = client_with(provider.clone());

        let vision = TurnContext::with_vision("a blue cup on a desk");
        client.generate("what is this?", Some(&vision)).await.unwrap();
        client.generate("what colour?", None).await.unwrap();

        let second = &provider.requests()[1];
        assert_eq!(
            second.messages,
            vec![
                Message::system("You are X"),
                Message::user("what is this?"),
                Message::assistant("a cup"),
                Message::user("what colour?"),
            ]
        );

        let first = &provider.requests()[0];
        assert_eq!(first.messages[1].role, Role::System);
        assert_eq!(first.messages[1].content, "Vision context: a blue cup on a desk");

        let history = client.history(10).await;
        assert_eq!(history[0].context["vision_description"], "a blue cup on a desk");
        assert!(history[1].context.is_empty());
    }

    #[tokio::test]
    async fn request_window_limits_prior_turns() {
        let replies: Vec<String> = (0..4).map(|i| format!("a{i}")).collect();
        let replies: Vec<&str> = replies.iter().map(String::as_str).collect();
        let provider = Arc::new(ScriptedProvider::replies(&replies));
        let history = HistoryConfig {
            request_window: 2,
            ..HistoryConfig::default()
        };
        let client = client_with_history(provider.clone(), history);

        for i in 0..4 {
            client.generate(&format!("q{i}"), None).await.unwrap();
        }

        let last = &provider.requests()[3];
        // system + 2 prior turns + input
        assert_eq!(last.messages.len(), 6);
        assert_eq!(last.messages[1], Message::user("q1"));
        assert_eq!(last.messages[4], Message::assistant("a2"));
        assert_eq!(last.messages[5], Message::user("q3"));
    }

    #[tokio::test]
    async fn retention_cap_bounds_history() {
        let replies = vec!["ok"; 5];
        let provider = Arc::new(ScriptedProvider::replies(&replies));
        let history = HistoryConfig {
            retention_cap: 3,
            request_window: 3,
            context_window: 3,
        };
        let client = client_with_history(provider, history);

        for i in 0..5 {
            client.generate(&format!("q{i}"), None).await.unwrap();
        }

        let kept: Vec<String> = client
            .history(100)
            .await
            .into_iter()
            .map(|t| t.user_input)
            .collect();
        assert_eq!(kept, vec!["q2", "q3", "q4"]);
        assert_eq!(client.context_window().await.len(), 3);
    }

    #[tokio::test]
    async fn provider_error_is_surfaced_without_recording() {
        let provider = Arc::new(ScriptedProvider::new(vec![Scripted::Error(
            ProviderError::ApiError {
                status_code: 500,
                message: "boom".into(),
            },
        )]));
        let client = client_with(provider);

        let err = client.generate("hi", None).await.unwrap_err();
        assert!(!err.is_unavailable());
        assert!(matches!(
            err,
            Error::Provider(ProviderError::ApiError { status_code: 500, .. })
        ));
        assert_eq!(client.state(), ClientState::Failed);
        assert_eq!(client.history_len().await, 0);
    }

    #[tokio::test]
    async fn completed_stream_records_the_transcript() {
        let provider = Arc::new(ScriptedProvider::new(vec![Scripted::stream(
            &["Hel", "", "lo", " there"],
            StreamEnd::Done,
        )]));
        let client = client_with(provider.clone());

        let stream = client.generate_stream("Hi", None).await.unwrap();
        assert_eq!(client.state(), ClientState::StreamingResponse);

        let fragments: Vec<String> = collect(stream).await.into_iter().map(|r| r.unwrap()).collect();
        assert_eq!(fragments, vec!["Hel", "lo", " there"]);

        let history = client.history(10).await;
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].assistant_response, "Hello there");
        assert_eq!(client.state(), ClientState::Idle);
        assert!(provider.requests()[0].stream);

        let connections = provider.connections();
        assert_eq!(connections.opened(), 1);
        assert_eq!(connections.closed(), 1);
    }

    #[tokio::test]
    async fn abandoned_stream_releases_connection_and_lock() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            Scripted::stream(&["one", "two", "three"], StreamEnd::Done),
            Scripted::text("again"),
        ]));
        let client = client_with(provider.clone());
        let connections = provider.connections();

        let mut stream = client.generate_stream("count", None).await.unwrap();
        let first = stream.next().await.unwrap().unwrap();
        assert_eq!(first, "one");
        assert_eq!(connections.opened(), 1);
        assert_eq!(connections.closed(), 0);

        drop(stream);
        assert_eq!(connections.closed(), 1);
        assert_eq!(client.state(), ClientState::Idle);
        assert_eq!(client.history_len().await, 0);

        // Lock is free again: a fresh call goes through.
        let text = tokio::time::timeout(Duration::from_secs(1), client.generate("again?", None))
            .await
            .expect("client still locked")
            .unwrap();
        assert_eq!(text, "again");
        assert_eq!(client.history_len().await, 1);
    }

    #[tokio::test]
    async fn truncated_stream_is_an_error() {
        let provider = Arc::new(ScriptedProvider::new(vec![Scripted::stream(
            &["partial"],
            StreamEnd::Truncated,
        )]));
        let client = client_with(provider.clone());

        let items = collect(client.generate_stream("hi", None).await.unwrap()).await;
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].as_ref().unwrap(), "partial");
        assert!(matches!(
            items[1],
            Err(Error::Provider(ProviderError::StreamInterrupted(_)))
        ));
        assert_eq!(client.state(), ClientState::Failed);
        assert_eq!(client.history_len().await, 0);
        assert_eq!(provider.connections().closed(), 1);
    }

    #[tokio::test]
    async fn mid_stream_error_stops_the_stream() {
        let provider = Arc::new(ScriptedProvider::new(vec![Scripted::stream(
            &["a", "b"],
            StreamEnd::Error(ProviderError::Timeout("read timed out".into())),
        )]));
        let client = client_with(provider);

        let items = collect(client.generate_stream("hi", None).await.unwrap()).await;
        assert_eq!(items.len(), 3);
        assert!(items[2].as_ref().unwrap_err().is_unavailable());
        assert_eq!(client.history_len().await, 0);
    }

    #[tokio::test]
    async fn cancelled_generate_returns_to_idle() {
        let provider = Arc::new(
            ScriptedProvider::replies(&["too late", "next"]).with_delay(Duration::from_millis(200)),
        );
        let client = client_with(provider.clone());

        let cancelled =
            tokio::time::timeout(Duration::from_millis(20), client.generate("hi", None)).await;
        assert!(cancelled.is_err());
        assert_eq!(client.state(), ClientState::Idle);
        assert_eq!(client.history_len().await, 0);

        assert_eq!(client.generate("again", None).await.unwrap(), "next");
        assert_eq!(client.state(), ClientState::Idle);
        assert_eq!(client.history_len().await, 1);
    }

    #[tokio::test]
    async fn failed_call_stays_failed_after_return() {
        let provider = Arc::new(ScriptedProvider::replies(&[]).unreachable());
        let client = client_with(provider);
        assert!(client.generate("hi", None).await.is_err());
        assert_eq!(client.state(), ClientState::Failed);
    }

    #[tokio::test]
    async fn set_model_applies_to_next_request() {
        let provider = Arc::new(ScriptedProvider::replies(&["one", "two"]));
        let mut client = client_with(provider.clone());

        client.generate("a", None).await.unwrap();
        client.set_model("mistral:7b");
        assert_eq!(client.model(), "mistral:7b");
        client.generate("b", None).await.unwrap();

        let requests = provider.requests();
        assert_eq!(requests[0].model, "llama2:13b");
        assert_eq!(requests[1].model, "mistral:7b");
    }

    #[tokio::test]
    async fn clear_history_empties_the_store() {
        let provider = Arc::new(ScriptedProvider::replies(&["x", "y"]));
        let client = client_with(provider.clone());
        client.generate("a", None).await.unwrap();
        client.clear_history().await;
        assert_eq!(client.history_len().await, 0);

        client.generate("b", None).await.unwrap();
        // No trace of the cleared turn in the next request.
        assert_eq!(provider.requests()[1].messages.len(), 2);
    }

    #[tokio::test]
    async fn concurrent_calls_are_serialized() {
        let provider = Arc::new(
            ScriptedProvider::replies(&["first", "second"]).with_delay(Duration::from_millis(20)),
        );
        let client = client_with(provider.clone());

        let (a, b) = tokio::join!(client.generate("A", None), client.generate("B", None));
        assert_eq!(a.unwrap(), "first");
        assert_eq!(b.unwrap(), "second");

        // The second request saw the first turn already recorded.
        let second = &provider.requests()[1];
        assert_eq!(second.messages[1], Message::user("A"));
        assert_eq!(second.messages[2], Message::assistant("first"));

        let order: Vec<String> = client.history(10).await.into_iter().map(|t| t.user_input).collect();
        assert_eq!(order, vec!["A", "B"]);
    }

    #[tokio::test]
    async fn preset_prompt_replaces_configured_prompt() {
        let provider = Arc::new(ScriptedProvider::replies(&["ok"]));
        let client = client_with(provider.clone()).with_system_prompt("Tools only");
        client.generate("hi", None).await.unwrap();
        assert_eq!(provider.requests()[0].messages[0], Message::system("Tools only"));
    }
}
