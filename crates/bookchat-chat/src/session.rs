//! Chat session: one book, one exchange at a time, durable history.
//!
//! Each [`ChatSession::ask`] spawns a single task that owns the exchange:
//! the open stream, the [`RevealBuffer`], the pacer interval and the
//! [`FinalizeGuard`]. The task multiplexes the deadline, stream events and
//! pacer ticks, so buffer and pacer are never shared across exchanges.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::Instrument;

use bookchat_auth::AuthSession;
use bookchat_client::ApiClient;
use bookchat_core::{pair_history, BookId, ExchangeId, QaPair};

use crate::error::{ChatError, Result};
use crate::guard::FinalizeGuard;
use crate::history::HistoryApi;
use crate::pacer::RevealBuffer;
use crate::transport::{ChatTransport, SseTransport, StreamEvent, StreamRequest};
use crate::ChatConfig;

/// Lifecycle of the current exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExchangeState {
    /// No exchange, or the last one has been cleared from display.
    #[default]
    Idle,
    /// Stream open; fragments arriving and being revealed.
    Streaming,
    /// Stream completed; pacer revealing the remaining buffer.
    Draining,
    /// Answer committed to history and still on display.
    Finalized,
}

impl ExchangeState {
    /// Whether this state blocks a new question or a history clear.
    #[must_use]
    pub const fn is_active(self) -> bool {
        matches!(self, Self::Streaming | Self::Draining)
    }
}

/// Why an exchange was finalized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinishReason {
    /// The server signalled completion and the buffer fully drained.
    Completed,
    /// The stream failed or ended early; only revealed text was kept.
    StreamError,
    /// The exchange hit its deadline; only revealed text was kept.
    TimedOut,
}

/// The committed result of one exchange.
#[derive(Debug, Clone, PartialEq)]
pub struct ExchangeOutcome {
    /// Exchange identifier.
    pub id: ExchangeId,
    /// The question/answer pair appended to history.
    pub entry: QaPair,
    /// How the exchange ended.
    pub reason: FinishReason,
}

/// Progress notifications for an exchange.
#[derive(Debug, Clone, PartialEq)]
pub enum ExchangeUpdate {
    /// The revealed answer so far, one character longer than the last.
    Partial(String),
    /// The exchange was committed. No further updates follow.
    Finalized(ExchangeOutcome),
}

/// Handle to a running exchange.
#[derive(Debug)]
pub struct Exchange {
    id: ExchangeId,
    updates: mpsc::UnboundedReceiver<ExchangeUpdate>,
    outcome: oneshot::Receiver<ExchangeOutcome>,
}

impl Exchange {
    /// Exchange identifier.
    #[must_use]
    pub const fn id(&self) -> ExchangeId {
        self.id
    }

    /// Wait for the next update. `None` once the exchange task has ended.
    pub async fn next_update(&mut self) -> Option<ExchangeUpdate> {
        self.updates.recv().await
    }

    /// Wait for the committed outcome.
    ///
    /// # Errors
    ///
    /// Returns [`ChatError::TaskFailed`] if the exchange task ended without
    /// committing, which only happens if it panicked or the runtime shut down.
    pub async fn finish(self) -> Result<ExchangeOutcome> {
        self.outcome.await.map_err(|_| {
            ChatError::TaskFailed("exchange ended without an outcome".to_string())
        })
    }
}

/// A chat about one book.
///
/// Cheap to clone; clones share state.
#[derive(Clone)]
pub struct ChatSession {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    book_id: BookId,
    config: ChatConfig,
    auth: AuthSession,
    transport: Arc<dyn ChatTransport>,
    history_api: Arc<dyn HistoryApi>,
    state: Mutex<SessionState>,
}

#[derive(Debug, Default)]
struct SessionState {
    exchange: ExchangeState,
    current: Option<ExchangeId>,
    history: Vec<QaPair>,
    current_answer: String,
    pending_question: Option<String>,
    /// A history delete is in flight.
    clearing: bool,
}

/// Resets [`SessionState::clearing`] however the delete ends, including
/// when the caller drops the future.
struct ClearingGuard<'a>(&'a Mutex<SessionState>);

impl Drop for ClearingGuard<'_> {
    fn drop(&mut self) {
        self.0.lock().clearing = false;
    }
}

impl ChatSession {
    /// Create a session from explicit collaborators.
    #[must_use]
    pub fn new(
        book_id: BookId,
        config: ChatConfig,
        auth: AuthSession,
        transport: Arc<dyn ChatTransport>,
        history_api: Arc<dyn HistoryApi>,
    ) -> Self {
        Self {
            inner: Arc::new(SessionInner {
                book_id,
                config,
                auth,
                transport,
                history_api,
                state: Mutex::new(SessionState::default()),
            }),
        }
    }

    /// Create a session that streams over SSE from the client's backend and
    /// uses the client for history calls.
    ///
    /// # Errors
    ///
    /// Returns an error if the stream transport cannot be built.
    pub fn connect(book_id: BookId, config: ChatConfig, api: &ApiClient) -> Result<Self> {
        let transport = SseTransport::new(api.base_url(), config.connect_timeout())?;
        Ok(Self::new(
            book_id,
            config,
            api.session().clone(),
            Arc::new(transport),
            Arc::new(api.clone()),
        ))
    }

    /// Book this session is about.
    #[must_use]
    pub fn book_id(&self) -> &BookId {
        &self.inner.book_id
    }

    /// Timing configuration.
    #[must_use]
    pub fn config(&self) -> &ChatConfig {
        &self.inner.config
    }

    /// Committed question/answer pairs, oldest first.
    #[must_use]
    pub fn history(&self) -> Vec<QaPair> {
        self.inner.state.lock().history.clone()
    }

    /// State of the current exchange.
    #[must_use]
    pub fn state(&self) -> ExchangeState {
        self.inner.state.lock().exchange
    }

    /// Whether an exchange is streaming or draining.
    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.state().is_active()
    }

    /// The transient answer: revealed text while streaming, the committed
    /// answer during the display hold, empty otherwise.
    #[must_use]
    pub fn current_answer(&self) -> String {
        self.inner.state.lock().current_answer.clone()
    }

    /// The question being answered, cleared on finalize.
    #[must_use]
    pub fn pending_question(&self) -> Option<String> {
        self.inner.state.lock().pending_question.clone()
    }

    /// Ask a question.
    ///
    /// The exchange runs in the background; the returned handle yields
    /// partial answers and the committed outcome. Stream failures never
    /// surface here: they finalize the exchange with a partial answer.
    ///
    /// # Errors
    ///
    /// Returns [`ChatError::EmptyQuestion`] for blank input,
    /// [`ChatError::ExchangeActive`] if another exchange is streaming or
    /// draining or a history delete is in flight, and [`ChatError::Session`] if the token cannot be read.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    pub fn ask(&self, question: &str) -> Result<Exchange> {
        let (ctx, exchange, request, deadline) = self.begin(question)?;
        let span = tracing::info_span!(
            "exchange",
            exchange_id = %exchange.id,
            book_id = %self.inner.book_id,
        );
        tokio::spawn(run_exchange(ctx, request, deadline).instrument(span));
        Ok(exchange)
    }

    /// Validate, claim the single exchange slot and build the exchange parts.
    fn begin(
        &self,
        question: &str,
    ) -> Result<(ExchangeContext, Exchange, StreamRequest, Instant)> {
        if question.trim().is_empty() {
            return Err(ChatError::EmptyQuestion);
        }
        let access_token = self.inner.auth.access_token()?;
        let deadline = Instant::now() + self.inner.config.timeout();
        let id = ExchangeId::generate();

        {
            let mut state = self.inner.state.lock();
            if state.exchange.is_active() || state.clearing {
                return Err(ChatError::ExchangeActive);
            }
            state.exchange = ExchangeState::Streaming;
            state.current = Some(id);
            state.current_answer.clear();
            state.pending_question = Some(question.to_string());
        }

        let (updates_tx, updates_rx) = mpsc::unbounded_channel();
        let (outcome_tx, outcome_rx) = oneshot::channel();

        let ctx = ExchangeContext {
            id,
            question: question.to_string(),
            inner: Arc::clone(&self.inner),
            guard: FinalizeGuard::new(),
            updates: updates_tx,
            outcome: Some(outcome_tx),
        };
        let exchange = Exchange {
            id,
            updates: updates_rx,
            outcome: outcome_rx,
        };
        let request = StreamRequest {
            book_id: self.inner.book_id.clone(),
            question: question.to_string(),
            access_token,
        };

        tracing::info!(exchange_id = %id, book_id = %self.inner.book_id, "Question submitted");
        Ok((ctx, exchange, request, deadline))
    }

    /// Fetch the persisted log and replace in-memory history with its
    /// adjacent user/assistant pairs.
    ///
    /// # Errors
    ///
    /// Returns [`ChatError::Client`] if the history call fails; in-memory
    /// history is left unchanged.
    pub async fn load_history(&self) -> Result<Vec<QaPair>> {
        let messages = self
            .inner
            .history_api
            .fetch_history(&self.inner.book_id)
            .await?;
        let pairs = pair_history(&messages);
        tracing::debug!(
            book_id = %self.inner.book_id,
            messages = messages.len(),
            pairs = pairs.len(),
            "Loaded chat history"
        );

        self.inner.state.lock().history.clone_from(&pairs);
        Ok(pairs)
    }

    /// Delete the persisted log and empty in-memory history.
    ///
    /// New questions are refused until the delete resolves.
    ///
    /// # Errors
    ///
    /// Returns [`ChatError::ExchangeActive`] while an exchange is streaming
    /// or draining or another delete is in flight, and [`ChatError::Client`]
    /// if the delete call fails.
    pub async fn clear_history(&self) -> Result<()> {
        {
            let mut state = self.inner.state.lock();
            if state.exchange.is_active() || state.clearing {
                return Err(ChatError::ExchangeActive);
            }
            state.clearing = true;
        }
        let _clearing = ClearingGuard(&self.inner.state);

        self.inner
            .history_api
            .clear_history(&self.inner.book_id)
            .await?;

        let mut state = self.inner.state.lock();
        state.clearing = false;
        state.history.clear();
        state.current_answer.clear();
        state.pending_question = None;
        tracing::info!(book_id = %self.inner.book_id, "Chat history cleared");
        Ok(())
    }
}

impl std::fmt::Debug for ChatSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatSession")
            .field("book_id", &self.inner.book_id)
            .field("config", &self.inner.config)
            .field("state", &*self.inner.state.lock())
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Exchange task
// =============================================================================

/// Everything the exchange task needs to publish progress and commit.
struct ExchangeContext {
    id: ExchangeId,
    question: String,
    inner: Arc<SessionInner>,
    guard: FinalizeGuard,
    updates: mpsc::UnboundedSender<ExchangeUpdate>,
    outcome: Option<oneshot::Sender<ExchangeOutcome>>,
}

impl ExchangeContext {
    fn set_state(&self, next: ExchangeState) {
        let mut state = self.inner.state.lock();
        if state.current == Some(self.id) {
            state.exchange = next;
        }
    }

    fn publish(&self, partial: &str) {
        self.inner.state.lock().current_answer = partial.to_string();
        // The caller may have dropped its handle; the exchange still commits.
        let _ = self.updates.send(ExchangeUpdate::Partial(partial.to_string()));
    }

    /// Commit the exchange. Only the first call has any effect.
    fn finalize(&mut self, answer: String, reason: FinishReason) -> bool {
        if !self.guard.try_claim() {
            tracing::debug!(exchange_id = %self.id, ?reason, "Exchange already finalized");
            return false;
        }

        let entry = QaPair::new(self.question.clone(), answer);
        {
            let mut state = self.inner.state.lock();
            state.history.push(entry.clone());
            state.current_answer.clone_from(&entry.answer);
            state.pending_question = None;
            if state.current == Some(self.id) {
                state.exchange = ExchangeState::Finalized;
            }
        }

        tracing::info!(
            exchange_id = %self.id,
            ?reason,
            answer_chars = entry.answer.chars().count(),
            "Exchange finalized"
        );

        let outcome = ExchangeOutcome {
            id: self.id,
            entry,
            reason,
        };
        let _ = self.updates.send(ExchangeUpdate::Finalized(outcome.clone()));
        if let Some(tx) = self.outcome.take() {
            let _ = tx.send(outcome);
        }

        self.schedule_release();
        true
    }

    /// Clear the transient answer after the display hold, unless a newer
    /// exchange has taken over in the meantime.
    fn schedule_release(&self) {
        let inner = Arc::clone(&self.inner);
        let id = self.id;
        let hold = inner.config.display_hold();
        tokio::spawn(async move {
            tokio::time::sleep(hold).await;
            let mut state = inner.state.lock();
            if state.current == Some(id) && state.exchange == ExchangeState::Finalized {
                state.exchange = ExchangeState::Idle;
                state.current = None;
                state.current_answer.clear();
            }
        });
    }
}

async fn run_exchange(mut ctx: ExchangeContext, request: StreamRequest, deadline: Instant) {
    let transport = Arc::clone(&ctx.inner.transport);
    let opened = tokio::select! {
        biased;
        () = tokio::time::sleep_until(deadline) => None,
        opened = transport.open(&request) => Some(opened),
    };

    let mut stream = match opened {
        Some(Ok(stream)) => stream,
        Some(Err(e)) => {
            tracing::warn!(error = %e, "Failed to open chat stream");
            ctx.finalize(String::new(), FinishReason::StreamError);
            return;
        }
        None => {
            tracing::warn!("Chat stream did not open before the deadline");
            ctx.finalize(String::new(), FinishReason::TimedOut);
            return;
        }
    };

    let mut buffer = RevealBuffer::new();
    let mut pacer = tokio::time::interval(ctx.inner.config.reveal_tick());
    pacer.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut transport_open = true;

    let timeout = tokio::time::sleep_until(deadline);
    tokio::pin!(timeout);

    loop {
        tokio::select! {
            biased;

            () = &mut timeout => {
                stream.close();
                tracing::warn!(pending = buffer.pending_len(), "Exchange timed out");
                ctx.finalize(buffer.into_revealed(), FinishReason::TimedOut);
                return;
            }

            event = stream.next(), if transport_open => match event {
                Some(StreamEvent::Fragment(text)) => buffer.push(&text),
                Some(StreamEvent::Done) => {
                    stream.close();
                    transport_open = false;
                    ctx.set_state(ExchangeState::Draining);
                    tracing::debug!(pending = buffer.pending_len(), "Stream done; draining");
                }
                Some(StreamEvent::Error(message)) => {
                    stream.close();
                    tracing::warn!(error = %message, "Chat stream failed");
                    ctx.finalize(buffer.into_revealed(), FinishReason::StreamError);
                    return;
                }
                None => {
                    tracing::warn!("Chat stream ended without completion");
                    ctx.finalize(buffer.into_revealed(), FinishReason::StreamError);
                    return;
                }
            },

            _ = pacer.tick() => {
                if let Some(partial) = buffer.reveal_next() {
                    ctx.publish(partial);
                } else if !transport_open {
                    ctx.finalize(buffer.into_revealed(), FinishReason::Completed);
                    return;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use bookchat_auth::{MemoryTokenStore, ACCESS_TOKEN_KEY};
    use tokio::sync::Notify;
    use bookchat_client::ClientError;
    use bookchat_core::{ChatRole, HistoryMessage};

    use super::*;
    use crate::transport::EventStream;

    #[derive(Default)]
    struct ScriptedTransport {
        streams: Mutex<VecDeque<Result<EventStream>>>,
        requests: Mutex<Vec<StreamRequest>>,
    }

    impl ScriptedTransport {
        fn push_stream(&self) -> mpsc::Sender<StreamEvent> {
            let (tx, stream) = EventStream::channel(64);
            self.streams.lock().push_back(Ok(stream));
            tx
        }

        fn push_failure(&self) {
            self.streams
                .lock()
                .push_back(Err(ChatError::Transport("connection refused".to_string())));
        }
    }

    #[async_trait]
    impl ChatTransport for ScriptedTransport {
        async fn open(&self, request: &StreamRequest) -> Result<EventStream> {
            self.requests.lock().push(request.clone());
            self.streams
                .lock()
                .pop_front()
                .unwrap_or_else(|| Err(ChatError::Transport("no stream scripted".to_string())))
        }
    }

    #[derive(Default)]
    struct MockHistory {
        messages: Vec<HistoryMessage>,
        clears: AtomicUsize,
        /// When set, deletes wait for a permit.
        gate: Option<Notify>,
        fail_clear: bool,
    }

    #[async_trait]
    impl HistoryApi for MockHistory {
        async fn fetch_history(
            &self,
            _book_id: &BookId,
        ) -> std::result::Result<Vec<HistoryMessage>, ClientError> {
            Ok(self.messages.clone())
        }

        async fn clear_history(&self, _book_id: &BookId) -> std::result::Result<(), ClientError> {
            self.clears.fetch_add(1, Ordering::SeqCst);
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            if self.fail_clear {
                return Err(ClientError::Http {
                    status: 500,
                    status_text: "Internal Server Error".to_string(),
                });
            }
            Ok(())
        }
    }

    fn session(transport: Arc<ScriptedTransport>, history: Arc<MockHistory>) -> ChatSession {
        let store = MemoryTokenStore::with_entries([(ACCESS_TOKEN_KEY, "tok")]);
        ChatSession::new(
            BookId::new("book-1").unwrap(),
            ChatConfig::default(),
            AuthSession::new(Arc::new(store)),
            transport,
            history,
        )
    }

    fn fragment(text: &str) -> StreamEvent {
        StreamEvent::Fragment(text.to_string())
    }

    #[tokio::test(start_paused = true)]
    async fn completion_drains_every_buffered_character() {
        let transport = Arc::new(ScriptedTransport::default());
        let tx = transport.push_stream();
        let chat = session(Arc::clone(&transport), Arc::default());

        for event in [fragment("Hel"), fragment("lo wor"), fragment("ld"), StreamEvent::Done] {
            tx.send(event).await.unwrap();
        }

        let mut exchange = chat.ask("Greeting?").unwrap();
        let mut partials = Vec::new();
        let mut finalized = None;
        while let Some(update) = exchange.next_update().await {
            match update {
                ExchangeUpdate::Partial(text) => partials.push(text),
                ExchangeUpdate::Finalized(outcome) => finalized = Some(outcome),
            }
        }

        let outcome = finalized.unwrap();
        assert_eq!(outcome.reason, FinishReason::Completed);
        assert_eq!(outcome.entry, QaPair::new("Greeting?", "Hello world"));
        assert_eq!(partials.len(), "Hello world".len());
        assert_eq!(partials.first().map(String::as_str), Some("H"));
        assert!(partials.windows(2).all(|w| w[1].starts_with(w[0].as_str())));

        assert_eq!(exchange.finish().await.unwrap(), outcome);
        assert_eq!(chat.history(), vec![QaPair::new("Greeting?", "Hello world")]);
        assert_eq!(chat.state(), ExchangeState::Finalized);
        assert_eq!(chat.pending_question(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn error_commits_only_revealed_text() {
        let transport = Arc::new(ScriptedTransport::default());
        let tx = transport.push_stream();
        let chat = session(Arc::clone(&transport), Arc::default());

        let mut exchange = chat.ask("Q").unwrap();
        tx.send(fragment("Hello there")).await.unwrap();

        let mut last_partial = String::new();
        while last_partial.len() < 3 {
            if let Some(ExchangeUpdate::Partial(text)) = exchange.next_update().await {
                last_partial = text;
            }
        }
        tx.send(StreamEvent::Error("boom".to_string())).await.unwrap();

        let outcome = loop {
            match exchange.next_update().await {
                Some(ExchangeUpdate::Partial(text)) => last_partial = text,
                Some(ExchangeUpdate::Finalized(outcome)) => break outcome,
                None => panic!("exchange ended without an outcome"),
            }
        };
        assert_eq!(outcome.reason, FinishReason::StreamError);
        assert_eq!(outcome.entry.answer, last_partial);
        assert!(last_partial.starts_with("Hel"));
        assert!(last_partial.len() < "Hello there".len());
        assert_eq!(chat.history(), vec![QaPair::new("Q", last_partial)]);
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_forces_finalize_and_closes_stream() {
        let transport = Arc::new(ScriptedTransport::default());
        let tx = transport.push_stream();
        let chat = session(Arc::clone(&transport), Arc::default());

        let exchange = chat.ask("Slow?").unwrap();
        tx.send(fragment("ab")).await.unwrap();

        let outcome = exchange.finish().await.unwrap();
        assert_eq!(outcome.reason, FinishReason::TimedOut);
        assert_eq!(outcome.entry.answer, "ab");
        assert!(tx.send(fragment("late")).await.is_err());
        assert_eq!(chat.history(), vec![QaPair::new("Slow?", "ab")]);
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_during_drain_keeps_revealed_prefix() {
        let transport = Arc::new(ScriptedTransport::default());
        let tx = transport.push_stream();
        let chat = ChatSession::new(
            BookId::new("book-1").unwrap(),
            ChatConfig {
                timeout_seconds: 1,
                ..ChatConfig::default()
            },
            AuthSession::new(Arc::new(MemoryTokenStore::new())),
            Arc::clone(&transport) as Arc<dyn ChatTransport>,
            Arc::new(MockHistory::default()),
        );

        tx.send(fragment(&"x".repeat(500))).await.unwrap();
        tx.send(StreamEvent::Done).await.unwrap();

        let outcome = chat.ask("Long?").unwrap().finish().await.unwrap();
        assert_eq!(outcome.reason, FinishReason::TimedOut);
        assert!(!outcome.entry.answer.is_empty());
        assert!(outcome.entry.answer.len() < 500);
    }

    #[tokio::test(start_paused = true)]
    async fn stream_end_without_done_is_an_early_finalize() {
        let transport = Arc::new(ScriptedTransport::default());
        let tx = transport.push_stream();
        let chat = session(Arc::clone(&transport), Arc::default());

        let exchange = chat.ask("Q").unwrap();
        drop(tx);

        let outcome = exchange.finish().await.unwrap();
        assert_eq!(outcome.reason, FinishReason::StreamError);
        assert_eq!(outcome.entry.answer, "");
    }

    #[tokio::test(start_paused = true)]
    async fn open_failure_commits_empty_answer() {
        let transport = Arc::new(ScriptedTransport::default());
        transport.push_failure();
        let chat = session(Arc::clone(&transport), Arc::default());

        let outcome = chat.ask("Q").unwrap().finish().await.unwrap();
        assert_eq!(outcome.reason, FinishReason::StreamError);
        assert_eq!(chat.history(), vec![QaPair::new("Q", "")]);
        assert!(!chat.is_loading());
    }

    #[tokio::test(start_paused = true)]
    async fn finalize_commits_exactly_once() {
        let chat = session(Arc::default(), Arc::default());
        let (mut ctx, exchange, _request, _deadline) = chat.begin("Q").unwrap();

        assert!(ctx.finalize("first".to_string(), FinishReason::Completed));
        assert!(!ctx.finalize("second".to_string(), FinishReason::StreamError));
        assert!(!ctx.finalize("third".to_string(), FinishReason::TimedOut));

        assert_eq!(chat.history(), vec![QaPair::new("Q", "first")]);
        let outcome = exchange.finish().await.unwrap();
        assert_eq!(outcome.reason, FinishReason::Completed);
    }

    #[tokio::test(start_paused = true)]
    async fn rejects_empty_and_concurrent_questions() {
        let transport = Arc::new(ScriptedTransport::default());
        let tx = transport.push_stream();
        let chat = session(Arc::clone(&transport), Arc::default());

        assert!(matches!(chat.ask("   "), Err(ChatError::EmptyQuestion)));

        let exchange = chat.ask("First").unwrap();
        assert!(chat.is_loading());
        assert!(matches!(chat.ask("Second"), Err(ChatError::ExchangeActive)));

        tx.send(StreamEvent::Done).await.unwrap();
        exchange.finish().await.unwrap();
        assert!(!chat.is_loading());
    }

    #[tokio::test(start_paused = true)]
    async fn ask_rejected_while_clear_in_flight() {
        let transport = Arc::new(ScriptedTransport::default());
        let tx = transport.push_stream();
        let history = Arc::new(MockHistory {
            gate: Some(Notify::new()),
            ..MockHistory::default()
        });
        let chat = session(Arc::clone(&transport), Arc::clone(&history));

        let clearing = tokio::spawn({
            let chat = chat.clone();
            async move { chat.clear_history().await }
        });
        while history.clears.load(Ordering::SeqCst) == 0 {
            tokio::task::yield_now().await;
        }

        assert!(matches!(chat.ask("Q"), Err(ChatError::ExchangeActive)));
        assert!(matches!(chat.clear_history().await, Err(ChatError::ExchangeActive)));
        assert_eq!(chat.state(), ExchangeState::Idle);
        assert_eq!(chat.pending_question(), None);
        assert!(transport.requests.lock().is_empty());

        history.gate.as_ref().unwrap().notify_one();
        clearing.await.unwrap().unwrap();
        assert_eq!(history.clears.load(Ordering::SeqCst), 1);

        tx.send(fragment("ok")).await.unwrap();
        tx.send(StreamEvent::Done).await.unwrap();
        let outcome = chat.ask("Q").unwrap().finish().await.unwrap();
        assert_eq!(outcome.entry, QaPair::new("Q", "ok"));
        assert_eq!(chat.history(), vec![QaPair::new("Q", "ok")]);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_clear_allows_asking_again() {
        let transport = Arc::new(ScriptedTransport::default());
        let tx = transport.push_stream();
        let history = Arc::new(MockHistory {
            fail_clear: true,
            ..MockHistory::default()
        });
        let chat = session(Arc::clone(&transport), Arc::clone(&history));

        let err = chat.clear_history().await.unwrap_err();
        assert!(matches!(err, ChatError::Client(ClientError::Http { status: 500, .. })));

        tx.send(fragment("still here")).await.unwrap();
        tx.send(StreamEvent::Done).await.unwrap();
        let outcome = chat.ask("Q").unwrap().finish().await.unwrap();
        assert_eq!(outcome.reason, FinishReason::Completed);
        assert_eq!(outcome.entry.answer, "still here");
    }

    #[tokio::test(start_paused = true)]
    async fn clear_rejected_while_streaming_or_draining() {
        let transport = Arc::new(ScriptedTransport::default());
        let tx = transport.push_stream();
        let history = Arc::new(MockHistory::default());
        let chat = session(Arc::clone(&transport), Arc::clone(&history));

        let mut exchange = chat.ask("Q").unwrap();
        assert_eq!(chat.state(), ExchangeState::Streaming);
        assert!(matches!(chat.clear_history().await, Err(ChatError::ExchangeActive)));

        tx.send(fragment("abcdef")).await.unwrap();
        tx.send(StreamEvent::Done).await.unwrap();
        // First partial arrives once the fragment is buffered.
        exchange.next_update().await.unwrap();
        while chat.state() == ExchangeState::Streaming {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        assert_eq!(chat.state(), ExchangeState::Draining);
        assert!(matches!(chat.clear_history().await, Err(ChatError::ExchangeActive)));
        assert_eq!(history.clears.load(Ordering::SeqCst), 0);

        exchange.finish().await.unwrap();
        assert_eq!(chat.history().len(), 1);

        chat.clear_history().await.unwrap();
        assert!(chat.history().is_empty());
        assert_eq!(chat.current_answer(), "");
        assert_eq!(history.clears.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn display_hold_then_idle() {
        let transport = Arc::new(ScriptedTransport::default());
        let tx = transport.push_stream();
        let chat = session(Arc::clone(&transport), Arc::default());

        tx.send(fragment("ok")).await.unwrap();
        tx.send(StreamEvent::Done).await.unwrap();
        chat.ask("Q").unwrap().finish().await.unwrap();

        assert_eq!(chat.state(), ExchangeState::Finalized);
        assert_eq!(chat.current_answer(), "ok");

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(chat.state(), ExchangeState::Idle);
        assert_eq!(chat.current_answer(), "");
        assert_eq!(chat.history(), vec![QaPair::new("Q", "ok")]);
    }

    #[tokio::test(start_paused = true)]
    async fn display_hold_spares_a_newer_exchange() {
        let transport = Arc::new(ScriptedTransport::default());
        let first = transport.push_stream();
        let second = transport.push_stream();
        let chat = session(Arc::clone(&transport), Arc::default());

        first.send(StreamEvent::Done).await.unwrap();
        chat.ask("One").unwrap().finish().await.unwrap();

        let mut exchange = chat.ask("Two").unwrap();
        second.send(fragment("zz")).await.unwrap();
        exchange.next_update().await.unwrap();

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(chat.is_loading());
        assert_eq!(chat.pending_question().as_deref(), Some("Two"));
        assert!(!chat.current_answer().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn request_carries_token_and_book() {
        let transport = Arc::new(ScriptedTransport::default());
        let tx = transport.push_stream();
        let chat = session(Arc::clone(&transport), Arc::default());

        let exchange = chat.ask("Who?").unwrap();
        tx.send(StreamEvent::Done).await.unwrap();
        exchange.finish().await.unwrap();

        let requests = transport.requests.lock();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].question, "Who?");
        assert_eq!(requests[0].book_id.as_str(), "book-1");
        assert_eq!(requests[0].access_token.as_deref(), Some("tok"));
    }

    #[tokio::test]
    async fn load_history_pairs_adjacent_messages() {
        let history = Arc::new(MockHistory {
            messages: vec![
                HistoryMessage::new(ChatRole::User, "q1"),
                HistoryMessage::new(ChatRole::Assistant, "a1"),
                HistoryMessage::new(ChatRole::User, "orphan"),
                HistoryMessage::new(ChatRole::User, "q2"),
                HistoryMessage::new(ChatRole::Assistant, "a2"),
                HistoryMessage::new(ChatRole::User, "pending"),
            ],
            ..MockHistory::default()
        });
        let chat = session(Arc::default(), history);

        let pairs = chat.load_history().await.unwrap();
        assert_eq!(pairs, vec![QaPair::new("q1", "a1"), QaPair::new("q2", "a2")]);
        assert_eq!(chat.history(), pairs);
    }
}
