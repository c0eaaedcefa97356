//! Server-push transport for chat exchanges.
//!
//! Endpoint: GET /chat/stream?question=..&book_id=..&access_token=..
//!
//! The stream cannot carry an `Authorization` header, so the access token
//! travels as a query parameter. The URL is never logged.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use reqwest::header::ACCEPT;
use reqwest::Url;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use bookchat_core::BookId;

use crate::error::{ChatError, Result};
use crate::sse::SseParser;

const STREAM_PATH: &str = "/chat/stream";
const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Events delivered by an open chat stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// A text fragment of the answer.
    Fragment(String),
    /// The server finished the answer.
    Done,
    /// The server or the connection reported a failure.
    Error(String),
}

/// Parameters for opening one chat stream.
#[derive(Clone)]
pub struct StreamRequest {
    /// Book the question is about.
    pub book_id: BookId,
    /// The question text.
    pub question: String,
    /// Access token, if logged in.
    pub access_token: Option<String>,
}

impl fmt::Debug for StreamRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamRequest")
            .field("book_id", &self.book_id)
            .field("question", &self.question)
            .field("access_token", &self.access_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Receiving end of an open chat stream.
///
/// Dropping or closing the stream stops the background reader, which
/// releases the underlying connection.
#[derive(Debug)]
pub struct EventStream {
    events: mpsc::Receiver<StreamEvent>,
    reader: Option<JoinHandle<()>>,
}

impl EventStream {
    /// Wrap a receiver and the task feeding it.
    #[must_use]
    pub fn new(events: mpsc::Receiver<StreamEvent>, reader: Option<JoinHandle<()>>) -> Self {
        Self { events, reader }
    }

    /// Create a stream fed by the returned sender.
    #[must_use]
    pub fn channel(capacity: usize) -> (mpsc::Sender<StreamEvent>, Self) {
        let (tx, rx) = mpsc::channel(capacity);
        (tx, Self::new(rx, None))
    }

    /// Wait for the next event. `None` means the connection ended.
    pub async fn next(&mut self) -> Option<StreamEvent> {
        self.events.recv().await
    }

    /// Close the stream. Further sends from the producer fail.
    pub fn close(&mut self) {
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
        self.events.close();
    }
}

impl Drop for EventStream {
    fn drop(&mut self) {
        self.close();
    }
}

/// Opens server-push streams for chat questions.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Open a stream for one question.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established or the
    /// server rejects it.
    async fn open(&self, request: &StreamRequest) -> Result<EventStream>;
}

/// [`ChatTransport`] over HTTP server-sent events.
#[derive(Debug, Clone)]
pub struct SseTransport {
    client: reqwest::Client,
    base_url: String,
}

impl SseTransport {
    /// Create a transport for the given backend.
    ///
    /// Only the connect phase is bounded; the exchange deadline governs
    /// how long a stream may stay open.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(base_url: impl Into<String>, connect_timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .build()
            .map_err(|e| ChatError::Transport(e.to_string()))?;
        Ok(Self::with_client(client, base_url))
    }

    /// Create a transport with a custom HTTP client.
    #[must_use]
    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Build the stream URL for a request.
    ///
    /// `access_token` is only included when a token is present.
    ///
    /// # Errors
    ///
    /// Returns an error if the base URL is not a valid URL.
    pub fn stream_url(&self, request: &StreamRequest) -> Result<Url> {
        let mut url = Url::parse(&format!("{}{STREAM_PATH}", self.base_url))
            .map_err(|e| ChatError::Transport(format!("invalid stream url: {e}")))?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("question", &request.question);
            query.append_pair("book_id", request.book_id.as_str());
            if let Some(token) = &request.access_token {
                query.append_pair("access_token", token);
            }
        }
        Ok(url)
    }
}

#[async_trait]
impl ChatTransport for SseTransport {
    async fn open(&self, request: &StreamRequest) -> Result<EventStream> {
        let url = self.stream_url(request)?;
        tracing::debug!(
            book_id = %request.book_id,
            authenticated = request.access_token.is_some(),
            "Opening chat stream"
        );

        let response = self
            .client
            .get(url)
            .header(ACCEPT, "text/event-stream")
            .send()
            .await
            .map_err(|e| ChatError::Transport(e.without_url().to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ChatError::Transport(format!(
                "stream rejected with status {status}"
            )));
        }

        let body = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(reqwest::Error::without_url));

        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let reader = tokio::spawn(sse_reader(body, tx));
        Ok(EventStream::new(rx, Some(reader)))
    }
}

/// Task that parses the response body and forwards chat events.
///
/// Stops after the first terminal event. If the body ends without one,
/// the sender is dropped and the receiver sees the end of the stream.
async fn sse_reader<S, B, E>(body: S, tx: mpsc::Sender<StreamEvent>)
where
    S: Stream<Item = std::result::Result<B, E>>,
    B: AsRef<[u8]>,
    E: fmt::Display,
{
    let mut body = std::pin::pin!(body);
    let mut parser = SseParser::new();

    while let Some(chunk) = body.next().await {
        let chunk = match chunk {
            Ok(chunk) => chunk,
            Err(e) => {
                tracing::debug!(error = %e, "Chat stream interrupted");
                let _ = tx.send(StreamEvent::Error(e.to_string())).await;
                return;
            }
        };

        for event in parser.push_bytes(chunk.as_ref()) {
            let mapped = match event.event.as_str() {
                "message" => StreamEvent::Fragment(event.data),
                "done" => StreamEvent::Done,
                "error" if event.data.is_empty() => {
                    StreamEvent::Error("server reported an error".to_string())
                }
                "error" => StreamEvent::Error(event.data),
                other => {
                    tracing::trace!(event = other, "Ignoring unknown chat event");
                    continue;
                }
            };

            let terminal = !matches!(mapped, StreamEvent::Fragment(_));
            if tx.send(mapped).await.is_err() || terminal {
                return;
            }
        }
    }

    tracing::debug!("Chat stream ended without a terminal event");
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn request(token: Option<&str>) -> StreamRequest {
        StreamRequest {
            book_id: BookId::new("book-1").unwrap(),
            question: "Who & why?".to_string(),
            access_token: token.map(String::from),
        }
    }

    async fn collect(mut stream: EventStream) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        while let Some(event) = stream.next().await {
            events.push(event);
        }
        events
    }

    #[test]
    fn stream_url_encodes_parameters() {
        let transport = SseTransport::with_client(reqwest::Client::new(), "http://api.test/");
        let url = transport.stream_url(&request(Some("tok en"))).unwrap();

        assert_eq!(url.path(), "/chat/stream");
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert_eq!(
            pairs,
            vec![
                ("question".to_string(), "Who & why?".to_string()),
                ("book_id".to_string(), "book-1".to_string()),
                ("access_token".to_string(), "tok en".to_string()),
            ]
        );
    }

    #[test]
    fn stream_url_omits_missing_token() {
        let transport = SseTransport::with_client(reqwest::Client::new(), "http://api.test");
        let url = transport.stream_url(&request(None)).unwrap();
        assert!(url.query_pairs().all(|(key, _)| key != "access_token"));
    }

    #[test]
    fn request_debug_redacts_token() {
        let debug = format!("{:?}", request(Some("secret")));
        assert!(!debug.contains("secret"));
    }

    #[tokio::test]
    async fn reader_maps_events_and_stops_at_done() {
        let chunks: Vec<std::result::Result<&[u8], String>> = vec![
            Ok(b"data: Hel\n\nda".as_slice()),
            Ok(b"ta: lo\n\nevent: ping\ndata: x\n\n".as_slice()),
            Ok(b"event: done\ndata: [DONE]\n\ndata: after\n\n".as_slice()),
        ];
        let (tx, stream) = EventStream::channel(16);
        sse_reader(futures::stream::iter(chunks), tx).await;

        assert_eq!(
            collect(stream).await,
            vec![
                StreamEvent::Fragment("Hel".to_string()),
                StreamEvent::Fragment("lo".to_string()),
                StreamEvent::Done,
            ]
        );
    }

    #[tokio::test]
    async fn reader_reports_body_errors() {
        let chunks: Vec<std::result::Result<&[u8], String>> =
            vec![Ok(b"data: a\n\n".as_slice()), Err("connection reset".to_string())];
        let (tx, stream) = EventStream::channel(16);
        sse_reader(futures::stream::iter(chunks), tx).await;

        assert_eq!(
            collect(stream).await,
            vec![
                StreamEvent::Fragment("a".to_string()),
                StreamEvent::Error("connection reset".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn reader_maps_server_error_event() {
        let chunks: Vec<std::result::Result<&[u8], String>> =
            vec![Ok(b"event: error\n\n".as_slice())];
        let (tx, stream) = EventStream::channel(16);
        sse_reader(futures::stream::iter(chunks), tx).await;

        assert_eq!(
            collect(stream).await,
            vec![StreamEvent::Error("server reported an error".to_string())]
        );
    }

    #[tokio::test]
    async fn closed_stream_rejects_sends() {
        let (tx, mut stream) = EventStream::channel(4);
        stream.close();
        assert!(tx.send(StreamEvent::Done).await.is_err());
        assert_eq!(stream.next().await, None);
    }

    #[tokio::test]
    async fn open_streams_from_server() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/chat/stream"))
            .and(query_param("book_id", "book-1"))
            .and(query_param("access_token", "tok"))
            .and(header("accept", "text/event-stream"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/event-stream")
                    .set_body_string("data: Hi\n\ndata: !\n\nevent: done\ndata: \n\n"),
            )
            .expect(1)
            .mount(&server)
            .await;

        let transport = SseTransport::new(server.uri(), Duration::from_secs(5)).unwrap();
        let stream = transport.open(&request(Some("tok"))).await.unwrap();

        assert_eq!(
            collect(stream).await,
            vec![
                StreamEvent::Fragment("Hi".to_string()),
                StreamEvent::Fragment("!".to_string()),
                StreamEvent::Done,
            ]
        );
    }

    #[tokio::test]
    async fn open_rejects_unauthorized() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/chat/stream"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let transport = SseTransport::new(server.uri(), Duration::from_secs(5)).unwrap();
        let err = transport.open(&request(None)).await.unwrap_err();
        assert!(matches!(err, ChatError::Transport(msg) if msg.contains("401")));
    }
}
