use super::models::{history_payload, Message};
use crate::llm::ChatMessage;
use async_trait::async_trait;
use futures::stream::{self, Stream, StreamExt};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::pin::pin;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub const APOLOGY: &str =
    "I apologize, but I encountered an error while processing your request. Please try again later.";

/// Pause between replayed words.
pub const DEFAULT_CHUNK_DELAY: Duration = Duration::from_millis(20);

pub const DEFAULT_ENDPOINT: &str = "/.netlify/functions/chat";

#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Endpoint returned {status}: {message}")]
    Status { status: u16, message: String },
    #[error("Endpoint error: {error}")]
    Endpoint {
        error: String,
        detail: Option<String>,
    },
    #[error("Parse error: {0}")]
    Parse(String),
}

/// Where complete replies come from.
#[async_trait]
pub trait ResponseSource: Send + Sync {
    async fn fetch(&self, history: &[ChatMessage], user_message: &str)
        -> Result<String, DeliveryError>;
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct OutboundRequest<'a> {
    history: &'a [ChatMessage],
    user_message: &'a str,
}

#[derive(Deserialize, Default)]
struct EndpointReply {
    #[serde(default)]
    response: Option<String>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    detail: Option<String>,
}

/// Calls the chat function over HTTP, one request per turn.
pub struct HttpResponseSource {
    client: Client,
    endpoint: String,
}

impl HttpResponseSource {
    /// `endpoint` is the absolute URL of the chat function,
    /// e.g. `https://fit2recover.org/.netlify/functions/chat`.
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            endpoint: endpoint.into(),
        }
    }

    /// The chat function expected under `origin` at its gateway path.
    pub fn for_site(origin: &str) -> Self {
        Self::new(format!("{}{}", origin.trim_end_matches('/'), DEFAULT_ENDPOINT))
    }
}

#[async_trait]
impl ResponseSource for HttpResponseSource {
    async fn fetch(
        &self,
        history: &[ChatMessage],
        user_message: &str,
    ) -> Result<String, DeliveryError> {
        let body = OutboundRequest {
            history,
            user_message,
        };

        let resp = self
            .client
            .post(&self.endpoint)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        let text = resp.text().await?;
        let parsed = serde_json::from_str::<EndpointReply>(&text);

        if !status.is_success() {
            let message = parsed
                .ok()
                .and_then(|r| r.error)
                .unwrap_or_else(|| "Failed to get response".to_string());
            return Err(DeliveryError::Status {
                status: status.as_u16(),
                message,
            });
        }

        let reply = parsed.map_err(|e| DeliveryError::Parse(e.to_string()))?;
        if let Some(error) = reply.error {
            return Err(DeliveryError::Endpoint {
                error,
                detail: reply.detail,
            });
        }

        Ok(reply.response.unwrap_or_default())
    }
}

/// Replays a finished reply as word-sized pieces.
///
/// Splits on single spaces. The first word comes out as is, every later one
/// with one leading space, so the pieces concatenate back to `text` exactly.
/// Waits `delay` before each piece after the first and ends as soon as
/// `cancel` fires.
pub fn replay(
    text: &str,
    delay: Duration,
    cancel: CancellationToken,
) -> impl Stream<Item = String> + Send + 'static {
    let pieces: Vec<String> = text
        .split(' ')
        .enumerate()
        .map(|(i, word)| {
            if i == 0 {
                word.to_string()
            } else {
                format!(" {}", word)
            }
        })
        .collect();

    stream::unfold((pieces.into_iter(), true), move |(mut rest, first)| async move {
        let piece = rest.next()?;
        if !first && !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        Some((piece, (rest, false)))
    })
    .take_until(cancel.cancelled_owned())
}

/// One round trip to the source, then a timed replay into `on_chunk`.
pub struct DeliveryAdapter<S> {
    source: S,
    delay: Duration,
}

impl<S: ResponseSource> DeliveryAdapter<S> {
    pub fn new(source: S) -> Self {
        Self::with_delay(source, DEFAULT_CHUNK_DELAY)
    }

    pub fn with_delay(source: S, delay: Duration) -> Self {
        Self { source, delay }
    }

    /// Never fails: transport and endpoint errors become a single apology
    /// chunk. Nothing is emitted once `cancel` has fired.
    pub async fn deliver(
        &self,
        history: &[Message],
        user_message: &str,
        cancel: &CancellationToken,
        mut on_chunk: impl FnMut(&str) + Send,
    ) {
        let payload = history_payload(history);

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::debug!("delivery cancelled before the reply arrived");
                return;
            }
            result = self.source.fetch(&payload, user_message) => result,
        };

        match result {
            Ok(text) => {
                let mut pieces = pin!(replay(&text, self.delay, cancel.clone()));
                while let Some(piece) = pieces.next().await {
                    on_chunk(&piece);
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "chat delivery failed");
                on_chunk(APOLOGY);
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::llm::HistoryRole;
    use crate::widget::models::Role;
    use std::sync::{Arc, Mutex};
    use tokio::sync::Notify;

    /// Scripted source; optionally parks each fetch until `gate` is notified.
    pub(crate) struct FakeSource {
        pub reply: Result<String, String>,
        pub gate: Option<Arc<Notify>>,
        pub calls: Arc<Mutex<Vec<(Vec<ChatMessage>, String)>>>,
    }

    impl FakeSource {
        pub fn ok(text: &str) -> Self {
            Self {
                reply: Ok(text.to_string()),
                gate: None,
                calls: Arc::default(),
            }
        }

        pub fn failing(error: &str) -> Self {
            Self {
                reply: Err(error.to_string()),
                gate: None,
                calls: Arc::default(),
            }
        }

        pub fn gated(mut self, gate: Arc<Notify>) -> Self {
            self.gate = Some(gate);
            self
        }
    }

    #[async_trait]
    impl ResponseSource for FakeSource {
        async fn fetch(
            &self,
            history: &[ChatMessage],
            user_message: &str,
        ) -> Result<String, DeliveryError> {
            self.calls
                .lock()
                .unwrap()
                .push((history.to_vec(), user_message.to_string()));
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            self.reply.clone().map_err(|error| DeliveryError::Endpoint {
                error,
                detail: None,
            })
        }
    }

    async fn collect(adapter: &DeliveryAdapter<FakeSource>, history: &[Message]) -> Vec<String> {
        let mut chunks = Vec::new();
        adapter
            .deliver(history, "hi", &CancellationToken::new(), |c| {
                chunks.push(c.to_string())
            })
            .await;
        chunks
    }

    #[tokio::test]
    async fn replay_emits_words_with_leading_spaces() {
        let pieces: Vec<String> =
            replay("Hello there friend", Duration::ZERO, CancellationToken::new())
                .collect()
                .await;
        assert_eq!(pieces, vec!["Hello", " there", " friend"]);
    }

    #[tokio::test]
    async fn replay_concatenates_back_to_source() {
        for text in ["one", "a b  c", " leading", "trailing ", "", "We  meet\nat 6pm."] {
            let pieces: Vec<String> = replay(text, Duration::ZERO, CancellationToken::new())
                .collect()
                .await;
            assert_eq!(pieces.concat(), text);
        }
    }

    #[tokio::test]
    async fn replay_of_empty_text_is_one_empty_piece() {
        let pieces: Vec<String> = replay("", Duration::ZERO, CancellationToken::new())
            .collect()
            .await;
        assert_eq!(pieces, vec![String::new()]);
    }

    #[tokio::test]
    async fn cancelled_replay_stops_emitting() {
        let cancel = CancellationToken::new();
        let mut pieces = pin!(replay("a b c", Duration::from_millis(5), cancel.clone()));

        assert_eq!(pieces.next().await.as_deref(), Some("a"));
        cancel.cancel();
        assert_eq!(pieces.next().await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn replay_pauses_before_each_later_word() {
        let delay = Duration::from_millis(20);
        let start = tokio::time::Instant::now();
        let mut pieces = pin!(replay("a b c", delay, CancellationToken::new()));

        assert_eq!(pieces.next().await.as_deref(), Some("a"));
        assert_eq!(start.elapsed(), Duration::ZERO);

        assert_eq!(pieces.next().await.as_deref(), Some(" b"));
        let after_second = start.elapsed();
        assert!(after_second >= delay && after_second < delay * 2);

        assert_eq!(pieces.next().await.as_deref(), Some(" c"));
        let after_third = start.elapsed();
        assert!(after_third >= delay * 2 && after_third < delay * 3);

        assert_eq!(pieces.next().await, None);
        assert!(start.elapsed() < delay * 3);
    }

    #[tokio::test(start_paused = true)]
    async fn default_adapter_types_at_twenty_millis() {
        assert_eq!(DEFAULT_CHUNK_DELAY, Duration::from_millis(20));

        let adapter = DeliveryAdapter::new(FakeSource::ok("one two"));
        assert_eq!(adapter.delay, DEFAULT_CHUNK_DELAY);

        let start = tokio::time::Instant::now();
        let mut chunks = Vec::new();
        adapter
            .deliver(&[], "hi", &CancellationToken::new(), |c| {
                chunks.push((c.to_string(), start.elapsed()))
            })
            .await;

        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0], ("one".to_string(), Duration::ZERO));
        assert_eq!(chunks[1].0, " two");
        assert!(chunks[1].1 >= DEFAULT_CHUNK_DELAY && chunks[1].1 < DEFAULT_CHUNK_DELAY * 2);
    }

    #[tokio::test]
    async fn pre_cancelled_replay_is_empty() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let pieces: Vec<String> = replay("a b", Duration::ZERO, cancel).collect().await;
        assert!(pieces.is_empty());
    }

    #[tokio::test]
    async fn success_is_forwarded_word_by_word() {
        let adapter =
            DeliveryAdapter::with_delay(FakeSource::ok("Hello there friend"), Duration::ZERO);
        assert_eq!(collect(&adapter, &[]).await, vec!["Hello", " there", " friend"]);
    }

    #[tokio::test]
    async fn failure_yields_single_apology() {
        let adapter = DeliveryAdapter::with_delay(FakeSource::failing("x"), Duration::ZERO);
        assert_eq!(collect(&adapter, &[]).await, vec![APOLOGY]);
    }

    #[tokio::test]
    async fn history_is_sent_with_folded_roles() {
        let source = FakeSource::ok("ok");
        let calls = source.calls.clone();
        let adapter = DeliveryAdapter::with_delay(source, Duration::ZERO);
        let history = vec![
            Message::new(Role::Model, "greeting"),
            Message::new(Role::System, "note"),
            Message::new(Role::User, "question"),
        ];

        collect(&adapter, &history).await;

        let calls = calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        let (sent, user_message) = &calls[0];
        assert_eq!(user_message, "hi");
        assert_eq!(
            sent.iter().map(|m| m.role).collect::<Vec<_>>(),
            vec![HistoryRole::Model, HistoryRole::Model, HistoryRole::User]
        );
        assert_eq!(sent[2].content, "question");
    }

    #[tokio::test]
    async fn cancelled_before_reply_emits_nothing() {
        let gate = Arc::new(Notify::new());
        let adapter =
            DeliveryAdapter::with_delay(FakeSource::failing("x").gated(gate), Duration::ZERO);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let mut chunks = Vec::new();
        adapter
            .deliver(&[], "hi", &cancel, |c| chunks.push(c.to_string()))
            .await;
        assert!(chunks.is_empty());
    }

    #[test]
    fn site_endpoint_uses_gateway_path() {
        let source = HttpResponseSource::for_site("https://fit2recover.org/");
        assert_eq!(source.endpoint, "https://fit2recover.org/.netlify/functions/chat");
    }
}
