use super::delivery::{DeliveryAdapter, ResponseSource};
use super::models::{Message, Role, GREETING};
use std::sync::Mutex;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

/// Stands in for a reply the panel was closed before receiving.
pub const INTERRUPTED: &str = "(Response stopped because the chat was closed.)";

/// Everything the chat panel renders.
#[derive(Debug, Clone)]
pub struct ChatState {
    pub messages: Vec<Message>,
    pub awaiting_response: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Submitted {
    Accepted,
    /// Blank input, or a reply was still being delivered.
    Ignored,
}

/// Owns the transcript of one chat panel.
///
/// State changes are published on a watch channel; each chunk appended to the
/// pending reply is one notification. Only one reply is delivered at a time.
pub struct TranscriptController<S> {
    adapter: DeliveryAdapter<S>,
    state: watch::Sender<ChatState>,
    panel: Mutex<CancellationToken>,
}

impl<S: ResponseSource> TranscriptController<S> {
    pub fn new(adapter: DeliveryAdapter<S>) -> Self {
        let (state, _) = watch::channel(ChatState {
            messages: vec![Message::new(Role::Model, GREETING)],
            awaiting_response: false,
        });
        Self {
            adapter,
            state,
            panel: Mutex::new(CancellationToken::new()),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<ChatState> {
        self.state.subscribe()
    }

    pub fn messages(&self) -> Vec<Message> {
        self.state.borrow().messages.clone()
    }

    pub fn is_awaiting_response(&self) -> bool {
        self.state.borrow().awaiting_response
    }

    pub async fn submit(&self, text: &str) -> Submitted {
        if text.trim().is_empty() {
            return Submitted::Ignored;
        }

        let cancel = self.panel_token();
        let mut pending = None;
        self.state.send_if_modified(|state| {
            if state.awaiting_response {
                return false;
            }
            let prior = state.messages.clone();
            let placeholder = Message::new(Role::Model, "");
            let placeholder_id = placeholder.id.clone();
            state.messages.push(Message::new(Role::User, text));
            state.messages.push(placeholder);
            state.awaiting_response = true;
            pending = Some((prior, placeholder_id));
            true
        });

        let Some((prior, placeholder_id)) = pending else {
            tracing::debug!("submit ignored while a reply is in flight");
            return Submitted::Ignored;
        };

        self.adapter
            .deliver(&prior, text, &cancel, |chunk| {
                self.state.send_modify(|state| {
                    if let Some(reply) = state
                        .messages
                        .iter_mut()
                        .rev()
                        .find(|m| m.id == placeholder_id)
                    {
                        reply.content.push_str(chunk);
                    }
                });
            })
            .await;

        let interrupted = cancel.is_cancelled();
        self.state.send_modify(|state| {
            if interrupted {
                if let Some(reply) = state
                    .messages
                    .iter_mut()
                    .rev()
                    .find(|m| m.id == placeholder_id && m.content.is_empty())
                {
                    reply.content.push_str(INTERRUPTED);
                }
            }
            state.awaiting_response = false;
        });
        Submitted::Accepted
    }

    /// Panel closed: stop any reply still being replayed. Reopening the panel
    /// keeps the transcript and delivers new replies normally.
    pub fn close(&self) {
        let mut token = self.panel.lock().unwrap_or_else(|e| e.into_inner());
        token.cancel();
        *token = CancellationToken::new();
    }

    fn panel_token(&self) -> CancellationToken {
        self.panel
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}
