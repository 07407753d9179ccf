use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::{stream, Stream, StreamExt};
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio::time::{Instant, Sleep};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use solace_core::errors::GatewayError;
use solace_core::ids::SessionId;
use solace_core::messages::Message;
use solace_core::provider::{ChunkStream, ConversationHandle};

use crate::error::SessionError;
use crate::events::SessionEvent;
use crate::session::{LiveSession, SessionState};

/// What a caller of `submit` sees as the reply arrives.
#[derive(Clone, Debug, PartialEq)]
pub enum TurnEvent {
    /// `text` is the reply accumulated so far, `delta` included.
    Partial { delta: String, text: String },
    /// The assistant message that was appended to the log.
    Complete(Message),
}

/// A claimed turn on one session. Every mutation goes through
/// [`with_current`](Self::with_current), so a turn whose session has been
/// replaced can no longer touch anything.
///
/// Dropping an unsettled ticket restores the log to its length at claim time
/// and returns the session to `Idle`.
pub(crate) struct TurnTicket {
    live: Arc<Mutex<LiveSession>>,
    events: broadcast::Sender<SessionEvent>,
    session_id: SessionId,
    cancel: CancellationToken,
    log_len: usize,
    user_message: Option<Message>,
    settled: bool,
}

impl TurnTicket {
    pub(crate) fn new(
        live: Arc<Mutex<LiveSession>>,
        events: broadcast::Sender<SessionEvent>,
        session_id: SessionId,
        cancel: CancellationToken,
        log_len: usize,
    ) -> Self {
        Self {
            live,
            events,
            session_id,
            cancel,
            log_len,
            user_message: None,
            settled: false,
        }
    }

    pub(crate) fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    pub(crate) fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    fn with_current<R>(&self, f: impl FnOnce(&mut LiveSession) -> R) -> Option<R> {
        let mut live = self.live.lock();
        if live.is_current(&self.session_id) {
            Some(f(&mut live))
        } else {
            None
        }
    }

    pub(crate) fn emit(&self, event: SessionEvent) {
        if self.events.send(event).is_err() {
            debug!("no session event receivers, event dropped");
        }
    }

    /// Append the user's message and hand back the conversation to send it on.
    pub(crate) fn append_user(&mut self, message: Message) -> Result<ConversationHandle, SessionError> {
        let pushed = message.clone();
        let conversation = self
            .with_current(move |live| {
                let conversation = live.conversation.clone()?;
                live.session.messages.push(pushed);
                Some(conversation)
            })
            .ok_or(SessionError::Cancelled)?
            .ok_or_else(|| SessionError::Configuration("provider conversation not open".into()))?;
        self.user_message = Some(message);
        Ok(conversation)
    }

    fn mark_streaming(&self) {
        let _ = self.with_current(|live| live.session.state = SessionState::Streaming);
    }

    fn rollback(&mut self) -> bool {
        self.settled = true;
        let log_len = self.log_len;
        self.with_current(|live| {
            live.session.messages.truncate(log_len);
            live.session.state = SessionState::Idle;
        })
        .is_some()
    }

    /// Give up without reporting. Used when the turn has been superseded.
    pub(crate) fn abandon(&mut self) -> SessionError {
        if self.rollback() {
            debug!(session_id = %self.session_id, "turn abandoned");
        }
        SessionError::Cancelled
    }

    /// Roll back the turn, report the failure, and leave the session idle.
    ///
    /// Returns `Cancelled` instead of `error` if the session was replaced in
    /// the meantime.
    pub(crate) fn fail(&mut self, error: SessionError) -> SessionError {
        self.settled = true;
        let kind = error.kind();
        let log_len = self.log_len;
        let current = self.with_current(|live| {
            live.session.messages.truncate(log_len);
            live.session.state = SessionState::Error;
            live.session.last_error = Some(kind);
        });
        if current.is_none() {
            debug!(session_id = %self.session_id, kind = %kind, "failure for replaced session ignored");
            return SessionError::Cancelled;
        }

        warn!(session_id = %self.session_id, kind = %kind, error = %error, "turn failed");
        self.emit(SessionEvent::Failed {
            session_id: self.session_id.clone(),
            kind,
            user_message: kind.user_message().to_string(),
        });
        let _ = self.with_current(|live| live.session.state = SessionState::Idle);
        error
    }

    /// Append the assistant reply and record the exchange on the conversation.
    /// An empty reply is still a reply: it is appended as-is.
    pub(crate) fn complete(&mut self, text: String) -> Result<Message, SessionError> {
        if text.is_empty() {
            debug!(session_id = %self.session_id, "provider returned an empty reply");
        }

        self.settled = true;
        let assistant = Message::assistant(text);
        let reply = assistant.clone();
        let user = self.user_message.clone();
        let committed = self.with_current(move |live| {
            live.session.messages.push(reply.clone());
            if let (Some(conversation), Some(user)) = (live.conversation.as_mut(), user) {
                conversation.record_exchange(user, reply);
            }
            live.session.state = SessionState::Idle;
            live.session.last_error = None;
        });
        if committed.is_none() {
            debug!(session_id = %self.session_id, "reply for replaced session discarded");
            return Err(SessionError::Cancelled);
        }

        info!(session_id = %self.session_id, chars = assistant.content.len(), "turn completed");
        self.emit(SessionEvent::Completed {
            session_id: self.session_id.clone(),
            message: assistant.clone(),
        });
        Ok(assistant)
    }
}

impl Drop for TurnTicket {
    fn drop(&mut self) {
        if !self.settled && self.rollback() {
            debug!(session_id = %self.session_id, "unfinished turn dropped, rolled back");
        }
    }
}

/// The reply to one `submit`, pulled lazily from the provider.
///
/// Yields a `Partial` per non-empty delta, then exactly one `Complete` (even
/// for an empty reply) or one error, then ends. Dropping it early cancels the
/// turn and closes the provider stream.
pub struct TurnStream {
    ticket: TurnTicket,
    inner: ChunkStream,
    text: String,
    started: bool,
    cancelled: Pin<Box<dyn Future<Output = ()> + Send>>,
    deadline: Option<Pin<Box<Sleep>>>,
    done: bool,
}

impl TurnStream {
    pub(crate) fn new(ticket: TurnTicket, inner: ChunkStream, deadline: Option<Instant>) -> Self {
        let token = ticket.cancel_token().clone();
        Self {
            ticket,
            inner,
            text: String::new(),
            started: false,
            cancelled: Box::pin(async move { token.cancelled().await }),
            deadline: deadline.map(|at| Box::pin(tokio::time::sleep_until(at))),
            done: false,
        }
    }

    pub fn session_id(&self) -> &SessionId {
        self.ticket.session_id()
    }

    /// Reply text received so far.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Drive the turn to its end and return the appended assistant message.
    pub async fn finish(mut self) -> Result<Message, SessionError> {
        while let Some(event) = self.next().await {
            if let TurnEvent::Complete(message) = event? {
                return Ok(message);
            }
        }
        Err(SessionError::Cancelled)
    }

    fn close(&mut self) {
        self.done = true;
        self.inner = Box::pin(stream::empty());
        self.deadline = None;
    }
}

impl Stream for TurnStream {
    type Item = Result<TurnEvent, SessionError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.done {
            return Poll::Ready(None);
        }

        if this.cancelled.as_mut().poll(cx).is_ready() {
            this.close();
            return Poll::Ready(Some(Err(this.ticket.abandon())));
        }

        if let Some(deadline) = this.deadline.as_mut() {
            if deadline.as_mut().poll(cx).is_ready() {
                this.close();
                let err = GatewayError::NetworkUnavailable("turn deadline exceeded".into());
                return Poll::Ready(Some(Err(this.ticket.fail(err.into()))));
            }
        }

        loop {
            match this.inner.as_mut().poll_next(cx) {
                Poll::Pending => return Poll::Pending,
                Poll::Ready(Some(Ok(chunk))) => {
                    if chunk.session_id != *this.ticket.session_id() {
                        debug!(chunk_session = %chunk.session_id, "chunk for another session ignored");
                        continue;
                    }
                    if !this.started {
                        this.started = true;
                        this.ticket.mark_streaming();
                    }
                    if chunk.delta.is_empty() {
                        continue;
                    }
                    this.text.push_str(&chunk.delta);
                    this.ticket.emit(SessionEvent::Partial {
                        session_id: chunk.session_id,
                        delta: chunk.delta.clone(),
                        text: this.text.clone(),
                    });
                    return Poll::Ready(Some(Ok(TurnEvent::Partial {
                        delta: chunk.delta,
                        text: this.text.clone(),
                    })));
                }
                Poll::Ready(Some(Err(e))) => {
                    this.close();
                    return Poll::Ready(Some(Err(this.ticket.fail(e.into()))));
                }
                Poll::Ready(None) => {
                    this.close();
                    let text = std::mem::take(&mut this.text);
                    return Poll::Ready(Some(this.ticket.complete(text).map(TurnEvent::Complete)));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use solace_core::messages::Message;
    use solace_core::policy::SystemPrompt;
    use solace_core::stream::StreamChunk;

    use super::*;
    use crate::session::Session;

    fn live_session(id: &SessionId) -> Arc<Mutex<LiveSession>> {
        let greeting = Message::assistant("hello");
        let prompt = SystemPrompt::new("be kind");
        Arc::new(Mutex::new(LiveSession {
            session: Session {
                id: id.clone(),
                system_prompt: prompt.clone(),
                messages: vec![greeting.clone()],
                state: SessionState::AwaitingResponse,
                sending_enabled: true,
                last_error: None,
            },
            conversation: Some(ConversationHandle::new(id.clone(), prompt, vec![greeting])),
            disabled_reason: None,
            cancel: CancellationToken::new(),
        }))
    }

    fn ticket(live: &Arc<Mutex<LiveSession>>, id: &SessionId) -> TurnTicket {
        let (tx, _) = broadcast::channel(16);
        let len = live.lock().session.messages.len();
        TurnTicket::new(live.clone(), tx, id.clone(), CancellationToken::new(), len)
    }

    #[test]
    fn dropped_ticket_rolls_back() {
        let id = SessionId::new();
        let live = live_session(&id);
        let mut t = ticket(&live, &id);
        t.append_user(Message::user("hi")).unwrap();
        assert_eq!(live.lock().session.messages.len(), 2);

        drop(t);
        let live = live.lock();
        assert_eq!(live.session.messages.len(), 1);
        assert_eq!(live.session.state, SessionState::Idle);
    }

    #[test]
    fn complete_records_exchange() {
        let id = SessionId::new();
        let live = live_session(&id);
        let mut t = ticket(&live, &id);
        t.append_user(Message::user("hi")).unwrap();
        let reply = t.complete("hello there".into()).unwrap();
        drop(t);

        let live = live.lock();
        assert_eq!(live.session.messages.last(), Some(&reply));
        assert_eq!(live.conversation.as_ref().unwrap().history.len(), 3);
        assert!(live.session.is_idle());
    }

    #[test]
    fn empty_reply_is_appended() {
        let id = SessionId::new();
        let live = live_session(&id);
        let mut t = ticket(&live, &id);
        t.append_user(Message::user("hi")).unwrap();
        let reply = t.complete(String::new()).unwrap();
        assert!(reply.is_assistant());
        assert_eq!(reply.content, "");
        drop(t);

        let live = live.lock();
        assert_eq!(live.session.messages.len(), 3);
        assert!(live.session.last_error.is_none());
        assert!(live.session.is_idle());
    }

    #[test]
    fn replaced_session_is_untouched() {
        let id = SessionId::new();
        let live = live_session(&id);
        let mut t = ticket(&live, &id);
        t.append_user(Message::user("hi")).unwrap();

        let other = live_session(&SessionId::new());
        let replacement = other.lock().clone_for_test();
        *live.lock() = replacement;

        let err = t.fail(GatewayError::unknown("boom").into());
        assert!(matches!(err, SessionError::Cancelled));
        assert_eq!(live.lock().session.messages.len(), 1);
        assert_eq!(live.lock().session.state, SessionState::AwaitingResponse);
    }

    #[tokio::test]
    async fn foreign_chunks_are_skipped() {
        let id = SessionId::new();
        let live = live_session(&id);
        let mut t = ticket(&live, &id);
        t.append_user(Message::user("hi")).unwrap();

        let chunks = vec![
            Ok(StreamChunk::delta(SessionId::from_raw("sess_stale"), "old")),
            Ok(StreamChunk::delta(id.clone(), "Hel")),
            Ok(StreamChunk::last(id.clone(), "lo")),
        ];
        let turn = TurnStream::new(t, Box::pin(stream::iter(chunks)), None);
        let message = turn.finish().await.unwrap();
        assert_eq!(message.content, "Hello");
    }

    impl LiveSession {
        fn clone_for_test(&self) -> LiveSession {
            LiveSession {
                session: self.session.clone(),
                conversation: self.conversation.clone(),
                disabled_reason: self.disabled_reason.clone(),
                cancel: CancellationToken::new(),
            }
        }
    }
}
