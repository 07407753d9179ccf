use std::future::Future;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use solace_core::connectivity::ConnectivityProbe;
use solace_core::errors::GatewayError;
use solace_core::identity::Identity;
use solace_core::ids::SessionId;
use solace_core::messages::Message;
use solace_core::policy::PromptPolicy;
use solace_core::provider::ProviderGateway;

use crate::config::SessionConfig;
use crate::error::SessionError;
use crate::events::SessionEvent;
use crate::session::{LiveSession, Session, SessionState};
use crate::turn::{TurnStream, TurnTicket};

/// Owns one conversation at a time and runs its turns.
///
/// The session record sits behind a short-lived mutex shared with the live
/// [`TurnStream`]; the lock is never held across an await. The state field,
/// not the lock, is what keeps a session to one outstanding request.
pub struct SessionManager {
    config: SessionConfig,
    policy: Arc<dyn PromptPolicy>,
    gateway: Arc<dyn ProviderGateway>,
    connectivity: Arc<dyn ConnectivityProbe>,
    live: Arc<Mutex<LiveSession>>,
    events: broadcast::Sender<SessionEvent>,
}

impl SessionManager {
    /// Create the manager together with its first session.
    pub fn new(
        config: SessionConfig,
        policy: Arc<dyn PromptPolicy>,
        gateway: Arc<dyn ProviderGateway>,
        connectivity: Arc<dyn ConnectivityProbe>,
    ) -> Self {
        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        let live = create_session(&config.identity, policy.as_ref(), gateway.as_ref());
        info!(
            session_id = %live.session.id,
            provider = gateway.name(),
            model = gateway.model(),
            sending_enabled = live.session.sending_enabled,
            "session created"
        );
        Self {
            config,
            policy,
            gateway,
            connectivity,
            live: Arc::new(Mutex::new(live)),
            events,
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn policy(&self) -> &dyn PromptPolicy {
        self.policy.as_ref()
    }

    pub fn provider_name(&self) -> &str {
        self.gateway.name()
    }

    pub fn model(&self) -> &str {
        self.gateway.model()
    }

    pub fn session_id(&self) -> SessionId {
        self.live.lock().session.id.clone()
    }

    /// Read-only copy of the current session.
    pub fn snapshot(&self) -> Session {
        self.live.lock().session.clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Send one user message and stream the reply.
    ///
    /// Rejected without touching the log when the text is blank, a turn is
    /// already in flight, or sending is disabled. Otherwise the connectivity
    /// probe runs first; offline fails the turn before the provider is called.
    #[instrument(skip_all, fields(session_id = tracing::field::Empty))]
    pub async fn submit(&self, user_text: &str) -> Result<TurnStream, SessionError> {
        let text = user_text.trim();
        let deadline = self.config.turn_deadline.map(|d| Instant::now() + d);
        let mut ticket = self.reserve(text)?;
        tracing::Span::current().record("session_id", tracing::field::display(ticket.session_id()));
        let cancel = ticket.cancel_token().clone();

        let online = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ticket.abandon()),
            online = within(deadline, async { Ok::<_, GatewayError>(self.connectivity.is_online().await) }) => online,
        };
        match online {
            Ok(true) => {}
            Ok(false) => {
                let err = GatewayError::NetworkUnavailable("connectivity probe reported offline".into());
                return Err(ticket.fail(err.into()));
            }
            Err(e) => return Err(ticket.fail(e.into())),
        }

        let conversation = ticket.append_user(Message::user(text))?;
        info!(
            chars = text.len(),
            history = conversation.history.len(),
            "sending turn"
        );

        let opened = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ticket.abandon()),
            opened = within(deadline, self.gateway.send_and_stream(&conversation, text)) => opened,
        };
        match opened {
            Ok(inner) => Ok(TurnStream::new(ticket, inner, deadline)),
            Err(e) => Err(ticket.fail(e.into())),
        }
    }

    /// Replace the session with a fresh one. Any in-flight turn is cancelled
    /// and its late output discarded.
    pub fn clear(&self) -> Session {
        let fresh = create_session(&self.config.identity, self.policy.as_ref(), self.gateway.as_ref());
        let (old, session) = {
            let mut live = self.live.lock();
            live.cancel.cancel();
            let old = std::mem::replace(&mut *live, fresh);
            (old.session.id, live.session.clone())
        };

        info!(old = %old, new = %session.id, "session cleared");
        if self
            .events
            .send(SessionEvent::Cleared {
                old,
                new: session.id.clone(),
            })
            .is_err()
        {
            debug!("no session event receivers, event dropped");
        }
        session
    }

    fn reserve(&self, text: &str) -> Result<TurnTicket, SessionError> {
        let mut live = self.live.lock();
        if text.is_empty() {
            debug!("rejected blank message");
            return Err(SessionError::InvalidInput("message is empty".into()));
        }
        if live.session.state != SessionState::Idle {
            debug!(state = %live.session.state, "rejected message while busy");
            return Err(SessionError::InvalidInput(format!(
                "session is {}",
                live.session.state
            )));
        }
        if !live.session.sending_enabled {
            let reason = live
                .disabled_reason
                .clone()
                .unwrap_or_else(|| "provider not configured".into());
            return Err(SessionError::Configuration(reason));
        }

        live.session.state = SessionState::AwaitingResponse;
        live.session.last_error = None;
        Ok(TurnTicket::new(
            self.live.clone(),
            self.events.clone(),
            live.session.id.clone(),
            live.cancel.child_token(),
            live.session.messages.len(),
        ))
    }
}

fn create_session(
    identity: &Identity,
    policy: &dyn PromptPolicy,
    gateway: &dyn ProviderGateway,
) -> LiveSession {
    let id = SessionId::new();
    let system_prompt = policy.system_prompt();
    let greeting = Message::assistant(policy.greeting(identity));

    let (conversation, disabled) =
        match gateway.open_conversation(id.clone(), &system_prompt, std::slice::from_ref(&greeting)) {
            Ok(handle) => (Some(handle), None),
            Err(e) => {
                warn!(session_id = %id, provider = gateway.name(), error = %e, "provider unavailable, sending disabled");
                (None, Some(e))
            }
        };

    LiveSession {
        session: Session {
            id,
            system_prompt,
            messages: vec![greeting],
            state: SessionState::Idle,
            sending_enabled: conversation.is_some(),
            last_error: disabled.as_ref().map(GatewayError::kind),
        },
        conversation,
        disabled_reason: disabled.map(|e| e.to_string()),
        cancel: CancellationToken::new(),
    }
}

async fn within<T, F>(deadline: Option<Instant>, fut: F) -> Result<T, GatewayError>
where
    F: Future<Output = Result<T, GatewayError>>,
{
    match deadline {
        Some(at) => tokio::time::timeout_at(at, fut).await.unwrap_or_else(|_| {
            Err(GatewayError::NetworkUnavailable(
                "turn deadline exceeded".into(),
            ))
        }),
        None => fut.await,
    }
}
