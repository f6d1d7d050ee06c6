//! Retry state machine delivering one message's bodies.
//!
//! ```text
//!            ┌──────────────── success ───────────────▶ Success
//!            │
//! Sending ───┤ failure ──▶ tries >= retries ──────────▶ Exhausted
//!    ▲       │                   │ no
//!    │       │                   ▼
//!    │       └────────────── Retrying (sleep) ── cancel ▶ Cancelled
//!    │                           │
//!    │                failures >= threshold?
//!    │                   │ no          │ yes
//!    └───────────────────┘      Reauthenticating
//!    └─────────────────────────────────┘
//! ```
//!
//! Bodies already acknowledged are skipped on later attempts, so a message
//! with a duplicated exists copy never re-posts the half that succeeded.

use std::sync::Arc;

use bytes::Bytes;
use chrono::Utc;
use relay_core::{
    Clock, DeliveryEvent, DeliveryExhaustedEvent, DeliveryFailedEvent, DeliverySucceededEvent,
    EventHandler, MessageId, NoOpEventHandler, RealClock,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{
    auth::{NoAuth, StaticToken, TokenProvider},
    client::{Connection, Connector, HttpConnector},
    error::{DeliveryError, Result},
    results::DeliveryOutcome,
    retry::{FailureTransition, RetryPolicy, RetryState},
    settings::HandlerSettings,
};

/// One rendered document and where it goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundBody {
    /// Event type the body is published under.
    pub event_type: String,
    /// Resolved endpoint URL.
    pub endpoint: String,
    /// Document bytes.
    pub body: Bytes,
}

/// A failed attempt and the endpoint it failed against.
struct AttemptFailure {
    endpoint: String,
    error: DeliveryError,
}

/// Delivers messages with linear backoff and periodic reauthentication.
#[derive(Debug, Clone)]
pub struct DeliveryEngine {
    connector: Arc<dyn Connector>,
    policy: RetryPolicy,
    clock: Arc<dyn Clock>,
    events: Arc<dyn EventHandler>,
    cancellation: CancellationToken,
}

impl DeliveryEngine {
    /// Creates an engine using real time, no event subscribers and a
    /// never-cancelled token.
    pub fn new(connector: Arc<dyn Connector>, policy: RetryPolicy) -> Self {
        Self {
            connector,
            policy,
            clock: Arc::new(RealClock::new()),
            events: Arc::new(NoOpEventHandler::new()),
            cancellation: CancellationToken::new(),
        }
    }

    /// Creates an HTTP engine from handler settings.
    ///
    /// # Errors
    ///
    /// Returns `DeliveryError::Configuration` if the settings do not validate.
    pub fn from_settings(settings: &HandlerSettings) -> Result<Self> {
        settings.validate()?;

        let tokens: Arc<dyn TokenProvider> = match &settings.auth_token {
            Some(token) => Arc::new(StaticToken::new(token.clone())),
            None => Arc::new(NoAuth),
        };
        let connector = HttpConnector::new(settings.client_config(), tokens);

        Ok(Self::new(Arc::new(connector), settings.retry_policy()))
    }

    /// Replaces the clock used for backoff waits.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Replaces the delivery event subscriber.
    #[must_use]
    pub fn with_event_handler(mut self, events: Arc<dyn EventHandler>) -> Self {
        self.events = events;
        self
    }

    /// Uses `token` to interrupt backoff waits.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    /// Delivers every body of one message and returns its outcome.
    ///
    /// `connection` is used if present and established lazily otherwise; on
    /// reauthentication it is replaced, and the caller keeps whatever
    /// connection is current when this returns.
    pub async fn deliver(
        &self,
        message_id: &MessageId,
        bodies: &[OutboundBody],
        connection: &mut Option<Box<dyn Connection>>,
    ) -> DeliveryOutcome {
        if bodies.is_empty() {
            debug!(%message_id, "nothing to deliver");
            return DeliveryOutcome::success(0);
        }

        let started = self.clock.now();
        let mut state = RetryState::new();
        let mut acknowledged = 0;
        let mut code = 0;
        let mut force_connect = false;

        loop {
            let attempt =
                self.attempt(bodies, &mut acknowledged, &mut code, connection, force_connect).await;
            if connection.is_some() {
                force_connect = false;
            }

            let AttemptFailure { endpoint, error } = match attempt {
                Ok(()) => {
                    let elapsed = self.clock.now().saturating_duration_since(started);
                    info!(
                        %message_id,
                        attempts = state.tries + 1,
                        code,
                        elapsed_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
                        "notification delivered"
                    );
                    self.emit(DeliveryEvent::Succeeded(DeliverySucceededEvent {
                        message_id: message_id.clone(),
                        endpoint: bodies.last().map(|b| b.endpoint.clone()).unwrap_or_default(),
                        status_code: code,
                        attempts: state.tries + 1,
                        elapsed,
                        delivered_at: Utc::now(),
                    }))
                    .await;
                    return DeliveryOutcome::success(code);
                },
                Err(failure) => failure,
            };

            code = error.code();
            let transition = state.on_failure(&self.policy);

            warn!(%message_id, %endpoint, tries = state.tries, code, %error, "delivery attempt failed");
            self.emit(DeliveryEvent::Failed(DeliveryFailedEvent {
                message_id: message_id.clone(),
                endpoint: endpoint.clone(),
                status_code: code,
                attempt: state.tries,
                error_message: error.to_string(),
                failed_at: Utc::now(),
            }))
            .await;

            match transition {
                FailureTransition::Exhausted => {
                    error!(%message_id, %endpoint, tries = state.tries, %error, "retry limit exceeded");
                    self.emit(DeliveryEvent::Exhausted(DeliveryExhaustedEvent {
                        message_id: message_id.clone(),
                        endpoint,
                        status_code: code,
                        attempts: state.tries,
                        error_message: error.to_string(),
                    }))
                    .await;
                    return DeliveryOutcome::exhausted(code, &error);
                },
                FailureTransition::Wait { delay, reauth } => {
                    error!(
                        %message_id,
                        %endpoint,
                        %error,
                        tries = state.tries,
                        wait_secs = delay.as_secs(),
                        "message delivery failed, sleeping before retry"
                    );

                    tokio::select! {
                        biased;
                        () = self.cancellation.cancelled() => {
                            warn!(%message_id, tries = state.tries, "delivery cancelled during backoff");
                            return DeliveryOutcome::cancelled(code, state.tries);
                        },
                        () = self.clock.sleep(delay) => {},
                    }

                    if reauth {
                        info!(%message_id, tries = state.tries, "reauthenticating delivery connection");
                        *connection = None;
                        force_connect = true;
                    }
                },
            }
        }
    }

    /// Sends every body not yet acknowledged, in order.
    async fn attempt(
        &self,
        bodies: &[OutboundBody],
        acknowledged: &mut usize,
        code: &mut u16,
        connection: &mut Option<Box<dyn Connection>>,
        force_connect: bool,
    ) -> std::result::Result<(), AttemptFailure> {
        let conn = match connection.take() {
            Some(conn) => conn,
            None => self.connector.connect(force_connect).await.map_err(|error| AttemptFailure {
                endpoint: bodies.get(*acknowledged).map(|b| b.endpoint.clone()).unwrap_or_default(),
                error,
            })?,
        };
        let conn = connection.insert(conn);

        for body in &bodies[*acknowledged..] {
            *code = conn.send(&body.endpoint, &body.body).await.map_err(|error| AttemptFailure {
                endpoint: body.endpoint.clone(),
                error,
            })?;
            *acknowledged += 1;
            debug!(
                endpoint = %body.endpoint,
                event_type = %body.event_type,
                code = *code,
                "body acknowledged"
            );
        }

        Ok(())
    }

    async fn emit(&self, event: DeliveryEvent) {
        self.events.handle_event(event).await;
    }
}
