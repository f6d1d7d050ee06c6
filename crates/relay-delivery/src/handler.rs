//! Batch handler turning inbound messages into delivered usage documents.
//!
//! For each message: apply payload filters, parse the envelope, acknowledge,
//! render the bodies (Atom JSON entries or CUF documents), then hand them to
//! the `DeliveryEngine`. Every processed message ends with exactly one entry
//! in the caller's `DeliveryResults`.

use std::fmt;

use bytes::Bytes;
use futures::{stream, StreamExt};
use relay_core::{
    render, CoreError, MessageId, Normalizer, Notification, RenderItem, RenderOptions,
    TargetFormat, COMPUTE_EXISTS, COMPUTE_EXISTS_VERIFIED,
};
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::{
    engine::{DeliveryEngine, OutboundBody},
    error::Result,
    results::{DeliveryOutcome, DeliveryResults},
    settings::HandlerSettings,
};

/// A message handed over by the transport.
pub trait InboundMessage: Send {
    /// Raw decoded message body.
    fn payload(&self) -> &Value;

    /// Whether `ack` has been called.
    fn is_acknowledged(&self) -> bool;

    /// Acknowledges the message to the transport.
    fn ack(&mut self);
}

/// Rewrites a raw payload before it is parsed.
pub trait PayloadFilter: Send + Sync + fmt::Debug {
    /// Returns the filtered payload.
    fn apply(&self, payload: Value) -> Value;
}

/// Event types a message is published under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Publication {
    /// Event type of the primary entity.
    pub event_type: String,
    /// Whether a second, unverified exists copy follows.
    pub send_exists_copy: bool,
}

/// A message ready for the engine.
struct Prepared {
    message_id: MessageId,
    bodies: Vec<OutboundBody>,
}

/// Relays batches of usage notifications.
#[derive(Debug)]
pub struct RelayHandler {
    settings: HandlerSettings,
    engine: DeliveryEngine,
    normalizer: Normalizer,
    render_options: RenderOptions,
    filters: Vec<Box<dyn PayloadFilter>>,
}

impl RelayHandler {
    /// Creates a handler delivering through `engine`.
    ///
    /// # Errors
    ///
    /// Returns `DeliveryError::Configuration` if the settings do not validate.
    pub fn new(settings: HandlerSettings, engine: DeliveryEngine) -> Result<Self> {
        settings.validate()?;
        let render_options = RenderOptions {
            entity_links: settings.generate_entity_links,
            ..RenderOptions::default()
        };

        Ok(Self {
            settings,
            engine,
            normalizer: Normalizer::default(),
            render_options,
            filters: Vec::new(),
        })
    }

    /// Uses `normalizer` for CUF output.
    #[must_use]
    pub fn with_normalizer(mut self, normalizer: Normalizer) -> Self {
        self.normalizer = normalizer;
        self
    }

    /// Sets region, data center and link base; `entity_links` always follows
    /// the handler settings.
    #[must_use]
    pub fn with_render_options(mut self, options: RenderOptions) -> Self {
        self.render_options =
            RenderOptions { entity_links: self.settings.generate_entity_links, ..options };
        self
    }

    /// Appends a payload filter; filters run in insertion order.
    #[must_use]
    pub fn with_filter(mut self, filter: Box<dyn PayloadFilter>) -> Self {
        self.filters.push(filter);
        self
    }

    /// Settings in effect.
    pub fn settings(&self) -> &HandlerSettings {
        &self.settings
    }

    /// Processes one batch, recording an outcome per message into `results`.
    pub async fn handle_messages<M: InboundMessage>(
        &self,
        messages: &mut [M],
        results: &mut DeliveryResults,
    ) {
        let mut ready = Vec::with_capacity(messages.len());

        for message in messages.iter_mut() {
            let payload = self.filters.iter().fold(message.payload().clone(), |p, f| f.apply(p));
            if !message.is_acknowledged() {
                message.ack();
            }

            match self.prepare(&payload) {
                Ok(prepared) => ready.push(prepared),
                Err((Some(message_id), failure)) => {
                    error!(%message_id, %failure, %payload, "unable to prepare notification");
                    let outcome = if failure.is_malformed() {
                        DeliveryOutcome::malformed(&failure)
                    } else {
                        DeliveryOutcome::unrenderable(&failure)
                    };
                    results.record(message_id, outcome);
                },
                Err((None, failure)) => {
                    error!(%failure, %payload, "dropping notification without a usable message_id");
                },
            }
        }

        info!(
            messages = messages.len(),
            deliverable = ready.len(),
            concurrency = self.settings.concurrency,
            "delivering batch"
        );

        if self.settings.concurrency <= 1 {
            let mut connection = None;
            for Prepared { message_id, bodies } in ready {
                let outcome = self.engine.deliver(&message_id, &bodies, &mut connection).await;
                results.record(message_id, outcome);
            }
        } else {
            let outcomes: Vec<(MessageId, DeliveryOutcome)> = stream::iter(ready)
                .map(|Prepared { message_id, bodies }| async move {
                    let mut connection = None;
                    let outcome = self.engine.deliver(&message_id, &bodies, &mut connection).await;
                    (message_id, outcome)
                })
                .buffer_unordered(self.settings.concurrency)
                .collect()
                .await;

            for (message_id, outcome) in outcomes {
                results.record(message_id, outcome);
            }
        }
    }

    /// Event types for a notification under the duplication rule.
    ///
    /// While the verifier is down, `compute.instance.exists` is published
    /// as `compute.instance.exists.verified` followed by an unverified copy,
    /// unless the verified type is excluded.
    pub fn publication(&self, event_type: &str) -> Publication {
        let duplicate = event_type == COMPUTE_EXISTS
            && self.settings.stacktach_down
            && !self.settings.exclude_filter_list().contains(&COMPUTE_EXISTS_VERIFIED);

        if duplicate {
            Publication { event_type: COMPUTE_EXISTS_VERIFIED.to_string(), send_exists_copy: true }
        } else {
            Publication { event_type: event_type.to_string(), send_exists_copy: false }
        }
    }

    fn prepare(
        &self,
        payload: &Value,
    ) -> std::result::Result<Prepared, (Option<MessageId>, CoreError)> {
        let fallback_id = || payload.get("message_id").and_then(MessageId::from_json);

        let notification =
            Notification::from_json(payload).map_err(|failure| (fallback_id(), failure))?;
        let message_id = notification.message_id().clone();

        let bodies = self
            .render_bodies(&notification)
            .map_err(|failure| (Some(message_id.clone()), failure))?;

        debug!(%message_id, bodies = bodies.len(), "prepared notification");
        Ok(Prepared { message_id, bodies })
    }

    fn render_bodies(&self, notification: &Notification) -> relay_core::Result<Vec<OutboundBody>> {
        let Publication { event_type, send_exists_copy } =
            self.publication(notification.event_type());

        let mut event_types = vec![event_type.as_str()];
        if send_exists_copy {
            event_types.push(COMPUTE_EXISTS);
        }

        let mut bodies = Vec::new();
        match self.settings.format {
            TargetFormat::AtomEntry => {
                for event_type in event_types {
                    let item = RenderItem::Envelope { notification, event_type };
                    let document = render(item, TargetFormat::AtomEntry, &self.render_options)?;
                    bodies.push(self.outbound(event_type, document));
                }
            },
            TargetFormat::CufUsageXml => {
                let records = self.normalizer.normalize(notification)?;
                if records.is_empty() {
                    warn!(
                        message_id = %notification.message_id(),
                        "notification produced no usage records"
                    );
                }
                for record in &records {
                    for &event_type in &event_types {
                        let item = RenderItem::Record { notification, event_type, record };
                        let document = render(item, TargetFormat::AtomEntry, &self.render_options)?;
                        bodies.push(self.outbound(event_type, document));
                    }
                }
            },
        }

        Ok(bodies)
    }

    fn outbound(&self, event_type: &str, document: String) -> OutboundBody {
        OutboundBody {
            event_type: event_type.to_string(),
            endpoint: self.settings.endpoint_for(event_type),
            body: Bytes::from(document),
        }
    }
}
