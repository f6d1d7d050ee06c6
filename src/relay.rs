//! Line-oriented transport and batch wiring for the relay binary.

use anyhow::{Context, Result};
use relay_delivery::{DeliveryEngine, DeliveryResults, InboundMessage, RelayHandler};
use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::Config;

/// One newline-delimited JSON notification.
#[derive(Debug, Clone, PartialEq)]
pub struct LineMessage {
    line: usize,
    payload: Value,
    acknowledged: bool,
}

impl LineMessage {
    /// Wraps the payload read from `line` (1-based).
    pub fn new(line: usize, payload: Value) -> Self {
        Self { line, payload, acknowledged: false }
    }

    /// Source line number.
    pub fn line(&self) -> usize {
        self.line
    }
}

impl InboundMessage for LineMessage {
    fn payload(&self) -> &Value {
        &self.payload
    }

    fn is_acknowledged(&self) -> bool {
        self.acknowledged
    }

    fn ack(&mut self) {
        self.acknowledged = true;
    }
}

/// Reads a batch of newline-delimited JSON notifications.
///
/// Blank lines are ignored. Lines that are not JSON are logged and skipped;
/// they carry no message id to report an outcome under.
///
/// # Errors
///
/// Fails only when reading from `reader` fails.
pub async fn read_batch<R>(reader: R) -> Result<Vec<LineMessage>>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    let mut batch = Vec::new();
    let mut number = 0;

    while let Some(line) = lines.next_line().await.context("Failed to read notifications")? {
        number += 1;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        match serde_json::from_str(line) {
            Ok(payload) => batch.push(LineMessage::new(number, payload)),
            Err(e) => warn!(line = number, error = %e, "skipping line that is not JSON"),
        }
    }

    Ok(batch)
}

/// Builds the handler for the configured queue.
///
/// # Errors
///
/// Fails if the effective handler settings are invalid.
pub fn build_handler(config: &Config, cancellation: CancellationToken) -> Result<RelayHandler> {
    if config.queue_is_unconfigured() {
        warn!(queue = ?config.queue, "no overrides configured for queue, using base settings");
    }

    let settings = config.handler_settings();
    info!(
        queue = config.queue.as_deref().unwrap_or("-"),
        url = %settings.url,
        format = ?settings.format,
        retries = settings.retries,
        concurrency = settings.concurrency,
        "building relay handler"
    );

    let engine = DeliveryEngine::from_settings(&settings)
        .context("Failed to build delivery engine")?
        .with_cancellation(cancellation);

    let handler = RelayHandler::new(settings, engine)
        .context("Failed to build relay handler")?
        .with_normalizer(config.normalizer())
        .with_render_options(config.render_options());

    Ok(handler)
}

/// Relays one batch and returns the outcome per message id.
pub async fn relay_batch(handler: &RelayHandler, batch: &mut [LineMessage]) -> DeliveryResults {
    let mut results = DeliveryResults::new();
    handler.handle_messages(batch, &mut results).await;

    let failed = results.iter().filter(|(_, outcome)| outcome.error).count();
    info!(messages = batch.len(), recorded = results.len(), failed, "batch relayed");
    results
}
