//! Scripted in-memory connections.
//!
//! `RecordingConnector` answers sends from a script of responses and
//! records every connect (with its `force` flag) and every body sent, so
//! tests can observe reauthentication and resend behavior without HTTP.

use std::{
    collections::VecDeque,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use bytes::Bytes;
use http::StatusCode;
use relay_delivery::{Connection, Connector, DeliveryError};

/// One scripted answer to a send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scripted {
    /// Respond with this HTTP status.
    Status(u16),
    /// Fail without a response.
    TransportError,
}

/// A body received by a recording connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentBody {
    /// 1-based index of the connection that sent it.
    pub connection: usize,
    /// Endpoint the body was posted to.
    pub endpoint: String,
    /// Body as UTF-8 text.
    pub body: String,
}

#[derive(Debug)]
struct Recording {
    script: VecDeque<Scripted>,
    fallback: Scripted,
    connects: Vec<bool>,
    sends: Vec<SentBody>,
}

/// Connector whose connections replay a script.
#[derive(Debug, Clone)]
pub struct RecordingConnector {
    recording: Arc<Mutex<Recording>>,
}

impl RecordingConnector {
    /// Answers with `statuses` in order, then 201 forever.
    pub fn new(statuses: impl IntoIterator<Item = u16>) -> Self {
        Self::scripted(statuses.into_iter().map(Scripted::Status), Scripted::Status(201))
    }

    /// Answers with `status` forever.
    pub fn always(status: u16) -> Self {
        Self::scripted([], Scripted::Status(status))
    }

    /// Answers from `script`, then with `fallback` forever.
    pub fn scripted(script: impl IntoIterator<Item = Scripted>, fallback: Scripted) -> Self {
        Self {
            recording: Arc::new(Mutex::new(Recording {
                script: script.into_iter().collect(),
                fallback,
                connects: Vec::new(),
                sends: Vec::new(),
            })),
        }
    }

    /// `force` flag of every connect, in order.
    pub fn connects(&self) -> Vec<bool> {
        self.lock().connects.clone()
    }

    /// Every body sent, in order.
    pub fn sends(&self) -> Vec<SentBody> {
        self.lock().sends.clone()
    }

    fn lock(&self) -> MutexGuard<'_, Recording> {
        self.recording.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait::async_trait]
impl Connector for RecordingConnector {
    async fn connect(&self, force: bool) -> relay_delivery::Result<Box<dyn Connection>> {
        let mut recording = self.lock();
        recording.connects.push(force);
        let id = recording.connects.len();
        Ok(Box::new(RecordingConnection { id, recording: self.recording.clone() }))
    }
}

#[derive(Debug)]
struct RecordingConnection {
    id: usize,
    recording: Arc<Mutex<Recording>>,
}

#[async_trait::async_trait]
impl Connection for RecordingConnection {
    async fn send(&self, endpoint: &str, body: &Bytes) -> relay_delivery::Result<u16> {
        let mut recording = self.recording.lock().unwrap_or_else(PoisonError::into_inner);
        let answer = recording.script.pop_front().unwrap_or(recording.fallback);
        recording.sends.push(SentBody {
            connection: self.id,
            endpoint: endpoint.to_string(),
            body: String::from_utf8_lossy(body).into_owned(),
        });
        drop(recording);

        match answer {
            Scripted::Status(status) if (200..300).contains(&status) => Ok(status),
            Scripted::Status(401) => Err(DeliveryError::Unauthorized),
            Scripted::Status(status) => {
                let reason = StatusCode::from_u16(status)
                    .ok()
                    .and_then(|code| code.canonical_reason())
                    .unwrap_or("Unknown");
                Err(DeliveryError::failed(status, reason))
            },
            Scripted::TransportError => {
                Err(DeliveryError::unclassified(endpoint, "connection refused"))
            },
        }
    }
}
