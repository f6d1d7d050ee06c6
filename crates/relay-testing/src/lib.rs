//! Test doubles and fixtures for the usage relay.
//!
//! `MockServer` wraps wiremock for HTTP-level tests, `RecordingConnector`
//! scripts connections for engine tests, `MockMessage` stands in for the
//! transport and `fixtures` holds realistic producer notifications.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod connector;
pub mod fixtures;
pub mod http;
pub mod message;

pub use connector::{RecordingConnector, Scripted, SentBody};
pub use fixtures::{image_exists, plain_event, ComputeExistsBuilder};
pub use http::{MockServer, RecordedRequest};
pub use message::MockMessage;
pub use relay_core::TestClock;
