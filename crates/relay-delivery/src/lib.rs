//! Delivery of usage notifications to the usage endpoint.
//!
//! `RelayHandler` takes a batch of inbound messages, renders each into one
//! or more documents and hands them to the `DeliveryEngine`, which posts
//! them over HTTP with linear backoff, bounded retries and periodic
//! reauthentication. Each message ends with one `DeliveryOutcome`.
//!
//! # Example
//!
//! ```no_run
//! use relay_delivery::{DeliveryEngine, DeliveryResults, HandlerSettings, RelayHandler};
//! # use relay_delivery::InboundMessage;
//!
//! # async fn example<M: InboundMessage>(mut batch: Vec<M>) -> relay_delivery::Result<()> {
//! let settings = HandlerSettings::default();
//! let engine = DeliveryEngine::from_settings(&settings)?;
//! let handler = RelayHandler::new(settings, engine)?;
//!
//! let mut results = DeliveryResults::new();
//! handler.handle_messages(&mut batch, &mut results).await;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod auth;
pub mod client;
pub mod engine;
pub mod error;
pub mod handler;
pub mod results;
pub mod retry;
pub mod settings;

pub use auth::{NoAuth, StaticToken, TokenProvider};
pub use client::{ClientConfig, Connection, Connector, HttpConnector};
pub use engine::{DeliveryEngine, OutboundBody};
pub use error::{DeliveryError, Result};
pub use handler::{InboundMessage, PayloadFilter, Publication, RelayHandler};
pub use results::{DeliveryOutcome, DeliveryResults};
pub use retry::{FailureTransition, RetryPolicy, RetryState};
pub use settings::{HandlerOverrides, HandlerSettings};
