//! Usage-record domain for the usage relay.
//!
//! Turns raw producer notifications into canonical usage records with
//! clamped time windows and mapped lifecycle status, and renders them (or
//! the raw notification) into the wire documents the delivery engine posts.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod events;
pub mod models;
pub mod normalize;
pub mod options;
pub mod render;
pub mod status;
pub mod time;
pub mod window;

mod xml;

pub use error::{CoreError, Result};
pub use events::{
    DeliveryEvent, DeliveryExhaustedEvent, DeliveryFailedEvent, DeliveryStats,
    DeliverySucceededEvent, EventHandler, MulticastEventHandler, NoOpEventHandler, StatsCollector,
};
pub use models::{
    MessageId, Notification, Producer, UsageAttributes, UsageRecord, COMPUTE_EXISTS,
    COMPUTE_EXISTS_VERIFIED, IMAGE_EXISTS,
};
pub use normalize::{normalize_image, Normalizer, DEFAULT_FLAVOR_FIELD};
pub use options::ProductOptions;
pub use render::{render, render_cuf, RenderItem, RenderOptions, TargetFormat};
pub use status::{lookup_status, server_status, ServerStatus, StatusLookup};
pub use time::{Clock, RealClock, TestClock};
pub use window::{format_timestamp, parse_timestamp, resolve_end, resolve_start, TimeWindow};
