//! Usage relay: reads cloud usage notifications, renders them as Atom or
//! CUF usage documents and delivers them to the billing feed.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod relay;

pub use config::Config;
pub use relay::{build_handler, read_batch, relay_batch, LineMessage};
