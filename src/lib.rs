//! # devlink
//!
//! Line-delimited JSON protocol between devices and a home-automation
//! controller, plus an HTTP gateway in front of the controller.
//!
//! ## Features
//!
//! - **Message Codec:** one JSON object per `\n`-terminated record, unknown tags passed through
//! - **Device Session:** register once with `init`, report events, receive channel updates in order
//! - **HTTP Gateway:** stateless translation of HTTP requests into controller records

pub mod config;
pub mod device;
pub mod error;
pub mod gateway;
pub mod logging;
pub mod protocol;

pub use config::Config;
pub use error::{Error, Result};

/// Application version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const NAME: &str = env!("CARGO_PKG_NAME");
