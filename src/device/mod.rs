//! Device side of the protocol
//!
//! A device opens one [`DeviceSession`] to its controller, registers with an
//! `init` message built from a [`DeviceIdentity`], then reports events and
//! receives channel updates for the lifetime of the connection.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use devlink::device::{ButtonSpec, DeviceIdentity, DeviceSession, OutputKind, SessionOptions};
//!
//! # async fn example() -> devlink::Result<()> {
//! let session = DeviceSession::open("127.0.0.1:8999", SessionOptions::default()).await?;
//! let identity = DeviceIdentity::new("my-lamp", Some(OutputKind::Light))
//!     .with_button(ButtonSpec::push("push"));
//! session.register(identity).await?;
//!
//! let updates = session.on_channel_update(|ch| println!("channel[{}] = {}", ch.index, ch.value))?;
//! session.send_button_event(0, 200).await?;
//!
//! session.closed().await;
//! updates.await.ok();
//! # Ok(())
//! # }
//! ```

pub mod dispatch;
pub mod identity;
pub mod session;

pub use dispatch::{dispatch, Dispatcher, MessageHandler};
pub use identity::{ButtonSpec, DeviceIdentity, InputSpec, OutputKind, SensorSpec};
pub use session::{AckPolicy, DeviceSession, SessionOptions, SessionState};
