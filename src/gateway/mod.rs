//! Gateway module - HTTP front end for the controller
//!
//! Every HTTP request is translated into one JSON record, relayed over a
//! fresh TCP connection, and answered with the controller's first reply line.
//!
//! ```text
//!   HTTP client ──► axum fallback ──► translate ──► relay ──► controller
//!        ▲                                           │
//!        └──────────── 200 application/json ◄────────┘
//! ```

pub mod relay;
pub mod server;
pub mod translate;

pub use relay::{error_body, relay, RelayOptions};
pub use server::{router, serve, GatewayState};
pub use translate::{translate, GatewayRequest, HttpRequestContext};
