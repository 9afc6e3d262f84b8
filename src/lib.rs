//! # ITv2 Gateway
//!
//! Server-side integration gateway for DSC PowerSeries NEO alarm panels.
//!
//! Panels dial in over long-lived TCP connections; the gateway negotiates a
//! mutually-keyed AES session and exchanges framed, sequenced, typed
//! messages through a small family of request/response transaction
//! patterns.
//!
//! ## Architecture
//!
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                  Application Notification Bus                   │
//! ├─────────────────────────────────────────────────────────────────┤
//! │        Session (sequences, transactions, heartbeat)             │
//! ├─────────────────────────────────────────────────────────────────┤
//! │    Typed Message Codec + Registry (command ↔ type ↔ pattern)    │
//! ├─────────────────────────────────────────────────────────────────┤
//! │          AES-128-ECB Session Encryption (Type 1 / 2)            │
//! ├─────────────────────────────────────────────────────────────────┤
//! │     Framer (length + CRC inner frame, 0x7E/0x7F stuffing)       │
//! ├─────────────────────────────────────────────────────────────────┤
//! │              Transport (delimiter-bounded packets)              │
//! └─────────────────────────────────────────────────────────────────┘

#![warn(clippy::all, clippy::pedantic)]
// Allow stylistic lints that don't affect correctness
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::cast_possible_truncation)] // Length fields are range-checked first
#![allow(clippy::match_same_arms)]          // Explicit arm per variant is clearer
#![allow(clippy::future_not_send)]          // Async internals
#![allow(clippy::too_many_lines)]           // Complete state machines

pub mod codec;
pub mod config;
pub mod crypto;
pub mod error;
pub mod protocol;
pub mod server;
pub mod session;
pub mod transport;
pub mod types;

pub use config::GatewayConfig;
pub use error::{Error, Result};
pub use server::Gateway;
pub use types::*;

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default TCP port panels dial in to.
pub const DEFAULT_PORT: u16 = 3072;

/// Software version the gateway reports in its mirrored `OpenSession`.
pub const GATEWAY_SOFTWARE_VERSION: u16 = 0x0300;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::config::{GatewayConfig, IntegrationConfig, TimingConfig};
    pub use crate::error::{Error, Result};
    pub use crate::protocol::{Command, Envelope, Message};
    pub use crate::server::Gateway;
    pub use crate::session::{PanelEvent, SendOutcome, Session};
    pub use crate::types::{SessionId, SessionStats};
}
