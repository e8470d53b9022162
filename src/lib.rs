//! SMTP Gateway - Rust Implementation
//!
//! A minimal mail-submission gateway: it accepts plaintext SMTP connections,
//! walks each client through `HELO`/`MAIL`/`RCPT`/`DATA`, and hands every
//! completed envelope to an [`EnvelopeStore`].
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐ bytes ┌────────────┐ lines ┌─────────┐ Envelope ┌─────────────┐
//! │  Client  │──────▶│ LineCodec  │──────▶│ Session │─────────▶│ MemoryStore │
//! │          │◀──────│ (framer +  │◀──────│  (FSM)  │          │  + events   │
//! └──────────┘ bytes │  writer)   │ reply └─────────┘          └─────────────┘
//!                    └────────────┘
//! ```

pub mod config;
pub mod envelope;
pub mod proto;
pub mod server;
pub mod session;
pub mod store;

// Re-export commonly used items
pub use config::{Config, GatewayConfig};
pub use envelope::{Envelope, EnvelopeId};
pub use proto::{Command, LineCodec, Response, ResponseCode};
pub use server::Gateway;
pub use session::{Mode, Session, SessionError, Step};
pub use store::{EnvelopeStore, MemoryStore, StoreEvent};

use thiserror::Error;

/// Error types for SMTP Gateway
#[derive(Debug, Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Result type for SMTP Gateway
pub type Result<T> = std::result::Result<T, Error>;

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
