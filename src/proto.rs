//! Wire protocol: line framing and the SMTP command/response grammar

pub mod codec;
pub mod smtp;

pub use codec::LineCodec;
pub use smtp::{Command, Response, ResponseCode};
