#![forbid(unsafe_code)]

//! Minimal WebSocket server plumbing.
//!
//! Only what the firmware needs is supported: the HTTP upgrade handshake, single-frame
//! text/binary messages from masked clients with payloads of at most 125 bytes, and unmasked
//! binary frames back to the client. Fragmentation, extended payload lengths, control frames,
//! extensions and subprotocols are all rejected or ignored.

mod error;
pub mod frame;
pub mod handshake;
pub mod headers;

pub use error::WsError;
pub use frame::{read_message, write_message, MAX_PAYLOAD};
pub use handshake::{accept_key, Response};
pub use headers::{read_request, Headers, Request};
