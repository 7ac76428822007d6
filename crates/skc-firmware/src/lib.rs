#![forbid(unsafe_code)]

//! Single Key Computer firmware.
//!
//! One current-thread runtime hosts everything: the HTTP/WebSocket accept loop, one task per
//! session plus its keepalive and button subscriptions, and the processor step loop. Shared
//! state lives in `Rc<RefCell<_>>` and no borrow is held across an `.await`.

pub mod config;
pub mod hal;
pub mod router;
pub mod runtime;
pub mod server;
pub mod session;
pub mod store;

pub use config::{Config, ConfigError};
pub use runtime::{BootImage, Context, Firmware};
pub use server::{start_server, ServerHandle};
