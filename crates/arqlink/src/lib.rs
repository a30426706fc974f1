#![warn(missing_docs)]

//! arqlink: a reliable-UDP transport adapter.
//!
//! This crate provides the surface an upstream networking framework talks to:
//!
//! - The adapter composing one server and one client (`TransportAdapter`)
//! - The capability contract it implements (`Transport`)
//! - Core configuration and errors (`Config`, `ErrorKind`, `Result`)
//! - Connection handles and channels (`ConnectionId`, `Channel`)
//!
//! Example
//! ```no_run
//! use arqlink::prelude::*;
//!
//! let mut transport = TransportAdapter::new(Config::default());
//! transport.on_server_data(Box::new(|id, payload, channel| {
//!     println!("{} sent {} bytes on {:?}", id, payload.len(), channel);
//! }));
//! transport.server_start(7777).unwrap();
//!
//! loop {
//!     transport.tick();
//!     std::thread::sleep(std::time::Duration::from_millis(10));
//! }
//! ```

mod adapter;
mod listeners;
mod statistics;
/// The capability contract consumed by an upstream framework.
pub mod transport;

pub use adapter::TransportAdapter;
pub use transport::Transport;

// Core config, errors and handles
pub use arqlink_core::{Channel, Config, ConnectionId, ErrorKind, Result};
// Endpoints and their diagnostics
pub use arqlink_host::{Client, ClientState, Clock, Diagnostics, LinkConditioner, Server, SystemClock, UdpTransport};

/// Convenience prelude with the most commonly used items.
pub mod prelude {
    pub use crate::{Channel, ClientState, Config, ConnectionId, Diagnostics, ErrorKind, Transport, TransportAdapter};
}
