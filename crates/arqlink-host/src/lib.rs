#![warn(missing_docs)]

//! arqlink-host: server and client endpoints over the ARQ engine.
//!
//! A [`Server`] listens on one UDP socket and keeps a live set of accepted
//! connections keyed by [`ConnectionId`](arqlink_core::ConnectionId). A
//! [`Client`] owns at most one outbound connection. Both are advanced by an
//! explicit `tick(time)` and report what happened through a crossbeam event
//! channel.

/// Fault injection for datagram sockets.
pub mod conditioner;
/// Connection lifecycle over one ARQ stream.
pub mod connection;
/// Client endpoint.
pub mod client;
/// Aggregated queue and buffer counters.
pub mod diagnostics;
/// Event and action types.
pub mod event_types;
/// Server endpoint.
pub mod server;
/// UDP socket implementation of the transport abstraction.
pub mod socket;
/// Time utilities for the host.
pub mod time;

mod message;
mod outbox;

pub use client::{Client, ClientState};
pub use conditioner::LinkConditioner;
pub use connection::{Connection, ConnectionState};
pub use diagnostics::Diagnostics;
pub use event_types::{Action, ClientEvent, ConnectionEvent, ServerEvent};
pub use server::Server;
pub use socket::UdpTransport;
pub use time::{Clock, SystemClock};
