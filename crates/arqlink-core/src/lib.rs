#![warn(missing_docs)]

//! arqlink-core: foundational types shared by every arqlink layer.
//!
//! This crate holds the pieces the engine and the adapter both need:
//! - Configuration (`Config`)
//! - Error handling (`ErrorKind`, `Result`)
//! - Connection handles and channel selection
//! - Protocol constants
//! - The datagram `Socket` abstraction

/// Protocol constants shared across layers.
pub mod constants {
    /// Port the server listens on when none is configured.
    pub const DEFAULT_PORT: u16 = 7777;
    /// Default maximum size of a single datagram emitted by the engine.
    ///
    /// Kept well below the common 1500 byte ethernet MTU so that tunnels and
    /// IPv6 headers never push a datagram into IP fragmentation.
    pub const DEFAULT_MTU: usize = 1200;
    /// Send and receive window used when none is configured, in segments.
    pub const DEFAULT_WINDOW_SIZE: u16 = 128;
    /// Interval between engine flushes when none is configured, in milliseconds.
    pub const DEFAULT_INTERVAL_MS: u32 = 10;
    /// Size of the channel tag that prefixes every datagram.
    pub const CHANNEL_HEADER_SIZE: usize = 1;
    /// Size of the message tag that prefixes every message inside a channel.
    pub const MESSAGE_HEADER_SIZE: usize = 1;
    /// Size of an ARQ segment header.
    ///
    /// cmd(1) + frg(1) + wnd(2) + ts(4) + sn(4) + una(4) + len(4)
    pub const SEGMENT_HEADER_SIZE: usize = 20;
    /// Upper bound on fragments per message; the fragment index is a u8.
    pub const FRAGMENT_LIMIT: usize = 256;
    /// Interval between keepalive pings on an idle connection, in milliseconds.
    pub const PING_INTERVAL_MS: u64 = 1000;
    /// How often a disconnect notice is repeated over the unreliable channel.
    pub const DISCONNECT_REDUNDANCY: usize = 5;
    /// Queued units beyond which a connection is considered overloaded and dropped.
    pub const QUEUE_DISCONNECT_THRESHOLD: usize = 10_000;
}

/// Logical delivery channel selection.
pub mod channel;
/// Configuration options for the engine and the adapter.
pub mod config;
/// Error types and results.
pub mod error;
/// Server-side connection handles.
pub mod id;
/// Transport abstraction for pluggable I/O.
pub mod transport;

pub use channel::Channel;
pub use config::Config;
pub use error::{ErrorKind, Result};
pub use id::ConnectionId;
