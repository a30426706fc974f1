use std::{default::Default, time::Duration};

use crate::constants::{
    CHANNEL_HEADER_SIZE, DEFAULT_INTERVAL_MS, DEFAULT_MTU, DEFAULT_PORT, DEFAULT_WINDOW_SIZE,
    FRAGMENT_LIMIT, MESSAGE_HEADER_SIZE, SEGMENT_HEADER_SIZE,
};

#[derive(Clone, Debug, PartialEq)]
/// Configuration options to tune the engine and the adapter.
///
/// Endpoints take a copy when they start or connect, and every connection keeps
/// its own copy for its whole lifetime. Editing a `Config` afterwards only
/// affects endpoints started later.
pub struct Config {
    /// Port the server listens on.
    pub port: u16,
    /// Bind the server to `[::]` and accept IPv4-mapped peers as well.
    /// Falls back to `0.0.0.0` when the host has no IPv6 support.
    pub dual_mode: bool,
    /// Use the aggressive retransmission profile: RTO is not doubled on loss
    /// and the minimum RTO is lowered.
    pub no_delay: bool,
    /// Interval between engine flushes in milliseconds.
    pub interval_ms: u32,
    /// Number of skipped acks after which a segment is resent without waiting
    /// for its RTO (0 = disabled).
    pub fast_resend: u32,
    /// Grow and shrink a congestion window on top of the send window.
    pub congestion_window: bool,
    /// Max in-flight segments per connection.
    pub send_window_size: u16,
    /// Max buffered receive segments per connection; also bounds message size.
    pub receive_window_size: u16,
    /// Max datagram size emitted by the engine in bytes.
    pub mtu: usize,
    /// Max idle time before a connection is dropped.
    pub timeout: Duration,
    /// Number of retransmissions of one segment after which the link is dead.
    pub max_retransmits: u32,
    /// Max number of connections still in the handshake, to bound spoofed floods.
    pub max_pending_connections: u16,
    /// Socket receive buffer size in bytes (None = use system default).
    /// Corresponds to SO_RCVBUF socket option.
    pub socket_recv_buffer_size: Option<usize>,
    /// Socket send buffer size in bytes (None = use system default).
    /// Corresponds to SO_SNDBUF socket option.
    pub socket_send_buffer_size: Option<usize>,
    /// Periodically log aggregated queue and buffer counters.
    pub statistics_log: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            dual_mode: true,
            no_delay: true,
            interval_ms: DEFAULT_INTERVAL_MS,
            fast_resend: 0, // Disabled
            congestion_window: true,
            send_window_size: DEFAULT_WINDOW_SIZE,
            receive_window_size: DEFAULT_WINDOW_SIZE,
            mtu: DEFAULT_MTU,
            timeout: Duration::from_secs(10),
            max_retransmits: 20,
            max_pending_connections: 50,
            socket_recv_buffer_size: None, // Use system default
            socket_send_buffer_size: None, // Use system default
            statistics_log: false,
        }
    }
}

impl Config {
    /// Max payload bytes carried by one ARQ segment.
    pub fn segment_payload_size(&self) -> usize {
        self.mtu.saturating_sub(CHANNEL_HEADER_SIZE + SEGMENT_HEADER_SIZE)
    }

    /// Max number of fragments one reliable message may be split into.
    ///
    /// A message has to fit into the peer's receive window with one slot to
    /// spare, and the fragment index has to fit a u8. Never below one, so
    /// control messages always fit.
    pub fn max_fragments(&self) -> usize {
        (self.receive_window_size as usize).saturating_sub(1).clamp(1, FRAGMENT_LIMIT)
    }

    /// Max user payload of a reliable message.
    pub fn reliable_max_message_size(&self) -> usize {
        (self.segment_payload_size() * self.max_fragments()).saturating_sub(MESSAGE_HEADER_SIZE)
    }

    /// Max user payload of an unreliable message.
    pub fn unreliable_max_message_size(&self) -> usize {
        self.mtu.saturating_sub(CHANNEL_HEADER_SIZE + MESSAGE_HEADER_SIZE)
    }
}
