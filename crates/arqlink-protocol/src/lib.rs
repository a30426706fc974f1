#![warn(missing_docs)]

//! arqlink-protocol: the window-based ARQ engine behind every connection.
//!
//! The engine is a pure state machine. It never touches a socket: callers feed
//! it received datagrams with [`Arq::input`], drive its timers with
//! [`Arq::update`] and hand the returned datagrams to whatever transport they
//! own.

/// The ARQ state machine.
pub mod arq;
/// RTT estimation and congestion window.
pub mod congestion;
/// Segment types and wire codec.
pub mod segment;
/// Wrapping sequence number comparisons.
pub mod sequence;

pub use arq::Arq;
pub use segment::{Command, Segment};

/// Depth of the four queues an ARQ stream keeps.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct QueueCounters {
    /// Segments waiting for room in the send window.
    pub send_queue: usize,
    /// Segments sent and not yet acknowledged.
    pub send_buffer: usize,
    /// In-order segments waiting to be assembled and read.
    pub receive_queue: usize,
    /// Out-of-order segments waiting for a gap to fill.
    pub receive_buffer: usize,
}

impl QueueCounters {
    /// Total number of units held by the stream.
    pub fn total(&self) -> usize {
        self.send_queue + self.send_buffer + self.receive_queue + self.receive_buffer
    }
}
