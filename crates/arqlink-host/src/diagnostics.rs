use std::{fmt, iter::Sum, ops::Add};

use arqlink_protocol::QueueCounters;

/// Connection count plus queue and buffer totals over a set of connections.
///
/// Values are snapshots; summing the diagnostics of a server and a client
/// gives the adapter-wide view.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Diagnostics {
    /// Number of connections counted.
    pub connections: usize,
    /// Messages queued but not yet in flight.
    pub send_queue: usize,
    /// Segments in flight awaiting acks.
    pub send_buffer: usize,
    /// Complete messages waiting to be read.
    pub receive_queue: usize,
    /// Out-of-order segments held for reassembly.
    pub receive_buffer: usize,
}

impl Diagnostics {
    /// Sum of all four queue counters.
    pub fn total_queued(&self) -> usize {
        self.send_queue + self.send_buffer + self.receive_queue + self.receive_buffer
    }
}

impl From<QueueCounters> for Diagnostics {
    fn from(counters: QueueCounters) -> Self {
        Self {
            connections: 1,
            send_queue: counters.send_queue,
            send_buffer: counters.send_buffer,
            receive_queue: counters.receive_queue,
            receive_buffer: counters.receive_buffer,
        }
    }
}

impl Add for Diagnostics {
    type Output = Diagnostics;

    fn add(self, other: Diagnostics) -> Diagnostics {
        Diagnostics {
            connections: self.connections + other.connections,
            send_queue: self.send_queue + other.send_queue,
            send_buffer: self.send_buffer + other.send_buffer,
            receive_queue: self.receive_queue + other.receive_queue,
            receive_buffer: self.receive_buffer + other.receive_buffer,
        }
    }
}

impl Sum for Diagnostics {
    fn sum<I: Iterator<Item = Diagnostics>>(iter: I) -> Self {
        iter.fold(Diagnostics::default(), Add::add)
    }
}

impl fmt::Display for Diagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "connections={} send_queue={} send_buffer={} receive_queue={} receive_buffer={}",
            self.connections, self.send_queue, self.send_buffer, self.receive_queue, self.receive_buffer
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sum_over_connections() {
        let one = Diagnostics::from(QueueCounters { send_queue: 1, send_buffer: 2, receive_queue: 3, receive_buffer: 4 });
        let total: Diagnostics = vec![one, one, one].into_iter().sum();
        assert_eq!(total.connections, 3);
        assert_eq!(total.send_buffer, 6);
        assert_eq!(total.total_queued(), 30);
    }

    #[test]
    fn test_empty_sum_is_zero() {
        let total: Diagnostics = std::iter::empty().sum();
        assert_eq!(total, Diagnostics::default());
    }
}
