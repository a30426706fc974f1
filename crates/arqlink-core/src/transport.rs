//! Transport abstraction for pluggable I/O.

use std::{io::Result, net::SocketAddr};

/// Low-level datagram socket abstraction.
///
/// Endpoints talk to the network only through this trait, so the UDP socket
/// can be swapped for a conditioned or emulated one without touching the
/// connection logic.
pub trait Socket {
    /// Sends a single datagram to `addr`.
    fn send_packet(&mut self, addr: &SocketAddr, payload: &[u8]) -> Result<usize>;

    /// Receives a single datagram, returning the filled part of `buffer`.
    ///
    /// Non-blocking sockets report an empty queue as `WouldBlock`.
    fn receive_packet<'a>(&mut self, buffer: &'a mut [u8]) -> Result<(&'a [u8], SocketAddr)>;

    /// Returns the address this socket is bound to.
    fn local_addr(&self) -> Result<SocketAddr>;
}
