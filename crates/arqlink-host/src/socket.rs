use std::{
    io,
    net::{Ipv4Addr, Ipv6Addr, SocketAddr, UdpSocket},
};

use arqlink_core::{transport::Socket, Config};
use socket2::{Domain, Protocol, SockRef, Socket as Socket2, Type};
use tracing::{trace, warn};

use crate::conditioner::LinkConditioner;

/// Applies socket options from configuration to a UdpSocket.
fn apply_socket_options(socket: &UdpSocket, config: &Config) -> io::Result<()> {
    let socket2 = SockRef::from(socket);

    // Apply receive buffer size
    if let Some(size) = config.socket_recv_buffer_size {
        socket2.set_recv_buffer_size(size)?;
    }

    // Apply send buffer size
    if let Some(size) = config.socket_send_buffer_size {
        socket2.set_send_buffer_size(size)?;
    }

    Ok(())
}

/// Binds `[::]:port` with IPV6_V6ONLY turned off.
fn bind_dual_mode(port: u16) -> io::Result<UdpSocket> {
    let socket = Socket2::new(Domain::IPV6, Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_only_v6(false)?;
    socket.bind(&SocketAddr::from((Ipv6Addr::UNSPECIFIED, port)).into())?;
    Ok(socket.into())
}

/// Non-blocking UDP socket used by both endpoints.
#[derive(Debug)]
pub struct UdpTransport {
    socket: UdpSocket,
    conditioner: Option<LinkConditioner>,
}

impl UdpTransport {
    /// Binds the listening socket of a server.
    ///
    /// In dual mode the socket listens on `[::]` and accepts IPv4 peers too;
    /// hosts without IPv6 fall back to `0.0.0.0`.
    pub fn bind_server(port: u16, config: &Config) -> io::Result<Self> {
        if config.dual_mode {
            match bind_dual_mode(port) {
                Ok(socket) => return Self::configure(socket, config),
                Err(err) => warn!("Dual mode bind of port {} failed ({}), falling back to IPv4", port, err),
            }
        }
        Self::configure(UdpSocket::bind((Ipv4Addr::UNSPECIFIED, port))?, config)
    }

    /// Binds an ephemeral socket able to reach `remote`.
    pub fn bind_client(remote: &SocketAddr, config: &Config) -> io::Result<Self> {
        let local: SocketAddr = match remote {
            SocketAddr::V4(_) => (Ipv4Addr::UNSPECIFIED, 0).into(),
            SocketAddr::V6(_) => (Ipv6Addr::UNSPECIFIED, 0).into(),
        };
        Self::bind_addr(local, config)
    }

    /// Binds exactly `address`.
    pub fn bind_addr(address: SocketAddr, config: &Config) -> io::Result<Self> {
        Self::configure(UdpSocket::bind(address)?, config)
    }

    /// Binds any free port on the IPv4 loopback interface.
    pub fn bind_any(config: &Config) -> io::Result<Self> {
        Self::bind_addr((Ipv4Addr::LOCALHOST, 0).into(), config)
    }

    fn configure(socket: UdpSocket, config: &Config) -> io::Result<Self> {
        socket.set_nonblocking(true)?;
        apply_socket_options(&socket, config)?;
        Ok(Self { socket, conditioner: None })
    }

    /// Routes every outgoing datagram through `conditioner`.
    pub fn with_conditioner(mut self, conditioner: LinkConditioner) -> Self {
        self.conditioner = Some(conditioner);
        self
    }

    /// The attached conditioner, if any.
    pub fn conditioner(&self) -> Option<&LinkConditioner> {
        self.conditioner.as_ref()
    }
}

impl Socket for UdpTransport {
    fn send_packet(&mut self, addr: &SocketAddr, payload: &[u8]) -> io::Result<usize> {
        if let Some(conditioner) = self.conditioner.as_mut() {
            if conditioner.should_drop() {
                trace!("Conditioner dropped {} bytes to {}", payload.len(), addr);
                return Ok(payload.len());
            }
        }
        self.socket.send_to(payload, addr)
    }

    fn receive_packet<'a>(&mut self, buffer: &'a mut [u8]) -> io::Result<(&'a [u8], SocketAddr)> {
        self.socket.recv_from(buffer).map(move |(recv_len, address)| (&buffer[..recv_len], address))
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }
}
