use std::{
    io,
    net::{SocketAddr, ToSocketAddrs},
    time::Instant,
};

use arqlink_core::{
    error::{ErrorKind, Result},
    transport::Socket,
    Channel, Config,
};
use crossbeam_channel::{unbounded, Receiver};
use tracing::{debug, error, info, trace};

use crate::{
    connection::{Connection, ConnectionState},
    diagnostics::Diagnostics,
    event_types::ClientEvent,
    outbox::Outbox,
    socket::UdpTransport,
};

/// Observable state of a client endpoint.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ClientState {
    /// No connection; a new one may be started.
    #[default]
    Disconnected,
    /// Handshake in progress.
    Connecting,
    /// Handshake completed.
    Connected,
}

/// Client endpoint: owns at most one outbound connection.
#[derive(Debug)]
pub struct Client<TSocket: Socket = UdpTransport> {
    config: Config,
    socket: Option<TSocket>,
    connection: Option<Connection>,
    receive_buffer: Vec<u8>,
    outbox: Outbox<ClientEvent>,
    event_receiver: Receiver<ClientEvent>,
}

impl<TSocket: Socket> Client<TSocket> {
    /// Creates a disconnected client.
    pub fn new(config: Config) -> Self {
        let (event_sender, event_receiver) = unbounded();
        Self {
            receive_buffer: vec![0; config.mtu.max(1)],
            config,
            socket: None,
            connection: None,
            outbox: Outbox::new(event_sender),
            event_receiver,
        }
    }

    /// Configuration used by the next connect.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Replaces the configuration used by later connects.
    pub fn set_config(&mut self, config: Config) {
        self.receive_buffer = vec![0; config.mtu.max(1)];
        self.config = config;
    }

    /// Returns the event receiver for receiving client events.
    pub fn event_receiver(&self) -> &Receiver<ClientEvent> {
        &self.event_receiver
    }

    /// Current state.
    pub fn state(&self) -> ClientState {
        match self.connection.as_ref().map(Connection::state) {
            Some(ConnectionState::Connecting) => ClientState::Connecting,
            Some(ConnectionState::Connected) => ClientState::Connected,
            Some(ConnectionState::Disconnected) | None => ClientState::Disconnected,
        }
    }

    /// Returns true once the handshake completed.
    pub fn is_connected(&self) -> bool {
        self.state() == ClientState::Connected
    }

    /// Address of the local socket while connecting or connected.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        match &self.socket {
            Some(socket) => Ok(socket.local_addr()?),
            None => Err(ErrorKind::NotConnected),
        }
    }

    /// Address of the server while connecting or connected.
    pub fn remote_addr(&self) -> Option<SocketAddr> {
        self.connection.as_ref().map(Connection::remote_address)
    }

    /// Starts connecting to `remote` over an already bound socket.
    ///
    /// The hello goes out on the next tick. [`ClientEvent::Connected`] or
    /// [`ClientEvent::Disconnected`] follows from a later tick.
    pub fn connect_with_socket(&mut self, socket: TSocket, remote: SocketAddr, time: Instant) -> Result<()> {
        if self.connection.is_some() {
            return Err(ErrorKind::AlreadyConnected);
        }
        info!("Connecting to {} from {}", remote, socket.local_addr()?);
        self.connection = Some(Connection::connect(remote, &self.config, time));
        self.socket = Some(socket);
        Ok(())
    }

    /// Queues a message for the server.
    pub fn send(&mut self, payload: &[u8], channel: Channel) -> Result<()> {
        match self.connection.as_mut() {
            Some(connection) if connection.is_connected() => connection.send(payload, channel),
            _ => Err(ErrorKind::NotConnected),
        }
    }

    /// Closes the connection.
    ///
    /// [`ClientEvent::Disconnected`] is published before this returns. Does
    /// nothing when already disconnected.
    pub fn disconnect(&mut self) {
        let Some(mut connection) = self.connection.take() else {
            return;
        };
        debug!("Disconnecting from {}", connection.remote_address());
        let actions = connection.disconnect();
        self.outbox.handle_actions(connection.remote_address(), actions, ClientEvent::from);
        self.outbox.flush(self.socket.as_mut());
        self.socket = None;
    }

    /// Counters of the current connection; all zero unless connected.
    pub fn diagnostics(&self) -> Diagnostics {
        self.connection
            .as_ref()
            .filter(|connection| connection.is_connected())
            .map(|connection| Diagnostics::from(connection.counters()))
            .unwrap_or_default()
    }

    /// Runs one client iteration: drains the socket, advances the
    /// connection, then transmits and publishes.
    pub fn tick(&mut self, time: Instant) {
        if self.connection.is_none() {
            return;
        }
        self.receive(time);

        if let Some(connection) = self.connection.as_mut() {
            let actions = connection.update(time);
            self.outbox.handle_actions(connection.remote_address(), actions, ClientEvent::from);
        }
        self.outbox.flush(self.socket.as_mut());

        if self.connection.as_ref().is_some_and(Connection::is_disconnected) {
            self.connection = None;
            self.socket = None;
        }
    }

    fn receive(&mut self, time: Instant) {
        loop {
            let (Some(socket), Some(connection)) = (self.socket.as_mut(), self.connection.as_mut()) else {
                return;
            };
            match socket.receive_packet(self.receive_buffer.as_mut()) {
                Ok((datagram, address)) => {
                    if address != connection.remote_address() {
                        trace!("Ignoring datagram from stranger {}", address);
                        continue;
                    }
                    let actions = connection.process_datagram(datagram, time);
                    self.outbox.handle_actions(address, actions, ClientEvent::from);
                    if connection.is_disconnected() {
                        return;
                    }
                }
                Err(e) => {
                    if e.kind() != io::ErrorKind::WouldBlock {
                        error!("Encountered an error receiving data: {:?}", e);
                    }
                    return;
                }
            }
        }
    }
}

impl Client<UdpTransport> {
    /// Resolves `address`, binds an ephemeral socket and starts connecting.
    ///
    /// `time` must come from the same clock as the instants later passed to
    /// [`tick`](Self::tick).
    pub fn connect(&mut self, address: &str, port: u16, time: Instant) -> Result<()> {
        if self.connection.is_some() {
            return Err(ErrorKind::AlreadyConnected);
        }
        let remote = (address, port)
            .to_socket_addrs()
            .map_err(|e| ErrorKind::AddressResolution(format!("{}: {}", address, e)))?
            .next()
            .ok_or_else(|| ErrorKind::AddressResolution(format!("{}: no addresses found", address)))?;
        let socket = UdpTransport::bind_client(&remote, &self.config)?;
        self.connect_with_socket(socket, remote, time)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_client_is_disconnected() {
        let mut client: Client = Client::new(Config::default());
        assert_eq!(client.state(), ClientState::Disconnected);
        assert!(matches!(client.send(&[1], Channel::Reliable), Err(ErrorKind::NotConnected)));
        assert_eq!(client.diagnostics(), Diagnostics::default());
        // Idempotent and silent.
        client.disconnect();
        assert!(client.event_receiver().try_recv().is_err());
    }

    #[test]
    fn test_connect_twice_is_rejected() {
        let mut client: Client = Client::new(Config::default());
        client.connect("127.0.0.1", 9, Instant::now()).unwrap();
        assert_eq!(client.state(), ClientState::Connecting);
        assert!(matches!(client.connect("127.0.0.1", 9, Instant::now()), Err(ErrorKind::AlreadyConnected)));
        assert!(matches!(client.send(&[1], Channel::Reliable), Err(ErrorKind::NotConnected)));
    }

    #[test]
    fn test_diagnostics_are_zero_while_connecting() {
        let mut client: Client = Client::new(Config::default());
        client.connect("127.0.0.1", 9, Instant::now()).unwrap();
        // The hello is queued but the handshake has not completed.
        assert_eq!(client.state(), ClientState::Connecting);
        assert_eq!(client.diagnostics(), Diagnostics::default());
    }

    #[test]
    fn test_unresolvable_address() {
        let mut client: Client = Client::new(Config::default());
        let result = client.connect("definitely not a host name", 7777, Instant::now());
        assert!(matches!(result, Err(ErrorKind::AddressResolution(_))));
        assert_eq!(client.state(), ClientState::Disconnected);
    }

    #[test]
    fn test_disconnect_while_connecting_reports_once() {
        let mut client: Client = Client::new(Config::default());
        client.connect("127.0.0.1", 9, Instant::now()).unwrap();
        client.disconnect();
        client.disconnect();

        assert_eq!(client.state(), ClientState::Disconnected);
        assert_eq!(client.event_receiver().try_iter().collect::<Vec<_>>(), vec![ClientEvent::Disconnected]);
    }
}
