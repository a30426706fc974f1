use std::{
    collections::HashMap,
    io,
    net::SocketAddr,
    time::Instant,
};

use arqlink_core::{
    error::{ErrorKind, Result},
    transport::Socket,
    Channel, Config, ConnectionId,
};
use crossbeam_channel::{unbounded, Receiver};
use tracing::{debug, error, info, trace};

use crate::{
    connection::Connection,
    diagnostics::Diagnostics,
    event_types::ServerEvent,
    outbox::Outbox,
    socket::UdpTransport,
};

/// Server endpoint: accepts connections on one socket and keeps the live set.
///
/// Peers start out as pending handshakes keyed by address. A peer gets a
/// [`ConnectionId`] only once its handshake completes, so every id published
/// in [`ServerEvent::Connected`] is later matched by exactly one
/// [`ServerEvent::Disconnected`]. Ids are never reused.
#[derive(Debug)]
pub struct Server<TSocket: Socket = UdpTransport> {
    config: Config,
    socket: Option<TSocket>,
    connections: HashMap<ConnectionId, Connection>,
    addresses: HashMap<SocketAddr, ConnectionId>,
    pending: HashMap<SocketAddr, Connection>,
    next_id: u64,
    receive_buffer: Vec<u8>,
    outbox: Outbox<ServerEvent>,
    event_receiver: Receiver<ServerEvent>,
}

impl<TSocket: Socket> Server<TSocket> {
    /// Creates an inactive server.
    pub fn new(config: Config) -> Self {
        let (event_sender, event_receiver) = unbounded();
        Self {
            receive_buffer: vec![0; config.mtu.max(1)],
            config,
            socket: None,
            connections: HashMap::new(),
            addresses: HashMap::new(),
            pending: HashMap::new(),
            next_id: 1,
            outbox: Outbox::new(event_sender),
            event_receiver,
        }
    }

    /// Configuration used by the next start.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Replaces the configuration. Connections created afterwards use it;
    /// existing connections keep theirs.
    pub fn set_config(&mut self, config: Config) {
        self.receive_buffer = vec![0; config.mtu.max(1)];
        self.config = config;
    }

    /// Starts listening on an already bound socket.
    pub fn start_with_socket(&mut self, socket: TSocket) -> Result<()> {
        if self.is_active() {
            return Err(ErrorKind::AlreadyActive);
        }
        info!("Server listening on {}", socket.local_addr()?);
        self.socket = Some(socket);
        Ok(())
    }

    /// Returns the event receiver for receiving server events.
    pub fn event_receiver(&self) -> &Receiver<ServerEvent> {
        &self.event_receiver
    }

    /// Returns true while the server is listening.
    pub fn is_active(&self) -> bool {
        self.socket.is_some()
    }

    /// Address the server socket is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        match &self.socket {
            Some(socket) => Ok(socket.local_addr()?),
            None => Err(ErrorKind::IOError(io::Error::new(io::ErrorKind::NotConnected, "server is not listening"))),
        }
    }

    /// Number of live connections.
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Number of handshakes in progress.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Returns true when `id` is in the live set.
    pub fn contains(&self, id: ConnectionId) -> bool {
        self.connections.contains_key(&id)
    }

    /// Queues a message for a live connection.
    pub fn send(&mut self, id: ConnectionId, payload: &[u8], channel: Channel) -> Result<()> {
        match self.connections.get_mut(&id) {
            Some(connection) => connection.send(payload, channel),
            None => Err(ErrorKind::UnknownConnection(id)),
        }
    }

    /// Closes a live connection right away.
    ///
    /// The close notice is written to the socket and
    /// [`ServerEvent::Disconnected`] is published before this returns.
    pub fn disconnect(&mut self, id: ConnectionId) -> Result<()> {
        let mut connection = self.connections.remove(&id).ok_or(ErrorKind::UnknownConnection(id))?;
        let address = connection.remote_address();
        self.addresses.remove(&address);

        debug!("Disconnecting {} ({})", id, address);
        let actions = connection.disconnect();
        self.outbox.handle_actions(address, actions, |event| ServerEvent::from_connection(id, event));
        self.outbox.flush(self.socket.as_mut());
        Ok(())
    }

    /// Remote address of a live connection.
    pub fn client_address(&self, id: ConnectionId) -> Result<SocketAddr> {
        self.connections
            .get(&id)
            .map(Connection::remote_address)
            .ok_or(ErrorKind::UnknownConnection(id))
    }

    /// Aggregated counters over all live connections.
    pub fn diagnostics(&self) -> Diagnostics {
        self.connections.values().map(|connection| Diagnostics::from(connection.counters())).sum()
    }

    /// Closes every connection and releases the socket.
    ///
    /// One [`ServerEvent::Disconnected`] per live connection is published
    /// before this returns. Pending handshakes are dropped silently.
    pub fn stop(&mut self) {
        if !self.is_active() {
            return;
        }

        let mut ids: Vec<ConnectionId> = self.connections.keys().copied().collect();
        ids.sort();
        for id in ids {
            if let Some(mut connection) = self.connections.remove(&id) {
                let address = connection.remote_address();
                let actions = connection.disconnect();
                self.outbox.handle_actions(address, actions, |event| ServerEvent::from_connection(id, event));
            }
        }
        self.addresses.clear();
        self.pending.clear();
        self.outbox.flush(self.socket.as_mut());
        self.socket = None;
        info!("Server stopped");
    }

    /// Runs one server iteration: drains the socket, advances every
    /// connection, removes closed ones, then transmits and publishes.
    pub fn tick(&mut self, time: Instant) {
        if !self.is_active() {
            return;
        }
        self.receive(time);
        self.update(time);
        self.outbox.flush(self.socket.as_mut());
    }

    fn receive(&mut self, time: Instant) {
        loop {
            let Some(socket) = self.socket.as_mut() else {
                return;
            };
            let (len, address) = match socket.receive_packet(self.receive_buffer.as_mut()) {
                Ok((payload, address)) => (payload.len(), address),
                Err(e) => {
                    if e.kind() != io::ErrorKind::WouldBlock {
                        error!("Encountered an error receiving data: {:?}", e);
                    }
                    break;
                }
            };
            let datagram = &self.receive_buffer[..len];

            if let Some(&id) = self.addresses.get(&address) {
                if let Some(connection) = self.connections.get_mut(&id) {
                    let actions = connection.process_datagram(datagram, time);
                    self.outbox.handle_actions(address, actions, |event| ServerEvent::from_connection(id, event));
                }
                continue;
            }

            if !self.pending.contains_key(&address) {
                if self.pending.len() >= self.config.max_pending_connections as usize {
                    trace!("Ignoring {}: too many pending handshakes", address);
                    continue;
                }
                self.pending.insert(address, Connection::accept(address, &self.config, time));
            }

            let Some(connection) = self.pending.get_mut(&address) else {
                continue;
            };
            let actions = connection.process_datagram(datagram, time);
            if connection.is_connected() {
                if let Some(connection) = self.pending.remove(&address) {
                    let id = ConnectionId::new(self.next_id);
                    self.next_id += 1;
                    info!("Accepted {} as {}", address, id);
                    self.addresses.insert(address, id);
                    self.connections.insert(id, connection);
                    self.outbox.handle_actions(address, actions, |event| ServerEvent::from_connection(id, event));
                }
            } else {
                self.outbox.handle_sends(address, actions);
                if connection.is_disconnected() {
                    self.pending.remove(&address);
                }
            }
        }
    }

    fn update(&mut self, time: Instant) {
        for (&id, connection) in self.connections.iter_mut() {
            let actions = connection.update(time);
            self.outbox.handle_actions(connection.remote_address(), actions, |event| {
                ServerEvent::from_connection(id, event)
            });
        }
        for (&address, connection) in self.pending.iter_mut() {
            let actions = connection.update(time);
            self.outbox.handle_sends(address, actions);
        }

        let closed: Vec<ConnectionId> = self
            .connections
            .iter()
            .filter(|(_, connection)| connection.is_disconnected())
            .map(|(&id, _)| id)
            .collect();
        for id in closed {
            if let Some(connection) = self.connections.remove(&id) {
                self.addresses.remove(&connection.remote_address());
                debug!("Removed {} ({})", id, connection.remote_address());
            }
        }
        self.pending.retain(|_, connection| !connection.is_disconnected());
    }
}

impl Server<UdpTransport> {
    /// Binds the configured port and starts listening.
    pub fn start(&mut self) -> Result<()> {
        if self.is_active() {
            return Err(ErrorKind::AlreadyActive);
        }
        let port = self.config.port;
        let socket = UdpTransport::bind_server(port, &self.config).map_err(|source| ErrorKind::BindError { port, source })?;
        self.start_with_socket(socket)
    }
}
