use std::{
    net::SocketAddr,
    time::{Duration, Instant},
};

use arqlink_core::{
    constants::{DISCONNECT_REDUNDANCY, PING_INTERVAL_MS, QUEUE_DISCONNECT_THRESHOLD},
    error::{ErrorKind, Result},
    Channel, Config,
};
use arqlink_protocol::{Arq, QueueCounters};
use tracing::{debug, trace, warn};

use crate::{
    event_types::{Action, ConnectionEvent},
    message::{
        decode_message, encode_message, reliable_datagram, split_datagram, unreliable_datagram,
        ChannelTag, MessageTag,
    },
};

/// Lifecycle of a connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    /// Waiting for the peer's hello.
    Connecting,
    /// Handshake completed; messages flow both ways.
    Connected,
    /// Closed; the connection produces nothing anymore.
    Disconnected,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Role {
    /// Accepted by a server; answers the hello.
    Accepting,
    /// Opened by a client; sends the first hello.
    Initiating,
}

/// One peer-to-peer connection: an ARQ stream plus the handshake, keepalive
/// and timeout logic around it.
///
/// The connection never touches a socket. Everything it wants sent comes back
/// as [`Action::Send`] from [`process_datagram`](Self::process_datagram),
/// [`update`](Self::update) and [`disconnect`](Self::disconnect), and
/// everything it observed comes back as [`Action::Emit`].
#[derive(Debug)]
pub struct Connection {
    remote_address: SocketAddr,
    role: Role,
    state: ConnectionState,
    arq: Arq,
    timeout: Duration,
    reliable_max: usize,
    unreliable_max: usize,
    created: Instant,
    last_received: Instant,
    last_ping: Instant,
    /// Unreliable datagrams waiting for the next update.
    outgoing: Vec<Vec<u8>>,
}

impl Connection {
    fn new(remote_address: SocketAddr, role: Role, config: &Config, time: Instant) -> Self {
        Self {
            remote_address,
            role,
            state: ConnectionState::Connecting,
            arq: Arq::new(config),
            timeout: config.timeout,
            reliable_max: config.reliable_max_message_size(),
            unreliable_max: config.unreliable_max_message_size(),
            created: time,
            last_received: time,
            last_ping: time,
            outgoing: Vec::new(),
        }
    }

    /// Creates the server side of a connection; it waits for the peer's hello.
    pub fn accept(remote_address: SocketAddr, config: &Config, time: Instant) -> Self {
        Self::new(remote_address, Role::Accepting, config, time)
    }

    /// Creates the client side of a connection and queues its hello.
    pub fn connect(remote_address: SocketAddr, config: &Config, time: Instant) -> Self {
        let mut connection = Self::new(remote_address, Role::Initiating, config, time);
        connection.send_reliable(MessageTag::Hello, &[]);
        connection
    }

    /// Address of the peer.
    pub fn remote_address(&self) -> SocketAddr {
        self.remote_address
    }

    /// Current state.
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Returns true once the handshake completed and until the connection closes.
    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    /// Returns true once the connection closed.
    pub fn is_disconnected(&self) -> bool {
        self.state == ConnectionState::Disconnected
    }

    /// Queue and buffer counters of the underlying ARQ stream.
    pub fn counters(&self) -> QueueCounters {
        self.arq.counters()
    }

    /// Queues a user message on `channel`.
    ///
    /// Reliable messages go through the ARQ stream; unreliable ones are
    /// written as a single datagram. Either way they leave on the next
    /// [`update`](Self::update).
    pub fn send(&mut self, payload: &[u8], channel: Channel) -> Result<()> {
        if !self.is_connected() {
            return Err(ErrorKind::NotConnected);
        }
        if payload.is_empty() {
            return Err(ErrorKind::EmptyPayload);
        }
        match channel {
            Channel::Reliable => {
                if payload.len() > self.reliable_max {
                    return Err(ErrorKind::PayloadTooLarge { size: payload.len(), max: self.reliable_max });
                }
                self.arq.send(&encode_message(MessageTag::Data, payload))
            }
            Channel::Unreliable => {
                if payload.len() > self.unreliable_max {
                    return Err(ErrorKind::PayloadTooLarge { size: payload.len(), max: self.unreliable_max });
                }
                self.outgoing.push(unreliable_datagram(MessageTag::Data, payload));
                Ok(())
            }
        }
    }

    /// Feeds one datagram received from the peer.
    ///
    /// Malformed datagrams are logged and dropped; they never affect the
    /// connection's state.
    pub fn process_datagram(&mut self, datagram: &[u8], time: Instant) -> Vec<Action<ConnectionEvent>> {
        let mut actions = Vec::new();
        if self.is_disconnected() {
            return actions;
        }

        let (channel, body) = match split_datagram(datagram) {
            Ok(split) => split,
            Err(err) => {
                warn!("Dropping datagram from {}: {}", self.remote_address, err);
                return actions;
            }
        };

        match channel {
            ChannelTag::Reliable => {
                if let Err(err) = self.arq.input(body) {
                    warn!("Dropping reliable datagram from {}: {}", self.remote_address, err);
                    return actions;
                }
                self.last_received = time;
                while let Some(message) = self.arq.recv() {
                    self.handle_reliable(&message, &mut actions);
                    if self.is_disconnected() {
                        break;
                    }
                }
            }
            ChannelTag::Unreliable => {
                self.last_received = time;
                self.handle_unreliable(body, &mut actions);
            }
        }
        actions
    }

    fn handle_reliable(&mut self, message: &[u8], actions: &mut Vec<Action<ConnectionEvent>>) {
        let (tag, payload) = match decode_message(message) {
            Ok(decoded) => decoded,
            Err(err) => {
                warn!("Dropping reliable message from {}: {}", self.remote_address, err);
                return;
            }
        };

        match (tag, self.state) {
            (MessageTag::Hello, ConnectionState::Connecting) => {
                if self.role == Role::Accepting {
                    self.send_reliable(MessageTag::Hello, &[]);
                }
                debug!("Connection to {} established", self.remote_address);
                self.state = ConnectionState::Connected;
                actions.push(Action::Emit(ConnectionEvent::Connected));
            }
            (MessageTag::Hello, _) => {
                debug!("Ignoring repeated hello from {}", self.remote_address);
            }
            (MessageTag::Ping, _) => trace!("Ping from {}", self.remote_address),
            (MessageTag::Data, ConnectionState::Connected) => {
                if payload.is_empty() {
                    warn!("Dropping empty message from {}", self.remote_address);
                } else {
                    actions.push(Action::Emit(ConnectionEvent::Data(payload.to_vec(), Channel::Reliable)));
                }
            }
            (MessageTag::Data, _) => {
                warn!("Dropping data from {} received before the handshake", self.remote_address);
            }
            (MessageTag::Disconnect, _) => {
                warn!("Ignoring disconnect sent on the reliable channel by {}", self.remote_address);
            }
        }
    }

    fn handle_unreliable(&mut self, message: &[u8], actions: &mut Vec<Action<ConnectionEvent>>) {
        let (tag, payload) = match decode_message(message) {
            Ok(decoded) => decoded,
            Err(err) => {
                warn!("Dropping unreliable message from {}: {}", self.remote_address, err);
                return;
            }
        };

        match tag {
            MessageTag::Data if self.is_connected() && !payload.is_empty() => {
                actions.push(Action::Emit(ConnectionEvent::Data(payload.to_vec(), Channel::Unreliable)));
            }
            MessageTag::Data => {
                trace!("Dropping unreliable data from {} in state {:?}", self.remote_address, self.state);
            }
            MessageTag::Disconnect => {
                debug!("{} closed the connection", self.remote_address);
                self.close(false, actions);
            }
            MessageTag::Hello | MessageTag::Ping => {
                warn!("Ignoring {:?} sent on the unreliable channel by {}", tag, self.remote_address);
            }
        }
    }

    /// Advances timers and returns the datagrams due for transmission.
    ///
    /// Closes the connection when the peer has been silent for longer than
    /// the timeout, when the ARQ stream declares the link dead, or when the
    /// queues grew past what the peer can plausibly drain.
    pub fn update(&mut self, time: Instant) -> Vec<Action<ConnectionEvent>> {
        let mut actions = Vec::new();
        if self.is_disconnected() {
            return actions;
        }

        if time.saturating_duration_since(self.last_received) >= self.timeout {
            warn!(
                "Connection to {} timed out after {}ms without data",
                self.remote_address,
                self.timeout.as_millis()
            );
            self.close(true, &mut actions);
            return actions;
        }
        if self.arq.is_dead() {
            warn!("Connection to {} is dead: too many retransmissions", self.remote_address);
            self.close(true, &mut actions);
            return actions;
        }
        let counters = self.arq.counters();
        if counters.total() >= QUEUE_DISCONNECT_THRESHOLD {
            warn!(
                "Disconnecting {}: {} segments queued, the peer is not keeping up",
                self.remote_address,
                counters.total()
            );
            self.close(true, &mut actions);
            return actions;
        }

        if self.is_connected()
            && time.saturating_duration_since(self.last_ping) >= Duration::from_millis(PING_INTERVAL_MS)
        {
            self.send_reliable(MessageTag::Ping, &[]);
            self.last_ping = time;
        }

        actions.extend(self.outgoing.drain(..).map(Action::Send));
        let current = self.engine_time(time);
        actions.extend(self.arq.update(current).into_iter().map(|segments| Action::Send(reliable_datagram(&segments))));
        actions
    }

    /// Closes the connection, telling the peer about it.
    ///
    /// Pending reliable data is flushed once before the notice goes out.
    /// Does nothing when already disconnected.
    pub fn disconnect(&mut self) -> Vec<Action<ConnectionEvent>> {
        let mut actions = Vec::new();
        if self.is_disconnected() {
            return actions;
        }
        actions.extend(self.outgoing.drain(..).map(Action::Send));
        actions.extend(self.arq.flush().into_iter().map(|segments| Action::Send(reliable_datagram(&segments))));
        self.close(true, &mut actions);
        actions
    }

    fn close(&mut self, notify_peer: bool, actions: &mut Vec<Action<ConnectionEvent>>) {
        if notify_peer {
            // Unreliable, so send it a few times.
            for _ in 0..DISCONNECT_REDUNDANCY {
                actions.push(Action::Send(unreliable_datagram(MessageTag::Disconnect, &[])));
            }
        }
        self.outgoing.clear();
        self.state = ConnectionState::Disconnected;
        actions.push(Action::Emit(ConnectionEvent::Disconnected));
    }

    fn send_reliable(&mut self, tag: MessageTag, payload: &[u8]) {
        // Control messages are tiny and always fit.
        if let Err(err) = self.arq.send(&encode_message(tag, payload)) {
            warn!("Could not queue {:?} for {}: {}", tag, self.remote_address, err);
        }
    }

    /// Milliseconds since the connection was created, as the ARQ clock.
    fn engine_time(&self, time: Instant) -> u32 {
        time.saturating_duration_since(self.created).as_millis() as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn address(port: u16) -> SocketAddr {
        format!("127.0.0.1:{}", port).parse().unwrap()
    }

    fn datagrams(actions: &[Action<ConnectionEvent>]) -> Vec<Vec<u8>> {
        actions
            .iter()
            .filter_map(|action| match action {
                Action::Send(bytes) => Some(bytes.clone()),
                Action::Emit(_) => None,
            })
            .collect()
    }

    fn events(actions: Vec<Action<ConnectionEvent>>) -> Vec<ConnectionEvent> {
        actions
            .into_iter()
            .filter_map(|action| match action {
                Action::Emit(event) => Some(event),
                Action::Send(_) => None,
            })
            .collect()
    }

    /// Runs both sides for `ticks` rounds of 10ms and collects their events.
    fn pump(
        client: &mut Connection,
        server: &mut Connection,
        start: Instant,
        ticks: u64,
    ) -> (Vec<ConnectionEvent>, Vec<ConnectionEvent>) {
        let mut client_events = Vec::new();
        let mut server_events = Vec::new();
        for i in 0..ticks {
            let now = start + Duration::from_millis(i * 10);
            let actions = client.update(now);
            for datagram in datagrams(&actions) {
                server_events.extend(events(server.process_datagram(&datagram, now)));
            }
            client_events.extend(events(actions));

            let actions = server.update(now);
            for datagram in datagrams(&actions) {
                client_events.extend(events(client.process_datagram(&datagram, now)));
            }
            server_events.extend(events(actions));
        }
        (client_events, server_events)
    }

    fn connected_pair(start: Instant) -> (Connection, Connection) {
        let config = Config::default();
        let mut client = Connection::connect(address(2000), &config, start);
        let mut server = Connection::accept(address(3000), &config, start);
        let (client_events, server_events) = pump(&mut client, &mut server, start, 10);
        assert_eq!(client_events, vec![ConnectionEvent::Connected]);
        assert_eq!(server_events, vec![ConnectionEvent::Connected]);
        (client, server)
    }

    #[test]
    fn test_handshake_connects_both_sides() {
        let start = Instant::now();
        let (client, server) = connected_pair(start);
        assert!(client.is_connected());
        assert!(server.is_connected());
    }

    #[test]
    fn test_handshake_with_single_slot_receive_window() {
        let start = Instant::now();
        let config = Config { receive_window_size: 1, ..Config::default() };
        let mut client = Connection::connect(address(2000), &config, start);
        let mut server = Connection::accept(address(3000), &config, start);

        let (client_events, server_events) = pump(&mut client, &mut server, start, 10);
        assert_eq!(client_events, vec![ConnectionEvent::Connected]);
        assert_eq!(server_events, vec![ConnectionEvent::Connected]);

        client.send(&[5; 100], Channel::Reliable).unwrap();
        let (_, server_events) = pump(&mut client, &mut server, start + Duration::from_millis(100), 10);
        assert_eq!(server_events, vec![ConnectionEvent::Data(vec![5; 100], Channel::Reliable)]);
    }

    #[test]
    fn test_send_before_handshake_is_rejected() {
        let config = Config::default();
        let mut client = Connection::connect(address(2000), &config, Instant::now());
        assert!(matches!(client.send(&[1], Channel::Reliable), Err(ErrorKind::NotConnected)));
    }

    #[test]
    fn test_messages_flow_on_both_channels() {
        let start = Instant::now();
        let (mut client, mut server) = connected_pair(start);

        client.send(&[1, 2, 3], Channel::Reliable).unwrap();
        client.send(&[4], Channel::Unreliable).unwrap();
        let (_, server_events) = pump(&mut client, &mut server, start + Duration::from_millis(100), 10);

        assert!(server_events.contains(&ConnectionEvent::Data(vec![1, 2, 3], Channel::Reliable)));
        assert!(server_events.contains(&ConnectionEvent::Data(vec![4], Channel::Unreliable)));
    }

    #[test]
    fn test_send_validates_payload() {
        let start = Instant::now();
        let (mut client, _) = connected_pair(start);
        let config = Config::default();

        assert!(matches!(client.send(&[], Channel::Reliable), Err(ErrorKind::EmptyPayload)));

        let too_big = vec![0; config.unreliable_max_message_size() + 1];
        assert!(matches!(
            client.send(&too_big, Channel::Unreliable),
            Err(ErrorKind::PayloadTooLarge { .. })
        ));

        let largest = vec![0; config.reliable_max_message_size()];
        assert!(client.send(&largest, Channel::Reliable).is_ok());
        let too_big = vec![0; config.reliable_max_message_size() + 1];
        assert!(matches!(client.send(&too_big, Channel::Reliable), Err(ErrorKind::PayloadTooLarge { .. })));
    }

    #[test]
    fn test_disconnect_notifies_peer() {
        let start = Instant::now();
        let (mut client, mut server) = connected_pair(start);
        let now = start + Duration::from_millis(100);

        let actions = client.disconnect();
        let sent = datagrams(&actions);
        assert_eq!(sent.iter().filter(|d| d.as_slice() == [2, 4]).count(), DISCONNECT_REDUNDANCY);
        assert_eq!(events(actions), vec![ConnectionEvent::Disconnected]);
        assert!(client.is_disconnected());
        assert!(client.disconnect().is_empty());

        let mut server_events = Vec::new();
        for datagram in sent {
            server_events.extend(events(server.process_datagram(&datagram, now)));
        }
        assert_eq!(server_events, vec![ConnectionEvent::Disconnected]);
    }

    #[test]
    fn test_silent_peer_times_out() {
        let start = Instant::now();
        let (mut client, _) = connected_pair(start);

        let later = start + Duration::from_secs(11);
        let actions = client.update(later);
        assert_eq!(events(actions), vec![ConnectionEvent::Disconnected]);
        assert!(client.is_disconnected());
    }

    #[test]
    fn test_malformed_datagrams_are_ignored() {
        let start = Instant::now();
        let (mut client, _) = connected_pair(start);

        assert!(client.process_datagram(&[], start).is_empty());
        assert!(client.process_datagram(&[77, 1, 2], start).is_empty());
        assert!(client.process_datagram(&[1, 0, 0], start).is_empty());
        assert!(client.process_datagram(&[2, 99], start).is_empty());
        assert!(client.is_connected());
    }

    #[test]
    fn test_keepalive_keeps_idle_connection_open() {
        let start = Instant::now();
        let (mut client, mut server) = connected_pair(start);

        // 15 seconds of silence from the application.
        let (client_events, server_events) =
            pump(&mut client, &mut server, start + Duration::from_millis(100), 1500);
        assert!(!client_events.contains(&ConnectionEvent::Disconnected));
        assert!(!server_events.contains(&ConnectionEvent::Disconnected));
        assert!(client.is_connected());
    }
}
