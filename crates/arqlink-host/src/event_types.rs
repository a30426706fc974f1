//! Event and action types for the host layer.
//!
//! - `Action`: instructions from a connection to its endpoint (send bytes or emit an event)
//! - `ConnectionEvent`: what a single connection reports
//! - `ServerEvent` / `ClientEvent`: what endpoints publish to their owner

use arqlink_core::{Channel, ConnectionId};

/// Actions that connections can request from the endpoint driving them.
#[derive(Debug, PartialEq)]
pub enum Action<E> {
    /// Send the given datagram to the connection's remote address
    Send(Vec<u8>),
    /// Emit an event to the endpoint's owner
    Emit(E),
}

/// Events raised by one connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// The handshake completed.
    Connected,
    /// A message arrived.
    Data(Vec<u8>, Channel),
    /// The connection closed; no further events follow.
    Disconnected,
}

/// Events published by a server endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerEvent {
    /// A client completed the handshake and was assigned an id.
    Connected(ConnectionId),
    /// A message arrived from a client.
    Data(ConnectionId, Vec<u8>, Channel),
    /// A client left the live set.
    Disconnected(ConnectionId),
}

impl ServerEvent {
    /// Tags a connection event with the id of its connection.
    pub fn from_connection(id: ConnectionId, event: ConnectionEvent) -> Self {
        match event {
            ConnectionEvent::Connected => ServerEvent::Connected(id),
            ConnectionEvent::Data(payload, channel) => ServerEvent::Data(id, payload, channel),
            ConnectionEvent::Disconnected => ServerEvent::Disconnected(id),
        }
    }

    /// Returns the id the event refers to.
    pub fn connection_id(&self) -> ConnectionId {
        match self {
            ServerEvent::Connected(id) | ServerEvent::Data(id, ..) | ServerEvent::Disconnected(id) => *id,
        }
    }
}

/// Events published by a client endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    /// The server accepted the handshake.
    Connected,
    /// A message arrived from the server.
    Data(Vec<u8>, Channel),
    /// The connection closed or could not be established.
    Disconnected,
}

impl From<ConnectionEvent> for ClientEvent {
    fn from(event: ConnectionEvent) -> Self {
        match event {
            ConnectionEvent::Connected => ClientEvent::Connected,
            ConnectionEvent::Data(payload, channel) => ClientEvent::Data(payload, channel),
            ConnectionEvent::Disconnected => ClientEvent::Disconnected,
        }
    }
}
