use arqlink_core::{error::Result, Channel, ConnectionId};

/// Listener fired when a client connection completes its handshake.
pub type ClientConnectedListener = Box<dyn FnMut()>;
/// Listener fired for every message the client receives.
pub type ClientDataListener = Box<dyn FnMut(&[u8], Channel)>;
/// Listener fired once when the client connection ends.
pub type ClientDisconnectedListener = Box<dyn FnMut()>;
/// Listener fired when a peer joins the server's live set.
pub type ServerConnectedListener = Box<dyn FnMut(ConnectionId)>;
/// Listener fired for every message a peer sends the server.
pub type ServerDataListener = Box<dyn FnMut(ConnectionId, &[u8], Channel)>;
/// Listener fired once when a peer leaves the server's live set.
pub type ServerDisconnectedListener = Box<dyn FnMut(ConnectionId)>;

/// Uniform server/client transport contract.
///
/// Nothing here blocks. Sends are queued and leave on a later [`tick`](Self::tick);
/// connection establishment is reported through the connected listener.
/// Listeners run inside `tick` (and inside the disconnect/stop calls) and are
/// never invoked reentrantly.
pub trait Transport {
    /// Returns true when the current platform supports this transport.
    fn is_available(&self) -> bool;

    /// Returns true once the client completed its handshake.
    fn client_connected(&self) -> bool;

    /// Starts connecting the client to `address` on the configured port.
    fn client_connect(&mut self, address: &str) -> Result<()>;

    /// Queues a message from the client to the server.
    fn client_send(&mut self, channel: Channel, payload: &[u8]) -> Result<()>;

    /// Closes the client connection. Idempotent.
    fn client_disconnect(&mut self);

    /// Returns true while the server is listening.
    fn server_active(&self) -> bool;

    /// Starts the server on `port`.
    fn server_start(&mut self, port: u16) -> Result<()>;

    /// Queues a message from the server to one client.
    fn server_send(&mut self, id: ConnectionId, channel: Channel, payload: &[u8]) -> Result<()>;

    /// Closes one client connection; false when the id is unknown.
    fn server_disconnect(&mut self, id: ConnectionId) -> bool;

    /// Network address of a connected client.
    fn server_client_address(&self, id: ConnectionId) -> Result<String>;

    /// Closes every client connection and stops listening.
    fn server_stop(&mut self);

    /// Largest payload accepted on the reliable channel.
    fn max_packet_size(&self) -> usize;

    /// Advances both endpoints once and dispatches their events.
    fn tick(&mut self);

    /// Tears everything down.
    fn shutdown(&mut self);

    /// Registers the client connected listener.
    fn on_client_connected(&mut self, listener: ClientConnectedListener);

    /// Registers the client data listener.
    fn on_client_data(&mut self, listener: ClientDataListener);

    /// Registers the client disconnected listener.
    fn on_client_disconnected(&mut self, listener: ClientDisconnectedListener);

    /// Registers the server connected listener.
    fn on_server_connected(&mut self, listener: ServerConnectedListener);

    /// Registers the server data listener.
    fn on_server_data(&mut self, listener: ServerDataListener);

    /// Registers the server disconnected listener.
    fn on_server_disconnected(&mut self, listener: ServerDisconnectedListener);
}
