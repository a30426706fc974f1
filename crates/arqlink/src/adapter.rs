use std::{
    net::SocketAddr,
    sync::Arc,
    time::Duration,
};

use arqlink_core::{
    error::{ErrorKind, Result},
    Channel, Config, ConnectionId,
};
use arqlink_host::{Client, ClientState, Clock, Diagnostics, Server, SystemClock};
use tracing::{debug, info, warn};

use crate::{
    listeners::Listeners,
    statistics::StatisticsLog,
    transport::{
        ClientConnectedListener, ClientDataListener, ClientDisconnectedListener, ServerConnectedListener,
        ServerDataListener, ServerDisconnectedListener, Transport,
    },
};

const STATISTICS_WINDOW: Duration = Duration::from_secs(1);

/// One server endpoint and one client endpoint behind the [`Transport`] contract.
///
/// The adapter owns the configuration. Edits made through
/// [`config_mut`](Self::config_mut) reach an endpoint the next time it starts
/// or connects; open connections keep the values they were created with.
pub struct TransportAdapter {
    config: Config,
    server: Server,
    client: Client,
    listeners: Listeners,
    clock: Arc<dyn Clock>,
    enabled: bool,
    statistics: StatisticsLog,
}

impl std::fmt::Debug for TransportAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportAdapter")
            .field("config", &self.config)
            .field("server", &self.server)
            .field("client", &self.client)
            .field("listeners", &self.listeners)
            .field("enabled", &self.enabled)
            .finish()
    }
}

impl Default for TransportAdapter {
    fn default() -> Self {
        Self::new(Config::default())
    }
}

impl TransportAdapter {
    /// Creates an adapter with both endpoints idle.
    pub fn new(config: Config) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Creates an adapter reading time from `clock`.
    pub fn with_clock(config: Config, clock: Arc<dyn Clock>) -> Self {
        Self {
            server: Server::new(config.clone()),
            client: Client::new(config.clone()),
            config,
            listeners: Listeners::default(),
            clock,
            enabled: true,
            statistics: StatisticsLog::new(STATISTICS_WINDOW),
        }
    }

    /// Rebuilds both endpoints from `config`.
    ///
    /// Fails with [`ErrorKind::AlreadyActive`] while the server listens or the
    /// client is connecting or connected. Registered listeners are kept.
    pub fn initialize(&mut self, config: Config) -> Result<()> {
        if self.server.is_active() || self.client.state() != ClientState::Disconnected {
            return Err(ErrorKind::AlreadyActive);
        }
        debug!("Initializing transport on port {}", config.port);
        self.server = Server::new(config.clone());
        self.client = Client::new(config.clone());
        self.config = config;
        Ok(())
    }

    /// Current configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Mutable access to the configuration used by later starts and connects.
    pub fn config_mut(&mut self) -> &mut Config {
        &mut self.config
    }

    /// Configured server port.
    pub fn port(&self) -> u16 {
        self.config.port
    }

    /// Turns ticking on or off. A disabled adapter ignores [`tick`](Transport::tick).
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    /// Returns true unless ticking was turned off.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Largest payload accepted on `channel`.
    pub fn max_packet_size_for(&self, channel: Channel) -> usize {
        match channel {
            Channel::Reliable => self.config.reliable_max_message_size(),
            Channel::Unreliable => self.config.unreliable_max_message_size(),
        }
    }

    /// Address the server socket is bound to.
    pub fn server_local_addr(&self) -> Result<SocketAddr> {
        self.server.local_addr()
    }

    /// State of the client endpoint.
    pub fn client_state(&self) -> ClientState {
        self.client.state()
    }

    /// Counters summed over the server's live connections.
    pub fn server_diagnostics(&self) -> Diagnostics {
        self.server.diagnostics()
    }

    /// Counters of the client connection; zero unless connected.
    pub fn client_diagnostics(&self) -> Diagnostics {
        self.client.diagnostics()
    }

    fn dispatch_server_events(&mut self) {
        while let Ok(event) = self.server.event_receiver().try_recv() {
            self.listeners.dispatch_server(event);
        }
    }

    fn dispatch_client_events(&mut self) {
        while let Ok(event) = self.client.event_receiver().try_recv() {
            self.listeners.dispatch_client(event);
        }
    }
}

impl Transport for TransportAdapter {
    fn is_available(&self) -> bool {
        cfg!(not(target_arch = "wasm32"))
    }

    fn client_connected(&self) -> bool {
        self.client.is_connected()
    }

    fn client_connect(&mut self, address: &str) -> Result<()> {
        if self.client.state() != ClientState::Disconnected {
            return Err(ErrorKind::AlreadyConnected);
        }
        self.client.set_config(self.config.clone());
        let now = self.clock.now();
        self.client.connect(address, self.config.port, now)
    }

    fn client_send(&mut self, channel: Channel, payload: &[u8]) -> Result<()> {
        self.client.send(payload, channel)
    }

    fn client_disconnect(&mut self) {
        self.client.disconnect();
        self.dispatch_client_events();
    }

    fn server_active(&self) -> bool {
        self.server.is_active()
    }

    fn server_start(&mut self, port: u16) -> Result<()> {
        if self.server.is_active() {
            return Err(ErrorKind::AlreadyActive);
        }
        self.config.port = port;
        self.server.set_config(self.config.clone());
        self.server.start()
    }

    fn server_send(&mut self, id: ConnectionId, channel: Channel, payload: &[u8]) -> Result<()> {
        self.server.send(id, payload, channel)
    }

    fn server_disconnect(&mut self, id: ConnectionId) -> bool {
        match self.server.disconnect(id) {
            Ok(()) => {
                self.dispatch_server_events();
                true
            }
            Err(err) if err.is_soft() => {
                debug!("Server disconnect of {} failed: {}", id, err);
                false
            }
            Err(err) => {
                warn!("Server disconnect of {} failed: {}", id, err);
                false
            }
        }
    }

    fn server_client_address(&self, id: ConnectionId) -> Result<String> {
        self.server.client_address(id).map(|address| address.ip().to_canonical().to_string())
    }

    fn server_stop(&mut self) {
        self.server.stop();
        self.dispatch_server_events();
    }

    fn max_packet_size(&self) -> usize {
        self.max_packet_size_for(Channel::Reliable)
    }

    fn tick(&mut self) {
        if !self.enabled {
            return;
        }
        let now = self.clock.now();

        self.server.tick(now);
        self.dispatch_server_events();

        self.client.tick(now);
        self.dispatch_client_events();

        if self.statistics.tick(now) && self.config.statistics_log {
            self.statistics.log(&self.server.diagnostics(), &self.client.diagnostics());
        }
    }

    /// Full teardown: stops the server and disconnects the client, firing
    /// the disconnected listeners for every connection that was open.
    fn shutdown(&mut self) {
        if self.server.is_active() || self.client.state() != ClientState::Disconnected {
            info!("Shutting down transport");
        }
        self.server_stop();
        self.client_disconnect();
    }

    fn on_client_connected(&mut self, listener: ClientConnectedListener) {
        self.listeners.client_connected = Some(listener);
    }

    fn on_client_data(&mut self, listener: ClientDataListener) {
        self.listeners.client_data = Some(listener);
    }

    fn on_client_disconnected(&mut self, listener: ClientDisconnectedListener) {
        self.listeners.client_disconnected = Some(listener);
    }

    fn on_server_connected(&mut self, listener: ServerConnectedListener) {
        self.listeners.server_connected = Some(listener);
    }

    fn on_server_data(&mut self, listener: ServerDataListener) {
        self.listeners.server_data = Some(listener);
    }

    fn on_server_disconnected(&mut self, listener: ServerDisconnectedListener) {
        self.listeners.server_disconnected = Some(listener);
    }
}
