use arqlink_host::{ClientEvent, ServerEvent};
use tracing::trace;

use crate::transport::{
    ClientConnectedListener, ClientDataListener, ClientDisconnectedListener, ServerConnectedListener,
    ServerDataListener, ServerDisconnectedListener,
};

/// Registered callbacks. Events without a listener are dropped.
#[derive(Default)]
pub(crate) struct Listeners {
    pub(crate) client_connected: Option<ClientConnectedListener>,
    pub(crate) client_data: Option<ClientDataListener>,
    pub(crate) client_disconnected: Option<ClientDisconnectedListener>,
    pub(crate) server_connected: Option<ServerConnectedListener>,
    pub(crate) server_data: Option<ServerDataListener>,
    pub(crate) server_disconnected: Option<ServerDisconnectedListener>,
}

impl std::fmt::Debug for Listeners {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Listeners")
            .field("client_connected", &self.client_connected.is_some())
            .field("client_data", &self.client_data.is_some())
            .field("client_disconnected", &self.client_disconnected.is_some())
            .field("server_connected", &self.server_connected.is_some())
            .field("server_data", &self.server_data.is_some())
            .field("server_disconnected", &self.server_disconnected.is_some())
            .finish()
    }
}

impl Listeners {
    pub(crate) fn dispatch_server(&mut self, event: ServerEvent) {
        let handled = match &event {
            ServerEvent::Connected(id) => self.server_connected.as_mut().map(|listener| listener(*id)),
            ServerEvent::Data(id, payload, channel) => {
                self.server_data.as_mut().map(|listener| listener(*id, payload.as_slice(), *channel))
            }
            ServerEvent::Disconnected(id) => self.server_disconnected.as_mut().map(|listener| listener(*id)),
        };
        if handled.is_none() {
            trace!("No listener for {:?}", event);
        }
    }

    pub(crate) fn dispatch_client(&mut self, event: ClientEvent) {
        let handled = match &event {
            ClientEvent::Connected => self.client_connected.as_mut().map(|listener| listener()),
            ClientEvent::Data(payload, channel) => self.client_data.as_mut().map(|listener| listener(payload.as_slice(), *channel)),
            ClientEvent::Disconnected => self.client_disconnected.as_mut().map(|listener| listener()),
        };
        if handled.is_none() {
            trace!("No listener for {:?}", event);
        }
    }
}
