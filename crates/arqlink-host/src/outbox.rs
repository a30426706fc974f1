use std::{fmt::Debug, net::SocketAddr};

use arqlink_core::transport::Socket;
use crossbeam_channel::Sender;
use tracing::error;

use crate::event_types::Action;

/// Minimal event sink abstraction to decouple from a concrete channel.
trait EventSink<E> {
    fn send(&mut self, event: E);
}

/// Channel-backed event sink using crossbeam `Sender`.
#[derive(Debug)]
struct ChannelSink<E>(Sender<E>);

impl<E: Debug> EventSink<E> for ChannelSink<E> {
    fn send(&mut self, event: E) {
        if let Err(err) = self.0.send(event) {
            error!("Dropping event, receiver is gone: {:?}", err.into_inner());
        }
    }
}

/// Collects datagrams and events produced during a tick and hands them to the
/// socket and the event channel in one go.
#[derive(Debug)]
pub(crate) struct Outbox<E: Debug> {
    sink: ChannelSink<E>,
    pending_sends: Vec<(SocketAddr, Vec<u8>)>,
    pending_events: Vec<E>,
}

impl<E: Debug> Outbox<E> {
    pub(crate) fn new(sender: Sender<E>) -> Self {
        Self { sink: ChannelSink(sender), pending_sends: Vec::new(), pending_events: Vec::new() }
    }

    /// Queues the actions of the connection at `address`, converting its
    /// events with `tag`.
    pub(crate) fn handle_actions<C>(
        &mut self,
        address: SocketAddr,
        actions: Vec<Action<C>>,
        mut tag: impl FnMut(C) -> E,
    ) {
        for action in actions {
            match action {
                Action::Send(bytes) => self.pending_sends.push((address, bytes)),
                Action::Emit(event) => self.pending_events.push(tag(event)),
            }
        }
    }

    /// Queues only the datagrams of `actions`; events are discarded.
    pub(crate) fn handle_sends<C>(&mut self, address: SocketAddr, actions: Vec<Action<C>>) {
        for action in actions {
            if let Action::Send(bytes) = action {
                self.pending_sends.push((address, bytes));
            }
        }
    }

    /// Writes queued datagrams to `socket` and publishes queued events.
    pub(crate) fn flush<TSocket: Socket>(&mut self, socket: Option<&mut TSocket>) {
        match socket {
            Some(socket) => {
                for (address, payload) in self.pending_sends.drain(..) {
                    if let Err(err) = socket.send_packet(&address, &payload) {
                        error!("Error occured sending a packet (to {}): {}", address, err)
                    }
                }
            }
            None => self.pending_sends.clear(),
        }
        for event in self.pending_events.drain(..) {
            self.sink.send(event);
        }
    }
}
