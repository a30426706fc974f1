//! End-to-end scenarios through the transport adapter.
//!
//! One adapter hosts the server, another the client, both on loopback.

use std::{
    cell::RefCell,
    rc::Rc,
    sync::{Arc, Mutex},
    thread::sleep,
    time::{Duration, Instant},
};

use arqlink::{prelude::*, Clock};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Seen {
    ServerConnected(ConnectionId),
    ServerData(ConnectionId, Vec<u8>, Channel),
    ServerDisconnected(ConnectionId),
    ClientConnected,
    ClientData(Vec<u8>, Channel),
    ClientDisconnected,
}

type Log = Rc<RefCell<Vec<Seen>>>;

fn local_config() -> Config {
    Config { port: 0, dual_mode: false, ..Config::default() }
}

fn record_all(transport: &mut TransportAdapter) -> Log {
    let log: Log = Rc::default();

    let sink = log.clone();
    transport.on_server_connected(Box::new(move |id| sink.borrow_mut().push(Seen::ServerConnected(id))));
    let sink = log.clone();
    transport.on_server_data(Box::new(move |id, payload, channel| {
        sink.borrow_mut().push(Seen::ServerData(id, payload.to_vec(), channel))
    }));
    let sink = log.clone();
    transport.on_server_disconnected(Box::new(move |id| sink.borrow_mut().push(Seen::ServerDisconnected(id))));
    let sink = log.clone();
    transport.on_client_connected(Box::new(move || sink.borrow_mut().push(Seen::ClientConnected)));
    let sink = log.clone();
    transport.on_client_data(Box::new(move |payload, channel| {
        sink.borrow_mut().push(Seen::ClientData(payload.to_vec(), channel))
    }));
    let sink = log.clone();
    transport.on_client_disconnected(Box::new(move || sink.borrow_mut().push(Seen::ClientDisconnected)));

    log
}

/// Ticks both adapters until `done` holds or two seconds pass.
fn pump_until(a: &mut TransportAdapter, b: &mut TransportAdapter, mut done: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(2);
    while Instant::now() < deadline {
        a.tick();
        b.tick();
        if done() {
            return true;
        }
        sleep(Duration::from_millis(1));
    }
    false
}

/// A listening server adapter plus a connected client adapter.
fn connected_pair() -> (TransportAdapter, Log, TransportAdapter, Log, ConnectionId) {
    let mut server = TransportAdapter::new(local_config());
    let server_log = record_all(&mut server);
    server.server_start(0).unwrap();
    let port = server.server_local_addr().unwrap().port();

    let mut client = TransportAdapter::new(Config { port, ..local_config() });
    let client_log = record_all(&mut client);
    client.client_connect("127.0.0.1").unwrap();
    assert_eq!(client.client_state(), ClientState::Connecting);

    let connected = pump_until(&mut server, &mut client, || {
        client_log.borrow().contains(&Seen::ClientConnected) && !server_log.borrow().is_empty()
    });
    assert!(connected);
    assert!(client.client_connected());

    let id = match server_log.borrow().first() {
        Some(Seen::ServerConnected(id)) => *id,
        other => panic!("expected a connect event, got {:?}", other),
    };
    server_log.borrow_mut().clear();
    client_log.borrow_mut().clear();
    (server, server_log, client, client_log, id)
}

#[test]
fn test_ten_messages_then_disconnect() {
    let (mut server, server_log, mut client, _client_log, id) = connected_pair();

    for i in 0..10u8 {
        client.client_send(Channel::Reliable, &[i]).unwrap();
    }
    let delivered = pump_until(&mut server, &mut client, || server_log.borrow().len() == 10);
    assert!(delivered);
    let expected: Vec<Seen> = (0..10u8).map(|i| Seen::ServerData(id, vec![i], Channel::Reliable)).collect();
    assert_eq!(*server_log.borrow(), expected);
    server_log.borrow_mut().clear();

    client.client_disconnect();
    assert!(!client.client_connected());
    let gone = pump_until(&mut server, &mut client, || !server_log.borrow().is_empty());
    assert!(gone);
    assert_eq!(*server_log.borrow(), vec![Seen::ServerDisconnected(id)]);
    assert_eq!(server.server_diagnostics().connections, 0);
    assert!(server.server_client_address(id).is_err());
}

#[test]
fn test_server_reply_reaches_client() {
    let (mut server, _server_log, mut client, client_log, id) = connected_pair();
    assert_eq!(server.server_client_address(id).unwrap(), "127.0.0.1");

    server.server_send(id, Channel::Reliable, b"welcome").unwrap();
    let replied = pump_until(&mut server, &mut client, || !client_log.borrow().is_empty());
    assert!(replied);
    assert_eq!(*client_log.borrow(), vec![Seen::ClientData(b"welcome".to_vec(), Channel::Reliable)]);
}

#[test]
fn test_stop_fires_one_disconnect_per_connection() {
    let (mut server, server_log, mut client, client_log, id) = connected_pair();

    server.server_stop();
    assert!(!server.server_active());
    // Dispatched before server_stop returned.
    assert_eq!(*server_log.borrow(), vec![Seen::ServerDisconnected(id)]);

    let gone = pump_until(&mut server, &mut client, || !client_log.borrow().is_empty());
    assert!(gone);
    assert_eq!(*client_log.borrow(), vec![Seen::ClientDisconnected]);
    assert_eq!(*server_log.borrow(), vec![Seen::ServerDisconnected(id)]);
}

#[test]
fn test_client_state_machine_misuse() {
    let (_server, _server_log, mut client, _client_log, _) = connected_pair();

    assert!(matches!(client.client_connect("127.0.0.1"), Err(ErrorKind::AlreadyConnected)));
    assert!(client.client_connected());

    client.client_disconnect();
    client.client_disconnect();
    assert!(matches!(client.client_send(Channel::Reliable, &[1]), Err(ErrorKind::NotConnected)));
}

#[test]
fn test_oversized_payload_is_rejected_without_queueing() {
    let (_server, _server_log, mut client, _client_log, _) = connected_pair();
    let before = client.client_diagnostics();

    let too_big = vec![0u8; client.max_packet_size() + 1];
    let result = client.client_send(Channel::Reliable, &too_big);
    assert!(matches!(result, Err(ErrorKind::PayloadTooLarge { .. })));
    assert_eq!(client.client_diagnostics().send_queue, before.send_queue);
}

#[test]
fn test_idle_ticks_fire_nothing() {
    let mut transport = TransportAdapter::new(local_config());
    let log = record_all(&mut transport);
    transport.server_start(0).unwrap();
    for _ in 0..20 {
        transport.tick();
    }
    assert!(log.borrow().is_empty());
    assert_eq!(transport.server_diagnostics(), Diagnostics::default());
}

#[test]
fn test_shutdown_tears_down_both_sides() {
    let (mut server, server_log, mut client, client_log, id) = connected_pair();

    client.shutdown();
    assert_eq!(*client_log.borrow(), vec![Seen::ClientDisconnected]);

    server.shutdown();
    assert_eq!(*server_log.borrow(), vec![Seen::ServerDisconnected(id)]);
    assert!(server.initialize(local_config()).is_ok());
}

#[test]
fn test_config_edits_do_not_reach_open_connections() {
    let (mut server, server_log, mut client, _client_log, id) = connected_pair();

    // Shrinking the MTU afterwards must not change what the open connection accepts.
    client.config_mut().mtu = 200;
    let payload = vec![7u8; 1000];
    client.client_send(Channel::Unreliable, &payload).unwrap();

    let delivered = pump_until(&mut server, &mut client, || !server_log.borrow().is_empty());
    assert!(delivered);
    assert_eq!(*server_log.borrow(), vec![Seen::ServerData(id, payload, Channel::Unreliable)]);
}

/// Clock that advances a fixed step on every read, independent of wall time.
struct SteppingClock {
    now: Mutex<Instant>,
    step: Duration,
}

impl Clock for SteppingClock {
    fn now(&self) -> Instant {
        let mut now = self.now.lock().unwrap();
        *now += self.step;
        *now
    }
}

#[test]
fn test_injected_clock_drives_client_traffic() {
    // Start well behind wall time so any use of Instant::now() would stall.
    let base = Instant::now().checked_sub(Duration::from_secs(60)).unwrap_or_else(Instant::now);
    let clock = Arc::new(SteppingClock { now: Mutex::new(base), step: Duration::from_millis(10) });

    let mut server = TransportAdapter::with_clock(local_config(), clock.clone());
    let server_log = record_all(&mut server);
    server.server_start(0).unwrap();
    let port = server.server_local_addr().unwrap().port();

    let mut client = TransportAdapter::with_clock(Config { port, ..local_config() }, clock);
    record_all(&mut client);
    client.client_connect("127.0.0.1").unwrap();
    for _ in 0..200 {
        if client.client_connected() {
            break;
        }
        server.tick();
        client.tick();
        sleep(Duration::from_millis(1));
    }
    assert!(client.client_connected());
    server_log.borrow_mut().clear();

    for i in 0..10u8 {
        client.client_send(Channel::Reliable, &[i]).unwrap();
    }
    let mut ticks = 0;
    while server_log.borrow().len() < 10 && ticks < 300 {
        server.tick();
        client.tick();
        ticks += 1;
        sleep(Duration::from_millis(1));
    }
    assert_eq!(server_log.borrow().len(), 10);
    assert_eq!(client.client_diagnostics().send_queue, 0);
}
