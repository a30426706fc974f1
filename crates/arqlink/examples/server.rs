//! Echo server on top of the transport adapter.
//!
//! Run:
//! - cargo run -p arqlink --example server
//! - cargo run -p arqlink --example server -- 7777
//!
//! Set `RUST_LOG=debug` to watch connection lifecycle logs.

use std::{cell::RefCell, collections::VecDeque, env, rc::Rc, thread, time::Duration};

use arqlink::prelude::*;
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt().with_env_filter(EnvFilter::from_default_env()).init();

    let port: u16 = env::args().nth(1).and_then(|s| s.parse().ok()).unwrap_or(7777);
    let config = Config { statistics_log: true, ..Config::default() };
    let mut transport = TransportAdapter::new(config);

    // Listeners can't call back into the transport; queue echoes for after the tick.
    let echoes: Rc<RefCell<VecDeque<(ConnectionId, Vec<u8>, Channel)>>> = Rc::default();
    let queue = echoes.clone();
    transport.on_server_connected(Box::new(|id| println!("[connect] {}", id)));
    transport.on_server_data(Box::new(move |id, payload, channel| {
        println!("[data] from={} channel={:?} payload=\"{}\"", id, channel, String::from_utf8_lossy(payload));
        queue.borrow_mut().push_back((id, payload.to_vec(), channel));
    }));
    transport.on_server_disconnected(Box::new(|id| println!("[disconnect] {}", id)));

    transport.server_start(port)?;
    println!("arqlink echo server listening on {}", transport.server_local_addr()?);

    loop {
        transport.tick();

        while let Some((id, payload, channel)) = echoes.borrow_mut().pop_front() {
            if let Err(e) = transport.server_send(id, channel, &payload) {
                eprintln!("failed to queue echo: {}", e);
            }
        }

        thread::sleep(Duration::from_millis(10));
    }
}
