//! Client that sends messages to the echo server and prints replies.
//!
//! Run the server first:
//! - cargo run -p arqlink --example server
//!
//! Then run the client:
//! - cargo run -p arqlink --example client -- 127.0.0.1
//! - cargo run -p arqlink --example client -- 127.0.0.1 10 200
//!   (sends 10 messages, 200ms apart)

use std::{
    cell::Cell,
    env,
    rc::Rc,
    thread,
    time::{Duration, Instant},
};

use arqlink::prelude::*;
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt().with_env_filter(EnvFilter::from_default_env()).init();

    // Args: <server_host> [count] [interval_ms]
    let mut args = env::args().skip(1);
    let host = args.next().unwrap_or_else(|| "127.0.0.1".to_string());
    let count: usize = args.next().and_then(|s| s.parse().ok()).unwrap_or(5);
    let interval_ms: u64 = args.next().and_then(|s| s.parse().ok()).unwrap_or(300);

    let mut transport = TransportAdapter::new(Config::default());
    let closed = Rc::new(Cell::new(false));
    let closed_flag = closed.clone();
    transport.on_client_connected(Box::new(|| println!("[connect]")));
    transport.on_client_data(Box::new(|payload, channel| {
        println!("[reply] channel={:?} payload=\"{}\"", channel, String::from_utf8_lossy(payload));
    }));
    transport.on_client_disconnected(Box::new(move || {
        println!("[disconnect]");
        closed_flag.set(true);
    }));

    transport.client_connect(&host)?;
    println!("connecting to {}:{}", host, transport.port());
    while !transport.client_connected() {
        if closed.get() {
            return Err("could not connect".into());
        }
        transport.tick();
        thread::sleep(Duration::from_millis(10));
    }

    for i in 0..count {
        let channel = if i % 2 == 0 { Channel::Reliable } else { Channel::Unreliable };
        transport.client_send(channel, format!("hello {}", i).as_bytes())?;

        let start = Instant::now();
        while start.elapsed() < Duration::from_millis(interval_ms) {
            transport.tick();
            thread::sleep(Duration::from_millis(10));
        }
    }

    transport.client_disconnect();
    println!("done; last diagnostics: {}", transport.client_diagnostics());
    Ok(())
}
