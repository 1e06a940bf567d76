//! Echo server: writes back every byte it receives and ends when the client ends.
//!
//! Run:
//! - cargo run -p microtp --example server
//! - cargo run -p microtp --example server -- 127.0.0.1:7777

use std::{
    env,
    net::SocketAddr,
    thread,
    time::{Duration, Instant},
};

use microtp::{Config, Host, SocketEvent};

fn parse_bind_addr() -> Option<SocketAddr> {
    env::args().nth(1).and_then(|s| s.parse().ok())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::default();

    let bind_addr = parse_bind_addr().unwrap_or_else(|| SocketAddr::from(([127, 0, 0, 1], 9000)));
    let mut host = Host::bind_with_config(bind_addr, config)?;

    loop {
        host.manual_poll(Instant::now());

        while let Some(event) = host.recv() {
            match event {
                SocketEvent::Listening(addr) => {
                    println!("microtp echo server listening on {}", addr);
                }
                SocketEvent::Connection(handle, addr) => {
                    println!("[connection] {} from {}", handle, addr);
                }
                SocketEvent::Data(handle, bytes) => {
                    println!("[data] {} \"{}\"", handle, String::from_utf8_lossy(&bytes));
                    if let Err(e) = host.write(handle, bytes) {
                        eprintln!("failed to echo: {}", e);
                    }
                }
                SocketEvent::End(handle) => {
                    println!("[end] {}", handle);
                    if let Err(e) = host.end(handle) {
                        eprintln!("failed to end: {}", e);
                    }
                }
                SocketEvent::Close(handle) => {
                    println!("[close] {}", handle);
                }
                SocketEvent::Error(handle, message) => {
                    eprintln!("[error] {:?} {}", handle, message);
                }
                _ => {}
            }
        }

        thread::sleep(Duration::from_millis(1));
    }
}
