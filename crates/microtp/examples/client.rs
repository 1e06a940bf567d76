//! Client that sends numbered messages to the echo server and prints the replies.
//!
//! Run the server first:
//! - cargo run -p microtp --example server -- 127.0.0.1:7777
//!
//! Then run the client:
//! - cargo run -p microtp --example client -- 127.0.0.1:7777
//! - cargo run -p microtp --example client -- 127.0.0.1:7777 10
//!   (sends 10 messages, then ends the stream)

use std::{
    env,
    net::SocketAddr,
    thread,
    time::{Duration, Instant},
};

use microtp::{Host, SocketEvent};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Args: <server_addr> [count]
    let mut args = env::args().skip(1);
    let server_addr: SocketAddr = args
        .next()
        .unwrap_or_else(|| "127.0.0.1:9000".to_string())
        .parse()?;
    let count: usize = args.next().unwrap_or_else(|| "5".into()).parse().unwrap_or(5);

    let (mut host, handle) = Host::connect(server_addr)?;
    println!("microtp client bound to {} -> {}", host.local_addr()?, server_addr);

    for i in 0..count {
        host.write(handle, format!("hello {}\n", i))?;
    }
    host.end(handle)?;

    while host.is_open() {
        host.manual_poll(Instant::now());

        while let Some(event) = host.recv() {
            match event {
                SocketEvent::Connect(handle) => println!("[connect] {}", handle),
                SocketEvent::Data(_, bytes) => print!("{}", String::from_utf8_lossy(&bytes)),
                SocketEvent::Delivered(_, id) => println!("[delivered] write {}", id.0),
                SocketEvent::End(_) => println!("[end]"),
                SocketEvent::Close(_) => println!("[close]"),
                SocketEvent::Error(_, message) => eprintln!("[error] {}", message),
                _ => {}
            }
        }

        thread::sleep(Duration::from_millis(1));
    }

    Ok(())
}
