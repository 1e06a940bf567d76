use std::{
    io,
    net::{Ipv4Addr, Ipv6Addr, SocketAddr, ToSocketAddrs, UdpSocket},
    sync::Arc,
    thread::{sleep, yield_now},
    time::{Duration, Instant},
};

use bytes::Bytes;
use crossbeam_channel::Receiver;
use microtp_connection::{ConnectionIdAllocator, PortIdAllocator, ReadyState, WriteId};
use microtp_core::{
    config::Config,
    error::{ErrorKind, Result},
    transport::DatagramSocket,
};
use socket2::Socket as Socket2;

use crate::{
    connection_manager::ConnectionManager,
    event_types::{ConnectionHandle, SocketEvent},
    time::{Clock, SystemClock},
};

/// Applies socket options from configuration to a UdpSocket.
fn apply_socket_options(socket: &UdpSocket, config: &Config) -> io::Result<()> {
    let socket2 = Socket2::from(socket.try_clone()?);

    if let Some(size) = config.socket_recv_buffer_size {
        socket2.set_recv_buffer_size(size)?;
    }
    if let Some(size) = config.socket_send_buffer_size {
        socket2.set_send_buffer_size(size)?;
    }
    if let Some(ttl) = config.socket_ttl {
        socket.set_ttl(ttl)?;
    }
    if config.socket_broadcast {
        socket.set_broadcast(true)?;
    }

    Ok(())
}

/// `UdpSocket` as a [`DatagramSocket`].
#[derive(Debug)]
pub struct UdpTransport {
    is_blocking_mode: bool,
    socket: UdpSocket,
}

impl UdpTransport {
    /// Wraps `socket`, switching it to the requested blocking mode.
    pub fn new(socket: UdpSocket, is_blocking_mode: bool) -> Result<Self> {
        socket.set_nonblocking(!is_blocking_mode)?;
        Ok(UdpTransport { is_blocking_mode, socket })
    }
}

impl DatagramSocket for UdpTransport {
    fn send_to(&mut self, addr: &SocketAddr, payload: &[u8]) -> io::Result<usize> {
        self.socket.send_to(payload, addr)
    }

    fn recv_from<'a>(&mut self, buffer: &'a mut [u8]) -> io::Result<(&'a [u8], SocketAddr)> {
        self.socket.recv_from(buffer).map(move |(recv_len, address)| (&buffer[..recv_len], address))
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    fn is_blocking_mode(&self) -> bool {
        self.is_blocking_mode
    }
}

/// A UDP endpoint carrying reliable ordered byte-stream connections.
///
/// A host made with [`Host::bind`] listens and admits every peer that sends a SYN.
/// A host made with [`Host::connect`] owns a single outgoing connection and closes its
/// socket when that connection closes. Nothing happens until the host is polled.
pub struct Host {
    manager: ConnectionManager<UdpTransport>,
    clock: Arc<dyn Clock>,
    polling_timeout: Option<Duration>,
}

impl std::fmt::Debug for Host {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Host").field("manager", &self.manager).finish()
    }
}

impl Host {
    /// Listens on `addresses` with the default configuration.
    pub fn bind<A: ToSocketAddrs>(addresses: A) -> Result<Self> {
        Self::bind_with_config(addresses, Config::default())
    }

    /// Listens on an ephemeral loopback port with the default configuration.
    pub fn bind_any() -> Result<Self> {
        Self::bind_any_with_config(Config::default())
    }

    /// Listens on an ephemeral loopback port.
    pub fn bind_any_with_config(config: Config) -> Result<Self> {
        Self::bind_with_config((Ipv4Addr::LOCALHOST, 0), config)
    }

    /// Listens on `addresses`.
    pub fn bind_with_config<A: ToSocketAddrs>(addresses: A, config: Config) -> Result<Self> {
        let socket = UdpSocket::bind(addresses)?;
        Self::bind_with_config_and_clock(socket, config, Arc::new(SystemClock))
    }

    /// Listens on an already bound socket, reading time from `clock`.
    pub fn bind_with_config_and_clock(
        socket: UdpSocket,
        config: Config,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let mut host = Self::from_socket(socket, config, clock, true)?;
        let address = host.local_addr()?;
        host.manager.emit(SocketEvent::Listening(address));
        Ok(host)
    }

    /// Opens a connection to `addresses` with the default configuration.
    pub fn connect<A: ToSocketAddrs>(addresses: A) -> Result<(Self, ConnectionHandle)> {
        Self::connect_with_config(addresses, Config::default())
    }

    /// Opens a connection to `addresses`; the receive id is the local port.
    pub fn connect_with_config<A: ToSocketAddrs>(
        addresses: A,
        config: Config,
    ) -> Result<(Self, ConnectionHandle)> {
        Self::connect_with_allocator(addresses, config, &mut PortIdAllocator, Arc::new(SystemClock))
    }

    /// Opens a connection to `addresses`, choosing the receive id with `allocator`.
    ///
    /// The socket is bound to an ephemeral port of the remote's address family.
    pub fn connect_with_allocator<A: ToSocketAddrs>(
        addresses: A,
        config: Config,
        allocator: &mut dyn ConnectionIdAllocator,
        clock: Arc<dyn Clock>,
    ) -> Result<(Self, ConnectionHandle)> {
        let remote = addresses.to_socket_addrs()?.next().ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, "no address to connect to")
        })?;
        let socket = if remote.is_ipv4() {
            UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))?
        } else {
            UdpSocket::bind((Ipv6Addr::UNSPECIFIED, 0))?
        };

        let mut host = Self::from_socket(socket, config, clock, false)?;
        let recv_id = allocator.allocate(host.local_addr()?);
        let now = host.clock.now();
        let handle = host.manager.connect(remote, recv_id, now);
        Ok((host, handle))
    }

    fn from_socket(
        socket: UdpSocket,
        config: Config,
        clock: Arc<dyn Clock>,
        accept_incoming: bool,
    ) -> Result<Self> {
        config.validate()?;
        apply_socket_options(&socket, &config)?;

        let polling_timeout = config.socket_polling_timeout;
        let epoch = clock.now();
        let transport = UdpTransport::new(socket, config.blocking_mode)?;
        Ok(Host {
            manager: ConnectionManager::new(transport, config, accept_incoming, epoch),
            clock,
            polling_timeout,
        })
    }

    /// Queues `data` on a connection; progress is reported through `Written` and
    /// `Delivered` events carrying the returned id.
    pub fn write(&mut self, handle: ConnectionHandle, data: impl Into<Bytes>) -> Result<WriteId> {
        let now = self.clock.now();
        self.manager.write(handle, data.into(), now)
    }

    /// Sends end-of-stream once every earlier write has been sent.
    pub fn end(&mut self, handle: ConnectionHandle) -> Result<()> {
        let now = self.clock.now();
        self.manager.end(handle, now)
    }

    /// Resets a connection and closes it at once.
    pub fn abort(&mut self, handle: ConnectionHandle) -> Result<()> {
        let now = self.clock.now();
        self.manager.abort(handle, now)
    }

    /// Holds back `Data` and `End` events of a connection.
    pub fn pause(&mut self, handle: ConnectionHandle) -> Result<()> {
        self.manager.pause(handle)
    }

    /// Emits what was held back by `pause`, in order.
    pub fn resume(&mut self, handle: ConnectionHandle) -> Result<()> {
        let now = self.clock.now();
        self.manager.resume(handle, now)
    }

    /// Returns a clone of the event receiver channel.
    pub fn get_event_receiver(&self) -> Receiver<SocketEvent> {
        self.manager.event_receiver().clone()
    }

    /// Receives the next available event.
    pub fn recv(&mut self) -> Option<SocketEvent> {
        self.manager.event_receiver().try_recv().ok()
    }

    /// Starts automatic polling with the configured sleep between polls (blocking call).
    pub fn start_polling(&mut self) {
        self.start_polling_with_duration(self.polling_timeout)
    }

    /// Starts automatic polling with custom sleep duration between polls (blocking call).
    ///
    /// Returns once the socket of a connecting host has closed.
    pub fn start_polling_with_duration(&mut self, sleep_duration: Option<Duration>) {
        while self.manager.is_socket_open() {
            self.manual_poll(self.clock.now());
            match sleep_duration {
                None => yield_now(),
                Some(duration) => sleep(duration),
            };
        }
    }

    /// Receives pending datagrams, then runs deferred tasks and due timers.
    pub fn manual_poll(&mut self, time: Instant) {
        self.manager.manual_poll(time);
    }

    /// Returns the local socket address this host is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.manager.socket().ok_or(ErrorKind::ConnectionClosed)?.local_addr()?)
    }

    /// Returns false once a connecting host's connection has closed.
    pub fn is_open(&self) -> bool {
        self.manager.is_socket_open()
    }

    /// Returns the number of live connections.
    pub fn connection_count(&self) -> usize {
        self.manager.connections_count()
    }

    /// Returns the lifecycle state of a connection, or `None` once it is gone.
    pub fn connection_state(&self, handle: ConnectionHandle) -> Option<ReadyState> {
        self.manager.connection_state(handle)
    }
}

#[cfg(test)]
mod tests {
    use microtp_core::error::ErrorKind;
    use microtp_protocol::{Packet, PacketType};
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::time::ManualClock;

    #[test]
    fn test_bind_reports_listening() {
        let mut host = Host::bind_any().unwrap();
        let address = host.local_addr().unwrap();
        assert_eq!(host.recv(), Some(SocketEvent::Listening(address)));
        assert_eq!(host.recv(), None);
        assert_eq!(host.connection_count(), 0);
    }

    #[test]
    fn test_bind_rejects_invalid_config() {
        let mut config = Config::default();
        config.buffer_size = 300;
        assert!(matches!(Host::bind_any_with_config(config), Err(ErrorKind::InvalidConfig(_))));
    }

    #[test]
    fn test_socket_options_applied() {
        let mut config = Config::default();
        config.socket_ttl = Some(42);
        config.socket_recv_buffer_size = Some(64 * 1024);
        let socket = UdpSocket::bind("127.0.0.1:0").unwrap();
        apply_socket_options(&socket, &config).unwrap();
        assert_eq!(socket.ttl().unwrap(), 42);
    }

    #[test]
    fn test_connect_sends_syn_with_port_id() {
        let peer = UdpSocket::bind("127.0.0.1:0").unwrap();
        let (host, handle) = Host::connect(peer.local_addr().unwrap()).unwrap();
        let local_port = host.local_addr().unwrap().port();

        assert_eq!(handle.id, local_port);
        assert_eq!(host.connection_state(handle), Some(ReadyState::Connecting));

        let mut buffer = [0u8; 64];
        let (len, from) = peer.recv_from(&mut buffer).unwrap();
        let syn = Packet::decode(&buffer[..len]).unwrap();
        assert_eq!(from.port(), local_port);
        assert_eq!(syn.kind, PacketType::Syn);
        assert_eq!(syn.connection_id, local_port);
        assert_eq!(syn.seq, 1);
    }

    #[test]
    fn test_unanswered_syn_is_resent() {
        let peer = UdpSocket::bind("127.0.0.1:0").unwrap();
        peer.set_read_timeout(Some(Duration::from_secs(1))).unwrap();
        let clock = Arc::new(ManualClock::new(Instant::now()));
        let (mut host, handle) = Host::connect_with_allocator(
            peer.local_addr().unwrap(),
            Config::default(),
            &mut PortIdAllocator,
            clock.clone(),
        )
        .unwrap();

        let mut buffer = [0u8; 64];
        peer.recv_from(&mut buffer).unwrap();

        clock.advance(Duration::from_millis(500));
        host.manual_poll(clock.now());

        let (len, _) = peer.recv_from(&mut buffer).unwrap();
        let resent = Packet::decode(&buffer[..len]).unwrap();
        assert_eq!(resent.kind, PacketType::Syn);
        assert_eq!(resent.seq, 1);
        assert_eq!(resent.timestamp, 500_000);
        assert_eq!(host.recv(), Some(SocketEvent::Resend { handle, seq: 1 }));
    }

    #[test]
    fn test_write_to_unknown_handle_fails() {
        let mut host = Host::bind_any().unwrap();
        let handle = ConnectionHandle::new(host.local_addr().unwrap().ip(), 99);
        assert!(matches!(host.write(handle, &b"x"[..]), Err(ErrorKind::UnknownConnection)));
        assert!(matches!(host.end(handle), Err(ErrorKind::UnknownConnection)));
    }
}
