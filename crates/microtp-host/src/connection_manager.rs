use std::{collections::HashMap, net::SocketAddr, time::Instant};

use bytes::Bytes;
use crossbeam_channel::{unbounded, Receiver, Sender};
use microtp_connection::{Action, Connection, Deferred, ReadyState, WriteId};
use microtp_core::{
    config::Config,
    error::{ErrorKind, Result},
    transport::DatagramSocket,
};
use microtp_protocol::{Packet, PacketType};
use tracing::{debug, error, trace};

use crate::{
    event_types::{ConnectionHandle, SocketEvent},
    scheduler::Scheduler,
};

// ============================================================================
// Event Sink (Internal)
// ============================================================================

/// Minimal event sink abstraction to decouple from a concrete channel.
trait EventSink<E> {
    fn send(&mut self, event: E);
}

/// Channel-backed event sink using crossbeam `Sender`.
#[derive(Debug)]
struct ChannelSink<E>(Sender<E>);

impl<E: std::fmt::Debug> EventSink<E> for ChannelSink<E> {
    fn send(&mut self, event: E) {
        if let Err(err) = self.0.send(event) {
            error!("Dropping event, receiver is gone: {:?}", err.into_inner());
        }
    }
}

/// Owns the socket and buffers datagrams and events until `flush`.
///
/// The socket is `None` once it has been closed.
struct Messenger<TSocket: DatagramSocket> {
    config: Config,
    socket: Option<TSocket>,
    event_sink: ChannelSink<SocketEvent>,
    pending_sends: Vec<(ConnectionHandle, SocketAddr, Vec<u8>)>,
    pending_events: Vec<SocketEvent>,
}

impl<TSocket: DatagramSocket> std::fmt::Debug for Messenger<TSocket> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Messenger")
            .field("config", &self.config)
            .field("socket", &"<socket>")
            .field("pending_sends", &self.pending_sends.len())
            .field("pending_events", &self.pending_events)
            .finish()
    }
}

impl<TSocket: DatagramSocket> Messenger<TSocket> {
    fn handle_actions(
        &mut self,
        handle: ConnectionHandle,
        address: SocketAddr,
        actions: Vec<Action>,
        scheduler: &mut Scheduler,
    ) {
        for action in actions {
            match action {
                Action::Send(bytes) => self.pending_sends.push((handle, address, bytes)),
                Action::Emit(event) => {
                    self.pending_events.push(SocketEvent::from_connection(handle, event))
                }
                Action::Defer(task) => scheduler.defer(handle, task),
                Action::Schedule(timer, deadline) => scheduler.schedule(handle, timer, deadline),
            }
        }
    }

    fn flush(&mut self) {
        for (handle, addr, payload) in self.pending_sends.drain(..) {
            let Some(socket) = self.socket.as_mut() else {
                trace!("Dropping datagram to {}, socket is closed", addr);
                continue;
            };
            if let Err(err) = socket.send_to(&addr, &payload) {
                error!("Error occured sending a packet (to {}): {}", addr, err);
                self.pending_events.push(SocketEvent::Error(Some(handle), err.to_string()));
            }
        }
        for event in self.pending_events.drain(..) {
            self.event_sink.send(event);
        }
    }
}

/// Connection registry over one datagram socket.
///
/// Routes each inbound datagram to the connection registered under
/// (peer IP, connection id), admits new connections on SYN when listening, and
/// runs deferred tasks and timers. Everything happens on the caller's thread
/// inside `manual_poll` or one of the per-connection calls.
#[derive(Debug)]
pub struct ConnectionManager<TSocket: DatagramSocket> {
    connections: HashMap<ConnectionHandle, Connection>,
    receive_buffer: Vec<u8>,
    scheduler: Scheduler,
    messenger: Messenger<TSocket>,
    event_receiver: Receiver<SocketEvent>,
    epoch: Instant,
    accept_incoming: bool,
}

impl<TSocket: DatagramSocket> ConnectionManager<TSocket> {
    /// Creates a manager. Only a listening manager accepts SYNs.
    pub fn new(socket: TSocket, config: Config, accept_incoming: bool, epoch: Instant) -> Self {
        let (event_sender, event_receiver) = unbounded();
        ConnectionManager {
            connections: HashMap::new(),
            receive_buffer: vec![0; config.receive_buffer_max_size],
            scheduler: Scheduler::new(),
            messenger: Messenger {
                config,
                socket: Some(socket),
                event_sink: ChannelSink(event_sender),
                pending_sends: Vec::new(),
                pending_events: Vec::new(),
            },
            event_receiver,
            epoch,
            accept_incoming,
        }
    }

    /// Reports an event that did not come from a connection.
    pub fn emit(&mut self, event: SocketEvent) {
        self.messenger.pending_events.push(event);
        self.messenger.flush();
    }

    /// Opens a connection to `remote` whose receive id is `recv_id`.
    pub fn connect(&mut self, remote: SocketAddr, recv_id: u16, time: Instant) -> ConnectionHandle {
        let handle = ConnectionHandle::new(remote.ip(), recv_id);
        let (connection, actions) =
            Connection::initiate(remote, recv_id, &self.messenger.config, self.epoch, time);
        self.messenger.handle_actions(handle, remote, actions, &mut self.scheduler);
        self.connections.insert(handle, connection);
        self.messenger.flush();
        handle
    }

    /// Polls the socket, then runs deferred tasks and due timers.
    pub fn manual_poll(&mut self, time: Instant) {
        let Some(blocking) = self.messenger.socket.as_ref().map(DatagramSocket::is_blocking_mode)
        else {
            return;
        };

        loop {
            let Some(socket) = self.messenger.socket.as_mut() else {
                break;
            };
            match socket.recv_from(self.receive_buffer.as_mut()) {
                Ok((payload, address)) => {
                    let length = payload.len();
                    self.process_datagram(length, address, time);
                    self.run_deferred(time);
                }
                Err(e) => {
                    if e.kind() != std::io::ErrorKind::WouldBlock {
                        error!("Encountered an error receiving data: {:?}", e);
                        self.messenger.pending_events.push(SocketEvent::Error(None, e.to_string()));
                    }
                    break;
                }
            }
            if blocking {
                break;
            }
        }

        while let Some((handle, timer)) = self.scheduler.pop_due(time) {
            if let Some(connection) = self.connections.get_mut(&handle) {
                let actions = connection.on_timer(timer, time);
                let address = connection.remote_address();
                self.messenger.handle_actions(handle, address, actions, &mut self.scheduler);
            }
            self.run_deferred(time);
        }

        self.finish(time);
    }

    fn process_datagram(&mut self, length: usize, address: SocketAddr, time: Instant) {
        let packet = match Packet::decode(&self.receive_buffer[..length]) {
            Ok(packet) => packet,
            Err(err) => {
                trace!("Dropping datagram from {}: {}", address, err);
                return;
            }
        };

        let is_syn = packet.kind == PacketType::Syn;
        let id = if is_syn { packet.connection_id.wrapping_add(1) } else { packet.connection_id };
        let handle = ConnectionHandle::new(address.ip(), id);

        if let Some(connection) = self.connections.get_mut(&handle) {
            if is_syn {
                trace!("Ignoring repeated SYN for {}", handle);
                return;
            }
            connection.set_remote_port(address.port());
            let actions = connection.process_packet(packet, time);
            self.messenger.handle_actions(handle, address, actions, &mut self.scheduler);
            return;
        }

        if !is_syn || !self.accept_incoming {
            trace!("Dropping {:?} for unknown connection {}", packet.kind, handle);
            return;
        }

        let (connection, actions) =
            Connection::accept(address, &packet, &self.messenger.config, self.epoch, time);
        debug!("New connection {} from {}", handle, address);
        self.messenger.pending_events.push(SocketEvent::Connection(handle, address));
        self.messenger.handle_actions(handle, address, actions, &mut self.scheduler);
        self.connections.insert(handle, connection);
    }

    fn run_deferred(&mut self, time: Instant) {
        while let Some((handle, task)) = self.scheduler.pop_deferred() {
            let Some(connection) = self.connections.get_mut(&handle) else {
                continue;
            };
            let actions = match task {
                Deferred::Drain => connection.on_drain(time),
            };
            let address = connection.remote_address();
            self.messenger.handle_actions(handle, address, actions, &mut self.scheduler);
        }
    }

    /// Runs pending deferred work, drops closed connections and flushes. Closing
    /// the initiator's connection releases the socket after the final flush.
    fn finish(&mut self, time: Instant) {
        self.run_deferred(time);

        let mut close_socket = false;
        let closed: Vec<ConnectionHandle> = self
            .connections
            .iter()
            .filter(|(_, connection)| connection.ready_state().is_closed())
            .map(|(handle, _)| *handle)
            .collect();
        for handle in closed {
            self.scheduler.cancel(handle);
            if let Some(connection) = self.connections.remove(&handle) {
                debug!("Removed connection {}", handle);
                if connection.is_initiator() {
                    close_socket = true;
                    self.messenger.pending_events.push(SocketEvent::SocketClosed);
                }
            }
        }

        self.messenger.flush();
        if close_socket {
            debug!("Closing socket");
            self.messenger.socket = None;
        }
    }

    fn connection_mut(&mut self, handle: ConnectionHandle) -> Result<&mut Connection> {
        self.connections.get_mut(&handle).ok_or(ErrorKind::UnknownConnection)
    }

    fn apply(&mut self, handle: ConnectionHandle, actions: Vec<Action>, time: Instant) {
        if let Some(connection) = self.connections.get(&handle) {
            let address = connection.remote_address();
            self.messenger.handle_actions(handle, address, actions, &mut self.scheduler);
        }
        self.finish(time);
    }

    /// Writes `data` on a connection.
    pub fn write(&mut self, handle: ConnectionHandle, data: Bytes, time: Instant) -> Result<WriteId> {
        let (id, actions) = self.connection_mut(handle)?.write(data, time)?;
        self.apply(handle, actions, time);
        Ok(id)
    }

    /// Finishes the write side of a connection.
    pub fn end(&mut self, handle: ConnectionHandle, time: Instant) -> Result<()> {
        let actions = self.connection_mut(handle)?.end(time)?;
        self.apply(handle, actions, time);
        Ok(())
    }

    /// Resets a connection.
    pub fn abort(&mut self, handle: ConnectionHandle, time: Instant) -> Result<()> {
        let actions = self.connection_mut(handle)?.abort(time)?;
        self.apply(handle, actions, time);
        Ok(())
    }

    /// Holds back data received on a connection.
    pub fn pause(&mut self, handle: ConnectionHandle) -> Result<()> {
        self.connection_mut(handle)?.pause();
        Ok(())
    }

    /// Releases data held back by `pause`.
    pub fn resume(&mut self, handle: ConnectionHandle, time: Instant) -> Result<()> {
        let actions = self.connection_mut(handle)?.resume(time);
        self.apply(handle, actions, time);
        Ok(())
    }

    /// Returns the event receiver for receiving connection events.
    pub fn event_receiver(&self) -> &Receiver<SocketEvent> {
        &self.event_receiver
    }

    /// Returns the underlying socket, or `None` once it has been closed.
    pub fn socket(&self) -> Option<&TSocket> {
        self.messenger.socket.as_ref()
    }

    /// Returns false once an initiator's connection has closed its socket.
    pub fn is_socket_open(&self) -> bool {
        self.messenger.socket.is_some()
    }

    /// Returns the number of registered connections.
    pub fn connections_count(&self) -> usize {
        self.connections.len()
    }

    /// Returns the lifecycle state of a connection.
    pub fn connection_state(&self, handle: ConnectionHandle) -> Option<ReadyState> {
        self.connections.get(&handle).map(Connection::ready_state)
    }

    /// Returns the peer address of a connection as last observed.
    pub fn remote_address(&self, handle: ConnectionHandle) -> Option<SocketAddr> {
        self.connections.get(&handle).map(Connection::remote_address)
    }
}

#[cfg(test)]
mod tests {
    use std::{collections::VecDeque, io, net::SocketAddr};

    use microtp_connection::ConnectionEvent;
    use pretty_assertions::assert_eq;

    use super::*;

    /// In-memory socket: datagrams pushed into `inbox` are received in order, sent
    /// datagrams land in `outbox`.
    #[derive(Debug, Default)]
    struct MemorySocket {
        inbox: VecDeque<(SocketAddr, Vec<u8>)>,
        outbox: Vec<(SocketAddr, Vec<u8>)>,
    }

    impl DatagramSocket for MemorySocket {
        fn send_to(&mut self, addr: &SocketAddr, payload: &[u8]) -> io::Result<usize> {
            self.outbox.push((*addr, payload.to_vec()));
            Ok(payload.len())
        }

        fn recv_from<'a>(&mut self, buffer: &'a mut [u8]) -> io::Result<(&'a [u8], SocketAddr)> {
            match self.inbox.pop_front() {
                Some((addr, datagram)) => {
                    buffer[..datagram.len()].copy_from_slice(&datagram);
                    Ok((&buffer[..datagram.len()], addr))
                }
                None => Err(io::Error::new(io::ErrorKind::WouldBlock, "empty")),
            }
        }

        fn local_addr(&self) -> io::Result<SocketAddr> {
            Ok("127.0.0.1:9000".parse().unwrap())
        }

        fn is_blocking_mode(&self) -> bool {
            false
        }
    }

    fn peer() -> SocketAddr {
        "10.0.0.2:5555".parse().unwrap()
    }

    fn syn(connection_id: u16) -> Vec<u8> {
        Packet::new(PacketType::Syn, connection_id, 1, 0, 0, None).encode()
    }

    fn listener() -> ConnectionManager<MemorySocket> {
        ConnectionManager::new(MemorySocket::default(), Config::default(), true, Instant::now())
    }

    fn memory(manager: &mut ConnectionManager<MemorySocket>) -> &mut MemorySocket {
        manager.messenger.socket.as_mut().unwrap()
    }

    fn drain_events(manager: &ConnectionManager<MemorySocket>) -> Vec<SocketEvent> {
        manager.event_receiver().try_iter().collect()
    }

    #[test]
    fn test_syn_admits_responder_under_next_id() {
        let mut manager = listener();
        memory(&mut manager).inbox.push_back((peer(), syn(41)));
        manager.manual_poll(Instant::now());

        let handle = ConnectionHandle::new(peer().ip(), 42);
        assert_eq!(drain_events(&manager), vec![SocketEvent::Connection(handle, peer())]);
        assert_eq!(manager.connection_state(handle), Some(ReadyState::Connected));

        let (to, reply) = &memory(&mut manager).outbox[0];
        let reply = Packet::decode(reply).unwrap();
        assert_eq!(*to, peer());
        assert_eq!(reply.kind, PacketType::State);
        assert_eq!(reply.connection_id, 41);
        assert_eq!(reply.ack, 1);
    }

    #[test]
    fn test_repeated_syn_is_ignored() {
        let mut manager = listener();
        memory(&mut manager).inbox.push_back((peer(), syn(41)));
        memory(&mut manager).inbox.push_back((peer(), syn(41)));
        manager.manual_poll(Instant::now());

        assert_eq!(manager.connections_count(), 1);
        assert_eq!(memory(&mut manager).outbox.len(), 1);
    }

    #[test]
    fn test_short_and_unknown_datagrams_are_dropped() {
        let mut manager = listener();
        memory(&mut manager).inbox.push_back((peer(), vec![0x41; 19]));
        let stray = Packet::new(PacketType::Data, 7, 3, 0, 0, Some(Bytes::from_static(b"x")));
        memory(&mut manager).inbox.push_back((peer(), stray.encode()));
        manager.manual_poll(Instant::now());

        assert_eq!(manager.connections_count(), 0);
        assert!(memory(&mut manager).outbox.is_empty());
        assert!(drain_events(&manager).is_empty());
    }

    #[test]
    fn test_initiator_does_not_accept_syn() {
        let mut manager =
            ConnectionManager::new(MemorySocket::default(), Config::default(), false, Instant::now());
        memory(&mut manager).inbox.push_back((peer(), syn(41)));
        manager.manual_poll(Instant::now());
        assert_eq!(manager.connections_count(), 0);
    }

    #[test]
    fn test_data_follows_peer_port_change() {
        let mut manager = listener();
        memory(&mut manager).inbox.push_back((peer(), syn(41)));
        manager.manual_poll(Instant::now());
        let handle = ConnectionHandle::new(peer().ip(), 42);
        let server_seq = Packet::decode(&memory(&mut manager).outbox[0].1).unwrap().seq;

        let moved: SocketAddr = "10.0.0.2:6666".parse().unwrap();
        let data = Packet::new(PacketType::Data, 42, 2, server_seq, 0, Some(Bytes::from_static(b"hi")));
        memory(&mut manager).inbox.push_back((moved, data.encode()));
        manager.manual_poll(Instant::now());

        assert_eq!(manager.remote_address(handle), Some(moved));
        let events = drain_events(&manager);
        assert!(events.contains(&SocketEvent::from_connection(
            handle,
            ConnectionEvent::Data(Bytes::from_static(b"hi"))
        )));
        assert_eq!(memory(&mut manager).outbox.last().map(|(to, _)| *to), Some(moved));
    }

    #[test]
    fn test_abort_removes_connection_and_timers() {
        let mut manager = listener();
        let now = Instant::now();
        memory(&mut manager).inbox.push_back((peer(), syn(41)));
        manager.manual_poll(now);
        let handle = ConnectionHandle::new(peer().ip(), 42);
        drain_events(&manager);

        manager.abort(handle, now).unwrap();

        assert_eq!(manager.connections_count(), 0);
        assert_eq!(manager.scheduler.timer_count(), 0);
        assert_eq!(drain_events(&manager), vec![SocketEvent::Close(handle)]);
        assert!(manager.is_socket_open());
        assert!(matches!(
            manager.write(handle, Bytes::from_static(b"x"), now),
            Err(ErrorKind::UnknownConnection)
        ));
    }

    #[test]
    fn test_initiator_close_shuts_socket() {
        let mut manager =
            ConnectionManager::new(MemorySocket::default(), Config::default(), false, Instant::now());
        let now = Instant::now();
        let handle = manager.connect(peer(), 5000, now);
        assert_eq!(manager.connection_state(handle), Some(ReadyState::Connecting));

        manager.abort(handle, now).unwrap();

        assert!(!manager.is_socket_open());
        assert!(manager.socket().is_none());
        assert_eq!(
            drain_events(&manager),
            vec![SocketEvent::Close(handle), SocketEvent::SocketClosed]
        );
    }
}
