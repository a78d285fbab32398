use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use mio::{Interest, Token};
use tracing::{debug, warn};

use crate::tcp::acceptor::{self, Listener};
use crate::tcp::address::RouteAddress;
use crate::tcp::config::NukleusConfig;
use crate::tcp::connector;
use crate::tcp::correlation::CorrelationRegistry;
use crate::tcp::counters::Counters;
use crate::tcp::error::{ConnectError, FrameError, RouteError};
use crate::tcp::factory;
use crate::tcp::ids::{CorrelationId, IdGenerator};
use crate::tcp::poller::Poller;
use crate::tcp::read_stream::{ReadAction, ReadState, ReadStream};
use crate::tcp::route::{Route, RouteId, RouteTable};
use crate::tcp::slot::SlotPool;
use crate::tcp::target::{TargetFactory, Throttle};
use crate::tcp::write_stream::{WriteAction, WriteState, WriteStream};

/// One accepted or connected TCP socket and whichever of its read/write
/// halves are currently alive. A half is `None` once torn down, not left
/// dangling in a "closed" state — the connection itself is dropped once
/// both are `None`.
struct Connection {
    socket: mio::net::TcpStream,
    local_addr: SocketAddr,
    peer_addr: SocketAddr,
    read: Option<ReadStream>,
    write: Option<WriteStream>,
    registered: Option<Interest>,
}

/// A socket mid-connect, registered for OP_WRITABLE to learn when it
/// completes. Not yet a [`Connection`] — it has no read half until the
/// connect resolves successfully.
struct PendingConnect {
    socket: mio::net::TcpStream,
    route: Route,
    initiator_stream_id: u64,
    initiator_throttle: Box<dyn Throttle>,
}

/// Where a stream id's frames should be dispatched: which connection owns
/// it, and whether it names that connection's read half or write half.
#[derive(Clone, Copy)]
struct StreamLocation {
    connection: Token,
    is_read: bool,
}

/// The single-threaded TCP reactor. Owns every mio registration, every
/// stream state machine, and the shared backpressure/correlation/slot
/// bookkeeping behind them. One instance pins to one cooperative thread —
/// see `SPEC_FULL.md` §5 — so nothing here is `Send`.
pub struct Reactor<F: TargetFactory> {
    poller: Poller,
    config: NukleusConfig,
    routes: RouteTable,
    correlations: CorrelationRegistry,
    slots: SlotPool,
    counters: Arc<Counters>,
    ids: IdGenerator,
    target_factory: F,
    listeners: HashMap<Token, Listener>,
    connections: HashMap<Token, Connection>,
    pending_connects: HashMap<Token, PendingConnect>,
    streams: HashMap<u64, StreamLocation>,
}

impl<F: TargetFactory> Reactor<F> {
    /// # Errors
    /// Propagates the OS error if the underlying readiness queue can't be
    /// created.
    pub fn new(config: NukleusConfig, target_factory: F) -> std::io::Result<Self> {
        let counters = Counters::new();
        let slots = SlotPool::new(config.slot_size, config.slot_count, counters.clone());
        Ok(Self {
            poller: Poller::new(1024)?,
            config,
            routes: RouteTable::new(),
            correlations: CorrelationRegistry::new(),
            slots,
            counters,
            ids: IdGenerator::default(),
            target_factory,
            listeners: HashMap::new(),
            connections: HashMap::new(),
            pending_connects: HashMap::new(),
            streams: HashMap::new(),
        })
    }

    #[must_use]
    pub fn counters(&self) -> &Arc<Counters> {
        &self.counters
    }

    #[must_use]
    pub fn target_factory(&self) -> &F {
        &self.target_factory
    }

    /// Binds a listener and adds the server-side route it accepts
    /// connections against. Returns the route id and the address actually
    /// bound (useful when `bind_addr`'s port is `0`).
    ///
    /// A second call at an already-bound `(localAddress, port)` reuses that
    /// listener instead of re-binding — two routes with different peer
    /// filters or targets sharing one listening port is the designed case,
    /// per `SPEC_FULL.md` §4.D. A port of `0` ("any free port") always binds
    /// fresh, since there's nothing yet to match against.
    ///
    /// # Errors
    /// Propagates the OS error if bind/register fails.
    pub fn route_server(
        &mut self,
        source_name: impl Into<String>,
        bind_addr: SocketAddr,
        target_name: impl Into<String>,
        target_ref: u64,
    ) -> std::io::Result<(RouteId, SocketAddr)> {
        let source_name = source_name.into();
        let source_ref = self.ids.next();

        let existing = if bind_addr.port() == 0 {
            None
        } else {
            self.listeners
                .iter()
                .find(|(_, l)| l.socket.local_addr().is_ok_and(|a| a == bind_addr))
                .map(|(token, _)| *token)
        };

        let bound_addr = match existing {
            Some(token) => {
                let listener = self.listeners.get_mut(&token).expect("token came from self.listeners");
                listener.add_route(source_name.clone(), source_ref);
                listener.socket.local_addr()?
            }
            None => {
                let (token, listener) = acceptor::bind(&mut self.poller, bind_addr, source_name.clone(), source_ref)?;
                let bound_addr = listener.socket.local_addr()?;
                self.listeners.insert(token, listener);
                bound_addr
            }
        };

        let route = Route {
            source_name,
            source_ref,
            target_name: target_name.into(),
            target_ref,
            address: RouteAddress::from(bind_addr.ip()),
        };
        let id = self.routes.add(route);
        self.counters.route_added();
        Ok((id, bound_addr))
    }

    /// Adds a client-side route: an allow-list entry an outbound
    /// [`connect`](Self::connect) is checked against.
    pub fn route_client(
        &mut self,
        source_name: impl Into<String>,
        source_ref: u64,
        target_name: impl Into<String>,
        target_ref: u64,
        address: RouteAddress,
    ) -> RouteId {
        let route = Route { source_name: source_name.into(), source_ref, target_name: target_name.into(), target_ref, address };
        let id = self.routes.add(route);
        self.counters.route_added();
        id
    }

    /// Removes the first route matching `predicate`. Does not tear down
    /// connections already admitted under it; it only stops matching future
    /// ones.
    ///
    /// # Errors
    /// Returns [`RouteError::NotFound`] if nothing matches.
    pub fn unroute(&mut self, predicate: impl Fn(&Route) -> bool) -> Result<RouteId, RouteError> {
        let id = self.routes.remove(predicate)?;
        self.counters.route_removed();
        Ok(id)
    }

    /// Begins a non-blocking outbound connect. `initiator_throttle` receives
    /// the eventual WINDOW/RESET for the write half once the connect
    /// resolves (or an immediate RESET if it fails).
    ///
    /// # Errors
    /// [`ConnectError`] if the socket can't be created or registered.
    pub fn connect(
        &mut self,
        source_name: &str,
        source_ref: u64,
        addr: SocketAddr,
        initiator_stream_id: u64,
        initiator_throttle: Box<dyn Throttle>,
    ) -> Result<Token, ConnectError> {
        let route = self
            .routes
            .resolve(source_name, source_ref, addr.ip())
            .cloned()
            .ok_or_else(|| ConnectError::Refused(std::io::Error::new(std::io::ErrorKind::NotFound, "no matching client route")))?;
        let (token, socket) = connector::begin_connect(&mut self.poller, addr)?;
        self.pending_connects.insert(token, PendingConnect { socket, route, initiator_stream_id, initiator_throttle });
        Ok(token)
    }

    /// Runs one readiness poll and dispatches every ready event. Blocks for
    /// at most `timeout` (or indefinitely if `None`).
    ///
    /// # Errors
    /// Propagates the OS error from the underlying poll call.
    pub fn poll_once(&mut self, timeout: Option<Duration>) -> std::io::Result<()> {
        let events: Vec<(Token, bool, bool)> = {
            let events = self.poller.poll(timeout)?;
            events.iter().map(|e| (e.token(), e.is_readable(), e.is_writable())).collect()
        };

        for (token, readable, writable) in events {
            if self.listeners.contains_key(&token) {
                if readable {
                    self.service_listener(token);
                }
                continue;
            }
            if self.pending_connects.contains_key(&token) {
                if writable {
                    self.service_pending_connect(token);
                }
                continue;
            }
            if let Some(mut conn) = self.connections.remove(&token) {
                if readable {
                    self.service_read(token, &mut conn);
                }
                if writable {
                    self.service_write(token, &mut conn);
                }
                self.reinsert_or_drop(token, conn);
            }
        }
        Ok(())
    }

    fn service_listener(&mut self, token: Token) {
        let Some(mut listener) = self.listeners.remove(&token) else { return };
        let socket_buf_size = self.config.socket_buf_size;
        let mut accepted = Vec::new();
        acceptor::accept_all(&mut listener, socket_buf_size, |socket, peer_addr| {
            accepted.push((socket, peer_addr));
        });

        for (socket, peer_addr) in accepted {
            self.admit_accepted(&listener, socket, peer_addr);
        }
        self.listeners.insert(token, listener);
    }

    fn admit_accepted(&mut self, listener: &Listener, socket: mio::net::TcpStream, peer_addr: SocketAddr) {
        let Some(route) = listener
            .routes
            .iter()
            .find_map(|(source_name, source_ref)| self.routes.resolve(source_name, *source_ref, peer_addr.ip()))
            .cloned()
        else {
            debug!(?peer_addr, "tcp: no matching server route, rejecting");
            crate::tcp::socket::abortive_close(&socket);
            return;
        };
        let Ok(local_addr) = socket.local_addr() else { return };

        let mut socket = socket;
        let token = self.poller.next_token();
        if self.poller.register(&mut socket, token, Interest::READABLE).is_err() {
            warn!("tcp: couldn't register accepted socket");
            return;
        }

        let (mut read, correlation_id) = factory::server_accept(
            &self.ids,
            &mut self.correlations,
            token,
            &route,
            local_addr,
            peer_addr,
            &mut self.target_factory,
            self.config.read_buffer_capacity,
        );
        let _ = read.handle_window(i64::from(self.config.initial_window));
        let stream_id = read.stream_id();
        self.streams.insert(stream_id, StreamLocation { connection: token, is_read: true });
        self.counters.stream_opened();
        debug!(?peer_addr, stream_id, correlation_id = correlation_id.0, "tcp: accepted connection");

        let conn = Connection { socket, local_addr, peer_addr, read: Some(read), write: None, registered: None };
        self.connections.insert(token, conn);
        self.sync_interest(token);
    }

    fn service_pending_connect(&mut self, token: Token) {
        let Some(mut pending) = self.pending_connects.remove(&token) else { return };
        match connector::connect_result(&pending.socket) {
            Ok(()) => {
                let (Ok(local_addr), Ok(peer_addr)) = (pending.socket.local_addr(), pending.socket.peer_addr()) else {
                    pending.initiator_throttle.reset(pending.initiator_stream_id);
                    return;
                };
                let (mut read, write) = factory::client_connected(
                    &self.ids,
                    &pending.route,
                    local_addr,
                    peer_addr,
                    &mut self.target_factory,
                    self.config.read_buffer_capacity,
                    pending.initiator_stream_id,
                    pending.initiator_throttle,
                    self.config.write_spin_count,
                );
                let _ = read.handle_window(i64::from(self.config.initial_window));
                let read_stream_id = read.stream_id();
                self.streams.insert(read_stream_id, StreamLocation { connection: token, is_read: true });
                self.streams.insert(pending.initiator_stream_id, StreamLocation { connection: token, is_read: false });
                self.counters.stream_opened();
                self.counters.stream_opened();

                let mut socket = pending.socket;
                if self.poller.reregister(&mut socket, token, Interest::READABLE).is_err() {
                    warn!("tcp: couldn't rearm connected socket for reads");
                }
                let conn = Connection { socket, local_addr, peer_addr, read: Some(read), write: Some(write), registered: Some(Interest::READABLE) };
                self.connections.insert(token, conn);
                self.sync_interest(token);
            }
            Err(err) => {
                debug!(?err, "tcp: outbound connect failed");
                pending.initiator_throttle.reset(pending.initiator_stream_id);
            }
        }
    }

    fn service_read(&mut self, _token: Token, conn: &mut Connection) {
        let Some(read) = conn.read.as_mut() else { return };
        let action = read.readable(&mut conn.socket);
        if action == ReadAction::Closed {
            self.streams.remove(&read.stream_id());
            self.counters.stream_closed();
            conn.read = None;
        }
    }

    fn service_write(&mut self, _token: Token, conn: &mut Connection) {
        let Some(write) = conn.write.as_mut() else { return };
        let action = write.writable(&mut conn.socket, &mut self.slots);
        if action == WriteAction::Closed {
            self.streams.remove(&write.stream_id());
            self.counters.stream_closed();
            conn.write = None;
            self.force_close_read(conn);
        }
    }

    /// RESET (or a write failure that triggers an abortive close) on one
    /// half condemns the whole TCP connection; force the sibling half
    /// closed too rather than let it linger believing the socket still
    /// works.
    fn force_close_read(&mut self, conn: &mut Connection) {
        if let Some(read) = conn.read.as_mut() {
            if read.state() != ReadState::Closed {
                read.handle_reset(&mut conn.socket);
                self.streams.remove(&read.stream_id());
                self.counters.stream_closed();
            }
            conn.read = None;
        }
    }

    fn force_close_write(&mut self, conn: &mut Connection) {
        if let Some(write) = conn.write.as_mut() {
            if write.state() != WriteState::Closed {
                self.streams.remove(&write.stream_id());
                self.counters.stream_closed();
            }
            conn.write = None;
        }
    }

    fn reinsert_or_drop(&mut self, token: Token, conn: Connection) {
        if conn.read.is_none() && conn.write.is_none() {
            let mut conn = conn;
            let _ = self.poller.deregister(&mut conn.socket);
            self.correlations.purge_connection(token);
            return;
        }
        self.connections.insert(token, conn);
        self.sync_interest(token);
    }

    fn sync_interest(&mut self, token: Token) {
        let Some(conn) = self.connections.get_mut(&token) else { return };
        let want_read = conn.read.as_ref().is_some_and(|r| r.state() != ReadState::Closed);
        let want_write = conn.write.as_ref().is_some_and(|w| w.has_pending());
        let desired = match (want_read, want_write) {
            (true, true) => Some(Interest::READABLE | Interest::WRITABLE),
            (true, false) => Some(Interest::READABLE),
            (false, true) => Some(Interest::WRITABLE),
            (false, false) => None,
        };
        if desired == conn.registered {
            return;
        }
        match desired {
            Some(interest) => {
                let _ = self.poller.reregister(&mut conn.socket, token, interest);
            }
            None => {
                let _ = self.poller.deregister(&mut conn.socket);
            }
        }
        conn.registered = desired;
    }

    /// Claims the stashed [`crate::tcp::correlation::Correlation`] for a
    /// reply BEGIN and builds the write half it completes. `reply_throttle`
    /// is reset if the correlation can't be claimed — the reply stream the
    /// caller is replying on needs a RESET even though no `WriteStream`
    /// exists yet to carry it.
    ///
    /// # Errors
    /// [`FrameError::UnknownCorrelation`] if nothing (or nothing still
    /// unclaimed) is pending under `correlation_id`.
    pub fn handle_reply_begin(
        &mut self,
        correlation_id: u64,
        stream_id: u64,
        mut reply_throttle: Box<dyn Throttle>,
    ) -> Result<(), FrameError> {
        let (token, write) = match factory::server_connected(
            &mut self.correlations,
            CorrelationId(correlation_id),
            stream_id,
            self.config.write_spin_count,
        ) {
            Ok(pair) => pair,
            Err(()) => {
                reply_throttle.reset(stream_id);
                return Err(FrameError::UnknownCorrelation(correlation_id));
            }
        };

        let Some(mut conn) = self.connections.remove(&token) else {
            reply_throttle.reset(stream_id);
            return Err(FrameError::UnknownCorrelation(correlation_id));
        };
        conn.write = Some(write);
        self.streams.insert(stream_id, StreamLocation { connection: token, is_read: false });
        self.counters.stream_opened();
        self.reinsert_or_drop(token, conn);
        Ok(())
    }

    /// WINDOW frame from downstream, granting read credit on `stream_id`.
    ///
    /// # Errors
    /// [`FrameError::NegativeWindow`] for negative credit.
    pub fn handle_window(&mut self, stream_id: u64, credit: i64) -> Result<(), FrameError> {
        let Some(loc) = self.streams.get(&stream_id).copied() else { return Ok(()) };
        if !loc.is_read {
            warn!(stream_id, "tcp: WINDOW addressed to a write-side stream, ignoring");
            return Ok(());
        }
        let Some(mut conn) = self.connections.remove(&loc.connection) else { return Ok(()) };
        let result = match conn.read.as_mut() {
            Some(read) => read.handle_window(credit),
            None => Ok(ReadAction::Continue),
        };
        // A zero-to-positive window transition needs an immediate drain
        // attempt rather than waiting for the next readiness edge: any bytes
        // the peer already sent while the window was closed are sitting in
        // the kernel buffer, and a new edge only fires on a new arrival.
        if matches!(result, Ok(ReadAction::Continue)) {
            if let Some(read) = conn.read.as_mut() {
                let action = read.readable(&mut conn.socket);
                if action == ReadAction::Closed {
                    self.streams.remove(&stream_id);
                    self.counters.stream_closed();
                    conn.read = None;
                }
            }
        }
        self.reinsert_or_drop(loc.connection, conn);
        result.map(|_| ())
    }

    /// RESET frame from downstream, addressed to either stream half. Tears
    /// down both halves: the two directions share one socket, so a RESET on
    /// either condemns the whole connection.
    pub fn handle_reset(&mut self, stream_id: u64) {
        let Some(loc) = self.streams.remove(&stream_id) else { return };
        let Some(mut conn) = self.connections.remove(&loc.connection) else { return };
        if loc.is_read {
            if let Some(read) = conn.read.as_mut() {
                read.handle_reset(&mut conn.socket);
            }
            conn.read = None;
            self.counters.stream_closed();
            self.force_close_write(&mut conn);
        } else {
            if let Some(write) = conn.write.as_mut() {
                let action = write.handle_reset(&mut conn.socket, &mut self.slots);
                if action == WriteAction::Closed {
                    conn.write = None;
                    self.counters.stream_closed();
                }
            }
            self.force_close_read(&mut conn);
        }
        self.reinsert_or_drop(loc.connection, conn);
    }

    /// DATA frame from downstream, addressed to a write-side stream.
    ///
    /// # Errors
    /// [`FrameError::PayloadTooLarge`] if `payload` exceeds the frame
    /// surface's 16-bit length prefix. [`FrameError::DataAfterEnd`] if END
    /// was already handled for this stream.
    pub fn handle_data(&mut self, stream_id: u64, payload: &[u8]) -> Result<(), FrameError> {
        if payload.len() > crate::tcp::frame::MAX_DATA_LEN {
            return Err(FrameError::PayloadTooLarge(payload.len(), crate::tcp::frame::MAX_DATA_LEN));
        }
        let Some(loc) = self.streams.get(&stream_id).copied() else { return Ok(()) };
        if loc.is_read {
            warn!(stream_id, "tcp: DATA addressed to a read-side stream, ignoring");
            return Ok(());
        }
        let Some(mut conn) = self.connections.remove(&loc.connection) else { return Ok(()) };
        let result = if let Some(write) = conn.write.as_mut() {
            write.handle_data(&mut conn.socket, &mut self.slots, payload)
        } else {
            self.reinsert_or_drop(loc.connection, conn);
            return Ok(());
        };
        if matches!(result, Ok(WriteAction::Closed)) {
            conn.write = None;
            self.streams.remove(&stream_id);
            self.counters.stream_closed();
            // handle_data only closes via a write failure (socket error or
            // slot exhaustion), which already abortively closed the socket;
            // the read half can't recover from that either.
            self.force_close_read(&mut conn);
        }
        self.reinsert_or_drop(loc.connection, conn);
        result.map(|_| ())
    }

    /// END frame from downstream, addressed to a write-side stream.
    pub fn handle_end(&mut self, stream_id: u64) {
        let Some(loc) = self.streams.get(&stream_id).copied() else { return };
        if loc.is_read {
            return;
        }
        let Some(mut conn) = self.connections.remove(&loc.connection) else { return };
        if let Some(write) = conn.write.as_mut() {
            let action = write.handle_end(&mut conn.socket);
            if action == WriteAction::Closed {
                conn.write = None;
                self.streams.remove(&stream_id);
                self.counters.stream_closed();
            }
        }
        self.reinsert_or_drop(loc.connection, conn);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tcp::target::RecordingTargetFactory;

    #[test]
    fn oversized_data_payload_is_rejected_before_any_lookup() {
        let mut reactor = Reactor::new(NukleusConfig::default(), RecordingTargetFactory::default()).expect("reactor");
        let oversized = vec![0u8; crate::tcp::frame::MAX_DATA_LEN + 1];
        let result = reactor.handle_data(1, &oversized);
        assert!(matches!(result, Err(FrameError::PayloadTooLarge(_, _))));
    }

    #[test]
    fn route_server_reuses_a_listener_already_bound_to_the_same_address() {
        use std::net::{IpAddr, Ipv4Addr};

        let mut reactor = Reactor::new(NukleusConfig::default(), RecordingTargetFactory::default()).expect("reactor");
        let any_port = SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 0);
        let (_first, bound) = reactor.route_server("tcp", any_port, "app-a", 1).expect("first route binds");
        assert_eq!(reactor.listeners.len(), 1);

        let (_second, bound_again) = reactor.route_server("tcp", bound, "app-b", 2).expect("second route reuses listener");
        assert_eq!(bound_again, bound);
        assert_eq!(reactor.listeners.len(), 1, "second call must not bind a new listener on the same address");
        assert_eq!(reactor.listeners.values().next().expect("one listener").routes.len(), 2);
    }

    #[test]
    fn reply_begin_on_unknown_correlation_resets_the_reply_throttle() {
        let mut reactor = Reactor::new(NukleusConfig::default(), RecordingTargetFactory::default()).expect("reactor");
        let (_target, throttle, sink) = crate::tcp::target::shared_recording_sink();

        let result = reactor.handle_reply_begin(42, 99, throttle);
        assert!(matches!(result, Err(FrameError::UnknownCorrelation(42))));
        assert!(sink.borrow().frames.iter().any(|f| matches!(f, crate::tcp::frame::Frame::Reset)));
    }
}
