use std::io;
use std::net::SocketAddr;

use mio::Token;
use mio::net::TcpListener;
use tracing::warn;

use crate::tcp::poller::Poller;
use crate::tcp::socket::set_socket_buf_size;

/// A bound listening socket and the route-table identities accepted
/// connections on it are checked against. Several `routeServer` calls can
/// legitimately share one bind address — different peer-address filters or
/// targets on the same port — so a listener holds every `(source_name,
/// source_ref)` pair routed onto it, not just one.
pub(crate) struct Listener {
    pub(crate) socket: TcpListener,
    pub(crate) routes: Vec<(String, u64)>,
}

impl Listener {
    pub(crate) fn add_route(&mut self, source_name: String, source_ref: u64) {
        self.routes.push((source_name, source_ref));
    }
}

/// Binds and registers a new listening socket for OP_READ (readable means
/// "has a pending connection to accept").
pub(crate) fn bind(
    poller: &mut Poller,
    addr: SocketAddr,
    source_name: String,
    source_ref: u64,
) -> io::Result<(Token, Listener)> {
    let mut socket = TcpListener::bind(addr)
        .inspect_err(|err| warn!(?addr, ?err, "tcp: couldn't bind listener"))?;
    let token = poller.next_token();
    poller
        .register(&mut socket, token, mio::Interest::READABLE)
        .inspect_err(|err| warn!(?addr, ?err, "tcp: couldn't register listener"))?;
    Ok((token, Listener { socket, routes: vec![(source_name, source_ref)] }))
}

/// Accepts every pending connection on `listener`, applying `socket_buf_size`
/// if configured, calling `on_accept` for each one.
pub(crate) fn accept_all(
    listener: &mut Listener,
    socket_buf_size: Option<usize>,
    mut on_accept: impl FnMut(mio::net::TcpStream, SocketAddr),
) {
    loop {
        match listener.socket.accept() {
            Ok((stream, peer_addr)) => {
                if let Some(size) = socket_buf_size {
                    set_socket_buf_size(&stream, size);
                }
                on_accept(stream, peer_addr);
            }
            Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => break,
            Err(err) => {
                warn!(?err, "tcp: accept failed");
                break;
            }
        }
    }
}
