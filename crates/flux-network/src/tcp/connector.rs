use std::net::SocketAddr;

use mio::{Interest, Token};
use tracing::warn;

use crate::tcp::error::ConnectError;
use crate::tcp::poller::Poller;

/// Initiates a single non-blocking outbound connect and registers it for
/// OP_WRITABLE (writable is how mio signals connect-completion).
///
/// There is no retry here: a failed connect is reported once, per the
/// adapter's explicit no-reconnect contract. Contrast with this crate's
/// listener-side connection manager, which does retry outbound links — that
/// behaviour is deliberately not reused for this path.
pub(crate) fn begin_connect(
    poller: &mut Poller,
    addr: SocketAddr,
) -> Result<(Token, mio::net::TcpStream), ConnectError> {
    let mut socket = mio::net::TcpStream::connect(addr)
        .inspect_err(|err| warn!(?addr, ?err, "tcp: connect failed"))
        .map_err(ConnectError::Socket)?;
    let token = poller.next_token();
    poller
        .register(&mut socket, token, Interest::WRITABLE)
        .inspect_err(|err| warn!(?addr, ?err, "tcp: couldn't register connecting socket"))
        .map_err(ConnectError::Register)?;
    Ok((token, socket))
}

/// Call once OP_WRITABLE fires for a connecting socket to find out whether
/// the connect actually succeeded.
pub(crate) fn connect_result(socket: &mio::net::TcpStream) -> Result<(), ConnectError> {
    match socket.take_error() {
        Ok(None) => Ok(()),
        Ok(Some(err)) | Err(err) => Err(ConnectError::Refused(err)),
    }
}
