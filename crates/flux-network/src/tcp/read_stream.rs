use std::io::{self, Read};

use flux_utils::safe_assert;
use tracing::debug;

use crate::tcp::error::FrameError;
use crate::tcp::target::Target;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadState {
    Open,
    HalfClosedOut,
    Closed,
}

/// What the reactor should do with read interest after a call into a
/// [`ReadStream`] returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadAction {
    /// Keep polling for readability.
    Continue,
    /// Window hit zero; disable read interest until credit arrives.
    DisableRead,
    /// The stream is finished (END emitted or RESET received); the reactor
    /// should tear down the connection's read half.
    Closed,
}

/// Read-side per-connection state machine.
///
/// Drains socket bytes into DATA frames under a credit window. See
/// `SPEC_FULL.md` §4.G for the full contract this mirrors.
pub struct ReadStream {
    stream_id: u64,
    state: ReadState,
    window: u32,
    read_buf: Vec<u8>,
    target: Box<dyn Target>,
}

impl ReadStream {
    #[must_use]
    pub fn new(stream_id: u64, read_buffer_capacity: usize, target: Box<dyn Target>) -> Self {
        Self {
            stream_id,
            state: ReadState::Open,
            window: 0,
            read_buf: vec![0; read_buffer_capacity],
            target,
        }
    }

    #[must_use]
    pub fn stream_id(&self) -> u64 {
        self.stream_id
    }

    #[must_use]
    pub fn state(&self) -> ReadState {
        self.state
    }

    #[must_use]
    pub fn window(&self) -> u32 {
        self.window
    }

    /// Drains as many bytes as the socket and current window allow, emitting
    /// one DATA frame per successful `read()`.
    pub fn readable(&mut self, socket: &mut mio::net::TcpStream) -> ReadAction {
        if self.state != ReadState::Open {
            return ReadAction::Closed;
        }

        loop {
            if self.window == 0 {
                return ReadAction::DisableRead;
            }

            let cap = (self.window as usize).min(self.read_buf.len());
            match socket.read(&mut self.read_buf[..cap]) {
                Ok(0) => return self.end_of_stream(),
                Ok(n) => {
                    safe_assert!(n as u32 <= self.window, "read more than the granted window");
                    self.target.data(self.stream_id, &self.read_buf[..n]);
                    self.window -= n as u32;
                }
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => return ReadAction::Continue,
                // Treated identically to EOF: a peer abort surfaces here as a
                // platform error, not as a clean zero-byte read, but from the
                // downstream consumer's perspective it is still an end of
                // input, not an abort.
                Err(err) => {
                    debug!(?err, "tcp read error, emitting END");
                    return self.end_of_stream();
                }
            }
        }
    }

    fn end_of_stream(&mut self) -> ReadAction {
        self.target.end(self.stream_id);
        self.state = ReadState::Closed;
        ReadAction::Closed
    }

    /// WINDOW frame arriving from downstream: grants additional read credit.
    pub fn handle_window(&mut self, credit: i64) -> Result<ReadAction, FrameError> {
        if credit < 0 {
            return Err(FrameError::NegativeWindow(credit));
        }
        let was_zero = self.window == 0;
        self.window = self.window.saturating_add(credit as u32);
        if was_zero && self.window > 0 {
            Ok(ReadAction::Continue)
        } else {
            Ok(ReadAction::DisableRead)
        }
    }

    /// RESET frame arriving from downstream: the read half is torn down
    /// without emitting anything further (the sender already knows), and the
    /// socket is abortively closed since a RESET on one half condemns the
    /// whole connection.
    pub fn handle_reset(&mut self, socket: &mut mio::net::TcpStream) {
        crate::tcp::socket::abortive_close(socket);
        self.state = ReadState::Closed;
    }
}

#[cfg(test)]
mod tests {
    use std::net::{IpAddr, Ipv4Addr, SocketAddr};

    use super::*;
    use crate::tcp::target::RecordingSink;

    fn addr() -> SocketAddr {
        SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 0)
    }

    #[test]
    fn window_credit_enables_read_from_zero() {
        let sink = Box::new(RecordingSink::default());
        let mut rs = ReadStream::new(1, 4096, sink);
        assert_eq!(rs.window(), 0);
        let action = rs.handle_window(128).expect("non-negative credit");
        assert_eq!(action, ReadAction::Continue);
        assert_eq!(rs.window(), 128);
    }

    #[test]
    fn negative_window_is_a_protocol_error() {
        let sink = Box::new(RecordingSink::default());
        let mut rs = ReadStream::new(1, 4096, sink);
        assert!(matches!(rs.handle_window(-1), Err(FrameError::NegativeWindow(-1))));
    }

    #[test]
    fn reset_closes_without_emitting_anything() {
        let listener = std::net::TcpListener::bind(addr()).expect("bind loopback listener");
        let local = listener.local_addr().expect("local addr");
        let mut client = mio::net::TcpStream::connect(local).expect("connect");
        let _server = listener.accept().expect("accept");

        let sink = Box::new(RecordingSink::default());
        let mut rs = ReadStream::new(1, 4096, sink);
        rs.handle_reset(&mut client);
        assert_eq!(rs.state(), ReadState::Closed);
    }

    #[test]
    fn begin_info_can_be_emitted_before_streaming() {
        // Exercises the Target::begin path independent of socket I/O, which
        // the factory invokes before a ReadStream is wired up.
        let mut sink = RecordingSink::default();
        sink.begin(1, 0, 9, addr(), addr());
        assert_eq!(sink.frames.len(), 1);
    }
}
