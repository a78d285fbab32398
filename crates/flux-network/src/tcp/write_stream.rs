use std::io::{self, Write};
use std::net::Shutdown;

use tracing::debug;

use crate::tcp::error::FrameError;
use crate::tcp::slot::{SlotId, SlotPool};
use crate::tcp::socket::abortive_close;
use crate::tcp::target::Throttle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteState {
    Connected,
    HalfClosedIn,
    Closed,
}

/// Action the reactor should take after a `WriteStream` call returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteAction {
    /// No interest change needed.
    Continue,
    /// A partial write is now buffered; register OP_WRITE.
    EnableWrite,
    /// The buffered partial write fully drained; OP_WRITE can be dropped.
    DisableWrite,
    /// The write half is finished (END flushed or RESET handled); the
    /// reactor should tear down the connection's write half.
    Closed,
}

#[derive(Debug, Clone, Copy)]
struct Pending {
    slot: SlotId,
    write_offset: usize,
    stored_len: usize,
}

impl Pending {
    /// Compacts the unwritten tail to the front of the slot and appends
    /// `payload`, if it fits. Returns `false` (leaving the slot untouched)
    /// when there isn't room.
    fn append(&mut self, pool: &mut SlotPool, payload: &[u8]) -> bool {
        let remaining = self.stored_len - self.write_offset;
        if remaining + payload.len() > pool.slot_size() {
            return false;
        }
        if self.write_offset > 0 {
            pool.slice_mut(self.slot).copy_within(self.write_offset..self.stored_len, 0);
        }
        pool.slice_mut(self.slot)[remaining..remaining + payload.len()].copy_from_slice(payload);
        self.write_offset = 0;
        self.stored_len = remaining + payload.len();
        true
    }
}

/// Write-side per-connection state machine.
///
/// Consumes DATA frames from downstream, writes them to the socket with
/// spin-then-buffer partial-write handling, and reports flow-control credit
/// back via [`Throttle`]. See `SPEC_FULL.md` §4.H for the full contract.
pub struct WriteStream {
    stream_id: u64,
    state: WriteState,
    pending: Option<Pending>,
    end_seen: bool,
    end_deferred: bool,
    reset_deferred: bool,
    write_spin_count: u8,
    throttle: Box<dyn Throttle>,
}

impl WriteStream {
    #[must_use]
    pub fn new(stream_id: u64, write_spin_count: u8, throttle: Box<dyn Throttle>) -> Self {
        debug_assert!(write_spin_count >= 2, "WRITE_SPIN_COUNT must be >= 2");
        Self {
            stream_id,
            state: WriteState::Connected,
            pending: None,
            end_seen: false,
            end_deferred: false,
            reset_deferred: false,
            write_spin_count,
            throttle,
        }
    }

    #[must_use]
    pub fn stream_id(&self) -> u64 {
        self.stream_id
    }

    #[must_use]
    pub fn state(&self) -> WriteState {
        self.state
    }

    #[must_use]
    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// DATA frame arriving from downstream.
    ///
    /// # Errors
    /// Returns [`FrameError::DataAfterEnd`] if END was already handled for
    /// this stream — DATA past END is a protocol violation, not silently
    /// dropped, and resets the throttle the same as any other double
    /// delivery.
    pub fn handle_data(
        &mut self,
        socket: &mut mio::net::TcpStream,
        pool: &mut SlotPool,
        payload: &[u8],
    ) -> Result<WriteAction, FrameError> {
        if self.end_seen || self.state != WriteState::Connected {
            self.throttle.reset(self.stream_id);
            return Err(FrameError::DataAfterEnd(self.stream_id));
        }

        if let Some(mut pending) = self.pending.take() {
            if pending.append(pool, payload) {
                self.pending = Some(pending);
                Ok(WriteAction::Continue)
            } else {
                self.pending = Some(pending);
                pool.record_overflow();
                Ok(self.fail(socket, pool, true))
            }
        } else {
            Ok(self.write_direct(socket, pool, payload))
        }
    }

    fn write_direct(
        &mut self,
        socket: &mut mio::net::TcpStream,
        pool: &mut SlotPool,
        payload: &[u8],
    ) -> WriteAction {
        let mut offset = 0usize;
        let mut spins = 0u8;

        loop {
            match socket.write(&payload[offset..]) {
                Ok(n) => {
                    offset += n;
                    if offset == payload.len() {
                        self.throttle.window(self.stream_id, payload.len() as i64);
                        return WriteAction::Continue;
                    }
                    spins += 1;
                    if spins >= self.write_spin_count {
                        break;
                    }
                }
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(err) => {
                    debug!(?err, "tcp write error");
                    return self.fail(socket, pool, false);
                }
            }
        }

        match pool.acquire(&payload[offset..]) {
            Some(slot) => {
                self.pending =
                    Some(Pending { slot, write_offset: 0, stored_len: payload.len() - offset });
                WriteAction::EnableWrite
            }
            None => self.fail(socket, pool, true),
        }
    }

    /// OP_WRITE readiness: drains the buffered partial write.
    pub fn writable(&mut self, socket: &mut mio::net::TcpStream, pool: &mut SlotPool) -> WriteAction {
        let Some(mut pending) = self.pending.take() else {
            return WriteAction::Continue;
        };

        loop {
            let remaining = pending.stored_len - pending.write_offset;
            if remaining == 0 {
                break;
            }
            let slice = pool.slice(pending.slot);
            match socket.write(&slice[pending.write_offset..pending.stored_len]) {
                Ok(0) => {
                    self.pending = Some(pending);
                    return WriteAction::Continue;
                }
                Ok(n) => pending.write_offset += n,
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => {
                    self.pending = Some(pending);
                    return WriteAction::Continue;
                }
                Err(err) => {
                    debug!(?err, "tcp write error draining pending slot");
                    pool.release(pending.slot);
                    return self.fail(socket, pool, false);
                }
            }
        }

        pool.release(pending.slot);
        self.throttle.window(self.stream_id, pending.stored_len as i64);
        self.finish_drain(socket)
    }

    fn finish_drain(&mut self, socket: &mut mio::net::TcpStream) -> WriteAction {
        if self.reset_deferred {
            abortive_close(socket);
            self.state = WriteState::Closed;
            return WriteAction::Closed;
        }
        if self.end_deferred {
            let _ = socket.shutdown(Shutdown::Write);
            self.state = WriteState::Closed;
            return WriteAction::Closed;
        }
        WriteAction::DisableWrite
    }

    /// END frame arriving from downstream. Deferred until any pending
    /// partial write fully drains.
    pub fn handle_end(&mut self, socket: &mut mio::net::TcpStream) -> WriteAction {
        self.end_seen = true;
        if self.pending.is_some() {
            self.end_deferred = true;
            return WriteAction::Continue;
        }
        let _ = socket.shutdown(Shutdown::Write);
        self.state = WriteState::Closed;
        WriteAction::Closed
    }

    /// RESET frame arriving from downstream. Deferred until any pending
    /// partial write fully drains, same as END.
    pub fn handle_reset(&mut self, socket: &mut mio::net::TcpStream, pool: &mut SlotPool) -> WriteAction {
        if self.pending.is_some() {
            self.reset_deferred = true;
            return WriteAction::Continue;
        }
        if let Some(pending) = self.pending.take() {
            pool.release(pending.slot);
        }
        abortive_close(socket);
        self.state = WriteState::Closed;
        WriteAction::Closed
    }

    fn fail(&mut self, socket: &mut mio::net::TcpStream, pool: &mut SlotPool, overflow: bool) -> WriteAction {
        if let Some(pending) = self.pending.take() {
            pool.release(pending.slot);
        }
        if overflow {
            debug!(stream_id = self.stream_id, "write slot pool exhausted, resetting stream");
        }
        self.throttle.reset(self.stream_id);
        abortive_close(socket);
        self.state = WriteState::Closed;
        WriteAction::Closed
    }
}

#[cfg(test)]
mod tests {
    use std::net::{IpAddr, Ipv4Addr, SocketAddr, TcpListener};

    use super::*;
    use crate::tcp::counters::Counters;
    use crate::tcp::target::RecordingSink;

    fn loopback_pair() -> (mio::net::TcpStream, std::net::TcpStream) {
        let listener = TcpListener::bind(SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 0))
            .expect("bind loopback listener");
        let addr = listener.local_addr().expect("local addr");
        let client = mio::net::TcpStream::connect(addr).expect("connect");
        let (server, _) = listener.accept().expect("accept");
        server.set_nonblocking(true).expect("nonblocking");
        (client, server)
    }

    #[test]
    fn direct_write_grants_full_window_immediately() {
        let (mut client, _server) = loopback_pair();
        let mut pool = SlotPool::new(4096, 2, Counters::new());
        let mut sink = WriteStream::new(1, 4, Box::new(RecordingSink::default()));

        let action = sink.handle_data(&mut client, &mut pool, b"hello").expect("accepted");
        assert_eq!(action, WriteAction::Continue);
        assert!(!sink.has_pending());
    }

    #[test]
    fn data_after_end_is_a_protocol_violation() {
        let (mut client, _server) = loopback_pair();
        let mut pool = SlotPool::new(4096, 2, Counters::new());
        let (_target, throttle, sink) = crate::tcp::target::shared_recording_sink();
        let mut ws = WriteStream::new(1, 4, throttle);

        ws.handle_end(&mut client);
        let result = ws.handle_data(&mut client, &mut pool, b"late");
        assert!(matches!(result, Err(FrameError::DataAfterEnd(1))));
        assert!(sink.borrow().frames.iter().any(|f| matches!(f, crate::tcp::frame::Frame::Reset)));
    }

    #[test]
    fn end_with_no_pending_write_closes_immediately() {
        let (mut client, _server) = loopback_pair();
        let action = WriteStream::new(1, 4, Box::new(RecordingSink::default())).handle_end(&mut client);
        assert_eq!(action, WriteAction::Closed);
    }

    #[test]
    fn end_while_pending_is_deferred_until_drain() {
        use std::io::Read;

        let (mut client, mut server) = loopback_pair();
        let mut pool = SlotPool::new(128 * 1024, 2, Counters::new());
        let mut ws = WriteStream::new(1, 2, Box::new(RecordingSink::default()));

        // Shrink the kernel send buffer so a 64KB write can't complete in
        // one (or a few spun) syscalls, forcing the pending-slot path.
        crate::tcp::socket::set_socket_buf_size(&client, 4096);
        let big = vec![7u8; 64 * 1024];
        ws.handle_data(&mut client, &mut pool, &big).expect("accepted");
        assert!(ws.has_pending(), "payload should have overrun the shrunk send buffer");

        let end_action = ws.handle_end(&mut client);
        assert_eq!(end_action, WriteAction::Continue, "END must defer while a write is pending");

        let drainer = std::thread::spawn(move || {
            let mut buf = [0u8; 4096];
            let mut total = 0usize;
            while total < 64 * 1024 {
                match server.read(&mut buf) {
                    Ok(0) => break,
                    Ok(n) => total += n,
                    Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => continue,
                    Err(_) => break,
                }
            }
            total
        });

        let deadline = std::time::Instant::now() + std::time::Duration::from_secs(5);
        loop {
            let action = ws.writable(&mut client, &mut pool);
            if action == WriteAction::Closed {
                break;
            }
            assert!(std::time::Instant::now() < deadline, "pending write never drained");
            std::thread::sleep(std::time::Duration::from_millis(5));
        }

        assert_eq!(ws.state(), WriteState::Closed);
        let received = drainer.join().expect("drainer thread panicked");
        assert_eq!(received, 64 * 1024);
    }
}
