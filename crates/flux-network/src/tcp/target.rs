use std::cell::RefCell;
use std::net::SocketAddr;
use std::rc::Rc;

use crate::tcp::route::Route;

/// The forward-direction contract toward the downstream frame fabric.
///
/// A `ReadStream` calls these as it drains socket bytes. The shared-memory
/// ring buffer a production host wires this onto is out of scope here; this
/// trait is the seam a concrete implementation plugs into. Not `Send`: a
/// reactor and everything it owns lives on one pinned thread (see
/// `SPEC_FULL.md` §5), so trait objects here are free to use `Rc`/`RefCell`
/// rather than atomics.
pub trait Target {
    fn begin(
        &mut self,
        stream_id: u64,
        reference_id: u64,
        correlation_id: u64,
        local_addr: SocketAddr,
        remote_addr: SocketAddr,
    );
    fn data(&mut self, stream_id: u64, payload: &[u8]);
    fn end(&mut self, stream_id: u64);
    fn abort(&mut self, stream_id: u64);
}

/// The reverse-direction contract a `WriteStream` uses to push flow-control
/// credit and resets back toward whoever is feeding it DATA.
pub trait Throttle {
    fn window(&mut self, stream_id: u64, credit: i64);
    fn reset(&mut self, stream_id: u64);
}

/// Produces the `Target`/`Throttle` pair for a newly admitted connection.
///
/// This is the seam a production host implements to wire connections onto
/// the real shared-memory frame fabric; tests and examples use
/// [`RecordingSink`] via [`shared_recording_sink`] instead.
pub trait TargetFactory {
    fn create(&mut self, route: &Route) -> (Box<dyn Target>, Box<dyn Throttle>);
}

/// An in-memory `Target`/`Throttle` double that records every frame it was
/// asked to emit, for use in tests and examples in place of the real fabric.
#[derive(Default)]
pub struct RecordingSink {
    pub frames: Vec<crate::tcp::frame::Frame>,
}

impl Target for RecordingSink {
    fn begin(
        &mut self,
        stream_id: u64,
        reference_id: u64,
        correlation_id: u64,
        local_addr: SocketAddr,
        remote_addr: SocketAddr,
    ) {
        self.frames.push(crate::tcp::frame::Frame::Begin(crate::tcp::frame::BeginInfo {
            stream_id,
            reference_id,
            correlation_id,
            local_addr,
            remote_addr,
        }));
    }

    fn data(&mut self, _stream_id: u64, payload: &[u8]) {
        self.frames.push(crate::tcp::frame::Frame::Data(payload.to_vec()));
    }

    fn end(&mut self, _stream_id: u64) {
        self.frames.push(crate::tcp::frame::Frame::End);
    }

    fn abort(&mut self, _stream_id: u64) {
        self.frames.push(crate::tcp::frame::Frame::Abort);
    }
}

impl Throttle for RecordingSink {
    fn window(&mut self, _stream_id: u64, credit: i64) {
        self.frames.push(crate::tcp::frame::Frame::Window(credit));
    }

    fn reset(&mut self, _stream_id: u64) {
        self.frames.push(crate::tcp::frame::Frame::Reset);
    }
}

struct TargetView(Rc<RefCell<RecordingSink>>);
struct ThrottleView(Rc<RefCell<RecordingSink>>);

impl Target for TargetView {
    fn begin(
        &mut self,
        stream_id: u64,
        reference_id: u64,
        correlation_id: u64,
        local_addr: SocketAddr,
        remote_addr: SocketAddr,
    ) {
        self.0.borrow_mut().begin(stream_id, reference_id, correlation_id, local_addr, remote_addr);
    }

    fn data(&mut self, stream_id: u64, payload: &[u8]) {
        self.0.borrow_mut().data(stream_id, payload);
    }

    fn end(&mut self, stream_id: u64) {
        self.0.borrow_mut().end(stream_id);
    }

    fn abort(&mut self, stream_id: u64) {
        self.0.borrow_mut().abort(stream_id);
    }
}

impl Throttle for ThrottleView {
    fn window(&mut self, stream_id: u64, credit: i64) {
        self.0.borrow_mut().window(stream_id, credit);
    }

    fn reset(&mut self, stream_id: u64) {
        self.0.borrow_mut().reset(stream_id);
    }
}

/// Builds one shared [`RecordingSink`] and hands back its `Target` and
/// `Throttle` views, along with a handle to inspect recorded frames.
#[must_use]
pub fn shared_recording_sink() -> (Box<dyn Target>, Box<dyn Throttle>, Rc<RefCell<RecordingSink>>) {
    let shared = Rc::new(RefCell::new(RecordingSink::default()));
    (Box::new(TargetView(shared.clone())), Box::new(ThrottleView(shared.clone())), shared)
}

/// A [`TargetFactory`] that hands every connection its own [`RecordingSink`],
/// for tests that only need to observe per-connection frame traffic.
#[derive(Default)]
pub struct RecordingTargetFactory {
    pub sinks: Vec<Rc<RefCell<RecordingSink>>>,
}

impl TargetFactory for RecordingTargetFactory {
    fn create(&mut self, _route: &Route) -> (Box<dyn Target>, Box<dyn Throttle>) {
        let (target, throttle, sink) = shared_recording_sink();
        self.sinks.push(sink);
        (target, throttle)
    }
}
