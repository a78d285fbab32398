mod acceptor;
mod address;
mod config;
mod connector;
mod correlation;
mod counters;
mod error;
mod factory;
mod frame;
mod ids;
mod poller;
mod reactor;
mod read_stream;
mod route;
mod slot;
mod socket;
mod target;
mod write_stream;

pub use address::RouteAddress;
pub use config::NukleusConfig;
pub use correlation::Correlation;
pub use counters::Counters;
pub use error::{ConnectError, FrameError, RouteError};
pub use frame::{BeginInfo, Frame, MAX_DATA_LEN};
pub use ids::CorrelationId;
pub use read_stream::{ReadAction, ReadState, ReadStream};
pub use reactor::Reactor;
pub use route::{Route, RouteId, RouteTable};
pub use target::{RecordingSink, RecordingTargetFactory, Target, TargetFactory, Throttle, shared_recording_sink};
pub use write_stream::{WriteAction, WriteState, WriteStream};
