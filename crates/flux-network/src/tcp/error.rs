use std::io;

use thiserror::Error;

/// Failure modes for route table mutation and resolution.
#[derive(Error, Debug)]
pub enum RouteError {
    #[error("route already exists")]
    AlreadyExists,
    #[error("no matching route")]
    NotFound,
}

/// Failure modes surfaced while establishing an outbound connection.
#[derive(Error, Debug)]
pub enum ConnectError {
    #[error("failed to create socket")]
    Socket(#[source] io::Error),
    #[error("failed to register socket with poller")]
    Register(#[source] io::Error),
    #[error("connect completed with error: {0}")]
    Refused(io::Error),
}

/// Failure modes for an individual frame, surfaced to the caller so it can
/// decide whether to RESET the stream or just log and continue.
#[derive(Error, Debug)]
pub enum FrameError {
    #[error("DATA payload of {0} bytes exceeds the {1}-byte frame limit")]
    PayloadTooLarge(usize, usize),
    #[error("WINDOW credit {0} would drive the stream window negative")]
    NegativeWindow(i64),
    #[error("reply BEGIN referenced unknown correlation {0}")]
    UnknownCorrelation(u64),
    #[error("DATA received after END on stream {0}")]
    DataAfterEnd(u64),
}
