use std::net::SocketAddr;

use mio::Token;

use crate::tcp::correlation::{Correlation, CorrelationRegistry};
use crate::tcp::ids::{CorrelationId, IdGenerator};
use crate::tcp::read_stream::ReadStream;
use crate::tcp::route::Route;
use crate::tcp::target::{TargetFactory, Throttle};
use crate::tcp::write_stream::WriteStream;

/// Wires a freshly accepted connection to a new `ReadStream`, emits its
/// BEGIN, and stashes the paired `Throttle` in the correlation registry
/// until the reply BEGIN arrives to claim it.
pub(crate) fn server_accept(
    ids: &IdGenerator,
    correlations: &mut CorrelationRegistry,
    connection: Token,
    route: &Route,
    local_addr: SocketAddr,
    remote_addr: SocketAddr,
    target_factory: &mut dyn TargetFactory,
    read_buffer_capacity: usize,
) -> (ReadStream, CorrelationId) {
    let (mut target, throttle) = target_factory.create(route);
    let stream_id = ids.next();
    let correlation_id = CorrelationId(ids.next());

    target.begin(stream_id, route.target_ref, correlation_id.0, local_addr, remote_addr);
    correlations.put(
        correlation_id,
        Correlation { connection, source_name: route.source_name.clone(), throttle },
    );

    (ReadStream::new(stream_id, read_buffer_capacity, target), correlation_id)
}

/// Claims the `Throttle` stashed for `correlation_id` and builds the
/// `WriteStream` that completes a connection's pairing.
///
/// # Errors
/// Returns `Err(())` if no correlation is pending under that id (unknown or
/// already claimed) — the caller resets the replying stream in that case.
pub(crate) fn server_connected(
    correlations: &mut CorrelationRegistry,
    correlation_id: CorrelationId,
    stream_id: u64,
    write_spin_count: u8,
) -> Result<(Token, WriteStream), ()> {
    let correlation = correlations.remove(correlation_id).ok_or(())?;
    Ok((correlation.connection, WriteStream::new(stream_id, write_spin_count, correlation.throttle)))
}

/// Client-initiated counterpart of [`server_accept`]: wires an outbound
/// connection's read half once its connect completes.
pub(crate) fn client_connected(
    ids: &IdGenerator,
    route: &Route,
    local_addr: SocketAddr,
    remote_addr: SocketAddr,
    target_factory: &mut dyn TargetFactory,
    read_buffer_capacity: usize,
    initiator_stream_id: u64,
    initiator_throttle: Box<dyn Throttle>,
    write_spin_count: u8,
) -> (ReadStream, WriteStream) {
    // The Throttle half of this pair would carry flow control for a reply
    // stream's write side; an outbound connect has no reply step, so only
    // the Target half (for the new connection's read side) is used here.
    let (mut target, _) = target_factory.create(route);
    let read_stream_id = ids.next();
    target.begin(read_stream_id, route.target_ref, 0, local_addr, remote_addr);
    let read = ReadStream::new(read_stream_id, read_buffer_capacity, target);
    let write = WriteStream::new(initiator_stream_id, write_spin_count, initiator_throttle);
    (read, write)
}
