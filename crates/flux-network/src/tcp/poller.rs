use std::io;
use std::time::Duration;

use mio::event::Source;
use mio::{Events, Interest, Poll, Token};

/// Thin typed wrapper over `mio::Poll`.
///
/// Readiness callbacks run synchronously on whichever thread calls
/// [`Poller::poll`] — there is exactly one such thread per reactor instance,
/// matching the single cooperative reactor-thread concurrency model this
/// whole module is built around.
pub struct Poller {
    poll: Poll,
    events: Events,
    next_token: usize,
}

impl Poller {
    /// # Errors
    /// Propagates the OS error if the underlying readiness queue can't be
    /// created.
    pub fn new(events_capacity: usize) -> io::Result<Self> {
        Ok(Self { poll: Poll::new()?, events: Events::with_capacity(events_capacity), next_token: 0 })
    }

    pub fn next_token(&mut self) -> Token {
        let token = Token(self.next_token);
        self.next_token += 1;
        token
    }

    pub fn register(
        &self,
        source: &mut impl Source,
        token: Token,
        interest: Interest,
    ) -> io::Result<()> {
        self.poll.registry().register(source, token, interest)
    }

    pub fn reregister(
        &self,
        source: &mut impl Source,
        token: Token,
        interest: Interest,
    ) -> io::Result<()> {
        self.poll.registry().reregister(source, token, interest)
    }

    pub fn deregister(&self, source: &mut impl Source) -> io::Result<()> {
        self.poll.registry().deregister(source)
    }

    /// Polls the OS readiness primitive once with `timeout` and returns the
    /// ready events.
    ///
    /// # Errors
    /// Propagates the OS error from the underlying poll call.
    pub fn poll(&mut self, timeout: Option<Duration>) -> io::Result<&Events> {
        self.poll.poll(&mut self.events, timeout)?;
        Ok(&self.events)
    }
}
