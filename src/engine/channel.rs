//! Registration of raw descriptors with the loop's poll.
//!
//! The client library hands us a bare file descriptor it does not own a mio
//! type for, so registration goes through [`mio::unix::SourceFd`]. An
//! [`FdBinding`] records one registration; it is recreated whenever the
//! library's descriptor changes (reconnection) and dropped on teardown.

use std::io;
use std::os::fd::RawFd;

use mio::unix::SourceFd;
use mio::{Interest, Registry, Token};

use crate::trace::debug;

/// One registered descriptor: fd, token and the interest it was last
/// registered with.
#[derive(Debug)]
pub struct FdBinding {
    fd: RawFd,
    token: Token,
    interest: Interest,
}

impl FdBinding {
    /// Registers `fd` with the poll registry.
    ///
    /// # Errors
    ///
    /// Returns an error if the descriptor cannot be registered (e.g. it was
    /// already closed by the client library).
    pub fn register(
        registry: &Registry,
        fd: RawFd,
        token: Token,
        interest: Interest,
    ) -> io::Result<Self> {
        registry.register(&mut SourceFd(&fd), token, interest)?;
        Ok(Self {
            fd,
            token,
            interest,
        })
    }

    /// Updates the interest set of an existing registration.
    ///
    /// # Errors
    ///
    /// Returns an error if the re-registration fails; the cached interest is
    /// left unchanged in that case.
    pub fn reregister(&mut self, registry: &Registry, interest: Interest) -> io::Result<()> {
        registry.reregister(&mut SourceFd(&self.fd), self.token, interest)?;
        self.interest = interest;
        Ok(())
    }

    /// Removes the registration. Best-effort: the descriptor may already be
    /// closed, in which case the kernel dropped it for us.
    pub fn deregister(self, registry: &Registry) {
        if let Err(err) = registry.deregister(&mut SourceFd(&self.fd)) {
            debug!(fd = self.fd, error = %err, "deregister of stale descriptor failed");
        }
    }

    /// The registered descriptor.
    #[must_use]
    pub fn fd(&self) -> RawFd {
        self.fd
    }

    /// The token readiness events for this descriptor carry.
    #[must_use]
    pub fn token(&self) -> Token {
        self.token
    }

    /// The interest set from the last successful (re)registration.
    #[must_use]
    pub fn interest(&self) -> Interest {
        self.interest
    }
}
