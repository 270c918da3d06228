//! Error type shared by the engine and poll descriptors.

use crate::poller::RawHandle;

use std::io;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors reported by the poll engine and its descriptors.
///
/// `Closing` and `Timeout` are ordinary outcomes of [`wait`] and [`reset`].
/// The remaining variants come from the readiness backend.
///
/// [`wait`]: crate::PollDescriptor::wait
/// [`reset`]: crate::PollDescriptor::reset
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The descriptor has been unblocked and must be abandoned.
    #[error("use of closing poll descriptor")]
    Closing,

    /// The deadline for the requested direction has elapsed.
    ///
    /// Retryable once a new deadline is set.
    #[error("i/o deadline exceeded")]
    Timeout,

    /// The readiness backend refused to register the handle.
    #[error("failed to register handle {handle} with the poller")]
    Registration {
        handle: RawHandle,
        #[source]
        source: io::Error,
    },

    /// The readiness backend refused to deregister the handle.
    #[error("failed to deregister handle {handle} from the poller")]
    Deregistration {
        handle: RawHandle,
        #[source]
        source: io::Error,
    },

    /// The readiness backend itself failed. The engine cannot recover.
    #[error("poller failed: {0}")]
    PollerFatal(#[source] io::Error),

    /// The engine has already been shut down.
    #[error("poll engine is shut down")]
    Shutdown,
}

impl Error {
    /// Returns `true` for errors that can go away by setting a new deadline.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Timeout)
    }

    /// Returns `true` if the descriptor is closing.
    pub fn is_closing(&self) -> bool {
        matches!(self, Error::Closing)
    }
}

impl From<Error> for io::Error {
    fn from(error: Error) -> Self {
        match error {
            Error::Timeout => io::Error::new(io::ErrorKind::TimedOut, error),
            Error::Closing | Error::Shutdown => io::Error::new(io::ErrorKind::NotConnected, error),
            Error::Registration { source, .. }
            | Error::Deregistration { source, .. }
            | Error::PollerFatal(source) => source,
        }
    }
}
