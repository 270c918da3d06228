use std::time::Duration;

use super::PollEngine;
use crate::error::Result;
use crate::poller::Poller;

/// Builder for configuring and starting a poll engine.
///
/// `EngineBuilder` sets the dispatch loop's poll timeout and batch size,
/// how it reacts to a poller failure, and the names of the engine's
/// threads.
///
/// # Examples
///
/// ```rust,ignore
/// let engine = EngineBuilder::new()
///     .poll_timeout(Duration::from_millis(50))
///     .batch_size(64)
///     .build_default()?;
/// ```
pub struct EngineBuilder {
    /// Longest single wait of the dispatch loop.
    pub(crate) poll_timeout: Duration,

    /// Readiness reports handled per direction per poll.
    pub(crate) batch_size: usize,

    /// Abort the process when the poller fails.
    pub(crate) abort_on_fatal: bool,

    /// Prefix for the dispatch and timer thread names.
    pub(crate) thread_name: String,
}

impl EngineBuilder {
    /// Creates a new `EngineBuilder` with default configuration.
    ///
    /// By default the dispatch loop polls for at most 100 ms at a time,
    /// handles up to 128 readiness reports per direction per poll, aborts
    /// on poller failure, and names its threads `netpoll-dispatch` and
    /// `netpoll-timer`.
    pub fn new() -> Self {
        Self {
            poll_timeout: Duration::from_millis(100),
            batch_size: 128,
            abort_on_fatal: true,
            thread_name: String::from("netpoll"),
        }
    }

    /// Sets the longest single wait of the dispatch loop.
    ///
    /// Bounds how long shutdown takes on pollers that cannot be
    /// interrupted.
    ///
    /// # Panics
    ///
    /// Panics if `timeout` is zero.
    ///
    /// # Examples
    ///
    /// ```rust,ignore
    /// let builder = EngineBuilder::new()
    ///     .poll_timeout(Duration::from_millis(20));
    /// ```
    pub fn poll_timeout(mut self, timeout: Duration) -> Self {
        assert!(!timeout.is_zero(), "poll_timeout must be > 0");

        self.poll_timeout = timeout;
        self
    }

    /// Sets the maximum number of readiness reports handled per direction
    /// per poll. Pending readiness beyond that is picked up by the next
    /// poll.
    ///
    /// # Panics
    ///
    /// Panics if `n == 0`.
    ///
    /// # Examples
    ///
    /// ```rust,ignore
    /// let builder = EngineBuilder::new()
    ///     .batch_size(32);
    /// ```
    pub fn batch_size(mut self, n: usize) -> Self {
        assert!(n > 0, "batch_size must be > 0");

        self.batch_size = n;
        self
    }

    /// Whether a poller failure aborts the process (the default) or only
    /// stops the dispatch loop.
    pub fn abort_on_fatal(mut self, abort: bool) -> Self {
        self.abort_on_fatal = abort;
        self
    }

    /// Sets the prefix for the engine's thread names.
    pub fn thread_name(mut self, name: impl Into<String>) -> Self {
        self.thread_name = name.into();
        self
    }

    /// Builds the engine on `poller` with the configured options.
    ///
    /// This starts the timer thread and the dispatch thread.
    pub fn build<P: Poller>(self, poller: P) -> Result<PollEngine> {
        PollEngine::start(Box::new(poller), self)
    }

    /// Builds the engine on the platform's default poller.
    ///
    /// Fails with [`Error::PollerFatal`](crate::Error::PollerFatal) if the
    /// poller cannot be created.
    #[cfg(any(
        target_os = "linux",
        target_os = "android",
        target_os = "macos",
        target_os = "ios",
        target_os = "freebsd"
    ))]
    pub fn build_default(self) -> Result<PollEngine> {
        let poller = crate::poller::DefaultPoller::new().map_err(crate::Error::PollerFatal)?;
        self.build(poller)
    }
}

impl Default for EngineBuilder {
    /// Creates a default `EngineBuilder`.
    fn default() -> Self {
        Self::new()
    }
}
