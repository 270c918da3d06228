//! The poll engine.
//!
//! [`PollEngine`] ties the pieces together: it owns the poller, the handle
//! registry, the dispatch thread and the deadline timer thread. Several
//! engines can live side by side; nothing here is process-global.
//!
//! Dropping the engine shuts it down. Shutdown stops the background threads
//! but does not release waiters still parked on open descriptors, so close
//! every descriptor first.

mod builder;
mod dispatch;
mod registry;

pub use builder::EngineBuilder;

use dispatch::Dispatcher;
use registry::Registry;

use crate::descriptor::PollDescriptor;
use crate::error::{Error, Result};
use crate::poller::{Interest, Poller, RawHandle};
use crate::timer::TimerQueue;

use parking_lot::Mutex;
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;

/// A recorded poller failure. `io::Error` is not `Clone`, so every caller
/// gets a rebuilt copy; OS errors keep their errno.
struct Fatal {
    raw: Option<i32>,
    kind: io::ErrorKind,
    message: String,
}

impl From<&io::Error> for Fatal {
    fn from(error: &io::Error) -> Self {
        Self {
            raw: error.raw_os_error(),
            kind: error.kind(),
            message: error.to_string(),
        }
    }
}

impl Fatal {
    fn to_error(&self) -> Error {
        let source = match self.raw {
            Some(code) => io::Error::from_raw_os_error(code),
            None => io::Error::new(self.kind, self.message.clone()),
        };

        Error::PollerFatal(source)
    }
}

/// State shared between the engine, its dispatch thread and descriptors.
pub(crate) struct Shared {
    pub(crate) poller: Box<dyn Poller>,
    pub(crate) registry: Registry,
    timers: TimerQueue,
    shutdown: AtomicBool,
    fatal: Mutex<Option<Fatal>>,
}

impl Shared {
    pub(crate) fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    pub(crate) fn record_fatal(&self, error: &io::Error) {
        *self.fatal.lock() = Some(Fatal::from(error));
    }

    fn fatal_error(&self) -> Option<Error> {
        self.fatal.lock().as_ref().map(Fatal::to_error)
    }

    /// Removes `descriptor` from the registry and the poller.
    ///
    /// Closing a descriptor that is no longer registered is a no-op, so a
    /// late close never deregisters a newer descriptor for a reused handle.
    pub(crate) fn close(&self, descriptor: &PollDescriptor) -> Result<()> {
        let handle = descriptor.handle();

        if !self.registry.remove(descriptor) {
            log::trace!("handle {} already closed", handle);
            return Ok(());
        }

        log::trace!("handle {} closed", handle);

        self.poller
            .deregister(handle)
            .map_err(|source| Error::Deregistration { handle, source })
    }
}

/// A running poll engine.
///
/// # Examples
///
/// ```rust,ignore
/// use netpoll::{Direction, PollEngine};
/// use std::os::fd::AsRawFd;
///
/// let engine = PollEngine::init()?;
/// let pd = engine.open(socket.as_raw_fd())?;
///
/// loop {
///     pd.reset(Direction::Read)?;
///     match socket.read(&mut buf) {
///         Err(e) if e.kind() == io::ErrorKind::WouldBlock => pd.wait(Direction::Read)?,
///         other => break other,
///     }
/// }
///
/// pd.unblock();
/// pd.close()?;
/// ```
pub struct PollEngine {
    shared: Arc<Shared>,
    dispatcher: Option<JoinHandle<()>>,
    timer: Option<JoinHandle<()>>,
}

impl PollEngine {
    /// Starts an engine on the platform's default poller with the default
    /// configuration.
    #[cfg(any(
        target_os = "linux",
        target_os = "android",
        target_os = "macos",
        target_os = "ios",
        target_os = "freebsd"
    ))]
    pub fn init() -> Result<Self> {
        EngineBuilder::new().build_default()
    }

    pub fn builder() -> EngineBuilder {
        EngineBuilder::new()
    }

    pub(crate) fn start(poller: Box<dyn Poller>, config: EngineBuilder) -> Result<Self> {
        let (timers, timer) = TimerQueue::start(format!("{}-timer", config.thread_name))
            .map_err(Error::PollerFatal)?;

        let shared = Arc::new(Shared {
            poller,
            registry: Registry::new(),
            timers: timers.clone(),
            shutdown: AtomicBool::new(false),
            fatal: Mutex::new(None),
        });

        let dispatcher = Dispatcher::new(
            shared.clone(),
            config.batch_size,
            config.poll_timeout,
            config.abort_on_fatal,
        );

        let dispatcher = match dispatcher.spawn(format!("{}-dispatch", config.thread_name)) {
            Ok(thread) => thread,
            Err(error) => {
                timers.shutdown();
                let _ = timer.join();
                return Err(Error::PollerFatal(error));
            }
        };

        log::debug!("poll engine started on {:?}", shared.poller.descriptor());

        Ok(Self {
            shared,
            dispatcher: Some(dispatcher),
            timer: Some(timer),
        })
    }

    /// Registers `handle` and returns its descriptor.
    ///
    /// The handle is watched for readable, writable and error conditions.
    /// Fails with [`Error::Registration`] if the handle is already open or
    /// the poller rejects it, with [`Error::PollerFatal`] after a poller
    /// failure, and with [`Error::Shutdown`] after [`shutdown`](Self::shutdown).
    pub fn open(&self, handle: RawHandle) -> Result<PollDescriptor> {
        if let Some(error) = self.shared.fatal_error() {
            return Err(error);
        }
        if self.shared.is_shutdown() {
            return Err(Error::Shutdown);
        }

        let descriptor = PollDescriptor::new(
            handle,
            self.shared.timers.clone(),
            Arc::downgrade(&self.shared),
        );

        if !self.shared.registry.insert(descriptor.clone()) {
            return Err(Error::Registration {
                handle,
                source: io::Error::new(io::ErrorKind::AlreadyExists, "handle is already open"),
            });
        }

        if let Err(source) = self.shared.poller.register(handle, Interest::ALL) {
            self.shared.registry.remove(&descriptor);
            return Err(Error::Registration { handle, source });
        }

        log::trace!("handle {} opened", handle);

        Ok(descriptor)
    }

    /// The poller's own OS handle, if it has one.
    pub fn descriptor(&self) -> Option<RawHandle> {
        self.shared.poller.descriptor()
    }

    /// Returns `true` if `handle` currently has an open descriptor.
    pub fn is_open(&self, handle: RawHandle) -> bool {
        self.shared.registry.contains(handle)
    }

    /// Number of open descriptors.
    pub fn open_handles(&self) -> usize {
        self.shared.registry.len()
    }

    /// Stops the dispatch and timer threads.
    ///
    /// Idempotent. Returns [`Error::PollerFatal`] if the dispatch loop had
    /// already died on a poller failure.
    pub fn shutdown(&mut self) -> Result<()> {
        let Some(dispatcher) = self.dispatcher.take() else {
            return Ok(());
        };

        self.shared.shutdown.store(true, Ordering::Release);
        self.shared.poller.shutdown();

        let dispatched = dispatcher.join();

        self.shared.timers.shutdown();
        if let Some(timer) = self.timer.take()
            && timer.join().is_err()
        {
            log::error!("timer thread panicked");
        }

        log::debug!(
            "poll engine stopped with {} open handles",
            self.shared.registry.len()
        );

        if dispatched.is_err() {
            return Err(Error::PollerFatal(io::Error::other(
                "dispatch thread panicked",
            )));
        }

        match self.shared.fatal_error() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

impl Drop for PollEngine {
    fn drop(&mut self) {
        let _ = self.shutdown();
    }
}
