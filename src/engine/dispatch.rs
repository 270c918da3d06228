//! The dispatch loop.
//!
//! A single thread asks the poller for readiness with a bounded timeout and
//! fans each batch out to the registered descriptors. The bounded timeout
//! lets the loop observe the shutdown flag even when no handle ever becomes
//! ready.

use super::Shared;
use crate::poller::ReadySet;

use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

pub(crate) struct Dispatcher {
    shared: Arc<Shared>,
    ready: ReadySet,
    poll_timeout: Duration,
    abort_on_fatal: bool,
}

impl Dispatcher {
    pub(crate) fn new(
        shared: Arc<Shared>,
        batch_size: usize,
        poll_timeout: Duration,
        abort_on_fatal: bool,
    ) -> Self {
        Self {
            shared,
            ready: ReadySet::with_capacity(batch_size),
            poll_timeout,
            abort_on_fatal,
        }
    }

    /// Starts the dispatch thread.
    pub(crate) fn spawn(self, name: String) -> io::Result<JoinHandle<()>> {
        thread::Builder::new().name(name).spawn(move || self.run())
    }

    /// Main loop.
    ///
    /// 1. Observe the shutdown flag
    /// 2. Poll with a bounded timeout
    /// 3. Wake the batch under one registry read lock
    fn run(mut self) {
        log::debug!("dispatch loop started ({:?} poll timeout)", self.poll_timeout);

        while !self.shared.is_shutdown() {
            match self.shared.poller.poll(&mut self.ready, self.poll_timeout) {
                Ok(0) => continue,
                Ok(_) => {
                    let woken = self.shared.registry.dispatch(&self.ready);
                    log::trace!(
                        "dispatched {} read / {} write ready, {} woken",
                        self.ready.read().len(),
                        self.ready.write().len(),
                        woken
                    );
                }
                Err(error) => {
                    log::error!(
                        "poll on {:?} failed: {}",
                        self.shared.poller.descriptor(),
                        error
                    );
                    self.shared.record_fatal(&error);

                    if self.abort_on_fatal {
                        std::process::abort();
                    }
                    return;
                }
            }
        }

        log::debug!("dispatch loop stopped");
    }
}
