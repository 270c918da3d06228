#![allow(dead_code)]

use netpoll::poller::{Interest, Poller, RawHandle, ReadySet};
use netpoll::{Direction, EngineBuilder, PollDescriptor, PollEngine};

use parking_lot::{Condvar, Mutex};
use std::collections::{HashSet, VecDeque};
use std::io;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

enum Batch {
    Ready {
        read: Vec<RawHandle>,
        write: Vec<RawHandle>,
    },
    Fail(io::Error),
}

#[derive(Default)]
struct Script {
    batches: VecDeque<Batch>,
    registered: Vec<RawHandle>,
    deregistered: Vec<RawHandle>,
    rejected: HashSet<RawHandle>,
    polling: bool,
    shutdown: bool,
}

/// Poller driven by the test: readiness is whatever the test injects.
///
/// Clones share the same script, so one clone goes into the engine and the
/// test keeps another to inject batches and inspect registrations.
#[derive(Clone, Default)]
pub struct ScriptedPoller {
    script: Arc<(Mutex<Script>, Condvar)>,
}

impl ScriptedPoller {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, batch: Batch) {
        let (script, condvar) = &*self.script;
        script.lock().batches.push_back(batch);
        condvar.notify_all();
    }

    pub fn ready_read(&self, handle: RawHandle) {
        self.push(Batch::Ready {
            read: vec![handle],
            write: Vec::new(),
        });
    }

    pub fn ready_write(&self, handle: RawHandle) {
        self.push(Batch::Ready {
            read: Vec::new(),
            write: vec![handle],
        });
    }

    pub fn fail(&self, kind: io::ErrorKind) {
        self.push(Batch::Fail(io::Error::from(kind)));
    }

    pub fn fail_os(&self, code: i32) {
        self.push(Batch::Fail(io::Error::from_raw_os_error(code)));
    }

    /// Makes the next `register` of `handle` fail.
    pub fn reject(&self, handle: RawHandle) {
        self.script.0.lock().rejected.insert(handle);
    }

    pub fn registered(&self) -> Vec<RawHandle> {
        self.script.0.lock().registered.clone()
    }

    pub fn deregistered(&self) -> Vec<RawHandle> {
        self.script.0.lock().deregistered.clone()
    }

    /// Returns `true` while the dispatch thread is parked in `poll`.
    pub fn is_polling(&self) -> bool {
        self.script.0.lock().polling
    }

    pub fn is_shutdown(&self) -> bool {
        self.script.0.lock().shutdown
    }
}

impl Poller for ScriptedPoller {
    fn register(&self, handle: RawHandle, interest: Interest) -> io::Result<()> {
        assert_eq!(interest, Interest::ALL);

        let mut script = self.script.0.lock();
        if script.rejected.remove(&handle) {
            return Err(io::Error::from(io::ErrorKind::InvalidInput));
        }

        script.registered.push(handle);
        Ok(())
    }

    fn deregister(&self, handle: RawHandle) -> io::Result<()> {
        self.script.0.lock().deregistered.push(handle);
        Ok(())
    }

    fn poll(&self, ready: &mut ReadySet, timeout: Duration) -> io::Result<usize> {
        ready.clear();

        let (script, condvar) = &*self.script;
        let mut script = script.lock();

        if script.batches.is_empty() && !script.shutdown {
            script.polling = true;
            condvar.wait_for(&mut script, timeout);
            script.polling = false;
        }

        match script.batches.pop_front() {
            None => Ok(0),
            Some(Batch::Fail(error)) => Err(error),
            Some(Batch::Ready { read, write }) => {
                for handle in read {
                    ready.push_read(handle);
                }
                for handle in write {
                    ready.push_write(handle);
                }
                Ok(ready.len())
            }
        }
    }

    fn shutdown(&self) {
        let (script, condvar) = &*self.script;
        script.lock().shutdown = true;
        condvar.notify_all();
    }
}

/// Engine on a scripted poller that survives poller failures.
pub fn engine() -> (PollEngine, ScriptedPoller) {
    let poller = ScriptedPoller::new();
    let engine = EngineBuilder::new()
        .poll_timeout(Duration::from_millis(10))
        .abort_on_fatal(false)
        .thread_name("netpoll-test")
        .build(poller.clone())
        .expect("engine");

    (engine, poller)
}

/// Spins until `condition` holds, failing the test after five seconds.
pub fn eventually(mut condition: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);

    while !condition() {
        assert!(Instant::now() < deadline, "condition not reached in time");
        thread::sleep(Duration::from_millis(1));
    }
}

pub fn wait_parked(pd: &PollDescriptor, direction: Direction, n: usize) {
    eventually(|| pd.waiters(direction) >= n);
}
