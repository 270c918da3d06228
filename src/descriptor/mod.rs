//! Per-handle poll descriptors.
//!
//! A [`PollDescriptor`] is the wait/deadline state machine of one socket. The
//! transport layer parks on it with [`wait`](PollDescriptor::wait) whenever
//! an I/O attempt would block; the engine's dispatch loop, deadline timers
//! and [`unblock`](PollDescriptor::unblock) wake it up again.
//!
//! Locking: the state lock guards closing/generation/deadlines/timers. Each
//! direction has its own [`WaitQueue`] lock. Wakers may take a queue lock
//! while holding the state lock; waiters never hold a queue lock while
//! taking the state lock.

mod deadline;
mod wait;

use deadline::{ArmedTimers, Deadline};
use wait::WaitQueue;

use crate::engine::Shared;
use crate::error::{Error, Result};
use crate::poller::RawHandle;
use crate::timer::{TimerHandle, TimerQueue};

use parking_lot::Mutex;
use std::fmt;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

/// I/O direction a wait or deadline applies to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Direction {
    Read,
    Write,
    /// Both directions. A [`wait`] on `Both` parks on the read side.
    ///
    /// [`wait`]: PollDescriptor::wait
    Both,
}

impl Direction {
    fn reads(self) -> bool {
        matches!(self, Direction::Read | Direction::Both)
    }

    fn writes(self) -> bool {
        matches!(self, Direction::Write | Direction::Both)
    }
}

struct State {
    closing: bool,

    /// Bumped on every deadline change and on unblock; timer callbacks
    /// carrying an older value are stale.
    generation: u64,

    read_deadline: Deadline,
    write_deadline: Deadline,
    timers: ArmedTimers,
}

impl State {
    fn check(&self, direction: Direction) -> Result<()> {
        if self.closing {
            return Err(Error::Closing);
        }

        if (direction.reads() && self.read_deadline.is_expired())
            || (direction.writes() && self.write_deadline.is_expired())
        {
            return Err(Error::Timeout);
        }

        Ok(())
    }
}

struct Inner {
    handle: RawHandle,
    state: Mutex<State>,
    read_wait: WaitQueue,
    write_wait: WaitQueue,
    timers: TimerQueue,
    engine: Weak<Shared>,
}

impl Inner {
    fn queue(&self, direction: Direction) -> &WaitQueue {
        match direction {
            Direction::Read | Direction::Both => &self.read_wait,
            Direction::Write => &self.write_wait,
        }
    }

    /// Deadline timer callback.
    fn expire(&self, generation: u64, read: bool, write: bool) {
        let mut state = self.state.lock();

        if generation != state.generation {
            return;
        }

        if read && state.read_deadline.active().is_none() {
            panic!("inconsistent read deadline on handle {}", self.handle);
        }
        if write && state.write_deadline.active().is_none() {
            panic!("inconsistent write deadline on handle {}", self.handle);
        }
        if !state.timers.release(read, write) {
            panic!("deadline timer fired without being armed on handle {}", self.handle);
        }

        if read {
            state.read_deadline = Deadline::Expired;
            self.read_wait.wake();
        }
        if write {
            state.write_deadline = Deadline::Expired;
            self.write_wait.wake();
        }

        log::trace!(
            "deadline expired on handle {} (read: {}, write: {})",
            self.handle,
            read,
            write
        );
    }
}

/// Wait/deadline state of one registered handle.
///
/// Created by [`PollEngine::open`](crate::PollEngine::open). Cloning is
/// cheap and every clone refers to the same descriptor, so a reader thread
/// and a writer thread can each hold one.
///
/// Teardown is two steps: [`unblock`](Self::unblock) releases every parked
/// waiter and makes later waits fail with [`Error::Closing`];
/// [`close`](Self::close) removes the handle from the engine. The socket
/// itself is never closed here.
#[derive(Clone)]
pub struct PollDescriptor {
    inner: Arc<Inner>,
}

impl PollDescriptor {
    pub(crate) fn new(handle: RawHandle, timers: TimerQueue, engine: Weak<Shared>) -> Self {
        let state = State {
            closing: false,
            generation: 1,
            read_deadline: Deadline::None,
            write_deadline: Deadline::None,
            timers: ArmedTimers::None,
        };

        Self {
            inner: Arc::new(Inner {
                handle,
                state: Mutex::new(state),
                read_wait: WaitQueue::new(),
                write_wait: WaitQueue::new(),
                timers,
                engine,
            }),
        }
    }

    /// The handle this descriptor was opened for.
    pub fn handle(&self) -> RawHandle {
        self.inner.handle
    }

    pub fn is_closing(&self) -> bool {
        self.inner.state.lock().closing
    }

    /// Blocks until `direction` may have become ready.
    ///
    /// Returns immediately with [`Error::Closing`] after
    /// [`unblock`](Self::unblock), and with [`Error::Timeout`] once the
    /// direction's deadline has expired. Otherwise parks until a readiness
    /// event for `direction`, expiry of its deadline, or `unblock`, then
    /// re-validates and reports which of the three it was.
    ///
    /// `Ok(())` is only a hint: the caller retries its I/O and waits again
    /// if the operation would still block. Readiness observed since the last
    /// [`reset`](Self::reset) of this direction satisfies the wait at once.
    ///
    /// [`Direction::Both`] checks the state of both directions but parks on
    /// the read side, so only read readiness, a read deadline or `unblock`
    /// wakes it.
    pub fn wait(&self, direction: Direction) -> Result<()> {
        let queue = self.inner.queue(direction);

        let ticket = queue.ticket();
        self.inner.state.lock().check(direction)?;

        queue.park(ticket);

        self.inner.state.lock().check(direction)
    }

    /// Non-blocking probe with the same checks as entering [`wait`](Self::wait).
    ///
    /// Also discards readiness seen so far for `direction`, so that a
    /// following `wait` only returns for readiness observed after this call.
    /// Call it before attempting the I/O.
    pub fn reset(&self, direction: Direction) -> Result<()> {
        if direction.reads() {
            self.inner.read_wait.clear_pending();
        }
        if direction.writes() {
            self.inner.write_wait.clear_pending();
        }

        self.inner.state.lock().check(direction)
    }

    /// Sets the deadline of `direction` to `timeout` from now.
    ///
    /// `Duration::ZERO` clears the deadline. Every call replaces the armed
    /// timers, even if the deadline does not change. Ignored once the
    /// descriptor is closing.
    pub fn set_deadline(&self, timeout: Duration, direction: Direction) {
        self.apply_deadline(Deadline::after(timeout), direction);
    }

    /// Sets an absolute deadline for `direction`.
    ///
    /// `None` clears the deadline. An instant that has already passed
    /// expires the direction immediately and releases its waiters.
    pub fn set_deadline_at(&self, deadline: Option<Instant>, direction: Direction) {
        self.apply_deadline(Deadline::at(deadline), direction);
    }

    fn apply_deadline(&self, deadline: Deadline, direction: Direction) {
        let mut state = self.inner.state.lock();

        if state.closing {
            return;
        }

        state.generation += 1;
        state.timers.stop_all();

        if direction.reads() {
            state.read_deadline = deadline;
        }
        if direction.writes() {
            state.write_deadline = deadline;
        }

        if deadline.is_expired() {
            if direction.reads() {
                self.inner.read_wait.wake();
            }
            if direction.writes() {
                self.inner.write_wait.wake();
            }
        }

        state.timers = self.arm(&state);

        log::debug!(
            "handle {}: {:?} deadline set to {:?} (generation {})",
            self.inner.handle,
            direction,
            deadline,
            state.generation
        );
    }

    fn arm(&self, state: &State) -> ArmedTimers {
        let generation = state.generation;

        match (state.read_deadline.active(), state.write_deadline.active()) {
            (None, None) => ArmedTimers::None,
            (Some(read), Some(write)) if read == write => {
                ArmedTimers::Combined(self.schedule(read, generation, true, true))
            }
            (read, write) => ArmedTimers::Split {
                read: read.map(|at| self.schedule(at, generation, true, false)),
                write: write.map(|at| self.schedule(at, generation, false, true)),
            },
        }
    }

    fn schedule(&self, at: Instant, generation: u64, read: bool, write: bool) -> TimerHandle {
        let weak = Arc::downgrade(&self.inner);

        self.inner.timers.schedule(
            at,
            Box::new(move || {
                if let Some(inner) = weak.upgrade() {
                    inner.expire(generation, read, write);
                }
            }),
        )
    }

    /// Moves the descriptor into its closing state and releases every
    /// parked waiter with [`Error::Closing`]. Armed timers are cancelled.
    ///
    /// # Panics
    ///
    /// Panics if the descriptor is already closing: unblocking twice is a
    /// double-close bug in the caller.
    pub fn unblock(&self) {
        let mut state = self.inner.state.lock();

        if state.closing {
            panic!(
                "unblock on closing poll descriptor (handle {})",
                self.inner.handle
            );
        }

        state.closing = true;
        state.generation += 1;

        self.inner.read_wait.wake();
        self.inner.write_wait.wake();

        state.timers.stop_all();

        log::trace!("handle {} unblocked", self.inner.handle);
    }

    /// Deregisters the handle from the poller and drops it from the engine.
    ///
    /// Does not wake waiters: call [`unblock`](Self::unblock) first.
    pub fn close(&self) -> Result<()> {
        let engine = self.inner.engine.upgrade().ok_or(Error::Shutdown)?;
        engine.close(self)
    }

    /// Number of threads currently parked in [`wait`](Self::wait) on
    /// `direction` (both queues for [`Direction::Both`]).
    pub fn waiters(&self, direction: Direction) -> usize {
        let mut n = 0;
        if direction.reads() {
            n += self.inner.read_wait.parked();
        }
        if direction.writes() {
            n += self.inner.write_wait.parked();
        }
        n
    }

    /// Readiness wake from the dispatch loop.
    pub(crate) fn notify_ready(&self, direction: Direction) {
        if direction.reads() {
            self.inner.read_wait.notify_ready();
        }
        if direction.writes() {
            self.inner.write_wait.notify_ready();
        }
    }

    pub(crate) fn same(&self, other: &PollDescriptor) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for PollDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.lock();

        f.debug_struct("PollDescriptor")
            .field("handle", &self.inner.handle)
            .field("closing", &state.closing)
            .field("generation", &state.generation)
            .field("read_deadline", &state.read_deadline)
            .field("write_deadline", &state.write_deadline)
            .finish()
    }
}
