//! One-shot deadline timers.
//!
//! A [`TimerQueue`] owns a min-heap of pending entries and a dedicated
//! thread that sleeps until the earliest deadline and then runs its
//! callback. Poll descriptors use it to expire read/write deadlines.
//!
//! Cancelling a timer only flags it; the entry is discarded when it reaches
//! the top of the heap (or during a compaction pass). A callback that was
//! already popped when the cancel happened still runs, so callbacks must
//! carry their own staleness check.

use parking_lot::{Condvar, Mutex, MutexGuard};
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::thread::{self, JoinHandle};
use std::time::Instant;

/// Heap size below which cancelled entries are never compacted eagerly.
const COMPACT_THRESHOLD: usize = 1024;

pub(crate) type Callback = Box<dyn FnOnce() + Send + 'static>;

/// An entry in the timer heap.
struct TimerEntry {
    /// The time at which the timer should fire.
    deadline: Instant,

    /// Insertion sequence, breaks ties between equal deadlines.
    seq: u64,

    /// Cancellation flag shared with the [`TimerHandle`].
    cancelled: Arc<AtomicBool>,

    callback: Callback,
}

impl TimerEntry {
    fn is_cancelled(&self) -> bool {
        self.cancelled.load(AtomicOrdering::Acquire)
    }
}

impl Eq for TimerEntry {}

impl PartialEq for TimerEntry {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline && self.seq == other.seq
    }
}

impl Ord for TimerEntry {
    /// Orders timer entries by deadline, then by insertion order.
    ///
    /// The comparison is **reversed** so that a `BinaryHeap<TimerEntry>`
    /// behaves as a min-heap.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .deadline
            .cmp(&self.deadline)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for TimerEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

struct State {
    heap: BinaryHeap<TimerEntry>,
    next_seq: u64,
    compact_at: usize,
    shutdown: bool,
}

struct Shared {
    state: Mutex<State>,
    condvar: Condvar,
}

/// Ownership handle to an armed timer.
#[derive(Debug)]
pub(crate) struct TimerHandle {
    cancelled: Arc<AtomicBool>,
}

impl TimerHandle {
    /// Cancels the timer. Returns `false` if it was already cancelled.
    pub(crate) fn stop(&self) -> bool {
        !self.cancelled.swap(true, AtomicOrdering::AcqRel)
    }
}

/// Cloneable handle to a running timer thread.
#[derive(Clone)]
pub(crate) struct TimerQueue {
    shared: Arc<Shared>,
}

impl TimerQueue {
    /// Spawns the timer thread.
    pub(crate) fn start(name: String) -> io::Result<(TimerQueue, JoinHandle<()>)> {
        let shared = Arc::new(Shared {
            state: Mutex::new(State {
                heap: BinaryHeap::new(),
                next_seq: 0,
                compact_at: COMPACT_THRESHOLD,
                shutdown: false,
            }),
            condvar: Condvar::new(),
        });

        let driver = shared.clone();
        let thread = thread::Builder::new()
            .name(name)
            .spawn(move || run(driver))?;

        Ok((TimerQueue { shared }, thread))
    }

    /// Schedules `callback` to run on the timer thread at `deadline`.
    ///
    /// A deadline in the past fires as soon as the timer thread gets to it.
    pub(crate) fn schedule(&self, deadline: Instant, callback: Callback) -> TimerHandle {
        let cancelled = Arc::new(AtomicBool::new(false));

        let mut state = self.shared.state.lock();
        let seq = state.next_seq;
        state.next_seq = state.next_seq.wrapping_add(1);

        state.heap.push(TimerEntry {
            deadline,
            seq,
            cancelled: cancelled.clone(),
            callback,
        });

        if state.heap.len() >= state.compact_at {
            compact(&mut state);
        }

        drop(state);
        self.shared.condvar.notify_one();

        TimerHandle { cancelled }
    }

    /// Stops the timer thread. Pending timers never fire.
    pub(crate) fn shutdown(&self) {
        self.shared.state.lock().shutdown = true;
        self.shared.condvar.notify_all();
    }

    /// Number of entries still in the heap, cancelled ones included.
    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.shared.state.lock().heap.len()
    }
}

/// Drops cancelled entries and raises the next compaction point.
fn compact(state: &mut MutexGuard<'_, State>) {
    state.heap.retain(|entry| !entry.is_cancelled());

    let live = state.heap.len();
    state.compact_at = (live * 2).max(COMPACT_THRESHOLD);

    log::trace!("timer heap compacted to {} entries", live);
}

/// Timer thread loop.
fn run(shared: Arc<Shared>) {
    let mut state = shared.state.lock();

    loop {
        if state.shutdown {
            break;
        }

        let next = state
            .heap
            .peek()
            .map(|entry| (entry.deadline, entry.is_cancelled()));

        match next {
            None => shared.condvar.wait(&mut state),
            Some((_, true)) => {
                state.heap.pop();
            }
            Some((deadline, false)) if deadline > Instant::now() => {
                shared.condvar.wait_until(&mut state, deadline);
            }
            Some(_) => {
                if let Some(entry) = state.heap.pop() {
                    MutexGuard::unlocked(&mut state, || (entry.callback)());
                }
            }
        }
    }

    log::debug!("timer thread stopped with {} pending", state.heap.len());
}
