use parking_lot::{Condvar, Mutex};

/// Blocking wait condition for one direction of a descriptor.
///
/// Every wake bumps an epoch. A waiter takes a ticket (the current epoch)
/// *before* validating descriptor state and then parks until the epoch
/// moves, so a wake that lands between validation and parking is never
/// lost, and spurious condvar returns are absorbed.
///
/// Readiness that arrives while nobody is parked is remembered as a pending
/// notification and consumed by the next park.
pub(crate) struct WaitQueue {
    state: Mutex<WaitState>,
    condvar: Condvar,
}

#[derive(Default)]
struct WaitState {
    epoch: u64,
    pending: bool,
    parked: usize,
}

impl WaitQueue {
    pub(crate) fn new() -> Self {
        Self {
            state: Mutex::new(WaitState::default()),
            condvar: Condvar::new(),
        }
    }

    pub(crate) fn ticket(&self) -> u64 {
        self.state.lock().epoch
    }

    /// Blocks until a wake newer than `ticket`, or returns at once if a
    /// readiness notification is pending.
    pub(crate) fn park(&self, ticket: u64) {
        let mut state = self.state.lock();

        if state.pending {
            state.pending = false;
            return;
        }

        state.parked += 1;
        while state.epoch == ticket {
            self.condvar.wait(&mut state);
        }
        state.parked -= 1;

        state.pending = false;
    }

    /// Readiness wake: broadcast and leave a pending notification.
    pub(crate) fn notify_ready(&self) {
        let mut state = self.state.lock();
        state.epoch = state.epoch.wrapping_add(1);
        state.pending = true;
        drop(state);

        self.condvar.notify_all();
    }

    /// State-change wake (deadline, unblock): broadcast only.
    pub(crate) fn wake(&self) {
        let mut state = self.state.lock();
        state.epoch = state.epoch.wrapping_add(1);
        drop(state);

        self.condvar.notify_all();
    }

    pub(crate) fn clear_pending(&self) {
        self.state.lock().pending = false;
    }

    pub(crate) fn parked(&self) -> usize {
        self.state.lock().parked
    }
}
