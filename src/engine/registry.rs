use crate::descriptor::{Direction, PollDescriptor};
use crate::poller::{RawHandle, ReadySet};

use parking_lot::RwLock;
use std::collections::HashMap;
use std::collections::hash_map::Entry;

/// Handle → descriptor map shared by `open`/`close` and the dispatch loop.
///
/// The dispatch loop takes the read lock for exactly one batch.
pub(crate) struct Registry {
    entries: RwLock<HashMap<RawHandle, PollDescriptor>>,
}

impl Registry {
    pub(crate) fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Inserts `descriptor`. Returns `false` if its handle is already open.
    pub(crate) fn insert(&self, descriptor: PollDescriptor) -> bool {
        match self.entries.write().entry(descriptor.handle()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(descriptor);
                true
            }
        }
    }

    /// Removes the entry for `descriptor`'s handle, but only if it still
    /// belongs to that descriptor.
    pub(crate) fn remove(&self, descriptor: &PollDescriptor) -> bool {
        let handle = descriptor.handle();
        let mut entries = self.entries.write();

        let owned = entries
            .get(&handle)
            .is_some_and(|current| current.same(descriptor));
        if owned {
            entries.remove(&handle);
        }

        owned
    }

    pub(crate) fn contains(&self, handle: RawHandle) -> bool {
        self.entries.read().contains_key(&handle)
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Wakes the descriptors named in one readiness batch.
    ///
    /// Handles that are not (or no longer) registered are skipped. Returns
    /// the number of wakeups delivered.
    pub(crate) fn dispatch(&self, ready: &ReadySet) -> usize {
        let entries = self.entries.read();
        let mut woken = 0;

        for handle in ready.read() {
            if let Some(descriptor) = entries.get(handle) {
                descriptor.notify_ready(Direction::Read);
                woken += 1;
            }
        }

        for handle in ready.write() {
            if let Some(descriptor) = entries.get(handle) {
                descriptor.notify_ready(Direction::Write);
                woken += 1;
            }
        }

        woken
    }
}
