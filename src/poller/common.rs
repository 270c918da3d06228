use std::io;
use std::time::Duration;

/// Opaque identifier of a socket owned by the transport layer.
pub type RawHandle = i32;

/// Readiness conditions a handle is registered for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Interest {
    pub read: bool,
    pub write: bool,
    pub error: bool,
}

impl Interest {
    /// Readable, writable and error conditions: what `open` registers.
    pub const ALL: Interest = Interest {
        read: true,
        write: true,
        error: true,
    };
}

/// One batch of readiness reported by a [`Poller`].
///
/// Handles are split into read-ready and write-ready sets. A handle ready in
/// both directions appears in both. Each set holds at most `capacity`
/// handles; a backend with more pending readiness reports the rest on the
/// next call.
#[derive(Debug)]
pub struct ReadySet {
    read: Vec<RawHandle>,
    write: Vec<RawHandle>,
    capacity: usize,
}

impl ReadySet {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            read: Vec::with_capacity(capacity),
            write: Vec::with_capacity(capacity),
            capacity,
        }
    }

    /// Maximum number of handles per direction in one batch.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.read.clear();
        self.write.clear();
    }

    /// Records read readiness. Returns `false` if the read set is full.
    pub fn push_read(&mut self, handle: RawHandle) -> bool {
        push_bounded(&mut self.read, self.capacity, handle)
    }

    /// Records write readiness. Returns `false` if the write set is full.
    pub fn push_write(&mut self, handle: RawHandle) -> bool {
        push_bounded(&mut self.write, self.capacity, handle)
    }

    pub fn is_full(&self) -> bool {
        self.read.len() >= self.capacity || self.write.len() >= self.capacity
    }

    pub fn read(&self) -> &[RawHandle] {
        &self.read
    }

    pub fn write(&self) -> &[RawHandle] {
        &self.write
    }

    pub fn is_empty(&self) -> bool {
        self.read.is_empty() && self.write.is_empty()
    }

    /// Number of distinct readiness reports in the batch.
    pub fn len(&self) -> usize {
        self.read.len() + self.write.len()
    }
}

fn push_bounded(set: &mut Vec<RawHandle>, capacity: usize, handle: RawHandle) -> bool {
    if set.len() >= capacity {
        return false;
    }

    if !set.contains(&handle) {
        set.push(handle);
    }

    true
}

/// An OS readiness-notification facility.
///
/// Implementations must be usable from several threads at once: `register`
/// and `deregister` are called by transport threads while the engine's
/// dispatch thread is blocked inside `poll`.
pub trait Poller: Send + Sync + 'static {
    /// Starts watching `handle` for the given conditions.
    fn register(&self, handle: RawHandle, interest: Interest) -> io::Result<()>;

    /// Stops watching `handle`.
    fn deregister(&self, handle: RawHandle) -> io::Result<()>;

    /// Waits at most `timeout` for readiness and fills `ready`.
    ///
    /// `ready` is cleared first. Returns the number of reports written;
    /// `Ok(0)` means nothing became ready within the timeout (or the wait was
    /// interrupted). Any error is treated as fatal by the engine.
    fn poll(&self, ready: &mut ReadySet, timeout: Duration) -> io::Result<usize>;

    /// Interrupts a blocked `poll` and releases OS resources that are no
    /// longer needed. Called once by the engine during shutdown.
    fn shutdown(&self) {}

    /// The backend's own OS handle, if it has one.
    fn descriptor(&self) -> Option<RawHandle> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ready_set_is_bounded() {
        let mut ready = ReadySet::with_capacity(2);

        assert!(ready.push_read(1));
        assert!(ready.push_read(2));
        assert!(!ready.push_read(3));
        assert!(ready.is_full());

        assert_eq!(ready.read(), &[1, 2]);
        assert!(ready.write().is_empty());
    }

    #[test]
    fn test_ready_set_merges_duplicates() {
        let mut ready = ReadySet::with_capacity(4);

        ready.push_write(5);
        ready.push_write(5);
        ready.push_read(5);

        assert_eq!(ready.write(), &[5]);
        assert_eq!(ready.read(), &[5]);
        assert_eq!(ready.len(), 2);

        ready.clear();
        assert!(ready.is_empty());
    }
}
