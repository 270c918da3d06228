//! `kqueue`-based poller implementation for macOS and FreeBSD.
//!
//! Read and write filters are added with `EV_CLEAR`, which gives the same
//! edge-triggered reporting as the Linux backend. A user event
//! (`EVFILT_USER`) serves as the wake source for shutdown.

use super::common::{Interest, Poller, RawHandle, ReadySet};

use libc::{
    EV_ADD, EV_CLEAR, EV_DELETE, EV_ENABLE, EV_EOF, EV_ERROR, EVFILT_READ, EVFILT_USER,
    EVFILT_WRITE, NOTE_TRIGGER, kevent, kqueue,
};
use parking_lot::Mutex;
use std::io;
use std::os::fd::RawFd;
use std::ptr;
use std::time::Duration;

/// Identifier of the user event used to interrupt `kevent`.
const WAKE_IDENT: usize = usize::MAX;

/// `kqueue` poller.
pub struct KqueuePoller {
    kqueue: RawFd,
    events: Mutex<Vec<kevent>>,
}

// The raw kevent buffer is only reached through the mutex.
unsafe impl Send for KqueuePoller {}
unsafe impl Sync for KqueuePoller {}

fn change(ident: usize, filter: i16, flags: u16, fflags: u32) -> kevent {
    let mut event: kevent = unsafe { std::mem::zeroed() };
    event.ident = ident as _;
    event.filter = filter as _;
    event.flags = flags as _;
    event.fflags = fflags as _;
    event
}

impl KqueuePoller {
    pub fn new() -> io::Result<Self> {
        let kqueue = unsafe { kqueue() };
        if kqueue < 0 {
            return Err(io::Error::last_os_error());
        }

        let poller = KqueuePoller {
            kqueue,
            events: Mutex::new(Vec::new()),
        };

        poller.submit(&[change(
            WAKE_IDENT,
            EVFILT_USER,
            EV_ADD | EV_ENABLE | EV_CLEAR,
            0,
        )])?;

        Ok(poller)
    }

    fn submit(&self, changes: &[kevent]) -> io::Result<()> {
        let rc = unsafe {
            kevent(
                self.kqueue,
                changes.as_ptr(),
                changes.len() as i32,
                ptr::null_mut(),
                0,
                ptr::null(),
            )
        };

        if rc < 0 {
            return Err(io::Error::last_os_error());
        }

        Ok(())
    }
}

impl Poller for KqueuePoller {
    fn register(&self, handle: RawHandle, interest: Interest) -> io::Result<()> {
        let mut changes = Vec::with_capacity(2);
        let flags = EV_ADD | EV_ENABLE | EV_CLEAR;

        if interest.read {
            changes.push(change(handle as usize, EVFILT_READ, flags, 0));
        }
        if interest.write {
            changes.push(change(handle as usize, EVFILT_WRITE, flags, 0));
        }

        self.submit(&changes)
    }

    fn deregister(&self, handle: RawHandle) -> io::Result<()> {
        let mut result = Ok(());
        let mut removed = false;

        for filter in [EVFILT_READ, EVFILT_WRITE] {
            match self.submit(&[change(handle as usize, filter, EV_DELETE, 0)]) {
                Ok(()) => removed = true,
                Err(e) if e.raw_os_error() == Some(libc::ENOENT) => {}
                Err(e) => result = Err(e),
            }
        }

        if result.is_ok() && !removed {
            return Err(io::Error::from_raw_os_error(libc::ENOENT));
        }

        result
    }

    fn poll(&self, ready: &mut ReadySet, timeout: Duration) -> io::Result<usize> {
        ready.clear();

        let ts = libc::timespec {
            tv_sec: timeout.as_secs() as _,
            tv_nsec: timeout.subsec_nanos() as _,
        };

        // Never ask for more events than `ready` can hold: an edge dropped
        // here is not reported again.
        let max_events = ready.capacity().clamp(1, i32::MAX as usize);

        let mut events = self.events.lock();
        events.clear();
        events.reserve(max_events);

        let n = unsafe {
            kevent(
                self.kqueue,
                ptr::null(),
                0,
                events.as_mut_ptr(),
                max_events as i32,
                &ts,
            )
        };

        if n < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                return Ok(0);
            }
            return Err(err);
        }

        unsafe {
            events.set_len(n as usize);
        }

        for ev in events.iter() {
            if ev.filter == EVFILT_USER && ev.ident as usize == WAKE_IDENT {
                continue;
            }

            let handle = ev.ident as RawHandle;
            let failed = ev.flags & (EV_ERROR | EV_EOF) != 0;

            if ev.filter == EVFILT_READ || failed {
                ready.push_read(handle);
            }
            if ev.filter == EVFILT_WRITE || failed {
                ready.push_write(handle);
            }
        }

        Ok(ready.len())
    }

    fn shutdown(&self) {
        let _ = self.submit(&[change(WAKE_IDENT, EVFILT_USER, 0, NOTE_TRIGGER)]);
    }

    fn descriptor(&self) -> Option<RawHandle> {
        Some(self.kqueue)
    }
}

impl Drop for KqueuePoller {
    fn drop(&mut self) {
        unsafe {
            libc::close(self.kqueue);
        }
    }
}
