//! Linux `epoll`-based poller implementation.
//!
//! Handles are registered edge-triggered: each transition to readable or
//! writable is reported once, which is exactly the hint the poll descriptors
//! expect. The epoll token of a handle is the handle itself.
//!
//! An internal `eventfd` is registered as a persistent wake source so that
//! [`Poller::shutdown`] can interrupt a blocking `epoll_wait()`.

use super::common::{Interest, Poller, RawHandle, ReadySet};

use libc::{
    EPOLL_CLOEXEC, EPOLL_CTL_ADD, EPOLL_CTL_DEL, EPOLLERR, EPOLLET, EPOLLHUP, EPOLLIN, EPOLLOUT,
    EPOLLRDHUP, epoll_create1, epoll_ctl, epoll_event, epoll_wait,
};
use parking_lot::Mutex;
use std::io;
use std::os::fd::RawFd;
use std::time::Duration;

/// Reserved token used internally for the wake-up event.
///
/// Handles are non-negative, so `u64::MAX` can never collide with one.
const WAKE_TOKEN: u64 = u64::MAX;

/// Linux `epoll` poller.
///
/// This poller owns:
/// - an `epoll` instance,
/// - an internal `eventfd` used as a wake-up signal,
/// - a reusable event buffer, only touched by the polling thread.
pub struct EpollPoller {
    /// Epoll file descriptor.
    epoll: RawFd,

    /// Eventfd written by `shutdown` to interrupt `epoll_wait`.
    eventfd: RawFd,

    /// Reusable buffer for epoll events.
    events: Mutex<Vec<epoll_event>>,
}

// The raw epoll buffer is only reached through the mutex.
unsafe impl Send for EpollPoller {}
unsafe impl Sync for EpollPoller {}

impl EpollPoller {
    /// Create a new `EpollPoller`.
    ///
    /// This:
    /// - creates the epoll instance,
    /// - creates a non-blocking `eventfd`,
    /// - registers the eventfd into epoll as a persistent wake source.
    pub fn new() -> io::Result<Self> {
        let epoll = unsafe { epoll_create1(EPOLL_CLOEXEC) };
        if epoll < 0 {
            return Err(io::Error::last_os_error());
        }

        let eventfd = unsafe { libc::eventfd(0, libc::EFD_NONBLOCK | libc::EFD_CLOEXEC) };
        if eventfd < 0 {
            let error = io::Error::last_os_error();
            unsafe { libc::close(epoll) };
            return Err(error);
        }

        let mut event = epoll_event {
            events: EPOLLIN as u32,
            u64: WAKE_TOKEN,
        };

        let rc = unsafe { epoll_ctl(epoll, EPOLL_CTL_ADD, eventfd, &mut event) };
        if rc < 0 {
            let error = io::Error::last_os_error();
            unsafe {
                libc::close(eventfd);
                libc::close(epoll);
            }
            return Err(error);
        }

        Ok(Self {
            epoll,
            eventfd,
            events: Mutex::new(Vec::new()),
        })
    }

    fn drain_wake(&self) {
        let mut buf = 0u64;
        unsafe {
            libc::read(self.eventfd, &mut buf as *mut _ as *mut _, 8);
        }
    }
}

impl Poller for EpollPoller {
    fn register(&self, handle: RawHandle, interest: Interest) -> io::Result<()> {
        let mut flags = EPOLLET;

        if interest.read {
            flags |= EPOLLIN | EPOLLRDHUP;
        }
        if interest.write {
            flags |= EPOLLOUT;
        }
        // EPOLLERR and EPOLLHUP are always reported; asking is harmless.
        if interest.error {
            flags |= EPOLLERR | EPOLLHUP;
        }

        let mut event = epoll_event {
            events: flags as u32,
            u64: handle as u64,
        };

        let rc = unsafe { epoll_ctl(self.epoll, EPOLL_CTL_ADD, handle, &mut event) };
        if rc < 0 {
            return Err(io::Error::last_os_error());
        }

        Ok(())
    }

    fn deregister(&self, handle: RawHandle) -> io::Result<()> {
        let rc = unsafe { epoll_ctl(self.epoll, EPOLL_CTL_DEL, handle, std::ptr::null_mut()) };
        if rc < 0 {
            return Err(io::Error::last_os_error());
        }

        Ok(())
    }

    fn poll(&self, ready: &mut ReadySet, timeout: Duration) -> io::Result<usize> {
        ready.clear();

        // Never ask for more events than `ready` can hold: an edge dropped
        // here is not reported again.
        let max_events = ready.capacity().clamp(1, i32::MAX as usize);

        let mut events = self.events.lock();
        events.clear();
        events.reserve(max_events);

        let n = unsafe {
            epoll_wait(
                self.epoll,
                events.as_mut_ptr(),
                max_events as i32,
                timeout_ms(timeout),
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
            let token = ev.u64;
            let flags = ev.events;

            // Wake-up event
            if token == WAKE_TOKEN {
                self.drain_wake();
                continue;
            }

            let handle = token as RawHandle;

            if flags & ((EPOLLIN | EPOLLRDHUP | EPOLLERR | EPOLLHUP) as u32) != 0 {
                ready.push_read(handle);
            }
            if flags & ((EPOLLOUT | EPOLLERR | EPOLLHUP) as u32) != 0 {
                ready.push_write(handle);
            }
        }

        Ok(ready.len())
    }

    fn shutdown(&self) {
        let buf: u64 = 1;
        unsafe {
            libc::write(self.eventfd, &buf as *const _ as *const _, 8);
        }
    }

    fn descriptor(&self) -> Option<RawHandle> {
        Some(self.epoll)
    }
}

impl Drop for EpollPoller {
    fn drop(&mut self) {
        unsafe {
            libc::close(self.eventfd);
            libc::close(self.epoll);
        }
    }
}

/// Converts a timeout to `epoll_wait` milliseconds, rounding up so that a
/// sub-millisecond timeout does not turn into a busy poll.
fn timeout_ms(timeout: Duration) -> i32 {
    let millis = timeout.as_nanos().div_ceil(1_000_000);
    millis.min(i32::MAX as u128) as i32
}
