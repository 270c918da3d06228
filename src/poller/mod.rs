//! Readiness backend abstraction.
//!
//! The engine never detects readiness itself. It delegates to a [`Poller`],
//! which registers handles with an OS notification facility and reports
//! batches of read-ready and write-ready handles.
//!
//! A platform default is selected at compile time:
//! - Linux / Android: edge-triggered `epoll`
//! - macOS / FreeBSD: `kqueue` with `EV_CLEAR`

mod common;

pub use common::{Interest, Poller, RawHandle, ReadySet};

#[cfg(any(target_os = "linux", target_os = "android"))]
mod epoll;

#[cfg(any(target_os = "linux", target_os = "android"))]
pub use epoll::EpollPoller;

#[cfg(any(target_os = "macos", target_os = "ios", target_os = "freebsd"))]
mod kqueue;

#[cfg(any(target_os = "macos", target_os = "ios", target_os = "freebsd"))]
pub use kqueue::KqueuePoller;

/// The default poller for the current platform.
#[cfg(any(target_os = "linux", target_os = "android"))]
pub type DefaultPoller = EpollPoller;

/// The default poller for the current platform.
#[cfg(any(target_os = "macos", target_os = "ios", target_os = "freebsd"))]
pub type DefaultPoller = KqueuePoller;
