//! Readiness-based blocking I/O for non-blocking sockets.
//!
//! A [`PollEngine`] watches registered socket handles through an OS
//! readiness facility (edge-triggered `epoll` on Linux, `kqueue` elsewhere)
//! and turns readiness into wakeups on per-handle [`PollDescriptor`]s.
//! Transport code keeps its sockets non-blocking and parks on the
//! descriptor whenever an operation would block:
//!
//! ```rust,ignore
//! let engine = netpoll::PollEngine::init()?;
//! let pd = engine.open(fd)?;
//!
//! pd.set_deadline(Duration::from_secs(5), Direction::Read);
//! pd.reset(Direction::Read)?;
//! while let Err(e) = socket.read(&mut buf) {
//!     if e.kind() != io::ErrorKind::WouldBlock {
//!         return Err(e);
//!     }
//!     pd.wait(Direction::Read)?;
//! }
//! ```
//!
//! Read and write deadlines are tracked per descriptor and delivered by a
//! dedicated timer thread. [`PollDescriptor::unblock`] releases every waiter
//! before the socket is closed.

mod descriptor;
mod engine;
mod error;
mod timer;

pub mod poller;

pub use descriptor::{Direction, PollDescriptor};
pub use engine::{EngineBuilder, PollEngine};
pub use error::{Error, Result};
