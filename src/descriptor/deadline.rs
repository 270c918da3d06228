use crate::timer::TimerHandle;

use std::time::{Duration, Instant};

/// Deadline state of one direction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Deadline {
    /// No deadline: waits block until readiness or unblock.
    None,

    /// Active deadline expiring at the given instant.
    At(Instant),

    /// The deadline has passed. Sticky until a new deadline is set.
    Expired,
}

impl Deadline {
    /// Deadline `timeout` from now. Zero clears; an instant too far away to
    /// represent is treated as no deadline.
    pub(crate) fn after(timeout: Duration) -> Self {
        if timeout.is_zero() {
            return Deadline::None;
        }

        Instant::now()
            .checked_add(timeout)
            .map_or(Deadline::None, Deadline::At)
    }

    /// Absolute deadline. An instant already reached is expired at once.
    pub(crate) fn at(instant: Option<Instant>) -> Self {
        match instant {
            None => Deadline::None,
            Some(at) if at <= Instant::now() => Deadline::Expired,
            Some(at) => Deadline::At(at),
        }
    }

    pub(crate) fn active(self) -> Option<Instant> {
        match self {
            Deadline::At(at) => Some(at),
            _ => None,
        }
    }

    pub(crate) fn is_expired(self) -> bool {
        self == Deadline::Expired
    }
}

/// Timers currently armed for a descriptor.
///
/// Equal read and write deadlines share one combined timer; otherwise each
/// direction owns its slot.
#[derive(Debug)]
pub(crate) enum ArmedTimers {
    None,
    Combined(TimerHandle),
    Split {
        read: Option<TimerHandle>,
        write: Option<TimerHandle>,
    },
}

impl ArmedTimers {
    /// Cancels and releases every armed timer.
    pub(crate) fn stop_all(&mut self) {
        match std::mem::replace(self, ArmedTimers::None) {
            ArmedTimers::None => {}
            ArmedTimers::Combined(timer) => {
                timer.stop();
            }
            ArmedTimers::Split { read, write } => {
                for timer in read.into_iter().chain(write) {
                    timer.stop();
                }
            }
        }
    }

    /// Releases the slot of a timer that just fired.
    ///
    /// Returns `false` if no timer matching `(read, write)` is armed.
    pub(crate) fn release(&mut self, read: bool, write: bool) -> bool {
        match self {
            ArmedTimers::Combined(_) if read && write => {
                *self = ArmedTimers::None;
                true
            }
            ArmedTimers::Split { read: slot, .. } if read && !write => slot.take().is_some(),
            ArmedTimers::Split { write: slot, .. } if write && !read => slot.take().is_some(),
            _ => false,
        }
    }

    #[cfg(test)]
    pub(crate) fn is_combined(&self) -> bool {
        matches!(self, ArmedTimers::Combined(_))
    }

    /// Number of live timer handles.
    #[cfg(test)]
    pub(crate) fn count(&self) -> usize {
        match self {
            ArmedTimers::None => 0,
            ArmedTimers::Combined(_) => 1,
            ArmedTimers::Split { read, write } => {
                usize::from(read.is_some()) + usize::from(write.is_some())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_timeout_clears() {
        assert_eq!(Deadline::after(Duration::ZERO), Deadline::None);
        assert!(Deadline::after(Duration::from_secs(1)).active().is_some());
    }

    #[test]
    fn test_huge_timeout_is_no_deadline() {
        assert_eq!(Deadline::after(Duration::MAX), Deadline::None);
    }

    #[test]
    fn test_past_instant_is_expired() {
        let past = Instant::now() - Duration::from_millis(1);
        assert!(Deadline::at(Some(past)).is_expired());
        assert_eq!(Deadline::at(None), Deadline::None);
    }
}
