//! A tiny monotonic clock abstraction.
//!
//! The crate never reads a clock itself: every call that can arm or poll a
//! timer takes an [`Instant`] supplied by the caller. This keeps the crate
//! `no_std`/`no_alloc` and usable from a bare polling loop, a hardware timer
//! interrupt, or an async executor, without committing to any of them.

use core::ops::Add;

/// A point in time, expressed as a millisecond count since an arbitrary epoch
/// chosen by the caller. Only differences between two `Instant`s are
/// meaningful.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Instant(u64);

impl Instant {
    /// Construct an `Instant` from a millisecond count.
    pub const fn from_millis(millis: u64) -> Self {
        Self(millis)
    }

    /// The millisecond count this `Instant` was constructed from.
    pub const fn as_millis(&self) -> u64 {
        self.0
    }
}

impl Add<Duration> for Instant {
    type Output = Instant;

    fn add(self, rhs: Duration) -> Instant {
        Instant(self.0.saturating_add(rhs.0))
    }
}

/// A span of time, in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Duration(u64);

impl Duration {
    /// Construct a `Duration` from a millisecond count.
    pub const fn from_millis(millis: u64) -> Self {
        Self(millis)
    }

    /// Construct a `Duration` from a second count.
    pub const fn from_secs(secs: u64) -> Self {
        Self(secs * 1000)
    }
}

/// A single deadline, armed against a caller-supplied [`Instant`].
///
/// This is the one primitive every named timer in the LCP/IPCP/PAP state
/// machines (Configure-Request retransmit, Terminate-Request retransmit,
/// Echo-Request, Stopping) is built from.
#[derive(Debug, Clone, Copy, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub(crate) struct Timer {
    deadline: Option<Instant>,
}

impl Timer {
    pub const fn new() -> Self {
        Self { deadline: None }
    }

    /// Arm the timer to fire `duration` after `now`.
    pub fn arm(&mut self, now: Instant, duration: Duration) {
        self.deadline = Some(now + duration);
    }

    /// Disarm the timer. Idempotent.
    pub fn cancel(&mut self) {
        self.deadline = None;
    }

    pub fn is_armed(&self) -> bool {
        self.deadline.is_some()
    }

    /// Returns `true` the first time `now` reaches the armed deadline, and
    /// disarms the timer. Returns `false` if the timer isn't armed or hasn't
    /// reached its deadline yet.
    pub fn poll(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(deadline) if now >= deadline => {
                self.deadline = None;
                true
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fires_once() {
        let mut t = Timer::new();
        assert!(!t.poll(Instant::from_millis(0)));
        t.arm(Instant::from_millis(0), Duration::from_secs(3));
        assert!(!t.poll(Instant::from_millis(2999)));
        assert!(t.poll(Instant::from_millis(3000)));
        // fired: now disarmed, further polls at any time are false.
        assert!(!t.poll(Instant::from_millis(999_999)));
    }

    #[test]
    fn cancel_disarms() {
        let mut t = Timer::new();
        t.arm(Instant::from_millis(0), Duration::from_secs(1));
        t.cancel();
        assert!(!t.poll(Instant::from_millis(10_000)));
    }
}
