//! Time sources for scheduling.
//!
//! The scheduler only ever asks a clock two things: the current time in
//! nanoseconds, and to block until a given time. On a production host the
//! clock is expected to be PTP-disciplined (the NIC or a daemon steering the
//! system clock); this crate does not acquire PTP itself.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// A monotonic-enough nanosecond clock shared by schedulers and providers.
pub trait PtpClock: Send + Sync {
    /// Current time in nanoseconds since the PTP epoch.
    fn now_ns(&self) -> u64;

    /// Block the calling thread until `deadline_ns`. Returns immediately if
    /// the deadline has passed.
    fn sleep_until_ns(&self, deadline_ns: u64) {
        let now = self.now_ns();
        if deadline_ns > now {
            std::thread::sleep(Duration::from_nanos(deadline_ns - now));
        }
    }
}

/// System clock, assumed steered by PTP (e.g. `phc2sys`).
///
/// Uses `SystemTime` rather than `Instant` so that timestamps are comparable
/// across processes and hosts on the same PTP domain.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl PtpClock for SystemClock {
    fn now_ns(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(0)
    }
}

/// Manually advanced clock for deterministic scheduler tests and simulation.
///
/// `sleep_until_ns` jumps time forward instead of blocking, so a scheduler
/// iteration that would span a frame interval in real time completes
/// instantly under test. An optional auto-step advances time on every
/// `now_ns` query to keep polling loops finite.
#[derive(Debug)]
pub struct ManualClock {
    now_ns: AtomicU64,
    auto_step_ns: u64,
}

impl ManualClock {
    /// Clock frozen at `start_ns`; advances only via [`advance`](Self::advance)
    /// and `sleep_until_ns`.
    pub fn new(start_ns: u64) -> Self {
        Self {
            now_ns: AtomicU64::new(start_ns),
            auto_step_ns: 0,
        }
    }

    /// Clock that additionally advances `step_ns` on every `now_ns` call.
    pub fn with_auto_step(start_ns: u64, step_ns: u64) -> Self {
        Self {
            now_ns: AtomicU64::new(start_ns),
            auto_step_ns: step_ns,
        }
    }

    /// Advance time by `delta_ns`.
    pub fn advance(&self, delta_ns: u64) {
        self.now_ns.fetch_add(delta_ns, Ordering::SeqCst);
    }
}

impl PtpClock for ManualClock {
    fn now_ns(&self) -> u64 {
        if self.auto_step_ns > 0 {
            self.now_ns.fetch_add(self.auto_step_ns, Ordering::SeqCst) + self.auto_step_ns
        } else {
            self.now_ns.load(Ordering::SeqCst)
        }
    }

    fn sleep_until_ns(&self, deadline_ns: u64) {
        // Jump instead of blocking; never move time backwards.
        let _ = self
            .now_ns
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |now| {
                Some(now.max(deadline_ns))
            });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_advances() {
        let c = ManualClock::new(1_000);
        assert_eq!(c.now_ns(), 1_000);
        c.advance(500);
        assert_eq!(c.now_ns(), 1_500);
    }

    #[test]
    fn manual_sleep_jumps_forward_only() {
        let c = ManualClock::new(2_000);
        c.sleep_until_ns(5_000);
        assert_eq!(c.now_ns(), 5_000);
        c.sleep_until_ns(1_000);
        assert_eq!(c.now_ns(), 5_000);
    }

    #[test]
    fn auto_step_moves_on_query() {
        let c = ManualClock::with_auto_step(0, 100);
        let a = c.now_ns();
        let b = c.now_ns();
        assert!(b > a);
    }

    #[test]
    fn system_clock_is_nonzero() {
        assert!(SystemClock.now_ns() > 0);
    }
}
