//! Monotonic deadlines.
//!
//! Every timer named in §5 (`Timer_Poll`, `Timer_Poll_Prohibit`,
//! `Timer_RST`, `Inactivity.Release`, ...) is a deadline checked the next
//! time its owning state machine runs — there is no preemption, no timer
//! thread, no callback. [`Deadline`] is the one primitive all of them share.

use std::time::{Duration, Instant};

/// A single-shot or restartable deadline, checked by polling.
///
/// `Deadline` never spawns anything and never wakes anyone up; the owning
/// state machine calls [`Deadline::expired`] whenever it next gets to run
/// (a PDU arrives, a TTI ticks, a sweep fires) and acts on the result.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    armed_at: Option<Instant>,
    period: Duration,
}

impl Deadline {
    /// Builds a deadline with the given period, not yet armed.
    pub const fn new(period: Duration) -> Self {
        Self {
            armed_at: None,
            period,
        }
    }

    /// Arms (or re-arms) the deadline starting from `now`.
    pub fn start(&mut self, now: Instant) {
        self.armed_at = Some(now);
    }

    /// Disarms the deadline; [`expired`](Self::expired) returns `false`
    /// until [`start`](Self::start) is called again.
    pub fn cancel(&mut self) {
        self.armed_at = None;
    }

    pub fn is_armed(&self) -> bool {
        self.armed_at.is_some()
    }

    /// True once `period` has elapsed since the last `start`. A disarmed
    /// deadline never expires.
    pub fn expired(&self, now: Instant) -> bool {
        match self.armed_at {
            Some(at) => now.saturating_duration_since(at) >= self.period,
            None => false,
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn set_period(&mut self, period: Duration) {
        self.period = period;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disarmed_never_expires() {
        let d = Deadline::new(Duration::from_millis(10));
        assert!(!d.expired(Instant::now()));
    }

    #[test]
    fn expires_after_period() {
        let mut d = Deadline::new(Duration::from_millis(5));
        let t0 = Instant::now();
        d.start(t0);
        assert!(!d.expired(t0));
        assert!(d.expired(t0 + Duration::from_millis(6)));
    }

    #[test]
    fn cancel_disarms() {
        let mut d = Deadline::new(Duration::from_millis(1));
        let t0 = Instant::now();
        d.start(t0);
        d.cancel();
        assert!(!d.expired(t0 + Duration::from_secs(1)));
    }
}
