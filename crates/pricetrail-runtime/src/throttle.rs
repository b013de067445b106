#![forbid(unsafe_code)]

//! Leading-edge throttle with one trailing call.
//!
//! The first signal in a quiet period fires immediately. Signals inside the
//! window that follows are coalesced into exactly one trailing fire when the
//! window ends, so the last page state is always reconciled even when it
//! changed mid-burst.
//!
//! ```
//! use pricetrail_runtime::throttle::{LeadingEdgeThrottle, ThrottleDecision};
//! use std::time::Duration;
//!
//! let ms = Duration::from_millis;
//! let mut throttle = LeadingEdgeThrottle::new(ms(250));
//!
//! assert_eq!(throttle.signal(ms(0)), ThrottleDecision::FireNow);
//! assert_eq!(throttle.signal(ms(10)), ThrottleDecision::ScheduleTrailing { at: ms(250) });
//! assert_eq!(throttle.signal(ms(20)), ThrottleDecision::Coalesced);
//! assert!(throttle.trailing_elapsed(ms(250)));
//! ```

use web_time::Duration;

/// What the caller should do with one signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThrottleDecision {
    /// Run now.
    FireNow,
    /// Arrange for [`LeadingEdgeThrottle::trailing_elapsed`] to be called at `at`.
    ScheduleTrailing { at: Duration },
    /// A trailing fire is already pending.
    Coalesced,
}

/// Leading-edge throttle state. Not thread-safe; one event loop owns it.
#[derive(Debug, Clone)]
pub struct LeadingEdgeThrottle {
    window: Duration,
    last_fire: Option<Duration>,
    trailing_due: Option<Duration>,
}

impl LeadingEdgeThrottle {
    #[must_use]
    pub const fn new(window: Duration) -> Self {
        Self {
            window,
            last_fire: None,
            trailing_due: None,
        }
    }

    #[must_use]
    pub const fn window(&self) -> Duration {
        self.window
    }

    /// Whether a trailing fire is pending.
    #[must_use]
    pub const fn has_trailing(&self) -> bool {
        self.trailing_due.is_some()
    }

    pub fn signal(&mut self, now: Duration) -> ThrottleDecision {
        if self.trailing_due.is_some() {
            return ThrottleDecision::Coalesced;
        }
        match self.last_fire {
            Some(last) if now.saturating_sub(last) < self.window => {
                let at = last + self.window;
                self.trailing_due = Some(at);
                ThrottleDecision::ScheduleTrailing { at }
            }
            _ => {
                self.last_fire = Some(now);
                ThrottleDecision::FireNow
            }
        }
    }

    /// The trailing deadline passed. Returns whether the caller should fire.
    pub fn trailing_elapsed(&mut self, now: Duration) -> bool {
        if self.trailing_due.take().is_some() {
            self.last_fire = Some(now);
            true
        } else {
            false
        }
    }
}
