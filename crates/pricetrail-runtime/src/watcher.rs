#![forbid(unsafe_code)]

//! Page-change detection.
//!
//! Two kinds of host signal mean the page may show a different product:
//! structural mutations (the page rewriting itself during a soft navigation)
//! and navigations (a programmatic history push, or back/forward). The
//! watcher only decides *when* to reconcile; applying the change is the
//! controller's job.
//!
//! Mutations arrive in bursts of hundreds and go through a
//! [`LeadingEdgeThrottle`]. Navigations first wait a short settle delay so
//! the new content has rendered, then enter the same throttle.

use web_time::Duration;

use crate::throttle::{LeadingEdgeThrottle, ThrottleDecision};

/// A page change reported by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageSignal {
    /// The document's subtree changed.
    Mutation,
    /// The page pushed a history entry.
    HistoryPush,
    /// Back/forward navigation.
    HistoryPop,
}

impl PageSignal {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Mutation => "mutation",
            Self::HistoryPush => "history_push",
            Self::HistoryPop => "history_pop",
        }
    }

    #[must_use]
    pub const fn is_navigation(self) -> bool {
        matches!(self, Self::HistoryPush | Self::HistoryPop)
    }
}

/// What the runtime should do in response to a signal or timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchDecision {
    ReconcileNow,
    /// Schedule a settle wakeup after the given delay.
    ScheduleSettle { after: Duration },
    /// Schedule the throttle's trailing wakeup.
    ScheduleTrailing { at: Duration },
    Coalesced,
}

/// Counters for tests and diagnostics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WatcherStats {
    pub mutations: u64,
    pub navigations: u64,
    pub coalesced: u64,
    pub triggers: u64,
}

#[derive(Debug, Clone)]
pub struct ChangeWatcher {
    throttle: LeadingEdgeThrottle,
    settle: Duration,
    stats: WatcherStats,
}

impl ChangeWatcher {
    #[must_use]
    pub fn new(window: Duration, settle: Duration) -> Self {
        Self {
            throttle: LeadingEdgeThrottle::new(window),
            settle,
            stats: WatcherStats::default(),
        }
    }

    #[must_use]
    pub const fn stats(&self) -> WatcherStats {
        self.stats
    }

    pub fn on_signal(&mut self, signal: PageSignal, now: Duration) -> WatchDecision {
        if signal.is_navigation() {
            self.stats.navigations += 1;
            tracing::debug!(
                target: "pricetrail.watcher",
                signal = signal.as_str(),
                settle_ms = self.settle.as_millis() as u64,
                "navigation observed"
            );
            return WatchDecision::ScheduleSettle { after: self.settle };
        }
        self.stats.mutations += 1;
        self.throttled(now)
    }

    /// The settle delay after a navigation elapsed.
    pub fn on_settled(&mut self, now: Duration) -> WatchDecision {
        self.throttled(now)
    }

    /// The trailing wakeup fired. Returns whether to reconcile.
    pub fn on_trailing(&mut self, now: Duration) -> bool {
        let fire = self.throttle.trailing_elapsed(now);
        if fire {
            self.stats.triggers += 1;
            tracing::trace!(target: "pricetrail.watcher", "trailing reconcile");
        }
        fire
    }

    fn throttled(&mut self, now: Duration) -> WatchDecision {
        match self.throttle.signal(now) {
            ThrottleDecision::FireNow => {
                self.stats.triggers += 1;
                WatchDecision::ReconcileNow
            }
            ThrottleDecision::ScheduleTrailing { at } => WatchDecision::ScheduleTrailing { at },
            ThrottleDecision::Coalesced => {
                self.stats.coalesced += 1;
                WatchDecision::Coalesced
            }
        }
    }
}
