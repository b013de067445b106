#![forbid(unsafe_code)]

//! Host-driven time.
//!
//! The runtime never reads a wall clock and never blocks. The host advances
//! [`DeterministicClock`] explicitly and asks the [`TimerQueue`] when it next
//! needs to be woken. Native tests drive the same code by advancing the clock
//! by hand, so timing-dependent behavior (throttle windows, load deadlines)
//! is reproducible.

use web_time::Duration;

use crate::loader::ImageKey;

/// Monotonic clock controlled by the host.
#[derive(Debug, Default, Clone)]
pub struct DeterministicClock {
    now: Duration,
}

impl DeterministicClock {
    #[must_use]
    pub const fn new(start: Duration) -> Self {
        Self { now: start }
    }

    #[must_use]
    pub const fn now(&self) -> Duration {
        self.now
    }

    /// Move the clock to `now`. Earlier values are ignored.
    pub fn set(&mut self, now: Duration) {
        self.now = self.now.max(now);
    }

    pub fn advance(&mut self, dt: Duration) {
        self.now = self.now.saturating_add(dt);
    }
}

/// How the host should schedule a wakeup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lane {
    /// A plain timeout.
    Timeout,
    /// Low-priority work; hosts may use an idle callback instead of a timeout.
    Idle,
}

/// Earliest pending wakeup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Wakeup {
    pub at: Duration,
    pub lane: Lane,
}

/// Handle for cancelling a scheduled entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(u64);

/// Deferred runtime work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Task {
    /// First reconcile after startup.
    InitialReconcile,
    /// A navigation has had time to render.
    NavigationSettle,
    /// End of a throttle window with coalesced signals.
    ThrottleTrailing,
    /// Direct image load deadline.
    LoadDeadline(ImageKey),
    /// Privileged proxy round-trip deadline.
    ProxyDeadline(ImageKey),
}

#[derive(Debug, Clone)]
struct Entry<T> {
    id: TimerId,
    due: Duration,
    lane: Lane,
    item: T,
}

/// Pending entries ordered by due time, then by insertion.
#[derive(Debug, Clone)]
pub struct TimerQueue<T> {
    entries: Vec<Entry<T>>,
    next_id: u64,
}

impl<T> Default for TimerQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> TimerQueue<T> {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            entries: Vec::new(),
            next_id: 0,
        }
    }

    /// Schedule `item` to fire at `due`.
    pub fn schedule_at(&mut self, due: Duration, lane: Lane, item: T) -> TimerId {
        let id = TimerId(self.next_id);
        self.next_id += 1;
        // Insert after every entry due at or before `due` so equal deadlines
        // fire in scheduling order.
        let pos = self.entries.partition_point(|entry| entry.due <= due);
        self.entries.insert(
            pos,
            Entry {
                id,
                due,
                lane,
                item,
            },
        );
        id
    }

    /// Remove a pending entry. Returns whether it was still pending.
    pub fn cancel(&mut self, id: TimerId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|entry| entry.id != id);
        self.entries.len() != before
    }

    /// Pop the earliest entry due at or before `now`.
    pub fn pop_due(&mut self, now: Duration) -> Option<T> {
        if self.entries.first().is_some_and(|entry| entry.due <= now) {
            Some(self.entries.remove(0).item)
        } else {
            None
        }
    }

    #[must_use]
    pub fn next_wakeup(&self) -> Option<Wakeup> {
        self.entries.first().map(|entry| Wakeup {
            at: entry.due,
            lane: entry.lane,
        })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
