#![forbid(unsafe_code)]

//! Work handed back to the host.
//!
//! The runtime cannot observe the viewport or post messages on its own.
//! Instead it queues [`HostCommand`]s which the host drains after every
//! call, and keeps its timers in a [`TimerQueue`] the host services through
//! [`Effects::next_wakeup`].

use pricetrail_core::ProxyRequest;
use web_time::Duration;

use crate::timer::{DeterministicClock, Lane, Task, TimerId, TimerQueue, Wakeup};

/// Correlates a proxy request with its response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProxyRequestId(pub u64);

/// Instruction for the host environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostCommand<N> {
    /// Start watching `node` for viewport intersection.
    Observe { node: N, root_margin: String },
    /// Stop watching `node`.
    Unobserve { node: N },
    /// Send `request` to the privileged context and report the outcome
    /// with the same `id`.
    SendProxy {
        id: ProxyRequestId,
        request: ProxyRequest,
    },
}

/// Clock, timers and the host command outbox.
#[derive(Debug, Clone)]
pub struct Effects<N> {
    clock: DeterministicClock,
    timers: TimerQueue<Task>,
    commands: Vec<HostCommand<N>>,
}

impl<N> Effects<N> {
    #[must_use]
    pub fn new(start: Duration) -> Self {
        Self {
            clock: DeterministicClock::new(start),
            timers: TimerQueue::new(),
            commands: Vec::new(),
        }
    }

    #[must_use]
    pub fn now(&self) -> Duration {
        self.clock.now()
    }

    pub fn set_time(&mut self, now: Duration) {
        self.clock.set(now);
    }

    pub fn schedule_after(&mut self, delay: Duration, lane: Lane, task: Task) -> TimerId {
        let due = self.clock.now().saturating_add(delay);
        self.timers.schedule_at(due, lane, task)
    }

    pub fn schedule_at(&mut self, due: Duration, lane: Lane, task: Task) -> TimerId {
        self.timers.schedule_at(due, lane, task)
    }

    pub fn cancel(&mut self, id: TimerId) -> bool {
        self.timers.cancel(id)
    }

    pub fn pop_due(&mut self) -> Option<Task> {
        let now = self.clock.now();
        self.timers.pop_due(now)
    }

    #[must_use]
    pub fn next_wakeup(&self) -> Option<Wakeup> {
        self.timers.next_wakeup()
    }

    pub fn emit(&mut self, command: HostCommand<N>) {
        self.commands.push(command);
    }

    pub fn drain_commands(&mut self) -> impl Iterator<Item = HostCommand<N>> + '_ {
        self.commands.drain(..)
    }

    #[must_use]
    pub fn pending_commands(&self) -> &[HostCommand<N>] {
        &self.commands
    }
}
