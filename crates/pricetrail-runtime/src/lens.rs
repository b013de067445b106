#![forbid(unsafe_code)]

//! The host-facing orchestrator.
//!
//! [`PriceLens`] owns the document handle and every runtime component. The
//! host calls it for three things:
//!
//! 1. **Events**: page signals, viewport intersections, image load/error and
//!    proxy replies. Call [`PriceLens::advance_to`] with the current time
//!    first so the callback sees an up-to-date clock.
//! 2. **Time**: [`PriceLens::advance_to`] runs every wakeup that is due;
//!    [`PriceLens::next_wakeup`] says when to call it again.
//! 3. **Commands**: after each call, [`PriceLens::drain_commands`] yields the
//!    observer and proxy work the host must perform.
//!
//! Callbacks never fail. Problems are logged and the page is left as it is.

use pricetrail_core::{ConfigError, Document, LensConfig, ProcessGuard, ProxyResponse};
use web_time::Duration;

use crate::controller::{PanelState, ReconcileOutcome, RenderController};
use crate::effects::{Effects, HostCommand, ProxyRequestId};
use crate::loader::{AssetState, LazyAssetLoader, LoaderSettings};
use crate::timer::{Lane, Task, Wakeup};
use crate::watcher::{ChangeWatcher, PageSignal, WatchDecision, WatcherStats};

/// What the host environment can do beyond the page itself.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HostCapabilities {
    /// A privileged context can fetch images on our behalf.
    pub privileged_proxy: bool,
}

/// Startup failures.
#[derive(Debug, thiserror::Error)]
pub enum LensError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
    /// Another instance already owns this document.
    #[error("document already claimed (attribute `{attribute}` is set)")]
    GuardConflict { attribute: String },
}

/// Reconcile counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LensStats {
    pub reconciles: u64,
    pub rendered: u64,
    pub cleared: u64,
    pub unchanged: u64,
}

#[derive(Debug)]
pub struct PriceLens<D: Document> {
    doc: D,
    controller: RenderController<D::Node>,
    loader: LazyAssetLoader<D::Node>,
    watcher: ChangeWatcher,
    fx: Effects<D::Node>,
    stats: LensStats,
}

impl<D: Document> PriceLens<D> {
    /// Validate `config`, claim the document and queue the first reconcile.
    ///
    /// On [`LensError::GuardConflict`] the document has not been touched.
    pub fn start(
        mut doc: D,
        config: LensConfig,
        caps: HostCapabilities,
        now: Duration,
    ) -> Result<Self, LensError> {
        let config = config.validated()?;
        let guard = ProcessGuard::new(config.guard_attribute.clone());
        if !guard.try_acquire(&mut doc) {
            return Err(LensError::GuardConflict {
                attribute: config.guard_attribute,
            });
        }

        let loader = LazyAssetLoader::new(LoaderSettings {
            root_margin: config.root_margin(),
            load_deadline: config.load_deadline(),
            proxy_deadline: config.proxy_deadline(),
            proxy_available: config.proxy_fallback && caps.privileged_proxy,
        });
        let watcher = ChangeWatcher::new(config.throttle_window(), config.navigation_settle());
        let mut lens = Self {
            doc,
            controller: RenderController::new(config),
            loader,
            watcher,
            fx: Effects::new(now),
            stats: LensStats::default(),
        };

        let stray = lens
            .controller
            .remove_panels(&mut lens.doc, &mut lens.loader, &mut lens.fx);
        lens.fx
            .schedule_after(Duration::ZERO, Lane::Idle, Task::InitialReconcile);
        tracing::info!(
            target: "pricetrail.controller",
            host = %lens.doc.hostname(),
            proxy = lens.loader.settings().proxy_available,
            stray,
            "started"
        );
        Ok(lens)
    }

    #[must_use]
    pub fn document(&self) -> &D {
        &self.doc
    }

    pub fn document_mut(&mut self) -> &mut D {
        &mut self.doc
    }

    #[must_use]
    pub fn config(&self) -> &LensConfig {
        self.controller.config()
    }

    #[must_use]
    pub fn now(&self) -> Duration {
        self.fx.now()
    }

    #[must_use]
    pub fn stats(&self) -> LensStats {
        self.stats
    }

    #[must_use]
    pub fn watcher_stats(&self) -> WatcherStats {
        self.watcher.stats()
    }

    #[must_use]
    pub fn panel(&self) -> Option<&PanelState<D::Node>> {
        self.controller.panel()
    }

    #[must_use]
    pub fn asset_state(&self, image: &D::Node) -> Option<AssetState> {
        self.loader.state(image)
    }

    #[must_use]
    pub fn primary_attempts(&self, image: &D::Node) -> u32 {
        self.loader.primary_attempts(image)
    }

    /// A structural change or navigation happened.
    pub fn on_signal(&mut self, signal: PageSignal) {
        let decision = self.watcher.on_signal(signal, self.fx.now());
        self.apply(decision);
    }

    pub fn on_intersection(&mut self, image: &D::Node) {
        self.loader
            .on_intersection(&mut self.doc, &mut self.fx, image);
    }

    pub fn on_image_load(&mut self, image: &D::Node) {
        self.loader.on_load(&mut self.doc, &mut self.fx, image);
    }

    pub fn on_image_error(&mut self, image: &D::Node) {
        self.loader.on_error(&mut self.doc, &mut self.fx, image);
    }

    pub fn on_proxy_response(&mut self, id: ProxyRequestId, response: &ProxyResponse) {
        self.loader
            .on_proxy_response(&mut self.doc, &mut self.fx, id, response);
    }

    /// The proxy message for `id` could not be delivered.
    pub fn on_proxy_failure(&mut self, id: ProxyRequestId) {
        tracing::debug!(target: "pricetrail.proxy", request = id.0, "proxy unavailable");
        self.loader
            .on_proxy_failure(&mut self.doc, &mut self.fx, id);
    }

    /// Move the clock to `now` and run every wakeup due by then, in order.
    pub fn advance_to(&mut self, now: Duration) {
        self.fx.set_time(now);
        while let Some(task) = self.fx.pop_due() {
            self.run(task);
        }
    }

    #[must_use]
    pub fn next_wakeup(&self) -> Option<Wakeup> {
        self.fx.next_wakeup()
    }

    pub fn drain_commands(&mut self) -> impl Iterator<Item = HostCommand<D::Node>> + '_ {
        self.fx.drain_commands()
    }

    /// Reconcile immediately, bypassing the throttle.
    pub fn reconcile_now(&mut self) -> ReconcileOutcome {
        let outcome = self
            .controller
            .reconcile(&mut self.doc, &mut self.loader, &mut self.fx);
        self.stats.reconciles += 1;
        match outcome {
            ReconcileOutcome::Rendered { .. } => self.stats.rendered += 1,
            ReconcileOutcome::Cleared { .. } => self.stats.cleared += 1,
            ReconcileOutcome::Unchanged(_) => self.stats.unchanged += 1,
            ReconcileOutcome::NoAnchor(_) | ReconcileOutcome::BuildFailed(_) => {}
        }
        tracing::debug!(
            target: "pricetrail.controller",
            outcome = outcome.as_str(),
            at_ms = self.fx.now().as_millis() as u64,
            "reconcile"
        );
        outcome
    }

    fn run(&mut self, task: Task) {
        match task {
            Task::InitialReconcile => {
                self.reconcile_now();
            }
            Task::NavigationSettle => {
                let decision = self.watcher.on_settled(self.fx.now());
                self.apply(decision);
            }
            Task::ThrottleTrailing => {
                if self.watcher.on_trailing(self.fx.now()) {
                    self.reconcile_now();
                }
            }
            Task::LoadDeadline(key) => self.loader.on_deadline(&mut self.doc, &mut self.fx, key),
            Task::ProxyDeadline(key) => self.loader.on_proxy_deadline(&mut self.doc, key),
        }
    }

    fn apply(&mut self, decision: WatchDecision) {
        match decision {
            WatchDecision::ReconcileNow => {
                self.reconcile_now();
            }
            WatchDecision::ScheduleSettle { after } => {
                self.fx
                    .schedule_after(after, Lane::Timeout, Task::NavigationSettle);
            }
            WatchDecision::ScheduleTrailing { at } => {
                self.fx
                    .schedule_at(at, Lane::Timeout, Task::ThrottleTrailing);
            }
            WatchDecision::Coalesced => {}
        }
    }
}
