#![forbid(unsafe_code)]

//! Lazy chart loading with a privileged fallback.
//!
//! Each attached image walks a forward-only state machine:
//!
//! ```text
//! Pending -> Observing -> Loading -> Loaded(Direct)
//!                            |
//!                            v
//!                  PrimaryFailed(Error | Timeout)
//!                     |                 |
//!                     v                 v
//!            FallbackRequested     FailedFinal(NoProxy)
//!              |            |
//!              v            v
//!       Loaded(Proxy)   FailedFinal(ProxyRejected | ProxyTimeout | ProxyUnavailable)
//! ```
//!
//! Loading starts on the first viewport intersection only; the observer is
//! released before `src` is assigned so a second intersection can never
//! start a second load. Outcomes are visible only on the image itself:
//! `data-asset-state` mirrors the state, a loaded image becomes opaque and
//! loses `data-src`, and a final failure drops `src` so the surrounding link
//! degrades to its alt text.
//!
//! Images that are forgotten (their panel was torn down) simply stop being
//! tracked. A load still in flight for them completes on a detached element
//! and has no visible effect.

use pricetrail_core::Document;
use pricetrail_core::ProxyRequest;
use pricetrail_core::ProxyResponse;
use pricetrail_core::panel::{ASSET_STATE_ATTRIBUTE, DEFERRED_SRC_ATTRIBUTE, LOADED_OPACITY};
use web_time::Duration;

use crate::effects::{Effects, HostCommand, ProxyRequestId};
use crate::timer::{Lane, Task, TimerId};

/// Identity of one attached image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ImageKey(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadPath {
    Direct,
    Proxy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrimaryFailure {
    Error,
    Timeout,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinalFailure {
    /// No privileged context, or the fallback is disabled.
    NoProxy,
    /// The proxy answered without usable image data.
    ProxyRejected,
    /// The proxy did not answer before its deadline.
    ProxyTimeout,
    /// The message could not be delivered.
    ProxyUnavailable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetState {
    Pending,
    Observing,
    Loading,
    Loaded(LoadPath),
    PrimaryFailed(PrimaryFailure),
    FallbackRequested,
    FailedFinal(FinalFailure),
}

impl AssetState {
    const fn rank(self) -> u8 {
        match self {
            Self::Pending => 0,
            Self::Observing => 1,
            Self::Loading => 2,
            Self::PrimaryFailed(_) => 3,
            Self::FallbackRequested => 4,
            Self::Loaded(_) | Self::FailedFinal(_) => 5,
        }
    }

    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Loaded(_) | Self::FailedFinal(_))
    }

    /// Value written to `data-asset-state`.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Observing => "observing",
            Self::Loading => "loading",
            Self::Loaded(LoadPath::Direct) => "loaded",
            Self::Loaded(LoadPath::Proxy) => "loaded-proxy",
            Self::PrimaryFailed(PrimaryFailure::Error) => "primary-error",
            Self::PrimaryFailed(PrimaryFailure::Timeout) => "primary-timeout",
            Self::FallbackRequested => "fallback-requested",
            Self::FailedFinal(FinalFailure::NoProxy) => "failed",
            Self::FailedFinal(FinalFailure::ProxyRejected) => "failed-proxy-rejected",
            Self::FailedFinal(FinalFailure::ProxyTimeout) => "failed-proxy-timeout",
            Self::FailedFinal(FinalFailure::ProxyUnavailable) => "failed-proxy-unavailable",
        }
    }
}

/// Loader tunables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoaderSettings {
    pub root_margin: String,
    pub load_deadline: Duration,
    pub proxy_deadline: Duration,
    /// Fallback enabled and a privileged context exists.
    pub proxy_available: bool,
}

#[derive(Debug, Clone)]
struct ImageRecord<N> {
    key: ImageKey,
    node: N,
    url: String,
    state: AssetState,
    deadline: Option<TimerId>,
    proxy_request: Option<ProxyRequestId>,
    primary_attempts: u32,
}

#[derive(Debug, Clone)]
pub struct LazyAssetLoader<N> {
    settings: LoaderSettings,
    records: Vec<ImageRecord<N>>,
    next_key: u64,
    next_request: u64,
}

impl<N: Clone + PartialEq + core::fmt::Debug> LazyAssetLoader<N> {
    #[must_use]
    pub fn new(settings: LoaderSettings) -> Self {
        Self {
            settings,
            records: Vec::new(),
            next_key: 0,
            next_request: 0,
        }
    }

    #[must_use]
    pub fn settings(&self) -> &LoaderSettings {
        &self.settings
    }

    /// Current state of `node`, if it is tracked.
    #[must_use]
    pub fn state(&self, node: &N) -> Option<AssetState> {
        self.records
            .iter()
            .find(|record| record.node == *node)
            .map(|record| record.state)
    }

    /// How many times a direct load was started for `node`.
    #[must_use]
    pub fn primary_attempts(&self, node: &N) -> u32 {
        self.records
            .iter()
            .find(|record| record.node == *node)
            .map_or(0, |record| record.primary_attempts)
    }

    #[must_use]
    pub fn tracked(&self) -> usize {
        self.records.len()
    }

    /// Start tracking `node`; its source is assigned on first intersection.
    pub fn attach<D>(
        &mut self,
        doc: &mut D,
        fx: &mut Effects<N>,
        node: N,
        url: impl Into<String>,
    ) -> ImageKey
    where
        D: Document<Node = N>,
    {
        let key = ImageKey(self.next_key);
        self.next_key += 1;
        self.records.push(ImageRecord {
            key,
            node: node.clone(),
            url: url.into(),
            state: AssetState::Pending,
            deadline: None,
            proxy_request: None,
            primary_attempts: 0,
        });
        let idx = self.records.len() - 1;
        fx.emit(HostCommand::Observe {
            node,
            root_margin: self.settings.root_margin.clone(),
        });
        self.transition(idx, doc, AssetState::Observing);
        key
    }

    /// Viewport intersection for `node`. Returns whether a load started.
    pub fn on_intersection<D>(&mut self, doc: &mut D, fx: &mut Effects<N>, node: &N) -> bool
    where
        D: Document<Node = N>,
    {
        let Some(idx) = self.index_of_node(node) else {
            return false;
        };
        if self.records[idx].state != AssetState::Observing {
            return false;
        }
        fx.emit(HostCommand::Unobserve { node: node.clone() });
        self.transition(idx, doc, AssetState::Loading);

        let deadline = fx.schedule_after(
            self.settings.load_deadline,
            Lane::Timeout,
            Task::LoadDeadline(self.records[idx].key),
        );
        let record = &mut self.records[idx];
        record.deadline = Some(deadline);
        record.primary_attempts += 1;
        doc.set_attribute(&record.node, "src", &record.url);
        true
    }

    pub fn on_load<D>(&mut self, doc: &mut D, fx: &mut Effects<N>, node: &N)
    where
        D: Document<Node = N>,
    {
        let Some(idx) = self.index_of_node(node) else {
            return;
        };
        match self.records[idx].state {
            // A slow direct load can still win while the proxy is pending.
            AssetState::Loading | AssetState::FallbackRequested => {
                self.clear_deadline(idx, fx);
                self.transition(idx, doc, AssetState::Loaded(LoadPath::Direct));
            }
            _ => {}
        }
    }

    pub fn on_error<D>(&mut self, doc: &mut D, fx: &mut Effects<N>, node: &N)
    where
        D: Document<Node = N>,
    {
        let Some(idx) = self.index_of_node(node) else {
            return;
        };
        if self.records[idx].state == AssetState::Loading {
            self.clear_deadline(idx, fx);
            self.primary_failed(idx, doc, fx, PrimaryFailure::Error);
        }
    }

    pub fn on_deadline<D>(&mut self, doc: &mut D, fx: &mut Effects<N>, key: ImageKey)
    where
        D: Document<Node = N>,
    {
        let Some(idx) = self.index_of_key(key) else {
            return;
        };
        if self.records[idx].state != AssetState::Loading {
            return;
        }
        self.records[idx].deadline = None;
        if doc.image_complete(&self.records[idx].node) {
            self.transition(idx, doc, AssetState::Loaded(LoadPath::Direct));
        } else {
            self.primary_failed(idx, doc, fx, PrimaryFailure::Timeout);
        }
    }

    pub fn on_proxy_response<D>(
        &mut self,
        doc: &mut D,
        fx: &mut Effects<N>,
        id: ProxyRequestId,
        response: &ProxyResponse,
    ) where
        D: Document<Node = N>,
    {
        let Some(idx) = self.pending_proxy(id) else {
            tracing::debug!(target: "pricetrail.loader", request = id.0, "stale proxy response");
            return;
        };
        self.clear_deadline(idx, fx);
        match response.usable_data_url() {
            Some(data_url) => {
                doc.set_attribute(&self.records[idx].node, "src", data_url);
                self.transition(idx, doc, AssetState::Loaded(LoadPath::Proxy));
            }
            None => {
                tracing::debug!(
                    target: "pricetrail.loader",
                    request = id.0,
                    error = response.error.as_deref().unwrap_or("no image data"),
                    "proxy fetch rejected"
                );
                self.transition(idx, doc, AssetState::FailedFinal(FinalFailure::ProxyRejected));
            }
        }
    }

    /// The host could not deliver the proxy message.
    pub fn on_proxy_failure<D>(&mut self, doc: &mut D, fx: &mut Effects<N>, id: ProxyRequestId)
    where
        D: Document<Node = N>,
    {
        if let Some(idx) = self.pending_proxy(id) {
            self.clear_deadline(idx, fx);
            self.transition(
                idx,
                doc,
                AssetState::FailedFinal(FinalFailure::ProxyUnavailable),
            );
        }
    }

    pub fn on_proxy_deadline<D>(&mut self, doc: &mut D, key: ImageKey)
    where
        D: Document<Node = N>,
    {
        let Some(idx) = self.index_of_key(key) else {
            return;
        };
        if self.records[idx].state == AssetState::FallbackRequested {
            self.records[idx].deadline = None;
            self.transition(idx, doc, AssetState::FailedFinal(FinalFailure::ProxyTimeout));
        }
    }

    /// Stop tracking `nodes`. In-flight loads are left alone.
    pub fn forget(&mut self, fx: &mut Effects<N>, nodes: &[N]) {
        let mut kept = Vec::with_capacity(self.records.len());
        for record in self.records.drain(..) {
            if !nodes.contains(&record.node) {
                kept.push(record);
                continue;
            }
            if record.state == AssetState::Observing {
                fx.emit(HostCommand::Unobserve {
                    node: record.node.clone(),
                });
            }
            if let Some(deadline) = record.deadline {
                fx.cancel(deadline);
            }
        }
        self.records = kept;
    }

    fn primary_failed<D>(
        &mut self,
        idx: usize,
        doc: &mut D,
        fx: &mut Effects<N>,
        failure: PrimaryFailure,
    ) where
        D: Document<Node = N>,
    {
        self.transition(idx, doc, AssetState::PrimaryFailed(failure));
        if !self.settings.proxy_available {
            self.transition(idx, doc, AssetState::FailedFinal(FinalFailure::NoProxy));
            return;
        }

        let id = ProxyRequestId(self.next_request);
        self.next_request += 1;
        let key = self.records[idx].key;
        let deadline = fx.schedule_after(
            self.settings.proxy_deadline,
            Lane::Timeout,
            Task::ProxyDeadline(key),
        );
        let record = &mut self.records[idx];
        record.proxy_request = Some(id);
        record.deadline = Some(deadline);
        fx.emit(HostCommand::SendProxy {
            id,
            request: ProxyRequest::fetch_as_data_url(record.url.clone()),
        });
        self.transition(idx, doc, AssetState::FallbackRequested);
    }

    fn transition<D>(&mut self, idx: usize, doc: &mut D, next: AssetState)
    where
        D: Document<Node = N>,
    {
        let record = &mut self.records[idx];
        let previous = record.state;
        if next.rank() <= previous.rank() {
            tracing::warn!(
                target: "pricetrail.loader",
                from = previous.as_str(),
                to = next.as_str(),
                "refusing backwards asset transition"
            );
            return;
        }
        record.state = next;
        tracing::debug!(
            target: "pricetrail.loader",
            image = record.key.0,
            from = previous.as_str(),
            to = next.as_str(),
            "asset state"
        );

        let node = &record.node;
        doc.set_attribute(node, ASSET_STATE_ATTRIBUTE, next.as_str());
        match next {
            AssetState::Loaded(_) => {
                doc.set_style(node, "opacity", LOADED_OPACITY);
                doc.remove_attribute(node, DEFERRED_SRC_ATTRIBUTE);
            }
            AssetState::FailedFinal(_) => {
                // Without a source the link shows its alt text instead of a
                // broken image.
                doc.remove_attribute(node, "src");
                doc.set_style(node, "opacity", LOADED_OPACITY);
            }
            _ => {}
        }
    }

    fn clear_deadline(&mut self, idx: usize, fx: &mut Effects<N>) {
        if let Some(deadline) = self.records[idx].deadline.take() {
            fx.cancel(deadline);
        }
    }

    fn pending_proxy(&self, id: ProxyRequestId) -> Option<usize> {
        self.records.iter().position(|record| {
            record.proxy_request == Some(id) && record.state == AssetState::FallbackRequested
        })
    }

    fn index_of_node(&self, node: &N) -> Option<usize> {
        self.records.iter().position(|record| record.node == *node)
    }

    fn index_of_key(&self, key: ImageKey) -> Option<usize> {
        self.records.iter().position(|record| record.key == key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pricetrail_core::testing::{MemoryDocument, MemoryNode};

    const URL: &str = "https://graph.keepa.com/pricehistory.png?asin=B000000001";

    struct Rig {
        doc: MemoryDocument,
        fx: Effects<MemoryNode>,
        loader: LazyAssetLoader<MemoryNode>,
        image: MemoryNode,
    }

    fn rig(proxy_available: bool) -> Rig {
        let mut doc = MemoryDocument::new("www.amazon.com", "/dp/B000000001");
        let body = doc.body_node();
        let link = doc.element(body, "a", &[("href", "https://keepa.com/")]);
        let image = doc.element(link, "img", &[("data-src", URL)]);
        let mut fx = Effects::new(Duration::ZERO);
        let mut loader = LazyAssetLoader::new(LoaderSettings {
            root_margin: "200px".into(),
            load_deadline: Duration::from_millis(2000),
            proxy_deadline: Duration::from_millis(10_000),
            proxy_available,
        });
        loader.attach(&mut doc, &mut fx, image, URL);
        Rig {
            doc,
            fx,
            loader,
            image,
        }
    }

    impl Rig {
        fn intersect(&mut self) -> bool {
            self.loader
                .on_intersection(&mut self.doc, &mut self.fx, &self.image)
        }

        fn advance(&mut self, ms: u64) {
            let now = self.fx.now() + Duration::from_millis(ms);
            self.fx.set_time(now);
            while let Some(task) = self.fx.pop_due() {
                match task {
                    Task::LoadDeadline(key) => self.loader.on_deadline(&mut self.doc, &mut self.fx, key),
                    Task::ProxyDeadline(key) => self.loader.on_proxy_deadline(&mut self.doc, key),
                    other => panic!("unexpected task {other:?}"),
                }
            }
        }

        fn state(&self) -> Option<AssetState> {
            self.loader.state(&self.image)
        }

        fn proxy_id(&mut self) -> ProxyRequestId {
            self.fx
                .drain_commands()
                .find_map(|command| match command {
                    HostCommand::SendProxy { id, request } => {
                        assert_eq!(request, ProxyRequest::fetch_as_data_url(URL));
                        Some(id)
                    }
                    _ => None,
                })
                .expect("proxy request emitted")
        }
    }

    #[test]
    fn attach_observes_without_loading() {
        let mut rig = rig(true);
        assert_eq!(rig.state(), Some(AssetState::Observing));
        assert_eq!(rig.doc.attribute(&rig.image, "src"), None);
        let commands: Vec<_> = rig.fx.drain_commands().collect();
        assert_eq!(
            commands,
            vec![HostCommand::Observe {
                node: rig.image,
                root_margin: "200px".into()
            }]
        );
    }

    #[test]
    fn intersection_is_one_shot() {
        let mut rig = rig(true);
        rig.fx.drain_commands().for_each(drop);

        assert!(rig.intersect());
        assert!(!rig.intersect());
        assert!(!rig.intersect());

        assert_eq!(rig.loader.primary_attempts(&rig.image), 1);
        assert_eq!(rig.doc.attribute(&rig.image, "src").as_deref(), Some(URL));
        let commands: Vec<_> = rig.fx.drain_commands().collect();
        assert_eq!(commands, vec![HostCommand::Unobserve { node: rig.image }]);
    }

    #[test]
    fn direct_load_marks_loaded() {
        let mut rig = rig(true);
        rig.intersect();
        rig.loader.on_load(&mut rig.doc, &mut rig.fx, &rig.image);

        assert_eq!(rig.state(), Some(AssetState::Loaded(LoadPath::Direct)));
        assert_eq!(rig.doc.style(rig.image, "opacity").as_deref(), Some("1"));
        assert_eq!(rig.doc.attribute(&rig.image, "data-src"), None);
        assert_eq!(
            rig.doc.attribute(&rig.image, "data-asset-state").as_deref(),
            Some("loaded")
        );
        // The cancelled deadline never fires.
        rig.advance(5000);
        assert_eq!(rig.state(), Some(AssetState::Loaded(LoadPath::Direct)));
    }

    #[test]
    fn deadline_accepts_an_image_that_completed_silently() {
        let mut rig = rig(false);
        rig.intersect();
        rig.doc.set_image_complete(rig.image, true);
        rig.advance(2000);
        assert_eq!(rig.state(), Some(AssetState::Loaded(LoadPath::Direct)));
    }

    #[test]
    fn error_then_proxy_success_uses_data_url() {
        let mut rig = rig(true);
        rig.intersect();
        rig.loader.on_error(&mut rig.doc, &mut rig.fx, &rig.image);
        assert_eq!(rig.state(), Some(AssetState::FallbackRequested));

        let id = rig.proxy_id();
        let data_url = "data:image/png;base64,iVBORw==";
        rig.loader.on_proxy_response(
            &mut rig.doc,
            &mut rig.fx,
            id,
            &ProxyResponse::success(data_url),
        );

        assert_eq!(rig.state(), Some(AssetState::Loaded(LoadPath::Proxy)));
        assert_eq!(rig.doc.attribute(&rig.image, "src").as_deref(), Some(data_url));
        assert_eq!(rig.doc.style(rig.image, "opacity").as_deref(), Some("1"));
    }

    #[test]
    fn timeout_without_proxy_fails_final() {
        let mut rig = rig(false);
        rig.intersect();
        rig.advance(1999);
        assert_eq!(rig.state(), Some(AssetState::Loading));
        rig.advance(1);

        assert_eq!(
            rig.state(),
            Some(AssetState::FailedFinal(FinalFailure::NoProxy))
        );
        assert_eq!(rig.doc.attribute(&rig.image, "src"), None);
        assert!(
            !rig.fx
                .pending_commands()
                .iter()
                .any(|c| matches!(c, HostCommand::SendProxy { .. }))
        );
    }

    #[test]
    fn proxy_rejection_and_timeout_are_final() {
        let mut rejected = rig(true);
        rejected.intersect();
        rejected.advance(2000);
        let id = rejected.proxy_id();
        rejected.loader.on_proxy_response(
            &mut rejected.doc,
            &mut rejected.fx,
            id,
            &ProxyResponse::failure("403"),
        );
        assert_eq!(
            rejected.state(),
            Some(AssetState::FailedFinal(FinalFailure::ProxyRejected))
        );

        let mut silent = rig(true);
        silent.intersect();
        silent.loader.on_error(&mut silent.doc, &mut silent.fx, &silent.image);
        silent.advance(10_000);
        assert_eq!(
            silent.state(),
            Some(AssetState::FailedFinal(FinalFailure::ProxyTimeout))
        );

        let mut undeliverable = rig(true);
        undeliverable.intersect();
        undeliverable
            .loader
            .on_error(&mut undeliverable.doc, &mut undeliverable.fx, &undeliverable.image);
        let id = undeliverable.proxy_id();
        undeliverable
            .loader
            .on_proxy_failure(&mut undeliverable.doc, &mut undeliverable.fx, id);
        assert_eq!(
            undeliverable.state(),
            Some(AssetState::FailedFinal(FinalFailure::ProxyUnavailable))
        );
    }

    #[test]
    fn states_never_move_backwards() {
        let mut rig = rig(true);
        rig.intersect();
        rig.loader.on_error(&mut rig.doc, &mut rig.fx, &rig.image);
        let id = rig.proxy_id();
        rig.loader
            .on_proxy_response(&mut rig.doc, &mut rig.fx, id, &ProxyResponse::failure("x"));
        let final_state = rig.state();

        // Late signals of every kind are ignored once terminal.
        rig.loader.on_load(&mut rig.doc, &mut rig.fx, &rig.image);
        rig.loader.on_error(&mut rig.doc, &mut rig.fx, &rig.image);
        rig.loader.on_proxy_response(
            &mut rig.doc,
            &mut rig.fx,
            id,
            &ProxyResponse::success("data:image/png;base64,AA=="),
        );
        assert!(!rig.intersect());
        assert_eq!(rig.state(), final_state);
        assert_eq!(rig.loader.primary_attempts(&rig.image), 1);
    }

    #[test]
    fn forgotten_images_ignore_late_signals() {
        let mut rig = rig(true);
        rig.fx.drain_commands().for_each(drop);
        let image = rig.image;
        rig.loader.forget(&mut rig.fx, &[image]);

        let commands: Vec<_> = rig.fx.drain_commands().collect();
        assert_eq!(commands, vec![HostCommand::Unobserve { node: image }]);
        assert!(!rig.intersect());
        rig.loader.on_load(&mut rig.doc, &mut rig.fx, &image);
        assert_eq!(rig.state(), None);
        assert_eq!(rig.loader.tracked(), 0);
    }

    #[test]
    fn rank_orders_the_lifecycle() {
        assert!(AssetState::Observing.rank() > AssetState::Pending.rank());
        assert!(AssetState::FallbackRequested.rank() > AssetState::PrimaryFailed(PrimaryFailure::Error).rank());
        assert!(AssetState::Loaded(LoadPath::Proxy).is_terminal());
        assert!(!AssetState::FallbackRequested.is_terminal());
    }
}
