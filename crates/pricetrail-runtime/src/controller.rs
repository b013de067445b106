#![forbid(unsafe_code)]

//! Panel lifecycle.
//!
//! [`RenderController::reconcile`] compares what the page shows with what it
//! should show and fixes the difference. It is idempotent: calling it twice
//! on an unchanged page mutates nothing the second time. Every rebuild
//! removes all marker panels before inserting the new one, so the document
//! never holds two panels, even when the page cloned or re-rendered an old
//! one behind our back.

use pricetrail_core::{
    Document, IdentifierResolver, Landmark, LensConfig, Marketplace, PanelMarkup,
    PlacementResolver, ProductIdentifier,
};

use crate::effects::Effects;
use crate::loader::LazyAssetLoader;

/// The panel currently owned by the controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PanelState<N> {
    pub identifier: ProductIdentifier,
    pub container: N,
    pub images: Vec<N>,
    pub landmark: Landmark,
}

/// Result of one reconcile pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// No identifier on the page; `removed` panels were taken down.
    Cleared { removed: usize },
    /// The right panel is already shown.
    Unchanged(ProductIdentifier),
    /// A new panel was inserted after removing `removed` old ones.
    Rendered {
        identifier: ProductIdentifier,
        landmark: Landmark,
        removed: usize,
    },
    /// An identifier exists but the document has nowhere to put a panel.
    NoAnchor(ProductIdentifier),
    /// The host could not create the panel elements.
    BuildFailed(ProductIdentifier),
}

impl ReconcileOutcome {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Cleared { .. } => "cleared",
            Self::Unchanged(_) => "unchanged",
            Self::Rendered { .. } => "rendered",
            Self::NoAnchor(_) => "no_anchor",
            Self::BuildFailed(_) => "build_failed",
        }
    }
}

#[derive(Debug, Clone)]
pub struct RenderController<N> {
    config: LensConfig,
    identifiers: IdentifierResolver,
    placement: PlacementResolver,
    panel: Option<PanelState<N>>,
}

impl<N: Clone + PartialEq + core::fmt::Debug> RenderController<N> {
    #[must_use]
    pub fn new(config: LensConfig) -> Self {
        Self {
            config,
            identifiers: IdentifierResolver,
            placement: PlacementResolver,
            panel: None,
        }
    }

    #[must_use]
    pub fn panel(&self) -> Option<&PanelState<N>> {
        self.panel.as_ref()
    }

    #[must_use]
    pub fn config(&self) -> &LensConfig {
        &self.config
    }

    fn marker_selector(&self) -> String {
        format!(".{}", self.config.marker_class)
    }

    pub fn reconcile<D>(
        &mut self,
        doc: &mut D,
        loader: &mut LazyAssetLoader<N>,
        fx: &mut Effects<N>,
    ) -> ReconcileOutcome
    where
        D: Document<Node = N>,
    {
        let Some(resolved) = self.identifiers.resolve(doc) else {
            let removed = self.remove_panels(doc, loader, fx);
            return ReconcileOutcome::Cleared { removed };
        };
        let identifier = resolved.identifier;

        if self.is_current(doc, &identifier) {
            return ReconcileOutcome::Unchanged(identifier);
        }

        let removed = self.remove_panels(doc, loader, fx);
        let Some((landmark, anchor)) = self.placement.resolve_anchor(doc) else {
            tracing::debug!(
                target: "pricetrail.controller",
                asin = identifier.as_str(),
                "no anchor for panel"
            );
            return ReconcileOutcome::NoAnchor(identifier);
        };

        let market = Marketplace::from_hostname(&doc.hostname());
        let markup = PanelMarkup::for_product(&self.config, market, identifier);
        let Some(nodes) = doc.append_panel(&anchor, &markup) else {
            tracing::warn!(
                target: "pricetrail.controller",
                asin = identifier.as_str(),
                "host failed to build panel"
            );
            return ReconcileOutcome::BuildFailed(identifier);
        };

        for (image, section) in nodes.images.iter().zip(&markup.sections) {
            loader.attach(doc, fx, image.clone(), section.image_src.clone());
        }
        tracing::info!(
            target: "pricetrail.controller",
            asin = identifier.as_str(),
            source = resolved.source.as_str(),
            landmark = landmark.as_str(),
            market = market.locale(),
            removed,
            "panel rendered"
        );
        self.panel = Some(PanelState {
            identifier,
            container: nodes.container,
            images: nodes.images,
            landmark,
        });
        ReconcileOutcome::Rendered {
            identifier,
            landmark,
            removed,
        }
    }

    /// Remove every marker panel in the document, ours or not.
    pub fn remove_panels<D>(
        &mut self,
        doc: &mut D,
        loader: &mut LazyAssetLoader<N>,
        fx: &mut Effects<N>,
    ) -> usize
    where
        D: Document<Node = N>,
    {
        if let Some(panel) = self.panel.take() {
            loader.forget(fx, &panel.images);
        }
        let panels = doc.query_all(&self.marker_selector());
        for panel in &panels {
            doc.remove(panel);
        }
        if !panels.is_empty() {
            tracing::debug!(
                target: "pricetrail.controller",
                removed = panels.len(),
                "panels removed"
            );
        }
        panels.len()
    }

    fn is_current<D>(&self, doc: &D, identifier: &ProductIdentifier) -> bool
    where
        D: Document<Node = N>,
    {
        let Some(panel) = &self.panel else {
            return false;
        };
        panel.identifier == *identifier
            && doc.is_connected(&panel.container)
            && doc.query_all(&self.marker_selector()).len() == 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::{AssetState, LoaderSettings};
    use pretty_assertions::assert_eq;
    use pricetrail_core::testing::{MemoryDocument, MemoryNode};
    use web_time::Duration;

    struct Rig {
        doc: MemoryDocument,
        controller: RenderController<MemoryNode>,
        loader: LazyAssetLoader<MemoryNode>,
        fx: Effects<MemoryNode>,
    }

    impl Rig {
        fn new(doc: MemoryDocument) -> Self {
            let config = LensConfig::default();
            Self {
                doc,
                loader: LazyAssetLoader::new(LoaderSettings {
                    root_margin: config.root_margin(),
                    load_deadline: config.load_deadline(),
                    proxy_deadline: config.proxy_deadline(),
                    proxy_available: false,
                }),
                controller: RenderController::new(config),
                fx: Effects::new(Duration::ZERO),
            }
        }

        fn reconcile(&mut self) -> ReconcileOutcome {
            self.controller
                .reconcile(&mut self.doc, &mut self.loader, &mut self.fx)
        }

        fn panels(&self) -> usize {
            self.doc.count(".pricetrail-panel")
        }
    }

    fn id(text: &str) -> ProductIdentifier {
        ProductIdentifier::parse(text).expect("valid identifier")
    }

    #[test]
    fn renders_once_then_stays_unchanged() {
        let mut rig = Rig::new(MemoryDocument::product_page("B000000001"));
        assert_eq!(
            rig.reconcile(),
            ReconcileOutcome::Rendered {
                identifier: id("B000000001"),
                landmark: Landmark::CorePrice,
                removed: 0,
            }
        );
        let mutations = rig.doc.mutation_count();

        assert_eq!(rig.reconcile(), ReconcileOutcome::Unchanged(id("B000000001")));
        assert_eq!(rig.doc.mutation_count(), mutations);
        assert_eq!(rig.panels(), 1);
    }

    #[test]
    fn identifier_change_replaces_the_panel() {
        let mut rig = Rig::new(MemoryDocument::product_page("B000000001"));
        rig.reconcile();
        let old = rig.controller.panel().cloned().expect("panel");

        rig.doc.set_location("/dp/B000000002");
        assert_eq!(
            rig.reconcile(),
            ReconcileOutcome::Rendered {
                identifier: id("B000000002"),
                landmark: Landmark::CorePrice,
                removed: 1,
            }
        );
        assert_eq!(rig.panels(), 1);
        assert!(!rig.doc.is_connected(&old.container));
        // The old images are no longer tracked.
        assert_eq!(rig.loader.state(&old.images[0]), None);
        let new = rig.controller.panel().expect("panel");
        assert_eq!(rig.loader.state(&new.images[0]), Some(AssetState::Observing));
    }

    #[test]
    fn leaving_a_product_clears_panels() {
        let mut rig = Rig::new(MemoryDocument::product_page("B000000001"));
        rig.reconcile();
        rig.doc.set_location("/gp/cart/view.html");
        assert_eq!(rig.reconcile(), ReconcileOutcome::Cleared { removed: 1 });
        assert_eq!(rig.panels(), 0);
        assert!(rig.controller.panel().is_none());
        assert_eq!(rig.loader.tracked(), 0);
    }

    #[test]
    fn detached_panel_is_rebuilt() {
        let mut rig = Rig::new(MemoryDocument::product_page("B000000001"));
        rig.reconcile();
        let container = rig.controller.panel().expect("panel").container;
        rig.doc.detach(container);

        assert!(matches!(rig.reconcile(), ReconcileOutcome::Rendered { removed: 0, .. }));
        assert_eq!(rig.panels(), 1);
    }

    #[test]
    fn foreign_duplicate_is_collapsed() {
        let mut rig = Rig::new(MemoryDocument::product_page("B000000001"));
        rig.reconcile();
        let body = rig.doc.body_node();
        rig.doc.element(body, "div", &[("class", "pricetrail-panel")]);
        assert_eq!(rig.panels(), 2);

        assert!(matches!(rig.reconcile(), ReconcileOutcome::Rendered { removed: 2, .. }));
        assert_eq!(rig.panels(), 1);
    }

    #[test]
    fn no_body_means_no_anchor() {
        let mut rig = Rig::new(MemoryDocument::without_body(
            "www.amazon.com",
            "/dp/B000000001",
        ));
        assert_eq!(rig.reconcile(), ReconcileOutcome::NoAnchor(id("B000000001")));
    }

    #[test]
    fn panel_links_follow_the_marketplace() {
        let mut doc = MemoryDocument::new("www.amazon.de", "/dp/B000000001");
        let body = doc.body_node();
        doc.element(body, "div", &[("id", "ppd")]);
        let mut rig = Rig::new(doc);
        assert!(matches!(
            rig.reconcile(),
            ReconcileOutcome::Rendered {
                landmark: Landmark::ProductDetail,
                ..
            }
        ));
        let image = rig.controller.panel().expect("panel").images[0];
        let src = rig.doc.attribute(&image, "data-src").expect("deferred src");
        assert!(src.contains("domain=3"), "{src}");
        assert!(src.ends_with("asin=B000000001"), "{src}");
        assert_eq!(rig.doc.attribute(&image, "src"), None);
    }
}
