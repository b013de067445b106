#![forbid(unsafe_code)]

//! Anchor selection for the panel.

use crate::dom::Document;

/// Semantic landmarks tried in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Landmark {
    /// Unified price block.
    UnifiedPrice,
    /// Core price block.
    CorePrice,
    /// Nearest section wrapping the product title.
    TitleSection,
    /// Generic product-detail container.
    ProductDetail,
    Body,
}

impl Landmark {
    pub const ORDER: [Self; 5] = [
        Self::UnifiedPrice,
        Self::CorePrice,
        Self::TitleSection,
        Self::ProductDetail,
        Self::Body,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::UnifiedPrice => "unified_price",
            Self::CorePrice => "core_price",
            Self::TitleSection => "title_section",
            Self::ProductDetail => "product_detail",
            Self::Body => "body",
        }
    }

    fn locate<D: Document>(self, doc: &D) -> Option<D::Node> {
        match self {
            Self::UnifiedPrice => doc.query("#unifiedPrice_feature_div"),
            Self::CorePrice => doc.query("#corePrice_feature_div"),
            Self::TitleSection => {
                let title = doc.query("#title")?;
                doc.closest(&title, ".a-section")
            }
            Self::ProductDetail => doc.query("#ppd"),
            Self::Body => doc.body(),
        }
    }
}

/// Picks where the panel goes. Stateless; the caller inserts.
#[derive(Debug, Default, Clone, Copy)]
pub struct PlacementResolver;

impl PlacementResolver {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// First landmark present in `doc`, or `None` if there is not even a body.
    pub fn resolve_anchor<D: Document>(&self, doc: &D) -> Option<(Landmark, D::Node)> {
        Landmark::ORDER
            .into_iter()
            .find_map(|landmark| landmark.locate(doc).map(|node| (landmark, node)))
    }
}
