#![forbid(unsafe_code)]

//! Markup description of one chart panel.
//!
//! The panel is a single container carrying the marker class. Each
//! configured provider contributes one section: a label, a link to the
//! provider's product page and an image whose real source is parked in
//! `data-src` until the lazy loader assigns it.

use crate::config::LensConfig;
use crate::identifier::ProductIdentifier;
use crate::marketplace::Marketplace;

/// Attribute holding the deferred image source.
pub const DEFERRED_SRC_ATTRIBUTE: &str = "data-src";
/// Attribute mirroring the image's asset state.
pub const ASSET_STATE_ATTRIBUTE: &str = "data-asset-state";
/// Attribute naming the provider of a panel section.
pub const PROVIDER_ATTRIBUTE: &str = "data-provider";
/// Attribute carrying the identifier the panel was built for.
pub const IDENTIFIER_ATTRIBUTE: &str = "data-asin-panel";
/// Opacity of an image that has not finished loading.
pub const HIDDEN_OPACITY: &str = ".001";
/// Opacity of a loaded image.
pub const LOADED_OPACITY: &str = "1";

pub const CONTAINER_STYLE: &str =
    "margin-top:10px;padding:10px;border:1px solid #ccc;border-radius:6px;background:#fff;";
pub const SECTION_STYLE: &str = "margin-top:6px;";
pub const IMAGE_STYLE: &str = "max-width:100%;height:auto;opacity:.001;";

/// One provider's link and chart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PanelSection {
    pub provider: String,
    pub label: String,
    pub link_href: String,
    pub image_src: String,
    pub alt_text: String,
}

/// Everything a host needs to build one panel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PanelMarkup {
    pub marker_class: String,
    pub identifier: ProductIdentifier,
    pub sections: Vec<PanelSection>,
}

impl PanelMarkup {
    /// Markup for `identifier` using every configured provider.
    #[must_use]
    pub fn for_product(
        config: &LensConfig,
        market: Marketplace,
        identifier: ProductIdentifier,
    ) -> Self {
        let sections = config
            .providers
            .iter()
            .map(|provider| PanelSection {
                provider: provider.name.clone(),
                label: provider.label.clone(),
                link_href: provider.link_url(market, &identifier),
                image_src: provider.image_url(market, &identifier),
                alt_text: provider.alt_text.clone(),
            })
            .collect();
        Self {
            marker_class: config.marker_class.clone(),
            identifier,
            sections,
        }
    }

    /// CSS selector matching the panel container.
    #[must_use]
    pub fn container_selector(&self) -> String {
        format!(".{}", self.marker_class)
    }
}
