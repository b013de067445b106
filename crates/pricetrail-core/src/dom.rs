#![forbid(unsafe_code)]

//! Page abstraction.
//!
//! Everything pricetrail reads from or writes to the host page goes through
//! [`Document`]. The browser binding implements it over `web-sys`; native
//! tests use the in-memory implementation behind the `test-helpers` feature.
//!
//! Selectors passed to [`Document::query`] and friends are plain CSS. The
//! crate only ever uses simple compound selectors (`tag`, `#id`, `.class`,
//! `[attr]`, `[attr="value"]` and combinations of those).

use crate::panel::PanelMarkup;

/// Nodes created for one inserted panel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PanelNodes<N> {
    /// The container carrying the marker class.
    pub container: N,
    /// One image per panel section, in section order.
    pub images: Vec<N>,
}

/// Host page operations needed by the resolvers, the controller and the loader.
pub trait Document {
    /// Element handle. Cheap to clone; equality means "same element".
    type Node: Clone + PartialEq + core::fmt::Debug;

    /// Path component of the current location (`/dp/B000000000/...`).
    fn location_path(&self) -> String;

    /// Hostname of the current location (`www.amazon.de`).
    fn hostname(&self) -> String;

    /// Attribute on the document root element.
    fn root_attribute(&self, name: &str) -> Option<String>;

    /// Set an attribute on the document root element.
    fn set_root_attribute(&mut self, name: &str, value: &str);

    /// The body element, if the document has one.
    fn body(&self) -> Option<Self::Node>;

    /// First element in document order matching `selector`.
    fn query(&self, selector: &str) -> Option<Self::Node>;

    /// Every element in document order matching `selector`.
    fn query_all(&self, selector: &str) -> Vec<Self::Node>;

    /// `node` or its nearest ancestor matching `selector`.
    fn closest(&self, node: &Self::Node, selector: &str) -> Option<Self::Node>;

    fn attribute(&self, node: &Self::Node, name: &str) -> Option<String>;

    fn set_attribute(&mut self, node: &Self::Node, name: &str, value: &str);

    fn remove_attribute(&mut self, node: &Self::Node, name: &str);

    /// Current value of a form field (falls back to its `value` attribute).
    fn field_value(&self, node: &Self::Node) -> Option<String>;

    /// Set one inline style property.
    fn set_style(&mut self, node: &Self::Node, property: &str, value: &str);

    /// Build `markup` and append it as the last child of `anchor`.
    ///
    /// Returns `None` when the host could not create the elements.
    fn append_panel(
        &mut self,
        anchor: &Self::Node,
        markup: &PanelMarkup,
    ) -> Option<PanelNodes<Self::Node>>;

    /// Detach `node` from the document.
    fn remove(&mut self, node: &Self::Node);

    /// Whether `node` is still attached to the document.
    fn is_connected(&self, node: &Self::Node) -> bool;

    /// Whether an image finished loading with non-zero natural width.
    fn image_complete(&self, node: &Self::Node) -> bool;
}

impl<T: Document + ?Sized> Document for &mut T {
    type Node = T::Node;

    fn location_path(&self) -> String {
        (**self).location_path()
    }

    fn hostname(&self) -> String {
        (**self).hostname()
    }

    fn root_attribute(&self, name: &str) -> Option<String> {
        (**self).root_attribute(name)
    }

    fn set_root_attribute(&mut self, name: &str, value: &str) {
        (**self).set_root_attribute(name, value);
    }

    fn body(&self) -> Option<Self::Node> {
        (**self).body()
    }

    fn query(&self, selector: &str) -> Option<Self::Node> {
        (**self).query(selector)
    }

    fn query_all(&self, selector: &str) -> Vec<Self::Node> {
        (**self).query_all(selector)
    }

    fn closest(&self, node: &Self::Node, selector: &str) -> Option<Self::Node> {
        (**self).closest(node, selector)
    }

    fn attribute(&self, node: &Self::Node, name: &str) -> Option<String> {
        (**self).attribute(node, name)
    }

    fn set_attribute(&mut self, node: &Self::Node, name: &str, value: &str) {
        (**self).set_attribute(node, name, value);
    }

    fn remove_attribute(&mut self, node: &Self::Node, name: &str) {
        (**self).remove_attribute(node, name);
    }

    fn field_value(&self, node: &Self::Node) -> Option<String> {
        (**self).field_value(node)
    }

    fn set_style(&mut self, node: &Self::Node, property: &str, value: &str) {
        (**self).set_style(node, property, value);
    }

    fn append_panel(
        &mut self,
        anchor: &Self::Node,
        markup: &PanelMarkup,
    ) -> Option<PanelNodes<Self::Node>> {
        (**self).append_panel(anchor, markup)
    }

    fn remove(&mut self, node: &Self::Node) {
        (**self).remove(node);
    }

    fn is_connected(&self, node: &Self::Node) -> bool {
        (**self).is_connected(node)
    }

    fn image_complete(&self, node: &Self::Node) -> bool {
        (**self).image_complete(node)
    }
}
