#![forbid(unsafe_code)]

//! [`Document`] over the live browser DOM.

use pricetrail_core::panel::{
    ASSET_STATE_ATTRIBUTE, CONTAINER_STYLE, DEFERRED_SRC_ATTRIBUTE, IDENTIFIER_ATTRIBUTE, IMAGE_STYLE,
    PROVIDER_ATTRIBUTE, SECTION_STYLE,
};
use pricetrail_core::{Document, PanelMarkup, PanelNodes};
use wasm_bindgen::{JsCast, JsValue};
use web_sys::{Element, EventTarget, HtmlElement, HtmlImageElement, HtmlInputElement, Window};

/// The page's window and document.
#[derive(Debug, Clone)]
pub struct WebDocument {
    window: Window,
    document: web_sys::Document,
}

impl WebDocument {
    /// `None` outside a window scope (workers, service workers).
    pub fn from_window() -> Option<Self> {
        let window = web_sys::window()?;
        let document = window.document()?;
        Some(Self { window, document })
    }

    pub fn window(&self) -> &Window {
        &self.window
    }

    pub fn raw(&self) -> &web_sys::Document {
        &self.document
    }

    /// The event target as an image the loader tracks, i.e. one carrying
    /// `data-asset-state`.
    pub fn tracked_image(target: EventTarget) -> Option<Element> {
        let image: Element = target.dyn_into::<HtmlImageElement>().ok()?.into();
        image.has_attribute(ASSET_STATE_ATTRIBUTE).then_some(image)
    }

    fn build_panel(
        &self,
        anchor: &Element,
        markup: &PanelMarkup,
    ) -> Result<PanelNodes<Element>, JsValue> {
        let doc = &self.document;
        let container = doc.create_element("div")?;
        container.set_class_name(&markup.marker_class);
        container.set_attribute(IDENTIFIER_ATTRIBUTE, markup.identifier.as_str())?;
        container.set_attribute("style", CONTAINER_STYLE)?;

        let mut images = Vec::with_capacity(markup.sections.len());
        for section in &markup.sections {
            let wrapper = doc.create_element("div")?;
            wrapper.set_attribute(PROVIDER_ATTRIBUTE, &section.provider)?;

            let label = doc.create_element("b")?;
            label.set_text_content(Some(&section.label));

            let holder = doc.create_element("div")?;
            holder.set_attribute("style", SECTION_STYLE)?;

            let link = doc.create_element("a")?;
            link.set_attribute("href", &section.link_href)?;
            link.set_attribute("target", "_blank")?;
            link.set_attribute("rel", "noopener")?;

            let image = doc.create_element("img")?;
            image.set_attribute(DEFERRED_SRC_ATTRIBUTE, &section.image_src)?;
            image.set_attribute("alt", &section.alt_text)?;
            image.set_attribute("style", IMAGE_STYLE)?;

            link.append_child(&image)?;
            holder.append_child(&link)?;
            wrapper.append_child(&label)?;
            wrapper.append_child(&holder)?;
            container.append_child(&wrapper)?;
            images.push(image);
        }

        // Insert last so the page never sees a half-built panel.
        anchor.append_child(&container)?;
        Ok(PanelNodes { container, images })
    }
}

impl Document for WebDocument {
    type Node = Element;

    fn location_path(&self) -> String {
        self.window.location().pathname().unwrap_or_default()
    }

    fn hostname(&self) -> String {
        self.window.location().hostname().unwrap_or_default()
    }

    fn root_attribute(&self, name: &str) -> Option<String> {
        self.document.document_element()?.get_attribute(name)
    }

    fn set_root_attribute(&mut self, name: &str, value: &str) {
        if let Some(root) = self.document.document_element() {
            self.set_attribute(&root, name, value);
        }
    }

    fn body(&self) -> Option<Element> {
        self.document.body().map(Element::from)
    }

    fn query(&self, selector: &str) -> Option<Element> {
        self.document.query_selector(selector).ok().flatten()
    }

    fn query_all(&self, selector: &str) -> Vec<Element> {
        let Ok(list) = self.document.query_selector_all(selector) else {
            tracing::warn!(target: "pricetrail.web", selector, "selector rejected");
            return Vec::new();
        };
        (0..list.length())
            .filter_map(|idx| list.get(idx))
            .filter_map(|node| node.dyn_into::<Element>().ok())
            .collect()
    }

    fn closest(&self, node: &Element, selector: &str) -> Option<Element> {
        node.closest(selector).ok().flatten()
    }

    fn attribute(&self, node: &Element, name: &str) -> Option<String> {
        node.get_attribute(name)
    }

    fn set_attribute(&mut self, node: &Element, name: &str, value: &str) {
        if let Err(err) = node.set_attribute(name, value) {
            tracing::debug!(target: "pricetrail.web", name, error = ?err, "set_attribute failed");
        }
    }

    fn remove_attribute(&mut self, node: &Element, name: &str) {
        if let Err(err) = node.remove_attribute(name) {
            tracing::debug!(target: "pricetrail.web", name, error = ?err, "remove_attribute failed");
        }
    }

    fn field_value(&self, node: &Element) -> Option<String> {
        node.dyn_ref::<HtmlInputElement>()
            .map(HtmlInputElement::value)
            .or_else(|| node.get_attribute("value"))
    }

    fn set_style(&mut self, node: &Element, property: &str, value: &str) {
        let Some(element) = node.dyn_ref::<HtmlElement>() else {
            tracing::debug!(target: "pricetrail.web", property, "set_style on a non-HTML element");
            return;
        };
        if let Err(err) = element.style().set_property(property, value) {
            tracing::debug!(target: "pricetrail.web", property, error = ?err, "set_style failed");
        }
    }

    fn append_panel(&mut self, anchor: &Element, markup: &PanelMarkup) -> Option<PanelNodes<Element>> {
        self.build_panel(anchor, markup)
            .map_err(|err| {
                tracing::warn!(target: "pricetrail.web", error = ?err, "panel construction failed");
            })
            .ok()
    }

    fn remove(&mut self, node: &Element) {
        node.remove();
    }

    fn is_connected(&self, node: &Element) -> bool {
        node.is_connected()
    }

    fn image_complete(&self, node: &Element) -> bool {
        node.dyn_ref::<HtmlImageElement>()
            .is_some_and(|image| image.complete() && image.natural_width() > 0)
    }
}
