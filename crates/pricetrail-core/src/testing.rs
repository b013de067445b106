#![forbid(unsafe_code)]

//! In-memory [`Document`] for native tests.
//!
//! `MemoryDocument` models just enough of a page for pricetrail: an element
//! tree with attributes and inline styles, form values, a location, and an
//! "image complete" flag the test controls. Every mutation made through the
//! [`Document`] trait bumps a counter so tests can assert that a code path
//! touched nothing.

use std::collections::BTreeMap;

use crate::dom::{Document, PanelNodes};
use crate::panel::{
    CONTAINER_STYLE, DEFERRED_SRC_ATTRIBUTE, IDENTIFIER_ATTRIBUTE, IMAGE_STYLE, PROVIDER_ATTRIBUTE,
    PanelMarkup, SECTION_STYLE,
};

/// Handle to an element of a [`MemoryDocument`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MemoryNode(usize);

#[derive(Debug, Clone, Default)]
struct Element {
    tag: String,
    attributes: BTreeMap<String, String>,
    styles: BTreeMap<String, String>,
    text: Option<String>,
    value: Option<String>,
    image_complete: bool,
    parent: Option<usize>,
    children: Vec<usize>,
}

/// Page model backing native tests.
#[derive(Debug, Clone)]
pub struct MemoryDocument {
    elements: Vec<Element>,
    body: Option<usize>,
    hostname: String,
    path: String,
    mutations: usize,
}

const ROOT: usize = 0;

impl MemoryDocument {
    /// `<html><body></body></html>` at `https://{hostname}{path}`.
    #[must_use]
    pub fn new(hostname: &str, path: &str) -> Self {
        let mut doc = Self::without_body(hostname, path);
        let body = doc.insert(ROOT, "body");
        doc.body = Some(body.0);
        doc
    }

    /// A document whose root has no body element.
    #[must_use]
    pub fn without_body(hostname: &str, path: &str) -> Self {
        Self {
            elements: vec![Element {
                tag: "html".into(),
                ..Element::default()
            }],
            body: None,
            hostname: hostname.into(),
            path: path.into(),
            mutations: 0,
        }
    }

    /// A product page for `identifier` on `www.amazon.com` with a core price block.
    #[must_use]
    pub fn product_page(identifier: &str) -> Self {
        let mut doc = Self::new("www.amazon.com", &format!("/dp/{identifier}"));
        let body = doc.body_node();
        let ppd = doc.element(body, "div", &[("id", "ppd")]);
        doc.element(ppd, "div", &[("id", "corePrice_feature_div")]);
        doc
    }

    /// The body element. Panics for documents built with [`Self::without_body`].
    #[must_use]
    pub fn body_node(&self) -> MemoryNode {
        MemoryNode(self.body.expect("document has a body"))
    }

    #[must_use]
    pub fn root_node(&self) -> MemoryNode {
        MemoryNode(ROOT)
    }

    /// Append a child element without counting it as a mutation.
    pub fn element(
        &mut self,
        parent: MemoryNode,
        tag: &str,
        attributes: &[(&str, &str)],
    ) -> MemoryNode {
        let node = self.insert(parent.0, tag);
        for (name, value) in attributes {
            self.elements[node.0]
                .attributes
                .insert((*name).to_owned(), (*value).to_owned());
        }
        node
    }

    /// Simulate a soft navigation to `path`.
    pub fn set_location(&mut self, path: &str) {
        self.path = path.into();
    }

    pub fn set_field(&mut self, node: MemoryNode, value: &str) {
        self.elements[node.0].value = Some(value.into());
    }

    /// Control what [`Document::image_complete`] reports for `node`.
    pub fn set_image_complete(&mut self, node: MemoryNode, complete: bool) {
        self.elements[node.0].image_complete = complete;
    }

    /// Detach a node the way a host page rewriting its DOM would.
    pub fn detach(&mut self, node: MemoryNode) {
        self.unlink(node.0);
    }

    #[must_use]
    pub fn mutation_count(&self) -> usize {
        self.mutations
    }

    #[must_use]
    pub fn count(&self, selector: &str) -> usize {
        self.query_all(selector).len()
    }

    #[must_use]
    pub fn style(&self, node: MemoryNode, property: &str) -> Option<String> {
        self.elements[node.0].styles.get(property).cloned()
    }

    #[must_use]
    pub fn text(&self, node: MemoryNode) -> Option<String> {
        self.elements[node.0].text.clone()
    }

    #[must_use]
    pub fn tag(&self, node: MemoryNode) -> &str {
        &self.elements[node.0].tag
    }

    #[must_use]
    pub fn parent(&self, node: MemoryNode) -> Option<MemoryNode> {
        self.elements[node.0].parent.map(MemoryNode)
    }

    #[must_use]
    pub fn children(&self, node: MemoryNode) -> Vec<MemoryNode> {
        self.elements[node.0]
            .children
            .iter()
            .copied()
            .map(MemoryNode)
            .collect()
    }

    fn insert(&mut self, parent: usize, tag: &str) -> MemoryNode {
        let idx = self.elements.len();
        self.elements.push(Element {
            tag: tag.to_ascii_lowercase(),
            parent: Some(parent),
            ..Element::default()
        });
        self.elements[parent].children.push(idx);
        MemoryNode(idx)
    }

    fn insert_styled(&mut self, parent: usize, tag: &str, style: &str) -> MemoryNode {
        let node = self.insert(parent, tag);
        let element = &mut self.elements[node.0];
        for declaration in style.split(';') {
            if let Some((property, value)) = declaration.split_once(':') {
                element
                    .styles
                    .insert(property.trim().to_owned(), value.trim().to_owned());
            }
        }
        node
    }

    fn unlink(&mut self, idx: usize) {
        if let Some(parent) = self.elements[idx].parent.take() {
            self.elements[parent].children.retain(|&child| child != idx);
        }
    }

    fn connected(&self, mut idx: usize) -> bool {
        loop {
            if idx == ROOT {
                return true;
            }
            match self.elements[idx].parent {
                Some(parent) => idx = parent,
                None => return false,
            }
        }
    }

    fn document_order(&self) -> Vec<usize> {
        let mut out = Vec::new();
        let mut stack = vec![ROOT];
        while let Some(idx) = stack.pop() {
            out.push(idx);
            stack.extend(self.elements[idx].children.iter().rev().copied());
        }
        out
    }

    fn matches(&self, idx: usize, selector: &SimpleSelector) -> bool {
        let element = &self.elements[idx];
        if selector.tag.as_deref().is_some_and(|tag| tag != element.tag) {
            return false;
        }
        if selector
            .id
            .as_ref()
            .is_some_and(|id| element.attributes.get("id") != Some(id))
        {
            return false;
        }
        let classes = element.attributes.get("class").map_or("", String::as_str);
        if !selector
            .classes
            .iter()
            .all(|class| classes.split_whitespace().any(|have| have == class))
        {
            return false;
        }
        selector.attributes.iter().all(|(name, value)| {
            match (element.attributes.get(name), value) {
                (Some(have), Some(want)) => have == want,
                (Some(_), None) => true,
                (None, _) => false,
            }
        })
    }
}

impl Document for MemoryDocument {
    type Node = MemoryNode;

    fn location_path(&self) -> String {
        self.path.clone()
    }

    fn hostname(&self) -> String {
        self.hostname.clone()
    }

    fn root_attribute(&self, name: &str) -> Option<String> {
        self.elements[ROOT].attributes.get(name).cloned()
    }

    fn set_root_attribute(&mut self, name: &str, value: &str) {
        self.mutations += 1;
        self.elements[ROOT]
            .attributes
            .insert(name.to_owned(), value.to_owned());
    }

    fn body(&self) -> Option<MemoryNode> {
        self.body.map(MemoryNode)
    }

    fn query(&self, selector: &str) -> Option<MemoryNode> {
        self.query_all(selector).into_iter().next()
    }

    fn query_all(&self, selector: &str) -> Vec<MemoryNode> {
        let Some(parsed) = SimpleSelector::parse(selector) else {
            return Vec::new();
        };
        self.document_order()
            .into_iter()
            .filter(|&idx| self.matches(idx, &parsed))
            .map(MemoryNode)
            .collect()
    }

    fn closest(&self, node: &MemoryNode, selector: &str) -> Option<MemoryNode> {
        let parsed = SimpleSelector::parse(selector)?;
        let mut current = Some(node.0);
        while let Some(idx) = current {
            if self.matches(idx, &parsed) {
                return Some(MemoryNode(idx));
            }
            current = self.elements[idx].parent;
        }
        None
    }

    fn attribute(&self, node: &MemoryNode, name: &str) -> Option<String> {
        self.elements[node.0].attributes.get(name).cloned()
    }

    fn set_attribute(&mut self, node: &MemoryNode, name: &str, value: &str) {
        self.mutations += 1;
        self.elements[node.0]
            .attributes
            .insert(name.to_owned(), value.to_owned());
    }

    fn remove_attribute(&mut self, node: &MemoryNode, name: &str) {
        self.mutations += 1;
        self.elements[node.0].attributes.remove(name);
    }

    fn field_value(&self, node: &MemoryNode) -> Option<String> {
        let element = &self.elements[node.0];
        element
            .value
            .clone()
            .or_else(|| element.attributes.get("value").cloned())
    }

    fn set_style(&mut self, node: &MemoryNode, property: &str, value: &str) {
        self.mutations += 1;
        self.elements[node.0]
            .styles
            .insert(property.to_owned(), value.to_owned());
    }

    fn append_panel(
        &mut self,
        anchor: &MemoryNode,
        markup: &PanelMarkup,
    ) -> Option<PanelNodes<MemoryNode>> {
        self.mutations += 1;
        let container = self.insert_styled(anchor.0, "div", CONTAINER_STYLE);
        let attrs = &mut self.elements[container.0].attributes;
        attrs.insert("class".into(), markup.marker_class.clone());
        attrs.insert(IDENTIFIER_ATTRIBUTE.into(), markup.identifier.to_string());

        let mut images = Vec::with_capacity(markup.sections.len());
        for section in &markup.sections {
            let wrapper = self.insert(container.0, "div");
            self.elements[wrapper.0]
                .attributes
                .insert(PROVIDER_ATTRIBUTE.into(), section.provider.clone());
            let label = self.insert(wrapper.0, "b");
            self.elements[label.0].text = Some(section.label.clone());
            let holder = self.insert_styled(wrapper.0, "div", SECTION_STYLE);
            let link = self.insert(holder.0, "a");
            let attrs = &mut self.elements[link.0].attributes;
            attrs.insert("href".into(), section.link_href.clone());
            attrs.insert("target".into(), "_blank".into());
            attrs.insert("rel".into(), "noopener".into());
            let image = self.insert_styled(link.0, "img", IMAGE_STYLE);
            let attrs = &mut self.elements[image.0].attributes;
            attrs.insert(DEFERRED_SRC_ATTRIBUTE.into(), section.image_src.clone());
            attrs.insert("alt".into(), section.alt_text.clone());
            images.push(image);
        }
        Some(PanelNodes { container, images })
    }

    fn remove(&mut self, node: &MemoryNode) {
        self.mutations += 1;
        self.unlink(node.0);
    }

    fn is_connected(&self, node: &MemoryNode) -> bool {
        self.connected(node.0)
    }

    fn image_complete(&self, node: &MemoryNode) -> bool {
        self.elements[node.0].image_complete
    }
}

/// `tag#id.class[attr][attr="value"]`, every part optional.
#[derive(Debug, Default, PartialEq, Eq)]
struct SimpleSelector {
    tag: Option<String>,
    id: Option<String>,
    classes: Vec<String>,
    attributes: Vec<(String, Option<String>)>,
}

impl SimpleSelector {
    fn parse(input: &str) -> Option<Self> {
        let input = input.trim();
        if input.is_empty() || input.contains(char::is_whitespace) && !input.contains('[') {
            return None;
        }
        let mut selector = Self::default();
        let mut rest = input;

        let tag_end = rest.find(['#', '.', '[']).unwrap_or(rest.len());
        if tag_end > 0 {
            selector.tag = Some(rest[..tag_end].to_ascii_lowercase());
        }
        rest = &rest[tag_end..];

        while let Some(first) = rest.chars().next() {
            match first {
                '#' | '.' => {
                    let body = &rest[1..];
                    let end = body.find(['#', '.', '[']).unwrap_or(body.len());
                    let name = body[..end].to_owned();
                    if name.is_empty() {
                        return None;
                    }
                    if first == '#' {
                        selector.id = Some(name);
                    } else {
                        selector.classes.push(name);
                    }
                    rest = &body[end..];
                }
                '[' => {
                    let close = rest.find(']')?;
                    let inner = &rest[1..close];
                    let attribute = match inner.split_once('=') {
                        Some((name, value)) => (
                            name.trim().to_owned(),
                            Some(value.trim().trim_matches(['"', '\'']).to_owned()),
                        ),
                        None => (inner.trim().to_owned(), None),
                    };
                    selector.attributes.push(attribute);
                    rest = &rest[close + 1..];
                }
                _ => return None,
            }
        }
        Some(selector)
    }
}
