#![forbid(unsafe_code)]

//! One instance per document.
//!
//! Several script managers can inject the same content script into one
//! page. The first instance to start records a marker attribute on the
//! document root; every later instance sees it and stands down before
//! touching anything else. The marker is set once and never cleared: soft
//! navigations keep the same document and must not re-arm a second copy.

use crate::dom::Document;

/// Value written to the guard attribute.
pub const GUARD_VALUE: &str = "1";

/// Document-scoped singleton flag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessGuard {
    attribute: String,
}

impl ProcessGuard {
    #[must_use]
    pub fn new(attribute: impl Into<String>) -> Self {
        Self {
            attribute: attribute.into(),
        }
    }

    #[must_use]
    pub fn attribute(&self) -> &str {
        &self.attribute
    }

    /// Claim the document. `false` means another instance owns it and the
    /// caller must not perform any further work.
    pub fn try_acquire<D: Document>(&self, doc: &mut D) -> bool {
        if doc.root_attribute(&self.attribute).is_some() {
            tracing::info!(
                target: "pricetrail.guard",
                attribute = %self.attribute,
                "document already claimed; standing down"
            );
            return false;
        }
        doc.set_root_attribute(&self.attribute, GUARD_VALUE);
        tracing::debug!(
            target: "pricetrail.guard",
            attribute = %self.attribute,
            "document claimed"
        );
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MemoryDocument;

    #[test]
    fn first_acquire_claims_the_document() {
        let mut doc = MemoryDocument::product_page("B000000001");
        let guard = ProcessGuard::new("data-pricetrail-active");
        assert!(guard.try_acquire(&mut doc));
        assert_eq!(
            doc.root_attribute("data-pricetrail-active").as_deref(),
            Some(GUARD_VALUE)
        );
    }

    #[test]
    fn second_acquire_fails_without_mutating() {
        let mut doc = MemoryDocument::product_page("B000000001");
        let guard = ProcessGuard::new("data-pricetrail-active");
        assert!(guard.try_acquire(&mut doc));
        let before = doc.mutation_count();

        let other = ProcessGuard::new("data-pricetrail-active");
        assert!(!other.try_acquire(&mut doc));
        assert!(!guard.try_acquire(&mut doc));
        assert_eq!(doc.mutation_count(), before);
    }

    #[test]
    fn guard_survives_soft_navigation() {
        let mut doc = MemoryDocument::product_page("B000000001");
        let guard = ProcessGuard::new("data-pricetrail-active");
        assert!(guard.try_acquire(&mut doc));
        doc.set_location("/dp/B000000002");
        assert!(!guard.try_acquire(&mut doc));
    }
}
