#![forbid(unsafe_code)]

//! Product identifier parsing and resolution.
//!
//! A [`ProductIdentifier`] is the 10-character code the retail site uses to
//! name a product (uppercase ASCII letters and digits). The
//! [`IdentifierResolver`] reads it from the page, trying each source in a
//! fixed precedence order:
//!
//! 1. the location path (`/dp/B00EXAMPLE/...`),
//! 2. a hidden form field,
//! 3. a data attribute on the body element,
//! 4. the first element carrying a `data-asin` attribute.
//!
//! A candidate that is not a syntactically valid identifier falls through to
//! the next source. Finding nothing is not an error: it means no panel should
//! be shown.

use core::fmt;
use core::str::FromStr;

use crate::dom::Document;

/// Length of every product identifier.
pub const IDENTIFIER_LEN: usize = 10;

const FORM_FIELD_SELECTORS: [&str; 3] = ["input#ASIN", "[name=\"ASIN.0\"]", "[name=\"ASIN\"]"];
const ROOT_DATA_ATTRIBUTES: [&str; 2] = ["data-asin", "data-asin-candidate"];
const NEAREST_DATA_SELECTOR: &str = "[data-asin]";
const NEAREST_DATA_ATTRIBUTE: &str = "data-asin";

/// Error returned when text is not a valid product identifier.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdentifierError {
    #[error("identifier must be {IDENTIFIER_LEN} characters, got {0}")]
    Length(usize),
    #[error("identifier contains {0:?} at position {1}; only A-Z and 0-9 are allowed")]
    Character(char, usize),
}

/// Stable 10-character product code.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProductIdentifier([u8; IDENTIFIER_LEN]);

impl ProductIdentifier {
    /// Parse `text`, rejecting anything that is not exactly ten `A-Z0-9` bytes.
    pub fn parse(text: &str) -> Result<Self, IdentifierError> {
        if let Some((idx, ch)) = text
            .chars()
            .enumerate()
            .find(|(_, ch)| !(ch.is_ascii_uppercase() || ch.is_ascii_digit()))
        {
            return Err(IdentifierError::Character(ch, idx));
        }
        // Only ASCII remains, so bytes and chars agree.
        let bytes: [u8; IDENTIFIER_LEN] = text
            .as_bytes()
            .try_into()
            .map_err(|_| IdentifierError::Length(text.len()))?;
        Ok(Self(bytes))
    }

    /// The identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        // Construction only admits ASCII.
        core::str::from_utf8(&self.0).unwrap_or_default()
    }
}

impl FromStr for ProductIdentifier {
    type Err = IdentifierError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for ProductIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Debug for ProductIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ProductIdentifier({})", self.as_str())
    }
}

/// Where a resolved identifier was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentifierSource {
    Path,
    FormField,
    RootData,
    NearestData,
}

impl IdentifierSource {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Path => "path",
            Self::FormField => "form_field",
            Self::RootData => "root_data",
            Self::NearestData => "nearest_data",
        }
    }
}

/// A resolved identifier together with its source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedIdentifier {
    pub identifier: ProductIdentifier,
    pub source: IdentifierSource,
}

/// Reads the current product identifier from a [`Document`].
#[derive(Debug, Default, Clone, Copy)]
pub struct IdentifierResolver;

impl IdentifierResolver {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Resolve the identifier, or `None` when no source yields a valid one.
    pub fn resolve<D: Document>(&self, doc: &D) -> Option<ResolvedIdentifier> {
        let found = identifier_from_path(&doc.location_path())
            .map(|id| (id, IdentifierSource::Path))
            .or_else(|| from_form_field(doc).map(|id| (id, IdentifierSource::FormField)))
            .or_else(|| from_root_data(doc).map(|id| (id, IdentifierSource::RootData)))
            .or_else(|| from_nearest_data(doc).map(|id| (id, IdentifierSource::NearestData)));

        match found {
            Some((identifier, source)) => {
                tracing::trace!(
                    target: "pricetrail.identifier",
                    identifier = %identifier,
                    source = source.as_str(),
                    "identifier resolved"
                );
                Some(ResolvedIdentifier { identifier, source })
            }
            None => {
                tracing::trace!(target: "pricetrail.identifier", "no identifier on page");
                None
            }
        }
    }
}

/// First path segment that is a valid identifier.
///
/// Segments are bounded by `/` or the end of the path, so `/dp/B000000001`
/// and `/dp/B000000001/ref=x` both match while `/dp/B0000000012` does not.
#[must_use]
pub fn identifier_from_path(path: &str) -> Option<ProductIdentifier> {
    let path = path.split(['?', '#']).next().unwrap_or_default();
    path.split('/')
        .skip(1)
        .find_map(|segment| ProductIdentifier::parse(segment).ok())
}

fn from_form_field<D: Document>(doc: &D) -> Option<ProductIdentifier> {
    FORM_FIELD_SELECTORS.iter().find_map(|selector| {
        let node = doc.query(selector)?;
        let value = doc.field_value(&node)?;
        ProductIdentifier::parse(value.trim()).ok()
    })
}

fn from_root_data<D: Document>(doc: &D) -> Option<ProductIdentifier> {
    let body = doc.body()?;
    ROOT_DATA_ATTRIBUTES.iter().find_map(|name| {
        let value = doc.attribute(&body, name)?;
        ProductIdentifier::parse(&value).ok()
    })
}

fn from_nearest_data<D: Document>(doc: &D) -> Option<ProductIdentifier> {
    let node = doc.query(NEAREST_DATA_SELECTOR)?;
    let value = doc.attribute(&node, NEAREST_DATA_ATTRIBUTE)?;
    ProductIdentifier::parse(&value).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_accepts_uppercase_alphanumerics() {
        let id = ProductIdentifier::parse("B08N5WRWNW").expect("valid");
        assert_eq!(id.as_str(), "B08N5WRWNW");
        assert_eq!(id.to_string(), "B08N5WRWNW");
    }

    #[test]
    fn parse_rejects_wrong_length_and_case() {
        assert_eq!(
            ProductIdentifier::parse("B08N5WRWN"),
            Err(IdentifierError::Length(9))
        );
        assert_eq!(
            ProductIdentifier::parse("b08N5WRWNW"),
            Err(IdentifierError::Character('b', 0))
        );
        assert_eq!(
            ProductIdentifier::parse("B08N5WRWNÉ"),
            Err(IdentifierError::Character('É', 9))
        );
        assert!(ProductIdentifier::parse("B08N5WRWN-").is_err());
        assert!(ProductIdentifier::parse("").is_err());
    }

    #[test]
    fn path_token_must_fill_a_whole_segment() {
        assert_eq!(
            identifier_from_path("/Echo-Dot/dp/B08N5WRWNW/ref=sr_1_1").map(|id| id.to_string()),
            Some("B08N5WRWNW".to_string())
        );
        assert_eq!(
            identifier_from_path("/gp/product/B08N5WRWNW").map(|id| id.to_string()),
            Some("B08N5WRWNW".to_string())
        );
        assert_eq!(
            identifier_from_path("/dp/B08N5WRWNW?th=1").map(|id| id.to_string()),
            Some("B08N5WRWNW".to_string())
        );
        assert!(identifier_from_path("/dp/B08N5WRWNWX").is_none());
        assert!(identifier_from_path("/dp/xB08N5WRWNW/").is_none());
        assert!(identifier_from_path("/").is_none());
        assert!(identifier_from_path("").is_none());
    }

    mod resolve {
        use super::*;
        use crate::testing::MemoryDocument;

        fn page(path: &str) -> MemoryDocument {
            MemoryDocument::new("www.amazon.com", path)
        }

        fn resolved(doc: &MemoryDocument) -> Option<(String, IdentifierSource)> {
            IdentifierResolver::new()
                .resolve(doc)
                .map(|r| (r.identifier.to_string(), r.source))
        }

        #[test]
        fn path_wins_over_every_other_source() {
            let mut doc = page("/dp/B0PATH0001");
            let body = doc.body_node();
            doc.element(body, "input", &[("id", "ASIN"), ("value", "B0FIELD001")]);
            doc.set_attribute(&body, "data-asin", "B0ROOT0001");
            doc.element(body, "div", &[("data-asin", "B0NEAR0001")]);

            assert_eq!(
                resolved(&doc),
                Some(("B0PATH0001".into(), IdentifierSource::Path))
            );
        }

        #[test]
        fn form_field_order_is_id_then_names() {
            let mut doc = page("/gp/cart");
            let body = doc.body_node();
            let named = doc.element(body, "input", &[("name", "ASIN")]);
            doc.set_field(named, "B0NAMED001");
            assert_eq!(
                resolved(&doc),
                Some(("B0NAMED001".into(), IdentifierSource::FormField))
            );

            doc.element(body, "input", &[("name", "ASIN.0"), ("value", "B0NAMED000")]);
            assert_eq!(resolved(&doc).map(|r| r.0), Some("B0NAMED000".into()));

            let by_id = doc.element(body, "input", &[("id", "ASIN")]);
            doc.set_field(by_id, " B0BYID0001 ");
            assert_eq!(resolved(&doc).map(|r| r.0), Some("B0BYID0001".into()));
        }

        #[test]
        fn invalid_candidates_fall_through() {
            let mut doc = page("/dp/not-an-id");
            let body = doc.body_node();
            doc.element(body, "input", &[("id", "ASIN"), ("value", "lowercase1")]);
            doc.set_attribute(&body, "data-asin", "SHORT");
            doc.set_attribute(&body, "data-asin-candidate", "B0CAND0001");

            assert_eq!(
                resolved(&doc),
                Some(("B0CAND0001".into(), IdentifierSource::RootData))
            );
        }

        #[test]
        fn nearest_data_is_the_last_resort() {
            let mut doc = page("/s");
            let body = doc.body_node();
            let list = doc.element(body, "div", &[("class", "results")]);
            doc.element(list, "div", &[("data-asin", "B0NEAR0001")]);
            doc.element(list, "div", &[("data-asin", "B0NEAR0002")]);

            assert_eq!(
                resolved(&doc),
                Some(("B0NEAR0001".into(), IdentifierSource::NearestData))
            );
        }

        #[test]
        fn nothing_found_is_none() {
            let mut doc = page("/gp/help");
            let body = doc.body_node();
            doc.element(body, "div", &[("data-asin", "")]);
            assert_eq!(resolved(&doc), None);
            assert_eq!(resolved(&MemoryDocument::without_body("x", "/")), None);
        }
    }

    mod properties {
        use super::*;
        use crate::testing::MemoryDocument;
        use proptest::prelude::*;

        const VALID: &str = "[A-Z0-9]{10}";

        proptest! {
            #[test]
            fn parse_accepts_exactly_the_valid_alphabet(text in "\\PC{0,14}") {
                let valid = text.len() == IDENTIFIER_LEN
                    && text.bytes().all(|b| b.is_ascii_uppercase() || b.is_ascii_digit());
                let parsed = ProductIdentifier::parse(&text);
                prop_assert_eq!(parsed.is_ok(), valid);
                if let Ok(id) = parsed {
                    prop_assert_eq!(id.as_str(), text.as_str());
                }
            }

            #[test]
            fn path_finds_the_identifier_among_other_segments(
                id in VALID,
                before in proptest::collection::vec("[a-z-]{0,12}", 0..4),
                after in proptest::collection::vec("[a-z=_0-9]{1,12}", 0..3),
            ) {
                let mut segments = before;
                segments.push(id.clone());
                segments.extend(after);
                let path = format!("/{}", segments.join("/"));
                prop_assert_eq!(identifier_from_path(&path).map(|found| found.to_string()), Some(id));
            }

            #[test]
            fn first_present_source_wins(
                path_id in proptest::option::of(VALID),
                field_id in proptest::option::of(VALID),
                root_id in proptest::option::of(VALID),
                near_id in proptest::option::of(VALID),
            ) {
                let path = path_id
                    .as_ref()
                    .map_or_else(|| "/gp/help".to_string(), |id| format!("/dp/{id}"));
                let mut doc = MemoryDocument::new("www.amazon.com", &path);
                let body = doc.body_node();
                if let Some(id) = &field_id {
                    doc.element(body, "input", &[("id", "ASIN"), ("value", id.as_str())]);
                }
                if let Some(id) = &root_id {
                    doc.set_attribute(&body, "data-asin-candidate", id);
                }
                if let Some(id) = &near_id {
                    doc.element(body, "div", &[("data-asin", id.as_str())]);
                }

                let expected = [
                    (path_id, IdentifierSource::Path),
                    (field_id, IdentifierSource::FormField),
                    (root_id, IdentifierSource::RootData),
                    (near_id, IdentifierSource::NearestData),
                ]
                .into_iter()
                .find_map(|(id, source)| id.map(|id| (id, source)));
                let got = IdentifierResolver::new()
                    .resolve(&doc)
                    .map(|r| (r.identifier.to_string(), r.source));
                prop_assert_eq!(got, expected);
            }
        }
    }

    #[test]
    fn source_names_are_stable() {
        assert_eq!(IdentifierSource::Path.as_str(), "path");
        assert_eq!(IdentifierSource::NearestData.as_str(), "nearest_data");
    }
}
