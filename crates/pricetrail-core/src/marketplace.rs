#![forbid(unsafe_code)]

//! Marketplace detection from the site hostname.
//!
//! Chart providers name marketplaces either by a short locale string
//! (`uk`, `de`, ...) or by a small numeric domain code. [`Marketplace`] is
//! the one canonical table carrying both:
//!
//! | suffix   | locale | domain |
//! |----------|--------|--------|
//! | default  | `us`   | 1      |
//! | `.co.uk` | `uk`   | 2      |
//! | `.de`    | `de`   | 3      |
//! | `.fr`    | `fr`   | 4      |
//! | `.ca`    | `ca`   | 6      |
//! | `.it`    | `it`   | 7      |
//! | `.es`    | `es`   | 8      |

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Marketplace {
    #[default]
    Us,
    Uk,
    De,
    Fr,
    Ca,
    It,
    Es,
}

impl Marketplace {
    pub const ALL: [Self; 7] = [
        Self::Us,
        Self::Uk,
        Self::De,
        Self::Fr,
        Self::Ca,
        Self::It,
        Self::Es,
    ];

    /// Detect the marketplace from a hostname; unknown hosts map to [`Marketplace::Us`].
    #[must_use]
    pub fn from_hostname(hostname: &str) -> Self {
        let host = hostname.trim_end_matches('.').to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|market| {
                market
                    .host_suffix()
                    .is_some_and(|suffix| host.ends_with(suffix))
            })
            .unwrap_or_default()
    }

    /// Short locale code used in provider URLs.
    #[must_use]
    pub const fn locale(self) -> &'static str {
        match self {
            Self::Us => "us",
            Self::Uk => "uk",
            Self::De => "de",
            Self::Fr => "fr",
            Self::Ca => "ca",
            Self::It => "it",
            Self::Es => "es",
        }
    }

    /// Numeric domain code used by providers that index marketplaces by number.
    #[must_use]
    pub const fn domain_id(self) -> u8 {
        match self {
            Self::Us => 1,
            Self::Uk => 2,
            Self::De => 3,
            Self::Fr => 4,
            Self::Ca => 6,
            Self::It => 7,
            Self::Es => 8,
        }
    }

    /// Subdomain prefix for providers that host one site per marketplace.
    #[must_use]
    pub fn subdomain(self) -> String {
        match self {
            Self::Us => String::new(),
            other => format!("{}.", other.locale()),
        }
    }

    const fn host_suffix(self) -> Option<&'static str> {
        match self {
            Self::Us => None,
            Self::Uk => Some(".co.uk"),
            Self::De => Some(".de"),
            Self::Fr => Some(".fr"),
            Self::Ca => Some(".ca"),
            Self::It => Some(".it"),
            Self::Es => Some(".es"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hostnames_map_to_the_canonical_table() {
        let cases = [
            ("www.amazon.com", Marketplace::Us, "us", 1),
            ("smile.amazon.com", Marketplace::Us, "us", 1),
            ("www.amazon.co.uk", Marketplace::Uk, "uk", 2),
            ("www.amazon.de", Marketplace::De, "de", 3),
            ("www.amazon.fr", Marketplace::Fr, "fr", 4),
            ("www.amazon.ca", Marketplace::Ca, "ca", 6),
            ("www.amazon.it", Marketplace::It, "it", 7),
            ("WWW.AMAZON.ES.", Marketplace::Es, "es", 8),
        ];
        for (host, market, locale, domain) in cases {
            let detected = Marketplace::from_hostname(host);
            assert_eq!(detected, market, "{host}");
            assert_eq!(detected.locale(), locale);
            assert_eq!(detected.domain_id(), domain);
        }
    }

    #[test]
    fn suffix_match_is_anchored_at_the_end() {
        // ".de" inside the host must not select Germany.
        assert_eq!(
            Marketplace::from_hostname("shop.deals.example.com"),
            Marketplace::Us
        );
    }

    #[test]
    fn subdomain_is_empty_for_us() {
        assert_eq!(Marketplace::Us.subdomain(), "");
        assert_eq!(Marketplace::Uk.subdomain(), "uk.");
    }
}
