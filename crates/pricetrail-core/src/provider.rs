#![forbid(unsafe_code)]

//! Chart providers as data.
//!
//! A provider is a label plus two URL templates: the chart image and the
//! product page the panel links to. Templates may use these placeholders:
//!
//! - `{asin}`: the product identifier
//! - `{domain}`: numeric marketplace code
//! - `{locale}`: marketplace locale string
//! - `{subdomain}`: `""` for the US marketplace, otherwise `"<locale>."`

use serde::{Deserialize, Serialize};

use crate::identifier::ProductIdentifier;
use crate::marketplace::Marketplace;

const PLACEHOLDERS: [&str; 4] = ["asin", "domain", "locale", "subdomain"];

/// One chart provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Short name used in logs and as the section's `data-provider` value.
    pub name: String,
    /// Heading shown above the chart.
    pub label: String,
    pub image_template: String,
    pub link_template: String,
    pub alt_text: String,
}

impl ProviderConfig {
    /// Keepa price history chart.
    #[must_use]
    pub fn keepa() -> Self {
        Self {
            name: "keepa".into(),
            label: "Keepa:".into(),
            image_template:
                "https://graph.keepa.com/pricehistory.png?used=1&amazon=1&new=1&domain={domain}&asin={asin}"
                    .into(),
            link_template: "https://keepa.com/#!product/{domain}-{asin}".into(),
            alt_text: "Price history (Keepa)".into(),
        }
    }

    /// CamelCamelCamel new/used chart.
    #[must_use]
    pub fn camelcamelcamel() -> Self {
        Self {
            name: "camelcamelcamel".into(),
            label: "CamelCamelCamel:".into(),
            image_template: "https://charts.camelcamelcamel.com/{locale}/{asin}/amazon-new-used.png?force=1&zero=0&w=725&h=440&desired=false&legend=1&ilt=1&tp=all&fo=0".into(),
            link_template: "https://{subdomain}camelcamelcamel.com/product/{asin}".into(),
            alt_text: "Price history (CamelCamelCamel)".into(),
        }
    }

    #[must_use]
    pub fn image_url(&self, market: Marketplace, id: &ProductIdentifier) -> String {
        fill_template(&self.image_template, market, id)
    }

    #[must_use]
    pub fn link_url(&self, market: Marketplace, id: &ProductIdentifier) -> String {
        fill_template(&self.link_template, market, id)
    }

    /// Hostname of the image template, used by the proxy allowlist.
    #[must_use]
    pub fn image_host(&self) -> Option<String> {
        url_host(&self.image_template).map(str::to_ascii_lowercase)
    }

    /// Problems with this provider's templates, each prefixed with `field`.
    pub(crate) fn problems(&self, field: &str) -> Vec<String> {
        let mut problems = Vec::new();
        if self.name.trim().is_empty() {
            problems.push(format!("{field}.name must not be empty"));
        }
        for (key, template) in [
            ("image_template", &self.image_template),
            ("link_template", &self.link_template),
        ] {
            if !template.starts_with("https://") {
                problems.push(format!("{field}.{key} must be an https URL"));
            }
            for name in unknown_placeholders(template) {
                problems.push(format!("{field}.{key} uses unknown placeholder {{{name}}}"));
            }
        }
        if !self.image_template.contains("{asin}") {
            problems.push(format!("{field}.image_template must contain {{asin}}"));
        }
        problems
    }
}

fn fill_template(template: &str, market: Marketplace, id: &ProductIdentifier) -> String {
    template
        .replace("{asin}", id.as_str())
        .replace("{domain}", &market.domain_id().to_string())
        .replace("{locale}", market.locale())
        .replace("{subdomain}", &market.subdomain())
}

fn unknown_placeholders(template: &str) -> Vec<&str> {
    let mut unknown = Vec::new();
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        let after = &rest[open + 1..];
        let Some(close) = after.find('}') else { break };
        let name = &after[..close];
        if !PLACEHOLDERS.contains(&name) {
            unknown.push(name);
        }
        rest = &after[close + 1..];
    }
    unknown
}

/// Host part of an absolute `scheme://host[:port]/...` URL.
#[must_use]
pub fn url_host(url: &str) -> Option<&str> {
    let (_, rest) = url.split_once("://")?;
    let authority = rest.split(['/', '?', '#']).next()?;
    let host_port = authority.rsplit('@').next()?;
    let host = host_port.split(':').next()?;
    (!host.is_empty()).then_some(host)
}
