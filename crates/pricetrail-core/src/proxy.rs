#![forbid(unsafe_code)]

//! Privileged fetch protocol.
//!
//! When the page's content security policy blocks the chart origin, the
//! content side asks a privileged context (an extension background page or
//! service worker) to fetch the image and hand it back inline:
//!
//! ```json
//! { "type": "fetchAsDataUrl", "url": "https://graph.keepa.com/..." }
//! { "ok": true, "dataUrl": "data:image/png;base64,..." }
//! ```
//!
//! Both halves live here: the message types used by the content side, and
//! [`ProxyPolicy`], which the privileged side uses to decide whether a
//! request is allowed and to encode the fetched bytes.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};

use crate::config::LensConfig;
use crate::provider::url_host;

/// Upper bound on bytes the privileged side will inline.
pub const MAX_INLINE_BYTES: usize = 4 * 1024 * 1024;

/// Request sent to the privileged context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ProxyRequest {
    #[serde(rename = "fetchAsDataUrl")]
    FetchAsDataUrl { url: String },
}

impl ProxyRequest {
    #[must_use]
    pub fn fetch_as_data_url(url: impl Into<String>) -> Self {
        Self::FetchAsDataUrl { url: url.into() }
    }

    #[must_use]
    pub fn url(&self) -> &str {
        match self {
            Self::FetchAsDataUrl { url } => url,
        }
    }

    pub fn to_json(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(s: &str) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_str(s)?)
    }
}

/// Response from the privileged context.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProxyResponse {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ProxyResponse {
    #[must_use]
    pub fn success(data_url: impl Into<String>) -> Self {
        Self {
            ok: true,
            data_url: Some(data_url.into()),
            error: None,
        }
    }

    #[must_use]
    pub fn failure(error: impl ToString) -> Self {
        Self {
            ok: false,
            data_url: None,
            error: Some(error.to_string()),
        }
    }

    /// The inline `data:` URL of a successful response.
    ///
    /// Any media type is accepted; privileged contexts other than
    /// [`ProxyPolicy::encode`] often label image blobs generically.
    #[must_use]
    pub fn usable_data_url(&self) -> Option<&str> {
        if !self.ok {
            return None;
        }
        self.data_url.as_deref().filter(|url| {
            url.get(..5)
                .is_some_and(|scheme| scheme.eq_ignore_ascii_case("data:"))
        })
    }

    pub fn to_json(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(s: &str) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_str(s)?)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("malformed proxy message: {0}")]
    Json(#[from] serde_json::Error),
    #[error("url is not absolute https: {0}")]
    NotHttps(String),
    #[error("host {0} is not a configured chart provider")]
    HostNotAllowed(String),
    #[error("response is not an image (content-type {0})")]
    NotAnImage(String),
    #[error("response of {0} bytes exceeds the inline limit")]
    TooLarge(usize),
    #[error("upstream fetch failed: {0}")]
    Upstream(String),
}

/// Privileged-side gatekeeper.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyPolicy {
    allowed_hosts: Vec<String>,
}

impl ProxyPolicy {
    /// Allow exactly the image hosts of the configured providers.
    #[must_use]
    pub fn from_config(config: &LensConfig) -> Self {
        Self {
            allowed_hosts: config.image_hosts(),
        }
    }

    #[must_use]
    pub fn allowed_hosts(&self) -> &[String] {
        &self.allowed_hosts
    }

    /// Check that `request` targets an https URL on an allowed host.
    pub fn authorize<'a>(&self, request: &'a ProxyRequest) -> Result<&'a str, ProtocolError> {
        let url = request.url();
        if !url.starts_with("https://") {
            return Err(ProtocolError::NotHttps(url.to_owned()));
        }
        let host = url_host(url)
            .ok_or_else(|| ProtocolError::NotHttps(url.to_owned()))?
            .to_ascii_lowercase();
        if !self.allowed_hosts.iter().any(|allowed| *allowed == host) {
            tracing::warn!(target: "pricetrail.proxy", host = %host, "proxy request refused");
            return Err(ProtocolError::HostNotAllowed(host));
        }
        Ok(url)
    }

    /// Encode fetched bytes as a `data:` URL.
    pub fn encode(&self, content_type: Option<&str>, body: &[u8]) -> Result<String, ProtocolError> {
        let mime = content_type
            .and_then(|value| value.split(';').next())
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .unwrap_or("image/png")
            .to_ascii_lowercase();
        if !mime.starts_with("image/") {
            return Err(ProtocolError::NotAnImage(mime));
        }
        if body.len() > MAX_INLINE_BYTES {
            return Err(ProtocolError::TooLarge(body.len()));
        }
        Ok(format!("data:{mime};base64,{}", STANDARD.encode(body)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::ProviderConfig;
    use pretty_assertions::assert_eq;

    fn policy() -> ProxyPolicy {
        ProxyPolicy::from_config(&LensConfig {
            providers: vec![ProviderConfig::keepa(), ProviderConfig::camelcamelcamel()],
            ..LensConfig::default()
        })
    }

    #[test]
    fn request_wire_format() {
        let request = ProxyRequest::fetch_as_data_url("https://graph.keepa.com/a.png");
        assert_eq!(
            request.to_json().expect("serializes"),
            r#"{"type":"fetchAsDataUrl","url":"https://graph.keepa.com/a.png"}"#
        );
        assert_eq!(
            ProxyRequest::from_json(r#"{"url":"u","type":"fetchAsDataUrl"}"#).expect("parses"),
            ProxyRequest::fetch_as_data_url("u")
        );
        assert!(ProxyRequest::from_json(r#"{"type":"somethingElse","url":"u"}"#).is_err());
    }

    #[test]
    fn response_wire_format() {
        let parsed = ProxyResponse::from_json(r#"{"ok":true,"dataUrl":"data:image/png;base64,AA=="}"#)
            .expect("parses");
        assert_eq!(parsed, ProxyResponse::success("data:image/png;base64,AA=="));
        assert_eq!(parsed.usable_data_url(), Some("data:image/png;base64,AA=="));

        let bare = ProxyResponse::from_json(r#"{"ok":false}"#).expect("parses");
        assert_eq!(bare.usable_data_url(), None);
        assert_eq!(
            ProxyResponse::failure("boom").to_json().expect("serializes"),
            r#"{"ok":false,"error":"boom"}"#
        );
    }

    #[test]
    fn ok_without_image_data_is_not_usable() {
        let response = ProxyResponse {
            ok: true,
            data_url: Some("https://graph.keepa.com/a.png".into()),
            error: None,
        };
        assert_eq!(response.usable_data_url(), None);
        assert_eq!(ProxyResponse { ok: true, ..Default::default() }.usable_data_url(), None);
    }

    #[test]
    fn generic_media_types_are_still_usable() {
        let octet = ProxyResponse::success("data:application/octet-stream;base64,iVBORw0KGgo=");
        assert_eq!(
            octet.usable_data_url(),
            Some("data:application/octet-stream;base64,iVBORw0KGgo=")
        );
        let failed = ProxyResponse {
            ok: false,
            data_url: Some("data:image/png;base64,AA==".into()),
            error: None,
        };
        assert_eq!(failed.usable_data_url(), None);
    }

    #[test]
    fn policy_allows_only_provider_hosts() {
        let policy = policy();
        let ok = ProxyRequest::fetch_as_data_url("https://GRAPH.keepa.com/pricehistory.png?asin=X");
        assert!(policy.authorize(&ok).is_ok());

        let foreign = ProxyRequest::fetch_as_data_url("https://evil.example/steal");
        assert!(matches!(
            policy.authorize(&foreign),
            Err(ProtocolError::HostNotAllowed(host)) if host == "evil.example"
        ));

        let plain = ProxyRequest::fetch_as_data_url("http://graph.keepa.com/a.png");
        assert!(matches!(policy.authorize(&plain), Err(ProtocolError::NotHttps(_))));
    }

    #[test]
    fn encode_builds_base64_data_url() {
        let url = policy()
            .encode(Some("image/PNG; charset=binary"), b"\x89PNG")
            .expect("encodes");
        assert_eq!(url, "data:image/png;base64,iVBORw==");
        assert_eq!(
            policy().encode(None, b"").expect("encodes"),
            "data:image/png;base64,"
        );
    }

    #[test]
    fn encode_rejects_non_images_and_oversized_bodies() {
        assert!(matches!(
            policy().encode(Some("text/html"), b"<html>"),
            Err(ProtocolError::NotAnImage(_))
        ));
        let big = vec![0u8; MAX_INLINE_BYTES + 1];
        assert!(matches!(
            policy().encode(Some("image/png"), &big),
            Err(ProtocolError::TooLarge(_))
        ));
    }
}
