#![forbid(unsafe_code)]

//! Conversions between browser-side values and runtime types.
//!
//! Kept free of `web-sys` so the edge cases (missing replies, malformed
//! config, oversized delays) are covered by native tests.

use pricetrail_core::{ConfigError, LensConfig, ProtocolError, ProxyPolicy, ProxyRequest, ProxyResponse};
use pricetrail_runtime::Wakeup;
use web_time::Duration;

/// Browser globals the host cannot run without.
pub const REQUIRED_GLOBALS: [&str; 2] = ["IntersectionObserver", "MutationObserver"];

/// Which of [`REQUIRED_GLOBALS`] the page lacks, per `present`. Checked
/// before the lens claims the page.
pub fn missing_globals(present: impl Fn(&str) -> bool) -> Vec<&'static str> {
    REQUIRED_GLOBALS
        .into_iter()
        .filter(|name| !present(name))
        .collect()
}

/// Parse the config handed to `mount`. Absent or blank means defaults.
pub fn config_from_host(json: Option<&str>) -> Result<LensConfig, ConfigError> {
    match json.map(str::trim) {
        None | Some("") => Ok(LensConfig::default()),
        Some(text) => LensConfig::from_json_str(text),
    }
}

/// Interpret the privileged context's reply, stringified as JSON.
///
/// An extension with no listener resolves `sendMessage` with `undefined`,
/// which arrives here as `None`.
pub fn reply_from_json(text: Option<&str>) -> ProxyResponse {
    let Some(text) = text else {
        return ProxyResponse::failure("no reply");
    };
    ProxyResponse::from_json(text).unwrap_or_else(ProxyResponse::failure)
}

/// `setTimeout` delay for `wakeup`, clamped to what browsers accept.
pub fn timer_delay_ms(now: Duration, wakeup: Wakeup) -> i32 {
    let millis = wakeup.at.saturating_sub(now).as_millis();
    i32::try_from(millis).unwrap_or(i32::MAX)
}

/// Parse and authorize a request on the privileged side.
pub fn authorize_request(policy: &ProxyPolicy, message_json: &str) -> Result<String, ProtocolError> {
    let request = ProxyRequest::from_json(message_json)?;
    policy.authorize(&request).map(str::to_owned)
}

/// Build the reply for a finished upstream fetch.
pub fn fetched_reply(
    policy: &ProxyPolicy,
    status: u16,
    content_type: Option<&str>,
    body: &[u8],
) -> ProxyResponse {
    if !(200..300).contains(&status) {
        return ProxyResponse::failure(ProtocolError::Upstream(format!("HTTP {status}")));
    }
    match policy.encode(content_type, body) {
        Ok(data_url) => ProxyResponse::success(data_url),
        Err(err) => ProxyResponse::failure(err),
    }
}
