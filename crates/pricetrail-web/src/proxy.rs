#![forbid(unsafe_code)]

//! Both ends of the privileged fetch.
//!
//! The content side posts [`ProxyRequest`]s through
//! `chrome.runtime.sendMessage`. The privileged side (an extension
//! background script or service worker) forwards its `onMessage` payloads
//! to [`handle_proxy_message`].

use js_sys::{Function, JSON, Promise, Reflect, Uint8Array};
use pricetrail_core::{ProxyPolicy, ProxyRequest, ProxyResponse};
use wasm_bindgen::JsCast;
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::JsFuture;
use web_sys::Response;

use crate::bridge;

fn runtime_send_message() -> Option<(JsValue, Function)> {
    let global = js_sys::global();
    let chrome = Reflect::get(&global, &"chrome".into()).ok()?;
    if chrome.is_undefined() || chrome.is_null() {
        return None;
    }
    let runtime = Reflect::get(&chrome, &"runtime".into()).ok()?;
    if runtime.is_undefined() || runtime.is_null() {
        return None;
    }
    let send = Reflect::get(&runtime, &"sendMessage".into())
        .ok()?
        .dyn_into::<Function>()
        .ok()?;
    Some((runtime, send))
}

/// Whether a privileged context is reachable from this page.
pub(crate) fn privileged_context_available() -> bool {
    runtime_send_message().is_some()
}

/// Send `request` and wait for the reply.
///
/// Delivery failures (no extension, rejected promise, unserializable
/// message) are `Err`; a delivered but negative reply is `Ok`.
pub(crate) async fn send(request: &ProxyRequest) -> Result<ProxyResponse, JsValue> {
    let (runtime, send) = runtime_send_message().ok_or_else(|| JsValue::from_str("no runtime"))?;
    let text = request
        .to_json()
        .map_err(|err| JsValue::from_str(&err.to_string()))?;
    let message = JSON::parse(&text)?;
    let pending = send.call1(&runtime, &message)?;
    let promise = pending
        .dyn_into::<Promise>()
        .map_err(|_| JsValue::from_str("sendMessage did not return a promise"))?;
    let reply = JsFuture::from(promise).await?;
    let reply_text = if reply.is_undefined() || reply.is_null() {
        None
    } else {
        Some(String::from(JSON::stringify(&reply)?))
    };
    Ok(bridge::reply_from_json(reply_text.as_deref()))
}

async fn fetch_bytes(url: &str) -> Result<(u16, Option<String>, Vec<u8>), JsValue> {
    // Global `fetch` exists in both window and worker scopes.
    let fetch: Function = Reflect::get(&js_sys::global(), &"fetch".into())?.dyn_into()?;
    let pending: Promise = fetch.call1(&JsValue::UNDEFINED, &url.into())?.dyn_into()?;
    let response: Response = JsFuture::from(pending).await?.dyn_into()?;
    let status = response.status();
    let content_type = response.headers().get("content-type")?;
    let buffer = JsFuture::from(response.array_buffer()?).await?;
    Ok((status, content_type, Uint8Array::new(&buffer).to_vec()))
}

/// Privileged-side handler for one `{type: "fetchAsDataUrl", url}` message.
///
/// Resolves to a `{ok, dataUrl?, error?}` object. Only image hosts of the
/// providers in `config_json` (defaults when absent) are fetched.
#[wasm_bindgen(js_name = handleProxyMessage)]
pub async fn handle_proxy_message(message: JsValue, config_json: Option<String>) -> JsValue {
    let reply = match proxy_reply(&message, config_json.as_deref()).await {
        Ok(reply) => reply,
        Err(reason) => ProxyResponse::failure(reason),
    };
    let text = reply
        .to_json()
        .unwrap_or_else(|_| r#"{"ok":false,"error":"encode"}"#.to_owned());
    JSON::parse(&text).unwrap_or(JsValue::NULL)
}

async fn proxy_reply(message: &JsValue, config_json: Option<&str>) -> Result<ProxyResponse, String> {
    let config = bridge::config_from_host(config_json).map_err(|err| err.to_string())?;
    let policy = ProxyPolicy::from_config(&config);
    let message_json = JSON::stringify(message)
        .map(String::from)
        .map_err(|_| "message is not JSON".to_owned())?;
    let url = bridge::authorize_request(&policy, &message_json).map_err(|err| err.to_string())?;

    let (status, content_type, body) = fetch_bytes(&url)
        .await
        .map_err(|err| format!("fetch failed: {err:?}"))?;
    tracing::debug!(
        target: "pricetrail.proxy",
        status,
        bytes = body.len(),
        "fetched for content script"
    );
    Ok(bridge::fetched_reply(&policy, status, content_type.as_deref(), &body))
}
