#![forbid(unsafe_code)]

//! Browser binding for pricetrail.
//!
//! Built as a `cdylib` with `wasm-pack` and loaded from a content script:
//!
//! ```js
//! import init, { mount } from "./pricetrail_web.js";
//! await init();
//! mount(JSON.stringify({ providers: [/* ... */] }));
//! ```
//!
//! The extension's privileged side loads the same module and answers
//! content-script messages with `handleProxyMessage(message, configJson)`.
//!
//! Everything that touches `web-sys` is compiled only for `wasm32`. The
//! value conversions in [`bridge`] are plain Rust and tested natively.

pub mod bridge;

#[cfg(target_arch = "wasm32")]
mod dom;
#[cfg(target_arch = "wasm32")]
mod history;
#[cfg(target_arch = "wasm32")]
mod host;
#[cfg(target_arch = "wasm32")]
mod logging;
#[cfg(target_arch = "wasm32")]
mod proxy;

#[cfg(target_arch = "wasm32")]
pub use dom::WebDocument;
#[cfg(target_arch = "wasm32")]
pub use host::mount;
#[cfg(target_arch = "wasm32")]
pub use proxy::handle_proxy_message;
