#![forbid(unsafe_code)]

//! History adapter.
//!
//! Single-page sites navigate with `history.pushState`, which fires no
//! event. This is the only place that patches a page global: `pushState` is
//! wrapped once so every call is reported as [`PageSignal::HistoryPush`],
//! and `popstate` is reported as [`PageSignal::HistoryPop`].

use js_sys::{Function, Reflect};
use pricetrail_runtime::PageSignal;
use wasm_bindgen::JsCast;
use wasm_bindgen::prelude::*;
use web_sys::Window;

const WRAPPED_MARKER: &str = "__pricetrailPushWrapped";

/// Report history navigations to `on_signal`.
pub(crate) fn install<F>(window: &Window, on_signal: F) -> Result<(), JsValue>
where
    F: Fn(PageSignal) + Clone + 'static,
{
    let history = window.history()?;
    let history_js: &JsValue = history.as_ref();

    if Reflect::get(history_js, &WRAPPED_MARKER.into())?.is_truthy() {
        tracing::debug!(target: "pricetrail.web", "pushState already wrapped");
    } else {
        let original: Function = Reflect::get(history_js, &"pushState".into())?.dyn_into()?;
        let target = history_js.clone();
        let push_signal = on_signal.clone();
        let wrapper = Closure::<dyn FnMut(JsValue, JsValue, JsValue) -> Result<JsValue, JsValue>>::wrap(
            Box::new(move |state: JsValue, title: JsValue, url: JsValue| {
                let result = original.call3(&target, &state, &title, &url)?;
                push_signal(PageSignal::HistoryPush);
                Ok(result)
            }),
        );
        Reflect::set(history_js, &"pushState".into(), wrapper.as_ref())?;
        Reflect::set(history_js, &WRAPPED_MARKER.into(), &JsValue::TRUE)?;
        wrapper.forget();
    }

    let pop = Closure::<dyn FnMut()>::wrap(Box::new(move || on_signal(PageSignal::HistoryPop)));
    window.add_event_listener_with_callback("popstate", pop.as_ref().unchecked_ref())?;
    pop.forget();
    Ok(())
}
