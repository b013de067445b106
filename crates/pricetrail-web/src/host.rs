#![forbid(unsafe_code)]

//! Browser host around [`PriceLens`].
//!
//! Owns the observers, the event listeners and the single pending timer.
//! Every browser callback follows the same path: advance the lens clock to
//! `now`, deliver the event, then [`Host::pump`] the resulting commands and
//! re-arm the timer for the lens's next wakeup.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use js_sys::{Array, Function};
use pricetrail_core::ProxyRequest;
use pricetrail_runtime::{
    HostCapabilities, HostCommand, Lane, PageSignal, PriceLens, ProxyRequestId, Wakeup,
};
use wasm_bindgen::JsCast;
use wasm_bindgen::prelude::*;
use web_sys::{
    AddEventListenerOptions, Element, Event, IdleRequestOptions,
    IntersectionObserver, IntersectionObserverEntry, IntersectionObserverInit, MutationObserver,
    MutationObserverInit, Node, Window,
};
use web_time::{Duration, Instant};

use crate::dom::WebDocument;
use crate::{bridge, history, logging, proxy};

#[derive(Debug, Clone, Copy)]
enum PendingTimer {
    Timeout(i32),
    Idle(u32),
}

pub(crate) struct Host {
    lens: RefCell<PriceLens<WebDocument>>,
    window: Window,
    epoch: Instant,
    idle_timeout_ms: u32,
    viewport: RefCell<Option<IntersectionObserver>>,
    wake: RefCell<Option<Closure<dyn FnMut()>>>,
    pending: Cell<Option<PendingTimer>>,
}

thread_local! {
    static HOST: RefCell<Option<Rc<Host>>> = const { RefCell::new(None) };
}

/// Start pricetrail on the current page.
///
/// `config_json` is a `LensConfig` object in JSON; absent means defaults.
/// Returns `false` when the page is already claimed, the config is invalid
/// or the browser APIs are unavailable. Never throws.
#[wasm_bindgen]
pub fn mount(config_json: Option<String>) -> bool {
    logging::install_panic_hook();
    logging::init(tracing::Level::INFO);
    match try_mount(config_json.as_deref()) {
        Ok(mounted) => mounted,
        Err(err) => {
            tracing::warn!(target: "pricetrail.web", error = ?err, "mount failed");
            false
        }
    }
}

fn try_mount(config_json: Option<&str>) -> Result<bool, JsValue> {
    let config = match bridge::config_from_host(config_json) {
        Ok(config) => config,
        Err(err) => {
            tracing::warn!(target: "pricetrail.web", error = %err, "config rejected");
            return Ok(false);
        }
    };
    let Some(doc) = WebDocument::from_window() else {
        tracing::debug!(target: "pricetrail.web", "no window document");
        return Ok(false);
    };

    let window = doc.window().clone();
    let missing = bridge::missing_globals(|name| {
        js_sys::Reflect::has(&window, &JsValue::from_str(name)).unwrap_or(false)
    });
    if !missing.is_empty() {
        tracing::warn!(target: "pricetrail.web", ?missing, "browser lacks required APIs");
        return Ok(false);
    }
    let caps = HostCapabilities {
        privileged_proxy: proxy::privileged_context_available(),
    };
    let idle_timeout_ms = u32::try_from(config.idle_timeout_ms).unwrap_or(u32::MAX);
    let epoch = Instant::now();
    let lens = match PriceLens::start(doc, config, caps, Duration::ZERO) {
        Ok(lens) => lens,
        Err(err) => {
            tracing::info!(target: "pricetrail.web", error = %err, "not mounting");
            return Ok(false);
        }
    };

    let host = Rc::new(Host {
        lens: RefCell::new(lens),
        window,
        epoch,
        idle_timeout_ms,
        viewport: RefCell::new(None),
        wake: RefCell::new(None),
        pending: Cell::new(None),
    });
    if let Err(err) = host.install() {
        // The guard is already claimed, so no other instance will take over.
        tracing::error!(
            target: "pricetrail.web",
            error = ?err,
            "host install failed after claiming the page"
        );
        return Err(err);
    }
    host.pump();
    HOST.with(|slot| *slot.borrow_mut() = Some(host));
    Ok(true)
}

impl Host {
    fn now(&self) -> Duration {
        self.epoch.elapsed()
    }

    fn install(self: &Rc<Self>) -> Result<(), JsValue> {
        let weak = Rc::downgrade(self);
        let wake = Closure::<dyn FnMut()>::wrap(Box::new(move || {
            if let Some(host) = weak.upgrade() {
                host.pending.set(None);
                host.dispatch(|_| {});
            }
        }));
        *self.wake.borrow_mut() = Some(wake);

        self.install_viewport_observer()?;
        self.install_mutation_observer()?;
        self.install_image_listeners()?;

        let weak = Rc::downgrade(self);
        history::install(&self.window, move |signal| {
            if let Some(host) = weak.upgrade() {
                host.dispatch(|lens| lens.on_signal(signal));
            }
        })?;
        Ok(())
    }

    fn install_viewport_observer(self: &Rc<Self>) -> Result<(), JsValue> {
        let weak = Rc::downgrade(self);
        let on_entries = Closure::<dyn FnMut(Array, IntersectionObserver)>::wrap(Box::new(
            move |entries: Array, _observer: IntersectionObserver| {
                let Some(host) = weak.upgrade() else {
                    return;
                };
                let visible: Vec<Element> = entries
                    .iter()
                    .filter_map(|entry| entry.dyn_into::<IntersectionObserverEntry>().ok())
                    .filter(IntersectionObserverEntry::is_intersecting)
                    .map(|entry| entry.target())
                    .collect();
                if !visible.is_empty() {
                    host.dispatch(|lens| {
                        for image in &visible {
                            lens.on_intersection(image);
                        }
                    });
                }
            },
        ));

        let init = IntersectionObserverInit::new();
        init.set_root_margin(&self.lens.borrow().config().root_margin());
        let observer =
            IntersectionObserver::new_with_options(on_entries.as_ref().unchecked_ref(), &init)?;
        on_entries.forget();
        *self.viewport.borrow_mut() = Some(observer);
        Ok(())
    }

    fn install_mutation_observer(self: &Rc<Self>) -> Result<(), JsValue> {
        let weak = Rc::downgrade(self);
        let on_mutation = Closure::<dyn FnMut(Array, MutationObserver)>::wrap(Box::new(
            move |_records: Array, _observer: MutationObserver| {
                if let Some(host) = weak.upgrade() {
                    host.dispatch(|lens| lens.on_signal(PageSignal::Mutation));
                }
            },
        ));
        let observer = MutationObserver::new(on_mutation.as_ref().unchecked_ref())?;
        on_mutation.forget();

        let init = MutationObserverInit::new();
        init.set_child_list(true);
        init.set_subtree(true);
        let target: Node = {
            let lens = self.lens.borrow();
            let raw = lens.document().raw();
            match raw.body() {
                Some(body) => body.into(),
                None => raw
                    .document_element()
                    .ok_or_else(|| JsValue::from_str("document has no root element"))?
                    .into(),
            }
        };
        observer.observe_with_options(&target, &init)
    }

    /// Image `load`/`error` do not bubble; listen in the capture phase on the
    /// document so one listener covers every panel image.
    fn install_image_listeners(self: &Rc<Self>) -> Result<(), JsValue> {
        let raw = self.lens.borrow().document().raw().clone();
        for (kind, loaded) in [("load", true), ("error", false)] {
            let weak = Rc::downgrade(self);
            let listener = Closure::<dyn FnMut(Event)>::wrap(Box::new(move |event: Event| {
                // Page images the loader never saw are skipped before any borrow.
                let Some(image) = event.target().and_then(WebDocument::tracked_image) else {
                    return;
                };
                let Some(host) = weak.upgrade() else {
                    return;
                };
                host.dispatch(|lens| {
                    if loaded {
                        lens.on_image_load(&image);
                    } else {
                        lens.on_image_error(&image);
                    }
                });
            }));
            let options = AddEventListenerOptions::new();
            options.set_capture(true);
            raw.add_event_listener_with_callback_and_add_event_listener_options(
                kind,
                listener.as_ref().unchecked_ref(),
                &options,
            )?;
            listener.forget();
        }
        Ok(())
    }

    /// Deliver one event to the lens, then pump.
    fn dispatch(self: &Rc<Self>, deliver: impl FnOnce(&mut PriceLens<WebDocument>)) {
        let now = self.now();
        match self.lens.try_borrow_mut() {
            Ok(mut lens) => {
                lens.advance_to(now);
                deliver(&mut lens);
            }
            Err(_) => {
                tracing::debug!(target: "pricetrail.web", "reentrant callback dropped");
                return;
            }
        }
        self.pump();
    }

    fn pump(self: &Rc<Self>) {
        let (commands, wakeup) = match self.lens.try_borrow_mut() {
            Ok(mut lens) => {
                let commands: Vec<_> = lens.drain_commands().collect();
                (commands, lens.next_wakeup())
            }
            Err(_) => return,
        };

        for command in commands {
            match command {
                HostCommand::Observe { node, .. } => {
                    if let Some(observer) = self.viewport.borrow().as_ref() {
                        observer.observe(&node);
                    }
                }
                HostCommand::Unobserve { node } => {
                    if let Some(observer) = self.viewport.borrow().as_ref() {
                        observer.unobserve(&node);
                    }
                }
                HostCommand::SendProxy { id, request } => self.send_proxy(id, request),
            }
        }
        self.rearm(wakeup);
    }

    fn send_proxy(self: &Rc<Self>, id: ProxyRequestId, request: ProxyRequest) {
        let weak = Rc::downgrade(self);
        wasm_bindgen_futures::spawn_local(async move {
            let outcome = proxy::send(&request).await;
            let Some(host) = weak.upgrade() else {
                return;
            };
            match outcome {
                Ok(reply) => host.dispatch(|lens| lens.on_proxy_response(id, &reply)),
                Err(err) => {
                    tracing::debug!(
                        target: "pricetrail.proxy",
                        request = id.0,
                        error = ?err,
                        "proxy message not delivered"
                    );
                    host.dispatch(|lens| lens.on_proxy_failure(id));
                }
            }
        });
    }

    fn rearm(&self, wakeup: Option<Wakeup>) {
        if let Some(previous) = self.pending.take() {
            match previous {
                PendingTimer::Timeout(handle) => self.window.clear_timeout_with_handle(handle),
                PendingTimer::Idle(handle) => self.window.cancel_idle_callback(handle),
            }
        }
        let Some(wakeup) = wakeup else {
            return;
        };
        let wake = self.wake.borrow();
        let Some(callback) = wake.as_ref() else {
            return;
        };
        let callback: &Function = callback.as_ref().unchecked_ref();

        let delay = bridge::timer_delay_ms(self.now(), wakeup);
        let scheduled = match wakeup.lane {
            Lane::Idle if delay == 0 => {
                let options = IdleRequestOptions::new();
                options.set_timeout(self.idle_timeout_ms);
                // Browsers without requestIdleCallback fall back to a timeout.
                self.window
                    .request_idle_callback_with_options(callback, &options)
                    .map(PendingTimer::Idle)
                    .or_else(|_| self.set_timeout(callback, 0))
            }
            _ => self.set_timeout(callback, delay),
        };
        match scheduled {
            Ok(timer) => self.pending.set(Some(timer)),
            Err(err) => {
                tracing::warn!(target: "pricetrail.web", error = ?err, "failed to arm timer");
            }
        }
    }

    fn set_timeout(&self, callback: &Function, delay_ms: i32) -> Result<PendingTimer, JsValue> {
        self.window
            .set_timeout_with_callback_and_timeout_and_arguments_0(callback, delay_ms)
            .map(PendingTimer::Timeout)
    }
}
