#![forbid(unsafe_code)]

//! Deterministic runtime for pricetrail.
//!
//! # Role in pricetrail
//! `pricetrail-runtime` turns host events into page changes: it decides when
//! to reconcile (throttled mutations, settled navigations), keeps exactly one
//! panel for the current product and walks each chart image through the
//! lazy-load and proxy-fallback protocol.
//!
//! # Design
//! Nothing here reads a clock, spawns a timer or touches a browser API. The
//! host advances time explicitly, services [`timer::Wakeup`]s and performs
//! the [`effects::HostCommand`]s it drains after every call. That keeps the
//! whole lifecycle reproducible in native tests, with the same code running
//! inside the `wasm32` binding.
//!
//! # Example
//! ```
//! use pricetrail_core::LensConfig;
//! use pricetrail_core::testing::MemoryDocument;
//! use pricetrail_runtime::{HostCapabilities, PriceLens};
//! use std::time::Duration;
//!
//! let doc = MemoryDocument::product_page("B000000001");
//! let mut lens = PriceLens::start(
//!     doc,
//!     LensConfig::default(),
//!     HostCapabilities::default(),
//!     Duration::ZERO,
//! )
//! .unwrap();
//! lens.advance_to(Duration::from_millis(1));
//! assert_eq!(lens.document().count(".pricetrail-panel"), 1);
//! ```

pub mod controller;
pub mod effects;
pub mod lens;
pub mod loader;
pub mod throttle;
pub mod timer;
pub mod watcher;

pub use controller::{PanelState, ReconcileOutcome, RenderController};
pub use effects::{Effects, HostCommand, ProxyRequestId};
pub use lens::{HostCapabilities, LensError, LensStats, PriceLens};
pub use loader::{AssetState, FinalFailure, ImageKey, LazyAssetLoader, LoadPath, PrimaryFailure};
pub use throttle::{LeadingEdgeThrottle, ThrottleDecision};
pub use timer::{DeterministicClock, Lane, Task, TimerQueue, Wakeup};
pub use watcher::{ChangeWatcher, PageSignal, WatchDecision, WatcherStats};
