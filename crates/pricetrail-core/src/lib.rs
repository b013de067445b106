#![forbid(unsafe_code)]

//! Core types for pricetrail.
//!
//! pricetrail draws a price-history chart next to the product on retail
//! product pages and keeps it correct while the page navigates without
//! reloading.
//!
//! # Role in pricetrail
//! This crate holds everything that does not depend on time or on the host
//! environment: identifier parsing and resolution, anchor placement, the
//! document guard, provider templates, configuration and the privileged
//! proxy protocol. It talks to the page only through [`dom::Document`].
//!
//! # How it fits in the system
//! `pricetrail-runtime` drives these pieces from host events and timers;
//! `pricetrail-web` implements [`dom::Document`] over `web-sys`.

pub mod config;
pub mod dom;
pub mod guard;
pub mod identifier;
pub mod marketplace;
pub mod panel;
pub mod placement;
pub mod provider;
pub mod proxy;

#[cfg(any(test, feature = "test-helpers"))]
pub mod testing;

pub use config::{ConfigError, LensConfig};
pub use dom::{Document, PanelNodes};
pub use guard::ProcessGuard;
pub use identifier::{
    IdentifierError, IdentifierResolver, IdentifierSource, ProductIdentifier, ResolvedIdentifier,
};
pub use marketplace::Marketplace;
pub use panel::{PanelMarkup, PanelSection};
pub use placement::{Landmark, PlacementResolver};
pub use provider::ProviderConfig;
pub use proxy::{ProtocolError, ProxyPolicy, ProxyRequest, ProxyResponse};
