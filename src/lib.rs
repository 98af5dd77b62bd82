//! Umbrella crate for the storefront core.
//!
//! Hosts depend on `storefront-workspace` and get [`core_service::CoreService`]
//! with the desktop bridges (`reqwest`, `tokio::fs`, SQLite settings) wired in
//! through the default `desktop-shims` feature.

#[cfg(feature = "desktop-shims")]
pub use core_service;
