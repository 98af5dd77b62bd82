//! # Core Runtime Module
//!
//! Foundational runtime infrastructure shared by the storefront crates:
//! - Logging and tracing setup with field redaction
//! - Configuration (`CoreConfig`) with validation and fail-fast capability checks
//! - The in-process event bus used for cache and media notifications
//!
//! ## Overview
//!
//! Everything here is domain-light. Media uploads live in `core-media` and the
//! polled content cache lives in `core-content`; both take their settings from
//! [`config::CoreConfig`] and publish on [`events::EventBus`].

pub mod config;
pub mod error;
pub mod events;
pub mod logging;

pub use error::{Error, Result};
