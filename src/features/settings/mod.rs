//! # Settings Feature
//!
//! "Purchase Enhancement Settings" document: feature flags, thresholds and retention.
//!
//! - **Version**: 1.1.0
//! - **Since**: 1.0.0
//! - **Toggleable**: false
//!
//! ## Changelog
//! - 1.1.0: YAML seed file support
//! - 1.0.0: Initial release

pub mod document;
pub mod store;

pub use document::{Settings, SETTINGS_DOCTYPE};
pub use store::SettingsStore;
