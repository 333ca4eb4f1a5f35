//! # hydrate-settings
//!
//! Gateway configuration, loaded in layers (later layers win):
//! 1. **Compiled defaults**: [`GatewaySettings::default()`]
//! 2. **Settings file**: `$HYDRATE_CONFIG` or `~/.hydrate/settings.json`,
//!    deep-merged over the defaults
//! 3. **Environment variables**: `HYDRATE_*` overrides
//!
//! Command-line flags are applied on top by the binary.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{deep_merge, load_settings, load_settings_from_path, settings_path};
pub use types::*;
