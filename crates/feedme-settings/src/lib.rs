//! # feedme-settings
//!
//! Layered configuration loading for a standalone feedme server process.
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults** — [`TransportSettings::default()`]
//! 2. **User file** — `~/.feedme/settings.json`
//! 3. **Environment variables** — `FEEDME_*` overrides (highest priority)
//!
//! # Usage
//!
//! ```no_run
//! use feedme_settings::get_settings;
//!
//! let settings = get_settings();
//! println!("port: {}", settings.port);
//! ```

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{load_settings, load_settings_from_path, settings_path};
pub use types::TransportSettings;

use std::sync::OnceLock;

/// Global settings singleton.
///
/// Initialized on first access via [`get_settings`]. Falls back to compiled
/// defaults if loading fails.
static SETTINGS: OnceLock<TransportSettings> = OnceLock::new();

/// Get the global settings instance, loading it on first access.
pub fn get_settings() -> &'static TransportSettings {
    SETTINGS.get_or_init(|| load_settings().unwrap_or_default())
}

/// Initialize the global settings with a specific value.
///
/// # Errors
///
/// Returns the provided settings back if the global was already initialized.
#[allow(clippy::result_large_err)]
pub fn init_settings(settings: TransportSettings) -> std::result::Result<(), TransportSettings> {
    SETTINGS.set(settings)
}
