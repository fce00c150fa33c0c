//! Layered settings loading: compiled defaults, an optional JSON file, then
//! environment variable overrides, via `figment`.

use std::path::PathBuf;

use figment::Figment;
use figment::providers::{Env, Format, Json, Serialized};

use crate::errors::{Result, SettingsError};
use crate::types::TransportSettings;

/// Environment variable prefix for settings overrides (e.g.
/// `FEEDME_PORT=9000`).
const ENV_PREFIX: &str = "FEEDME_";

/// Resolve the default settings file path, `~/.feedme/settings.json`.
#[must_use]
pub fn settings_path() -> PathBuf {
    let home = std::env::var_os("HOME").map_or_else(|| PathBuf::from("."), PathBuf::from);
    home.join(".feedme").join("settings.json")
}

/// Load settings from the default path, merging env var overrides.
///
/// Missing files are treated as empty layers, not errors; a malformed file
/// or an out-of-range value is reported.
pub fn load_settings() -> Result<TransportSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from an explicit path, merging env var overrides.
pub fn load_settings_from_path(path: &std::path::Path) -> Result<TransportSettings> {
    let figment = Figment::new()
        .merge(Serialized::defaults(TransportSettings::default()))
        .merge(Json::file(path))
        .merge(Env::prefixed(ENV_PREFIX));

    let settings: TransportSettings = figment.extract().map_err(SettingsError::from)?;
    validate(&settings)?;
    Ok(settings)
}

fn validate(settings: &TransportSettings) -> Result<()> {
    if settings.heartbeat_interval_ms > 0
        && settings.heartbeat_timeout_ms >= settings.heartbeat_interval_ms
    {
        return Err(SettingsError::InvalidValue(format!(
            "heartbeat_timeout_ms ({}) must be strictly less than heartbeat_interval_ms ({}) when heartbeats are enabled",
            settings.heartbeat_timeout_ms, settings.heartbeat_interval_ms
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let settings = load_settings_from_path(std::path::Path::new("/nonexistent/settings.json")).unwrap();
        assert_eq!(settings, TransportSettings::default());
    }

    #[test]
    fn file_overrides_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"port": 9000, "host": "0.0.0.0"}}"#).unwrap();
        let settings = load_settings_from_path(file.path()).unwrap();
        assert_eq!(settings.port, 9000);
        assert_eq!(settings.host, "0.0.0.0");
        assert_eq!(settings.heartbeat_interval_ms, 5000);
    }

    #[test]
    #[allow(unsafe_code)]
    fn env_overrides_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"port": 9000}}"#).unwrap();
        // SAFETY: test is single-threaded with respect to this env var.
        unsafe {
            std::env::set_var("FEEDME_PORT", "9500");
        }
        let settings = load_settings_from_path(file.path()).unwrap();
        unsafe {
            std::env::remove_var("FEEDME_PORT");
        }
        assert_eq!(settings.port, 9500);
    }

    #[test]
    fn invalid_heartbeat_relationship_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"heartbeat_interval_ms": 1000, "heartbeat_timeout_ms": 1000}}"#).unwrap();
        let err = load_settings_from_path(file.path()).unwrap_err();
        assert!(matches!(err, SettingsError::InvalidValue(_)));
    }

    #[test]
    fn zero_interval_admits_any_timeout() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"heartbeat_interval_ms": 0, "heartbeat_timeout_ms": 999999}}"#).unwrap();
        let settings = load_settings_from_path(file.path()).unwrap();
        assert_eq!(settings.heartbeat_interval_ms, 0);
        assert_eq!(settings.heartbeat_timeout_ms, 999_999);
    }
}
