//! JSON settings file with named connection strings.
//!
//! Mirrors the conventional `appsettings.json` shape:
//!
//! ```json
//! { "ConnectionStrings": { "DbConnection": "sqlite://patients.db" } }
//! ```

use crate::{DiapredError, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

/// Parsed settings file.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Settings {
    #[serde(rename = "ConnectionStrings", default)]
    connection_strings: HashMap<String, String>,
}

impl Settings {
    /// Load settings from a JSON file.
    ///
    /// A missing file yields empty settings; whether that is fatal is
    /// decided by [`Settings::connection_string`], which still has the
    /// caller-supplied fallback to fall back on.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path).map_err(|e| {
            DiapredError::Config(format!(
                "Failed to read settings file {}: {e}",
                path.display()
            ))
        })?;
        serde_json::from_str(&contents)
            .map_err(|e| DiapredError::Config(format!("Failed to parse settings JSON: {e}")))
    }

    /// Look up a named connection string, with `fallback` standing in when
    /// the file does not define one. Returns [`DiapredError::Config`] when
    /// both are absent: the program cannot proceed without a data source.
    pub fn connection_string(&self, name: &str, fallback: Option<&str>) -> Result<String> {
        self.connection_strings
            .get(name)
            .map(String::as_str)
            .or(fallback)
            .map(str::to_owned)
            .ok_or_else(|| {
                DiapredError::Config(format!(
                    "Connection string '{name}' is not configured and no fallback was supplied"
                ))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    /// Helper to write JSON to a temp file and return the handle.
    fn write_json(json: &str) -> NamedTempFile {
        let mut f = NamedTempFile::new().unwrap();
        f.write_all(json.as_bytes()).unwrap();
        f
    }

    #[test]
    fn test_load_and_lookup() {
        let f = write_json(r#"{"ConnectionStrings": {"DbConnection": "sqlite://patients.db"}}"#);
        let settings = Settings::load(f.path()).unwrap();
        let conn = settings.connection_string("DbConnection", None).unwrap();
        assert_eq!(conn, "sqlite://patients.db");
    }

    #[test]
    fn test_missing_file_is_tolerated_with_fallback() {
        let settings = Settings::load(Path::new("/nonexistent/appsettings.json")).unwrap();
        let conn = settings
            .connection_string("DbConnection", Some("sqlite::memory:"))
            .unwrap();
        assert_eq!(conn, "sqlite::memory:");
    }

    #[test]
    fn test_missing_everywhere_is_fatal() {
        let settings = Settings::default();
        let err = settings.connection_string("DbConnection", None).unwrap_err();
        assert!(err.to_string().contains("DbConnection"));
    }

    #[test]
    fn test_file_value_wins_over_fallback() {
        let f = write_json(r#"{"ConnectionStrings": {"DbConnection": "sqlite://a.db"}}"#);
        let settings = Settings::load(f.path()).unwrap();
        let conn = settings
            .connection_string("DbConnection", Some("sqlite://b.db"))
            .unwrap();
        assert_eq!(conn, "sqlite://a.db");
    }

    #[test]
    fn test_invalid_json_fails() {
        let f = write_json("{not json");
        let result = Settings::load(f.path());
        assert!(result.is_err());
    }
}
