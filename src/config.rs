//! Map options.
//!
//! Options can be built in code or loaded from TOML:
//!
//! ```toml
//! zoom = 5
//! min_zoom = 2
//! max_zoom = 18
//! center = { lng = 2.35, lat = 48.85 }
//! units = "metric"
//! attribution_separator = " · "
//!
//! [visibility]
//! beta = true
//!
//! [trace]
//! level = "debug"
//! file = "/tmp/mapweave-otlp.json"
//! ```
//!
//! Zoom values are 1-based user zoom levels.

use crate::domain::error::{MapError, Result};
use crate::domain::geo::LngLat;
use crate::observability::TraceConfig;
use crate::style::visibility::{Flags, Units};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default separator between formatted attributions.
pub const DEFAULT_ATTRIBUTION_SEPARATOR: &str = " | ";

/// Construction options of a [`Map`](crate::Map).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MapOptions {
    /// Initial zoom.
    pub zoom: Option<f64>,
    /// Lowest zoom the camera may reach.
    pub min_zoom: Option<f64>,
    /// Highest zoom the camera may reach.
    pub max_zoom: Option<f64>,
    /// Initial camera center.
    pub center: Option<LngLat>,

    /// Flags evaluated against layer visibility predicates.
    pub visibility: Flags,

    /// Unit-tagged layers are left untouched while `None`.
    pub units: Option<Units>,

    /// Separator used by [`Map::attribution_text`](crate::Map::attribution_text).
    pub attribution_separator: String,

    /// Tracing setup. The default leaves the global subscriber alone.
    pub trace: TraceConfig,
}

impl Default for MapOptions {
    fn default() -> Self {
        Self {
            zoom: None,
            min_zoom: None,
            max_zoom: None,
            center: None,
            visibility: Flags::new(),
            units: None,
            attribution_separator: DEFAULT_ATTRIBUTION_SEPARATOR.to_string(),
            trace: TraceConfig::default(),
        }
    }
}

impl MapOptions {
    /// Parses options from a TOML document.
    ///
    /// # Errors
    ///
    /// Returns [`MapError::Config`] if the document is not valid TOML, has
    /// unknown keys, or describes an impossible zoom range.
    ///
    /// # Examples
    ///
    /// ```
    /// use mapweave::{MapOptions, Units};
    ///
    /// let options = MapOptions::from_toml_str("zoom = 4\nunits = \"imperial\"")?;
    /// assert_eq!(options.zoom, Some(4.0));
    /// assert_eq!(options.units, Some(Units::Imperial));
    ///
    /// assert!(MapOptions::from_toml_str("min_zoom = 9\nmax_zoom = 3").is_err());
    /// # Ok::<(), mapweave::MapError>(())
    /// ```
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let options: Self = toml::from_str(content)
            .map_err(|e| MapError::Config(format!("failed to parse map options: {e}")))?;
        options.validate()?;
        Ok(options)
    }

    /// Loads options from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`MapError::Io`] if the file cannot be read, otherwise the
    /// errors of [`MapOptions::from_toml_str`].
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        tracing::debug!(path = %path.display(), "loaded map options");
        Self::from_toml_str(&content)
    }

    /// Checks the zoom options for consistency.
    ///
    /// Called by [`MapOptions::from_toml_str`] and by
    /// [`Map::new`](crate::Map::new), so options built in code are checked
    /// too.
    ///
    /// # Errors
    ///
    /// Returns [`MapError::Config`] for non-finite zoom values or
    /// `min_zoom > max_zoom`.
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("zoom", self.zoom),
            ("min_zoom", self.min_zoom),
            ("max_zoom", self.max_zoom),
        ] {
            if value.is_some_and(|v| !v.is_finite()) {
                return Err(MapError::Config(format!("{name} must be finite")));
            }
        }
        if let (Some(min), Some(max)) = (self.min_zoom, self.max_zoom) {
            if min > max {
                return Err(MapError::Config(format!(
                    "min_zoom {min} is greater than max_zoom {max}"
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults() {
        let options = MapOptions::from_toml_str("").unwrap();
        assert_eq!(options, MapOptions::default());
        assert_eq!(options.attribution_separator, " | ");
        assert!(options.visibility.is_empty());
        assert_eq!(options.units, None);
    }

    #[test]
    fn full_document() {
        let options = MapOptions::from_toml_str(
            r#"
            zoom = 5
            center = { lng = 2.35, lat = 48.85 }
            units = "imperial"

            [visibility]
            beta = true

            [trace]
            level = "debug"
            "#,
        )
        .unwrap();
        assert_eq!(options.zoom, Some(5.0));
        assert_eq!(options.center, Some(LngLat::new(2.35, 48.85)));
        assert_eq!(options.units, Some(Units::Imperial));
        assert_eq!(options.visibility.get("beta"), Some(&true));
        assert_eq!(options.trace.level.as_deref(), Some("debug"));
    }

    #[test]
    fn rejects_inverted_zoom_range_and_unknown_keys() {
        assert!(MapOptions::from_toml_str("min_zoom = 10\nmax_zoom = 2").is_err());
        assert!(MapOptions::from_toml_str("zooom = 3").is_err());
    }

    #[test]
    fn from_file_reads_toml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "max_zoom = 18").unwrap();
        let options = MapOptions::from_file(file.path()).unwrap();
        assert_eq!(options.max_zoom, Some(18.0));
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = MapOptions::from_file(dir.path().join("absent.toml")).unwrap_err();
        assert!(matches!(err, MapError::Io(_)));
    }
}
