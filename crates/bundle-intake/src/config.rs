//! JSON configuration and symbol sidecar files.

use std::fs;
use std::path::{Path, PathBuf};

use bundle_intake_fiducial::{FiducialDecoder, PageTemplate, QuadrantBands, RawSymbol};
use serde::{Deserialize, Serialize};

#[derive(thiserror::Error, Debug)]
pub enum IntakeIoError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Tunables of the intake pipeline.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IntakeConfig {
    pub template: PageTemplate,
    pub bands: QuadrantBands,
    /// Assessment spec to load when none is supplied directly.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub spec_path: Option<PathBuf>,
}

impl IntakeConfig {
    /// Load a JSON config from disk.
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, IntakeIoError> {
        let raw = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<(), IntakeIoError> {
        let raw = serde_json::to_string_pretty(self)?;
        fs::write(path, raw)?;
        Ok(())
    }

    pub fn decoder(&self) -> FiducialDecoder {
        FiducialDecoder::new(self.bands)
    }
}

/// Symbols already read from one page raster, stored next to the scan.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SymbolSidecar {
    pub width: usize,
    pub height: usize,
    #[serde(default)]
    pub symbols: Vec<RawSymbol>,
}

impl SymbolSidecar {
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, IntakeIoError> {
        let raw = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<(), IntakeIoError> {
        let raw = serde_json::to_string_pretty(self)?;
        fs::write(path, raw)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_object_is_default_config() {
        let cfg: IntakeConfig = serde_json::from_str("{}").expect("parse");
        assert_eq!(cfg, IntakeConfig::default());
        assert_eq!(cfg.bands.low, 0.4);
        assert_eq!(cfg.template.page_height, 2000);
    }

    #[test]
    fn config_round_trips_through_disk() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("intake.json");
        let cfg = IntakeConfig {
            bands: QuadrantBands {
                low: 0.3,
                high: 0.7,
            },
            spec_path: Some(PathBuf::from("spec.json")),
            ..IntakeConfig::default()
        };
        cfg.write_json(&path).expect("write");
        assert_eq!(IntakeConfig::load_json(&path).expect("load"), cfg);
    }

    #[test]
    fn sidecar_polygons_are_point_arrays() {
        let sidecar: SymbolSidecar = serde_json::from_str(
            r#"{"width": 100, "height": 200, "symbols": [
                {"text": "plomX", "polygon": [[1.0, 2.0], [3.0, 4.0]]}
            ]}"#,
        )
        .expect("parse");
        assert_eq!(sidecar.symbols.len(), 1);
        let c = sidecar.symbols[0].centroid().expect("outline");
        assert_eq!((c.x, c.y), (2.0, 3.0));
    }
}
