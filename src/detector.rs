//! Object detector interface.
//!
//! The session treats detection as a black box that turns a frame into
//! labelled boxes above a confidence threshold. `SidecarDetector` serves
//! precomputed results from a JSON file keyed by frame filename.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use crate::frames::Frame;
use crate::model::BBox;

/// One raw detector result.
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    /// Class label as reported by the model
    pub label: String,
    pub confidence: f32,
    pub bbox: BBox,
}

/// Errors raised by a detector backend.
#[derive(Error, Debug)]
pub enum DetectorError {
    #[error("IO error reading {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid detections file {path:?}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
}

/// Produces detections for a frame.
pub trait Detector {
    /// Short name used in log messages.
    fn name(&self) -> &str;

    /// Detect objects in `frame`, returning only results at or above
    /// `confidence_threshold`.
    fn detect(
        &mut self,
        frame: &Frame,
        confidence_threshold: f32,
    ) -> Result<Vec<Detection>, DetectorError>;
}

#[derive(Debug, Deserialize)]
struct SidecarEntry {
    label: String,
    confidence: f32,
    bbox: [f32; 4],
}

/// Detector backed by a JSON file of precomputed detections.
///
/// The file maps frame filenames to lists of
/// `{"label": .., "confidence": .., "bbox": [x1, y1, x2, y2]}`.
#[derive(Debug)]
pub struct SidecarDetector {
    entries: HashMap<String, Vec<SidecarEntry>>,
}

impl SidecarDetector {
    /// Load detections from `path`.
    pub fn load(path: &Path) -> Result<Self, DetectorError> {
        let text = std::fs::read_to_string(path).map_err(|source| DetectorError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let entries: HashMap<String, Vec<SidecarEntry>> =
            serde_json::from_str(&text).map_err(|source| DetectorError::Parse {
                path: path.to_path_buf(),
                source,
            })?;

        log::info!(
            "Loaded precomputed detections for {} frames from {:?}",
            entries.len(),
            path
        );
        Ok(Self { entries })
    }
}

impl Detector for SidecarDetector {
    fn name(&self) -> &str {
        "sidecar"
    }

    fn detect(
        &mut self,
        frame: &Frame,
        confidence_threshold: f32,
    ) -> Result<Vec<Detection>, DetectorError> {
        let Some(entries) = self.entries.get(&frame.filename) else {
            return Ok(Vec::new());
        };

        Ok(entries
            .iter()
            .filter(|e| e.confidence >= confidence_threshold)
            .map(|e| Detection {
                label: e.label.clone(),
                confidence: e.confidence,
                bbox: BBox::new(
                    e.bbox[0] as i32,
                    e.bbox[1] as i32,
                    e.bbox[2] as i32,
                    e.bbox[3] as i32,
                ),
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ImageShape;
    use tempfile::TempDir;

    fn frame(name: &str) -> Frame {
        Frame::blank(name, ImageShape::new(64, 48))
    }

    #[test]
    fn test_sidecar_filters_by_threshold() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("detections.json");
        std::fs::write(
            &path,
            r#"{"1.jpg": [
                {"label": "carro", "confidence": 0.9, "bbox": [10.7, 20.2, 110.9, 220.0]},
                {"label": "trator", "confidence": 0.2, "bbox": [0, 0, 50, 50]}
            ]}"#,
        )
        .unwrap();

        let mut detector = SidecarDetector::load(&path).unwrap();
        let found = detector.detect(&frame("1.jpg"), 0.35).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].label, "carro");
        assert_eq!(found[0].bbox, BBox::new(10, 20, 110, 220));

        assert!(detector.detect(&frame("2.jpg"), 0.35).unwrap().is_empty());
    }

    #[test]
    fn test_sidecar_rejects_bad_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("detections.json");
        std::fs::write(&path, "[1, 2]").unwrap();
        assert!(matches!(
            SidecarDetector::load(&path),
            Err(DetectorError::Parse { .. })
        ));
        assert!(matches!(
            SidecarDetector::load(&dir.path().join("missing.json")),
            Err(DetectorError::Io { .. })
        ));
    }
}
