//! Annotation data model.
//!
//! This module provides the persisted types for frame annotations:
//! - Bounding boxes in original image coordinates
//! - Annotations with optional category and subcategory labels
//! - Per-file records holding an ordered annotation list

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use super::category::CategoryRef;

// ============================================================================
// Geometry
// ============================================================================

/// A point in display (window) coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DisplayPoint {
    pub x: i32,
    pub y: i32,
}

impl DisplayPoint {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// Pixel dimensions of an image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageShape {
    pub width: u32,
    pub height: u32,
}

impl ImageShape {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Both dimensions are non-zero.
    pub fn is_valid(&self) -> bool {
        self.width > 0 && self.height > 0
    }
}

/// An axis-aligned bounding box `(x1, y1, x2, y2)` in original image pixels.
///
/// Serialized as a four element array to match the annotation document.
/// Fractional coordinates in older documents are truncated on read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "[f64; 4]", into = "[i32; 4]")]
pub struct BBox {
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
}

impl BBox {
    pub fn new(x1: i32, y1: i32, x2: i32, y2: i32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    /// Create a normalized box from two arbitrary corners.
    pub fn from_corners(ax: i32, ay: i32, bx: i32, by: i32) -> Self {
        Self {
            x1: ax.min(bx),
            y1: ay.min(by),
            x2: ax.max(bx),
            y2: ay.max(by),
        }
    }

    pub fn width(&self) -> i32 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> i32 {
        self.y2 - self.y1
    }

    /// Area in square pixels (zero for degenerate or inverted boxes).
    pub fn area(&self) -> i64 {
        if !self.is_valid() {
            return 0;
        }
        i64::from(self.width()) * i64::from(self.height())
    }

    /// `x1 < x2` and `y1 < y2`.
    pub fn is_valid(&self) -> bool {
        self.x1 < self.x2 && self.y1 < self.y2
    }

    /// Both dimensions reach `min` pixels.
    pub fn meets_min_size(&self, min: i32) -> bool {
        self.width() >= min && self.height() >= min
    }

    /// Inclusive point containment.
    pub fn contains(&self, x: i32, y: i32) -> bool {
        x >= self.x1 && x <= self.x2 && y >= self.y1 && y <= self.y2
    }

    /// Scale each axis independently, truncating toward zero.
    pub fn scaled(&self, scale_x: f32, scale_y: f32) -> Self {
        Self::from_corners(
            (self.x1 as f32 * scale_x) as i32,
            (self.y1 as f32 * scale_y) as i32,
            (self.x2 as f32 * scale_x) as i32,
            (self.y2 as f32 * scale_y) as i32,
        )
    }

    /// Intersection-over-Union with another box, in `[0, 1]`.
    pub fn iou(&self, other: &BBox) -> f32 {
        let ix1 = self.x1.max(other.x1);
        let iy1 = self.y1.max(other.y1);
        let ix2 = self.x2.min(other.x2);
        let iy2 = self.y2.min(other.y2);

        if ix2 < ix1 || iy2 < iy1 {
            return 0.0;
        }

        let intersection = i64::from(ix2 - ix1) * i64::from(iy2 - iy1);
        let union = self.area() + other.area() - intersection;
        if union <= 0 {
            return 0.0;
        }
        intersection as f32 / union as f32
    }

    /// Sort key for reading order: top edge, then left edge.
    pub fn reading_order(&self) -> (i32, i32) {
        (self.y1, self.x1)
    }
}

impl From<[i32; 4]> for BBox {
    fn from(v: [i32; 4]) -> Self {
        Self::new(v[0], v[1], v[2], v[3])
    }
}

impl From<[f64; 4]> for BBox {
    fn from(v: [f64; 4]) -> Self {
        Self::new(v[0] as i32, v[1] as i32, v[2] as i32, v[3] as i32)
    }
}

impl From<BBox> for [i32; 4] {
    fn from(b: BBox) -> Self {
        [b.x1, b.y1, b.x2, b.y2]
    }
}

// ============================================================================
// Annotations
// ============================================================================

/// Read an optional string field that older documents may store as a number.
fn lenient_text<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(s)) => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        Some(Value::Bool(b)) => Some(b.to_string()),
        _ => None,
    })
}

/// Read an annotation list, dropping items that cannot be interpreted.
///
/// The record itself always survives so its remaining annotations and
/// metadata are written back on the next save.
fn lenient_annotations<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Vec<Annotation>, D::Error> {
    let items = Vec::<Value>::deserialize(deserializer)?;
    Ok(items
        .into_iter()
        .filter_map(|item| match serde_json::from_value::<Annotation>(item) {
            Ok(ann) => Some(ann),
            Err(e) => {
                log::warn!("Dropping unreadable annotation: {}", e);
                None
            }
        })
        .collect())
}

/// Where an annotation came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnnotationSource {
    /// Drawn, repeated or re-classified by the operator
    #[default]
    Human,
    /// Confirmed detector output that was never edited
    Inference,
}

/// One labeled region within one image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Annotation {
    #[serde(default)]
    pub annotation_source: AnnotationSource,
    /// Absent in placeholder entries written by older tools
    #[serde(default)]
    pub bbox: Option<BBox>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub category_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub category_name: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub subcategory_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub subcategory_name: Option<String>,
}

impl Annotation {
    /// Create an annotation with an optional category and no subcategory.
    pub fn new(bbox: BBox, category: Option<&CategoryRef>, source: AnnotationSource) -> Self {
        Self {
            annotation_source: source,
            bbox: Some(bbox),
            category_id: category.map(|c| c.id.clone()),
            category_name: category.map(|c| c.name.clone()),
            subcategory_id: None,
            subcategory_name: None,
        }
    }

    /// The category as a pair, if classified.
    ///
    /// A missing name falls back to the id.
    pub fn category(&self) -> Option<CategoryRef> {
        let id = self.category_id.clone()?;
        let name = self.category_name.clone().unwrap_or_else(|| id.clone());
        Some(CategoryRef { id, name })
    }

    /// Overwrite the category and mark the annotation as human-edited.
    ///
    /// Returns false when nothing changed.
    pub fn set_category(&mut self, category: &CategoryRef) -> bool {
        let changed = self.category_id.as_deref() != Some(category.id.as_str())
            || self.category_name.as_deref() != Some(category.name.as_str())
            || self.annotation_source != AnnotationSource::Human;

        self.category_id = Some(category.id.clone());
        self.category_name = Some(category.name.clone());
        self.annotation_source = AnnotationSource::Human;
        changed
    }
}

/// The durable per-image container.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FileRecord {
    #[serde(deserialize_with = "lenient_annotations")]
    pub annotations: Vec<Annotation>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub original_path: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub created_at_iso: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub updated_at_iso: Option<String>,
}

impl FileRecord {
    /// Create an empty record stamped with `now` as both timestamps.
    pub fn created_at(now: String) -> Self {
        Self {
            annotations: Vec::new(),
            original_path: None,
            created_at_iso: Some(now.clone()),
            updated_at_iso: Some(now),
        }
    }

    pub fn has_annotations(&self) -> bool {
        !self.annotations.is_empty()
    }

    pub fn last(&self) -> Option<&Annotation> {
        self.annotations.last()
    }

    /// True if any annotation carries exactly this box.
    pub fn contains_bbox(&self, bbox: &BBox) -> bool {
        self.annotations.iter().any(|a| a.bbox == Some(*bbox))
    }

    /// True if any annotation carries the given category id.
    pub fn has_category(&self, category_id: &str) -> bool {
        self.annotations
            .iter()
            .any(|a| a.category_id.as_deref() == Some(category_id))
    }

    /// Annotation indices in reading order (top, then left).
    ///
    /// Annotations without a box come last.
    pub fn reading_order(&self) -> Vec<usize> {
        let mut indices: Vec<usize> = (0..self.annotations.len()).collect();
        indices.sort_by_key(|&i| {
            self.annotations[i]
                .bbox
                .map_or((i32::MAX, i32::MAX), |b| b.reading_order())
        });
        indices
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_corners_normalizes() {
        let b = BBox::from_corners(50, 80, 10, 20);
        assert_eq!(b, BBox::new(10, 20, 50, 80));
        assert_eq!(b.width(), 40);
        assert_eq!(b.height(), 60);
    }

    #[test]
    fn test_iou_identical_and_disjoint() {
        let a = BBox::new(0, 0, 100, 100);
        assert!((a.iou(&a) - 1.0).abs() < 1e-6);
        assert_eq!(a.iou(&BBox::new(200, 200, 300, 300)), 0.0);
    }

    #[test]
    fn test_iou_partial_overlap() {
        let a = BBox::new(0, 0, 100, 100);
        let b = BBox::new(50, 0, 150, 100);
        // 5000 / (10000 + 10000 - 5000)
        assert!((a.iou(&b) - 1.0 / 3.0).abs() < 1e-6);
    }

    #[test]
    fn test_bbox_serializes_as_array() {
        let json = serde_json::to_string(&BBox::new(1, 2, 3, 4)).unwrap();
        assert_eq!(json, "[1,2,3,4]");
        let back: BBox = serde_json::from_str("[5,6,7,8]").unwrap();
        assert_eq!(back, BBox::new(5, 6, 7, 8));
        let back: BBox = serde_json::from_str("[5.9,6.0,7.2,8]").unwrap();
        assert_eq!(back, BBox::new(5, 6, 7, 8));
    }

    #[test]
    fn test_legacy_annotation_fields() {
        let ann: Annotation = serde_json::from_str(
            r#"{"bbox": null, "category_id": 3, "category_name": "trator"}"#,
        )
        .unwrap();
        assert_eq!(ann.bbox, None);
        assert_eq!(ann.category_id.as_deref(), Some("3"));
        assert_eq!(ann.annotation_source, AnnotationSource::Human);

        let value = serde_json::to_value(&ann).unwrap();
        assert!(value["bbox"].is_null());
        assert_eq!(value["category_id"], "3");
    }

    #[test]
    fn test_record_keeps_readable_annotations() {
        let record: FileRecord = serde_json::from_str(
            r#"{"annotations": [
                "not an annotation",
                {"bbox": [1, 2, 30, 40], "category_id": "1"},
                {"bbox": [1, 2]}
            ], "original_path": "frames/a.jpg"}"#,
        )
        .unwrap();
        assert_eq!(record.annotations.len(), 1);
        assert_eq!(record.annotations[0].bbox, Some(BBox::new(1, 2, 30, 40)));
        assert_eq!(record.original_path.as_deref(), Some("frames/a.jpg"));
    }

    #[test]
    fn test_annotation_source_lowercase() {
        let ann = Annotation::new(BBox::new(0, 0, 20, 20), None, AnnotationSource::Inference);
        let value = serde_json::to_value(&ann).unwrap();
        assert_eq!(value["annotation_source"], "inference");
        assert!(value["category_id"].is_null());
        assert!(value["subcategory_name"].is_null());
    }

    #[test]
    fn test_set_category_forces_human() {
        let cat = CategoryRef::new("3", "trator");
        let mut ann = Annotation::new(BBox::new(0, 0, 20, 20), Some(&cat), AnnotationSource::Inference);
        assert!(ann.set_category(&cat));
        assert_eq!(ann.annotation_source, AnnotationSource::Human);
        assert!(!ann.set_category(&cat));
    }

    #[test]
    fn test_reading_order() {
        let mut record = FileRecord::default();
        for bbox in [
            BBox::new(300, 50, 350, 90),
            BBox::new(10, 10, 40, 40),
            BBox::new(100, 50, 150, 90),
        ] {
            record
                .annotations
                .push(Annotation::new(bbox, None, AnnotationSource::Human));
        }
        let placeholder = Annotation {
            bbox: None,
            ..record.annotations[0].clone()
        };
        record.annotations.insert(0, placeholder);
        assert_eq!(record.reading_order(), vec![2, 3, 1, 0]);
    }

    #[test]
    fn test_contains_is_inclusive() {
        let b = BBox::new(10, 10, 20, 20);
        assert!(b.contains(10, 10));
        assert!(b.contains(20, 20));
        assert!(!b.contains(21, 15));
    }
}
