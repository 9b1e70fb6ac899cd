//! Data models for framelabel.

mod annotation;
mod category;

pub use annotation::{
    Annotation, AnnotationSource, BBox, DisplayPoint, FileRecord, ImageShape,
};
pub use category::{CategoryRef, CategoryTable, Subcategory};

/// Step direction for cycling through frames, annotations or candidates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Forward,
    Backward,
}
