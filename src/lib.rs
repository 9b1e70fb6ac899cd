//! framelabel - bounding-box annotation of image frames
//!
//! An operator steps through a directory of frames, draws boxes, assigns
//! categories and reviews candidates staged by a detector or by fixed
//! per-project boxes. Annotations persist to a single JSON document.

pub mod annotator;
pub mod auto_skip;
pub mod candidates;
pub mod config;
pub mod constants;
pub mod detector;
pub mod fixed_boxes;
pub mod frames;
pub mod input;
pub mod logging;
pub mod model;
pub mod session;
pub mod store;
pub mod surface;

pub use annotator::{Annotator, SessionEnd};
pub use config::AppConfig;
pub use store::AnnotationStore;
