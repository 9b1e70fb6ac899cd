//! Frame discovery and loading.
//!
//! Frames are the image files of one directory. Files named
//! `<timestamp>.<ext>` are ordered numerically; anything else follows.

use std::path::{Path, PathBuf};

use image::DynamicImage;
use thiserror::Error;

use crate::model::ImageShape;

/// Supported frame extensions
pub const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg"];

/// Errors that can occur while discovering or loading frames.
#[derive(Error, Debug)]
pub enum FrameError {
    #[error("Failed to read frames directory {path:?}: {source}")]
    ReadDir {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("No frames found in {0:?}")]
    NoFrames(PathBuf),

    #[error("Frame index {index} out of range ({total} frames)")]
    OutOfRange { index: usize, total: usize },

    #[error("Failed to decode {path:?}: {source}")]
    Decode {
        path: PathBuf,
        source: image::ImageError,
    },

    #[error("Invalid dimensions {width}x{height} for {path:?}")]
    InvalidDimensions {
        path: PathBuf,
        width: u32,
        height: u32,
    },
}

/// Check if a path has a supported image extension
fn is_image_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

/// Numeric timestamp of a `<digits>.<ext>` filename.
fn timestamp_of(name: &str) -> Option<u128> {
    let (stem, ext) = name.rsplit_once('.')?;
    if stem.is_empty() || !stem.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    if !IMAGE_EXTENSIONS.contains(&ext.to_lowercase().as_str()) {
        return None;
    }
    // Longer than u128 still sorts after every shorter timestamp
    Some(stem.parse().unwrap_or(u128::MAX))
}

/// Sort frame names: numeric timestamps first in value order, then the rest.
pub fn sort_frame_names(names: &mut [String]) {
    names.sort();
    names.sort_by_key(|name| match timestamp_of(name) {
        Some(ts) => (false, ts),
        None => (true, 0),
    });
}

/// Display size for an image of `original` dimensions within `target`.
///
/// Images are only ever scaled down. Returns `None` if the result would
/// have a zero dimension.
pub fn display_size(original: ImageShape, target: (u32, u32)) -> Option<ImageShape> {
    if !original.is_valid() {
        return None;
    }
    let scale = (target.0 as f32 / original.width as f32)
        .min(target.1 as f32 / original.height as f32)
        .min(1.0);
    let shape = ImageShape::new(
        (original.width as f32 * scale) as u32,
        (original.height as f32 * scale) as u32,
    );
    shape.is_valid().then_some(shape)
}

/// A decoded frame with its display geometry.
#[derive(Debug, Clone)]
pub struct Frame {
    pub filename: String,
    pub path: PathBuf,
    pub image: DynamicImage,
    pub original: ImageShape,
    pub display: ImageShape,
}

impl Frame {
    /// The frame resized to its display dimensions.
    pub fn display_image(&self) -> DynamicImage {
        if self.display == self.original {
            return self.image.clone();
        }
        self.image.resize_exact(
            self.display.width,
            self.display.height,
            image::imageops::FilterType::Triangle,
        )
    }

    #[cfg(test)]
    pub(crate) fn blank(filename: &str, shape: ImageShape) -> Self {
        Self {
            filename: filename.to_string(),
            path: PathBuf::from(filename),
            image: DynamicImage::new_rgb8(shape.width, shape.height),
            original: shape,
            display: shape,
        }
    }
}

/// The ordered frame list of one directory.
#[derive(Debug, Clone)]
pub struct FrameSource {
    dir: PathBuf,
    filenames: Vec<String>,
    display_target: (u32, u32),
}

impl FrameSource {
    /// Discover frames in `dir`, non-recursively.
    pub fn discover(dir: impl Into<PathBuf>, display_target: (u32, u32)) -> Result<Self, FrameError> {
        let dir = dir.into();
        let entries = std::fs::read_dir(&dir).map_err(|source| FrameError::ReadDir {
            path: dir.clone(),
            source,
        })?;

        let mut filenames: Vec<String> = entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.is_file() && is_image_file(path))
            .filter_map(|path| path.file_name().map(|n| n.to_string_lossy().into_owned()))
            .collect();

        if filenames.is_empty() {
            return Err(FrameError::NoFrames(dir));
        }

        sort_frame_names(&mut filenames);
        log::info!("Found {} frames in {:?}", filenames.len(), dir);

        Ok(Self {
            dir,
            filenames,
            display_target,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn filenames(&self) -> &[String] {
        &self.filenames
    }

    pub fn len(&self) -> usize {
        self.filenames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filenames.is_empty()
    }

    pub fn filename(&self, index: usize) -> Option<&str> {
        self.filenames.get(index).map(String::as_str)
    }

    /// Absolute path of the frame at `index`.
    pub fn path_of(&self, index: usize) -> Option<PathBuf> {
        let name = self.filenames.get(index)?;
        let path = self.dir.join(name);
        Some(std::path::absolute(&path).unwrap_or(path))
    }

    /// Decode the frame at `index` and compute its display size.
    pub fn load(&self, index: usize) -> Result<Frame, FrameError> {
        let (Some(filename), Some(path)) = (self.filenames.get(index), self.path_of(index)) else {
            return Err(FrameError::OutOfRange {
                index,
                total: self.filenames.len(),
            });
        };

        let image = image::open(&path).map_err(|source| FrameError::Decode {
            path: path.clone(),
            source,
        })?;
        let original = ImageShape::new(image.width(), image.height());
        let display = display_size(original, self.display_target).ok_or_else(|| {
            FrameError::InvalidDimensions {
                path: path.clone(),
                width: original.width,
                height: original.height,
            }
        })?;

        log::debug!(
            "Loaded {} ({}x{} -> {}x{})",
            filename,
            original.width,
            original.height,
            display.width,
            display.height
        );
        Ok(Frame {
            filename: filename.clone(),
            path,
            image,
            original,
            display,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_sort_numeric_before_other_names() {
        let mut list = names(&["frame_b.png", "100.jpg", "20.png", "frame_a.jpg", "3.JPEG"]);
        sort_frame_names(&mut list);
        assert_eq!(
            list,
            names(&["3.JPEG", "20.png", "100.jpg", "frame_a.jpg", "frame_b.png"])
        );
    }

    #[test]
    fn test_display_size_never_upscales() {
        let small = ImageShape::new(640, 480);
        assert_eq!(display_size(small, (1440, 810)), Some(small));

        let large = ImageShape::new(1920, 1080);
        assert_eq!(display_size(large, (1440, 810)), Some(ImageShape::new(1440, 810)));

        assert_eq!(display_size(ImageShape::new(0, 10), (1440, 810)), None);
        assert_eq!(display_size(ImageShape::new(10_000, 1), (100, 100)), None);
    }

    #[test]
    fn test_discover_and_load() {
        let dir = TempDir::new().unwrap();
        image::RgbImage::new(40, 30).save(dir.path().join("2.png")).unwrap();
        image::RgbImage::new(40, 30).save(dir.path().join("10.png")).unwrap();
        std::fs::write(dir.path().join("notes.txt"), "x").unwrap();
        std::fs::write(dir.path().join("1.jpg"), "not an image").unwrap();

        let source = FrameSource::discover(dir.path(), (20, 20)).unwrap();
        assert_eq!(source.filenames(), names(&["1.jpg", "2.png", "10.png"]).as_slice());

        let frame = source.load(1).unwrap();
        assert_eq!(frame.original, ImageShape::new(40, 30));
        assert_eq!(frame.display, ImageShape::new(20, 15));
        assert_eq!(frame.display_image().width(), 20);

        assert!(matches!(source.load(0), Err(FrameError::Decode { .. })));
        assert!(matches!(source.load(9), Err(FrameError::OutOfRange { .. })));
    }

    #[test]
    fn test_discover_empty_dir() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            FrameSource::discover(dir.path(), (100, 100)),
            Err(FrameError::NoFrames(_))
        ));
    }
}
