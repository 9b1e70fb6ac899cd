//! Durable per-file annotation store.
//!
//! The store owns the mapping `filename -> FileRecord` and mirrors it to a
//! single JSON document. Every successful mutation persists the whole
//! document with an atomic temp-file-and-rename write, so readers never
//! observe a truncated file.
//!
//! All operations report failure through their return value instead of
//! panicking; I/O errors are logged and leave the in-memory state intact.

mod error;
mod stats;


pub use error::StoreError;
pub use stats::Statistics;

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

use crate::model::{Annotation, AnnotationSource, BBox, CategoryRef, FileRecord};

type Records = BTreeMap<String, FileRecord>;

/// Result of reading the annotation document from disk.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadSummary {
    /// Entries accepted into the store
    pub loaded: usize,
    /// Entries dropped because they did not match the record layout
    pub skipped: usize,
}

/// Current local time in the document's timestamp format.
fn now_iso() -> String {
    chrono::Local::now()
        .format("%Y-%m-%dT%H:%M:%S%.6f")
        .to_string()
}

/// Render a path with forward slashes.
fn to_posix(path: &Path) -> String {
    path.to_string_lossy()
        .replace(std::path::MAIN_SEPARATOR, "/")
}

/// Thread-safe annotation store backed by a JSON file.
#[derive(Debug)]
pub struct AnnotationStore {
    path: PathBuf,
    /// Project root as given and canonicalized
    project_roots: Vec<PathBuf>,
    records: Mutex<Records>,
    last_save_ok: AtomicBool,
}

impl AnnotationStore {
    /// Open the store at `path`, loading any existing document.
    ///
    /// `project_root` is used to store `original_path` values relative to
    /// the project. The parent directory of `path` is created if missing.
    pub fn open(path: impl Into<PathBuf>, project_root: Option<&Path>) -> Self {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            if let Err(e) = fs::create_dir_all(parent) {
                log::error!("Failed to create directory {}: {}", parent.display(), e);
            }
        }

        let mut project_roots = Vec::new();
        if let Some(root) = project_root {
            project_roots.push(root.to_path_buf());
            if let Ok(canonical) = root.canonicalize() {
                if canonical != root {
                    project_roots.push(canonical);
                }
            }
        }

        let store = Self {
            path,
            project_roots,
            records: Mutex::new(Records::new()),
            last_save_ok: AtomicBool::new(true),
        };
        store.load();
        store
    }

    /// Path of the backing document.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the most recent persist succeeded.
    pub fn last_save_ok(&self) -> bool {
        self.last_save_ok.load(Ordering::Relaxed)
    }

    fn lock(&self) -> MutexGuard<'_, Records> {
        self.records.lock().unwrap_or_else(|poisoned| {
            log::warn!("Annotation store lock was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    // ------------------------------------------------------------------------
    // Persistence
    // ------------------------------------------------------------------------

    /// Replace the in-memory state with the document on disk.
    ///
    /// A missing or unreadable document yields an empty store. Entries that
    /// are not objects with an `annotations` array are dropped.
    pub fn load(&self) -> LoadSummary {
        let mut records = self.lock();
        records.clear();

        if !self.path.exists() {
            log::info!(
                "Annotations file not found at {}, starting with an empty store",
                self.path.display()
            );
            return LoadSummary::default();
        }

        match self.read_document() {
            Ok((loaded, summary)) => {
                *records = loaded;
                log::info!(
                    "Loaded {} annotation entries from {} ({} skipped)",
                    summary.loaded,
                    self.path.display(),
                    summary.skipped
                );
                summary
            }
            Err(e) => {
                log::error!("Failed to load annotations, starting empty: {}", e);
                LoadSummary::default()
            }
        }
    }

    fn read_document(&self) -> Result<(Records, LoadSummary), StoreError> {
        let text = fs::read_to_string(&self.path)?;
        let value: serde_json::Value = serde_json::from_str(&text)?;
        let serde_json::Value::Object(entries) = value else {
            return Err(StoreError::invalid_document(
                &self.path,
                "top level is not an object",
            ));
        };

        let mut records = Records::new();
        let mut summary = LoadSummary::default();

        for (filename, entry) in entries {
            let has_list = entry
                .get("annotations")
                .is_some_and(serde_json::Value::is_array);
            if !has_list {
                log::warn!("Skipping entry '{}': missing annotations list", filename);
                summary.skipped += 1;
                continue;
            }

            match serde_json::from_value::<FileRecord>(entry) {
                Ok(record) => {
                    records.insert(filename, record);
                    summary.loaded += 1;
                }
                Err(e) => {
                    log::warn!("Skipping entry '{}': {}", filename, e);
                    summary.skipped += 1;
                }
            }
        }

        Ok((records, summary))
    }

    /// Persist the current state to disk.
    pub fn save(&self) -> bool {
        let records = self.lock();
        self.persist(&records)
    }

    /// Write `records` atomically and record the outcome.
    fn persist(&self, records: &Records) -> bool {
        let ok = match self.write_document(records) {
            Ok(()) => {
                log::debug!(
                    "Saved {} file entries to {}",
                    records.len(),
                    self.path.display()
                );
                true
            }
            Err(e) => {
                log::error!("Failed to save annotations to {}: {}", self.path.display(), e);
                false
            }
        };
        self.last_save_ok.store(ok, Ordering::Relaxed);
        ok
    }

    fn temp_path(&self) -> PathBuf {
        self.path
            .with_extension(format!("{}.tmp", std::process::id()))
    }

    fn write_document(&self, records: &Records) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let temp = self.temp_path();
        let result = (|| -> Result<(), StoreError> {
            let file = File::create(&temp)?;
            let mut writer = BufWriter::new(file);
            serde_json::to_writer_pretty(&mut writer, records)?;
            writer.flush()?;
            writer.get_ref().sync_all()?;
            fs::rename(&temp, &self.path).map_err(|source| StoreError::Replace {
                path: self.path.clone(),
                source,
            })
        })();

        if result.is_err() && temp.is_file() {
            if let Err(e) = fs::remove_file(&temp) {
                log::error!("Failed to remove temporary file {}: {}", temp.display(), e);
            }
        }
        result
    }

    // ------------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------------

    /// A copy of the record for `filename`, or an empty record.
    pub fn get_file_data(&self, filename: &str) -> FileRecord {
        self.lock().get(filename).cloned().unwrap_or_default()
    }

    /// Number of annotations stored for `filename`.
    pub fn annotation_count(&self, filename: &str) -> usize {
        self.lock()
            .get(filename)
            .map_or(0, |r| r.annotations.len())
    }

    pub fn get_statistics(&self) -> Statistics {
        Statistics::collect(self.lock().values())
    }

    /// First index after `start` whose file has annotations.
    pub fn find_next_annotated_index(&self, start: usize, filenames: &[String]) -> Option<usize> {
        self.find_next_matching(start, filenames, FileRecord::has_annotations)
    }

    /// Last index before `start` whose file has annotations.
    pub fn find_prev_annotated_index(&self, start: usize, filenames: &[String]) -> Option<usize> {
        self.find_prev_matching(start, filenames, FileRecord::has_annotations)
    }

    /// First index after `start` whose file has an annotation of `category_id`.
    pub fn find_next_with_category(
        &self,
        start: usize,
        filenames: &[String],
        category_id: &str,
    ) -> Option<usize> {
        self.find_next_matching(start, filenames, |r| r.has_category(category_id))
    }

    /// Last index before `start` whose file has an annotation of `category_id`.
    pub fn find_prev_with_category(
        &self,
        start: usize,
        filenames: &[String],
        category_id: &str,
    ) -> Option<usize> {
        self.find_prev_matching(start, filenames, |r| r.has_category(category_id))
    }

    fn find_next_matching(
        &self,
        start: usize,
        filenames: &[String],
        pred: impl Fn(&FileRecord) -> bool,
    ) -> Option<usize> {
        let records = self.lock();
        (start.saturating_add(1)..filenames.len())
            .find(|&i| records.get(&filenames[i]).is_some_and(&pred))
    }

    fn find_prev_matching(
        &self,
        start: usize,
        filenames: &[String],
        pred: impl Fn(&FileRecord) -> bool,
    ) -> Option<usize> {
        let records = self.lock();
        (0..start.min(filenames.len()))
            .rev()
            .find(|&i| records.get(&filenames[i]).is_some_and(&pred))
    }

    // ------------------------------------------------------------------------
    // Mutations
    // ------------------------------------------------------------------------

    /// Express `original_path` relative to the project root when possible.
    fn relative_original_path(&self, original_path: &Path) -> String {
        if self.project_roots.is_empty() {
            log::warn!("No project root configured, storing original path as given");
            return to_posix(original_path);
        }

        if original_path.is_relative() {
            return to_posix(original_path);
        }

        let canonical = original_path.canonicalize().ok();
        let candidates = std::iter::once(original_path).chain(canonical.as_deref());
        for path in candidates {
            if let Some(relative) = self
                .project_roots
                .iter()
                .find_map(|root| path.strip_prefix(root).ok())
            {
                return to_posix(relative);
            }
        }

        log::warn!(
            "{} is outside the project root, storing as given",
            original_path.display()
        );
        to_posix(original_path)
    }

    /// Append an annotation to `filename`, creating the record if needed.
    pub fn add_annotation(
        &self,
        filename: &str,
        bbox: BBox,
        category: Option<&CategoryRef>,
        original_path: &Path,
        source: AnnotationSource,
    ) -> bool {
        let stored_path = self.relative_original_path(original_path);
        let mut records = self.lock();
        let now = now_iso();

        let record = records
            .entry(filename.to_string())
            .or_insert_with(|| FileRecord::created_at(now.clone()));
        record.updated_at_iso = Some(now);
        record.original_path = Some(stored_path);
        record
            .annotations
            .push(Annotation::new(bbox, category, source));

        log::debug!(
            "Added {:?} box {:?} to {} ({} total)",
            source,
            bbox,
            filename,
            record.annotations.len()
        );
        self.persist(&records)
    }

    /// Re-classify the most recently added annotation of `filename`.
    ///
    /// Returns false if the file is unknown, has no annotations or the last
    /// annotation already carries `category`.
    pub fn update_last_annotation_category(&self, filename: &str, category: &CategoryRef) -> bool {
        let mut records = self.lock();
        let last = records
            .get(filename)
            .and_then(|r| r.annotations.len().checked_sub(1));
        match last {
            Some(last) => self.reclassify(&mut records, filename, last, category),
            None => {
                log::warn!("No annotation to re-classify in {}", filename);
                false
            }
        }
    }

    /// Re-classify the annotation at `index` of `filename`.
    ///
    /// Returns false when nothing changed.
    pub fn update_annotation_category_by_index(
        &self,
        filename: &str,
        index: usize,
        category: &CategoryRef,
    ) -> bool {
        let mut records = self.lock();
        self.reclassify(&mut records, filename, index, category)
    }

    fn reclassify(
        &self,
        records: &mut Records,
        filename: &str,
        index: usize,
        category: &CategoryRef,
    ) -> bool {
        let Some(record) = records.get_mut(filename) else {
            log::warn!("Cannot update category: {} has no record", filename);
            return false;
        };
        let Some(ann) = record.annotations.get_mut(index) else {
            log::warn!(
                "Cannot update category: index {} out of range for {} ({} annotations)",
                index,
                filename,
                record.annotations.len()
            );
            return false;
        };

        if !ann.set_category(category) {
            log::debug!("Annotation {} of {} already {}", index, filename, category.name);
            return false;
        }
        record.updated_at_iso = Some(now_iso());
        self.persist(records)
    }

    /// Set the subcategory on the last annotation whose category is `parent_name`.
    ///
    /// Returns false if no annotation of that category exists.
    pub fn update_last_subcategory(
        &self,
        filename: &str,
        parent_name: &str,
        subcategory_id: &str,
        subcategory_name: &str,
    ) -> bool {
        let mut records = self.lock();
        let Some(record) = records.get_mut(filename) else {
            return false;
        };
        let Some(ann) = record
            .annotations
            .iter_mut()
            .rev()
            .find(|a| a.category_name.as_deref() == Some(parent_name))
        else {
            log::warn!("No '{}' annotation in {} to refine", parent_name, filename);
            return false;
        };

        ann.subcategory_id = Some(subcategory_id.to_string());
        ann.subcategory_name = Some(subcategory_name.to_string());
        ann.annotation_source = AnnotationSource::Human;
        record.updated_at_iso = Some(now_iso());
        self.persist(&records)
    }

    /// Remove the annotation at `index` of `filename`.
    pub fn delete_annotation_by_index(&self, filename: &str, index: usize) -> bool {
        let mut records = self.lock();
        let Some(record) = records.get_mut(filename) else {
            return false;
        };
        if index >= record.annotations.len() {
            log::warn!(
                "Cannot delete: index {} out of range for {} ({} annotations)",
                index,
                filename,
                record.annotations.len()
            );
            return false;
        }

        record.annotations.remove(index);
        record.updated_at_iso = Some(now_iso());
        self.persist(&records)
    }

    /// Remove every annotation of `filename`, keeping the record.
    ///
    /// Returns false if the file is unknown or already empty.
    pub fn clear_annotations(&self, filename: &str) -> bool {
        let mut records = self.lock();
        let Some(record) = records.get_mut(filename) else {
            return false;
        };
        if record.annotations.is_empty() {
            return false;
        }

        let removed = record.annotations.len();
        record.annotations.clear();
        record.updated_at_iso = Some(now_iso());
        log::info!("Cleared {} annotations from {}", removed, filename);
        self.persist(&records)
    }
}
