//! Aggregate statistics over the annotation store.

use std::collections::BTreeMap;
use std::fmt;

use crate::model::FileRecord;

/// Summary counts for the whole annotation document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Statistics {
    /// Filenames present in the document
    pub total_files_in_store: usize,
    /// Files with at least one annotation
    pub total_files_with_any_annotation: usize,
    /// Annotations across all files
    pub total_annotations: usize,
    /// Files with at least one non-degenerate box
    pub total_files_with_bbox: usize,
    /// Annotation count per category name
    pub category_counts: BTreeMap<String, usize>,
    /// Annotation count per subcategory name
    pub subcategory_counts: BTreeMap<String, usize>,
    /// Frames discovered for the running session, when known
    pub total_files_actual: Option<usize>,
}

impl Statistics {
    /// Compute statistics over a set of file records.
    pub fn collect<'a>(records: impl IntoIterator<Item = &'a FileRecord>) -> Self {
        let mut stats = Self::default();

        for record in records {
            stats.total_files_in_store += 1;
            if record.has_annotations() {
                stats.total_files_with_any_annotation += 1;
            }
            if record.annotations.iter().any(|a| a.bbox.is_some_and(|b| b.is_valid())) {
                stats.total_files_with_bbox += 1;
            }
            stats.total_annotations += record.annotations.len();

            for ann in &record.annotations {
                if let Some(cat) = ann.category() {
                    *stats.category_counts.entry(cat.name).or_default() += 1;
                }
                if let Some(sub_id) = &ann.subcategory_id {
                    let name = ann.subcategory_name.as_ref().unwrap_or(sub_id);
                    *stats.subcategory_counts.entry(name.clone()).or_default() += 1;
                }
            }
        }

        stats
    }

    /// Attach the number of frames discovered on disk.
    pub fn with_frame_total(mut self, total: usize) -> Self {
        self.total_files_actual = Some(total);
        self
    }
}

impl fmt::Display for Statistics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(actual) = self.total_files_actual {
            writeln!(f, "Frames on disk:          {actual}")?;
        }
        writeln!(f, "Files in store:          {}", self.total_files_in_store)?;
        writeln!(
            f,
            "Files with annotations:  {}",
            self.total_files_with_any_annotation
        )?;
        writeln!(f, "Files with boxes:        {}", self.total_files_with_bbox)?;
        writeln!(f, "Total annotations:       {}", self.total_annotations)?;
        if !self.category_counts.is_empty() {
            writeln!(f, "Categories:")?;
            for (name, count) in &self.category_counts {
                writeln!(f, "  {name}: {count}")?;
            }
        }
        if !self.subcategory_counts.is_empty() {
            writeln!(f, "Subcategories:")?;
            for (name, count) in &self.subcategory_counts {
                writeln!(f, "  {name}: {count}")?;
            }
        }
        Ok(())
    }
}
