//! Temporary candidate buffer.
//!
//! Candidates come from detector inference or fixed-box generation and sit
//! here for review until they are confirmed into the store or discarded.

use std::path::Path;

use crate::model::{AnnotationSource, BBox, CategoryRef, Direction};
use crate::store::AnnotationStore;

/// A staged annotation awaiting confirmation.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub bbox: BBox,
    pub category: Option<CategoryRef>,
    /// Detector confidence, `1.0` for fixed boxes
    pub confidence: f32,
    pub source: AnnotationSource,
}

impl Candidate {
    pub fn inference(bbox: BBox, category: CategoryRef, confidence: f32) -> Self {
        Self {
            bbox,
            category: Some(category),
            confidence,
            source: AnnotationSource::Inference,
        }
    }

    pub fn fixed(bbox: BBox, category: Option<CategoryRef>) -> Self {
        Self {
            bbox,
            category,
            confidence: 1.0,
            source: AnnotationSource::Human,
        }
    }

    fn commit(&self, store: &AnnotationStore, filename: &str, original_path: &Path) -> bool {
        store.add_annotation(
            filename,
            self.bbox,
            self.category.as_ref(),
            original_path,
            self.source,
        )
    }
}

/// Outcome of confirming the whole buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchConfirm {
    /// Candidates moved into the store
    pub count: usize,
    /// Every write reached disk
    pub saved: bool,
}

/// Ordered candidates plus a selection cursor.
#[derive(Debug, Default)]
pub struct CandidateBuffer {
    items: Vec<Candidate>,
    cursor: Option<usize>,
}

impl CandidateBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn items(&self) -> &[Candidate] {
        &self.items
    }

    pub fn cursor(&self) -> Option<usize> {
        self.cursor
    }

    pub fn current(&self) -> Option<&Candidate> {
        self.cursor.and_then(|i| self.items.get(i))
    }

    /// Replace the contents, sorted top-to-bottom then left-to-right.
    ///
    /// The cursor lands on the first candidate, if any.
    pub fn populate(&mut self, mut candidates: Vec<Candidate>) {
        candidates.sort_by_key(|c| c.bbox.reading_order());
        self.cursor = if candidates.is_empty() { None } else { Some(0) };
        self.items = candidates;
    }

    /// Move the cursor circularly. No-op on an empty buffer.
    pub fn navigate(&mut self, direction: Direction) -> Option<usize> {
        let len = self.items.len();
        if len == 0 {
            return None;
        }
        let next = match (self.cursor, direction) {
            (None, Direction::Forward) => 0,
            (None, Direction::Backward) => len - 1,
            (Some(i), Direction::Forward) => (i + 1) % len,
            (Some(i), Direction::Backward) => (i + len - 1) % len,
        };
        self.cursor = Some(next);
        self.cursor
    }

    /// Point the cursor at `index`, or clear it with `None`.
    pub fn select(&mut self, index: Option<usize>) -> bool {
        match index {
            Some(i) if i >= self.items.len() => false,
            _ => {
                self.cursor = index;
                true
            }
        }
    }

    /// Index of the topmost candidate containing the display point.
    ///
    /// Later candidates are drawn on top, so they are tested first.
    pub fn hit_test(&self, x: i32, y: i32, to_display: impl Fn(&BBox) -> BBox) -> Option<usize> {
        self.items
            .iter()
            .enumerate()
            .rev()
            .find(|(_, c)| to_display(&c.bbox).contains(x, y))
            .map(|(i, _)| i)
    }

    /// Commit the selected candidate to the store and remove it.
    ///
    /// Returns the committed candidate and whether the store saved it. The
    /// cursor is clamped to the remaining items.
    pub fn confirm_current(
        &mut self,
        store: &AnnotationStore,
        filename: &str,
        original_path: &Path,
    ) -> Option<(Candidate, bool)> {
        let index = self.cursor.filter(|&i| i < self.items.len())?;
        let candidate = self.items.remove(index);
        let saved = candidate.commit(store, filename, original_path);
        if !saved {
            log::warn!("Confirmed candidate was not persisted for {}", filename);
        }

        self.cursor = if self.items.is_empty() {
            None
        } else {
            Some(index.min(self.items.len() - 1))
        };
        Some((candidate, saved))
    }

    /// Commit every candidate in buffer order and empty the buffer.
    pub fn confirm_all(
        &mut self,
        store: &AnnotationStore,
        filename: &str,
        original_path: &Path,
    ) -> BatchConfirm {
        let candidates = std::mem::take(&mut self.items);
        self.cursor = None;
        let mut saved = true;
        for candidate in &candidates {
            if !candidate.commit(store, filename, original_path) {
                log::warn!("Confirmed candidate was not persisted for {}", filename);
                saved = false;
            }
        }
        BatchConfirm {
            count: candidates.len(),
            saved,
        }
    }

    /// Discard every candidate. Returns how many were dropped.
    pub fn clear(&mut self) -> usize {
        let count = self.items.len();
        self.items.clear();
        self.cursor = None;
        count
    }

    /// Re-classify the selected candidate without persisting.
    pub fn update_current_category(&mut self, category: CategoryRef) -> bool {
        match self.cursor.and_then(|i| self.items.get_mut(i)) {
            Some(candidate) => {
                candidate.category = Some(category);
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn candidate(x1: i32, y1: i32) -> Candidate {
        Candidate::inference(
            BBox::new(x1, y1, x1 + 40, y1 + 40),
            CategoryRef::new("2", "carro"),
            0.8,
        )
    }

    #[test]
    fn test_populate_sorts_in_reading_order() {
        let mut buffer = CandidateBuffer::new();
        buffer.populate(vec![candidate(300, 100), candidate(50, 100), candidate(500, 10)]);

        let tops: Vec<_> = buffer.items().iter().map(|c| (c.bbox.y1, c.bbox.x1)).collect();
        assert_eq!(tops, vec![(10, 500), (100, 50), (100, 300)]);
        assert_eq!(buffer.cursor(), Some(0));

        buffer.populate(Vec::new());
        assert_eq!(buffer.cursor(), None);
    }

    #[test]
    fn test_navigate_wraps() {
        let mut buffer = CandidateBuffer::new();
        assert_eq!(buffer.navigate(Direction::Forward), None);

        buffer.populate(vec![candidate(0, 0), candidate(0, 100)]);
        assert_eq!(buffer.navigate(Direction::Forward), Some(1));
        assert_eq!(buffer.navigate(Direction::Forward), Some(0));
        assert_eq!(buffer.navigate(Direction::Backward), Some(1));
    }

    #[test]
    fn test_confirm_current_moves_into_store_and_clamps() {
        let dir = TempDir::new().unwrap();
        let store = AnnotationStore::open(dir.path().join("a.json"), Some(dir.path()));
        let path = dir.path().join("1.jpg");

        let mut buffer = CandidateBuffer::new();
        buffer.populate(vec![candidate(0, 0), candidate(0, 100), candidate(0, 200)]);
        buffer.select(Some(2));

        let (confirmed, saved) = buffer.confirm_current(&store, "1.jpg", &path).unwrap();
        assert!(saved);
        assert_eq!(confirmed.bbox.y1, 200);
        assert_eq!(buffer.len(), 2);
        assert_eq!(buffer.cursor(), Some(1));

        let record = store.get_file_data("1.jpg");
        assert_eq!(record.annotations.len(), 1);
        assert_eq!(record.annotations[0].annotation_source, AnnotationSource::Inference);
        assert_eq!(record.annotations[0].category_name.as_deref(), Some("carro"));
    }

    #[test]
    fn test_confirm_all_empties_buffer_in_order() {
        let dir = TempDir::new().unwrap();
        let store = AnnotationStore::open(dir.path().join("a.json"), Some(dir.path()));
        let path = dir.path().join("1.jpg");

        let mut buffer = CandidateBuffer::new();
        buffer.populate(vec![candidate(0, 100), candidate(0, 0)]);
        assert_eq!(
            buffer.confirm_all(&store, "1.jpg", &path),
            BatchConfirm { count: 2, saved: true }
        );
        assert!(buffer.is_empty());
        assert_eq!(buffer.cursor(), None);

        let record = store.get_file_data("1.jpg");
        assert_eq!(record.annotations[0].bbox.map(|b| b.y1), Some(0));
        assert_eq!(record.annotations[1].bbox.map(|b| b.y1), Some(100));
    }

    #[test]
    fn test_confirm_reports_failed_save() {
        let dir = TempDir::new().unwrap();
        // A directory at the document path makes every save fail
        let doc = dir.path().join("a.json");
        std::fs::create_dir_all(doc.join("blocker")).unwrap();
        let store = AnnotationStore::open(&doc, Some(dir.path()));
        let path = dir.path().join("1.jpg");

        let mut buffer = CandidateBuffer::new();
        buffer.populate(vec![candidate(0, 0), candidate(0, 100), candidate(0, 200)]);

        let (_, saved) = buffer.confirm_current(&store, "1.jpg", &path).unwrap();
        assert!(!saved);
        assert_eq!(
            buffer.confirm_all(&store, "1.jpg", &path),
            BatchConfirm { count: 2, saved: false }
        );
        assert_eq!(store.annotation_count("1.jpg"), 3);
    }

    #[test]
    fn test_update_current_category_is_buffer_only() {
        let mut buffer = CandidateBuffer::new();
        assert!(!buffer.update_current_category(CategoryRef::new("1", "caminhao")));

        buffer.populate(vec![candidate(0, 0)]);
        assert!(buffer.update_current_category(CategoryRef::new("1", "caminhao")));
        assert_eq!(buffer.current().and_then(|c| c.category.clone()).map(|c| c.id), Some("1".into()));
    }

    #[test]
    fn test_hit_test_prefers_last() {
        let mut buffer = CandidateBuffer::new();
        buffer.populate(vec![candidate(0, 0), candidate(20, 20)]);
        assert_eq!(buffer.hit_test(30, 30, |b| *b), Some(1));
        assert_eq!(buffer.hit_test(5, 5, |b| *b), Some(0));
        assert_eq!(buffer.hit_test(500, 500, |b| *b), None);
    }
}
