//! Fixed-box candidate generation.
//!
//! Some projects film a static scene where the regions of interest never
//! move. Their boxes are listed in the project configuration and staged as
//! candidates on demand, optionally jittered by a few pixels.

use rand::Rng;

use crate::candidates::Candidate;
use crate::config::ProjectConfig;
use crate::model::{Annotation, BBox, CategoryRef, CategoryTable};

/// A configured box with its resolved category.
#[derive(Debug, Clone, PartialEq)]
pub struct FixedBox {
    pub bbox: BBox,
    pub category: Option<CategoryRef>,
}

/// Generates fixed-box candidates for the active project.
#[derive(Debug, Clone, Default)]
pub struct FixedBoxGenerator {
    boxes: Vec<FixedBox>,
    /// Maximum per-coordinate jitter, if enabled
    jitter: Option<i32>,
}

impl FixedBoxGenerator {
    pub fn new(boxes: Vec<FixedBox>) -> Self {
        Self {
            boxes,
            jitter: None,
        }
    }

    /// Perturb each coordinate by up to `variation` pixels.
    pub fn with_jitter(mut self, variation: i32) -> Self {
        self.jitter = Some(variation.abs());
        self
    }

    /// Build from the project configuration.
    ///
    /// Boxes without their own category use the project's default category.
    /// Category ids missing from `categories` are dropped with a warning.
    pub fn from_project(project: &ProjectConfig, categories: &CategoryTable) -> Self {
        let settings = &project.annotation;
        let resolve = |id: &str| {
            let found = categories.get(id);
            if found.is_none() {
                log::warn!("Fixed box category '{}' is not defined, leaving unclassified", id);
            }
            found
        };

        let boxes = settings
            .fixed_bboxes
            .iter()
            .map(|cfg| FixedBox {
                bbox: cfg.bbox(),
                category: cfg
                    .category()
                    .or(settings.default_category.as_deref())
                    .and_then(resolve),
            })
            .collect();

        let generator = Self::new(boxes);
        if settings.add_random_coords {
            generator.with_jitter(settings.random_variation)
        } else {
            generator
        }
    }

    pub fn is_empty(&self) -> bool {
        self.boxes.is_empty()
    }

    pub fn boxes(&self) -> &[FixedBox] {
        &self.boxes
    }

    fn jittered(bbox: BBox, variation: i32, rng: &mut impl Rng) -> BBox {
        let mut shift = |v: i32| v + rng.random_range(-variation..=variation);
        let (x1, y1, x2, y2) = (shift(bbox.x1), shift(bbox.y1), shift(bbox.x2), shift(bbox.y2));
        BBox::from_corners(x1, y1, x2, y2)
    }

    /// Candidates for a frame holding `existing` annotations.
    ///
    /// Boxes that exactly match an existing box are skipped. An active
    /// `filter` overrides every box's category.
    pub fn generate(
        &self,
        existing: &[Annotation],
        filter: Option<&CategoryRef>,
        rng: &mut impl Rng,
    ) -> Vec<Candidate> {
        let mut skipped = 0;
        let candidates: Vec<Candidate> = self
            .boxes
            .iter()
            .filter_map(|fixed| {
                let bbox = match self.jitter {
                    Some(variation) => Self::jittered(fixed.bbox, variation, &mut *rng),
                    None => fixed.bbox,
                };
                if existing.iter().any(|a| a.bbox == Some(bbox)) {
                    skipped += 1;
                    return None;
                }
                let category = filter.cloned().or_else(|| fixed.category.clone());
                Some(Candidate::fixed(bbox, category))
            })
            .collect();

        if skipped > 0 {
            log::debug!("Skipped {} fixed boxes already present", skipped);
        }
        candidates
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::model::AnnotationSource;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn project() -> ProjectConfig {
        let config = AppConfig::from_json(
            r#"{"projects": {"p": {
                "categories": {"1": "com_fumaca", "2": "sem_fumaca"},
                "annotation": {
                    "fixed_bboxes": [[10, 10, 100, 100], {"bbox": [200, 10, 300, 100], "category": "2"}],
                    "default_category": "1"
                }
            }}}"#,
        )
        .unwrap();
        config.projects["p"].clone()
    }

    #[test]
    fn test_from_project_resolves_categories() {
        let project = project();
        let table = CategoryTable::from_project(&project);
        let generator = FixedBoxGenerator::from_project(&project, &table);

        let cats: Vec<_> = generator
            .boxes()
            .iter()
            .map(|b| b.category.as_ref().map(|c| c.name.as_str()))
            .collect();
        assert_eq!(cats, vec![Some("com_fumaca"), Some("sem_fumaca")]);
    }

    #[test]
    fn test_generate_skips_exact_duplicates_and_applies_filter() {
        let project = project();
        let table = CategoryTable::from_project(&project);
        let generator = FixedBoxGenerator::from_project(&project, &table);
        let mut rng = StdRng::seed_from_u64(7);

        let existing = vec![Annotation::new(
            BBox::new(10, 10, 100, 100),
            None,
            AnnotationSource::Human,
        )];
        let filter = CategoryRef::new("1", "com_fumaca");
        let candidates = generator.generate(&existing, Some(&filter), &mut rng);

        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].bbox, BBox::new(200, 10, 300, 100));
        assert_eq!(candidates[0].category, Some(filter));
        assert_eq!(candidates[0].confidence, 1.0);
        assert_eq!(candidates[0].source, AnnotationSource::Human);
    }

    #[test]
    fn test_jitter_stays_bounded_and_normalized() {
        let generator = FixedBoxGenerator::new(vec![FixedBox {
            bbox: BBox::new(100, 100, 102, 102),
            category: None,
        }])
        .with_jitter(4);
        let mut rng = StdRng::seed_from_u64(42);

        for _ in 0..50 {
            let c = &generator.generate(&[], None, &mut rng)[0];
            assert!(c.bbox.x1 <= c.bbox.x2 && c.bbox.y1 <= c.bbox.y2);
            assert!((96..=106).contains(&c.bbox.x1) && (96..=106).contains(&c.bbox.x2));
            assert!((96..=106).contains(&c.bbox.y1) && (96..=106).contains(&c.bbox.y2));
        }
    }
}
