//! Category tables for annotation labels.

use std::collections::BTreeMap;

use crate::config::ProjectConfig;

/// Detector labels that map onto a differently named category.
const LABEL_ALIASES: &[(&str, &str)] = &[("maquina", "trator")];

/// Prefix of detector labels that carry a category id instead of a name.
const UNKNOWN_LABEL_PREFIX: &str = "unknown_";

/// A category as stored on an annotation: id plus display name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryRef {
    pub id: String,
    pub name: String,
}

impl CategoryRef {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

/// A subcategory bound to a key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subcategory {
    pub id: String,
    pub name: String,
    pub key: char,
}

/// The active project's categories and subcategories.
#[derive(Debug, Clone, Default)]
pub struct CategoryTable {
    categories: BTreeMap<String, String>,
    subcategories: Vec<Subcategory>,
    subcategory_parent: Option<String>,
}

impl CategoryTable {
    /// Build a table from `(id, name)` pairs.
    pub fn new<I, K, V>(categories: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            categories: categories
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
            subcategories: Vec::new(),
            subcategory_parent: None,
        }
    }

    /// Attach key-bound subcategories refining `parent` (a category name).
    pub fn with_subcategories(mut self, parent: impl Into<String>, subs: Vec<Subcategory>) -> Self {
        self.subcategory_parent = Some(parent.into());
        self.subcategories = subs;
        self
    }

    pub fn from_project(project: &ProjectConfig) -> Self {
        let table = Self::new(project.categories.clone());
        match &project.subcategory_parent {
            Some(parent) if !project.subcategories.is_empty() => {
                let subs = project
                    .subcategories
                    .iter()
                    .map(|s| Subcategory {
                        id: s.id.clone(),
                        name: s.name.clone(),
                        key: s.key,
                    })
                    .collect();
                table.with_subcategories(parent.clone(), subs)
            }
            _ => table,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }

    pub fn len(&self) -> usize {
        self.categories.len()
    }

    /// Categories ordered by id.
    pub fn iter(&self) -> impl Iterator<Item = CategoryRef> + '_ {
        self.categories
            .iter()
            .map(|(id, name)| CategoryRef::new(id.as_str(), name.as_str()))
    }

    /// Look up a category by id.
    pub fn get(&self, id: &str) -> Option<CategoryRef> {
        self.categories
            .get(id)
            .map(|name| CategoryRef::new(id, name.as_str()))
    }

    /// Look up a category by case-insensitive name.
    pub fn find_by_name(&self, name: &str) -> Option<CategoryRef> {
        self.categories
            .iter()
            .find(|(_, n)| n.eq_ignore_ascii_case(name))
            .map(|(id, n)| CategoryRef::new(id.as_str(), n.as_str()))
    }

    /// Resolve a command-line filter given as either an id or a name.
    pub fn resolve(&self, id_or_name: &str) -> Option<CategoryRef> {
        self.get(id_or_name)
            .or_else(|| self.find_by_name(id_or_name))
    }

    /// Map a detector label onto a project category.
    ///
    /// `unknown_<id>` labels resolve by id, known aliases are rewritten,
    /// everything else matches names case-insensitively.
    pub fn resolve_detector_label(&self, label: &str) -> Option<CategoryRef> {
        if let Some(id) = label.strip_prefix(UNKNOWN_LABEL_PREFIX) {
            return self.get(id);
        }

        let lowered = label.to_lowercase();
        let target = LABEL_ALIASES
            .iter()
            .find(|(alias, _)| *alias == lowered)
            .map_or(lowered.as_str(), |(_, name)| name);
        self.find_by_name(target)
    }

    /// The category name subcategories refine, if any.
    pub fn subcategory_parent(&self) -> Option<&str> {
        self.subcategory_parent.as_deref()
    }

    pub fn subcategories(&self) -> &[Subcategory] {
        &self.subcategories
    }

    /// The subcategory bound to `key`.
    pub fn subcategory_for_key(&self, key: char) -> Option<&Subcategory> {
        self.subcategories.iter().find(|s| s.key == key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> CategoryTable {
        CategoryTable::new([("1", "caminhao"), ("2", "carro"), ("3", "trator")])
    }

    #[test]
    fn test_resolve_by_id_or_name() {
        let t = table();
        assert_eq!(t.resolve("2"), Some(CategoryRef::new("2", "carro")));
        assert_eq!(t.resolve("Trator"), Some(CategoryRef::new("3", "trator")));
        assert_eq!(t.resolve("bicicleta"), None);
    }

    #[test]
    fn test_detector_label_mapping() {
        let t = table();
        assert_eq!(t.resolve_detector_label("CARRO").map(|c| c.id), Some("2".into()));
        assert_eq!(t.resolve_detector_label("maquina").map(|c| c.id), Some("3".into()));
        assert_eq!(t.resolve_detector_label("unknown_1").map(|c| c.id), Some("1".into()));
        assert_eq!(t.resolve_detector_label("unknown_9"), None);
        assert_eq!(t.resolve_detector_label("bicicleta"), None);
    }

    #[test]
    fn test_subcategory_keys() {
        let t = table().with_subcategories(
            "trator",
            vec![Subcategory {
                id: "i".into(),
                name: "inicio".into(),
                key: '7',
            }],
        );
        assert_eq!(t.subcategory_parent(), Some("trator"));
        assert_eq!(t.subcategory_for_key('7').map(|s| s.id.as_str()), Some("i"));
        assert!(t.subcategory_for_key('8').is_none());
    }
}
