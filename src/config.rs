//! Configuration file support for framelabel.
//!
//! The configuration is a versioned JSON document holding user preferences,
//! path templates and one section per annotation project. A base file can be
//! overridden by a sibling `<name>.local.json` file, merged key by key.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::constants::{DEFAULT_CONFIDENCE_THRESHOLD, DEFAULT_RANDOM_VARIATION, display};
use crate::model::BBox;

/// Log level setting for the application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Show only errors
    Error,
    /// Show errors and warnings
    Warn,
    /// Show errors, warnings, and info messages
    #[default]
    Info,
    /// Show debug-level logging
    Debug,
    /// Show all log messages including trace
    Trace,
}

impl LogLevel {
    /// Convert to log crate's LevelFilter.
    pub fn to_level_filter(&self) -> log::LevelFilter {
        match self {
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
        }
    }
}

/// Current configuration file format version.
/// Increment this when making breaking changes to the config format.
pub const CONFIG_VERSION: u32 = 1;

/// Name of the project used when the configuration defines none.
pub const DEFAULT_PROJECT: &str = "default";

/// Placeholder replaced by the active project name in path templates.
const PROJECT_PLACEHOLDER: &str = "{project}";

/// Application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Version of the configuration file format
    #[serde(default = "default_version")]
    pub version: u32,

    /// Project used when none is given on the command line or environment
    #[serde(default)]
    pub active_project: Option<String>,

    /// Base directory for relative paths (defaults to the working directory)
    #[serde(default)]
    pub root_dir: Option<PathBuf>,

    /// Path templates
    #[serde(default)]
    pub paths: PathsConfig,

    /// User preferences
    #[serde(default)]
    pub preferences: UserPreferences,

    /// Project definitions by name
    #[serde(default)]
    pub projects: BTreeMap<String, ProjectConfig>,
}

fn default_version() -> u32 {
    CONFIG_VERSION
}

/// Path templates. `{project}` expands to the active project name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Directory holding the frames to annotate
    #[serde(default = "default_frames_path")]
    pub frames: String,

    /// Annotation document
    #[serde(default = "default_annotations_path")]
    pub annotations: String,

    /// Precomputed detections for the sidecar detector
    #[serde(default)]
    pub detections: Option<String>,
}

fn default_frames_path() -> String {
    "data/{project}/raw-frames".to_string()
}

fn default_annotations_path() -> String {
    "data/{project}/annotations.json".to_string()
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            frames: default_frames_path(),
            annotations: default_annotations_path(),
            detections: None,
        }
    }
}

/// User preferences section of the config.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserPreferences {
    /// Log verbosity level
    #[serde(default)]
    pub log_level: LogLevel,

    /// Window width as a fraction of the reference screen
    #[serde(default = "default_window_percent")]
    pub window_width_percent: f32,

    /// Window height as a fraction of the reference screen
    #[serde(default = "default_window_percent")]
    pub window_height_percent: f32,

    /// Minimum detector confidence
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f32,
}

fn default_window_percent() -> f32 {
    display::DEFAULT_PERCENT
}

fn default_confidence_threshold() -> f32 {
    DEFAULT_CONFIDENCE_THRESHOLD
}

impl Default for UserPreferences {
    fn default() -> Self {
        Self {
            log_level: LogLevel::default(),
            window_width_percent: default_window_percent(),
            window_height_percent: default_window_percent(),
            confidence_threshold: default_confidence_threshold(),
        }
    }
}

impl UserPreferences {
    /// Target display size for frames.
    ///
    /// Percentages outside `(0.1, 1.0]` fall back to a fixed size.
    pub fn display_target(&self) -> (u32, u32) {
        let valid = |p: f32| p > 0.1 && p <= 1.0;
        if valid(self.window_width_percent) && valid(self.window_height_percent) {
            (
                (display::REFERENCE_WIDTH * self.window_width_percent) as u32,
                (display::REFERENCE_HEIGHT * self.window_height_percent) as u32,
            )
        } else {
            log::warn!(
                "Invalid window percentages ({}, {}), using {}x{}",
                self.window_width_percent,
                self.window_height_percent,
                display::FALLBACK_WIDTH,
                display::FALLBACK_HEIGHT
            );
            (display::FALLBACK_WIDTH, display::FALLBACK_HEIGHT)
        }
    }
}

/// One annotation project.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProjectConfig {
    #[serde(default)]
    pub description: Option<String>,

    /// Category id to display name
    #[serde(default)]
    pub categories: BTreeMap<String, String>,

    /// Key-bound refinements of the `subcategory_parent` category
    #[serde(default)]
    pub subcategories: Vec<SubcategoryConfig>,

    /// Category name that subcategories apply to
    #[serde(default)]
    pub subcategory_parent: Option<String>,

    #[serde(default)]
    pub annotation: AnnotationConfig,
}

/// Subcategory definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubcategoryConfig {
    pub id: String,
    pub name: String,
    pub key: char,
}

/// Fixed-box generation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnnotationConfig {
    #[serde(default)]
    pub fixed_bboxes: Vec<FixedBoxConfig>,

    /// Jitter every fixed box by up to `random_variation` pixels
    #[serde(default)]
    pub add_random_coords: bool,

    #[serde(default = "default_random_variation")]
    pub random_variation: i32,

    /// Category id for fixed boxes without their own
    #[serde(default)]
    pub default_category: Option<String>,
}

fn default_random_variation() -> i32 {
    DEFAULT_RANDOM_VARIATION
}

impl Default for AnnotationConfig {
    fn default() -> Self {
        Self {
            fixed_bboxes: Vec::new(),
            add_random_coords: false,
            random_variation: default_random_variation(),
            default_category: None,
        }
    }
}

/// A fixed box, either a bare `[x1, y1, x2, y2]` or with a category id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FixedBoxConfig {
    Plain([i32; 4]),
    WithCategory {
        bbox: [i32; 4],
        #[serde(default)]
        category: Option<String>,
    },
}

impl FixedBoxConfig {
    pub fn bbox(&self) -> BBox {
        match self {
            Self::Plain(b) | Self::WithCategory { bbox: b, .. } => BBox::from(*b),
        }
    }

    pub fn category(&self) -> Option<&str> {
        match self {
            Self::Plain(_) => None,
            Self::WithCategory { category, .. } => category.as_deref(),
        }
    }
}

/// The project selected for this run.
#[derive(Debug, Clone)]
pub struct ActiveProject {
    pub name: String,
    pub config: ProjectConfig,
}

/// Recursively merge `overlay` into `base`. Objects merge key by key;
/// any other value replaces what was there.
pub fn merge_json(base: &mut serde_json::Value, overlay: serde_json::Value) {
    match (base, overlay) {
        (serde_json::Value::Object(base), serde_json::Value::Object(overlay)) => {
            for (key, value) in overlay {
                match base.get_mut(&key) {
                    Some(existing) => merge_json(existing, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}

impl AppConfig {
    /// Create a new configuration with default values.
    pub fn new() -> Self {
        Self {
            version: CONFIG_VERSION,
            active_project: None,
            root_dir: None,
            paths: PathsConfig::default(),
            preferences: UserPreferences::default(),
            projects: BTreeMap::new(),
        }
    }

    /// Deserialize configuration from JSON.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let value: serde_json::Value = serde_json::from_str(json)?;
        Self::from_value(value)
    }

    fn from_value(value: serde_json::Value) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_value(value)?;

        // Validate version compatibility
        if config.version > CONFIG_VERSION {
            return Err(ConfigError::VersionTooNew {
                file_version: config.version,
                supported_version: CONFIG_VERSION,
            });
        }

        Ok(config)
    }

    /// Get the default config filename.
    pub fn default_filename() -> &'static str {
        "framelabel.json"
    }

    /// Get the per-user config file path.
    pub fn default_path() -> Option<PathBuf> {
        // Try to use XDG config directory, fall back to home directory
        if let Some(config_dir) = dirs::config_dir() {
            Some(config_dir.join("framelabel").join(Self::default_filename()))
        } else {
            dirs::home_dir().map(|home| {
                home.join(".config")
                    .join("framelabel")
                    .join(Self::default_filename())
            })
        }
    }

    /// Path of the local override for `base`: `name.json` -> `name.local.json`.
    pub fn local_override_path(base: &Path) -> PathBuf {
        let stem = base
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "framelabel".to_string());
        base.with_file_name(format!("{stem}.local.json"))
    }

    /// Find the config file: explicit path, `./configs/`, then the user config dir.
    pub fn locate(explicit: Option<&Path>) -> Option<PathBuf> {
        if let Some(path) = explicit {
            return Some(path.to_path_buf());
        }

        let local = Path::new("configs").join(Self::default_filename());
        if local.exists() {
            return Some(local);
        }

        Self::default_path().filter(|p| p.exists())
    }

    /// Load the base file at `path` with its local override applied.
    pub fn load_layered(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let mut value: serde_json::Value = serde_json::from_str(&text)?;
        log::info!("Loaded configuration from {:?}", path);

        let override_path = Self::local_override_path(path);
        if override_path.exists() {
            match std::fs::read_to_string(&override_path)
                .map_err(ConfigError::from)
                .and_then(|t| serde_json::from_str(&t).map_err(ConfigError::from))
            {
                Ok(overlay) => {
                    merge_json(&mut value, overlay);
                    log::info!("Applied local overrides from {:?}", override_path);
                }
                Err(e) => log::warn!("Ignoring local overrides {:?}: {}", override_path, e),
            }
        }

        Self::from_value(value)
    }

    /// Locate and load configuration, using defaults if no file exists.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        match Self::locate(explicit) {
            Some(path) => Self::load_layered(&path),
            None => {
                log::debug!("No config file found, using defaults");
                Ok(Self::new())
            }
        }
    }

    /// Pick the active project: `cli` > `env` > `active_project`.
    ///
    /// A named project that is not defined is an error. With no name at all
    /// the only defined project is used, or an empty default project.
    pub fn select_project(
        &self,
        cli: Option<&str>,
        env: Option<&str>,
    ) -> Result<ActiveProject, ConfigError> {
        let requested = cli
            .or(env)
            .or(self.active_project.as_deref())
            .filter(|name| !name.is_empty());

        match requested {
            Some(name) => match self.projects.get(name) {
                Some(config) => {
                    log::info!("Using project '{}'", name);
                    Ok(ActiveProject {
                        name: name.to_string(),
                        config: config.clone(),
                    })
                }
                None => Err(ConfigError::UnknownProject {
                    name: name.to_string(),
                    available: self.projects.keys().cloned().collect(),
                }),
            },
            None if self.projects.len() == 1 => {
                let (name, config) = self
                    .projects
                    .iter()
                    .next()
                    .map(|(n, c)| (n.clone(), c.clone()))
                    .unwrap_or_default();
                log::info!("Using only defined project '{}'", name);
                Ok(ActiveProject { name, config })
            }
            None => {
                log::warn!("No project selected, using empty '{}' project", DEFAULT_PROJECT);
                Ok(ActiveProject {
                    name: DEFAULT_PROJECT.to_string(),
                    config: ProjectConfig::default(),
                })
            }
        }
    }

    /// Base directory for relative paths.
    pub fn root_dir(&self) -> PathBuf {
        let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        match &self.root_dir {
            Some(root) => cwd.join(root),
            None => cwd,
        }
    }

    /// Expand `{project}` in `template` and resolve it against the root dir.
    pub fn resolve_path(&self, template: &str, project: &str) -> PathBuf {
        self.root_dir()
            .join(template.replace(PROJECT_PLACEHOLDER, project))
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// JSON parsing error
    #[error("Failed to parse configuration: {0}")]
    ParseError(#[from] serde_json::Error),

    /// Configuration version is newer than supported
    #[error(
        "Configuration file version {file_version} is newer than supported version {supported_version}"
    )]
    VersionTooNew {
        file_version: u32,
        supported_version: u32,
    },

    /// I/O error when reading config
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// The config file could not be read
    #[error("Failed to read configuration {path:?}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The requested project is not defined
    #[error("Project '{name}' not found (available: {available:?})")]
    UnknownProject { name: String, available: Vec<String> },

    /// A category filter names no category of the project
    #[error("Category '{0}' is not defined for this project")]
    UnknownCategory(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "version": 1,
        "active_project": "carbonizacao-1",
        "preferences": { "log_level": "debug", "confidence_threshold": 0.5 },
        "projects": {
            "carbonizacao-1": {
                "categories": { "1": "com_fumaca", "2": "sem_fumaca" },
                "annotation": {
                    "fixed_bboxes": [
                        [10, 10, 100, 100],
                        { "bbox": [200, 200, 300, 300], "category": "2" }
                    ]
                }
            },
            "sinterizacao-1": {
                "categories": { "4": "estado_indefinido" },
                "annotation": { "add_random_coords": true, "default_category": "4" }
            }
        }
    }"#;

    #[test]
    fn test_defaults_from_empty_document() {
        let config = AppConfig::from_json("{}").unwrap();
        assert_eq!(config.version, CONFIG_VERSION);
        assert_eq!(config.preferences.log_level, LogLevel::Info);
        assert_eq!(config.paths.frames, "data/{project}/raw-frames");
        assert!((config.preferences.confidence_threshold - DEFAULT_CONFIDENCE_THRESHOLD).abs() < 1e-6);
    }

    #[test]
    fn test_version_too_new() {
        let err = AppConfig::from_json(r#"{"version": 99}"#).unwrap_err();
        assert!(matches!(err, ConfigError::VersionTooNew { file_version: 99, .. }));
    }

    #[test]
    fn test_parse_projects_and_fixed_boxes() {
        let config = AppConfig::from_json(SAMPLE).unwrap();
        assert_eq!(config.preferences.log_level, LogLevel::Debug);

        let project = &config.projects["carbonizacao-1"];
        let boxes = &project.annotation.fixed_bboxes;
        assert_eq!(boxes[0].bbox(), BBox::new(10, 10, 100, 100));
        assert_eq!(boxes[0].category(), None);
        assert_eq!(boxes[1].category(), Some("2"));

        let sinter = &config.projects["sinterizacao-1"].annotation;
        assert!(sinter.add_random_coords);
        assert_eq!(sinter.random_variation, DEFAULT_RANDOM_VARIATION);
    }

    #[test]
    fn test_project_selection_precedence() {
        let config = AppConfig::from_json(SAMPLE).unwrap();

        let active = config.select_project(None, None).unwrap();
        assert_eq!(active.name, "carbonizacao-1");

        let env = config.select_project(None, Some("sinterizacao-1")).unwrap();
        assert_eq!(env.name, "sinterizacao-1");

        let cli = config
            .select_project(Some("carbonizacao-1"), Some("sinterizacao-1"))
            .unwrap();
        assert_eq!(cli.name, "carbonizacao-1");

        let err = config.select_project(Some("missing"), None).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownProject { .. }));
    }

    #[test]
    fn test_project_fallbacks() {
        let config = AppConfig::new();
        assert_eq!(config.select_project(None, None).unwrap().name, DEFAULT_PROJECT);

        let single = AppConfig::from_json(r#"{"projects": {"only": {}}}"#).unwrap();
        assert_eq!(single.select_project(None, None).unwrap().name, "only");
    }

    #[test]
    fn test_merge_json_is_deep() {
        let mut base = serde_json::json!({
            "preferences": { "log_level": "info", "window_width_percent": 0.5 },
            "active_project": "a"
        });
        merge_json(
            &mut base,
            serde_json::json!({ "preferences": { "log_level": "trace" }, "active_project": "b" }),
        );
        assert_eq!(base["preferences"]["log_level"], "trace");
        assert_eq!(base["preferences"]["window_width_percent"], 0.5);
        assert_eq!(base["active_project"], "b");
    }

    #[test]
    fn test_load_layered_applies_local_override() {
        let dir = tempfile::TempDir::new().unwrap();
        let base = dir.path().join("framelabel.json");
        std::fs::write(&base, SAMPLE).unwrap();
        std::fs::write(
            AppConfig::local_override_path(&base),
            r#"{"active_project": "sinterizacao-1"}"#,
        )
        .unwrap();

        let config = AppConfig::load_layered(&base).unwrap();
        assert_eq!(config.active_project.as_deref(), Some("sinterizacao-1"));
        assert_eq!(config.projects.len(), 2);
    }

    #[test]
    fn test_resolve_path_interpolates_project() {
        let mut config = AppConfig::new();
        config.root_dir = Some(PathBuf::from("/srv/frames"));
        let path = config.resolve_path("data/{project}/raw-frames", "sinterizacao-1");
        assert_eq!(path, PathBuf::from("/srv/frames/data/sinterizacao-1/raw-frames"));
    }

    #[test]
    fn test_display_target() {
        let prefs = UserPreferences::default();
        assert_eq!(prefs.display_target(), (1440, 810));

        let bad = UserPreferences {
            window_width_percent: 1.5,
            ..UserPreferences::default()
        };
        assert_eq!(bad.display_target(), (1280, 720));
    }
}
