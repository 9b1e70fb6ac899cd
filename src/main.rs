//! `framelabel` command-line entry point.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};

use framelabel::config::{ActiveProject, ConfigError};
use framelabel::detector::SidecarDetector;
use framelabel::fixed_boxes::FixedBoxGenerator;
use framelabel::frames::FrameSource;
use framelabel::model::CategoryTable;
use framelabel::surface::TerminalSurface;
use framelabel::{AnnotationStore, AppConfig, Annotator, SessionEnd, logging};

/// Environment variable naming the project when `--project` is absent.
const PROJECT_ENV: &str = "FRAMELABEL_PROJECT";

#[derive(Parser, Debug)]
#[command(
    name = "framelabel",
    version,
    about = "Bounding-box annotation of image frames",
    after_help = "Type 'h' inside a session for the key reference."
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    #[command(flatten)]
    options: Options,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
enum Commands {
    /// Print annotation statistics and exit
    Stats,
}

#[derive(Args, Debug, Clone, Default)]
struct Options {
    /// Configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Project to annotate (falls back to $FRAMELABEL_PROJECT)
    #[arg(long, global = true)]
    project: Option<String>,
    /// Frames directory
    #[arg(long, global = true)]
    frames: Option<PathBuf>,
    /// Annotation document
    #[arg(long, global = true)]
    annotations: Option<PathBuf>,
    /// Precomputed detections
    #[arg(long, global = true)]
    detections: Option<PathBuf>,
    /// Detector confidence threshold (0-1)
    #[arg(long, global = true, value_parser = parse_confidence)]
    confidence: Option<f32>,
    /// Restrict new boxes to one category, by name or id
    #[arg(long, global = true, value_name = "NAME|ID")]
    category: Option<String>,
    /// First frame to show
    #[arg(long, global = true, value_name = "INDEX")]
    start: Option<usize>,
    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

fn parse_confidence(value: &str) -> Result<f32, String> {
    value
        .parse::<f32>()
        .ok()
        .filter(|c| (0.0..=1.0).contains(c))
        .ok_or_else(|| format!("expected a number between 0 and 1, got {value}"))
}

/// A failure after arguments were accepted.
#[derive(Debug)]
struct CommandError(String);

impl From<ConfigError> for CommandError {
    fn from(error: ConfigError) -> Self {
        CommandError(error.to_string())
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    match run_command(cli.command, &cli.options) {
        Ok(()) => ExitCode::SUCCESS,
        Err(CommandError(msg)) => {
            eprintln!("{msg}");
            ExitCode::from(1)
        }
    }
}

/// Configuration and project for this run, with logging installed.
fn prepare(options: &Options) -> Result<(AppConfig, ActiveProject), CommandError> {
    let config = AppConfig::load(options.config.as_deref())?;

    let level = if options.verbose {
        log::LevelFilter::Debug
    } else {
        config.preferences.log_level.to_level_filter()
    };
    logging::init(level);

    let env_project = std::env::var(PROJECT_ENV).ok();
    let project = config.select_project(options.project.as_deref(), env_project.as_deref())?;
    Ok((config, project))
}

fn open_store(config: &AppConfig, project: &ActiveProject, options: &Options) -> AnnotationStore {
    let path = options
        .annotations
        .clone()
        .unwrap_or_else(|| config.resolve_path(&config.paths.annotations, &project.name));
    AnnotationStore::open(path, Some(&config.root_dir()))
}

fn run_command(command: Option<Commands>, options: &Options) -> Result<(), CommandError> {
    match command {
        Some(Commands::Stats) => stats(options),
        None => annotate(options),
    }
}

fn stats(options: &Options) -> Result<(), CommandError> {
    let (config, project) = prepare(options)?;
    let store = open_store(&config, &project, options);

    let mut stats = store.get_statistics();
    let frames_dir = options
        .frames
        .clone()
        .unwrap_or_else(|| config.resolve_path(&config.paths.frames, &project.name));
    match FrameSource::discover(&frames_dir, config.preferences.display_target()) {
        Ok(frames) => stats = stats.with_frame_total(frames.len()),
        Err(e) => log::warn!("{}", e),
    }
    println!("Project: {}", project.name);
    println!("Annotations: {}", store.path().display());
    print!("{stats}");
    Ok(())
}

fn annotate(options: &Options) -> Result<(), CommandError> {
    let (config, project) = prepare(options)?;
    let store = Arc::new(open_store(&config, &project, options));
    log::info!("Annotating into {}", store.path().display());
    let categories = CategoryTable::from_project(&project.config);
    if categories.is_empty() {
        log::warn!("Project '{}' defines no categories", project.name);
    }

    let filter = match options.category.as_deref() {
        Some(name) => Some(
            categories
                .resolve(name)
                .ok_or_else(|| ConfigError::UnknownCategory(name.to_string()))?,
        ),
        None => None,
    };

    let frames_dir = options
        .frames
        .clone()
        .unwrap_or_else(|| config.resolve_path(&config.paths.frames, &project.name));
    let frames = FrameSource::discover(&frames_dir, config.preferences.display_target())
        .map_err(|e| CommandError(e.to_string()))?;

    let fixed_boxes = FixedBoxGenerator::from_project(&project.config, &categories);
    let mut annotator = Annotator::new(store, categories, fixed_boxes, frames)
        .with_category_filter(filter)
        .with_confidence_threshold(
            options
                .confidence
                .unwrap_or(config.preferences.confidence_threshold),
        )
        .start_at(options.start.unwrap_or(0));

    let detections = options.detections.clone().or_else(|| {
        config
            .paths
            .detections
            .as_deref()
            .map(|template| config.resolve_path(template, &project.name))
    });
    if let Some(path) = detections {
        match SidecarDetector::load(&path) {
            Ok(detector) => annotator = annotator.with_detector(Box::new(detector)),
            Err(e) => log::error!("Continuing without detector: {}", e),
        }
    }

    let mut surface = TerminalSurface::spawn_stdio().map_err(|e| CommandError(e.to_string()))?;
    println!("Type 'h' for help. Draw with: drag X1 Y1 X2 Y2");

    match annotator.run(&mut surface) {
        SessionEnd::Quit | SessionEnd::SurfaceClosed => Ok(()),
        SessionEnd::FramesExhausted => Err(CommandError("no loadable frames remain".to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use clap::error::ErrorKind;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parse_annotate_options() {
        let cli = Cli::try_parse_from([
            "framelabel",
            "--project",
            "transito",
            "--confidence",
            "0.5",
            "--start",
            "12",
            "-v",
        ])
        .expect("options should parse");

        assert_eq!(cli.command, None);
        assert_eq!(cli.options.project.as_deref(), Some("transito"));
        assert_eq!(cli.options.confidence, Some(0.5));
        assert_eq!(cli.options.start, Some(12));
        assert!(cli.options.verbose);
    }

    #[test]
    fn parse_stats_command() {
        let cli = Cli::try_parse_from(["framelabel", "stats", "--annotations", "a.json"]).unwrap();
        assert_eq!(cli.command, Some(Commands::Stats));
        assert_eq!(cli.options.annotations, Some(PathBuf::from("a.json")));
    }

    #[test]
    fn parse_rejects_bad_values() {
        let err = Cli::try_parse_from(["framelabel", "--confidence", "1.5"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ValueValidation);

        assert!(Cli::try_parse_from(["framelabel", "--start"]).is_err());
        assert!(Cli::try_parse_from(["framelabel", "--start", "-3"]).is_err());
        assert!(Cli::try_parse_from(["framelabel", "bogus"]).is_err());
    }
}
