//! Logger setup for the native binary.

use log::LevelFilter;

/// Install `env_logger` at `level`. `RUST_LOG` takes precedence when set.
///
/// Calling this twice is harmless; the second call is ignored.
pub fn init(level: LevelFilter) {
    let mut builder = env_logger::Builder::new();
    builder
        .filter_level(level)
        .format_timestamp_millis()
        .parse_default_env();

    if builder.try_init().is_err() {
        log::debug!("Logger already initialized");
    }
}
