//! Global constants for the framelabel application

use std::time::Duration;

/// Minimum width and height (original image pixels) of a committed box.
pub const MIN_BBOX_SIZE: i32 = 10;

/// Candidates overlapping an existing box above this IoU are duplicates.
pub const DUPLICATE_IOU_THRESHOLD: f32 = 0.5;

/// Delay between a successful commit and the auto-skip advance.
pub const AUTO_SKIP_DELAY: Duration = Duration::from_millis(300);

/// How long the loop waits for input before re-polling timers.
pub const INPUT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Default detector confidence threshold.
pub const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.35;

/// Default per-coordinate jitter for fixed boxes (pixels).
pub const DEFAULT_RANDOM_VARIATION: i32 = 4;

/// Frame jumps.
pub mod jump {
    /// W/S and arrow up/down
    pub const SHORT: usize = 10;
    /// Page up/down
    pub const LONG: usize = 100;
}

/// Display sizing.
pub mod display {
    /// Reference screen the window percentages apply to.
    pub const REFERENCE_WIDTH: f32 = 1600.0;
    pub const REFERENCE_HEIGHT: f32 = 900.0;
    /// Used when the configured percentages are out of range.
    pub const FALLBACK_WIDTH: u32 = 1280;
    pub const FALLBACK_HEIGHT: u32 = 720;
    /// Default window percentage of the reference screen.
    pub const DEFAULT_PERCENT: f32 = 0.9;
}
