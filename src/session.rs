//! Mutable session state for the annotation loop.
//!
//! Holds the frame cursor, the durable-annotation selection, the in-progress
//! drag, overlay flags and the mode toggles. It performs no I/O.

use std::fmt;

use crate::auto_skip::{AutoSkipMode, AutoSkipTimer};
use crate::model::{BBox, CategoryRef, Direction, DisplayPoint, ImageShape};
use crate::store::Statistics;

/// Automatic candidate generation on frame change.
///
/// Detector inference and fixed-box generation are mutually exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AutoMode {
    #[default]
    Off,
    Inference,
    FixedBox,
}

/// How much the renderer draws on top of the frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DisplayMode {
    #[default]
    Full,
    NoOverlay,
    BoxesOnly,
}

impl DisplayMode {
    /// Full -> NoOverlay -> BoxesOnly -> Full.
    pub fn next(self) -> Self {
        match self {
            Self::Full => Self::NoOverlay,
            Self::NoOverlay => Self::BoxesOnly,
            Self::BoxesOnly => Self::Full,
        }
    }
}

impl fmt::Display for DisplayMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Full => "full display",
            Self::NoOverlay => "no overlays",
            Self::BoxesOnly => "boxes only",
        };
        f.write_str(name)
    }
}

/// Full-screen overlays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Overlay {
    Help,
    Stats,
}

/// Everything the session remembers between loop iterations.
#[derive(Debug, Default)]
pub struct SessionState {
    pub current_index: usize,
    pub total_files: usize,
    pub current_filename: Option<String>,

    pub show_help: bool,
    pub show_stats: bool,
    pub quit_confirm: bool,
    pub stats_data: Option<Statistics>,

    /// Drag origin while a box is being drawn
    pub drag_start: Option<DisplayPoint>,
    pub mouse_pos: Option<DisplayPoint>,

    pub original_shape: Option<ImageShape>,
    pub display_shape: Option<ImageShape>,

    /// Selected durable annotation of the current file
    pub selected_annotation: Option<usize>,

    pub auto_mode: AutoMode,
    pub auto_skip: AutoSkipMode,
    pub auto_skip_timer: AutoSkipTimer,
    pub display_mode: DisplayMode,

    pub last_drawn_bbox: Option<BBox>,
    pub last_drawn_category: Option<CategoryRef>,
    pub last_pressed_category: Option<CategoryRef>,

    /// Latest operator-facing notice
    pub message: Option<String>,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_drawing(&self) -> bool {
        self.drag_start.is_some()
    }

    pub fn start_drawing(&mut self, at: DisplayPoint) {
        self.drag_start = Some(at);
        self.mouse_pos = Some(at);
    }

    /// Drop the in-progress drag. The pointer position is kept.
    pub fn reset_drawing(&mut self) {
        self.drag_start = None;
    }

    /// Hide overlays except `keep`. Always clears the quit confirmation.
    pub fn reset_overlays(&mut self, keep: Option<Overlay>) {
        if keep != Some(Overlay::Help) {
            self.show_help = false;
        }
        if keep != Some(Overlay::Stats) {
            self.show_stats = false;
        }
        self.quit_confirm = false;
    }

    pub fn overlay_active(&self) -> bool {
        self.show_help || self.show_stats
    }

    /// Record the newly loaded frame. Resets drawing and selection.
    pub fn update_image_info(
        &mut self,
        original: Option<ImageShape>,
        display: Option<ImageShape>,
        filename: Option<String>,
        index: usize,
        total: usize,
    ) {
        self.original_shape = original;
        self.display_shape = display;
        self.current_filename = filename;
        self.current_index = index;
        self.total_files = total;
        self.reset_drawing();
        self.selected_annotation = None;
    }

    /// Select the annotation at `index`, or clear the selection.
    pub fn select_annotation(&mut self, index: Option<usize>) {
        self.selected_annotation = index;
    }

    /// Drop the selection if it no longer points into a list of `len` items.
    pub fn revalidate_selection(&mut self, len: usize) {
        if self.selected_annotation.is_some_and(|i| i >= len) {
            log::debug!(
                "Selection {:?} out of range for {} annotations, clearing",
                self.selected_annotation,
                len
            );
            self.selected_annotation = None;
        }
    }

    /// Step the selection through `order` (annotation indices in reading order).
    ///
    /// With no selection, forward picks the first and backward the last.
    pub fn cycle_selection(&mut self, order: &[usize], direction: Direction) -> Option<usize> {
        if order.is_empty() {
            self.selected_annotation = None;
            return None;
        }

        let position = self
            .selected_annotation
            .and_then(|sel| order.iter().position(|&i| i == sel));
        let next = match (position, direction) {
            (None, Direction::Forward) => 0,
            (None, Direction::Backward) => order.len() - 1,
            (Some(p), Direction::Forward) => (p + 1) % order.len(),
            (Some(p), Direction::Backward) => (p + order.len() - 1) % order.len(),
        };
        self.selected_annotation = Some(order[next]);
        self.selected_annotation
    }

    pub fn notice(&mut self, message: impl Into<String>) {
        let message = message.into();
        log::info!("{}", message);
        self.message = Some(message);
    }

    /// Turn detector inference on, or off if it already is. Returns the new state.
    pub fn toggle_auto_inference(&mut self) -> bool {
        self.auto_mode = match self.auto_mode {
            AutoMode::Inference => AutoMode::Off,
            _ => AutoMode::Inference,
        };
        self.auto_mode == AutoMode::Inference
    }

    /// Turn fixed-box generation on, or off if it already is. Returns the new state.
    pub fn toggle_auto_fixed_box(&mut self) -> bool {
        self.auto_mode = match self.auto_mode {
            AutoMode::FixedBox => AutoMode::Off,
            _ => AutoMode::FixedBox,
        };
        self.auto_mode == AutoMode::FixedBox
    }

    pub fn cycle_auto_skip(&mut self) -> AutoSkipMode {
        self.auto_skip = self.auto_skip.next();
        if !self.auto_skip.is_enabled() {
            self.auto_skip_timer.cancel();
        }
        self.auto_skip
    }

    pub fn cycle_display_mode(&mut self) -> DisplayMode {
        self.display_mode = self.display_mode.next();
        self.display_mode
    }

    /// Arm the auto-skip timer if auto-skip is enabled.
    pub fn arm_auto_skip(&mut self) {
        if self.auto_skip.is_enabled() {
            self.auto_skip_timer.arm();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auto_modes_are_exclusive() {
        let mut state = SessionState::new();
        assert!(state.toggle_auto_inference());
        assert!(state.toggle_auto_fixed_box());
        assert_eq!(state.auto_mode, AutoMode::FixedBox);
        assert!(state.toggle_auto_inference());
        assert_eq!(state.auto_mode, AutoMode::Inference);
        assert!(!state.toggle_auto_inference());
        assert_eq!(state.auto_mode, AutoMode::Off);
    }

    #[test]
    fn test_reset_overlays_keeps_one() {
        let mut state = SessionState::new();
        state.show_help = true;
        state.show_stats = true;
        state.quit_confirm = true;

        state.reset_overlays(Some(Overlay::Stats));
        assert!(!state.show_help);
        assert!(state.show_stats);
        assert!(!state.quit_confirm);

        state.reset_overlays(None);
        assert!(!state.overlay_active());
    }

    #[test]
    fn test_update_image_info_resets_transients() {
        let mut state = SessionState::new();
        state.start_drawing(DisplayPoint::new(5, 5));
        state.select_annotation(Some(2));

        state.update_image_info(
            Some(ImageShape::new(1920, 1080)),
            Some(ImageShape::new(1280, 720)),
            Some("7.jpg".into()),
            7,
            20,
        );
        assert!(!state.is_drawing());
        assert_eq!(state.mouse_pos, Some(DisplayPoint::new(5, 5)));
        assert_eq!(state.selected_annotation, None);
        assert_eq!(state.current_index, 7);
        assert_eq!(state.total_files, 20);
    }

    #[test]
    fn test_revalidate_selection() {
        let mut state = SessionState::new();
        state.select_annotation(Some(3));
        state.revalidate_selection(4);
        assert_eq!(state.selected_annotation, Some(3));
        state.revalidate_selection(3);
        assert_eq!(state.selected_annotation, None);
    }

    #[test]
    fn test_cycle_selection_wraps_in_given_order() {
        let mut state = SessionState::new();
        let order = [2, 0, 1];
        assert_eq!(state.cycle_selection(&order, Direction::Forward), Some(2));
        assert_eq!(state.cycle_selection(&order, Direction::Forward), Some(0));
        assert_eq!(state.cycle_selection(&order, Direction::Forward), Some(1));
        assert_eq!(state.cycle_selection(&order, Direction::Forward), Some(2));
        assert_eq!(state.cycle_selection(&order, Direction::Backward), Some(1));

        state.select_annotation(None);
        assert_eq!(state.cycle_selection(&order, Direction::Backward), Some(1));
        assert_eq!(state.cycle_selection(&[], Direction::Forward), None);
    }

    #[test]
    fn test_auto_skip_arms_only_when_enabled() {
        let mut state = SessionState::new();
        state.arm_auto_skip();
        assert!(!state.auto_skip_timer.is_armed());

        state.cycle_auto_skip();
        state.arm_auto_skip();
        assert!(state.auto_skip_timer.is_armed());

        state.cycle_auto_skip();
        state.cycle_auto_skip();
        assert_eq!(state.auto_skip, AutoSkipMode::Off);
        assert!(!state.auto_skip_timer.is_armed());
    }
}
