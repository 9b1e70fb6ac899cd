//! The interactive annotation loop.
//!
//! `Annotator` owns the session state and the candidate buffer, borrows the
//! shared store, and turns input events into store mutations. Each loop
//! iteration loads the current frame if needed, fires a due auto-skip,
//! renders and then waits briefly for input.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use rand::SeedableRng;
use rand::rngs::StdRng;

use crate::auto_skip::{AutoSkipMode, AutoSkipTimer};
use crate::candidates::{Candidate, CandidateBuffer};
use crate::constants::{
    DEFAULT_CONFIDENCE_THRESHOLD, DUPLICATE_IOU_THRESHOLD, INPUT_POLL_INTERVAL, MIN_BBOX_SIZE,
};
use crate::detector::Detector;
use crate::fixed_boxes::FixedBoxGenerator;
use crate::frames::{Frame, FrameError, FrameSource};
use crate::input::{Action, InputEvent, InputMode, Key, Navigation};
use crate::model::{
    Annotation, AnnotationSource, BBox, CategoryRef, CategoryTable, Direction, DisplayPoint,
    FileRecord,
};
use crate::session::{AutoMode, Overlay, SessionState};
use crate::store::AnnotationStore;
use crate::surface::{FrameView, Surface, SurfaceError};


/// Lifecycle of the current frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FramePhase {
    Unloaded,
    Loading,
    Ready,
}

/// Why the loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// The operator quit
    Quit,
    /// The display surface went away
    SurfaceClosed,
    /// The last frame failed to load
    FramesExhausted,
}

/// Result of releasing the pointer after a drag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrawOutcome {
    /// No drag was in progress
    NotDrawing,
    /// Zero-area drag, silently dropped
    Degenerate,
    /// Below the minimum size in original pixels
    TooSmall(BBox),
    /// Committed to the store in original pixels
    Added(BBox),
}

/// Drives one annotation session over a frame directory.
pub struct Annotator {
    store: Arc<AnnotationStore>,
    categories: CategoryTable,
    fixed_boxes: FixedBoxGenerator,
    frames: FrameSource,
    detector: Option<Box<dyn Detector>>,
    rng: StdRng,

    state: SessionState,
    candidates: CandidateBuffer,
    frame: Option<Frame>,
    last_loaded_index: Option<usize>,
    phase: FramePhase,

    category_filter: Option<CategoryRef>,
    confidence_threshold: f32,
    poll_interval: Duration,
}

impl Annotator {
    pub fn new(
        store: Arc<AnnotationStore>,
        categories: CategoryTable,
        fixed_boxes: FixedBoxGenerator,
        frames: FrameSource,
    ) -> Self {
        Self {
            store,
            categories,
            fixed_boxes,
            frames,
            detector: None,
            rng: StdRng::from_os_rng(),
            state: SessionState::new(),
            candidates: CandidateBuffer::new(),
            frame: None,
            last_loaded_index: None,
            phase: FramePhase::Unloaded,
            category_filter: None,
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            poll_interval: INPUT_POLL_INTERVAL,
        }
    }

    pub fn with_detector(mut self, detector: Box<dyn Detector>) -> Self {
        self.detector = Some(detector);
        self
    }

    /// Restrict new and staged annotations to one category.
    pub fn with_category_filter(mut self, filter: Option<CategoryRef>) -> Self {
        self.category_filter = filter;
        self
    }

    pub fn with_confidence_threshold(mut self, threshold: f32) -> Self {
        self.confidence_threshold = threshold;
        self
    }

    /// Replace the jitter source, e.g. with a seeded generator.
    pub fn with_rng(mut self, rng: StdRng) -> Self {
        self.rng = rng;
        self
    }

    pub fn with_auto_skip_delay(mut self, delay: Duration) -> Self {
        self.state.auto_skip_timer = AutoSkipTimer::new().with_delay(delay);
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Start at `index`, clamped to the frame list.
    pub fn start_at(mut self, index: usize) -> Self {
        self.state.current_index = index.min(self.frames.len().saturating_sub(1));
        self
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn candidates(&self) -> &CandidateBuffer {
        &self.candidates
    }

    pub fn store(&self) -> &AnnotationStore {
        &self.store
    }

    pub fn phase(&self) -> FramePhase {
        self.phase
    }

    pub fn category_filter(&self) -> Option<&CategoryRef> {
        self.category_filter.as_ref()
    }

    /// Reviewing while candidates are staged, Browsing otherwise.
    pub fn input_mode(&self) -> InputMode {
        if self.candidates.is_empty() {
            InputMode::Browsing
        } else {
            InputMode::Reviewing
        }
    }

    /// Run until the operator quits, the surface closes or frames run out.
    pub fn run(&mut self, surface: &mut impl Surface) -> SessionEnd {
        log::info!(
            "Starting session at frame {} of {}",
            self.state.current_index + 1,
            self.frames.len()
        );

        let end = loop {
            if let Err(end) = self.ensure_frame_loaded() {
                break end;
            }
            if self.poll_auto_skip() {
                continue;
            }

            if let Err(e) = surface.render(&self.view()) {
                if !matches!(e, SurfaceError::Closed) {
                    log::error!("Render failed: {}", e);
                }
                break SessionEnd::SurfaceClosed;
            }

            match surface.poll_event(self.poll_interval) {
                Ok(Some(event)) => {
                    if !self.handle_event(event) {
                        break SessionEnd::Quit;
                    }
                }
                Ok(None) => {}
                Err(SurfaceError::Closed) => break SessionEnd::SurfaceClosed,
                Err(e) => {
                    log::error!("Input failed: {}", e);
                    break SessionEnd::SurfaceClosed;
                }
            }
        };

        log::info!("Session ended ({:?})", end);
        end
    }

    // =========================================================================
    // Frame lifecycle
    // =========================================================================

    /// Load the current frame unless it is ready.
    ///
    /// Frames that fail to load are skipped forward. A failure on the last
    /// frame ends the session.
    fn ensure_frame_loaded(&mut self) -> Result<(), SessionEnd> {
        while self.phase != FramePhase::Ready {
            self.phase = FramePhase::Loading;
            match self.load_current_frame() {
                Ok(()) => self.phase = FramePhase::Ready,
                Err(e) => {
                    log::error!("Skipping frame {}: {}", self.state.current_index, e);
                    if self.state.current_index + 1 >= self.frames.len() {
                        self.state.notice("No more loadable frames");
                        return Err(SessionEnd::FramesExhausted);
                    }
                    self.state.current_index += 1;
                }
            }
        }
        Ok(())
    }

    fn load_current_frame(&mut self) -> Result<(), FrameError> {
        let index = self.state.current_index;
        let frame = self.frames.load(index)?;

        if self.last_loaded_index == Some(index) {
            self.frame = Some(frame);
            return Ok(());
        }

        let dropped = self.candidates.clear();
        if dropped > 0 {
            log::debug!("Discarded {} unconfirmed candidates", dropped);
        }
        self.state.update_image_info(
            Some(frame.original),
            Some(frame.display),
            Some(frame.filename.clone()),
            index,
            self.frames.len(),
        );
        let annotated = self.store.annotation_count(&frame.filename) > 0;
        self.state.select_annotation(annotated.then_some(0));
        self.state.message = None;
        self.frame = Some(frame);
        self.last_loaded_index = Some(index);

        match self.state.auto_mode {
            AutoMode::Off => {}
            AutoMode::Inference => {
                self.run_inference();
            }
            AutoMode::FixedBox => {
                self.generate_fixed_boxes();
            }
        }
        Ok(())
    }

    fn go_to(&mut self, index: usize) {
        log::debug!("Navigating {} -> {}", self.state.current_index, index);
        self.state.current_index = index;
        self.phase = FramePhase::Loading;
    }

    fn current_record(&self) -> FileRecord {
        self.state
            .current_filename
            .as_deref()
            .map(|name| self.store.get_file_data(name))
            .unwrap_or_default()
    }

    /// Filename and absolute path of the loaded frame.
    fn current_target(&self) -> Option<(String, PathBuf)> {
        let filename = self.state.current_filename.clone()?;
        let path = self.frames.path_of(self.state.current_index)?;
        Some((filename, path))
    }

    /// Display-over-original scale per axis.
    fn display_scale(&self) -> Option<(f32, f32)> {
        let original = self.state.original_shape.filter(|s| s.is_valid())?;
        let display = self.state.display_shape.filter(|s| s.is_valid())?;
        Some((
            display.width as f32 / original.width as f32,
            display.height as f32 / original.height as f32,
        ))
    }

    fn to_display(&self, bbox: &BBox) -> BBox {
        match self.display_scale() {
            Some((sx, sy)) => bbox.scaled(sx, sy),
            None => *bbox,
        }
    }

    // =========================================================================
    // Navigation
    // =========================================================================

    /// Move to another frame. Returns false at a boundary.
    pub fn navigate(&mut self, navigation: Navigation) -> bool {
        self.state.auto_skip_timer.cancel();
        self.state.reset_drawing();

        let current = self.state.current_index;
        let last = self.frames.len().saturating_sub(1);
        let target = match navigation {
            Navigation::Prev => current.checked_sub(1),
            Navigation::Next => (current < last).then_some(current + 1),
            Navigation::Back(n) => (current > 0).then(|| current.saturating_sub(n)),
            Navigation::Forward(n) => (current < last).then(|| (current + n).min(last)),
            Navigation::First => (current > 0).then_some(0),
            Navigation::Last => (current < last).then_some(last),
            Navigation::PrevAnnotated => self.find_annotated(Direction::Backward),
            Navigation::NextAnnotated => self.find_annotated(Direction::Forward),
        };

        match target {
            Some(index) => {
                self.go_to(index);
                true
            }
            None => {
                let message = match navigation {
                    Navigation::PrevAnnotated | Navigation::NextAnnotated => {
                        "No further annotated frame"
                    }
                    Navigation::Prev | Navigation::Back(_) | Navigation::First => {
                        "Already at the first frame"
                    }
                    _ => "Already at the last frame",
                };
                self.state.notice(message);
                false
            }
        }
    }

    fn find_annotated(&self, direction: Direction) -> Option<usize> {
        let names = self.frames.filenames();
        let start = self.state.current_index;
        match (&self.category_filter, direction) {
            (Some(filter), Direction::Forward) => {
                self.store.find_next_with_category(start, names, &filter.id)
            }
            (Some(filter), Direction::Backward) => {
                self.store.find_prev_with_category(start, names, &filter.id)
            }
            (None, Direction::Forward) => self.store.find_next_annotated_index(start, names),
            (None, Direction::Backward) => self.store.find_prev_annotated_index(start, names),
        }
    }

    /// Fire the auto-skip timer if it is due. Returns true if it navigated.
    pub fn poll_auto_skip(&mut self) -> bool {
        if !self.state.auto_skip_timer.take_if_due() {
            return false;
        }

        let current = self.state.current_index;
        let target = match self.state.auto_skip {
            AutoSkipMode::Off => None,
            AutoSkipMode::Frame => (current + 1 < self.frames.len()).then_some(current + 1),
            AutoSkipMode::Annotation => self
                .store
                .find_next_annotated_index(current, self.frames.filenames()),
        };

        match target {
            Some(index) => {
                log::info!("Auto-skip to frame {}", index + 1);
                self.go_to(index);
                true
            }
            None => {
                log::info!("Auto-skip: nowhere to go from frame {}", current + 1);
                false
            }
        }
    }

    // =========================================================================
    // Input
    // =========================================================================

    /// Apply one input event. Returns false when the session should end.
    pub fn handle_event(&mut self, event: InputEvent) -> bool {
        match event {
            InputEvent::Key(key) => return self.handle_key(key),
            InputEvent::PointerDown(at) => self.pointer_down(at),
            InputEvent::PointerMove(at) => {
                if self.state.is_drawing() {
                    self.state.mouse_pos = Some(at);
                }
            }
            InputEvent::PointerUp(at) => {
                self.finish_draw(at);
            }
        }
        true
    }

    fn handle_key(&mut self, key: Key) -> bool {
        let action = self.input_mode().action_for(key, &self.categories);
        if action != Some(Action::RequestQuit) {
            self.state.quit_confirm = false;
        }
        match action {
            Some(action) => self.dispatch(action),
            None => {
                log::trace!("Unbound key {:?}", key);
                true
            }
        }
    }

    /// Pointer input is ignored while an overlay or quit prompt is shown.
    fn pointer_blocked(&self) -> bool {
        self.state.overlay_active() || self.state.quit_confirm
    }

    /// Select a candidate, then a durable annotation, else start drawing.
    fn pointer_down(&mut self, at: DisplayPoint) {
        if self.pointer_blocked() {
            return;
        }
        self.state.mouse_pos = Some(at);

        if let Some(i) = self.candidates.hit_test(at.x, at.y, |b| self.to_display(b)) {
            self.candidates.select(Some(i));
            self.state.select_annotation(None);
            return;
        }

        let record = self.current_record();
        let hit = record
            .annotations
            .iter()
            .enumerate()
            .rev()
            .find(|(_, a)| a.bbox.is_some_and(|b| self.to_display(&b).contains(at.x, at.y)))
            .map(|(i, _)| i);
        if let Some(i) = hit {
            self.state.select_annotation(Some(i));
            self.candidates.select(None);
            return;
        }

        self.state.start_drawing(at);
    }

    /// Complete a drag at `end` and commit the box.
    pub fn finish_draw(&mut self, end: DisplayPoint) -> DrawOutcome {
        let Some(start) = self.state.drag_start else {
            return DrawOutcome::NotDrawing;
        };
        self.state.reset_drawing();
        self.state.mouse_pos = Some(end);

        let drag = BBox::from_corners(start.x, start.y, end.x, end.y);
        if drag.area() == 0 {
            log::debug!("Ignoring zero-area drag at {:?}", start);
            return DrawOutcome::Degenerate;
        }

        let (Some((sx, sy)), Some(original), Some((filename, path))) = (
            self.display_scale(),
            self.state.original_shape,
            self.current_target(),
        ) else {
            return DrawOutcome::Degenerate;
        };

        let scaled = drag.scaled(1.0 / sx, 1.0 / sy);
        let max_x = original.width as i32 - 1;
        let max_y = original.height as i32 - 1;
        let bbox = BBox::new(
            scaled.x1.clamp(0, max_x),
            scaled.y1.clamp(0, max_y),
            scaled.x2.clamp(0, max_x),
            scaled.y2.clamp(0, max_y),
        );

        if !bbox.meets_min_size(MIN_BBOX_SIZE) {
            self.state.notice(format!(
                "Box too small ({}x{}), minimum is {}px",
                bbox.width(),
                bbox.height(),
                MIN_BBOX_SIZE
            ));
            return DrawOutcome::TooSmall(bbox);
        }

        let category = self
            .category_filter
            .clone()
            .or_else(|| self.current_record().last().and_then(Annotation::category));
        self.commit_box(&filename, &path, bbox, category);
        DrawOutcome::Added(bbox)
    }

    /// Add a human box, select it and arm auto-skip.
    fn commit_box(
        &mut self,
        filename: &str,
        path: &Path,
        bbox: BBox,
        category: Option<CategoryRef>,
    ) {
        let saved = self.store.add_annotation(
            filename,
            bbox,
            category.as_ref(),
            path,
            AnnotationSource::Human,
        );
        let count = self.store.annotation_count(filename);
        self.state.select_annotation(count.checked_sub(1));
        self.state.last_drawn_bbox = Some(bbox);
        self.state.last_drawn_category = category;

        if saved {
            self.state.arm_auto_skip();
        } else {
            self.state.notice("Box added but could not be saved");
        }
    }

    /// Perform an action. Returns false when the session should end.
    pub fn dispatch(&mut self, action: Action) -> bool {
        match action {
            Action::Quit => return false,
            Action::RequestQuit => {
                if self.state.quit_confirm {
                    return false;
                }
                self.state.quit_confirm = true;
                self.state.notice("Press q again to quit");
            }
            Action::ToggleHelp => {
                let show = !self.state.show_help;
                self.state.reset_overlays(Some(Overlay::Help));
                self.state.show_help = show;
            }
            Action::ToggleStats => {
                let show = !self.state.show_stats;
                self.state.reset_overlays(Some(Overlay::Stats));
                if show {
                    self.state.stats_data =
                        Some(self.store.get_statistics().with_frame_total(self.frames.len()));
                }
                self.state.show_stats = show;
            }
            Action::CycleDisplayMode => {
                let mode = self.state.cycle_display_mode();
                self.state.notice(format!("Display: {}", mode));
            }
            Action::Navigate(navigation) => {
                self.navigate(navigation);
            }

            Action::CycleAnnotation(direction) => {
                let order = self.current_record().reading_order();
                self.state.cycle_selection(&order, direction);
            }
            Action::AssignCategory(id) => self.assign_category(&id),
            Action::AssignSubcategory(id) => self.assign_subcategory(&id),
            Action::DeleteSelected => {
                self.delete_selected();
            }
            Action::ClearAll => {
                self.clear_all();
            }
            Action::RepeatLast => {
                self.repeat_last();
            }

            Action::ToggleInference => {
                if self.candidates.is_empty() {
                    self.run_inference();
                } else {
                    let dropped = self.candidates.clear();
                    self.state.notice(format!("Discarded {} candidates", dropped));
                }
            }
            Action::ToggleFixedBoxes => {
                self.generate_fixed_boxes();
            }
            Action::ToggleAutoInference => self.toggle_auto_inference(),
            Action::ToggleAutoFixedBox => self.toggle_auto_fixed_box(),
            Action::CycleAutoSkip => {
                let mode = self.state.cycle_auto_skip();
                self.state.notice(format!("Auto-skip: {}", mode.label()));
            }

            Action::CycleCandidate(direction) => {
                self.candidates.navigate(direction);
            }
            Action::ConfirmCandidate => {
                self.confirm_current();
            }
            Action::ConfirmAllCandidates => {
                self.confirm_all();
            }
            Action::SetCandidateCategory(id) => self.set_candidate_category(&id),
        }
        true
    }

    // =========================================================================
    // Durable annotation edits
    // =========================================================================

    /// Classify the selected annotation, or the last one without a selection.
    fn assign_category(&mut self, id: &str) {
        let Some(category) = self.categories.get(id) else {
            self.state.notice(format!("Unknown category {}", id));
            return;
        };
        self.state.last_pressed_category = Some(category.clone());
        let Some(filename) = self.state.current_filename.clone() else {
            return;
        };

        let record = self.current_record();
        self.state.revalidate_selection(record.annotations.len());
        let target = self
            .state
            .selected_annotation
            .or_else(|| record.annotations.len().checked_sub(1))
            .and_then(|i| record.annotations.get(i));
        let Some(target) = target else {
            self.state.notice(format!("No annotation to mark as {}", category.name));
            return;
        };
        if target.category().as_ref() == Some(&category)
            && target.annotation_source == AnnotationSource::Human
        {
            self.state.notice(format!("Already {}", category.name));
            return;
        }

        let updated = match self.state.selected_annotation {
            Some(index) => {
                self.store
                    .update_annotation_category_by_index(&filename, index, &category)
            }
            None => {
                let updated = self.store.update_last_annotation_category(&filename, &category);
                if updated {
                    self.state.last_drawn_category = Some(category.clone());
                }
                updated
            }
        };

        if updated {
            self.state.notice(format!("Category: {}", category.name));
        } else {
            self.state
                .notice(format!("Category {} could not be saved", category.name));
        }
    }

    fn assign_subcategory(&mut self, id: &str) {
        let Some(sub) = self
            .categories
            .subcategories()
            .iter()
            .find(|s| s.id == id)
            .cloned()
        else {
            return;
        };
        let Some(parent) = self.categories.subcategory_parent().map(str::to_string) else {
            self.state.notice("No category accepts subcategories");
            return;
        };
        let Some(filename) = self.state.current_filename.clone() else {
            return;
        };

        if self
            .store
            .update_last_subcategory(&filename, &parent, &sub.id, &sub.name)
        {
            self.state.notice(format!("Subcategory: {}", sub.name));
        } else {
            self.state.notice(format!("No {} annotation to refine", parent));
        }
    }

    /// Delete the selected annotation and keep the selection valid.
    fn delete_selected(&mut self) -> bool {
        let Some(index) = self.state.selected_annotation else {
            self.state.notice("No annotation selected");
            return false;
        };
        let Some(filename) = self.state.current_filename.clone() else {
            return false;
        };

        let deleted = self.store.delete_annotation_by_index(&filename, index);
        let remaining = self.store.annotation_count(&filename);
        self.state
            .select_annotation(remaining.checked_sub(1).map(|last| index.min(last)));

        if deleted {
            self.state
                .notice(format!("Deleted annotation ({} left)", remaining));
        }
        deleted
    }

    fn clear_all(&mut self) -> bool {
        let Some(filename) = self.state.current_filename.clone() else {
            return false;
        };
        let count = self.store.annotation_count(&filename);
        let cleared = self.store.clear_annotations(&filename);
        self.state
            .revalidate_selection(self.store.annotation_count(&filename));
        if cleared {
            self.state.notice(format!("Cleared {} annotations", count));
        }
        cleared
    }

    /// Re-add the last drawn box with the pressed or filtered category.
    fn repeat_last(&mut self) -> bool {
        let Some(bbox) = self.state.last_drawn_bbox else {
            self.state.notice("No box to repeat");
            return false;
        };
        let Some(category) = self
            .category_filter
            .clone()
            .or_else(|| self.state.last_pressed_category.clone())
        else {
            self.state.notice("Press a category key before repeating");
            return false;
        };
        let Some((filename, path)) = self.current_target() else {
            return false;
        };
        if self.current_record().contains_bbox(&bbox) {
            self.state.notice("Box already present on this frame");
            return false;
        }

        self.commit_box(&filename, &path, bbox, Some(category));
        true
    }

    // =========================================================================
    // Candidates
    // =========================================================================

    /// Stage detector results for the current frame.
    ///
    /// Detections whose label maps to no category, that miss the active
    /// filter, or that overlap a stored box are dropped.
    pub fn run_inference(&mut self) -> usize {
        if self.detector.is_none() {
            self.state.notice("No detector available");
            return 0;
        }
        let (Some(detector), Some(frame)) = (self.detector.as_mut(), self.frame.as_ref()) else {
            return 0;
        };

        let name = detector.name().to_string();
        let detections = match detector.detect(frame, self.confidence_threshold) {
            Ok(detections) => detections,
            Err(e) => {
                log::error!("Detector {} failed on {}: {}", name, frame.filename, e);
                self.state.notice("Detection failed");
                return 0;
            }
        };

        let record = self.current_record();
        let mut staged = Vec::new();
        for detection in detections {
            let Some(category) = self.categories.resolve_detector_label(&detection.label) else {
                log::warn!("Dropping detection with unknown label '{}'", detection.label);
                continue;
            };
            if self
                .category_filter
                .as_ref()
                .is_some_and(|filter| filter.id != category.id)
            {
                continue;
            }
            if record
                .annotations
                .iter()
                .any(|a| a.bbox.is_some_and(|b| b.iou(&detection.bbox) > DUPLICATE_IOU_THRESHOLD))
            {
                log::debug!("Dropping duplicate detection {:?}", detection.bbox);
                continue;
            }
            staged.push(Candidate::inference(
                detection.bbox,
                category,
                detection.confidence,
            ));
        }

        let count = self.stage_candidates(staged);
        if count == 0 {
            self.state.notice("No new detections");
        } else {
            self.state.notice(format!("{} detections to review", count));
        }
        count
    }

    /// Fill the buffer. A non-empty buffer drops the durable selection so
    /// edit keys cannot reach stored boxes during review.
    fn stage_candidates(&mut self, staged: Vec<Candidate>) -> usize {
        let count = staged.len();
        self.candidates.populate(staged);
        if count > 0 {
            self.state.select_annotation(None);
        }
        count
    }

    /// Stage the project's fixed boxes, or discard staged candidates.
    pub fn generate_fixed_boxes(&mut self) -> usize {
        if !self.candidates.is_empty() {
            let dropped = self.candidates.clear();
            self.state.notice(format!("Discarded {} candidates", dropped));
            return 0;
        }
        if self.fixed_boxes.is_empty() {
            self.state.notice("No fixed boxes configured");
            return 0;
        }

        let record = self.current_record();
        let staged = self.fixed_boxes.generate(
            &record.annotations,
            self.category_filter.as_ref(),
            &mut self.rng,
        );
        let count = self.stage_candidates(staged);
        if count == 0 {
            self.state.notice("All fixed boxes already present");
        } else {
            self.state.notice(format!("{} fixed boxes to review", count));
        }
        count
    }

    fn toggle_auto_inference(&mut self) {
        if self.detector.is_none() {
            self.state.notice("No detector available");
            return;
        }
        let enabled = self.state.toggle_auto_inference();
        self.state.notice(format!(
            "Auto-inference {}",
            if enabled { "on" } else { "off" }
        ));
    }

    fn toggle_auto_fixed_box(&mut self) {
        let enabled = self.state.toggle_auto_fixed_box();
        self.candidates.clear();
        if enabled {
            self.generate_fixed_boxes();
        } else {
            self.state.notice("Auto fixed boxes off");
        }
    }

    /// Confirm the selected candidate into the store.
    pub fn confirm_current(&mut self) -> bool {
        let Some((filename, path)) = self.current_target() else {
            return false;
        };
        let Some((candidate, saved)) = self.candidates.confirm_current(&self.store, &filename, &path)
        else {
            return false;
        };

        // Stored boxes stay unselectable by key until review ends
        let selection = if self.candidates.is_empty() {
            self.store.annotation_count(&filename).checked_sub(1)
        } else {
            None
        };
        self.state.select_annotation(selection);
        let name = candidate
            .category
            .as_ref()
            .map_or("unclassified", |c| c.name.as_str());
        if saved {
            self.state.notice(format!(
                "Confirmed {} ({} left)",
                name,
                self.candidates.len()
            ));
            self.state.arm_auto_skip();
        } else {
            self.state.notice(format!("Confirmed {} but could not save", name));
        }
        true
    }

    /// Confirm every staged candidate into the store.
    pub fn confirm_all(&mut self) -> usize {
        let Some((filename, path)) = self.current_target() else {
            return 0;
        };
        let batch = self.candidates.confirm_all(&self.store, &filename, &path);
        if batch.count > 0 {
            let count = self.store.annotation_count(&filename);
            self.state.select_annotation(count.checked_sub(1));
            if batch.saved {
                self.state.notice(format!("Confirmed {} candidates", batch.count));
                self.state.arm_auto_skip();
            } else {
                self.state
                    .notice(format!("Confirmed {} candidates but could not save", batch.count));
            }
        }
        batch.count
    }

    fn set_candidate_category(&mut self, id: &str) {
        let Some(category) = self.categories.get(id) else {
            self.state.notice(format!("Unknown category {}", id));
            return;
        };
        self.state.last_pressed_category = Some(category.clone());
        if self.candidates.update_current_category(category.clone()) {
            self.state.notice(format!("Candidate: {}", category.name));
        }
    }

    // =========================================================================
    // Rendering
    // =========================================================================

    /// Snapshot for the display surface.
    pub fn view(&self) -> FrameView<'_> {
        let drag_preview = match (self.state.drag_start, self.state.mouse_pos) {
            (Some(start), Some(pos)) => Some(BBox::from_corners(start.x, start.y, pos.x, pos.y)),
            _ => None,
        };
        FrameView {
            state: &self.state,
            record: self.current_record(),
            candidates: self.candidates.items(),
            candidate_cursor: self.candidates.cursor(),
            mode: self.input_mode(),
            category_filter: self.category_filter.as_ref(),
            frame: self.frame.as_ref(),
            drag_preview,
            detector_available: self.detector.is_some(),
        }
    }
}
