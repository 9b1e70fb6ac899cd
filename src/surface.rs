//! Display surface abstraction.
//!
//! A surface renders `FrameView` snapshots and delivers `InputEvent`s. The
//! session never mutates anything through it. `TerminalSurface` is a
//! line-oriented implementation: a background thread reads commands from
//! stdin and the renderer prints a status line whenever the view changes.

use std::fmt::Write as _;
use std::io::{self, BufRead, Write};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread;
use std::time::Duration;

use thiserror::Error;

use crate::candidates::Candidate;
use crate::frames::Frame;
use crate::input::{InputEvent, InputMode, Key};
use crate::model::{BBox, CategoryRef, DisplayPoint, FileRecord};
use crate::session::{AutoMode, DisplayMode, SessionState};

/// Errors from the display surface.
#[derive(Error, Debug)]
pub enum SurfaceError {
    /// The operator closed the surface
    #[error("display surface closed")]
    Closed,

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Everything a renderer needs for one frame.
#[derive(Debug)]
pub struct FrameView<'a> {
    pub state: &'a SessionState,
    /// Snapshot of the current file's stored annotations
    pub record: FileRecord,
    pub candidates: &'a [Candidate],
    pub candidate_cursor: Option<usize>,
    pub mode: InputMode,
    pub category_filter: Option<&'a CategoryRef>,
    pub frame: Option<&'a Frame>,
    /// In-progress drag rectangle in display coordinates
    pub drag_preview: Option<BBox>,
    pub detector_available: bool,
}

/// Renders frames and produces input.
pub trait Surface {
    /// Draw the current view.
    fn render(&mut self, view: &FrameView<'_>) -> Result<(), SurfaceError>;

    /// Wait up to `timeout` for the next input event.
    ///
    /// `Ok(None)` means no input arrived in time. `Err(SurfaceError::Closed)`
    /// ends the session.
    fn poll_event(&mut self, timeout: Duration) -> Result<Option<InputEvent>, SurfaceError>;
}

/// Key reference shown by the help overlay.
pub const HELP_TEXT: &str = "\
Navigation:  a/d or left/right  prev/next frame
             w/s or up/down     jump 10      pgup/pgdn  jump 100
             home/end           first/last   [ / ]      prev/next annotated
Annotations: drag X1 Y1 X2 Y2   draw box     click X Y  select
             tab / backtab      cycle selection
             0-9                set category (or subcategory key)
             x                  delete selected   del   clear frame
             j                  repeat last box
Candidates:  r                  detector on/off   b     fixed boxes on/off
             tab / space / c    next / confirm / confirm all
Modes:       t auto-inference   k auto-fixed-boxes   l auto-skip   u display
Overlays:    h help   p stats
Quit:        q q  or  esc";

fn named_key(token: &str) -> Option<Key> {
    let key = match token {
        "tab" => Key::Tab,
        "backtab" | "shift-tab" => Key::BackTab,
        "space" => Key::Space,
        "enter" => Key::Enter,
        "esc" | "escape" => Key::Esc,
        "left" => Key::Left,
        "right" => Key::Right,
        "up" => Key::Up,
        "down" => Key::Down,
        "home" => Key::Home,
        "end" => Key::End,
        "pgup" | "pageup" => Key::PageUp,
        "pgdn" | "pagedown" => Key::PageDown,
        "del" | "delete" => Key::Delete,
        "backspace" => Key::Backspace,
        _ => return None,
    };
    Some(key)
}

fn take_point<'a>(tokens: &mut impl Iterator<Item = &'a str>) -> Option<DisplayPoint> {
    let x = tokens.next()?.parse().ok()?;
    let y = tokens.next()?.parse().ok()?;
    Some(DisplayPoint::new(x, y))
}

/// Parse one command line into input events.
///
/// Tokens are separated by whitespace. `click X Y` and
/// `drag X1 Y1 X2 Y2` produce pointer events, key names produce key
/// presses and any other single character is typed as-is.
pub fn parse_line(line: &str) -> Vec<InputEvent> {
    let mut events = Vec::new();
    let mut tokens = line.split_whitespace();

    while let Some(token) = tokens.next() {
        let lower = token.to_lowercase();
        match lower.as_str() {
            "click" => match take_point(&mut tokens) {
                Some(p) => {
                    events.push(InputEvent::PointerDown(p));
                    events.push(InputEvent::PointerUp(p));
                }
                None => log::warn!("click needs X Y"),
            },
            "drag" => match (take_point(&mut tokens), take_point(&mut tokens)) {
                (Some(from), Some(to)) => {
                    events.push(InputEvent::PointerDown(from));
                    events.push(InputEvent::PointerMove(to));
                    events.push(InputEvent::PointerUp(to));
                }
                _ => log::warn!("drag needs X1 Y1 X2 Y2"),
            },
            name => {
                if let Some(key) = named_key(name) {
                    events.push(InputEvent::Key(key));
                } else {
                    let mut chars = token.chars();
                    match (chars.next(), chars.next()) {
                        (Some(c), None) => events.push(InputEvent::Key(Key::Char(c))),
                        _ => log::warn!("Unknown input '{}'", token),
                    }
                }
            }
        }
    }
    events
}

/// Line-oriented surface on stdin/stdout.
pub struct TerminalSurface {
    events: Receiver<InputEvent>,
    out: Box<dyn Write + Send>,
    last_rendered: String,
}

impl TerminalSurface {
    /// Create a surface over an event channel and an output stream.
    pub fn new(events: Receiver<InputEvent>, out: Box<dyn Write + Send>) -> Self {
        Self {
            events,
            out,
            last_rendered: String::new(),
        }
    }

    /// Spawn the stdin reader thread and render to stdout.
    pub fn spawn_stdio() -> Result<Self, SurfaceError> {
        let (tx, rx) = mpsc::channel::<InputEvent>();

        thread::Builder::new()
            .name("stdin-input".to_string())
            .spawn(move || {
                log::debug!("Input thread started");
                for line in io::stdin().lock().lines() {
                    let Ok(line) = line else {
                        break;
                    };
                    for event in parse_line(&line) {
                        if tx.send(event).is_err() {
                            log::debug!("Event channel closed, input thread exiting");
                            return;
                        }
                    }
                }
                log::debug!("Stdin closed, input thread exiting");
            })?;

        Ok(Self::new(rx, Box::new(io::stdout())))
    }

    fn describe(view: &FrameView<'_>) -> String {
        let state = view.state;
        let mut text = String::new();

        let name = state.current_filename.as_deref().unwrap_or("<no frame>");
        let _ = write!(
            text,
            "[{}/{}] {}",
            state.current_index + 1,
            state.total_files,
            name
        );

        if state.display_mode != DisplayMode::BoxesOnly {
            let _ = write!(text, " | {} boxes", view.record.annotations.len());
            if let Some(i) = state.selected_annotation {
                if let Some(ann) = view.record.annotations.get(i) {
                    let cat = ann.category_name.as_deref().unwrap_or("unclassified");
                    let _ = write!(text, " | selected #{} ", i + 1);
                    match ann.bbox {
                        Some(bbox) => {
                            let _ = write!(text, "{:?}", <[i32; 4]>::from(bbox));
                        }
                        None => text.push_str("<no box>"),
                    }
                    let _ = write!(text, " {}", cat);
                }
            }
            if view.mode == InputMode::Reviewing {
                let _ = write!(text, " | reviewing {} candidates", view.candidates.len());
                if let Some(c) = view.candidate_cursor.and_then(|i| view.candidates.get(i)) {
                    let cat = c.category.as_ref().map_or("unclassified", |c| c.name.as_str());
                    let _ = write!(text, " (current {} {:.2})", cat, c.confidence);
                }
            }
        }

        if state.display_mode == DisplayMode::Full {
            let auto = match state.auto_mode {
                AutoMode::Off => "manual",
                AutoMode::Inference => "auto-inference",
                AutoMode::FixedBox => "auto-fixed",
            };
            let _ = write!(text, " | {} | skip: {}", auto, state.auto_skip.label());
            if !view.detector_available {
                text.push_str(" | no detector");
            }
            if let Some(drag) = view.drag_preview {
                let _ = write!(text, " | drawing {:?}", <[i32; 4]>::from(drag));
            }
            if let Some(filter) = view.category_filter {
                let _ = write!(text, " | filter: {}", filter.name);
            }
            if let Some(msg) = &state.message {
                let _ = write!(text, " | {}", msg);
            }
            if state.quit_confirm {
                text.push_str(" | press q again to quit");
            }
        }

        if state.show_help {
            text.push('\n');
            text.push_str(HELP_TEXT);
        }
        if state.show_stats {
            if let Some(stats) = &state.stats_data {
                text.push('\n');
                let _ = write!(text, "{}", stats);
            }
        }
        text
    }
}

impl Surface for TerminalSurface {
    fn render(&mut self, view: &FrameView<'_>) -> Result<(), SurfaceError> {
        let text = Self::describe(view);
        if text != self.last_rendered {
            writeln!(self.out, "{}", text)?;
            self.out.flush()?;
            self.last_rendered = text;
        }
        Ok(())
    }

    fn poll_event(&mut self, timeout: Duration) -> Result<Option<InputEvent>, SurfaceError> {
        match self.events.recv_timeout(timeout) {
            Ok(event) => Ok(Some(event)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(SurfaceError::Closed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct SharedBuf(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_parse_line() {
        assert_eq!(
            parse_line("drag 10 20 110 220"),
            vec![
                InputEvent::PointerDown(DisplayPoint::new(10, 20)),
                InputEvent::PointerMove(DisplayPoint::new(110, 220)),
                InputEvent::PointerUp(DisplayPoint::new(110, 220)),
            ]
        );
        assert_eq!(
            parse_line("d D tab 3 PgDn"),
            vec![
                InputEvent::Key(Key::Char('d')),
                InputEvent::Key(Key::Char('D')),
                InputEvent::Key(Key::Tab),
                InputEvent::Key(Key::Char('3')),
                InputEvent::Key(Key::PageDown),
            ]
        );
        assert!(parse_line("click 5").is_empty());
        assert!(parse_line("bogus").is_empty());
    }

    #[test]
    fn test_poll_reports_close() {
        let (tx, rx) = mpsc::channel();
        let mut surface = TerminalSurface::new(rx, Box::new(SharedBuf::default()));

        tx.send(InputEvent::Key(Key::Esc)).unwrap();
        assert_eq!(
            surface.poll_event(Duration::from_millis(10)).unwrap(),
            Some(InputEvent::Key(Key::Esc))
        );
        assert_eq!(surface.poll_event(Duration::from_millis(10)).unwrap(), None);

        drop(tx);
        assert!(matches!(
            surface.poll_event(Duration::from_millis(10)),
            Err(SurfaceError::Closed)
        ));
    }

    #[test]
    fn test_render_prints_only_changes() {
        let (_tx, rx) = mpsc::channel();
        let buf = SharedBuf::default();
        let mut surface = TerminalSurface::new(rx, Box::new(buf.clone()));

        let mut state = SessionState::new();
        state.current_filename = Some("1.jpg".into());
        state.total_files = 3;

        let view = FrameView {
            state: &state,
            record: FileRecord::default(),
            candidates: &[],
            candidate_cursor: None,
            mode: InputMode::Browsing,
            category_filter: None,
            frame: None,
            drag_preview: None,
            detector_available: false,
        };
        surface.render(&view).unwrap();
        surface.render(&view).unwrap();

        let output = String::from_utf8(buf.0.lock().unwrap().clone()).unwrap();
        assert_eq!(output.lines().count(), 1);
        assert!(output.starts_with("[1/3] 1.jpg | 0 boxes"));
    }
}
