//! Input events and key mapping.
//!
//! Keys map to `Action`s through one of two fixed tables. While candidates
//! are staged for review the session is in `Reviewing` mode, where Tab,
//! Space, `c` and the digit keys act on the candidate buffer instead of the
//! stored annotations. Everything else is shared by both modes.

use crate::constants::jump;
use crate::model::{CategoryTable, Direction, DisplayPoint};

/// A key press, independent of the windowing backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Char(char),
    Tab,
    BackTab,
    Space,
    Enter,
    Esc,
    Left,
    Right,
    Up,
    Down,
    Home,
    End,
    PageUp,
    PageDown,
    Delete,
    Backspace,
}

/// Raw input from the display surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputEvent {
    Key(Key),
    PointerDown(DisplayPoint),
    PointerMove(DisplayPoint),
    PointerUp(DisplayPoint),
}

/// Frame navigation requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Navigation {
    Prev,
    Next,
    Back(usize),
    Forward(usize),
    First,
    Last,
    PrevAnnotated,
    NextAnnotated,
}

/// Operator operations the session understands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Quit,
    RequestQuit,
    ToggleHelp,
    ToggleStats,
    CycleDisplayMode,
    Navigate(Navigation),

    CycleAnnotation(Direction),
    AssignCategory(String),
    AssignSubcategory(String),
    DeleteSelected,
    ClearAll,
    RepeatLast,

    ToggleInference,
    ToggleFixedBoxes,
    ToggleAutoInference,
    ToggleAutoFixedBox,
    CycleAutoSkip,

    CycleCandidate(Direction),
    ConfirmCandidate,
    ConfirmAllCandidates,
    SetCandidateCategory(String),
}

/// Which key table is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InputMode {
    #[default]
    Browsing,
    Reviewing,
}

/// Category id typed with a digit key.
///
/// Every digit maps; ids the project does not define are rejected by the
/// session so the operator gets feedback.
fn category_for_key(key: Key) -> Option<String> {
    match key {
        Key::Char(c) if c.is_ascii_digit() => Some(c.to_string()),
        _ => None,
    }
}

/// Keys with the same meaning in both modes.
fn common_action(key: Key) -> Option<Action> {
    let action = match key {
        Key::Esc => Action::Quit,
        Key::Char('q') => Action::RequestQuit,
        Key::Char('h') => Action::ToggleHelp,
        Key::Char('p') => Action::ToggleStats,
        Key::Char('u') => Action::CycleDisplayMode,

        Key::Char('a') | Key::Left => Action::Navigate(Navigation::Prev),
        Key::Char('d') | Key::Right => Action::Navigate(Navigation::Next),
        Key::Char('w') | Key::Up => Action::Navigate(Navigation::Back(jump::SHORT)),
        Key::Char('s') | Key::Down => Action::Navigate(Navigation::Forward(jump::SHORT)),
        Key::PageUp => Action::Navigate(Navigation::Back(jump::LONG)),
        Key::PageDown => Action::Navigate(Navigation::Forward(jump::LONG)),
        Key::Home => Action::Navigate(Navigation::First),
        Key::End => Action::Navigate(Navigation::Last),
        Key::Char('[') => Action::Navigate(Navigation::PrevAnnotated),
        Key::Char(']') => Action::Navigate(Navigation::NextAnnotated),

        Key::Char('x') => Action::DeleteSelected,
        Key::Delete | Key::Backspace => Action::ClearAll,
        Key::Char('j') => Action::RepeatLast,
        Key::Char('r') => Action::ToggleInference,
        Key::Char('b') => Action::ToggleFixedBoxes,
        Key::Char('t') => Action::ToggleAutoInference,
        Key::Char('k') => Action::ToggleAutoFixedBox,
        Key::Char('l') => Action::CycleAutoSkip,
        _ => return None,
    };
    Some(action)
}

impl InputMode {
    /// Map a key press to an action in this mode.
    pub fn action_for(self, key: Key, categories: &CategoryTable) -> Option<Action> {
        let key = match key {
            Key::Char(c) => Key::Char(c.to_ascii_lowercase()),
            other => other,
        };

        let specific = match self {
            InputMode::Browsing => Self::browsing_action(key, categories),
            InputMode::Reviewing => Self::reviewing_action(key),
        };
        specific.or_else(|| common_action(key))
    }

    fn browsing_action(key: Key, categories: &CategoryTable) -> Option<Action> {
        match key {
            Key::Tab => Some(Action::CycleAnnotation(Direction::Forward)),
            Key::BackTab => Some(Action::CycleAnnotation(Direction::Backward)),
            Key::Char(c) => {
                // Subcategory bindings win over a category on the same digit
                if let Some(sub) = categories.subcategory_for_key(c) {
                    return Some(Action::AssignSubcategory(sub.id.clone()));
                }
                category_for_key(key).map(Action::AssignCategory)
            }
            _ => None,
        }
    }

    fn reviewing_action(key: Key) -> Option<Action> {
        match key {
            Key::Tab => Some(Action::CycleCandidate(Direction::Forward)),
            Key::BackTab => Some(Action::CycleCandidate(Direction::Backward)),
            Key::Space => Some(Action::ConfirmCandidate),
            Key::Char('c') => Some(Action::ConfirmAllCandidates),
            _ => category_for_key(key).map(Action::SetCandidateCategory),
        }
    }
}
