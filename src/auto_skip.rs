//! Auto-skip timer.
//!
//! After a successful annotation commit the session can advance to the
//! next frame on its own. The advance is delayed so the operator sees the
//! committed box briefly, and it is cancelled by any manual navigation.

use std::time::Duration;
use web_time::Instant;

use crate::constants::AUTO_SKIP_DELAY;

/// Where the session goes when the auto-skip timer fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AutoSkipMode {
    #[default]
    Off,
    /// Advance to the next frame
    Frame,
    /// Jump to the next frame that already has annotations
    Annotation,
}

impl AutoSkipMode {
    /// Off -> Frame -> Annotation -> Off.
    pub fn next(self) -> Self {
        match self {
            Self::Off => Self::Frame,
            Self::Frame => Self::Annotation,
            Self::Annotation => Self::Off,
        }
    }

    pub fn is_enabled(self) -> bool {
        self != Self::Off
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Off => "off",
            Self::Frame => "next frame",
            Self::Annotation => "next annotated frame",
        }
    }
}

/// One-shot timer that fires once its delay has elapsed after arming.
#[derive(Debug)]
pub struct AutoSkipTimer {
    /// Delay between arming and firing.
    delay: Duration,

    /// When the timer was armed.
    armed_at: Option<Instant>,
}

impl AutoSkipTimer {
    /// Create a disarmed timer with the default delay.
    pub fn new() -> Self {
        Self {
            delay: AUTO_SKIP_DELAY,
            armed_at: None,
        }
    }

    /// Set the delay.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Arm (or re-arm) the timer from now.
    pub fn arm(&mut self) {
        self.armed_at = Some(Instant::now());
        log::trace!("Auto-skip: armed");
    }

    /// Disarm without firing.
    pub fn cancel(&mut self) {
        if self.armed_at.take().is_some() {
            log::trace!("Auto-skip: cancelled");
        }
    }

    pub fn is_armed(&self) -> bool {
        self.armed_at.is_some()
    }

    /// Check whether the timer is due at `now`.
    pub fn is_due_at(&self, now: Instant) -> bool {
        self.armed_at
            .is_some_and(|armed| now.saturating_duration_since(armed) >= self.delay)
    }

    /// Disarm and return true if the delay has elapsed.
    pub fn take_if_due(&mut self) -> bool {
        self.take_if_due_at(Instant::now())
    }

    /// Disarm and return true if the timer is due at `now`.
    pub fn take_if_due_at(&mut self, now: Instant) -> bool {
        if self.is_due_at(now) {
            self.armed_at = None;
            true
        } else {
            false
        }
    }
}

impl Default for AutoSkipTimer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_state() {
        let timer = AutoSkipTimer::new();
        assert!(!timer.is_armed());
        assert!(!timer.is_due_at(Instant::now()));
        assert_eq!(timer.delay(), AUTO_SKIP_DELAY);
    }

    #[test]
    fn test_fires_once_after_delay() {
        let mut timer = AutoSkipTimer::new().with_delay(Duration::from_millis(300));
        timer.arm();
        let now = Instant::now();

        assert!(!timer.take_if_due_at(now));
        assert!(timer.take_if_due_at(now + Duration::from_millis(300)));
        assert!(!timer.is_armed());
        assert!(!timer.take_if_due_at(now + Duration::from_secs(1)));
    }

    #[test]
    fn test_cancel_prevents_firing() {
        let mut timer = AutoSkipTimer::new().with_delay(Duration::ZERO);
        timer.arm();
        timer.cancel();
        assert!(!timer.take_if_due());
    }

    #[test]
    fn test_mode_cycle() {
        let mode = AutoSkipMode::Off;
        assert!(!mode.is_enabled());
        assert_eq!(mode.next(), AutoSkipMode::Frame);
        assert_eq!(mode.next().next(), AutoSkipMode::Annotation);
        assert_eq!(mode.next().next().next(), AutoSkipMode::Off);
        assert!(AutoSkipMode::Annotation.is_enabled());
    }
}
