use std::time::{Duration, Instant};

/// Minimum spacing between two accepted radio triggers.
pub const DEBOUNCE_WINDOW: Duration = Duration::from_millis(400);

/// Collapses advertisement bursts into a single trigger.
///
/// The window is shared by every command kind: a `Prev` followed by a
/// `Next` inside the window is suppressed as well.
#[derive(Debug, Default)]
pub struct CommandDebouncer {
    last_accepted: Option<Instant>,
}

impl CommandDebouncer {
    /// Returns true when the trigger should be dispatched. Only accepted
    /// triggers move the window.
    pub fn accept(&mut self, now: Instant, has_opcode: bool) -> bool {
        if !has_opcode {
            return false;
        }
        if let Some(last) = self.last_accepted {
            if now.saturating_duration_since(last) < DEBOUNCE_WINDOW {
                return false;
            }
        }
        self.last_accepted = Some(now);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_burst_collapses_to_one() {
        let mut debouncer = CommandDebouncer::default();
        let t0 = Instant::now();
        assert!(debouncer.accept(t0, true));
        assert!(!debouncer.accept(t0 + Duration::from_millis(100), true));
        assert!(!debouncer.accept(t0 + Duration::from_millis(399), true));
    }

    #[test]
    fn test_window_boundary_is_inclusive() {
        let mut debouncer = CommandDebouncer::default();
        let t0 = Instant::now();
        assert!(debouncer.accept(t0, true));
        assert!(debouncer.accept(t0 + DEBOUNCE_WINDOW, true));
    }

    #[test]
    fn test_rejected_trigger_does_not_extend_window() {
        let mut debouncer = CommandDebouncer::default();
        let t0 = Instant::now();
        assert!(debouncer.accept(t0, true));
        assert!(!debouncer.accept(t0 + Duration::from_millis(300), true));
        assert!(debouncer.accept(t0 + Duration::from_millis(450), true));
    }

    #[test]
    fn test_missing_opcode_never_accepted() {
        let mut debouncer = CommandDebouncer::default();
        let t0 = Instant::now();
        assert!(!debouncer.accept(t0, false));
        // no state change: a real trigger right after is still accepted
        assert!(debouncer.accept(t0 + Duration::from_millis(1), true));
        assert!(!debouncer.accept(t0 + Duration::from_millis(2000), false));
        assert!(debouncer.accept(t0 + Duration::from_millis(401), true));
    }
}
