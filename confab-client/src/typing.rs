use tokio::time::{Duration, Instant};

/// How long the input can sit idle before typing ends
pub const TYPING_IDLE: Duration = Duration::from_secs(2);

/// Tracks the idle window behind the typing indicator.
///
/// The first keystroke starts the typing state, every further one pushes the
/// idle deadline out, and submitting ends it immediately. The caller decides
/// what "now" is, which keeps this testable without a clock.
pub struct TypingTracker {
    idle: Duration,
    deadline: Option<Instant>,
}

impl TypingTracker {
    pub fn new() -> Self {
        Self::with_idle(TYPING_IDLE)
    }

    pub fn with_idle(idle: Duration) -> Self {
        Self {
            idle,
            deadline: None,
        }
    }

    /// Called on every keystroke. True when typing just started, which is
    /// when typing=true should be emitted.
    pub fn keystroke(&mut self, now: Instant) -> bool {
        let started = self.deadline.is_none();
        self.deadline = Some(now + self.idle);

        started
    }

    /// The instant at which typing=false is due, while the user is typing
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Called when the deadline comes up. True when the idle window really
    /// elapsed and typing=false should be emitted.
    pub fn idle_elapsed(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(deadline) if now >= deadline => {
                self.deadline = None;
                true
            }
            _ => false,
        }
    }

    /// Submitting a message ends the typing state on the spot. True when
    /// typing=false should be emitted.
    pub fn submit(&mut self) -> bool {
        self.deadline.take().is_some()
    }
}

impl Default for TypingTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn only_the_first_keystroke_starts_typing() {
        let mut tracker = TypingTracker::new();
        let now = Instant::now();

        assert!(tracker.keystroke(now));
        assert!(!tracker.keystroke(now + Duration::from_millis(100)));
        assert!(!tracker.keystroke(now + Duration::from_millis(200)));
    }

    #[test]
    fn keystrokes_push_the_deadline_out() {
        let mut tracker = TypingTracker::new();
        let now = Instant::now();

        tracker.keystroke(now);
        let first = tracker.deadline().unwrap();

        tracker.keystroke(now + Duration::from_secs(1));
        let second = tracker.deadline().unwrap();

        assert!(second > first);

        // The old deadline passing means nothing anymore
        assert!(!tracker.idle_elapsed(first));
        assert!(tracker.idle_elapsed(second));
        assert!(tracker.deadline().is_none());
    }

    #[test]
    fn the_idle_window_is_two_seconds() {
        let mut tracker = TypingTracker::new();
        let now = Instant::now();

        tracker.keystroke(now);

        assert!(!tracker.idle_elapsed(now + Duration::from_millis(1999)));
        assert!(tracker.idle_elapsed(now + Duration::from_secs(2)));
    }

    #[test]
    fn submitting_ends_typing_immediately() {
        let mut tracker = TypingTracker::new();

        // Nothing to end before any keystroke
        assert!(!tracker.submit());

        tracker.keystroke(Instant::now());
        assert!(tracker.submit());
        assert!(tracker.deadline().is_none());

        // And not twice
        assert!(!tracker.submit());
    }
}
