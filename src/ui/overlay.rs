use std::time::{Duration, Instant};

/// Timed text panel that replaces a menu node's normal rendering.
///
/// Expiry is evaluated lazily: an overlay past its deadline deactivates the
/// next time it is queried.
#[derive(Debug, Default)]
pub struct MessageOverlay {
    lines: Vec<String>,
    deadline: Option<Instant>,
    active: bool,
}

impl MessageOverlay {
    pub fn new() -> Self {
        Self::default()
    }

    /// Activates the overlay with `lines` for `timeout` starting at `now`.
    /// Showing an already active overlay replaces its text and deadline.
    pub fn show<I, S>(&mut self, lines: I, timeout: Duration, now: Instant)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.lines = lines.into_iter().map(Into::into).collect();
        self.deadline = Some(now + timeout);
        self.active = true;
    }

    pub fn clear(&mut self) {
        self.active = false;
        self.deadline = None;
    }

    pub fn is_active(&mut self, now: Instant) -> bool {
        if self.active && self.deadline.is_some_and(|deadline| now >= deadline) {
            self.clear();
        }
        self.active
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }
}
