use super::events::PendingMove;

/// Counts poll cycles and periodically releases moved-away entries nobody claimed.
///
/// Entries handed to [`defer`](Self::defer) are returned by the [`tick`](Self::tick)
/// that closes the current window, so none of them waits longer than one window.
#[derive(Debug)]
pub struct ReconciliationTimer {
    window: u32,
    ticks: u32,
    unclaimed: Vec<PendingMove>,
}

impl ReconciliationTimer {
    /// `window` is the number of poll cycles per flush; zero is treated as one.
    pub fn new(window: u32) -> Self {
        Self {
            window: window.max(1),
            ticks: 0,
            unclaimed: Vec::new(),
        }
    }

    pub fn defer<I: IntoIterator<Item = PendingMove>>(&mut self, moves: I) {
        self.unclaimed.extend(moves);
    }

    /// Advances one poll cycle. At the end of a window, hands back everything
    /// deferred so far (possibly nothing) and starts a new window.
    pub fn tick(&mut self) -> Option<Vec<PendingMove>> {
        self.ticks += 1;
        if self.ticks < self.window {
            return None;
        }
        self.ticks = 0;
        Some(std::mem::take(&mut self.unclaimed))
    }

    pub fn unclaimed(&self) -> &[PendingMove] {
        &self.unclaimed
    }
}
