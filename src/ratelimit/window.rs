//! Per-token counting window.

use std::time::{Duration, Instant};

/// Outcome of a single admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    /// Whether the request may proceed
    pub admitted: bool,
    /// Count stored for the token after this check
    pub count: u64,
}

/// A fixed counting window for one token.
///
/// The entry is active while `now < reset_at`. Once the reset instant is
/// reached it is logically expired, whatever count it still holds, and must
/// be reopened before it is used again.
#[derive(Debug, Clone)]
pub struct WindowEntry {
    /// Admissions counted in the current window
    count: u64,
    /// When the current window ends; `None` if that instant is not representable
    reset_at: Option<Instant>,
}

impl WindowEntry {
    /// Open a fresh window starting at `now`.
    pub fn open(now: Instant, window: Duration) -> Self {
        Self {
            count: 0,
            reset_at: now.checked_add(window),
        }
    }

    /// Whether the window has lapsed at `now`. The reset instant itself
    /// already belongs to the next window.
    pub fn is_lapsed(&self, now: Instant) -> bool {
        match self.reset_at {
            Some(reset_at) => now >= reset_at,
            None => false,
        }
    }

    /// Count one admission unless the window is already full.
    ///
    /// A denied call leaves the count untouched.
    pub fn try_admit(&mut self, max: u64) -> Decision {
        if self.count >= max {
            return Decision {
                admitted: false,
                count: self.count,
            };
        }

        self.count += 1;
        Decision {
            admitted: true,
            count: self.count,
        }
    }

    /// Get the current count.
    pub fn count(&self) -> u64 {
        self.count
    }
}
