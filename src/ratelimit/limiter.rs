//! Fixed-window token limiter.

use dashmap::DashMap;
use std::time::{Duration, Instant};
use tracing::trace;

use super::window::{Decision, WindowEntry};

/// Counts admissions per token inside fixed windows.
///
/// Every call to [`TokenLimiter::allow`] both observes and mutates the
/// stored window, so there is no side-effect-free way to read a count.
/// The map is sharded; the entry guard keeps the shard locked for the whole
/// reset/compare/increment sequence, so checks on the same token are atomic
/// while unrelated tokens only contend when they share a shard.
///
/// Entries are never removed. A lapsed window is reopened in place the next
/// time its token is seen, so memory grows with the number of distinct
/// tokens for the lifetime of the process.
pub struct TokenLimiter {
    /// Window state indexed by token
    windows: DashMap<String, WindowEntry>,
    /// Admissions allowed per window
    max: u64,
    /// Length of each window
    window: Duration,
}

impl TokenLimiter {
    /// Create a limiter admitting `max` requests per token per `window`.
    ///
    /// Callers guarantee `max >= 1` and a non-zero window; configuration
    /// validation rejects anything else before a limiter is built.
    pub fn new(max: u64, window: Duration) -> Self {
        debug_assert!(max >= 1, "limiter max must be at least 1");
        debug_assert!(!window.is_zero(), "limiter window must be positive");

        Self {
            windows: DashMap::new(),
            max,
            window,
        }
    }

    /// Check and count one request for `token` against the current time.
    pub fn allow(&self, token: &str) -> Decision {
        self.allow_at(token, Instant::now())
    }

    /// Check and count one request for `token` as if the clock read `now`.
    pub fn allow_at(&self, token: &str, now: Instant) -> Decision {
        let mut entry = self
            .windows
            .entry(token.to_owned())
            .or_insert_with(|| WindowEntry::open(now, self.window));

        if entry.is_lapsed(now) {
            trace!(token = %token, "Window lapsed, starting a new one");
            *entry = WindowEntry::open(now, self.window);
        }

        entry.try_admit(self.max)
    }

    /// Get the admissions allowed per window.
    pub fn max(&self) -> u64 {
        self.max
    }

    /// Get the window length.
    pub fn window(&self) -> Duration {
        self.window
    }

    /// Get the number of tokens that have ever been seen.
    pub fn tracked_tokens(&self) -> usize {
        self.windows.len()
    }
}
