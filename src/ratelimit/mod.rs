//! Fixed-window admission counting keyed by subscription token.

mod limiter;
mod window;

pub use limiter::TokenLimiter;
pub use window::{Decision, WindowEntry};
