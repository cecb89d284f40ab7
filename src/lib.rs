//! Subgate - Subscription Update Gate
//!
//! This crate puts a per-token, fixed-window update quota in front of a
//! subscription backend. Each short link carries a token as the first path
//! segment after a configured prefix; requests are admitted until the token
//! has used its quota for the current window, and admitted requests are
//! forwarded to the upstream unmodified.

pub mod config;
pub mod error;
pub mod gate;
pub mod proxy;
pub mod ratelimit;
