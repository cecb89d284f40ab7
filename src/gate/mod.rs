//! Request gating: token extraction, admission and the HTTP surface.

mod server;
mod service;
mod token;

pub use server::{router, serve_on, GateServer};
pub use service::{Gate, INVALID_LINK_MESSAGE, LIMIT_EXCEEDED_MESSAGE};
pub use token::extract_token;
