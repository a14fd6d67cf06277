//! confide — streaming conversational gateway.
//!
//! Delivers LLM responses over a REST + WebSocket surface, streaming tokens
//! in producer order while enforcing per-client rate limits, bounding
//! conversation history, caching recent responses, and tracking usage
//! metrics. Provider failures never reach a client: every exchange falls
//! back to a canned responder and still terminates cleanly.

pub mod api;
pub mod bridge;
pub mod config;
pub mod error;
pub mod providers;
pub mod store;

pub use config::Config;
pub use error::{ConfideError, Result};
