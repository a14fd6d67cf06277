//! Process-wide bounded stores shared by all exchanges.
//!
//! Each store guards its entire state behind a single internal lock, so
//! callers need no external synchronization.

pub mod cache;
pub mod conversation;
pub mod metrics;
pub mod rate_limit;

pub use cache::ResponseCache;
pub use conversation::{ConversationStore, Role, TurnView};
pub use metrics::{MetricsSnapshot, MetricsTracker};
pub use rate_limit::RateLimiter;
