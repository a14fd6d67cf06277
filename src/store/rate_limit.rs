//! Sliding-window admission control per client identity.
//!
//! One timestamp window per client, trimmed lazily on each check. Windows
//! are never proactively garbage-collected, so a long-lived process serving
//! many distinct clients retains one (empty) window per identity seen —
//! an accepted memory tradeoff at this scale.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Length of the trailing admission window.
const WINDOW: Duration = Duration::from_secs(60);

/// In-memory per-client request rate limiter.
pub struct RateLimiter {
    calls_per_minute: usize,
    windows: Mutex<HashMap<String, VecDeque<Duration>>>,
}

impl RateLimiter {
    /// Create a limiter admitting `calls_per_minute` requests per client
    /// within any trailing 60-second window.
    pub fn new(calls_per_minute: usize) -> Self {
        Self {
            calls_per_minute,
            windows: Mutex::new(HashMap::new()),
        }
    }

    /// Admit or reject a request from `client_id`.
    ///
    /// Drops window entries older than 60 seconds, then admits (recording
    /// the current instant) iff the remaining count is below the limit.
    /// Rejected calls record nothing.
    pub fn allow(&self, client_id: &str) -> bool {
        let now = now_since_epoch();
        let mut windows = self.windows.lock().expect("rate limiter lock poisoned");
        let window = windows.entry(client_id.to_string()).or_default();

        while window
            .front()
            .is_some_and(|&t| now.saturating_sub(t) > WINDOW)
        {
            window.pop_front();
        }

        if window.len() < self.calls_per_minute {
            window.push_back(now);
            true
        } else {
            false
        }
    }
}

fn now_since_epoch() -> Duration {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
}
