//! Process configuration.
//!
//! Built once in `main` from the environment (after `dotenvy` has loaded any
//! `.env` file) and shared via `Arc`. Defaults match the store capacities
//! and TTLs the gateway ships with; every knob can be overridden.

use std::str::FromStr;

use tracing::warn;

/// Runtime configuration for the gateway and its stores.
#[derive(Debug, Clone)]
pub struct Config {
    /// Bind address for the HTTP server.
    pub bind: String,
    /// Port for the HTTP server.
    pub port: u16,

    /// Sliding-window admissions per client per minute.
    pub calls_per_minute: usize,

    /// Maximum number of cached responses.
    pub cache_max_size: usize,
    /// Cached response lifetime in seconds.
    pub cache_ttl_seconds: u64,

    /// Maximum retained turns per session.
    pub session_max_messages: usize,
    /// Session idle lifetime in seconds, measured from the last turn.
    pub session_ttl_seconds: u64,

    /// Provider tag used when a request names none.
    pub default_provider: String,

    /// Gemini API key loaded from `GEMINI_API_KEY` / `GOOGLE_API_KEY`.
    /// A per-request key takes priority over this one.
    pub gemini_api_key: Option<String>,
    /// Gemini model name.
    pub gemini_model: String,

    /// Base URL of the Ollama-compatible local LLM server.
    pub local_url: String,
    /// Local model name.
    pub local_model: String,
    /// `num_predict` option forwarded to the local server.
    pub local_num_predict: u32,
    /// Sampling temperature forwarded to the local server.
    pub local_temperature: f64,

    /// When true, a client disconnect mid-stream also stops the producer
    /// task; when false the producer runs to completion and its output is
    /// discarded.
    pub cancel_on_disconnect: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".to_string(),
            port: 8000,
            calls_per_minute: 10,
            cache_max_size: 100,
            cache_ttl_seconds: 300,
            session_max_messages: 50,
            session_ttl_seconds: 3600,
            default_provider: "gemini".to_string(),
            gemini_api_key: None,
            gemini_model: "gemini-2.0-flash".to_string(),
            local_url: "http://localhost:11434".to_string(),
            local_model: "llama3.1:8b-instruct-q4_0".to_string(),
            local_num_predict: 256,
            local_temperature: 0.6,
            cancel_on_disconnect: false,
        }
    }
}

impl Config {
    /// Build a configuration from the process environment.
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            bind: env_var("CONFIDE_BIND").unwrap_or(d.bind),
            port: env_parse("CONFIDE_PORT").unwrap_or(d.port),
            calls_per_minute: env_parse("RATE_LIMIT_CALLS_PER_MINUTE").unwrap_or(d.calls_per_minute),
            cache_max_size: env_parse("CACHE_MAX_SIZE").unwrap_or(d.cache_max_size),
            cache_ttl_seconds: env_parse("CACHE_TTL_SECONDS").unwrap_or(d.cache_ttl_seconds),
            session_max_messages: env_parse("SESSION_MAX_MESSAGES").unwrap_or(d.session_max_messages),
            session_ttl_seconds: env_parse("SESSION_TTL_SECONDS").unwrap_or(d.session_ttl_seconds),
            default_provider: env_var("DEFAULT_LLM_PROVIDER").unwrap_or(d.default_provider),
            gemini_api_key: env_var("GEMINI_API_KEY").or_else(|| env_var("GOOGLE_API_KEY")),
            gemini_model: env_var("GEMINI_MODEL").unwrap_or(d.gemini_model),
            local_url: env_var("LOCAL_LLM_URL")
                .map(|u| u.trim_end_matches('/').to_string())
                .unwrap_or(d.local_url),
            local_model: env_var("LOCAL_LLM_MODEL").unwrap_or(d.local_model),
            local_num_predict: env_parse("LOCAL_NUM_PREDICT").unwrap_or(d.local_num_predict),
            local_temperature: env_parse("LOCAL_TEMPERATURE").unwrap_or(d.local_temperature),
            cancel_on_disconnect: env_parse("CONFIDE_CANCEL_ON_DISCONNECT")
                .unwrap_or(d.cancel_on_disconnect),
        }
    }
}

/// Read a non-empty environment variable.
fn env_var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

/// Read and parse an environment variable. Unparseable values are logged
/// and treated as absent rather than aborting startup.
fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    let raw = env_var(key)?;
    match raw.parse() {
        Ok(v) => Some(v),
        Err(_) => {
            warn!(key, value = %raw, "ignoring unparseable environment variable");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_store_limits() {
        let cfg = Config::default();
        assert_eq!(cfg.calls_per_minute, 10);
        assert_eq!(cfg.cache_max_size, 100);
        assert_eq!(cfg.cache_ttl_seconds, 300);
        assert_eq!(cfg.session_max_messages, 50);
        assert_eq!(cfg.session_ttl_seconds, 3600);
        assert_eq!(cfg.default_provider, "gemini");
        assert!(!cfg.cancel_on_disconnect);
    }

    #[test]
    fn test_default_endpoints() {
        let cfg = Config::default();
        assert_eq!(cfg.bind, "127.0.0.1");
        assert_eq!(cfg.port, 8000);
        assert_eq!(cfg.local_url, "http://localhost:11434");
        assert_eq!(cfg.gemini_model, "gemini-2.0-flash");
    }
}
