//! LLM provider abstraction.
//!
//! Providers are a closed set ([`ProviderKind`]); client-supplied tags are
//! normalized, with unrecognized tags mapping to the default. Each provider
//! offers a bounded single-shot call and a lazy fragment stream. The canned
//! fallback responder lives alongside as the no-provider escape hatch.

pub mod fallback;
pub mod gemini;
pub mod local;

pub use fallback::fallback_response;
pub use gemini::GeminiProvider;
pub use local::LocalProvider;

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::config::Config;
use crate::error::Result;

/// Source tag for canned responses.
pub const FALLBACK_SOURCE: &str = "fallback";

/// Ordered, finite stream of response fragments.
pub type TokenStream = BoxStream<'static, Result<String>>;

/// Persona instruction sent to every provider.
pub(crate) const SYSTEM_PROMPT: &str = "You are a calm, attentive listener. \
Lead with reflective listening: name the feeling you hear, validate it, and \
show you understood the meaning. Ask gentle, open questions that help the \
other person explore. Offer grounded coping ideas when they fit, such as \
breathing, reframing, journaling, or boundaries. Keep your limits clear: you \
cannot diagnose or replace professional care, and you point to real help in \
an emergency. Tone: warm, steady, concise (2-3 short sentences), \
conversational, first person.";

/// The closed set of responder backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    /// Google Gemini over the v1beta REST API.
    Gemini,
    /// An Ollama-compatible local LLM server.
    Local,
}

impl ProviderKind {
    /// Map a client-supplied tag to a provider. Empty tags defer to
    /// `default_tag`; anything unrecognized maps to Gemini.
    pub fn resolve(tag: &str, default_tag: &str) -> Self {
        let tag = tag.trim();
        let tag = if tag.is_empty() { default_tag } else { tag };
        match tag.trim().to_lowercase().as_str() {
            "local" => ProviderKind::Local,
            _ => ProviderKind::Gemini,
        }
    }

    /// The canonical source tag for this provider.
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Gemini => "gemini",
            ProviderKind::Local => "local",
        }
    }
}

/// Common capability interface for responder backends.
#[async_trait]
pub trait ChatProvider: Send + Sync {
    /// Single-shot completion for the given user text. Bounded in time.
    async fn chat(&self, text: &str) -> Result<String>;

    /// Lazy fragment stream for the given user text; terminates normally
    /// after the final fragment or yields an error item on failure.
    async fn stream_chat(&self, text: &str) -> Result<TokenStream>;

    /// Source tag recorded in metrics and stream events.
    fn name(&self) -> &str;
}

/// Construct the provider for one exchange. A request-supplied API key
/// takes priority over the key loaded from the environment.
pub fn build_provider(
    kind: ProviderKind,
    api_key: Option<&str>,
    config: &Config,
) -> Box<dyn ChatProvider> {
    match kind {
        ProviderKind::Gemini => Box::new(GeminiProvider::new(
            gemini::resolve_key(api_key, config.gemini_api_key.as_deref()),
            &config.gemini_model,
        )),
        ProviderKind::Local => Box::new(LocalProvider::new(
            &config.local_url,
            &config.local_model,
            config.local_num_predict,
            config.local_temperature,
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_known_tags() {
        assert_eq!(ProviderKind::resolve("gemini", "gemini"), ProviderKind::Gemini);
        assert_eq!(ProviderKind::resolve("local", "gemini"), ProviderKind::Local);
    }

    #[test]
    fn test_resolve_is_case_and_whitespace_insensitive() {
        assert_eq!(ProviderKind::resolve("  LOCAL ", "gemini"), ProviderKind::Local);
        assert_eq!(ProviderKind::resolve("Gemini", "local"), ProviderKind::Gemini);
    }

    #[test]
    fn test_resolve_empty_tag_uses_default() {
        assert_eq!(ProviderKind::resolve("", "local"), ProviderKind::Local);
        assert_eq!(ProviderKind::resolve("   ", "gemini"), ProviderKind::Gemini);
    }

    #[test]
    fn test_resolve_unknown_tag_maps_to_gemini() {
        assert_eq!(ProviderKind::resolve("openai", "local"), ProviderKind::Gemini);
        assert_eq!(ProviderKind::resolve("gpt-4", "gemini"), ProviderKind::Gemini);
    }

    #[test]
    fn test_build_provider_names() {
        let config = Config::default();
        let gemini = build_provider(ProviderKind::Gemini, None, &config);
        assert_eq!(gemini.name(), "gemini");
        let local = build_provider(ProviderKind::Local, None, &config);
        assert_eq!(local.name(), "local");
    }
}
