//! Canned template responder.
//!
//! Used whenever a provider is unavailable or fails mid-exchange. Picks a
//! response pool by input shape (greeting, short acknowledgment, general)
//! and a random member within the pool.

use rand::seq::IndexedRandom;

/// General empathetic responses for substantive input.
const GENERAL_RESPONSES: &[&str] = &[
    "I hear you, and I appreciate you sharing that with me. It sounds like you're carrying something important. Would you like to tell me more about how that feels?",
    "Thank you for opening up. What you're describing sounds meaningful. Can you help me understand a bit more about what's on your mind?",
    "I'm here to listen. It takes courage to put that into words. What feels most important to explore right now?",
    "That sounds like it weighs on you. Your feelings are valid. What would feel most helpful to talk through?",
    "I appreciate you trusting me with this. Sometimes saying things out loud helps us see them more clearly. What else is coming up for you?",
    "It sounds like there's a lot going on for you. Take your time, I'm listening without judgment. What feels most pressing?",
];

/// Responses for inputs that read as greetings.
const GREETING_RESPONSES: &[&str] = &[
    "Hello! I'm glad you're here. I'm here to listen and support you. What's on your mind today?",
    "Hi there! Thank you for reaching out. This is a space to share whatever you'd like. How are you feeling?",
    "Welcome! I'm here to listen. Whatever you're carrying, you don't have to hold it alone. What would you like to talk about?",
];

/// Responses for very short acknowledgments.
const ACKNOWLEDGMENT_RESPONSES: &[&str] = &[
    "I understand. Please, continue whenever you're ready.",
    "I see. Take your time, there's no rush here.",
    "Okay, I'm following you. What comes to mind next?",
];

const GREETING_WORDS: &[&str] = &[
    "hello",
    "hi",
    "hey",
    "good morning",
    "good afternoon",
    "good evening",
];

/// Inputs of at most this many words get an acknowledgment response.
const ACKNOWLEDGMENT_MAX_WORDS: usize = 3;

/// Pick a canned empathetic response for the given input.
pub fn fallback_response(text: &str) -> String {
    let lower = text.to_lowercase();
    let lower = lower.trim();

    let pool = if GREETING_WORDS.iter().any(|g| lower.contains(g)) {
        GREETING_RESPONSES
    } else if text.split_whitespace().count() <= ACKNOWLEDGMENT_MAX_WORDS {
        ACKNOWLEDGMENT_RESPONSES
    } else {
        GENERAL_RESPONSES
    };

    pool.choose(&mut rand::rng())
        .map(|s| s.to_string())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_greeting_picks_greeting_pool() {
        for input in ["hello", "Hey there", "good morning everyone"] {
            let response = fallback_response(input);
            assert!(
                GREETING_RESPONSES.contains(&response.as_str()),
                "{input:?} should draw from the greeting pool"
            );
        }
    }

    #[test]
    fn test_short_input_picks_acknowledgment_pool() {
        let response = fallback_response("ok I guess");
        assert!(ACKNOWLEDGMENT_RESPONSES.contains(&response.as_str()));
    }

    #[test]
    fn test_long_input_picks_general_pool() {
        let response = fallback_response("I have been feeling overwhelmed at work lately");
        assert!(GENERAL_RESPONSES.contains(&response.as_str()));
    }

    #[test]
    fn test_greeting_beats_word_count() {
        // Two words, but it's a greeting.
        let response = fallback_response("hi there");
        assert!(GREETING_RESPONSES.contains(&response.as_str()));
    }

    #[test]
    fn test_response_is_never_empty() {
        for input in ["", "x", "a much longer piece of user input than usual"] {
            assert!(!fallback_response(input).is_empty());
        }
    }
}
