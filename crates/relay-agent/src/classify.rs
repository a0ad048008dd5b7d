//! Failure classification for the session's retry policy
//!
//! Backends report token-limit failures in many different phrasings, so
//! detection is pattern based: a built-in set covering common providers plus
//! whatever extra patterns the deployment configures.

use std::sync::LazyLock;

use regex::Regex;

use crate::error::Error;

/// Compiled regex patterns for detecting token-limit errors across providers.
/// Covers: Anthropic, Bedrock, OpenAI, Google, xAI, Groq, OpenRouter,
/// llama.cpp, LM Studio, MiniMax.
static TOKEN_LIMIT_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        // Generic / multi-provider patterns
        r"(?i)context.?length.?exceed",
        r"(?i)maximum.?context.?length",
        r"(?i)context.?window.?(exceed|full|limit)",
        r"(?i)too.?many.?tokens",
        r"(?i)prompt.?is.?too.?long",
        r"(?i)input.?too.?long",
        r"(?i)token.?limit.?(exceed|reach)",
        r"(?i)content.?too.?large",
        // Anthropic / Bedrock
        r"(?i)prompt.?too.?long",
        r"(?i)request.?too.?large",
        r"(?i)messages?.?too.?long",
        // OpenAI
        r"(?i)maximum.?number.?of.?tokens",
        r"(?i)reduce.?the.?length",
        r"(?i)context_length_exceeded",
        // "max_tokens" only when followed by overflow language (not config errors)
        r"(?i)max_tokens.*(exceed|limit|too|overflow)",
        // Google (Gemini)
        r"(?i)exceeds?.+token.?limit",
        r"(?i)input.?token.?limit",
        // xAI / Groq / OpenRouter
        r"(?i)context.?overflow",
        r"(?i)sequence.?too.?long",
        // llama.cpp / LM Studio
        r"(?i)context.?size.?exceed",
        r"(?i)n_ctx",
        r"(?i)slot.?context.?overflow",
        // MiniMax
        r"(?i)total.?tokens?.?exceed",
        r"(?i)max_prompt_tokens",
        // HTTP status-based (embedded in error strings)
        r"\b413\b",
    ]
    .iter()
    .filter_map(|p| Regex::new(p).ok())
    .collect()
});

/// HTTP 400 status in an error string ("400 Bad Request", "HTTP 400", "status: 400").
/// Requires a word boundary so port numbers and IDs containing "400" don't match.
static HTTP_400_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:status|http|error)[:\s]*400\b|\b400\s+bad\s+request").unwrap()
});

/// Why a query failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// The request exceeded the model's context window; compact and retry
    TokenLimit,
    RateLimited,
    Auth,
    Timeout,
    /// The tool set could not be built
    ToolInit,
    Cancelled,
    Other,
}

impl FailureKind {
    /// Whether the session compacts and retries on this failure
    pub fn is_retryable(self) -> bool {
        self == FailureKind::TokenLimit
    }

    /// Message shown to the user for a failure of this kind
    pub fn describe(self, error: &Error) -> String {
        match self {
            FailureKind::TokenLimit => format!(
                "The conversation is too long for the model, even after compacting it: {}",
                error
            ),
            FailureKind::RateLimited => format!("The model backend is rate limiting requests: {}", error),
            FailureKind::Auth => format!("Authentication with the model backend failed: {}", error),
            FailureKind::Timeout => format!("The model backend timed out: {}", error),
            FailureKind::Cancelled => "Query cancelled".to_string(),
            FailureKind::ToolInit | FailureKind::Other => error.to_string(),
        }
    }
}

/// Decides what kind of failure an error represents
#[derive(Debug, Clone, Default)]
pub struct FailureClassifier {
    extra_patterns: Vec<Regex>,
}

impl FailureClassifier {
    /// Classifier using only the built-in token-limit patterns
    pub fn new() -> Self {
        Self::default()
    }

    /// Classifier with additional token-limit patterns.
    ///
    /// Patterns that fail to compile are logged and skipped.
    pub fn with_patterns(patterns: &[String]) -> Self {
        let extra_patterns = patterns
            .iter()
            .filter_map(|p| match Regex::new(p) {
                Ok(re) => Some(re),
                Err(e) => {
                    tracing::warn!(pattern = %p, error = %e, "ignoring invalid token-limit pattern");
                    None
                }
            })
            .collect();
        Self { extra_patterns }
    }

    /// Check if an error message indicates the context window was exceeded
    pub fn is_token_limit(&self, message: &str) -> bool {
        // HTTP 400 with token-related keywords; requires a structured 400 reference
        if HTTP_400_PATTERN.is_match(message) {
            let lower = message.to_lowercase();
            if lower.contains("token") || lower.contains("context") || lower.contains("length") {
                return true;
            }
        }

        TOKEN_LIMIT_PATTERNS
            .iter()
            .chain(&self.extra_patterns)
            .any(|re| re.is_match(message))
    }

    /// Classify a failed query
    pub fn classify(&self, error: &Error) -> FailureKind {
        let message = error.to_string();

        let kind = match error {
            Error::ToolInit(_) => FailureKind::ToolInit,
            Error::Ai(relay_ai::Error::Aborted) => FailureKind::Cancelled,
            Error::Ai(e) if e.is_context_overflow() => FailureKind::TokenLimit,
            _ if self.is_token_limit(&message) => FailureKind::TokenLimit,
            Error::Ai(e) if e.is_rate_limited() => FailureKind::RateLimited,
            Error::Ai(e) if e.is_auth() => FailureKind::Auth,
            Error::Ai(e) if e.is_timeout() => FailureKind::Timeout,
            _ => classify_message(&message),
        };

        if kind != FailureKind::TokenLimit && mentions_context(&message) {
            tracing::warn!(
                error = %message,
                ?kind,
                "error mentions tokens or context but was not detected as a token limit; not retrying"
            );
        }

        kind
    }
}

fn classify_message(message: &str) -> FailureKind {
    let lower = message.to_lowercase();
    if lower.contains("429") || lower.contains("rate limit") || lower.contains("too many requests") {
        FailureKind::RateLimited
    } else if lower.contains("401") || lower.contains("unauthorized") {
        FailureKind::Auth
    } else if lower.contains("timeout") || lower.contains("timed out") {
        FailureKind::Timeout
    } else {
        FailureKind::Other
    }
}

fn mentions_context(message: &str) -> bool {
    let lower = message.to_lowercase();
    lower.contains("token") || lower.contains("context")
}
