//! Quota detection for provider responses
//!
//! Decides whether a failure means "this account's allowance is used up"
//! (rotate to the next credential), "this token was rejected" (invalidate and
//! rotate once), or anything else (give up on this provider).
//!
//! Status codes decide first. Text matching only looks at the error message
//! extracted from the body, and only at whole words, so an incidental "limit"
//! inside a file name or URL does not trigger rotation.

use provider::wire::error_message;
use provider::{ErrorClassification, ProviderError};

/// Statuses that always signal exhausted allowance.
const QUOTA_STATUSES: &[u16] = &[429, 402];

/// Words that mark a failure message as quota-class.
const QUOTA_WORDS: &[&str] = &[
    "quota", "quotas", "limit", "limits", "exceeded", "credit", "credits",
];

/// Per-provider classification rules.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QuotaPolicy {
    /// Additional statuses treated as quota exhaustion (e.g. 403 for a
    /// provider that uses it for "monthly limit reached")
    pub extra_statuses: Vec<u16>,
    /// Additional phrases, matched case-insensitively as substrings
    pub extra_phrases: Vec<String>,
}

impl QuotaPolicy {
    pub fn new(extra_statuses: Vec<u16>, extra_phrases: Vec<String>) -> Self {
        Self {
            extra_statuses,
            extra_phrases: extra_phrases
                .into_iter()
                .map(|p| p.to_lowercase())
                .filter(|p| !p.trim().is_empty())
                .collect(),
        }
    }

    /// Classify an HTTP failure by status and raw body.
    pub fn classify_status(&self, status: u16, body: &str) -> ErrorClassification {
        if QUOTA_STATUSES.contains(&status) || self.extra_statuses.contains(&status) {
            return ErrorClassification::QuotaExceeded;
        }
        if status == 401 || status == 403 {
            return ErrorClassification::AuthRejected;
        }
        match error_message(body) {
            Some(message) if self.is_quota_message(&message) => ErrorClassification::QuotaExceeded,
            _ => ErrorClassification::Fatal,
        }
    }

    /// Whether a provider failure message uses quota vocabulary.
    pub fn is_quota_message(&self, message: &str) -> bool {
        let lower = message.to_lowercase();
        let has_word = lower
            .split(|c: char| !c.is_alphanumeric())
            .any(|word| QUOTA_WORDS.contains(&word));
        has_word || self.extra_phrases.iter().any(|p| lower.contains(p.as_str()))
    }

    /// Classify any provider error. Only HTTP errors can be quota-class or
    /// auth failures; transport and protocol errors are fatal.
    pub fn classify(&self, error: &ProviderError) -> ErrorClassification {
        match error {
            ProviderError::Http { status, body, .. } => self.classify_status(*status, body),
            _ => ErrorClassification::Fatal,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use provider::Step;

    fn policy() -> QuotaPolicy {
        QuotaPolicy::default()
    }

    #[test]
    fn status_429_and_402_are_quota() {
        assert_eq!(policy().classify_status(429, ""), ErrorClassification::QuotaExceeded);
        assert_eq!(
            policy().classify_status(402, "payment required"),
            ErrorClassification::QuotaExceeded
        );
    }

    #[test]
    fn auth_statuses_are_auth_rejected() {
        assert_eq!(policy().classify_status(401, "expired"), ErrorClassification::AuthRejected);
        assert_eq!(policy().classify_status(403, ""), ErrorClassification::AuthRejected);
    }

    #[test]
    fn extra_status_overrides_auth_meaning() {
        let policy = QuotaPolicy::new(vec![403], Vec::new());
        assert_eq!(policy.classify_status(403, ""), ErrorClassification::QuotaExceeded);
    }

    #[test]
    fn quota_vocabulary_in_error_message() {
        for body in [
            r#"{"error":{"message":"Monthly QUOTA reached"}}"#,
            r#"{"error":"Rate limit hit"}"#,
            r#"{"message":"allowance exceeded"}"#,
            r#"{"detail":"No credits left"}"#,
            "credit balance too low",
        ] {
            assert_eq!(
                policy().classify_status(400, body),
                ErrorClassification::QuotaExceeded,
                "body: {body}"
            );
        }
    }

    #[test]
    fn other_errors_are_fatal() {
        assert_eq!(policy().classify_status(500, "internal error"), ErrorClassification::Fatal);
        assert_eq!(policy().classify_status(400, r#"{"error":"bad pdf"}"#), ErrorClassification::Fatal);
        assert_eq!(policy().classify_status(404, ""), ErrorClassification::Fatal);
    }

    #[test]
    fn partial_words_do_not_match() {
        assert!(!policy().is_quota_message("unlimited plan, see /limitations.html"));
        assert!(!policy().is_quota_message("discredited input"));
        assert!(policy().is_quota_message("limit: 250/month"));
    }

    #[test]
    fn text_outside_error_message_is_ignored() {
        // "limit" only appears in an unrelated field
        let body = r#"{"error":{"message":"corrupt file"},"docs":"see rate limit page"}"#;
        assert_eq!(policy().classify_status(400, body), ErrorClassification::Fatal);
    }

    #[test]
    fn extra_phrases_match_case_insensitively() {
        let policy = QuotaPolicy::new(Vec::new(), vec!["Too Many Files".into()]);
        assert!(policy.is_quota_message("too many files processed this month"));
        assert!(!QuotaPolicy::default().is_quota_message("too many files processed"));
    }

    #[test]
    fn classify_provider_errors() {
        let http = ProviderError::Http {
            step: Step::Start,
            status: 429,
            body: String::new(),
        };
        let network = ProviderError::Network {
            step: Step::Upload,
            reason: "quota exceeded".into(),
        };
        assert_eq!(policy().classify(&http), ErrorClassification::QuotaExceeded);
        assert_eq!(policy().classify(&network), ErrorClassification::Fatal);
    }
}
