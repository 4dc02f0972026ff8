//! Per-resolution provider attempt log.

use serde::Serialize;

use crate::models::{Field, ProviderId};

/// Why a provider was not called during a resolution.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum SkipReason {
    /// Provider supplies none of the fields still missing.
    NoUsefulFields,

    /// Daily quota spent.
    QuotaExhausted,

    /// The deadline ended the chain before this provider's turn.
    DeadlineExpired,

    /// Nothing left to resolve.
    AlreadyComplete,
}

/// Record of a single provider attempt during a resolution.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderAttempt {
    pub provider_id: ProviderId,
    pub skipped: Option<SkipReason>,
    pub error: Option<String>,
    /// Calls beyond the first.
    pub retries: u32,
    pub demoted: bool,
    /// Fields this provider actually filled in the merged records.
    pub fields_supplied: Vec<Field>,
    pub success: bool,
}

impl ProviderAttempt {
    fn new(provider_id: ProviderId) -> Self {
        Self {
            provider_id,
            skipped: None,
            error: None,
            retries: 0,
            demoted: false,
            fields_supplied: Vec::new(),
            success: false,
        }
    }
}

/// Detailed result of a resolution with skip diagnostics.
#[derive(Clone, Debug, Default, Serialize)]
pub struct FetchDiagnostics {
    pub attempts: Vec<ProviderAttempt>,
}

impl FetchDiagnostics {
    pub fn new() -> Self {
        Self {
            attempts: Vec::new(),
        }
    }

    pub fn record_skip(&mut self, provider_id: ProviderId, reason: SkipReason) {
        self.attempts.push(ProviderAttempt {
            skipped: Some(reason),
            ..ProviderAttempt::new(provider_id)
        });
    }

    pub fn record_error(&mut self, provider_id: ProviderId, error: String, retries: u32, demoted: bool) {
        self.attempts.push(ProviderAttempt {
            error: Some(error),
            retries,
            demoted,
            ..ProviderAttempt::new(provider_id)
        });
    }

    pub fn record_success(
        &mut self,
        provider_id: ProviderId,
        retries: u32,
        demoted: bool,
        fields_supplied: Vec<Field>,
    ) {
        self.attempts.push(ProviderAttempt {
            retries,
            demoted,
            fields_supplied,
            success: true,
            ..ProviderAttempt::new(provider_id)
        });
    }

    /// Summary for logging/debugging.
    pub fn summary(&self) -> String {
        if self.attempts.is_empty() {
            return "no providers consulted".to_string();
        }
        self.attempts
            .iter()
            .map(|a| {
                let retries = if a.retries > 0 {
                    format!(" after {} retries", a.retries)
                } else {
                    String::new()
                };
                if a.success {
                    let fields: Vec<&str> = a.fields_supplied.iter().map(|f| f.as_str()).collect();
                    format!("{}: SUCCESS [{}]{}", a.provider_id, fields.join(","), retries)
                } else if let Some(skip) = &a.skipped {
                    format!("{}: SKIPPED ({:?})", a.provider_id, skip)
                } else if let Some(err) = &a.error {
                    format!("{}: ERROR ({}){}", a.provider_id, err, retries)
                } else {
                    format!("{}: UNKNOWN", a.provider_id)
                }
            })
            .collect::<Vec<_>>()
            .join(" -> ")
    }

    /// Check if any provider succeeded.
    pub fn has_success(&self) -> bool {
        self.attempts.iter().any(|a| a.success)
    }

    /// Get all skip reasons.
    pub fn skip_reasons(&self) -> Vec<(&ProviderId, &SkipReason)> {
        self.attempts
            .iter()
            .filter_map(|a| a.skipped.as_ref().map(|s| (&a.provider_id, s)))
            .collect()
    }

    /// Get all errors.
    pub fn errors(&self) -> Vec<(&ProviderId, &str)> {
        self.attempts
            .iter()
            .filter_map(|a| a.error.as_ref().map(|e| (&a.provider_id, e.as_str())))
            .collect()
    }

    /// Total calls made, retries included.
    pub fn provider_calls(&self) -> u32 {
        self.attempts
            .iter()
            .filter(|a| a.skipped.is_none())
            .map(|a| a.retries + 1)
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use std::borrow::Cow;

    use super::*;

    #[test]
    fn test_diagnostics_summary() {
        let mut diag = FetchDiagnostics::new();
        diag.record_skip(Cow::Borrowed("JIKAN"), SkipReason::NoUsefulFields);
        diag.record_error(Cow::Borrowed("MANGADEX"), "Timeout".to_string(), 2, false);
        diag.record_success(
            Cow::Borrowed("GOOGLE_BOOKS"),
            0,
            false,
            vec![Field::Title, Field::Isbn],
        );

        let summary = diag.summary();
        assert!(summary.contains("JIKAN: SKIPPED"));
        assert!(summary.contains("MANGADEX: ERROR (Timeout) after 2 retries"));
        assert!(summary.contains("GOOGLE_BOOKS: SUCCESS [title,isbn]"));
        assert!(diag.has_success());
        assert_eq!(diag.provider_calls(), 4);
        assert_eq!(diag.skip_reasons().len(), 1);
        assert_eq!(diag.errors().len(), 1);
    }
}
