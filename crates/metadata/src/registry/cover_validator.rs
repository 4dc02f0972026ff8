//! Cover URL validation.
//!
//! Every candidate cover URL a provider returns passes through here before
//! it can reach a record:
//! - only absolute http(s) URLs, upgraded to https
//! - known placeholder images rejected without a request
//! - trusted image hosts accepted without a request
//! - everything else probed: 2xx and an `image/*` content type
//!
//! A rejected URL is dropped from the result, which the resolver then
//! treats as the provider not having a cover.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, warn};
use reqwest::header::{CONTENT_TYPE, RANGE};
use reqwest::{Client, StatusCode, Url};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::time::Instant;

use crate::models::VolumeFields;
use crate::provider::http::{self, force_https};

/// Why a cover URL was refused.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum CoverRejection {
    #[error("not an absolute http(s) URL")]
    InvalidUrl,

    #[error("known placeholder image")]
    Placeholder,

    #[error("unreachable: {0}")]
    Unreachable(String),

    #[error("HTTP {0}")]
    BadStatus(u16),

    #[error("not an image (content type {0:?})")]
    NotAnImage(Option<String>),
}

impl CoverRejection {
    /// Whether the verdict may change on a later attempt.
    fn is_transient(&self) -> bool {
        match self {
            CoverRejection::Unreachable(_) => true,
            CoverRejection::BadStatus(status) => {
                matches!(*status, 408 | 429) || (500..600).contains(status)
            }
            _ => false,
        }
    }
}

/// Reachability check for one URL.
#[async_trait]
pub trait CoverProbe: Send + Sync {
    async fn probe(&self, url: &str, timeout: Duration) -> Result<(), CoverRejection>;
}

/// Probe over HTTP: HEAD, or a one-byte ranged GET for servers that refuse HEAD.
pub struct HttpCoverProbe {
    client: Client,
}

impl HttpCoverProbe {
    pub fn new() -> Self {
        Self::with_client(http::build_client(http::DEFAULT_USER_AGENT))
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

impl Default for HttpCoverProbe {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CoverProbe for HttpCoverProbe {
    async fn probe(&self, url: &str, timeout: Duration) -> Result<(), CoverRejection> {
        let unreachable = |e: reqwest::Error| CoverRejection::Unreachable(e.to_string());

        let mut response = self
            .client
            .head(url)
            .timeout(timeout)
            .send()
            .await
            .map_err(unreachable)?;

        if response.status() == StatusCode::METHOD_NOT_ALLOWED {
            response = self
                .client
                .get(url)
                .header(RANGE, "bytes=0-0")
                .timeout(timeout)
                .send()
                .await
                .map_err(unreachable)?;
        }

        if !response.status().is_success() {
            return Err(CoverRejection::BadStatus(response.status().as_u16()));
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.trim().to_ascii_lowercase());
        match content_type {
            Some(ct) if ct.starts_with("image/") => Ok(()),
            other => Err(CoverRejection::NotAnImage(other)),
        }
    }
}

/// Cover validation settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoverValidationConfig {
    pub probe_timeout_ms: u64,
    /// Hosts (and their subdomains) accepted without probing.
    pub trusted_hosts: Vec<String>,
    /// Case-insensitive substrings that mark a placeholder image.
    pub placeholder_patterns: Vec<String>,
}

impl Default for CoverValidationConfig {
    fn default() -> Self {
        Self {
            probe_timeout_ms: 5000,
            trusted_hosts: vec!["upload.wikimedia.org".to_string(), "wikipedia.org".to_string()],
            placeholder_patterns: ["placeholder", "no_cover", "nophoto", "image_not_available"]
                .into_iter()
                .map(String::from)
                .collect(),
        }
    }
}

impl CoverValidationConfig {
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }
}

/// Validates cover URLs and memoises the verdicts.
pub struct CoverValidator {
    probe: Arc<dyn CoverProbe>,
    config: CoverValidationConfig,
    verdicts: Mutex<HashMap<String, Result<(), CoverRejection>>>,
}

impl CoverValidator {
    pub fn new(probe: Arc<dyn CoverProbe>, config: CoverValidationConfig) -> Self {
        Self {
            probe,
            config,
            verdicts: Mutex::new(HashMap::new()),
        }
    }

    fn lock_verdicts(&self) -> MutexGuard<'_, HashMap<String, Result<(), CoverRejection>>> {
        self.verdicts.lock().unwrap_or_else(|poisoned| {
            warn!("Cover verdict cache mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    /// Parse and upgrade a candidate URL, or say why it cannot be used.
    pub fn normalize(&self, raw: &str) -> Result<(String, Url), CoverRejection> {
        let upgraded = force_https(raw.trim());
        let url = Url::parse(&upgraded).map_err(|_| CoverRejection::InvalidUrl)?;
        if url.scheme() != "https" || url.host_str().is_none() {
            return Err(CoverRejection::InvalidUrl);
        }

        let lower = upgraded.to_lowercase();
        if self
            .config
            .placeholder_patterns
            .iter()
            .any(|p| lower.contains(&p.to_lowercase()))
        {
            return Err(CoverRejection::Placeholder);
        }
        Ok((upgraded, url))
    }

    fn is_trusted(&self, url: &Url) -> bool {
        let Some(host) = url.host_str() else {
            return false;
        };
        self.config
            .trusted_hosts
            .iter()
            .any(|t| host == t || host.ends_with(&format!(".{}", t)))
    }

    /// Validate one URL. Returns the normalized URL to store.
    pub async fn validate(&self, raw: &str, deadline: Instant) -> Result<String, CoverRejection> {
        let (normalized, url) = self.normalize(raw)?;
        if self.is_trusted(&url) {
            return Ok(normalized);
        }

        if let Some(verdict) = self.lock_verdicts().get(&normalized) {
            return verdict.clone().map(|_| normalized);
        }

        let remaining = deadline.saturating_duration_since(Instant::now());
        let timeout = remaining.min(self.config.probe_timeout());
        if timeout.is_zero() {
            return Err(CoverRejection::Unreachable("deadline passed".to_string()));
        }

        let verdict = match tokio::time::timeout(timeout, self.probe.probe(&normalized, timeout)).await
        {
            Ok(verdict) => verdict,
            Err(_) => Err(CoverRejection::Unreachable("probe timed out".to_string())),
        };

        if let Err(rejection) = &verdict {
            debug!("Cover rejected {}: {}", normalized, rejection);
        }
        if !verdict.as_ref().is_err_and(CoverRejection::is_transient) {
            self.lock_verdicts().insert(normalized.clone(), verdict.clone());
        }
        verdict.map(|_| normalized)
    }

    /// Replace a field set's cover with its validated form, or null it.
    pub async fn sanitize(
        &self,
        fields: &mut VolumeFields,
        deadline: Instant,
    ) -> Option<CoverRejection> {
        let raw = fields.cover_url.take()?;
        match self.validate(&raw, deadline).await {
            Ok(url) => {
                fields.cover_url = Some(url);
                None
            }
            Err(rejection) => Some(rejection),
        }
    }
}
