//! MangaDex metadata provider implementation.
//!
//! Supplies per-volume cover art and the English series description:
//! - Series match via /manga?title=
//! - Volume covers via /cover?manga[]=
//!
//! Every adapter call costs two HTTP requests, so the published limit is
//! expressed in adapter calls.
//! API documentation: https://api.mangadex.org/docs/

use std::collections::BTreeMap;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use crate::errors::MetadataError;
use crate::models::{Field, ProviderResult, VolumeFields};
use crate::provider::http;
use crate::provider::{MetadataProvider, ProviderCapabilities, RateLimit};

const BASE_URL: &str = "https://api.mangadex.org";
const UPLOADS_URL: &str = "https://uploads.mangadex.org/covers";
const PROVIDER_ID: &str = "MANGADEX";

const FIELDS: &[Field] = &[Field::Description, Field::CoverUrl];

/// Cover locales in order of preference.
const LOCALE_PREFERENCE: &[&str] = &["en", "ja"];

// ============================================================================
// API Response Structures
// ============================================================================

/// Response from /manga
#[derive(Debug, Deserialize)]
struct MangaListResponse {
    #[serde(default)]
    data: Vec<Manga>,
}

#[derive(Debug, Deserialize)]
struct Manga {
    id: String,
    attributes: MangaAttributes,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MangaAttributes {
    #[serde(default)]
    title: BTreeMap<String, String>,
    #[serde(default)]
    alt_titles: Vec<BTreeMap<String, String>>,
    /// MangaDex sends `[]` instead of `{}` when there is no description.
    #[serde(default, deserialize_with = "localized_or_empty")]
    description: BTreeMap<String, String>,
}

/// Response from /cover
#[derive(Debug, Deserialize)]
struct CoverListResponse {
    #[serde(default)]
    data: Vec<Cover>,
}

#[derive(Debug, Deserialize)]
struct Cover {
    attributes: CoverAttributes,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CoverAttributes {
    volume: Option<String>,
    file_name: String,
    locale: Option<String>,
}

fn localized_or_empty<'de, D>(deserializer: D) -> Result<BTreeMap<String, String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Localized {
        Map(BTreeMap<String, String>),
        Empty(Vec<serde_json::Value>),
    }

    Ok(match Localized::deserialize(deserializer)? {
        Localized::Map(map) => map,
        Localized::Empty(_) => BTreeMap::new(),
    })
}

// ============================================================================
// MangaDexProvider
// ============================================================================

/// MangaDex metadata provider. No API key required.
pub struct MangaDexProvider {
    client: Client,
}

impl MangaDexProvider {
    pub fn new() -> Self {
        Self::with_client(http::build_client(http::DEFAULT_USER_AGENT))
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    async fn find_manga(&self, series_name: &str) -> Result<Manga, MetadataError> {
        let request = self
            .client
            .get(format!("{}/manga", BASE_URL))
            .query(&[("title", series_name), ("limit", "5")]);

        let response: MangaListResponse = http::get_json(PROVIDER_ID, request).await?;
        pick_manga(response.data, series_name).ok_or_else(|| MetadataError::NotFound {
            provider: PROVIDER_ID.to_string(),
        })
    }

    async fn covers(&self, manga_id: &str) -> Result<BTreeMap<u32, String>, MetadataError> {
        let request = self.client.get(format!("{}/cover", BASE_URL)).query(&[
            ("manga[]", manga_id),
            ("limit", "100"),
            ("order[volume]", "asc"),
        ]);

        let response: CoverListResponse = http::get_json(PROVIDER_ID, request).await?;
        Ok(covers_by_volume(manga_id, &response.data))
    }

    async fn lookup(
        &self,
        series_name: &str,
        volumes: &[u32],
    ) -> Result<Vec<ProviderResult>, MetadataError> {
        let manga = self.find_manga(series_name).await?;
        let covers = self.covers(&manga.id).await?;
        debug!(
            "MangaDex: '{}' matched {} with {} volume covers",
            series_name,
            manga.id,
            covers.len()
        );

        let description = english(&manga.attributes.description);
        let results: Vec<ProviderResult> = volumes
            .iter()
            .filter_map(|volume| {
                let fields = VolumeFields {
                    description: description.clone(),
                    cover_url: covers.get(volume).cloned(),
                    ..Default::default()
                };
                (!fields.is_empty()).then(|| ProviderResult::new(PROVIDER_ID, *volume, fields))
            })
            .collect();

        if results.is_empty() {
            return Err(MetadataError::NotFound {
                provider: PROVIDER_ID.to_string(),
            });
        }
        Ok(results)
    }
}

impl Default for MangaDexProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MetadataProvider for MangaDexProvider {
    fn id(&self) -> &'static str {
        PROVIDER_ID
    }

    fn capabilities(&self) -> ProviderCapabilities {
        ProviderCapabilities {
            fields: FIELDS,
            supports_series_query: true,
            series_query_exhaustive: true,
        }
    }

    fn rate_limit(&self) -> RateLimit {
        RateLimit {
            requests_per_minute: 60,
            burst_capacity: 2,
            ..RateLimit::default()
        }
    }

    async fn fetch_volume(
        &self,
        series_name: &str,
        volume: u32,
    ) -> Result<ProviderResult, MetadataError> {
        let mut results = self.lookup(series_name, &[volume]).await?;
        results.pop().ok_or_else(|| MetadataError::NotFound {
            provider: PROVIDER_ID.to_string(),
        })
    }

    async fn fetch_series(
        &self,
        series_name: &str,
        volumes: &[u32],
    ) -> Result<Vec<ProviderResult>, MetadataError> {
        self.lookup(series_name, volumes).await
    }
}

// ============================================================================
// Response mapping
// ============================================================================

/// Prefer an exact (case-insensitive) title match, otherwise the top hit.
fn pick_manga(candidates: Vec<Manga>, series_name: &str) -> Option<Manga> {
    let wanted = series_name.trim().to_lowercase();
    let exact = candidates.iter().position(|m| {
        m.attributes
            .title
            .values()
            .chain(m.attributes.alt_titles.iter().flat_map(|t| t.values()))
            .any(|t| t.trim().to_lowercase() == wanted)
    });

    let idx = exact.unwrap_or(0);
    candidates.into_iter().nth(idx)
}

fn covers_by_volume(manga_id: &str, covers: &[Cover]) -> BTreeMap<u32, String> {
    let mut best: BTreeMap<u32, (usize, String)> = BTreeMap::new();

    for cover in covers {
        let Some(volume) = cover
            .attributes
            .volume
            .as_deref()
            .and_then(|v| v.trim().parse::<f32>().ok())
            .filter(|v| v.fract() == 0.0 && *v >= 0.0)
            .map(|v| v as u32)
        else {
            continue;
        };

        let rank = cover
            .attributes
            .locale
            .as_deref()
            .and_then(|l| LOCALE_PREFERENCE.iter().position(|p| *p == l))
            .unwrap_or(LOCALE_PREFERENCE.len());
        let url = format!("{}/{}/{}", UPLOADS_URL, manga_id, cover.attributes.file_name);

        match best.get(&volume) {
            Some((existing, _)) if *existing <= rank => {}
            _ => {
                best.insert(volume, (rank, url));
            }
        }
    }

    best.into_iter().map(|(v, (_, url))| (v, url)).collect()
}

fn english(localized: &BTreeMap<String, String>) -> Option<String> {
    localized
        .get("en")
        .map(|d| d.split("\n\n---").next().unwrap_or(d).trim().to_string())
        .filter(|d| !d.is_empty())
}
