//! Jikan (unofficial MyAnimeList API) metadata provider implementation.
//!
//! MyAnimeList only knows series, not volumes. The synopsis is applied to
//! every requested volume; the series cover and start year are only
//! meaningful for volume 1.
//!
//! Jikan asks clients to stay around one request every two seconds.
//! API documentation: https://docs.api.jikan.moe/

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use crate::errors::MetadataError;
use crate::models::{Field, ProviderResult, VolumeFields};
use crate::provider::http;
use crate::provider::{MetadataProvider, ProviderCapabilities, RateLimit};

const BASE_URL: &str = "https://api.jikan.moe/v4";
const PROVIDER_ID: &str = "JIKAN";

const FIELDS: &[Field] = &[Field::Description, Field::CoverUrl, Field::CopyrightYear];

const REWRITE_CREDIT: &str = "[Written by MAL Rewrite]";

// ============================================================================
// API Response Structures
// ============================================================================

/// Response from /manga
#[derive(Debug, Deserialize)]
struct MangaSearchResponse {
    #[serde(default)]
    data: Vec<MangaEntry>,
}

#[derive(Debug, Deserialize)]
struct MangaEntry {
    mal_id: u64,
    title: Option<String>,
    title_english: Option<String>,
    synopsis: Option<String>,
    images: Option<Images>,
    published: Option<Published>,
}

#[derive(Debug, Deserialize)]
struct Images {
    jpg: Option<ImageSet>,
}

#[derive(Debug, Deserialize)]
struct ImageSet {
    image_url: Option<String>,
    large_image_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Published {
    /// ISO-8601 timestamp of the first publication.
    from: Option<String>,
}

// ============================================================================
// JikanProvider
// ============================================================================

pub struct JikanProvider {
    client: Client,
}

impl JikanProvider {
    pub fn new() -> Self {
        Self::with_client(http::build_client(http::DEFAULT_USER_AGENT))
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    async fn find_series(&self, series_name: &str) -> Result<MangaEntry, MetadataError> {
        let request = self
            .client
            .get(format!("{}/manga", BASE_URL))
            .query(&[("q", series_name), ("limit", "5")]);

        let response: MangaSearchResponse = http::get_json(PROVIDER_ID, request).await?;
        let entry = pick_entry(response.data, series_name).ok_or_else(|| {
            MetadataError::NotFound {
                provider: PROVIDER_ID.to_string(),
            }
        })?;
        debug!("Jikan: '{}' matched MAL id {}", series_name, entry.mal_id);
        Ok(entry)
    }
}

impl Default for JikanProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MetadataProvider for JikanProvider {
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
            requests_per_minute: 30,
            burst_capacity: 1,
            ..RateLimit::default()
        }
    }

    async fn fetch_volume(
        &self,
        series_name: &str,
        volume: u32,
    ) -> Result<ProviderResult, MetadataError> {
        let entry = self.find_series(series_name).await?;
        let fields = fields_for_volume(&entry, volume);
        if fields.is_empty() {
            return Err(MetadataError::NotFound {
                provider: PROVIDER_ID.to_string(),
            });
        }
        Ok(ProviderResult::new(PROVIDER_ID, volume, fields))
    }

    async fn fetch_series(
        &self,
        series_name: &str,
        volumes: &[u32],
    ) -> Result<Vec<ProviderResult>, MetadataError> {
        let entry = self.find_series(series_name).await?;
        let results: Vec<ProviderResult> = volumes
            .iter()
            .map(|v| (*v, fields_for_volume(&entry, *v)))
            .filter(|(_, fields)| !fields.is_empty())
            .map(|(v, fields)| ProviderResult::new(PROVIDER_ID, v, fields))
            .collect();

        if results.is_empty() {
            return Err(MetadataError::NotFound {
                provider: PROVIDER_ID.to_string(),
            });
        }
        Ok(results)
    }
}

// ============================================================================
// Response mapping
// ============================================================================

fn pick_entry(entries: Vec<MangaEntry>, series_name: &str) -> Option<MangaEntry> {
    let wanted = series_name.trim().to_lowercase();
    let exact = entries.iter().position(|e| {
        [&e.title, &e.title_english]
            .into_iter()
            .flatten()
            .any(|t| t.trim().to_lowercase() == wanted)
    });
    entries.into_iter().nth(exact.unwrap_or(0))
}

fn fields_for_volume(entry: &MangaEntry, volume: u32) -> VolumeFields {
    let description = entry.synopsis.as_deref().map(|s| {
        s.replace(REWRITE_CREDIT, "").trim().to_string()
    });

    let mut fields = VolumeFields {
        description,
        ..Default::default()
    };

    if volume == 1 {
        fields.cover_url = entry
            .images
            .as_ref()
            .and_then(|i| i.jpg.as_ref())
            .and_then(|jpg| jpg.large_image_url.clone().or_else(|| jpg.image_url.clone()));
        fields.copyright_year = entry
            .published
            .as_ref()
            .and_then(|p| p.from.as_deref())
            .and_then(|from| from.get(..4))
            .and_then(|year| year.parse().ok());
    }

    fields.normalized()
}

#[cfg(test)]
mod tests {
    use super::*;

    const FIXTURE: &str = r#"{
        "data": [
            {
                "mal_id": 13,
                "title": "One Piece",
                "title_english": "One Piece",
                "synopsis": "Gol D. Roger was known as the Pirate King.\n\n[Written by MAL Rewrite]",
                "images": {"jpg": {
                    "image_url": "https://cdn.myanimelist.net/images/manga/2/253146.jpg",
                    "large_image_url": "https://cdn.myanimelist.net/images/manga/2/253146l.jpg"
                }},
                "published": {"from": "1997-07-22T00:00:00+00:00"}
            },
            {
                "mal_id": 99,
                "title": "One Piece Party",
                "synopsis": null,
                "images": null,
                "published": null
            }
        ]
    }"#;

    fn entries() -> Vec<MangaEntry> {
        serde_json::from_str::<MangaSearchResponse>(FIXTURE).unwrap().data
    }

    #[test]
    fn test_provider_id_and_rate_limit() {
        let provider = JikanProvider::new();
        assert_eq!(provider.id(), "JIKAN");
        assert_eq!(provider.rate_limit().requests_per_minute, 30);
    }

    #[test]
    fn test_volume_one_gets_cover_and_year() {
        let entry = pick_entry(entries(), "one piece").unwrap();
        let fields = fields_for_volume(&entry, 1);

        assert_eq!(
            fields.description.as_deref(),
            Some("Gol D. Roger was known as the Pirate King.")
        );
        assert_eq!(
            fields.cover_url.as_deref(),
            Some("https://cdn.myanimelist.net/images/manga/2/253146l.jpg")
        );
        assert_eq!(fields.copyright_year, Some(1997));
    }

    #[test]
    fn test_later_volumes_only_get_the_synopsis() {
        let entry = pick_entry(entries(), "One Piece").unwrap();
        let fields = fields_for_volume(&entry, 7);
        assert!(fields.description.is_some());
        assert!(fields.cover_url.is_none());
        assert!(fields.copyright_year.is_none());
    }

    #[test]
    fn test_entry_without_data_yields_empty_fields() {
        let entry = pick_entry(entries(), "One Piece Party").unwrap();
        assert_eq!(entry.mal_id, 99);
        assert!(fields_for_volume(&entry, 1).is_empty());
    }
}
