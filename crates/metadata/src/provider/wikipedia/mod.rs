//! Wikipedia metadata provider implementation.
//!
//! Last-resort cover source. Chapter list articles often embed the
//! volume covers, so a lookup is:
//! 1. full-text search for the series and volume
//! 2. list the images of the best pages
//! 3. resolve the matching file to its upload URL
//!
//! Wikimedia requires a descriptive User-Agent on every request.
//! API documentation: https://www.mediawiki.org/wiki/API:Main_page

use std::collections::BTreeMap;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use crate::errors::MetadataError;
use crate::models::{Field, ProviderResult, VolumeFields};
use crate::provider::http::{self, volume_in_title};
use crate::provider::{MetadataProvider, ProviderCapabilities, RateLimit};

const BASE_URL: &str = "https://en.wikipedia.org/w/api.php";
const PROVIDER_ID: &str = "WIKIPEDIA";

const FIELDS: &[Field] = &[Field::CoverUrl];

/// Search hits whose images are inspected.
const PAGES_TO_INSPECT: usize = 3;

const IMAGE_EXTENSIONS: &[&str] = &[".jpg", ".jpeg", ".png", ".webp"];

// ============================================================================
// API Response Structures
// ============================================================================

#[derive(Debug, Deserialize)]
struct SearchResponse {
    query: Option<SearchQuery>,
}

#[derive(Debug, Deserialize)]
struct SearchQuery {
    #[serde(default)]
    search: Vec<SearchHit>,
}

#[derive(Debug, Deserialize)]
struct SearchHit {
    title: String,
}

/// Shared shape of `prop=images` and `prop=imageinfo` responses.
#[derive(Debug, Deserialize)]
struct PagesResponse {
    query: Option<PagesQuery>,
}

#[derive(Debug, Deserialize)]
struct PagesQuery {
    #[serde(default)]
    pages: BTreeMap<String, Page>,
}

#[derive(Debug, Deserialize)]
struct Page {
    #[serde(default)]
    images: Vec<ImageRef>,
    #[serde(default)]
    imageinfo: Vec<ImageInfo>,
}

#[derive(Debug, Deserialize)]
struct ImageRef {
    title: String,
}

#[derive(Debug, Deserialize)]
struct ImageInfo {
    url: Option<String>,
}

// ============================================================================
// WikipediaProvider
// ============================================================================

pub struct WikipediaProvider {
    client: Client,
}

impl WikipediaProvider {
    pub fn new(user_agent: &str) -> Self {
        Self::with_client(http::build_client(user_agent))
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    async fn query<T: serde::de::DeserializeOwned>(
        &self,
        params: &[(&str, &str)],
    ) -> Result<T, MetadataError> {
        let request = self
            .client
            .get(BASE_URL)
            .query(&[("action", "query"), ("format", "json")])
            .query(params);
        http::get_json(PROVIDER_ID, request).await
    }

    async fn search(&self, series_name: &str, volume: u32) -> Result<Vec<String>, MetadataError> {
        let search = format!("\"{}\" manga volume {}", series_name, volume);
        let response: SearchResponse = self
            .query(&[("list", "search"), ("srsearch", &search), ("srlimit", "5")])
            .await?;

        Ok(response
            .query
            .map(|q| q.search.into_iter().map(|hit| hit.title).collect())
            .unwrap_or_default())
    }

    async fn page_images(&self, page_title: &str) -> Result<Vec<String>, MetadataError> {
        let response: PagesResponse = self
            .query(&[("titles", page_title), ("prop", "images"), ("imlimit", "50")])
            .await?;

        Ok(response
            .query
            .map(|q| {
                q.pages
                    .into_values()
                    .flat_map(|p| p.images.into_iter().map(|i| i.title))
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn image_url(&self, file_title: &str) -> Result<Option<String>, MetadataError> {
        let response: PagesResponse = self
            .query(&[("titles", file_title), ("prop", "imageinfo"), ("iiprop", "url")])
            .await?;

        Ok(response.query.and_then(|q| {
            q.pages
                .into_values()
                .flat_map(|p| p.imageinfo)
                .find_map(|info| info.url)
        }))
    }
}

#[async_trait]
impl MetadataProvider for WikipediaProvider {
    fn id(&self) -> &'static str {
        PROVIDER_ID
    }

    fn capabilities(&self) -> ProviderCapabilities {
        ProviderCapabilities {
            fields: FIELDS,
            supports_series_query: false,
            series_query_exhaustive: false,
        }
    }

    fn rate_limit(&self) -> RateLimit {
        RateLimit {
            requests_per_minute: 60,
            burst_capacity: 1,
            daily_quota: Some(500),
            ..RateLimit::default()
        }
    }

    async fn fetch_volume(
        &self,
        series_name: &str,
        volume: u32,
    ) -> Result<ProviderResult, MetadataError> {
        let pages = self.search(series_name, volume).await?;

        for page in pages.iter().take(PAGES_TO_INSPECT) {
            let images = self.page_images(page).await?;
            let Some(file) = best_cover(&images, series_name, volume) else {
                continue;
            };
            debug!("Wikipedia: '{}' vol {} -> {} on '{}'", series_name, volume, file, page);

            if let Some(url) = self.image_url(file).await? {
                let fields = VolumeFields {
                    cover_url: Some(url),
                    ..Default::default()
                };
                return Ok(ProviderResult::new(PROVIDER_ID, volume, fields));
            }
        }

        Err(MetadataError::NotFound {
            provider: PROVIDER_ID.to_string(),
        })
    }
}

// ============================================================================
// Cover selection
// ============================================================================

/// Pick the image most likely to be this volume's cover.
///
/// A file naming the series and the exact volume wins. A generic
/// "cover" file of the series is only trusted for volume 1.
fn best_cover<'a>(images: &'a [String], series_name: &str, volume: u32) -> Option<&'a str> {
    images
        .iter()
        .filter_map(|title| cover_score(title, series_name, volume).map(|s| (s, title)))
        .max_by_key(|(score, _)| *score)
        .map(|(_, title)| title.as_str())
}

fn cover_score(file_title: &str, series_name: &str, volume: u32) -> Option<u8> {
    let lower = file_title.to_lowercase();
    let stem = IMAGE_EXTENSIONS
        .iter()
        .find_map(|ext| lower.strip_suffix(ext))?;
    let stem = stem.strip_prefix("file:").unwrap_or(stem).replace('_', " ");

    if !stem.contains(&series_name.to_lowercase()) {
        return None;
    }

    match volume_in_title(&stem) {
        Some(v) if v == volume => Some(2),
        Some(_) => None,
        None if volume == 1 && (stem.contains("cover") || stem.contains("volume")) => Some(1),
        None => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_id_and_quota() {
        let provider = WikipediaProvider::new(http::DEFAULT_USER_AGENT);
        assert_eq!(provider.id(), "WIKIPEDIA");
        assert!(!provider.capabilities().supports_series_query);
        assert_eq!(provider.rate_limit().effective_daily_quota(), Some(450));
    }

    #[test]
    fn test_best_cover_prefers_exact_volume() {
        let images = vec![
            "File:Bleach logo.svg".to_string(),
            "File:Bleach cover.jpg".to_string(),
            "File:Bleach volume 2.jpg".to_string(),
            "File:Bleach volume 3.jpg".to_string(),
        ];
        assert_eq!(
            best_cover(&images, "Bleach", 3),
            Some("File:Bleach volume 3.jpg")
        );
        assert_eq!(best_cover(&images, "Bleach", 4), None);
    }

    #[test]
    fn test_generic_cover_only_for_first_volume() {
        let images = vec!["File:Bakuman_cover.png".to_string()];
        assert_eq!(best_cover(&images, "Bakuman", 1), Some("File:Bakuman_cover.png"));
        assert_eq!(best_cover(&images, "Bakuman", 2), None);
    }

    #[test]
    fn test_pages_response_parses() {
        let json = r#"{"query": {"pages": {"-1": {"imageinfo": [{"url": "https://upload.wikimedia.org/a.jpg"}]}}}}"#;
        let response: PagesResponse = serde_json::from_str(json).unwrap();
        let url = response
            .query
            .unwrap()
            .pages
            .into_values()
            .flat_map(|p| p.imageinfo)
            .find_map(|i| i.url);
        assert_eq!(url.as_deref(), Some("https://upload.wikimedia.org/a.jpg"));
    }
}
