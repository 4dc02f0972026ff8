//! Google Books metadata provider implementation.
//!
//! The most complete single source we have: title, ISBN, publisher,
//! publication year, description, cover and list price.
//! - Per-volume lookups via a quoted `"<series>" "volume <n>"` search
//! - Series lookups via one wider search whose items are matched to volumes
//!
//! Published limit is one request per second and 1000 per day.
//! API documentation: https://developers.google.com/books/docs/v1/using

use async_trait::async_trait;
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::errors::MetadataError;
use crate::models::{Field, ProviderResult, VolumeFields};
use crate::provider::http::{self, force_https, volume_in_title};
use crate::provider::{MetadataProvider, ProviderCapabilities, RateLimit};

const BASE_URL: &str = "https://www.googleapis.com/books/v1/volumes";
const PROVIDER_ID: &str = "GOOGLE_BOOKS";

const VOLUME_SEARCH_RESULTS: &str = "5";
const SERIES_SEARCH_RESULTS: &str = "40";

// ============================================================================
// API Response Structures
// ============================================================================

/// Response from /volumes
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VolumesResponse {
    #[serde(default)]
    total_items: u32,
    #[serde(default)]
    items: Vec<Item>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Item {
    volume_info: VolumeInfo,
    #[serde(default)]
    sale_info: Option<SaleInfo>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VolumeInfo {
    title: Option<String>,
    subtitle: Option<String>,
    publisher: Option<String>,
    /// "2003", "2003-08" or "2003-08-05"
    published_date: Option<String>,
    description: Option<String>,
    #[serde(default)]
    industry_identifiers: Vec<IndustryIdentifier>,
    image_links: Option<ImageLinks>,
}

#[derive(Debug, Deserialize)]
struct IndustryIdentifier {
    #[serde(rename = "type")]
    kind: String,
    identifier: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ImageLinks {
    extra_large: Option<String>,
    large: Option<String>,
    medium: Option<String>,
    small: Option<String>,
    thumbnail: Option<String>,
    small_thumbnail: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SaleInfo {
    list_price: Option<Price>,
    retail_price: Option<Price>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Price {
    amount: Option<f64>,
    currency_code: Option<String>,
}

// ============================================================================
// GoogleBooksProvider
// ============================================================================

/// Google Books metadata provider.
///
/// Works without an API key at a lower shared quota; a key raises it.
pub struct GoogleBooksProvider {
    client: Client,
    api_key: Option<String>,
}

impl GoogleBooksProvider {
    pub fn new(api_key: Option<String>) -> Self {
        Self::with_client(http::build_client(http::DEFAULT_USER_AGENT), api_key)
    }

    pub fn with_client(client: Client, api_key: Option<String>) -> Self {
        Self {
            client,
            api_key: api_key.filter(|k| !k.trim().is_empty()),
        }
    }

    async fn search(&self, query: &str, max_results: &str) -> Result<VolumesResponse, MetadataError> {
        let mut request = self.client.get(BASE_URL).query(&[
            ("q", query),
            ("maxResults", max_results),
            ("printType", "books"),
        ]);
        if let Some(key) = &self.api_key {
            request = request.query(&[("key", key.as_str())]);
        }

        debug!("Google Books request: q={}", query);
        http::get_json(PROVIDER_ID, request).await
    }
}

#[async_trait]
impl MetadataProvider for GoogleBooksProvider {
    fn id(&self) -> &'static str {
        PROVIDER_ID
    }

    fn capabilities(&self) -> ProviderCapabilities {
        ProviderCapabilities {
            fields: &Field::ALL,
            supports_series_query: true,
            series_query_exhaustive: false,
        }
    }

    fn rate_limit(&self) -> RateLimit {
        RateLimit {
            requests_per_minute: 60,
            burst_capacity: 1,
            daily_quota: Some(1000),
            ..RateLimit::default()
        }
    }

    async fn fetch_volume(
        &self,
        series_name: &str,
        volume: u32,
    ) -> Result<ProviderResult, MetadataError> {
        let query = format!("\"{}\" \"volume {}\" manga", series_name, volume);
        let response = self.search(&query, VOLUME_SEARCH_RESULTS).await?;

        match find_volume(&response, series_name, volume) {
            Some(fields) => Ok(ProviderResult::new(PROVIDER_ID, volume, fields)),
            None => {
                debug!(
                    "Google Books: {} items for '{}' vol {}, none matched",
                    response.total_items, series_name, volume
                );
                Err(MetadataError::NotFound {
                    provider: PROVIDER_ID.to_string(),
                })
            }
        }
    }

    async fn fetch_series(
        &self,
        series_name: &str,
        volumes: &[u32],
    ) -> Result<Vec<ProviderResult>, MetadataError> {
        let query = format!("\"{}\" manga", series_name);
        let response = self.search(&query, SERIES_SEARCH_RESULTS).await?;

        let results: Vec<ProviderResult> = match_series(&response, series_name, volumes)
            .into_iter()
            .map(|(volume, fields)| ProviderResult::new(PROVIDER_ID, volume, fields))
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

fn find_volume(response: &VolumesResponse, series_name: &str, volume: u32) -> Option<VolumeFields> {
    response
        .items
        .iter()
        .find(|item| item_volume(item, series_name) == Some(volume))
        .map(to_fields)
}

fn match_series(
    response: &VolumesResponse,
    series_name: &str,
    volumes: &[u32],
) -> Vec<(u32, VolumeFields)> {
    let mut matched: Vec<(u32, VolumeFields)> = Vec::new();
    for item in &response.items {
        let Some(volume) = item_volume(item, series_name) else {
            continue;
        };
        if volumes.contains(&volume) && !matched.iter().any(|(v, _)| *v == volume) {
            matched.push((volume, to_fields(item)));
        }
    }
    matched.sort_by_key(|(v, _)| *v);
    matched
}

/// Volume number of an item, if its title belongs to the series.
fn item_volume(item: &Item, series_name: &str) -> Option<u32> {
    let title = full_title(&item.volume_info)?;
    if !simplify(&title).contains(&simplify(series_name)) {
        return None;
    }
    volume_in_title(&title)
}

fn full_title(info: &VolumeInfo) -> Option<String> {
    let title = info.title.as_deref()?;
    Some(match info.subtitle.as_deref() {
        Some(subtitle) if !subtitle.is_empty() => format!("{}, {}", title, subtitle),
        _ => title.to_string(),
    })
}

/// Lowercase alphanumerics separated by single spaces.
fn simplify(text: &str) -> String {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

fn to_fields(item: &Item) -> VolumeFields {
    let info = &item.volume_info;

    let isbn = info
        .industry_identifiers
        .iter()
        .find(|id| id.kind == "ISBN_13")
        .or_else(|| info.industry_identifiers.iter().find(|id| id.kind == "ISBN_10"))
        .map(|id| id.identifier.clone());

    let copyright_year = info
        .published_date
        .as_deref()
        .and_then(|d| d.get(..4))
        .and_then(|y| y.parse::<i32>().ok());

    VolumeFields {
        title: full_title(info),
        isbn,
        publisher: info.publisher.clone(),
        copyright_year,
        description: info.description.clone(),
        cover_url: info.image_links.as_ref().and_then(best_image),
        msrp: item.sale_info.as_ref().and_then(usd_price),
    }
}

fn best_image(links: &ImageLinks) -> Option<String> {
    [
        &links.extra_large,
        &links.large,
        &links.medium,
        &links.small,
        &links.thumbnail,
        &links.small_thumbnail,
    ]
    .into_iter()
    .flatten()
    .next()
    .map(|url| force_https(&url.replace("&edge=curl", "")))
}

fn usd_price(sale: &SaleInfo) -> Option<Decimal> {
    [&sale.list_price, &sale.retail_price]
        .into_iter()
        .flatten()
        .filter(|p| p.currency_code.as_deref() == Some("USD"))
        .find_map(|p| p.amount)
        .and_then(|amount| match Decimal::try_from(amount) {
            Ok(price) => Some(price.round_dp(2)),
            Err(e) => {
                warn!("Google Books: unusable price {}: {}", amount, e);
                None
            }
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    const FIXTURE: &str = r#"{
        "totalItems": 3,
        "items": [
            {
                "volumeInfo": {
                    "title": "Naruto, Vol. 2",
                    "publisher": "VIZ Media LLC",
                    "publishedDate": "2003-12-02",
                    "description": "The Worst Client",
                    "industryIdentifiers": [
                        {"type": "ISBN_10", "identifier": "1591161789"},
                        {"type": "ISBN_13", "identifier": "9781591161783"}
                    ],
                    "imageLinks": {
                        "smallThumbnail": "http://books.google.com/small.jpg",
                        "thumbnail": "http://books.google.com/thumb.jpg&edge=curl"
                    }
                },
                "saleInfo": {"listPrice": {"amount": 9.99, "currencyCode": "USD"}}
            },
            {
                "volumeInfo": {
                    "title": "Naruto",
                    "subtitle": "Vol. 1",
                    "publishedDate": "2003",
                    "industryIdentifiers": [{"type": "ISBN_10", "identifier": "1569319006"}]
                },
                "saleInfo": {"listPrice": {"amount": 12.5, "currencyCode": "CAD"}}
            },
            {
                "volumeInfo": {"title": "Boruto, Vol. 3"}
            }
        ]
    }"#;

    fn fixture() -> VolumesResponse {
        serde_json::from_str(FIXTURE).unwrap()
    }

    #[test]
    fn test_provider_id() {
        let provider = GoogleBooksProvider::new(None);
        assert_eq!(provider.id(), "GOOGLE_BOOKS");
    }

    #[test]
    fn test_capabilities_cover_every_field() {
        let provider = GoogleBooksProvider::new(Some("key".to_string()));
        let caps = provider.capabilities();
        assert!(caps.supports_series_query);
        assert!(!caps.series_query_exhaustive);
        assert_eq!(caps.fields.len(), Field::COUNT);
    }

    #[test]
    fn test_rate_limit() {
        let limit = GoogleBooksProvider::new(None).rate_limit();
        assert_eq!(limit.requests_per_minute, 60);
        assert_eq!(limit.effective_daily_quota(), Some(900));
    }

    #[test]
    fn test_find_volume_maps_all_fields() {
        let fields = find_volume(&fixture(), "Naruto", 2).unwrap();
        assert_eq!(fields.title.as_deref(), Some("Naruto, Vol. 2"));
        assert_eq!(fields.isbn.as_deref(), Some("9781591161783"));
        assert_eq!(fields.publisher.as_deref(), Some("VIZ Media LLC"));
        assert_eq!(fields.copyright_year, Some(2003));
        assert_eq!(
            fields.cover_url.as_deref(),
            Some("https://books.google.com/thumb.jpg")
        );
        assert_eq!(fields.msrp, Some(dec!(9.99)));
    }

    #[test]
    fn test_find_volume_uses_subtitle_and_ignores_non_usd_prices() {
        let fields = find_volume(&fixture(), "naruto", 1).unwrap();
        assert_eq!(fields.isbn.as_deref(), Some("1569319006"));
        assert!(fields.msrp.is_none());
        assert!(fields.cover_url.is_none());
    }

    #[test]
    fn test_find_volume_rejects_other_series() {
        assert!(find_volume(&fixture(), "Naruto", 3).is_none());
    }

    #[test]
    fn test_match_series_only_returns_requested_volumes() {
        let matched = match_series(&fixture(), "Naruto", &[1, 5]);
        assert_eq!(matched.len(), 1);
        assert_eq!(matched[0].0, 1);
    }

    #[test]
    fn test_empty_response_parses() {
        let response: VolumesResponse = serde_json::from_str(r#"{"totalItems": 0}"#).unwrap();
        assert!(response.items.is_empty());
    }
}
