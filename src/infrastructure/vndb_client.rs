//! VNDB Kana API client
//!
//! Implements `CatalogSource` over `GET /stats` and `POST /vn`. Requests are
//! paced by a governor quota on top of the driver's window throttle.

use async_trait::async_trait;
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use std::num::NonZeroU32;
use std::time::Duration;
use tracing::debug;
use url::Url;

use crate::domain::catalog_record::RemoteItem;
use crate::domain::repositories::CatalogSource;
use crate::infrastructure::config::RemoteConfig;
use crate::sync_engine::error::RemoteError;

/// Fields requested for every visual novel.
pub const VN_FIELDS: &str = "id, title, aliases, length, rating, description, image.url";

pub struct VndbClient {
    client: Client,
    rate_limiter: RateLimiter<NotKeyed, InMemoryState, DefaultClock>,
    stats_url: Url,
    vn_url: Url,
}

impl VndbClient {
    pub fn new(config: &RemoteConfig) -> Result<Self, RemoteError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&config.user_agent)
                .map_err(|e| RemoteError::Transport(format!("Invalid user agent: {e}")))?,
        );

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .default_headers(headers)
            .build()
            .map_err(|e| RemoteError::Transport(format!("Failed to create HTTP client: {e}")))?;

        let quota = Quota::per_second(
            NonZeroU32::new(config.max_requests_per_second)
                .ok_or_else(|| RemoteError::Transport("Rate limit must be greater than 0".to_string()))?,
        );

        // Trailing slash so join() appends instead of replacing the last segment
        let base = format!("{}/", config.base_url.trim_end_matches('/'));
        let base = Url::parse(&base).map_err(|e| RemoteError::Transport(format!("Invalid base URL {base}: {e}")))?;
        let join = |path: &str| {
            base.join(path)
                .map_err(|e| RemoteError::Transport(format!("Invalid endpoint {path}: {e}")))
        };

        Ok(Self {
            client,
            rate_limiter: RateLimiter::direct(quota),
            stats_url: join("stats")?,
            vn_url: join("vn")?,
        })
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<Value, RemoteError> {
        self.rate_limiter.until_ready().await;

        let response = request.send().await.map_err(transport_error)?;
        let status = response.status();
        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_default()
                .chars()
                .take(200)
                .collect::<String>();
            return Err(RemoteError::Status {
                status: status.as_u16(),
                message,
            });
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| RemoteError::Malformed(format!("response body is not JSON: {e}")))
    }
}

#[async_trait]
impl CatalogSource for VndbClient {
    async fn count(&self) -> Result<u64, RemoteError> {
        debug!("GET {}", self.stats_url);
        let body = self.send(self.client.get(self.stats_url.clone())).await?;
        parse_stats(&body)
    }

    async fn fetch_by_codes(&self, codes: &[u32]) -> Result<Vec<RemoteItem>, RemoteError> {
        if codes.is_empty() {
            return Ok(Vec::new());
        }

        let query = json!({
            "filters": build_filters(codes),
            "fields": VN_FIELDS,
            "sort": "id",
            "results": codes.len(),
        });
        debug!("POST {} for {} codes", self.vn_url, codes.len());

        let body = self.send(self.client.post(self.vn_url.clone()).json(&query)).await?;
        parse_results(&body)
    }
}

fn transport_error(error: reqwest::Error) -> RemoteError {
    match error.status() {
        Some(status) => RemoteError::Status {
            status: status.as_u16(),
            message: error.to_string(),
        },
        None => RemoteError::Transport(error.to_string()),
    }
}

/// Kana filter for `codes`: a range when contiguous, an id list otherwise.
pub fn build_filters(codes: &[u32]) -> Value {
    let contiguous = codes.windows(2).all(|pair| pair[1] == pair[0] + 1);
    match (codes.first(), codes.last()) {
        (Some(first), Some(last)) if contiguous && first != last => json!([
            "and",
            ["id", ">=", format!("v{first}")],
            ["id", "<=", format!("v{last}")]
        ]),
        (Some(only), Some(_)) if codes.len() == 1 => json!(["id", "=", format!("v{only}")]),
        _ => {
            let mut filters = vec![json!("or")];
            filters.extend(codes.iter().map(|code| json!(["id", "=", format!("v{code}")])));
            Value::Array(filters)
        }
    }
}

/// Parse a VNDB id such as `"v17"` into its code.
pub fn parse_code(id: &str) -> Result<u32, RemoteError> {
    id.strip_prefix('v')
        .and_then(|digits| digits.parse::<u32>().ok())
        .filter(|&code| code > 0)
        .ok_or_else(|| RemoteError::Malformed(format!("unrecognised id {id:?}")))
}

fn parse_stats(body: &Value) -> Result<u64, RemoteError> {
    body.get("vn")
        .and_then(Value::as_u64)
        .ok_or_else(|| RemoteError::Malformed("stats response has no integer `vn` field".to_string()))
}

#[derive(Debug, Deserialize)]
struct VnImage {
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct VnResult {
    id: String,
    title: String,
    #[serde(default)]
    aliases: Option<Vec<String>>,
    #[serde(default)]
    length: Option<f64>,
    #[serde(default)]
    rating: Option<f64>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    image: Option<VnImage>,
}

#[derive(Debug, Deserialize)]
struct VnResponse {
    results: Vec<VnResult>,
}

fn parse_results(body: &Value) -> Result<Vec<RemoteItem>, RemoteError> {
    let response = VnResponse::deserialize(body)
        .map_err(|e| RemoteError::Malformed(format!("unexpected /vn response: {e}")))?;

    let mut items = response
        .results
        .into_iter()
        .map(|result| {
            Ok(RemoteItem {
                code: parse_code(&result.id)?,
                title: result.title,
                aliases: result.aliases,
                length: result.length,
                rating: result.rating,
                description: result.description,
                image_url: result.image.and_then(|image| image.url),
            })
        })
        .collect::<Result<Vec<_>, RemoteError>>()?;
    items.sort_by_key(|item| item.code);
    Ok(items)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_contiguous_codes_use_range_filter() {
        let filters = build_filters(&[21, 22, 23, 24, 25, 26, 27, 28, 29, 30]);
        assert_eq!(filters, json!(["and", ["id", ">=", "v21"], ["id", "<=", "v30"]]));
    }

    #[test]
    fn test_scattered_codes_use_id_list() {
        let filters = build_filters(&[22, 25, 26]);
        assert_eq!(
            filters,
            json!(["or", ["id", "=", "v22"], ["id", "=", "v25"], ["id", "=", "v26"]])
        );
    }

    #[test]
    fn test_single_code_filter() {
        assert_eq!(build_filters(&[7]), json!(["id", "=", "v7"]));
    }

    #[rstest]
    #[case("v17", Some(17))]
    #[case("v1", Some(1))]
    #[case("v0", None)]
    #[case("17", None)]
    #[case("r17", None)]
    #[case("v", None)]
    fn test_parse_code(#[case] id: &str, #[case] expected: Option<u32>) {
        assert_eq!(parse_code(id).ok(), expected);
    }

    #[test]
    fn test_stats_requires_vn_field() {
        assert_eq!(parse_stats(&json!({"vn": 51234, "releases": 9})).unwrap(), 51234);
        assert!(matches!(
            parse_stats(&json!({"releases": 9})),
            Err(RemoteError::Malformed(_))
        ));
        assert!(matches!(
            parse_stats(&json!({"vn": "many"})),
            Err(RemoteError::Malformed(_))
        ));
    }

    #[test]
    fn test_results_are_mapped_and_sorted() {
        let body = json!({
            "more": false,
            "results": [
                {"id": "v23", "title": "Later", "aliases": [], "length": null, "rating": null,
                 "description": null, "image": null},
                {"id": "v21", "title": "Earlier", "aliases": ["Alt"], "length": 3, "rating": 7.25,
                 "description": "Plot.", "image": {"url": "https://t.vndb.org/cv/21.jpg"}}
            ]
        });

        let items = parse_results(&body).unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].code, 21);
        assert_eq!(items[0].aliases, Some(vec!["Alt".to_string()]));
        assert_eq!(items[0].length, Some(3.0));
        assert_eq!(items[0].image_url.as_deref(), Some("https://t.vndb.org/cv/21.jpg"));
        assert_eq!(items[1].code, 23);
        assert_eq!(items[1].description, None);
    }

    #[test]
    fn test_bad_id_in_results_is_malformed() {
        let body = json!({"results": [{"id": "x1", "title": "?"}]});
        assert!(matches!(parse_results(&body), Err(RemoteError::Malformed(_))));
    }

    #[test]
    fn test_client_creation() {
        let client = VndbClient::new(&RemoteConfig::default()).unwrap();
        assert_eq!(client.stats_url.as_str(), "https://api.vndb.org/kana/stats");
        assert_eq!(client.vn_url.as_str(), "https://api.vndb.org/kana/vn");
    }

    #[test]
    fn test_zero_rate_limit_is_rejected() {
        let config = RemoteConfig {
            max_requests_per_second: 0,
            ..RemoteConfig::default()
        };
        assert!(VndbClient::new(&config).is_err());
    }
}
