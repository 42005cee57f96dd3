//! Remote era-file discovery.
//!
//! Two origin shapes are recognized from the URL: S3-style bucket endpoints
//! (paginated `ListObjectsV2` requests) and plain HTTP servers exposing an
//! index document whose era filenames are then HEAD-verified.

use std::collections::BTreeMap;
use std::time::Duration;

use futures::StreamExt;
use reqwest::{Client, ClientBuilder, Url};
use thiserror::Error;

use era_ingest_shared::networks::{EraFileName, Network};

use crate::download::backoff_delay;
use crate::prometheus_metrics::Service;

pub const DEFAULT_LIST_TIMEOUT: Duration = Duration::from_secs(60);
pub const DEFAULT_PROBE_CONCURRENCY: usize = 20;

/// Open-ended discovery stops after this many consecutive windows yielding
/// fewer than [`LOW_YIELD_THRESHOLD`] new files each.
const LOW_YIELD_WINDOWS: u32 = 3;
const LOW_YIELD_THRESHOLD: usize = 5;
const HTTP_PROBE_WINDOW: usize = 64;

/// `[start, end)`; `end = None` keeps discovering until the origin dries up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EraRange {
    pub start: u64,
    pub end: Option<u64>,
}

impl EraRange {
    pub fn new(start: u64, end: Option<u64>) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, era_number: u64) -> bool {
        era_number >= self.start && self.end.is_none_or(|end| era_number < end)
    }

    pub fn is_open(&self) -> bool {
        self.end.is_none()
    }
}

#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("listing {origin} failed after {attempts} attempts: {last_error}")]
    ListingFailed {
        origin: String,
        attempts: u32,
        last_error: String,
    },

    #[error("origin {0} serves no index document; point ERA_BASE_URL at an S3-style listing endpoint")]
    NoIndex(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OriginKind {
    S3Listing,
    HttpIndex,
}

/// `s3://` or an `s3`-labelled host selects the listing mode.
pub fn detect_origin_kind(origin: &Url) -> OriginKind {
    if origin.scheme() == "s3" {
        return OriginKind::S3Listing;
    }
    let is_s3_host = origin
        .host_str()
        .map(|host| {
            host.split('.')
                .any(|label| label == "s3" || label.starts_with("s3-"))
        })
        .unwrap_or(false);
    if is_s3_host {
        OriginKind::S3Listing
    } else {
        OriginKind::HttpIndex
    }
}

pub struct EraCatalog {
    http: Client,
    origin: Url,
    kind: OriginKind,
    network: Network,
    max_retries: u32,
    probe_concurrency: usize,
    metrics: Service,
}

impl EraCatalog {
    pub fn new(origin: Url, network: Network, max_retries: u32, metrics: Service) -> Self {
        let http = ClientBuilder::new()
            .timeout(DEFAULT_LIST_TIMEOUT)
            .build()
            .expect("Failed to create http client");
        let kind = detect_origin_kind(&origin);
        let origin = normalize_origin(origin);
        Self {
            http,
            origin,
            kind,
            network,
            max_retries: max_retries.max(1),
            probe_concurrency: DEFAULT_PROBE_CONCURRENCY,
            metrics,
        }
    }

    pub fn with_probe_concurrency(mut self, concurrency: usize) -> Self {
        self.probe_concurrency = concurrency.clamp(1, DEFAULT_PROBE_CONCURRENCY);
        self
    }

    pub fn origin_kind(&self) -> OriginKind {
        self.kind
    }

    /// Produces the ordered, deduplicated `(era_number, url)` pairs inside
    /// `range` that the origin can serve.
    pub async fn discover(&self, range: EraRange) -> Result<Vec<(u64, Url)>, DiscoveryError> {
        let entries = match self.kind {
            OriginKind::S3Listing => self.discover_s3(range).await?,
            OriginKind::HttpIndex => self.discover_http(range).await?,
        };
        tracing::info!(
            count = entries.len(),
            start = range.start,
            end = ?range.end,
            "Discovered era files"
        );
        Ok(entries)
    }

    async fn discover_s3(&self, range: EraRange) -> Result<Vec<(u64, Url)>, DiscoveryError> {
        let prefix = format!("{}-", self.network.as_str());
        let mut found: BTreeMap<u64, Url> = BTreeMap::new();
        let mut continuation: Option<String> = None;
        let mut policy = OpenWindowPolicy::default();

        loop {
            let mut url = self.origin.clone();
            {
                let mut query = url.query_pairs_mut();
                query.append_pair("list-type", "2");
                query.append_pair("prefix", &prefix);
                if let Some(token) = &continuation {
                    query.append_pair("continuation-token", token);
                }
            }
            let body = self.get_text_with_retries(url, "list_objects").await?;

            let mut new_in_window = 0usize;
            let mut past_range = false;
            for key in extract_tag_values(&body, "Key") {
                let Ok(name) = key.parse::<EraFileName>() else {
                    continue;
                };
                if range.end.is_some_and(|end| name.era_number >= end) {
                    // keys list in era order, nothing further can match
                    past_range = true;
                }
                if name.network != self.network || !range.contains(name.era_number) {
                    continue;
                }
                let Ok(file_url) = self.origin.join(key) else {
                    continue;
                };
                if found.insert(name.era_number, file_url).is_none() {
                    new_in_window += 1;
                }
            }

            let truncated = extract_tag_values(&body, "IsTruncated")
                .first()
                .is_some_and(|v| *v == "true");
            continuation = extract_tag_values(&body, "NextContinuationToken")
                .first()
                .map(|v| v.to_string());

            if past_range || !truncated || continuation.is_none() {
                break;
            }
            if range.is_open() && !policy.keep_going(new_in_window) {
                tracing::info!("Open-ended discovery dried up, stopping pagination");
                break;
            }
        }

        Ok(found.into_iter().collect())
    }

    async fn discover_http(&self, range: EraRange) -> Result<Vec<(u64, Url)>, DiscoveryError> {
        let index = self
            .get_text_with_retries(self.origin.clone(), "fetch_index")
            .await
            .map_err(|_| DiscoveryError::NoIndex(self.origin.to_string()))?;

        let listed = scan_filenames(&index, self.network);
        if listed.is_empty() {
            // a reachable page with no era filenames is not an index
            return Err(DiscoveryError::NoIndex(self.origin.to_string()));
        }
        let candidates: BTreeMap<u64, EraFileName> = listed
            .into_iter()
            .filter(|name| range.contains(name.era_number))
            .map(|name| (name.era_number, name))
            .collect();

        // HEAD-verify in bounded-parallel windows; an open range stops once
        // consecutive windows stop yielding.
        let mut confirmed: BTreeMap<u64, Url> = BTreeMap::new();
        let mut policy = OpenWindowPolicy::default();
        let candidates: Vec<EraFileName> = candidates.into_values().collect();
        for window in candidates.chunks(HTTP_PROBE_WINDOW) {
            let probes = futures::stream::iter(window.iter().cloned())
                .map(|name| {
                    let url = self.origin.join(&name.to_string());
                    async move {
                        let Ok(url) = url else { return None };
                        let ok = self
                            .http
                            .head(url.clone())
                            .send()
                            .await
                            .map(|response| response.status().is_success())
                            .unwrap_or(false);
                        ok.then_some((name.era_number, url))
                    }
                })
                .buffer_unordered(self.probe_concurrency.max(1))
                .collect::<Vec<_>>()
                .await;

            let confirmed_in_window = probes.into_iter().flatten().collect::<Vec<_>>();
            let new_in_window = confirmed_in_window.len();
            confirmed.extend(confirmed_in_window);
            if range.is_open() && !policy.keep_going(new_in_window) {
                tracing::info!("Open-ended probing dried up, stopping");
                break;
            }
        }

        Ok(confirmed.into_iter().collect())
    }

    async fn get_text_with_retries(
        &self,
        url: Url,
        operation: &'static str,
    ) -> Result<String, DiscoveryError> {
        self.metrics.call_count.with_label_values(&[operation]).inc();
        let timer = self
            .metrics
            .execution_time_seconds
            .with_label_values(&[operation])
            .start_timer();

        let mut last_error = String::new();
        for attempt in 0..self.max_retries {
            if attempt > 0 {
                self.metrics
                    .retry_count
                    .with_label_values(&[operation])
                    .set(attempt as u64);
                tokio::time::sleep(backoff_delay(attempt - 1)).await;
            }
            let outcome = self
                .http
                .get(url.clone())
                .send()
                .await
                .and_then(|response| response.error_for_status());
            match outcome {
                Ok(response) => match response.text().await {
                    Ok(text) => {
                        timer.observe_duration();
                        return Ok(text);
                    }
                    Err(e) => last_error = format!("reading body failed: {e}"),
                },
                Err(e) => last_error = format!("request failed: {e}"),
            }
            tracing::warn!(
                %url,
                attempt = attempt + 1,
                max = self.max_retries,
                "Discovery request failed: {last_error}"
            );
        }
        timer.observe_duration();
        Err(DiscoveryError::ListingFailed {
            origin: url.to_string(),
            attempts: self.max_retries,
            last_error,
        })
    }
}

/// Keeps a trailing slash so `Url::join` appends instead of replacing the
/// last path segment.
fn normalize_origin(mut origin: Url) -> Url {
    if !origin.path().ends_with('/') {
        let path = format!("{}/", origin.path());
        origin.set_path(&path);
    }
    origin
}

#[derive(Debug, Default)]
struct OpenWindowPolicy {
    low_yield_streak: u32,
}

impl OpenWindowPolicy {
    /// Registers a window's yield; false once the streak of low-yield
    /// windows reaches the cutoff.
    fn keep_going(&mut self, new_files: usize) -> bool {
        if new_files < LOW_YIELD_THRESHOLD {
            self.low_yield_streak += 1;
        } else {
            self.low_yield_streak = 0;
        }
        self.low_yield_streak < LOW_YIELD_WINDOWS
    }
}

/// Values of `<tag>...</tag>` occurrences, in order. Sufficient for the flat
/// ListObjectsV2 response shape.
fn extract_tag_values<'a>(body: &'a str, tag: &str) -> Vec<&'a str> {
    let open = format!("<{tag}>");
    let close = format!("</{tag}>");
    let mut values = Vec::new();
    let mut rest = body;
    while let Some(start) = rest.find(&open) {
        let after_open = &rest[start + open.len()..];
        let Some(end) = after_open.find(&close) else {
            break;
        };
        values.push(&after_open[..end]);
        rest = &after_open[end + close.len()..];
    }
    values
}

/// Era filenames for `network` appearing anywhere in a text document
/// (directory index, HTML listing), deduplicated in first-seen order.
fn scan_filenames(text: &str, network: Network) -> Vec<EraFileName> {
    let token = format!("{}-", network.as_str());
    let name_len = network.as_str().len() + "-00000-00000000.era".len();
    let mut seen = std::collections::HashSet::new();
    let mut names = Vec::new();
    let mut rest = text;
    while let Some(start) = rest.find(&token) {
        let candidate = &rest[start..];
        if let Some(chunk) = candidate.get(..name_len) {
            if let Ok(name) = chunk.parse::<EraFileName>() {
                if seen.insert(name.era_number) {
                    names.push(name);
                }
            }
        }
        rest = &rest[start + token.len()..];
    }
    names
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn origin_kind_detection() {
        let cases = [
            ("s3://era-bucket/gnosis", OriginKind::S3Listing),
            ("https://eras.s3.eu-central-1.amazonaws.com/", OriginKind::S3Listing),
            ("https://s3-eu-west-1.example.com/eras", OriginKind::S3Listing),
            ("https://era-files.example.org/gnosis/", OriginKind::HttpIndex),
        ];
        for (url, expected) in cases {
            assert_eq!(detect_origin_kind(&url.parse().unwrap()), expected, "{url}");
        }
    }

    #[test]
    fn tag_extraction_walks_all_occurrences() {
        let body = "<ListBucketResult><Key>gnosis-00001-aabbccdd.era</Key>\
                    <Key>gnosis-00002-aabbccdd.era</Key>\
                    <IsTruncated>false</IsTruncated></ListBucketResult>";
        assert_eq!(
            extract_tag_values(body, "Key"),
            vec!["gnosis-00001-aabbccdd.era", "gnosis-00002-aabbccdd.era"]
        );
        assert_eq!(extract_tag_values(body, "IsTruncated"), vec!["false"]);
        assert!(extract_tag_values(body, "NextContinuationToken").is_empty());
    }

    #[test]
    fn filename_scan_finds_names_in_html() {
        let index = r#"<html><a href="gnosis-01082-5e5fd8e1.era">gnosis-01082-5e5fd8e1.era</a>
            <a href="gnosis-01083-0102aabb.era">x</a> mainnet-00001-deadbeef.era</html>"#;
        let names = scan_filenames(index, Network::Gnosis);
        assert_eq!(names.len(), 2);
        assert_eq!(names[0].era_number, 1082);
        assert_eq!(names[1].era_number, 1083);
        assert_eq!(scan_filenames(index, Network::Mainnet).len(), 1);
    }

    #[test]
    fn open_window_policy_stops_after_three_dry_windows() {
        let mut policy = OpenWindowPolicy::default();
        assert!(policy.keep_going(100));
        assert!(policy.keep_going(4));
        assert!(policy.keep_going(0));
        assert!(!policy.keep_going(2));

        // a productive window resets the streak
        let mut policy = OpenWindowPolicy::default();
        assert!(policy.keep_going(1));
        assert!(policy.keep_going(1));
        assert!(policy.keep_going(50));
        assert!(policy.keep_going(1));
        assert!(policy.keep_going(1));
        assert!(!policy.keep_going(1));
    }

    #[test]
    fn era_range_bounds() {
        let closed = EraRange::new(10, Some(20));
        assert!(closed.contains(10));
        assert!(closed.contains(19));
        assert!(!closed.contains(20));
        assert!(!closed.contains(9));
        let open = EraRange::new(5, None);
        assert!(open.contains(1_000_000));
        assert!(!open.contains(4));
    }

    #[test]
    fn origin_normalization_keeps_join_appending() {
        let origin = normalize_origin("https://example.com/eras".parse().unwrap());
        assert_eq!(
            origin.join("gnosis-00001-aabbccdd.era").unwrap().as_str(),
            "https://example.com/eras/gnosis-00001-aabbccdd.era"
        );
    }
}
