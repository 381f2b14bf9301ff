//! Upstream version discovery.
//!
//! The upstream release page is fetched once, every match of the app's
//! pattern contributes its first capture group as a candidate, and the
//! highest stable semantic version among the candidates wins.
//!
//! # Example
//!
//! ```
//! use release_comparer::resolver::select_latest;
//!
//! let latest = select_latest(["v2.1.0", "2_2_0", "1.9", "3.0.0-rc1"]).unwrap();
//! assert_eq!(latest.to_string(), "2.2.0");
//! ```

use crate::error::ResolveError;
use async_trait::async_trait;
use regex::Regex;
use semver::Version;
use std::time::Duration;

/// Fetches the body of an upstream page.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<String, ResolveError>;
}

/// [`PageFetcher`] backed by a `reqwest` client.
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        Self::from_builder(reqwest::Client::builder(), timeout)
    }

    /// Finishes `builder` with the request timeout and user agent.
    pub fn from_builder(
        builder: reqwest::ClientBuilder,
        timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        let client = builder
            .timeout(timeout)
            .user_agent(concat!("release-comparer/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<String, ResolveError> {
        let fetch_err = |reason: String| ResolveError::Fetch {
            url: url.to_string(),
            reason,
        };

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| fetch_err(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(fetch_err(format!("HTTP {}", status)));
        }

        response.text().await.map_err(|e| fetch_err(e.to_string()))
    }
}

/// Resolves the latest stable upstream version of an application.
pub struct VersionResolver {
    fetcher: Box<dyn PageFetcher>,
}

impl VersionResolver {
    pub fn new(fetcher: Box<dyn PageFetcher>) -> Self {
        Self { fetcher }
    }

    pub async fn resolve_latest_version(
        &self,
        url: &str,
        regex: &Regex,
    ) -> Result<Version, ResolveError> {
        tracing::info!("Fetching tags page from URL: {}", url);
        let body = self.fetcher.fetch(url).await?;

        let candidates = extract_candidates(&body, regex);
        tracing::debug!("Found {} version candidates at {}", candidates.len(), url);

        select_latest(candidates).ok_or_else(|| ResolveError::NoVersionFound {
            url: url.to_string(),
        })
    }
}

/// Collects the first capture group of every match in `body`.
pub fn extract_candidates(body: &str, regex: &Regex) -> Vec<String> {
    regex
        .captures_iter(body)
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .collect()
}

/// Strips one leading `v` and turns `_` separators into dots.
pub fn normalize_candidate(raw: &str) -> String {
    raw.strip_prefix('v').unwrap_or(raw).replace('_', ".")
}

/// Parses a candidate into a stable version.
///
/// Returns `None` for candidates with fewer than two dots, that are not
/// valid semver, or that carry a prerelease tag. Zero-padded numeric parts
/// are accepted and normalized, so `2024.01.15` parses as `2024.1.15`.
pub fn parse_stable(raw: &str) -> Option<Version> {
    let normalized = normalize_candidate(raw);
    if normalized.matches('.').count() < 2 {
        return None;
    }

    let version = Version::parse(&trim_leading_zeros(&normalized)).ok()?;
    if !version.pre.is_empty() {
        return None;
    }
    Some(version)
}

/// Drops leading zeros from the dot-separated core, leaving any
/// prerelease or build suffix untouched.
fn trim_leading_zeros(version: &str) -> String {
    let core_end = version.find(['-', '+']).unwrap_or(version.len());
    let (core, suffix) = version.split_at(core_end);

    let core = core
        .split('.')
        .map(|part| match part.trim_start_matches('0') {
            "" if !part.is_empty() => "0",
            trimmed => trimmed,
        })
        .collect::<Vec<_>>()
        .join(".");

    format!("{}{}", core, suffix)
}

/// Picks the highest stable version among raw candidates.
pub fn select_latest<I, S>(candidates: I) -> Option<Version>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    candidates
        .into_iter()
        .filter_map(|raw| parse_stable(raw.as_ref()))
        .max()
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::collections::HashMap;

    /// Serves fixed bodies; unknown URLs fail like a 404.
    #[derive(Default)]
    pub(crate) struct StaticFetcher {
        pages: HashMap<String, String>,
    }

    impl StaticFetcher {
        pub(crate) fn new() -> Self {
            Self::default()
        }

        pub(crate) fn page(mut self, url: &str, body: &str) -> Self {
            self.pages.insert(url.to_string(), body.to_string());
            self
        }
    }

    #[async_trait]
    impl PageFetcher for StaticFetcher {
        async fn fetch(&self, url: &str) -> Result<String, ResolveError> {
            self.pages
                .get(url)
                .cloned()
                .ok_or_else(|| ResolveError::Fetch {
                    url: url.to_string(),
                    reason: "HTTP 404 Not Found".to_string(),
                })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::StaticFetcher;
    use super::*;

    #[test]
    fn test_select_latest_example() {
        let latest = select_latest(["v2.1.0", "2_2_0", "1.9", "3.0.0-rc1"]).unwrap();
        assert_eq!(latest, Version::new(2, 2, 0));
    }

    #[test]
    fn test_normalize_candidate() {
        assert_eq!(normalize_candidate("v1.2.3"), "1.2.3");
        assert_eq!(normalize_candidate("3_3_6"), "3.3.6");
        // only one leading v is stripped
        assert_eq!(normalize_candidate("vv1.2.3"), "v1.2.3");
    }

    #[test]
    fn test_parse_stable_rejections() {
        assert!(parse_stable("1.9").is_none());
        assert!(parse_stable("7").is_none());
        assert!(parse_stable("1.2.3-beta.1").is_none());
        assert!(parse_stable("1.2.x").is_none());
        assert!(parse_stable("1.2.3.4").is_none());
        assert_eq!(parse_stable("v10.0.1"), Some(Version::new(10, 0, 1)));
    }

    #[test]
    fn test_zero_padded_parts_are_normalized() {
        let latest = select_latest(["2024.01.15", "2023.12.30"]).unwrap();
        assert_eq!(latest, Version::new(2024, 1, 15));
        assert_eq!(latest.to_string(), "2024.1.15");

        assert_eq!(parse_stable("v1.00.007"), Some(Version::new(1, 0, 7)));
        assert_eq!(
            parse_stable("1.02.3+build.01").map(|v| v.to_string()),
            Some("1.2.3+build.01".to_string())
        );
        // a padded prerelease is still a prerelease
        assert!(parse_stable("1.02.3-01").is_none());
        assert!(parse_stable("1..3").is_none());
    }

    #[test]
    fn test_semver_precedence_not_lexical() {
        let latest = select_latest(["1.9.0", "1.10.0", "1.2.30"]).unwrap();
        assert_eq!(latest, Version::new(1, 10, 0));
    }

    #[test]
    fn test_build_metadata_kept() {
        let latest = select_latest(["1.0.0+build.5", "0.9.9"]).unwrap();
        assert_eq!(latest.to_string(), "1.0.0+build.5");
    }

    #[test]
    fn test_select_latest_empty() {
        assert!(select_latest(Vec::<String>::new()).is_none());
        assert!(select_latest(["1.0", "2.0.0-alpha"]).is_none());
    }

    #[test]
    fn test_extract_candidates_first_group() {
        let re = Regex::new(r"tag/(v?\d+[._]\d+[._]\d+)(-\w+)?").unwrap();
        let body = r#"<a href="/tag/v1.2.3">x</a> <a href="/tag/2_0_1-rc">y</a>"#;
        assert_eq!(extract_candidates(body, &re), vec!["v1.2.3", "2_0_1"]);
    }

    #[test]
    fn test_extract_candidates_skips_unmatched_group() {
        let re = Regex::new(r"release (\d+\.\d+\.\d+)|nightly").unwrap();
        let body = "nightly release 1.0.0 nightly";
        assert_eq!(extract_candidates(body, &re), vec!["1.0.0"]);
    }

    #[tokio::test]
    async fn test_resolve_latest_version() {
        let fetcher = StaticFetcher::new().page(
            "https://example.com/tags",
            "ruby_3_3_6 ruby_3_4_0 ruby_3_5_0-preview1 ruby_3_6",
        );
        let resolver = VersionResolver::new(Box::new(fetcher));
        let re = Regex::new(r"ruby_(\d+(?:_\d+)+(?:-\w+)?)").unwrap();

        let version = resolver
            .resolve_latest_version("https://example.com/tags", &re)
            .await
            .unwrap();
        assert_eq!(version, Version::new(3, 4, 0));
    }

    #[tokio::test]
    async fn test_resolve_no_version_found() {
        let fetcher = StaticFetcher::new().page("https://example.com", "nothing here 1.2");
        let resolver = VersionResolver::new(Box::new(fetcher));
        let re = Regex::new(r"(\d+\.\d+)").unwrap();

        let err = resolver
            .resolve_latest_version("https://example.com", &re)
            .await
            .unwrap_err();
        assert!(matches!(err, ResolveError::NoVersionFound { .. }));
    }

    /// Serves one connection on a local port, answering with `response`
    /// after `delay`.
    async fn serve_once(response: String, delay: Duration) -> String {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 1024];
            while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&buf[..n]);
            }
            tokio::time::sleep(delay).await;
            let _ = socket.write_all(response.as_bytes()).await;
            let _ = socket.shutdown().await;
        });

        format!("http://{}/tags", addr)
    }

    fn local_fetcher(timeout: Duration) -> HttpFetcher {
        HttpFetcher::from_builder(reqwest::Client::builder().no_proxy(), timeout).unwrap()
    }

    #[tokio::test]
    async fn test_http_fetcher_returns_body() {
        let body = "<a href=\"/tag/v1.2.3\">v1.2.3</a>";
        let url = serve_once(
            format!(
                "HTTP/1.1 200 OK\r\nContent-Type: text/html\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                body.len(),
                body
            ),
            Duration::ZERO,
        )
        .await;

        let fetched = local_fetcher(Duration::from_secs(5)).fetch(&url).await.unwrap();
        assert_eq!(fetched, body);
    }

    #[tokio::test]
    async fn test_http_fetcher_rejects_error_status() {
        let url = serve_once(
            "HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n"
                .to_string(),
            Duration::ZERO,
        )
        .await;

        let err = local_fetcher(Duration::from_secs(5))
            .fetch(&url)
            .await
            .unwrap_err();
        match err {
            ResolveError::Fetch { url: failed, reason } => {
                assert_eq!(failed, url);
                assert!(reason.contains("404"), "{reason}");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_http_fetcher_times_out() {
        let url = serve_once(
            "HTTP/1.1 200 OK\r\nContent-Length: 0\r\n\r\n".to_string(),
            Duration::from_secs(5),
        )
        .await;

        let err = local_fetcher(Duration::from_millis(200))
            .fetch(&url)
            .await
            .unwrap_err();
        assert!(matches!(err, ResolveError::Fetch { .. }));
    }

    #[tokio::test]
    async fn test_resolve_fetch_error() {
        let resolver = VersionResolver::new(Box::new(StaticFetcher::new()));
        let re = Regex::new(r"(\d+)").unwrap();

        let err = resolver
            .resolve_latest_version("https://missing.example.com", &re)
            .await
            .unwrap_err();
        assert!(matches!(err, ResolveError::Fetch { .. }));
    }
}
