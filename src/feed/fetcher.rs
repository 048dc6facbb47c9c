use std::time::Duration;

use reqwest::{Client, Response};
use tokio::time::timeout;
use tracing::debug;

use crate::error::{Error, Result};
use crate::feed::parser::FeedParser;
use crate::feed::{FeedSource, NewsItem};

/// Per-source fetch deadline. Expiry cancels only that source's request.
pub const FETCH_TIMEOUT: Duration = Duration::from_millis(6000);

/// Public CORS-bypass relay; the true feed endpoint travels url-encoded in
/// the `url` query parameter.
pub const DEFAULT_PROXY_URL: &str = "https://api.allorigins.win/raw";

/// Retrieves one source's raw document through the proxy and hands it to the
/// parser. No side effects beyond the network call: the cache and the merged
/// set belong to the orchestrator.
#[derive(Debug, Clone)]
pub struct SourceFetcher {
    client: Client,
    proxy_url: String,
    timeout_duration: Duration,
    user_agent: String,
}

impl Default for SourceFetcher {
    fn default() -> Self {
        Self::new()
    }
}

impl SourceFetcher {
    pub fn new() -> Self {
        let client = Client::builder()
            .redirect(reqwest::redirect::Policy::limited(10))
            .gzip(true)
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            proxy_url: DEFAULT_PROXY_URL.to_string(),
            timeout_duration: FETCH_TIMEOUT,
            user_agent: format!("newsdeck/{}", env!("CARGO_PKG_VERSION")),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_duration = timeout;
        self
    }

    pub fn with_proxy(mut self, proxy_url: String) -> Self {
        self.proxy_url = proxy_url;
        self
    }

    pub fn with_user_agent(mut self, user_agent: String) -> Self {
        self.user_agent = user_agent;
        self
    }

    /// Fetch and decode one source. Network failure, a non-2xx status, or
    /// deadline expiry fail this source only; the returned sequence may be
    /// empty but is never an error once a 2xx body has arrived.
    pub async fn fetch(&self, source: &FeedSource) -> Result<Vec<NewsItem>> {
        debug!(source = %source.name, url = %source.url, "fetching feed");

        let response = timeout(self.timeout_duration, self.fetch_response(&source.url))
            .await
            .map_err(|_| Error::Timeout(format!("Request for {} timed out", source.name)))?;

        let response = response?;

        if !response.status().is_success() {
            return Err(Error::Http(format!(
                "HTTP {} for {}: {}",
                response.status().as_u16(),
                source.name,
                response.status().canonical_reason().unwrap_or("Unknown error")
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| Error::Http(format!("Failed to read response body: {}", e)))?;

        debug!(source = %source.name, bytes = body.len(), "downloaded feed document");

        Ok(FeedParser::new().parse(&body, &source.name))
    }

    async fn fetch_response(&self, url: &str) -> Result<Response> {
        let response = self
            .client
            .get(&self.proxy_url)
            .query(&[("url", url)])
            .header("User-Agent", &self.user_agent)
            .header(
                "Accept",
                "application/rss+xml, application/atom+xml, application/xml, text/xml, */*",
            )
            .send()
            .await
            .map_err(|e| Error::Http(format!("Request failed: {}", e)))?;

        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const VALID_RSS_RESPONSE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0">
    <channel>
        <title>Test Feed</title>
        <item>
            <title>Test Article</title>
            <link>https://example.com/article</link>
            <description>Test article description</description>
            <pubDate>Fri, 15 Mar 2024 10:00:00 GMT</pubDate>
        </item>
    </channel>
</rss>"#;

    fn fetcher_for(server: &MockServer) -> SourceFetcher {
        SourceFetcher::new().with_proxy(format!("{}/raw", server.uri()))
    }

    #[tokio::test]
    async fn test_fetch_routes_through_proxy() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/raw"))
            .and(query_param("url", "https://feeds.example.com/news.xml"))
            .respond_with(ResponseTemplate::new(200).set_body_string(VALID_RSS_RESPONSE))
            .mount(&mock_server)
            .await;

        let source = FeedSource::new("Example", "https://feeds.example.com/news.xml");
        let items = fetcher_for(&mock_server).fetch(&source).await.unwrap();

        assert_eq!(items.len(), 1);
        assert_eq!(items[0].title, "Test Article");
        assert_eq!(items[0].source_name, "Example");
    }

    #[tokio::test]
    async fn test_fetch_non_success_status_is_unavailable() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/raw"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&mock_server)
            .await;

        let source = FeedSource::new("Down", "https://feeds.example.com/down.xml");
        let result = fetcher_for(&mock_server).fetch(&source).await;

        match result {
            Err(e) => {
                assert!(e.is_source_unavailable());
                assert!(e.to_string().contains("503"));
            }
            Ok(_) => panic!("Expected Http error"),
        }
    }

    #[tokio::test]
    async fn test_fetch_timeout_cancels_request() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/raw"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_delay(Duration::from_secs(5))
                    .set_body_string(VALID_RSS_RESPONSE),
            )
            .mount(&mock_server)
            .await;

        let source = FeedSource::new("Slow", "https://feeds.example.com/slow.xml");
        let fetcher = fetcher_for(&mock_server).with_timeout(Duration::from_millis(100));
        let result = fetcher.fetch(&source).await;

        match result {
            Err(Error::Timeout(msg)) => assert!(msg.contains("Slow")),
            other => panic!("Expected Timeout error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_fetch_malformed_body_yields_empty_sequence() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/raw"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<rss><item></wrong>"))
            .mount(&mock_server)
            .await;

        let source = FeedSource::new("Garbled", "https://feeds.example.com/garbled.xml");
        let items = fetcher_for(&mock_server).fetch(&source).await.unwrap();

        assert!(items.is_empty());
    }
}
