// src/fetch/mod.rs

use anyhow::{Context, Result};
use reqwest::blocking::{Client, ClientBuilder};
use tracing::{debug, info, instrument};
use url::Url;

/// Client settings for the feed fetch. reqwest's blocking client gives up
/// after 30s by default; the feed is large and a slow link must wait it out.
pub fn feed_client_builder() -> ClientBuilder {
    Client::builder().timeout(None)
}

pub fn feed_client() -> Result<Client> {
    feed_client_builder()
        .build()
        .context("building HTTP client for the certificate feed")
}

/// One GET of the feed; the whole body comes back as text.
///
/// There is no retry: any transport error or non-success status is returned
/// to the caller, which aborts the build.
#[instrument(level = "info", skip(client), fields(url = %url))]
pub fn fetch_feed(client: &Client, url: &Url) -> Result<String> {
    debug!("fetching feed");
    let body = client
        .get(url.clone())
        .send()
        .with_context(|| format!("GET {}", url))?
        .error_for_status()
        .with_context(|| format!("Non-success status {}", url))?
        .text()
        .with_context(|| format!("reading body from {}", url))?;
    info!(bytes = body.len(), "fetched feed");
    Ok(body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const FEED: &str = "Name,PEM Info\nAcme,'x'\n";

    /// The blocking client must stay off the async runtime threads.
    async fn fetch_blocking(url: Url) -> Result<String> {
        tokio::task::spawn_blocking(move || {
            let client = feed_client_builder().no_proxy().build()?;
            fetch_feed(&client, &url)
        })
        .await?
    }

    fn feed_url(server: &MockServer) -> Url {
        Url::parse(&format!("{}/feed.csv", server.uri())).unwrap()
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn returns_body_with_a_single_get() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/feed.csv"))
            .respond_with(ResponseTemplate::new(200).set_body_string(FEED))
            .expect(1)
            .mount(&server)
            .await;

        let body = fetch_blocking(feed_url(&server)).await.unwrap();
        assert_eq!(body, FEED);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn http_error_is_fatal_and_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/feed.csv"))
            .respond_with(ResponseTemplate::new(503).set_body_string("down"))
            .expect(1)
            .mount(&server)
            .await;

        let err = fetch_blocking(feed_url(&server)).await.unwrap_err();
        assert!(format!("{:#}", err).contains("Non-success status"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn connection_error_is_fatal() {
        // nothing listens on the tcpmux port
        let url = Url::parse("http://127.0.0.1:1/feed.csv").unwrap();
        let err = fetch_blocking(url).await.unwrap_err();
        assert!(format!("{:#}", err).starts_with("GET "));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn slow_feed_is_not_cut_off_at_thirty_seconds() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/feed.csv"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(FEED)
                    .set_delay(Duration::from_secs(32)),
            )
            .expect(1)
            .mount(&server)
            .await;

        let start = Instant::now();
        let body = fetch_blocking(feed_url(&server)).await.unwrap();
        assert_eq!(body, FEED);
        assert!(start.elapsed() >= Duration::from_secs(32));
    }
}
