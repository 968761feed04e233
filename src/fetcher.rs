//! Image fetching with a strategy cascade.
//!
//! Image hosts routinely refuse hotlinked requests, so no single request
//! shape is trusted: a cookie-carrying client goes first, a bare request
//! object second, and a 1x1 GIF stands in when both give up.

use crate::helpers::url_origin;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, CACHE_CONTROL, REFERER};
use reqwest::{Client, ClientBuilder, Method, Request, StatusCode, Url};
use std::future::Future;
use std::time::Duration;
use tokio::time::timeout;

/// Minimal valid 1x1 GIF inserted when every strategy fails
pub const PLACEHOLDER_GIF: [u8; 43] = [
    0x47, 0x49, 0x46, 0x38, 0x39, 0x61, 0x01, 0x00, 0x01, 0x00, 0x80, 0x00, 0x00, 0xFF, 0xFF,
    0xFF, 0x00, 0x00, 0x00, 0x21, 0xF9, 0x04, 0x01, 0x00, 0x00, 0x00, 0x00, 0x2C, 0x00, 0x00,
    0x00, 0x00, 0x01, 0x00, 0x01, 0x00, 0x00, 0x02, 0x02, 0x44, 0x01, 0x00, 0x3B,
];

const IMAGE_ACCEPT: &str = "image/jpeg, image/png, image/webp, image/*";

/// Result of fetching one image
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    Fetched(Vec<u8>),
    /// Every strategy failed; the slot gets [`PLACEHOLDER_GIF`]
    Placeholder,
}

impl FetchOutcome {
    pub fn is_placeholder(&self) -> bool {
        matches!(self, FetchOutcome::Placeholder)
    }

    /// Bytes to store in the archive slot
    pub fn into_bytes(self) -> Vec<u8> {
        match self {
            FetchOutcome::Fetched(bytes) => bytes,
            FetchOutcome::Placeholder => PLACEHOLDER_GIF.to_vec(),
        }
    }
}

/// Source of image bytes for the archive builder. Never fails outright.
pub trait ImageFetch: Send + Sync {
    fn fetch(&self, url: &str) -> impl Future<Output = FetchOutcome> + Send;
}

/// Two-strategy HTTP fetcher, each strategy bounded by its own timeout
#[derive(Clone)]
pub struct ResilientFetcher {
    primary: Client,
    secondary: Client,
    timeout: Duration,
}

impl ResilientFetcher {
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let primary = ClientBuilder::new()
            .cookie_store(true)
            .gzip(true)
            .brotli(true)
            .timeout(timeout)
            .build()?;
        let secondary = ClientBuilder::new().timeout(timeout).build()?;

        Ok(Self {
            primary,
            secondary,
            timeout,
        })
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Image Accept, `no-cache`, and a Referer of the image's origin
    fn image_headers(url: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static(IMAGE_ACCEPT));
        headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
        if let Some(value) = url_origin(url).and_then(|o| HeaderValue::from_str(&o).ok()) {
            headers.insert(REFERER, value);
        }
        headers
    }

    /// Cookie-carrying request. The status is not inspected; any non-empty
    /// body counts as success.
    pub async fn fetch_primary(&self, url: &str) -> Option<Vec<u8>> {
        log::debug!("Trying direct fetch for: {}", url);
        let attempt = async {
            let resp = self
                .primary
                .get(url)
                .headers(Self::image_headers(url))
                .send()
                .await?;
            resp.bytes().await
        };

        match timeout(self.timeout, attempt).await {
            Ok(Ok(bytes)) if !bytes.is_empty() => {
                log::debug!("Direct fetch succeeded for: {}", url);
                Some(bytes.to_vec())
            }
            Ok(Ok(_)) => {
                log::warn!("Direct fetch returned empty body for: {}", url);
                None
            }
            Ok(Err(e)) => {
                log::warn!("Direct fetch failed for {}: {}", url, e);
                None
            }
            Err(_) => {
                log::warn!("Direct fetch timed out for: {}", url);
                None
            }
        }
    }

    /// Hand-built request on a cookieless client; requires a 200 and a body
    pub async fn fetch_secondary(&self, url: &str) -> Option<Vec<u8>> {
        log::debug!("Trying request-object fetch for: {}", url);
        let parsed = match Url::parse(url) {
            Ok(u) => u,
            Err(e) => {
                log::warn!("Request-object fetch skipped, bad URL {}: {}", url, e);
                return None;
            }
        };

        let mut request = Request::new(Method::GET, parsed);
        *request.headers_mut() = Self::image_headers(url);

        let attempt = async {
            let resp = self.secondary.execute(request).await?;
            let status = resp.status();
            resp.bytes().await.map(|bytes| (status, bytes))
        };

        match timeout(self.timeout, attempt).await {
            Ok(Ok((status, bytes))) if status == StatusCode::OK && !bytes.is_empty() => {
                log::debug!("Request-object fetch succeeded for: {}", url);
                Some(bytes.to_vec())
            }
            Ok(Ok((status, _))) => {
                log::warn!("Request-object fetch got {} or empty body for: {}", status, url);
                None
            }
            Ok(Err(e)) => {
                log::warn!("Request-object fetch failed for {}: {}", url, e);
                None
            }
            Err(_) => {
                log::warn!("Request-object fetch timed out for: {}", url);
                None
            }
        }
    }
}

impl ImageFetch for ResilientFetcher {
    async fn fetch(&self, url: &str) -> FetchOutcome {
        if let Some(bytes) = self.fetch_primary(url).await {
            return FetchOutcome::Fetched(bytes);
        }
        if let Some(bytes) = self.fetch_secondary(url).await {
            return FetchOutcome::Fetched(bytes);
        }
        log::error!("All fetch methods failed for: {}, using placeholder", url);
        FetchOutcome::Placeholder
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// `/ok` serves image bytes, `/empty` an empty 200, `/hang` never answers,
    /// anything else a 404. Raw requests are recorded.
    async fn image_server() -> (String, Arc<Mutex<Vec<String>>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let recorded = seen.clone();
        tokio::spawn(async move {
            loop {
                let Ok((mut sock, _)) = listener.accept().await else {
                    return;
                };
                let recorded = recorded.clone();
                tokio::spawn(async move {
                    let mut buf = [0u8; 4096];
                    let n = sock.read(&mut buf).await.unwrap_or(0);
                    let req = String::from_utf8_lossy(&buf[..n]).to_string();
                    recorded.lock().unwrap().push(req.clone());
                    let path = req.split_whitespace().nth(1).unwrap_or("/").to_string();
                    let resp: Vec<u8> = match path.as_str() {
                        "/ok" => {
                            let mut r = b"HTTP/1.1 200 OK\r\nContent-Type: image/jpeg\r\nContent-Length: 4\r\nConnection: close\r\n\r\n".to_vec();
                            r.extend_from_slice(&[0xFF, 0xD8, 0xFF, 0xD9]);
                            r
                        }
                        "/empty" => b"HTTP/1.1 200 OK\r\nContent-Length: 0\r\nConnection: close\r\n\r\n".to_vec(),
                        "/hang" => {
                            tokio::time::sleep(Duration::from_secs(30)).await;
                            return;
                        }
                        _ => b"HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n".to_vec(),
                    };
                    let _ = sock.write_all(&resp).await;
                    let _ = sock.shutdown().await;
                });
            }
        });
        (format!("http://{}", addr), seen)
    }

    #[test]
    fn test_placeholder_is_a_gif() {
        assert_eq!(&PLACEHOLDER_GIF[..6], b"GIF89a");
        assert_eq!(PLACEHOLDER_GIF[PLACEHOLDER_GIF.len() - 1], 0x3B);
        assert_eq!(FetchOutcome::Placeholder.into_bytes(), PLACEHOLDER_GIF.to_vec());
    }

    #[tokio::test]
    async fn test_fetch_success_sends_spoofed_headers() {
        let (base, seen) = image_server().await;
        let fetcher = ResilientFetcher::new(Duration::from_secs(5)).unwrap();

        let outcome = fetcher.fetch(&format!("{}/ok", base)).await;
        assert_eq!(outcome, FetchOutcome::Fetched(vec![0xFF, 0xD8, 0xFF, 0xD9]));

        let requests = seen.lock().unwrap().join("\n").to_lowercase();
        assert!(requests.contains(&format!("referer: {}", base)));
        assert!(requests.contains("accept: image/jpeg"));
        assert!(requests.contains("cache-control: no-cache"));
    }

    #[tokio::test]
    async fn test_missing_image_becomes_placeholder() {
        let (base, seen) = image_server().await;
        let fetcher = ResilientFetcher::new(Duration::from_secs(5)).unwrap();

        let outcome = fetcher.fetch(&format!("{}/gone", base)).await;
        assert!(outcome.is_placeholder());
        // both strategies were tried
        assert_eq!(seen.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_empty_body_is_not_success() {
        let (base, _) = image_server().await;
        let fetcher = ResilientFetcher::new(Duration::from_secs(5)).unwrap();
        assert!(fetcher.fetch(&format!("{}/empty", base)).await.is_placeholder());
    }

    #[tokio::test]
    async fn test_each_strategy_is_time_bounded() {
        let (base, _) = image_server().await;
        let fetcher = ResilientFetcher::new(Duration::from_millis(200)).unwrap();
        let started = std::time::Instant::now();
        assert!(fetcher.fetch(&format!("{}/hang", base)).await.is_placeholder());
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
