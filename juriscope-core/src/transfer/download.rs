//! Streaming file download with progress and retry

use super::{Result, TransferConfig, TransferError};
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, warn};

/// Size used for progress when the server sends no `Content-Length`
pub fn estimated_size(file_name: &str) -> u64 {
    match file_name {
        "legis-embeddings.json" => 120_000_000,
        "juris-embeddings.json" => 180_000_000,
        "legis-data.json" => 25_000_000,
        "juris-data.json" => 40_000_000,
        _ => 50_000_000,
    }
}

/// Turns received byte counts into progress fractions.
///
/// Reported progress stays below 1.0 until the caller reports completion,
/// even when the estimate turns out too small.
#[derive(Debug, Clone)]
pub struct ProgressTracker {
    total: u64,
    received: u64,
}

impl ProgressTracker {
    pub fn new(content_length: Option<u64>, file_name: &str) -> Self {
        Self {
            total: content_length
                .filter(|&len| len > 0)
                .unwrap_or_else(|| estimated_size(file_name)),
            received: 0,
        }
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn received(&self) -> u64 {
        self.received
    }

    /// Record a chunk and return the progress to report
    pub fn advance(&mut self, bytes: usize) -> f64 {
        self.received += bytes as u64;
        (self.received as f64 / self.total as f64).min(0.99)
    }
}

/// Fetches files from the CDN proxy
#[derive(Debug, Clone)]
pub struct Downloader {
    client: Client,
    proxy_url: String,
    max_retries: u32,
    backoff_base: Duration,
}

impl Downloader {
    pub fn new(config: &TransferConfig) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            client,
            proxy_url: config.proxy_url.clone(),
            max_retries: config.max_retries.max(1),
            backoff_base: config.backoff_base,
        })
    }

    /// Delay before retry number `attempt` (1-based)
    fn retry_delay(&self, attempt: u32) -> Duration {
        self.backoff_base
            .saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1)))
    }

    /// Download a file as text, retrying with exponential backoff.
    ///
    /// `on_progress` receives fractions in `[0, 0.99]` while streaming and
    /// exactly `1.0` once the body is complete. Reported values never go
    /// backwards, also across retries. The last attempt's error is returned.
    pub async fn download_file<P>(&self, file_name: &str, mut on_progress: P) -> Result<String>
    where
        P: FnMut(f64) + Send,
    {
        let mut reported = 0.0_f64;
        let mut forward = |p: f64| {
            if p > reported {
                reported = p;
                on_progress(p);
            }
        };

        let mut attempt = 1;
        loop {
            match self.fetch(file_name, &mut forward).await {
                Ok(body) => return Ok(body),
                Err(e) if attempt < self.max_retries => {
                    let delay = self.retry_delay(attempt);
                    warn!(
                        file = file_name,
                        attempt,
                        ?delay,
                        error = %e,
                        "download failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn fetch<P>(&self, file_name: &str, on_progress: &mut P) -> Result<String>
    where
        P: FnMut(f64) + Send,
    {
        let mut response = self
            .client
            .get(&self.proxy_url)
            .query(&[("file", file_name)])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransferError::Status(status.as_u16()));
        }

        let mut tracker = ProgressTracker::new(response.content_length(), file_name);
        let mut body = Vec::new();
        while let Some(chunk) = response.chunk().await? {
            body.extend_from_slice(&chunk);
            on_progress(tracker.advance(chunk.len()));
        }
        let text = String::from_utf8(body)
            .map_err(|e| TransferError::InvalidFormat(format!("{file_name} is not UTF-8: {e}")))?;
        on_progress(1.0);
        debug!(file = file_name, bytes = tracker.received(), "download complete");
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use wiremock::matchers::{method, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    /// Serve one canned raw HTTP response per connection, in order.
    ///
    /// wiremock always frames bodies with `Content-Length`, so chunked and
    /// truncated responses need a bare socket.
    async fn serve_raw(responses: Vec<Vec<u8>>) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            for response in responses {
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
                socket.write_all(&response).await.unwrap();
                let _ = socket.shutdown().await;
            }
        });
        format!("http://{addr}")
    }

    fn chunked_response(parts: &[&str]) -> Vec<u8> {
        let mut response =
            b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\nConnection: close\r\n\r\n".to_vec();
        for part in parts {
            response.extend_from_slice(format!("{:x}\r\n{}\r\n", part.len(), part).as_bytes());
        }
        response.extend_from_slice(b"0\r\n\r\n");
        response
    }

    fn recorder() -> (Arc<Mutex<Vec<f64>>>, impl FnMut(f64) + Send) {
        let progress = Arc::new(Mutex::new(Vec::new()));
        let sink = progress.clone();
        (progress, move |p| sink.lock().unwrap().push(p))
    }

    fn config(server: &MockServer) -> TransferConfig {
        TransferConfig {
            backoff_base: Duration::from_millis(5),
            ..TransferConfig::new(server.uri())
        }
    }

    #[test]
    fn test_estimated_sizes() {
        assert_eq!(estimated_size("legis-embeddings.json"), 120_000_000);
        assert_eq!(estimated_size("juris-embeddings.json"), 180_000_000);
        assert_eq!(estimated_size("legis-data.json"), 25_000_000);
        assert_eq!(estimated_size("juris-data.json"), 40_000_000);
        assert_eq!(estimated_size("other.json"), 50_000_000);
    }

    #[test]
    fn test_progress_without_content_length_uses_estimate() {
        let mut tracker = ProgressTracker::new(None, "legis-data.json");
        assert_eq!(tracker.total(), 25_000_000);

        let mut reported = Vec::new();
        for _ in 0..5 {
            reported.push(tracker.advance(5_000_000));
        }
        reported.push(1.0);

        assert!(reported.windows(2).all(|w| w[0] <= w[1]));
        assert!((reported[0] - 0.2).abs() < 1e-9);
        // the final chunk reaches the estimate but is still capped
        assert_eq!(reported[4], 0.99);
        assert_eq!(*reported.last().unwrap(), 1.0);
    }

    #[test]
    fn test_progress_capped_when_estimate_too_small() {
        let mut tracker = ProgressTracker::new(Some(10), "x.json");
        assert_eq!(tracker.advance(50), 0.99);
    }

    #[test]
    fn test_zero_content_length_falls_back_to_estimate() {
        let tracker = ProgressTracker::new(Some(0), "juris-data.json");
        assert_eq!(tracker.total(), 40_000_000);
    }

    #[tokio::test]
    async fn test_download_reports_progress() {
        let server = MockServer::start().await;
        let body = "[".to_string() + &"1,".repeat(5000) + "1]";
        Mock::given(method("GET"))
            .and(query_param("file", "legis-embeddings.json"))
            .respond_with(ResponseTemplate::new(200).set_body_string(body.clone()))
            .mount(&server)
            .await;

        let downloader = Downloader::new(&config(&server)).unwrap();
        let progress = Arc::new(Mutex::new(Vec::new()));
        let sink = progress.clone();

        let text = downloader
            .download_file("legis-embeddings.json", move |p| sink.lock().unwrap().push(p))
            .await
            .unwrap();

        assert_eq!(text, body);
        let progress = progress.lock().unwrap();
        assert!(progress.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(*progress.last().unwrap(), 1.0);
        assert!(progress[..progress.len() - 1].iter().all(|&p| p <= 0.99));
    }

    #[tokio::test]
    async fn test_download_retries_after_server_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .up_to_n_times(2)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("[]"))
            .mount(&server)
            .await;

        let downloader = Downloader::new(&config(&server)).unwrap();
        let text = downloader.download_file("legis-data.json", |_| {}).await.unwrap();

        assert_eq!(text, "[]");
        assert_eq!(server.received_requests().await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_download_gives_up_after_max_retries() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let downloader = Downloader::new(&config(&server)).unwrap();
        let result = downloader.download_file("juris-data.json", |_| {}).await;

        assert!(matches!(result, Err(TransferError::Status(503))));
        assert_eq!(server.received_requests().await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_download_without_content_length() {
        let url = serve_raw(vec![chunked_response(&["[1,2,", "3,4", "]"])]).await;
        let config = TransferConfig {
            backoff_base: Duration::from_millis(5),
            ..TransferConfig::new(url)
        };
        let downloader = Downloader::new(&config).unwrap();
        let (progress, on_progress) = recorder();

        let text = downloader
            .download_file("legis-data.json", on_progress)
            .await
            .unwrap();

        assert_eq!(text, "[1,2,3,4]");
        let progress = progress.lock().unwrap();
        assert!(progress.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(*progress.last().unwrap(), 1.0);
        // measured against the 25 MB estimate for legis-data.json
        assert!(progress[..progress.len() - 1].iter().all(|&p| p < 0.01));
    }

    #[tokio::test]
    async fn test_progress_does_not_rewind_on_retry() {
        let body = "x".repeat(100);
        let mut truncated =
            b"HTTP/1.1 200 OK\r\nContent-Length: 100\r\nConnection: close\r\n\r\n".to_vec();
        truncated.extend_from_slice(&body.as_bytes()[..50]);
        let url = serve_raw(vec![truncated, chunked_response(&[&body[..10], &body[10..]])]).await;
        let config = TransferConfig {
            backoff_base: Duration::from_millis(5),
            ..TransferConfig::new(url)
        };
        let downloader = Downloader::new(&config).unwrap();
        let (progress, on_progress) = recorder();

        let text = downloader
            .download_file("juris-data.json", on_progress)
            .await
            .unwrap();

        assert_eq!(text, body);
        let progress = progress.lock().unwrap();
        assert!(progress.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(*progress.last().unwrap(), 1.0);
    }

    #[test]
    fn test_retry_delay_saturates() {
        let downloader = Downloader::new(&TransferConfig {
            backoff_base: Duration::from_millis(100),
            ..TransferConfig::new("http://localhost")
        })
        .unwrap();

        assert_eq!(downloader.retry_delay(1), Duration::from_millis(100));
        assert_eq!(downloader.retry_delay(3), Duration::from_millis(400));
        assert!(downloader.retry_delay(64) >= downloader.retry_delay(33));

        let slow = Downloader::new(&TransferConfig {
            backoff_base: Duration::from_secs(u64::MAX / 2),
            ..TransferConfig::new("http://localhost")
        })
        .unwrap();
        assert_eq!(slow.retry_delay(3), Duration::MAX);
    }
}
