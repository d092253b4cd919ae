//! CDN cache invalidation over HTTP
//!
//! Each path is invalidated with a `PURGE <base><path>` request, the
//! convention understood by Varnish, Fastly and most caching proxies.

use futures::StreamExt;
use reqwest::{Client, Method};
use upsync_core::{Error, Result};

/// Requests in flight at once
const PURGE_CONCURRENCY: usize = 8;

pub struct HttpPurger {
    client: Client,
    base_url: String,
    method: Method,
}

impl HttpPurger {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let method = Method::from_bytes(b"PURGE")
            .map_err(|e| Error::General(format!("invalid purge method: {e}")))?;

        Ok(Self {
            client: Client::new(),
            base_url: base_url.into(),
            method,
        })
    }

    /// Full URL a slash-rooted path is purged at
    pub fn purge_url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    /// Purge every path, returning the ones that were not acknowledged
    pub async fn purge(&self, paths: &[String]) -> Vec<String> {
        let results: Vec<(String, bool)> = futures::stream::iter(paths.iter().cloned())
            .map(|path| {
                let method = self.method.clone();
                async move {
                    let url = self.purge_url(&path);
                    let ok = match self.client.request(method, &url).send().await {
                        Ok(response) if response.status().is_success() => true,
                        Ok(response) => {
                            tracing::debug!(url = %url, status = %response.status(), "Purge rejected");
                            false
                        }
                        Err(e) => {
                            tracing::debug!(url = %url, error = %e, "Purge request failed");
                            false
                        }
                    };
                    (path, ok)
                }
            })
            .buffer_unordered(PURGE_CONCURRENCY)
            .collect()
            .await;

        let mut failed: Vec<String> = results
            .into_iter()
            .filter_map(|(path, ok)| (!ok).then_some(path))
            .collect();
        failed.sort();
        failed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Accept `count` requests, answering 500 for paths containing "fail"
    async fn serve(count: usize) -> (String, Arc<Mutex<Vec<String>>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let recorded = seen.clone();

        tokio::spawn(async move {
            for _ in 0..count {
                let (mut socket, _) = listener.accept().await.unwrap();
                let mut buf = Vec::new();
                let mut chunk = [0u8; 1024];
                while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
                    let n = socket.read(&mut chunk).await.unwrap();
                    if n == 0 {
                        break;
                    }
                    buf.extend_from_slice(&chunk[..n]);
                }

                let request = String::from_utf8_lossy(&buf);
                let line = request.lines().next().unwrap_or_default().to_string();
                let status = if line.contains("fail") {
                    "500 Internal Server Error"
                } else {
                    "200 OK"
                };
                recorded.lock().unwrap().push(line);

                let response =
                    format!("HTTP/1.1 {status}\r\ncontent-length: 0\r\nconnection: close\r\n\r\n");
                socket.write_all(response.as_bytes()).await.unwrap();
            }
        });

        (format!("http://{addr}"), seen)
    }

    #[test]
    fn test_purge_method_is_purge() {
        let purger = HttpPurger::new("https://cdn.example.com").unwrap();
        assert_eq!(purger.method.as_str(), "PURGE");
    }

    #[test]
    fn test_purge_url() {
        let purger = HttpPurger::new("https://cdn.example.com/").unwrap();
        assert_eq!(
            purger.purge_url("/blog/index.html"),
            "https://cdn.example.com/blog/index.html"
        );

        let purger = HttpPurger::new("https://cdn.example.com").unwrap();
        assert_eq!(purger.purge_url("/a.txt"), "https://cdn.example.com/a.txt");
    }

    #[tokio::test]
    async fn test_purge_sends_purge_requests() {
        let (base, seen) = serve(2).await;
        let purger = HttpPurger::new(base).unwrap();

        let failed = purger
            .purge(&["/a.txt".to_string(), "/b/c.txt".to_string()])
            .await;

        assert!(failed.is_empty());
        let mut lines = seen.lock().unwrap().clone();
        lines.sort();
        assert_eq!(
            lines,
            vec!["PURGE /a.txt HTTP/1.1", "PURGE /b/c.txt HTTP/1.1"]
        );
    }

    #[tokio::test]
    async fn test_purge_reports_rejected_paths() {
        let (base, _) = serve(2).await;
        let purger = HttpPurger::new(base).unwrap();

        let failed = purger
            .purge(&["/ok.txt".to_string(), "/fail.txt".to_string()])
            .await;

        assert_eq!(failed, vec!["/fail.txt"]);
    }

    #[tokio::test]
    async fn test_purge_reports_unreachable_cdn() {
        let purger = HttpPurger::new("http://127.0.0.1:1").unwrap();
        let failed = purger.purge(&["/a.txt".to_string()]).await;
        assert_eq!(failed, vec!["/a.txt"]);
    }
}
