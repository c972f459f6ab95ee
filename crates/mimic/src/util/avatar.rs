//! Downloading avatar images for re-upload

use reqwest::StatusCode;

use super::http_client;
use crate::prelude::*;

/// An error arising from downloading an avatar
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// The avatar URL could not be parsed
    #[error("Invalid avatar URL {0:?}")]
    Url(String, #[source] url::ParseError),
    /// The server replied with something other than 200 OK
    #[error("Got status {status} fetching {url}")]
    Status {
        /// The requested URL
        url: Url,
        /// The status returned by the server
        status: StatusCode,
    },
    /// The request could not be completed
    #[error("Error fetching {url}")]
    Transport {
        /// The requested URL
        url: Url,
        /// The underlying client error
        #[source]
        source: reqwest::Error,
    },
}

impl FetchError {
    fn status(&self) -> Option<StatusCode> {
        match self {
            Self::Status { status, .. } => Some(*status),
            Self::Transport { source, .. } => source.status(),
            Self::Url(..) => None,
        }
    }
}

/// A source of raw avatar image bytes
#[async_trait]
pub trait AvatarFetch: fmt::Debug + Send + Sync {
    /// Download the image at `url`, returning its body on a 200 response
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError>;
}

/// Fetches avatars over HTTP, one short-lived client per request
#[derive(Debug, Clone, Copy)]
pub struct HttpAvatarFetcher {
    timeout: Duration,
}

impl HttpAvatarFetcher {
    pub fn new(timeout: Duration) -> Self { Self { timeout } }

    async fn try_fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let url = Url::parse(url).map_err(|e| FetchError::Url(url.into(), e))?;
        let transport = |source| FetchError::Transport {
            url: url.clone(),
            source,
        };

        let client = http_client(self.timeout).map_err(transport)?;

        trace!(url = url.as_str(), "Fetching avatar over HTTP");
        let res = client.get(url.clone()).send().await.map_err(transport)?;

        let status = res.status();
        if status != StatusCode::OK {
            return Err(FetchError::Status {
                url: url.clone(),
                status,
            });
        }

        let bytes = res.bytes().await.map_err(transport)?;

        Ok(bytes.to_vec())
    }
}

#[async_trait]
impl AvatarFetch for HttpAvatarFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        self.try_fetch(url).await.inspect_err(|err| {
            error!(
                url,
                status = err.status().map(|s| s.as_u16()),
                %err,
                "Failed to fetch avatar"
            );
        })
    }
}

#[cfg(test)]
mod tests {
    use tokio::{
        io::{AsyncReadExt, AsyncWriteExt},
        net::TcpListener,
    };

    use super::{AvatarFetch, FetchError, HttpAvatarFetcher};
    use crate::prelude::*;

    /// Serve exactly one canned HTTP response, returning the URL to hit
    async fn serve_once(status: &'static str, body: &'static [u8]) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (mut sock, _) = listener.accept().await.unwrap();
            let mut buf = [0_u8; 4096];
            let mut req = Vec::new();

            while !req.windows(4).any(|w| w == b"\r\n\r\n") {
                let n = sock.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                req.extend_from_slice(&buf[..n]);
            }

            let head = format!(
                "HTTP/1.1 {status}\r\nContent-Type: image/png\r\nContent-Length: {}\r\n\
                 Connection: close\r\n\r\n",
                body.len()
            );
            sock.write_all(head.as_bytes()).await.unwrap();
            sock.write_all(body).await.unwrap();
            sock.shutdown().await.ok();
        });

        format!("http://{addr}/avatars/42/abc.png")
    }

    fn fetcher() -> HttpAvatarFetcher { HttpAvatarFetcher::new(Duration::from_secs(5)) }

    #[tokio::test]
    async fn test_fetch_ok() {
        let url = serve_once("200 OK", b"\x89PNG fake").await;

        let bytes = fetcher().fetch(&url).await.unwrap();

        assert_eq!(bytes, b"\x89PNG fake");
    }

    #[tokio::test]
    async fn test_fetch_not_found() {
        let url = serve_once("404 Not Found", b"nope").await;

        let err = fetcher().fetch(&url).await.unwrap_err();

        assert!(
            matches!(err, FetchError::Status { status, .. } if status.as_u16() == 404),
            "{err:?}"
        );
    }

    #[tokio::test]
    async fn test_fetch_non_ok_success_status() {
        let url = serve_once("204 No Content", b"").await;

        let err = fetcher().fetch(&url).await.unwrap_err();

        assert!(matches!(err, FetchError::Status { .. }), "{err:?}");
    }

    #[tokio::test]
    async fn test_fetch_bad_url() {
        let err = fetcher().fetch("not a url").await.unwrap_err();

        assert!(matches!(err, FetchError::Url(..)), "{err:?}");
    }

    #[tokio::test]
    async fn test_fetch_connection_refused() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = fetcher()
            .fetch(&format!("http://{addr}/avatar.png"))
            .await
            .unwrap_err();

        assert!(matches!(err, FetchError::Transport { .. }), "{err:?}");
    }
}
