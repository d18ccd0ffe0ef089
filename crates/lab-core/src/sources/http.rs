//! HTTP source: a single file fetched with GET.

use std::sync::Arc;
use std::time::Duration;

use reqwest::{StatusCode, Url};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::error::{DiscoveryError, SourceError, SourceResult};
use super::file::File;
use super::stream::Stream;
use super::Source;

/// Retry policy of the HTTP source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpOptions {
    /// Retries after the first request (0 = request once).
    pub max_retries: u32,
    /// Delay before the first retry; doubles on every further retry.
    pub backoff_min: Duration,
    /// Upper bound of the retry delay.
    pub backoff_max: Duration,
    /// Timeout of a single request.
    pub request_timeout: Duration,
}

impl Default for HttpOptions {
    fn default() -> Self {
        Self {
            max_retries: 10,
            backoff_min: Duration::from_secs(1),
            backoff_max: Duration::from_secs(30),
            request_timeout: Duration::from_secs(30),
        }
    }
}

impl HttpOptions {
    fn backoff(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry);
        self.backoff_min
            .checked_mul(factor)
            .unwrap_or(self.backoff_max)
            .min(self.backoff_max)
    }
}

/// Fetches the configured URL; the whole response body is the file.
#[derive(Debug)]
pub struct Http {
    url: Url,
    client: reqwest::Client,
    options: HttpOptions,
}

impl Http {
    pub fn new(url: Url) -> SourceResult<Self> {
        Self::with_options(url, HttpOptions::default())
    }

    pub fn with_options(url: Url, options: HttpOptions) -> SourceResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(options.request_timeout)
            .build()
            .map_err(|e| SourceError::InvalidLocation {
                location: url.to_string(),
                reason: e.to_string(),
            })?;

        Ok(Self {
            url,
            client,
            options,
        })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    /// GET `url`, retrying connection failures, 429 and 5xx responses.
    async fn fetch(&self, url: &Url, cancel: &CancellationToken) -> Result<Vec<u8>, String> {
        let mut retry = 0;

        loop {
            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err("request cancelled".to_string()),
                res = self.client.get(url.clone()).send() => res,
            };

            let err = match outcome {
                Ok(response) if response.status().is_success() => {
                    return response
                        .bytes()
                        .await
                        .map(|body| body.to_vec())
                        .map_err(|e| format!("read response body: {e}"));
                }
                Ok(response) if is_retryable(response.status()) => {
                    format!("unexpected status {}", response.status())
                }
                Ok(response) => return Err(format!("unexpected status {}", response.status())),
                Err(e) => e.to_string(),
            };

            if retry >= self.options.max_retries {
                return Err(format!("giving up after {} attempt(s): {err}", retry + 1));
            }

            let delay = self.options.backoff(retry);
            retry += 1;
            warn!(url = %url, attempt = retry, error = %err, "request failed, retrying in {:?}", delay);

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err("request cancelled".to_string()),
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }
}

fn is_retryable(status: StatusCode) -> bool {
    status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS
}

impl Source for Http {
    fn read(self: Arc<Self>, cancel: CancellationToken) -> Stream {
        let (tx, stream) = Stream::channel(cancel);

        tokio::spawn(async move {
            let url = self.url.clone();
            debug!(url = %url, "fetching");

            match self.fetch(&url, tx.cancellation()).await {
                Ok(content) => {
                    let source: Arc<dyn Source> = self;
                    tx.file(File::new(source, url.to_string(), content)).await;
                }
                Err(err) => {
                    tx.error(DiscoveryError::new(url.to_string(), err).into_fatal()).await;
                }
            }
        });

        stream
    }

    fn resolve(self: Arc<Self>, cancel: CancellationToken, base: &str, reference: &str) -> Stream {
        let base = Url::parse(base).unwrap_or_else(|_| self.url.clone());

        let target = match base.join(reference) {
            Ok(target) => target,
            Err(err) => return Stream::failed(DiscoveryError::from_error(reference, err)),
        };

        let (tx, stream) = Stream::channel(cancel);

        tokio::spawn(async move {
            match self.fetch(&target, tx.cancellation()).await {
                Ok(content) => {
                    let source: Arc<dyn Source> = self;
                    tx.file(File::new(source, target.to_string(), content)).await;
                }
                Err(err) => {
                    tx.error(DiscoveryError::new(target.to_string(), err)).await;
                }
            }
        });

        stream
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::State;
    use axum::routing::get;
    use axum::Router;
    use std::net::SocketAddr;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn fast() -> HttpOptions {
        HttpOptions {
            max_retries: 3,
            backoff_min: Duration::from_millis(5),
            backoff_max: Duration::from_millis(20),
            request_timeout: Duration::from_secs(5),
        }
    }

    async fn flaky(State(hits): State<Arc<AtomicUsize>>) -> (StatusCode, &'static str) {
        if hits.fetch_add(1, Ordering::SeqCst) < 2 {
            (StatusCode::SERVICE_UNAVAILABLE, "later")
        } else {
            (StatusCode::OK, "RETURN 'flaky'")
        }
    }

    async fn serve() -> (SocketAddr, Arc<AtomicUsize>) {
        let hits = Arc::new(AtomicUsize::new(0));
        let app = Router::new()
            .route("/tests/suite.yaml", get(|| async { "query: {ref: ./query.fql}" }))
            .route("/tests/query.fql", get(|| async { "RETURN 42" }))
            .route("/flaky.fql", get(flaky))
            .route(
                "/missing.fql",
                get(|| async { (StatusCode::NOT_FOUND, "nope") }),
            )
            .with_state(Arc::clone(&hits));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        (addr, hits)
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let options = HttpOptions {
            backoff_min: Duration::from_secs(1),
            backoff_max: Duration::from_secs(5),
            ..HttpOptions::default()
        };
        assert_eq!(options.backoff(0), Duration::from_secs(1));
        assert_eq!(options.backoff(1), Duration::from_secs(2));
        assert_eq!(options.backoff(2), Duration::from_secs(4));
        assert_eq!(options.backoff(3), Duration::from_secs(5));
        assert_eq!(options.backoff(40), Duration::from_secs(5));
    }

    #[tokio::test]
    async fn read_fetches_whole_body() {
        let (addr, _) = serve().await;
        let url = Url::parse(&format!("http://{addr}/tests/suite.yaml")).unwrap();

        let src = Arc::new(Http::with_options(url.clone(), fast()).unwrap());
        let (files, errors) = src.read(CancellationToken::new()).collect().await;

        assert!(errors.is_empty());
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].name, url.to_string());
        assert_eq!(files[0].text(), "query: {ref: ./query.fql}");
    }

    #[tokio::test]
    async fn read_retries_server_errors() {
        let (addr, hits) = serve().await;
        let url = Url::parse(&format!("http://{addr}/flaky.fql")).unwrap();

        let src = Arc::new(Http::with_options(url, fast()).unwrap());
        let (files, errors) = src.read(CancellationToken::new()).collect().await;

        assert!(errors.is_empty(), "unexpected errors: {errors:?}");
        assert_eq!(files[0].text(), "RETURN 'flaky'");
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn read_does_not_retry_client_errors() {
        let (addr, _) = serve().await;
        let url = Url::parse(&format!("http://{addr}/missing.fql")).unwrap();

        let src = Arc::new(Http::with_options(url, fast()).unwrap());
        let (files, errors) = src.read(CancellationToken::new()).collect().await;

        assert!(files.is_empty());
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("404"));
        assert!(errors[0].fatal);
    }

    #[tokio::test]
    async fn read_gives_up_when_unreachable() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let url = Url::parse(&format!("http://{addr}/test.fql")).unwrap();
        let src = Arc::new(Http::with_options(url, fast()).unwrap());
        let (files, errors) = src.read(CancellationToken::new()).collect().await;

        assert!(files.is_empty());
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("giving up after 4 attempt(s)"));
    }

    #[tokio::test]
    async fn resolve_uses_relative_url_semantics() {
        let (addr, _) = serve().await;
        let url = Url::parse(&format!("http://{addr}/tests/suite.yaml")).unwrap();

        let src = Arc::new(Http::with_options(url.clone(), fast()).unwrap());
        let file = src
            .resolve(CancellationToken::new(), url.as_str(), "./query.fql")
            .single("./query.fql")
            .await
            .unwrap();

        assert_eq!(file.name, format!("http://{addr}/tests/query.fql"));
        assert_eq!(file.text(), "RETURN 42");
    }
}
