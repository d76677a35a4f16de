//! Shared HTTP fetcher with bounded retry.

use std::time::Duration;

use reqwest::{Client, StatusCode};
use tracing::debug;

use leadpipe_shared::{HttpConfig, LeadPipeError, Result};

/// Maximum number of redirects to follow.
const MAX_REDIRECTS: usize = 10;

/// Backoff exponent cap, so the longest wait is `base * 32`.
const MAX_BACKOFF_EXPONENT: u32 = 5;

/// Response of a completed fetch, whatever its status.
#[derive(Debug, Clone)]
pub struct FetchedPage {
    pub status: u16,
    /// URL after redirects.
    pub final_url: String,
    pub body: String,
}

impl FetchedPage {
    pub fn is_ok(&self) -> bool {
        self.status == 200
    }
}

/// reqwest client plus the retry policy every collaborator shares.
///
/// Timeouts, connection errors, 429 and 5xx responses are retried up to
/// `max_retries` attempts in total. Other statuses come back as a
/// [`FetchedPage`] for the caller to judge.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
    max_attempts: u32,
    backoff_base: Duration,
}

impl HttpFetcher {
    pub fn new(config: &HttpConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(&config.user_agent)
            .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| LeadPipeError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            max_attempts: config.max_retries.max(1),
            backoff_base: Duration::from_millis(config.backoff_base_ms),
        })
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    /// GET `url`, retrying transient failures.
    pub async fn get(&self, url: &str) -> Result<FetchedPage> {
        let shown = without_query(url);
        let mut attempt = 0;
        loop {
            match self.client.get(url).send().await {
                Ok(response) => {
                    let status = response.status();
                    if should_retry(status) && attempt + 1 < self.max_attempts {
                        attempt += 1;
                        debug!(url = shown, %status, attempt, "retrying after transient status");
                        tokio::time::sleep(self.backoff(attempt)).await;
                        continue;
                    }

                    let final_url = response.url().to_string();
                    let body = response.text().await.map_err(|e| {
                        LeadPipeError::Network(format!("{shown}: body read failed: {e}"))
                    })?;
                    return Ok(FetchedPage {
                        status: status.as_u16(),
                        final_url,
                        body,
                    });
                }
                Err(err) => {
                    if is_retryable(&err) && attempt + 1 < self.max_attempts {
                        attempt += 1;
                        debug!(
                            url = shown,
                            error = %err.without_url(),
                            attempt,
                            "retrying after transient error"
                        );
                        tokio::time::sleep(self.backoff(attempt)).await;
                        continue;
                    }
                    return Err(LeadPipeError::Network(format!(
                        "{shown}: {}",
                        err.without_url()
                    )));
                }
            }
        }
    }

    fn backoff(&self, attempt: u32) -> Duration {
        self.backoff_base * (1 << attempt.min(MAX_BACKOFF_EXPONENT))
    }
}

/// Query strings may carry API keys; keep them out of logs and errors.
fn without_query(url: &str) -> &str {
    url.split('?').next().unwrap_or(url)
}

fn should_retry(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

fn is_retryable(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn fetcher(max_retries: u32) -> HttpFetcher {
        let config = HttpConfig {
            max_retries,
            ..HttpConfig::default()
        }
        .without_delays();
        HttpFetcher::new(&config).expect("build fetcher")
    }

    #[tokio::test]
    async fn retries_server_errors_then_succeeds() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/flaky"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(2)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/flaky"))
            .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
            .mount(&server)
            .await;

        let page = fetcher(3)
            .get(&format!("{}/flaky", server.uri()))
            .await
            .expect("fetch");
        assert!(page.is_ok());
        assert_eq!(page.body, "ok");
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(429))
            .expect(2)
            .mount(&server)
            .await;

        let page = fetcher(2)
            .get(&format!("{}/busy", server.uri()))
            .await
            .expect("fetch returns last response");
        assert_eq!(page.status, 429);
    }

    #[tokio::test]
    async fn client_errors_are_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;

        let page = fetcher(3)
            .get(&format!("{}/missing", server.uri()))
            .await
            .expect("fetch");
        assert_eq!(page.status, 404);
        assert!(!page.is_ok());
    }

    #[tokio::test]
    async fn unreachable_host_is_network_error() {
        let err = fetcher(1).get("http://127.0.0.1:9/").await.unwrap_err();
        assert!(matches!(err, LeadPipeError::Network(_)));
    }

    #[tokio::test]
    async fn errors_do_not_leak_query_strings() {
        let err = fetcher(1)
            .get("http://127.0.0.1:9/account?api_key=secret")
            .await
            .unwrap_err();
        assert!(!err.to_string().contains("secret"));
    }

    #[test]
    fn backoff_grows_and_caps() {
        let config = HttpConfig {
            backoff_base_ms: 500,
            ..HttpConfig::default()
        };
        let f = HttpFetcher::new(&config).expect("build");
        assert_eq!(f.backoff(1), Duration::from_millis(1000));
        assert_eq!(f.backoff(2), Duration::from_millis(2000));
        assert_eq!(f.backoff(9), Duration::from_millis(16000));
    }
}
