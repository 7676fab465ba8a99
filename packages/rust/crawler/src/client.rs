//! Session-scoped HTTP client with bounded, flat-delay retry.
//!
//! Every request goes through [`FetchClient::get`]: a fixed pause before the
//! request (the only rate limiting), then up to `max_attempts` tries separated
//! by a constant `retry_delay_ms`. There is no backoff growth and no jitter.

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use tracing::{debug, info, instrument, warn};

use housing_shared::{DatahubError, FetchConfig, Result};

/// One authenticated session: cookie store plus default headers.
///
/// Cloning is cheap and shares the underlying connection pool and cookies.
#[derive(Debug, Clone)]
pub struct FetchClient {
    client: Client,
    config: FetchConfig,
}

impl FetchClient {
    /// Build a client from the runtime fetch configuration.
    pub fn new(config: FetchConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        for (name, value) in &config.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| DatahubError::config(format!("invalid header name {name:?}: {e}")))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| DatahubError::config(format!("invalid header value for {name}: {e}")))?;
            headers.insert(name, value);
        }

        let client = Client::builder()
            .user_agent(config.user_agent.as_str())
            .default_headers(headers)
            .cookie_store(true)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| DatahubError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { client, config })
    }

    /// GET `url` with query `params`, retrying transport and non-2xx failures.
    ///
    /// Returns the first successful response, or a `Network` error once all
    /// attempts are spent. The caller decides whether that is fatal.
    #[instrument(skip(self, params), fields(url = %url))]
    pub async fn get(&self, url: &str, params: &[(&str, String)]) -> Result<Response> {
        let attempts = self.config.max_attempts.max(1);
        let mut last_error = String::new();

        for attempt in 1..=attempts {
            if self.config.request_delay_ms > 0 {
                tokio::time::sleep(Duration::from_millis(self.config.request_delay_ms)).await;
            }

            match self.client.get(url).query(params).send().await {
                Ok(response) if response.status().is_success() => {
                    debug!(attempt, status = %response.status(), "request succeeded");
                    return Ok(response);
                }
                Ok(response) => last_error = format!("HTTP {}", response.status()),
                Err(e) => last_error = e.to_string(),
            }

            warn!(attempt, max_attempts = attempts, error = %last_error, "request failed");

            if attempt < attempts && self.config.retry_delay_ms > 0 {
                tokio::time::sleep(Duration::from_millis(self.config.retry_delay_ms)).await;
            }
        }

        Err(DatahubError::Network(format!(
            "{url}: giving up after {attempts} attempts: {last_error}"
        )))
    }

    /// GET and decode a JSON body. Decode failures are not retried.
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        params: &[(&str, String)],
    ) -> Result<T> {
        let response = self.get(url, params).await?;
        let body = response
            .text()
            .await
            .map_err(|e| DatahubError::Network(format!("{url}: failed to read body: {e}")))?;

        serde_json::from_str(&body)
            .map_err(|e| DatahubError::parse(format!("{url}: unexpected response shape: {e}")))
    }

    /// Refresh session cookies with a single GET of the homepage.
    pub async fn refresh_session(&self, homepage: &str) -> Result<()> {
        let response = self.get(homepage, &[]).await?;
        let cookie_count = response.cookies().count();
        info!(homepage, cookie_count, "session cookies refreshed");
        Ok(())
    }
}
