//! Origin HTTP requests
//!
//! One GET per call, no retries: a failed fill is retried by the next
//! client request, not here.

use reqwest::{Client, Response};
use tracing::debug;
use url::Url;

use crate::errors::{FetchError, FetchResult};

/// Issues origin requests and classifies their failures
#[derive(Debug, Clone)]
pub struct HttpHandler {
    client: Client,
}

impl HttpHandler {
    /// Creates a new HttpHandler around a configured client
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Send a GET and return the response only if its status is 2xx
    ///
    /// # Errors
    ///
    /// - `FetchError::OriginUnavailable` on connection or transport failure
    /// - `FetchError::OriginNon2xx` for any other status, redirects included
    pub async fn get_response(&self, url: &Url) -> FetchResult<Response> {
        let response = self
            .client
            .get(url.as_str())
            .send()
            .await
            .map_err(|source| FetchError::OriginUnavailable {
                url: url.to_string(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::OriginNon2xx {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        debug!("Origin answered {} for {}", status, url);
        Ok(response)
    }
}
