use std::thread;
use std::time::Duration;

use reqwest::blocking::Client;
use url::Url;

use crate::config::FetchConfig;
use crate::error::FetchError;

/// Source of raw bytes for a URL.
pub trait Fetcher {
    fn fetch(&self, url: &Url) -> Result<Vec<u8>, FetchError>;
}

/// Blocking HTTP fetcher with a per-request timeout and bounded retries.
pub struct HttpFetcher {
    client: Client,
    retries: u32,
    retry_backoff: Duration,
    delay: Duration,
}

impl HttpFetcher {
    pub fn new(config: &FetchConfig) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .user_agent(config.user_agent.clone())
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()
            .map_err(FetchError::ClientBuild)?;

        Ok(Self {
            client,
            retries: config.retries,
            retry_backoff: config.retry_backoff,
            delay: config.delay,
        })
    }

    fn fetch_once(&self, url: &Url) -> Result<Vec<u8>, FetchError> {
        if !self.delay.is_zero() {
            thread::sleep(self.delay);
        }

        let response = self
            .client
            .get(url.clone())
            .send()
            .map_err(|err| FetchError::from_reqwest(url.as_str(), err))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let body = response
            .bytes()
            .map_err(|err| FetchError::from_reqwest(url.as_str(), err))?;
        Ok(body.to_vec())
    }
}

impl Fetcher for HttpFetcher {
    fn fetch(&self, url: &Url) -> Result<Vec<u8>, FetchError> {
        let mut attempt = 0_u32;
        loop {
            tracing::debug!(%url, attempt, "GET");
            match self.fetch_once(url) {
                Ok(body) => return Ok(body),
                Err(err) if attempt < self.retries && err.is_retryable() => {
                    attempt += 1;
                    tracing::warn!(%url, attempt, error = %err, "request failed; retrying");
                    thread::sleep(self.retry_backoff * attempt);
                }
                Err(err) => return Err(err),
            }
        }
    }
}
