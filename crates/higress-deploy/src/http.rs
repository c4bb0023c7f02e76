//! HTTP access for fetching the baseline policy and probing the endpoint.

use std::time::Duration;

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;

use crate::Result;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[cfg_attr(test, automock)]
#[async_trait]
pub trait HttpClient: Send + Sync {
    /// GET `url` and return the body, failing on non-success status.
    async fn get_text(&self, url: &str) -> Result<String>;

    /// HEAD `url` and return the status code.
    async fn probe(&self, url: &str) -> Result<u16>;
}

/// [`HttpClient`] backed by reqwest.
pub struct ReqwestClient {
    client: reqwest::Client,
}

impl ReqwestClient {
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl HttpClient for ReqwestClient {
    async fn get_text(&self, url: &str) -> Result<String> {
        let response = self.client.get(url).send().await?.error_for_status()?;
        Ok(response.text().await?)
    }

    async fn probe(&self, url: &str) -> Result<u16> {
        let response = self.client.head(url).send().await?;
        Ok(response.status().as_u16())
    }
}
