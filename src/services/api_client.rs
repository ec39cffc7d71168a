use std::time::Duration;

use reqwest::Method;
use serde::de::DeserializeOwned;

use crate::errors::{LauncherError, Result};

/// Thin REST client for the catalog API. Authentication and session refresh
/// live in the launcher shell; the engine only performs anonymous reads.
#[derive(Clone)]
pub struct ApiClient {
    client: reqwest::Client,
    base_url: String,
}

impl ApiClient {
    pub fn new(base_url: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(20))
            .connect_timeout(Duration::from_secs(6))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self { client, base_url }
    }

    /// Get the underlying reqwest client for custom requests
    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }

    /// Get the base URL for the API
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        );

        let response = self.client.request(Method::GET, &url).send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(LauncherError::Http(format!(
                "HTTP {}: {}",
                status.as_u16(),
                text
            )));
        }
        Ok(response.json().await?)
    }
}
