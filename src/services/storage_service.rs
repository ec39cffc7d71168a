use std::path::Path;
use std::time::Duration;

use futures_util::StreamExt;
use tokio::io::AsyncWriteExt;

use crate::errors::{LauncherError, Result};
use crate::models::RemoteManifest;

const REMOTE_MANIFEST_FILE: &str = "manifest.json";

/// Read-only client for the object storage buckets holding published game
/// builds. The engine fetches the remote manifest itself; bulk file transfer
/// belongs to the transfer executor, which can still reuse
/// [`CloudStorageService::fetch_file`] for individual objects.
#[derive(Clone)]
pub struct CloudStorageService {
    client: reqwest::Client,
    base_url: String,
}

impl CloudStorageService {
    pub fn new(base_url: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(6))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self { client, base_url }
    }

    fn object_url(&self, bucket: &str, key: &str) -> String {
        let encoded_key = key
            .split('/')
            .filter(|segment| !segment.is_empty())
            .map(|segment| urlencoding::encode(segment).into_owned())
            .collect::<Vec<_>>()
            .join("/");
        format!(
            "{}/{}/{}",
            self.base_url.trim_end_matches('/'),
            urlencoding::encode(bucket),
            encoded_key
        )
    }

    /// Fetch the published `manifest.json` under `prefix` for one game.
    pub async fn fetch_remote_manifest(
        &self,
        bucket: &str,
        prefix: &str,
    ) -> Result<RemoteManifest> {
        let key = format!("{}{}", prefix, REMOTE_MANIFEST_FILE);
        let url = self.object_url(bucket, &key);

        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(LauncherError::Http(format!(
                "HTTP {} fetching remote manifest {}",
                response.status().as_u16(),
                key
            )));
        }
        Ok(response.json().await?)
    }

    /// Open a byte stream for one object.
    pub async fn fetch_file(&self, bucket: &str, key: &str) -> Result<reqwest::Response> {
        let url = self.object_url(bucket, key);
        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(LauncherError::Http(format!(
                "HTTP {} fetching object {}",
                response.status().as_u16(),
                key
            )));
        }
        Ok(response)
    }

    /// Stream one object to a local path, returning the bytes written.
    pub async fn fetch_file_to_path(
        &self,
        bucket: &str,
        key: &str,
        destination: &Path,
    ) -> Result<u64> {
        if let Some(parent) = destination.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let response = self.fetch_file(bucket, key).await?;
        let mut stream = response.bytes_stream();
        let mut file = tokio::fs::File::create(destination).await?;
        let mut written = 0_u64;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.sync_all().await?;
        Ok(written)
    }
}
