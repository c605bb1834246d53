use std::path::Path;

use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde_json::json;
use thiserror::Error;
use tracing::{debug, info};

use crate::config::SupabaseConfig;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("storage api returned {status}: {body}")]
    Api {
        status: reqwest::StatusCode,
        body: String,
    },
    #[error("failed to read upload: {0}")]
    Io(#[from] std::io::Error),
}

/// Poster storage backed by a Supabase Storage bucket.
pub struct SupabaseStorage {
    client: Client,
    base_url: String,
    key: SecretString,
    bucket: String,
}

impl SupabaseStorage {
    pub fn new(config: &SupabaseConfig) -> Self {
        Self {
            client: Client::new(),
            base_url: config.url.trim_end_matches('/').to_string(),
            key: SecretString::from(config.key.clone()),
            bucket: config.bucket.clone(),
        }
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub fn public_url(&self, filename: &str) -> String {
        format!(
            "{}/storage/v1/object/public/{}/{}",
            self.base_url,
            self.bucket,
            encode_segment(filename)
        )
    }

    /// True when `path` is a public URL inside this bucket.
    pub fn owns_url(&self, path: &str) -> bool {
        path.starts_with(&format!(
            "{}/storage/v1/object/public/{}/",
            self.base_url, self.bucket
        ))
    }

    /// Uploads (or overwrites) `filename` and returns its public URL.
    pub async fn upload(
        &self,
        path: &Path,
        filename: &str,
        mime_type: &str,
    ) -> Result<String, StorageError> {
        let data = tokio::fs::read(path).await?;
        let url = format!(
            "{}/storage/v1/object/{}/{}",
            self.base_url,
            self.bucket,
            encode_segment(filename)
        );

        debug!("uploading {} ({} bytes) to supabase", filename, data.len());
        let response = self
            .client
            .post(&url)
            .bearer_auth(self.key.expose_secret())
            .header("apikey", self.key.expose_secret())
            .header("Content-Type", mime_type)
            .header("x-upsert", "true")
            .body(data)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StorageError::Api { status, body });
        }

        info!("uploaded {} to supabase bucket {}", filename, self.bucket);
        Ok(self.public_url(filename))
    }

    /// Removes an object. Accepts either a bare object name or a full URL.
    pub async fn delete(&self, name_or_url: &str) -> Result<(), StorageError> {
        let name = object_name(name_or_url);
        let url = format!("{}/storage/v1/object/{}", self.base_url, self.bucket);

        let response = self
            .client
            .delete(&url)
            .bearer_auth(self.key.expose_secret())
            .header("apikey", self.key.expose_secret())
            .json(&json!({ "prefixes": [name] }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StorageError::Api { status, body });
        }

        info!("deleted {} from supabase bucket {}", name, self.bucket);
        Ok(())
    }
}

/// Last path segment of a URL or object name, without any query string.
pub fn object_name(name_or_url: &str) -> &str {
    let without_query = name_or_url.split(['?', '#']).next().unwrap_or(name_or_url);
    without_query.rsplit('/').next().unwrap_or(without_query)
}

fn encode_segment(s: &str) -> String {
    url::form_urlencoded::byte_serialize(s.as_bytes())
        .collect::<String>()
        .replace('+', "%20")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn storage() -> SupabaseStorage {
        SupabaseStorage::new(&SupabaseConfig {
            url: "https://abc.supabase.co/".to_string(),
            key: "service-key".to_string(),
            bucket: "posters".to_string(),
        })
    }

    #[test]
    fn public_url_points_into_bucket() {
        assert_eq!(
            storage().public_url("poster-1700000000000.jpg"),
            "https://abc.supabase.co/storage/v1/object/public/posters/poster-1700000000000.jpg"
        );
    }

    #[test]
    fn public_url_encodes_spaces() {
        assert_eq!(
            storage().public_url("my poster.png"),
            "https://abc.supabase.co/storage/v1/object/public/posters/my%20poster.png"
        );
    }

    #[test]
    fn owns_url_matches_only_this_bucket() {
        let storage = storage();
        assert!(storage.owns_url(&storage.public_url("p.jpg")));
        assert!(!storage.owns_url("https://abc.supabase.co/storage/v1/object/public/other/p.jpg"));
        assert!(!storage.owns_url("default-poster.jpg"));
    }

    #[test]
    fn object_name_strips_url_and_query() {
        assert_eq!(
            object_name("https://abc.supabase.co/storage/v1/object/public/posters/p.jpg?t=1"),
            "p.jpg"
        );
        assert_eq!(object_name("p.jpg"), "p.jpg");
    }
}
