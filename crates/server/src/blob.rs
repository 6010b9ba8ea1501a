//! Blob store collaborator: issues upload URLs, stores nothing itself.

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::time::Duration;

use crate::app::models::unix_ms_now;
use crate::server_security::{hex, random_hex};

const MAX_KEY_NAME_CHARS: usize = 96;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PresignedPut {
    pub url: String,
    pub expires_ms: u64,
}

#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn presign_put(&self, key: &str, content_type: &str) -> Result<PresignedPut>;
}

/// Signs `PUT` URLs against a shared secret; the storage service verifies them.
pub struct SignedUrlStore {
    base_url: String,
    secret: String,
    ttl: Duration,
}

impl SignedUrlStore {
    pub fn new(base_url: impl Into<String>, secret: impl Into<String>, ttl: Duration) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            secret: secret.into(),
            ttl,
        }
    }

    fn signature(&self, key: &str, content_type: &str, expires_ms: u64) -> String {
        let mut hasher = Sha256::new();
        for part in [self.secret.as_str(), key, content_type, &expires_ms.to_string()] {
            hasher.update(part.as_bytes());
            hasher.update([0u8]);
        }
        hex(&hasher.finalize())
    }
}

#[async_trait]
impl BlobStore for SignedUrlStore {
    async fn presign_put(&self, key: &str, content_type: &str) -> Result<PresignedPut> {
        let ttl_ms = u64::try_from(self.ttl.as_millis()).unwrap_or(u64::MAX);
        let expires_ms = unix_ms_now().saturating_add(ttl_ms);
        let signature = self.signature(key, content_type, expires_ms);
        Ok(PresignedPut {
            url: format!(
                "{}/{key}?expires={expires_ms}&signature={signature}",
                self.base_url
            ),
            expires_ms,
        })
    }
}

/// `uploads/<owner>/<random>-<sanitized name>`.
pub fn object_key(owner_id: &str, file_name: &str) -> Result<String> {
    let name: String = file_name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .take(MAX_KEY_NAME_CHARS)
        .collect();
    let name = name.trim_start_matches('.');
    let name = if name.is_empty() { "file" } else { name };
    Ok(format!("uploads/{owner_id}/{}-{name}", random_hex(8)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn signs_each_key_and_type_differently() {
        let store = SignedUrlStore::new("https://blobs.test/", "s3cret", Duration::from_secs(60));
        let a = store.presign_put("uploads/u1/a", "image/png").await.unwrap();
        let b = store.presign_put("uploads/u1/a", "text/plain").await.unwrap();
        assert!(a.url.starts_with("https://blobs.test/uploads/u1/a?expires="));
        assert_ne!(a.url, b.url);
        assert!(a.expires_ms > unix_ms_now());
    }

    #[test]
    fn object_keys_are_sanitized() {
        let key = object_key("u1", "../my report (final).pdf").unwrap();
        assert!(key.starts_with("uploads/u1/"), "{key}");
        assert!(key.ends_with("-_my_report__final_.pdf"), "{key}");
        assert!(!key.contains(".."));
        assert!(object_key("u1", "...").unwrap().ends_with("-file"));
    }
}
