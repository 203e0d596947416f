//! Remote Client
//!
//! The narrow capability interface the storage adapter needs from a Dropbox
//! API client, plus an in-memory implementation for tests and development.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Duration, Utc};
#[cfg(test)]
use mockall::automock;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::credentials::CredentialSet;

/// Remote client errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RemoteError {
    #[error("Path not found: {0}")]
    NotFound(String),
    #[error("Unauthorized: {0}")]
    Unauthorized(String),
    #[error("Provider error ({status}): {message}")]
    Provider { status: u16, message: String },
    #[error("Transport error: {0}")]
    Transport(String),
}

impl RemoteError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, RemoteError::NotFound(_))
    }
}

pub type RemoteResult<T> = Result<T, RemoteError>;

/// Remote object metadata
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Metadata {
    pub path: String,
    pub size: u64,
    pub mime_type: String,
    /// SHA256 digest of the content
    pub content_hash: String,
    pub modified: Option<DateTime<Utc>>,
    /// The path existed but its content was removed
    pub deleted: bool,
}

/// Result of an upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadReceipt {
    /// Key the provider stored the content under
    pub path: String,
    pub size: u64,
    pub rev: String,
}

/// Provider-issued link that works without credentials for a limited time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemporaryLink {
    pub url: String,
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountInfo {
    pub owner_id: String,
    pub display_name: Option<String>,
}

/// Remote storage operations
#[cfg_attr(test, automock)]
#[async_trait]
pub trait RemoteClient: Send + Sync {
    /// Store content under a key, overwriting any existing content
    async fn upload(&self, key: &str, content: Bytes) -> RemoteResult<UploadReceipt>;

    /// Remove a key; `NotFound` if nothing is stored there
    async fn delete(&self, key: &str) -> RemoteResult<()>;

    async fn get_metadata(&self, key: &str) -> RemoteResult<Metadata>;

    async fn get_temporary_link(&self, key: &str) -> RemoteResult<TemporaryLink>;

    async fn account_info(&self) -> RemoteResult<AccountInfo>;

    async fn download(&self, key: &str) -> RemoteResult<Bytes>;
}

/// Builds a client for validated credentials
pub trait ClientFactory: Send + Sync {
    fn connect(&self, credentials: &CredentialSet) -> RemoteResult<Arc<dyn RemoteClient>>;
}

impl<F> ClientFactory for F
where
    F: Fn(&CredentialSet) -> RemoteResult<Arc<dyn RemoteClient>> + Send + Sync,
{
    fn connect(&self, credentials: &CredentialSet) -> RemoteResult<Arc<dyn RemoteClient>> {
        self(credentials)
    }
}

/// Lifetime of links issued by `MemoryClient`
const TEMPORARY_LINK_TTL_HOURS: i64 = 4;

struct StoredFile {
    content: Bytes,
    metadata: Metadata,
}

/// In-memory remote client for testing
pub struct MemoryClient {
    owner_id: String,
    files: RwLock<HashMap<String, StoredFile>>,
}

impl MemoryClient {
    pub fn new(owner_id: impl Into<String>) -> Self {
        Self {
            owner_id: owner_id.into(),
            files: RwLock::new(HashMap::new()),
        }
    }

    /// Factory handing out the same shared client for any credentials
    pub fn factory(client: Arc<MemoryClient>) -> Arc<dyn ClientFactory> {
        Arc::new(
            move |_credentials: &CredentialSet| -> RemoteResult<Arc<dyn RemoteClient>> {
                let client: Arc<dyn RemoteClient> = client.clone();
                Ok(client)
            },
        )
    }

    /// Whether live (not deleted) content is stored under `key`
    pub async fn contains(&self, key: &str) -> bool {
        let files = self.files.read().await;
        files.get(key).is_some_and(|f| !f.metadata.deleted)
    }

    /// Keys with live content, sorted
    pub async fn keys(&self) -> Vec<String> {
        let files = self.files.read().await;
        let mut keys: Vec<String> = files
            .iter()
            .filter(|(_, f)| !f.metadata.deleted)
            .map(|(k, _)| k.clone())
            .collect();
        keys.sort();
        keys
    }
}

#[async_trait]
impl RemoteClient for MemoryClient {
    #[instrument(skip(self, content), fields(client = "memory", size = content.len()))]
    async fn upload(&self, key: &str, content: Bytes) -> RemoteResult<UploadReceipt> {
        let mut hasher = Sha256::new();
        hasher.update(&content);

        let metadata = Metadata {
            path: key.to_string(),
            size: content.len() as u64,
            mime_type: mime_guess::from_path(key)
                .first_or_octet_stream()
                .to_string(),
            content_hash: hex::encode(hasher.finalize()),
            modified: Some(Utc::now()),
            deleted: false,
        };
        let receipt = UploadReceipt {
            path: key.to_string(),
            size: metadata.size,
            rev: Uuid::new_v4().simple().to_string(),
        };

        let mut files = self.files.write().await;
        files.insert(key.to_string(), StoredFile { content, metadata });

        debug!(key, "File stored");
        Ok(receipt)
    }

    #[instrument(skip(self), fields(client = "memory"))]
    async fn delete(&self, key: &str) -> RemoteResult<()> {
        let mut files = self.files.write().await;
        match files.get_mut(key) {
            Some(file) if !file.metadata.deleted => {
                file.content = Bytes::new();
                file.metadata.deleted = true;
                file.metadata.size = 0;
                file.metadata.modified = Some(Utc::now());
                debug!(key, "File deleted");
                Ok(())
            }
            _ => Err(RemoteError::NotFound(key.to_string())),
        }
    }

    async fn get_metadata(&self, key: &str) -> RemoteResult<Metadata> {
        let files = self.files.read().await;
        files
            .get(key)
            .map(|f| f.metadata.clone())
            .ok_or_else(|| RemoteError::NotFound(key.to_string()))
    }

    async fn get_temporary_link(&self, key: &str) -> RemoteResult<TemporaryLink> {
        let files = self.files.read().await;
        match files.get(key) {
            Some(file) if !file.metadata.deleted => {
                let mut url = ::url::Url::parse("https://content.memory.local")
                    .map_err(|e| RemoteError::Transport(e.to_string()))?;
                url.path_segments_mut()
                    .map_err(|_| RemoteError::Transport("cannot-be-a-base URL".into()))?
                    .push(&Uuid::new_v4().simple().to_string())
                    .extend(key.split('/'));

                Ok(TemporaryLink {
                    url: url.into(),
                    expires_at: Some(Utc::now() + Duration::hours(TEMPORARY_LINK_TTL_HOURS)),
                })
            }
            _ => Err(RemoteError::NotFound(key.to_string())),
        }
    }

    async fn account_info(&self) -> RemoteResult<AccountInfo> {
        Ok(AccountInfo {
            owner_id: self.owner_id.clone(),
            display_name: None,
        })
    }

    async fn download(&self, key: &str) -> RemoteResult<Bytes> {
        let files = self.files.read().await;
        match files.get(key) {
            Some(file) if !file.metadata.deleted => Ok(file.content.clone()),
            _ => Err(RemoteError::NotFound(key.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_client_upload_download() {
        let client = MemoryClient::new("12345");
        let data = Bytes::from("Hello, World!");

        let receipt = client.upload("Public/test.txt", data.clone()).await.unwrap();
        assert_eq!(receipt.path, "Public/test.txt");
        assert_eq!(receipt.size, 13);

        let metadata = client.get_metadata("Public/test.txt").await.unwrap();
        assert_eq!(metadata.mime_type, "text/plain");
        assert!(!metadata.deleted);

        assert_eq!(client.download("Public/test.txt").await.unwrap(), data);
        assert_eq!(client.keys().await, vec!["Public/test.txt"]);
    }

    #[tokio::test]
    async fn test_memory_client_delete_leaves_tombstone() {
        let client = MemoryClient::new("12345");
        client.upload("photo.jpg", Bytes::from("jpeg")).await.unwrap();

        client.delete("photo.jpg").await.unwrap();
        assert!(!client.contains("photo.jpg").await);

        let metadata = client.get_metadata("photo.jpg").await.unwrap();
        assert!(metadata.deleted);

        let err = client.delete("photo.jpg").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_memory_client_not_found() {
        let client = MemoryClient::new("12345");

        assert!(client.get_metadata("missing").await.unwrap_err().is_not_found());
        assert!(client.download("missing").await.unwrap_err().is_not_found());
        assert!(client
            .get_temporary_link("missing")
            .await
            .unwrap_err()
            .is_not_found());
    }

    #[tokio::test]
    async fn test_memory_client_temporary_link() {
        let client = MemoryClient::new("12345");
        client
            .upload("photo with spaces.jpg", Bytes::from("jpeg"))
            .await
            .unwrap();

        let link = client.get_temporary_link("photo with spaces.jpg").await.unwrap();
        assert!(link.url.starts_with("https://content.memory.local/"));
        assert!(link.url.ends_with("/photo%20with%20spaces.jpg"));
        assert!(link.expires_at.is_some());
    }

    #[tokio::test]
    async fn test_factory_shares_client() {
        let client = Arc::new(MemoryClient::new("12345"));
        let factory = MemoryClient::factory(client.clone());
        let credentials = CredentialSet {
            app_key: "a".into(),
            app_secret: "b".into(),
            access_token: "t".into(),
            access_token_secret: "s".into(),
            user_id: "12345".into(),
            access_type: None,
        };

        let connected = factory.connect(&credentials).unwrap();
        connected.upload("shared.txt", Bytes::from("x")).await.unwrap();
        assert!(client.contains("shared.txt").await);

        let account = connected.account_info().await.unwrap();
        assert_eq!(account.owner_id, "12345");
    }

    #[test]
    fn test_not_found_is_distinguishable() {
        assert!(RemoteError::NotFound("x".into()).is_not_found());
        assert!(!RemoteError::Transport("timeout".into()).is_not_found());
        assert!(!RemoteError::Provider {
            status: 409,
            message: "conflict".into()
        }
        .is_not_found());
    }
}
