//! Dropbox Attachment
//!
//! One `DropboxAttachment` exists per record and attachment field. It queues
//! writes when a file is assigned and deletes when a stored file is replaced
//! or cleared, and flushes both queues against the remote client when the
//! record is saved or destroyed.
//!
//! Credentials are parsed and the client is built at most once per instance;
//! credentials are re-validated on every access.

use std::path::Path;
use std::sync::Arc;

use bytes::Bytes;
use clip_core::{AttachmentConfig, Record};
use once_cell::sync::OnceCell;
use thiserror::Error;
use tokio::fs;
use tracing::{debug, info, instrument, warn};

use crate::client::{AccountInfo, ClientFactory, RemoteClient, RemoteError};
use crate::credentials::{
    self, CredentialError, CredentialResult, CredentialSet, CredentialSource, Credentials,
};
use crate::interpolation::{sanitize_filename, Interpolator};
use crate::path::{uses_public_root, KeyPathResolver};
use crate::url_generator::{default_url, UrlOptions, UrlStrategy};

/// Storage errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Credential error: {0}")]
    Credentials(#[from] CredentialError),
    #[error("Remote error: {0}")]
    Remote(#[from] RemoteError),
    #[error("File already exists at {key}")]
    KeyAlreadyExists { key: String },
    #[error("Failed to delete {} file(s): {}", .keys.len(), .keys.join(", "))]
    DeletesFailed { keys: Vec<String> },
    #[error("No file attached")]
    NotAttached,
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Account mismatch: configured user_id {expected}, remote account {actual}")]
    AccountMismatch { expected: String, actual: String },
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Storage configuration for one attachment field of a model
#[derive(Debug, Clone)]
pub struct DropboxConfig {
    credentials: CredentialSource,
    attachment: AttachmentConfig,
}

impl DropboxConfig {
    /// Build the configuration, rejecting invalid static credentials.
    ///
    /// File handles are read here once, so instances never share a cursor.
    pub fn new(
        credentials: CredentialSource,
        attachment: AttachmentConfig,
    ) -> CredentialResult<Self> {
        let config = Self {
            credentials: credentials.into_shared()?,
            attachment,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn credentials(&self) -> &CredentialSource {
        &self.credentials
    }

    pub fn attachment(&self) -> &AttachmentConfig {
        &self.attachment
    }

    /// Parse and validate static credentials.
    ///
    /// Dynamic sources depend on the record and are only checked per instance.
    pub fn validate(&self) -> CredentialResult<()> {
        if matches!(self.credentials, CredentialSource::Dynamic(_)) {
            return Ok(());
        }
        credentials::resolve(
            &self.credentials,
            self.attachment.environment.as_deref(),
            None,
        )
        .map(|_| ())
    }
}

/// A pending upload
#[derive(Debug, Clone)]
pub struct QueuedWrite {
    pub style: String,
    pub content: Bytes,
    pub original_filename: String,
}

/// Called with the stored keys after a successful write flush
pub type FlushHook = Arc<dyn Fn(&[String]) + Send + Sync>;

/// Attachment of one record, stored on Dropbox
pub struct DropboxAttachment {
    config: Arc<DropboxConfig>,
    factory: Arc<dyn ClientFactory>,
    record: Arc<dyn Record>,
    original_filename: Option<String>,
    /// Filename whose keys are currently stored remotely
    stored_filename: Option<String>,
    queued_for_write: Vec<QueuedWrite>,
    queued_for_delete: Vec<String>,
    credentials: OnceCell<Credentials>,
    client: OnceCell<Arc<dyn RemoteClient>>,
    after_flush_writes: Option<FlushHook>,
}

impl DropboxAttachment {
    pub fn new(
        config: Arc<DropboxConfig>,
        factory: Arc<dyn ClientFactory>,
        record: Arc<dyn Record>,
    ) -> Self {
        Self {
            config,
            factory,
            record,
            original_filename: None,
            stored_filename: None,
            queued_for_write: Vec::new(),
            queued_for_delete: Vec::new(),
            credentials: OnceCell::new(),
            client: OnceCell::new(),
            after_flush_writes: None,
        }
    }

    /// Attachment whose file is already stored under `original_filename`.
    /// The name is sanitized the same way `assign` does it.
    pub fn with_stored_file(mut self, original_filename: &str) -> Self {
        let filename = sanitize_filename(original_filename);
        self.original_filename = Some(filename.clone());
        self.stored_filename = Some(filename);
        self
    }

    pub fn on_after_flush_writes<F>(mut self, hook: F) -> Self
    where
        F: Fn(&[String]) + Send + Sync + 'static,
    {
        self.after_flush_writes = Some(Arc::new(hook));
        self
    }

    pub fn name(&self) -> &str {
        &self.config.attachment.name
    }

    pub fn config(&self) -> &AttachmentConfig {
        &self.config.attachment
    }

    pub fn original_filename(&self) -> Option<&str> {
        self.original_filename.as_deref()
    }

    pub fn is_attached(&self) -> bool {
        self.original_filename.is_some()
    }

    pub fn queued_for_write(&self) -> &[QueuedWrite] {
        &self.queued_for_write
    }

    pub fn queued_for_delete(&self) -> &[String] {
        &self.queued_for_delete
    }

    /// Validated credentials for this instance
    pub fn credentials(&self) -> StorageResult<CredentialSet> {
        let parsed = self.credentials.get_or_try_init(|| {
            Credentials::parse(
                &self.config.credentials,
                self.config.attachment.environment.as_deref(),
                Some(self.record.as_ref()),
            )
        })?;
        Ok(parsed.fetch()?)
    }

    /// Remote client, connected on first use
    pub fn client(&self) -> StorageResult<Arc<dyn RemoteClient>> {
        let credentials = self.credentials()?;
        let client = self.client.get_or_try_init(|| {
            debug!(
                attachment = %self.name(),
                root = credentials.access_type().root(),
                "Connecting remote client"
            );
            self.factory.connect(&credentials)
        })?;
        Ok(Arc::clone(client))
    }

    /// Whether keys of this attachment live under `Public/`
    pub fn public_root(&self) -> StorageResult<bool> {
        let credentials = self.credentials()?;
        Ok(uses_public_root(
            credentials.access_type(),
            self.config.attachment.visibility,
        ))
    }

    pub fn url_strategy(&self) -> StorageResult<UrlStrategy> {
        let credentials = self.credentials()?;
        Ok(UrlStrategy::select(
            credentials.access_type(),
            self.config.attachment.visibility,
        ))
    }

    fn resolver(&self) -> KeyPathResolver<'_> {
        KeyPathResolver::new(&self.config.attachment, self.record.as_ref())
    }

    /// Storage key of a style, `None` when nothing is attached
    pub fn path(&self, style: &str) -> StorageResult<Option<String>> {
        match &self.original_filename {
            Some(filename) => {
                let public_root = self.public_root()?;
                Ok(Some(self.resolver().resolve(style, filename, public_root)))
            }
            None => Ok(None),
        }
    }

    /// Storage key of a style without the `Public/` root
    pub fn path_for_url(&self, style: &str) -> Option<String> {
        self.original_filename
            .as_deref()
            .map(|filename| self.resolver().path_for_url(style, filename))
    }

    /// Assign a new file, replacing the current one
    #[instrument(skip(self, content), fields(attachment = %self.config.attachment.name))]
    pub fn assign(&mut self, filename: &str, content: Bytes) -> StorageResult<()> {
        self.queue_stored_for_delete()?;

        let filename = sanitize_filename(filename);
        self.queued_for_write.clear();
        self.queued_for_write.push(QueuedWrite {
            style: self.config.attachment.default_style.clone(),
            content,
            original_filename: filename.clone(),
        });
        self.original_filename = Some(filename);

        debug!(filename = ?self.original_filename, "File assigned");
        Ok(())
    }

    /// Queue a processed rendition of the assigned file
    pub fn queue_write(&mut self, style: &str, content: Bytes) -> StorageResult<()> {
        let original_filename = self
            .original_filename
            .clone()
            .ok_or(StorageError::NotAttached)?;

        self.queued_for_write.retain(|w| w.style != style);
        self.queued_for_write.push(QueuedWrite {
            style: style.to_string(),
            content,
            original_filename,
        });
        Ok(())
    }

    /// Detach the current file; stored keys are queued for deletion
    pub fn clear(&mut self) -> StorageResult<()> {
        self.queue_stored_for_delete()?;
        self.queued_for_write.clear();
        self.original_filename = None;
        Ok(())
    }

    /// Queue every style of the stored file for deletion. A file that was
    /// assigned but never flushed has nothing stored and is only dropped.
    fn queue_stored_for_delete(&mut self) -> StorageResult<()> {
        let Some(filename) = self.stored_filename.clone() else {
            return Ok(());
        };

        let public_root = self.public_root()?;
        let keys: Vec<String> = {
            let resolver = self.resolver();
            self.config
                .attachment
                .styles
                .iter()
                .map(|style| resolver.resolve(style, &filename, public_root))
                .collect()
        };

        for key in keys {
            if !self.queued_for_delete.contains(&key) {
                self.queued_for_delete.push(key);
            }
        }
        self.stored_filename = None;
        Ok(())
    }

    /// Flush deletes, then writes
    pub async fn save(&mut self) -> StorageResult<Vec<String>> {
        self.flush_deletes().await?;
        self.flush_writes().await
    }

    /// Clear the attachment and delete its stored files
    pub async fn destroy(&mut self) -> StorageResult<()> {
        self.clear()?;
        self.flush_deletes().await
    }

    /// Upload queued writes.
    ///
    /// Every key is checked before anything is uploaded, and an existing key
    /// is never overwritten unless unique filenames apply. Unique names need a
    /// record id; without one the key is shared and checked like any other.
    /// On an upload failure the writes that already succeeded leave the queue.
    #[instrument(skip(self), fields(attachment = %self.config.attachment.name))]
    pub async fn flush_writes(&mut self) -> StorageResult<Vec<String>> {
        let mut written = Vec::with_capacity(self.queued_for_write.len());

        if !self.queued_for_write.is_empty() {
            let client = self.client()?;
            let public_root = self.public_root()?;
            let pending: Vec<(String, String, Bytes)> = {
                let resolver = self.resolver();
                self.queued_for_write
                    .iter()
                    .map(|w| {
                        let key = resolver.resolve(&w.style, &w.original_filename, public_root);
                        (key, w.style.clone(), w.content.clone())
                    })
                    .collect()
            };

            let unique = self.config.attachment.unique_filename && self.record.id().is_some();
            if !unique {
                for (key, _, _) in &pending {
                    if remote_exists(client.as_ref(), key).await? {
                        warn!(key = %key, "Refusing to overwrite existing file");
                        return Err(StorageError::KeyAlreadyExists { key: key.clone() });
                    }
                }
            }

            for (done, (key, style, content)) in pending.into_iter().enumerate() {
                match client.upload(&key, content).await {
                    Ok(receipt) => {
                        info!(key = %receipt.path, size = receipt.size, style = %style, "File uploaded");
                        written.push(receipt.path);
                    }
                    Err(e) => {
                        warn!(key = %key, error = %e, "Upload failed");
                        if done > 0 {
                            self.queued_for_write.drain(..done);
                            self.stored_filename = self.original_filename.clone();
                        }
                        return Err(e.into());
                    }
                }
            }
            self.stored_filename = self.original_filename.clone();
        }

        if let Some(hook) = &self.after_flush_writes {
            hook(&written);
        }
        self.queued_for_write.clear();
        Ok(written)
    }

    /// Delete queued keys.
    ///
    /// Keys that are already gone count as deleted. Every key is attempted
    /// and the queue is cleared even when some deletes fail; failed keys are
    /// reported, not requeued.
    #[instrument(skip(self), fields(attachment = %self.config.attachment.name))]
    pub async fn flush_deletes(&mut self) -> StorageResult<()> {
        if self.queued_for_delete.is_empty() {
            return Ok(());
        }

        let client = self.client()?;
        let queued = std::mem::take(&mut self.queued_for_delete);
        let mut failed = Vec::new();

        for key in queued {
            match client.delete(&key).await {
                Ok(()) => info!(key = %key, "File deleted"),
                Err(e) if e.is_not_found() => debug!(key = %key, "File already absent"),
                Err(e) => {
                    warn!(key = %key, error = %e, "Failed to delete file");
                    failed.push(key);
                }
            }
        }

        if failed.is_empty() {
            Ok(())
        } else {
            Err(StorageError::DeletesFailed { keys: failed })
        }
    }

    /// Whether the style is stored remotely; `false` when nothing is attached
    pub async fn exists(&self, style: &str) -> StorageResult<bool> {
        match self.path(style)? {
            Some(key) => remote_exists(self.client()?.as_ref(), &key).await,
            None => Ok(false),
        }
    }

    /// URL of a style.
    ///
    /// Unattached files fall back to the interpolated `default_url`; remote
    /// failures yield `None`.
    #[instrument(skip(self), fields(attachment = %self.config.attachment.name))]
    pub async fn url(&self, style: &str, options: UrlOptions) -> StorageResult<Option<String>> {
        let Some(filename) = self.original_filename.as_deref() else {
            let interpolator =
                Interpolator::new(self.record.as_ref(), &self.config.attachment.name, None);
            return Ok(default_url(
                self.config.attachment.default_url.as_deref(),
                &interpolator,
                style,
            ));
        };

        let credentials = self.credentials()?;
        let client = self.client()?;
        let strategy = UrlStrategy::select(
            credentials.access_type(),
            self.config.attachment.visibility,
        );
        let key = self
            .resolver()
            .resolve(style, filename, strategy == UrlStrategy::Public);

        Ok(strategy
            .generate(&key, &credentials.user_id, client.as_ref(), options)
            .await)
    }

    /// Download a stored style to a local file
    #[instrument(skip(self, destination), fields(attachment = %self.config.attachment.name))]
    pub async fn copy_to_local_file(
        &self,
        style: &str,
        destination: impl AsRef<Path>,
    ) -> StorageResult<()> {
        let key = self.path(style)?.ok_or(StorageError::NotAttached)?;
        let content = self.client()?.download(&key).await?;

        let destination = destination.as_ref();
        if let Some(parent) = destination.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(destination, &content).await?;

        debug!(key = %key, destination = %destination.display(), "Copied to local file");
        Ok(())
    }

    /// Check the configured `user_id` against the remote account
    pub async fn verify_account(&self) -> StorageResult<AccountInfo> {
        let credentials = self.credentials()?;
        let account = self.client()?.account_info().await?;

        if account.owner_id != credentials.user_id {
            return Err(StorageError::AccountMismatch {
                expected: credentials.user_id,
                actual: account.owner_id,
            });
        }
        Ok(account)
    }
}

async fn remote_exists(client: &dyn RemoteClient, key: &str) -> StorageResult<bool> {
    match client.get_metadata(key).await {
        Ok(metadata) => Ok(!metadata.deleted),
        Err(e) if e.is_not_found() => Ok(false),
        Err(e) => Err(e.into()),
    }
}
