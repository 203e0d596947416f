//! # clip-dropbox
//!
//! Dropbox storage backend for Clip RS attachments.
//!
//! ## Features
//!
//! - Credential parsing from inline data, files, or open handles, with
//!   environment namespaces and validation on every access
//! - Storage key derivation per style (templates, callbacks, unique names,
//!   folder and `Public/` prefixing)
//! - Public direct links or temporary authenticated links
//! - Queued writes and deletes flushed against a remote client
//!
//! ## Example
//!
//! ```rust,ignore
//! use clip_core::{AttachmentOptions, StorageDefaults};
//! use clip_dropbox::{CredentialSource, DropboxAttachment, DropboxConfig, MemoryClient};
//! use std::sync::Arc;
//!
//! let config = DropboxConfig::new(
//!     CredentialSource::path("config/dropbox.yml"),
//!     StorageDefaults::default().merge("avatar", AttachmentOptions::new())?,
//! )?;
//! let client = Arc::new(MemoryClient::new("12345"));
//!
//! let mut avatar = DropboxAttachment::new(Arc::new(config), MemoryClient::factory(client), user);
//! avatar.assign("photo.jpg", bytes::Bytes::from(data))?;
//! avatar.save().await?;
//! let url = avatar.url("original", UrlOptions::default()).await?;
//! ```

pub mod attachment;
pub mod client;
pub mod credentials;
pub mod interpolation;
pub mod path;
pub mod url_generator;

pub use attachment::{
    DropboxAttachment, DropboxConfig, FlushHook, QueuedWrite, StorageError, StorageResult,
};
pub use client::{
    AccountInfo, ClientFactory, MemoryClient, Metadata, RemoteClient, RemoteError, RemoteResult,
    TemporaryLink, UploadReceipt,
};
pub use credentials::{
    AccessType, CredentialError, CredentialResult, CredentialSet, CredentialSource, Credentials,
};
pub use interpolation::{sanitize_filename, Interpolator};
pub use path::{uses_public_root, KeyPathResolver, PUBLIC_ROOT};
pub use url_generator::{UrlOptions, UrlStrategy, PUBLIC_CONTENT_HOST};
