//! Storage key derivation
//!
//! A key is recomputed on demand from the attachment configuration, the
//! style, the owning record, and the original filename:
//!
//! 1. A path template is interpolated and used as written.
//! 2. Otherwise a base path comes from the path callback, the unique
//!    `{param_key}_{id}_{attachment}` name, or the filename without its
//!    extension. Non-default styles get a `_{style}` suffix placed before the
//!    original extension, which is appended if the base lacks it.
//! 3. The configured folder is prepended.
//! 4. Whole-account public storage lives under `Public/`.

use clip_core::{AttachmentConfig, PathOption, Record, Visibility};
use tracing::trace;

use crate::credentials::AccessType;
use crate::interpolation::{split_extension, Interpolator};

/// Top-level folder served by the public content host
pub const PUBLIC_ROOT: &str = "Public";

/// Whether keys live under `Public/`. Sandboxed access never does.
pub fn uses_public_root(access_type: AccessType, visibility: Visibility) -> bool {
    access_type == AccessType::Dropbox && visibility == Visibility::Public
}

/// Computes storage keys for one record's attachment
pub struct KeyPathResolver<'a> {
    config: &'a AttachmentConfig,
    record: &'a dyn Record,
}

impl<'a> KeyPathResolver<'a> {
    pub fn new(config: &'a AttachmentConfig, record: &'a dyn Record) -> Self {
        Self { config, record }
    }

    /// Full storage key
    pub fn resolve(&self, style: &str, original_filename: &str, public_root: bool) -> String {
        let path = self.path_for_url(style, original_filename);
        if public_root {
            format!("{}/{}", PUBLIC_ROOT, path)
        } else {
            path
        }
    }

    /// Storage key without the `Public/` root
    pub fn path_for_url(&self, style: &str, original_filename: &str) -> String {
        let path = match &self.config.path {
            Some(PathOption::Template(template)) => {
                Interpolator::new(self.record, &self.config.name, Some(original_filename))
                    .interpolate(template, style)
            }
            Some(PathOption::Callback(callback)) => {
                self.with_style(&callback(style, self.record), style, original_filename)
            }
            None if self.config.unique_filename => {
                let base = format!(
                    "{}_{}_{}",
                    self.record.param_key(),
                    self.record.id().map(|id| id.to_string()).unwrap_or_default(),
                    self.config.name
                );
                self.with_style(&base, style, original_filename)
            }
            None => {
                let (stem, _) = split_extension(original_filename);
                self.with_style(stem, style, original_filename)
            }
        };

        let key = match &self.config.folder {
            Some(folder) => format!("{}/{}", folder, path.trim_start_matches('/')),
            None => path,
        };

        trace!(style, key = %key, "Resolved storage key");
        key
    }

    fn with_style(&self, base: &str, style: &str, original_filename: &str) -> String {
        let suffix = if self.config.is_default_style(style) {
            String::new()
        } else {
            format!("_{}", style)
        };

        match split_extension(original_filename).1 {
            Some(ext) => {
                let dotted = format!(".{}", ext);
                match base.strip_suffix(&dotted) {
                    Some(stem) => format!("{}{}{}", stem, suffix, dotted),
                    None => format!("{}{}{}", base, suffix, dotted),
                }
            }
            None => format!("{}{}", base, suffix),
        }
    }
}
