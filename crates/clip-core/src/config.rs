//! Attachment configuration
//!
//! Framework-wide `StorageDefaults` are merged with per-model
//! `AttachmentOptions` exactly once, producing an immutable
//! `AttachmentConfig` that is shared by every attachment instance of the model.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ConfigError;
use crate::traits::Record;

/// Style every attachment has; it carries no suffix in derived keys
pub const DEFAULT_STYLE: &str = "original";

/// Whether stored files are served by direct public link or temporary link
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    #[default]
    Public,
    Private,
}

impl Visibility {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Public => "public",
            Self::Private => "private",
        }
    }
}

impl FromStr for Visibility {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "public" => Ok(Self::Public),
            "private" => Ok(Self::Private),
            other => Err(ConfigError::invalid(
                "visibility",
                format!(r#"must be either "public" or "private" (was "{}")"#, other),
            )),
        }
    }
}

impl fmt::Display for Visibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Per-instance key callback: `(style, record) -> path`
pub type PathCallback = Arc<dyn Fn(&str, &dyn Record) -> String + Send + Sync>;

/// Explicit key derivation configured on a model
#[derive(Clone)]
pub enum PathOption {
    /// Interpolated template such as `":style/:class_:filename"`
    Template(String),
    /// Callback evaluated against the owning record
    Callback(PathCallback),
}

impl PathOption {
    pub fn template(template: impl Into<String>) -> Self {
        Self::Template(template.into())
    }

    pub fn callback<F>(f: F) -> Self
    where
        F: Fn(&str, &dyn Record) -> String + Send + Sync + 'static,
    {
        Self::Callback(Arc::new(f))
    }
}

impl fmt::Debug for PathOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Template(t) => f.debug_tuple("Template").field(t).finish(),
            Self::Callback(_) => f.write_str("Callback(..)"),
        }
    }
}

/// Framework-wide defaults, overridden by model-level options
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageDefaults {
    pub visibility: Visibility,
    /// Credential namespace, e.g. `"production"`
    pub environment: Option<String>,
    pub default_style: String,
    pub default_url: Option<String>,
    pub unique_filename: bool,
    pub folder: Option<String>,
}

impl Default for StorageDefaults {
    fn default() -> Self {
        Self {
            visibility: Visibility::Public,
            environment: None,
            default_style: DEFAULT_STYLE.to_string(),
            default_url: None,
            unique_filename: false,
            folder: None,
        }
    }
}

impl StorageDefaults {
    /// Load defaults from environment variables (and a `.env` file, if any)
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let mut defaults = Self::default();

        if let Ok(visibility) = std::env::var("CLIP_DROPBOX_VISIBILITY") {
            defaults.visibility = visibility.parse()?;
        }
        if let Ok(env) = std::env::var("CLIP_ENV") {
            defaults.environment = Some(env).filter(|e| !e.is_empty());
        }
        if let Ok(folder) = std::env::var("CLIP_DROPBOX_FOLDER") {
            defaults.folder = Some(folder).filter(|f| !f.is_empty());
        }
        if let Ok(url) = std::env::var("CLIP_DEFAULT_URL") {
            defaults.default_url = Some(url).filter(|u| !u.is_empty());
        }
        if let Ok(v) = std::env::var("CLIP_UNIQUE_FILENAME") {
            defaults.unique_filename = match v.as_str() {
                "true" | "1" | "yes" => true,
                "false" | "0" | "no" | "" => false,
                other => {
                    return Err(ConfigError::invalid(
                        "unique_filename",
                        format!("expected a boolean (was \"{}\")", other),
                    ))
                }
            };
        }

        debug!(visibility = %defaults.visibility, environment = ?defaults.environment, "Storage defaults loaded");
        Ok(defaults)
    }

    /// Produce the immutable configuration for one attachment field
    pub fn merge(
        &self,
        name: impl Into<String>,
        options: AttachmentOptions,
    ) -> Result<AttachmentConfig, ConfigError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(ConfigError::MissingOption("name".to_string()));
        }

        let default_style = options
            .default_style
            .unwrap_or_else(|| self.default_style.clone());
        if default_style.is_empty() {
            return Err(ConfigError::invalid("default_style", "must not be empty"));
        }

        let folder = options
            .folder
            .or_else(|| self.folder.clone())
            .map(|f| f.trim_matches('/').to_string())
            .filter(|f| !f.is_empty());

        if let Some(PathOption::Template(t)) = &options.path {
            if t.is_empty() {
                return Err(ConfigError::invalid("path", "template must not be empty"));
            }
        }

        let mut styles = vec![default_style.clone()];
        for style in options.styles {
            if style.is_empty() {
                return Err(ConfigError::invalid("styles", "style names must not be empty"));
            }
            if !styles.contains(&style) {
                styles.push(style);
            }
        }

        debug!(attachment = %name, styles = ?styles, folder = ?folder, "Attachment configured");

        Ok(AttachmentConfig {
            name,
            path: options.path,
            unique_filename: options.unique_filename.unwrap_or(self.unique_filename),
            folder,
            visibility: options.visibility.unwrap_or(self.visibility),
            environment: options.environment.or_else(|| self.environment.clone()),
            default_style,
            default_url: options.default_url.or_else(|| self.default_url.clone()),
            styles,
        })
    }
}

/// Model-level options; unset fields fall back to `StorageDefaults`
#[derive(Debug, Clone, Default)]
pub struct AttachmentOptions {
    pub path: Option<PathOption>,
    pub unique_filename: Option<bool>,
    pub folder: Option<String>,
    pub visibility: Option<Visibility>,
    pub environment: Option<String>,
    pub default_style: Option<String>,
    pub default_url: Option<String>,
    pub styles: Vec<String>,
}

impl AttachmentOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn path(mut self, path: PathOption) -> Self {
        self.path = Some(path);
        self
    }

    pub fn unique_filename(mut self, unique: bool) -> Self {
        self.unique_filename = Some(unique);
        self
    }

    pub fn folder(mut self, folder: impl Into<String>) -> Self {
        self.folder = Some(folder.into());
        self
    }

    pub fn visibility(mut self, visibility: Visibility) -> Self {
        self.visibility = Some(visibility);
        self
    }

    pub fn environment(mut self, environment: impl Into<String>) -> Self {
        self.environment = Some(environment.into());
        self
    }

    pub fn default_style(mut self, style: impl Into<String>) -> Self {
        self.default_style = Some(style.into());
        self
    }

    pub fn default_url(mut self, url: impl Into<String>) -> Self {
        self.default_url = Some(url.into());
        self
    }

    pub fn style(mut self, style: impl Into<String>) -> Self {
        self.styles.push(style.into());
        self
    }
}

/// Immutable per-attachment configuration
#[derive(Debug, Clone)]
pub struct AttachmentConfig {
    /// Attachment field name on the model, e.g. `"avatar"`
    pub name: String,
    pub path: Option<PathOption>,
    pub unique_filename: bool,
    /// Prefix segment without surrounding slashes
    pub folder: Option<String>,
    pub visibility: Visibility,
    pub environment: Option<String>,
    pub default_style: String,
    pub default_url: Option<String>,
    /// All styles, default style first
    pub styles: Vec<String>,
}

impl AttachmentConfig {
    pub fn is_default_style(&self, style: &str) -> bool {
        style == self.default_style
    }

    pub fn has_style(&self, style: &str) -> bool {
        self.styles.iter().any(|s| s == style)
    }
}
