//! Dropbox Credentials
//!
//! Credentials come from inline YAML data, a YAML file path, an open file
//! handle, or a per-record callback. Files are template-expanded before
//! parsing. A sub-section named after the configured environment replaces
//! the whole document when present.
//!
//! Parsing happens once per attachment instance; validation runs on every
//! `fetch`.

use std::fmt;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use clip_core::Record;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use serde_yaml::{Mapping, Value};
use thiserror::Error;
use tracing::debug;

/// Keys every credential set must carry with a non-null value
pub const REQUIRED_KEYS: [&str; 5] = [
    "app_key",
    "app_secret",
    "access_token",
    "access_token_secret",
    "user_id",
];

/// Credential errors
#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("credentials are not a path, file, nor a mapping: {0}")]
    InvalidSource(String),
    #[error(":{key} credential is missing or nil")]
    MissingCredential { key: String },
    #[error(":{key} credential must be a scalar value")]
    InvalidCredential { key: String },
    #[error(r#":access_type must be either "dropbox" or "app_folder" (was "{value}")"#)]
    InvalidAccessType { value: String },
    #[error("failed to read credentials: {0}")]
    Read(#[from] std::io::Error),
    #[error("failed to parse credentials: {0}")]
    Parse(#[from] serde_yaml::Error),
}

pub type CredentialResult<T> = Result<T, CredentialError>;

/// Whole-account access or an app-private sandbox folder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessType {
    #[default]
    Dropbox,
    AppFolder,
}

impl AccessType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Dropbox => "dropbox",
            Self::AppFolder => "app_folder",
        }
    }

    /// API root the remote client addresses
    pub fn root(&self) -> &'static str {
        match self {
            Self::Dropbox => "dropbox",
            Self::AppFolder => "sandbox",
        }
    }

    pub fn is_sandboxed(&self) -> bool {
        matches!(self, Self::AppFolder)
    }
}

impl FromStr for AccessType {
    type Err = CredentialError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "dropbox" => Ok(Self::Dropbox),
            "app_folder" => Ok(Self::AppFolder),
            other => Err(CredentialError::InvalidAccessType {
                value: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for AccessType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Validated credentials
#[derive(Clone, PartialEq, Eq)]
pub struct CredentialSet {
    pub app_key: String,
    pub app_secret: String,
    pub access_token: String,
    pub access_token_secret: String,
    pub user_id: String,
    pub access_type: Option<AccessType>,
}

impl CredentialSet {
    /// Configured access type, whole-account access when unset
    pub fn access_type(&self) -> AccessType {
        self.access_type.unwrap_or_default()
    }

    fn to_mapping(&self) -> Mapping {
        let mut map = Mapping::new();
        map.insert("app_key".into(), self.app_key.clone().into());
        map.insert("app_secret".into(), self.app_secret.clone().into());
        map.insert("access_token".into(), self.access_token.clone().into());
        map.insert(
            "access_token_secret".into(),
            self.access_token_secret.clone().into(),
        );
        map.insert("user_id".into(), self.user_id.clone().into());
        if let Some(access_type) = self.access_type {
            map.insert("access_type".into(), access_type.as_str().into());
        }
        map
    }
}

impl fmt::Debug for CredentialSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialSet")
            .field("app_key", &self.app_key)
            .field("app_secret", &"[REDACTED]")
            .field("access_token", &"[REDACTED]")
            .field("access_token_secret", &"[REDACTED]")
            .field("user_id", &self.user_id)
            .field("access_type", &self.access_type)
            .finish()
    }
}

/// Per-record credential callback
pub type CredentialCallback = Arc<dyn Fn(&dyn Record) -> CredentialSource + Send + Sync>;

/// Where credentials are read from
#[derive(Clone)]
pub enum CredentialSource {
    /// Structured data, normally a mapping
    Inline(Value),
    /// Path to a YAML document
    Path(PathBuf),
    /// Open file handle; read from the start on every parse
    Handle(Arc<File>),
    /// Evaluated against the owning record
    Dynamic(CredentialCallback),
}

impl CredentialSource {
    pub fn inline(value: impl Into<Value>) -> Self {
        Self::Inline(value.into())
    }

    pub fn path(path: impl AsRef<Path>) -> Self {
        Self::Path(path.as_ref().to_path_buf())
    }

    pub fn handle(file: File) -> Self {
        Self::Handle(Arc::new(file))
    }

    pub fn dynamic<F>(f: F) -> Self
    where
        F: Fn(&dyn Record) -> CredentialSource + Send + Sync + 'static,
    {
        Self::Dynamic(Arc::new(f))
    }
}

impl CredentialSource {
    /// Source that is safe to share between attachment instances.
    ///
    /// A handle has a single cursor, so its document is read once and kept
    /// as inline data. Other sources are returned unchanged.
    pub fn into_shared(self) -> CredentialResult<Self> {
        match self {
            Self::Handle(file) => Ok(Self::Inline(read_handle(&file)?)),
            other => Ok(other),
        }
    }
}

fn read_handle(file: &File) -> CredentialResult<Value> {
    let mut file = file;
    file.seek(SeekFrom::Start(0))?;
    let mut text = String::new();
    file.read_to_string(&mut text)?;
    Ok(serde_yaml::from_str(&expand_template(&text))?)
}

impl From<CredentialSet> for CredentialSource {
    fn from(set: CredentialSet) -> Self {
        Self::Inline(Value::Mapping(set.to_mapping()))
    }
}

impl fmt::Debug for CredentialSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Inline(_) => f.write_str("Inline(..)"),
            Self::Path(p) => f.debug_tuple("Path").field(p).finish(),
            Self::Handle(_) => f.write_str("Handle(..)"),
            Self::Dynamic(_) => f.write_str("Dynamic(..)"),
        }
    }
}

static ENV_BRACES: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("valid env placeholder pattern")
});

static ENV_ERB: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"<%=\s*ENV\[\s*["']([A-Za-z_][A-Za-z0-9_]*)["']\s*\]\s*%>"#)
        .expect("valid erb placeholder pattern")
});

/// Substitute `${VAR}` and `<%= ENV["VAR"] %>` from the process environment.
/// Unset variables expand to the empty string.
pub fn expand_template(text: &str) -> String {
    let lookup = |caps: &Captures| std::env::var(&caps[1]).unwrap_or_default();
    let expanded = ENV_BRACES.replace_all(text, lookup);
    ENV_ERB.replace_all(&expanded, lookup).into_owned()
}

/// Parsed, not yet validated, credential document
#[derive(Debug, Clone)]
pub struct Credentials {
    document: Mapping,
}

impl Credentials {
    /// Read and parse a source, selecting the `environment` sub-section if present.
    ///
    /// `record` is required for dynamic sources.
    pub fn parse(
        source: &CredentialSource,
        environment: Option<&str>,
        record: Option<&dyn Record>,
    ) -> CredentialResult<Self> {
        let document = match source {
            CredentialSource::Dynamic(callback) => {
                let record = record.ok_or_else(|| {
                    CredentialError::InvalidSource("dynamic credentials need a record".into())
                })?;
                match callback(record) {
                    CredentialSource::Dynamic(_) => {
                        return Err(CredentialError::InvalidSource(
                            "dynamic credentials returned another callback".into(),
                        ))
                    }
                    resolved => return Self::parse(&resolved, environment, Some(record)),
                }
            }
            CredentialSource::Inline(value) => value.clone(),
            CredentialSource::Path(path) => {
                debug!(path = %path.display(), "Reading credentials file");
                let text = std::fs::read_to_string(path)?;
                serde_yaml::from_str(&expand_template(&text))?
            }
            CredentialSource::Handle(file) => read_handle(file)?,
        };

        let mut document = match document {
            Value::Mapping(map) => map,
            other => return Err(CredentialError::InvalidSource(describe(&other))),
        };

        if let Some(env) = environment {
            if let Some(Value::Mapping(section)) = document.get(env) {
                debug!(environment = env, "Using namespaced credentials");
                document = section.clone();
            }
        }

        Ok(Self { document })
    }

    /// Validate and return the credential set
    pub fn fetch(&self) -> CredentialResult<CredentialSet> {
        let [app_key, app_secret, access_token, access_token_secret, user_id] =
            REQUIRED_KEYS.map(|key| required(&self.document, key));

        Ok(CredentialSet {
            app_key: app_key?,
            app_secret: app_secret?,
            access_token: access_token?,
            access_token_secret: access_token_secret?,
            user_id: user_id?,
            access_type: access_type(&self.document)?,
        })
    }

    pub fn document(&self) -> &Mapping {
        &self.document
    }
}

/// Parse and validate in one step
pub fn resolve(
    source: &CredentialSource,
    environment: Option<&str>,
    record: Option<&dyn Record>,
) -> CredentialResult<CredentialSet> {
    Credentials::parse(source, environment, record)?.fetch()
}

fn required(document: &Mapping, key: &str) -> CredentialResult<String> {
    match document.get(key) {
        None | Some(Value::Null) => Err(CredentialError::MissingCredential {
            key: key.to_string(),
        }),
        Some(Value::String(s)) => Ok(s.clone()),
        Some(Value::Number(n)) => Ok(n.to_string()),
        Some(Value::Bool(b)) => Ok(b.to_string()),
        Some(_) => Err(CredentialError::InvalidCredential {
            key: key.to_string(),
        }),
    }
}

fn access_type(document: &Mapping) -> CredentialResult<Option<AccessType>> {
    match document.get("access_type") {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => s.parse().map(Some),
        Some(other) => Err(CredentialError::InvalidAccessType {
            value: describe(other),
        }),
    }
}

fn describe(value: &Value) -> String {
    serde_yaml::to_string(value)
        .map(|s| s.trim().to_string())
        .unwrap_or_else(|_| format!("{:?}", value))
}
