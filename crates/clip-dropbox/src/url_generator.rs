//! URL generation
//!
//! Whole-account storage with public visibility is served straight from the
//! public content host; everything else goes through provider-issued
//! temporary links.

use clip_core::Visibility;
use tracing::{debug, warn};

use crate::client::RemoteClient;
use crate::credentials::AccessType;
use crate::interpolation::Interpolator;
use crate::path::{uses_public_root, PUBLIC_ROOT};

/// Host serving the `Public/` folder of whole-account storage
pub const PUBLIC_CONTENT_HOST: &str = "https://dl.dropboxusercontent.com";

/// Query parameter forcing a download instead of inline display
pub const DOWNLOAD_PARAM: &str = "dl=1";

/// Per-request URL options
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UrlOptions {
    pub download: bool,
}

impl UrlOptions {
    pub fn download() -> Self {
        Self { download: true }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UrlStrategy {
    /// Direct link on the public content host
    Public,
    /// Temporary authenticated link
    Private,
}

impl UrlStrategy {
    pub fn select(access_type: AccessType, visibility: Visibility) -> Self {
        if uses_public_root(access_type, visibility) {
            Self::Public
        } else {
            Self::Private
        }
    }

    /// URL for a stored key, `None` when no link can be produced.
    ///
    /// Remote failures are logged and reported as `None`.
    pub async fn generate(
        &self,
        key: &str,
        owner_id: &str,
        client: &dyn RemoteClient,
        options: UrlOptions,
    ) -> Option<String> {
        let url = match self {
            Self::Public => public_url(owner_id, key),
            Self::Private => match client.get_temporary_link(key).await {
                Ok(link) => Some(link.url),
                Err(e) => {
                    warn!(key, error = %e, "Failed to get temporary link");
                    None
                }
            },
        }?;

        debug!(key, strategy = ?self, "Generated URL");
        Some(if options.download {
            with_download(&url)
        } else {
            url
        })
    }
}

/// `Public/photos/a b.jpg` -> `https://dl.dropboxusercontent.com/u/{owner}/photos/a%20b.jpg`
pub fn public_url(owner_id: &str, key: &str) -> Option<String> {
    let relative = key
        .strip_prefix(PUBLIC_ROOT)
        .and_then(|k| k.strip_prefix('/'))
        .unwrap_or(key);

    let mut url = ::url::Url::parse(PUBLIC_CONTENT_HOST).ok()?;
    url.path_segments_mut()
        .ok()?
        .pop_if_empty()
        .push("u")
        .push(owner_id)
        .extend(relative.split('/'));

    Some(url.into())
}

/// Append the download marker, keeping any existing query and fragment
pub fn with_download(url: &str) -> String {
    match ::url::Url::parse(url) {
        Ok(mut parsed) => {
            let query = match parsed.query() {
                Some(q) if !q.is_empty() => format!("{}&{}", q, DOWNLOAD_PARAM),
                _ => DOWNLOAD_PARAM.to_string(),
            };
            parsed.set_query(Some(&query));
            parsed.into()
        }
        Err(_) => {
            let (base, fragment) = match url.split_once('#') {
                Some((base, fragment)) => (base, Some(fragment)),
                None => (url, None),
            };
            let separator = if !base.contains('?') {
                "?"
            } else if base.ends_with('?') || base.ends_with('&') {
                ""
            } else {
                "&"
            };

            let mut result = format!("{}{}{}", base, separator, DOWNLOAD_PARAM);
            if let Some(fragment) = fragment {
                result.push('#');
                result.push_str(fragment);
            }
            result
        }
    }
}

/// Fallback URL for an unattached file, if one is configured
pub fn default_url(
    pattern: Option<&str>,
    interpolator: &Interpolator<'_>,
    style: &str,
) -> Option<String> {
    pattern.map(|p| interpolator.interpolate(p, style))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{MockRemoteClient, RemoteError, TemporaryLink};
    use clip_core::Record;

    #[test]
    fn test_select_strategy() {
        assert_eq!(
            UrlStrategy::select(AccessType::Dropbox, Visibility::Public),
            UrlStrategy::Public
        );
        assert_eq!(
            UrlStrategy::select(AccessType::Dropbox, Visibility::Private),
            UrlStrategy::Private
        );
        assert_eq!(
            UrlStrategy::select(AccessType::AppFolder, Visibility::Public),
            UrlStrategy::Private
        );
        assert_eq!(
            UrlStrategy::select(AccessType::AppFolder, Visibility::Private),
            UrlStrategy::Private
        );
    }

    #[test]
    fn test_public_url_strips_public_root() {
        assert_eq!(
            public_url("12345", "Public/photo.jpg").as_deref(),
            Some("https://dl.dropboxusercontent.com/u/12345/photo.jpg")
        );
        assert_eq!(
            public_url("12345", "Public/avatars/photo_with spaces.jpg").as_deref(),
            Some("https://dl.dropboxusercontent.com/u/12345/avatars/photo_with%20spaces.jpg")
        );
    }

    #[test]
    fn test_with_download() {
        assert_eq!(
            with_download("https://example.com/photo.jpg"),
            "https://example.com/photo.jpg?dl=1"
        );
        assert_eq!(
            with_download("https://example.com/photo.jpg?rev=2"),
            "https://example.com/photo.jpg?rev=2&dl=1"
        );
        assert_eq!(
            with_download("https://example.com/photo.jpg?rev=2#top"),
            "https://example.com/photo.jpg?rev=2&dl=1#top"
        );
        assert_eq!(with_download("/missing.png"), "/missing.png?dl=1");
        assert_eq!(with_download("/missing.png?v=1"), "/missing.png?v=1&dl=1");
        assert_eq!(with_download("/missing.png#x"), "/missing.png?dl=1#x");
    }

    #[test]
    fn test_with_download_stays_parseable() {
        let url = with_download("https://example.com/a.jpg?x=1");
        let parsed = ::url::Url::parse(&url).unwrap();
        let pairs: Vec<(String, String)> = parsed
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        assert_eq!(
            pairs,
            vec![
                ("x".to_string(), "1".to_string()),
                ("dl".to_string(), "1".to_string())
            ]
        );
    }

    #[tokio::test]
    async fn test_public_strategy_does_not_call_client() {
        let client = MockRemoteClient::new();

        let url = UrlStrategy::Public
            .generate("Public/photo.jpg", "12345", &client, UrlOptions::download())
            .await;
        assert_eq!(
            url.as_deref(),
            Some("https://dl.dropboxusercontent.com/u/12345/photo.jpg?dl=1")
        );
    }

    #[tokio::test]
    async fn test_private_strategy_uses_temporary_link() {
        let mut client = MockRemoteClient::new();
        client
            .expect_get_temporary_link()
            .withf(|key| key == "photo.jpg")
            .times(1)
            .returning(|_| {
                Ok(TemporaryLink {
                    url: "https://dl.dropboxusercontent.com/apitl/1/abc".into(),
                    expires_at: None,
                })
            });

        let url = UrlStrategy::Private
            .generate("photo.jpg", "12345", &client, UrlOptions::default())
            .await;
        assert_eq!(
            url.as_deref(),
            Some("https://dl.dropboxusercontent.com/apitl/1/abc")
        );
    }

    #[tokio::test]
    async fn test_private_strategy_swallows_remote_errors() {
        let mut client = MockRemoteClient::new();
        client
            .expect_get_temporary_link()
            .returning(|key| Err(RemoteError::NotFound(key.to_string())));

        let url = UrlStrategy::Private
            .generate("photo.jpg", "12345", &client, UrlOptions::download())
            .await;
        assert_eq!(url, None);
    }

    struct Post;

    impl Record for Post {
        fn id(&self) -> Option<i64> {
            None
        }

        fn type_name(&self) -> &str {
            "Post"
        }
    }

    #[test]
    fn test_default_url_is_interpolated() {
        let interpolator = Interpolator::new(&Post, "attachment", None);

        assert_eq!(
            default_url(Some("/:style/missing.png"), &interpolator, "thumb").as_deref(),
            Some("/thumb/missing.png")
        );
        assert_eq!(
            default_url(Some("http://some-url.com"), &interpolator, "medium").as_deref(),
            Some("http://some-url.com")
        );
        assert_eq!(default_url(None, &interpolator, "thumb"), None);
    }
}
