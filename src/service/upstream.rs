//! Upstream JSON source consumed by the fetch service.
//!
//! [`Upstream`] is the seam between the registry and whatever produces
//! values. [`HttpUpstream`] implements it over `reqwest`; tests plug in an
//! in-process fake.

use std::collections::BTreeMap;

use async_trait::async_trait;
use url::Url;

/// Failure of a single upstream call.
#[derive(Debug, thiserror::Error)]
pub enum UpstreamFailure {
    /// The request could not be sent or the body could not be decoded.
    #[error("upstream request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The path could not be joined onto the base URL.
    #[error("invalid upstream path `{path}`: {source}")]
    InvalidPath {
        /// Offending path.
        path: String,
        /// Join failure.
        source: url::ParseError,
    },

    /// The path resolves outside the configured base URL.
    #[error("upstream path `{path}` escapes the base URL")]
    OutsideBase {
        /// Offending path.
        path: String,
    },

    /// The upstream answered with a non-success status.
    #[error("upstream responded {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body text (possibly truncated).
        body: String,
    },
}

impl UpstreamFailure {
    /// HTTP status of the failure, when it was an HTTP response.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            Self::Request(err) => err.status().map(|s| s.as_u16()),
            Self::InvalidPath { .. } | Self::OutsideBase { .. } => None,
        }
    }

    /// Returns `true` if the request was rejected before reaching the
    /// upstream because its path is unusable.
    #[must_use]
    pub const fn is_invalid_path(&self) -> bool {
        matches!(self, Self::InvalidPath { .. } | Self::OutsideBase { .. })
    }
}

/// Source of JSON documents addressed by path and query parameters.
#[async_trait]
pub trait Upstream: Send + Sync + std::fmt::Debug {
    /// Base identifier used when deriving cache keys.
    fn base(&self) -> &str;

    /// Checks that `path` addresses a document under this upstream.
    ///
    /// # Errors
    ///
    /// Returns [`UpstreamFailure`] if the path is unusable.
    fn validate_path(&self, _path: &str) -> Result<(), UpstreamFailure> {
        Ok(())
    }

    /// Fetches the document at `path` with the given query parameters.
    ///
    /// # Errors
    ///
    /// Returns [`UpstreamFailure`] on transport errors or non-success
    /// responses.
    async fn get_json(
        &self,
        path: &str,
        params: &BTreeMap<String, String>,
    ) -> Result<serde_json::Value, UpstreamFailure>;
}

/// Longest upstream error body kept in a [`UpstreamFailure::Status`].
const MAX_ERROR_BODY: usize = 512;

/// [`Upstream`] backed by an HTTP JSON API.
#[derive(Debug, Clone)]
pub struct HttpUpstream {
    client: reqwest::Client,
    base_url: Url,
}

impl HttpUpstream {
    /// Creates an upstream rooted at `base_url`.
    #[must_use]
    pub fn new(base_url: Url) -> Self {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    /// Creates an upstream using a preconfigured client.
    #[must_use]
    pub fn with_client(client: reqwest::Client, mut base_url: Url) -> Self {
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        Self { client, base_url }
    }

    /// Joins `path` onto the base URL, refusing anything that leaves it
    /// (absolute URLs, `..` segments climbing above the base path).
    fn url_for(&self, path: &str) -> Result<Url, UpstreamFailure> {
        let url = self
            .base_url
            .join(path.trim_start_matches('/'))
            .map_err(|source| UpstreamFailure::InvalidPath {
                path: path.to_string(),
                source,
            })?;
        if url.origin() != self.base_url.origin() || !url.path().starts_with(self.base_url.path())
        {
            return Err(UpstreamFailure::OutsideBase {
                path: path.to_string(),
            });
        }
        Ok(url)
    }
}

#[async_trait]
impl Upstream for HttpUpstream {
    fn base(&self) -> &str {
        self.base_url.as_str()
    }

    fn validate_path(&self, path: &str) -> Result<(), UpstreamFailure> {
        self.url_for(path).map(|_| ())
    }

    async fn get_json(
        &self,
        path: &str,
        params: &BTreeMap<String, String>,
    ) -> Result<serde_json::Value, UpstreamFailure> {
        let url = self.url_for(path)?;
        tracing::debug!(%url, "upstream GET");

        let response = self.client.get(url).query(params).send().await?;
        let status = response.status();
        if !status.is_success() {
            let mut body = response.text().await.unwrap_or_default();
            if body.len() > MAX_ERROR_BODY {
                let mut cut = MAX_ERROR_BODY;
                while !body.is_char_boundary(cut) {
                    cut -= 1;
                }
                body.truncate(cut);
            }
            return Err(UpstreamFailure::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response.json().await?)
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    fn upstream(base: &str) -> HttpUpstream {
        let Ok(url) = Url::parse(base) else {
            panic!("valid base url");
        };
        HttpUpstream::new(url)
    }

    #[test]
    fn base_gains_trailing_slash() {
        assert_eq!(upstream("http://api.test/v1").base(), "http://api.test/v1/");
    }

    #[test]
    fn paths_join_under_base() {
        let up = upstream("http://api.test/v1");
        let Ok(url) = up.url_for("/users/1") else {
            panic!("path should join");
        };
        assert_eq!(url.as_str(), "http://api.test/v1/users/1");
    }

    #[test]
    fn absolute_urls_are_refused() {
        let up = upstream("http://api.test/v1");
        for path in [
            "http://evil.test/steal",
            "https://api.test/v1/x",
            "mailto:ops@evil.test",
        ] {
            let result = up.url_for(path);
            assert!(
                matches!(result, Err(UpstreamFailure::OutsideBase { .. })),
                "{path} should be refused"
            );
        }
    }

    #[test]
    fn dot_segments_cannot_climb_above_base() {
        let up = upstream("http://api.test/v1");
        assert!(matches!(
            up.url_for("../../admin"),
            Err(UpstreamFailure::OutsideBase { .. })
        ));
        assert!(matches!(
            up.url_for("%2e%2e/admin"),
            Err(UpstreamFailure::OutsideBase { .. })
        ));
        assert!(up.validate_path("users/../items/3").is_ok());
    }

    #[test]
    fn status_failure_reports_code() {
        let failure = UpstreamFailure::Status {
            status: 503,
            body: "busy".to_string(),
        };
        assert_eq!(failure.status(), Some(503));
        assert_eq!(failure.to_string(), "upstream responded 503: busy");
    }
}
