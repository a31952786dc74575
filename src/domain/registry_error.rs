//! Terminal error delivered through a registry [`super::Handle`].
//!
//! A [`RegistryError`] is captured into the entry once and then cloned to
//! every subscriber, so it must be cheap to clone: the upstream cause is
//! held behind an [`Arc`].

use std::error::Error as StdError;
use std::sync::Arc;

/// Shared, type-erased cause of an upstream failure.
pub type SharedError = Arc<dyn StdError + Send + Sync + 'static>;

/// Terminal failure of a registry entry.
///
/// An unknown key is not an error: queries about it return `None` or
/// [`super::EntryStatus::Pending`].
#[derive(Debug, Clone, thiserror::Error)]
pub enum RegistryError {
    /// The underlying operation failed; wraps the original error.
    #[error("upstream operation failed: {0}")]
    Upstream(#[source] SharedError),

    /// The deadline elapsed before the operation resolved.
    #[error("operation for `{key}` timed out after {deadline_ms} ms")]
    Timeout {
        /// Key of the timed-out entry.
        key: String,
        /// Deadline that elapsed, in milliseconds.
        deadline_ms: u64,
    },

    /// The operation task ended without producing a result (it panicked
    /// or the runtime shut down underneath it).
    #[error("operation for `{key}` ended without a result")]
    Abandoned {
        /// Key of the abandoned entry.
        key: String,
    },
}

impl RegistryError {
    /// Wraps an operation's own error as [`RegistryError::Upstream`].
    pub fn upstream<E>(error: E) -> Self
    where
        E: Into<Box<dyn StdError + Send + Sync + 'static>>,
    {
        Self::Upstream(Arc::from(error.into()))
    }

    /// Returns `true` for [`RegistryError::Timeout`].
    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// Returns the wrapped upstream error, if this is an upstream failure.
    #[must_use]
    pub fn upstream_cause(&self) -> Option<&(dyn StdError + Send + Sync + 'static)> {
        match self {
            Self::Upstream(cause) => Some(cause.as_ref()),
            Self::Timeout { .. } | Self::Abandoned { .. } => None,
        }
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn upstream_wraps_original_message() {
        let err = RegistryError::upstream("not found");
        assert_eq!(err.to_string(), "upstream operation failed: not found");
        let Some(cause) = err.upstream_cause() else {
            panic!("expected upstream cause");
        };
        assert_eq!(cause.to_string(), "not found");
        assert!(!err.is_timeout());
    }

    #[test]
    fn upstream_exposes_source() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err = RegistryError::upstream(io);
        let Some(source) = StdError::source(&err) else {
            panic!("expected a source");
        };
        assert_eq!(source.to_string(), "gone");
    }

    #[test]
    fn timeout_display_names_key_and_deadline() {
        let err = RegistryError::Timeout {
            key: "user:1".to_string(),
            deadline_ms: 250,
        };
        assert!(err.is_timeout());
        assert_eq!(
            err.to_string(),
            "operation for `user:1` timed out after 250 ms"
        );
        assert!(err.upstream_cause().is_none());
    }

    #[test]
    fn clones_share_the_cause() {
        let err = RegistryError::upstream("boom");
        let copy = err.clone();
        match (&err, &copy) {
            (RegistryError::Upstream(a), RegistryError::Upstream(b)) => {
                assert!(Arc::ptr_eq(a, b));
            }
            _ => panic!("expected upstream variants"),
        }
    }
}
