//! Inspector error taxonomy.
//!
//! Resolver-level failures ([`InspectorError::OAuthDenied`],
//! [`InspectorError::ResolutionFailed`]) are terminal for the current mount and
//! are shown full-page. Resource and claims failures are local to the panel
//! that produced them and never invalidate the session.

use std::fmt;

use crate::claims::ClaimsError;
use crate::config::ConfigError;
use crate::storage::StorageError;

/// Errors surfaced by the inspector.
#[derive(Debug, thiserror::Error)]
pub enum InspectorError {
    /// The authorization server redirected back with an `error` parameter.
    #[error(
        "Authorization denied ({code}): {}",
        .description.as_deref().unwrap_or("no description provided")
    )]
    OAuthDenied {
        /// OAuth 2.0 error code, e.g. `access_denied`.
        code: String,
        /// Value of `error_description`, if any.
        description: Option<String>,
    },

    /// Classifying the launch or acquiring the session failed.
    #[error("{message}")]
    ResolutionFailed {
        /// Human-readable failure reason, passed through as-is.
        message: String,
    },

    /// Fetching a single resource for a panel failed.
    #[error("Failed to load {resource}: {message}")]
    ResourceFetchFailed {
        /// Which panel's resource failed (patient, encounter, user, metadata).
        resource: String,
        /// Description of the failure.
        message: String,
    },

    /// A token string could not be decoded into claims.
    #[error("Failed to decode token claims: {0}")]
    ClaimsDecodeFailed(#[from] ClaimsError),

    /// Session storage could not be read or written.
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// The configuration is invalid.
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigError),
}

impl InspectorError {
    /// Creates a new `OAuthDenied` error.
    #[must_use]
    pub fn oauth_denied(code: impl Into<String>, description: Option<String>) -> Self {
        Self::OAuthDenied {
            code: code.into(),
            description,
        }
    }

    /// Creates a new `ResolutionFailed` error.
    #[must_use]
    pub fn resolution_failed(message: impl Into<String>) -> Self {
        Self::ResolutionFailed {
            message: message.into(),
        }
    }

    /// Creates a new `ResourceFetchFailed` error.
    #[must_use]
    pub fn resource_fetch_failed(resource: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ResourceFetchFailed {
            resource: resource.into(),
            message: message.into(),
        }
    }

    /// Returns `true` if the error ends the current mount.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::OAuthDenied { .. } | Self::ResolutionFailed { .. }
        )
    }

    /// Returns `true` if the error only affects a single panel.
    #[must_use]
    pub fn is_local(&self) -> bool {
        matches!(
            self,
            Self::ResourceFetchFailed { .. } | Self::ClaimsDecodeFailed(_)
        )
    }

    /// Returns the error category for logging purposes.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::OAuthDenied { .. } => ErrorCategory::Authorization,
            Self::ResolutionFailed { .. } => ErrorCategory::Resolution,
            Self::ResourceFetchFailed { .. } => ErrorCategory::Resource,
            Self::ClaimsDecodeFailed(_) => ErrorCategory::Claims,
            Self::Storage(_) => ErrorCategory::Infrastructure,
            Self::Configuration(_) => ErrorCategory::Configuration,
        }
    }
}

/// Categories of inspector errors for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// The authorization server refused the request.
    Authorization,
    /// Launch classification or session acquisition.
    Resolution,
    /// Per-panel resource fetches.
    Resource,
    /// Token decoding.
    Claims,
    /// Storage errors.
    Infrastructure,
    /// Configuration errors.
    Configuration,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Authorization => write!(f, "authorization"),
            Self::Resolution => write!(f, "resolution"),
            Self::Resource => write!(f, "resource"),
            Self::Claims => write!(f, "claims"),
            Self::Infrastructure => write!(f, "infrastructure"),
            Self::Configuration => write!(f, "configuration"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = InspectorError::oauth_denied("access_denied", Some("user refused".into()));
        assert_eq!(
            err.to_string(),
            "Authorization denied (access_denied): user refused"
        );

        let err = InspectorError::oauth_denied("server_error", None);
        assert_eq!(
            err.to_string(),
            "Authorization denied (server_error): no description provided"
        );

        let err = InspectorError::resolution_failed("Invalid aud parameter (missing sim segment)");
        assert_eq!(err.to_string(), "Invalid aud parameter (missing sim segment)");

        let err = InspectorError::resource_fetch_failed("patient", "HTTP 404");
        assert_eq!(err.to_string(), "Failed to load patient: HTTP 404");
    }

    #[test]
    fn test_error_predicates() {
        let err = InspectorError::oauth_denied("access_denied", None);
        assert!(err.is_terminal());
        assert!(!err.is_local());
        assert_eq!(err.category(), ErrorCategory::Authorization);

        let err = InspectorError::resource_fetch_failed("encounter", "timeout");
        assert!(!err.is_terminal());
        assert!(err.is_local());

        let err: InspectorError = ClaimsError::MissingSegments(1).into();
        assert!(err.is_local());
        assert_eq!(err.category(), ErrorCategory::Claims);
    }

    #[test]
    fn test_category_display() {
        assert_eq!(ErrorCategory::Resolution.to_string(), "resolution");
        assert_eq!(ErrorCategory::Infrastructure.to_string(), "infrastructure");
    }
}
