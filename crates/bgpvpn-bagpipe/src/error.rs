//! Error types for BGPVPN lifecycle and notification operations.
//!
//! There are two error channels:
//! - [`BgpvpnError`] is returned synchronously to the API layer and aborts
//!   the mutation it was raised in.
//! - [`NotificationError`] is returned by a [`NotificationChannel`] push. It
//!   is logged by the caller and never reaches the API layer.
//!
//! [`NotificationChannel`]: crate::NotificationChannel

use thiserror::Error;

/// Result type alias for lifecycle operations.
pub type BgpvpnResult<T> = Result<T, BgpvpnError>;

/// Result type alias for agent notification pushes.
pub type NotifyResult = Result<(), NotificationError>;

/// Errors surfaced to the API layer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BgpvpnError {
    /// A referenced BGPVPN, association, network, router or port does not exist.
    #[error("{kind} {id} could not be found")]
    NotFound {
        /// Kind of object ("bgpvpn", "network association", "port", ...).
        kind: String,
        /// Identifier that was looked up.
        id: String,
    },

    /// A uniqueness or exclusivity rule would be violated.
    #[error("Conflict: {message}")]
    Conflict {
        /// Description of the conflicting state.
        message: String,
    },

    /// The driver does not implement the requested capability.
    #[error("{feature} is not supported by the bagpipe driver")]
    UnsupportedFeature {
        /// Name of the unsupported capability.
        feature: String,
    },

    /// A port association route is invalid.
    #[error("Invalid route: {message}")]
    RouteValidation {
        /// Why the route was rejected.
        message: String,
    },
}

impl BgpvpnError {
    /// Creates a not found error.
    pub fn not_found(kind: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind: kind.into(),
            id: id.into(),
        }
    }

    /// Creates a conflict error.
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict {
            message: message.into(),
        }
    }

    /// Creates an unsupported feature error.
    pub fn unsupported(feature: impl Into<String>) -> Self {
        Self::UnsupportedFeature {
            feature: feature.into(),
        }
    }

    /// Creates a route validation error.
    pub fn invalid_route(message: impl Into<String>) -> Self {
        Self::RouteValidation {
            message: message.into(),
        }
    }

    /// Returns true for [`BgpvpnError::NotFound`].
    pub fn is_not_found(&self) -> bool {
        matches!(self, BgpvpnError::NotFound { .. })
    }

    /// Short machine-readable name, used in audit records.
    pub fn kind(&self) -> &'static str {
        match self {
            BgpvpnError::NotFound { .. } => "not_found",
            BgpvpnError::Conflict { .. } => "conflict",
            BgpvpnError::UnsupportedFeature { .. } => "unsupported_feature",
            BgpvpnError::RouteValidation { .. } => "route_validation",
        }
    }
}

/// A push to the BGP agent failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NotificationError {
    /// The transport rejected or dropped the message.
    #[error("Notification '{operation}' failed: {message}")]
    Transport {
        /// Channel operation ("push_update", "attach_port", ...).
        operation: String,
        /// Transport error message.
        message: String,
    },

    /// Several pushes of one postcommit step failed; the first is kept.
    #[error("{failed} of {total} notifications failed, first: {first}")]
    Partial {
        failed: usize,
        total: usize,
        first: Box<NotificationError>,
    },
}

impl NotificationError {
    /// Creates a transport error.
    pub fn transport(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Transport {
            operation: operation.into(),
            message: message.into(),
        }
    }
}

/// Failure while handling a topology event. Only ever logged.
#[derive(Debug, Error)]
pub enum EventError {
    #[error(transparent)]
    Lifecycle(#[from] BgpvpnError),

    #[error(transparent)]
    Notification(#[from] NotificationError),
}

/// Errors raised while loading the daemon configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read configuration file '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration for {field}: {message}")]
    Invalid { field: String, message: String },
}

impl ConfigError {
    /// Creates an invalid configuration error.
    pub fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Invalid {
            field: field.into(),
            message: message.into(),
        }
    }
}
