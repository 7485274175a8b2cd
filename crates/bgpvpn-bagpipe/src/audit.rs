//! Audit records for BGPVPN lifecycle mutations.
//!
//! Every create/update/delete that reaches a decision (committed, or rejected
//! at precommit) yields one [`AuditRecord`], emitted through `tracing` under
//! the `audit` target by [`audit_log!`](crate::audit_log). Records serialize to
//! a single JSON line so a log shipper can forward them unchanged.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What kind of change an audit record describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditCategory {
    ResourceCreate,
    ResourceModify,
    ResourceDelete,
    /// Port status and router interface changes.
    TopologyEvent,
    SystemLifecycle,
}

impl AuditCategory {
    pub const fn as_str(self) -> &'static str {
        match self {
            AuditCategory::ResourceCreate => "RESOURCE_CREATE",
            AuditCategory::ResourceModify => "RESOURCE_MODIFY",
            AuditCategory::ResourceDelete => "RESOURCE_DELETE",
            AuditCategory::TopologyEvent => "TOPOLOGY_EVENT",
            AuditCategory::SystemLifecycle => "SYSTEM_LIFECYCLE",
        }
    }
}

/// Outcome of an audited action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditOutcome {
    Success,
    /// Committed, but the agent could not be notified.
    Failure,
    /// Rejected by a precommit rule; nothing was persisted.
    Denied,
}

impl AuditOutcome {
    pub const fn as_str(self) -> &'static str {
        match self {
            AuditOutcome::Success => "success",
            AuditOutcome::Failure => "failure",
            AuditOutcome::Denied => "denied",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    pub timestamp: DateTime<Utc>,
    pub category: AuditCategory,
    /// Component that produced the record, e.g. `AssociationLifecycle`.
    pub source: String,
    pub action: String,
    pub outcome: AuditOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub object_id: Option<String>,
    /// `bgpvpn`, `network_association`, `router_association`, `port_association`
    /// or `router_interface`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub object_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AuditRecord {
    /// A successful `action`, stamped with the current time.
    pub fn new(category: AuditCategory, source: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            category,
            source: source.into(),
            action: action.into(),
            outcome: AuditOutcome::Success,
            object_id: None,
            object_type: None,
            details: None,
            error: None,
        }
    }

    pub fn with_object_id(mut self, id: impl Into<String>) -> Self {
        self.object_id = Some(id.into());
        self
    }

    pub fn with_object_type(mut self, object_type: impl Into<String>) -> Self {
        self.object_type = Some(object_type.into());
        self
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn failed(self, error: impl Into<String>) -> Self {
        self.concluded(AuditOutcome::Failure, error)
    }

    pub fn denied(self, error: impl Into<String>) -> Self {
        self.concluded(AuditOutcome::Denied, error)
    }

    fn concluded(mut self, outcome: AuditOutcome, error: impl Into<String>) -> Self {
        self.outcome = outcome;
        self.error = Some(error.into());
        self
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self)
            .unwrap_or_else(|e| format!(r#"{{"error":"serialization_failed","message":"{}"}}"#, e))
    }
}

/// Emits an [`AuditRecord`] under the `audit` tracing target: info when it
/// succeeded, warn otherwise.
#[macro_export]
macro_rules! audit_log {
    ($record:expr) => {
        let record = $record;
        if record.outcome == $crate::audit::AuditOutcome::Success {
            tracing::info!(
                target: "audit",
                category = record.category.as_str(),
                source = %record.source,
                action = %record.action,
                object_id = record.object_id.as_deref().unwrap_or(""),
                audit_json = %record.to_json(),
                "{} {}",
                record.action,
                record.outcome.as_str()
            );
        } else {
            tracing::warn!(
                target: "audit",
                category = record.category.as_str(),
                source = %record.source,
                action = %record.action,
                object_id = record.object_id.as_deref().unwrap_or(""),
                error = record.error.as_deref().unwrap_or(""),
                audit_json = %record.to_json(),
                "{} {}",
                record.action,
                record.outcome.as_str()
            );
        }
    };
}

/// Installs the global tracing subscriber.
///
/// `RUST_LOG` takes precedence over `logging.level`. With
/// [`LogFormat::Json`] every line, audit records included, is a JSON object.
///
/// [`LogFormat::Json`]: crate::config::LogFormat::Json
pub fn init_logging(logging: &crate::config::LoggingConfig) {
    use crate::config::LogFormat;
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));
    let registry = tracing_subscriber::registry().with(filter);

    match logging.format {
        LogFormat::Json => registry
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_file(true)
                    .with_line_number(true)
                    .json(),
            )
            .init(),
        LogFormat::Text => registry
            .with(fmt::layer().with_target(true).with_thread_ids(false))
            .init(),
    }
}
