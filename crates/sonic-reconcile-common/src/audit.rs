//! Audit logging for host configuration changes.
//!
//! Every corrective action a daemon takes on the host (service control,
//! file rendering, firewall rewrites) and every lifecycle transition is
//! recorded as an [`AuditRecord`] and emitted on the `audit` tracing target.
//! Records serialize to JSON so they can be shipped to a collector as-is.
//!
//! | Outcome | Level |
//! |---------|-------|
//! | `Success` | info |
//! | `InProgress` | debug |
//! | `Failure` / `Skipped` | warn |

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Audit event categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditCategory {
    /// Systemd unit control (start, stop, mask, ...)
    ServiceControl,
    /// Files written or removed on the host
    FileChange,
    /// Firewall rule changes
    FirewallRule,
    /// Configuration store changes observed by a daemon
    ConfigurationChange,
    /// Daemon startup, resync and shutdown
    SystemLifecycle,
    /// Requests received over the RPC surface
    AdminAction,
    /// Error and failure events
    ErrorCondition,
}

impl fmt::Display for AuditCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuditCategory::ServiceControl => write!(f, "SERVICE_CONTROL"),
            AuditCategory::FileChange => write!(f, "FILE_CHANGE"),
            AuditCategory::FirewallRule => write!(f, "FIREWALL_RULE"),
            AuditCategory::ConfigurationChange => write!(f, "CONFIGURATION_CHANGE"),
            AuditCategory::SystemLifecycle => write!(f, "SYSTEM_LIFECYCLE"),
            AuditCategory::AdminAction => write!(f, "ADMIN_ACTION"),
            AuditCategory::ErrorCondition => write!(f, "ERROR_CONDITION"),
        }
    }
}

/// Outcome of an audited action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditOutcome {
    /// Action completed successfully
    Success,
    /// Action failed
    Failure,
    /// Action is in progress
    InProgress,
    /// Action was not attempted because an earlier action on the same
    /// resource failed
    Skipped,
}

impl fmt::Display for AuditOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuditOutcome::Success => write!(f, "success"),
            AuditOutcome::Failure => write!(f, "failure"),
            AuditOutcome::InProgress => write!(f, "in_progress"),
            AuditOutcome::Skipped => write!(f, "skipped"),
        }
    }
}

/// Structured audit record.
///
/// Built with the `with_*` methods and handed to [`audit_log!`](crate::audit_log).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    /// UTC timestamp
    pub timestamp: DateTime<Utc>,

    /// Event category
    pub category: AuditCategory,

    /// Daemon or component generating the event
    pub source: String,

    /// Action performed (e.g. "stop", "write_file")
    pub action: String,

    /// Outcome of the action
    pub outcome: AuditOutcome,

    /// Resource key the action touched (e.g. "unit:ntp.service")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource: Option<String>,

    /// Additional context
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,

    /// Error message if the outcome is a failure
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Correlation ID grouping the actions of one delta (e.g. "FEATURE|ntp")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
}

impl AuditRecord {
    /// Create a new audit record with the current timestamp.
    ///
    /// The outcome defaults to `InProgress` until explicitly set.
    pub fn new(
        category: AuditCategory,
        source: impl Into<String>,
        action: impl Into<String>,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            category,
            source: source.into(),
            action: action.into(),
            outcome: AuditOutcome::InProgress,
            resource: None,
            details: None,
            error: None,
            correlation_id: None,
        }
    }

    pub fn with_outcome(mut self, outcome: AuditOutcome) -> Self {
        self.outcome = outcome;
        self
    }

    pub fn with_resource(mut self, resource: impl Into<String>) -> Self {
        self.resource = Some(resource.into());
        self
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Attach an error message. Marks the record as a failure.
    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self.outcome = AuditOutcome::Failure;
        self
    }

    pub fn with_correlation_id(mut self, id: impl Into<String>) -> Self {
        self.correlation_id = Some(id.into());
        self
    }

    /// Serialize to a single-line JSON string.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self)
            .unwrap_or_else(|e| format!(r#"{{"error":"serialization_failed","message":"{}"}}"#, e))
    }
}

/// Emit an [`AuditRecord`] on the `audit` target at a level matching its outcome.
#[macro_export]
macro_rules! audit_log {
    ($record:expr) => {
        let record = $record;
        match record.outcome {
            $crate::audit::AuditOutcome::Success => {
                tracing::info!(
                    target: "audit",
                    category = %record.category,
                    source = %record.source,
                    action = %record.action,
                    outcome = %record.outcome,
                    resource = record.resource.as_deref().unwrap_or(""),
                    audit_json = %record.to_json(),
                    "AUDIT: {} - {} - {}",
                    record.category,
                    record.action,
                    record.outcome
                );
            }
            $crate::audit::AuditOutcome::InProgress => {
                tracing::debug!(
                    target: "audit",
                    category = %record.category,
                    source = %record.source,
                    action = %record.action,
                    outcome = %record.outcome,
                    resource = record.resource.as_deref().unwrap_or(""),
                    audit_json = %record.to_json(),
                    "AUDIT: {} - {} - {}",
                    record.category,
                    record.action,
                    record.outcome
                );
            }
            $crate::audit::AuditOutcome::Failure | $crate::audit::AuditOutcome::Skipped => {
                tracing::warn!(
                    target: "audit",
                    category = %record.category,
                    source = %record.source,
                    action = %record.action,
                    outcome = %record.outcome,
                    resource = record.resource.as_deref().unwrap_or(""),
                    error = record.error.as_deref().unwrap_or(""),
                    audit_json = %record.to_json(),
                    "AUDIT: {} - {} - {}",
                    record.category,
                    record.action,
                    record.outcome
                );
            }
        }
    };
}

/// Initialize the global tracing subscriber.
///
/// `RUST_LOG` overrides `log_level` when set. With `json` the fmt layer
/// emits one JSON object per line, otherwise human-readable text.
pub fn init_logging(log_level: &str, json: bool) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    let layer = fmt::layer()
        .with_target(true)
        .with_file(true)
        .with_line_number(true);

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(layer.with_thread_ids(true).json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(layer.with_thread_ids(false))
            .init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_audit_record_creation() {
        let record = AuditRecord::new(AuditCategory::ServiceControl, "featured", "start")
            .with_outcome(AuditOutcome::Success)
            .with_resource("unit:dhcp_relay.service");

        assert_eq!(record.category, AuditCategory::ServiceControl);
        assert_eq!(record.source, "featured");
        assert_eq!(record.action, "start");
        assert_eq!(record.outcome, AuditOutcome::Success);
        assert_eq!(record.resource, Some("unit:dhcp_relay.service".to_string()));
    }

    #[test]
    fn test_audit_record_with_error() {
        let record = AuditRecord::new(AuditCategory::ServiceControl, "featured", "stop")
            .with_error("exit code 5: Unit mux.service not loaded.");

        assert_eq!(record.outcome, AuditOutcome::Failure);
        assert_eq!(
            record.error,
            Some("exit code 5: Unit mux.service not loaded.".to_string())
        );
    }

    #[test]
    fn test_audit_record_json_serialization() {
        let record = AuditRecord::new(AuditCategory::FileChange, "featured", "write_file")
            .with_outcome(AuditOutcome::Success)
            .with_correlation_id("FEATURE|ntp")
            .with_details(serde_json::json!({
                "path": "/etc/systemd/system/ntp.service.d/auto_restart.conf"
            }));

        let json = record.to_json();
        assert!(json.contains("FILE_CHANGE"));
        assert!(json.contains("\"correlation_id\":\"FEATURE|ntp\""));
        assert!(json.contains("auto_restart.conf"));
        assert!(!json.contains("\"error\""));
    }

    #[test]
    fn test_audit_category_display() {
        assert_eq!(AuditCategory::ServiceControl.to_string(), "SERVICE_CONTROL");
        assert_eq!(AuditCategory::FirewallRule.to_string(), "FIREWALL_RULE");
        assert_eq!(AuditCategory::SystemLifecycle.to_string(), "SYSTEM_LIFECYCLE");
        assert_eq!(AuditCategory::ErrorCondition.to_string(), "ERROR_CONDITION");
    }

    #[test]
    fn test_audit_outcome_display() {
        assert_eq!(AuditOutcome::Success.to_string(), "success");
        assert_eq!(AuditOutcome::Skipped.to_string(), "skipped");
        assert_eq!(AuditOutcome::InProgress.to_string(), "in_progress");
    }
}
