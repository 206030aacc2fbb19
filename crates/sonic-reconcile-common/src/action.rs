//! Corrective actions issued against the host.
//!
//! An [`Action`] is an idempotent host operation. Each action names the
//! resource it touches ([`Action::resource`]); the executor serializes
//! actions on the same resource and skips later actions on a resource
//! once one has failed.

use std::fmt;
use std::path::PathBuf;

/// Systemd unit verbs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ServiceVerb {
    Stop,
    Disable,
    Mask,
    Unmask,
    Enable,
    Start,
    Restart,
}

impl ServiceVerb {
    /// Returns the `systemctl` subcommand.
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceVerb::Stop => "stop",
            ServiceVerb::Disable => "disable",
            ServiceVerb::Mask => "mask",
            ServiceVerb::Unmask => "unmask",
            ServiceVerb::Enable => "enable",
            ServiceVerb::Start => "start",
            ServiceVerb::Restart => "restart",
        }
    }
}

impl fmt::Display for ServiceVerb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Firewall rule operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RuleOp {
    /// Append a rule (`-A`)
    Add,
    /// Delete a rule (`-D`)
    Remove,
}

impl RuleOp {
    /// Returns the iptables flag.
    pub fn flag(&self) -> &'static str {
        match self {
            RuleOp::Add => "-A",
            RuleOp::Remove => "-D",
        }
    }
}

/// A single idempotent host operation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Action {
    /// Control a systemd unit.
    Service { unit: String, verb: ServiceVerb },
    /// Atomically write a file.
    File { path: PathBuf, content: String },
    /// Remove a file; a missing file counts as success.
    RemoveFile { path: PathBuf },
    /// Add or remove a firewall rule. `spec` is the argv tail after the
    /// op flag, starting with the chain name.
    Rule { op: RuleOp, spec: Vec<String> },
    /// Reload the service manager configuration (`systemctl daemon-reload`).
    DaemonReload,
}

impl Action {
    pub fn service(unit: impl Into<String>, verb: ServiceVerb) -> Self {
        Action::Service {
            unit: unit.into(),
            verb,
        }
    }

    pub fn file(path: impl Into<PathBuf>, content: impl Into<String>) -> Self {
        Action::File {
            path: path.into(),
            content: content.into(),
        }
    }

    pub fn remove_file(path: impl Into<PathBuf>) -> Self {
        Action::RemoveFile { path: path.into() }
    }

    pub fn rule<I, S>(op: RuleOp, spec: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Action::Rule {
            op,
            spec: spec.into_iter().map(Into::into).collect(),
        }
    }

    /// Resource key used for serialization and skip propagation.
    ///
    /// `unit:<name>`, `file:<path>`, `rule:<chain>` or `service-manager`.
    pub fn resource(&self) -> String {
        match self {
            Action::Service { unit, .. } => format!("unit:{}", unit),
            Action::File { path, .. } | Action::RemoveFile { path } => {
                format!("file:{}", path.display())
            }
            Action::Rule { spec, .. } => {
                format!("rule:{}", spec.first().map(String::as_str).unwrap_or(""))
            }
            Action::DaemonReload => "service-manager".to_string(),
        }
    }

    /// Ordering priority: files, then daemon-reload, then unit verbs in
    /// stop..restart order, then rules.
    pub fn priority(&self) -> u8 {
        match self {
            Action::File { .. } | Action::RemoveFile { .. } => 0,
            Action::DaemonReload => 1,
            Action::Service { verb, .. } => 2 + *verb as u8,
            Action::Rule { .. } => 10,
        }
    }

    /// Short verb for logs and audit records.
    pub fn verb(&self) -> &'static str {
        match self {
            Action::Service { verb, .. } => verb.as_str(),
            Action::File { .. } => "write_file",
            Action::RemoveFile { .. } => "remove_file",
            Action::Rule { op: RuleOp::Add, .. } => "add_rule",
            Action::Rule {
                op: RuleOp::Remove, ..
            } => "remove_rule",
            Action::DaemonReload => "daemon-reload",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Service { unit, verb } => write!(f, "{} {}", verb, unit),
            Action::File { path, .. } => write!(f, "write {}", path.display()),
            Action::RemoveFile { path } => write!(f, "remove {}", path.display()),
            Action::Rule { op, spec } => write!(f, "rule {} {}", op.flag(), spec.join(" ")),
            Action::DaemonReload => write!(f, "daemon-reload"),
        }
    }
}

/// Stable sort by [`Action::priority`].
///
/// For policies that build an unordered set of actions. Actions with equal
/// priority keep their relative order.
pub fn sort_by_priority(actions: &mut [Action]) {
    actions.sort_by_key(Action::priority);
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_resource_keys() {
        assert_eq!(
            Action::service("ntp.service", ServiceVerb::Start).resource(),
            "unit:ntp.service"
        );
        assert_eq!(
            Action::file("/etc/ntp.conf", "server 10.0.0.1").resource(),
            "file:/etc/ntp.conf"
        );
        assert_eq!(
            Action::remove_file("/etc/ntp.conf").resource(),
            "file:/etc/ntp.conf"
        );
        assert_eq!(
            Action::rule(RuleOp::Add, ["INPUT", "-p", "tcp", "-j", "ACCEPT"]).resource(),
            "rule:INPUT"
        );
        assert_eq!(Action::DaemonReload.resource(), "service-manager");
    }

    #[test]
    fn test_sort_by_priority() {
        let mut actions = vec![
            Action::rule(RuleOp::Add, ["INPUT", "-j", "ACCEPT"]),
            Action::service("a.service", ServiceVerb::Start),
            Action::service("a.service", ServiceVerb::Enable),
            Action::DaemonReload,
            Action::service("a.service", ServiceVerb::Unmask),
            Action::file("/tmp/a.conf", ""),
            Action::service("b.service", ServiceVerb::Stop),
        ];
        sort_by_priority(&mut actions);

        let verbs: Vec<&str> = actions.iter().map(Action::verb).collect();
        assert_eq!(
            verbs,
            vec![
                "write_file",
                "daemon-reload",
                "stop",
                "unmask",
                "enable",
                "start",
                "add_rule"
            ]
        );
    }

    #[test]
    fn test_verb_priority_order() {
        let order = [
            ServiceVerb::Stop,
            ServiceVerb::Disable,
            ServiceVerb::Mask,
            ServiceVerb::Unmask,
            ServiceVerb::Enable,
            ServiceVerb::Start,
            ServiceVerb::Restart,
        ];
        let priorities: Vec<u8> = order
            .iter()
            .map(|v| Action::service("x", *v).priority())
            .collect();
        assert!(priorities.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_display() {
        assert_eq!(
            Action::service("mux.service", ServiceVerb::Mask).to_string(),
            "mask mux.service"
        );
        assert_eq!(
            Action::rule(RuleOp::Remove, ["INPUT", "-j", "DROP"]).to_string(),
            "rule -D INPUT -j DROP"
        );
    }
}
