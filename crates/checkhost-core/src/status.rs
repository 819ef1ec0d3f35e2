//! Human-readable runtime status, as embedded in diagnostic bundles.

use crate::redact::clean_credentials;
use serde::{Deserialize, Serialize};
use std::fmt::Write;

/// Snapshot of the embedded runtime and the checks it hosts.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuntimeStatus {
    /// Lifecycle state name
    pub state: String,
    /// Interpreter version string
    pub version: String,
    /// Module search path, in lookup order
    pub search_paths: Vec<String>,
    /// Names in the runtime's module table
    pub modules: Vec<String>,
    /// Per-check resolution and run results
    #[serde(default)]
    pub checks: Vec<CheckStatus>,
}

/// Resolution and run summary of one check.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CheckStatus {
    pub name: String,
    pub module: String,
    /// Resolved entry-point class, if resolution succeeded
    pub class: Option<String>,
    pub runs: u64,
    pub last_error: Option<String>,
}

/// Renders `status` as text, with credentials scrubbed.
pub fn format_status(status: &RuntimeStatus) -> String {
    let mut out = String::new();
    // Writing into a String cannot fail.
    let _ = writeln!(out, "=== checkhost runtime ===");
    let _ = writeln!(out, "State:   {}", status.state);
    let _ = writeln!(out, "Version: {}", status.version);

    let _ = writeln!(out, "Search paths:");
    if status.search_paths.is_empty() {
        let _ = writeln!(out, "  (none)");
    }
    for path in &status.search_paths {
        let _ = writeln!(out, "  - {}", path);
    }

    let _ = writeln!(out, "Modules: {}", status.modules.join(", "));

    if !status.checks.is_empty() {
        let _ = writeln!(out, "Checks:");
        for check in &status.checks {
            match (&check.class, &check.last_error) {
                (_, Some(err)) => {
                    let _ = writeln!(out, "  {} [{}] error: {}", check.name, check.module, err);
                }
                (Some(class), None) => {
                    let _ = writeln!(
                        out,
                        "  {} [{}] -> {} (runs: {})",
                        check.name, check.module, class, check.runs
                    );
                }
                (None, None) => {
                    let _ = writeln!(out, "  {} [{}] unresolved", check.name, check.module);
                }
            }
        }
    }

    clean_credentials(&out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> RuntimeStatus {
        RuntimeStatus {
            state: "initialized".to_string(),
            version: "checkhost-runtime 0.2.0".to_string(),
            search_paths: vec!["/opt/checks".to_string()],
            modules: vec!["aggregator".to_string(), "host_agent".to_string()],
            checks: vec![
                CheckStatus {
                    name: "disk".to_string(),
                    module: "checks.disk".to_string(),
                    class: Some("disk.DiskCheck".to_string()),
                    runs: 2,
                    last_error: None,
                },
                CheckStatus {
                    name: "net".to_string(),
                    module: "net".to_string(),
                    class: None,
                    runs: 0,
                    last_error: Some("no module named 'net'".to_string()),
                },
            ],
        }
    }

    #[test]
    fn test_format_status_sections() {
        let text = format_status(&sample());
        assert!(text.contains("State:   initialized"));
        assert!(text.contains("  - /opt/checks"));
        assert!(text.contains("Modules: aggregator, host_agent"));
        assert!(text.contains("disk [checks.disk] -> disk.DiskCheck (runs: 2)"));
        assert!(text.contains("net [net] error: no module named 'net'"));
    }

    #[test]
    fn test_format_status_redacts() {
        let mut status = sample();
        status.search_paths = vec!["http://user:pw@repo.local/checks".to_string()];
        let text = format_status(&status);
        assert!(text.contains("user:********@repo.local"));
        assert!(!text.contains(":pw@"));
    }

    #[test]
    fn test_empty_search_path() {
        let text = format_status(&RuntimeStatus::default());
        assert!(text.contains("(none)"));
        assert!(!text.contains("Checks:"));
    }
}
