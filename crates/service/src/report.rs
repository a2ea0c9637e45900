//! Formats the final Markdown report persisted as `Session::final_analysis`
//! (spec.md §6, literal shape).

use tarsy_domain::model::Session;

/// `# Alert Analysis Report` shape for a session that reached
/// `ResultStatus::Completed`.
pub fn completed_report(session: &Session, chain_id: &str, analysis: &str, stage_count: usize) -> String {
    let severity = session.alert_data.get("severity").and_then(|v| v.as_str()).unwrap_or("unknown");
    let environment = session.alert_data.get("environment").and_then(|v| v.as_str()).unwrap_or("unknown");
    let timestamp_us = session.started_at_us.unwrap_or(0);

    format!(
        "# Alert Analysis Report\n\n\
         **Alert Type:** {alert_type}\n\
         **Processing Chain:** {chain_id}\n\
         **Environment:** {environment}\n\
         **Severity:** {severity}\n\
         **Timestamp:** {timestamp_us}\n\n\
         ## Analysis\n\n\
         {analysis}\n\n\
         ---\n\
         *Processed by {chain_id} in {stage_count} stages*\n",
        alert_type = session.alert_type,
    )
}

/// `# Alert Processing Error` shape for a session that reached
/// `ResultStatus::Failed`.
pub fn error_report(session: &Session, error_message: &str, troubleshooting: &[&str]) -> String {
    let environment = session.alert_data.get("environment").and_then(|v| v.as_str()).unwrap_or("unknown");
    let steps = troubleshooting
        .iter()
        .enumerate()
        .map(|(i, step)| format!("{}. {step}", i + 1))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "# Alert Processing Error\n\n\
         **Alert Type:** {alert_type}\n\
         **Environment:** {environment}\n\
         **Error:** {error_message}\n\n\
         ## Troubleshooting\n\
         {steps}\n",
        alert_type = session.alert_type,
    )
}

pub fn default_troubleshooting_steps() -> Vec<&'static str> {
    vec![
        "Check that the runbook URL (if provided) is reachable",
        "Verify the alert's chain and agent configuration resolve correctly",
        "Check MCP server health and LLM provider connectivity",
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_session() -> Session {
        let mut s = Session::new(
            "s1",
            "kubernetes",
            serde_json::json!({ "severity": "critical", "environment": "production" }),
            serde_json::json!({}),
        );
        s.started_at_us = Some(1_700_000_000_000_000);
        s
    }

    #[test]
    fn completed_report_includes_all_fields() {
        let report = completed_report(&sample_session(), "kubernetes-agent-chain", "pod crashlooping due to OOM", 2);
        assert!(report.starts_with("# Alert Analysis Report"));
        assert!(report.contains("**Alert Type:** kubernetes"));
        assert!(report.contains("**Processing Chain:** kubernetes-agent-chain"));
        assert!(report.contains("**Severity:** critical"));
        assert!(report.contains("pod crashlooping due to OOM"));
        assert!(report.contains("Processed by kubernetes-agent-chain in 2 stages"));
    }

    #[test]
    fn error_report_numbers_troubleshooting_steps() {
        let report = error_report(&sample_session(), "no runbook", &default_troubleshooting_steps());
        assert!(report.starts_with("# Alert Processing Error"));
        assert!(report.contains("**Error:** no runbook"));
        assert!(report.contains("1. Check that the runbook URL"));
        assert!(report.contains("3. Check MCP server health"));
    }

    #[test]
    fn missing_severity_falls_back_to_unknown() {
        let mut s = sample_session();
        s.alert_data = serde_json::json!({});
        let report = completed_report(&s, "generic-chain", "ok", 1);
        assert!(report.contains("**Severity:** unknown"));
        assert!(report.contains("**Environment:** unknown"));
    }
}
