//! Per-session chain context threaded through every stage: the alert
//! payload, runbook text, and a scratchpad of earlier stages' results
//! keyed by `execution_id` for prompt assembly.

use std::collections::HashMap;

use tarsy_domain::model::AgentExecutionResult;

#[derive(Debug, Clone)]
pub struct ChainContext {
    pub alert_data: serde_json::Value,
    pub runbook_text: Option<String>,
    pub stage_outputs: HashMap<String, AgentExecutionResult>,
}

impl ChainContext {
    pub fn new(alert_data: serde_json::Value, runbook_text: Option<String>) -> Self {
        Self { alert_data, runbook_text, stage_outputs: HashMap::new() }
    }

    pub fn record(&mut self, execution_id: impl Into<String>, result: AgentExecutionResult) {
        self.stage_outputs.insert(execution_id.into(), result);
    }

    /// Result summaries of every prior stage, in caller-determined
    /// iteration order, for inclusion in a later stage's prompt.
    pub fn prior_summaries<'a>(&'a self, execution_ids: impl Iterator<Item = &'a str>) -> Vec<&'a str> {
        execution_ids
            .filter_map(|id| self.stage_outputs.get(id))
            .filter_map(|r| r.result_summary.as_deref())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tarsy_domain::model::ResultStatus;

    #[test]
    fn records_and_recalls_stage_output() {
        let mut ctx = ChainContext::new(serde_json::json!({}), None);
        ctx.record(
            "e1",
            AgentExecutionResult {
                status: ResultStatus::Completed,
                agent_or_stage_name: "investigate".into(),
                timestamp_us: 1,
                token_usage: None,
                result_summary: Some("found the root cause".into()),
                paused_conversation_state: None,
            },
        );
        let summaries = ctx.prior_summaries(["e1"].into_iter());
        assert_eq!(summaries, vec!["found the root cause"]);
    }

    #[test]
    fn unknown_execution_id_yields_nothing() {
        let ctx = ChainContext::new(serde_json::json!({}), None);
        assert!(ctx.prior_summaries(["missing"].into_iter()).is_empty());
    }
}
