//! Reactivates a paused session: reconstructs the [`ChainContext`] from
//! persisted stage executions, transitions the paused stage back to
//! active preserving its conversation, and re-enters [`ChainExecutor`].

use std::collections::HashMap;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use tarsy_domain::config::{AgentConfig, ChainConfig};
use tarsy_domain::error::{Error, Result};
use tarsy_domain::model::{AgentExecutionResult, ConversationMessage, ResultStatus, SessionStatus, StageStatus};
use tarsy_events::EventBus;
use tarsy_history::HistoryRepository;

use crate::context::ChainContext;
use crate::executor::{ChainExecutor, LlmResolver, ResumeCheckpoint};
use crate::result::ChainExecutionResult;
use crate::sinks::BusEventSink;

pub struct ResumeCoordinator {
    history: Arc<HistoryRepository>,
    events: Arc<EventBus>,
}

impl ResumeCoordinator {
    pub fn new(history: Arc<HistoryRepository>, events: Arc<EventBus>) -> Self {
        Self { history, events }
    }

    /// Implements the resumption procedure: verify the session is
    /// actually paused, rebuild `stage_outputs` from completed stages,
    /// reactivate the paused stage in place, and run the remainder of
    /// the chain. On a terminal result the session status is updated
    /// and the matching `session.*` event published; a `Paused` result
    /// (the agent paused again immediately) leaves the session paused.
    pub async fn resume_paused_session(
        &self,
        session_id: &str,
        chain: &ChainConfig,
        agents: &HashMap<String, AgentConfig>,
        llm: &dyn LlmResolver,
        executor: &ChainExecutor,
        now_us: i64,
    ) -> Result<ChainExecutionResult> {
        let session = self
            .history
            .get_session(session_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("session {session_id} not found")))?;
        if session.status != SessionStatus::Paused {
            return Err(Error::Other(format!("session {session_id} is not paused")));
        }

        let stage_executions = self.history.list_stage_executions(session_id).await?;
        // Runbook text itself isn't persisted on the session (only its URL),
        // so a resumed stage's prompt omits it; the paused stage's own
        // preserved conversation already carries whatever was injected
        // before the pause.
        let mut chain_ctx = ChainContext::new(session.alert_data.clone(), None);
        let mut resume_checkpoint = None;

        for se in stage_executions {
            match se.status {
                StageStatus::Completed => {
                    let summary = se
                        .stage_output
                        .as_ref()
                        .and_then(|v| v.get("summary"))
                        .and_then(|v| v.as_str())
                        .map(str::to_string);
                    chain_ctx.record(
                        se.execution_id.clone(),
                        AgentExecutionResult {
                            status: ResultStatus::Completed,
                            agent_or_stage_name: se.stage_name.clone(),
                            timestamp_us: se.completed_at_us.unwrap_or(now_us),
                            token_usage: None,
                            result_summary: summary,
                            paused_conversation_state: None,
                        },
                    );
                }
                StageStatus::Paused => {
                    let conversation: Vec<ConversationMessage> = se
                        .stage_output
                        .clone()
                        .and_then(|v| serde_json::from_value(v).ok())
                        .unwrap_or_default();
                    let stage_index = se.stage_index as usize;
                    resume_checkpoint = Some(ResumeCheckpoint { stage_index, execution: se, conversation });
                }
                StageStatus::Pending | StageStatus::Active | StageStatus::Failed => {}
            }
        }

        let resume_checkpoint = resume_checkpoint
            .ok_or_else(|| Error::Other(format!("session {session_id} has no paused stage execution")))?;

        self.publish(session_id, |sid| tarsy_domain::model::EventPayload::SessionResumed { session_id: sid })
            .await?;
        self.history.update_session_status(session_id, SessionStatus::InProgress, None).await?;

        let paused = Arc::new(AtomicBool::new(false));
        let cancelled = Arc::new(AtomicBool::new(false));
        let result = executor
            .execute_from(session_id, chain, agents, llm, paused, cancelled, &mut chain_ctx, now_us, Some(resume_checkpoint))
            .await?;

        match result.status {
            ResultStatus::Completed => {
                self.history.update_session_status(session_id, SessionStatus::Completed, Some(now_us)).await?;
                if let Some(analysis) = &result.final_analysis {
                    self.history.set_final_analysis(session_id, analysis, None).await?;
                }
                self.publish(session_id, |sid| tarsy_domain::model::EventPayload::SessionCompleted { session_id: sid })
                    .await?;
            }
            ResultStatus::Failed => {
                self.history.update_session_status(session_id, SessionStatus::Failed, Some(now_us)).await?;
                self.publish(session_id, |sid| tarsy_domain::model::EventPayload::SessionFailed {
                    session_id: sid,
                    error_message: "stage execution failed".to_string(),
                })
                .await?;
            }
            ResultStatus::Cancelled => {
                self.history.update_session_status(session_id, SessionStatus::Cancelled, Some(now_us)).await?;
                self.publish(session_id, |sid| tarsy_domain::model::EventPayload::SessionCancelled { session_id: sid })
                    .await?;
            }
            ResultStatus::Paused => {}
        }

        Ok(result)
    }

    async fn publish(
        &self,
        session_id: &str,
        build: impl FnOnce(String) -> tarsy_domain::model::EventPayload,
    ) -> Result<()> {
        let sink = BusEventSink::new(self.events.clone());
        sink.publish_session_event(session_id, build(session_id.to_string())).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checkpoint_index_matches_paused_stage_index() {
        let se = tarsy_domain::model::StageExecution::new(
            "e1", "s1", 2, "stage-2", "triage", "kubernetes-agent", None, 0,
            tarsy_domain::model::ParallelType::Single, None,
        );
        let checkpoint = ResumeCheckpoint { stage_index: se.stage_index as usize, execution: se, conversation: vec![] };
        assert_eq!(checkpoint.stage_index, 2);
    }
}
