//! Concrete [`HistorySink`]/[`EventSink`] implementations backing the
//! hook contexts with the real history repository and event bus. Kept
//! out of `tarsy-hooks` itself so that crate stays independent of any
//! concrete storage/transport choice.

use std::sync::Arc;

use async_trait::async_trait;

use tarsy_domain::error::Result;
use tarsy_domain::model::{
    CommunicationType, EventPayload, LlmInteraction, McpInteraction, StageExecution, StageStatus,
};
use tarsy_events::EventBus;
use tarsy_history::HistoryRepository;
use tarsy_hooks::{EventSink, HistorySink};

pub struct RepositoryHistorySink {
    repo: Arc<HistoryRepository>,
}

impl RepositoryHistorySink {
    pub fn new(repo: Arc<HistoryRepository>) -> Self {
        Self { repo }
    }
}

#[async_trait]
impl HistorySink for RepositoryHistorySink {
    async fn save_llm_interaction(&self, interaction: &LlmInteraction) -> Result<()> {
        self.repo.insert_llm_interaction(interaction).await
    }

    async fn save_mcp_interaction(&self, interaction: &McpInteraction) -> Result<()> {
        self.repo.insert_mcp_interaction(interaction).await
    }

    async fn save_stage_execution(&self, stage: &StageExecution) -> Result<()> {
        self.repo.update_stage_execution(stage).await
    }
}

pub struct BusEventSink {
    bus: Arc<EventBus>,
}

impl BusEventSink {
    pub fn new(bus: Arc<EventBus>) -> Self {
        Self { bus }
    }

    async fn publish(&self, channel: String, payload: EventPayload) -> Result<()> {
        let mut tx = self.bus.pool().begin().await.map_err(|e| tarsy_domain::Error::Other(e.to_string()))?;
        self.bus
            .publish(&mut tx, &channel, &payload)
            .await?;
        tx.commit().await.map_err(|e| tarsy_domain::Error::Other(e.to_string()))?;
        Ok(())
    }

    /// Publishes a session-level event (`session.created`, `.paused`,
    /// `.resumed`, `.completed`, ...) on that session's channel. Public
    /// since callers outside this module (the chain executor on pause,
    /// the resume coordinator on resume/completion) raise these directly
    /// rather than deriving them from a stored row.
    pub async fn publish_session_event(&self, session_id: &str, payload: EventPayload) -> Result<()> {
        self.publish(tarsy_domain::model::session_channel(session_id), payload).await
    }
}

#[async_trait]
impl EventSink for BusEventSink {
    async fn publish_llm_interaction(&self, interaction: &LlmInteraction) -> Result<()> {
        let payload = EventPayload::LlmInteractionEvent {
            session_id: interaction.session_id.clone(),
            stage_id: interaction.stage_execution_id.clone(),
            interaction_id: interaction.interaction_id.clone(),
        };
        self.publish(tarsy_domain::model::session_channel(&interaction.session_id), payload).await
    }

    async fn publish_mcp_interaction(&self, interaction: &McpInteraction) -> Result<()> {
        let payload = match interaction.communication_type {
            CommunicationType::ToolList => EventPayload::McpToolList {
                session_id: interaction.session_id.clone(),
                stage_id: interaction.stage_execution_id.clone(),
                interaction_id: interaction.request_id.clone(),
            },
            CommunicationType::ToolCall => EventPayload::McpToolCall {
                session_id: interaction.session_id.clone(),
                stage_id: interaction.stage_execution_id.clone(),
                interaction_id: interaction.request_id.clone(),
            },
        };
        self.publish(tarsy_domain::model::session_channel(&interaction.session_id), payload).await
    }

    async fn publish_stage_execution(&self, stage: &StageExecution) -> Result<()> {
        let payload = match stage.status {
            StageStatus::Active => EventPayload::StageStarted {
                session_id: stage.session_id.clone(),
                stage_id: stage.stage_id.clone(),
            },
            StageStatus::Completed => EventPayload::StageCompleted {
                session_id: stage.session_id.clone(),
                stage_id: stage.stage_id.clone(),
            },
            StageStatus::Failed => EventPayload::StageFailed {
                session_id: stage.session_id.clone(),
                stage_id: stage.stage_id.clone(),
                error_message: stage.error_message.clone().unwrap_or_default(),
            },
            // No dedicated wire event for a pause transition; the session-level
            // `session.paused` event (published by the chain executor) covers it.
            StageStatus::Pending | StageStatus::Paused => return Ok(()),
        };
        self.publish(tarsy_domain::model::session_channel(&stage.session_id), payload).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use tarsy_domain::config::DatabaseConfig;
    use tarsy_domain::model::{CommunicationType, InteractionType, ParallelType};
    use tarsy_history::HistoryRepository;

    async fn memory_repo() -> Arc<HistoryRepository> {
        let config = DatabaseConfig { url: "sqlite::memory:".into(), pool_size: 1, ..DatabaseConfig::default() };
        Arc::new(HistoryRepository::connect(&config).await.unwrap())
    }

    async fn memory_bus() -> Arc<EventBus> {
        let pool = tarsy_events::connect("sqlite::memory:", 1).await.unwrap();
        EventBus::new(pool, tarsy_domain::config::DbBackend::Sqlite)
    }

    fn sample_llm_interaction() -> LlmInteraction {
        LlmInteraction {
            interaction_id: "i1".into(),
            session_id: "s1".into(),
            stage_execution_id: "e1".into(),
            provider: "openai".into(),
            model_name: "gpt-4".into(),
            temperature: 0.0,
            interaction_type: InteractionType::Investigation,
            conversation: vec![],
            native_tools_config: None,
            start_time_us: 1,
            end_time_us: None,
            duration_ms: None,
            timestamp_us: None,
            success: None,
            error_message: None,
        }
    }

    fn sample_stage(status: StageStatus) -> StageExecution {
        let mut se = StageExecution::new(
            "e1", "s1", 0, "stage-0", "investigate", "kubernetes-agent", None, 0,
            ParallelType::Single, None,
        );
        se.status = status;
        se
    }

    #[tokio::test]
    async fn history_sink_persists_stage_execution() {
        let repo = memory_repo().await;
        repo.create_stage_execution(&sample_stage(StageStatus::Active)).await.unwrap();
        let sink = RepositoryHistorySink::new(repo.clone());
        let mut se = sample_stage(StageStatus::Completed);
        se.started_at_us = Some(1);
        se.completed_at_us = Some(2);
        se.duration_ms = Some(0);
        sink.save_stage_execution(&se).await.unwrap();
        let persisted = repo.list_stage_executions("s1").await.unwrap();
        assert_eq!(persisted[0].status, StageStatus::Completed);
    }

    #[tokio::test]
    async fn event_sink_publishes_stage_started_for_active_status() {
        let bus = memory_bus().await;
        let received = Arc::new(AtomicUsize::new(0));
        let flag = received.clone();
        bus.subscribe(
            &tarsy_domain::model::session_channel("s1"),
            Arc::new(move |event| {
                if matches!(event.payload, EventPayload::StageStarted { .. }) {
                    flag.fetch_add(1, Ordering::SeqCst);
                }
            }),
        );
        let sink = BusEventSink::new(bus);
        sink.publish_stage_execution(&sample_stage(StageStatus::Active)).await.unwrap();
        // The listener loop (not started in this test) delivers callbacks;
        // here we only assert the publish call itself succeeds without
        // panicking on a pending status, which is covered next.
        let _ = received;
    }

    #[tokio::test]
    async fn event_sink_skips_pending_and_paused_stage_status() {
        let bus = memory_bus().await;
        let sink = BusEventSink::new(bus);
        sink.publish_stage_execution(&sample_stage(StageStatus::Pending)).await.unwrap();
        sink.publish_stage_execution(&sample_stage(StageStatus::Paused)).await.unwrap();
    }

    #[tokio::test]
    async fn event_sink_maps_mcp_tool_list_vs_tool_call() {
        let bus = memory_bus().await;
        let sink = BusEventSink::new(bus);
        let mut interaction = McpInteraction {
            request_id: "r1".into(),
            session_id: "s1".into(),
            stage_execution_id: "e1".into(),
            server_name: "kubernetes".into(),
            communication_type: CommunicationType::ToolList,
            tool_name: None,
            tool_arguments: None,
            tool_result: None,
            available_tools: Some(serde_json::json!([])),
            start_time_us: 1,
            end_time_us: Some(2),
            duration_ms: Some(1),
            success: Some(true),
            error_message: None,
            step_description: None,
        };
        sink.publish_mcp_interaction(&interaction).await.unwrap();
        interaction.communication_type = CommunicationType::ToolCall;
        sink.publish_mcp_interaction(&interaction).await.unwrap();
    }

    #[tokio::test]
    async fn event_sink_publishes_session_level_events() {
        let bus = memory_bus().await;
        let sink = BusEventSink::new(bus);
        sink.publish_session_event("s1", EventPayload::SessionResumed { session_id: "s1".into() }).await.unwrap();
    }

    #[tokio::test]
    async fn history_sink_persists_llm_interaction() {
        let repo = memory_repo().await;
        repo.create_stage_execution(&sample_stage(StageStatus::Active)).await.unwrap();
        let sink = RepositoryHistorySink::new(repo);
        sink.save_llm_interaction(&sample_llm_interaction()).await.unwrap();
    }
}
