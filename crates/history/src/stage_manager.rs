//! Enforces the stage-execution timing invariant on top of
//! [`HistoryRepository`]: a stage execution only reaches a terminal
//! status with `started_at_us`, `completed_at_us`, and `duration_ms`
//! all set consistently.

use std::sync::Arc;

use tarsy_domain::error::{Error, Result};
use tarsy_domain::model::{ParallelType, StageExecution, StageStatus};

use crate::repository::HistoryRepository;

pub struct StageExecutionManager {
    repo: Arc<HistoryRepository>,
}

impl StageExecutionManager {
    pub fn new(repo: Arc<HistoryRepository>) -> Self {
        Self { repo }
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn start_stage(
        &self,
        execution_id: impl Into<String>,
        session_id: impl Into<String>,
        stage_index: u32,
        stage_id: impl Into<String>,
        stage_name: impl Into<String>,
        agent: impl Into<String>,
        parent_stage_execution_id: Option<String>,
        parallel_index: u32,
        parallel_type: ParallelType,
        expected_parallel_count: Option<u32>,
        started_at_us: i64,
    ) -> Result<StageExecution> {
        let mut se = StageExecution::new(
            execution_id,
            session_id,
            stage_index,
            stage_id,
            stage_name,
            agent,
            parent_stage_execution_id,
            parallel_index,
            parallel_type,
            expected_parallel_count,
        );
        se.status = StageStatus::Active;
        se.started_at_us = Some(started_at_us);
        self.repo.create_stage_execution(&se).await?;
        Ok(se)
    }

    pub async fn record_iteration(&self, se: &mut StageExecution, iteration: u32) -> Result<()> {
        se.current_iteration = Some(iteration);
        self.repo.update_stage_execution(se).await
    }

    pub async fn complete_stage(
        &self,
        se: &mut StageExecution,
        completed_at_us: i64,
        stage_output: Option<serde_json::Value>,
    ) -> Result<()> {
        self.finish(se, StageStatus::Completed, completed_at_us, stage_output, None)
            .await
    }

    pub async fn fail_stage(
        &self,
        se: &mut StageExecution,
        completed_at_us: i64,
        error_message: impl Into<String>,
    ) -> Result<()> {
        self.finish(se, StageStatus::Failed, completed_at_us, None, Some(error_message.into()))
            .await
    }

    /// Does not set `completed_at_us` — a paused stage isn't terminal.
    pub async fn pause_stage(
        &self,
        se: &mut StageExecution,
        iteration: u32,
        partial_result: Option<serde_json::Value>,
    ) -> Result<()> {
        se.status = StageStatus::Paused;
        se.current_iteration = Some(iteration);
        if partial_result.is_some() {
            se.stage_output = partial_result;
        }
        self.repo.update_stage_execution(se).await
    }

    pub async fn resume_stage(&self, se: &mut StageExecution) -> Result<()> {
        se.status = StageStatus::Active;
        self.repo.update_stage_execution(se).await
    }

    async fn finish(
        &self,
        se: &mut StageExecution,
        status: StageStatus,
        completed_at_us: i64,
        stage_output: Option<serde_json::Value>,
        error_message: Option<String>,
    ) -> Result<()> {
        let started_at_us = se
            .started_at_us
            .ok_or_else(|| Error::Other("cannot finish a stage execution that was never started".into()))?;
        se.status = status;
        se.completed_at_us = Some(completed_at_us);
        se.duration_ms = Some((completed_at_us - started_at_us) / 1000);
        se.stage_output = stage_output;
        se.error_message = error_message;
        if !se.terminal_invariant_holds() {
            return Err(Error::Other(format!(
                "stage execution {} violates the terminal timing invariant",
                se.execution_id
            )));
        }
        self.repo.update_stage_execution(se).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(status: StageStatus, started: Option<i64>, completed: Option<i64>, duration: Option<i64>) -> StageExecution {
        let mut se = StageExecution::new(
            "e1", "s1", 0, "stage-0", "investigate", "kubernetes-agent", None, 0,
            ParallelType::Single, None,
        );
        se.status = status;
        se.started_at_us = started;
        se.completed_at_us = completed;
        se.duration_ms = duration;
        se
    }

    #[test]
    fn duration_is_derived_from_microsecond_span() {
        let started_at_us = 1_000_000;
        let completed_at_us = 4_500_000;
        let expected_ms = (completed_at_us - started_at_us) / 1000;
        assert_eq!(expected_ms, 3_500);
    }

    #[test]
    fn active_stage_with_no_timestamps_satisfies_invariant() {
        let se = sample(StageStatus::Active, None, None, None);
        assert!(se.terminal_invariant_holds());
    }

    #[test]
    fn completed_stage_without_timestamps_violates_invariant() {
        let se = sample(StageStatus::Completed, None, None, None);
        assert!(!se.terminal_invariant_holds());
    }

    #[test]
    fn completed_stage_with_consistent_timestamps_satisfies_invariant() {
        let se = sample(StageStatus::Completed, Some(1_000_000), Some(4_500_000), Some(3_500));
        assert!(se.terminal_invariant_holds());
    }
}
