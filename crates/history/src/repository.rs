//! SQL persistence for sessions, stage executions, and interactions.
//!
//! Schema is created with `CREATE TABLE IF NOT EXISTS` on connect, so
//! there is no separate migration step to run before starting the
//! service. Structured/optional fields (`alert_data`, `chain_config`,
//! `conversation`, tool arguments/results) are stored as JSON text
//! columns — both SQLite and PostgreSQL are happy storing and
//! `LIKE`-searching text regardless of how the column is later read.

use sqlx::any::{install_default_drivers, AnyPoolOptions};
use sqlx::AnyPool;
use sqlx::Row;

use tarsy_domain::config::DatabaseConfig;
use tarsy_domain::error::{Error, Result};
use tarsy_domain::model::{
    CommunicationType, ConversationRole, InteractionType, LlmInteraction, McpInteraction, Session,
    SessionStatus, StageExecution, StageStatus,
};

pub struct HistoryRepository {
    pool: AnyPool,
}

/// Filters for [`HistoryRepository::list_sessions`]. All fields are
/// optional — an all-`None` filter lists every session, newest first.
#[derive(Debug, Clone, Default)]
pub struct SessionFilter {
    pub alert_type: Option<String>,
    pub status: Option<SessionStatus>,
    pub text_query: Option<String>,
    pub limit: u32,
}

impl HistoryRepository {
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        install_default_drivers();
        let pool = AnyPoolOptions::new()
            .max_connections(config.pool_size)
            .connect(&config.url)
            .await
            .map_err(|e| Error::Other(format!("connecting to database: {e}")))?;
        let repo = Self { pool };
        repo.migrate().await?;
        Ok(repo)
    }

    async fn migrate(&self) -> Result<()> {
        let statements = [
            "CREATE TABLE IF NOT EXISTS sessions (
                session_id TEXT PRIMARY KEY,
                alert_type TEXT NOT NULL,
                alert_data TEXT NOT NULL,
                runbook_url TEXT,
                chain_config TEXT NOT NULL,
                status TEXT NOT NULL,
                started_at_us BIGINT,
                completed_at_us BIGINT,
                final_analysis TEXT,
                final_analysis_summary TEXT,
                current_stage_index INTEGER,
                current_stage_execution_id TEXT,
                author TEXT
            )",
            "CREATE TABLE IF NOT EXISTS stage_executions (
                execution_id TEXT PRIMARY KEY,
                session_id TEXT NOT NULL,
                stage_index INTEGER NOT NULL,
                stage_id TEXT NOT NULL,
                stage_name TEXT NOT NULL,
                agent TEXT NOT NULL,
                status TEXT NOT NULL,
                started_at_us BIGINT,
                completed_at_us BIGINT,
                duration_ms BIGINT,
                current_iteration INTEGER,
                stage_output TEXT,
                error_message TEXT,
                parent_stage_execution_id TEXT,
                parallel_index INTEGER NOT NULL,
                parallel_type TEXT NOT NULL,
                expected_parallel_count INTEGER
            )",
            "CREATE TABLE IF NOT EXISTS llm_interactions (
                interaction_id TEXT PRIMARY KEY,
                session_id TEXT NOT NULL,
                stage_execution_id TEXT NOT NULL,
                provider TEXT NOT NULL,
                model_name TEXT NOT NULL,
                temperature REAL NOT NULL,
                interaction_type TEXT NOT NULL,
                conversation TEXT NOT NULL,
                native_tools_config TEXT,
                start_time_us BIGINT NOT NULL,
                end_time_us BIGINT,
                duration_ms BIGINT,
                timestamp_us BIGINT,
                success INTEGER,
                error_message TEXT
            )",
            "CREATE TABLE IF NOT EXISTS mcp_interactions (
                request_id TEXT PRIMARY KEY,
                session_id TEXT NOT NULL,
                stage_execution_id TEXT NOT NULL,
                server_name TEXT NOT NULL,
                communication_type TEXT NOT NULL,
                tool_name TEXT,
                tool_arguments TEXT,
                tool_result TEXT,
                available_tools TEXT,
                start_time_us BIGINT NOT NULL,
                end_time_us BIGINT,
                duration_ms BIGINT,
                success INTEGER,
                error_message TEXT,
                step_description TEXT
            )",
        ];
        for stmt in statements {
            sqlx::query(stmt)
                .execute(&self.pool)
                .await
                .map_err(|e| Error::Other(format!("running schema migration: {e}")))?;
        }
        Ok(())
    }

    pub async fn create_session(&self, session: &Session) -> Result<()> {
        sqlx::query(
            "INSERT INTO sessions (session_id, alert_type, alert_data, runbook_url, chain_config,
                status, started_at_us, completed_at_us, final_analysis, final_analysis_summary,
                current_stage_index, current_stage_execution_id, author)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&session.session_id)
        .bind(&session.alert_type)
        .bind(session.alert_data.to_string())
        .bind(&session.runbook_url)
        .bind(session.chain_config.to_string())
        .bind(status_str(session.status))
        .bind(session.started_at_us)
        .bind(session.completed_at_us)
        .bind(&session.final_analysis)
        .bind(&session.final_analysis_summary)
        .bind(session.current_stage_index.map(|v| v as i64))
        .bind(&session.current_stage_execution_id)
        .bind(&session.author)
        .execute(&self.pool)
        .await
        .map_err(|e| Error::Other(format!("inserting session: {e}")))?;
        Ok(())
    }

    pub async fn get_session(&self, session_id: &str) -> Result<Option<Session>> {
        let row = sqlx::query("SELECT * FROM sessions WHERE session_id = ?")
            .bind(session_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| Error::Other(format!("fetching session: {e}")))?;
        row.map(session_from_row).transpose()
    }

    /// Transition a session's status, stamping `completed_at_us` when the
    /// new status is terminal — callers must not pass a terminal status
    /// without `completed_at_us`, or [`Session::terminal_invariant_holds`]
    /// will be violated on the next read.
    pub async fn update_session_status(
        &self,
        session_id: &str,
        status: SessionStatus,
        completed_at_us: Option<i64>,
    ) -> Result<()> {
        sqlx::query("UPDATE sessions SET status = ?, completed_at_us = COALESCE(?, completed_at_us) WHERE session_id = ?")
            .bind(status_str(status))
            .bind(completed_at_us)
            .bind(session_id)
            .execute(&self.pool)
            .await
            .map_err(|e| Error::Other(format!("updating session status: {e}")))?;
        Ok(())
    }

    pub async fn set_final_analysis(
        &self,
        session_id: &str,
        final_analysis: &str,
        final_analysis_summary: Option<&str>,
    ) -> Result<()> {
        sqlx::query("UPDATE sessions SET final_analysis = ?, final_analysis_summary = ? WHERE session_id = ?")
            .bind(final_analysis)
            .bind(final_analysis_summary)
            .bind(session_id)
            .execute(&self.pool)
            .await
            .map_err(|e| Error::Other(format!("setting final analysis: {e}")))?;
        Ok(())
    }

    pub async fn advance_current_stage(
        &self,
        session_id: &str,
        stage_index: u32,
        stage_execution_id: &str,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE sessions SET current_stage_index = ?, current_stage_execution_id = ? WHERE session_id = ?",
        )
        .bind(stage_index as i64)
        .bind(stage_execution_id)
        .bind(session_id)
        .execute(&self.pool)
        .await
        .map_err(|e| Error::Other(format!("advancing current stage: {e}")))?;
        Ok(())
    }

    pub async fn list_sessions(&self, filter: &SessionFilter) -> Result<Vec<Session>> {
        let limit = if filter.limit == 0 { 50 } else { filter.limit };
        let mut sql = String::from("SELECT * FROM sessions WHERE 1=1");
        if filter.alert_type.is_some() {
            sql.push_str(" AND alert_type = ?");
        }
        if filter.status.is_some() {
            sql.push_str(" AND status = ?");
        }
        if filter.text_query.is_some() {
            sql.push_str(" AND (final_analysis LIKE ? OR alert_data LIKE ?)");
        }
        sql.push_str(" ORDER BY started_at_us DESC LIMIT ?");

        let mut query = sqlx::query(&sql);
        if let Some(alert_type) = &filter.alert_type {
            query = query.bind(alert_type);
        }
        if let Some(status) = filter.status {
            query = query.bind(status_str(status));
        }
        if let Some(text) = &filter.text_query {
            let pattern = format!("%{text}%");
            query = query.bind(pattern.clone()).bind(pattern);
        }
        query = query.bind(limit as i64);

        let rows = query
            .fetch_all(&self.pool)
            .await
            .map_err(|e| Error::Other(format!("listing sessions: {e}")))?;
        rows.into_iter().map(session_from_row).collect()
    }

    pub async fn create_stage_execution(&self, se: &StageExecution) -> Result<()> {
        sqlx::query(
            "INSERT INTO stage_executions (execution_id, session_id, stage_index, stage_id, stage_name,
                agent, status, started_at_us, completed_at_us, duration_ms, current_iteration,
                stage_output, error_message, parent_stage_execution_id, parallel_index, parallel_type,
                expected_parallel_count)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&se.execution_id)
        .bind(&se.session_id)
        .bind(se.stage_index as i64)
        .bind(&se.stage_id)
        .bind(&se.stage_name)
        .bind(&se.agent)
        .bind(stage_status_str(se.status))
        .bind(se.started_at_us)
        .bind(se.completed_at_us)
        .bind(se.duration_ms)
        .bind(se.current_iteration.map(|v| v as i64))
        .bind(se.stage_output.as_ref().map(|v| v.to_string()))
        .bind(&se.error_message)
        .bind(&se.parent_stage_execution_id)
        .bind(se.parallel_index as i64)
        .bind(parallel_type_str(se.parallel_type))
        .bind(se.expected_parallel_count.map(|v| v as i64))
        .execute(&self.pool)
        .await
        .map_err(|e| Error::Other(format!("inserting stage execution: {e}")))?;
        Ok(())
    }

    pub async fn update_stage_execution(&self, se: &StageExecution) -> Result<()> {
        sqlx::query(
            "UPDATE stage_executions SET status = ?, started_at_us = ?, completed_at_us = ?,
                duration_ms = ?, current_iteration = ?, stage_output = ?, error_message = ?
             WHERE execution_id = ?",
        )
        .bind(stage_status_str(se.status))
        .bind(se.started_at_us)
        .bind(se.completed_at_us)
        .bind(se.duration_ms)
        .bind(se.current_iteration.map(|v| v as i64))
        .bind(se.stage_output.as_ref().map(|v| v.to_string()))
        .bind(&se.error_message)
        .bind(&se.execution_id)
        .execute(&self.pool)
        .await
        .map_err(|e| Error::Other(format!("updating stage execution: {e}")))?;
        Ok(())
    }

    pub async fn list_stage_executions(&self, session_id: &str) -> Result<Vec<StageExecution>> {
        let rows = sqlx::query("SELECT * FROM stage_executions WHERE session_id = ? ORDER BY stage_index, parallel_index")
            .bind(session_id)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| Error::Other(format!("listing stage executions: {e}")))?;
        rows.into_iter().map(stage_execution_from_row).collect()
    }

    pub async fn insert_llm_interaction(&self, i: &LlmInteraction) -> Result<()> {
        let conversation = serde_json::to_string(&i.conversation)
            .map_err(|e| Error::Other(format!("serializing conversation: {e}")))?;
        sqlx::query(
            "INSERT INTO llm_interactions (interaction_id, session_id, stage_execution_id, provider,
                model_name, temperature, interaction_type, conversation, native_tools_config,
                start_time_us, end_time_us, duration_ms, timestamp_us, success, error_message)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&i.interaction_id)
        .bind(&i.session_id)
        .bind(&i.stage_execution_id)
        .bind(&i.provider)
        .bind(&i.model_name)
        .bind(i.temperature as f64)
        .bind(interaction_type_str(i.interaction_type))
        .bind(conversation)
        .bind(i.native_tools_config.as_ref().map(|v| v.to_string()))
        .bind(i.start_time_us)
        .bind(i.end_time_us)
        .bind(i.duration_ms)
        .bind(i.timestamp_us)
        .bind(i.success.map(|b| b as i32))
        .bind(&i.error_message)
        .execute(&self.pool)
        .await
        .map_err(|e| Error::Other(format!("inserting LLM interaction: {e}")))?;
        Ok(())
    }

    pub async fn insert_mcp_interaction(&self, i: &McpInteraction) -> Result<()> {
        sqlx::query(
            "INSERT INTO mcp_interactions (request_id, session_id, stage_execution_id, server_name,
                communication_type, tool_name, tool_arguments, tool_result, available_tools,
                start_time_us, end_time_us, duration_ms, success, error_message, step_description)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&i.request_id)
        .bind(&i.session_id)
        .bind(&i.stage_execution_id)
        .bind(&i.server_name)
        .bind(communication_type_str(i.communication_type))
        .bind(&i.tool_name)
        .bind(i.tool_arguments.as_ref().map(|v| v.to_string()))
        .bind(i.tool_result.as_ref().map(|v| v.to_string()))
        .bind(i.available_tools.as_ref().map(|v| v.to_string()))
        .bind(i.start_time_us)
        .bind(i.end_time_us)
        .bind(i.duration_ms)
        .bind(i.success.map(|b| b as i32))
        .bind(&i.error_message)
        .bind(&i.step_description)
        .execute(&self.pool)
        .await
        .map_err(|e| Error::Other(format!("inserting MCP interaction: {e}")))?;
        Ok(())
    }

    /// Sessions still `in_progress`/`pending` whose last stage execution
    /// started more than `timeout_min` minutes ago — candidates for the
    /// orphan-cleanup sweep.
    pub async fn find_orphaned_sessions(&self, now_us: i64, timeout_min: u64) -> Result<Vec<Session>> {
        let cutoff_us = now_us - (timeout_min as i64) * 60 * 1_000_000;
        let rows = sqlx::query(
            "SELECT * FROM sessions WHERE status IN ('pending', 'in_progress') AND (started_at_us IS NULL OR started_at_us < ?)",
        )
        .bind(cutoff_us)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| Error::Other(format!("finding orphaned sessions: {e}")))?;
        rows.into_iter().map(session_from_row).collect()
    }

    /// Delete terminal sessions (and their child rows) older than
    /// `retention_days`; returns the number of sessions removed.
    pub async fn apply_retention(&self, now_us: i64, retention_days: u64) -> Result<u64> {
        let cutoff_us = now_us - (retention_days as i64) * 86_400 * 1_000_000;
        let expired = sqlx::query(
            "SELECT session_id FROM sessions WHERE completed_at_us IS NOT NULL AND completed_at_us < ?",
        )
        .bind(cutoff_us)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| Error::Other(format!("finding expired sessions: {e}")))?;

        let mut deleted = 0u64;
        for row in expired {
            let session_id: String = row.try_get("session_id").map_err(|e| Error::Other(e.to_string()))?;
            for table in ["mcp_interactions", "llm_interactions", "stage_executions", "sessions"] {
                sqlx::query(&format!("DELETE FROM {table} WHERE session_id = ?"))
                    .bind(&session_id)
                    .execute(&self.pool)
                    .await
                    .map_err(|e| Error::Other(format!("deleting expired session rows from {table}: {e}")))?;
            }
            deleted += 1;
        }
        Ok(deleted)
    }
}

// ── row <-> model conversions ───────────────────────────────────────

fn status_str(status: SessionStatus) -> &'static str {
    match status {
        SessionStatus::Pending => "pending",
        SessionStatus::InProgress => "in_progress",
        SessionStatus::Paused => "paused",
        SessionStatus::Completed => "completed",
        SessionStatus::Failed => "failed",
        SessionStatus::Cancelled => "cancelled",
    }
}

fn parse_status(s: &str) -> Result<SessionStatus> {
    Ok(match s {
        "pending" => SessionStatus::Pending,
        "in_progress" => SessionStatus::InProgress,
        "paused" => SessionStatus::Paused,
        "completed" => SessionStatus::Completed,
        "failed" => SessionStatus::Failed,
        "cancelled" => SessionStatus::Cancelled,
        other => return Err(Error::Other(format!("unknown session status in database row: {other}"))),
    })
}

fn stage_status_str(status: StageStatus) -> &'static str {
    match status {
        StageStatus::Pending => "pending",
        StageStatus::Active => "active",
        StageStatus::Paused => "paused",
        StageStatus::Completed => "completed",
        StageStatus::Failed => "failed",
    }
}

fn parse_stage_status(s: &str) -> Result<StageStatus> {
    Ok(match s {
        "pending" => StageStatus::Pending,
        "active" => StageStatus::Active,
        "paused" => StageStatus::Paused,
        "completed" => StageStatus::Completed,
        "failed" => StageStatus::Failed,
        other => return Err(Error::Other(format!("unknown stage status in database row: {other}"))),
    })
}

fn parallel_type_str(t: tarsy_domain::model::ParallelType) -> &'static str {
    use tarsy_domain::model::ParallelType;
    match t {
        ParallelType::Single => "single",
        ParallelType::MultiAgent => "multi_agent",
        ParallelType::Replica => "replica",
    }
}

fn parse_parallel_type(s: &str) -> Result<tarsy_domain::model::ParallelType> {
    use tarsy_domain::model::ParallelType;
    Ok(match s {
        "single" => ParallelType::Single,
        "multi_agent" => ParallelType::MultiAgent,
        "replica" => ParallelType::Replica,
        other => return Err(Error::Other(format!("unknown parallel type in database row: {other}"))),
    })
}

fn interaction_type_str(t: InteractionType) -> &'static str {
    match t {
        InteractionType::Investigation => "investigation",
        InteractionType::Summarization => "summarization",
    }
}

fn communication_type_str(t: CommunicationType) -> &'static str {
    match t {
        CommunicationType::ToolList => "tool_list",
        CommunicationType::ToolCall => "tool_call",
    }
}

fn json_col(row: &sqlx::any::AnyRow, col: &str) -> Result<serde_json::Value> {
    let raw: String = row.try_get(col).map_err(|e| Error::Other(e.to_string()))?;
    serde_json::from_str(&raw).map_err(|e| Error::Other(format!("parsing {col}: {e}")))
}

fn json_col_opt(row: &sqlx::any::AnyRow, col: &str) -> Result<Option<serde_json::Value>> {
    let raw: Option<String> = row.try_get(col).map_err(|e| Error::Other(e.to_string()))?;
    raw.map(|r| serde_json::from_str(&r).map_err(|e| Error::Other(format!("parsing {col}: {e}"))))
        .transpose()
}

fn session_from_row(row: sqlx::any::AnyRow) -> Result<Session> {
    let status_raw: String = row.try_get("status").map_err(|e| Error::Other(e.to_string()))?;
    Ok(Session {
        session_id: row.try_get("session_id").map_err(|e| Error::Other(e.to_string()))?,
        alert_type: row.try_get("alert_type").map_err(|e| Error::Other(e.to_string()))?,
        alert_data: json_col(&row, "alert_data")?,
        runbook_url: row.try_get("runbook_url").map_err(|e| Error::Other(e.to_string()))?,
        chain_config: json_col(&row, "chain_config")?,
        status: parse_status(&status_raw)?,
        started_at_us: row.try_get("started_at_us").map_err(|e| Error::Other(e.to_string()))?,
        completed_at_us: row.try_get("completed_at_us").map_err(|e| Error::Other(e.to_string()))?,
        final_analysis: row.try_get("final_analysis").map_err(|e| Error::Other(e.to_string()))?,
        final_analysis_summary: row.try_get("final_analysis_summary").map_err(|e| Error::Other(e.to_string()))?,
        current_stage_index: row
            .try_get::<Option<i64>, _>("current_stage_index")
            .map_err(|e| Error::Other(e.to_string()))?
            .map(|v| v as u32),
        current_stage_execution_id: row.try_get("current_stage_execution_id").map_err(|e| Error::Other(e.to_string()))?,
        author: row.try_get("author").map_err(|e| Error::Other(e.to_string()))?,
    })
}

fn stage_execution_from_row(row: sqlx::any::AnyRow) -> Result<StageExecution> {
    let status_raw: String = row.try_get("status").map_err(|e| Error::Other(e.to_string()))?;
    let parallel_type_raw: String = row.try_get("parallel_type").map_err(|e| Error::Other(e.to_string()))?;
    Ok(StageExecution {
        execution_id: row.try_get("execution_id").map_err(|e| Error::Other(e.to_string()))?,
        session_id: row.try_get("session_id").map_err(|e| Error::Other(e.to_string()))?,
        stage_index: row.try_get::<i64, _>("stage_index").map_err(|e| Error::Other(e.to_string()))? as u32,
        stage_id: row.try_get("stage_id").map_err(|e| Error::Other(e.to_string()))?,
        stage_name: row.try_get("stage_name").map_err(|e| Error::Other(e.to_string()))?,
        agent: row.try_get("agent").map_err(|e| Error::Other(e.to_string()))?,
        status: parse_stage_status(&status_raw)?,
        started_at_us: row.try_get("started_at_us").map_err(|e| Error::Other(e.to_string()))?,
        completed_at_us: row.try_get("completed_at_us").map_err(|e| Error::Other(e.to_string()))?,
        duration_ms: row.try_get("duration_ms").map_err(|e| Error::Other(e.to_string()))?,
        current_iteration: row
            .try_get::<Option<i64>, _>("current_iteration")
            .map_err(|e| Error::Other(e.to_string()))?
            .map(|v| v as u32),
        stage_output: json_col_opt(&row, "stage_output")?,
        error_message: row.try_get("error_message").map_err(|e| Error::Other(e.to_string()))?,
        parent_stage_execution_id: row.try_get("parent_stage_execution_id").map_err(|e| Error::Other(e.to_string()))?,
        parallel_index: row.try_get::<i64, _>("parallel_index").map_err(|e| Error::Other(e.to_string()))? as u32,
        parallel_type: parse_parallel_type(&parallel_type_raw)?,
        expected_parallel_count: row
            .try_get::<Option<i64>, _>("expected_parallel_count")
            .map_err(|e| Error::Other(e.to_string()))?
            .map(|v| v as u32),
    })
}
