use tarsy_domain::model::ResultStatus;

#[derive(Debug, Clone)]
pub struct ChainExecutionResult {
    pub status: ResultStatus,
    pub final_analysis: Option<String>,
    pub timestamp_us: i64,
}
