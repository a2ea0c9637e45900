use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Data masking configuration (per MCP server)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct MaskingConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Built-in group names: "basic", "security", "kubernetes".
    #[serde(default)]
    pub pattern_groups: Vec<String>,
    /// Additional ad-hoc `{pattern, replacement}` pairs, applied after
    /// the built-in groups.
    #[serde(default)]
    pub custom_patterns: Vec<CustomPattern>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomPattern {
    pub pattern: String,
    pub replacement: String,
}
