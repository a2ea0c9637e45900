use serde::{Deserialize, Serialize};

use crate::model::{FailurePolicy, ParallelType};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Chain definitions — static configuration, read-only at runtime
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainConfig {
    pub chain_id: String,
    #[serde(default)]
    pub alert_types: Vec<String>,
    pub stages: Vec<StageConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageConfig {
    pub name: String,
    /// Agent name for a single stage; ignored when `parallel` is set with
    /// `multi_agent` children (each child names its own agent).
    #[serde(default)]
    pub agent: Option<String>,
    #[serde(default)]
    pub parallel: Option<ParallelConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParallelConfig {
    #[serde(rename = "type")]
    pub parallel_type: ParallelType,
    pub failure_policy: FailurePolicy,
    /// `multi_agent`: one entry per distinct child agent.
    #[serde(default)]
    pub children: Vec<ParallelChild>,
    /// `replica`: number of homogeneous copies of the stage's own agent.
    #[serde(default)]
    pub count: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParallelChild {
    pub name: String,
    pub agent: String,
}

impl StageConfig {
    /// Resolve the `(name, agent)` pairs for this stage's parallel children,
    /// or `None` for a non-parallel stage.
    pub fn resolve_children(&self) -> Option<Vec<ParallelChild>> {
        let parallel = self.parallel.as_ref()?;
        match parallel.parallel_type {
            ParallelType::MultiAgent => Some(parallel.children.clone()),
            ParallelType::Replica => {
                let agent = self.agent.clone().unwrap_or_default();
                let count = parallel.count.unwrap_or(0);
                Some(
                    (0..count)
                        .map(|i| ParallelChild {
                            name: format!("{}-{}", self.name, i + 1),
                            agent: agent.clone(),
                        })
                        .collect(),
                )
            }
            ParallelType::Single => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ChainsConfig {
    #[serde(default)]
    pub chains: Vec<ChainConfig>,
    /// Fallback chain_id used when no chain's `alert_types` matches.
    #[serde(default)]
    pub default_chain_id: Option<String>,
}

impl ChainsConfig {
    /// Resolve a chain for the given alert type: exact `alert_types` match
    /// first, then the configured default, else `None`.
    pub fn resolve(&self, alert_type: &str) -> Option<&ChainConfig> {
        self.chains
            .iter()
            .find(|c| c.alert_types.iter().any(|t| t == alert_type))
            .or_else(|| {
                let default_id = self.default_chain_id.as_ref()?;
                self.chains.iter().find(|c| &c.chain_id == default_id)
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_chains() -> ChainsConfig {
        ChainsConfig {
            chains: vec![
                ChainConfig {
                    chain_id: "kubernetes-agent-chain".into(),
                    alert_types: vec!["kubernetes".into()],
                    stages: vec![StageConfig {
                        name: "investigate".into(),
                        agent: Some("kubernetes-agent".into()),
                        parallel: None,
                    }],
                },
                ChainConfig {
                    chain_id: "generic-chain".into(),
                    alert_types: vec![],
                    stages: vec![],
                },
            ],
            default_chain_id: Some("generic-chain".into()),
        }
    }

    #[test]
    fn exact_alert_type_match() {
        let chains = sample_chains();
        let resolved = chains.resolve("kubernetes").unwrap();
        assert_eq!(resolved.chain_id, "kubernetes-agent-chain");
    }

    #[test]
    fn falls_back_to_default() {
        let chains = sample_chains();
        let resolved = chains.resolve("unknown").unwrap();
        assert_eq!(resolved.chain_id, "generic-chain");
    }

    #[test]
    fn no_match_and_no_default_is_none() {
        let mut chains = sample_chains();
        chains.default_chain_id = None;
        assert!(chains.resolve("unknown").is_none());
    }

    #[test]
    fn replica_children_share_agent() {
        let stage = StageConfig {
            name: "scan".into(),
            agent: Some("scanner".into()),
            parallel: Some(ParallelConfig {
                parallel_type: ParallelType::Replica,
                failure_policy: FailurePolicy::Any,
                children: vec![],
                count: Some(3),
            }),
        };
        let children = stage.resolve_children().unwrap();
        assert_eq!(children.len(), 3);
        assert!(children.iter().all(|c| c.agent == "scanner"));
    }

    #[test]
    fn multi_agent_children_distinct() {
        let stage = StageConfig {
            name: "gather".into(),
            agent: None,
            parallel: Some(ParallelConfig {
                parallel_type: ParallelType::MultiAgent,
                failure_policy: FailurePolicy::All,
                children: vec![
                    ParallelChild { name: "logs".into(), agent: "log-agent".into() },
                    ParallelChild { name: "metrics".into(), agent: "metrics-agent".into() },
                ],
                count: None,
            }),
        };
        let children = stage.resolve_children().unwrap();
        assert_eq!(children.len(), 2);
        assert_eq!(children[0].agent, "log-agent");
    }

    #[test]
    fn single_stage_has_no_children() {
        let stage = StageConfig {
            name: "investigate".into(),
            agent: Some("kubernetes-agent".into()),
            parallel: None,
        };
        assert!(stage.resolve_children().is_none());
    }
}
