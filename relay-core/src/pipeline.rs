//! Pipeline definitions (configuration, not mutable state)

use crate::{AgentName, ConfigError, ItemType};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Ordered agent sequence applied to one or more item types.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct PipelineDefinition {
    pub id: String,
    pub name: String,
    pub agents: Vec<AgentName>,
    pub item_types: Vec<ItemType>,
}

impl PipelineDefinition {
    pub fn new<A, S>(id: &str, name: &str, agents: A, item_types: &[ItemType]) -> Self
    where
        A: IntoIterator<Item = S>,
        S: Into<AgentName>,
    {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            agents: agents.into_iter().map(Into::into).collect(),
            item_types: item_types.to_vec(),
        }
    }

    /// Whether this pipeline declares `item_type`.
    pub fn applies_to(&self, item_type: ItemType) -> bool {
        self.item_types.contains(&item_type)
    }

    /// Agent immediately following `agent`, or `None` when absent or last.
    pub fn agent_after(&self, agent: &str) -> Option<&str> {
        let index = self.agents.iter().position(|a| a == agent)?;
        self.agents.get(index + 1).map(String::as_str)
    }

    /// Reject definitions that could never route work.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let field = format!("pipelines.{}", self.id);
        if self.id.trim().is_empty() {
            return Err(ConfigError::MissingRequired {
                field: "pipelines.id".to_string(),
            });
        }
        if self.agents.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: format!("{}.agents", field),
                value: "[]".to_string(),
                reason: "a pipeline needs at least one agent".to_string(),
            });
        }
        let mut seen = HashSet::new();
        for agent in &self.agents {
            if agent.trim().is_empty() || !seen.insert(agent.as_str()) {
                return Err(ConfigError::InvalidValue {
                    field: format!("{}.agents", field),
                    value: agent.clone(),
                    reason: "agent names must be non-empty and unique within a pipeline"
                        .to_string(),
                });
            }
        }
        if self.item_types.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: format!("{}.item_types", field),
                value: "[]".to_string(),
                reason: "a pipeline must apply to at least one item type".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn story_pipeline() -> PipelineDefinition {
        PipelineDefinition::new(
            "story",
            "Story delivery",
            ["product-owner", "developer", "tester", "security"],
            &[ItemType::Story],
        )
    }

    #[test]
    fn test_agent_after() {
        let p = story_pipeline();
        assert_eq!(p.agent_after("developer"), Some("tester"));
        assert_eq!(p.agent_after("security"), None);
        assert_eq!(p.agent_after("devops"), None);
    }

    #[test]
    fn test_validate_rejects_duplicate_agent() {
        let mut p = story_pipeline();
        p.agents.push("tester".to_string());
        assert!(matches!(p.validate(), Err(ConfigError::InvalidValue { .. })));
    }

    #[test]
    fn test_validate_rejects_empty_item_types() {
        let mut p = story_pipeline();
        p.item_types.clear();
        assert!(p.validate().is_err());
        assert!(story_pipeline().validate().is_ok());
    }
}
