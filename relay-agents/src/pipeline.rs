//! Pipeline catalog
//!
//! Immutable set of pipeline definitions consulted when a handoff has no
//! explicit target. Lookup is first-match in declaration order.

use relay_core::{roles, ConfigError, ItemType, PipelineDefinition, RelayConfig};
use std::collections::HashSet;

/// Ordered, validated list of pipelines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineCatalog {
    pipelines: Vec<PipelineDefinition>,
}

impl PipelineCatalog {
    /// Build a catalog from explicit definitions.
    ///
    /// Every definition is validated and pipeline ids must be unique.
    pub fn new(pipelines: Vec<PipelineDefinition>) -> Result<Self, ConfigError> {
        let mut ids = HashSet::new();
        for pipeline in &pipelines {
            pipeline.validate()?;
            if !ids.insert(pipeline.id.as_str()) {
                return Err(ConfigError::InvalidValue {
                    field: "pipelines.id".to_string(),
                    value: pipeline.id.clone(),
                    reason: "pipeline ids must be unique".to_string(),
                });
            }
        }
        Ok(Self { pipelines })
    }

    /// The catalog shipped with RELAY.
    pub fn builtin() -> Self {
        Self {
            pipelines: vec![
                PipelineDefinition::new(
                    "story-delivery",
                    "Story Delivery",
                    [
                        roles::PRODUCT_OWNER,
                        roles::DEVELOPER,
                        roles::TESTER,
                        roles::SECURITY,
                    ],
                    &[ItemType::Story],
                ),
                PipelineDefinition::new(
                    "task-execution",
                    "Task Execution",
                    [roles::DEVELOPER, roles::TESTER],
                    &[ItemType::Task],
                ),
                PipelineDefinition::new(
                    "code-review",
                    "Code Review",
                    [roles::DEVELOPER, roles::SECURITY, roles::DOCUMENTATION],
                    &[ItemType::CodeReview],
                ),
                PipelineDefinition::new(
                    "test-verification",
                    "Test Verification",
                    [roles::TESTER, roles::DEVELOPER],
                    &[ItemType::TestCase],
                ),
                PipelineDefinition::new(
                    "roadmap-planning",
                    "Roadmap Planning",
                    [
                        roles::PRODUCT_OWNER,
                        roles::DEVELOPER,
                        roles::DEVOPS,
                        roles::DOCUMENTATION,
                    ],
                    &[ItemType::Roadmap],
                ),
            ],
        }
    }

    /// Catalog from `config.pipelines`, or the built-in one when unset.
    pub fn from_config(config: &RelayConfig) -> Result<Self, ConfigError> {
        match &config.pipelines {
            Some(pipelines) => Self::new(pipelines.clone()),
            None => Ok(Self::builtin()),
        }
    }

    pub fn pipelines(&self) -> &[PipelineDefinition] {
        &self.pipelines
    }

    /// First declared pipeline containing `item_type`.
    pub fn find_pipeline(&self, item_type: ItemType) -> Option<&PipelineDefinition> {
        self.pipelines.iter().find(|p| p.applies_to(item_type))
    }

    /// Agent after `from_agent` in `pipeline`; `None` when absent or last.
    pub fn next_agent<'p>(&self, from_agent: &str, pipeline: &'p PipelineDefinition) -> Option<&'p str> {
        pipeline.agent_after(from_agent)
    }

    /// Successor of `from_agent` in the pipeline for `item_type`.
    pub fn successor(&self, item_type: ItemType, from_agent: &str) -> Option<&str> {
        let pipeline = self.find_pipeline(item_type)?;
        self.next_agent(from_agent, pipeline)
    }
}

impl Default for PipelineCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_catalog_is_valid() {
        let builtin = PipelineCatalog::builtin();
        let rebuilt = PipelineCatalog::new(builtin.pipelines().to_vec()).unwrap();
        assert_eq!(rebuilt, builtin);
    }

    #[test]
    fn test_every_item_type_has_a_pipeline() {
        let catalog = PipelineCatalog::builtin();
        for item_type in ItemType::ALL {
            assert!(catalog.find_pipeline(item_type).is_some(), "{}", item_type);
        }
    }

    #[test]
    fn test_story_chain() {
        let catalog = PipelineCatalog::builtin();
        assert_eq!(catalog.successor(ItemType::Story, "product-owner"), Some("developer"));
        assert_eq!(catalog.successor(ItemType::Story, "developer"), Some("tester"));
        assert_eq!(catalog.successor(ItemType::Story, "tester"), Some("security"));
        assert_eq!(catalog.successor(ItemType::Story, "security"), None);
        assert_eq!(catalog.successor(ItemType::Story, "devops"), None);
    }

    #[test]
    fn test_first_declared_pipeline_wins() {
        let catalog = PipelineCatalog::new(vec![
            PipelineDefinition::new("a", "A", ["developer", "tester"], &[ItemType::Task]),
            PipelineDefinition::new("b", "B", ["developer", "security"], &[ItemType::Task]),
        ])
        .unwrap();
        assert_eq!(catalog.find_pipeline(ItemType::Task).unwrap().id, "a");
        assert_eq!(catalog.successor(ItemType::Task, "developer"), Some("tester"));
        assert!(catalog.find_pipeline(ItemType::Story).is_none());
    }

    #[test]
    fn test_rejects_invalid_definitions() {
        let empty = PipelineDefinition::new("e", "Empty", Vec::<String>::new(), &[ItemType::Task]);
        assert!(PipelineCatalog::new(vec![empty]).is_err());

        let dup = PipelineDefinition::new("d", "Dup", ["tester", "tester"], &[ItemType::Task]);
        assert!(PipelineCatalog::new(vec![dup]).is_err());

        let one = PipelineDefinition::new("x", "X", ["tester"], &[ItemType::Task]);
        let err = PipelineCatalog::new(vec![one.clone(), one]).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn test_from_config() {
        let mut config = RelayConfig::default();
        assert_eq!(
            PipelineCatalog::from_config(&config).unwrap(),
            PipelineCatalog::builtin()
        );

        config.pipelines = Some(vec![PipelineDefinition::new(
            "solo",
            "Solo",
            ["devops"],
            &[ItemType::Roadmap],
        )]);
        let catalog = PipelineCatalog::from_config(&config).unwrap();
        assert_eq!(catalog.pipelines().len(), 1);
        assert_eq!(catalog.successor(ItemType::Roadmap, "devops"), None);
    }
}
