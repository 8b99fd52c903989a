//! The immutable population snapshot an `AgentStore` swaps in on every
//! mutation, plus the secondary indexes the resolver depends on.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use super::{AgentRecord, HealthState};

/// Primary map plus the two secondary indexes named in spec.md §4.D:
/// `by_capability` and `by_tag`. Rebuilt wholesale on every mutation — the
/// same "recompile the whole thing and swap" strategy the teacher's
/// `CompiledRegistry::compile` uses for its own (much larger) registry.
#[derive(Debug, Clone)]
pub struct RegistrySnapshot {
    pub agents: HashMap<String, Arc<AgentRecord>>,
    /// capability -> set of (agent_id, function_name)
    pub by_capability: HashMap<String, Vec<(String, String)>>,
    /// tag -> set of agent_id
    pub by_tag: HashMap<String, HashSet<String>>,
}

impl RegistrySnapshot {
    pub fn empty() -> Self {
        Self {
            agents: HashMap::new(),
            by_capability: HashMap::new(),
            by_tag: HashMap::new(),
        }
    }

    pub(crate) fn clone_agents(&self) -> HashMap<String, Arc<AgentRecord>> {
        self.agents.clone()
    }

    pub fn build(agents: HashMap<String, Arc<AgentRecord>>) -> Self {
        let mut by_capability: HashMap<String, Vec<(String, String)>> = HashMap::new();
        let mut by_tag: HashMap<String, HashSet<String>> = HashMap::new();

        for agent in agents.values() {
            for tool in &agent.tools {
                by_capability
                    .entry(tool.capability.clone())
                    .or_default()
                    .push((agent.agent_id.clone(), tool.function_name.clone()));
                for tag in &tool.tags {
                    by_tag.entry(tag.clone()).or_default().insert(agent.agent_id.clone());
                }
            }
        }

        Self {
            agents,
            by_capability,
            by_tag,
        }
    }

    pub fn healthy_agents(&self) -> impl Iterator<Item = &Arc<AgentRecord>> {
        self.agents.values().filter(|a| a.health == HealthState::Healthy)
    }

    pub fn is_healthy(&self, agent_id: &str) -> bool {
        self.agents
            .get(agent_id)
            .map(|a| a.health == HealthState::Healthy)
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::ToolRecord;
    use semver::Version;

    fn agent(id: &str, capability: &str, tags: Vec<&str>) -> Arc<AgentRecord> {
        Arc::new(AgentRecord {
            agent_id: id.to_string(),
            name: id.to_string(),
            namespace: None,
            endpoint: format!("http://{id}"),
            version: "1.0.0".to_string(),
            timeout_threshold: std::time::Duration::from_secs(60),
            eviction_threshold: std::time::Duration::from_secs(120),
            tools: vec![ToolRecord {
                function_name: "f".to_string(),
                capability: capability.to_string(),
                version: Version::parse("1.0.0").unwrap(),
                version_raw: "1.0.0".to_string(),
                tags: tags.into_iter().map(String::from).collect(),
                description: None,
                input_schema: None,
                dependencies: vec![],
            }],
            created_at: 0,
            last_heartbeat: 0,
            resource_version: 1,
            health: HealthState::Healthy,
        })
    }

    #[test]
    fn build_indexes_by_capability_and_tag() {
        let a = agent("a", "date_service", vec!["prod"]);
        let b = agent("b", "date_service", vec!["dev"]);
        let mut agents = HashMap::new();
        agents.insert("a".to_string(), a);
        agents.insert("b".to_string(), b);

        let snap = RegistrySnapshot::build(agents);
        assert_eq!(snap.by_capability["date_service"].len(), 2);
        assert!(snap.by_tag["prod"].contains("a"));
        assert!(!snap.by_tag["prod"].contains("b"));
    }
}
