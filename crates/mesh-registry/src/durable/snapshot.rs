//! Periodic full-population snapshot, written alongside the append log so a
//! restart doesn't need to replay the log from the beginning of time.

use std::path::{Path, PathBuf};

use mesh_core::wire::{AgentMetadata, ToolSpec};

use crate::store::{AgentStore, RegistryConfig};

use super::log::DurableError;

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
struct SnapshotRecord {
    agent_id: String,
    metadata: AgentMetadata,
}

#[derive(Debug, Default, serde::Serialize, serde::Deserialize)]
struct SnapshotFile {
    agents: Vec<SnapshotRecord>,
}

/// A full-population dump, read back on startup before the append log's
/// tail is replayed on top of it (§4.D durable backing: "periodic
/// snapshot" plus the append log for what happened since).
#[derive(Debug, Clone)]
pub struct Snapshot {
    path: PathBuf,
}

impl Snapshot {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn write(&self, store: &AgentStore) -> Result<(), DurableError> {
        let snapshot = store.snapshot();
        let agents = snapshot
            .agents
            .values()
            .map(|a| SnapshotRecord {
                agent_id: a.agent_id.clone(),
                metadata: AgentMetadata {
                    name: a.name.clone(),
                    namespace: a.namespace.clone(),
                    endpoint: a.endpoint.clone(),
                    version: a.version.clone(),
                    timeout_threshold: Some(a.timeout_threshold.as_secs()),
                    eviction_threshold: Some(a.eviction_threshold.as_secs()),
                    tools: a
                        .tools
                        .iter()
                        .map(|t| ToolSpec {
                            function_name: t.function_name.clone(),
                            capability: t.capability.clone(),
                            version: t.version_raw.clone(),
                            tags: t.tags.clone(),
                            description: t.description.clone(),
                            input_schema: t.input_schema.clone(),
                            dependencies: t.dependencies.iter().map(|d| d.to_spec()).collect(),
                        })
                        .collect(),
                },
            })
            .collect();

        let file = SnapshotFile { agents };
        let json = serde_json::to_string_pretty(&file).expect("SnapshotFile always serializes");
        fs_err::tokio::write(&self.path, json).await?;
        Ok(())
    }

    /// Load a snapshot (if one exists on disk) into a fresh store. Returns
    /// the store configured with `config`; an absent file is not an error —
    /// a first boot has nothing to load yet.
    pub async fn load(&self, config: RegistryConfig) -> Result<std::sync::Arc<AgentStore>, DurableError> {
        let store = AgentStore::new(config);
        if !self.path.exists() {
            return Ok(store);
        }
        let contents = fs_err::tokio::read_to_string(&self.path).await?;
        let file: SnapshotFile = serde_json::from_str(&contents)
            .map_err(|e| DurableError::Decode(0, e))?;
        for record in file.agents {
            let _ = store.upsert_agent(&record.agent_id, &record.metadata).await;
        }
        Ok(store)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mesh_core::wire::{DependencySpec, ToolSpec as WireToolSpec};

    fn meta() -> AgentMetadata {
        AgentMetadata {
            name: "clock".into(),
            namespace: None,
            endpoint: "http://clock:8080".into(),
            version: "1.2.0".into(),
            timeout_threshold: Some(60),
            eviction_threshold: Some(120),
            tools: vec![WireToolSpec {
                function_name: "get_current_date".into(),
                capability: "date_service".into(),
                version: "1.2.0".into(),
                tags: vec![],
                description: None,
                input_schema: None,
                dependencies: vec![],
            }],
        }
    }

    fn meta_with_dependency() -> AgentMetadata {
        AgentMetadata {
            name: "greeter".into(),
            namespace: None,
            endpoint: "http://greeter:8080".into(),
            version: "1.0.0".into(),
            timeout_threshold: Some(60),
            eviction_threshold: Some(120),
            tools: vec![WireToolSpec {
                function_name: "greet".into(),
                capability: "greeting".into(),
                version: "1.0.0".into(),
                tags: vec![],
                description: None,
                input_schema: None,
                dependencies: vec![
                    DependencySpec::new("date_service")
                        .with_version(">=1.0.0")
                        .with_tags(["prod"])
                        .with_slot("date"),
                ],
            }],
        }
    }

    #[tokio::test]
    async fn write_then_load_round_trips_population() {
        let dir = std::env::temp_dir().join(format!(
            "mesh-registry-snapshot-test-{}",
            std::process::id()
        ));
        tokio::fs::create_dir_all(&dir).await.unwrap();
        let snapshot = Snapshot::new(dir.join("snapshot.json"));

        let store = AgentStore::new(RegistryConfig::default());
        store.upsert_agent("clock-bbbbbbbb", &meta()).await.unwrap();
        snapshot.write(&store).await.unwrap();

        let loaded = snapshot.load(RegistryConfig::default()).await.unwrap();
        assert!(loaded.get("clock-bbbbbbbb").is_some());
        let _ = tokio::fs::remove_dir_all(&dir).await;
    }

    #[tokio::test]
    async fn write_then_load_preserves_tool_dependencies() {
        let dir = std::env::temp_dir().join(format!(
            "mesh-registry-snapshot-test-deps-{}",
            std::process::id()
        ));
        tokio::fs::create_dir_all(&dir).await.unwrap();
        let snapshot = Snapshot::new(dir.join("snapshot.json"));

        let store = AgentStore::new(RegistryConfig::default());
        store
            .upsert_agent("greeter-aaaaaaaa", &meta_with_dependency())
            .await
            .unwrap();
        snapshot.write(&store).await.unwrap();

        let loaded = snapshot.load(RegistryConfig::default()).await.unwrap();
        let record = loaded.get("greeter-aaaaaaaa").unwrap();
        let deps = &record.tool("greet").unwrap().dependencies;
        assert_eq!(deps.len(), 1);
        assert_eq!(deps[0].capability, "date_service");
        assert_eq!(deps[0].tags, vec!["prod".to_string()]);
        assert_eq!(deps[0].slot, "date");
        assert!(deps[0].constraint.as_ref().unwrap().matches(&semver::Version::parse("1.2.0").unwrap()));
        let _ = tokio::fs::remove_dir_all(&dir).await;
    }

    #[tokio::test]
    async fn load_with_no_file_returns_empty_store() {
        let snapshot = Snapshot::new(
            std::env::temp_dir().join("mesh-registry-snapshot-test-missing/snapshot.json"),
        );
        let loaded = snapshot.load(RegistryConfig::default()).await.unwrap();
        assert!(loaded.snapshot().agents.is_empty());
    }
}
