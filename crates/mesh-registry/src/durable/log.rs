//! Append-only event log. One JSON object per line, matching the teacher's
//! preference for `serde_json` line-delimited formats over a bespoke binary
//! framing.

use std::path::{Path, PathBuf};

use thiserror::Error;
use tokio::io::AsyncWriteExt;

use mesh_core::wire::AgentMetadata;

use crate::store::{AgentStore, RegistryEvent, RegistryEventKind};

#[derive(Debug, Error)]
pub enum DurableError {
    #[error("durable log io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("durable log decode error at line {0}: {1}")]
    Decode(usize, serde_json::Error),
}

#[derive(Debug, Clone, Copy, serde::Serialize, serde::Deserialize)]
pub enum LoggedEventKind {
    Upserted,
    Deleted,
}

/// A `RegistryEvent` reduced to what replay needs: enough to reconstruct the
/// call that produced it, not the full `AgentRecord` (derived state like
/// `health`/`resource_version` is recomputed on replay, not stored twice).
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct LoggedEvent {
    pub kind: LoggedEventKind,
    pub agent_id: String,
    #[serde(default)]
    pub metadata: Option<AgentMetadata>,
    pub timestamp: u64,
}

impl LoggedEvent {
    pub fn from_registry_event(event: &RegistryEvent) -> Self {
        match event.kind {
            RegistryEventKind::Added | RegistryEventKind::Modified => Self {
                kind: LoggedEventKind::Upserted,
                agent_id: event.agent.agent_id.clone(),
                metadata: Some(AgentMetadata {
                    name: event.agent.name.clone(),
                    namespace: event.agent.namespace.clone(),
                    endpoint: event.agent.endpoint.clone(),
                    version: event.agent.version.clone(),
                    timeout_threshold: Some(event.agent.timeout_threshold.as_secs()),
                    eviction_threshold: Some(event.agent.eviction_threshold.as_secs()),
                    tools: event
                        .agent
                        .tools
                        .iter()
                        .map(|t| mesh_core::wire::ToolSpec {
                            function_name: t.function_name.clone(),
                            capability: t.capability.clone(),
                            version: t.version_raw.clone(),
                            tags: t.tags.clone(),
                            description: t.description.clone(),
                            input_schema: t.input_schema.clone(),
                            dependencies: t.dependencies.iter().map(|d| d.to_spec()).collect(),
                        })
                        .collect(),
                }),
                timestamp: event.timestamp,
            },
            RegistryEventKind::Deleted => Self {
                kind: LoggedEventKind::Deleted,
                agent_id: event.agent.agent_id.clone(),
                metadata: None,
                timestamp: event.timestamp,
            },
        }
    }
}

/// Appends every registry mutation to a file so a restarted registry can
/// rebuild its population without waiting for agents to re-register.
#[derive(Debug, Clone)]
pub struct AppendLog {
    path: PathBuf,
}

impl AppendLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn append(&self, event: &LoggedEvent) -> Result<(), DurableError> {
        let mut line = serde_json::to_string(event).expect("LoggedEvent always serializes");
        line.push('\n');
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        Ok(())
    }

    /// Read every logged event back, in the order they were appended.
    pub async fn read_all(&self) -> Result<Vec<LoggedEvent>, DurableError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let contents = fs_err::tokio::read_to_string(&self.path).await?;
        contents
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .map(|(i, line)| {
                serde_json::from_str(line).map_err(|e| DurableError::Decode(i + 1, e))
            })
            .collect()
    }

    /// Replay every logged event into `store`, in order. Later events for
    /// the same agent supersede earlier ones, matching the live semantics
    /// of `upsert_agent`/`remove_agent`.
    pub async fn replay_into(&self, store: &AgentStore) -> Result<(), DurableError> {
        for event in self.read_all().await? {
            match event.kind {
                LoggedEventKind::Upserted => {
                    if let Some(metadata) = &event.metadata {
                        let _ = store.upsert_agent(&event.agent_id, metadata).await;
                    }
                }
                LoggedEventKind::Deleted => {
                    store.remove_agent(&event.agent_id).await;
                }
            }
        }
        Ok(())
    }

    /// Truncate the log, typically right after writing a fresh `Snapshot`
    /// so the log only needs to carry events since the last snapshot.
    pub async fn truncate(&self) -> Result<(), DurableError> {
        fs_err::tokio::write(&self.path, b"").await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::RegistryConfig;
    use mesh_core::wire::{DependencySpec, ToolSpec};
    use std::time::{SystemTime, UNIX_EPOCH};

    fn meta() -> AgentMetadata {
        AgentMetadata {
            name: "clock".into(),
            namespace: None,
            endpoint: "http://clock:8080".into(),
            version: "1.2.0".into(),
            timeout_threshold: Some(60),
            eviction_threshold: Some(120),
            tools: vec![ToolSpec {
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
            tools: vec![ToolSpec {
                function_name: "greet".into(),
                capability: "greeting".into(),
                version: "1.0.0".into(),
                tags: vec![],
                description: None,
                input_schema: None,
                dependencies: vec![
                    DependencySpec::new("date_service")
                        .with_version(">=1.0.0")
                        .with_slot("date"),
                ],
            }],
        }
    }

    #[tokio::test]
    async fn append_then_replay_reconstructs_population() {
        let dir = std::env::temp_dir().join(format!(
            "mesh-registry-log-test-{}",
            std::process::id()
        ));
        tokio::fs::create_dir_all(&dir).await.unwrap();
        let log = AppendLog::new(dir.join("events.jsonl"));

        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_secs();
        log.append(&LoggedEvent {
            kind: LoggedEventKind::Upserted,
            agent_id: "clock-bbbbbbbb".into(),
            metadata: Some(meta()),
            timestamp: now,
        })
        .await
        .unwrap();

        let store = AgentStore::new(RegistryConfig::default());
        log.replay_into(&store).await.unwrap();

        assert!(store.get("clock-bbbbbbbb").is_some());
        let _ = tokio::fs::remove_dir_all(&dir).await;
    }

    #[tokio::test]
    async fn append_then_replay_preserves_tool_dependencies() {
        let dir = std::env::temp_dir().join(format!(
            "mesh-registry-log-test-deps-{}",
            std::process::id()
        ));
        tokio::fs::create_dir_all(&dir).await.unwrap();
        let log = AppendLog::new(dir.join("events.jsonl"));

        let store = AgentStore::new(RegistryConfig::default());
        store
            .upsert_agent("greeter-aaaaaaaa", &meta_with_dependency())
            .await
            .unwrap();
        let snapshot = store.snapshot();
        let agent = snapshot.agents.get("greeter-aaaaaaaa").unwrap();
        log.append(&LoggedEvent::from_registry_event(&RegistryEvent {
            kind: RegistryEventKind::Added,
            agent: agent.clone(),
            timestamp: 1,
        }))
        .await
        .unwrap();

        let replayed = AgentStore::new(RegistryConfig::default());
        log.replay_into(&replayed).await.unwrap();

        let record = replayed.get("greeter-aaaaaaaa").unwrap();
        let deps = &record.tool("greet").unwrap().dependencies;
        assert_eq!(deps.len(), 1);
        assert_eq!(deps[0].capability, "date_service");
        assert_eq!(deps[0].slot, "date");
        assert!(deps[0].constraint.is_some());
        let _ = tokio::fs::remove_dir_all(&dir).await;
    }

    #[tokio::test]
    async fn deleted_tail_wins_over_earlier_upsert() {
        let dir = std::env::temp_dir().join(format!(
            "mesh-registry-log-test-del-{}",
            std::process::id()
        ));
        tokio::fs::create_dir_all(&dir).await.unwrap();
        let log = AppendLog::new(dir.join("events.jsonl"));

        log.append(&LoggedEvent {
            kind: LoggedEventKind::Upserted,
            agent_id: "clock-bbbbbbbb".into(),
            metadata: Some(meta()),
            timestamp: 1,
        })
        .await
        .unwrap();
        log.append(&LoggedEvent {
            kind: LoggedEventKind::Deleted,
            agent_id: "clock-bbbbbbbb".into(),
            metadata: None,
            timestamp: 2,
        })
        .await
        .unwrap();

        let store = AgentStore::new(RegistryConfig::default());
        log.replay_into(&store).await.unwrap();
        assert!(store.get("clock-bbbbbbbb").is_none());
        let _ = tokio::fs::remove_dir_all(&dir).await;
    }
}
