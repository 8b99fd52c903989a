//! The dependency resolver (§4.E): for each tool's declared dependencies,
//! pick the best current provider(s).

use mesh_core::version::matches_constraint;
use mesh_core::wire::{DependenciesResolved, ResolvedEntry, ResolvedSlot};

use crate::store::{AgentRecord, RegistrySnapshot};

/// One ranked candidate, kept around only long enough to sort and take the
/// top N.
struct Candidate<'a> {
    agent: &'a AgentRecord,
    function_name: &'a str,
    capability: &'a str,
    version: &'a semver::Version,
    tag_match_count: usize,
}

/// Resolve every dependency declaration of every tool belonging to
/// `agent_id` against `snapshot`. Pure function of `(snapshot, agent_id)`
/// — the determinism invariant (§4.E, §8 invariant 4) follows directly
/// from there being no hidden state here.
pub fn resolve_for_agent(snapshot: &RegistrySnapshot, agent_id: &str) -> DependenciesResolved {
    let mut out = DependenciesResolved::new();

    let Some(agent) = snapshot.agents.get(agent_id) else {
        return out;
    };

    for tool in &agent.tools {
        if tool.dependencies.is_empty() {
            continue;
        }
        let mut slots = std::collections::HashMap::new();
        for dep in &tool.dependencies {
            if let Some(slot) = resolve_one(snapshot, dep) {
                slots.insert(dep.slot.clone(), slot);
            }
            // Unresolvable declarations are omitted entirely (§4.E "Empty
            // results"), not inserted as null.
        }
        if !slots.is_empty() {
            out.insert(tool.function_name.clone(), slots);
        }
    }

    out
}

fn resolve_one(
    snapshot: &RegistrySnapshot,
    dep: &crate::store::DependencyRecord,
) -> Option<ResolvedSlot> {
    let candidate_ids = snapshot.by_capability.get(&dep.capability)?;

    let mut candidates: Vec<Candidate> = candidate_ids
        .iter()
        .filter_map(|(cand_agent_id, function_name)| {
            if !snapshot.is_healthy(cand_agent_id) {
                return None;
            }
            let cand_agent = snapshot.agents.get(cand_agent_id)?;
            let cand_tool = cand_agent.tool(function_name)?;

            // Every declared tag must be present (conjunctive "+" semantics).
            if !dep.tags.iter().all(|t| cand_tool.tags.contains(t)) {
                return None;
            }

            if let Some(constraint) = &dep.constraint
                && !matches_constraint(&cand_tool.version, constraint)
            {
                return None;
            }

            Some(Candidate {
                agent: cand_agent,
                function_name: function_name.as_str(),
                capability: cand_tool.capability.as_str(),
                version: &cand_tool.version,
                tag_match_count: dep.tags.len(),
            })
        })
        .collect();

    if candidates.is_empty() {
        return None;
    }

    // Rank: exact tag match count desc, version desc, agent_id asc.
    candidates.sort_by(|a, b| {
        b.tag_match_count
            .cmp(&a.tag_match_count)
            .then_with(|| b.version.cmp(a.version))
            .then_with(|| a.agent.agent_id.cmp(&b.agent.agent_id))
    });

    let entries: Vec<ResolvedEntry> = candidates
        .into_iter()
        .take(dep.max_providers as usize)
        .map(|c| ResolvedEntry {
            agent_id: c.agent.agent_id.clone(),
            function_name: c.function_name.to_string(),
            capability: c.capability.to_string(),
            version: c.version.to_string(),
            endpoint: c.agent.endpoint.clone(),
            kwargs: dep.kwargs.clone(),
        })
        .collect();

    ResolvedSlot::from_entries(entries, dep.max_providers > 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{AgentStore, RegistryConfig};
    use mesh_core::wire::{AgentMetadata, DependencySpec, ToolSpec};

    async fn store_with(agents: Vec<(&str, AgentMetadata)>) -> std::sync::Arc<AgentStore> {
        let store = AgentStore::new(RegistryConfig::default());
        for (id, meta) in agents {
            store.upsert_agent(id, &meta).await.unwrap();
        }
        store
    }

    fn greeter() -> AgentMetadata {
        AgentMetadata {
            name: "greeter".into(),
            namespace: None,
            endpoint: "http://greeter:8080".into(),
            version: "1.0.0".into(),
            timeout_threshold: None,
            eviction_threshold: None,
            tools: vec![ToolSpec {
                function_name: "greet".into(),
                capability: "greeting".into(),
                version: "1.0.0".into(),
                tags: vec![],
                description: None,
                input_schema: None,
                dependencies: vec![DependencySpec::new("date_service")],
            }],
        }
    }

    fn clock(version: &str) -> AgentMetadata {
        AgentMetadata {
            name: "clock".into(),
            namespace: None,
            endpoint: "http://clock:8080".into(),
            version: version.into(),
            timeout_threshold: None,
            eviction_threshold: None,
            tools: vec![ToolSpec {
                function_name: "get_current_date".into(),
                capability: "date_service".into(),
                version: version.into(),
                tags: vec![],
                description: None,
                input_schema: None,
                dependencies: vec![],
            }],
        }
    }

    #[tokio::test]
    async fn scenario_1_resolves_the_only_provider() {
        let store = store_with(vec![
            ("greeter-aaaaaaaa", greeter()),
            ("clock-bbbbbbbb", clock("1.2.0")),
        ])
        .await;

        let resolved = resolve_for_agent(&store.snapshot(), "greeter-aaaaaaaa");
        let slot = &resolved["greet"]["date_service"];
        let entry = slot.primary();
        assert_eq!(entry.agent_id, "clock-bbbbbbbb");
        assert_eq!(entry.function_name, "get_current_date");
        assert_eq!(entry.version, "1.2.0");
        assert_eq!(entry.endpoint, "http://clock:8080");
    }

    #[tokio::test]
    async fn scenario_4_prefers_higher_semver_within_constraint() {
        let mut g = greeter();
        g.tools[0].dependencies[0] = DependencySpec::new("date_service").with_version(">=1.2.0");
        let store = store_with(vec![
            ("greeter-aaaaaaaa", g),
            ("clock-a", clock("1.2.0")),
            ("clock-b", clock("1.3.0")),
        ])
        .await;

        let resolved = resolve_for_agent(&store.snapshot(), "greeter-aaaaaaaa");
        let entry = resolved["greet"]["date_service"].primary();
        assert_eq!(entry.version, "1.3.0");
    }

    #[tokio::test]
    async fn scenario_5_filters_by_conjunctive_tags() {
        let mut g = greeter();
        g.tools[0].dependencies[0] =
            DependencySpec::new("database").with_tags(["production", "US-EAST"]);

        let mut db_east = clock("1.0.0");
        db_east.name = "db-east".into();
        db_east.tools[0].function_name = "query".into();
        db_east.tools[0].capability = "database".into();
        db_east.tools[0].tags = vec!["production".into(), "US-EAST".into()];

        let mut db_west = clock("1.0.0");
        db_west.name = "db-west".into();
        db_west.tools[0].function_name = "query".into();
        db_west.tools[0].capability = "database".into();
        db_west.tools[0].tags = vec!["production".into(), "US-WEST".into()];

        let store = store_with(vec![
            ("greeter-aaaaaaaa", g),
            ("db-east-1", db_east),
            ("db-west-1", db_west),
        ])
        .await;

        let resolved = resolve_for_agent(&store.snapshot(), "greeter-aaaaaaaa");
        let entry = resolved["greet"]["database"].primary();
        assert_eq!(entry.agent_id, "db-east-1");
    }

    #[tokio::test]
    async fn unresolvable_dependency_is_omitted_not_null() {
        let store = store_with(vec![("greeter-aaaaaaaa", greeter())]).await;
        let resolved = resolve_for_agent(&store.snapshot(), "greeter-aaaaaaaa");
        assert!(resolved.get("greet").is_none());
    }

    #[tokio::test]
    async fn resolution_is_deterministic_across_repeated_calls() {
        let store = store_with(vec![
            ("greeter-aaaaaaaa", greeter()),
            ("clock-bbbbbbbb", clock("1.2.0")),
        ])
        .await;

        let snap = store.snapshot();
        let r1 = resolve_for_agent(&snap, "greeter-aaaaaaaa");
        let r2 = resolve_for_agent(&snap, "greeter-aaaaaaaa");
        assert_eq!(
            r1["greet"]["date_service"].primary(),
            r2["greet"]["date_service"].primary()
        );
    }
}
