//! The `greeter` side of the literal end-to-end scenario in spec.md §8:
//! `greet` depends on `date_service` and degrades gracefully when that
//! dependency is unbound (§7 "User-visible behavior").

use async_trait::async_trait;
use serde_json::Value;

use mesh_agent::{AgentBuilder, Dependency, DependencySlots, ToolDescriptor, ToolError, ToolHandler};

struct Greet;

#[async_trait]
impl ToolHandler for Greet {
    async fn call(&self, args: Value, deps: &DependencySlots) -> Result<Value, ToolError> {
        let name = args.get("name").and_then(Value::as_str).unwrap_or("world");

        let Some(date_service) = deps.get("date_service") else {
            // Dependency unresolved: the tool's own graceful path, not an
            // error (spec.md §7).
            return Ok(Value::String(format!("Hello {name}")));
        };

        match date_service.call(Value::Object(Default::default())).await {
            Ok(Value::String(date)) => Ok(Value::String(format!("Hello {name}, it is {date}"))),
            Ok(other) => Ok(Value::String(format!("Hello {name}, it is {other}"))),
            Err(e) => Err(ToolError::Failed {
                function_name: "greet".to_string(),
                source: anyhow::anyhow!(e),
            }),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let mut handle = AgentBuilder::new("greeter")
        .version("1.0.0")
        .tool(
            ToolDescriptor::new("greet", "greeting", Greet)
                .version("1.0.0")
                .description("Greets someone, mentioning today's date if date_service is available")
                .depends_on(Dependency::new("date_service").version(">=1.0.0")),
        )
        .run()
        .await?;

    tracing::info!(agent_id = %handle.agent_id, "greeter agent running");
    tokio::signal::ctrl_c().await?;
    handle.shutdown();
    Ok(())
}
