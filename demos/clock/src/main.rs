//! The `clock` side of the literal end-to-end scenario in spec.md §8:
//! provides `date_service` for `greeter` to depend on.

use async_trait::async_trait;
use serde_json::Value;

use mesh_agent::{AgentBuilder, DependencySlots, ToolDescriptor, ToolError, ToolHandler};

struct GetCurrentDate;

#[async_trait]
impl ToolHandler for GetCurrentDate {
    async fn call(&self, _args: Value, _deps: &DependencySlots) -> Result<Value, ToolError> {
        Ok(Value::String(chrono::Utc::now().format("%Y-%m-%d").to_string()))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let mut handle = AgentBuilder::new("clock")
        .version("1.2.0")
        .tool(
            ToolDescriptor::new("get_current_date", "date_service", GetCurrentDate)
                .version("1.2.0")
                .description("Returns today's date as YYYY-MM-DD"),
        )
        .run()
        .await?;

    tracing::info!(agent_id = %handle.agent_id, "clock agent running");
    tokio::signal::ctrl_c().await?;
    handle.shutdown();
    Ok(())
}
