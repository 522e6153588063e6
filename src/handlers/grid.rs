use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{json, Value};

use crate::client::QuickBuildClient;
use crate::models::Agent;
use crate::protocol::{McpErrorCode, McpErrorResponse, ToolDescriptor};

use super::registry::Feature;
use super::to_pretty_json;

pub const LIST_AGENTS_TOOL: &str = "grid.list_agents";

#[derive(Debug, Serialize)]
struct AgentList {
    agents: Vec<AgentEntry>,
    count: usize,
    online_count: usize,
    offline_count: usize,
}

#[derive(Debug, Serialize)]
struct AgentEntry {
    name: String,
    status: String,
    last_contact: Option<String>,
    ip_address: String,
    port: u16,
}

impl From<&Agent> for AgentEntry {
    fn from(agent: &Agent) -> Self {
        Self {
            name: agent.name.clone(),
            status: agent.status.clone(),
            last_contact: agent.last_contact.map(|t| t.to_rfc3339()),
            ip_address: agent.ip_address.clone(),
            port: agent.port,
        }
    }
}

/// Build grid (agent) inspection.
pub struct GridFeature {
    client: Arc<QuickBuildClient>,
}

impl GridFeature {
    pub fn new(client: Arc<QuickBuildClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Feature for GridFeature {
    fn name(&self) -> &'static str {
        "grid"
    }

    fn tools(&self) -> Vec<ToolDescriptor> {
        vec![ToolDescriptor {
            name: LIST_AGENTS_TOOL.into(),
            description: "List all build agents and their connection status".into(),
            input_schema: json!({
                "type": "object",
                "properties": {},
                "additionalProperties": false
            }),
        }]
    }

    async fn call_tool(&self, name: &str, _arguments: Value) -> Result<String, McpErrorResponse> {
        if name != LIST_AGENTS_TOOL {
            return Err(McpErrorResponse::new(
                McpErrorCode::UnknownTool,
                format!("Unknown tool: {name}"),
            ));
        }

        let agents = self.client.get_agents().await?;
        let list = AgentList {
            agents: agents.iter().map(AgentEntry::from).collect(),
            count: agents.len(),
            online_count: agents.iter().filter(|a| a.is_online()).count(),
            offline_count: agents.iter().filter(|a| a.is_offline()).count(),
        };

        tracing::info!("Listed {} agents", list.count);
        to_pretty_json(&list)
    }
}
