use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{json, Value};

use crate::client::QuickBuildClient;
use crate::protocol::{McpErrorCode, McpErrorResponse, ToolDescriptor};

use super::registry::Feature;
use super::to_pretty_json;

pub const HEALTH_TOOL: &str = "server.health";

#[derive(Debug, Serialize)]
struct Health {
    status: &'static str,
    quickbuild_url: String,
    authenticated: bool,
}

/// Connectivity check: opens a fresh QuickBuild session.
pub struct HealthFeature {
    client: Arc<QuickBuildClient>,
}

impl HealthFeature {
    pub fn new(client: Arc<QuickBuildClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Feature for HealthFeature {
    fn name(&self) -> &'static str {
        "health"
    }

    fn tools(&self) -> Vec<ToolDescriptor> {
        vec![ToolDescriptor {
            name: HEALTH_TOOL.into(),
            description: "Check that the bridge can reach and authenticate with QuickBuild".into(),
            input_schema: json!({
                "type": "object",
                "properties": {},
                "additionalProperties": false
            }),
        }]
    }

    async fn call_tool(&self, name: &str, _arguments: Value) -> Result<String, McpErrorResponse> {
        if name != HEALTH_TOOL {
            return Err(McpErrorResponse::new(
                McpErrorCode::UnknownTool,
                format!("Unknown tool: {name}"),
            ));
        }

        self.client.authenticate().await?;
        to_pretty_json(&Health {
            status: "ok",
            quickbuild_url: self.client.base_url().to_string(),
            authenticated: self.client.is_authenticated(),
        })
    }
}
