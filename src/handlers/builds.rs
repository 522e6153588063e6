use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{json, Value};

use crate::client::QuickBuildClient;
use crate::models::Build;
use crate::protocol::{
    LatestStatusParams, McpErrorCode, McpErrorResponse, ToolDescriptor, TriggerBuildParams,
};

use super::registry::Feature;
use super::{parse_arguments, to_pretty_json};

pub const LATEST_STATUS_TOOL: &str = "builds.get_latest_status";
pub const TRIGGER_TOOL: &str = "builds.trigger";

#[derive(Debug, Serialize)]
struct LatestBuild {
    configuration_id: String,
    build_id: String,
    version: String,
    status: String,
    start_time: Option<String>,
    end_time: Option<String>,
    success: bool,
}

impl From<Build> for LatestBuild {
    fn from(build: Build) -> Self {
        Self {
            configuration_id: build.configuration_id,
            build_id: build.id,
            version: build.version,
            status: build.status,
            start_time: build.start_time.map(|t| t.to_rfc3339()),
            end_time: build.end_time.map(|t| t.to_rfc3339()),
            success: build.success,
        }
    }
}

#[derive(Debug, Serialize)]
struct NoBuilds {
    configuration_id: String,
    message: &'static str,
}

/// Build status lookup and build triggering.
pub struct BuildsFeature {
    client: Arc<QuickBuildClient>,
}

impl BuildsFeature {
    pub fn new(client: Arc<QuickBuildClient>) -> Self {
        Self { client }
    }

    async fn latest_status(&self, arguments: Value) -> Result<String, McpErrorResponse> {
        let params: LatestStatusParams = parse_arguments(LATEST_STATUS_TOOL, arguments)?;
        let configuration_id = require_configuration_id(&params.configuration_id)?;

        let text = match self.client.get_latest_build(configuration_id).await? {
            Some(build) => to_pretty_json(&LatestBuild::from(build))?,
            None => to_pretty_json(&NoBuilds {
                configuration_id: configuration_id.to_string(),
                message: "No builds found for this configuration",
            })?,
        };

        tracing::info!("Retrieved build status for configuration {configuration_id}");
        Ok(text)
    }

    async fn trigger(&self, arguments: Value) -> Result<String, McpErrorResponse> {
        let params: TriggerBuildParams = parse_arguments(TRIGGER_TOOL, arguments)?;
        let configuration_id = require_configuration_id(&params.configuration_id)?;

        let triggered = self
            .client
            .trigger_build(configuration_id, &params.variables)
            .await?;
        to_pretty_json(&triggered)
    }
}

fn require_configuration_id(raw: &str) -> Result<&str, McpErrorResponse> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(McpErrorResponse::invalid_arguments("configuration_id is required"));
    }
    Ok(trimmed)
}

#[async_trait]
impl Feature for BuildsFeature {
    fn name(&self) -> &'static str {
        "builds"
    }

    fn tools(&self) -> Vec<ToolDescriptor> {
        vec![
            ToolDescriptor {
                name: LATEST_STATUS_TOOL.into(),
                description: "Get the status of the latest build for a configuration".into(),
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "configuration_id": {
                            "type": "string",
                            "description": "The ID of the build configuration"
                        }
                    },
                    "required": ["configuration_id"]
                }),
            },
            ToolDescriptor {
                name: TRIGGER_TOOL.into(),
                description: "Trigger a new build for a configuration".into(),
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "configuration_id": {
                            "type": "string",
                            "description": "The ID of the build configuration to trigger"
                        },
                        "variables": {
                            "type": "object",
                            "description": "Optional build variables as key-value pairs",
                            "additionalProperties": { "type": "string" }
                        }
                    },
                    "required": ["configuration_id"]
                }),
            },
        ]
    }

    async fn call_tool(&self, name: &str, arguments: Value) -> Result<String, McpErrorResponse> {
        match name {
            LATEST_STATUS_TOOL => self.latest_status(arguments).await,
            TRIGGER_TOOL => self.trigger(arguments).await,
            _ => Err(McpErrorResponse::new(
                McpErrorCode::UnknownTool,
                format!("Unknown tool: {name}"),
            )),
        }
    }
}
