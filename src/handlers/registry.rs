use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::client::QuickBuildClient;
use crate::protocol::{
    McpErrorCode, McpErrorResponse, ReadResourceResult, ResourceDescriptor,
    ResourceTemplateDescriptor, ToolDescriptor, ToolResult,
};
use crate::schema::validate_instance;

use super::builds::BuildsFeature;
use super::changes::ChangesFeature;
use super::configurations::ConfigurationsFeature;
use super::grid::GridFeature;
use super::health::HealthFeature;

/// A group of MCP tools and resources backed by QuickBuild.
///
/// Tool and resource handlers return the JSON text to hand back to the
/// client, or a structured error.
#[async_trait]
pub trait Feature: Send + Sync {
    fn name(&self) -> &'static str;

    fn tools(&self) -> Vec<ToolDescriptor> {
        Vec::new()
    }

    fn resources(&self) -> Vec<ResourceDescriptor> {
        Vec::new()
    }

    fn resource_templates(&self) -> Vec<ResourceTemplateDescriptor> {
        Vec::new()
    }

    /// Whether `read_resource` understands this URI.
    fn serves_resource(&self, _uri: &str) -> bool {
        false
    }

    async fn call_tool(&self, name: &str, _arguments: Value) -> Result<String, McpErrorResponse> {
        Err(McpErrorResponse::new(
            McpErrorCode::UnknownTool,
            format!("Unknown tool: {name}"),
        ))
    }

    async fn read_resource(&self, uri: &str) -> Result<String, McpErrorResponse> {
        Err(McpErrorResponse::new(
            McpErrorCode::UnknownResource,
            format!("Unknown resource: {uri}"),
        ))
    }
}

/// Routes tool names and resource URIs to the feature that owns them.
pub struct FeatureRegistry {
    features: Vec<Arc<dyn Feature>>,
    tools: Vec<ToolDescriptor>,
    tool_owners: HashMap<String, usize>,
}

impl FeatureRegistry {
    /// Build a registry. When two features declare the same tool, the
    /// first one wins.
    pub fn new(features: Vec<Arc<dyn Feature>>) -> Self {
        let mut tools = Vec::new();
        let mut tool_owners = HashMap::new();

        for (idx, feature) in features.iter().enumerate() {
            for tool in feature.tools() {
                if tool_owners.contains_key(&tool.name) {
                    tracing::warn!(
                        "Tool {} from feature {} shadowed by an earlier feature",
                        tool.name,
                        feature.name()
                    );
                    continue;
                }
                tool_owners.insert(tool.name.clone(), idx);
                tools.push(tool);
            }
        }

        tracing::info!(
            "Loaded {} features with {} tools",
            features.len(),
            tools.len()
        );

        Self {
            features,
            tools,
            tool_owners,
        }
    }

    /// Configurations, builds, grid, changes and health, in that order.
    pub fn with_default_features(client: Arc<QuickBuildClient>) -> Self {
        Self::new(vec![
            Arc::new(ConfigurationsFeature::new(client.clone())),
            Arc::new(BuildsFeature::new(client.clone())),
            Arc::new(GridFeature::new(client.clone())),
            Arc::new(ChangesFeature::new(client.clone())),
            Arc::new(HealthFeature::new(client)),
        ])
    }

    pub fn feature_names(&self) -> Vec<&'static str> {
        self.features.iter().map(|f| f.name()).collect()
    }

    pub fn tools(&self) -> &[ToolDescriptor] {
        &self.tools
    }

    pub fn resources(&self) -> Vec<ResourceDescriptor> {
        self.features.iter().flat_map(|f| f.resources()).collect()
    }

    pub fn resource_templates(&self) -> Vec<ResourceTemplateDescriptor> {
        self.features
            .iter()
            .flat_map(|f| f.resource_templates())
            .collect()
    }

    /// Validate arguments against the tool's input schema and run it.
    pub async fn call_tool(
        &self,
        name: &str,
        arguments: Option<Value>,
        timeout: Duration,
    ) -> ToolResult {
        let Some(&idx) = self.tool_owners.get(name) else {
            return McpErrorResponse::new(McpErrorCode::UnknownTool, format!("Unknown tool: {name}"))
                .into();
        };
        let feature = &self.features[idx];

        let arguments = arguments.unwrap_or_else(|| Value::Object(Default::default()));
        if let Some(tool) = self.tools.iter().find(|t| t.name == name) {
            if let Err(e) = validate_instance(&tool.input_schema, &arguments) {
                return McpErrorResponse::invalid_arguments(format!(
                    "Invalid arguments for {name}: {e}"
                ))
                .into();
            }
        }

        match tokio::time::timeout(timeout, feature.call_tool(name, arguments)).await {
            Ok(Ok(text)) => ToolResult::text(text),
            Ok(Err(err)) => {
                tracing::error!("Error handling tool call {name}: {}", err.error.message);
                err.into()
            }
            Err(_) => {
                tracing::error!("Tool {name} timed out after {} seconds", timeout.as_secs());
                McpErrorResponse::new(
                    McpErrorCode::Timeout,
                    format!("Tool {name} timed out after {} seconds", timeout.as_secs()),
                )
                .into()
            }
        }
    }

    pub async fn read_resource(
        &self,
        uri: &str,
        timeout: Duration,
    ) -> Result<ReadResourceResult, McpErrorResponse> {
        let Some(feature) = self.features.iter().find(|f| f.serves_resource(uri)) else {
            return Err(McpErrorResponse::new(
                McpErrorCode::UnknownResource,
                format!("Unknown resource: {uri}"),
            ));
        };

        match tokio::time::timeout(timeout, feature.read_resource(uri)).await {
            Ok(Ok(text)) => Ok(ReadResourceResult::json(uri, text)),
            Ok(Err(err)) => {
                tracing::error!("Error handling resource request {uri}: {}", err.error.message);
                Err(err)
            }
            Err(_) => {
                tracing::error!("Resource {uri} timed out after {} seconds", timeout.as_secs());
                Err(McpErrorResponse::new(
                    McpErrorCode::Timeout,
                    format!("Resource {uri} timed out after {} seconds", timeout.as_secs()),
                ))
            }
        }
    }
}
