pub mod builds;
pub mod changes;
pub mod configurations;
pub mod grid;
pub mod health;
pub mod registry;

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::client::QuickBuildClient;
use crate::config::ServerConfig;
use crate::error::QuickBuildError;
use crate::protocol::{
    InitializeParams, JsonRpcError, JsonRpcRequest, JsonRpcResponse, McpErrorCode, McpErrorResponse,
    ReadResourceParams, ToolCallParams,
};

pub use registry::{Feature, FeatureRegistry};

/// Everything a request handler needs: configuration, the shared
/// QuickBuild client and the loaded features.
pub struct ServerContext {
    pub config: ServerConfig,
    pub client: Arc<QuickBuildClient>,
    pub registry: FeatureRegistry,
}

impl ServerContext {
    pub fn new(config: ServerConfig) -> Result<Self, QuickBuildError> {
        let client = Arc::new(QuickBuildClient::new(&config)?);
        let registry = FeatureRegistry::with_default_features(client.clone());
        Ok(Self {
            config,
            client,
            registry,
        })
    }
}

/// Dispatch a JSON-RPC request to the appropriate handler.
///
/// Returns `None` for notifications (no response required).
pub async fn dispatch(req: &JsonRpcRequest, ctx: &ServerContext) -> Option<JsonRpcResponse> {
    if req.id.is_none() {
        if req.method != "notifications/initialized" {
            tracing::debug!("Ignoring notification {}", req.method);
        }
        return None;
    }

    match req.method.as_str() {
        "initialize" => {
            if let Some(params) = req
                .params
                .as_ref()
                .and_then(|v| serde_json::from_value::<InitializeParams>(v.clone()).ok())
            {
                let client = params.client_info.and_then(|c| c.name).unwrap_or_default();
                tracing::info!(
                    "Initialize from {client:?} (protocol {})",
                    params.protocol_version.as_deref().unwrap_or("unspecified")
                );
            }
            let result = serde_json::json!({
                "protocolVersion": "2024-11-05",
                "capabilities": {
                    "tools": {},
                    "resources": {}
                },
                "serverInfo": {
                    "name": "quickbuild-mcp-server",
                    "version": env!("CARGO_PKG_VERSION")
                }
            });
            Some(JsonRpcResponse::success(req.id.clone(), result))
        }

        "ping" => Some(JsonRpcResponse::success(req.id.clone(), serde_json::json!({}))),

        "tools/list" => {
            let result = serde_json::json!({ "tools": ctx.registry.tools() });
            Some(JsonRpcResponse::success(req.id.clone(), result))
        }

        "resources/list" => {
            let result = serde_json::json!({ "resources": ctx.registry.resources() });
            Some(JsonRpcResponse::success(req.id.clone(), result))
        }

        "resources/templates/list" => {
            let result =
                serde_json::json!({ "resourceTemplates": ctx.registry.resource_templates() });
            Some(JsonRpcResponse::success(req.id.clone(), result))
        }

        "tools/call" => {
            let params: ToolCallParams = match decode_params(req, "tools/call") {
                Ok(p) => p,
                Err(e) => return Some(JsonRpcResponse::error(req.id.clone(), e)),
            };

            let tool_result = ctx
                .registry
                .call_tool(&params.name, params.arguments, ctx.config.tool_timeout)
                .await;
            let result_json = serde_json::to_value(&tool_result).expect("ToolResult must serialize to JSON Value");
            Some(JsonRpcResponse::success(req.id.clone(), result_json))
        }

        "resources/read" => {
            let params: ReadResourceParams = match decode_params(req, "resources/read") {
                Ok(p) => p,
                Err(e) => return Some(JsonRpcResponse::error(req.id.clone(), e)),
            };

            match ctx
                .registry
                .read_resource(&params.uri, ctx.config.tool_timeout)
                .await
            {
                Ok(contents) => {
                    let result_json = serde_json::to_value(&contents).expect("ReadResourceResult must serialize to JSON Value");
                    Some(JsonRpcResponse::success(req.id.clone(), result_json))
                }
                Err(mcp_err) => Some(JsonRpcResponse::error(req.id.clone(), mcp_err.into())),
            }
        }

        _ => Some(JsonRpcResponse::error(
            req.id.clone(),
            JsonRpcError::method_not_found(&req.method),
        )),
    }
}

fn decode_params<T: DeserializeOwned>(req: &JsonRpcRequest, method: &str) -> Result<T, JsonRpcError> {
    match &req.params {
        Some(v) => serde_json::from_value(v.clone())
            .map_err(|e| JsonRpcError::invalid_params(format!("Invalid {method} params: {e}"))),
        None => Err(JsonRpcError::invalid_params(format!("Missing params for {method}"))),
    }
}

/// Deserialize tool arguments into a typed parameter struct.
pub(crate) fn parse_arguments<T: DeserializeOwned>(
    tool: &str,
    arguments: serde_json::Value,
) -> Result<T, McpErrorResponse> {
    serde_json::from_value(arguments).map_err(|e| {
        McpErrorResponse::invalid_arguments(format!("Invalid arguments for {tool}: {e}"))
    })
}

/// Render a payload the way tool and resource text is returned: JSON with
/// two-space indentation.
pub(crate) fn to_pretty_json<T: Serialize>(value: &T) -> Result<String, McpErrorResponse> {
    serde_json::to_string_pretty(value).map_err(|e| {
        tracing::error!("Serialization failed: {e}");
        McpErrorResponse::new(McpErrorCode::InternalError, "Internal error")
    })
}
