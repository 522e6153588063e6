use std::borrow::Cow;
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::request::RpcId;

// ---------------------------------------------------------------------------
// JSON-RPC 2.0 response layer
// ---------------------------------------------------------------------------

/// JSON-RPC 2.0 response envelope.
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<RpcId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

impl JsonRpcResponse {
    pub fn success(id: Option<RpcId>, result: serde_json::Value) -> Self {
        Self {
            jsonrpc: "2.0".into(),
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn error(id: Option<RpcId>, error: JsonRpcError) -> Self {
        Self {
            jsonrpc: "2.0".into(),
            id,
            result: None,
            error: Some(error),
        }
    }
}

/// JSON-RPC 2.0 error object (protocol-level errors).
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl JsonRpcError {
    pub fn parse_error() -> Self {
        Self { code: -32700, message: "Parse error".into(), data: None }
    }

    pub fn invalid_request() -> Self {
        Self { code: -32600, message: "Invalid Request".into(), data: None }
    }

    pub fn invalid_request_with(detail: impl Into<String>) -> Self {
        Self { code: -32600, message: detail.into(), data: None }
    }

    pub fn method_not_found(method: &str) -> Self {
        Self {
            code: -32601,
            message: format!("Method not found: {method}"),
            data: None,
        }
    }

    pub fn invalid_params(detail: impl Into<String>) -> Self {
        Self { code: -32602, message: detail.into(), data: None }
    }

    pub fn internal_error(detail: impl Into<String>) -> Self {
        Self { code: -32603, message: detail.into(), data: None }
    }
}

// ---------------------------------------------------------------------------
// MCP listing layer (tools/list, resources/list, resources/templates/list)
// ---------------------------------------------------------------------------

/// A tool advertised through `tools/list`.
#[derive(Debug, Clone, Serialize)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    #[serde(rename = "inputSchema")]
    pub input_schema: serde_json::Value,
}

/// A concrete resource advertised through `resources/list`.
#[derive(Debug, Clone, Serialize)]
pub struct ResourceDescriptor {
    pub uri: String,
    pub name: String,
    pub description: String,
    #[serde(rename = "mimeType")]
    pub mime_type: String,
}

/// A parameterised resource advertised through `resources/templates/list`.
#[derive(Debug, Clone, Serialize)]
pub struct ResourceTemplateDescriptor {
    #[serde(rename = "uriTemplate")]
    pub uri_template: String,
    pub name: String,
    pub description: String,
    #[serde(rename = "mimeType")]
    pub mime_type: String,
}

// ---------------------------------------------------------------------------
// MCP tool result layer (returned inside a *successful* JSON-RPC response)
// ---------------------------------------------------------------------------

/// MCP tool call result wrapper.
#[derive(Debug, Clone, Serialize)]
pub struct ToolResult {
    pub content: Vec<ToolResultContent>,
    #[serde(rename = "isError", skip_serializing_if = "std::ops::Not::not")]
    pub is_error: bool,
}

/// A single content block inside a tool result.
#[derive(Debug, Clone, Serialize)]
pub struct ToolResultContent {
    #[serde(rename = "type")]
    pub content_type: String,
    pub text: String,
}

impl ToolResult {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: vec![ToolResultContent {
                content_type: "text".into(),
                text: text.into(),
            }],
            is_error: false,
        }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self {
            content: vec![ToolResultContent {
                content_type: "text".into(),
                text: text.into(),
            }],
            is_error: true,
        }
    }
}

/// MCP `resources/read` result.
#[derive(Debug, Clone, Serialize)]
pub struct ReadResourceResult {
    pub contents: Vec<ResourceContents>,
}

/// Text contents of a single resource.
#[derive(Debug, Clone, Serialize)]
pub struct ResourceContents {
    pub uri: String,
    #[serde(rename = "mimeType")]
    pub mime_type: String,
    pub text: String,
}

impl ReadResourceResult {
    pub fn json(uri: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            contents: vec![ResourceContents {
                uri: uri.into(),
                mime_type: "application/json".into(),
                text: text.into(),
            }],
        }
    }
}

// ---------------------------------------------------------------------------
// MCP domain-level error types
// ---------------------------------------------------------------------------

/// Stable error code reported to MCP clients.
///
/// Serialized as an upper-case string, e.g. `RESOURCE_NOT_FOUND` or `HTTP_403`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum McpErrorCode {
    AuthenticationFailed,
    ResourceNotFound,
    QuickbuildServerError,
    QuickbuildUnavailable,
    /// Any other 4xx status returned by QuickBuild.
    Http(u16),
    MaxRetriesExceeded,
    InvalidResponse,
    RequestError,
    InvalidArguments,
    UnknownTool,
    UnknownResource,
    Timeout,
    InternalError,
}

impl McpErrorCode {
    pub fn as_str(&self) -> Cow<'static, str> {
        let s = match self {
            Self::AuthenticationFailed => "AUTHENTICATION_FAILED",
            Self::ResourceNotFound => "RESOURCE_NOT_FOUND",
            Self::QuickbuildServerError => "QUICKBUILD_SERVER_ERROR",
            Self::QuickbuildUnavailable => "QUICKBUILD_UNAVAILABLE",
            Self::Http(status) => return Cow::Owned(format!("HTTP_{status}")),
            Self::MaxRetriesExceeded => "MAX_RETRIES_EXCEEDED",
            Self::InvalidResponse => "INVALID_RESPONSE",
            Self::RequestError => "REQUEST_ERROR",
            Self::InvalidArguments => "INVALID_ARGUMENTS",
            Self::UnknownTool => "UNKNOWN_TOOL",
            Self::UnknownResource => "UNKNOWN_RESOURCE",
            Self::Timeout => "TIMEOUT",
            Self::InternalError => "INTERNAL_ERROR",
        };
        Cow::Borrowed(s)
    }

    pub fn parse(s: &str) -> Option<Self> {
        let code = match s {
            "AUTHENTICATION_FAILED" => Self::AuthenticationFailed,
            "RESOURCE_NOT_FOUND" => Self::ResourceNotFound,
            "QUICKBUILD_SERVER_ERROR" => Self::QuickbuildServerError,
            "QUICKBUILD_UNAVAILABLE" => Self::QuickbuildUnavailable,
            "MAX_RETRIES_EXCEEDED" => Self::MaxRetriesExceeded,
            "INVALID_RESPONSE" => Self::InvalidResponse,
            "REQUEST_ERROR" => Self::RequestError,
            "INVALID_ARGUMENTS" => Self::InvalidArguments,
            "UNKNOWN_TOOL" => Self::UnknownTool,
            "UNKNOWN_RESOURCE" => Self::UnknownResource,
            "TIMEOUT" => Self::Timeout,
            "INTERNAL_ERROR" => Self::InternalError,
            other => {
                let status = other.strip_prefix("HTTP_")?.parse::<u16>().ok()?;
                Self::Http(status)
            }
        };
        Some(code)
    }

    /// Map to the corresponding JSON-RPC 2.0 error code.
    ///
    /// Caller mistakes        → -32602 (Invalid params)
    /// Upstream/server issues → -32603 (Internal error)
    pub fn json_rpc_code(&self) -> i32 {
        match self {
            Self::InvalidArguments | Self::UnknownTool | Self::UnknownResource => -32602,
            _ => -32603,
        }
    }
}

impl fmt::Display for McpErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_str())
    }
}

impl Serialize for McpErrorCode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.as_str())
    }
}

impl<'de> Deserialize<'de> for McpErrorCode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw)
            .ok_or_else(|| serde::de::Error::custom(format!("unknown MCP error code: {raw}")))
    }
}

/// MCP error object
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct McpError {
    pub code: McpErrorCode,
    pub message: String,
}

/// MCP error response (top-level)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct McpErrorResponse {
    pub error: McpError,
}

impl McpErrorResponse {
    pub fn new(code: McpErrorCode, message: impl Into<String>) -> Self {
        Self {
            error: McpError {
                code,
                message: message.into(),
            },
        }
    }

    pub fn invalid_arguments(message: impl Into<String>) -> Self {
        Self::new(McpErrorCode::InvalidArguments, message)
    }
}

/// Convert an MCP domain error into a JSON-RPC error.
///
/// The JSON-RPC `code` is derived from the MCP error code.
/// The JSON-RPC `message` is the human-readable MCP message.
/// The full MCP error object is carried in `data` for structured clients.
impl From<McpErrorResponse> for JsonRpcError {
    fn from(mcp: McpErrorResponse) -> Self {
        Self {
            code: mcp.error.code.json_rpc_code(),
            message: mcp.error.message.clone(),
            data: Some(serde_json::to_value(&mcp).expect("McpErrorResponse must serialize to JSON Value")),
        }
    }
}

/// Convert an MCP domain error into a tool result with `isError: true`.
///
/// The text content is the JSON-serialized `McpErrorResponse`, preserving
/// the structured error for clients that inspect tool output.
impl From<McpErrorResponse> for ToolResult {
    fn from(mcp: McpErrorResponse) -> Self {
        let json = serde_json::to_string(&mcp).expect("McpErrorResponse must serialize to JSON string");
        Self::error(format!("{json}\n"))
    }
}
