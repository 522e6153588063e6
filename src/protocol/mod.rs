pub mod request;
pub mod response;

pub use request::{
    InitializeParams, JsonRpcRequest, LatestStatusParams, ReadResourceParams, RpcId,
    ToolCallParams, TriggerBuildParams,
};
pub use response::{
    JsonRpcError, JsonRpcResponse, McpError, McpErrorCode, McpErrorResponse, ReadResourceResult,
    ResourceContents, ResourceDescriptor, ResourceTemplateDescriptor, ToolDescriptor, ToolResult,
    ToolResultContent,
};
