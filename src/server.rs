use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};

use crate::handlers::{self, ServerContext};
use crate::protocol::{JsonRpcError, JsonRpcRequest, JsonRpcResponse, RpcId};

/// Maximum bytes per JSON-RPC message (1 MiB).
const MAX_MESSAGE_BYTES: usize = 1024 * 1024;

/// MCP server that communicates over newline-delimited JSON-RPC 2.0.
pub struct McpServer {
    context: ServerContext,
    initialized: bool,
}

impl McpServer {
    pub fn new(context: ServerContext) -> Self {
        Self {
            context,
            initialized: false,
        }
    }

    /// Serve stdin/stdout until stdin closes.
    pub async fn run(&mut self) -> anyhow::Result<()> {
        self.serve(tokio::io::stdin(), tokio::io::stdout()).await
    }

    /// Serve one request per line from `input` until EOF.
    pub async fn serve<R, W>(&mut self, input: R, mut output: W) -> anyhow::Result<()>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut reader = BufReader::new(input);
        let mut raw = Vec::new();

        loop {
            raw.clear();
            let n = reader.read_until(b'\n', &mut raw).await?;
            if n == 0 {
                break;
            }

            if n > MAX_MESSAGE_BYTES {
                tracing::warn!("Message too large: {n} bytes (limit {MAX_MESSAGE_BYTES})");
                write_response(
                    &mut output,
                    &JsonRpcResponse::error(None, JsonRpcError::parse_error()),
                )
                .await?;
                continue;
            }

            let trimmed = match std::str::from_utf8(&raw) {
                Ok(s) => s.trim(),
                Err(e) => {
                    tracing::warn!("Message is not UTF-8: {e}");
                    write_response(
                        &mut output,
                        &JsonRpcResponse::error(None, JsonRpcError::parse_error()),
                    )
                    .await?;
                    continue;
                }
            };

            if trimmed.is_empty() {
                continue;
            }

            let value: Value = match serde_json::from_str(trimmed) {
                Ok(v) => v,
                Err(e) => {
                    tracing::warn!("Parse error: {e}");
                    write_response(
                        &mut output,
                        &JsonRpcResponse::error(None, JsonRpcError::parse_error()),
                    )
                    .await?;
                    continue;
                }
            };

            // An object without `id` is a notification and never gets a reply,
            // even when it is malformed.
            let is_notification = value.as_object().is_some_and(|obj| !obj.contains_key("id"));
            let id = value
                .get("id")
                .and_then(|v| serde_json::from_value::<RpcId>(v.clone()).ok());

            let req = match serde_json::from_value::<JsonRpcRequest>(value) {
                Ok(r) if r.jsonrpc == "2.0" => r,
                rejected => {
                    match rejected {
                        Ok(r) => tracing::warn!("Unsupported jsonrpc version {:?}", r.jsonrpc),
                        Err(e) => tracing::warn!("Invalid request: {e}"),
                    }
                    if !is_notification {
                        write_response(
                            &mut output,
                            &JsonRpcResponse::error(id, JsonRpcError::invalid_request()),
                        )
                        .await?;
                    }
                    continue;
                }
            };

            // Initialization gate: only `initialize` is allowed before handshake completes
            if !self.initialized && req.method != "initialize" {
                if req.id.is_none() {
                    continue;
                }
                write_response(
                    &mut output,
                    &JsonRpcResponse::error(
                        req.id.clone(),
                        JsonRpcError::invalid_request_with("Server not initialized"),
                    ),
                )
                .await?;
                continue;
            }

            tracing::debug!("Handling {}", req.method);
            if let Some(resp) = handlers::dispatch(&req, &self.context).await {
                write_response(&mut output, &resp).await?;
            }

            if req.method == "initialize" {
                self.initialized = true;
            }
        }

        tracing::info!("Input closed, shutting down");
        Ok(())
    }
}

async fn write_response<W>(output: &mut W, resp: &JsonRpcResponse) -> anyhow::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let out = serde_json::to_string(resp)?;
    output.write_all(out.as_bytes()).await?;
    output.write_all(b"\n").await?;
    output.flush().await?;
    Ok(())
}
