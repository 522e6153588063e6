//! Dispatch-level tests: JSON-RPC requests in, MCP results out, with a
//! fake QuickBuild behind the client.

mod common;

use std::time::Duration;

use common::{test_config, FakeQuickBuild};
use quickbuild_mcp_server::config::ServerConfig;
use quickbuild_mcp_server::handlers::{self, ServerContext};
use quickbuild_mcp_server::protocol::{JsonRpcRequest, RpcId};
use serde_json::{json, Value};

fn context(config: ServerConfig) -> ServerContext {
    ServerContext::new(config).unwrap()
}

fn request(id: i64, method: &str, params: Option<Value>) -> JsonRpcRequest {
    JsonRpcRequest {
        jsonrpc: "2.0".to_string(),
        id: Some(RpcId::Number(id)),
        method: method.to_string(),
        params,
    }
}

async fn call(ctx: &ServerContext, method: &str, params: Option<Value>) -> Value {
    let resp = handlers::dispatch(&request(1, method, params), ctx)
        .await
        .expect("request must produce a response");
    serde_json::to_value(&resp).unwrap()
}

async fn call_tool(ctx: &ServerContext, name: &str, arguments: Value) -> Value {
    let resp = call(
        ctx,
        "tools/call",
        Some(json!({ "name": name, "arguments": arguments })),
    )
    .await;
    resp["result"].clone()
}

fn tool_text(result: &Value) -> Value {
    let text = result["content"][0]["text"].as_str().unwrap();
    serde_json::from_str(text).unwrap()
}

fn is_error(result: &Value) -> bool {
    result["isError"].as_bool().unwrap_or(false)
}

fn error_code(result: &Value) -> String {
    assert!(is_error(result), "expected tool error, got {result}");
    tool_text(result)["error"]["code"].as_str().unwrap().to_string()
}

// ---------------------------------------------------------------------------
// protocol surface
// ---------------------------------------------------------------------------

#[tokio::test]
async fn initialize_advertises_tools_and_resources() {
    let fake = FakeQuickBuild::start().await;
    let ctx = context(test_config(&fake.url()));

    let resp = call(&ctx, "initialize", Some(json!({"protocolVersion": "2024-11-05"}))).await;

    assert_eq!(resp["result"]["serverInfo"]["name"], "quickbuild-mcp-server");
    assert!(resp["result"]["capabilities"]["tools"].is_object());
    assert!(resp["result"]["capabilities"]["resources"].is_object());
}

#[tokio::test]
async fn tools_list_in_feature_order() {
    let fake = FakeQuickBuild::start().await;
    let ctx = context(test_config(&fake.url()));

    let resp = call(&ctx, "tools/list", None).await;
    let names: Vec<&str> = resp["result"]["tools"]
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["name"].as_str().unwrap())
        .collect();

    assert_eq!(
        names,
        vec![
            "builds.get_latest_status",
            "builds.trigger",
            "grid.list_agents",
            "server.health"
        ]
    );
    let trigger = &resp["result"]["tools"][1];
    assert_eq!(trigger["inputSchema"]["required"], json!(["configuration_id"]));
}

#[tokio::test]
async fn resources_and_templates_are_listed() {
    let fake = FakeQuickBuild::start().await;
    let ctx = context(test_config(&fake.url()));

    let resources = call(&ctx, "resources/list", None).await;
    assert_eq!(
        resources["result"]["resources"],
        json!([{
            "uri": "configurations://list",
            "name": "Build Configurations",
            "description": "List all available build configurations in QuickBuild",
            "mimeType": "application/json"
        }])
    );

    let templates = call(&ctx, "resources/templates/list", None).await;
    assert_eq!(
        templates["result"]["resourceTemplates"][0]["uriTemplate"],
        "changes://build/{build_id}"
    );
}

#[tokio::test]
async fn notifications_get_no_response() {
    let fake = FakeQuickBuild::start().await;
    let ctx = context(test_config(&fake.url()));

    let notification = JsonRpcRequest {
        jsonrpc: "2.0".to_string(),
        id: None,
        method: "notifications/initialized".to_string(),
        params: None,
    };
    assert!(handlers::dispatch(&notification, &ctx).await.is_none());
}

#[tokio::test]
async fn unknown_method_is_method_not_found() {
    let fake = FakeQuickBuild::start().await;
    let ctx = context(test_config(&fake.url()));

    let resp = call(&ctx, "prompts/list", None).await;
    assert_eq!(resp["error"]["code"], -32601);
}

#[tokio::test]
async fn tools_call_without_params_is_invalid_params() {
    let fake = FakeQuickBuild::start().await;
    let ctx = context(test_config(&fake.url()));

    let resp = call(&ctx, "tools/call", None).await;
    assert_eq!(resp["error"]["code"], -32602);
    assert_eq!(resp["error"]["message"], "Missing params for tools/call");
}

// ---------------------------------------------------------------------------
// builds
// ---------------------------------------------------------------------------

#[tokio::test]
async fn latest_status_reports_build() {
    let fake = FakeQuickBuild::start().await;
    fake.reply_json(
        "GET",
        "/rest/builds",
        json!([{
            "id": 456,
            "version": "1.0.0",
            "status": "SUCCESSFUL",
            "startTime": "2024-01-01T12:00:00Z",
            "endTime": "2024-01-01T12:30:00Z"
        }]),
    );
    let ctx = context(test_config(&fake.url()));

    let result = call_tool(&ctx, "builds.get_latest_status", json!({"configuration_id": "123"})).await;

    assert!(!is_error(&result));
    assert_eq!(
        tool_text(&result),
        json!({
            "configuration_id": "123",
            "build_id": "456",
            "version": "1.0.0",
            "status": "SUCCESSFUL",
            "start_time": "2024-01-01T12:00:00+00:00",
            "end_time": "2024-01-01T12:30:00+00:00",
            "success": true
        })
    );
    let text = result["content"][0]["text"].as_str().unwrap();
    assert!(text.contains("\n  \"configuration_id\""), "output is indented JSON");
}

#[tokio::test]
async fn latest_status_without_builds() {
    let fake = FakeQuickBuild::start().await;
    fake.reply_json("GET", "/rest/builds", json!([]));
    let ctx = context(test_config(&fake.url()));

    let result = call_tool(&ctx, "builds.get_latest_status", json!({"configuration_id": "123"})).await;

    assert_eq!(
        tool_text(&result),
        json!({
            "configuration_id": "123",
            "message": "No builds found for this configuration"
        })
    );
}

#[tokio::test]
async fn latest_status_requires_configuration_id() {
    let fake = FakeQuickBuild::start().await;
    let ctx = context(test_config(&fake.url()));

    let missing = call_tool(&ctx, "builds.get_latest_status", json!({})).await;
    assert_eq!(error_code(&missing), "INVALID_ARGUMENTS");

    let blank = call_tool(&ctx, "builds.get_latest_status", json!({"configuration_id": " "})).await;
    assert_eq!(error_code(&blank), "INVALID_ARGUMENTS");
    assert_eq!(
        tool_text(&blank)["error"]["message"],
        "configuration_id is required"
    );
    assert!(fake.requests_to("/rest/builds").is_empty());
}

#[tokio::test]
async fn trigger_returns_queued_build() {
    let fake = FakeQuickBuild::start().await;
    fake.reply_json("POST", "/rest/builds", json!({"id": "789", "status": "QUEUED"}));
    let ctx = context(test_config(&fake.url()));

    let result = call_tool(
        &ctx,
        "builds.trigger",
        json!({"configuration_id": "123", "variables": {"VAR1": "value1"}}),
    )
    .await;

    assert_eq!(
        tool_text(&result),
        json!({
            "build_id": "789",
            "configuration_id": "123",
            "status": "QUEUED",
            "message": "Build triggered successfully for configuration 123",
            "variables": {"VAR1": "value1"}
        })
    );
}

#[tokio::test]
async fn trigger_rejects_non_string_variables() {
    let fake = FakeQuickBuild::start().await;
    let ctx = context(test_config(&fake.url()));

    let result = call_tool(
        &ctx,
        "builds.trigger",
        json!({"configuration_id": "123", "variables": {"COUNT": 3}}),
    )
    .await;

    assert_eq!(error_code(&result), "INVALID_ARGUMENTS");
    assert!(fake.requests_to("/rest/builds").is_empty());
}

#[tokio::test]
async fn upstream_failures_become_tool_errors() {
    let fake = FakeQuickBuild::start().await;
    fake.reply("GET", "/rest/builds", 500, "");
    let ctx = context(test_config(&fake.url()));

    let result = call_tool(&ctx, "builds.get_latest_status", json!({"configuration_id": "123"})).await;
    assert_eq!(error_code(&result), "QUICKBUILD_SERVER_ERROR");

    fake.set_auth_status(403);
    let fresh = context(test_config(&fake.url()));
    let result = call_tool(&fresh, "builds.get_latest_status", json!({"configuration_id": "123"})).await;
    assert_eq!(error_code(&result), "AUTHENTICATION_FAILED");
}

#[tokio::test]
async fn slow_upstream_hits_tool_timeout() {
    let fake = FakeQuickBuild::start().await;
    fake.reply_json("GET", "/rest/builds", json!([]));
    fake.set_delay(Duration::from_millis(500));
    let mut config = test_config(&fake.url());
    config.tool_timeout = Duration::from_millis(50);
    let ctx = context(config);

    let result = call_tool(&ctx, "builds.get_latest_status", json!({"configuration_id": "123"})).await;
    assert_eq!(error_code(&result), "TIMEOUT");
}

// ---------------------------------------------------------------------------
// grid, health, unknown tools
// ---------------------------------------------------------------------------

#[tokio::test]
async fn list_agents_counts_online_and_offline() {
    let fake = FakeQuickBuild::start().await;
    fake.reply_json(
        "GET",
        "/rest/agents",
        json!([
            {"name": "agent-1", "status": "online", "lastContact": "2024-01-01T12:00:00Z", "ipAddress": "192.168.1.100", "port": 8810},
            {"name": "agent-2", "status": "Offline", "ipAddress": "192.168.1.101", "port": 8810},
            {"name": "agent-3", "status": "busy", "port": 8811}
        ]),
    );
    let ctx = context(test_config(&fake.url()));

    let result = call_tool(&ctx, "grid.list_agents", json!({})).await;
    let body = tool_text(&result);

    assert_eq!(body["count"], 3);
    assert_eq!(body["online_count"], 1);
    assert_eq!(body["offline_count"], 1);
    assert_eq!(
        body["agents"][0],
        json!({
            "name": "agent-1",
            "status": "online",
            "last_contact": "2024-01-01T12:00:00+00:00",
            "ip_address": "192.168.1.100",
            "port": 8810
        })
    );
    assert_eq!(body["agents"][1]["last_contact"], Value::Null);
}

#[tokio::test]
async fn list_agents_rejects_unexpected_arguments() {
    let fake = FakeQuickBuild::start().await;
    let ctx = context(test_config(&fake.url()));

    let result = call_tool(&ctx, "grid.list_agents", json!({"filter": "online"})).await;
    assert_eq!(error_code(&result), "INVALID_ARGUMENTS");
}

#[tokio::test]
async fn health_reports_session() {
    let fake = FakeQuickBuild::start().await;
    let ctx = context(test_config(&fake.url()));

    let result = call_tool(&ctx, "server.health", json!({})).await;
    let body = tool_text(&result);

    assert_eq!(body["status"], "ok");
    assert_eq!(body["authenticated"], true);
    assert_eq!(fake.auth_calls(), 1);
}

#[tokio::test]
async fn unknown_tool_is_tool_error() {
    let fake = FakeQuickBuild::start().await;
    let ctx = context(test_config(&fake.url()));

    let result = call_tool(&ctx, "builds.cancel", json!({})).await;
    assert_eq!(error_code(&result), "UNKNOWN_TOOL");
    assert_eq!(
        tool_text(&result)["error"]["message"],
        "Unknown tool: builds.cancel"
    );
}

// ---------------------------------------------------------------------------
// resources
// ---------------------------------------------------------------------------

#[tokio::test]
async fn read_configurations_resource() {
    let fake = FakeQuickBuild::start().await;
    fake.reply_json(
        "GET",
        "/rest/configurations",
        json!([
            {"id": 1, "name": "root", "description": "Root", "enabled": true},
            {"id": 2, "name": "app", "description": "App build", "parentId": 1, "enabled": false}
        ]),
    );
    let ctx = context(test_config(&fake.url()));

    let resp = call(&ctx, "resources/read", Some(json!({"uri": "configurations://list"}))).await;
    let contents = &resp["result"]["contents"][0];

    assert_eq!(contents["uri"], "configurations://list");
    assert_eq!(contents["mimeType"], "application/json");
    let body: Value = serde_json::from_str(contents["text"].as_str().unwrap()).unwrap();
    assert_eq!(body["count"], 2);
    assert_eq!(
        body["configurations"][1],
        json!({
            "id": "2",
            "name": "app",
            "description": "App build",
            "parent_id": "1",
            "enabled": false
        })
    );
    assert_eq!(body["configurations"][0]["parent_id"], Value::Null);
}

#[tokio::test]
async fn read_build_changes_resource() {
    let fake = FakeQuickBuild::start().await;
    fake.reply_json(
        "GET",
        "/rest/builds/456/changes",
        json!([{
            "revision": "abc123",
            "author": "developer@example.com",
            "message": "Test commit",
            "timestamp": "2024-01-01T12:00:00Z",
            "files": ["src/test.py", "README.md"]
        }]),
    );
    let ctx = context(test_config(&fake.url()));

    let resp = call(&ctx, "resources/read", Some(json!({"uri": "changes://build/456"}))).await;
    let body: Value =
        serde_json::from_str(resp["result"]["contents"][0]["text"].as_str().unwrap()).unwrap();

    assert_eq!(body["build_id"], "456");
    assert_eq!(body["count"], 1);
    assert_eq!(body["changes"][0]["files"], json!(["src/test.py", "README.md"]));
    assert_eq!(body["changes"][0]["timestamp"], "2024-01-01T12:00:00+00:00");
}

#[tokio::test]
async fn read_changes_for_missing_build_is_internal_error() {
    let fake = FakeQuickBuild::start().await;
    let ctx = context(test_config(&fake.url()));

    let resp = call(&ctx, "resources/read", Some(json!({"uri": "changes://build/999"}))).await;

    assert_eq!(resp["error"]["code"], -32603);
    assert_eq!(resp["error"]["data"]["error"]["code"], "RESOURCE_NOT_FOUND");
}

#[tokio::test]
async fn read_changes_rejects_malformed_build_id() {
    let fake = FakeQuickBuild::start().await;
    let ctx = context(test_config(&fake.url()));

    for uri in [
        "changes://build/",
        "changes://build/1/../2",
        "changes://build/1%2F2",
        "changes://build/..",
        "changes://build/%FF",
    ] {
        let resp = call(&ctx, "resources/read", Some(json!({"uri": uri}))).await;
        assert_eq!(resp["error"]["code"], -32602, "uri {uri}");
        assert_eq!(resp["error"]["data"]["error"]["code"], "INVALID_ARGUMENTS");
    }
}

#[tokio::test]
async fn read_changes_decodes_percent_encoded_build_id() {
    let fake = FakeQuickBuild::start().await;
    fake.reply_json("GET", "/rest/builds/a%20b/changes", json!([]));
    let ctx = context(test_config(&fake.url()));

    let resp = call(&ctx, "resources/read", Some(json!({"uri": "changes://build/a%20b"}))).await;
    let body: Value =
        serde_json::from_str(resp["result"]["contents"][0]["text"].as_str().unwrap()).unwrap();

    assert_eq!(body["build_id"], "a b");
    assert_eq!(body["count"], 0);
    assert_eq!(fake.requests_to("/rest/builds/a%20b/changes").len(), 1);
}

#[tokio::test]
async fn read_unknown_resource() {
    let fake = FakeQuickBuild::start().await;
    let ctx = context(test_config(&fake.url()));

    let resp = call(&ctx, "resources/read", Some(json!({"uri": "artifacts://list"}))).await;

    assert_eq!(resp["error"]["code"], -32602);
    assert_eq!(resp["error"]["message"], "Unknown resource: artifacts://list");
    assert_eq!(resp["error"]["data"]["error"]["code"], "UNKNOWN_RESOURCE");
}
