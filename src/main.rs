use quickbuild_mcp_server::config::ServerConfig;
use quickbuild_mcp_server::handlers::ServerContext;
use quickbuild_mcp_server::logging;
use quickbuild_mcp_server::server::McpServer;

#[tokio::main(flavor = "current_thread")]
async fn main() {
    dotenvy::dotenv().ok();

    let config = match ServerConfig::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("quickbuild-mcp-server: configuration error: {e}");
            std::process::exit(1);
        }
    };

    logging::init(&config.log_level);
    tracing::info!("Starting QuickBuild MCP server, target: {}", config.base_url);

    let context = match ServerContext::new(config) {
        Ok(c) => c,
        Err(e) => {
            tracing::error!("Cannot build QuickBuild client: {e}");
            std::process::exit(1);
        }
    };
    tracing::info!(
        "Features: {}",
        context.registry.feature_names().join(", ")
    );

    if let Err(e) = context.client.authenticate().await {
        tracing::error!("QuickBuild connection check failed: {e}");
        std::process::exit(1);
    }
    tracing::info!("QuickBuild connection verified");

    let mut server = McpServer::new(context);
    if let Err(e) = server.run().await {
        tracing::error!("Fatal error: {e}");
        std::process::exit(1);
    }
}
