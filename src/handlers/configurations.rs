use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;

use crate::client::QuickBuildClient;
use crate::protocol::{McpErrorResponse, ResourceDescriptor};

use super::registry::Feature;
use super::to_pretty_json;

pub const CONFIGURATIONS_URI: &str = "configurations://list";

#[derive(Debug, Serialize)]
struct ConfigurationList {
    configurations: Vec<ConfigurationEntry>,
    count: usize,
}

#[derive(Debug, Serialize)]
struct ConfigurationEntry {
    id: String,
    name: String,
    description: String,
    parent_id: Option<String>,
    enabled: bool,
}

/// Exposes the `configurations://list` resource.
pub struct ConfigurationsFeature {
    client: Arc<QuickBuildClient>,
}

impl ConfigurationsFeature {
    pub fn new(client: Arc<QuickBuildClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Feature for ConfigurationsFeature {
    fn name(&self) -> &'static str {
        "configurations"
    }

    fn resources(&self) -> Vec<ResourceDescriptor> {
        vec![ResourceDescriptor {
            uri: CONFIGURATIONS_URI.into(),
            name: "Build Configurations".into(),
            description: "List all available build configurations in QuickBuild".into(),
            mime_type: "application/json".into(),
        }]
    }

    fn serves_resource(&self, uri: &str) -> bool {
        uri == CONFIGURATIONS_URI
    }

    async fn read_resource(&self, _uri: &str) -> Result<String, McpErrorResponse> {
        let configurations: Vec<ConfigurationEntry> = self
            .client
            .get_configurations()
            .await?
            .into_iter()
            .map(|c| ConfigurationEntry {
                id: c.id,
                name: c.name,
                description: c.description,
                parent_id: c.parent_id,
                enabled: c.enabled,
            })
            .collect();

        tracing::info!("Listed {} configurations", configurations.len());
        to_pretty_json(&ConfigurationList {
            count: configurations.len(),
            configurations,
        })
    }
}
