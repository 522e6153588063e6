use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;

use crate::client::QuickBuildClient;
use crate::protocol::{McpErrorCode, McpErrorResponse, ResourceTemplateDescriptor};

use super::registry::Feature;
use super::to_pretty_json;

pub const CHANGES_URI_PREFIX: &str = "changes://build/";

#[derive(Debug, Serialize)]
struct BuildChanges {
    build_id: String,
    changes: Vec<ChangeEntry>,
    count: usize,
}

#[derive(Debug, Serialize)]
struct ChangeEntry {
    revision: String,
    author: String,
    message: String,
    timestamp: Option<String>,
    files: Vec<String>,
}

/// Exposes `changes://build/{build_id}`: SCM changes included in a build.
pub struct ChangesFeature {
    client: Arc<QuickBuildClient>,
}

impl ChangesFeature {
    pub fn new(client: Arc<QuickBuildClient>) -> Self {
        Self { client }
    }
}

/// Extract the percent-decoded build id from a `changes://build/<id>` URI.
pub fn build_id_from_uri(uri: &str) -> Result<String, McpErrorResponse> {
    let Some(raw) = uri.strip_prefix(CHANGES_URI_PREFIX) else {
        return Err(McpErrorResponse::new(
            McpErrorCode::UnknownResource,
            format!("Unknown resource: {uri}"),
        ));
    };
    let invalid = || McpErrorResponse::invalid_arguments(format!("Invalid build id in {uri}"));

    let build_id = urlencoding::decode(raw).map_err(|_| invalid())?;
    if build_id.is_empty() || build_id.contains('/') || build_id == "." || build_id == ".." {
        return Err(invalid());
    }
    Ok(build_id.into_owned())
}

#[async_trait]
impl Feature for ChangesFeature {
    fn name(&self) -> &'static str {
        "changes"
    }

    fn resource_templates(&self) -> Vec<ResourceTemplateDescriptor> {
        vec![ResourceTemplateDescriptor {
            uri_template: format!("{CHANGES_URI_PREFIX}{{build_id}}"),
            name: "Build Changes".into(),
            description: "Get SCM changes for a specific build".into(),
            mime_type: "application/json".into(),
        }]
    }

    fn serves_resource(&self, uri: &str) -> bool {
        uri.starts_with(CHANGES_URI_PREFIX)
    }

    async fn read_resource(&self, uri: &str) -> Result<String, McpErrorResponse> {
        let build_id = build_id_from_uri(uri)?;

        let changes: Vec<ChangeEntry> = self
            .client
            .get_build_changes(&build_id)
            .await?
            .into_iter()
            .map(|c| ChangeEntry {
                revision: c.revision,
                author: c.author,
                message: c.message,
                timestamp: c.timestamp.map(|t| t.to_rfc3339()),
                files: c.files,
            })
            .collect();

        to_pretty_json(&BuildChanges {
            build_id,
            count: changes.len(),
            changes,
        })
    }
}
