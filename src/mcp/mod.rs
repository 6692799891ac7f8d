//! MCP (Model Context Protocol) server for the skills catalog
//!
//! Skills are published as resources with subscriptions, plus two tools
//! for clients that only understand tools.
//!
//! ## Architecture
//!
//! ```text
//! stdio <-> SkillServer (ServerHandler) --> SkillService
//!                  ^                             |
//!                  |                       CatalogEvent
//!                  +-- notification listener <---+
//! ```
//!
//! The server holds no catalog state of its own. Everything it answers
//! comes from the service snapshot current at request time.

pub mod notifications;

use std::sync::Arc;

use base64::Engine;
use rmcp::{
    ServerHandler,
    handler::server::{router::tool::ToolRouter, tool::ToolCallContext, wrapper::Parameters},
    model::{ErrorData as McpError, *},
    schemars,
    service::{Peer, RequestContext, RoleServer},
    tool, tool_router,
};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::resources::{ReadError, ResourceBody, ResourceContent, ResourceDescription};
use crate::service::SkillService;

/// Name of the tool whose description lists the available skills.
const LIST_SKILLS_TOOL: &str = "list_skills";

#[derive(Debug, Deserialize, Serialize, schemars::JsonSchema)]
pub struct ReadSkillRequest {
    /// Name of the skill to read
    pub name: String,
}

#[derive(Clone)]
pub struct SkillServer {
    service: Arc<SkillService>,
    tool_router: ToolRouter<Self>,
    peer: Arc<Mutex<Option<Peer<RoleServer>>>>,
}

#[tool_router]
impl SkillServer {
    pub fn new(service: Arc<SkillService>) -> Self {
        Self {
            service,
            tool_router: Self::tool_router(),
            peer: Arc::new(Mutex::new(None)),
        }
    }

    pub fn service(&self) -> &Arc<SkillService> {
        &self.service
    }

    #[tool(description = "List the available skills with their descriptions")]
    pub async fn list_skills(&self) -> Result<CallToolResult, McpError> {
        let summaries = self.service.list();
        if summaries.is_empty() {
            return Ok(CallToolResult::success(vec![Content::text(
                "No skills are available.",
            )]));
        }

        let json = serde_json::to_string_pretty(&summaries)
            .map_err(|e| McpError::internal_error(e.to_string(), None))?;
        Ok(CallToolResult::success(vec![Content::text(json)]))
    }

    #[tool(description = "Read the full instructions of a skill by name")]
    pub async fn read_skill(
        &self,
        Parameters(ReadSkillRequest { name }): Parameters<ReadSkillRequest>,
    ) -> Result<CallToolResult, McpError> {
        let uri = self.service.scheme().content(&name);
        match self.service.read(&uri) {
            Ok(content) => match content.body {
                ResourceBody::Text(text) => Ok(CallToolResult::success(vec![Content::text(text)])),
                ResourceBody::Binary(_) => Ok(CallToolResult::error(vec![Content::text(format!(
                    "Skill '{name}' is not readable as text"
                ))])),
            },
            Err(ReadError::NotFound { .. }) => {
                let available: Vec<String> =
                    self.service.list().into_iter().map(|s| s.name).collect();
                Ok(CallToolResult::error(vec![Content::text(format!(
                    "Skill '{name}' not found. Available: {}",
                    available.join(", ")
                ))]))
            }
            Err(e) => Ok(CallToolResult::error(vec![Content::text(e.to_string())])),
        }
    }
}

impl SkillServer {
    /// Description of `list_skills` naming what is available right now.
    fn list_skills_description(&self) -> String {
        let names: Vec<String> = self.service.list().into_iter().map(|s| s.name).collect();
        if names.is_empty() {
            "List the available skills with their descriptions. No skills are loaded.".to_string()
        } else {
            format!(
                "List the available skills with their descriptions. Available: {}",
                names.join(", ")
            )
        }
    }

    fn tools(&self) -> Vec<Tool> {
        self.tool_router
            .list_all()
            .into_iter()
            .map(|mut tool| {
                if tool.name == LIST_SKILLS_TOOL {
                    tool.description = Some(self.list_skills_description().into());
                }
                tool
            })
            .collect()
    }
}

fn to_resource(description: ResourceDescription) -> Resource {
    let mut raw = RawResource::new(description.uri, description.name);
    raw.description = Some(description.description);
    raw.mime_type = Some(description.mime_type);
    raw.size = description.size.and_then(|size| u32::try_from(size).ok());
    raw.no_annotation()
}

fn to_contents(content: ResourceContent) -> ResourceContents {
    match content.body {
        ResourceBody::Text(text) => ResourceContents::TextResourceContents {
            uri: content.uri,
            mime_type: Some(content.mime_type),
            text,
            meta: None,
        },
        ResourceBody::Binary(bytes) => ResourceContents::BlobResourceContents {
            uri: content.uri,
            mime_type: Some(content.mime_type),
            blob: base64::engine::general_purpose::STANDARD.encode(bytes),
            meta: None,
        },
    }
}

fn to_mcp_error(error: ReadError) -> McpError {
    let message = error.to_string();
    match error {
        ReadError::NotFound { uri } => {
            McpError::resource_not_found(message, Some(serde_json::json!({ "uri": uri })))
        }
        ReadError::Denied { .. } | ReadError::TooLarge { .. } => {
            McpError::invalid_params(message, None)
        }
        ReadError::Io { .. } => McpError::internal_error(message, None),
    }
}

impl ServerHandler for SkillServer {
    fn get_info(&self) -> ServerInfo {
        let settings = self.service.settings();
        ServerInfo {
            protocol_version: ProtocolVersion::V_2025_03_26,
            capabilities: ServerCapabilities::builder()
                .enable_resources()
                .enable_resources_subscribe()
                .enable_resources_list_changed()
                .enable_tools()
                .enable_tool_list_changed()
                .build(),
            server_info: Implementation {
                name: settings.server.name.clone(),
                title: Some("Skill catalog".to_string()),
                version: env!("CARGO_PKG_VERSION").to_string(),
                description: None,
                icons: None,
                website_url: None,
            },
            instructions: Some(settings.server.instructions.clone().unwrap_or_else(|| {
                format!(
                    "Skills are available as resources. Read '{}' for the list, or \
                    '{}' for a block to place in a system prompt. Subscribe to a skill's \
                    resources to be told when they change.",
                    self.service.scheme().index(),
                    self.service.scheme().prompt_xml()
                )
            })),
        }
    }

    async fn initialize(
        &self,
        request: InitializeRequestParams,
        context: RequestContext<RoleServer>,
    ) -> Result<InitializeResult, McpError> {
        // Register client capabilities (required for MCP handshake)
        if context.peer.peer_info().is_none() {
            context.peer.set_peer_info(request);
        }

        // Store the peer reference for sending notifications
        let mut peer_guard = self.peer.lock().await;
        *peer_guard = Some(context.peer.clone());

        Ok(self.get_info())
    }

    async fn list_resources(
        &self,
        _request: Option<PaginatedRequestParams>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListResourcesResult, McpError> {
        let resources = self.service.resources().into_iter().map(to_resource).collect();
        Ok(ListResourcesResult::with_all_items(resources))
    }

    async fn list_resource_templates(
        &self,
        _request: Option<PaginatedRequestParams>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListResourceTemplatesResult, McpError> {
        let template = RawResourceTemplate {
            uri_template: self.service.scheme().document_template(),
            name: "Skill document".to_string(),
            title: None,
            description: Some("A supplementary file of a skill, by relative path".to_string()),
            mime_type: None,
            icons: None,
        };
        Ok(ListResourceTemplatesResult::with_all_items(vec![
            template.no_annotation(),
        ]))
    }

    async fn read_resource(
        &self,
        request: ReadResourceRequestParams,
        _context: RequestContext<RoleServer>,
    ) -> Result<ReadResourceResult, McpError> {
        let content = self.service.read(&request.uri).map_err(to_mcp_error)?;
        Ok(ReadResourceResult {
            contents: vec![to_contents(content)],
        })
    }

    async fn subscribe(
        &self,
        request: SubscribeRequestParams,
        _context: RequestContext<RoleServer>,
    ) -> Result<(), McpError> {
        self.service
            .subscribe(&request.uri)
            .map_err(|e| McpError::internal_error(e.to_string(), None))
    }

    async fn unsubscribe(
        &self,
        request: UnsubscribeRequestParams,
        _context: RequestContext<RoleServer>,
    ) -> Result<(), McpError> {
        self.service.unsubscribe(&request.uri);
        Ok(())
    }

    async fn list_tools(
        &self,
        _request: Option<PaginatedRequestParams>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, McpError> {
        Ok(ListToolsResult::with_all_items(self.tools()))
    }

    async fn call_tool(
        &self,
        request: CallToolRequestParams,
        context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, McpError> {
        let tcc = ToolCallContext::new(self, request, context);
        self.tool_router.call(tcc).await
    }

    fn get_tool(&self, name: &str) -> Option<Tool> {
        self.tools().into_iter().find(|tool| tool.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use std::fs;
    use tempfile::TempDir;

    fn server(dir: &TempDir) -> SkillServer {
        let skill = dir.path().join("alpha");
        fs::create_dir_all(skill.join("assets")).unwrap();
        fs::write(
            skill.join("SKILL.md"),
            "---\nname: alpha\ndescription: first\n---\nDo the thing.\n",
        )
        .unwrap();
        fs::write(skill.join("assets/logo.png"), [0x89, b'P', b'N', b'G']).unwrap();

        let mut settings = Settings::default();
        settings.skills_dir = dir.path().to_path_buf();
        settings.watch.enabled = false;
        SkillServer::new(Arc::new(SkillService::start(Arc::new(settings))))
    }

    fn text_of(result: &CallToolResult) -> String {
        result
            .content
            .iter()
            .filter_map(|c| c.as_text().map(|t| t.text.clone()))
            .collect()
    }

    #[tokio::test]
    async fn test_tools_list_names_current_skills() {
        let dir = TempDir::new().unwrap();
        let server = server(&dir);

        let tools = server.tools();
        let names: Vec<&str> = tools.iter().map(|t| t.name.as_ref()).collect();
        assert_eq!(names, vec!["list_skills", "read_skill"]);

        let description = tools[0].description.clone().unwrap_or_default();
        assert!(description.ends_with("Available: alpha"));
    }

    #[tokio::test]
    async fn test_read_skill_tool() {
        let dir = TempDir::new().unwrap();
        let server = server(&dir);

        let found = server
            .read_skill(Parameters(ReadSkillRequest {
                name: "alpha".to_string(),
            }))
            .await
            .unwrap();
        assert_ne!(found.is_error, Some(true));
        assert!(text_of(&found).contains("Do the thing."));

        let missing = server
            .read_skill(Parameters(ReadSkillRequest {
                name: "nope".to_string(),
            }))
            .await
            .unwrap();
        assert_eq!(missing.is_error, Some(true));
        assert!(text_of(&missing).contains("Available: alpha"));
    }

    #[tokio::test]
    async fn test_binary_documents_become_blobs() {
        let dir = TempDir::new().unwrap();
        let server = server(&dir);

        let content = server
            .service()
            .read("skill://alpha/assets/logo.png")
            .unwrap();
        match to_contents(content) {
            ResourceContents::BlobResourceContents { blob, mime_type, .. } => {
                assert_eq!(mime_type.as_deref(), Some("image/png"));
                assert_eq!(blob, "iVBORw==");
            }
            other => panic!("expected blob, got {other:?}"),
        }
    }

    #[test]
    fn test_read_errors_map_to_protocol_errors() {
        let not_found = to_mcp_error(ReadError::NotFound {
            uri: "skill://x/SKILL.md".to_string(),
        });
        assert_eq!(not_found.code, ErrorCode::RESOURCE_NOT_FOUND);

        let denied = to_mcp_error(ReadError::Denied {
            uri: "skill://x/../y".to_string(),
        });
        assert_eq!(denied.code, ErrorCode::INVALID_PARAMS);
    }

    #[tokio::test]
    async fn test_resources_have_sizes() {
        let dir = TempDir::new().unwrap();
        let server = server(&dir);

        let resources: Vec<Resource> = server
            .service()
            .resources()
            .into_iter()
            .map(to_resource)
            .collect();
        let definition = resources
            .iter()
            .find(|r| r.raw.uri == "skill://alpha/SKILL.md")
            .unwrap();
        assert_eq!(definition.raw.mime_type.as_deref(), Some("text/markdown"));
        assert!(definition.raw.size.is_some());
    }
}
