//! Serve command - MCP server on stdio.

use std::sync::Arc;

use anyhow::Context;
use rmcp::{ServiceExt, transport::stdio};

use crate::config::Settings;
use crate::mcp::SkillServer;
use crate::service::SkillService;

/// Run the MCP server until the client disconnects.
pub async fn run(settings: Arc<Settings>) -> anyhow::Result<()> {
    let service = Arc::new(SkillService::start(settings));
    let server = SkillServer::new(service.clone());

    eprintln!(
        "Serving {} skills from {} (structural watch: {})",
        service.snapshot().len(),
        service.snapshot().root().display(),
        if service.is_watching_structure() { "on" } else { "off" }
    );

    // Forward catalog events to the MCP client
    let notification_receiver = service.updates();
    let notification_server = server.clone();
    tokio::spawn(async move {
        notification_server
            .start_notification_listener(notification_receiver)
            .await;
    });

    let running = server
        .serve(stdio())
        .await
        .context("Failed to start MCP server")?;

    let reason = running.waiting().await.context("MCP server error")?;
    crate::debug_event!("mcp", "stopped", "{reason:?}");

    // Watchers stop before their handles are released
    service.close();
    Ok(())
}
