//! Notification broadcasting for catalog changes
//!
//! This module provides a broadcast channel for catalog events that can be
//! shared between the watchers and any number of MCP sessions or other
//! listeners.

use tokio::sync::broadcast;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CatalogEvent {
    /// A subscribed resource changed on disk
    ResourceUpdated { uri: String },
    SkillAdded { name: String },
    SkillRemoved { name: String },
    /// Catalog membership changed; resource and tool lists are stale
    ListChanged,
}

/// Fans catalog events out to every listener
#[derive(Debug, Clone)]
pub struct NotificationBroadcaster {
    sender: broadcast::Sender<CatalogEvent>,
}

impl NotificationBroadcaster {
    /// Create a new broadcaster with specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Send a catalog event to all subscribers
    pub fn send(&self, event: CatalogEvent) {
        match self.sender.send(event.clone()) {
            Ok(count) => {
                crate::debug_event!("broadcast", "sent", "{event:?} to {count} subscribers");
            }
            Err(_) => {
                // No receivers, this is fine
                crate::debug_event!("broadcast", "dropped", "no subscribers for {event:?}");
            }
        }
    }

    /// Subscribe to receive notifications
    pub fn subscribe(&self) -> broadcast::Receiver<CatalogEvent> {
        self.sender.subscribe()
    }
}

/// Forwarding of catalog events to the connected MCP peer
impl super::SkillServer {
    /// Start listening for broadcast notifications and forward them via MCP
    pub async fn start_notification_listener(
        &self,
        mut receiver: broadcast::Receiver<CatalogEvent>,
    ) {
        use rmcp::model::ResourceUpdatedNotificationParam;

        crate::debug_event!("mcp-notify", "listening");

        loop {
            match receiver.recv().await {
                Ok(event) => {
                    crate::debug_event!("mcp-notify", "received", "{event:?}");

                    let peer_guard = self.peer.lock().await;
                    let Some(peer) = peer_guard.as_ref() else {
                        crate::debug_event!("mcp-notify", "dropped", "no peer");
                        continue;
                    };

                    match event {
                        CatalogEvent::ResourceUpdated { uri } => {
                            let _ = peer
                                .notify_resource_updated(ResourceUpdatedNotificationParam {
                                    uri: uri.clone(),
                                })
                                .await;
                            crate::debug_event!("mcp-notify", "sent", "ResourceUpdated {uri}");
                        }
                        CatalogEvent::SkillAdded { name } | CatalogEvent::SkillRemoved { name } => {
                            crate::debug_event!("mcp-notify", "membership", "{name}");
                        }
                        CatalogEvent::ListChanged => {
                            let _ = peer.notify_resource_list_changed().await;
                            let _ = peer.notify_tool_list_changed().await;
                            crate::debug_event!("mcp-notify", "sent", "ListChanged");
                        }
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!("[mcp-notify] lagged by {n} messages");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    crate::debug_event!("mcp-notify", "channel closed");
                    break;
                }
            }
        }
    }
}
