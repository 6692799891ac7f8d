//! Watch command - print catalog events as they happen.

use std::sync::Arc;

use tokio::sync::broadcast;

use crate::config::Settings;
use crate::mcp::notifications::CatalogEvent;
use crate::service::SkillService;

fn subscribe_skill(service: &SkillService, name: &str) {
    for uri in [service.scheme().content(name), service.scheme().manifest(name)] {
        if let Err(e) = service.subscribe(&uri) {
            eprintln!("Cannot watch {uri}: {e}");
        }
    }
}

fn stamp() -> String {
    chrono::Local::now().format("%H:%M:%S%.3f").to_string()
}

/// Run watch command until Ctrl-C.
pub async fn run(settings: Arc<Settings>) -> anyhow::Result<()> {
    let service = SkillService::start(settings);
    let mut events = service.updates();

    for name in service.snapshot().names() {
        subscribe_skill(&service, name);
    }
    for uri in [service.scheme().index(), service.scheme().prompt_xml()] {
        if let Err(e) = service.subscribe(&uri) {
            eprintln!("Cannot watch {uri}: {e}");
        }
    }

    eprintln!(
        "Watching {} skills in {} ({} paths). Press Ctrl-C to stop.",
        service.snapshot().len(),
        service.snapshot().root().display(),
        service.subscriptions().watched_paths().len()
    );

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,

            event = events.recv() => match event {
                Ok(CatalogEvent::ResourceUpdated { uri }) => {
                    println!("{} updated  {uri}", stamp());
                }
                Ok(CatalogEvent::SkillAdded { name }) => {
                    println!("{} added    {name}", stamp());
                    subscribe_skill(&service, &name);
                }
                Ok(CatalogEvent::SkillRemoved { name }) => {
                    println!("{} removed  {name}", stamp());
                }
                Ok(CatalogEvent::ListChanged) => {
                    println!("{} list changed ({} skills)", stamp(), service.snapshot().len());
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    eprintln!("Missed {n} events");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
        }
    }

    service.close();
    Ok(())
}
