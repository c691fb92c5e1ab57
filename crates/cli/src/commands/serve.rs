//! `supportline serve`: Start the HTTP gateway.

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use supportline_core::event::DomainEvent;
use supportline_engine::Orchestrator;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

use super::runtime;

pub async fn run(config_path: Option<&Path>, port_override: Option<u16>) -> Result<()> {
    let mut config = runtime::load_config(config_path)?;
    if let Some(port) = port_override {
        config.gateway.port = port;
    }

    let orchestrator = runtime::build_orchestrator(&config).await?;
    spawn_event_log(&orchestrator);

    println!("Supportline Gateway");
    println!("   Listening: {}:{}", config.gateway.host, config.gateway.port);
    println!("   Store:     {} ({})", config.store.backend, config.store.path);
    println!("   FAQ:       {} entries", orchestrator.matcher().len());

    supportline_gateway::start(&config, orchestrator)
        .await
        .map_err(|e| anyhow::anyhow!("Gateway failed: {e}"))?;

    Ok(())
}

/// Log escalations and degraded replies as they happen.
fn spawn_event_log(orchestrator: &Arc<Orchestrator>) {
    let mut events = orchestrator.subscribe();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => match event.as_ref() {
                    DomainEvent::SessionEscalated {
                        session_id,
                        ticket_id,
                        reason,
                        created: true,
                        ..
                    } => {
                        info!(session_id = %session_id, ticket_id, reason = ?reason, "Ticket opened");
                    }
                    DomainEvent::ProviderDegraded {
                        session_id,
                        error_message,
                        ..
                    } => {
                        warn!(session_id = %session_id, error = %error_message, "Degraded reply sent");
                    }
                    other => debug!(event = ?other, "Domain event"),
                },
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Event log fell behind");
                }
                Err(RecvError::Closed) => break,
            }
        }
    });
}
