//! `supportline sessions`: Admin view of stored sessions.

use std::path::Path;

use anyhow::{Context, Result};
use supportline_core::session::{SessionId, Speaker};

use super::runtime;

pub async fn run(config_path: Option<&Path>, id: Option<String>) -> Result<()> {
    let config = runtime::load_config(config_path)?;
    let store = runtime::build_store(&config).await?;

    let Some(id) = id else {
        let sessions = store.list_sessions().await?;
        if sessions.is_empty() {
            println!("No sessions yet.");
            return Ok(());
        }

        println!("{:<38} {:>6}  {:<10} {:>7}  UPDATED", "SESSION", "TURNS", "STATUS", "TICKET");
        for s in &sessions {
            let ticket = s.ticket_id.map(|t| t.to_string()).unwrap_or_else(|| "-".into());
            println!(
                "{:<38} {:>6}  {:<10} {:>7}  {}",
                s.id,
                s.turn_count,
                s.escalation.as_str(),
                ticket,
                s.updated_at.format("%Y-%m-%d %H:%M")
            );
        }
        println!("\n{} session(s)", sessions.len());
        return Ok(());
    };

    let session = store
        .get(&SessionId::from(&id))
        .await
        .with_context(|| format!("Session '{id}' not found"))?;

    println!("Session {}", session.id);
    println!("  Created:    {}", session.created_at.format("%Y-%m-%d %H:%M:%S"));
    println!("  Escalation: {}", session.escalation.as_str());
    if let Some(ticket_id) = session.ticket_id {
        let ticket = store.get_ticket(ticket_id).await?;
        println!(
            "  Ticket:     #{} ({}, {})",
            ticket.id,
            ticket.status.as_str(),
            ticket.reason
        );
    }
    if let Some(summary) = &session.summary {
        println!("  Summary:    {}", summary.summary);
        for action in &summary.next_actions {
            println!("              - {action}");
        }
    }
    println!();

    for turn in &session.turns {
        let who = match turn.speaker {
            Speaker::User => "Customer".to_string(),
            Speaker::Assistant => match turn.resolution {
                Some(resolution) => format!("{} [{}]", config.conversation.assistant_name, resolution.as_str()),
                None => config.conversation.assistant_name.clone(),
            },
        };
        println!(
            "  {:>3} {} {}: {}",
            turn.seq,
            turn.timestamp.format("%H:%M:%S"),
            who,
            turn.text
        );
    }

    Ok(())
}
