//! `supportline ticket`: Show or update an escalation ticket.

use std::path::Path;

use anyhow::{Context, Result};
use supportline_core::session::{TicketId, TicketStatus};

use super::runtime;

pub async fn run(config_path: Option<&Path>, id: u64, status: Option<TicketStatus>) -> Result<()> {
    let config = runtime::load_config(config_path)?;
    let store = runtime::build_store(&config).await?;
    let id = TicketId(id);

    let ticket = match status {
        Some(status) => {
            let ticket = store
                .update_ticket_status(id, status)
                .await
                .with_context(|| format!("Failed to update ticket {id}"))?;
            println!("Ticket {id} is now {}", ticket.status.as_str());
            ticket
        }
        None => store
            .get_ticket(id)
            .await
            .with_context(|| format!("Ticket {id} not found"))?,
    };

    println!("  Session:  {}", ticket.session_id);
    println!("  Status:   {}", ticket.status.as_str());
    println!("  Reason:   {}", ticket.reason);
    println!("  Created:  {}", ticket.created_at.format("%Y-%m-%d %H:%M:%S"));
    if let Some(summary) = &ticket.summary {
        println!("  Summary:  {summary}");
    }

    Ok(())
}
