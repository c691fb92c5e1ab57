//! `supportline chat`: Single-message or interactive chat in the terminal.

use std::io::Write;
use std::path::Path;

use anyhow::Result;
use supportline_core::error::Error;
use supportline_core::session::SessionId;
use tokio::io::{AsyncBufReadExt, BufReader};

use super::runtime;

pub async fn run(
    config_path: Option<&Path>,
    message: Option<String>,
    session: Option<String>,
) -> Result<()> {
    let config = runtime::load_config(config_path)?;
    let orchestrator = runtime::build_orchestrator(&config).await?;
    let mut session_id = session.map(|s| SessionId::from(&s));

    if let Some(msg) = message {
        let reply = orchestrator.chat(&msg, session_id.as_ref()).await?;
        println!("{}", reply.reply);
        eprintln!("(session {})", reply.session_id);
        return Ok(());
    }

    let name = &config.conversation.assistant_name;
    println!();
    println!("  Supportline, interactive mode");
    println!("  Assistant: {name}");
    println!("  Model:     {} via {}", config.default_model, config.default_provider);
    println!();
    println!("  Commands: /summary, /escalate, /exit");
    println!();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("  You > ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let input = line.trim();
        if input.is_empty() {
            continue;
        }

        match input {
            "/exit" | "/quit" | "exit" => break,
            "/summary" | "/escalate" => {
                let Some(id) = &session_id else {
                    println!("  (no conversation yet)");
                    continue;
                };
                if input == "/summary" {
                    let summary = orchestrator.summarize(id).await?;
                    println!("  Summary: {}", summary.summary);
                    for action in &summary.next_actions {
                        println!("    - {action}");
                    }
                } else {
                    let ticket = orchestrator.escalate(id, None).await?;
                    println!("  Ticket #{} is {}", ticket.id, ticket.status.as_str());
                }
            }
            _ => match orchestrator.chat(input, session_id.as_ref()).await {
                Ok(reply) => {
                    for line in reply.reply.lines() {
                        println!("  {name} > {line}");
                    }
                    session_id = Some(reply.session_id);
                }
                Err(Error::InvalidInput(reason)) => println!("  [Rejected] {reason}"),
                Err(e) => return Err(e.into()),
            },
        }
        println!();
    }

    if let Some(id) = session_id {
        println!("  Session: {id}");
    }
    println!("  Goodbye!");
    Ok(())
}
