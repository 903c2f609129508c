//! Print the Kanban board for an account
//!
//! Usage:
//!   KANBAN_USERNAME=ada KANBAN_PASSWORD=secret cargo run --example board
//!
//! The session is kept in `KANBAN_SESSION_FILE` (default `kanban-session.json`)
//! so later runs reuse it until the refresh token is rejected.

use kanban_client::{ClientConfig, FileTokenStore, SessionClient, SessionEvent, TaskStatus};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let session_file = std::env::var("KANBAN_SESSION_FILE")
        .unwrap_or_else(|_| "kanban-session.json".to_string());

    let config = ClientConfig::from_env()?;
    println!("=== Kanban Board ===");
    println!("API: {}", config.base_url);
    println!();

    let client = SessionClient::new(config, FileTokenStore::open(&session_file)?)?;

    let mut events = client.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            if let SessionEvent::Expired { reason } = event {
                eprintln!("! Session expired ({reason}), log in again");
            }
        }
    });

    if !client.is_authenticated() {
        let username = std::env::var("KANBAN_USERNAME")?;
        let password = std::env::var("KANBAN_PASSWORD")?;
        client.login(&username, &password).await?;
        println!("✓ Logged in as {username}");
    }

    let me = client.current_user().await?;
    println!("User: {} {}", me.username, if me.is_privileged() { "(admin)" } else { "" });
    println!();

    let board = client.board().await?;
    for status in TaskStatus::ALL {
        let column = board.column(status);
        println!("{} ({})", status.label(), column.len());
        for task in column {
            match task.note() {
                Some(note) => println!("  #{} {} - {}", task.id, task.title, note.content),
                None => println!("  #{} {}", task.id, task.title),
            }
        }
        println!();
    }

    Ok(())
}
