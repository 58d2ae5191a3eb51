//! Message maintenance commands: list, prune, last-activity, stats.

use anyhow::Result;
use clap::Subcommand;
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;

use volpina_types::message::MessageRecord;

use crate::state::AppState;

const TEXT_PREVIEW_CHARS: usize = 60;

#[derive(Subcommand)]
pub enum MessageCommand {
    /// List stored messages by ascending id.
    #[command(alias = "ls")]
    List {
        /// Only show messages from this conversation.
        #[arg(long, short)]
        conversation: Option<String>,
    },

    /// Run the retention prune for a conversation.
    Prune {
        /// Conversation id.
        conversation: String,
    },

    /// Show the latest message timestamp in a conversation.
    LastActivity {
        /// Conversation id.
        conversation: String,
    },

    /// Show message counts.
    Stats {
        /// Also report the unsaved count for this conversation.
        #[arg(long, short)]
        conversation: Option<String>,
    },
}

/// Dispatch a `messages` subcommand.
pub async fn run(state: &AppState, action: MessageCommand, json: bool) -> Result<()> {
    match action {
        MessageCommand::List { conversation } => list(state, conversation.as_deref(), json).await,
        MessageCommand::Prune { conversation } => prune(state, &conversation, json).await,
        MessageCommand::LastActivity { conversation } => {
            last_activity(state, &conversation, json).await
        }
        MessageCommand::Stats { conversation } => stats(state, conversation.as_deref(), json).await,
    }
}

async fn list(state: &AppState, conversation: Option<&str>, json: bool) -> Result<()> {
    let messages = state.message_service.list_messages(conversation).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&messages)?);
        return Ok(());
    }

    if messages.is_empty() {
        println!();
        println!("  {}", style("No messages stored.").dim());
        println!();
        return Ok(());
    }

    println!();
    println!("{}", message_table(&messages));
    println!();
    println!("  {} message(s)", messages.len());
    println!();

    Ok(())
}

async fn prune(state: &AppState, conversation: &str, json: bool) -> Result<()> {
    let removed = state.message_service.prune(conversation).await?;

    if json {
        let out = serde_json::json!({
            "conversationId": conversation,
            "removed": removed,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    if removed.is_empty() {
        println!(
            "  {} '{}' is within the retention cap ({})",
            style("✓").green().bold(),
            conversation,
            state.message_service.policy().cap()
        );
    } else {
        println!(
            "  {} Pruned {} message(s) from '{}'",
            style("✓").green().bold(),
            style(removed.len()).bold(),
            conversation
        );
    }

    Ok(())
}

async fn last_activity(state: &AppState, conversation: &str, json: bool) -> Result<()> {
    let last_time = state.message_service.last_activity(conversation).await?;

    if json {
        let out = serde_json::json!({
            "conversationId": conversation,
            "lastTime": last_time,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    match last_time {
        Some(ts) => println!(
            "  {}  {}",
            style(conversation).cyan(),
            style(format_timestamp(ts)).bold()
        ),
        None => println!(
            "  {}  {}",
            style(conversation).cyan(),
            style("no messages").dim()
        ),
    }

    Ok(())
}

async fn stats(state: &AppState, conversation: Option<&str>, json: bool) -> Result<()> {
    let total = state.message_service.total_messages().await?;
    let unsaved = match conversation {
        Some(conversation) => Some(state.message_service.unsaved_count(conversation).await?),
        None => None,
    };
    let cap = state.message_service.policy().cap();

    if json {
        let out = serde_json::json!({
            "version": env!("CARGO_PKG_VERSION"),
            "data_dir": state.data_dir.display().to_string(),
            "total_messages": total,
            "retention_cap": cap,
            "conversation": conversation.map(|c| serde_json::json!({
                "conversationId": c,
                "unsaved": unsaved,
            })),
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    println!();
    println!("  {} Volpina v{}", style("●").bold(), env!("CARGO_PKG_VERSION"));
    println!();
    println!("  {}", style("── Store ──").dim());
    println!("  Data dir:       {}", style(state.data_dir.display()).dim());
    println!("  Messages:       {}", style(total).bold());
    println!("  Retention cap:  {}", cap);

    if let (Some(conversation), Some(unsaved)) = (conversation, unsaved) {
        println!();
        println!("  {}", style(format!("── {conversation} ──")).dim());
        let unsaved_styled = if unsaved > cap as u64 {
            style(unsaved).yellow()
        } else {
            style(unsaved).green()
        };
        println!("  Unsaved:        {unsaved_styled}");
    }
    println!();

    Ok(())
}

fn message_table(messages: &[MessageRecord]) -> Table {
    let mut table = Table::new();
    table.load_preset(presets::UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);

    table.set_header(vec![
        Cell::new("ID").fg(Color::White),
        Cell::new("Conversation").fg(Color::White),
        Cell::new("Time").fg(Color::White),
        Cell::new("Sender").fg(Color::White),
        Cell::new("Saved").fg(Color::White),
        Cell::new("Text").fg(Color::White),
    ]);

    for msg in messages {
        let saved = if msg.is_saved {
            Cell::new("yes").fg(Color::Green)
        } else {
            Cell::new("")
        };
        table.add_row(vec![
            Cell::new(msg.id).fg(Color::DarkGrey),
            Cell::new(&msg.conversation_id).fg(Color::Cyan),
            Cell::new(format_timestamp(msg.timestamp)),
            Cell::new(msg.sender.as_deref().unwrap_or("-")),
            saved,
            Cell::new(preview(&msg.text)),
        ]);
    }

    table
}

/// Render epoch milliseconds as a UTC date-time, or the raw number when out of range.
fn format_timestamp(ms: i64) -> String {
    chrono::DateTime::from_timestamp_millis(ms)
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S%.3f UTC").to_string())
        .unwrap_or_else(|| ms.to_string())
}

fn preview(text: &str) -> String {
    let single_line = text.replace('\n', " ");
    if single_line.chars().count() <= TEXT_PREVIEW_CHARS {
        return single_line;
    }
    let cut: String = single_line.chars().take(TEXT_PREVIEW_CHARS).collect();
    format!("{cut}…")
}
