use anyhow::{Context, Result};
use chrono::Local;

use canvas_agenda::agenda::{Agenda, RefreshReason};
use canvas_agenda::{Config, StateStore};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().collect();
    if args.iter().any(|a| a == "--init") {
        let path = Config::generate_default()?;
        println!("Generated config file at: {}", path.display());
        println!("Edit it with your Canvas URL and API token (or a feed URL), then rerun.");
        return Ok(());
    }

    if args.iter().any(|a| a == "--help" || a == "-h") {
        println!("canvas-agenda — due-today agenda for Canvas LMS");
        println!();
        println!("USAGE:");
        println!("  canvas-agenda              Print today's agenda");
        println!("  canvas-agenda --day N      Print the agenda N days from today (N may be negative)");
        println!("  canvas-agenda --json       Emit the snapshot as JSON");
        println!("  canvas-agenda --init       Generate a default config file");
        println!();
        println!("CONFIG:");
        println!("  File: ~/.config/canvas-agenda/config.toml");
        println!("  Or env vars: CANVAS_AGENDA_URL + CANVAS_AGENDA_TOKEN, or CANVAS_AGENDA_FEED");
        return Ok(());
    }

    let day_offset: i64 = args
        .iter()
        .position(|a| a == "--day")
        .and_then(|i| args.get(i + 1))
        .map(|v| v.parse().with_context(|| format!("Invalid --day value: {v}")))
        .transpose()?
        .unwrap_or(0);
    let as_json = args.iter().any(|a| a == "--json");

    let config = Config::load().with_context(|| {
        "Failed to load configuration.\n\
         Run `canvas-agenda --init` to generate a config file,\n\
         or set CANVAS_AGENDA_URL and CANVAS_AGENDA_TOKEN (or CANVAS_AGENDA_FEED)."
    })?;

    let agenda = Agenda::new(StateStore::load_default())?;
    if let Some(minutes) = config.refresh_interval_minutes {
        agenda.set_refresh_interval(minutes).await;
    }

    // set_config runs the first refresh; navigating refreshes the target day.
    agenda.set_config(config.source_config()).await;
    if day_offset != 0 {
        agenda.change_day(day_offset).await;
    } else {
        agenda.refresh(RefreshReason::Startup).await;
    }

    let snapshot = agenda.subscribe().borrow().clone();

    if as_json {
        println!("{}", serde_json::to_string_pretty(&snapshot)?);
        return Ok(());
    }

    println!("{} — {} item(s), {} assignment(s) left today", snapshot.day, snapshot.items.len(), snapshot.badge_count);
    if let Some(message) = &snapshot.message {
        println!("  ! {message}");
    }
    for item in &snapshot.items {
        let time = match item.due_at {
            Some(due) => due.with_timezone(&Local).format("%H:%M").to_string(),
            None => "all-day".to_string(),
        };
        let done = if snapshot.completed.contains(&item.id) {
            " ✓"
        } else {
            ""
        };
        println!("  {:>7}  {} ({}){done}", time, item.title, item.display_course());
    }

    Ok(())
}
