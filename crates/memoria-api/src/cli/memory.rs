//! Memory CLI commands: remember, search, context, list, backfill.

use anyhow::{Context, Result};
use chrono::{Duration, Utc};
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use tokio_util::sync::CancellationToken;

use memoria_types::memory::{ListQuery, MemoryId, MemoryRecord, MemoryScope, MemoryTier, WriteRequest};
use memoria_types::reconcile::ReconcileRequest;
use memoria_types::search::{ContextRequest, SearchQuery, SearchResponse, SearchResult};

use crate::state::AppState;

/// Column width for content previews.
const PREVIEW_CHARS: usize = 60;

/// Arguments for `memoria remember`.
pub struct RememberArgs {
    pub content: String,
    pub memory_type: String,
    pub content_type: String,
    pub scope: MemoryScope,
    pub metadata: Vec<(String, String)>,
    pub ttl_hours: Option<i64>,
    pub no_embed: bool,
}

/// Store a memory.
///
/// ```bash
/// memoria remember "Revenue grew 12% in EMEA" --type long-term --owner alice --meta region=emea
/// ```
pub async fn remember(state: &AppState, args: RememberArgs, json: bool) -> Result<()> {
    let metadata = if args.metadata.is_empty() {
        None
    } else {
        Some(metadata_map(args.metadata))
    };
    let request = WriteRequest {
        content: args.content,
        content_type: args.content_type,
        memory_type: args.memory_type,
        scope: args.scope,
        metadata,
        expires_at: args.ttl_hours.map(|h| Utc::now() + Duration::hours(h)),
        generate_embedding: Some(!args.no_embed),
    };

    let written = state.memory_service.remember(request).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&written)?);
        return Ok(());
    }

    println!();
    println!(
        "  {} Remembered {}",
        style("✓").green().bold(),
        style(written.id).dim()
    );
    println!();
    Ok(())
}

/// Run a hybrid search. Ctrl+C cancels an in-flight search.
///
/// ```bash
/// memoria search budget review --owner alice --limit 5
/// ```
pub async fn search(state: &AppState, query: SearchQuery, json: bool) -> Result<()> {
    let cancel = CancellationToken::new();
    let watcher = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        })
    };

    let result = state.memory_service.search_with_cancel(query, &cancel).await;
    watcher.abort();
    let response = result?;

    if json {
        println!("{}", serde_json::to_string_pretty(&response)?);
        return Ok(());
    }

    print_search(&response);
    Ok(())
}

/// Recall context for a conversation.
///
/// ```bash
/// memoria context "who came to the wedding?" "was it by the lake" --kind reminiscence --owner alice
/// ```
pub async fn context(state: &AppState, request: ContextRequest, json: bool) -> Result<()> {
    let response = state.memory_service.context(request).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&response)?);
        return Ok(());
    }

    print_search(&response);
    Ok(())
}

fn print_search(response: &SearchResponse) {
    println!();
    if response.results.is_empty() {
        println!(
            "  {} No memories matched '{}'.",
            style("i").blue().bold(),
            style(&response.search_params.query).cyan()
        );
        println!();
        return;
    }

    let mut table = Table::new();
    table.load_preset(presets::UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        Cell::new("Relevance").fg(Color::White),
        Cell::new("Content").fg(Color::White),
        Cell::new("Type").fg(Color::White),
        Cell::new("Tier").fg(Color::White),
        Cell::new("Source").fg(Color::White),
        Cell::new("Date").fg(Color::White),
    ]);

    for hit in &response.results {
        table.add_row(search_row(hit));
    }

    println!("{table}");
    println!();
    println!(
        "  {} of {} result{} via {} path in {}ms",
        style(response.results.len()).bold(),
        style(response.total_count).bold(),
        if response.total_count == 1 { "" } else { "s" },
        style(response.search_path.as_str()).cyan(),
        response.execution_time_ms
    );
    println!();
}

fn search_row(hit: &SearchResult) -> Vec<Cell> {
    let mut content = preview(&hit.content, PREVIEW_CHARS);
    if !hit.related.is_empty() {
        content = format!("{content} (+{} related)", hit.related.len());
    }
    vec![
        Cell::new(format!("{:.3}", hit.relevance)).fg(Color::Yellow),
        Cell::new(content).fg(Color::White),
        Cell::new(&hit.content_type).fg(Color::Cyan),
        tier_cell(hit.tier),
        Cell::new(format!("{:?}", hit.source).to_lowercase()).fg(Color::DarkGrey),
        Cell::new(hit.timestamp.format("%Y-%m-%d").to_string()).fg(Color::DarkGrey),
    ]
}

/// List memories newest first.
pub async fn list(state: &AppState, query: ListQuery, json: bool) -> Result<()> {
    let records = state.memory_service.list(query).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&records)?);
        return Ok(());
    }

    println!();
    if records.is_empty() {
        println!("  {} No memories stored yet.", style("i").blue().bold());
        println!();
        return Ok(());
    }

    let mut table = Table::new();
    table.load_preset(presets::UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        Cell::new("Id").fg(Color::White),
        Cell::new("Content").fg(Color::White),
        Cell::new("Type").fg(Color::White),
        Cell::new("Tier").fg(Color::White),
        Cell::new("Embedded").fg(Color::White),
        Cell::new("Date").fg(Color::White),
    ]);
    for record in &records {
        table.add_row(list_row(record));
    }

    println!("{table}");
    println!();
    println!(
        "  {} memor{}",
        style(records.len()).bold(),
        if records.len() == 1 { "y" } else { "ies" }
    );
    println!();
    Ok(())
}

fn list_row(record: &MemoryRecord) -> Vec<Cell> {
    let id = record.id.to_string();
    let embedded = if record.has_embedding() {
        Cell::new("yes").fg(Color::Green)
    } else {
        Cell::new("pending").fg(Color::Yellow)
    };
    vec![
        Cell::new(&id[id.len().saturating_sub(8)..]).fg(Color::DarkGrey),
        Cell::new(preview(&record.content, PREVIEW_CHARS)).fg(Color::White),
        Cell::new(&record.content_type).fg(Color::Cyan),
        tier_cell(record.tier),
        embedded,
        Cell::new(record.created_at.format("%Y-%m-%d %H:%M").to_string()).fg(Color::DarkGrey),
    ]
}

/// Run one backfill batch, or every batch with `all`.
pub async fn backfill(
    state: &AppState,
    batch_size: Option<u32>,
    start_id: Option<String>,
    all: bool,
    json: bool,
) -> Result<()> {
    let start_id = start_id
        .as_deref()
        .map(str::parse::<MemoryId>)
        .transpose()
        .context("invalid --start-id")?;

    let spinner = ProgressBar::new_spinner();
    spinner.set_style(ProgressStyle::default_spinner().template("{spinner:.cyan} {msg}")?);
    spinner.set_message("Backfilling embeddings...");
    if !json {
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
    }

    let report = if all {
        state.memory_service.backfill_all(start_id).await
    } else {
        state
            .memory_service
            .backfill(ReconcileRequest { batch_size, start_id })
            .await
    };
    spinner.finish_and_clear();
    let report = report?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!();
    println!(
        "  {} processed {}, updated {}, failed {}",
        style("✓").green().bold(),
        style(report.processed).bold(),
        style(report.updated).green(),
        if report.failed > 0 {
            style(report.failed).red()
        } else {
            style(report.failed).dim()
        }
    );
    if let Some(last) = report.last_id
        && !all
        && report.processed > 0
    {
        println!(
            "  {} next batch: memoria backfill --start-id {}",
            style("→").dim(),
            last
        );
    }
    println!();
    Ok(())
}

fn tier_cell(tier: MemoryTier) -> Cell {
    let color = match tier {
        MemoryTier::Working => Color::Blue,
        MemoryTier::ShortTerm => Color::Magenta,
        MemoryTier::LongTerm => Color::Green,
    };
    Cell::new(tier.as_str()).fg(color)
}

/// First `max` characters, with an ellipsis when cut.
fn preview(text: &str, max: usize) -> String {
    let flat = text.replace('\n', " ");
    if flat.chars().count() <= max {
        return flat;
    }
    let cut: String = flat.chars().take(max.saturating_sub(3)).collect();
    format!("{cut}...")
}

/// Build record metadata from `key=value` pairs. Values that parse as JSON
/// (numbers, booleans, arrays) keep their type; anything else is a string.
fn metadata_map(pairs: Vec<(String, String)>) -> serde_json::Map<String, serde_json::Value> {
    pairs
        .into_iter()
        .map(|(k, v)| {
            let value = match serde_json::from_str::<serde_json::Value>(&v) {
                Ok(parsed) if !parsed.is_string() => parsed,
                _ => serde_json::Value::String(v),
            };
            (k, value)
        })
        .collect()
}
