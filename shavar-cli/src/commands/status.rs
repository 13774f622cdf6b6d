//! Show sync status.

use anyhow::{Context, Result};
use serde::Serialize;
use shavar_client::unix_now;
use shavar_core::range;
use shavar_store::ChunkStore;
use shavar_types::{ListName, RetrySchedule};

/// Everything the status command reports.
#[derive(Debug, Serialize)]
pub struct StatusReport {
    /// Persisted retry schedule.
    pub schedule: RetrySchedule,
    /// Held chunks per configured list.
    pub lists: Vec<ListStatus>,
    /// Rows in the add table.
    pub add_entries: u64,
    /// Rows in the sub table.
    pub sub_entries: u64,
    /// Rows in the full-hash table.
    pub full_hashes: u64,
}

/// Held chunks for one list, in range notation.
#[derive(Debug, Serialize)]
pub struct ListStatus {
    /// List name.
    pub name: String,
    /// Add chunk ranges, e.g. `1-3,5`.
    pub adds: String,
    /// Sub chunk ranges.
    pub subs: String,
}

/// Read the status from the store.
pub async fn collect<S: ChunkStore + ?Sized>(
    store: &S,
    lists: &[ListName],
) -> Result<StatusReport> {
    let schedule = store
        .read_retry_schedule()
        .await
        .context("Failed to read retry schedule")?;

    let mut list_status = Vec::with_capacity(lists.len());
    for list in lists {
        let adds = store.distinct_add_chunk_numbers(list).await?;
        let subs = store.distinct_sub_chunk_numbers(list).await?;
        list_status.push(ListStatus {
            name: list.to_string(),
            adds: range::encode(&adds),
            subs: range::encode(&subs),
        });
    }

    let stats = store.stats().await?;
    Ok(StatusReport {
        schedule,
        lists: list_status,
        add_entries: stats.add_entries,
        sub_entries: stats.sub_entries,
        full_hashes: stats.full_hashes,
    })
}

/// Run the status command.
pub async fn run<S: ChunkStore + ?Sized>(store: &S, lists: &[ListName], json: bool) -> Result<()> {
    let report = collect(store, lists).await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("{}", render(&report, unix_now()));
    }
    Ok(())
}

/// Human-readable status text.
fn render(report: &StatusReport, now: u64) -> String {
    let schedule = &report.schedule;
    let mut out = String::new();

    out.push_str("=== shavar-sync status ===\n\n");
    out.push_str("Schedule:\n");
    out.push_str(&format!(
        "  Last success: {}\n",
        format_timestamp(schedule.last_success, now)
    ));
    out.push_str(&format!(
        "  Last attempt: {}\n",
        format_timestamp(schedule.last_attempt, now)
    ));
    out.push_str(&format!("  Errors:       {}\n", schedule.error_count));
    match schedule.wait_secs(now) {
        Some(wait) => out.push_str(&format!("  Next update:  in {}\n", format_duration(wait))),
        None => out.push_str("  Next update:  now\n"),
    }

    out.push_str("\nLists:\n");
    for list in &report.lists {
        out.push_str(&format!("  {}\n", list.name));
        out.push_str(&format!("    adds: {}\n", or_none(&list.adds)));
        out.push_str(&format!("    subs: {}\n", or_none(&list.subs)));
    }

    out.push_str("\nStore:\n");
    out.push_str(&format!("  Add entries: {}\n", report.add_entries));
    out.push_str(&format!("  Sub entries: {}\n", report.sub_entries));
    out.push_str(&format!("  Full hashes: {}\n", report.full_hashes));
    out
}

fn or_none(ranges: &str) -> &str {
    if ranges.is_empty() {
        "(none)"
    } else {
        ranges
    }
}

/// Format a Unix timestamp relative to `now`.
fn format_timestamp(ts: u64, now: u64) -> String {
    if ts == 0 {
        return "never".to_string();
    }
    match now.checked_sub(ts) {
        Some(diff) if diff < 60 => "just now".to_string(),
        Some(diff) => format!("{} ago", format_duration(diff)),
        None => format!("in {}", format_duration(ts - now)),
    }
}

/// Format a span of seconds at its coarsest useful unit.
pub fn format_duration(secs: u64) -> String {
    if secs < 60 {
        format!("{} seconds", secs)
    } else if secs < 3600 {
        format!("{} minutes", secs / 60)
    } else if secs < 86400 {
        format!("{} hours", secs / 3600)
    } else {
        format!("{} days", secs / 86400)
    }
}
