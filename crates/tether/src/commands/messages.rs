//! Messages command - fetch, and optionally follow, a room's recent history.

use std::collections::HashSet;
use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, Local, TimeZone};
use clap::Args;
use console::Style;
use serde_json::Value;

use tether_client::ApiRequest;

use super::{Context, Stack};

/// Extra wait past the breaker's open timeout, which must be strictly exceeded.
const PROBE_MARGIN: Duration = Duration::from_millis(100);

/// Arguments for the messages command.
#[derive(Args, Debug)]
pub struct MessagesArgs {
    /// Room id, e.g. !abc123:example.org
    pub room_id: String,

    /// Number of most recent events to fetch
    #[arg(short, long, default_value_t = 20)]
    pub limit: u32,

    /// Keep polling for new events until Ctrl+C
    #[arg(short, long)]
    pub follow: bool,

    /// Seconds between polls in follow mode
    #[arg(long, default_value_t = 5)]
    pub interval: u64,
}

/// Run the messages command.
pub async fn run(args: MessagesArgs, ctx: &Context) -> Result<()> {
    let stack = Stack::build(ctx)?;
    let result = fetch_loop(&stack, &args, ctx).await;
    stack.connection.disconnect().await;
    result
}

async fn fetch_loop(stack: &Stack, args: &MessagesArgs, ctx: &Context) -> Result<()> {
    stack.connection.connect().await?;

    let request = ApiRequest::room_messages(&args.room_id, args.limit);
    let interval = Duration::from_secs(args.interval.max(1));
    let mut seen: HashSet<String> = HashSet::new();

    loop {
        let response = tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            response = stack.handler.call(&request) => response,
        };

        let wait = match response {
            Ok(body) => {
                seen = print_new_events(&body, &seen, ctx.json_output);
                interval
            }
            Err(e) if !args.follow => return Err(e.into()),
            Err(e) if e.is_circuit_open() => {
                let remaining = stack.breaker.remaining_open().unwrap_or(interval);
                tracing::warn!(
                    room_id = %args.room_id,
                    retry_in_secs = remaining.as_secs(),
                    "Circuit open, pausing polls"
                );
                remaining.saturating_add(PROBE_MARGIN)
            }
            Err(e) => {
                tracing::warn!(
                    room_id = %args.room_id,
                    outcome = e.outcome().as_str(),
                    error = %e,
                    "Poll failed"
                );
                interval
            }
        };

        if !args.follow {
            break;
        }
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            _ = tokio::time::sleep(wait) => {}
        }
    }

    Ok(())
}

/// Print events from `body` not present in `previous`, oldest first.
///
/// Returns the event ids of this response. Only the latest window is
/// remembered; more than `limit` events between polls are not all shown.
fn print_new_events(body: &Value, previous: &HashSet<String>, json: bool) -> HashSet<String> {
    let chunk = body
        .get("chunk")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();

    let mut current = HashSet::with_capacity(chunk.len());
    // The server returns newest first.
    for event in chunk.iter().rev() {
        let id = event.get("event_id").and_then(Value::as_str);
        if let Some(id) = id {
            current.insert(id.to_string());
            if previous.contains(id) {
                continue;
            }
        }
        if json {
            println!("{}", event);
        } else {
            println!("{}", format_event(event));
        }
    }
    current
}

fn format_event(event: &Value) -> String {
    let dim = Style::new().dim();
    let bold = Style::new().bold();

    let when = event
        .get("origin_server_ts")
        .and_then(Value::as_i64)
        .and_then(|ms| Local.timestamp_millis_opt(ms).single())
        .map(|t: DateTime<Local>| t.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| "-".repeat(19));
    let sender = event.get("sender").and_then(Value::as_str).unwrap_or("?");
    let kind = event.get("type").and_then(Value::as_str).unwrap_or("?");

    match event.pointer("/content/body").and_then(Value::as_str) {
        Some(body) if kind == "m.room.message" => {
            format!("{} {} {}", dim.apply_to(when), bold.apply_to(sender), body)
        }
        _ => format!(
            "{} {} {}",
            dim.apply_to(when),
            bold.apply_to(sender),
            dim.apply_to(format!("[{}]", kind))
        ),
    }
}
