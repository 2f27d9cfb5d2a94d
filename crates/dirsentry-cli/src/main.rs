//! dirsentry: watch a directory from the terminal.
//!
//! Thin binary entry point. All watching logic lives in `dirsentry-core`;
//! this just wires a watch request to stdout.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;

use dirsentry_core::{Event, WatchRequest};

#[derive(Parser)]
#[command(name = "dirsentry", about = "Watch a directory and print change events")]
struct Args {
    /// Directory to watch.
    path: PathBuf,

    /// Watch the whole subtree, not just the top level.
    #[arg(short, long)]
    recursive: bool,

    /// Event delivery interval in milliseconds.
    #[arg(long, default_value_t = 250)]
    interval: u64,

    /// Report per-interval event counts at this cadence in milliseconds.
    #[arg(long)]
    stats_interval: Option<u64>,

    /// Stop after this many seconds; runs until killed when omitted.
    #[arg(long)]
    duration: Option<u64>,

    /// Poll for events instead of registering a callback.
    #[arg(long)]
    poll: bool,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let args = Args::parse();
    let path = args.path.to_string_lossy().into_owned();

    let mut request = WatchRequest::new(path.clone(), args.recursive);
    if !args.poll {
        request = request.with_events(Arc::new(print_event), args.interval);
    }
    if let Some(stats_interval) = args.stats_interval {
        request = request.with_statistics(Arc::new(print_stats), stats_interval);
    }

    let id = dirsentry_core::start(request).with_context(|| format!("cannot watch {path}"))?;
    tracing::info!(id, recursive = args.recursive, "watching {path}");

    let deadline = args
        .duration
        .map(|seconds| std::time::Instant::now() + Duration::from_secs(seconds));

    if args.poll {
        // Pull events ourselves at the delivery cadence.
        let mut events = Vec::new();
        loop {
            if deadline.is_some_and(|deadline| std::time::Instant::now() >= deadline) {
                break;
            }
            std::thread::sleep(Duration::from_millis(args.interval.max(1)));
            events.clear();
            dirsentry_core::get_events(id, &mut events);
            for event in &events {
                print_event(id, event);
            }
        }
    } else {
        // Sleep out the requested window; "forever" is just a very long one.
        std::thread::sleep(Duration::from_secs(args.duration.unwrap_or(u64::MAX)));
    }

    dirsentry_core::stop(id);
    Ok(())
}

fn print_event(_id: i64, event: &Event) {
    println!("{event}");
}

fn print_stats(_id: i64, elapsed_ms: f64, events: u64) {
    tracing::info!("{events} events in the last {elapsed_ms:.0} ms");
}
