//! Watch command - report modifications to a resource until interrupted.

use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use chrono::{DateTime, Utc};
use strata::watch::{ResourceWatcher, WatchOutcome};
use strata::Resource;

use crate::error::CliError;
use crate::runner::CliRunner;

/// How often the shutdown flag is polled between watcher checks.
const SHUTDOWN_POLL: Duration = Duration::from_millis(100);

/// Arguments for the watch command.
pub struct WatchArgs {
    pub target: String,
    pub interval_ms: Option<u64>,
}

/// Watch `target` until Ctrl-C, printing a line per detected change.
pub fn run(runner: &CliRunner, args: WatchArgs, out: &mut impl Write) -> Result<(), CliError> {
    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_clone = shutdown.clone();

    ctrlc::set_handler(move || {
        shutdown_clone.store(true, Ordering::SeqCst);
    })
    .map_err(|e| CliError::Config(format!("Failed to set signal handler: {}", e)))?;

    let poll_interval = args
        .interval_ms
        .map(Duration::from_millis)
        .unwrap_or(runner.config().poll_interval);

    watch_until(runner, &args.target, poll_interval, &shutdown, out)
}

/// Poll `target` every `poll_interval` until `shutdown` is set.
pub fn watch_until(
    runner: &CliRunner,
    target: &str,
    poll_interval: Duration,
    shutdown: &AtomicBool,
    out: &mut impl Write,
) -> Result<(), CliError> {
    let resource = runner.resolve(target)?;
    let (tx, rx) = mpsc::channel::<String>();

    let handler = move |changed: &dyn Resource| {
        // The receiver outlives the watcher.
        let _ = tx.send(describe(changed));
        WatchOutcome::handled()
    };
    let watcher = ResourceWatcher::new(resource, handler).with_poll_interval(poll_interval);

    writeln!(out, "Watching {} (Ctrl-C to stop)", watcher.resource().uri())?;
    out.flush()?;

    while !shutdown.load(Ordering::SeqCst) {
        watcher.check();
        for line in rx.try_iter() {
            writeln!(out, "{}", line)?;
        }
        out.flush()?;
        std::thread::sleep(SHUTDOWN_POLL.min(poll_interval.max(Duration::from_millis(1))));
    }
    Ok(())
}

fn describe(resource: &dyn Resource) -> String {
    match resource.last_modified() {
        Some(time) if resource.exists() => {
            format!("changed  {}  {}", format_time(time), resource.uri())
        }
        _ => format!("missing  {}", resource.uri()),
    }
}

fn format_time(time: SystemTime) -> String {
    DateTime::<Utc>::from(time).to_rfc3339()
}
