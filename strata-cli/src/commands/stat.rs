//! Stat command - print a resource's metadata.

use std::io::Write;
use std::time::SystemTime;

use chrono::{DateTime, Utc};

use crate::error::CliError;
use crate::runner::CliRunner;

/// Print the URI, capabilities, size and modification time of `target`.
pub fn run(runner: &CliRunner, target: &str, out: &mut impl Write) -> Result<(), CliError> {
    let resource = runner.resolve(target)?;
    let exists = resource.exists();

    writeln!(out, "URI:       {}", resource.uri())?;
    writeln!(out, "Exists:    {}", yes_no(exists))?;
    writeln!(out, "Readable:  {}", yes_no(resource.supports_read()))?;
    writeln!(out, "Writable:  {}", yes_no(resource.supports_write()))?;
    writeln!(out, "Container: {}", yes_no(resource.as_container().is_some()))?;
    if let Some(path) = resource.local_path() {
        writeln!(out, "Path:      {}", path.display())?;
    }
    if exists {
        match resource.size() {
            Ok(size) => writeln!(out, "Size:      {}", size)?,
            Err(e) => writeln!(out, "Size:      unavailable ({})", e)?,
        }
        if let Some(modified) = resource.last_modified() {
            writeln!(out, "Modified:  {}", format_time(modified))?;
        }
    }
    Ok(())
}

fn yes_no(value: bool) -> &'static str {
    if value {
        "yes"
    } else {
        "no"
    }
}

fn format_time(time: SystemTime) -> String {
    DateTime::<Utc>::from(time).to_rfc3339()
}
