//! Cat command - stream a resource's content to stdout.

use std::io::{self, Write};

use crate::error::CliError;
use crate::runner::CliRunner;

/// Copy the content of `target` to `out`.
pub fn run(runner: &CliRunner, target: &str, out: &mut impl Write) -> Result<(), CliError> {
    let resource = runner.resolve(target)?;
    let mut reader = resource.open_read()?;
    let copied = io::copy(&mut reader, out).map_err(|e| strata::ResourceError::io(target, e))?;
    out.flush()?;
    tracing::debug!(uri = %resource.uri(), bytes = copied, "Streamed resource");
    Ok(())
}
