//! Ls command - list the children of a container resource.

use std::io::Write;

use strata::ResourceError;

use crate::error::CliError;
use crate::runner::CliRunner;

/// List the children of `target`, one per line.
///
/// With `long`, each line also carries a kind marker (`d` or `-`) and the size.
pub fn run(
    runner: &CliRunner,
    target: &str,
    long: bool,
    out: &mut impl Write,
) -> Result<(), CliError> {
    let resource = runner.resolve(target)?;
    let container = resource
        .as_container()
        .ok_or_else(|| ResourceError::unsupported("list", resource.uri().as_str()))?;

    for child in container.children()? {
        if long {
            let kind = if child.as_container().is_some() { 'd' } else { '-' };
            let size = child.size().unwrap_or(0);
            writeln!(out, "{} {:>10} {}", kind, size, child.name())?;
        } else {
            writeln!(out, "{}", child.name())?;
        }
    }
    Ok(())
}
