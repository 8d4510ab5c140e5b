//! Result and failure files written at the end of a run.

use anyhow::{Context, Result};
use serde::Serialize;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use tracing::info;

use crate::models::{Failure, ResultEntry};

/// Serialize `value` as pretty JSON with a four-space indent
pub fn to_pretty_json<T: Serialize + ?Sized, W: Write>(writer: W, value: &T) -> Result<()> {
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut serializer = serde_json::Serializer::with_formatter(writer, formatter);
    value.serialize(&mut serializer)?;
    Ok(())
}

pub fn write_results(path: &Path, entries: &[ResultEntry]) -> Result<()> {
    let file = File::create(path)
        .with_context(|| format!("Failed to create result file {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    to_pretty_json(&mut writer, entries)
        .with_context(|| format!("Failed to write results to {}", path.display()))?;
    writer.flush()?;
    info!("Wrote {} entries to {}", entries.len(), path.display());
    Ok(())
}

/// One failure message per line
pub fn write_failures(path: &Path, failures: &[Failure]) -> Result<()> {
    let file = File::create(path)
        .with_context(|| format!("Failed to create failure log {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    for failure in failures {
        writeln!(writer, "{}", failure)?;
    }
    writer.flush()?;
    info!("Wrote {} failures to {}", failures.len(), path.display());
    Ok(())
}
