// src/schema/write.rs

use anyhow::{Context, Result};
use std::{fs, path::Path};
use tracing::info;

use super::ColumnSchema;
use crate::extract::GazetteRow;

/// Write `rows` as comma-separated UTF-8 with `schema` as the header row.
///
/// - missing fields are written as empty strings
/// - values holding a comma, quote or newline are quoted
/// - the file is written next to `path` first, then renamed over it
pub fn write_csv<P: AsRef<Path>>(path: P, schema: &ColumnSchema, rows: &[GazetteRow]) -> Result<()> {
    let path = path.as_ref();
    let dir = match path.parent() {
        Some(d) if !d.as_os_str().is_empty() => d,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir).with_context(|| format!("creating {:?}", dir))?;

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output.csv".to_string());
    let tmp_path = dir.join(format!(".{}.tmp", file_name));

    {
        let mut writer = csv::WriterBuilder::new()
            .terminator(csv::Terminator::Any(b'\n'))
            .from_path(&tmp_path)
            .with_context(|| format!("creating {:?}", tmp_path))?;
        writer
            .write_record(schema.columns())
            .context("writing CSV header")?;
        for (i, row) in rows.iter().enumerate() {
            writer
                .write_record(schema.project(row))
                .with_context(|| format!("writing CSV row {}", i + 1))?;
        }
        writer.flush().context("flushing CSV")?;
    }

    fs::rename(&tmp_path, path)
        .with_context(|| format!("renaming {:?} -> {:?}", tmp_path, path))?;

    info!(
        path = %path.display(),
        columns = schema.len(),
        rows = rows.len(),
        "CSV written"
    );
    Ok(())
}
