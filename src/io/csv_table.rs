//! Append-only statistics tables.

use crate::types::AgriResult;
use std::fs::OpenOptions;
use std::path::Path;

/// A row that knows its own column layout
pub trait StatsRecord {
    fn columns(&self) -> Vec<String>;
    fn values(&self) -> Vec<String>;
}

/// Append rows to a CSV file; the header is written only when the file is new or empty
pub fn append_records<R: StatsRecord>(path: &Path, records: &[R]) -> AgriResult<()> {
    let Some(first) = records.first() else {
        return Ok(());
    };

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let needs_header = std::fs::metadata(path).map(|m| m.len() == 0).unwrap_or(true);
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    let mut writer = csv::WriterBuilder::new().has_headers(false).from_writer(file);

    if needs_header {
        writer.write_record(first.columns())?;
    } else {
        let existing = existing_header(path)?;
        if existing != first.columns() {
            log::warn!(
                "Columns of {} differ from the rows being appended",
                path.display()
            );
        }
    }

    for record in records {
        writer.write_record(record.values())?;
    }
    writer.flush()?;

    log::info!("Appended {} row(s) to {}", records.len(), path.display());
    Ok(())
}

fn existing_header(path: &Path) -> AgriResult<Vec<String>> {
    let mut reader = csv::Reader::from_path(path)?;
    Ok(reader.headers()?.iter().map(str::to_string).collect())
}
