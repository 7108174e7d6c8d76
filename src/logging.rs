//! Logger installation shared by the command-line tools.
//!
//! Every line carries the tool tag, e.g.
//! `2024-05-01 10:15:02 [INFO] [FIND_IDS] Saved 12 scene UUIDs`.

use crate::types::{AgriError, AgriResult};
use chrono::Local;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;

/// Open a log file for appending, creating parent directories
fn open_append(path: &Path) -> AgriResult<File> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    Ok(OpenOptions::new().create(true).append(true).open(path)?)
}

fn format_line(tag: &str, record: &log::Record) -> String {
    format!(
        "{} [{}] [{}] {}",
        Local::now().format("%Y-%m-%d %H:%M:%S"),
        record.level(),
        tag,
        record.args()
    )
}

/// Writes every log line to stderr and to an optional file
struct TeeWriter {
    file: Option<File>,
}

impl Write for TeeWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        std::io::stderr().write_all(buf)?;
        if let Some(file) = self.file.as_mut() {
            file.write_all(buf)?;
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        std::io::stderr().flush()?;
        if let Some(file) = self.file.as_mut() {
            file.flush()?;
        }
        Ok(())
    }
}

/// env_logger wrapper that additionally copies error records to a dedicated file
struct PipelineLogger {
    inner: env_logger::Logger,
    tag: &'static str,
    error_sink: Option<Mutex<File>>,
}

impl log::Log for PipelineLogger {
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        self.inner.enabled(metadata)
    }

    fn log(&self, record: &log::Record) {
        if !self.inner.matches(record) {
            return;
        }
        self.inner.log(record);

        if record.level() == log::Level::Error {
            if let Some(sink) = &self.error_sink {
                if let Ok(mut file) = sink.lock() {
                    let _ = writeln!(file, "{}", format_line(self.tag, record));
                }
            }
        }
    }

    fn flush(&self) {
        self.inner.flush();
        if let Some(sink) = &self.error_sink {
            if let Ok(mut file) = sink.lock() {
                let _ = file.flush();
            }
        }
    }
}

/// Install the process-wide logger.
///
/// Level comes from `RUST_LOG` (default `info`). `log_file` receives a copy of
/// every line, `error_file` only error records.
pub fn init(tag: &'static str, log_file: Option<&Path>, error_file: Option<&Path>) -> AgriResult<()> {
    let file = log_file.map(open_append).transpose()?;
    let error_sink = error_file.map(open_append).transpose()?.map(Mutex::new);

    let inner = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format(move |buf, record| writeln!(buf, "{}", format_line(tag, record)))
        .target(env_logger::Target::Pipe(Box::new(TeeWriter { file })))
        .build();

    let max_level = inner.filter();
    log::set_boxed_logger(Box::new(PipelineLogger {
        inner,
        tag,
        error_sink,
    }))
    .map_err(|e| AgriError::Processing(format!("Logger already initialised: {}", e)))?;
    log::set_max_level(max_level);

    Ok(())
}

/// Install logging for a tool, falling back to console-only output when the
/// log file cannot be opened
pub fn init_or_console(tag: &'static str, log_file: Option<&Path>, error_file: Option<&Path>) {
    if let Err(e) = init(tag, log_file, error_file) {
        eprintln!("Failed to set up logging: {}", e);
        let _ = init(tag, None, None);
    }
}
