//! JSONL session report writer with daily file rotation.

use std::{
    collections::HashMap,
    fs::{self, OpenOptions},
    io::{BufRead, BufReader, BufWriter, Write},
    path::{Path, PathBuf},
    sync::Mutex,
};

use chrono::{NaiveDate, Utc};
use tracing::warn;

use super::{ReportLine, SessionReporter};
use crate::models::{SessionResult, WatcherSnapshot};
use crate::{AppError, Result};

/// Internal state protected by a mutex.
struct WriterState {
    current_date: NaiveDate,
    writer: BufWriter<fs::File>,
}

/// A daily-rotating, append-only JSONL report writer.
///
/// Appends to `<report_dir>/report-YYYY-MM-DD.jsonl`. Files are only ever
/// opened in append mode, so records of earlier sessions are never touched.
pub struct JsonlReportWriter {
    report_dir: PathBuf,
    state: Mutex<Option<WriterState>>,
}

impl JsonlReportWriter {
    /// Construct a writer that stores reports in `report_dir`.
    ///
    /// Creates `report_dir` and all parent directories if they do not exist.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Io`] if the directory cannot be created.
    pub fn new(report_dir: PathBuf) -> Result<Self> {
        fs::create_dir_all(&report_dir).map_err(|e| {
            AppError::Io(format!(
                "failed to create report directory {}: {e}",
                report_dir.display()
            ))
        })?;
        Ok(Self {
            report_dir,
            state: Mutex::new(None),
        })
    }

    /// Path of the report file for `date`.
    #[must_use]
    pub fn path_for_date(&self, date: NaiveDate) -> PathBuf {
        self.report_dir.join(format!("report-{date}.jsonl"))
    }

    fn open_for_date(&self, date: NaiveDate) -> Result<BufWriter<fs::File>> {
        let path = self.path_for_date(date);
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| AppError::Io(format!("failed to open report {}: {e}", path.display())))?;
        Ok(BufWriter::new(file))
    }
}

impl SessionReporter for JsonlReportWriter {
    fn record(&self, result: &SessionResult) -> Result<()> {
        let now = Utc::now();
        let today = now.date_naive();

        let mut guard = self
            .state
            .lock()
            .map_err(|_| AppError::Io("report writer mutex poisoned".to_string()))?;

        let needs_rotation = guard.as_ref().is_none_or(|s| s.current_date != today);

        if needs_rotation {
            let new_writer = self.open_for_date(today)?;
            *guard = Some(WriterState {
                current_date: today,
                writer: new_writer,
            });
        }

        if let Some(state) = guard.as_mut() {
            for line in ReportLine::from_result(result, now) {
                let json = serde_json::to_string(&line)
                    .map_err(|e| AppError::Io(format!("failed to serialize report line: {e}")))?;
                if let Err(e) = writeln!(state.writer, "{json}") {
                    warn!("failed to write report line: {e}");
                    return Err(AppError::Io(format!("report write failed: {e}")));
                }
            }
            if let Err(e) = state.writer.flush() {
                warn!("failed to flush report: {e}");
                return Err(AppError::Io(format!("report flush failed: {e}")));
            }
        }

        Ok(())
    }
}

/// Parse a report file back into session results, in file order.
///
/// Watcher lines are grouped under the verdict line with the same session
/// id. Watcher lines with no verdict (an interrupted write) are skipped.
///
/// # Errors
///
/// Returns [`AppError::Io`] if the file cannot be read or a line is not a
/// valid report line.
pub fn read_report(path: impl AsRef<Path>) -> Result<Vec<SessionResult>> {
    let path = path.as_ref();
    let file = fs::File::open(path)
        .map_err(|e| AppError::Io(format!("failed to open report {}: {e}", path.display())))?;

    let mut pending: HashMap<String, Vec<WatcherSnapshot>> = HashMap::new();
    let mut results = Vec::new();

    for (number, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let parsed: ReportLine = serde_json::from_str(trimmed).map_err(|e| {
            AppError::Io(format!(
                "malformed report line {} in {}: {e}",
                number + 1,
                path.display()
            ))
        })?;

        match parsed {
            ReportLine::Watcher {
                session_id,
                watcher,
                ..
            } => pending.entry(session_id).or_default().push(watcher),
            ReportLine::Verdict {
                session_id,
                session_name,
                started_at,
                ended_at,
                elapsed_ms,
                state,
                verdict,
                hard_timeout,
                ..
            } => {
                let watchers = pending.remove(&session_id).unwrap_or_default();
                results.push(SessionResult {
                    session_id,
                    session_name,
                    started_at,
                    ended_at,
                    elapsed_ms,
                    state,
                    verdict,
                    hard_timeout,
                    watchers,
                });
            }
        }
    }

    for (session_id, watchers) in &pending {
        warn!(
            session_id,
            watchers = watchers.len(),
            "report has watcher lines without a verdict"
        );
    }

    Ok(results)
}
