mod reader;
mod record;

use std::{
    io,
    path::{Path, PathBuf},
    time::{Duration, Instant},
};

pub use reader::RawLines;
pub use record::RawRecord;
use tokio::{
    fs::File,
    io::{AsyncBufRead, BufReader},
};
use tracing::{error, info};

use crate::database::store::RawRecordStore;

/// Lines per transaction.
pub const BATCH_SIZE: u64 = 100;

const SUMMARY_RULE: &str =
    "======================================================================";

#[derive(thiserror::Error, Debug)]
pub enum LoadError {
    #[error("Source file not found: {0}")]
    SourceNotFound(PathBuf),

    #[error("Could not read source file {path}: {source}")]
    SourceUnreadable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Reading stopped part way through; the pending batch was rolled back.
    #[error("Reading line {line} failed: {source}")]
    ReadFailed {
        line: u64,
        #[source]
        source: io::Error,
    },

    /// The batch ending at `line` could not be committed; it was rolled back.
    #[error("Commit of batch ending at line {line} failed: {source}")]
    CommitFailed {
        line: u64,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct LoadSummary {
    pub total_lines: u64,
    pub successful_inserts: u64,
    pub failed_inserts: u64,
}

impl LoadSummary {
    /// Percentage of lines inserted, `None` when nothing was read.
    pub fn success_rate(&self) -> Option<f64> {
        if self.total_lines == 0 {
            return None;
        }
        Some(self.successful_inserts as f64 / self.total_lines as f64 * 100.0)
    }

    pub fn success_rate_display(&self) -> String {
        match self.success_rate() {
            Some(rate) => format!("{:.2}%", rate),
            None => "n/a".to_string(),
        }
    }

    /// Lines read per second over `elapsed`, `None` when no time was measured.
    pub fn throughput(&self, elapsed: Duration) -> Option<f64> {
        let seconds = elapsed.as_secs_f64();
        if seconds == 0.0 {
            return None;
        }
        Some(self.total_lines as f64 / seconds)
    }

    fn log_progress(&self) {
        info!(
            "Processed {} lines ({} succeeded, {} failed)",
            self.total_lines, self.successful_inserts, self.failed_inserts
        );
    }

    fn log_report(&self, elapsed: Duration) {
        info!("{}", SUMMARY_RULE);
        info!("RAW LOAD SUMMARY:");
        info!("Total lines processed: {}", self.total_lines);
        info!("Successful inserts: {}", self.successful_inserts);
        info!("Failed inserts: {}", self.failed_inserts);
        info!("Success rate: {}", self.success_rate_display());
        match self.throughput(elapsed) {
            Some(rate) => info!("Load rate: {:.0} lines/s in {:.3}s", rate, elapsed.as_secs_f64()),
            None => info!("Load rate: n/a"),
        }
        info!("{}", SUMMARY_RULE);
    }
}

/// Appends one raw record for `csv_line`. `line_number` only feeds the failure log.
///
/// A rejected row is logged and reported as `false`; the store's transaction stays open
/// for the next line.
pub async fn insert_raw_line<S>(store: &mut S, csv_line: &str, line_number: u64) -> bool
where
    S: RawRecordStore,
{
    let record = RawRecord::from_line(csv_line);
    match store.insert_raw_record(&record).await {
        Ok(()) => true,
        Err(e) => {
            error!("Failed to insert line {}: {}", line_number, e);
            false
        }
    }
}

/// Streams the file at `path` into the store, committing every [`BATCH_SIZE`] lines.
pub async fn load_file_to_raw<S>(path: &Path, store: &mut S) -> Result<LoadSummary, LoadError>
where
    S: RawRecordStore,
{
    info!("Starting load from file: {}", path.display());

    let file = match File::open(path).await {
        Ok(file) => file,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            error!("File not found: {}", path.display());
            return Err(LoadError::SourceNotFound(path.to_path_buf()));
        }
        Err(e) => {
            error!("Error reading source file: {}", e);
            return Err(LoadError::SourceUnreadable { path: path.to_path_buf(), source: e });
        }
    };

    let is_dir = file.metadata().await.map(|metadata| metadata.is_dir());
    match is_dir {
        Ok(false) => {}
        Ok(true) => {
            error!("Error reading source file: {} is a directory", path.display());
            return Err(LoadError::SourceUnreadable {
                path: path.to_path_buf(),
                source: io::Error::other("is a directory"),
            });
        }
        Err(e) => {
            error!("Error reading source file: {}", e);
            return Err(LoadError::SourceUnreadable { path: path.to_path_buf(), source: e });
        }
    }

    load_lines_to_raw(BufReader::new(file), store).await
}

/// Streams any line source into the store. On an unexpected failure the uncommitted
/// batch is rolled back before the error is returned; batches already committed stay.
pub async fn load_lines_to_raw<R, S>(reader: R, store: &mut S) -> Result<LoadSummary, LoadError>
where
    R: AsyncBufRead + Unpin,
    S: RawRecordStore,
{
    let started = Instant::now();
    let mut summary = LoadSummary::default();
    let mut lines = RawLines::new(reader);

    if let Err(err) = stream_lines(&mut lines, store, &mut summary).await {
        error!("Unexpected error during load: {}", err);
        if let Err(rollback_err) = store.rollback().await {
            error!("Rolling back the pending batch failed: {}", rollback_err);
        }
        return Err(err);
    }

    summary.log_report(started.elapsed());

    Ok(summary)
}

async fn stream_lines<R, S>(
    lines: &mut RawLines<R>,
    store: &mut S,
    summary: &mut LoadSummary,
) -> Result<(), LoadError>
where
    R: AsyncBufRead + Unpin,
    S: RawRecordStore,
{
    loop {
        let (line_number, line) = match lines.next_line().await {
            Ok(Some(next)) => next,
            Ok(None) => break,
            Err(source) => {
                return Err(LoadError::ReadFailed { line: summary.total_lines + 1, source })
            }
        };

        summary.total_lines += 1;
        if insert_raw_line(store, &line, line_number).await {
            summary.successful_inserts += 1;
        } else {
            summary.failed_inserts += 1;
        }

        if summary.total_lines % BATCH_SIZE == 0 {
            commit_batch(store, summary.total_lines).await?;
            summary.log_progress();
        }
    }

    // remainder since the last full batch, possibly empty
    commit_batch(store, summary.total_lines).await
}

async fn commit_batch<S: RawRecordStore>(store: &mut S, line: u64) -> Result<(), LoadError> {
    store.commit().await.map_err(|e| LoadError::CommitFailed { line, source: Box::new(e) })
}
