use std::path::Path;

use tracing::{debug, level_filters::LevelFilter, warn, Subscriber};
use tracing_appender::{
    non_blocking::WorkerGuard,
    rolling::{InitError, RollingFileAppender, Rotation},
};
use tracing_subscriber::{
    fmt::format::{Format, Writer},
    layer::SubscriberExt,
    EnvFilter, Layer,
};

pub const DEFAULT_LOG_FILE: &str = "etl_raw_transactions.log";

struct CustomTimer;

impl tracing_subscriber::fmt::time::FormatTime for CustomTimer {
    fn format_time(&self, writer: &mut Writer<'_>) -> std::fmt::Result {
        let now = chrono::Local::now();
        write!(writer, "{}", now.format("%Y-%m-%d %H:%M:%S%.3f"))
    }
}

fn event_format() -> Format<tracing_subscriber::fmt::format::Full, CustomTimer> {
    Format::default().with_timer(CustomTimer).with_level(true).with_target(false)
}

/// Keeps the file sink alive. Dropping it flushes buffered lines to disk, so hold it
/// until the process is about to exit.
#[must_use = "dropping the guard closes the log file sink"]
pub struct LoggerGuard {
    _file_guard: Option<WorkerGuard>,
}

/// Installs a subscriber writing every event to stdout and appending it to `log_file`.
///
/// When `log_file` can not be opened the run still logs to the console, and the reason
/// is reported as the first warning.
pub fn setup_logger(log_level: LevelFilter, log_file: &Path) -> LoggerGuard {
    let (subscriber, guard, open_error) = build_subscriber(log_level, log_file);

    if tracing::subscriber::set_global_default(subscriber).is_err() {
        debug!("Logger has already been set up, continuing...");
    }

    if let Some(e) = open_error {
        warn!("Could not open log file {}, logging to console only: {}", log_file.display(), e);
    }

    guard
}

fn build_subscriber(
    log_level: LevelFilter,
    log_file: &Path,
) -> (impl Subscriber + Send + Sync + 'static, LoggerGuard, Option<InitError>) {
    let (file_sink, open_error) = match open_log_file(log_file) {
        Ok(appender) => (Some(tracing_appender::non_blocking(appender)), None),
        Err(e) => (None, Some(e)),
    };
    let (file_writer, file_guard) = file_sink.unzip();

    let console_layer = tracing_subscriber::fmt::layer()
        .event_format(event_format())
        .with_writer(std::io::stdout)
        .with_filter(EnvFilter::from_default_env().add_directive(log_level.into()));

    let file_layer = file_writer.map(|writer| {
        tracing_subscriber::fmt::layer()
            .event_format(event_format())
            .with_writer(writer)
            .with_ansi(false)
            .with_filter(EnvFilter::from_default_env().add_directive(log_level.into()))
    });

    let subscriber = tracing_subscriber::registry().with(console_layer).with(file_layer);

    (subscriber, LoggerGuard { _file_guard: file_guard }, open_error)
}

/// Opens `log_file` for appending, creating it when missing.
fn open_log_file(log_file: &Path) -> Result<RollingFileAppender, InitError> {
    let directory = match log_file.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let file_name = log_file.file_name().unwrap_or(log_file.as_os_str()).to_string_lossy();

    RollingFileAppender::builder()
        .rotation(Rotation::NEVER)
        .filename_prefix(file_name.into_owned())
        .build(directory)
}

pub fn setup_info_logger() -> LoggerGuard {
    setup_logger(LevelFilter::INFO, Path::new(DEFAULT_LOG_FILE))
}

/// Collects formatted events in memory so tests can assert on what a run logged.
#[cfg(test)]
pub(crate) mod capture {
    use std::{
        io,
        sync::{Arc, Mutex},
    };

    use tracing::subscriber::DefaultGuard;
    use tracing_subscriber::fmt::MakeWriter;

    use super::*;

    #[derive(Clone, Default)]
    pub struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

    impl CapturedLogs {
        /// Routes events from the current thread into a fresh buffer until the guard is
        /// dropped. `#[tokio::test]` runs on the current thread, so async code is covered.
        pub fn install() -> (CapturedLogs, DefaultGuard) {
            let logs = CapturedLogs::default();
            let subscriber = tracing_subscriber::fmt()
                .event_format(event_format())
                .with_writer(logs.clone())
                .with_ansi(false)
                .with_max_level(LevelFilter::INFO)
                .finish();
            let guard = tracing::subscriber::set_default(subscriber);
            (logs, guard)
        }

        pub fn contents(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
        }

        pub fn count(&self, needle: &str) -> usize {
            self.contents().matches(needle).count()
        }
    }

    impl io::Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl<'a> MakeWriter<'a> for CapturedLogs {
        type Writer = CapturedLogs;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }
}
