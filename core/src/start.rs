use std::{future::Future, path::PathBuf};

use tracing::{error, info, warn};

use crate::{
    config::{ConfigError, LoaderConfig, REQUIRED_KEYS},
    database::{
        postgres::client::{PostgresConnectionError, PostgresRawStore},
        store::RawRecordStore,
    },
    loader::{load_file_to_raw, LoadError, LoadSummary},
};

const BANNER_RULE: &str = "======================================================================";

/// Why a run stopped before any line was loaded.
#[derive(thiserror::Error, Debug)]
pub enum AbortReason {
    #[error("{0}")]
    Configuration(ConfigError),

    #[error("Source file does not exist: {0}")]
    SourceNotFound(PathBuf),

    #[error("{0}")]
    Connection(PostgresConnectionError),
}

#[derive(Debug)]
pub enum RunOutcome {
    /// Every line was inserted.
    Completed(LoadSummary),
    /// The file was streamed to the end but some lines were rejected.
    CompletedWithFailures(LoadSummary),
    Aborted(AbortReason),
    /// Loading started and stopped on a fatal error.
    LoadFailed(LoadError),
}

impl RunOutcome {
    pub fn exit_code(&self) -> i32 {
        match self {
            RunOutcome::Completed(_) => 0,
            RunOutcome::Aborted(_) => 1,
            RunOutcome::CompletedWithFailures(_) | RunOutcome::LoadFailed(_) => 2,
        }
    }
}

/// Runs one raw load against PostgreSQL: validate the configuration, check the source
/// file, connect, stream the file, close the connection.
pub async fn start_raw_load(config: Result<LoaderConfig, ConfigError>) -> RunOutcome {
    start_raw_load_with(config, |config| async move { PostgresRawStore::connect(&config).await })
        .await
}

pub(crate) async fn start_raw_load_with<S, F, Fut>(
    config: Result<LoaderConfig, ConfigError>,
    connect: F,
) -> RunOutcome
where
    S: RawRecordStore,
    F: FnOnce(LoaderConfig) -> Fut,
    Fut: Future<Output = Result<S, PostgresConnectionError>>,
{
    info!("{}", BANNER_RULE);
    info!("STARTING ETL PROCESS - RAW TRANSACTIONS LOAD");
    info!("{}", BANNER_RULE);

    let config = match config {
        Ok(config) => config,
        Err(e) => {
            report_config_error(&e);
            error!("Process aborted due to missing configuration");
            return RunOutcome::Aborted(AbortReason::Configuration(e));
        }
    };

    if !config.csv_file_path.exists() {
        error!("The CSV file does not exist: {}", config.csv_file_path.display());
        error!("Set the path with the CSV_FILE_PATH variable");
        return RunOutcome::Aborted(AbortReason::SourceNotFound(config.csv_file_path));
    }

    let csv_file_path = config.csv_file_path.clone();
    let mut store = match connect(config).await {
        Ok(store) => store,
        Err(e) => {
            error!("Could not establish a connection to PostgreSQL");
            return RunOutcome::Aborted(AbortReason::Connection(e));
        }
    };

    let outcome = match load_file_to_raw(&csv_file_path, &mut store).await {
        Ok(summary) if summary.failed_inserts > 0 => {
            warn!("Process completed with {} failures", summary.failed_inserts);
            RunOutcome::CompletedWithFailures(summary)
        }
        Ok(summary) => {
            info!("Process completed successfully");
            RunOutcome::Completed(summary)
        }
        Err(e) => {
            error!("Critical error in ETL process: {}", e);
            RunOutcome::LoadFailed(e)
        }
    };

    store.close().await;

    outcome
}

fn report_config_error(err: &ConfigError) {
    error!("{}", err);
    if let ConfigError::MissingKeys(_) = err {
        error!("Set the following variables:");
        for key in REQUIRED_KEYS {
            error!("  export {}=<value>", key);
        }
    }
}
