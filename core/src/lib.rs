// public
pub mod config;
pub mod loader;

mod database;
pub use database::{
    postgres::{
        client::{PostgresConnectionError, PostgresError, PostgresRawStore},
        generate::{INSERTED_AT_COLUMN, RAW_LINE_COLUMN, RAW_TABLE_NAME},
    },
    store::RawRecordStore,
};

mod logger;
pub use logger::{setup_info_logger, setup_logger, LoggerGuard, DEFAULT_LOG_FILE};

mod start;
pub use start::{start_raw_load, AbortReason, RunOutcome};
