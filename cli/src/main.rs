use raw_loader::{config::LoaderConfig, setup_info_logger, start_raw_load};

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let logger = setup_info_logger();

    let outcome = start_raw_load(LoaderConfig::from_env()).await;

    // process::exit skips destructors, flush the log file first
    drop(logger);
    std::process::exit(outcome.exit_code());
}
