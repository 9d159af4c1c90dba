#![cfg(not(tarpaulin_include))]

use excel_analytics::app;
use excel_analytics::config::Config;

/// Main entry point for the web application
///
/// Reads configuration from the environment (and `.env`), then serves the API
/// until the process is stopped.
///
/// # Returns
/// * `Result<(), Box<dyn std::error::Error>>` - Success or error object
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    excel_analytics::init_logging();

    let config = Config::from_env()?;
    log::info!(
        "starting with uploads in {}, data in {}",
        config.upload_dir.display(),
        config.database_dir.display()
    );

    app::run(config).await
}
