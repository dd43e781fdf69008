//! Shopilot Web Server binary
//!
//! Standalone server entry point. The shopilot CLI wraps the same server
//! behind its `server` subcommand.

use shopilot_core::{init_logging, AppConfig, LoggingConfig};
use shopilot_web::server::start_server;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    if let Err(e) = init_logging(&LoggingConfig::default()) {
        eprintln!("Failed to initialize logging: {}", e);
        std::process::exit(1);
    }

    let config = match AppConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("❌ Invalid configuration: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = start_server(config).await {
        eprintln!("❌ Server failed: {}", e);
        std::process::exit(1);
    }
}
