/// # phonebook
///
/// A small address book web server written in Rust.
///
/// The byte-level work lives in [`multipart`] (form body parsing),
/// [`image`] (photo format sniffing), [`contact`] and [`store`] (records and
/// their persisted snapshot). The remaining modules are the HTTP server
/// around them. The `run` function initializes logging and configuration and
/// starts the server based on command-line arguments.
pub mod cli;
pub mod config;
pub mod contact;
pub mod error;
pub mod handlers;
pub mod http;
pub mod image;
pub mod multipart;
pub mod router;
pub mod server;
pub mod store;
pub mod templates;
pub mod utils;

use crate::cli::Cli;
use crate::config::Config;
use clap::Parser;
use log::error;

/// Log filter used when `RUST_LOG` is not set
pub fn default_log_level(config: &Config) -> &'static str {
    if config.verbose {
        "debug"
    } else if config.detailed_logging {
        "info"
    } else {
        "warn"
    }
}

/// Initializes the logger, parses command-line arguments, and starts the server.
///
/// This is the main entry point for the application. Configuration errors and
/// server errors are reported and the process exits with status 1.
pub fn run() {
    let cli = Cli::parse();

    // Load configuration with precedence: CLI > INI > Defaults
    let config = match Config::load(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            std::process::exit(1);
        }
    };

    let log_level = default_log_level(&config);
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level)).init();

    log::debug!("Log level set to: {log_level}");

    if config.verbose {
        config.print_summary();
    }

    if let Err(e) = server::run_server_with_config(config) {
        error!("Server error: {e}");
        std::process::exit(1);
    }
}
