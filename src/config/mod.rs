//! Configuration management for the phone book server
//! Supports INI files with CLI argument overrides

pub mod ini_parser;

use crate::cli::Cli;
use crate::error::AppError;
use ini_parser::IniConfig;
use std::path::{Path, PathBuf};

pub const DEFAULT_LISTEN: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_THREADS: usize = 4;
pub const DEFAULT_MAX_BODY_SIZE: u64 = 16 * 1024 * 1024;
pub const DEFAULT_DATA_FILE: &str = "contacts.json";

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    // Server settings
    pub listen: String,
    pub port: u16,
    pub threads: usize,
    pub max_body_size: u64,

    // Storage settings
    pub data_file: PathBuf,
    pub ephemeral: bool,

    // Logging settings
    pub verbose: bool,
    pub detailed_logging: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen: DEFAULT_LISTEN.to_string(),
            port: DEFAULT_PORT,
            threads: DEFAULT_THREADS,
            max_body_size: DEFAULT_MAX_BODY_SIZE,
            data_file: PathBuf::from(DEFAULT_DATA_FILE),
            ephemeral: false,
            verbose: false,
            detailed_logging: false,
        }
    }
}

impl Config {
    /// Load configuration with precedence: CLI args > INI file > Defaults
    pub fn load(cli: &Cli) -> Result<Self, AppError> {
        let ini = match Self::find_config_file(cli)? {
            Some(path) => {
                log::info!("Loading configuration from: {}", path.display());
                IniConfig::load_file(&path).map_err(AppError::InvalidConfiguration)?
            }
            None => {
                log::info!("No configuration file found, using defaults and CLI overrides");
                IniConfig::new()
            }
        };

        let config = Self::from_sources(cli, &ini);
        config.validate()?;
        Ok(config)
    }

    /// Merge CLI values over INI values over defaults
    pub fn from_sources(cli: &Cli, ini: &IniConfig) -> Self {
        let defaults = Self::default();

        Self {
            listen: cli
                .listen
                .clone()
                .or_else(|| ini.get_string("server", "listen"))
                .unwrap_or(defaults.listen),
            port: cli
                .port
                .or_else(|| ini.get_u16("server", "port"))
                .unwrap_or(defaults.port),
            threads: cli
                .threads
                .or_else(|| ini.get_usize("server", "threads"))
                .unwrap_or(defaults.threads),
            max_body_size: cli
                .max_body_size_bytes()
                .or_else(|| ini.get_file_size("server", "max_body_size"))
                .unwrap_or(defaults.max_body_size),

            data_file: cli
                .data_file
                .clone()
                .or_else(|| ini.get_string("storage", "file").map(PathBuf::from))
                .unwrap_or(defaults.data_file),
            ephemeral: cli.ephemeral || ini.get_bool_or("storage", "ephemeral", defaults.ephemeral),

            verbose: cli.verbose || ini.get_bool_or("logging", "verbose", defaults.verbose),
            detailed_logging: cli.detailed_logging
                || ini.get_bool_or("logging", "detailed", defaults.detailed_logging),
        }
    }

    /// Find configuration file in order of preference
    fn find_config_file(cli: &Cli) -> Result<Option<PathBuf>, AppError> {
        // 1. Explicitly specified via CLI
        if let Some(ref config_path) = cli.config_file {
            let path = PathBuf::from(config_path);
            if path.exists() {
                return Ok(Some(path));
            }
            return Err(AppError::InvalidConfiguration(format!(
                "Config file specified but not found: {config_path}"
            )));
        }

        // 2. Current directory
        for candidate in ["phonebook.ini", "phonebook.conf"] {
            let path = PathBuf::from(candidate);
            if path.exists() {
                return Ok(Some(path));
            }
        }

        // 3. User config directory (~/.config/phonebook/config.ini)
        if let Some(home_dir) = std::env::var_os("HOME") {
            let user_config = Path::new(&home_dir)
                .join(".config")
                .join("phonebook")
                .join("config.ini");
            if user_config.exists() {
                return Ok(Some(user_config));
            }
        }

        // 4. System config (Unix-like systems)
        #[cfg(unix)]
        {
            let system_config = PathBuf::from("/etc/phonebook/config.ini");
            if system_config.exists() {
                return Ok(Some(system_config));
            }
        }

        Ok(None)
    }

    /// Reject settings the server cannot start with
    pub fn validate(&self) -> Result<(), AppError> {
        if self.threads == 0 {
            return Err(AppError::InvalidConfiguration(
                "threads must be at least 1".to_string(),
            ));
        }

        if self.max_body_size == 0 {
            return Err(AppError::InvalidConfiguration(
                "max_body_size must be greater than 0".to_string(),
            ));
        }

        if !self.ephemeral {
            if self.data_file.as_os_str().is_empty() || self.data_file.is_dir() {
                return Err(AppError::InvalidConfiguration(format!(
                    "data file is not a file path: '{}'",
                    self.data_file.display()
                )));
            }

            let parent = self
                .data_file
                .parent()
                .filter(|p| !p.as_os_str().is_empty());
            if let Some(parent) = parent
                && !parent.is_dir()
            {
                return Err(AppError::InvalidConfiguration(format!(
                    "data file directory does not exist: {}",
                    parent.display()
                )));
            }
        }

        Ok(())
    }

    /// Print configuration summary
    pub fn print_summary(&self) {
        log::info!("Configuration Summary:");
        log::info!("  Server: {}:{}", self.listen, self.port);
        log::info!("  Threads: {}", self.threads);
        log::info!(
            "  Max Body Size: {:.1} MB",
            self.max_body_size as f64 / (1024.0 * 1024.0)
        );
        if self.ephemeral {
            log::info!("  Storage: in memory (ephemeral)");
        } else {
            log::info!("  Storage: {}", self.data_file.display());
        }
        log::info!("  Verbose Logging: {}", self.verbose);
        log::info!("  Detailed Logging: {}", self.detailed_logging);
    }
}
