use clap::Parser;
use std::path::PathBuf;

/// Largest accepted request body, in MB
const MAX_BODY_SIZE_LIMIT_MB: u64 = 1024;

// Defines the command-line interface using clap.
// Every setting is optional here so that an INI file can fill in what the
// command line leaves out.
#[derive(Parser, Clone, Debug, Default)]
#[command(
    version,
    about = "A small phone book web server with contact photos.",
    long_about = "A small phone book web server.\n Contacts (name, phone, cell phone and an optional JPEG, PNG or GIF photo) can be added, searched and deleted from a browser.\n The contact list is kept in memory and written to a JSON snapshot file after every change.\n Settings can also be read from an INI file; command line flags take precedence.\n"
)]
pub struct Cli {
    /// Host address to listen on (e.g., "127.0.0.1" for local, "0.0.0.0" for everyone on the network)
    #[arg(short, long)]
    pub listen: Option<String>,

    /// Port number to listen on
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Number of worker threads handling requests
    #[arg(short, long)]
    pub threads: Option<usize>,

    /// Snapshot file the contact list is loaded from and saved to
    #[arg(short, long)]
    pub data_file: Option<PathBuf>,

    /// Keep contacts in memory only; nothing is read from or written to disk
    #[arg(long)]
    pub ephemeral: bool,

    /// Maximum request body size in MB (1-1024). Bounds photo uploads.
    #[arg(long, value_parser = validate_body_size)]
    pub max_body_size: Option<u64>,

    /// Enable verbose logging for debugging (log level: debug)
    #[arg(short, long)]
    pub verbose: bool,

    /// Enable more detailed logging (log level: info)
    #[arg(long)]
    pub detailed_logging: bool,

    /// Configuration file path (INI format). If not provided, looks for phonebook.ini in the current directory or ~/.config/phonebook/config.ini
    #[arg(long, value_parser = validate_config_file)]
    pub config_file: Option<String>,
}

/// Validate body size is within safe bounds (1-1024 MB)
fn validate_body_size(s: &str) -> Result<u64, String> {
    let size: u64 = s
        .parse()
        .map_err(|_| "Body size must be a positive number".to_string())?;

    if size == 0 {
        return Err("Body size must be greater than 0 MB".to_string());
    }

    if size > MAX_BODY_SIZE_LIMIT_MB {
        return Err(format!(
            "Body size must not exceed {MAX_BODY_SIZE_LIMIT_MB} MB"
        ));
    }

    Ok(size)
}

/// Validate config file path exists and is readable
fn validate_config_file(s: &str) -> Result<String, String> {
    if s.is_empty() {
        return Err("Config file path cannot be empty".to_string());
    }

    let path = PathBuf::from(s);

    if !path.exists() {
        return Err(format!("Config file does not exist: {s}"));
    }

    if !path.is_file() {
        return Err(format!("Config path is not a file: {s}"));
    }

    match std::fs::File::open(&path) {
        Ok(_) => Ok(s.to_string()),
        Err(e) => Err(format!("Cannot read config file {s}: {e}")),
    }
}

impl Cli {
    /// Body size limit from the command line, in bytes
    pub fn max_body_size_bytes(&self) -> Option<u64> {
        // Bounded by the value parser, so this cannot overflow
        self.max_body_size.map(|mb| mb * 1024 * 1024)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_validate_body_size() {
        assert_eq!(validate_body_size("1").unwrap(), 1);
        assert_eq!(validate_body_size("16").unwrap(), 16);
        assert_eq!(validate_body_size("1024").unwrap(), 1024);

        assert!(validate_body_size("0").is_err());
        assert!(validate_body_size("1025").is_err());
        assert!(validate_body_size("-1").is_err());
        assert!(validate_body_size("abc").is_err());
    }

    #[test]
    fn test_max_body_size_bytes() {
        let mut cli = Cli::default();
        assert_eq!(cli.max_body_size_bytes(), None);

        cli.max_body_size = Some(16);
        assert_eq!(cli.max_body_size_bytes(), Some(16 * 1024 * 1024));
    }

    #[test]
    fn test_validate_config_file() {
        let temp_dir = TempDir::new().unwrap();
        let file = temp_dir.path().join("phonebook.ini");
        std::fs::write(&file, "[server]\nport=1\n").unwrap();

        assert!(validate_config_file(file.to_str().unwrap()).is_ok());
        assert!(validate_config_file(temp_dir.path().to_str().unwrap()).is_err());
        assert!(validate_config_file("/nonexistent/phonebook.ini").is_err());
        assert!(validate_config_file("").is_err());
    }

    #[test]
    fn test_parse_flags() {
        let cli = Cli::try_parse_from([
            "phonebook",
            "-p",
            "9000",
            "--data-file",
            "book.json",
            "--ephemeral",
            "--max-body-size",
            "8",
            "-v",
        ])
        .unwrap();

        assert_eq!(cli.port, Some(9000));
        assert_eq!(cli.data_file, Some(PathBuf::from("book.json")));
        assert!(cli.ephemeral);
        assert_eq!(cli.max_body_size, Some(8));
        assert!(cli.verbose);
        assert!(!cli.detailed_logging);
        assert_eq!(cli.listen, None);

        assert!(Cli::try_parse_from(["phonebook", "--max-body-size", "0"]).is_err());
    }
}
