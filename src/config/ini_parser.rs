//! Simple INI file parser with zero dependencies
//! Supports sections, key-value pairs, comments, and basic data types

use std::collections::HashMap;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Default)]
pub struct IniConfig {
    sections: HashMap<String, HashMap<String, String>>,
    global: HashMap<String, String>,
}

impl IniConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from file
    pub fn load_file<P: AsRef<Path>>(path: P) -> Result<Self, String> {
        let content =
            fs::read_to_string(path).map_err(|e| format!("Failed to read config file: {e}"))?;
        Self::parse(&content)
    }

    /// Parse INI content from string
    pub fn parse(content: &str) -> Result<Self, String> {
        let mut config = Self::new();
        let mut current_section = String::new();

        for (line_num, line) in content.lines().enumerate() {
            let line = line.trim();
            let line_number = line_num + 1;

            // Skip empty lines and comments
            if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
                continue;
            }

            if let Some(inner) = line.strip_prefix('[') {
                // Malformed section header - ignore it gracefully
                let Some(name) = inner.strip_suffix(']') else {
                    continue;
                };
                current_section = name.trim().to_string();
                if current_section.is_empty() {
                    return Err(format!("Empty section name at line {line_number}"));
                }
                config.sections.entry(current_section.clone()).or_default();
                continue;
            }

            let Some((key, value)) = line.split_once('=') else {
                return Err(format!("Invalid syntax at line {line_number}: {line}"));
            };

            let key = key.trim();
            if key.is_empty() {
                return Err(format!("Empty key at line {line_number}: {line}"));
            }

            // Inline comments run to the end of the line
            let value = value
                .split(['#', ';'])
                .next()
                .unwrap_or_default()
                .trim()
                .to_string();

            let target = if current_section.is_empty() {
                &mut config.global
            } else {
                config.sections.entry(current_section.clone()).or_default()
            };
            target.insert(key.to_string(), value);
        }

        Ok(config)
    }

    /// Get string value; an empty section name reads the global keys
    pub fn get_string(&self, section: &str, key: &str) -> Option<String> {
        if section.is_empty() {
            self.global.get(key).cloned()
        } else {
            self.sections.get(section)?.get(key).cloned()
        }
    }

    pub fn get_u16(&self, section: &str, key: &str) -> Option<u16> {
        self.get_string(section, key)?.parse().ok()
    }

    pub fn get_usize(&self, section: &str, key: &str) -> Option<usize> {
        self.get_string(section, key)?.parse().ok()
    }

    /// Get boolean value
    pub fn get_bool(&self, section: &str, key: &str) -> Option<bool> {
        match self.get_string(section, key)?.to_lowercase().as_str() {
            "true" | "yes" | "1" | "on" => Some(true),
            "false" | "no" | "0" | "off" => Some(false),
            _ => None,
        }
    }

    pub fn get_bool_or(&self, section: &str, key: &str, default: bool) -> bool {
        self.get_bool(section, key).unwrap_or(default)
    }

    /// Parse file size (supports KB, MB, GB suffixes)
    pub fn get_file_size(&self, section: &str, key: &str) -> Option<u64> {
        let value = self.get_string(section, key)?;
        parse_file_size(&value)
    }
}

/// Helper function to parse sizes like "16MB", "512KB", "1.5GB"
fn parse_file_size(value: &str) -> Option<u64> {
    let value = value.trim().to_uppercase();

    if let Ok(num) = value.parse::<u64>() {
        return Some(num);
    }

    let (num_part, multiplier) = [
        ("GB", 1024u64 * 1024 * 1024),
        ("MB", 1024 * 1024),
        ("KB", 1024),
        ("B", 1),
    ]
    .into_iter()
    .find_map(|(suffix, multiplier)| Some((value.strip_suffix(suffix)?, multiplier)))?;

    let num_str = num_part.trim();

    if let Ok(num) = num_str.parse::<u64>() {
        return num.checked_mul(multiplier);
    }

    // Decimal values like "1.5"
    match num_str.parse::<f64>() {
        Ok(num) if num >= 0.0 => Some((num * multiplier as f64) as u64),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_file_size() {
        assert_eq!(parse_file_size("1024"), Some(1024));
        assert_eq!(parse_file_size("1KB"), Some(1024));
        assert_eq!(parse_file_size("16mb"), Some(16 * 1024 * 1024));
        assert_eq!(parse_file_size("2GB"), Some(2 * 1024 * 1024 * 1024));
        assert_eq!(
            parse_file_size("2.5MB"),
            Some((2.5 * 1024.0 * 1024.0) as u64)
        );
        assert_eq!(parse_file_size("512 B"), Some(512));
        assert_eq!(parse_file_size("-1MB"), None);
        assert_eq!(parse_file_size("invalid"), None);
    }

    #[test]
    fn test_ini_parsing() {
        let content = r#"
# Global config
debug=true

[server]
listen=127.0.0.1 ; loopback only
port=8080

[storage]
file = /var/lib/phonebook/contacts.json
        "#;

        let config = IniConfig::parse(content).unwrap();
        assert_eq!(config.get_bool("", "debug"), Some(true));
        assert_eq!(
            config.get_string("server", "listen"),
            Some("127.0.0.1".to_string())
        );
        assert_eq!(config.get_u16("server", "port"), Some(8080));
        assert_eq!(
            config.get_string("storage", "file").as_deref(),
            Some("/var/lib/phonebook/contacts.json")
        );
        assert_eq!(config.get_string("storage", "missing"), None);
    }

    #[test]
    fn test_boolean_parsing() {
        let content = r#"
[test]
true1=true
true2=yes
true3=1
true4=on
false1=false
false2=no
false3=0
false4=off
odd=maybe
        "#;

        let config = IniConfig::parse(content).unwrap();
        for key in ["true1", "true2", "true3", "true4"] {
            assert_eq!(config.get_bool("test", key), Some(true));
        }
        for key in ["false1", "false2", "false3", "false4"] {
            assert_eq!(config.get_bool("test", key), Some(false));
        }
        assert_eq!(config.get_bool("test", "odd"), None);
        assert!(config.get_bool_or("test", "odd", true));
    }

    #[test]
    fn test_invalid_lines() {
        assert!(IniConfig::parse("[]").is_err());
        assert!(IniConfig::parse("[server]\nnot a pair").is_err());
        assert!(IniConfig::parse("= value").is_err());
        // Unterminated section header is skipped
        assert!(IniConfig::parse("[server\nport=1").is_ok());
    }
}
