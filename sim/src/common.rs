//! Common utility functions for the simulation application.
//!
//! This module contains shared utilities for the CLI:
//! - Logger initialization
//! - Configuration path validation

use std::error::Error;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use env_logger::{Builder, Target};
use log::LevelFilter;
use mcl::sim::ConfigFormat;

/// Timestamp layout of every log line
const LOG_TIMESTAMP: &str = "%Y-%m-%d %H:%M:%S%.3f";

/// Parse a level name, falling back to `info` (with a note on stderr) for anything unknown.
fn parse_level(log_level: &str) -> LevelFilter {
    log_level.parse().unwrap_or_else(|_| {
        eprintln!("Invalid log level '{log_level}', defaulting to 'info'");
        LevelFilter::Info
    })
}

/// Initialize the logger. Lines read `<timestamp> [<level>] <module>: <message>`.
///
/// # Arguments
/// * `log_level` - Log level string (off, error, warn, info, debug, trace)
/// * `log_file` - Optional path to log file, appended to (logs to stderr if None)
///
/// # Errors
/// Returns an error if the log file cannot be opened or a logger is already installed.
pub fn init_logger(log_level: &str, log_file: Option<&PathBuf>) -> Result<(), Box<dyn Error>> {
    let mut builder = Builder::new();
    builder
        .filter_level(parse_level(log_level))
        .format(|buf, record| {
            writeln!(
                buf,
                "{} [{}] {}: {}",
                chrono::Local::now().format(LOG_TIMESTAMP),
                record.level(),
                record.module_path().unwrap_or("mcl"),
                record.args()
            )
        });
    if let Some(path) = log_file {
        ensure_parent_dir(path)?;
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        builder.target(Target::Pipe(Box::new(file)));
    }
    builder.try_init()?;
    Ok(())
}

/// Create the parent directory of `path` if it has one and it does not exist yet.
pub fn ensure_parent_dir(path: &Path) -> Result<(), Box<dyn Error>> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => {
            std::fs::create_dir_all(parent)?;
            Ok(())
        }
        _ => Ok(()),
    }
}

/// Check that `path` names a configuration file format the simulation can read or write.
///
/// # Errors
/// Returns an error naming the accepted extensions otherwise.
pub fn validate_config_path(path: &Path) -> Result<(), Box<dyn Error>> {
    ConfigFormat::from_path(path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_validate_config_path() {
        assert!(validate_config_path(Path::new("run.toml")).is_ok());
        assert!(validate_config_path(Path::new("dir/run.JSON")).is_ok());
        assert!(validate_config_path(Path::new("run.yml")).is_ok());
        assert!(validate_config_path(Path::new("run.csv")).is_err());
        let err = validate_config_path(Path::new("run")).unwrap_err();
        assert!(err.to_string().contains(".toml, .json, .yaml, .yml"));
    }

    #[test]
    fn test_parse_level() {
        assert_eq!(parse_level("debug"), LevelFilter::Debug);
        assert_eq!(parse_level("WARN"), LevelFilter::Warn);
        assert_eq!(parse_level("off"), LevelFilter::Off);
        assert_eq!(parse_level("loud"), LevelFilter::Info);
    }

    #[test]
    fn test_ensure_parent_dir_creates_directory() {
        let dir = tempdir().unwrap();
        let nested = dir.path().join("logs").join("today").join("sim.log");

        assert!(!nested.parent().unwrap().exists());
        ensure_parent_dir(&nested).unwrap();
        assert!(nested.parent().unwrap().exists());
    }

    #[test]
    fn test_ensure_parent_dir_bare_filename() {
        assert!(ensure_parent_dir(Path::new("sim.log")).is_ok());
    }
}
