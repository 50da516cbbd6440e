// Utility functions for the Exliar installer

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use log::LevelFilter;
use simplelog::{ColorChoice, ConfigBuilder, TermLogger, TerminalMode};

/// Where log records go: stdout/stderr by level, or stderr only
pub fn log_mode(stdout_reserved: bool) -> TerminalMode {
    if stdout_reserved {
        TerminalMode::Stderr
    } else {
        TerminalMode::Mixed
    }
}

/// Sets up terminal logging; Debug when verbose, Info otherwise
pub fn init_logger(verbose: bool, mode: TerminalMode) {
    let level = if verbose { LevelFilter::Debug } else { LevelFilter::Info };
    let config = ConfigBuilder::new()
        .set_time_level(LevelFilter::Off)
        .set_target_level(LevelFilter::Off)
        .set_thread_level(LevelFilter::Off)
        .build();

    // A logger may already be installed (e.g. by a test harness)
    let _ = TermLogger::init(level, config, mode, ColorChoice::Auto);
}

/// Copies `file_path` to `<name>.backup_<timestamp>` next to it
pub fn create_timestamped_backup(file_path: &Path) -> io::Result<PathBuf> {
    let timestamp = chrono::Local::now().format("%Y%m%d_%H%M%S").to_string();
    let backup_filename = format!(
        "{}.backup_{}",
        file_path.file_name().unwrap_or_default().to_string_lossy(),
        timestamp
    );
    let backup_path = file_path.with_file_name(backup_filename);

    fs::copy(file_path, &backup_path)?;
    Ok(backup_path)
}
