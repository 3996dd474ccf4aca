//! Common platform utilities

use crate::error::{Error, Result};
use std::fs;
use std::path::Path;

/// Read file contents as string, trimming whitespace
pub fn read_file_string<P: AsRef<Path>>(path: P) -> Result<String> {
    Ok(fs::read_to_string(path)?.trim().to_string())
}

/// Read file and parse as f64 (accepts negative values, e.g. discharge current)
pub fn read_file_f64<P: AsRef<Path>>(path: P) -> Result<f64> {
    let content = read_file_string(path)?;
    content
        .parse()
        .map_err(|e| Error::Parse(format!("Failed to parse f64: {}", e)))
}

/// Read a file if it exists, `None` on any failure
pub fn read_optional_string<P: AsRef<Path>>(path: P) -> Option<String> {
    read_file_string(path).ok().filter(|s| !s.is_empty())
}

/// Check if file/directory exists
pub fn path_exists<P: AsRef<Path>>(path: P) -> bool {
    path.as_ref().exists()
}

/// Find the value of a `Key:   value unit` line (as in `/proc/meminfo`)
pub fn parse_keyed_value(content: &str, key: &str) -> Option<u64> {
    content.lines().find_map(|line| {
        let (name, rest) = line.split_once(':')?;
        if name.trim() != key {
            return None;
        }
        rest.split_whitespace().next()?.parse().ok()
    })
}
