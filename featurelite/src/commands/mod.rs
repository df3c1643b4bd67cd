//! CLI command implementations. Each returns the text to print.

pub mod candidate;
pub mod feature;

use anyhow::{Context, Result};
use std::io::Read;

/// Read an argument, or stdin when the argument is "-".
pub fn arg_or_stdin(value: String) -> Result<String> {
    if value == "-" {
        let mut s = String::new();
        std::io::stdin().read_to_string(&mut s)?;
        Ok(s)
    } else {
        Ok(value)
    }
}

/// Read a file, or stdin when the path is "-".
pub fn read_file_or_stdin(path: &str) -> Result<String> {
    if path == "-" {
        return arg_or_stdin(path.to_string());
    }
    std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path))
}
