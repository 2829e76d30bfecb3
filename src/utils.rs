//! Small helpers shared by the queue, the drivers and `main`.
//!
//! - Numeric identifier extraction from composite strings
//! - Directory slugs for per-entity image archives
//! - Log-friendly truncation of scraped text
//! - Output directory validation

use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;
use tokio::fs;
use tracing::{info, instrument};

use crate::error::Result;

static DIGITS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d+").expect("static regex"));

/// First run of ASCII digits in `s`.
///
/// Profile links embed the contributor id, e.g.
/// `https://www.google.com/maps/contrib/1234567890/reviews?hl=en` yields
/// `"1234567890"`.
pub fn first_digit_run(s: &str) -> Option<&str> {
    DIGITS.find(s).map(|m| m.as_str())
}

/// Truncate a string for logging purposes.
///
/// Long strings are cut to at most `max` bytes (backing off to a character
/// boundary) with `"…(+N bytes)"` appended.
///
/// # Examples
///
/// ```ignore
/// assert_eq!(truncate_for_log("short", 100), "short");
/// assert_eq!(truncate_for_log(&"a".repeat(500), 10), "aaaaaaaaaa…(+490 bytes)");
/// ```
pub fn truncate_for_log(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let mut cut = max;
    while !s.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}…(+{} bytes)", &s[..cut], s.len() - cut)
}

/// Directory-safe slug for an entity name.
///
/// Lowercases, drops everything but alphanumerics, spaces and hyphens, and
/// joins words with single hyphens.
pub fn slugify(name: &str) -> String {
    name.to_lowercase()
        .replace(|c: char| !c.is_alphanumeric() && c != ' ' && c != '-', "")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("-")
}

/// Ensure a directory exists and is writable.
///
/// Creates the directory if needed, then writes and removes a probe file.
#[instrument(level = "info", skip_all, fields(path = %path.display()))]
pub async fn ensure_writable_dir(path: &Path) -> Result<()> {
    fs::create_dir_all(path).await?;
    let probe = path.join("..__probe_write__");
    fs::write(&probe, b"").await?;
    fs::remove_file(&probe).await?;
    info!("Output directory is writable");
    Ok(())
}
