//! Output helpers for text and JSON result printing.

use colored::Colorize;
use serde::Serialize;

use crate::OutputFormat;

/// Print a serializable result as JSON on stdout.
///
/// Only emits in JSON mode; text rendering is the caller's job. JSON is the
/// machine-readable result, not a diagnostic, so it prints even under
/// `--quiet`.
pub fn print<T: Serialize>(value: &T, format: OutputFormat, _quiet: bool) {
    if let OutputFormat::Json = format {
        match serde_json::to_string_pretty(value) {
            Ok(json) => println!("{json}"),
            Err(e) => eprintln!("{}: failed to serialize result: {e}", "Error".red().bold()),
        }
    }
}

/// Print a success line in text mode.
pub fn success(message: &str, format: OutputFormat, quiet: bool) {
    if quiet {
        return;
    }
    if let OutputFormat::Text = format {
        println!("{} {message}", "✓".green().bold());
    }
}
