//! Table and JSON output formatting for CLI commands.

use serde::Serialize;
use tabled::{Table, Tabled};

/// Output format selection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable table
    #[default]
    Table,
    /// JSON output
    Json,
}

/// Print a list of items in the selected format
pub fn print_list<T: Serialize + Tabled>(items: &[T], format: OutputFormat) {
    match format {
        OutputFormat::Table => {
            if items.is_empty() {
                println!("No results found.");
            } else {
                println!("{}", Table::new(items));
            }
        }
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(items).unwrap_or_else(|_| "[]".to_string());
            println!("{json}");
        }
    }
}

/// Print a single item; tables fall back to key/value lines.
pub fn print_item<T: Serialize>(item: &T, format: OutputFormat) {
    let value = serde_json::to_value(item).unwrap_or(serde_json::Value::Null);
    match format {
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(&value).unwrap_or_else(|_| "{}".to_string());
            println!("{json}");
        }
        OutputFormat::Table => print_value("", &value),
    }
}

fn print_value(prefix: &str, value: &serde_json::Value) {
    match value {
        serde_json::Value::Object(map) => {
            for (key, inner) in map {
                let key = if prefix.is_empty() {
                    key.clone()
                } else {
                    format!("{prefix}.{key}")
                };
                print_value(&key, inner);
            }
        }
        serde_json::Value::String(s) => print_kv(prefix, s),
        serde_json::Value::Null => print_kv(prefix, "-"),
        other => print_kv(prefix, &other.to_string()),
    }
}

/// Print a success message
pub fn print_success(msg: &str) {
    println!("✓ {msg}");
}

/// Print a warning message
pub fn print_warning(msg: &str) {
    println!("⚠ {msg}");
}

/// Print an error message
pub fn print_error(msg: &str) {
    eprintln!("✗ {msg}");
}

/// Print a key-value pair
pub fn print_kv(key: &str, value: &str) {
    println!("  {:<32} {}", format!("{key}:"), value);
}

/// `-` for absent values in table cells.
pub fn or_dash<T: std::fmt::Display>(value: Option<T>) -> String {
    value.map_or_else(|| "-".to_string(), |v| v.to_string())
}
