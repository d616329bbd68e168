//! CLI command implementations.

pub mod collections;
pub mod data;
pub mod discovery;
pub mod health;
pub mod oplog;

use clap::ValueEnum;
use serde::Serialize;

/// Result type shared by the commands.
pub type CommandResult = Result<(), Box<dyn std::error::Error>>;

/// Output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Format {
    /// Human-readable text.
    Text,
    /// Pretty-printed JSON.
    Json,
}

/// Prints `value` as JSON, or hands it to `text` for the text format.
pub fn emit<T: Serialize>(format: Format, value: &T, text: impl FnOnce(&T)) -> CommandResult {
    match format {
        Format::Json => println!("{}", serde_json::to_string_pretty(value)?),
        Format::Text => text(value),
    }
    Ok(())
}

/// Prints a `{success, message}` envelope and fails on `success: false`.
pub fn emit_generic(format: Format, response: &shilp_protocol::GenericResponse) -> CommandResult {
    emit(format, response, |r| {
        let status = if r.success { "ok" } else { "failed" };
        if r.message.is_empty() {
            println!("{status}");
        } else {
            println!("{status}: {}", r.message);
        }
    })?;
    if response.success {
        Ok(())
    } else {
        Err(format!("server reported failure: {}", response.message).into())
    }
}

/// Parses a JSON object argument.
pub fn parse_object(raw: &str) -> Result<shilp_protocol::JsonMap, Box<dyn std::error::Error>> {
    match serde_json::from_str(raw)? {
        serde_json::Value::Object(map) => Ok(map),
        _ => Err("expected a JSON object".into()),
    }
}
