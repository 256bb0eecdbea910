//! Shared output layer for human/JSON parity across CLI commands.
//!
//! Every command handler receives an [`OutputMode`] and formats its output
//! accordingly: readable text for humans, stable JSON for pipelines.

use std::io::{self, Write};

use serde::Serialize;

/// Shared width for human output separators.
pub const RULE_WIDTH: usize = 72;

/// Write a horizontal separator used by human output.
pub fn rule(w: &mut dyn Write) -> io::Result<()> {
    writeln!(w, "{:-<width$}", "", width = RULE_WIDTH)
}

/// Write a section heading followed by a separator.
pub fn section(w: &mut dyn Write, heading: &str) -> io::Result<()> {
    writeln!(w, "{heading}")?;
    rule(w)
}

/// Render a left-aligned key/value line in human output.
pub fn kv(w: &mut dyn Write, key: &str, value: impl AsRef<str>) -> io::Result<()> {
    writeln!(w, "{:<14} {}", format!("{key}:"), value.as_ref())
}

/// The two output modes supported by the CLI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// Human-readable text.
    Human,
    /// Machine-readable JSON.
    Json,
}

impl OutputMode {
    /// Returns `true` if JSON output was requested.
    pub fn is_json(self) -> bool {
        matches!(self, Self::Json)
    }
}

/// Render a serializable value to stdout in the requested format.
///
/// In JSON mode the value is serialized with `serde_json`; in human mode
/// the provided closure produces the text output.
pub fn render<T: Serialize>(
    mode: OutputMode,
    value: &T,
    human_fn: impl FnOnce(&T, &mut dyn Write) -> io::Result<()>,
) -> anyhow::Result<()> {
    let stdout = io::stdout();
    let mut out = stdout.lock();
    match mode {
        OutputMode::Json => {
            serde_json::to_writer_pretty(&mut out, value)?;
            writeln!(out)?;
        }
        OutputMode::Human => human_fn(value, &mut out)?,
    }
    Ok(())
}

/// Structured error payload shared by every command.
#[derive(Debug, Serialize)]
pub struct CliError {
    /// Human-readable error message.
    pub message: String,
    /// Machine-readable error code (e.g. "E2003").
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
}

impl CliError {
    /// Create a simple error with just a message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            error_code: None,
        }
    }

    /// Create an error carrying a machine-readable code.
    pub fn with_code(message: impl Into<String>, error_code: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            error_code: Some(error_code.into()),
        }
    }
}

/// Render an error to stderr (human) or stdout (JSON envelope).
pub fn render_error(mode: OutputMode, error: &CliError) -> anyhow::Result<()> {
    match mode {
        OutputMode::Json => {
            let stdout = io::stdout();
            let mut out = stdout.lock();
            serde_json::to_writer_pretty(&mut out, &serde_json::json!({ "error": error }))?;
            writeln!(out)?;
        }
        OutputMode::Human => {
            let stderr = io::stderr();
            let mut err = stderr.lock();
            writeln!(err, "error: {}", error.message)?;
        }
    }
    Ok(())
}
