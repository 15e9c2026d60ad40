//! Shared output layer: every command renders through [`render`] or
//! [`render_mode`] so pretty, text, and JSON output stay in step.
//!
//! The mode comes from the resolved config: `--json`, then `MILEPOST_FORMAT`,
//! then the user config, then pretty on a TTY and text when piped.
//!
//! Pretty output has headings, rules, and aligned keys. Text output is one
//! record per line with tab-separated fields and no decoration, for `cut` and
//! `awk`.

use milepost_core::{ErrorCode, ProjectError};
use serde::Serialize;
use std::io::{self, Write};

use crate::cmd::Refused;

/// Shared width for human pretty separators.
pub const PRETTY_RULE_WIDTH: usize = 60;

pub fn pretty_rule(w: &mut dyn Write) -> io::Result<()> {
    writeln!(w, "{:-<width$}", "", width = PRETTY_RULE_WIDTH)
}

/// Write a section heading followed by a separator.
pub fn pretty_section(w: &mut dyn Write, heading: &str) -> io::Result<()> {
    writeln!(w, "{heading}")?;
    pretty_rule(w)
}

/// Render a left-aligned key/value line in human output.
pub fn pretty_kv(w: &mut dyn Write, key: &str, value: impl AsRef<str>) -> io::Result<()> {
    writeln!(w, "{:<14} {}", format!("{key}:"), value.as_ref())
}

/// Write one tab-separated record.
pub fn text_row(w: &mut dyn Write, fields: &[&str]) -> io::Result<()> {
    writeln!(w, "{}", fields.join("\t"))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// Sections and aligned fields for people.
    Pretty,
    /// Plain lines for pipes.
    Text,
    /// One JSON document per command.
    Json,
}

impl OutputMode {
    /// Map the resolved config string (`pretty`, `text`, `json`) to a mode.
    pub fn from_resolved(raw: &str) -> Self {
        match raw {
            "json" => Self::Json,
            "text" => Self::Text,
            _ => Self::Pretty,
        }
    }
}

/// Structured error rendered to stderr.
#[derive(Debug, Clone, Serialize)]
pub struct CliError {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
    /// Stable `E####` code when the failure came from the core.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    /// Per-field messages for validation failures.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fields: Option<serde_json::Value>,
}

impl CliError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            suggestion: None,
            error_code: None,
            fields: None,
        }
    }

    fn coded(message: String, code: ErrorCode) -> Self {
        Self {
            message,
            suggestion: code.hint().map(str::to_string),
            error_code: Some(code.code().to_string()),
            fields: None,
        }
    }

    /// Describe any command failure, pulling code, hint, and field errors
    /// out of a [`ProjectError`] or [`Refused`] when one is in the chain.
    pub fn from_anyhow(err: &anyhow::Error) -> Self {
        let message = format!("{err:#}");
        for cause in err.chain() {
            if let Some(project_err) = cause.downcast_ref::<ProjectError>() {
                let mut cli = Self::coded(message, project_err.code());
                cli.fields = project_err
                    .validation_errors()
                    .and_then(|errors| serde_json::to_value(errors).ok());
                return cli;
            }
            if let Some(refused) = cause.downcast_ref::<Refused>() {
                return Self::coded(message, refused.code);
            }
        }
        Self::new(message)
    }
}

/// Render a one-line confirmation: JSON in JSON mode, otherwise the same
/// sentence for pretty and text.
pub fn render<T: Serialize>(
    mode: OutputMode,
    value: &T,
    human_fn: impl FnOnce(&T, &mut dyn Write) -> io::Result<()>,
) -> anyhow::Result<()> {
    let stdout = io::stdout();
    let mut out = stdout.lock();
    match mode {
        OutputMode::Json => write_json(&mut out, value)?,
        OutputMode::Pretty | OutputMode::Text => human_fn(value, &mut out)?,
    }
    Ok(())
}

/// Render a serializable value with explicit text and pretty renderers.
pub fn render_mode<T: Serialize>(
    mode: OutputMode,
    value: &T,
    text_fn: impl FnOnce(&T, &mut dyn Write) -> io::Result<()>,
    pretty_fn: impl FnOnce(&T, &mut dyn Write) -> io::Result<()>,
) -> anyhow::Result<()> {
    let stdout = io::stdout();
    let mut out = stdout.lock();
    write_mode(&mut out, mode, value, text_fn, pretty_fn)
}

fn write_mode<T: Serialize>(
    out: &mut dyn Write,
    mode: OutputMode,
    value: &T,
    text_fn: impl FnOnce(&T, &mut dyn Write) -> io::Result<()>,
    pretty_fn: impl FnOnce(&T, &mut dyn Write) -> io::Result<()>,
) -> anyhow::Result<()> {
    match mode {
        OutputMode::Json => write_json(out, value)?,
        OutputMode::Text => text_fn(value, out)?,
        OutputMode::Pretty => pretty_fn(value, out)?,
    }
    Ok(())
}

fn write_json<T: Serialize>(out: &mut dyn Write, value: &T) -> anyhow::Result<()> {
    serde_json::to_writer_pretty(&mut *out, value)?;
    writeln!(out)?;
    Ok(())
}

/// Render an error to stderr in the requested format.
pub fn render_error(mode: OutputMode, error: &CliError) -> anyhow::Result<()> {
    let stderr = io::stderr();
    let mut out = stderr.lock();
    write_error(&mut out, mode, error)
}

fn write_error(out: &mut dyn Write, mode: OutputMode, error: &CliError) -> anyhow::Result<()> {
    let head = error
        .error_code
        .as_ref()
        .map_or_else(|| "error".to_string(), |code| format!("error[{code}]"));
    match mode {
        OutputMode::Json => write_json(out, &serde_json::json!({ "error": error }))?,
        OutputMode::Pretty => {
            writeln!(out, "{head}: {}", error.message)?;
            if let Some(suggestion) = &error.suggestion {
                writeln!(out, "  suggestion: {suggestion}")?;
            }
        }
        OutputMode::Text => {
            writeln!(out, "{head}: {}", error.message)?;
            if let Some(suggestion) = &error.suggestion {
                writeln!(out, "hint: {suggestion}")?;
            }
        }
    }
    Ok(())
}
