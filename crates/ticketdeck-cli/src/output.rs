//! How `td` prints: framed sections for people, `key=value` for pipes, JSON for tools.
//!
//! Commands build one serializable value and hand it to [`render_mode`] with
//! a text and a pretty writer; JSON needs no writer of its own.
//!
//! The mode comes from the first source that names a known mode: `--format`,
//! then `--json`, then `FORMAT`, then `output` in the user config. With none
//! of those, a terminal gets [`OutputMode::Pretty`] and a pipe gets
//! [`OutputMode::Text`].

use clap::ValueEnum;
use serde::Serialize;
use std::io::{self, IsTerminal, Write};
use ticketdeck_core::{ErrorCode, FetchError, MutationError};

const RULE_WIDTH: usize = 72;
const KEY_COLUMN: usize = 12;

pub fn pretty_rule(w: &mut dyn Write) -> io::Result<()> {
    writeln!(w, "{}", "-".repeat(RULE_WIDTH))
}

/// Heading line, then a rule under it.
pub fn pretty_section(w: &mut dyn Write, heading: &str) -> io::Result<()> {
    writeln!(w, "{heading}")?;
    pretty_rule(w)
}

/// `Key:` padded to a fixed column, then the value.
pub fn pretty_kv(w: &mut dyn Write, key: &str, value: impl AsRef<str>) -> io::Result<()> {
    let label = format!("{key}:");
    writeln!(w, "{label:<KEY_COLUMN$} {}", value.as_ref())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputMode {
    /// Sections and aligned fields, for a terminal.
    Pretty,
    /// One `key=value` line per record.
    Text,
    Json,
}

impl OutputMode {
    pub const fn is_json(self) -> bool {
        matches!(self, Self::Json)
    }

    fn from_name(name: &str) -> Option<Self> {
        Self::from_str(name.trim(), true).ok()
    }
}

/// Every place a mode can come from, highest precedence first.
struct ModeSources<'a> {
    flag: Option<OutputMode>,
    json: bool,
    env: Option<&'a str>,
    config: Option<&'a str>,
    tty: bool,
}

impl ModeSources<'_> {
    fn resolve(&self) -> OutputMode {
        let json = self.json.then_some(OutputMode::Json);
        self.flag
            .or(json)
            .or_else(|| self.env.and_then(OutputMode::from_name))
            .or_else(|| self.config.and_then(OutputMode::from_name))
            .unwrap_or(if self.tty {
                OutputMode::Pretty
            } else {
                OutputMode::Text
            })
    }
}

pub fn resolve_output_mode(
    format_flag: Option<OutputMode>,
    json_flag: bool,
    config_output: Option<&str>,
) -> OutputMode {
    let env = std::env::var("FORMAT").ok();
    ModeSources {
        flag: format_flag,
        json: json_flag,
        env: env.as_deref(),
        config: config_output,
        tty: io::stdout().is_terminal(),
    }
    .resolve()
}

/// Print `value` to stdout in `mode`. JSON is always pretty-printed.
pub fn render_mode<T: Serialize>(
    mode: OutputMode,
    value: &T,
    text_fn: impl FnOnce(&T, &mut dyn Write) -> io::Result<()>,
    pretty_fn: impl FnOnce(&T, &mut dyn Write) -> io::Result<()>,
) -> anyhow::Result<()> {
    let mut out = io::stdout().lock();
    match mode {
        OutputMode::Text => text_fn(value, &mut out)?,
        OutputMode::Pretty => pretty_fn(value, &mut out)?,
        OutputMode::Json => {
            serde_json::to_writer_pretty(&mut out, value)?;
            writeln!(out)?;
        }
    }
    Ok(())
}

/// What a failed command reports on stderr. `error_code` is an `E####` code
/// from [`ErrorCode`] when the failure maps to one.
#[derive(Debug, Serialize)]
pub struct CliError {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
}

impl CliError {
    pub fn with_details(
        message: impl Into<String>,
        suggestion: impl Into<String>,
        error_code: impl Into<String>,
    ) -> Self {
        Self {
            message: message.into(),
            suggestion: Some(suggestion.into()),
            error_code: Some(error_code.into()),
        }
    }

    fn coded(message: String, code: ErrorCode) -> Self {
        Self {
            message,
            suggestion: code.hint().map(str::to_string),
            error_code: Some(code.code().to_string()),
        }
    }
}

impl From<&FetchError> for CliError {
    fn from(err: &FetchError) -> Self {
        Self::coded(err.user_message(), err.error_code())
    }
}

impl From<&MutationError> for CliError {
    fn from(err: &MutationError) -> Self {
        Self::coded(err.to_string(), err.error_code())
    }
}

fn write_error(w: &mut dyn Write, mode: OutputMode, error: &CliError) -> anyhow::Result<()> {
    if mode.is_json() {
        serde_json::to_writer_pretty(&mut *w, &serde_json::json!({ "error": error }))?;
        writeln!(w)?;
        return Ok(());
    }
    let tag = error
        .error_code
        .as_deref()
        .map_or_else(|| "error".to_string(), |code| format!("error[{code}]"));
    writeln!(w, "{tag}: {}", error.message)?;
    if let Some(suggestion) = &error.suggestion {
        writeln!(w, "  suggestion: {suggestion}")?;
    }
    Ok(())
}

/// Report `error` on stderr; JSON mode wraps it as `{"error": {...}}`.
pub fn render_error(mode: OutputMode, error: &CliError) -> anyhow::Result<()> {
    write_error(&mut io::stderr().lock(), mode, error)
}
