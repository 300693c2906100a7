//! Local error logs.
//!
//! Provisioning workflows append to a single log so a whole session's
//! failures can be reviewed afterwards. The fetch samples write one
//! diagnostic file per run for handing to the secrets service's support team.

use crate::error::Result;
use chrono::{Local, Utc};
use std::fmt::Display;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Default location of the provisioning error log.
pub const DEFAULT_ERROR_LOG: &str = "errors.txt";

/// Default directory for per-run diagnostic logs.
pub const DEFAULT_DIAGNOSTIC_DIR: &str = "./akeyless_error_logs";

const RULE_WIDTH: usize = 50;

/// Append-only error log.
#[derive(Debug, Clone)]
pub struct ErrorLog {
    path: PathBuf,
}

impl ErrorLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append a timestamped entry: context line(s) followed by the error.
    pub fn append(&self, context: &str, error: &dyn Display) -> Result<()> {
        ensure_parent_dir(&self.path)?;

        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;

        let timestamp = Local::now().format("%Y-%m-%d %H:%M:%S%.3f");
        writeln!(file, "[{timestamp}] {}", context.trim_end())?;
        writeln!(file, "Error: {error}")?;
        Ok(())
    }

    /// Record a failure and tell the operator about it.
    ///
    /// Failure to write the log itself is reported but never masks the
    /// original error.
    pub fn record(&self, context: &str, error: &dyn Display) {
        tracing::debug!(log = %self.path.display(), %context, %error, "recording failure");
        crate::error!("An error occurred: {error}");
        if let Err(e) = self.append(context, error) {
            crate::warn!("Could not write error log {}: {e}", self.path.display());
        }
    }
}

impl Default for ErrorLog {
    fn default() -> Self {
        Self::new(DEFAULT_ERROR_LOG)
    }
}

/// One-shot diagnostic report written when a fetch sample fails.
#[derive(Debug, Clone)]
pub struct DiagnosticLog {
    path: PathBuf,
    fields: Vec<(String, String)>,
}

impl DiagnosticLog {
    /// Diagnostic log under `dir`, named after the current UTC time.
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        let name = format!("UTC_{}.log", Utc::now().format("%Y-%m-%d_%H-%M-%S"));
        Self {
            path: dir.as_ref().join(name),
            fields: Vec::new(),
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Attach a labelled value to every report.
    pub fn field(&mut self, label: &str, value: impl Display) {
        self.fields.push((label.to_string(), value.to_string()));
    }

    /// Render the report body for `message` and `error`.
    #[must_use]
    pub fn render(&self, message: &str, error: &dyn Display) -> String {
        let rule = "-".repeat(RULE_WIDTH);
        let mut debug_info = String::new();
        for (label, value) in &self.fields {
            debug_info.push_str(&format!("{label}: {value}\n"));
        }
        debug_info.push_str(&format!("Truncated Error Message: {message}"));

        format!("{rule}\n\n{message}\n{debug_info}\nError:\n{error}\n{rule}\n")
    }

    /// Write the report and echo the debug info for the operator.
    pub fn write(&self, message: &str, error: &dyn Display) -> Result<()> {
        ensure_parent_dir(&self.path)?;
        let report = self.render(message, error);
        std::fs::write(&self.path, &report)?;

        crate::error!("Error log written to {}", self.path.display());
        eprintln!(
            "Contact the secrets management team for help. Provide the file above if requested; otherwise provide:"
        );
        eprintln!("{report}");
        Ok(())
    }
}

fn ensure_parent_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
    }
    Ok(())
}
