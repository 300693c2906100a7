//! Operator prompts and colored status macros
//!
//! All termcolor operations in the macros use `let _ =` to deliberately ignore
//! errors. Colored output is decorative; if stdout/stderr is unavailable the
//! program continues without it. Reading operator input is critical and
//! propagates errors.

use crate::error::{ProvisionError, Result};
use std::fmt::Display;
use std::io::{self, BufRead, Write};

/// Rule printed between prompt steps.
pub const SEPARATOR: &str = "----------------------------------------";

/// Print a warning with a yellow marker to stderr
#[macro_export]
macro_rules! warn {
    ($($arg:tt)*) => {{
        use std::io::Write as _;
        use termcolor::WriteColor as _;
        let bufwtr = termcolor::BufferWriter::stderr(termcolor::ColorChoice::Auto);
        let mut buffer = bufwtr.buffer();
        let _ = buffer.set_color(termcolor::ColorSpec::new().set_fg(Some(termcolor::Color::Yellow)));
        let _ = write!(&mut buffer, "⚠️  ");
        let _ = buffer.reset();
        let _ = writeln!(&mut buffer, $($arg)*);
        let _ = bufwtr.print(&buffer);
    }};
}

/// Print an error with a red marker to stderr
#[macro_export]
macro_rules! error {
    ($($arg:tt)*) => {{
        use std::io::Write as _;
        use termcolor::WriteColor as _;
        let bufwtr = termcolor::BufferWriter::stderr(termcolor::ColorChoice::Auto);
        let mut buffer = bufwtr.buffer();
        let _ = buffer.set_color(termcolor::ColorSpec::new().set_fg(Some(termcolor::Color::Red)));
        let _ = write!(&mut buffer, "❌ ");
        let _ = buffer.reset();
        let _ = writeln!(&mut buffer, $($arg)*);
        let _ = bufwtr.print(&buffer);
    }};
}

/// Print a success line with a green check to stdout
#[macro_export]
macro_rules! success {
    ($($arg:tt)*) => {{
        use std::io::Write as _;
        use termcolor::WriteColor as _;
        let bufwtr = termcolor::BufferWriter::stdout(termcolor::ColorChoice::Auto);
        let mut buffer = bufwtr.buffer();
        let _ = buffer.set_color(termcolor::ColorSpec::new().set_fg(Some(termcolor::Color::Green)));
        let _ = write!(&mut buffer, "✓ ");
        let _ = buffer.reset();
        let _ = writeln!(&mut buffer, $($arg)*);
        let _ = bufwtr.print(&buffer);
    }};
}

/// Line-oriented operator prompts over any reader/writer pair.
///
/// The binary wires this to stdin/stdout; tests feed it a `Cursor`.
pub struct Prompter {
    input: Box<dyn BufRead>,
    output: Box<dyn Write>,
}

impl Prompter {
    pub fn new(input: impl BufRead + 'static, output: impl Write + 'static) -> Self {
        Self {
            input: Box::new(input),
            output: Box::new(output),
        }
    }

    /// Prompter bound to the process terminal.
    #[must_use]
    pub fn stdio() -> Self {
        Self::new(io::BufReader::new(io::stdin()), io::stdout())
    }

    /// Scripted prompter answering from `answers` and discarding output.
    #[must_use]
    pub fn scripted(answers: &str) -> Self {
        Self::new(io::Cursor::new(answers.to_string()), io::sink())
    }

    /// Read one line. `None` means end of input.
    fn read_line(&mut self) -> Result<Option<String>> {
        self.output.flush()?;
        let mut line = String::new();
        let bytes_read = self.input.read_line(&mut line)?;
        if bytes_read == 0 {
            return Ok(None);
        }
        Ok(Some(line.trim_end_matches(['\r', '\n']).to_string()))
    }

    fn separator(&mut self) -> Result<()> {
        writeln!(self.output, "{SEPARATOR}")?;
        Ok(())
    }

    fn write_menu<T: Display>(&mut self, prompt: &str, options: &[T]) -> Result<()> {
        writeln!(self.output, "{prompt}")?;
        for (i, option) in options.iter().enumerate() {
            writeln!(self.output, "{}: {option}", i + 1)?;
        }
        Ok(())
    }

    /// Pick exactly one option by its 1-based number.
    ///
    /// Blank input selects the first option. Out-of-range and non-numeric
    /// answers re-prompt.
    pub fn choose_one<'a, T: Display>(&mut self, options: &'a [T], prompt: &str) -> Result<&'a T> {
        if options.is_empty() {
            return Err(ProvisionError::InvalidInput(format!(
                "No options available for: {prompt}"
            )));
        }

        loop {
            self.write_menu(prompt, options)?;
            let Some(answer) = self.read_line()? else {
                return Err(ProvisionError::Cancelled);
            };
            let answer = answer.trim();

            if answer.is_empty() {
                self.separator()?;
                return Ok(&options[0]);
            }

            match answer.parse::<usize>() {
                Ok(n) if (1..=options.len()).contains(&n) => {
                    self.separator()?;
                    return Ok(&options[n - 1]);
                }
                _ => {
                    writeln!(
                        self.output,
                        "Invalid option. Please enter a whole number. Valid options are between 1 and {}",
                        options.len()
                    )?;
                    writeln!(self.output, "Input value was \"{answer}\"")?;
                    self.separator()?;
                }
            }
        }
    }

    /// Pick any subset by comma-separated 1-based numbers, in the order typed.
    ///
    /// Blank input and end of input both yield an empty selection. A single
    /// bad token re-prompts for the whole list.
    pub fn choose_many<'a, T: Display>(
        &mut self,
        options: &'a [T],
        prompt: &str,
    ) -> Result<Vec<&'a T>> {
        loop {
            self.write_menu(prompt, options)?;
            let Some(answer) = self.read_line()? else {
                return Ok(Vec::new());
            };

            match parse_indices(&answer, options.len()) {
                Ok(indices) => {
                    self.separator()?;
                    return Ok(indices.into_iter().map(|i| &options[i]).collect());
                }
                Err(IndexError::NotANumber) => {
                    writeln!(self.output, "Invalid input. Please enter comma-separated numbers.")?;
                }
                Err(IndexError::OutOfRange) => {
                    writeln!(
                        self.output,
                        "Invalid input. Please enter comma-separated numbers corresponding to the options."
                    )?;
                }
            }
        }
    }

    /// Free text; blank answers re-prompt.
    pub fn text(&mut self, prompt: &str) -> Result<String> {
        loop {
            write!(self.output, "{prompt}")?;
            let Some(answer) = self.read_line()? else {
                return Err(ProvisionError::Cancelled);
            };
            let answer = answer.trim();
            if !answer.is_empty() {
                self.separator()?;
                return Ok(answer.to_string());
            }
        }
    }

    /// Free text where blank is an acceptable answer.
    pub fn optional_text(&mut self, prompt: &str) -> Result<String> {
        write!(self.output, "{prompt}")?;
        let answer = self.read_line()?.unwrap_or_default();
        Ok(answer.trim().to_string())
    }

    /// Comma-separated list; items are trimmed, empty items dropped, and an
    /// empty list re-prompts.
    pub fn list(&mut self, prompt: &str) -> Result<Vec<String>> {
        loop {
            writeln!(self.output, "{prompt}")?;
            let Some(answer) = self.read_line()? else {
                return Err(ProvisionError::Cancelled);
            };
            let items = split_list(&answer);
            if !items.is_empty() {
                self.separator()?;
                return Ok(items);
            }
        }
    }

    /// Comma-separated list where an empty answer is allowed.
    pub fn optional_list(&mut self, prompt: &str) -> Result<Vec<String>> {
        writeln!(self.output, "{prompt}")?;
        let answer = self.read_line()?.unwrap_or_default();
        Ok(split_list(&answer))
    }

    /// Yes/no confirmation. Blank means yes; end of input means no.
    pub fn confirm(&mut self, question: &str) -> Result<bool> {
        writeln!(self.output, "{question} (y/n):")?;
        let Some(answer) = self.read_line()? else {
            return Ok(false);
        };
        self.separator()?;
        Ok(matches!(
            answer.trim().to_lowercase().as_str(),
            "" | "y" | "ys" | "ye" | "es" | "yes"
        ))
    }

    /// True once the input has no more answers.
    pub fn at_end(&mut self) -> Result<bool> {
        Ok(self.input.fill_buf()?.is_empty())
    }

    /// Write an informational line to the prompt output.
    pub fn say(&mut self, message: &str) -> Result<()> {
        writeln!(self.output, "{message}")?;
        Ok(())
    }
}

#[derive(Debug, PartialEq, Eq)]
enum IndexError {
    NotANumber,
    OutOfRange,
}

fn parse_indices(answer: &str, len: usize) -> std::result::Result<Vec<usize>, IndexError> {
    answer
        .split(',')
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(|token| {
            let n = token.parse::<usize>().map_err(|_| IndexError::NotANumber)?;
            if (1..=len).contains(&n) {
                Ok(n - 1)
            } else {
                Err(IndexError::OutOfRange)
            }
        })
        .collect()
}

/// Split a comma-separated answer into trimmed, non-empty items.
#[must_use]
pub fn split_list(answer: &str) -> Vec<String> {
    answer
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}
