//! CSS pretty-printing
//!
//! Previews are pretty-printed before being shown to the user. Formatting sits
//! behind the [`CssFormatter`] trait so an external tool can be plugged in;
//! [`BuiltinFormatter`] covers the flat rule sets the engine generates without
//! spawning anything.

use std::io;
use std::process::Stdio;

use async_trait::async_trait;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

const INDENT: &str = "  ";

/// Errors raised while pretty-printing CSS
#[derive(Debug, Error)]
pub enum FormatError {
    #[error("unexpected '}}' at byte {0}")]
    UnexpectedClose(usize),

    #[error("{0} unclosed block(s) at end of input")]
    UnclosedBlock(usize),

    #[error("unterminated comment starting at byte {0}")]
    UnterminatedComment(usize),

    #[error("unterminated string starting at byte {0}")]
    UnterminatedString(usize),

    #[error("failed to run formatter `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("formatter `{command}` exited with {status}: {stderr}")]
    Failed {
        command: String,
        status: std::process::ExitStatus,
        stderr: String,
    },

    #[error("formatter `{0}` produced non UTF-8 output")]
    InvalidOutput(String),
}

/// Pretty-printer for CSS text
#[async_trait]
pub trait CssFormatter: Send + Sync {
    async fn format(&self, css: &str) -> Result<String, FormatError>;

    /// Name used in logs.
    fn name(&self) -> &str;
}

/// In-process formatter: one declaration per line, two-space indentation.
#[derive(Debug, Default, Clone, Copy)]
pub struct BuiltinFormatter;

#[async_trait]
impl CssFormatter for BuiltinFormatter {
    async fn format(&self, css: &str) -> Result<String, FormatError> {
        format_css(css)
    }

    fn name(&self) -> &str {
        "builtin"
    }
}

/// Pipes CSS through an external command (e.g. `prettier --parser css`).
#[derive(Debug, Clone)]
pub struct CommandFormatter {
    program: String,
    args: Vec<String>,
    display: String,
}

impl CommandFormatter {
    /// Splits `command_line` on whitespace into program and arguments.
    /// Returns `None` for a blank command line.
    pub fn parse(command_line: &str) -> Option<Self> {
        let mut parts = command_line.split_whitespace().map(str::to_string);
        let program = parts.next()?;
        Some(Self {
            program,
            args: parts.collect(),
            display: command_line.trim().to_string(),
        })
    }
}

#[async_trait]
impl CssFormatter for CommandFormatter {
    async fn format(&self, css: &str) -> Result<String, FormatError> {
        let spawn_error = |source| FormatError::Spawn {
            command: self.display.clone(),
            source,
        };

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(spawn_error)?;

        // Feed stdin while stdout is drained, or a chatty child blocks on a
        // full pipe. Dropping stdin at the end signals EOF.
        let stdin = child.stdin.take();
        let feed = async move {
            let Some(mut stdin) = stdin else {
                return Ok(());
            };
            match stdin.write_all(css.as_bytes()).await {
                // The child stopped reading; its exit status tells why.
                Err(err) if err.kind() == io::ErrorKind::BrokenPipe => Ok(()),
                result => result,
            }
        };
        let (fed, output) = tokio::join!(feed, child.wait_with_output());

        let output = output.map_err(spawn_error)?;
        if !output.status.success() {
            return Err(FormatError::Failed {
                command: self.display.clone(),
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        fed.map_err(spawn_error)?;

        debug!("Formatted {} bytes of CSS with `{}`", css.len(), self.display);
        String::from_utf8(output.stdout)
            .map(|text| text.trim_end().to_string())
            .map_err(|_| FormatError::InvalidOutput(self.display.clone()))
    }

    fn name(&self) -> &str {
        &self.display
    }
}

/// Pretty-prints a stylesheet.
///
/// Comments stay on the line of the declaration they follow; a comment on a
/// line of its own keeps its own line. Top-level blocks are separated by a
/// blank line.
pub fn format_css(css: &str) -> Result<String, FormatError> {
    let mut printer = Printer::default();
    let bytes = css.as_bytes();
    let mut i = 0;

    while i < css.len() {
        match bytes[i] {
            b'/' if bytes.get(i + 1) == Some(&b'*') => {
                let end = css[i + 2..]
                    .find("*/")
                    .map(|offset| i + 2 + offset + 2)
                    .ok_or(FormatError::UnterminatedComment(i))?;
                printer.comment(&css[i..end]);
                i = end;
            }
            quote @ (b'"' | b'\'') => {
                let end = find_string_end(css, i, quote).ok_or(FormatError::UnterminatedString(i))?;
                printer.pending.push_str(&css[i..end]);
                i = end;
            }
            b'(' => {
                printer.parens += 1;
                printer.pending.push('(');
                i += 1;
            }
            b')' => {
                printer.parens = printer.parens.saturating_sub(1);
                printer.pending.push(')');
                i += 1;
            }
            b'{' if printer.parens == 0 => {
                printer.open_block();
                i += 1;
            }
            b'}' if printer.parens == 0 => {
                printer.close_block(i)?;
                i += 1;
            }
            b';' if printer.parens == 0 => {
                printer.statement();
                i += 1;
            }
            _ => {
                let ch = css[i..].chars().next().unwrap_or_default();
                printer.pending.push(ch);
                i += ch.len_utf8().max(1);
            }
        }
    }

    printer.finish()
}

/// Returns the byte index just past the closing quote.
fn find_string_end(css: &str, start: usize, quote: u8) -> Option<usize> {
    let bytes = css.as_bytes();
    let mut i = start + 1;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            b if b == quote => return Some(i + 1),
            b'\n' => return None,
            _ => i += 1,
        }
    }
    None
}

#[derive(Default)]
struct Printer {
    lines: Vec<String>,
    pending: String,
    depth: usize,
    parens: usize,
    /// Set after a top-level block closes; the next output starts with a blank line.
    separate: bool,
}

impl Printer {
    fn indent(&self) -> String {
        INDENT.repeat(self.depth)
    }

    fn push_line(&mut self, text: String) {
        if self.separate {
            self.lines.push(String::new());
            self.separate = false;
        }
        self.lines.push(text);
    }

    fn take_pending(&mut self) -> String {
        let text = collapse_whitespace(&self.pending);
        self.pending.clear();
        text
    }

    fn comment(&mut self, comment: &str) {
        if self.pending.trim().is_empty() && !self.pending.contains('\n') && !self.separate {
            if let Some(last) = self.lines.last_mut() {
                if !last.is_empty() {
                    last.push(' ');
                    last.push_str(comment);
                    self.pending.clear();
                    return;
                }
            }
        }
        let pending = self.take_pending();
        if !pending.is_empty() {
            self.pending = pending;
            self.pending.push(' ');
            self.pending.push_str(comment);
            return;
        }
        let line = format!("{}{}", self.indent(), comment);
        self.push_line(line);
    }

    fn open_block(&mut self) {
        let prelude = self.take_pending();
        let line = if prelude.is_empty() {
            format!("{}{{", self.indent())
        } else {
            format!("{}{} {{", self.indent(), prelude)
        };
        self.push_line(line);
        self.depth += 1;
    }

    fn statement(&mut self) {
        let text = self.take_pending();
        if text.is_empty() {
            return;
        }
        let line = format!("{}{};", self.indent(), normalize_declaration(&text));
        self.push_line(line);
    }

    fn close_block(&mut self, at: usize) -> Result<(), FormatError> {
        if self.depth == 0 {
            return Err(FormatError::UnexpectedClose(at));
        }
        self.statement();
        self.depth -= 1;
        let line = format!("{}}}", self.indent());
        self.push_line(line);
        if self.depth == 0 {
            self.separate = true;
        }
        Ok(())
    }

    fn finish(mut self) -> Result<String, FormatError> {
        if self.depth > 0 {
            return Err(FormatError::UnclosedBlock(self.depth));
        }
        let trailing = self.take_pending();
        if !trailing.is_empty() {
            self.push_line(trailing);
        }
        Ok(self.lines.join("\n"))
    }
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// `prop:value` → `prop: value`. At-rules and selectors pass through.
fn normalize_declaration(text: &str) -> String {
    if text.starts_with('@') {
        return text.to_string();
    }
    match text.split_once(':') {
        Some((property, value)) if !property.trim().is_empty() => {
            format!("{}: {}", property.trim(), value.trim())
        }
        _ => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;
    use std::time::Duration;

    #[test]
    fn test_formats_single_rule() {
        let formatted = format_css(".p-1{padding:0.25rem;}").unwrap();
        assert_eq!(formatted, ".p-1 {\n  padding: 0.25rem;\n}");
    }

    #[test]
    fn test_keeps_trailing_comment_on_declaration_line() {
        let formatted = format_css(".p-1{padding:0.25rem; /* 4px */}").unwrap();
        assert_eq!(formatted, ".p-1 {\n  padding: 0.25rem; /* 4px */\n}");
    }

    #[test]
    fn test_layer_comment_and_blocks() {
        let css =
            "/* layer: default */\n.m-1{margin:0.25rem;}\n.hover\\:m-1:hover{margin:0.25rem;}";
        let expected = indoc! {r"
            /* layer: default */
            .m-1 {
              margin: 0.25rem;
            }

            .hover\:m-1:hover {
              margin: 0.25rem;
            }"};
        assert_eq!(format_css(css).unwrap(), expected);
    }

    #[test]
    fn test_nested_at_rule() {
        let css = "@media (min-width:640px){.sm\\:p-1{padding:0.25rem}}";
        let expected = indoc! {r"
            @media (min-width:640px) {
              .sm\:p-1 {
                padding: 0.25rem;
              }
            }"};
        assert_eq!(format_css(css).unwrap(), expected);
    }

    #[test]
    fn test_values_with_parentheses_and_strings() {
        let css = r#".a{background:url("a;b.png");color:rgba(0,0,0,var(--x));}"#;
        let expected = ".a {\n  background: url(\"a;b.png\");\n  color: rgba(0,0,0,var(--x));\n}";
        assert_eq!(format_css(css).unwrap(), expected);
    }

    #[test]
    fn test_unbalanced_input_is_an_error() {
        assert!(matches!(format_css(".a{color:red;"), Err(FormatError::UnclosedBlock(1))));
        assert!(matches!(format_css("}"), Err(FormatError::UnexpectedClose(0))));
        assert!(matches!(format_css("/* open"), Err(FormatError::UnterminatedComment(0))));
    }

    #[test]
    fn test_empty_input() {
        assert_eq!(format_css("").unwrap(), "");
    }

    #[test]
    fn test_command_formatter_parse() {
        let formatter = CommandFormatter::parse("prettier --parser css").unwrap();
        assert_eq!(formatter.program, "prettier");
        assert_eq!(formatter.args, vec!["--parser", "css"]);
        assert!(CommandFormatter::parse("   ").is_none());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_command_formatter_pipes_through_process() {
        let formatter = CommandFormatter::parse("cat").unwrap();
        let output = formatter.format(".a{color:red;}\n").await.unwrap();
        assert_eq!(output, ".a{color:red;}");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_command_formatter_failure_propagates() {
        let formatter = CommandFormatter::parse("false").unwrap();
        assert!(matches!(
            formatter.format(".a{}").await,
            Err(FormatError::Failed { .. })
        ));
    }

    fn large_stylesheet() -> String {
        (0..20_000)
            .map(|i| format!(".p-{i}{{padding:{i}rem;}}\n"))
            .collect()
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_command_formatter_output_larger_than_pipe() {
        let css = large_stylesheet();
        assert!(css.len() > 256 * 1024);

        let formatter = CommandFormatter::parse("cat").unwrap();
        let output = tokio::time::timeout(Duration::from_secs(10), formatter.format(&css))
            .await
            .expect("formatter finished")
            .unwrap();
        assert_eq!(output, css.trim_end());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_command_formatter_exiting_early_reports_status() {
        let formatter = CommandFormatter::parse("false").unwrap();
        let result = formatter.format(&large_stylesheet()).await;
        assert!(
            matches!(result, Err(FormatError::Failed { .. })),
            "unexpected result: {:?}",
            result
        );
    }
}
