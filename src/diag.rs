//! Source-anchored diagnostics.
//!
//! Every compile error is a [`Diagnostic`] value carrying a primary span and
//! optionally one note, which may have its own span ("previously defined
//! here"). Stages propagate them with `?`; the driver renders and exits, so
//! the first error still terminates the process.

use owo_colors::{OwoColorize, Style};
use std::fmt;
use std::fs;
use std::io::{self, Write};
use thiserror::Error;

use crate::types::{Location, Span};

/// The severity of a rendered message.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Level {
  /// A fatal error.
  Error,
  /// A warning (currently unused by the pipeline itself).
  Warning,
  /// Additional context attached to an error.
  Note,
}

impl Level {
  fn style(self) -> Style {
    match self {
      Level::Error => Style::new().red(),
      Level::Warning => Style::new().yellow(),
      Level::Note => Style::new().green(),
    }
  }
}

impl fmt::Display for Level {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(match self {
      Level::Error => "Error",
      Level::Warning => "Warning",
      Level::Note => "Note",
    })
  }
}

/// A note attached to a [`Diagnostic`]. With a span it renders its own
/// source context block; without one it renders as a bare banner message
/// anchored to the primary span.
#[derive(Clone, Debug)]
pub struct Note {
  /// Where the note points, if anywhere.
  pub span: Option<Span>,
  /// The note text.
  pub message: String,
}

/// A fatal, source-anchored compiler message.
#[derive(Clone, Debug, Error)]
#[error("{}: {level}: {message}", .span.start)]
pub struct Diagnostic {
  /// The severity.
  pub level: Level,
  /// The primary location.
  pub span: Span,
  /// The headline message.
  pub message: String,
  /// At most one attached note.
  pub note: Option<Note>,
}

/// Any failure of the pipeline: a compile diagnostic or an I/O error.
#[derive(Debug, Error)]
pub enum Error {
  /// A source-anchored compile error.
  #[error("{0}")]
  Diag(#[from] Box<Diagnostic>),
  /// An operating-system error (file open/read/write).
  #[error(transparent)]
  Io(#[from] io::Error),
}

/// The result type used by every stage.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// An error at a single location.
#[must_use] pub fn err_loc(loc: Location, message: impl Into<String>) -> Error {
  err_span(Span::point(loc), message)
}

/// An error covering a source range.
#[must_use] pub fn err_span(span: Span, message: impl Into<String>) -> Error {
  Box::new(Diagnostic { level: Level::Error, span, message: message.into(), note: None }).into()
}

/// An error with an unanchored note.
#[must_use] pub fn err_span_note(
  span: Span, message: impl Into<String>, note: impl Into<String>,
) -> Error {
  Box::new(Diagnostic {
    level: Level::Error,
    span,
    message: message.into(),
    note: Some(Note { span: None, message: note.into() }),
  }).into()
}

/// An error with a note pointing at a second range, for
/// "error here / previously defined there" messages.
#[must_use] pub fn err_span_note_span(
  span: Span, message: impl Into<String>, note_span: Span, note: impl Into<String>,
) -> Error {
  Box::new(Diagnostic {
    level: Level::Error,
    span,
    message: message.into(),
    note: Some(Note { span: Some(note_span), message: note.into() }),
  }).into()
}

const BANNER: &str = "---------------------------------------------------------------";

fn display_message(w: &mut impl Write, level: Level, span: &Span, msg: &str) -> io::Result<()> {
  writeln!(w, "{BANNER}")?;
  writeln!(w, "{}: {level}: {msg}", span.start)?;
  writeln!(w, "{BANNER}")
}

/// Render the header and up to ±1 line of source context, with the
/// offending range colored and a caret line carrying the message.
fn display_with_span(w: &mut impl Write, level: Level, span: &Span, msg: &str) -> io::Result<()> {
  display_message(w, level, span, msg)?;
  // Anything without a readable backing file (in-memory test sources,
  // format-string fragments of deleted files) gets the header only.
  let Ok(contents) = fs::read_to_string(&*span.start.file) else { return Ok(()) };
  let style = level.style();
  let min_line = span.start.line.saturating_sub(1).max(1);
  let max_line = span.end.line + 1;
  for (i, line) in contents.lines().enumerate() {
    let line_no = i as u32 + 1;
    if line_no > max_line { break }
    if line_no < min_line { continue }
    write!(w, "{line_no:4} | ")?;
    if line_no == span.start.line {
      let start_col = (span.start.col as usize - 1).min(line.len());
      let end_col = if span.end.line == span.start.line {
        (span.end.col as usize - 1).clamp(start_col, line.len())
      } else {
        line.len()
      };
      // columns are byte offsets; fall back to a plain line if they land
      // inside a multi-byte character
      if !line.is_char_boundary(start_col) || !line.is_char_boundary(end_col) {
        writeln!(w, "{line}")?;
        continue;
      }
      write!(w, "{}", &line[..start_col])?;
      write!(w, "{}", (&line[start_col..end_col]).style(style))?;
      writeln!(w, "{}", &line[end_col..])?;
      let caret = format!("^ {msg}");
      writeln!(w, "{:width$}{}", "", caret.style(style), width = start_col + 7)?;
    } else {
      writeln!(w, "{line}")?;
    }
  }
  Ok(())
}

impl Diagnostic {
  /// Render the full colored report.
  pub fn render(&self, w: &mut impl Write) -> io::Result<()> {
    display_with_span(w, self.level, &self.span, &self.message)?;
    match &self.note {
      Some(Note { span: Some(note_span), message }) => {
        display_with_span(w, Level::Note, note_span, message)?;
        writeln!(w, "{BANNER}")
      }
      Some(Note { span: None, message }) =>
        display_message(w, Level::Note, &self.span, message),
      None => writeln!(w, "{BANNER}"),
    }
  }
}

/// Levenshtein distance between two names.
#[must_use] pub fn edit_distance(a: &str, b: &str) -> usize {
  let (a, b) = (a.as_bytes(), b.as_bytes());
  let mut prev: Vec<usize> = (0..=b.len()).collect();
  let mut cur = vec![0; b.len() + 1];
  for (i, &ca) in a.iter().enumerate() {
    cur[0] = i + 1;
    for (j, &cb) in b.iter().enumerate() {
      let sub = prev[j] + usize::from(ca != cb);
      cur[j + 1] = sub.min(prev[j + 1] + 1).min(cur[j] + 1);
    }
    std::mem::swap(&mut prev, &mut cur);
  }
  prev[b.len()]
}

/// The closest candidate to `name`, suppressed past an edit distance of 5.
#[must_use] pub fn find_word_suggestion<'a>(
  name: &str, options: impl IntoIterator<Item = &'a str>,
) -> Option<&'a str> {
  const THRESHOLD: usize = 5;
  options.into_iter()
    .map(|opt| (edit_distance(name, opt), opt))
    .min_by_key(|&(d, _)| d)
    .filter(|&(d, _)| d <= THRESHOLD)
    .map(|(_, opt)| opt)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn edit_distance_basics() {
    assert_eq!(edit_distance("", "abc"), 3);
    assert_eq!(edit_distance("kitten", "sitting"), 3);
    assert_eq!(edit_distance("same", "same"), 0);
  }

  #[test]
  fn suggestion_threshold() {
    let opts = ["println", "print", "parse"];
    assert_eq!(find_word_suggestion("printf", opts), Some("print"));
    assert_eq!(find_word_suggestion("completely_unrelated_name", opts), None);
  }
}
