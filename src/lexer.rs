//! The lexer: a byte-oriented scanner producing a token list with spans and
//! newline-adjacency flags.

use std::rc::Rc;

use crate::diag::{err_loc, Result};
use crate::types::token::{Token, TokenKind};
use crate::types::{Location, Span};

/// Lexer state over one source buffer. A fresh instance is also spun up for
/// every format-string fragment, positioned at the fragment's location in
/// the outer file so diagnostics point into the original source.
pub struct Lexer {
  source: String,
  i: usize,
  loc: Location,
  seen_newline: bool,
  tokens: Vec<Token>,
}

impl Lexer {
  /// A lexer at the start of `file`.
  #[must_use] pub fn new(source: impl Into<String>, file: impl Into<Rc<str>>) -> Self {
    Self::at(source, Location::start_of(file))
  }

  /// A lexer whose first byte is at `loc`, for re-lexing a fragment of a
  /// larger file.
  #[must_use] pub fn at(source: impl Into<String>, loc: Location) -> Self {
    Lexer { source: source.into(), i: 0, loc, seen_newline: false, tokens: vec![] }
  }

  fn byte(&self, i: usize) -> u8 {
    *self.source.as_bytes().get(i).unwrap_or(&0)
  }

  fn peek(&self) -> u8 { self.byte(self.i + 1) }

  fn push(&mut self, mut token: Token) {
    token.seen_newline = self.seen_newline;
    self.seen_newline = false;
    self.tokens.push(token);
  }

  /// Push a fixed-width token starting at the cursor and advance past it.
  fn push_kind(&mut self, kind: TokenKind, len: usize) {
    let start = self.loc.clone();
    let text = self.source[self.i..self.i + len].to_owned();
    self.loc.col += len as u32;
    self.i += len;
    let span = Span { start, end: self.loc.clone() };
    self.push(Token { kind, span, text, seen_newline: false });
  }

  fn push_two(&mut self, next: u8, two: TokenKind, one: TokenKind) {
    if self.peek() == next { self.push_kind(two, 2) } else { self.push_kind(one, 1) }
  }

  fn lex_char_literal(&mut self) -> Result<()> {
    let start_loc = self.loc.clone();
    let start = self.i + 1;
    self.i += 1;
    if self.byte(self.i) == b'\\' { self.i += 2 } else { self.i += 1 }
    if self.i >= self.source.len() || self.byte(self.i) != b'\'' {
      self.loc.col += (self.i - start + 1) as u32;
      return Err(err_loc(self.loc.clone(), "Expected ' after character literal"));
    }
    let text = self.source[start..self.i].to_owned();
    self.loc.col += (text.len() + 2) as u32;
    self.i += 1;
    let span = Span { start: start_loc, end: self.loc.clone() };
    self.push(Token { kind: TokenKind::CharLiteral, span, text, seen_newline: false });
    Ok(())
  }

  /// Scan a `"..."` or `` `...` `` literal. The contents are kept raw; the
  /// parser splits format strings at braces later.
  fn lex_string_literal(&mut self) -> Result<()> {
    let start_loc = self.loc.clone();
    let end_char = self.byte(self.i);
    let start = self.i + 1;
    self.i += 1;
    while self.byte(self.i) != end_char {
      if self.i >= self.source.len() {
        return Err(err_loc(start_loc, "Unterminated string literal"));
      }
      if self.byte(self.i) == b'\\' { self.i += 1 }
      self.i += 1;
    }
    let text = self.source[start..self.i].to_owned();
    self.loc.col += (text.len() + 2) as u32;
    self.i += 1;
    let kind = if end_char == b'`' { TokenKind::FormatStringLiteral } else { TokenKind::StringLiteral };
    let span = Span { start: start_loc, end: self.loc.clone() };
    self.push(Token { kind, span, text, seen_newline: false });
    Ok(())
  }

  /// Run the scanner to completion. The result always ends with an `Eof`
  /// token carrying the trailing newline flag.
  pub fn lex(mut self) -> Result<Vec<Token>> {
    use TokenKind::*;
    while self.i < self.source.len() {
      let c = self.byte(self.i);
      match c {
        b' ' | b'\t' | 0x0b | b'\r' | 0x08 => {
          self.loc.col += 1;
          self.i += 1;
        }
        b'\n' => {
          self.loc.line += 1;
          self.loc.col = 1;
          self.i += 1;
          self.seen_newline = true;
        }
        b';' => self.push_kind(Semicolon, 1),
        b',' => self.push_kind(Comma, 1),
        b'.' => self.push_kind(Dot, 1),
        b'(' => self.push_kind(OpenParen, 1),
        b')' => self.push_kind(CloseParen, 1),
        b'[' => self.push_kind(OpenSquare, 1),
        b']' => self.push_kind(CloseSquare, 1),
        b'{' => self.push_kind(OpenCurly, 1),
        b'}' => self.push_kind(CloseCurly, 1),
        b'@' => self.push_kind(AtSign, 1),
        b'%' => self.push_kind(Percent, 1),
        b'^' => self.push_kind(Caret, 1),
        b'&' => self.push_kind(Ampersand, 1),
        b'|' => self.push_kind(Line, 1),
        b'?' => self.push_kind(Question, 1),
        b'!' => self.push_two(b'=', NotEquals, Exclamation),
        b':' => self.push_two(b':', ColonColon, Colon),
        b'*' => self.push_two(b'=', StarEquals, Star),
        b'+' => self.push_two(b'=', PlusEquals, Plus),
        b'-' => self.push_two(b'=', MinusEquals, Minus),
        b'<' => self.push_two(b'=', LessThanEquals, LessThan),
        b'>' => self.push_two(b'=', GreaterThanEquals, GreaterThan),
        b'=' => match self.peek() {
          b'=' => self.push_kind(EqualEquals, 2),
          b'>' => self.push_kind(FatArrow, 2),
          _ => self.push_kind(Equals, 1),
        },
        b'/' => match self.peek() {
          b'/' => {
            self.i += 1;
            while self.i < self.source.len() && self.byte(self.i) != b'\n' {
              self.i += 1;
            }
          }
          b'=' => self.push_kind(SlashEquals, 2),
          _ => self.push_kind(Slash, 1),
        },
        b'\'' => self.lex_char_literal()?,
        b'"' | b'`' => self.lex_string_literal()?,
        _ => {
          let start_loc = self.loc.clone();
          if c.is_ascii_digit() {
            let start = self.i;
            while self.byte(self.i).is_ascii_digit() { self.i += 1 }
            let kind = if self.byte(self.i) == b'.' {
              self.i += 1;
              while self.byte(self.i).is_ascii_digit() { self.i += 1 }
              FloatLiteral
            } else {
              IntLiteral
            };
            let text = self.source[start..self.i].to_owned();
            self.loc.col += text.len() as u32;
            let span = Span { start: start_loc, end: self.loc.clone() };
            self.push(Token { kind, span, text, seen_newline: false });
          } else if c.is_ascii_alphabetic() || c == b'_' {
            let start = self.i;
            while self.byte(self.i).is_ascii_alphanumeric() || self.byte(self.i) == b'_' {
              self.i += 1;
            }
            let text = self.source[start..self.i].to_owned();
            self.loc.col += text.len() as u32;
            let kind = TokenKind::from_ident(&text).unwrap_or(Identifier);
            let span = Span { start: start_loc, end: self.loc.clone() };
            self.push(Token { kind, span, text, seen_newline: false });
          } else {
            return Err(err_loc(start_loc,
              format!("Unrecognized char in lexer: '{}'", c as char)));
          }
        }
      }
    }
    log::trace!("lexed {} tokens from {}", self.tokens.len(), self.loc.file);
    self.push_kind(TokenKind::Eof, 0);
    Ok(self.tokens)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn kinds(src: &str) -> Vec<TokenKind> {
    Lexer::new(src, "test.ae").lex().unwrap().iter().map(|t| t.kind).collect()
  }

  #[test]
  fn keywords_and_idents() {
    use TokenKind::*;
    assert_eq!(kinds("def main matches"), vec![Def, Identifier, Identifier, Eof]);
    assert_eq!(kinds("let x: i32 = 5"),
      vec![Let, Identifier, Colon, I32, Equals, IntLiteral, Eof]);
  }

  #[test]
  fn two_char_operators() {
    use TokenKind::*;
    assert_eq!(kinds(":: == => != <= >= += -= *= /="),
      vec![ColonColon, EqualEquals, FatArrow, NotEquals, LessThanEquals,
           GreaterThanEquals, PlusEquals, MinusEquals, StarEquals, SlashEquals, Eof]);
  }

  #[test]
  fn literals() {
    use TokenKind::*;
    assert_eq!(kinds("12 3.5 \"hi\" 'a' '\\n' `fmt {x}`"),
      vec![IntLiteral, FloatLiteral, StringLiteral, CharLiteral, CharLiteral,
           FormatStringLiteral, Eof]);
    let toks = Lexer::new("`a {b} c`", "test.ae").lex().unwrap();
    assert_eq!(toks[0].text, "a {b} c");
  }

  #[test]
  fn comments_are_skipped() {
    use TokenKind::*;
    assert_eq!(kinds("x // comment\ny"), vec![Identifier, Identifier, Eof]);
  }

  #[test]
  fn newline_flag_attaches_to_next_token() {
    let toks = Lexer::new("a\nb c", "test.ae").lex().unwrap();
    assert!(!toks[0].seen_newline);
    assert!(toks[1].seen_newline);
    assert!(!toks[2].seen_newline);
  }

  #[test]
  fn spans_are_monotonic() {
    let toks = Lexer::new("let x = 1 + 2\nlet y = x", "test.ae").lex().unwrap();
    for t in &toks {
      assert!((t.span.start.line, t.span.start.col) <= (t.span.end.line, t.span.end.col));
    }
    for w in toks.windows(2) {
      assert!((w[0].span.start.line, w[0].span.start.col)
        <= (w[1].span.start.line, w[1].span.start.col));
    }
  }

  #[test]
  fn lex_round_trip_preserves_kinds() {
    let src = "def main(): i32 { let x = if true then 10 else 20 return x }";
    let first = Lexer::new(src, "a.ae").lex().unwrap();
    let rebuilt: String = first.iter().map(|t| t.text.as_str())
      .collect::<Vec<_>>().join(" ");
    let second = Lexer::new(rebuilt, "b.ae").lex().unwrap();
    let k1: Vec<_> = first.iter().map(|t| t.kind).collect();
    let k2: Vec<_> = second.iter().map(|t| t.kind).collect();
    assert_eq!(k1, k2);
  }

  #[test]
  fn unknown_byte_is_fatal() {
    assert!(Lexer::new("let $ = 1", "test.ae").lex().is_err());
  }

  #[test]
  fn unterminated_string_is_fatal() {
    assert!(Lexer::new("\"never closed", "test.ae").lex().is_err());
  }

  #[test]
  fn unterminated_char_is_fatal() {
    assert!(Lexer::new("'ab", "test.ae").lex().is_err());
  }
}
