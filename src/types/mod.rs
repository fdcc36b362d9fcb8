//! Core type definitions shared by every stage of the pipeline.

use std::fmt;
use std::rc::Rc;

pub mod ast;
pub mod entity;
pub mod token;
pub mod ty;

/// A trait for newtyped indices into a vector.
pub trait Idx: Copy + Eq {
  /// Convert from `usize`.
  fn from_usize(_: usize) -> Self;
  /// Convert to `usize`.
  fn into_usize(self) -> usize;
  /// Return the current value and increment in place.
  fn fresh(&mut self) -> Self {
    let n = *self;
    *self = Self::from_usize(self.into_usize() + 1);
    n
  }
}

macro_rules! mk_id {
  ($($(#[$attr:meta])* $id:ident),* $(,)?) => {$(
    $(#[$attr])*
    #[derive(Copy, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
    pub struct $id(pub u32);

    impl $crate::types::Idx for $id {
      fn from_usize(n: usize) -> Self { Self(n as u32) }
      fn into_usize(self) -> usize { self.0 as usize }
    }

    impl std::fmt::Debug for $id {
      fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, concat!(stringify!($id), "({})"), self.0)
      }
    }
  )*}
}

mk_id! {
  /// An index into [`Program::nodes`](entity::Program::nodes).
  NodeId,
  /// An index into [`Program::vars`](entity::Program::vars).
  VarId,
  /// An index into [`Program::functions`](entity::Program::functions).
  FuncId,
  /// An index into [`Program::structures`](entity::Program::structures).
  StructId,
}

/// A position in a source file. The file name is reference counted because
/// every token and AST node carries two of these.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Location {
  /// The file this location points into.
  pub file: Rc<str>,
  /// 1-based line number.
  pub line: u32,
  /// 1-based column number.
  pub col: u32,
}

impl Location {
  /// Construct a location at the start of a file.
  #[must_use] pub fn start_of(file: impl Into<Rc<str>>) -> Self {
    Self { file: file.into(), line: 1, col: 1 }
  }
}

impl fmt::Display for Location {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}:{}:{}", self.file, self.line, self.col)
  }
}

/// A pair of locations bracketing a lexical or syntactic range.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Span {
  /// The first position covered by the range.
  pub start: Location,
  /// The position just past the range.
  pub end: Location,
}

impl Span {
  /// A degenerate span covering a single location.
  #[must_use] pub fn point(loc: Location) -> Self {
    Self { start: loc.clone(), end: loc }
  }

  /// `a.join(b)` covers from the start of `a` to the end of `b`.
  #[must_use] pub fn join(&self, other: &Span) -> Self {
    Self { start: self.start.clone(), end: other.end.clone() }
  }
}

impl fmt::Display for Span {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{} => {}", self.start, self.end)
  }
}

