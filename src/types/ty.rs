//! The type representation and its comparison rules.

use std::fmt;
use std::rc::Rc;
use super::{FuncId, NodeId, Span};

/// A reference-counted handle to a [`Type`]. Types are immutable once built;
/// sharing them is how the same instance can hang off many AST nodes.
pub type Ty = Rc<Type>;

/// A type with the span it was written at (or the span of the expression
/// that produced it, for inferred types).
#[derive(Clone, Debug)]
pub struct Type {
  /// The type constructor.
  pub kind: TyKind,
  /// Where this type came from, for diagnostics.
  pub span: Span,
}

/// The type constructors of the language.
#[derive(Clone, Debug)]
pub enum TyKind {
  /// `char`
  Char,
  /// `i32`
  I32,
  /// `f32`
  F32,
  /// `bool`
  Bool,
  /// `u8`
  U8,
  /// `void`
  Void,
  /// `&T`. `&char` is the predefined `string`; `&void` is `untyped_ptr`
  /// and is assignment-compatible with every pointer.
  Pointer(Ty),
  /// `T[n]`. The size is kept as an unevaluated expression and emitted
  /// verbatim as the C array bound.
  Array(Ty, NodeId),
  /// A named struct, union, or enum. The name is resolved against the
  /// struct table during type checking.
  Structure(Rc<str>),
  /// The type of a free function, or of a `fn(...)` pointer when `def`
  /// is `None`.
  Function {
    /// Parameter types, in order.
    params: Vec<Ty>,
    /// The return type.
    ret: Ty,
    /// The definition this type was built from, if any.
    def: Option<FuncId>,
  },
  /// The type of a method. Distinguished from [`TyKind::Function`] so the
  /// call checker knows to inject the receiver argument.
  Method {
    /// The struct the method belongs to.
    owner: Rc<str>,
    /// Parameter types including the receiver, in order.
    params: Vec<Ty>,
    /// The return type.
    ret: Ty,
    /// The definition this type was built from.
    def: FuncId,
  },
}

impl Type {
  /// Allocate a new type handle.
  #[must_use] pub fn new(kind: TyKind, span: Span) -> Ty {
    Rc::new(Type { kind, span })
  }

  /// A pointer to a fresh base type, both at `span`.
  #[must_use] pub fn ptr_to(kind: TyKind, span: Span) -> Ty {
    let inner = Type::new(kind, span.clone());
    Type::new(TyKind::Pointer(inner), span)
  }

  /// True for `i32` and `f32`.
  #[must_use] pub fn is_numeric(&self) -> bool {
    matches!(self.kind, TyKind::I32 | TyKind::F32)
  }

  /// True for `&char`.
  #[must_use] pub fn is_string(&self) -> bool {
    matches!(&self.kind, TyKind::Pointer(p) if matches!(p.kind, TyKind::Char))
  }

  /// True for a struct or a pointer to one.
  #[must_use] pub fn is_struct_or_ptr(&self) -> bool {
    match &self.kind {
      TyKind::Structure(_) => true,
      TyKind::Pointer(p) => matches!(p.kind, TyKind::Structure(_)),
      _ => false,
    }
  }

  /// The struct name, if this is a struct or a pointer to one. The second
  /// component is true when the access goes through a pointer.
  #[must_use] pub fn struct_name(&self) -> Option<(&Rc<str>, bool)> {
    match &self.kind {
      TyKind::Structure(name) => Some((name, false)),
      TyKind::Pointer(p) => match &p.kind {
        TyKind::Structure(name) => Some((name, true)),
        _ => None,
      },
      _ => None,
    }
  }

  /// Structural equality. `&void` is compatible with every pointer, struct
  /// types compare by name, function types compare pointwise, and method
  /// types never compare equal.
  #[must_use] pub fn eq(&self, other: &Type) -> bool {
    match (&self.kind, &other.kind) {
      (TyKind::Pointer(a), TyKind::Pointer(b)) =>
        matches!(a.kind, TyKind::Void) || matches!(b.kind, TyKind::Void) || a.eq(b),
      (TyKind::Structure(a), TyKind::Structure(b)) => a == b,
      (TyKind::Function { params: pa, ret: ra, .. },
       TyKind::Function { params: pb, ret: rb, .. }) =>
        ra.eq(rb) && pa.len() == pb.len() &&
        pa.iter().zip(pb).all(|(a, b)| a.eq(b)),
      (TyKind::Method { .. }, TyKind::Method { .. }) => false,
      (a, b) => std::mem::discriminant(a) == std::mem::discriminant(b),
    }
  }
}

/// Decay an array type to a pointer to its element type. Non-array types
/// pass through unchanged.
#[must_use] pub fn decay_array(ty: &Ty) -> Ty {
  match &ty.kind {
    TyKind::Array(elem, _) => Type::new(TyKind::Pointer(elem.clone()), ty.span.clone()),
    _ => ty.clone(),
  }
}

impl fmt::Display for Type {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match &self.kind {
      TyKind::Char => write!(f, "char"),
      TyKind::I32 => write!(f, "i32"),
      TyKind::F32 => write!(f, "f32"),
      TyKind::Bool => write!(f, "bool"),
      TyKind::U8 => write!(f, "u8"),
      TyKind::Void => write!(f, "void"),
      TyKind::Pointer(p) => write!(f, "&{p}"),
      TyKind::Array(elem, _) => write!(f, "[{elem}]"),
      TyKind::Structure(name) => write!(f, "{name}"),
      TyKind::Function { .. } => write!(f, "<function>"),
      TyKind::Method { .. } => write!(f, "<method>"),
    }
  }
}
