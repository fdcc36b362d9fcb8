//! Declaration records and the [`Program`] value that owns every pool.

use bitflags::bitflags;
use hashbrown::HashSet;
use std::ops::{Index, IndexMut};
use std::rc::Rc;

use super::ast::Node;
use super::ty::Ty;
use super::{FuncId, Idx, NodeId, Span, StructId, VarId};

/// A named binding: a local, a parameter, a global, or a struct field.
#[derive(Clone, Debug)]
pub struct Variable {
  /// The declared name.
  pub name: Rc<str>,
  /// The declared or inferred type. `None` until inference runs for a
  /// `let` without an annotation.
  pub ty: Option<Ty>,
  /// Where the variable was declared.
  pub span: Span,
  /// True for `extern` globals.
  pub is_extern: bool,
  /// The C name of an extern, when it differs from `name`.
  pub extern_name: Option<String>,
}

bitflags! {
  /// Attributes on a function definition.
  #[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
  pub struct FnAttr: u8 {
    /// Declared `extern`; no body, emitted by C name.
    const EXTERN = 1;
    /// Declared with a `Struct::` prefix.
    const METHOD = 1 << 1;
    /// A method with no `this` receiver.
    const STATIC = 1 << 2;
    /// Marked `exits`; calls to it count as returning.
    const EXITS = 1 << 3;
  }
}

/// A function or method definition.
#[derive(Clone, Debug)]
pub struct FunctionDef {
  /// The declared name (without the owner prefix).
  pub name: Rc<str>,
  /// Parameters in order. For a non-static method the first one is `this`.
  pub params: Vec<VarId>,
  /// The return type.
  pub ret: Ty,
  /// The body block; `None` for externs.
  pub body: Option<NodeId>,
  /// Extern/method/static/exits markers.
  pub attr: FnAttr,
  /// The C name of an extern, when it differs from `name`.
  pub extern_name: Option<String>,
  /// The owning struct's name, for methods.
  pub owner: Option<Rc<str>>,
  /// The `Function` or `Method` type, filled during registration.
  pub ty: Option<Ty>,
  /// The span of the name in the definition header.
  pub span: Span,
}

impl FunctionDef {
  /// True for `extern` definitions.
  #[must_use] pub fn is_extern(&self) -> bool { self.attr.contains(FnAttr::EXTERN) }
  /// True for methods (static or not).
  #[must_use] pub fn is_method(&self) -> bool { self.attr.contains(FnAttr::METHOD) }
  /// True for static methods.
  #[must_use] pub fn is_static(&self) -> bool { self.attr.contains(FnAttr::STATIC) }
  /// True for `exits` (noreturn) functions.
  #[must_use] pub fn exits(&self) -> bool { self.attr.contains(FnAttr::EXITS) }
}

/// Which C aggregate a [`StructDef`] lowers to.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum StructKind {
  /// A plain `struct`.
  Struct,
  /// An untagged `union`.
  Union,
  /// An `enum`: the fields are I32-typed named discriminants.
  Enum,
}

/// A struct, union, or enum definition.
#[derive(Clone, Debug)]
pub struct StructDef {
  /// The declared name.
  pub name: Rc<str>,
  /// Struct, union, or enum.
  pub kind: StructKind,
  /// Fields in declaration order. For enums, the variants.
  pub fields: Vec<VarId>,
  /// Where the definition starts.
  pub span: Span,
  /// True when the layout is supplied by a host C header.
  pub is_extern: bool,
  /// The C name of an extern, when it differs from `name`.
  pub extern_name: Option<String>,
  /// The `Structure` type naming this definition.
  pub ty: Ty,
}

impl StructDef {
  /// True for enum definitions.
  #[must_use] pub fn is_enum(&self) -> bool { self.kind == StructKind::Enum }

  /// The field with the given name, if any.
  #[must_use] pub fn find_field(&self, prog: &Program, name: &str) -> Option<VarId> {
    self.fields.iter().copied().find(|&f| &*prog[f].name == name)
  }
}

/// The whole-program value threaded through every stage. The parser
/// allocates into the pools, the type checker rewrites in place, and the
/// emitter reads.
#[derive(Debug, Default)]
pub struct Program {
  /// Every AST node, addressed by [`NodeId`].
  pub nodes: Vec<Node>,
  /// Every variable, addressed by [`VarId`].
  pub vars: Vec<Variable>,
  /// Every function, addressed by [`FuncId`], in declaration order.
  pub functions: Vec<FunctionDef>,
  /// Every struct/union/enum, addressed by [`StructId`].
  pub structs: Vec<StructDef>,
  /// Emission order for `structs`: declaration order after parsing,
  /// topological order after type checking.
  pub structures: Vec<StructId>,
  /// Top-level `let` declarations ([`VarDecl`](super::ast::NodeKind::VarDecl) nodes).
  pub globals: Vec<NodeId>,
  /// Canonical paths already included, so each file contributes once.
  pub included_files: HashSet<String>,
  /// Extra flags for the C compiler invocation.
  pub c_flags: Vec<String>,
  /// Headers to `#include` at the top of the output.
  pub c_includes: Vec<String>,
  /// Files whose contents are inlined verbatim into the output.
  pub c_embed_headers: Vec<String>,
}

/// Strip a leading `./` so equivalent relative paths compare equal.
fn canonical(path: &str) -> &str {
  path.strip_prefix("./").unwrap_or(path)
}

impl Program {
  /// Allocate a node and return its id.
  pub fn push_node(&mut self, node: Node) -> NodeId {
    let id = NodeId::from_usize(self.nodes.len());
    self.nodes.push(node);
    id
  }

  /// Allocate a variable and return its id.
  pub fn push_var(&mut self, var: Variable) -> VarId {
    let id = VarId::from_usize(self.vars.len());
    self.vars.push(var);
    id
  }

  /// Allocate a function and return its id.
  pub fn push_function(&mut self, func: FunctionDef) -> FuncId {
    let id = FuncId::from_usize(self.functions.len());
    self.functions.push(func);
    id
  }

  /// Allocate a struct, record it in the emission order, and return its id.
  pub fn push_struct(&mut self, strukt: StructDef) -> StructId {
    let id = StructId::from_usize(self.structs.len());
    self.structs.push(strukt);
    self.structures.push(id);
    id
  }

  /// Whether a file has already been included.
  #[must_use] pub fn is_file_included(&self, path: &str) -> bool {
    self.included_files.contains(canonical(path))
  }

  /// Record a file as included.
  pub fn add_included_file(&mut self, path: &str) {
    self.included_files.insert(canonical(path).to_owned());
  }
}

macro_rules! impl_index {
  ($($id:ty => $field:ident: $out:ty,)*) => {$(
    impl Index<$id> for Program {
      type Output = $out;
      fn index(&self, i: $id) -> &$out { &self.$field[i.into_usize()] }
    }
    impl IndexMut<$id> for Program {
      fn index_mut(&mut self, i: $id) -> &mut $out { &mut self.$field[i.into_usize()] }
    }
  )*}
}

impl_index! {
  NodeId => nodes: Node,
  VarId => vars: Variable,
  FuncId => functions: FunctionDef,
  StructId => structs: StructDef,
}
