//! The AST: a single tagged sum type covering expressions and statements.
//!
//! Nodes live in [`Program::nodes`](super::entity::Program::nodes) and refer
//! to each other through [`NodeId`], so the tree stays trivially movable
//! while the type checker rewrites it in place.

use super::token::TokenKind;
use super::ty::Ty;
use super::{FuncId, NodeId, Span, StructId, VarId};

/// Binary operators, including assignment forms and the word operators
/// `and`/`or`.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum BinOp {
  /// `+`
  Add,
  /// `-`
  Sub,
  /// `*`
  Mul,
  /// `/`
  Div,
  /// `%`
  Mod,
  /// `&`
  BitAnd,
  /// `|`
  BitOr,
  /// `^`
  BitXor,
  /// `and`
  And,
  /// `or`
  Or,
  /// `<`
  Lt,
  /// `<=`
  Le,
  /// `>`
  Gt,
  /// `>=`
  Ge,
  /// `==`
  Eq,
  /// `!=`
  Ne,
  /// `=`
  Assign,
  /// `+=`
  AddAssign,
  /// `-=`
  SubAssign,
  /// `*=`
  MulAssign,
  /// `/=`
  DivAssign,
}

impl BinOp {
  /// The operator a binary-operator token denotes, if any.
  #[must_use] pub fn from_token(kind: TokenKind) -> Option<Self> {
    Some(match kind {
      TokenKind::Plus => BinOp::Add,
      TokenKind::Minus => BinOp::Sub,
      TokenKind::Star => BinOp::Mul,
      TokenKind::Slash => BinOp::Div,
      TokenKind::Percent => BinOp::Mod,
      TokenKind::Ampersand => BinOp::BitAnd,
      TokenKind::Line => BinOp::BitOr,
      TokenKind::Caret => BinOp::BitXor,
      TokenKind::And => BinOp::And,
      TokenKind::Or => BinOp::Or,
      TokenKind::LessThan => BinOp::Lt,
      TokenKind::LessThanEquals => BinOp::Le,
      TokenKind::GreaterThan => BinOp::Gt,
      TokenKind::GreaterThanEquals => BinOp::Ge,
      TokenKind::EqualEquals => BinOp::Eq,
      TokenKind::NotEquals => BinOp::Ne,
      TokenKind::Equals => BinOp::Assign,
      TokenKind::PlusEquals => BinOp::AddAssign,
      TokenKind::MinusEquals => BinOp::SubAssign,
      TokenKind::StarEquals => BinOp::MulAssign,
      TokenKind::SlashEquals => BinOp::DivAssign,
      _ => return None,
    })
  }

  /// True for `=` and the compound assignments.
  #[must_use] pub fn is_assign(self) -> bool {
    matches!(self,
      BinOp::Assign | BinOp::AddAssign | BinOp::SubAssign |
      BinOp::MulAssign | BinOp::DivAssign)
  }
}

/// Prefix and postfix unary operators.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum UnOp {
  /// `-e`
  Neg,
  /// `not e`
  Not,
  /// `&e`
  Addr,
  /// `*e`
  Deref,
  /// `e?`, the pointer null check
  IsNotNull,
}

/// What an identifier resolved to. Filled in by the type checker.
#[derive(Copy, Clone, Debug, Default)]
pub enum IdentRes {
  /// Not yet resolved.
  #[default]
  Unresolved,
  /// A variable in scope.
  Var(VarId),
  /// A top-level function.
  Func(FuncId),
}

/// One arm of a `match`. A pattern with no body shares the body of the next
/// arm (the `A | B => ...` grouping).
#[derive(Clone, Debug)]
pub struct MatchCase {
  /// The pattern expression.
  pub pat: NodeId,
  /// The arm body, if this pattern terminates a group.
  pub body: Option<NodeId>,
}

/// An AST node. Statements and expressions share one shape; `etype` is set
/// on anything that yields a value.
#[derive(Clone, Debug)]
pub struct Node {
  /// The node payload.
  pub kind: NodeKind,
  /// The source range this node covers.
  pub span: Span,
  /// The type this node evaluates to, filled in by the type checker.
  pub etype: Option<Ty>,
  /// True iff every path through this node returns from the function.
  pub returns: bool,
}

impl Node {
  /// A fresh unchecked node.
  #[must_use] pub fn new(kind: NodeKind, span: Span) -> Self {
    Node { kind, span, etype: None, returns: false }
  }
}

/// The node payloads.
#[derive(Clone, Debug)]
pub enum NodeKind {
  /// An integer literal, kept as source text.
  IntLit(String),
  /// A float literal, kept as source text.
  FloatLit(String),
  /// A string literal, escapes left as written.
  StringLit(String),
  /// A character literal, escapes left as written.
  CharLit(String),
  /// `true` or `false`.
  BoolLit(bool),
  /// `null`.
  Null,
  /// A backtick format string. `parts.len() == exprs.len() + 1`; `compiled`
  /// is the C format string assembled by the type checker.
  FmtStr {
    /// Literal fragments between interpolations.
    parts: Vec<String>,
    /// Interpolated expressions, parsed by a re-entrant sub-lexer.
    exprs: Vec<NodeId>,
    /// The printf-style format string, once specifiers are known.
    compiled: Option<String>,
  },
  /// A name, late-bound to a variable or function.
  Ident {
    /// The name as written.
    name: String,
    /// The resolution, filled in by the type checker.
    res: IdentRes,
  },
  /// A unary operator application.
  Unary {
    /// The operator.
    op: UnOp,
    /// The operand.
    expr: NodeId,
  },
  /// A binary operator application (including assignments).
  Binary {
    /// The operator.
    op: BinOp,
    /// Left operand.
    lhs: NodeId,
    /// Right operand.
    rhs: NodeId,
  },
  /// `lhs[index]`
  IndexOp {
    /// The indexed pointer.
    lhs: NodeId,
    /// The index.
    index: NodeId,
  },
  /// `lhs.name`
  Member {
    /// The accessed value.
    lhs: NodeId,
    /// The member name.
    name: String,
    /// The span of the name, for diagnostics.
    name_span: Span,
    /// True when `lhs` is a pointer to a struct, so the emitter uses `->`.
    is_pointer: bool,
  },
  /// `lhs::name`
  ScopeLookup {
    /// The left-hand side; must name a struct.
    lhs: NodeId,
    /// The looked-up name.
    name: String,
  },
  /// An enum variant reference, produced by lowering a [`NodeKind::ScopeLookup`]
  /// or a bare variant pattern in an enum match.
  EnumValue {
    /// The enum definition.
    strukt: StructId,
    /// The variant name.
    variant: String,
  },
  /// A call. The receiver of a method call is injected as an extra first
  /// argument during type checking; `receiver_injected` keeps that rewrite
  /// idempotent.
  Call {
    /// The callee expression.
    callee: NodeId,
    /// The arguments.
    args: Vec<NodeId>,
    /// The resolved target, when the callee names a function or method.
    func: Option<FuncId>,
    /// Set once the method receiver has been prepended.
    receiver_injected: bool,
  },
  /// `expr as T`
  Cast {
    /// The value being cast.
    expr: NodeId,
    /// The target type.
    to: Ty,
  },
  /// `sizeof(T)`
  SizeOf(Ty),
  /// `let name [: T] [= init]`
  VarDecl {
    /// The declared variable.
    var: VarId,
    /// The initializer, if any.
    init: Option<NodeId>,
  },
  /// `if cond body [else els]`, usable as statement or expression.
  If {
    /// The condition.
    cond: NodeId,
    /// The then-branch.
    body: NodeId,
    /// The else-branch.
    els: Option<NodeId>,
  },
  /// `while cond body`
  While {
    /// The condition.
    cond: NodeId,
    /// The loop body.
    body: NodeId,
  },
  /// `for init; cond; incr body`
  For {
    /// Loop-local initializer (a declaration or assignment).
    init: Option<NodeId>,
    /// The condition, or empty for an infinite loop.
    cond: Option<NodeId>,
    /// The increment expression.
    incr: Option<NodeId>,
    /// The loop body.
    body: NodeId,
  },
  /// `match scrutinee { ... }`, usable as statement or expression.
  Match {
    /// The matched value.
    scrutinee: NodeId,
    /// The arms, in source order.
    cases: Vec<MatchCase>,
    /// The `else` arm, if present.
    default: Option<NodeId>,
    /// The span of the `else` keyword, for redundant-else diagnostics.
    default_span: Option<Span>,
  },
  /// `{ ... }`
  Block {
    /// The statements, in order.
    stmts: Vec<NodeId>,
  },
  /// `return [expr]`
  Return(Option<NodeId>),
  /// `break`
  Break,
  /// `continue`
  Continue,
  /// `yield expr`
  Yield(NodeId),
  /// `defer stmt`
  Defer(NodeId),
}

impl NodeKind {
  /// True when a call's callee is an identifier with the given name.
  /// Used to special-case `print`/`println`.
  #[must_use] pub fn callee_is(&self, nodes: &[Node], expected: &str) -> bool {
    match self {
      NodeKind::Call { callee, .. } => matches!(
        &nodes[callee.0 as usize].kind,
        NodeKind::Ident { name, .. } if name == expected),
      _ => false,
    }
  }
}
