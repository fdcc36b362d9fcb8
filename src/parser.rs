//! The parser: recursive descent with one-token lookahead.
//!
//! A context stack lets the parser swap its token list when it enters a
//! sub-lexer, which happens for `use` includes and for the expression
//! fragments of backtick format strings. The previous cursor is restored on
//! pop, so parsing continues exactly where it left off in the outer file.

use smallvec::SmallVec;
use std::fs;
use std::path::Path;
use std::rc::Rc;

use crate::diag::{err_span, Error, Result};
use crate::lexer::Lexer;
use crate::types::ast::{BinOp, MatchCase, Node, NodeKind, UnOp};
use crate::types::entity::{FnAttr, FunctionDef, Program, StructDef, StructKind, Variable};
use crate::types::token::{Token, TokenKind};
use crate::types::ty::{Ty, TyKind, Type};
use crate::types::{NodeId, Span, VarId};

/// A saved token cursor, restored when a sub-lexer context is popped.
struct ParserContext {
  tokens: Vec<Token>,
  curr: usize,
}

/// Parser state. One instance drives the whole include graph.
pub struct Parser {
  tokens: Vec<Token>,
  curr: usize,
  include_dirs: Vec<String>,
  project_root: String,
  context_stack: SmallVec<[ParserContext; 2]>,
}

impl Parser {
  /// A parser over the entry file's tokens. The include search starts with
  /// `.`; the `@/` prefix resolves against the entry file's directory.
  #[must_use] pub fn new(tokens: Vec<Token>, filename: &str) -> Self {
    let project_root = Path::new(filename).parent()
      .map_or_else(|| ".".to_owned(), |p| p.display().to_string());
    let project_root = if project_root.is_empty() { ".".to_owned() } else { project_root };
    Parser {
      tokens,
      curr: 0,
      include_dirs: vec![".".to_owned()],
      project_root,
      context_stack: SmallVec::new(),
    }
  }

  /// Append an include root to the search path.
  pub fn add_include_dir(&mut self, dir: impl Into<String>) {
    self.include_dirs.push(dir.into());
  }

  fn push_context(&mut self, tokens: Vec<Token>) {
    let tokens = std::mem::replace(&mut self.tokens, tokens);
    self.context_stack.push(ParserContext { tokens, curr: self.curr });
    self.curr = 0;
  }

  fn pop_context(&mut self) {
    let ctx = self.context_stack.pop().expect("unbalanced context stack");
    self.tokens = ctx.tokens;
    self.curr = ctx.curr;
  }

  fn token(&self) -> &Token { &self.tokens[self.curr] }

  fn span(&self) -> Span { self.token().span.clone() }

  fn token_is(&self, kind: TokenKind) -> bool {
    if kind == TokenKind::Newline {
      return self.token().seen_newline;
    }
    self.token().kind == kind
  }

  fn consume_if(&mut self, kind: TokenKind) -> bool {
    if self.token_is(kind) {
      if kind != TokenKind::Newline {
        self.curr += 1;
      }
      return true;
    }
    false
  }

  /// Accept the explicit terminator, or require that the next token sits on
  /// a new line. A closing brace or the end of input also terminates the
  /// statement (without being consumed).
  fn consume_newline_or(&mut self, kind: TokenKind) -> Result<()> {
    if self.token_is(kind) {
      self.curr += 1;
    } else if !self.token().seen_newline
      && !matches!(self.token().kind, TokenKind::CloseCurly | TokenKind::Eof)
    {
      return Err(self.err(format!("Expected {kind} or newline")));
    }
    Ok(())
  }

  fn consume(&mut self, kind: TokenKind) -> Result<Token> {
    let tok = self.token().clone();
    if !self.consume_if(kind) {
      return Err(self.err(format!("Expected {kind}")));
    }
    Ok(tok)
  }

  fn err(&self, msg: impl Into<String>) -> Error {
    err_span(self.span(), msg)
  }

  fn unhandled(&self, func: &str) -> Error {
    self.err(format!("Unexpected token in {func}: {}", self.token().kind))
  }

  /// Zero or more `&`, a base type, then zero or more `[size]` suffixes.
  /// The first `&` written is the outermost pointer; arrays wrap the whole.
  fn parse_type(&mut self, prog: &mut Program) -> Result<Ty> {
    let start_span = self.span();
    let mut ptrs = 0usize;
    while self.token_is(TokenKind::Ampersand) {
      ptrs += 1;
      self.curr += 1;
    }
    let base_span = start_span.join(&self.span());
    let mut ty = match self.token().kind {
      TokenKind::I32 => { self.curr += 1; Type::new(TyKind::I32, base_span) }
      TokenKind::Bool => { self.curr += 1; Type::new(TyKind::Bool, base_span) }
      TokenKind::Char => { self.curr += 1; Type::new(TyKind::Char, base_span) }
      TokenKind::U8 => { self.curr += 1; Type::new(TyKind::U8, base_span) }
      TokenKind::F32 => { self.curr += 1; Type::new(TyKind::F32, base_span) }
      TokenKind::String => { self.curr += 1; Type::ptr_to(TyKind::Char, base_span) }
      TokenKind::UntypedPtr => { self.curr += 1; Type::ptr_to(TyKind::Void, base_span) }
      TokenKind::Identifier => {
        let name = self.consume(TokenKind::Identifier)?;
        Type::new(TyKind::Structure(name.text.into()), base_span)
      }
      TokenKind::Fn => {
        self.consume(TokenKind::Fn)?;
        self.consume(TokenKind::OpenParen)?;
        let mut params = vec![];
        while !self.token_is(TokenKind::CloseParen) {
          params.push(self.parse_type(prog)?);
          if !self.token_is(TokenKind::CloseParen) {
            self.consume(TokenKind::Comma)?;
          }
        }
        self.consume(TokenKind::CloseParen)?;
        let ret = if self.consume_if(TokenKind::Colon) {
          self.parse_type(prog)?
        } else {
          Type::new(TyKind::Void, self.span())
        };
        Type::new(TyKind::Function { params, ret, def: None },
          start_span.join(&self.span()))
      }
      _ => return Err(self.unhandled("parse_type")),
    };
    for _ in 0..ptrs {
      ty = Type::new(TyKind::Pointer(ty), start_span.join(&self.span()));
    }
    while self.token_is(TokenKind::OpenSquare) {
      self.consume(TokenKind::OpenSquare)?;
      let size = self.parse_expression(prog, TokenKind::CloseSquare)?;
      let span = start_span.join(&self.span());
      self.consume(TokenKind::CloseSquare)?;
      ty = Type::new(TyKind::Array(ty, size), span);
    }
    Ok(ty)
  }

  /// Split a backtick literal at unescaped balanced braces, then parse every
  /// brace fragment through a fresh lexer positioned at the fragment's
  /// column in the outer file.
  fn parse_format_string(&mut self, prog: &mut Program) -> Result<NodeId> {
    let fstr = self.consume(TokenKind::FormatStringLiteral)?;
    let bytes = fstr.text.as_bytes();
    let mut parts = vec![];
    let mut expr_parts: Vec<(usize, String)> = vec![];
    let mut count = 0i32;
    let mut cur_start = 0usize;
    for (i, &b) in bytes.iter().enumerate() {
      if b == b'{' {
        if count == 0 {
          parts.push(fstr.text[cur_start..i].to_owned());
          cur_start = i + 1;
        }
        count += 1;
      } else if b == b'}' {
        count -= 1;
        if count == 0 {
          expr_parts.push((cur_start, fstr.text[cur_start..i].to_owned()));
          cur_start = i + 1;
        } else if count < 0 {
          return Err(err_span(fstr.span, "Unmatched '}' in format string"));
        }
      }
    }
    if count != 0 {
      return Err(err_span(fstr.span, "Unmatched '{' in format string"));
    }
    parts.push(fstr.text[cur_start..].to_owned());

    let mut exprs = vec![];
    for (start, part) in expr_parts {
      let mut loc = fstr.span.start.clone();
      loc.col += start as u32 + 1;
      let tokens = Lexer::at(part, loc).lex()?;
      self.push_context(tokens);
      let expr = self.parse_expression(prog, TokenKind::CloseCurly);
      self.pop_context();
      exprs.push(expr?);
    }
    Ok(prog.push_node(Node::new(
      NodeKind::FmtStr { parts, exprs, compiled: None }, fstr.span)))
  }

  fn parse_factor(&mut self, prog: &mut Program, end_type: TokenKind) -> Result<NodeId> {
    let mut node = match self.token().kind {
      TokenKind::FormatStringLiteral => self.parse_format_string(prog)?,
      TokenKind::IntLiteral => {
        let tok = self.consume(TokenKind::IntLiteral)?;
        prog.push_node(Node::new(NodeKind::IntLit(tok.text), tok.span))
      }
      TokenKind::FloatLiteral => {
        let tok = self.consume(TokenKind::FloatLiteral)?;
        prog.push_node(Node::new(NodeKind::FloatLit(tok.text), tok.span))
      }
      TokenKind::StringLiteral => {
        let tok = self.consume(TokenKind::StringLiteral)?;
        prog.push_node(Node::new(NodeKind::StringLit(tok.text), tok.span))
      }
      TokenKind::CharLiteral => {
        let tok = self.consume(TokenKind::CharLiteral)?;
        prog.push_node(Node::new(NodeKind::CharLit(tok.text), tok.span))
      }
      TokenKind::True | TokenKind::False => {
        let tok = self.consume(self.token().kind)?;
        let value = tok.kind == TokenKind::True;
        prog.push_node(Node::new(NodeKind::BoolLit(value), tok.span))
      }
      TokenKind::Null => {
        let tok = self.consume(TokenKind::Null)?;
        prog.push_node(Node::new(NodeKind::Null, tok.span))
      }
      TokenKind::Dot => {
        // `.name` is shorthand for `this.name`
        let op = self.consume(TokenKind::Dot)?;
        let rhs = self.consume(TokenKind::Identifier)?;
        let lhs = prog.push_node(Node::new(
          NodeKind::Ident { name: "this".to_owned(), res: Default::default() },
          op.span.clone()));
        prog.push_node(Node::new(
          NodeKind::Member {
            lhs, name: rhs.text, name_span: rhs.span.clone(), is_pointer: false,
          },
          op.span.join(&rhs.span)))
      }
      TokenKind::Minus => self.parse_prefix(prog, TokenKind::Minus, UnOp::Neg, end_type)?,
      TokenKind::Not => self.parse_prefix(prog, TokenKind::Not, UnOp::Not, end_type)?,
      TokenKind::Ampersand =>
        self.parse_prefix(prog, TokenKind::Ampersand, UnOp::Addr, end_type)?,
      TokenKind::Star => self.parse_prefix(prog, TokenKind::Star, UnOp::Deref, end_type)?,
      TokenKind::Identifier => {
        let tok = self.consume(TokenKind::Identifier)?;
        prog.push_node(Node::new(
          NodeKind::Ident { name: tok.text, res: Default::default() }, tok.span))
      }
      TokenKind::OpenParen => {
        let open = self.consume(TokenKind::OpenParen)?;
        let node = self.parse_expression(prog, TokenKind::CloseParen)?;
        let close = self.consume(TokenKind::CloseParen)?;
        prog[node].span = open.span.join(&close.span);
        node
      }
      TokenKind::SizeOf => {
        let start = self.consume(TokenKind::SizeOf)?;
        self.consume(TokenKind::OpenParen)?;
        let ty = self.parse_type(prog)?;
        let close = self.consume(TokenKind::CloseParen)?;
        prog.push_node(Node::new(NodeKind::SizeOf(ty), start.span.join(&close.span)))
      }
      TokenKind::Match => self.parse_match(prog)?,
      TokenKind::If => self.parse_if(prog)?,
      _ => return Err(self.unhandled("parse_expression")),
    };

    loop {
      if self.token_is(end_type) {
        break;
      }
      match self.token().kind {
        TokenKind::OpenParen => {
          let paren_span = self.consume(TokenKind::OpenParen)?.span;
          let mut args = vec![];
          while !self.token_is(TokenKind::CloseParen) {
            args.push(self.parse_expression(prog, TokenKind::Comma)?);
            if !self.token_is(TokenKind::CloseParen) {
              self.consume(TokenKind::Comma)?;
            }
          }
          self.consume(TokenKind::CloseParen)?;
          node = prog.push_node(Node::new(
            NodeKind::Call { callee: node, args, func: None, receiver_injected: false },
            paren_span));
        }
        TokenKind::OpenSquare => {
          self.consume(TokenKind::OpenSquare)?;
          let index = self.parse_expression(prog, TokenKind::CloseSquare)?;
          self.consume(TokenKind::CloseSquare)?;
          let span = prog[node].span.join(&prog[index].span);
          node = prog.push_node(Node::new(NodeKind::IndexOp { lhs: node, index }, span));
        }
        TokenKind::Dot => {
          self.consume(TokenKind::Dot)?;
          let name = self.consume(TokenKind::Identifier)?;
          let span = prog[node].span.join(&name.span);
          node = prog.push_node(Node::new(
            NodeKind::Member {
              lhs: node, name: name.text, name_span: name.span, is_pointer: false,
            },
            span));
        }
        TokenKind::ColonColon => {
          self.consume(TokenKind::ColonColon)?;
          let name = self.consume(TokenKind::Identifier)?;
          let span = prog[node].span.join(&name.span);
          node = prog.push_node(Node::new(
            NodeKind::ScopeLookup { lhs: node, name: name.text }, span));
        }
        TokenKind::As => {
          self.consume(TokenKind::As)?;
          let ty = self.parse_type(prog)?;
          let span = prog[node].span.join(&ty.span);
          node = prog.push_node(Node::new(NodeKind::Cast { expr: node, to: ty }, span));
        }
        TokenKind::Question => {
          let q = self.consume(TokenKind::Question)?;
          let span = prog[node].span.join(&q.span);
          node = prog.push_node(Node::new(
            NodeKind::Unary { op: UnOp::IsNotNull, expr: node }, span));
        }
        _ => break,
      }
    }
    Ok(node)
  }

  fn parse_prefix(
    &mut self, prog: &mut Program, tok: TokenKind, op: UnOp, end_type: TokenKind,
  ) -> Result<NodeId> {
    let op_tok = self.consume(tok)?;
    let expr = self.parse_factor(prog, end_type)?;
    let span = op_tok.span.join(&prog[expr].span);
    Ok(prog.push_node(Node::new(NodeKind::Unary { op, expr }, span)))
  }

  fn binop(&mut self, prog: &mut Program, op: BinOp, lhs: NodeId, rhs: NodeId) -> NodeId {
    let span = prog[lhs].span.join(&prog[rhs].span);
    prog.push_node(Node::new(NodeKind::Binary { op, lhs, rhs }, span))
  }

  /// One level of the precedence ladder: left-associative application of any
  /// operator in `ops`, with `sub` parsing the next-tighter level.
  fn parse_level(
    &mut self, prog: &mut Program, end_type: TokenKind, ops: &[TokenKind],
    sub: fn(&mut Self, &mut Program, TokenKind) -> Result<NodeId>,
  ) -> Result<NodeId> {
    let mut lhs = sub(self, prog, end_type)?;
    while ops.iter().any(|&op| self.token_is(op)) {
      if self.token_is(end_type) {
        break;
      }
      let op = BinOp::from_token(self.token().kind).expect("operator table mismatch");
      self.curr += 1;
      let rhs = sub(self, prog, end_type)?;
      lhs = self.binop(prog, op, lhs, rhs);
    }
    Ok(lhs)
  }

  fn parse_term(&mut self, prog: &mut Program, end: TokenKind) -> Result<NodeId> {
    use TokenKind::*;
    self.parse_level(prog, end, &[Star, Slash, Percent], Self::parse_factor)
  }

  fn parse_additive(&mut self, prog: &mut Program, end: TokenKind) -> Result<NodeId> {
    use TokenKind::*;
    self.parse_level(prog, end, &[Plus, Minus], Self::parse_term)
  }

  fn parse_bw_and(&mut self, prog: &mut Program, end: TokenKind) -> Result<NodeId> {
    self.parse_level(prog, end, &[TokenKind::Ampersand], Self::parse_additive)
  }

  fn parse_bw_xor(&mut self, prog: &mut Program, end: TokenKind) -> Result<NodeId> {
    self.parse_level(prog, end, &[TokenKind::Caret], Self::parse_bw_and)
  }

  fn parse_bw_or(&mut self, prog: &mut Program, end: TokenKind) -> Result<NodeId> {
    self.parse_level(prog, end, &[TokenKind::Line], Self::parse_bw_xor)
  }

  fn parse_relational(&mut self, prog: &mut Program, end: TokenKind) -> Result<NodeId> {
    use TokenKind::*;
    self.parse_level(prog, end,
      &[LessThan, GreaterThan, LessThanEquals, GreaterThanEquals, EqualEquals, NotEquals],
      Self::parse_bw_or)
  }

  fn parse_logical_and(&mut self, prog: &mut Program, end: TokenKind) -> Result<NodeId> {
    self.parse_level(prog, end, &[TokenKind::And], Self::parse_relational)
  }

  fn parse_logical_or(&mut self, prog: &mut Program, end: TokenKind) -> Result<NodeId> {
    self.parse_level(prog, end, &[TokenKind::Or], Self::parse_logical_and)
  }

  /// Assignment is right-associative and sits at the bottom of the ladder.
  pub fn parse_expression(&mut self, prog: &mut Program, end_type: TokenKind) -> Result<NodeId> {
    use TokenKind::*;
    let mut lhs = self.parse_logical_or(prog, end_type)?;
    while [Equals, PlusEquals, MinusEquals, StarEquals, SlashEquals]
      .iter().any(|&op| self.token_is(op))
    {
      if self.token_is(end_type) {
        break;
      }
      let op = BinOp::from_token(self.token().kind).expect("operator table mismatch");
      self.curr += 1;
      let rhs = self.parse_expression(prog, end_type)?;
      lhs = self.binop(prog, op, lhs, rhs);
    }
    Ok(lhs)
  }

  fn parse_match(&mut self, prog: &mut Program) -> Result<NodeId> {
    let op = self.consume(TokenKind::Match)?;
    let scrutinee = self.parse_expression(prog, TokenKind::OpenCurly)?;
    let span = op.span.join(&prog[scrutinee].span);
    let mut cases = vec![];
    let mut default = None;
    let mut default_span = None;
    self.consume(TokenKind::OpenCurly)?;
    while !self.token_is(TokenKind::CloseCurly) {
      if self.token_is(TokenKind::Else) {
        default_span = Some(self.span());
        self.consume(TokenKind::Else)?;
        self.consume(TokenKind::FatArrow)?;
        default = Some(self.parse_statement(prog)?);
      } else {
        let pat = self.parse_factor(prog, TokenKind::Line)?;
        let mut body = None;
        if !self.consume_if(TokenKind::Line) {
          self.consume(TokenKind::FatArrow)?;
          body = Some(self.parse_statement(prog)?);
          if !self.token_is(TokenKind::CloseCurly) {
            self.consume_newline_or(TokenKind::Comma)?;
          }
        }
        cases.push(MatchCase { pat, body });
      }
    }
    self.consume(TokenKind::CloseCurly)?;
    Ok(prog.push_node(Node::new(
      NodeKind::Match { scrutinee, cases, default, default_span }, span)))
  }

  fn parse_if(&mut self, prog: &mut Program) -> Result<NodeId> {
    let start_span = self.span();
    self.consume(TokenKind::If)?;
    let cond = self.parse_expression(prog, TokenKind::Newline)?;
    self.consume_if(TokenKind::Then);
    let body = self.parse_statement(prog)?;
    let mut end_span = prog[body].span.clone();
    let mut els = None;
    if self.consume_if(TokenKind::Else) {
      let e = self.parse_statement(prog)?;
      end_span = prog[e].span.clone();
      els = Some(e);
    }
    Ok(prog.push_node(Node::new(
      NodeKind::If { cond, body, els }, start_span.join(&end_span))))
  }

  fn parse_statement(&mut self, prog: &mut Program) -> Result<NodeId> {
    let start_span = self.span();
    Ok(match self.token().kind {
      TokenKind::Match => self.parse_match(prog)?,
      TokenKind::If => self.parse_if(prog)?,
      TokenKind::OpenCurly => self.parse_block(prog)?,
      TokenKind::Return => {
        self.consume(TokenKind::Return)?;
        let expr = if self.token().seen_newline || self.token_is(TokenKind::CloseCurly) {
          None
        } else {
          Some(self.parse_expression(prog, TokenKind::Newline)?)
        };
        let span = start_span.join(&self.span());
        let node = prog.push_node(Node::new(NodeKind::Return(expr), span));
        self.consume_newline_or(TokenKind::Semicolon)?;
        node
      }
      TokenKind::Break => {
        let node = prog.push_node(Node::new(NodeKind::Break, start_span));
        self.consume(TokenKind::Break)?;
        self.consume_newline_or(TokenKind::Semicolon)?;
        node
      }
      TokenKind::Continue => {
        self.consume(TokenKind::Continue)?;
        let node = prog.push_node(Node::new(NodeKind::Continue, start_span));
        self.consume_newline_or(TokenKind::Semicolon)?;
        node
      }
      TokenKind::Defer => {
        self.consume(TokenKind::Defer)?;
        let stmt = self.parse_statement(prog)?;
        let span = start_span.join(&prog[stmt].span);
        prog.push_node(Node::new(NodeKind::Defer(stmt), span))
      }
      TokenKind::Yield => {
        self.consume(TokenKind::Yield)?;
        let expr = self.parse_expression(prog, TokenKind::Newline)?;
        let span = start_span.join(&prog[expr].span);
        let node = prog.push_node(Node::new(NodeKind::Yield(expr), span));
        self.consume_newline_or(TokenKind::Semicolon)?;
        node
      }
      TokenKind::While => {
        self.consume(TokenKind::While)?;
        let cond = self.parse_expression(prog, TokenKind::Newline)?;
        let body = self.parse_statement(prog)?;
        let span = start_span.join(&prog[body].span);
        prog.push_node(Node::new(NodeKind::While { cond, body }, span))
      }
      TokenKind::For => {
        self.consume(TokenKind::For)?;
        let mut init = None;
        if !self.token_is(TokenKind::Semicolon) {
          let stmt = self.parse_statement(prog)?;
          match &prog[stmt].kind {
            NodeKind::VarDecl { .. } => {}
            NodeKind::Binary { op, .. } if *op == BinOp::Assign => {}
            _ => return Err(err_span(prog[stmt].span.clone(), "Invalid for loop initializer")),
          }
          init = Some(stmt);
          // the init statement may have eaten the separating semicolon
          if self.tokens[self.curr - 1].kind == TokenKind::Semicolon {
            self.curr -= 1;
          }
        }
        self.consume(TokenKind::Semicolon)?;
        let cond = if self.token_is(TokenKind::Semicolon) {
          None
        } else {
          Some(self.parse_expression(prog, TokenKind::Semicolon)?)
        };
        self.consume(TokenKind::Semicolon)?;
        let incr = if self.token_is(TokenKind::OpenCurly) {
          None
        } else {
          Some(self.parse_expression(prog, TokenKind::Newline)?)
        };
        let body = self.parse_statement(prog)?;
        let span = start_span.join(&prog[body].span);
        prog.push_node(Node::new(NodeKind::For { init, cond, incr, body }, span))
      }
      TokenKind::Let => {
        self.consume(TokenKind::Let)?;
        let name = self.consume(TokenKind::Identifier)?;
        let mut end_span = name.span.clone();
        let mut ty = None;
        if self.consume_if(TokenKind::Colon) {
          let t = self.parse_type(prog)?;
          end_span = t.span.clone();
          ty = Some(t);
        }
        let mut init = None;
        if self.consume_if(TokenKind::Equals) {
          let e = self.parse_expression(prog, TokenKind::Newline)?;
          end_span = prog[e].span.clone();
          init = Some(e);
        }
        self.consume_newline_or(TokenKind::Semicolon)?;
        let var = prog.push_var(Variable {
          name: name.text.into(), ty, span: name.span,
          is_extern: false, extern_name: None,
        });
        prog.push_node(Node::new(
          NodeKind::VarDecl { var, init }, start_span.join(&end_span)))
      }
      _ => {
        let node = self.parse_expression(prog, TokenKind::Newline)?;
        self.consume_if(TokenKind::Semicolon);
        node
      }
    })
  }

  fn parse_block(&mut self, prog: &mut Program) -> Result<NodeId> {
    let span = self.span();
    self.consume(TokenKind::OpenCurly)?;
    let mut stmts = vec![];
    while !self.token_is(TokenKind::CloseCurly) {
      stmts.push(self.parse_statement(prog)?);
    }
    self.consume(TokenKind::CloseCurly)?;
    Ok(prog.push_node(Node::new(NodeKind::Block { stmts }, span)))
  }

  /// The owner name a method declaration's prefix type denotes: a struct
  /// name, or the predefined `string`.
  fn method_owner(ty: &Ty) -> Option<Rc<str>> {
    match &ty.kind {
      TyKind::Structure(name) => Some(name.clone()),
      _ if ty.is_string() => Some("string".into()),
      _ => None,
    }
  }

  fn parse_function(&mut self, prog: &mut Program) -> Result<FunctionDef> {
    self.consume(TokenKind::Def)?;
    let mut attr = FnAttr::empty();
    let mut owner = None;
    let mut struct_type = None;
    if self.tokens[self.curr + 1].kind == TokenKind::ColonColon {
      let ty = self.parse_type(prog)?;
      let Some(name) = Self::method_owner(&ty) else {
        return Err(err_span(ty.span.clone(), "Invalid type in method declaration"));
      };
      owner = Some(name);
      attr |= FnAttr::METHOD;
      struct_type = Some(ty);
      self.consume(TokenKind::ColonColon)?;
    }
    let name = self.consume(TokenKind::Identifier)?;
    self.consume(TokenKind::OpenParen)?;
    let mut params: Vec<VarId> = vec![];
    let mut is_static = false;
    while !self.token_is(TokenKind::CloseParen) {
      let found_amp = self.consume_if(TokenKind::Ampersand);
      let var_name = self.consume(TokenKind::Identifier)?;
      let mut ty = None;
      if params.is_empty() && attr.contains(FnAttr::METHOD) {
        if var_name.text == "this" {
          let mut this_ty = struct_type.clone().expect("method without owner type");
          if found_amp {
            this_ty = Type::new(TyKind::Pointer(this_ty), name.span.clone());
          }
          ty = Some(this_ty);
        } else if found_amp {
          return Err(err_span(var_name.span, "Expected 'this' over here"));
        } else {
          is_static = true;
        }
      }
      let ty = match ty {
        Some(ty) => ty,
        None => {
          self.consume(TokenKind::Colon)?;
          self.parse_type(prog)?
        }
      };
      params.push(prog.push_var(Variable {
        name: var_name.text.into(), ty: Some(ty), span: var_name.span,
        is_extern: false, extern_name: None,
      }));
      if !self.token_is(TokenKind::CloseParen) {
        self.consume(TokenKind::Comma)?;
      }
    }
    self.consume(TokenKind::CloseParen)?;
    if attr.contains(FnAttr::METHOD) && (is_static || params.is_empty()) {
      attr |= FnAttr::STATIC;
    }
    let ret = if self.consume_if(TokenKind::Colon) {
      self.parse_type(prog)?
    } else if name.text == "main" {
      Type::new(TyKind::I32, name.span.clone())
    } else {
      // the `exits` marker is only recognized on functions with the
      // default void return
      if self.token_is(TokenKind::Identifier) && self.token().text == "exits" {
        self.consume(TokenKind::Identifier)?;
        attr |= FnAttr::EXITS;
      }
      Type::new(TyKind::Void, name.span.clone())
    };
    let mut extern_name = None;
    let mut body = None;
    if self.consume_if(TokenKind::Extern) {
      attr |= FnAttr::EXTERN;
      if self.consume_if(TokenKind::OpenParen) {
        let cname = self.consume(TokenKind::StringLiteral)?;
        extern_name = Some(cname.text);
        self.consume(TokenKind::CloseParen)?;
      }
    } else {
      body = Some(self.parse_block(prog)?);
    }
    Ok(FunctionDef {
      name: name.text.into(), params, ret, body, attr, extern_name, owner,
      ty: None, span: name.span,
    })
  }

  fn parse_enum(&mut self, prog: &mut Program) -> Result<StructDef> {
    let start_span = self.consume(TokenKind::Enum)?.span;
    let name = self.consume(TokenKind::Identifier)?;
    let mut fields = vec![];
    self.consume(TokenKind::OpenCurly)?;
    while !self.token_is(TokenKind::CloseCurly) {
      let field = self.consume(TokenKind::Identifier)?;
      let ty = Type::new(TyKind::I32, field.span.clone());
      fields.push(prog.push_var(Variable {
        name: field.text.into(), ty: Some(ty), span: field.span,
        is_extern: false, extern_name: None,
      }));
      if !self.token_is(TokenKind::CloseCurly) {
        self.consume_newline_or(TokenKind::Comma)?;
      }
    }
    self.consume(TokenKind::CloseCurly)?;
    let ty = Type::new(TyKind::Structure(name.text.clone().into()), name.span.clone());
    Ok(StructDef {
      name: name.text.into(), kind: StructKind::Enum, fields,
      span: start_span.join(&name.span), is_extern: false, extern_name: None, ty,
    })
  }

  fn parse_struct(&mut self, prog: &mut Program) -> Result<StructDef> {
    let start_span = self.span();
    let kind = if self.consume_if(TokenKind::Union) {
      StructKind::Union
    } else {
      self.consume(TokenKind::Struct)?;
      StructKind::Struct
    };
    let name = self.consume(TokenKind::Identifier)?;
    let mut is_extern = false;
    let mut extern_name = None;
    if self.consume_if(TokenKind::Extern) {
      is_extern = true;
      if self.consume_if(TokenKind::OpenParen) {
        let cname = self.consume(TokenKind::StringLiteral)?;
        extern_name = Some(cname.text);
        self.consume(TokenKind::CloseParen)?;
      }
    }
    let mut fields = vec![];
    if !is_extern || self.token_is(TokenKind::OpenCurly) {
      self.consume(TokenKind::OpenCurly)?;
      while !self.token_is(TokenKind::CloseCurly) {
        let field = self.consume(TokenKind::Identifier)?;
        self.consume(TokenKind::Colon)?;
        let ty = self.parse_type(prog)?;
        let span = field.span.join(&ty.span);
        fields.push(prog.push_var(Variable {
          name: field.text.into(), ty: Some(ty), span,
          is_extern: false, extern_name: None,
        }));
        if !self.token_is(TokenKind::CloseCurly) {
          self.consume_newline_or(TokenKind::Comma)?;
        }
      }
      self.consume(TokenKind::CloseCurly)?;
    }
    let ty = Type::new(TyKind::Structure(name.text.clone().into()), name.span.clone());
    Ok(StructDef {
      name: name.text.into(), kind, fields,
      span: start_span.join(&name.span), is_extern, extern_name, ty,
    })
  }

  fn parse_global_var(&mut self, prog: &mut Program) -> Result<NodeId> {
    let start_span = self.consume(TokenKind::Let)?.span;
    let name = self.consume(TokenKind::Identifier)?;
    let mut ty = None;
    if self.consume_if(TokenKind::Colon) {
      ty = Some(self.parse_type(prog)?);
    }
    let mut is_extern = false;
    let mut extern_name = None;
    let mut init = None;
    if self.consume_if(TokenKind::Extern) {
      is_extern = true;
      if self.consume_if(TokenKind::OpenParen) {
        let cname = self.consume(TokenKind::StringLiteral)?;
        extern_name = Some(cname.text);
        self.consume(TokenKind::CloseParen)?;
      }
      if ty.is_none() {
        return Err(err_span(name.span, "Extern variables must have a type"));
      }
    } else if self.consume_if(TokenKind::Equals) {
      init = Some(self.parse_expression(prog, TokenKind::Newline)?);
    }
    self.consume_newline_or(TokenKind::Semicolon)?;
    let span = start_span.join(&self.span());
    let var = prog.push_var(Variable {
      name: name.text.into(), ty, span: span.clone(), is_extern, extern_name,
    });
    Ok(prog.push_node(Node::new(NodeKind::VarDecl { var, init }, span)))
  }

  /// Resolve an include path: absolute paths verbatim, `@/` against the
  /// project root, anything else through the include directories in order.
  fn find_file_path(&mut self, filename: &str) -> Result<String> {
    if filename.starts_with('/') {
      return Ok(filename.to_owned());
    }
    if let Some(rel) = filename.strip_prefix("@/") {
      let candidate = format!("{}/{rel}", self.project_root);
      if Path::new(&candidate).exists() {
        return Ok(candidate);
      }
    } else {
      for dir in &self.include_dirs {
        let candidate = format!("{dir}/{filename}");
        if Path::new(&candidate).exists() {
          return Ok(candidate);
        }
      }
    }
    if self.curr == 0 {
      // failing before any token is consumed means the implicit prelude
      // itself was not found; there is no useful span to point at
      return Err(std::io::Error::new(std::io::ErrorKind::NotFound,
        format!("Could not find file '{filename}'. \
          Hint: specify the library root directory with the -l option")).into());
    }
    self.curr -= 1;
    Err(self.err(format!("Could not find file: {filename}")))
  }

  /// Lex and parse another source file into the program. Each canonical
  /// path contributes at most once.
  fn include_file(&mut self, prog: &mut Program, filename: &str) -> Result<()> {
    let path = self.find_file_path(filename)?;
    if prog.is_file_included(&path) {
      return Ok(());
    }
    log::debug!("including {path}");
    prog.add_included_file(&path);
    let contents = fs::read_to_string(&path)?;
    let tokens = Lexer::new(contents, path).lex()?;
    self.push_context(tokens);
    let res = self.parse_into_program(prog);
    self.pop_context();
    res
  }

  fn parse_use(&mut self, prog: &mut Program) -> Result<()> {
    self.consume(TokenKind::Use)?;
    let name = self.consume(TokenKind::StringLiteral)?;
    self.consume_newline_or(TokenKind::Semicolon)?;
    self.include_file(prog, &name.text)
  }

  fn parse_compiler_option(&mut self, prog: &mut Program) -> Result<()> {
    self.consume(TokenKind::AtSign)?;
    let compiler = self.consume(TokenKind::Identifier)?;
    if compiler.text != "compiler" {
      return Err(err_span(compiler.span, "Expected 'compiler'"));
    }
    let name = self.consume(TokenKind::Identifier)?;
    match &*name.text {
      "c_include" => {
        let filename = self.consume(TokenKind::StringLiteral)?;
        prog.c_includes.push(filename.text);
      }
      "c_flag" => {
        let flag = self.consume(TokenKind::StringLiteral)?;
        prog.c_flags.push(flag.text);
      }
      "c_embed_header" => {
        let filename = self.consume(TokenKind::StringLiteral)?;
        let resolved = self.find_file_path(&filename.text)?;
        prog.c_embed_headers.push(resolved);
      }
      _ => return Err(err_span(name.span, "Unknown compiler option")),
    }
    Ok(())
  }

  /// Parse top-level items from the current token context until `Eof`.
  pub fn parse_into_program(&mut self, prog: &mut Program) -> Result<()> {
    while !self.token_is(TokenKind::Eof) {
      match self.token().kind {
        TokenKind::Use => self.parse_use(prog)?,
        TokenKind::AtSign => self.parse_compiler_option(prog)?,
        TokenKind::Def => {
          let func = self.parse_function(prog)?;
          prog.push_function(func);
        }
        TokenKind::Let => {
          let node = self.parse_global_var(prog)?;
          prog.globals.push(node);
        }
        TokenKind::Struct | TokenKind::Union => {
          let strukt = self.parse_struct(prog)?;
          prog.push_struct(strukt);
        }
        TokenKind::Enum => {
          let strukt = self.parse_enum(prog)?;
          prog.push_struct(strukt);
        }
        _ => return Err(self.unhandled("parse_program")),
      }
    }
    Ok(())
  }

  /// Parse the whole program: the implicit prelude first, then the entry
  /// file's own tokens.
  pub fn parse_program(&mut self) -> Result<Program> {
    let mut prog = Program::default();
    self.include_file(&mut prog, "lib/prelude.ae")?;
    self.parse_into_program(&mut prog)?;
    Ok(prog)
  }
}
