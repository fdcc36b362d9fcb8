//! The C emitter.
//!
//! Writes the checked program sequentially to an <code>impl [Write]</code>.
//! Two stacks drive the interesting lowerings: a defer scope per block
//! (flushed in reverse at the closing brace) and a yield-variable stack for
//! `if`/`match` used in expression position, which lower to GCC statement
//! expressions `({ T __yield_n; ... __yield_n; })`.

use hashbrown::HashMap;
use smallvec::SmallVec;
use std::fs;
use std::io::Write;
use std::rc::Rc;

use crate::diag::{err_span, err_span_note, Result};
use crate::types::ast::{BinOp, IdentRes, MatchCase, NodeKind, UnOp};
use crate::types::entity::{Program, StructKind};
use crate::types::ty::{Ty, TyKind};
use crate::types::{FuncId, Idx, NodeId, Span, StructId};

/// The C spelling of a binary operator, with the spacing the emitter uses.
fn c_op(op: BinOp) -> &'static str {
  match op {
    BinOp::Add => " + ",
    BinOp::Sub => " - ",
    BinOp::Mul => " * ",
    BinOp::Div => " / ",
    BinOp::Mod => " % ",
    BinOp::BitAnd => " & ",
    BinOp::BitOr => " | ",
    BinOp::BitXor => " ^ ",
    BinOp::And => " && ",
    BinOp::Or => " || ",
    BinOp::Lt => " < ",
    BinOp::Le => " <= ",
    BinOp::Gt => " > ",
    BinOp::Ge => " >= ",
    BinOp::Eq => " == ",
    BinOp::Ne => " != ",
    BinOp::Assign => " = ",
    BinOp::AddAssign => " += ",
    BinOp::SubAssign => " -= ",
    BinOp::MulAssign => " *= ",
    BinOp::DivAssign => " /= ",
  }
}

/// Emitter state over one checked [`Program`].
pub struct CodeGenerator<'a, W> {
  prog: &'a Program,
  out: W,
  /// One defer list per open block, innermost last.
  scopes: Vec<Vec<NodeId>>,
  /// Names of the yield variables of enclosing expression contexts.
  yield_vars: SmallVec<[String; 4]>,
  yield_count: usize,
  debug: bool,
  struct_map: HashMap<Rc<str>, StructId>,
}

impl<'a, W: Write> CodeGenerator<'a, W> {
  /// An emitter writing to `out`. When `debug` is set, every statement is
  /// preceded by a `#line` directive.
  #[must_use] pub fn new(prog: &'a Program, out: W, debug: bool) -> Self {
    let struct_map = prog.structs.iter().enumerate()
      .map(|(i, s)| (s.name.clone(), StructId::from_usize(i)))
      .collect();
    CodeGenerator {
      prog, out,
      scopes: vec![],
      yield_vars: SmallVec::new(),
      yield_count: 0,
      debug,
      struct_map,
    }
  }

  fn gen_debug_info(&mut self, span: &Span) -> Result<()> {
    if self.debug {
      write!(self.out, "\n#line {} \"{}\"\n", span.start.line, span.start.file)?;
    }
    Ok(())
  }

  fn indent(&mut self, num: usize) -> Result<()> {
    for _ in 0..num {
      write!(self.out, "  ")?;
    }
    Ok(())
  }

  fn push_scope(&mut self) {
    self.scopes.push(vec![]);
  }

  fn pop_scope(&mut self) {
    self.scopes.pop();
  }

  fn struct_c_name(&self, name: &str) -> &str {
    let &sid = self.struct_map.get(name).expect("emitting unchecked struct type");
    let strukt = &self.prog[sid];
    if strukt.is_extern {
      strukt.extern_name.as_deref().unwrap_or(&strukt.name)
    } else {
      &strukt.name
    }
  }

  fn gen_type(&mut self, ty: &Ty) -> Result<()> {
    match &ty.kind {
      TyKind::Void => write!(self.out, "void")?,
      TyKind::Char => write!(self.out, "char")?,
      TyKind::I32 => write!(self.out, "int")?,
      TyKind::F32 => write!(self.out, "float")?,
      TyKind::Bool => write!(self.out, "bool")?,
      TyKind::U8 => write!(self.out, "unsigned char")?,
      TyKind::Pointer(inner) => {
        self.gen_type(inner)?;
        write!(self.out, "*")?;
      }
      TyKind::Structure(name) => {
        let cname = self.struct_c_name(name).to_owned();
        write!(self.out, "{cname}")?;
      }
      _ => return Err(err_span(ty.span.clone(),
        format!("(Internal) Unknown type in gen_type: {ty}"))),
    }
    Ok(())
  }

  /// Print a C declaration of "`name` of type `ty`", handling the
  /// function-pointer and array declarator forms.
  fn gen_type_and_name(&mut self, ty: &Ty, name: &str) -> Result<()> {
    match &ty.kind {
      TyKind::Function { params, ret, .. } => {
        self.gen_type(ret)?;
        write!(self.out, "(*{name})(")?;
        for (i, param) in params.iter().enumerate() {
          if i > 0 {
            write!(self.out, ", ")?;
          }
          self.gen_type(param)?;
        }
        write!(self.out, ")")?;
      }
      TyKind::Array(elem, size) => {
        self.gen_type_and_name(elem, name)?;
        write!(self.out, "[")?;
        self.gen_expression(*size)?;
        write!(self.out, "]")?;
      }
      TyKind::Pointer(inner) if matches!(inner.kind, TyKind::Array(..)) => {
        return Err(err_span_note(ty.span.clone(),
          "(Internal) Pointers to arrays not supported",
          "This may have happened with a decayed array type"));
      }
      _ => {
        self.gen_type(ty)?;
        write!(self.out, " {name}")?;
      }
    }
    Ok(())
  }

  fn gen_function_name(&mut self, fid: FuncId) -> Result<()> {
    let func = &self.prog[fid];
    if func.is_extern() {
      let name = func.extern_name.as_deref().unwrap_or(&func.name).to_owned();
      write!(self.out, "{name}")?;
    } else if func.is_method() {
      let owner = func.owner.as_deref().expect("method without owner").to_owned();
      write!(self.out, "{owner}__{}", func.name)?;
    } else {
      write!(self.out, "{}", func.name)?;
    }
    Ok(())
  }

  fn gen_enum_value(&mut self, enum_name: &str, value_name: &str) -> Result<()> {
    write!(self.out, "{enum_name}__{value_name}")?;
    Ok(())
  }

  /// Open a statement expression with a fresh `__yield_<n>` variable, emit
  /// the construct as a statement (its `yield`s assign the variable), and
  /// close with the variable as the value.
  fn gen_in_yield_context(&mut self, node: NodeId) -> Result<()> {
    let yield_var = format!("__yield_{}", self.yield_count);
    self.yield_count += 1;
    self.yield_vars.push(yield_var.clone());
    let ret_type = self.prog[node].etype.clone().expect("yield context without a type");
    write!(self.out, "({{ ")?;
    self.gen_type_and_name(&ret_type, &yield_var)?;
    write!(self.out, ";\n")?;
    self.gen_statement(node, 1)?;
    write!(self.out, ";{yield_var}; }})")?;
    self.yield_count -= 1;
    self.yield_vars.pop();
    Ok(())
  }

  fn gen_yield_expression(&mut self, expr: NodeId, indent: usize) -> Result<()> {
    let yield_var = self.yield_vars.last().expect("yield outside of yield context").clone();
    self.indent(indent)?;
    write!(self.out, "{yield_var} = ")?;
    self.gen_expression(expr)?;
    write!(self.out, ";\n")?;
    Ok(())
  }

  fn gen_expression(&mut self, node: NodeId) -> Result<()> {
    match self.prog[node].kind.clone() {
      NodeKind::IntLit(text) | NodeKind::FloatLit(text) => {
        write!(self.out, "{text}")?;
      }
      NodeKind::StringLit(text) => {
        write!(self.out, "\"{text}\"")?;
      }
      NodeKind::CharLit(text) => {
        write!(self.out, "'{text}'")?;
      }
      NodeKind::Null => write!(self.out, "NULL")?,
      NodeKind::BoolLit(value) => {
        let text = if value { "true" } else { "false" };
        write!(self.out, "{text}")?;
      }
      NodeKind::Match { .. } => self.gen_in_yield_context(node)?,
      NodeKind::If { cond, body, els } => {
        // a two-armed if over simple expressions collapses to a ternary
        let simple = els.is_some_and(|els|
          !matches!(self.prog[body].kind, NodeKind::Block { .. }) &&
          !matches!(self.prog[els].kind, NodeKind::Block { .. }));
        if simple {
          write!(self.out, "(")?;
          self.gen_expression(cond)?;
          write!(self.out, " ? ")?;
          self.gen_expression(body)?;
          write!(self.out, " : ")?;
          self.gen_expression(els.expect("checked above"))?;
          write!(self.out, ")")?;
        } else {
          self.gen_in_yield_context(node)?;
        }
      }
      NodeKind::Ident { res, .. } => match res {
        IdentRes::Func(fid) => self.gen_function_name(fid)?,
        IdentRes::Var(vid) => {
          let var = &self.prog[vid];
          let name = if var.is_extern {
            var.extern_name.as_deref().unwrap_or(&var.name)
          } else {
            &var.name
          }.to_owned();
          write!(self.out, "{name}")?;
        }
        IdentRes::Unresolved => return Err(err_span(self.prog[node].span.clone(),
          "(Internal) Unresolved identifier survived type checking")),
      },
      kind @ NodeKind::Call { .. } => {
        let NodeKind::Call { callee, args, func, .. } = &kind else { unreachable!() };
        let (callee, args, func) = (*callee, args.clone(), *func);
        let mut newline_after_first = false;
        if kind.callee_is(&self.prog.nodes, "print") {
          write!(self.out, "printf")?;
        } else if kind.callee_is(&self.prog.nodes, "println") {
          write!(self.out, "printf")?;
          newline_after_first = true;
        } else if let Some(fid) = func {
          self.gen_function_name(fid)?;
        } else {
          self.gen_expression(callee)?;
        }
        write!(self.out, "(")?;
        for (i, &arg) in args.iter().enumerate() {
          if i > 0 {
            write!(self.out, ", ")?;
          }
          self.gen_expression(arg)?;
          if i == 0 && newline_after_first {
            write!(self.out, " \"\\n\"")?;
          }
        }
        write!(self.out, ")")?;
      }
      NodeKind::Binary { op, lhs, rhs } => {
        if op.is_assign() {
          self.gen_expression(lhs)?;
          write!(self.out, "{}", c_op(op))?;
          self.gen_expression(rhs)?;
        } else {
          write!(self.out, "(")?;
          self.gen_expression(lhs)?;
          write!(self.out, "{}", c_op(op))?;
          self.gen_expression(rhs)?;
          write!(self.out, ")")?;
        }
      }
      NodeKind::Unary { op, expr } => {
        match op {
          UnOp::IsNotNull => {
            write!(self.out, "((bool)")?;
            self.gen_expression(expr)?;
            write!(self.out, ")")?;
          }
          _ => {
            let text = match op {
              UnOp::Addr => "&",
              UnOp::Deref => "*",
              UnOp::Not => "!",
              UnOp::Neg => "-",
              UnOp::IsNotNull => unreachable!(),
            };
            write!(self.out, "({text}")?;
            self.gen_expression(expr)?;
            write!(self.out, ")")?;
          }
        }
      }
      NodeKind::IndexOp { lhs, index } => {
        self.gen_expression(lhs)?;
        write!(self.out, "[")?;
        self.gen_expression(index)?;
        write!(self.out, "]")?;
      }
      NodeKind::Member { lhs, name, is_pointer, .. } => {
        self.gen_expression(lhs)?;
        let sep = if is_pointer { "->" } else { "." };
        write!(self.out, "{sep}{name}")?;
      }
      NodeKind::EnumValue { strukt, variant } => {
        let name = self.prog[strukt].name.clone();
        self.gen_enum_value(&name, &variant)?;
      }
      NodeKind::Cast { expr, to } => {
        write!(self.out, "((")?;
        self.gen_type(&to)?;
        write!(self.out, ")")?;
        self.gen_expression(expr)?;
        write!(self.out, ")")?;
      }
      NodeKind::FmtStr { exprs, compiled, .. } => {
        let compiled = compiled.expect("unchecked format string");
        write!(self.out, "format_string(\"{compiled}\"")?;
        for expr in exprs {
          write!(self.out, ", ")?;
          self.gen_expression(expr)?;
        }
        write!(self.out, ")")?;
      }
      NodeKind::SizeOf(ty) => {
        write!(self.out, "sizeof(")?;
        self.gen_type(&ty)?;
        write!(self.out, ")")?;
      }
      _ => return Err(err_span(self.prog[node].span.clone(),
        "(Internal) Unknown node in gen_expression")),
    }
    Ok(())
  }

  fn gen_var_decl(&mut self, node: NodeId) -> Result<()> {
    let NodeKind::VarDecl { var, init } = self.prog[node].kind.clone() else {
      panic!("not a var decl")
    };
    let v = &self.prog[var];
    if v.is_extern {
      return Ok(());
    }
    let ty = v.ty.clone().expect("unchecked variable");
    let name = v.name.clone();
    self.gen_type_and_name(&ty, &name)?;
    if let Some(init) = init {
      write!(self.out, " = ")?;
      self.gen_expression(init)?;
    }
    Ok(())
  }

  fn gen_control_body(&mut self, node: NodeId, body: NodeId, indent: usize) -> Result<()> {
    if matches!(self.prog[body].kind, NodeKind::Block { .. }) {
      self.gen_block(body, indent)?;
      write!(self.out, " ")?;
    } else {
      if !matches!(self.prog[body].kind, NodeKind::If { .. }) {
        write!(self.out, "\n")?;
      }
      if self.prog[node].etype.is_some()
        && !matches!(self.prog[body].kind, NodeKind::Yield(_))
      {
        self.gen_yield_expression(body, indent + 1)?;
      } else {
        self.gen_statement(body, indent)?;
      }
      self.indent(indent)?;
    }
    Ok(())
  }

  fn gen_match_case_body(&mut self, node: NodeId, body: NodeId, indent: usize) -> Result<()> {
    if matches!(self.prog[body].kind, NodeKind::Block { .. }) {
      write!(self.out, " ")?;
      self.gen_block(body, indent + 1)?;
    } else if self.prog[node].etype.is_some()
      && !matches!(self.prog[body].kind, NodeKind::Yield(_))
    {
      write!(self.out, " {{\n")?;
      self.gen_yield_expression(body, indent + 2)?;
      write!(self.out, "}}")?;
    } else {
      write!(self.out, " {{\n")?;
      self.gen_statement(body, indent + 2)?;
      self.indent(indent + 1)?;
      write!(self.out, "}}")?;
    }
    Ok(())
  }

  /// A match over strings lowers to an `if`/`else if` chain of `strcmp`
  /// calls over a saved `__match_str`.
  fn gen_match_string(&mut self, node: NodeId, indent: usize) -> Result<()> {
    let NodeKind::Match { scrutinee, cases, default, .. } = self.prog[node].kind.clone()
    else { panic!("not a match") };
    self.indent(indent)?;
    write!(self.out, "{{\n")?;
    self.indent(indent + 1)?;
    write!(self.out, "char *__match_str = ")?;
    self.gen_expression(scrutinee)?;
    write!(self.out, ";\n")?;
    self.indent(indent + 1)?;
    write!(self.out, "if (")?;
    let last = cases.len().saturating_sub(1);
    for (i, MatchCase { pat, body }) in cases.into_iter().enumerate() {
      write!(self.out, "!strcmp(__match_str, ")?;
      self.gen_expression(pat)?;
      write!(self.out, ")")?;
      if let Some(body) = body {
        write!(self.out, ")")?;
        self.gen_match_case_body(node, body, indent)?;
        write!(self.out, " else ")?;
        if i != last {
          write!(self.out, "if (")?;
        }
      } else {
        write!(self.out, " || ")?;
      }
    }
    if let Some(default) = default {
      self.gen_match_case_body(node, default, indent)?;
    }
    write!(self.out, "\n")?;
    self.indent(indent)?;
    write!(self.out, "}}\n")?;
    Ok(())
  }

  fn gen_match(&mut self, node: NodeId, indent: usize) -> Result<()> {
    let NodeKind::Match { scrutinee, cases, default, .. } = self.prog[node].kind.clone()
    else { panic!("not a match") };
    let is_string = self.prog[scrutinee].etype.as_ref()
      .is_some_and(|ty| ty.is_string());
    if is_string {
      return self.gen_match_string(node, indent);
    }
    self.indent(indent)?;
    write!(self.out, "switch (")?;
    self.gen_expression(scrutinee)?;
    write!(self.out, ") {{\n")?;
    for MatchCase { pat, body } in cases {
      self.indent(indent + 1)?;
      write!(self.out, "case ")?;
      self.gen_expression(pat)?;
      write!(self.out, ":")?;
      if let Some(body) = body {
        self.gen_match_case_body(node, body, indent)?;
        write!(self.out, " break;\n")?;
      } else {
        write!(self.out, "\n")?;
      }
    }
    if let Some(default) = default {
      self.indent(indent + 1)?;
      write!(self.out, "default:")?;
      self.gen_match_case_body(node, default, indent)?;
      write!(self.out, " break;\n")?;
    }
    self.indent(indent)?;
    write!(self.out, "}}\n")?;
    Ok(())
  }

  fn gen_statement(&mut self, node: NodeId, indent: usize) -> Result<()> {
    let span = self.prog[node].span.clone();
    self.gen_debug_info(&span)?;
    match self.prog[node].kind.clone() {
      NodeKind::Match { .. } => self.gen_match(node, indent)?,
      NodeKind::Yield(expr) => self.gen_yield_expression(expr, indent)?,
      NodeKind::Return(expr) => {
        self.indent(indent)?;
        write!(self.out, "return")?;
        if let Some(expr) = expr {
          write!(self.out, " ")?;
          self.gen_expression(expr)?;
        }
        write!(self.out, ";\n")?;
      }
      NodeKind::Break => {
        self.indent(indent)?;
        write!(self.out, "break;\n")?;
      }
      NodeKind::Continue => {
        self.indent(indent)?;
        write!(self.out, "continue;\n")?;
      }
      NodeKind::Defer(stmt) => {
        self.scopes.last_mut().expect("defer outside of a block").push(stmt);
      }
      NodeKind::VarDecl { .. } => {
        self.indent(indent)?;
        self.gen_var_decl(node)?;
        write!(self.out, ";\n")?;
      }
      NodeKind::If { cond, body, els } => {
        self.indent(indent)?;
        write!(self.out, "if (")?;
        self.gen_expression(cond)?;
        write!(self.out, ") ")?;
        self.gen_control_body(node, body, indent)?;
        if let Some(els) = els {
          write!(self.out, " else ")?;
          self.gen_control_body(node, els, indent)?;
        }
        write!(self.out, "\n")?;
      }
      NodeKind::While { cond, body } => {
        self.indent(indent)?;
        write!(self.out, "while (")?;
        self.gen_expression(cond)?;
        write!(self.out, ") ")?;
        self.gen_control_body(node, body, indent)?;
        write!(self.out, "\n")?;
      }
      NodeKind::For { init, cond, incr, body } => {
        self.indent(indent)?;
        write!(self.out, "for (")?;
        if let Some(init) = init {
          if matches!(self.prog[init].kind, NodeKind::VarDecl { .. }) {
            self.gen_var_decl(init)?;
          } else {
            self.gen_expression(init)?;
          }
        }
        write!(self.out, "; ")?;
        if let Some(cond) = cond {
          self.gen_expression(cond)?;
        }
        write!(self.out, "; ")?;
        if let Some(incr) = incr {
          self.gen_expression(incr)?;
        }
        write!(self.out, ") ")?;
        self.gen_control_body(node, body, indent)?;
        write!(self.out, "\n")?;
      }
      NodeKind::Block { .. } => {
        self.indent(indent)?;
        self.gen_block(node, indent)?;
        write!(self.out, "\n")?;
      }
      _ => {
        self.indent(indent)?;
        self.gen_expression(node)?;
        write!(self.out, ";\n")?;
      }
    }
    Ok(())
  }

  /// Emit a block; at the closing brace, flush the block's deferred
  /// statements in reverse registration order.
  fn gen_block(&mut self, node: NodeId, indent: usize) -> Result<()> {
    let NodeKind::Block { stmts } = self.prog[node].kind.clone() else { panic!("not a block") };
    self.push_scope();
    write!(self.out, "{{\n")?;
    for stmt in stmts {
      self.gen_statement(stmt, indent + 1)?;
    }
    let defers = self.scopes.last().expect("scope pushed above").clone();
    if !defers.is_empty() {
      write!(self.out, "\n")?;
      self.indent(indent + 1)?;
      write!(self.out, "/* defers */\n")?;
      for stmt in defers.into_iter().rev() {
        self.gen_statement(stmt, indent + 1)?;
      }
    }
    self.indent(indent)?;
    write!(self.out, "}}")?;
    self.pop_scope();
    Ok(())
  }

  fn gen_enum(&mut self, sid: StructId) -> Result<()> {
    let strukt = &self.prog[sid];
    if strukt.is_extern {
      return Ok(());
    }
    let name = strukt.name.clone();
    let fields = strukt.fields.clone();
    write!(self.out, "enum {name} {{\n")?;
    for field in fields {
      let field_name = self.prog[field].name.clone();
      self.indent(1)?;
      self.gen_enum_value(&name, &field_name)?;
      write!(self.out, ",\n")?;
    }
    write!(self.out, "}};\n\n")?;
    Ok(())
  }

  fn gen_struct(&mut self, sid: StructId) -> Result<()> {
    let strukt = &self.prog[sid];
    if strukt.is_extern {
      return Ok(());
    }
    let name = strukt.name.clone();
    let fields = strukt.fields.clone();
    let keyword = if strukt.kind == StructKind::Union { "union" } else { "struct" };
    write!(self.out, "{keyword} {name} {{\n")?;
    for field in fields {
      let field_name = self.prog[field].name.clone();
      let field_ty = self.prog[field].ty.clone().expect("field without a type");
      self.indent(1)?;
      self.gen_type_and_name(&field_ty, &field_name)?;
      write!(self.out, ";\n")?;
    }
    write!(self.out, "}};\n\n")?;
    Ok(())
  }

  fn gen_struct_decls(&mut self) -> Result<()> {
    write!(self.out, "/* struct declarations */\n")?;
    for &sid in &self.prog.structures {
      let strukt = &self.prog[sid];
      if strukt.is_extern {
        continue;
      }
      let keyword = match strukt.kind {
        StructKind::Enum => "enum",
        StructKind::Union => "union",
        StructKind::Struct => "struct",
      };
      let name = &strukt.name;
      write!(self.out, "typedef {keyword} {name} {name};\n")?;
    }
    write!(self.out, "\n")?;
    Ok(())
  }

  fn gen_function_decl(&mut self, fid: FuncId) -> Result<()> {
    let func = &self.prog[fid];
    if func.exits() {
      write!(self.out, "__attribute__((noreturn)) ")?;
    }
    let ret = func.ret.clone();
    let params = func.params.clone();
    self.gen_type(&ret)?;
    write!(self.out, " ")?;
    self.gen_function_name(fid)?;
    write!(self.out, "(")?;
    for (i, param) in params.into_iter().enumerate() {
      if i > 0 {
        write!(self.out, ", ")?;
      }
      let ty = self.prog[param].ty.clone().expect("parameter without a type");
      let name = self.prog[param].name.clone();
      self.gen_type_and_name(&ty, &name)?;
    }
    write!(self.out, ")")?;
    Ok(())
  }

  fn gen_function_decls(&mut self) -> Result<()> {
    write!(self.out, "/* function declarations */\n")?;
    for fid in (0..self.prog.functions.len()).map(FuncId::from_usize) {
      if !self.prog[fid].is_extern() {
        self.gen_function_decl(fid)?;
        write!(self.out, ";\n")?;
      }
    }
    write!(self.out, "\n")?;
    Ok(())
  }

  fn gen_function(&mut self, fid: FuncId) -> Result<()> {
    let func = &self.prog[fid];
    if func.is_extern() {
      return Ok(());
    }
    let span = func.span.clone();
    let body = func.body.expect("non-extern function without a body");
    self.gen_debug_info(&span)?;
    self.gen_function_decl(fid)?;
    write!(self.out, " ")?;
    self.gen_block(body, 0)?;
    write!(self.out, "\n\n")?;
    Ok(())
  }

  fn gen_global_vars(&mut self) -> Result<()> {
    write!(self.out, "/* global variables */\n")?;
    for node in self.prog.globals.clone() {
      let NodeKind::VarDecl { var, .. } = self.prog[node].kind.clone() else {
        panic!("global is not a var decl")
      };
      if !self.prog[var].is_extern {
        self.gen_statement(node, 0)?;
      }
    }
    write!(self.out, "\n")?;
    Ok(())
  }

  fn gen_embed_headers(&mut self) -> Result<()> {
    for filename in self.prog.c_embed_headers.clone() {
      write!(self.out,
        "/***************** embed '{filename}' *****************/\n")?;
      let contents = fs::read_to_string(&filename)?;
      write!(self.out, "{contents}\n\n")?;
    }
    Ok(())
  }

  /// Emit the whole translation unit: includes, embedded headers, struct
  /// typedefs and bodies (in topological order), prototypes, globals, and
  /// function bodies.
  pub fn gen_program(&mut self) -> Result<()> {
    for include in self.prog.c_includes.clone() {
      write!(self.out, "#include \"{include}\"\n")?;
    }
    write!(self.out, "\n")?;
    self.gen_embed_headers()?;
    self.gen_struct_decls()?;
    for &sid in &self.prog.structures.clone() {
      if self.prog[sid].is_enum() {
        self.gen_enum(sid)?;
      } else {
        self.gen_struct(sid)?;
      }
    }
    self.gen_function_decls()?;
    self.gen_global_vars()?;
    for fid in (0..self.prog.functions.len()).map(FuncId::from_usize) {
      self.gen_function(fid)?;
    }
    self.out.flush()?;
    Ok(())
  }
}
