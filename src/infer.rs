//! The type checker.
//!
//! One pass over the parsed [`Program`]: names are resolved, types are
//! validated, and the AST is rewritten in place — `::` lookups on enums
//! become [`NodeKind::EnumValue`] nodes, method calls get their receiver
//! injected as a first argument, array-typed expressions decay to pointers,
//! and the struct list is reordered so every struct is emitted after the
//! structs its fields contain.

use hashbrown::HashMap;
use if_chain::if_chain;
use owo_colors::OwoColorize;
use std::rc::Rc;

use crate::diag::{
  err_span, err_span_note, err_span_note_span, find_word_suggestion, Result,
};
use crate::types::ast::{BinOp, IdentRes, MatchCase, Node, NodeKind, UnOp};
use crate::types::entity::Program;
use crate::types::ty::{decay_array, Ty, TyKind, Type};
use crate::types::{FuncId, Idx, NodeId, Span, StructId, VarId};

/// DFS colors for the struct ordering pass.
#[derive(Copy, Clone, PartialEq, Eq)]
enum Mark {
  InProgress,
  Done,
}

/// Checker state: lexical scopes, the top-level name tables, and the flags
/// that gate `return`/`break`/`yield`.
pub struct TypeChecker {
  scopes: Vec<HashMap<Rc<str>, VarId>>,
  functions: HashMap<Rc<str>, FuncId>,
  structures: HashMap<Rc<str>, StructId>,
  methods: HashMap<Rc<str>, HashMap<Rc<str>, FuncId>>,
  cur_func: Option<FuncId>,
  in_loop: bool,
  can_yield: bool,
}

impl Default for TypeChecker {
  fn default() -> Self { Self::new() }
}

impl TypeChecker {
  /// A fresh checker. The predefined `string` type starts with an empty
  /// method table so `def string::...` declarations have somewhere to land.
  #[must_use] pub fn new() -> Self {
    let mut methods = HashMap::new();
    methods.insert(Rc::from("string"), HashMap::new());
    TypeChecker {
      scopes: vec![],
      functions: HashMap::new(),
      structures: HashMap::new(),
      methods,
      cur_func: None,
      in_loop: false,
      can_yield: false,
    }
  }

  fn push_scope(&mut self) {
    self.scopes.push(HashMap::new());
  }

  fn pop_scope(&mut self) {
    self.scopes.pop();
  }

  fn push_var(&mut self, prog: &Program, var: VarId) -> Result<()> {
    let scope = self.scopes.last_mut().expect("no scope");
    let name = prog[var].name.clone();
    if let Some(&existing) = scope.get(&name) {
      return Err(err_span_note_span(
        prog[var].span.clone(), "Variable is already defined in scope",
        prog[existing].span.clone(), "Previous definition here"));
    }
    scope.insert(name, var);
    Ok(())
  }

  fn find_var(&self, name: &str) -> Option<VarId> {
    self.scopes.iter().rev().find_map(|scope| scope.get(name).copied())
  }

  fn get_struct_member(&self, prog: &Program, strukt: &str, name: &str) -> Option<VarId> {
    let &sid = self.structures.get(strukt)?;
    prog[sid].find_field(prog, name)
  }

  fn get_method(&self, strukt: &str, name: &str) -> Option<FuncId> {
    self.methods.get(strukt)?.get(name).copied()
  }

  fn type_is_valid(&self, ty: &Ty) -> bool {
    match &ty.kind {
      TyKind::Pointer(p) => self.type_is_valid(p),
      TyKind::Array(elem, _) => self.type_is_valid(elem),
      TyKind::Function { params, ret, .. } =>
        params.iter().all(|p| self.type_is_valid(p)) && self.type_is_valid(ret),
      TyKind::Structure(name) => self.structures.contains_key(&**name),
      _ => true,
    }
  }

  /// Run the whole checking pipeline over a parsed program.
  pub fn check_program(&mut self, prog: &mut Program) -> Result<()> {
    log::debug!("checking {} structs, {} globals, {} functions",
      prog.structs.len(), prog.globals.len(), prog.functions.len());
    self.check_all_structs(prog)?;
    self.push_scope();
    for global in prog.globals.clone() {
      self.check_statement(prog, global)?;
    }
    self.check_all_functions(prog)?;
    self.pop_scope();
    Ok(())
  }

  /// Register all struct names, then reorder `prog.structures` by a
  /// post-order DFS over non-extern struct-typed fields, so that every
  /// struct body is emitted after the definitions it depends on.
  fn check_all_structs(&mut self, prog: &mut Program) -> Result<()> {
    for &sid in &prog.structures {
      let name = prog[sid].name.clone();
      if let Some(&prev) = self.structures.get(&name) {
        return Err(err_span_note_span(
          prog[sid].span.clone(), "Struct has already been defined",
          prog[prev].span.clone(), "Previous definition here"));
      }
      self.structures.insert(name.clone(), sid);
      self.methods.insert(name, HashMap::new());
    }
    let mut state = HashMap::new();
    let mut results = vec![];
    for sid in prog.structures.clone() {
      if !state.contains_key(&sid) {
        self.dfs_structs(prog, sid, &mut results, &mut state)?;
      }
    }
    prog.structures = results;
    Ok(())
  }

  fn dfs_structs(
    &self, prog: &Program, sid: StructId,
    results: &mut Vec<StructId>, state: &mut HashMap<StructId, Mark>,
  ) -> Result<()> {
    state.insert(sid, Mark::InProgress);
    for &field in &prog[sid].fields {
      let field_ty = prog[field].ty.as_ref().expect("field without a type");
      if !self.type_is_valid(field_ty) {
        return Err(err_span(field_ty.span.clone(), "Type of field is undefined"));
      }
      // extern structs get their layout from a host header, and pointer
      // fields do not constrain emission order
      if_chain! {
        if !prog[sid].is_extern;
        if let TyKind::Structure(neighbor) = &field_ty.kind;
        then {
          let &nid = self.structures.get(&**neighbor).expect("validated above");
          match state.get(&nid) {
            None => self.dfs_structs(prog, nid, results, state)?,
            Some(Mark::InProgress) => return Err(err_span_note_span(
              prog[field].span.clone(), "Struct containment cycle detected",
              prog[nid].span.clone(), "The cycle passes through this struct")),
            Some(Mark::Done) => {}
          }
        }
      }
    }
    state.insert(sid, Mark::Done);
    results.push(sid);
    Ok(())
  }

  /// Build and validate every function's type, filling the name tables,
  /// then check every body.
  fn check_all_functions(&mut self, prog: &mut Program) -> Result<()> {
    for fid in (0..prog.functions.len()).map(FuncId::from_usize) {
      let func = &prog[fid];
      let name = func.name.clone();
      let span = func.span.clone();
      let params = func.params.clone();
      let ret = func.ret.clone();
      if func.is_method() {
        let owner = func.owner.clone().expect("method without owner");
        let Some(s_methods) = self.methods.get(&owner) else {
          return Err(err_span(span, "Type for method does not exist"));
        };
        if let Some(&prev) = s_methods.get(&name) {
          return Err(err_span_note_span(
            span, "Method is already defined for this type",
            prog[prev].span.clone(), "Previous definition here"));
        }
        if let Some(field) = self.get_struct_member(prog, &owner, &name) {
          return Err(err_span_note_span(
            span, "Type already has a field with this name",
            prog[field].span.clone(), "Previous definition here"));
        }
      } else if let Some(&prev) = self.functions.get(&name) {
        return Err(err_span_note_span(
          span, "Function is already defined",
          prog[prev].span.clone(), "Previous definition here"));
      }
      let mut param_tys = vec![];
      for &param in &params {
        let ty = prog[param].ty.clone().expect("parameter without a type");
        if !self.type_is_valid(&ty) {
          return Err(err_span(ty.span.clone(), "Invalid parameter type"));
        }
        param_tys.push(ty);
      }
      if !self.type_is_valid(&ret) {
        return Err(err_span(ret.span.clone(), "Invalid return type"));
      }
      let func = &prog[fid];
      let func_ty = if func.is_method() {
        let owner = func.owner.clone().expect("method without owner");
        let ty = Type::new(
          TyKind::Method { owner: owner.clone(), params: param_tys, ret, def: fid },
          span);
        self.methods.get_mut(&owner).expect("checked above").insert(name, fid);
        ty
      } else {
        self.functions.insert(name, fid);
        Type::new(TyKind::Function { params: param_tys, ret, def: Some(fid) }, span)
      };
      prog[fid].ty = Some(func_ty);
    }
    for fid in (0..prog.functions.len()).map(FuncId::from_usize) {
      self.check_function(prog, fid)?;
    }
    Ok(())
  }

  fn check_function(&mut self, prog: &mut Program, fid: FuncId) -> Result<()> {
    let prev_func = self.cur_func.replace(fid);
    self.push_scope();
    for param in prog[fid].params.clone() {
      self.push_var(prog, param)?;
    }
    if let Some(body) = prog[fid].body {
      self.check_block(prog, body, false)?;
      let func = &prog[fid];
      if !prog[body].returns && !matches!(func.ret.kind, TyKind::Void)
        && &*func.name != "main"
      {
        return Err(err_span(func.span.clone(), "Function does not always return"));
      }
    }
    self.pop_scope();
    self.cur_func = prev_func;
    Ok(())
  }

  fn check_block(&mut self, prog: &mut Program, node: NodeId, can_yield: bool) -> Result<()> {
    let could_yield = std::mem::replace(&mut self.can_yield, can_yield);
    self.push_scope();
    prog[node].etype = None;
    prog[node].returns = false;
    let NodeKind::Block { stmts } = &prog[node].kind else { panic!("not a block") };
    let mut yield_span: Option<Span> = None;
    for stmt in stmts.clone() {
      self.check_statement(prog, stmt)?;
      if prog[stmt].returns {
        prog[node].returns = true;
      }
      if matches!(prog[stmt].kind, NodeKind::Yield(_)) {
        if prog[node].etype.is_some() {
          return Err(err_span_note_span(
            prog[stmt].span.clone(), "Cannot yield multiple times in a block",
            yield_span.expect("etype set without a yield"), "Previous yield is here"));
        }
        let yielded = prog[stmt].etype.clone();
        prog[node].etype = yielded;
        yield_span = Some(prog[stmt].span.clone());
      }
    }
    self.pop_scope();
    self.can_yield = could_yield;
    Ok(())
  }

  fn check_statement(&mut self, prog: &mut Program, node: NodeId) -> Result<()> {
    match prog[node].kind.clone() {
      NodeKind::Block { .. } => self.check_block(prog, node, false)?,
      NodeKind::Defer(inner) => { self.check_expression(prog, inner)?; }
      NodeKind::Match { .. } => self.check_match(prog, node, false)?,
      NodeKind::Yield(expr) => {
        if !self.can_yield {
          return Err(err_span(prog[node].span.clone(), "Cannot yield in this context"));
        }
        let ty = self.check_expression(prog, expr)?;
        prog[node].etype = Some(ty);
      }
      NodeKind::Return(expr) => {
        let Some(fid) = self.cur_func else {
          return Err(err_span(prog[node].span.clone(), "Return statement outside of function"));
        };
        let ret = prog[fid].ret.clone();
        match expr {
          None => if !matches!(ret.kind, TyKind::Void) {
            return Err(err_span_note_span(
              prog[node].span.clone(), "Cannot have empty return in non-void function",
              ret.span.clone(), format!("This function returns '{ret}'")));
          }
          Some(e) => {
            let ret_type = self.check_expression(prog, e)?;
            if matches!(ret.kind, TyKind::Void) {
              return Err(err_span_note_span(
                prog[e].span.clone(), format!("Cannot return '{ret_type}' in void function"),
                prog[fid].span.clone(), "This function does not return a value"));
            }
            if !ret_type.eq(&ret) {
              return Err(err_span_note_span(
                prog[e].span.clone(), format!("Return type '{ret_type}' is incorrect"),
                ret.span.clone(), format!("This function returns '{ret}'")));
            }
          }
        }
        prog[node].returns = true;
      }
      NodeKind::Break | NodeKind::Continue => {
        if !self.in_loop {
          let what = if matches!(prog[node].kind, NodeKind::Break) { "Break" } else { "Continue" };
          return Err(err_span(prog[node].span.clone(),
            format!("{what} statement outside of loop")));
        }
      }
      NodeKind::VarDecl { var, init } => {
        if let Some(init) = init {
          let init_type = self.check_expression(prog, init)?;
          if matches!(init_type.kind, TyKind::Method { .. }) {
            return Err(err_span(prog[init].span.clone(), "Cannot assign methods to variables"));
          }
          match prog[var].ty.clone() {
            None => prog[var].ty = Some(init_type),
            Some(declared) => if !declared.eq(&init_type) {
              return Err(err_span_note(
                prog[init].span.clone(), "Variable type does not match initializer type",
                format!("Expected '{declared}' but got '{init_type}'")));
            }
          }
        } else {
          let Some(declared) = prog[var].ty.clone() else {
            return Err(err_span(prog[var].span.clone(),
              "Variable type cannot be inferred, specify explicitly"));
          };
          if !self.type_is_valid(&declared) {
            return Err(err_span(declared.span.clone(), "Invalid variable type"));
          }
        }
        self.push_var(prog, var)?;
      }
      NodeKind::While { cond, body } => {
        let was_in_loop = std::mem::replace(&mut self.in_loop, true);
        let cond_type = self.check_expression(prog, cond)?;
        if !matches!(cond_type.kind, TyKind::Bool) {
          return Err(err_span_note(
            prog[cond].span.clone(), "Condition must be boolean",
            format!("Got type '{cond_type}'")));
        }
        self.check_statement(prog, body)?;
        self.in_loop = was_in_loop;
      }
      NodeKind::For { init, cond, incr, body } => {
        let was_in_loop = std::mem::replace(&mut self.in_loop, true);
        self.push_scope();
        if let Some(init) = init {
          self.check_statement(prog, init)?;
        }
        if let Some(cond) = cond {
          let cond_type = self.check_expression(prog, cond)?;
          if !matches!(cond_type.kind, TyKind::Bool) {
            return Err(err_span_note(
              prog[cond].span.clone(), "Condition must be boolean",
              format!("Got type '{cond_type}'")));
          }
        }
        if let Some(incr) = incr {
          self.check_statement(prog, incr)?;
        }
        self.check_statement(prog, body)?;
        self.pop_scope();
        self.in_loop = was_in_loop;
      }
      NodeKind::If { .. } => self.check_if(prog, node, false)?,
      _ => { self.check_expression(prog, node)?; }
    }
    Ok(())
  }

  /// Check a branch body of an `if`/`match`, and when the construct is in
  /// expression position, fold the branch's yielded type into the parent.
  fn check_expression_statement(
    &mut self, prog: &mut Program, node: NodeId, body: NodeId, is_expr: bool,
  ) -> Result<()> {
    if matches!(prog[body].kind, NodeKind::Match { .. }) {
      self.check_match(prog, body, is_expr)?;
    } else if matches!(prog[body].kind, NodeKind::If { .. }) {
      self.check_if(prog, body, is_expr)?;
    } else if matches!(prog[body].kind, NodeKind::Block { .. }) {
      self.check_block(prog, body, is_expr)?;
    } else {
      self.check_statement(prog, body)?;
    }
    if is_expr {
      let ret = prog[body].etype.clone();
      if prog[body].returns {
        // a branch that always returns is excluded from the type join
      } else if let Some(ret) = ret {
        match &prog[node].etype {
          None => prog[node].etype = Some(ret),
          Some(prev) => if !prev.eq(&ret) {
            return Err(err_span_note(
              prog[body].span.clone(), "Yield type doesn't match previous branches",
              format!("Expected type '{prev}', got '{ret}'")));
          }
        }
      } else {
        return Err(err_span(prog[body].span.clone(), "Must yield a value in this branch"));
      }
    }
    let all_return = prog[node].returns && prog[body].returns;
    prog[node].returns = all_return;
    Ok(())
  }

  fn check_match_for_enum(
    &mut self, prog: &mut Program, strukt: StructId, node: NodeId, is_expr: bool,
  ) -> Result<()> {
    let NodeKind::Match { scrutinee, cases, default, default_span } = prog[node].kind.clone()
    else { panic!("not a match") };
    let struct_ty = prog[strukt].ty.clone();
    let mut seen: HashMap<Rc<str>, Span> = HashMap::new();
    prog[node].returns = !cases.is_empty();
    for MatchCase { pat, body } in cases {
      let name: Rc<str> = if let NodeKind::Ident { name, .. } = &prog[pat].kind {
        let name: Rc<str> = name.as_str().into();
        if prog[strukt].find_field(prog, &name).is_none() {
          return Err(err_span(prog[pat].span.clone(), "Enum has no field with this name"));
        }
        prog[pat].kind = NodeKind::EnumValue { strukt, variant: name.to_string() };
        prog[pat].etype = Some(struct_ty.clone());
        name
      } else {
        let cond_type = self.check_expression(prog, pat)?;
        if !cond_type.eq(&struct_ty) {
          return Err(err_span_note_span(
            prog[pat].span.clone(), "Condition does not match expression type",
            prog[scrutinee].span.clone(),
            format!("Match expression is of type '{struct_ty}'")));
        }
        match &prog[pat].kind {
          NodeKind::EnumValue { variant, .. } => variant.as_str().into(),
          _ => return Err(err_span(prog[pat].span.clone(),
            "Match pattern must be an enum variant")),
        }
      };
      if let Some(prev) = seen.get(&name) {
        return Err(err_span_note_span(
          prog[pat].span.clone(), "Duplicate condition name in match",
          prev.clone(), "This condition was previously used here"));
      }
      seen.insert(name, prog[pat].span.clone());
      if let Some(body) = body {
        self.check_expression_statement(prog, node, body, is_expr)?;
      }
    }
    if seen.len() != prog[strukt].fields.len() {
      let Some(default) = default else {
        return Err(err_span_note(
          prog[node].span.clone(), "Match does not cover all cases",
          format!("Only {} of {} cases are covered",
            seen.len(), prog[strukt].fields.len())));
      };
      self.check_expression_statement(prog, node, default, is_expr)?;
    } else if let Some(default_span) = default_span {
      return Err(err_span(default_span, "`else` case is not needed for this match"));
    }
    if is_expr && prog[node].etype.is_none() && !prog[node].returns {
      return Err(err_span(prog[node].span.clone(), "Expression-match must yield a value"));
    }
    Ok(())
  }

  fn check_match(&mut self, prog: &mut Program, node: NodeId, is_expr: bool) -> Result<()> {
    let NodeKind::Match { scrutinee, cases, default, .. } = prog[node].kind.clone()
    else { panic!("not a match") };
    let expr_type = self.check_expression(prog, scrutinee)?;
    if let TyKind::Structure(name) = &expr_type.kind {
      let &sid = self.structures.get(&**name).expect("checked expression with unknown struct");
      if prog[sid].is_enum() {
        return self.check_match_for_enum(prog, sid, node, is_expr);
      }
    }
    if !matches!(expr_type.kind, TyKind::I32 | TyKind::Char) && !expr_type.is_string() {
      return Err(err_span_note(
        prog[scrutinee].span.clone(), "This type cannot be matched on",
        format!("Expression type is '{expr_type}'")));
    }
    prog[node].returns = !cases.is_empty();
    for MatchCase { pat, body } in cases {
      let cond_type = self.check_expression(prog, pat)?;
      if !cond_type.eq(&expr_type) {
        return Err(err_span_note_span(
          prog[pat].span.clone(), "Condition does not match expression type",
          prog[scrutinee].span.clone(),
          format!("Match expression is of type '{expr_type}'")));
      }
      if !matches!(prog[pat].kind,
        NodeKind::IntLit(_) | NodeKind::CharLit(_) | NodeKind::StringLit(_))
      {
        return Err(err_span(prog[pat].span.clone(), "Match condition must use only literals"));
      }
      if let Some(body) = body {
        self.check_expression_statement(prog, node, body, is_expr)?;
      }
    }
    let Some(default) = default else {
      return Err(err_span(prog[node].span.clone(), "`else` case is missing"));
    };
    self.check_expression_statement(prog, node, default, is_expr)?;
    if is_expr && prog[node].etype.is_none() && !prog[node].returns {
      return Err(err_span(prog[node].span.clone(), "Expression-match must yield a value"));
    }
    Ok(())
  }

  fn check_if(&mut self, prog: &mut Program, node: NodeId, is_expr: bool) -> Result<()> {
    let NodeKind::If { cond, body, els } = prog[node].kind.clone() else { panic!("not an if") };
    let cond_type = self.check_expression(prog, cond)?;
    if !matches!(cond_type.kind, TyKind::Bool) {
      return Err(err_span_note(
        prog[cond].span.clone(), "Condition must be a boolean",
        format!("Got type '{cond_type}'")));
    }
    self.check_expression_statement(prog, node, body, is_expr)?;
    if let Some(els) = els {
      self.check_expression_statement(prog, node, els, is_expr)?;
      if prog[body].returns && prog[els].returns {
        prog[node].returns = true;
      }
    } else if is_expr {
      return Err(err_span(prog[node].span.clone(),
        "Expression-if must have an 'else' branch"));
    }
    if is_expr && prog[node].etype.is_none() && !prog[node].returns {
      return Err(err_span(prog[node].span.clone(), "Expression-if must yield a value"));
    }
    Ok(())
  }

  /// Prepend the member-access LHS as the method's first argument, adjusted
  /// with `&`/`*` to match the declared receiver. Guarded by the call's
  /// `receiver_injected` flag so running the check twice cannot prepend a
  /// second copy.
  fn check_method_call(&mut self, prog: &mut Program, method: FuncId, node: NodeId) -> Result<()> {
    let NodeKind::Call { callee, receiver_injected, .. } = prog[node].kind.clone()
    else { panic!("not a call") };
    if !matches!(prog[callee].kind, NodeKind::Member { .. } | NodeKind::ScopeLookup { .. }) {
      return Err(err_span(prog[callee].span.clone(),
        "Method call is not to a member, internal compiler error"));
    }
    if let NodeKind::Call { func, .. } = &mut prog[node].kind {
      *func = Some(method);
    }
    if receiver_injected {
      return Ok(());
    }
    if let NodeKind::Call { receiver_injected, .. } = &mut prog[node].kind {
      *receiver_injected = true;
    }
    let NodeKind::Member { lhs, is_pointer, .. } = prog[callee].kind.clone() else {
      // a `T::method(args)` call passes its receiver explicitly
      return Ok(());
    };
    let Some(&this_param) = prog[method].params.first() else {
      return Err(err_span(prog[callee].span.clone(),
        "Instance method should have `this` argument, internal error"));
    };
    let receiver_ty = prog[this_param].ty.clone().expect("parameter without a type");
    // the receiver is by-value unless it is a (non-string) pointer
    let by_value = receiver_ty.is_string() || !matches!(receiver_ty.kind, TyKind::Pointer(_));
    let span = prog[lhs].span.clone();
    let first_arg = if is_pointer && by_value {
      prog.push_node(Node::new(NodeKind::Unary { op: UnOp::Deref, expr: lhs }, span))
    } else if !is_pointer && !by_value {
      prog.push_node(Node::new(NodeKind::Unary { op: UnOp::Addr, expr: lhs }, span))
    } else {
      lhs
    };
    if let NodeKind::Call { args, .. } = &mut prog[node].kind {
      args.insert(0, first_arg);
    }
    Ok(())
  }

  fn check_call(&mut self, prog: &mut Program, node: NodeId) -> Result<Ty> {
    let NodeKind::Call { callee, args, .. } = prog[node].kind.clone() else { panic!("not a call") };
    // `print` and `println` delegate formatting to C's printf: arguments
    // are checked in isolation and the call types as void
    let callee_name = match &prog[callee].kind {
      NodeKind::Ident { name, .. } => Some(name.clone()),
      _ => None,
    };
    if matches!(callee_name.as_deref(), Some("print" | "println")) {
      for arg in args {
        self.check_expression(prog, arg)?;
      }
      return Ok(Type::new(TyKind::Void, prog[node].span.clone()));
    }
    let func_type = self.check_expression(prog, callee)?;
    let def = match &func_type.kind {
      TyKind::Function { def, .. } => *def,
      TyKind::Method { def, .. } => Some(*def),
      _ => {
        return Err(err_span_note(
          prog[callee].span.clone(), "Cannot call a non-function type",
          format!("Type for expression is '{func_type}'")));
      }
    };
    if let Some(fid) = def {
      if let NodeKind::Call { func, .. } = &mut prog[node].kind {
        *func = Some(fid);
      }
      if prog[fid].exits() {
        prog[node].returns = true;
      }
    }
    if let TyKind::Method { def, .. } = &func_type.kind {
      self.check_method_call(prog, *def, node)?;
    }
    let (params, ret) = match &func_type.kind {
      TyKind::Function { params, ret, .. } | TyKind::Method { params, ret, .. } =>
        (params.clone(), ret.clone()),
      _ => unreachable!(),
    };
    let NodeKind::Call { args, .. } = prog[node].kind.clone() else { unreachable!() };
    if params.len() != args.len() {
      return Err(err_span_note_span(
        prog[node].span.clone(), "Number of arguments does not match function signature",
        func_type.span.clone(),
        format!("This function expects {} arguments, got {}", params.len(), args.len())));
    }
    for (param, arg) in params.iter().zip(args) {
      let arg_type = self.check_expression(prog, arg)?;
      if !param.eq(&arg_type) {
        return Err(err_span_note_span(
          prog[arg].span.clone(), "Argument type does not match function parameter type",
          param.span.clone(), format!("Expected '{param}', got '{arg_type}'")));
      }
    }
    Ok(ret)
  }

  /// Assemble the C format string for a backtick literal: each interpolated
  /// expression contributes the specifier its type prints with.
  fn check_format_string(&mut self, prog: &mut Program, node: NodeId) -> Result<Ty> {
    let NodeKind::FmtStr { parts, exprs, .. } = prog[node].kind.clone()
    else { panic!("not a format string") };
    if parts.len() != exprs.len() + 1 {
      return Err(err_span(prog[node].span.clone(),
        "Number of format string parts does not match number of expressions"));
    }
    let mut buf = String::new();
    for (part, &expr) in parts.iter().zip(&exprs) {
      buf.push_str(part);
      let expr_type = self.check_expression(prog, expr)?;
      buf.push_str(match &expr_type.kind {
        TyKind::I32 | TyKind::U8 => "%d",
        TyKind::Bool => "%s",
        TyKind::F32 => "%f",
        TyKind::Char => "%c",
        TyKind::Pointer(p) if matches!(p.kind, TyKind::Char) => "%s",
        TyKind::Pointer(_) => "%p",
        _ => return Err(err_span(prog[expr].span.clone(), "Invalid type for format string")),
      });
    }
    buf.push_str(parts.last().expect("parts is never empty"));
    if let NodeKind::FmtStr { compiled, .. } = &mut prog[node].kind {
      *compiled = Some(buf);
    }
    Ok(Type::ptr_to(TyKind::Char, prog[node].span.clone()))
  }

  fn check_pointer_arith(
    &self, prog: &Program, node: NodeId, op: BinOp, lhs: &Ty, rhs: &Ty,
  ) -> Result<Ty> {
    if matches!(op, BinOp::Add | BinOp::Sub) {
      if matches!(lhs.kind, TyKind::Pointer(_)) && matches!(rhs.kind, TyKind::I32) {
        return Ok(lhs.clone());
      }
      if matches!(lhs.kind, TyKind::I32) && matches!(rhs.kind, TyKind::Pointer(_)) {
        return Ok(rhs.clone());
      }
      if lhs.eq(rhs) && matches!(lhs.kind, TyKind::Pointer(_)) && op == BinOp::Sub {
        return Ok(Type::new(TyKind::I32, prog[node].span.clone()));
      }
    }
    Err(err_span(prog[node].span.clone(), "Invalid pointer arithmetic"))
  }

  fn error_unknown_identifier(&self, span: Span, name: &str) -> crate::diag::Error {
    let options: Vec<Rc<str>> = self.scopes.iter()
      .flat_map(|scope| scope.keys().cloned())
      .chain(self.functions.keys().cloned())
      .collect();
    match find_word_suggestion(name, options.iter().map(|s| &**s)) {
      Some(suggestion) => err_span_note(span, "Unknown Identifier",
        format!("Possible alternative: {}", suggestion.green())),
      None => err_span(span, "Unknown Identifier"),
    }
  }

  /// Type an expression node, recording the (array-decayed) result on the
  /// node's `etype`.
  pub fn check_expression(&mut self, prog: &mut Program, node: NodeId) -> Result<Ty> {
    let span = prog[node].span.clone();
    let etype = match prog[node].kind.clone() {
      NodeKind::Call { .. } => self.check_call(prog, node)?,
      NodeKind::IntLit(_) => Type::new(TyKind::I32, span.clone()),
      NodeKind::FloatLit(_) => Type::new(TyKind::F32, span.clone()),
      NodeKind::BoolLit(_) => Type::new(TyKind::Bool, span.clone()),
      NodeKind::StringLit(_) => Type::ptr_to(TyKind::Char, span.clone()),
      NodeKind::CharLit(_) => Type::new(TyKind::Char, span.clone()),
      NodeKind::Null => Type::ptr_to(TyKind::Void, span.clone()),
      NodeKind::FmtStr { .. } => self.check_format_string(prog, node)?,
      NodeKind::SizeOf(ty) => {
        if !self.type_is_valid(&ty) {
          return Err(err_span(ty.span.clone(), "Invalid type"));
        }
        Type::new(TyKind::I32, span.clone())
      }
      NodeKind::Ident { name, res } => match res {
        IdentRes::Func(fid) => prog[fid].ty.clone().expect("unregistered function"),
        _ => {
          if let Some(var) = self.find_var(&name) {
            if let NodeKind::Ident { res, .. } = &mut prog[node].kind {
              *res = IdentRes::Var(var);
            }
            prog[var].ty.clone().expect("variable without a type")
          } else if let Some(&fid) = self.functions.get(name.as_str()) {
            if let NodeKind::Ident { res, .. } = &mut prog[node].kind {
              *res = IdentRes::Func(fid);
            }
            prog[fid].ty.clone().expect("unregistered function")
          } else {
            return Err(self.error_unknown_identifier(span, &name));
          }
        }
      },
      NodeKind::Binary { op, lhs, rhs } => match op {
        BinOp::Add | BinOp::Sub | BinOp::Mul | BinOp::Div => {
          let lhs_ty = self.check_expression(prog, lhs)?;
          let rhs_ty = self.check_expression(prog, rhs)?;
          if matches!(lhs_ty.kind, TyKind::Pointer(_))
            || matches!(rhs_ty.kind, TyKind::Pointer(_))
          {
            self.check_pointer_arith(prog, node, op, &lhs_ty, &rhs_ty)?
          } else if !lhs_ty.is_numeric() || !rhs_ty.is_numeric() {
            return Err(err_span_note(span, "Operator requires numeric types",
              format!("Got types '{lhs_ty}' and '{rhs_ty}'")));
          } else if !lhs_ty.eq(&rhs_ty) {
            return Err(err_span_note(span, "Operands must be of the same type",
              format!("Got types '{lhs_ty}' and '{rhs_ty}'")));
          } else {
            lhs_ty
          }
        }
        BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge => {
          let lhs_ty = self.check_expression(prog, lhs)?;
          let rhs_ty = self.check_expression(prog, rhs)?;
          if !lhs_ty.is_numeric() || !rhs_ty.is_numeric() {
            return Err(err_span_note(span, "Operator requires numeric types",
              format!("Got types '{lhs_ty}' and '{rhs_ty}'")));
          }
          if !lhs_ty.eq(&rhs_ty) {
            return Err(err_span_note(span, "Operands must be of the same type",
              format!("Got types '{lhs_ty}' and '{rhs_ty}'")));
          }
          Type::new(TyKind::Bool, span.clone())
        }
        BinOp::Eq | BinOp::Ne => {
          let lhs_ty = self.check_expression(prog, lhs)?;
          let rhs_ty = self.check_expression(prog, rhs)?;
          if !lhs_ty.eq(&rhs_ty) {
            return Err(err_span_note(span, "Operands must be of the same type",
              format!("Got types '{lhs_ty}' and '{rhs_ty}'")));
          }
          if let TyKind::Structure(name) = &lhs_ty.kind {
            let &sid = self.structures.get(&**name).expect("checked type with unknown struct");
            if !prog[sid].is_enum() {
              return Err(err_span(span, "Cannot compare structs directly"));
            }
          }
          Type::new(TyKind::Bool, span.clone())
        }
        BinOp::And | BinOp::Or => {
          let lhs_ty = self.check_expression(prog, lhs)?;
          let rhs_ty = self.check_expression(prog, rhs)?;
          if !lhs_ty.eq(&rhs_ty) || !matches!(lhs_ty.kind, TyKind::Bool) {
            return Err(err_span_note(span, "Operands must be boolean",
              format!("Got types '{lhs_ty}' and '{rhs_ty}'")));
          }
          Type::new(TyKind::Bool, span.clone())
        }
        BinOp::Mod | BinOp::BitAnd | BinOp::BitOr | BinOp::BitXor => {
          let lhs_ty = self.check_expression(prog, lhs)?;
          let rhs_ty = self.check_expression(prog, rhs)?;
          if !matches!(lhs_ty.kind, TyKind::I32) || !matches!(rhs_ty.kind, TyKind::I32) {
            return Err(err_span_note(span, "Operator requires integer types",
              format!("Got types '{lhs_ty}' and '{rhs_ty}'")));
          }
          lhs_ty
        }
        BinOp::AddAssign | BinOp::SubAssign | BinOp::MulAssign | BinOp::DivAssign => {
          let lhs_ty = self.check_expression(prog, lhs)?;
          let rhs_ty = self.check_expression(prog, rhs)?;
          if !lhs_ty.is_numeric() || !rhs_ty.is_numeric() {
            return Err(err_span_note(span, "Operator requires numeric types",
              format!("Got types '{lhs_ty}' and '{rhs_ty}'")));
          }
          if !lhs_ty.eq(&rhs_ty) {
            return Err(err_span_note(span, "Operands must be of the same type",
              format!("Got types '{lhs_ty}' and '{rhs_ty}'")));
          }
          lhs_ty
        }
        BinOp::Assign => {
          let lhs_ty = self.check_expression(prog, lhs)?;
          let rhs_ty = self.check_expression(prog, rhs)?;
          if !lhs_ty.eq(&rhs_ty) {
            return Err(err_span_note(span, "Variable type does not match assignment type",
              format!("Expected type '{lhs_ty}', got '{rhs_ty}'")));
          }
          lhs_ty
        }
      },
      NodeKind::Unary { op, expr } => match op {
        UnOp::Not => {
          let ty = self.check_expression(prog, expr)?;
          if !matches!(ty.kind, TyKind::Bool) {
            return Err(err_span_note(prog[expr].span.clone(), "Expression must be boolean",
              format!("Got type '{ty}'")));
          }
          Type::new(TyKind::Bool, span.clone())
        }
        UnOp::Neg => {
          let ty = self.check_expression(prog, expr)?;
          if !ty.is_numeric() {
            return Err(err_span_note(prog[expr].span.clone(), "Expression must be a number",
              format!("Got type '{ty}'")));
          }
          ty
        }
        UnOp::Addr => {
          let ty = self.check_expression(prog, expr)?;
          Type::new(TyKind::Pointer(ty), span.clone())
        }
        UnOp::Deref => {
          let ty = self.check_expression(prog, expr)?;
          let TyKind::Pointer(inner) = &ty.kind else {
            return Err(err_span_note(
              prog[expr].span.clone(), "Expression must be a pointer-type",
              format!("Got type '{ty}'")));
          };
          inner.clone()
        }
        UnOp::IsNotNull => {
          let ty = self.check_expression(prog, expr)?;
          if !matches!(ty.kind, TyKind::Pointer(_)) {
            return Err(err_span_note(span, "Can only use ? on pointer types",
              format!("Type of expression is '{ty}'")));
          }
          Type::new(TyKind::Bool, span.clone())
        }
      },
      NodeKind::IndexOp { lhs, index } => {
        let lhs_ty = self.check_expression(prog, lhs)?;
        let TyKind::Pointer(inner) = &lhs_ty.kind else {
          return Err(err_span_note(
            prog[lhs].span.clone(), "Expression must be a pointer-type",
            format!("Got type '{lhs_ty}'")));
        };
        let index_ty = self.check_expression(prog, index)?;
        if !matches!(index_ty.kind, TyKind::I32) {
          return Err(err_span_note(prog[index].span.clone(), "Index must be an integer",
            format!("Got type '{index_ty}'")));
        }
        inner.clone()
      }
      NodeKind::ScopeLookup { lhs, name } => {
        let NodeKind::Ident { name: struct_name, .. } = prog[lhs].kind.clone() else {
          return Err(err_span(prog[lhs].span.clone(),
            "Left hand side of `::` must be a struct name"));
        };
        let Some(&sid) = self.structures.get(struct_name.as_str()) else {
          return Err(err_span(prog[lhs].span.clone(), "Unknown struct with this name"));
        };
        let field = prog[sid].find_field(prog, &name);
        let method = self.get_method(&struct_name, &name);
        if prog[sid].is_enum() && field.is_some() {
          prog[node].kind = NodeKind::EnumValue { strukt: sid, variant: name };
          prog[sid].ty.clone()
        } else if let Some(method) = method {
          prog[method].ty.clone().expect("unregistered method")
        } else {
          return Err(err_span(span, "Struct has no static method with this name"));
        }
      }
      NodeKind::Member { lhs, name, name_span, .. } => {
        let lhs_ty = self.check_expression(prog, lhs)?;
        if !lhs_ty.is_struct_or_ptr() && !lhs_ty.is_string() {
          return Err(err_span_note(
            prog[lhs].span.clone(), "LHS of member access must be a struct / string",
            format!("Got type '{lhs_ty}'")));
        }
        let (struct_name, is_pointer) = match lhs_ty.struct_name() {
          Some((name, is_ptr)) => (name.clone(), is_ptr),
          None => (Rc::from("string"), false),
        };
        if let NodeKind::Member { is_pointer: p, .. } = &mut prog[node].kind {
          *p = is_pointer;
        }
        let strukt = self.structures.get(&*struct_name).copied();
        let field = strukt.and_then(|sid| prog[sid].find_field(prog, &name));
        let method = self.get_method(&struct_name, &name);
        let plain_field = match (strukt, field) {
          (Some(sid), Some(field)) if !prog[sid].is_enum() => Some(field),
          _ => None,
        };
        if let Some(field) = plain_field {
          prog[field].ty.clone().expect("field without a type")
        } else if let Some(method) = method {
          if prog[method].is_static() {
            return Err(err_span_note_span(
              span, "Member access requires a non-static method",
              prog[method].span.clone(), "This is a static method"));
          }
          prog[method].ty.clone().expect("unregistered method")
        } else {
          let display = match &lhs_ty.kind {
            TyKind::Pointer(p) if is_pointer => p.clone(),
            _ => lhs_ty.clone(),
          };
          return Err(err_span_note_span(
            name_span, "Type has no member with this name",
            prog[lhs].span.clone(), format!("LHS type is '{display}'")));
        }
      }
      NodeKind::EnumValue { strukt, .. } => prog[strukt].ty.clone(),
      NodeKind::Cast { expr, to } => {
        self.check_expression(prog, expr)?;
        if !self.type_is_valid(&to) {
          return Err(err_span(to.span.clone(), "Type does not exist"));
        }
        to
      }
      NodeKind::Match { .. } => {
        self.check_match(prog, node, true)?;
        prog[node].etype.clone()
          .ok_or_else(|| err_span(span.clone(), "Expression-match must yield a value"))?
      }
      NodeKind::If { .. } => {
        self.check_if(prog, node, true)?;
        prog[node].etype.clone()
          .ok_or_else(|| err_span(span.clone(), "Expression-if must yield a value"))?
      }
      _ => {
        return Err(err_span(span, "Cannot use this statement in expression context"));
      }
    };
    let etype = decay_array(&etype);
    prog[node].etype = Some(etype.clone());
    Ok(etype)
  }
}
