//! Semantic invariants: name resolution, struct ordering, include
//! idempotence, the receiver-injection rewrite, and the rejection rules.

use std::fs;

use aecc::codegen::CodeGenerator;
use aecc::infer::TypeChecker;
use aecc::types::ty::TyKind;
use aecc::{Error, Program};

fn compile_result(src: &str) -> aecc::Result<(Program, String)> {
  let dir = tempfile::tempdir().unwrap();
  let path = dir.path().join("main.ae");
  fs::write(&path, src).unwrap();
  let root = env!("CARGO_MANIFEST_DIR").to_owned();
  let (prog, c) = aecc::compile_to_c(path.to_str().unwrap(), &[root], false)?;
  Ok((prog, String::from_utf8(c).unwrap()))
}

fn compile_ok(src: &str) -> (Program, String) {
  compile_result(src).unwrap_or_else(|e| panic!("compile failed: {e}"))
}

fn compile_err(src: &str) -> String {
  match compile_result(src) {
    Ok((_, c)) => panic!("expected an error, got:\n{c}"),
    Err(e) => e.to_string(),
  }
}

#[test]
fn including_a_file_twice_contributes_once() {
  let dir = tempfile::tempdir().unwrap();
  fs::write(dir.path().join("util.ae"), "def helper(): i32 {\n  return 7\n}\n").unwrap();
  let main = dir.path().join("main.ae");
  fs::write(&main, r#"
use "@/util.ae"
use "@/util.ae"

def main(): i32 {
  return helper()
}
"#).unwrap();
  let root = env!("CARGO_MANIFEST_DIR").to_owned();
  let (prog, _) = aecc::compile_to_c(main.to_str().unwrap(), &[root], false)
    .unwrap_or_else(|e| panic!("compile failed: {e}"));
  // the prelude and util.ae, each exactly once
  assert_eq!(prog.included_files.len(), 2);
  assert_eq!(prog.functions.iter().filter(|f| &*f.name == "helper").count(), 1);
}

#[test]
fn structs_are_ordered_by_field_dependency() {
  let (prog, c) = compile_ok(r#"
struct Outer {
  inner: Inner
  count: i32
}

struct Inner {
  value: i32
}

def main(): i32 {
  let o: Outer
  return o.inner.value
}
"#);
  let names: Vec<&str> = prog.structures.iter().map(|&sid| &*prog[sid].name).collect();
  let inner = names.iter().position(|n| *n == "Inner").unwrap();
  let outer = names.iter().position(|n| *n == "Outer").unwrap();
  assert!(inner < outer, "bad order: {names:?}");
  assert!(c.find("struct Inner {").unwrap() < c.find("struct Outer {").unwrap());
}

#[test]
fn struct_containment_cycle_is_rejected() {
  let err = compile_err(r#"
struct A {
  b: B
}

struct B {
  a: A
}

def main(): i32 {
  return 0
}
"#);
  assert!(err.contains("cycle"), "unexpected error: {err}");
}

#[test]
fn pointer_fields_do_not_constrain_order() {
  // recursion through a pointer is fine
  let (_, c) = compile_ok(r#"
struct Node {
  next: &Node
  value: i32
}

def main(): i32 {
  let n: Node
  return n.value
}
"#);
  assert!(c.contains("Node* next;"));
}

#[test]
fn no_expression_is_left_with_an_array_type() {
  let (prog, _) = compile_ok(r#"
def sum(values: &i32, n: i32): i32 {
  let total = 0
  for let i = 0; i < n; i += 1 {
    total += values[i]
  }
  return total
}

def main(): i32 {
  let arr: i32[3]
  arr[0] = 1
  arr[1] = 2
  arr[2] = 3
  return sum(arr, 3)
}
"#);
  for node in &prog.nodes {
    if let Some(ty) = &node.etype {
      assert!(!matches!(ty.kind, TyKind::Array(..)),
        "array-typed expression survived at {}", node.span);
    }
  }
}

#[test]
fn rechecking_does_not_duplicate_receivers() {
  let src = r#"
struct P {
  x: i32
}

def P::get(&this): i32 {
  return .x
}

def main(): i32 {
  let p: P
  return p.get()
}
"#;
  let (mut prog, first) = compile_ok(src);
  TypeChecker::new().check_program(&mut prog).unwrap();
  let mut out = Vec::new();
  CodeGenerator::new(&prog, &mut out, false).gen_program().unwrap();
  let second = String::from_utf8(out).unwrap();
  assert_eq!(first, second);
  assert!(second.contains("P__get((&p))"));
  assert!(!second.contains("P__get((&(&p)))"));
}

#[test]
fn enum_match_must_be_exhaustive() {
  let err = compile_err(r#"
enum Color {
  Red
  Green
  Blue
}

def main(): i32 {
  let c = Color::Red
  match c {
    Red => return 1
    Green => return 2
  }
}
"#);
  assert!(err.contains("Match does not cover all cases"), "unexpected error: {err}");
}

#[test]
fn redundant_else_on_exhaustive_enum_match_is_rejected() {
  let err = compile_err(r#"
enum Color {
  Red
  Green
}

def main(): i32 {
  let c = Color::Red
  match c {
    Red => return 1
    Green => return 2
    else => return 3
  }
}
"#);
  assert!(err.contains("`else` case is not needed"), "unexpected error: {err}");
}

#[test]
fn duplicate_match_arm_is_rejected() {
  let err = compile_err(r#"
enum Color {
  Red
  Green
}

def main(): i32 {
  let c = Color::Red
  match c {
    Red => return 1
    Red => return 2
    else => return 3
  }
}
"#);
  assert!(err.contains("Duplicate condition name in match"), "unexpected error: {err}");
}

#[test]
fn non_enum_match_requires_else() {
  let err = compile_err(r#"
def main(): i32 {
  match 3 {
    1 => return 1
    2 => return 2
  }
}
"#);
  assert!(err.contains("`else` case is missing"), "unexpected error: {err}");
}

#[test]
fn unknown_identifier_suggests_a_near_name() {
  let err = compile_result(r#"
def main(): i32 {
  let count = 5
  return cuont
}
"#).unwrap_err();
  let Error::Diag(diag) = err else { panic!("expected a diagnostic") };
  assert_eq!(diag.message, "Unknown Identifier");
  let note = diag.note.expect("expected a suggestion note");
  assert!(note.message.contains("count"), "bad suggestion: {}", note.message);
}

#[test]
fn break_outside_loop_is_rejected() {
  let err = compile_err("def main(): i32 { break }");
  assert!(err.contains("Break statement outside of loop"), "unexpected error: {err}");
}

#[test]
fn yield_outside_expression_context_is_rejected() {
  let err = compile_err(r#"
def main(): i32 {
  yield 5
  return 0
}
"#);
  assert!(err.contains("Cannot yield in this context"), "unexpected error: {err}");
}

#[test]
fn expression_if_requires_else() {
  let err = compile_err(r#"
def main(): i32 {
  let x = if true then 10
  return x
}
"#);
  assert!(err.contains("Expression-if must have an 'else' branch"), "unexpected error: {err}");
}

#[test]
fn return_type_mismatch_is_rejected() {
  let err = compile_err("def main(): i32 { return \"hello\" }");
  assert!(err.contains("Return type '&char' is incorrect"), "unexpected error: {err}");
}

#[test]
fn non_returning_function_is_rejected() {
  let err = compile_err(r#"
def pick(flag: bool): i32 {
  if flag then return 1
}

def main(): i32 {
  return pick(true)
}
"#);
  assert!(err.contains("Function does not always return"), "unexpected error: {err}");
}

#[test]
fn structs_cannot_be_compared() {
  let err = compile_err(r#"
struct P {
  x: i32
}

def main(): i32 {
  let a: P
  let b: P
  if a == b then return 1
  return 0
}
"#);
  assert!(err.contains("Cannot compare structs directly"), "unexpected error: {err}");
}

#[test]
fn arity_mismatch_is_rejected() {
  let err = compile_err(r#"
def add(a: i32, b: i32): i32 {
  return a + b
}

def main(): i32 {
  return add(1)
}
"#);
  assert!(err.contains("Number of arguments does not match"), "unexpected error: {err}");
}

#[test]
fn duplicate_definitions_are_rejected() {
  let err = compile_err(r#"
def twice(): i32 {
  return 1
}

def twice(): i32 {
  return 2
}

def main(): i32 {
  return twice()
}
"#);
  assert!(err.contains("Function is already defined"), "unexpected error: {err}");

  let err = compile_err(r#"
struct P {
  x: i32
}

struct P {
  y: i32
}

def main(): i32 {
  return 0
}
"#);
  assert!(err.contains("Struct has already been defined"), "unexpected error: {err}");
}

#[test]
fn method_name_may_not_shadow_a_field() {
  let err = compile_err(r#"
struct P {
  x: i32
}

def P::x(&this): i32 {
  return 0
}

def main(): i32 {
  return 0
}
"#);
  assert!(err.contains("Type already has a field with this name"), "unexpected error: {err}");
}

#[test]
fn static_method_cannot_be_called_through_a_value() {
  let err = compile_err(r#"
struct P {
  x: i32
}

def P::make(): P {
  let p: P
  return p
}

def main(): i32 {
  let p: P
  let q = p.make()
  return 0
}
"#);
  assert!(err.contains("Member access requires a non-static method"), "unexpected error: {err}");
}

#[test]
fn pointer_arithmetic_rules() {
  let (_, c) = compile_ok(r#"
def main(): i32 {
  let buf = "hello"
  let end = buf + 2
  return end - buf
}
"#);
  assert!(c.contains("(buf + 2)"));
  assert!(c.contains("(end - buf)"));

  let err = compile_err(r#"
def main(): i32 {
  let buf = "hello"
  let bad = buf * 2
  return 0
}
"#);
  assert!(err.contains("Invalid pointer arithmetic"), "unexpected error: {err}");
}

#[test]
fn extern_global_requires_a_type() {
  let err = compile_err(r#"
let environ extern

def main(): i32 {
  return 0
}
"#);
  assert!(err.contains("Extern variables must have a type"), "unexpected error: {err}");
}

#[test]
fn yield_twice_in_a_block_is_rejected() {
  let err = compile_err(r#"
def main(): i32 {
  let x = if true {
    yield 1
    yield 2
  } else {
    yield 3
  }
  return x
}
"#);
  assert!(err.contains("Cannot yield multiple times in a block"), "unexpected error: {err}");
}

#[test]
fn string_methods_resolve_through_the_prelude() {
  let (_, c) = compile_ok(r#"
def main(): i32 {
  let s = "hello"
  return s.len()
}
"#);
  assert!(c.contains("strlen(s)"), "string method not lowered: {c}");
}
