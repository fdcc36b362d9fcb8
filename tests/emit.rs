//! End-to-end emission tests: compile a source snippet and check the shape
//! of the generated C.

use std::fs;

/// Compile a snippet in a scratch project, resolving the prelude against
/// this repository's `lib/`.
fn compile(src: &str) -> String {
  let dir = tempfile::tempdir().unwrap();
  let path = dir.path().join("main.ae");
  fs::write(&path, src).unwrap();
  let root = env!("CARGO_MANIFEST_DIR").to_owned();
  let (_, c) = aecc::compile_to_c(path.to_str().unwrap(), &[root], false)
    .unwrap_or_else(|e| panic!("compile failed: {e}"));
  String::from_utf8(c).unwrap()
}

#[test]
fn trivial_main() {
  let c = compile("def main(): i32 { return 42 }");
  assert!(c.contains("int main() {"), "missing main: {c}");
  assert!(c.contains("return 42;"));
}

#[test]
fn enum_match_lowers_to_switch() {
  let c = compile(r#"
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
    Blue => return 3
  }
}
"#);
  assert!(c.contains("enum Color"));
  assert!(c.contains("Color__Red"));
  assert!(c.contains("switch ("));
  assert!(c.contains("case Color__Red:"));
  assert!(c.contains("case Color__Green:"));
  assert!(c.contains("case Color__Blue:"));
}

#[test]
fn expression_if_becomes_ternary() {
  let c = compile(r#"
def main(): i32 {
  let x = if true then 10 else 20
  return x
}
"#);
  assert!(c.contains("(true ? 10 : 20)"), "no ternary in: {c}");
}

#[test]
fn expression_if_with_blocks_uses_yield_var() {
  let c = compile(r#"
def main(): i32 {
  let x = if true { yield 10 } else { yield 20 }
  return x
}
"#);
  assert!(c.contains("int __yield_0;"), "no yield var in: {c}");
  assert!(c.contains("__yield_0 = 10;"));
  assert!(c.contains("__yield_0 = 20;"));
  assert!(c.contains("__yield_0; })"));
}

#[test]
fn defers_run_in_reverse_order() {
  let c = compile(r#"
def main(): i32 {
  defer print("A")
  defer print("B")
  return 0
}
"#);
  assert!(c.contains("/* defers */"));
  let b = c.find("printf(\"B\")").expect("printf B missing");
  let a = c.find("printf(\"A\")").expect("printf A missing");
  assert!(b < a, "defers not reversed: {c}");
}

#[test]
fn method_receiver_is_injected() {
  let c = compile(r#"
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
"#);
  assert!(c.contains("P__get(P* this)"), "bad method decl: {c}");
  assert!(c.contains("P__get((&p))"), "receiver not injected: {c}");
  assert!(c.contains("this->x"));
}

#[test]
fn format_string_lowers_to_helper_call() {
  let c = compile("def main(): i32 { let s = `hello {1+2}`; return 0 }");
  assert!(c.contains("format_string(\"hello %d\", (1 + 2))"), "bad lowering: {c}");
}

#[test]
fn format_specifiers_follow_types() {
  let c = compile(r#"
def main(): i32 {
  let ok = true
  let c = 'x'
  let f = 1.5
  let name = "world"
  let s = `{ok} {c} {f} {name} {&f}`
  return 0
}
"#);
  assert!(c.contains("format_string(\"%s %c %f %s %p\", ok, c, f, name, (&f))"),
    "bad specifiers: {c}");
}

#[test]
fn string_match_uses_strcmp_chain() {
  let c = compile(r#"
def check(s: string): i32 {
  match s {
    "one" => return 1
    "two" => return 2
    else => return 0
  }
}

def main(): i32 {
  return check("one")
}
"#);
  assert!(c.contains("char *__match_str = s;"));
  assert!(c.contains("!strcmp(__match_str, \"one\")"));
  assert!(c.contains("!strcmp(__match_str, \"two\")"));
}

#[test]
fn grouped_match_arms_share_a_body() {
  let c = compile(r#"
enum Color {
  Red
  Green
  Blue
}

def main(): i32 {
  let c = Color::Green
  match c {
    Red | Green => return 1
    Blue => return 3
  }
}
"#);
  // a bodyless case falls through to the next arm's body
  assert!(c.contains("case Color__Red:\n"));
  assert!(c.contains("case Color__Green:"));
}

#[test]
fn globals_are_emitted_before_bodies() {
  let c = compile(r#"
let counter: i32 = 10

def main(): i32 {
  return counter
}
"#);
  assert!(c.contains("/* global variables */"));
  assert!(c.contains("int counter = 10;"));
  let globals = c.find("/* global variables */").unwrap();
  let main_body = c.find("int main() {").unwrap();
  assert!(globals < main_body);
}

#[test]
fn exits_functions_are_noreturn() {
  let c = compile(r#"
def die(code: i32) exits {
  exit(code)
}

def run(): i32 {
  die(1)
}

def main(): i32 {
  return run()
}
"#);
  assert!(c.contains("__attribute__((noreturn)) void die(int code)"), "missing noreturn: {c}");
}

#[test]
fn loops_and_pointer_ops() {
  let c = compile(r#"
def main(): i32 {
  let total = 0
  for let i = 0; i < 10; i += 1 {
    total += i
  }
  while total > 100 {
    total -= 1
  }
  let p = &total
  let q = p as untyped_ptr
  if p? then return *p
  return sizeof(i32)
}
"#);
  assert!(c.contains("for (int i = 0; (i < 10); i += 1) {"), "bad for: {c}");
  assert!(c.contains("while ((total > 100)) {"), "bad while: {c}");
  assert!(c.contains("int* p = (&total);"));
  assert!(c.contains("void* q = ((void*)p);"));
  assert!(c.contains("((bool)p)"));
  assert!(c.contains("sizeof(int)"));
}

#[test]
fn file_layout_order() {
  let c = compile(r#"
struct P {
  x: i32
}

let g: i32 = 1

def main(): i32 {
  let p: P
  return g
}
"#);
  let includes = c.find("#include \"stdio.h\"").unwrap();
  let embed = c.find("format_string").unwrap();
  let typedefs = c.find("/* struct declarations */").unwrap();
  let body = c.find("struct P {").unwrap();
  let protos = c.find("/* function declarations */").unwrap();
  let globals = c.find("/* global variables */").unwrap();
  assert!(includes < embed && embed < typedefs && typedefs < body
    && body < protos && protos < globals);
  assert!(c.contains("typedef struct P P;"));
}

#[test]
fn line_directives_when_debug() {
  let dir = tempfile::tempdir().unwrap();
  let path = dir.path().join("main.ae");
  fs::write(&path, "def main(): i32 {\n  return 0\n}\n").unwrap();
  let root = env!("CARGO_MANIFEST_DIR").to_owned();
  let (_, c) = aecc::compile_to_c(path.to_str().unwrap(), &[root], true).unwrap();
  let c = String::from_utf8(c).unwrap();
  assert!(c.contains("#line 2"), "missing #line: {c}");
}
