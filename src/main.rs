//! The command-line driver: parse arguments, run the pipeline, write the C
//! output, and optionally hand it to the system C compiler.

use clap::Parser as _;
use itertools::Itertools;
use std::io::Write;
use std::process::{exit, Command};
use std::{fs, io};

use aecc::Error;

#[derive(clap::Parser)]
#[command(name = "aecc", about = "Compile an Ae source file to C and build it")]
struct Args {
  /// Output executable path
  #[arg(short = 'o', value_name = "path", default_value = "./out")]
  out: String,
  /// Output C path (default: {out}.c)
  #[arg(short = 'c', value_name = "path")]
  c_path: Option<String>,
  /// Silent mode (do not echo the C compiler invocation)
  #[arg(short = 's')]
  silent: bool,
  /// Do not invoke the C compiler
  #[arg(short = 'n')]
  no_compile: bool,
  /// Emit #line directives into the generated C
  #[arg(short = 'd')]
  debug: bool,
  /// Add an include root
  #[arg(short = 'l', value_name = "dir")]
  lib: Vec<String>,
  /// The entry source file
  #[arg(value_name = "file.ae")]
  file: String,
}

fn main() {
  env_logger::init();
  let args = Args::try_parse().unwrap_or_else(|err| {
    let failed = err.use_stderr();
    let _ = err.print();
    exit(i32::from(failed))
  });
  let c_path = args.c_path.clone().unwrap_or_else(|| format!("{}.c", args.out));

  let (prog, c_source) = match aecc::compile_to_c(&args.file, &args.lib, args.debug) {
    Ok(result) => result,
    Err(Error::Diag(diag)) => {
      let _ = diag.render(&mut io::stdout().lock());
      exit(1)
    }
    Err(Error::Io(err)) => {
      println!("{err}");
      exit(1)
    }
  };
  if let Err(err) = fs::write(&c_path, &c_source) {
    println!("Error writing '{c_path}': {err}");
    exit(1)
  }
  log::info!("wrote {c_path}");
  if args.no_compile {
    return;
  }

  let mut cmd = format!("gcc -o {} {}", args.out, c_path);
  let flags = prog.c_flags.iter().join(" ");
  if !flags.is_empty() {
    cmd.push(' ');
    cmd.push_str(&flags);
  }
  if args.debug {
    cmd.push_str(" -ggdb3");
  }
  if !args.silent {
    println!("[+] {cmd}");
    let _ = io::stdout().flush();
  }
  match Command::new("sh").arg("-c").arg(&cmd).status() {
    Ok(status) if status.success() => {}
    Ok(status) => {
      println!("[-] Compilation failed");
      exit(status.code().unwrap_or(1))
    }
    Err(err) => {
      println!("[-] Could not run the C compiler: {err}");
      exit(1)
    }
  }
}
