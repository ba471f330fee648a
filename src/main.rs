use std::io::{self, Write};
use std::path::PathBuf;

use colored::*;
use structopt::StructOpt;

use finch::common::source::Source;
use finch::core::install_natives;
use finch::repl::vm_exec;
use finch::vm::vm::Vm;

#[derive(StructOpt, Debug)]
#[structopt(name = "finch", about = "A small Lisp-style expression language")]
struct Options {
    /// Source file to load before entering the REPL. Falls back to
    /// `main.fn` in the current directory if present.
    #[structopt(parse(from_os_str))]
    path: Option<PathBuf>,
}

fn status_tag(label: &str, color: fn(ColoredString) -> ColoredString) -> ColoredString {
    color(label.bold())
}

fn report(label: &str, message: &str, color: fn(ColoredString) -> ColoredString) {
    eprintln!("{} {}", status_tag(label, color), message);
}

fn default_file() -> Option<PathBuf> {
    let fallback = PathBuf::from("main.fn");
    if fallback.exists() {
        Some(fallback)
    } else {
        None
    }
}

fn run_file(vm: &mut Vm, path: &std::path::Path) -> bool {
    let source = match Source::path(path) {
        Ok(source) => source,
        Err(io_err) => {
            report("Fatal", &format!("Could not read '{}': {}", path.display(), io_err), |s| s.red());
            return false;
        }
    };

    match vm_exec(vm, &source.contents) {
        Ok(values) => {
            for value in values {
                println!("{:?}", value);
            }
            true
        }
        Err(err) => {
            report("Error", &err.to_string(), |s| s.red());
            false
        }
    }
}

fn repl(vm: &mut Vm) {
    let stdin = io::stdin();
    loop {
        print!("> ");
        io::stdout().flush().ok();

        let mut line = String::new();
        if stdin.read_line(&mut line).unwrap_or(0) == 0 {
            break;
        }
        if line.trim().is_empty() {
            continue;
        }

        match vm_exec(vm, &line) {
            Ok(values) => {
                for value in values {
                    println!("{:?}", value);
                }
            }
            Err(err) => report("Error", &err.to_string(), |s| s.red()),
        }
    }
}

fn main() {
    env_logger::init();
    let options = Options::from_args();

    let mut vm = Vm::new();
    install_natives(&mut vm);

    let path = options.path.or_else(default_file);
    let mut ok = true;
    if let Some(path) = &path {
        ok = run_file(&mut vm, path);
    }

    if ok {
        repl(&mut vm);
    }

    std::process::exit(if ok { 0 } else { 1 });
}
