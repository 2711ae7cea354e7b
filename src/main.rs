//! Command-line embedder: run a script file, or a bare REPL.

use std::io::{BufRead, Write};
use std::process::ExitCode;

use kestrel::Vm;

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().collect();
    let mut vm = Vm::new();

    match args.len() {
        1 => repl(&mut vm),
        2 => run_file(&mut vm, &args[1]),
        _ => {
            eprintln!("Usage: kestrel [path]");
            ExitCode::from(64)
        }
    }
}

fn run_file(vm: &mut Vm, path: &str) -> ExitCode {
    let source = match std::fs::read_to_string(path) {
        Ok(source) => source,
        Err(error) => {
            eprintln!("Could not read file \"{}\": {}.", path, error);
            return ExitCode::from(74);
        }
    };

    ExitCode::from(vm.interpret(&source) as u8)
}

fn repl(vm: &mut Vm) -> ExitCode {
    let stdin = std::io::stdin();
    let mut stdout = std::io::stdout();

    loop {
        print!("> ");
        let _ = stdout.flush();

        let mut line = String::new();
        match stdin.lock().read_line(&mut line) {
            Ok(0) | Err(_) => {
                println!();
                return ExitCode::SUCCESS;
            }
            Ok(_) => {
                // Errors are printed by interpret; the REPL carries on.
                vm.interpret(&line);
            }
        }
    }
}
