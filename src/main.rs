use std::{env, fs, process::ExitCode};

use funcscript::diagnostics::{Diagnostic, Position, render_diagnostics};
use funcscript::runtime::host::HostBridge;
use funcscript::runtime::vm::Vm;

fn main() -> ExitCode {
    let mut args: Vec<String> = env::args().skip(1).collect();
    let json_errors = args.iter().any(|arg| arg == "--json-errors");
    args.retain(|arg| arg != "--json-errors");

    let (source, label) = match args.as_slice() {
        [expr_flag, expr] if expr_flag == "-e" => (expr.clone(), "<expr>".to_string()),
        [path] => match fs::read_to_string(path) {
            Ok(source) => (source, path.clone()),
            Err(err) => {
                eprintln!("error: cannot read '{}': {}", path, err);
                return ExitCode::FAILURE;
            }
        },
        _ => {
            eprintln!("usage: funcscript [--json-errors] <file.fs>");
            eprintln!("       funcscript [--json-errors] -e <expression>");
            return ExitCode::FAILURE;
        }
    };

    let mut vm = Vm::new();
    let mut bridge = HostBridge::std_fs();
    bridge.log_line = Some(std::sync::Arc::new(|text: &str| eprintln!("{}", text)));
    vm.set_host_bridge(bridge);

    match vm.eval_to_json(&source) {
        Ok(json) => {
            println!("{}", json);
            ExitCode::SUCCESS
        }
        Err(err) => {
            let mut diag = Diagnostic::error(err.message.clone())
                .with_code(format!("E{}", err.code))
                .with_message(format!("while evaluating {}", label));
            if err.has_location() {
                diag = diag.with_position(Position::new(err.line as usize, err.column as usize));
            }
            if json_errors {
                match serde_json::to_string(&diag) {
                    Ok(rendered) => eprintln!("{}", rendered),
                    Err(_) => eprintln!("{}", diag.render(Some(&source))),
                }
            } else {
                eprint!("{}", render_diagnostics(&[diag], Some(&source)));
            }
            ExitCode::FAILURE
        }
    }
}
