//! `fox`: compile and run a foxlox script.
//!
//! Exit codes follow the sysexits convention: 64 usage, 65 compile error,
//! 70 runtime error, 74 unreadable input.

use std::env;
use std::process::ExitCode;

use foxlox::Vm;
use tracing_subscriber::EnvFilter;

const EX_USAGE: u8 = 64;
const EX_DATAERR: u8 = 65;
const EX_SOFTWARE: u8 = 70;
const EX_IOERR: u8 = 74;

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = env::args().collect();
    if args.len() != 2 {
        eprintln!("Usage: fox <script.fox>");
        return ExitCode::from(EX_USAGE);
    }
    let path = &args[1];

    if std::fs::metadata(path).is_err() {
        eprintln!("Failed to open file: {path}.");
        return ExitCode::from(EX_IOERR);
    }

    let binary = match foxlox::compile_file(path) {
        Ok(binary) => binary,
        // diagnostics were already written to stderr
        Err(_) => return ExitCode::from(EX_DATAERR),
    };

    let mut vm = Vm::new();
    match vm.run(&binary) {
        Ok(value) => {
            let result = vm.to_object(&value);
            if result != foxlox::Object::Nil {
                println!("{result}");
            }
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("{err}");
            ExitCode::from(EX_SOFTWARE)
        }
    }
}
