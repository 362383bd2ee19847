//! Compiler entry points: source text to a serialized module.
//!
//! The pipeline is scanner -> parser -> resolver -> code generator; each
//! phase keeps going after its first error so later errors still surface,
//! but no binary is produced once any phase reported one.

use std::path::Path;

use crate::bytecode;
use crate::error::CompileError;
use crate::{parse, resolver, scanner};

/// Compiles `source` as the module named `script` with path `.`.
///
/// On failure, every diagnostic has been written to standard error and is
/// also carried in the returned [`CompileError`].
pub fn compile(source: &str) -> Result<Vec<u8>, CompileError> {
    compile_impl(source, ".", "script")
}

/// Reads and compiles a file; the module is named after the file stem and
/// keeps the file's path for import resolution.
pub fn compile_file(path: impl AsRef<Path>) -> Result<Vec<u8>, CompileError> {
    let path = path.as_ref();
    let Ok(source) = std::fs::read_to_string(path) else {
        return Err(CompileError {
            errors: vec![format!("Failed to open file: {}.", path.display())],
        });
    };
    let name = path
        .file_stem()
        .map_or_else(|| "script".to_owned(), |s| s.to_string_lossy().into_owned());
    compile_impl(&source, &path.to_string_lossy(), &name)
}

fn compile_impl(source: &str, src_path: &str, src_name: &str) -> Result<Vec<u8>, CompileError> {
    let (tokens, source_per_line) = scanner::scan_tokens(source);

    let (mut ast, mut parse_diags) = parse::parse(tokens);
    if parse_diags.had_error() {
        return Err(report(parse_diags.take()));
    }

    let (resolution, mut resolve_diags) = resolver::resolve(&mut ast);
    if resolve_diags.had_error() {
        return Err(report(resolve_diags.take()));
    }

    let (mut chunk, mut gen_diags) = bytecode::r#gen(&ast, &resolution, src_name);
    if gen_diags.had_error() {
        return Err(report(gen_diags.take()));
    }

    chunk.set_source_path(src_path);
    chunk.set_source(source_per_line);
    Ok(chunk.dump())
}

fn report(errors: Vec<String>) -> CompileError {
    for e in &errors {
        eprintln!("{e}");
    }
    CompileError { errors }
}
