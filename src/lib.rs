//! Jack Compiler - single-pass Jack to VM code compiler.
//!
//! This crate compiles Jack source code to VM code for the nand2tetris
//! virtual machine. The front-end is a recursive-descent compilation
//! engine that emits VM instructions while parsing, backed by a two-scope
//! symbol table and a validated instruction writer. It supports:
//!
//! - Complete Jack language compilation, one class per file
//! - Fatal single-error reporting with source locations
//! - Parallel directory processing
//!
//! # Usage
//!
//! ```no_run
//! use jack_compiler::{compile_file, compile_directory};
//! use std::path::Path;
//!
//! // Compile a single file
//! let result = compile_file(Path::new("Main.jack"));
//!
//! // Compile a directory
//! let results = compile_directory(Path::new("Square/"));
//! ```

pub mod engine;
pub mod error;
pub mod symbol_table;
pub mod token;
pub mod tokenizer;
pub mod vm_writer;

use rayon::prelude::*;
use std::fs;
use std::path::Path;

// Re-export key types
pub use engine::CompilationEngine;
pub use error::CompileError;
pub use symbol_table::{Symbol, SymbolKind, SymbolTable};
pub use tokenizer::Tokenizer;
pub use vm_writer::VmWriter;

/// Result of compiling a single Jack file.
#[derive(Debug)]
pub struct CompileResult {
    /// The file stem that was compiled (`Main` for `Main.jack`).
    pub filename: String,
    /// The generated VM code, or the error that aborted compilation.
    pub outcome: Result<String, CompileError>,
}

impl CompileResult {
    /// Check if the compilation was successful.
    pub fn is_ok(&self) -> bool {
        self.outcome.is_ok()
    }
}

/// Compile Jack source code directly.
///
/// Compilation is a pure function of the source text: the same input always
/// produces byte-identical output.
pub fn compile_source(source: &str) -> Result<String, CompileError> {
    let tokens = Tokenizer::new(source).tokenize()?;
    CompilationEngine::new(&tokens).compile()
}

/// Compile a single Jack file.
pub fn compile_file(path: &Path) -> CompileResult {
    let filename = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("unknown")
        .to_string();

    let outcome = match fs::read_to_string(path) {
        Ok(source) => compile_source(&source),
        Err(e) => Err(CompileError::io(path, e)),
    };

    CompileResult { filename, outcome }
}

/// Compile all Jack files directly contained in a directory (non-recursive).
///
/// Files are compiled in parallel with fully independent state; a failed
/// file does not stop the others.
pub fn compile_directory(dir: &Path) -> Vec<CompileResult> {
    let jack_files: Vec<_> = match fs::read_dir(dir) {
        Ok(entries) => entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.extension().is_some_and(|ext| ext == "jack"))
            .collect(),
        Err(e) => {
            return vec![CompileResult {
                filename: dir.to_string_lossy().to_string(),
                outcome: Err(CompileError::io(dir, e)),
            }];
        }
    };

    jack_files.par_iter().map(|path| compile_file(path)).collect()
}

/// Write a successful compile result to `<filename>.vm` in the output
/// directory. Does nothing for failed results.
pub fn write_result(result: &CompileResult, output_dir: &Path) -> Result<(), CompileError> {
    if let Ok(vm_code) = &result.outcome {
        let vm_path = output_dir.join(format!("{}.vm", result.filename));
        fs::write(&vm_path, vm_code).map_err(|e| CompileError::io(&vm_path, e))?;
    }
    Ok(())
}
