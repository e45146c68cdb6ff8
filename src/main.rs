//! Jack Compiler CLI - Compiles Jack files to VM code.
//!
//! Usage:
//!     JackCompiler <file.jack | directory>

use clap::Parser;
use jack_compiler::{compile_directory, compile_file, write_result};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser, Debug)]
#[command(name = "JackCompiler")]
#[command(version = "1.0.0")]
#[command(about = "Single-pass Jack to VM code compiler")]
#[command(author = "nand2tetris")]
struct Args {
    /// Input file or directory
    #[arg(value_name = "INPUT")]
    input: PathBuf,

    /// Output directory (defaults to the input's directory)
    #[arg(short, long)]
    output: Option<PathBuf>,
}

fn main() -> ExitCode {
    let args = Args::parse();

    let (results, output_dir) = if args.input.is_file() {
        let result = compile_file(&args.input);
        let output_dir = args.output.unwrap_or_else(|| {
            args.input
                .parent()
                .unwrap_or(&PathBuf::from("."))
                .to_path_buf()
        });
        (vec![result], output_dir)
    } else if args.input.is_dir() {
        let results = compile_directory(&args.input);
        let output_dir = args.output.unwrap_or_else(|| args.input.clone());
        (results, output_dir)
    } else {
        eprintln!("Error: Input not found: {}", args.input.display());
        return ExitCode::from(2);
    };

    if results.is_empty() {
        eprintln!("Error: No .jack files found in {}", args.input.display());
        return ExitCode::from(2);
    }

    let mut has_errors = false;

    for result in &results {
        if result.is_ok() {
            match write_result(result, &output_dir) {
                Ok(()) => {
                    println!("Compiled {}.jack -> {}.vm", result.filename, result.filename);
                }
                Err(e) => {
                    eprintln!("Error writing {}.vm: {}", result.filename, e);
                    has_errors = true;
                }
            }
        } else {
            has_errors = true;
            if let Err(e) = &result.outcome {
                eprintln!("{}: {}", result.filename, e);
            }
        }
    }

    if has_errors {
        ExitCode::from(1)
    } else {
        ExitCode::SUCCESS
    }
}
