//! Pipeline driver
//!
//! Wires the compilation stages together for the four output modes and owns
//! the user-visible error reporting: every compile error goes to stderr, one
//! per line, prefixed by its category, and the process exits non-zero.

use anyhow::{Context, Result};
use log::{debug, info};
use rill_analysis::{analyze, SymbolTable};
use rill_common::{Diagnostics, Generators, RillError};
use rill_ir::{emit_program, lower, FuncFrag};
use rill_lexer::Token;
use rill_parser::Program;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// The mutually-exclusive output modes of the compiler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Print the token table.
    Lex,
    /// Parse and print the reconstructed source.
    Ast,
    /// Lower and print the IR listing.
    Iloc,
    /// Emit AArch64 assembly to `<input stem>.s`.
    Assembly,
}

/// Why a compilation did not produce output.
#[derive(Debug)]
pub enum Failure {
    /// A lexical, syntax, lowering or code generation error.
    Compile(RillError),
    /// One or more collected semantic errors.
    Semantic(Diagnostics),
}

impl Failure {
    /// Write the failure to stderr, one line per error.
    pub fn report(&self) {
        match self {
            Failure::Compile(error) => eprintln!("{}", error),
            Failure::Semantic(diagnostics) => {
                for diagnostic in diagnostics.errors() {
                    eprintln!("{}", diagnostic);
                }
            }
        }
    }
}

impl From<RillError> for Failure {
    fn from(error: RillError) -> Self {
        Failure::Compile(error)
    }
}

/// Everything the middle of the pipeline produces.
pub struct Compiled {
    pub program: Program,
    pub table: SymbolTable,
    pub gens: Generators,
    pub frags: Vec<FuncFrag>,
}

/// Run lexing, parsing, analysis and lowering over a source string.
pub fn build_fragments(source: &str) -> Result<Compiled, Failure> {
    let tokens = rill_lexer::tokenize(source)?;
    debug!("scanned {} tokens", tokens.len());

    let program = rill_parser::parse(tokens)?;
    debug!("parsed {} function(s)", program.functions.len());

    let mut gens = Generators::new();
    let analysis = analyze(&program, &mut gens);
    if analysis.diagnostics.has_errors() {
        return Err(Failure::Semantic(analysis.diagnostics));
    }

    let frags = lower(&program, &analysis.table, &mut gens)?;
    debug!("lowered to {} fragment(s)", frags.len());

    Ok(Compiled { program, table: analysis.table, gens, frags })
}

/// Compile a source string all the way to assembly lines.
pub fn assembly_lines(source: &str) -> Result<Vec<String>, Failure> {
    let mut compiled = build_fragments(source)?;
    let lines = emit_program(&compiled.frags, &compiled.table, &mut compiled.gens)?;
    Ok(lines)
}

/// The token table printed by `--lex`.
pub fn lex_table(tokens: &[Token]) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "|{:<20}|{:<20}|{:<20}|\n",
        "Token Type", "Token Literal", "Line"
    ));
    for token in tokens {
        out.push_str(&format!(
            "|{:<20}|{:<20}|{:<20}|\n",
            token.kind.name(),
            token.literal(),
            token.line
        ));
    }
    out
}

/// The IR listing printed by `--iloc`: labelled fragments with instructions
/// indented past the longest label.
pub fn iloc_listing(frags: &[FuncFrag]) -> String {
    let width = frags.iter().map(|frag| frag.label.len()).max().unwrap_or(0) + 1;
    let mut out = String::new();
    for frag in frags {
        out.push_str(&frag.label);
        out.push_str(":\n");
        for instr in &frag.body {
            out.push_str(&" ".repeat(width));
            out.push_str(&instr.to_string());
            out.push('\n');
        }
    }
    out
}

/// The `.s` file for an input path: same stem, written into the current
/// working directory.
pub fn output_path(input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "out".to_string());
    PathBuf::from(format!("{}.s", stem))
}

/// Write assembly lines for `input` into the current working directory.
pub fn write_assembly(input: &Path, lines: &[String]) -> io::Result<PathBuf> {
    let path = output_path(input);
    let mut text = lines.join("\n");
    text.push('\n');
    fs::write(&path, text)?;
    Ok(path)
}

/// Execute one compiler invocation. Returns `Ok(false)` when the source
/// program had errors (they have already been reported to stderr).
pub fn run(input: &Path, mode: Mode) -> Result<bool> {
    let source = fs::read_to_string(input)
        .with_context(|| format!("failed to read {}", input.display()))?;
    info!("compiling {}", input.display());

    match mode {
        Mode::Lex => match rill_lexer::tokenize(&source) {
            Ok(tokens) => {
                print!("{}", lex_table(&tokens));
                Ok(true)
            }
            Err(error) => {
                eprintln!("{}", error);
                Ok(false)
            }
        },
        Mode::Ast => match rill_parser::parse_source(&source) {
            Ok(program) => {
                print!("{}", program);
                Ok(true)
            }
            Err(error) => {
                eprintln!("{}", error);
                Ok(false)
            }
        },
        Mode::Iloc => match build_fragments(&source) {
            Ok(compiled) => {
                print!("{}", iloc_listing(&compiled.frags));
                Ok(true)
            }
            Err(failure) => {
                failure.report();
                Ok(false)
            }
        },
        Mode::Assembly => match assembly_lines(&source) {
            Ok(lines) => {
                let path = write_assembly(input, &lines)
                    .with_context(|| "failed to write assembly output")?;
                info!("wrote {}", path.display());
                Ok(true)
            }
            Err(failure) => {
                failure.report();
                Ok(false)
            }
        },
    }
}
