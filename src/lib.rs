//! Story-script compiler: lexer, parser, validator, optimizer, Lua
//! code generator, and canonical writer.
//!
//! Story scripts describe passages of prose with choices, variables,
//! conditionals, and embedded Lua. This crate turns them into a Lua
//! module that a host runtime can drive, and can write a parsed story
//! back out in canonical form.
//!
//! # Quick start
//!
//! ## Compile a story to Lua
//!
//! ```
//! use storyscript::{CompileOptions, compile};
//!
//! let source = ":: Start\nYou wake up.\n* [Leave] -> Outside\n:: Outside\nFresh air.\n";
//! let result = compile(source, "cave.story", &CompileOptions::default());
//! assert!(result.succeeded);
//! assert!(result.diagnostics.is_empty());
//! let lua = result.output.unwrap();
//! assert!(lua.contains("rt:choice(\"Leave\", nil, \"Outside\")"));
//! ```
//!
//! ## Parse and re-write in canonical form
//!
//! ```
//! use storyscript::{parse_str, write};
//!
//! let story = parse_str(":: Start\n$gold=1+2\n").unwrap();
//! assert_eq!(write(&story), ":: Start\n$gold = 1 + 2\n");
//! ```
//!
//! ## Build a story programmatically
//!
//! ```
//! use storyscript::{Choice, Expr, Passage, Story, write};
//!
//! let story = Story::new()
//!     .title("The Cave")
//!     .passage(Passage::new("Start")
//!         .set("gold", Expr::int(10))
//!         .choice(Choice::new("Leave").to("Start")));
//!
//! let output = write(&story);
//! assert!(output.contains("* [Leave] -> Start"));
//! ```

// Allow noisy pedantic lints that don't add value for
// a library crate.
#![allow(
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::module_name_repetitions
)]

pub mod ast;
pub mod builder;
pub mod codegen;
pub mod config;
pub mod diagnostic;
pub mod lexer;
pub mod optimizer;
pub mod parser;
pub mod report;
pub mod token;
pub mod validator;
pub mod writer;

pub use ast::{
    AssignOp, Assignment, BinaryOp, Choice, Conditional, Expr, Marker, Node, Passage, Story,
    UnaryOp,
};
pub use codegen::CodegenError;
pub use config::CompileOptions;
pub use diagnostic::{Category, Code, Diagnostic, Severity, has_errors};
pub use lexer::{LexError, LexErrorKind, Lexed, tokenize};
pub use optimizer::optimize;
pub use parser::{ParseError, ParseErrorKind, parse_tokens, parse_with_recovery};
pub use token::{Literal, Span, Token, TokenKind};
pub use validator::validate;
pub use writer::write;

/// Unified error type for the strict entry points.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// A lexer error.
    #[error("{0}")]
    Lex(#[from] LexError),
    /// A parser error.
    #[error("{0}")]
    Parse(#[from] ParseError),
    /// Code generation hit a tree only invalid input produces.
    #[error("{0}")]
    Codegen(#[from] CodegenError),
}

/// Everything one compile produced.
#[derive(Debug, Clone, PartialEq)]
pub struct CompilationResult {
    /// The story as far as it could be parsed; optimized when requested.
    pub story: Story,
    /// Lexical, syntax, and semantic diagnostics, in that order.
    pub diagnostics: Vec<Diagnostic>,
    /// True when output was generated and no error diagnostic exists.
    pub succeeded: bool,
    /// Generated Lua, if generation ran.
    pub output: Option<String>,
}

/// Tokenize and parse in one step, failing on the first lexical or
/// syntax error.
pub fn parse_str(input: &str) -> Result<Story, Error> {
    let lexed = tokenize(input, "");
    if let Some(err) = lexed.errors.into_iter().next() {
        return Err(err.into());
    }
    let (story, errors) = parse_tokens(&lexed.tokens);
    match errors.into_iter().next() {
        Some(err) => Err(err.into()),
        None => Ok(story),
    }
}

/// Run the whole pipeline over `source`.
///
/// Validation always runs, even after syntax errors. Lua is generated
/// when no error diagnostic exists, or regardless when `options.force`
/// is set.
#[must_use]
pub fn compile(source: &str, filename: &str, options: &CompileOptions) -> CompilationResult {
    let (story, diagnostics) = analyze(source, filename, options.suggest);
    let errors = has_errors(&diagnostics);

    if errors && !options.force {
        return CompilationResult {
            story,
            diagnostics,
            succeeded: false,
            output: None,
        };
    }

    let story = if options.optimize {
        optimize(story)
    } else {
        story
    };
    let output = match codegen::compile(&story) {
        Ok(lua) => Some(lua),
        Err(err) => {
            log::error!("{}: {err}", report::display_name(filename));
            None
        }
    };

    CompilationResult {
        succeeded: output.is_some() && !errors,
        story,
        diagnostics,
        output,
    }
}

/// Analyze `source` without generating code.
#[must_use]
pub fn check(source: &str, filename: &str) -> Vec<Diagnostic> {
    analyze(source, filename, true).1
}

fn analyze(source: &str, filename: &str, suggest: bool) -> (Story, Vec<Diagnostic>) {
    let lexed = tokenize(source, filename);
    let mut diagnostics: Vec<Diagnostic> = lexed.errors.iter().map(Diagnostic::from).collect();

    let (story, syntax) = parse_with_recovery(&lexed.tokens, filename);
    diagnostics.extend(syntax);
    diagnostics.extend(validate(&story));

    if suggest {
        diagnostics = report::suggest(diagnostics, &story);
    }
    report::attach_snippets(&mut diagnostics, source);

    log::info!(
        "{}: {}",
        report::display_name(filename),
        report::summarize(&diagnostics)
    );
    (story, diagnostics)
}
