use miette::{Diagnostic, SourceSpan};
use thiserror::Error;

use crate::op::Op;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Everything that can go wrong between expression text and a value.
///
/// Each stage fails with its own variant so hosts can tell a bad formula
/// (`Tokenize`, `Parse`, `BracketMismatch`, `Malformed`) from a bad
/// environment (`UndefinedVariable`, `FunctionNotFound`) and retry the latter.
#[derive(Diagnostic, Debug, Error)]
pub enum Error {
    #[error("{reason}")]
    #[diagnostic(code(jsexpr::tokenize))]
    Tokenize {
        reason: String,
        #[source_code]
        src: String,
        #[label("here")]
        span: SourceSpan,
    },

    #[error("operator reordering exceeded {limit} steps")]
    #[diagnostic(
        code(jsexpr::parse),
        help("the token stream is malformed or larger than the configured step limit")
    )]
    Parse { limit: usize },

    #[error("`{open}` closed by `{close}`")]
    #[diagnostic(code(jsexpr::bracket_mismatch))]
    BracketMismatch { open: char, close: char },

    #[error("undefined variable `{0}`")]
    #[diagnostic(code(jsexpr::undefined_variable))]
    UndefinedVariable(String),

    #[error("function `{0}` not found")]
    #[diagnostic(code(jsexpr::function_not_found))]
    FunctionNotFound(String),

    #[error("cannot apply `{op}`: {message}")]
    #[diagnostic(code(jsexpr::operator_type))]
    OperatorType { op: Op, message: String },

    #[error("malformed expression: {0}")]
    #[diagnostic(code(jsexpr::malformed))]
    Malformed(String),

    #[error("call to `{name}` failed: {message}")]
    #[diagnostic(code(jsexpr::call))]
    Call { name: String, message: String },
}
