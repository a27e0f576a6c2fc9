pub mod env;
pub mod error;
pub mod evaluator;
pub mod lexer;
pub mod op;
pub mod parser;
pub mod value;

pub use env::{register_constant, register_function, registry_snapshot, unregister, Environment};
pub use error::{Error, Result};
pub use evaluator::{evaluate, Evaluator};
pub use lexer::{tokenize, Bracket, Lexer, Literal, Token, TokenKind};
pub use op::Op;
pub use parser::{parse, Parser, Rpn, DEFAULT_STEP_LIMIT};
pub use value::{Function, Value};

/// Tokenizes and reorders `text`. The result can be evaluated any number of
/// times against different environments.
pub fn compile(text: &str) -> Result<Rpn> {
    parse(tokenize(text)?)
}

/// Compiles and evaluates `text` in one go.
pub fn eval(text: &str, env: &Environment) -> Result<Value> {
    evaluate(&compile(text)?, env)
}
