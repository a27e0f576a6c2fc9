use std::{collections::HashMap, sync::Arc};

use tracing::{debug, trace};

use crate::{
    env::{registry_snapshot, Environment},
    error::{Error, Result},
    lexer::{Bracket, Token, TokenKind},
    op::{apply_infix, apply_prefix, Op},
    parser::Rpn,
    value::{Function, Value},
};

/// What the evaluation stack holds. Only `Value`s ever leave the evaluator.
#[derive(Debug)]
enum Slot {
    Value(Value),
    /// Branches built by `:`, waiting for `?` or an object literal.
    Pair(Value, Value),
    /// Items collected by `,`. Each is a `Value` or a `Pair`.
    Pending(Vec<Slot>),
    /// An opening bracket still waiting for its closer.
    Marker { bracket: Bracket, accessor: bool },
}

impl Slot {
    fn into_value(self) -> Result<Value> {
        match self {
            Slot::Value(value) => Ok(value),
            Slot::Pending(items) => items
                .into_iter()
                .map(Slot::into_value)
                .collect::<Result<Vec<_>>>()
                .map(Value::Array),
            Slot::Pair(..) => Err(Error::OperatorType {
                op: Op::Colon,
                message: "`:` outside of `?` or an object literal".to_string(),
            }),
            Slot::Marker { bracket, .. } => {
                Err(Error::Malformed(format!("unclosed `{}`", bracket.open())))
            }
        }
    }

    /// Something that may sit inside a comma list.
    fn into_item(self) -> Result<Slot> {
        match self {
            Slot::Value(_) | Slot::Pair(..) => Ok(self),
            other => other.into_value().map(Slot::Value),
        }
    }
}

fn pop(stack: &mut Vec<Slot>) -> Result<Slot> {
    stack
        .pop()
        .ok_or_else(|| Error::Malformed("missing operand".to_string()))
}

fn pop_value(stack: &mut Vec<Slot>) -> Result<Value> {
    pop(stack)?.into_value()
}

/// Handles `]` and `}`: collects the items back to the opening marker and
/// builds the array, object or indexed access they stand for.
fn close_group(stack: &mut Vec<Slot>, close: Bracket) -> Result<Value> {
    let (items, open, accessor) = match pop(stack)? {
        Slot::Marker { bracket, accessor } => (Vec::new(), bracket, accessor),
        slot => {
            let items = match slot {
                Slot::Pending(items) => items,
                item => vec![item],
            };
            match pop(stack)? {
                Slot::Marker { bracket, accessor } => (items, bracket, accessor),
                _ => {
                    return Err(Error::Malformed(format!(
                        "`{}` without a matching opening bracket",
                        close.close()
                    )))
                }
            }
        }
    };
    if open != close {
        return Err(Error::BracketMismatch {
            open: open.open(),
            close: close.close(),
        });
    }

    match close {
        Bracket::Square if accessor => {
            let key = items
                .into_iter()
                .next()
                .ok_or_else(|| Error::Malformed("empty index `[]`".to_string()))?
                .into_value()?;
            let base = pop_value(stack)?;
            base.member(&key).map_err(|message| Error::OperatorType {
                op: Op::Dot,
                message,
            })
        }
        Bracket::Square => items
            .into_iter()
            .map(Slot::into_value)
            .collect::<Result<Vec<_>>>()
            .map(Value::Array),
        Bracket::Curly => items
            .into_iter()
            .map(|item| match item {
                Slot::Pair(key, value) => Ok((key.to_string(), value)),
                _ => Err(Error::Malformed(
                    "object literal entries must be `key: value`".to_string(),
                )),
            })
            .collect::<Result<HashMap<_, _>>>()
            .map(Value::Mapping),
        Bracket::Paren => Err(Error::Malformed("parenthesis left in RPN".to_string())),
    }
}

/// Runs RPN against an environment with a single stack.
///
/// Names resolve through the caller's environment first and then through the
/// registry snapshot taken when the evaluator was created. Nothing else is
/// reachable.
pub struct Evaluator<'e> {
    env: &'e Environment,
    globals: Arc<Environment>,
}

impl<'e> Evaluator<'e> {
    pub fn new(env: &'e Environment) -> Self {
        Self {
            env,
            globals: registry_snapshot(),
        }
    }

    /// Uses `globals` in place of the process-wide registry.
    pub fn with_globals(env: &'e Environment, globals: Arc<Environment>) -> Self {
        Self { env, globals }
    }

    fn resolve(&self, name: &str) -> Option<&Value> {
        self.env
            .lookup(name)
            .or_else(|| self.globals.lookup(name))
    }

    fn function(&self, name: &str) -> Result<Function> {
        match self.resolve(name) {
            Some(Value::Callable(f)) => Ok(f.clone()),
            _ => Err(Error::FunctionNotFound(name.to_string())),
        }
    }

    pub fn eval(&self, rpn: &Rpn) -> Result<Value> {
        let tokens = rpn.tokens();
        let mut stack: Vec<Slot> = Vec::new();

        for (i, token) in tokens.iter().enumerate() {
            trace!(%token, depth = stack.len(), "eval");
            let slot = match &token.kind {
                TokenKind::Literal(literal) => Slot::Value(literal.to_value()),
                TokenKind::Identifier(name) => {
                    // The right side of `a.b` names a member, not a variable.
                    let names_member = matches!(
                        tokens.get(i + 1),
                        Some(Token {
                            kind: TokenKind::Infix(Op::Dot),
                            ..
                        })
                    );
                    if names_member {
                        Slot::Value(Value::String(name.clone()))
                    } else {
                        let value = self
                            .resolve(name)
                            .cloned()
                            .ok_or_else(|| Error::UndefinedVariable(name.clone()))?;
                        Slot::Value(value)
                    }
                }
                TokenKind::Infix(Op::Comma) => {
                    let right = pop(&mut stack)?.into_item()?;
                    match pop(&mut stack)? {
                        Slot::Pending(mut items) => {
                            items.push(right);
                            Slot::Pending(items)
                        }
                        left => Slot::Pending(vec![left.into_item()?, right]),
                    }
                }
                TokenKind::Infix(Op::Colon) => {
                    let right = pop_value(&mut stack)?;
                    let left = pop_value(&mut stack)?;
                    Slot::Pair(left, right)
                }
                TokenKind::Infix(Op::Question) => {
                    let branches = pop(&mut stack)?;
                    let condition = pop_value(&mut stack)?;
                    match branches {
                        Slot::Pair(yes, no) => {
                            Slot::Value(if condition.is_truthy() { yes } else { no })
                        }
                        _ => {
                            return Err(Error::OperatorType {
                                op: Op::Question,
                                message: "expected `:` branches after `?`".to_string(),
                            })
                        }
                    }
                }
                TokenKind::Infix(op) => {
                    let right = pop_value(&mut stack)?;
                    let left = pop_value(&mut stack)?;
                    Slot::Value(apply_infix(*op, left, right)?)
                }
                TokenKind::Prefix(op) => {
                    let operand = pop_value(&mut stack)?;
                    Slot::Value(apply_prefix(*op, operand)?)
                }
                TokenKind::CallNoArgs(name) => {
                    let function = self.function(name)?;
                    Slot::Value(call(name, &function, &[])?)
                }
                TokenKind::Call(name) => {
                    let function = self.function(name)?;
                    let args = match pop(&mut stack)? {
                        Slot::Pending(items) => items
                            .into_iter()
                            .map(Slot::into_value)
                            .collect::<Result<Vec<_>>>()?,
                        slot => vec![slot.into_value()?],
                    };
                    Slot::Value(call(name, &function, &args)?)
                }
                TokenKind::GroupBegin { bracket, accessor } => Slot::Marker {
                    bracket: *bracket,
                    accessor: *accessor,
                },
                TokenKind::GroupEnd(close) => Slot::Value(close_group(&mut stack, *close)?),
            };
            stack.push(slot);
        }

        let result = match stack.len() {
            0 => Value::Undefined,
            1 => pop_value(&mut stack)?,
            n => {
                return Err(Error::Malformed(format!(
                    "{n} values left after evaluation"
                )))
            }
        };
        debug!(result = result.type_of(), "evaluated expression");
        Ok(result)
    }
}

fn call(name: &str, function: &Function, args: &[Value]) -> Result<Value> {
    function.call(args).map_err(|message| Error::Call {
        name: name.to_string(),
        message,
    })
}

/// Evaluates RPN against `env` layered over the registry.
pub fn evaluate(rpn: &Rpn, env: &Environment) -> Result<Value> {
    Evaluator::new(env).eval(rpn)
}
