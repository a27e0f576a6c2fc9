use tracing::{debug, trace};

use crate::{
    error::{Error, Result},
    lexer::{completes_expression, Bracket, Token, TokenKind},
    op::Op,
};

/// Default cap on operator relocation steps for one parse.
pub const DEFAULT_STEP_LIMIT: usize = 100_000;

/// Function calls bind tighter than every operator.
const CALL_PRECEDENCE: u8 = 100;

/// Tokens in post-order: every operator follows its operands.
///
/// Parentheses are gone; `[`, `]`, `{` and `}` stay so the evaluator can
/// rebuild arrays, objects and indexed accesses. An `Rpn` never changes after
/// parsing and can be evaluated any number of times.
#[derive(Debug, Clone, PartialEq)]
pub struct Rpn(Vec<Token>);

impl Rpn {
    pub fn tokens(&self) -> &[Token] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Display for Rpn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (i, token) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, " ")?;
            }
            write!(f, "{token}")?;
        }
        Ok(())
    }
}

fn precedence(kind: &TokenKind) -> Option<u8> {
    match kind {
        TokenKind::Infix(op) | TokenKind::Prefix(op) => Some(op.precedence()),
        TokenKind::Call(_) | TokenKind::CallNoArgs(_) => Some(CALL_PRECEDENCE),
        _ => None,
    }
}

/// Drops unary plus and turns unary minus into `Negate`, so the two can't be
/// mistaken for their binary forms when precedences are compared.
fn rewrite_signs(tokens: Vec<Token>) -> Vec<Token> {
    tokens
        .into_iter()
        .filter_map(|token| match token.kind {
            TokenKind::Prefix(Op::Plus) => None,
            TokenKind::Prefix(Op::Minus) => Some(Token {
                kind: TokenKind::Prefix(Op::Negate),
                ..token
            }),
            _ => Some(token),
        })
        .collect()
}

/// Flags each `[` that follows a finished operand as a member accessor.
fn mark_accessors(mut tokens: Vec<Token>) -> Vec<Token> {
    for i in 0..tokens.len() {
        let indexes = completes_expression(i.checked_sub(1).map(|p| &tokens[p].kind));
        if let TokenKind::GroupBegin {
            bracket: Bracket::Square,
            accessor,
        } = &mut tokens[i].kind
        {
            *accessor = indexes;
        }
    }
    tokens
}

fn prepare(tokens: Vec<Token>) -> Vec<Token> {
    mark_accessors(rewrite_signs(tokens))
}

/// Output queue plus pending-operator stack.
///
/// The stack holds operators and calls waiting for their right-hand side,
/// and the opening bracket of every group still open.
struct Reorder {
    output: Vec<Token>,
    stack: Vec<Token>,
    steps: usize,
    limit: usize,
}

impl Reorder {
    fn step(&mut self) -> Result<()> {
        self.steps += 1;
        if self.steps > self.limit {
            return Err(Error::Parse { limit: self.limit });
        }
        Ok(())
    }

    fn emit(&mut self, token: Token) -> Result<()> {
        self.step()?;
        trace!(%token, "emit");
        self.output.push(token);
        Ok(())
    }

    fn hold(&mut self, token: Token) -> Result<()> {
        self.step()?;
        self.stack.push(token);
        Ok(())
    }

    /// Moves held operators to the output while `flush` says the one on
    /// top has to be applied before the incoming token.
    fn release_while(&mut self, flush: impl Fn(u8) -> bool) -> Result<()> {
        while let Some(top) = self.stack.last() {
            match precedence(&top.kind) {
                Some(held) if flush(held) => {
                    if let Some(token) = self.stack.pop() {
                        self.emit(token)?;
                    }
                }
                _ => break,
            }
        }
        Ok(())
    }

    fn push(&mut self, token: Token) -> Result<()> {
        match &token.kind {
            TokenKind::Literal(_) | TokenKind::Identifier(_) | TokenKind::CallNoArgs(_) => {
                self.emit(token)
            }
            TokenKind::Prefix(_) | TokenKind::Call(_) => self.hold(token),
            TokenKind::Infix(op) => {
                let incoming = op.precedence();
                let right = op.is_right_associative();
                self.release_while(|held| held > incoming || (held == incoming && !right))?;
                self.hold(token)
            }
            TokenKind::GroupBegin { bracket, accessor } => {
                if *accessor {
                    // Indexing binds like `.`, which is left-associative.
                    let member = Op::Dot.precedence();
                    self.release_while(|held| held >= member)?;
                }
                if *bracket != Bracket::Paren {
                    self.emit(token.clone())?;
                }
                self.hold(token)
            }
            TokenKind::GroupEnd(bracket) => {
                let bracket = *bracket;
                self.release_while(|_| true)?;
                match self.stack.pop() {
                    Some(Token {
                        kind: TokenKind::GroupBegin { bracket: open, .. },
                        ..
                    }) if open != bracket => {
                        return Err(Error::BracketMismatch {
                            open: open.open(),
                            close: bracket.close(),
                        })
                    }
                    Some(open) => trace!(%open, "close group"),
                    None => {
                        return Err(Error::Malformed(format!(
                            "unmatched `{}`",
                            bracket.close()
                        )))
                    }
                }
                if bracket != Bracket::Paren {
                    self.emit(token)?;
                }
                if matches!(self.stack.last(), Some(Token { kind: TokenKind::Call(_), .. })) {
                    if let Some(call) = self.stack.pop() {
                        self.emit(call)?;
                    }
                }
                Ok(())
            }
        }
    }

    fn finish(mut self) -> Result<Vec<Token>> {
        while let Some(token) = self.stack.pop() {
            if let TokenKind::GroupBegin { bracket, .. } = token.kind {
                return Err(Error::Malformed(format!("unclosed `{}`", bracket.open())));
            }
            self.emit(token)?;
        }
        Ok(self.output)
    }
}

/// Reorders tokens into RPN.
///
/// Equivalent to moving each operator rightwards past every operand and
/// every stronger operator until something weaker (or an equal,
/// left-associative one) blocks it; brackets are skipped over whole.
#[derive(Debug, Clone)]
pub struct Parser {
    step_limit: usize,
}

impl Default for Parser {
    fn default() -> Self {
        Self::new()
    }
}

impl Parser {
    pub fn new() -> Self {
        Self {
            step_limit: DEFAULT_STEP_LIMIT,
        }
    }

    pub fn with_step_limit(step_limit: usize) -> Self {
        Self { step_limit }
    }

    /// Parentheses do not survive into the RPN, so bracket pairing is
    /// checked here: a wrong closer is [`Error::BracketMismatch`], a stray
    /// closer or an unclosed opener is [`Error::Malformed`].
    pub fn parse(&self, tokens: Vec<Token>) -> Result<Rpn> {
        let tokens = prepare(tokens);
        let mut reorder = Reorder {
            output: Vec::with_capacity(tokens.len()),
            stack: Vec::new(),
            steps: 0,
            limit: self.step_limit,
        };
        for token in tokens {
            reorder.push(token)?;
        }
        let rpn = Rpn(reorder.finish()?);
        debug!(len = rpn.len(), "parsed expression");
        Ok(rpn)
    }
}

pub fn parse(tokens: Vec<Token>) -> Result<Rpn> {
    Parser::new().parse(tokens)
}
