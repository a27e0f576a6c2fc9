use tracing::{debug, trace};

use crate::{
    error::{Error, Result},
    op::{Op, INFIX_SYMBOLS},
    value::Value,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bracket {
    Paren,
    Square,
    Curly,
}

impl Bracket {
    pub fn open(self) -> char {
        match self {
            Bracket::Paren => '(',
            Bracket::Square => '[',
            Bracket::Curly => '{',
        }
    }

    pub fn close(self) -> char {
        match self {
            Bracket::Paren => ')',
            Bracket::Square => ']',
            Bracket::Curly => '}',
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Null,
    Undefined,
    Bool(bool),
    Number(f64),
    String(String),
}

impl Literal {
    pub fn to_value(&self) -> Value {
        match self {
            Literal::Null => Value::Null,
            Literal::Undefined => Value::Undefined,
            Literal::Bool(b) => Value::Bool(*b),
            Literal::Number(n) => Value::Number(*n),
            Literal::String(s) => Value::String(s.clone()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Literal(Literal),
    Identifier(String),
    Infix(Op),
    Prefix(Op),
    /// `name(` with arguments; the `(` follows as its own token.
    Call(String),
    /// `name()`, parentheses included.
    CallNoArgs(String),
    /// `accessor` is set by the parser on a `[` that indexes the expression
    /// before it (`a[0]`) rather than opening an array literal (`[0]`).
    GroupBegin {
        bracket: Bracket,
        accessor: bool,
    },
    GroupEnd(Bracket),
}

impl std::fmt::Display for TokenKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TokenKind::Literal(Literal::String(s)) => write!(f, "{s:?}"),
            TokenKind::Literal(literal) => write!(f, "{}", literal.to_value()),
            TokenKind::Identifier(name) | TokenKind::Call(name) | TokenKind::CallNoArgs(name) => {
                write!(f, "{name}")
            }
            TokenKind::Infix(op) | TokenKind::Prefix(op) => write!(f, "{op}"),
            TokenKind::GroupBegin { bracket, .. } => write!(f, "{}", bracket.open()),
            TokenKind::GroupEnd(bracket) => write!(f, "{}", bracket.close()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    /// Byte offset into the expression text.
    pub offset: usize,
}

impl std::fmt::Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.kind)
    }
}

/// True when `prev` ends an operand, so what follows it continues that
/// operand (binary `+`/`-`, indexing `[`) instead of starting a new one.
pub(crate) fn completes_expression(prev: Option<&TokenKind>) -> bool {
    !matches!(
        prev,
        None | Some(TokenKind::Infix(_) | TokenKind::Prefix(_) | TokenKind::GroupBegin { .. })
    )
}

fn keyword(name: &str) -> Option<TokenKind> {
    let kind = match name {
        "true" => TokenKind::Literal(Literal::Bool(true)),
        "false" => TokenKind::Literal(Literal::Bool(false)),
        "null" => TokenKind::Literal(Literal::Null),
        "undefined" => TokenKind::Literal(Literal::Undefined),
        "NaN" => TokenKind::Literal(Literal::Number(f64::NAN)),
        "typeof" => TokenKind::Prefix(Op::Typeof),
        "void" => TokenKind::Prefix(Op::Void),
        _ => return None,
    };
    Some(kind)
}

type Rule = fn(&str) -> Option<(TokenKind, usize)>;

/// Tried in order at every position; the first match wins.
const RULES: &[Rule] = &[
    call_no_args,
    call,
    infix,
    prefix,
    number,
    string,
    identifier,
    group_begin,
    group_end,
];

fn ident_len(s: &str) -> usize {
    match s.chars().next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' || c == '$' => s
            .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_' || c == '$'))
            .unwrap_or(s.len()),
        _ => 0,
    }
}

/// The name of a call and the input after its `(`. Reserved words never
/// head a call, so `typeof(x)` stays an operator.
fn call_head(s: &str) -> Option<(&str, &str)> {
    let len = ident_len(s);
    let name = &s[..len];
    if len == 0 || keyword(name).is_some() {
        return None;
    }
    let rest = s[len..].strip_prefix('(')?;
    Some((name, rest))
}

fn call_no_args(s: &str) -> Option<(TokenKind, usize)> {
    let (name, rest) = call_head(s)?;
    let inner = rest.trim_start();
    inner.strip_prefix(')')?;
    let len = s.len() - inner.len() + 1;
    Some((TokenKind::CallNoArgs(name.to_string()), len))
}

fn call(s: &str) -> Option<(TokenKind, usize)> {
    let (name, _) = call_head(s)?;
    Some((TokenKind::Call(name.to_string()), name.len()))
}

fn infix(s: &str) -> Option<(TokenKind, usize)> {
    INFIX_SYMBOLS
        .iter()
        .find(|(symbol, _)| s.starts_with(symbol))
        .map(|(symbol, op)| (TokenKind::Infix(*op), symbol.len()))
}

fn prefix(s: &str) -> Option<(TokenKind, usize)> {
    match s.chars().next()? {
        '!' => Some((TokenKind::Prefix(Op::Not), 1)),
        '~' => Some((TokenKind::Prefix(Op::BitNot), 1)),
        _ => None,
    }
}

fn number(s: &str) -> Option<(TokenKind, usize)> {
    let digits = |from: usize| {
        s[from..]
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(s.len() - from)
    };

    let mut len = digits(0);
    if len == 0 {
        return None;
    }
    if s[len..].starts_with('.') {
        let fraction = digits(len + 1);
        if fraction > 0 {
            len += 1 + fraction;
        }
    }
    if s[len..].starts_with(['e', 'E']) {
        let mut exponent = len + 1;
        if s[exponent..].starts_with(['+', '-']) {
            exponent += 1;
        }
        let count = digits(exponent);
        if count > 0 {
            len = exponent + count;
        }
    }

    let n = s[..len].parse::<f64>().ok()?;
    Some((TokenKind::Literal(Literal::Number(n)), len))
}

fn string(s: &str) -> Option<(TokenKind, usize)> {
    let quote = s.chars().next().filter(|c| matches!(c, '"' | '\''))?;
    let mut value = String::new();
    let mut chars = s.char_indices().skip(1);
    while let Some((i, c)) = chars.next() {
        match c {
            '\\' => {
                let (_, escaped) = chars.next()?;
                value.push(match escaped {
                    'n' => '\n',
                    't' => '\t',
                    'r' => '\r',
                    '0' => '\0',
                    other => other,
                });
            }
            c if c == quote => {
                return Some((TokenKind::Literal(Literal::String(value)), i + 1));
            }
            c => value.push(c),
        }
    }
    None
}

fn identifier(s: &str) -> Option<(TokenKind, usize)> {
    let len = ident_len(s);
    (len > 0).then(|| (TokenKind::Identifier(s[..len].to_string()), len))
}

fn group_begin(s: &str) -> Option<(TokenKind, usize)> {
    let bracket = match s.chars().next()? {
        '(' => Bracket::Paren,
        '[' => Bracket::Square,
        '{' => Bracket::Curly,
        _ => return None,
    };
    Some((
        TokenKind::GroupBegin {
            bracket,
            accessor: false,
        },
        1,
    ))
}

fn group_end(s: &str) -> Option<(TokenKind, usize)> {
    let bracket = match s.chars().next()? {
        ')' => Bracket::Paren,
        ']' => Bracket::Square,
        '}' => Bracket::Curly,
        _ => return None,
    };
    Some((TokenKind::GroupEnd(bracket), 1))
}

/// Raw scanner: yields tokens as the lexical rules match them, before
/// keywords, object keys and signs are sorted out by [`tokenize`].
///
/// Stops after the first error.
#[derive(Debug)]
pub struct Lexer<'a> {
    source: &'a str,
    rest: &'a str,
    byte: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str) -> Self {
        Self {
            source: input,
            rest: input,
            byte: 0,
        }
    }

    fn error(&self, first: char) -> Error {
        let (reason, len) = match first {
            '"' | '\'' => ("unterminated string literal".to_string(), self.rest.len()),
            c => (format!("unexpected character `{c}`"), c.len_utf8()),
        };
        Error::Tokenize {
            reason,
            src: self.source.to_string(),
            span: (self.byte, len).into(),
        }
    }
}

impl<'a> Iterator for Lexer<'a> {
    type Item = Result<Token>;

    fn next(&mut self) -> Option<Self::Item> {
        let trimmed = self.rest.trim_start();
        self.byte += self.rest.len() - trimmed.len();
        self.rest = trimmed;
        let first = self.rest.chars().next()?;

        let offset = self.byte;
        match RULES.iter().find_map(|rule| rule(self.rest)) {
            Some((kind, len)) => {
                self.byte += len;
                self.rest = &self.rest[len..];
                trace!(%kind, offset, "scanned token");
                Some(Ok(Token { kind, offset }))
            }
            None => {
                let err = self.error(first);
                self.byte += self.rest.len();
                self.rest = &self.rest[self.rest.len()..];
                Some(Err(err))
            }
        }
    }
}

/// Reserved words scan as identifiers; turn them into what they are.
fn reclassify_keywords(tokens: &mut [Token]) {
    for token in tokens.iter_mut() {
        if let TokenKind::Identifier(name) = &token.kind {
            if let Some(kind) = keyword(name) {
                token.kind = kind;
            }
        }
    }
}

/// An identifier whose innermost open bracket is `{` is a literal string,
/// whether it sits in key or value position.
fn quote_object_keys(tokens: &mut [Token]) {
    let mut open = Vec::new();
    for token in tokens.iter_mut() {
        let key = match &token.kind {
            TokenKind::GroupBegin { bracket, .. } => {
                open.push(*bracket);
                None
            }
            TokenKind::GroupEnd(_) => {
                open.pop();
                None
            }
            TokenKind::Identifier(name) if open.last() == Some(&Bracket::Curly) => {
                Some(name.clone())
            }
            _ => None,
        };
        if let Some(key) = key {
            token.kind = TokenKind::Literal(Literal::String(key));
        }
    }
}

/// `+` and `-` are binary only right after a finished operand.
fn classify_signs(tokens: &mut [Token]) {
    for i in 0..tokens.len() {
        if let TokenKind::Infix(op @ (Op::Plus | Op::Minus)) = tokens[i].kind {
            let prev = i.checked_sub(1).map(|p| &tokens[p].kind);
            if !completes_expression(prev) {
                tokens[i].kind = TokenKind::Prefix(op);
            }
        }
    }
}

/// Scans expression text into tokens.
///
/// Fails with [`Error::Tokenize`] at the first position no rule matches;
/// input is never skipped or cut short.
pub fn tokenize(text: &str) -> Result<Vec<Token>> {
    let mut tokens = Lexer::new(text).collect::<Result<Vec<_>>>()?;
    reclassify_keywords(&mut tokens);
    quote_object_keys(&mut tokens);
    classify_signs(&mut tokens);
    debug!(count = tokens.len(), "tokenized expression");
    Ok(tokens)
}
