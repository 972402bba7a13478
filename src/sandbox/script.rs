//! Lexer and parser for chart scripts.

use serde_json::{Number, Value};

use crate::error::{SandboxError, SandboxResult};

/// Deepest bracket nesting accepted by the parser.
const MAX_NESTING: usize = 64;

/// A parsed statement.
#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    /// `let name = expr`
    Let {
        /// Variable name.
        name: String,
        /// Bound value.
        expr: Expr,
        /// Source line.
        line: usize,
    },
    /// `name = expr`
    Assign {
        /// Variable name.
        name: String,
        /// Bound value.
        expr: Expr,
        /// Source line.
        line: usize,
    },
}

/// A parsed expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Number, string, boolean or null.
    Literal(Value),
    /// Variable reference.
    Var(String),
    /// `[a, b]`
    Array(Vec<Expr>),
    /// `{"key": value}`
    Object(Vec<(String, Expr)>),
    /// `helper(args)`
    Call {
        /// Helper name.
        name: String,
        /// Arguments.
        args: Vec<Expr>,
    },
    /// `expr.a.b`; a chain of field reads is one node.
    Field {
        /// Object expression.
        target: Box<Expr>,
        /// Field names, outermost first.
        path: Vec<String>,
    },
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Number(f64),
    Str(String),
    Let,
    True,
    False,
    Null,
    Eq,
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Comma,
    Colon,
    Dot,
    Minus,
    Separator,
}

fn parse_error(line: usize, message: impl Into<String>) -> SandboxError {
    SandboxError::Parse {
        line,
        message: message.into(),
    }
}

fn tokenize(source: &str) -> SandboxResult<Vec<(Token, usize)>> {
    let mut tokens = Vec::new();
    let mut chars = source.chars().peekable();
    let mut line = 1;
    let mut depth: usize = 0;

    while let Some(&c) = chars.peek() {
        match c {
            '\n' => {
                chars.next();
                if depth == 0 {
                    tokens.push((Token::Separator, line));
                }
                line += 1;
            }
            ';' => {
                chars.next();
                tokens.push((Token::Separator, line));
            }
            c if c.is_whitespace() => {
                chars.next();
            }
            '#' => {
                while let Some(&c) = chars.peek() {
                    if c == '\n' {
                        break;
                    }
                    chars.next();
                }
            }
            '"' => {
                chars.next();
                let mut text = String::new();
                loop {
                    match chars.next() {
                        Some('"') => break,
                        Some('\\') => match chars.next() {
                            Some('n') => text.push('\n'),
                            Some('t') => text.push('\t'),
                            Some('"') => text.push('"'),
                            Some('\\') => text.push('\\'),
                            Some(other) => {
                                return Err(parse_error(line, format!("unknown escape '\\{}'", other)))
                            }
                            None => return Err(parse_error(line, "unterminated string")),
                        },
                        Some('\n') | None => return Err(parse_error(line, "unterminated string")),
                        Some(other) => text.push(other),
                    }
                }
                tokens.push((Token::Str(text), line));
            }
            c if c.is_ascii_digit() => {
                let mut text = String::new();
                while let Some(&c) = chars.peek() {
                    if c.is_ascii_digit() || c == '.' || c == 'e' || c == 'E' {
                        text.push(c);
                        chars.next();
                    } else {
                        break;
                    }
                }
                let number = text
                    .parse::<f64>()
                    .map_err(|_| parse_error(line, format!("invalid number '{}'", text)))?;
                tokens.push((Token::Number(number), line));
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let mut text = String::new();
                while let Some(&c) = chars.peek() {
                    if c.is_ascii_alphanumeric() || c == '_' {
                        text.push(c);
                        chars.next();
                    } else {
                        break;
                    }
                }
                let token = match text.as_str() {
                    "let" => Token::Let,
                    "true" => Token::True,
                    "false" => Token::False,
                    "null" => Token::Null,
                    _ => Token::Ident(text),
                };
                tokens.push((token, line));
            }
            _ => {
                chars.next();
                let token = match c {
                    '=' => Token::Eq,
                    '(' => Token::LParen,
                    ')' => Token::RParen,
                    '[' => Token::LBracket,
                    ']' => Token::RBracket,
                    '{' => Token::LBrace,
                    '}' => Token::RBrace,
                    ',' => Token::Comma,
                    ':' => Token::Colon,
                    '.' => Token::Dot,
                    '-' => Token::Minus,
                    other => return Err(parse_error(line, format!("unexpected character '{}'", other))),
                };
                match token {
                    Token::LParen | Token::LBracket | Token::LBrace => depth += 1,
                    Token::RParen | Token::RBracket | Token::RBrace => {
                        depth = depth.saturating_sub(1)
                    }
                    _ => {}
                }
                tokens.push((token, line));
            }
        }
    }

    Ok(tokens)
}

struct Parser {
    tokens: Vec<(Token, usize)>,
    pos: usize,
    depth: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(t, _)| t)
    }

    fn line(&self) -> usize {
        self.tokens
            .get(self.pos)
            .or_else(|| self.tokens.last())
            .map(|(_, l)| *l)
            .unwrap_or(1)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).map(|(t, _)| t.clone());
        self.pos += 1;
        token
    }

    fn expect(&mut self, expected: Token, what: &str) -> SandboxResult<()> {
        let line = self.line();
        match self.next() {
            Some(ref t) if *t == expected => Ok(()),
            Some(t) => Err(parse_error(line, format!("expected {}, found {:?}", what, t))),
            None => Err(parse_error(line, format!("expected {}, found end of script", what))),
        }
    }

    fn ident(&mut self) -> SandboxResult<String> {
        let line = self.line();
        match self.next() {
            Some(Token::Ident(name)) => Ok(name),
            Some(t) => Err(parse_error(line, format!("expected a name, found {:?}", t))),
            None => Err(parse_error(line, "expected a name, found end of script")),
        }
    }

    fn program(&mut self) -> SandboxResult<Vec<Stmt>> {
        let mut statements = Vec::new();
        loop {
            while self.peek() == Some(&Token::Separator) {
                self.pos += 1;
            }
            if self.peek().is_none() {
                return Ok(statements);
            }

            statements.push(self.statement()?);

            match self.peek() {
                None | Some(Token::Separator) => {}
                Some(t) => {
                    return Err(parse_error(
                        self.line(),
                        format!("expected end of statement, found {:?}", t),
                    ))
                }
            }
        }
    }

    fn statement(&mut self) -> SandboxResult<Stmt> {
        let line = self.line();
        let is_let = self.peek() == Some(&Token::Let);
        if is_let {
            self.pos += 1;
        }
        let name = self.ident()?;
        self.expect(Token::Eq, "'='")?;
        let expr = self.expression()?;

        Ok(if is_let {
            Stmt::Let { name, expr, line }
        } else {
            Stmt::Assign { name, expr, line }
        })
    }

    fn expression(&mut self) -> SandboxResult<Expr> {
        self.depth += 1;
        if self.depth > MAX_NESTING {
            return Err(parse_error(self.line(), "expression nested too deeply"));
        }

        let expr = self.primary()?;
        let mut path = Vec::new();
        while self.peek() == Some(&Token::Dot) {
            self.pos += 1;
            path.push(self.ident()?);
        }

        self.depth -= 1;
        if path.is_empty() {
            return Ok(expr);
        }
        Ok(Expr::Field {
            target: Box::new(expr),
            path,
        })
    }

    fn primary(&mut self) -> SandboxResult<Expr> {
        let line = self.line();
        match self.next() {
            Some(Token::Number(n)) => number(n, line),
            Some(Token::Minus) => match self.next() {
                Some(Token::Number(n)) => number(-n, line),
                _ => Err(parse_error(line, "expected a number after '-'")),
            },
            Some(Token::Str(s)) => Ok(Expr::Literal(Value::String(s))),
            Some(Token::True) => Ok(Expr::Literal(Value::Bool(true))),
            Some(Token::False) => Ok(Expr::Literal(Value::Bool(false))),
            Some(Token::Null) => Ok(Expr::Literal(Value::Null)),
            Some(Token::LBracket) => {
                let items = self.list(Token::RBracket, "']'", |p| p.expression())?;
                Ok(Expr::Array(items))
            }
            Some(Token::LBrace) => {
                let entries = self.list(Token::RBrace, "'}'", |p| {
                    let line = p.line();
                    let key = match p.next() {
                        Some(Token::Str(s)) | Some(Token::Ident(s)) => s,
                        _ => return Err(parse_error(line, "expected an object key")),
                    };
                    p.expect(Token::Colon, "':'")?;
                    Ok((key, p.expression()?))
                })?;
                Ok(Expr::Object(entries))
            }
            Some(Token::Ident(name)) => {
                if self.peek() == Some(&Token::LParen) {
                    self.pos += 1;
                    let args = self.list(Token::RParen, "')'", |p| p.expression())?;
                    Ok(Expr::Call { name, args })
                } else {
                    Ok(Expr::Var(name))
                }
            }
            Some(t) => Err(parse_error(line, format!("unexpected {:?}", t))),
            None => Err(parse_error(line, "unexpected end of script")),
        }
    }

    fn list<T>(
        &mut self,
        close: Token,
        what: &str,
        mut item: impl FnMut(&mut Self) -> SandboxResult<T>,
    ) -> SandboxResult<Vec<T>> {
        let mut items = Vec::new();
        if self.peek() == Some(&close) {
            self.pos += 1;
            return Ok(items);
        }
        loop {
            items.push(item(self)?);
            match self.peek() {
                Some(Token::Comma) => {
                    self.pos += 1;
                    if self.peek() == Some(&close) {
                        self.pos += 1;
                        return Ok(items);
                    }
                }
                _ => {
                    self.expect(close, what)?;
                    return Ok(items);
                }
            }
        }
    }
}

fn number(n: f64, line: usize) -> SandboxResult<Expr> {
    let value = if n.fract() == 0.0 && n.abs() < 9.0e15 {
        Value::Number(Number::from(n as i64))
    } else {
        Number::from_f64(n)
            .map(Value::Number)
            .ok_or_else(|| parse_error(line, "number out of range"))?
    };
    Ok(Expr::Literal(value))
}

/// Parse a chart script into statements.
pub fn parse(source: &str) -> SandboxResult<Vec<Stmt>> {
    let tokens = tokenize(source)?;
    Parser {
        tokens,
        pos: 0,
        depth: 0,
    }
    .program()
}
