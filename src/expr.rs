//! Expressions used by `{if}`, `{set}`, `{for}` and `{block}` arguments.
//!
//! Operators, from lowest to highest precedence:
//! `||`/`or`, `&&`/`and`, comparisons, `+ - ~`, `* / %`, unary `!`/`not` and `-`.

use crate::constants::MAX_EXPR_NESTING;
use crate::error::{Error, Result};
use crate::value::{compare, is_truthy, loose_eq, to_display, to_number, Number};
use crate::variable::{Mode, VarExpr};
use serde_json::Value;
use std::cmp::Ordering;

/// Resolves variable references while an expression is evaluated.
pub trait Resolve {
    fn resolve(&self, var: &VarExpr) -> Result<Value>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Neg,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Or,
    And,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Add,
    Sub,
    Concat,
    Mul,
    Div,
    Rem,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Value),
    Array(Vec<Expr>),
    Var(VarExpr),
    Unary(UnaryOp, Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(Value),
    Str(String),
    Ident(String),
    Var(String),
    Op(&'static str),
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
}

const OPERATORS: [&str; 16] = [
    "||", "&&", "==", "!=", "<=", ">=", "<", ">", "!", "+", "-", "~", "*", "/", "%", "=",
];

fn tokenize(source: &str) -> Result<Vec<Token>> {
    let chars: Vec<char> = source.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            c if c.is_whitespace() => i += 1,
            '(' | ')' | '[' | ']' | ',' => {
                tokens.push(match c {
                    '(' => Token::LParen,
                    ')' => Token::RParen,
                    '[' => Token::LBracket,
                    ']' => Token::RBracket,
                    _ => Token::Comma,
                });
                i += 1;
            }
            '{' => {
                let end = matching_brace(&chars, i).ok_or_else(|| {
                    Error::syntax(format!("unclosed variable in expression \"{source}\""))
                })?;
                let var: String = chars[i + 1..end].iter().collect();
                tokens.push(Token::Var(var));
                i = end + 1;
            }
            '$' => {
                let start = i;
                let mut depth = 0usize;
                i += 1;
                while i < chars.len() {
                    let c = chars[i];
                    if depth > 0 {
                        match c {
                            '{' | '(' => depth += 1,
                            '}' | ')' => depth -= 1,
                            _ => {}
                        }
                    } else if c == '{' || c == '(' {
                        depth += 1;
                    } else if c == '|' && chars.get(i + 1) == Some(&'|') {
                        break;
                    } else if !(c.is_alphanumeric() || matches!(c, '_' | '.' | '$' | '|')) {
                        break;
                    }
                    i += 1;
                }
                tokens.push(Token::Var(chars[start..i].iter().collect()));
            }
            '"' | '\'' => {
                let mut value = String::new();
                i += 1;
                loop {
                    match chars.get(i) {
                        None => {
                            return Err(Error::syntax(format!(
                                "unterminated string in expression \"{source}\""
                            )))
                        }
                        Some('\\') if i + 1 < chars.len() => {
                            value.push(chars[i + 1]);
                            i += 2;
                        }
                        Some(&q) if q == c => {
                            i += 1;
                            break;
                        }
                        Some(&other) => {
                            value.push(other);
                            i += 1;
                        }
                    }
                }
                tokens.push(Token::Str(value));
            }
            c if c.is_ascii_digit() => {
                let start = i;
                while i < chars.len() && chars[i].is_ascii_digit() {
                    i += 1;
                }
                let is_float = chars.get(i) == Some(&'.')
                    && chars.get(i + 1).is_some_and(|c| c.is_ascii_digit());
                if is_float {
                    i += 1;
                    while i < chars.len() && chars[i].is_ascii_digit() {
                        i += 1;
                    }
                }
                let text: String = chars[start..i].iter().collect();
                let number = if is_float {
                    text.parse::<f64>().ok().and_then(serde_json::Number::from_f64).map(Value::Number)
                } else {
                    text.parse::<i64>().ok().map(Value::from)
                };
                let number = number
                    .ok_or_else(|| Error::syntax(format!("invalid number \"{text}\"")))?;
                tokens.push(Token::Number(number));
            }
            c if c.is_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                tokens.push(Token::Ident(chars[start..i].iter().collect()));
            }
            _ => {
                let rest: String = chars[i..chars.len().min(i + 2)].iter().collect();
                let op = OPERATORS.iter().find(|op| rest.starts_with(**op)).ok_or_else(|| {
                    Error::syntax(format!("unexpected character '{c}' in expression \"{source}\""))
                })?;
                if *op == "=" {
                    return Err(Error::syntax(format!(
                        "single '=' in expression \"{source}\", use '==' to compare"
                    )));
                }
                tokens.push(Token::Op(*op));
                i += op.len();
            }
        }
    }

    Ok(tokens)
}

fn matching_brace(chars: &[char], open: usize) -> Option<usize> {
    let mut depth = 0usize;
    for (i, c) in chars.iter().enumerate().skip(open) {
        match c {
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

struct Parser<'s> {
    source: &'s str,
    tokens: Vec<Token>,
    pos: usize,
    mode: Mode,
    nesting: usize,
}

impl<'s> Parser<'s> {
    fn new(source: &'s str, mode: Mode, nesting: usize) -> Result<Self> {
        Ok(Self { source, tokens: tokenize(source)?, pos: 0, mode, nesting })
    }

    fn nested<T>(&mut self, f: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        if self.nesting >= MAX_EXPR_NESTING {
            return Err(self.error("expression nested too deeply"));
        }
        self.nesting += 1;
        let result = f(self);
        self.nesting -= 1;
        result
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn error(&self, message: &str) -> Error {
        Error::syntax(format!("{message} in expression \"{}\"", self.source))
    }

    fn eat_op(&mut self, ops: &[&str], words: &[&str]) -> Option<&'static str> {
        match self.peek() {
            Some(Token::Op(op)) if ops.contains(op) => {
                let op = *op;
                self.pos += 1;
                Some(op)
            }
            Some(Token::Ident(word)) if words.contains(&word.as_str()) => {
                let op = if word == "or" { "||" } else if word == "and" { "&&" } else { "!" };
                self.pos += 1;
                Some(op)
            }
            _ => None,
        }
    }

    fn or(&mut self) -> Result<Expr> {
        let mut left = self.and()?;
        while self.eat_op(&["||"], &["or"]).is_some() {
            let right = self.and()?;
            left = Expr::Binary(BinaryOp::Or, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn and(&mut self) -> Result<Expr> {
        let mut left = self.comparison()?;
        while self.eat_op(&["&&"], &["and"]).is_some() {
            let right = self.comparison()?;
            left = Expr::Binary(BinaryOp::And, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn comparison(&mut self) -> Result<Expr> {
        let left = self.additive()?;
        let op = match self.eat_op(&["==", "!=", "<", "<=", ">", ">="], &[]) {
            Some("==") => BinaryOp::Eq,
            Some("!=") => BinaryOp::Ne,
            Some("<") => BinaryOp::Lt,
            Some("<=") => BinaryOp::Le,
            Some(">") => BinaryOp::Gt,
            Some(">=") => BinaryOp::Ge,
            _ => return Ok(left),
        };
        let right = self.additive()?;
        Ok(Expr::Binary(op, Box::new(left), Box::new(right)))
    }

    fn additive(&mut self) -> Result<Expr> {
        let mut left = self.multiplicative()?;
        while let Some(op) = self.eat_op(&["+", "-", "~"], &[]) {
            let op = match op {
                "+" => BinaryOp::Add,
                "-" => BinaryOp::Sub,
                _ => BinaryOp::Concat,
            };
            let right = self.multiplicative()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn multiplicative(&mut self) -> Result<Expr> {
        let mut left = self.unary()?;
        while let Some(op) = self.eat_op(&["*", "/", "%"], &[]) {
            let op = match op {
                "*" => BinaryOp::Mul,
                "/" => BinaryOp::Div,
                _ => BinaryOp::Rem,
            };
            let right = self.unary()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn unary(&mut self) -> Result<Expr> {
        match self.eat_op(&["!", "-"], &["not"]) {
            Some("-") => Ok(Expr::Unary(UnaryOp::Neg, Box::new(self.nested(Self::unary)?))),
            Some(_) => Ok(Expr::Unary(UnaryOp::Not, Box::new(self.nested(Self::unary)?))),
            None => self.primary(),
        }
    }

    fn primary(&mut self) -> Result<Expr> {
        match self.next() {
            Some(Token::Number(n)) => Ok(Expr::Literal(n)),
            Some(Token::Str(s)) => Ok(Expr::Literal(Value::String(s))),
            Some(Token::Var(source)) => {
                Ok(Expr::Var(VarExpr::parse_nested(&source, self.mode, self.nesting + 1)?))
            }
            Some(Token::Ident(word)) => match word.as_str() {
                "true" => Ok(Expr::Literal(Value::Bool(true))),
                "false" => Ok(Expr::Literal(Value::Bool(false))),
                "null" => Ok(Expr::Literal(Value::Null)),
                _ => Err(self.error(&format!("unexpected word \"{word}\""))),
            },
            Some(Token::LParen) => {
                let inner = self.nested(Self::or)?;
                match self.next() {
                    Some(Token::RParen) => Ok(inner),
                    _ => Err(self.error("missing ')'")),
                }
            }
            Some(Token::LBracket) => {
                let mut items = Vec::new();
                if self.peek() == Some(&Token::RBracket) {
                    self.pos += 1;
                    return Ok(Expr::Array(items));
                }
                loop {
                    items.push(self.nested(Self::or)?);
                    match self.next() {
                        Some(Token::Comma) => continue,
                        Some(Token::RBracket) => break,
                        _ => return Err(self.error("missing ']'")),
                    }
                }
                Ok(Expr::Array(items))
            }
            Some(_) => Err(self.error("unexpected token")),
            None => Err(self.error("unexpected end")),
        }
    }
}

impl Expr {
    /// Parses a complete expression.
    pub fn parse(source: &str, mode: Mode) -> Result<Expr> {
        Self::parse_nested(source, mode, 0)
    }

    pub(crate) fn parse_nested(source: &str, mode: Mode, nesting: usize) -> Result<Expr> {
        let mut parser = Parser::new(source, mode, nesting)?;
        if parser.tokens.is_empty() {
            return Err(parser.error("empty expression"));
        }
        let expr = parser.or()?;
        if parser.pos < parser.tokens.len() {
            return Err(parser.error("unexpected trailing input"));
        }
        Ok(expr)
    }

    /// Parses whitespace-separated arguments, each a unary-level term.
    ///
    /// `"a" {$b} -1 (2 + 3)` yields four arguments.
    pub fn parse_arguments(source: &str, mode: Mode) -> Result<Vec<Expr>> {
        let mut parser = Parser::new(source, mode, 0)?;
        let mut args = Vec::new();
        while parser.pos < parser.tokens.len() {
            args.push(parser.unary()?);
        }
        Ok(args)
    }

    /// Evaluates the expression, resolving variables through `scope`.
    pub fn eval(&self, scope: &dyn Resolve) -> Result<Value> {
        match self {
            Expr::Literal(value) => Ok(value.clone()),
            Expr::Array(items) => {
                Ok(Value::Array(items.iter().map(|e| e.eval(scope)).collect::<Result<_>>()?))
            }
            Expr::Var(var) => scope.resolve(var),
            Expr::Unary(UnaryOp::Not, inner) => Ok(Value::Bool(!is_truthy(&inner.eval(scope)?))),
            Expr::Unary(UnaryOp::Neg, inner) => {
                let value = inner.eval(scope)?;
                match number(&value)? {
                    Number::Int(i) => Ok(i.checked_neg().map(Value::from).unwrap_or(Value::Null)),
                    Number::Float(f) => Ok(Number::Float(-f).into_value()),
                }
            }
            Expr::Binary(BinaryOp::Or, left, right) => {
                let left = left.eval(scope)?;
                Ok(Value::Bool(is_truthy(&left) || is_truthy(&right.eval(scope)?)))
            }
            Expr::Binary(BinaryOp::And, left, right) => {
                let left = left.eval(scope)?;
                Ok(Value::Bool(is_truthy(&left) && is_truthy(&right.eval(scope)?)))
            }
            Expr::Binary(op, left, right) => binary(*op, &left.eval(scope)?, &right.eval(scope)?),
        }
    }
}

fn number(value: &Value) -> Result<Number> {
    to_number(value).ok_or_else(|| {
        Error::execution(format!("cannot use {} as a number", Value::to_string(value)))
    })
}

fn binary(op: BinaryOp, left: &Value, right: &Value) -> Result<Value> {
    let ordering = |expected: &[Ordering]| {
        Value::Bool(compare(left, right).is_some_and(|o| expected.contains(&o)))
    };

    match op {
        BinaryOp::Eq => Ok(Value::Bool(loose_eq(left, right))),
        BinaryOp::Ne => Ok(Value::Bool(!loose_eq(left, right))),
        BinaryOp::Lt => Ok(ordering(&[Ordering::Less])),
        BinaryOp::Le => Ok(ordering(&[Ordering::Less, Ordering::Equal])),
        BinaryOp::Gt => Ok(ordering(&[Ordering::Greater])),
        BinaryOp::Ge => Ok(ordering(&[Ordering::Greater, Ordering::Equal])),
        BinaryOp::Concat => Ok(Value::String(to_display(left) + &to_display(right))),
        BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Rem => {
            arithmetic(op, number(left)?, number(right)?)
        }
        BinaryOp::Or | BinaryOp::And => unreachable!("logical operators short-circuit in eval"),
    }
}

fn arithmetic(op: BinaryOp, left: Number, right: Number) -> Result<Value> {
    if let (Number::Int(l), Number::Int(r)) = (left, right) {
        let result = match op {
            BinaryOp::Add => l.checked_add(r),
            BinaryOp::Sub => l.checked_sub(r),
            BinaryOp::Mul => l.checked_mul(r),
            BinaryOp::Div if r == 0 => return Err(Error::execution("division by zero")),
            BinaryOp::Div if l.checked_rem(r) == Some(0) => l.checked_div(r),
            BinaryOp::Div => return Ok(Number::Float(l as f64 / r as f64).into_value()),
            BinaryOp::Rem if r == 0 => return Err(Error::execution("modulo by zero")),
            BinaryOp::Rem => l.checked_rem(r),
            _ => None,
        };
        if let Some(result) = result {
            return Ok(Value::from(result));
        }
    }

    let (l, r) = (left.as_f64(), right.as_f64());
    let result = match op {
        BinaryOp::Add => l + r,
        BinaryOp::Sub => l - r,
        BinaryOp::Mul => l * r,
        BinaryOp::Div | BinaryOp::Rem if r == 0.0 => {
            return Err(Error::execution("division by zero"))
        }
        BinaryOp::Div => l / r,
        _ => l % r,
    };
    Ok(Number::Float(result).into_value())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Fixed(Value);

    impl Resolve for Fixed {
        fn resolve(&self, var: &VarExpr) -> Result<Value> {
            let name = var.path.root_name().unwrap_or_default();
            Ok(self.0.get(name).cloned().unwrap_or(Value::Null))
        }
    }

    fn eval(source: &str) -> Result<Value> {
        let scope = Fixed(json!({"a": 5, "s": "x", "list": [1, 2]}));
        Expr::parse(source, Mode::Shared)?.eval(&scope)
    }

    #[test]
    fn test_precedence() {
        assert_eq!(eval("1 + 2 * 3").unwrap(), json!(7));
        assert_eq!(eval("(1 + 2) * 3").unwrap(), json!(9));
        assert_eq!(eval("-{$a} + 1").unwrap(), json!(-4));
        assert_eq!(eval("7 / 2").unwrap(), json!(3.5));
        assert_eq!(eval("7 % 4").unwrap(), json!(3));
    }

    #[test]
    fn test_logic_and_comparison() {
        assert_eq!(eval("{$a} == 5 && $s == 'x'").unwrap(), json!(true));
        assert_eq!(eval("$a > 10 or not $missing").unwrap(), json!(true));
        assert_eq!(eval("!$list").unwrap(), json!(false));
        assert_eq!(eval("$s ~ '-' ~ $a").unwrap(), json!("x-5"));
    }

    #[test]
    fn test_array_literal() {
        assert_eq!(eval("[]").unwrap(), json!([]));
        assert_eq!(eval("[1, 'b', $a]").unwrap(), json!([1, "b", 5]));
    }

    #[test]
    fn test_errors() {
        assert!(matches!(Expr::parse("$a = 1", Mode::Shared), Err(Error::SyntaxError { .. })));
        assert!(matches!(Expr::parse("(1 + 2", Mode::Shared), Err(Error::SyntaxError { .. })));
        assert!(matches!(Expr::parse("foo", Mode::Shared), Err(Error::SyntaxError { .. })));
        assert!(matches!(eval("$s + 1"), Err(Error::ExecutionError(_))));
        assert!(matches!(eval("1 / 0"), Err(Error::ExecutionError(_))));
    }

    #[test]
    fn test_nesting_is_bounded() {
        let shallow = format!("{}1{}", "(".repeat(10), ")".repeat(10));
        assert_eq!(eval(&shallow).unwrap(), json!(1));

        let deep = format!("{}1{}", "(".repeat(200), ")".repeat(200));
        let err = Expr::parse(&deep, Mode::Shared).unwrap_err();
        assert!(err.to_string().contains("nested too deeply"));

        let negations = format!("{}1", "- ".repeat(500));
        assert!(matches!(Expr::parse(&negations, Mode::Shared), Err(Error::SyntaxError { .. })));
    }

    #[test]
    fn test_arguments() {
        let args = Expr::parse_arguments("\"a b\" {$a} -1 (2 + 3)", Mode::Shared).unwrap();
        assert_eq!(args.len(), 4);
        assert_eq!(args[0], Expr::Literal(json!("a b")));
    }
}
