//! Formula parser.
//!
//! Recursive descent parser for the formula grammar. Converts text to AST with
//! meaningful error messages including character offset, expected/found tokens.
//!
//! Precedence, loosest first: comparison (non-associative), `+ -`, `* /`,
//! unary minus, primary.
//!
//! Tree depth is capped at [`MAX_NESTING`], so evaluating or dropping a
//! parsed formula never recurses deeper than that.

use crate::domain::error::ParseError;
use crate::domain::formula::{BinaryOp, CompiledFormula, Expr};

/// Deepest nesting accepted, counting parentheses, `if(` calls, unary minus
/// and each chained binary operator.
pub const MAX_NESTING: usize = 256;

struct Parser<'a> {
    input: &'a str,
    pos: usize,
    depth: usize,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            input,
            pos: 0,
            depth: 0,
        }
    }

    fn enter(&mut self, position: usize) -> Result<(), ParseError> {
        if self.depth >= MAX_NESTING {
            return Err(ParseError {
                message: "formula nested too deeply".to_string(),
                position,
            });
        }
        self.depth += 1;
        Ok(())
    }

    fn leave(&mut self) {
        self.depth -= 1;
    }

    fn remaining(&self) -> &'a str {
        &self.input[self.pos..]
    }

    fn peek(&self) -> Option<char> {
        self.remaining().chars().next()
    }

    fn advance(&mut self) -> Option<char> {
        let ch = self.peek()?;
        self.pos += ch.len_utf8();
        Some(ch)
    }

    fn skip_whitespace(&mut self) {
        while let Some(ch) = self.peek() {
            if ch.is_whitespace() {
                self.advance();
            } else {
                break;
            }
        }
    }

    fn expect_char(&mut self, expected: char) -> Result<(), ParseError> {
        self.skip_whitespace();
        match self.peek() {
            Some(ch) if ch == expected => {
                self.advance();
                Ok(())
            }
            Some(ch) => Err(ParseError {
                message: format!("expected '{}', found '{}'", expected, ch),
                position: self.pos,
            }),
            None => Err(ParseError {
                message: format!("expected '{}', found end of input", expected),
                position: self.pos,
            }),
        }
    }

    fn consume_exact(&mut self, s: &str) -> bool {
        if self.remaining().starts_with(s) {
            self.pos += s.len();
            true
        } else {
            false
        }
    }

    fn peek_word(&self) -> String {
        let mut word = String::new();
        for ch in self.remaining().chars() {
            if ch.is_alphanumeric() || ch == '_' {
                word.push(ch);
            } else {
                break;
            }
        }
        if word.is_empty() {
            self.peek()
                .map(|c| c.to_string())
                .unwrap_or_else(|| "end of input".to_string())
        } else {
            word
        }
    }

    /// True if the next non-whitespace character after `offset` bytes is `ch`.
    fn followed_by(&self, offset: usize, ch: char) -> bool {
        self.remaining()[offset..].trim_start().starts_with(ch)
    }

    fn parse_number(&mut self) -> Result<f64, ParseError> {
        let start = self.pos;
        let mut has_dot = false;
        let mut digits = 0;

        while let Some(ch) = self.peek() {
            if ch.is_ascii_digit() {
                digits += 1;
                self.advance();
            } else if ch == '.' && !has_dot {
                has_dot = true;
                self.advance();
            } else {
                break;
            }
        }

        if digits == 0 {
            return Err(ParseError {
                message: "expected number".to_string(),
                position: start,
            });
        }

        let num_str = &self.input[start..self.pos];
        num_str.parse::<f64>().map_err(|_| ParseError {
            message: format!("invalid number: {}", num_str),
            position: start,
        })
    }

    fn parse_string(&mut self) -> Result<String, ParseError> {
        let start = self.pos;
        self.expect_char('"')?;
        let mut out = String::new();
        loop {
            match self.advance() {
                Some('"') => return Ok(out),
                Some('\\') => match self.advance() {
                    Some(escaped) => out.push(escaped),
                    None => break,
                },
                Some(ch) => out.push(ch),
                None => break,
            }
        }
        Err(ParseError {
            message: "unterminated string literal".to_string(),
            position: start,
        })
    }

    fn parse_identifier(&mut self) -> Result<String, ParseError> {
        let start = self.pos;
        match self.peek() {
            Some(ch) if ch.is_alphabetic() || ch == '_' => {}
            _ => {
                return Err(ParseError {
                    message: format!("expected expression, found '{}'", self.peek_word()),
                    position: start,
                });
            }
        }
        while let Some(ch) = self.peek() {
            if ch.is_alphanumeric() || ch == '_' {
                self.advance();
            } else {
                break;
            }
        }
        Ok(self.input[start..self.pos].to_string())
    }

    fn parse_if(&mut self) -> Result<Expr, ParseError> {
        self.enter(self.pos)?;
        let expr = self.parse_if_body();
        self.leave();
        expr
    }

    fn parse_if_body(&mut self) -> Result<Expr, ParseError> {
        self.pos += "if".len();
        self.expect_char('(')?;
        let condition = self.parse_comparison()?;
        self.expect_char(',')?;
        let then = self.parse_comparison()?;
        self.expect_char(',')?;
        let otherwise = self.parse_comparison()?;
        self.expect_char(')')?;
        Ok(Expr::If {
            condition: Box::new(condition),
            then: Box::new(then),
            otherwise: Box::new(otherwise),
        })
    }

    fn parse_primary(&mut self) -> Result<Expr, ParseError> {
        self.skip_whitespace();

        match self.peek() {
            Some(ch) if ch.is_ascii_digit() || ch == '.' => {
                return Ok(Expr::Number(self.parse_number()?));
            }
            Some('"') => return Ok(Expr::Str(self.parse_string()?)),
            Some('(') => {
                self.enter(self.pos)?;
                self.advance();
                let inner = self.parse_comparison();
                self.leave();
                let inner = inner?;
                self.expect_char(')')?;
                return Ok(inner);
            }
            None => {
                return Err(ParseError {
                    message: "expected expression, found end of input".to_string(),
                    position: self.pos,
                });
            }
            _ => {}
        }

        if self.peek_word() == "if" && self.followed_by(2, '(') {
            return self.parse_if();
        }

        Ok(Expr::Ident(self.parse_identifier()?))
    }

    fn parse_unary(&mut self) -> Result<Expr, ParseError> {
        self.skip_whitespace();
        if self.peek() == Some('-') {
            self.enter(self.pos)?;
            self.advance();
            let inner = self.parse_unary();
            self.leave();
            return Ok(match inner? {
                Expr::Number(n) => Expr::Number(-n),
                other => Expr::Neg(Box::new(other)),
            });
        }
        self.parse_primary()
    }

    /// Each chained operator deepens the left-leaning tree by one level, so
    /// it counts against the nesting limit until the chain ends.
    fn parse_term(&mut self) -> Result<Expr, ParseError> {
        let depth = self.depth;
        let expr = self.parse_term_chain();
        self.depth = depth;
        expr
    }

    fn parse_term_chain(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_unary()?;
        loop {
            self.skip_whitespace();
            let op = match self.peek() {
                Some('*') => BinaryOp::Mul,
                Some('/') => BinaryOp::Div,
                _ => return Ok(left),
            };
            self.enter(self.pos)?;
            self.advance();
            let right = self.parse_unary()?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
    }

    fn parse_additive(&mut self) -> Result<Expr, ParseError> {
        let depth = self.depth;
        let expr = self.parse_additive_chain();
        self.depth = depth;
        expr
    }

    fn parse_additive_chain(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_term()?;
        loop {
            self.skip_whitespace();
            let op = match self.peek() {
                Some('+') => BinaryOp::Add,
                Some('-') => BinaryOp::Sub,
                _ => return Ok(left),
            };
            self.enter(self.pos)?;
            self.advance();
            let right = self.parse_term()?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
    }

    fn consume_comparison_op(&mut self) -> Option<BinaryOp> {
        self.skip_whitespace();
        for (text, op) in [
            ("==", BinaryOp::Eq),
            ("!=", BinaryOp::Ne),
            (">=", BinaryOp::Ge),
            ("<=", BinaryOp::Le),
            (">", BinaryOp::Gt),
            ("<", BinaryOp::Lt),
        ] {
            if self.consume_exact(text) {
                return Some(op);
            }
        }
        None
    }

    fn parse_comparison(&mut self) -> Result<Expr, ParseError> {
        let left = self.parse_additive()?;
        let Some(op) = self.consume_comparison_op() else {
            return Ok(left);
        };
        let right = self.parse_additive()?;

        let save = self.pos;
        if self.consume_comparison_op().is_some() {
            return Err(ParseError {
                message: "comparison operators cannot be chained".to_string(),
                position: save + (self.input[save..].len() - self.input[save..].trim_start().len()),
            });
        }

        Ok(Expr::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        })
    }

    fn parse(&mut self) -> Result<Expr, ParseError> {
        let expr = self.parse_comparison()?;
        self.skip_whitespace();
        if self.pos < self.input.len() {
            return Err(ParseError {
                message: format!("unexpected input after formula: '{}'", self.remaining()),
                position: self.pos,
            });
        }
        Ok(expr)
    }
}

pub fn parse(input: &str) -> Result<CompiledFormula, ParseError> {
    let mut parser = Parser::new(input);
    let expr = parser.parse()?;
    Ok(CompiledFormula {
        source: input.to_string(),
        expr,
    })
}
