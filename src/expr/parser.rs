use std::rc::Rc;

use super::ast::{Expr, Func};
use super::lexer::{lex, Token};
use crate::error::ExprError;

/// Recursive-descent parser over the token stream produced by [`lex`].
/// Precedence, low to high: `+ -`, `* /`, unary `-`, `^` (right-assoc),
/// function calls and parenthesized atoms.
struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> &Token {
        &self.tokens[self.pos]
    }

    fn advance(&mut self) -> Token {
        let tok = self.tokens[self.pos].clone();
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
        tok
    }

    fn expect(&mut self, tok: &Token) -> Result<(), ExprError> {
        if self.peek() == tok {
            self.advance();
            Ok(())
        } else {
            Err(ExprError::UnexpectedToken(format!("{:?}", self.peek())))
        }
    }

    fn parse_expr(&mut self) -> Result<Rc<Expr>, ExprError> {
        let mut lhs = self.parse_term()?;
        loop {
            match self.peek() {
                Token::Plus => {
                    self.advance();
                    let rhs = self.parse_term()?;
                    lhs = Expr::Add(lhs, rhs).rc();
                }
                Token::Minus => {
                    self.advance();
                    let rhs = self.parse_term()?;
                    lhs = Expr::Sub(lhs, rhs).rc();
                }
                _ => break,
            }
        }
        Ok(lhs)
    }

    fn parse_term(&mut self) -> Result<Rc<Expr>, ExprError> {
        let mut lhs = self.parse_unary()?;
        loop {
            match self.peek() {
                Token::Star => {
                    self.advance();
                    let rhs = self.parse_unary()?;
                    lhs = Expr::Mul(lhs, rhs).rc();
                }
                Token::Slash => {
                    self.advance();
                    let rhs = self.parse_unary()?;
                    lhs = Expr::Div(lhs, rhs).rc();
                }
                _ => break,
            }
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<Rc<Expr>, ExprError> {
        if *self.peek() == Token::Minus {
            self.advance();
            let inner = self.parse_unary()?;
            return Ok(Expr::Neg(inner).rc());
        }
        if *self.peek() == Token::Plus {
            self.advance();
            return self.parse_unary();
        }
        self.parse_pow()
    }

    fn parse_pow(&mut self) -> Result<Rc<Expr>, ExprError> {
        let base = self.parse_atom()?;
        if *self.peek() == Token::Caret {
            self.advance();
            let exp = self.parse_unary()?;
            return Ok(Expr::Pow(base, exp).rc());
        }
        Ok(base)
    }

    fn parse_atom(&mut self) -> Result<Rc<Expr>, ExprError> {
        match self.advance() {
            Token::Num(v) => Ok(Expr::Num(v).rc()),
            Token::Ident(name) => {
                if *self.peek() == Token::LParen {
                    self.advance();
                    let arg = self.parse_expr()?;
                    self.expect(&Token::RParen)?;
                    let func = Func::from_name(&name).ok_or(ExprError::UnknownFunction(name))?;
                    Ok(Expr::Call(func, arg).rc())
                } else {
                    Ok(Expr::Name(name).rc())
                }
            }
            Token::LParen => {
                let inner = self.parse_expr()?;
                self.expect(&Token::RParen)?;
                Ok(inner)
            }
            Token::Eof => Err(ExprError::UnexpectedEof),
            other => Err(ExprError::UnexpectedToken(format!("{other:?}"))),
        }
    }
}

pub fn parse(src: &str) -> Result<Rc<Expr>, ExprError> {
    let tokens = lex(src)?;
    let mut parser = Parser { tokens, pos: 0 };
    let expr = parser.parse_expr()?;
    if *parser.peek() != Token::Eof {
        return Err(ExprError::UnexpectedToken(format!("{:?}", parser.peek())));
    }
    Ok(expr)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_precedence_correctly() {
        // 2 + 3*4 should parse as 2 + (3*4), not (2+3)*4.
        let ast = parse("2 + 3*4").unwrap();
        match &*ast {
            Expr::Add(lhs, rhs) => {
                assert!(matches!(**lhs, Expr::Num(v) if v == 2.0));
                assert!(matches!(**rhs, Expr::Mul(_, _)));
            }
            _ => panic!("expected Add at top level"),
        }
    }

    #[test]
    fn right_associative_power() {
        // 2^3^2 == 2^(3^2) == 512, not (2^3)^2 == 64.
        let ast = parse("2^3^2").unwrap();
        match &*ast {
            Expr::Pow(base, exp) => {
                assert!(matches!(**base, Expr::Num(v) if v == 2.0));
                assert!(matches!(**exp, Expr::Pow(_, _)));
            }
            _ => panic!("expected Pow at top level"),
        }
    }

    #[test]
    fn rejects_unknown_function() {
        assert!(parse("foo(x)").is_err());
    }

    #[test]
    fn rejects_trailing_garbage() {
        assert!(parse("1 + 2 3").is_err());
    }
}
