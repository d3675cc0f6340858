//! Pratt parser: tokens -> [`Expr`].

use crate::ast::{BinOp, Expr, UnaryOp};
use crate::error::ExprError;
use crate::lexer::{Lexer, Spanned, Token};

pub struct Parser {
    tokens: Vec<Spanned>,
    pos: usize,
}

impl Parser {
    pub fn parse(src: &str) -> Result<Expr, ExprError> {
        let tokens = Lexer::new(src).tokenize()?;
        let mut parser = Parser { tokens, pos: 0 };
        let expr = parser.parse_expr(0)?;
        parser.expect_eof()?;
        Ok(expr)
    }

    fn peek(&self) -> &Token {
        &self.tokens[self.pos].token
    }

    fn peek_pos(&self) -> usize {
        self.tokens[self.pos].pos
    }

    fn bump(&mut self) -> Token {
        let t = self.tokens[self.pos].token.clone();
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
        t
    }

    fn expect_eof(&self) -> Result<(), ExprError> {
        if matches!(self.peek(), Token::Eof) {
            Ok(())
        } else {
            Err(ExprError::UnexpectedToken {
                expected: "end of expression",
                found: format!("{:?}", self.peek()),
                pos: self.peek_pos(),
            })
        }
    }

    fn expect(&mut self, expected: Token, name: &'static str) -> Result<(), ExprError> {
        if *self.peek() == expected {
            self.bump();
            Ok(())
        } else {
            Err(ExprError::UnexpectedToken {
                expected: name,
                found: format!("{:?}", self.peek()),
                pos: self.peek_pos(),
            })
        }
    }

    /// Ternary has the lowest precedence; handled outside the Pratt loop.
    fn parse_expr(&mut self, min_bp: u8) -> Result<Expr, ExprError> {
        let mut lhs = self.parse_prefix()?;

        loop {
            // Ternary: `cond ? a : b`
            if min_bp == 0 && matches!(self.peek(), Token::Question) {
                self.bump();
                let then_branch = self.parse_expr(1)?;
                self.expect(Token::Colon, "':'")?;
                let else_branch = self.parse_expr(0)?;
                lhs = Expr::Ternary(Box::new(lhs), Box::new(then_branch), Box::new(else_branch));
                continue;
            }

            let Some((op, lbp, rbp)) = binop(self.peek()) else {
                break;
            };
            if lbp < min_bp {
                break;
            }
            self.bump();
            let rhs = self.parse_expr(rbp)?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }

        Ok(lhs)
    }

    fn parse_prefix(&mut self) -> Result<Expr, ExprError> {
        let pos = self.peek_pos();
        let mut expr = match self.bump() {
            Token::Number(n) => Expr::Number(n),
            Token::String(s) => Expr::String(s),
            Token::Bool(b) => Expr::Bool(b),
            Token::Null => Expr::Null,
            Token::Minus => Expr::Unary(UnaryOp::Neg, Box::new(self.parse_expr(90)?)),
            Token::Bang => Expr::Unary(UnaryOp::Not, Box::new(self.parse_expr(90)?)),
            Token::LParen => {
                let inner = self.parse_expr(0)?;
                self.expect(Token::RParen, "')'")?;
                inner
            }
            Token::Dollar(name) => {
                if matches!(self.peek(), Token::LParen) {
                    self.bump();
                    let mut args = Vec::new();
                    if !matches!(self.peek(), Token::RParen) {
                        loop {
                            args.push(self.parse_expr(0)?);
                            if matches!(self.peek(), Token::Comma) {
                                self.bump();
                                continue;
                            }
                            break;
                        }
                    }
                    self.expect(Token::RParen, "')'")?;
                    Expr::Call(name, args)
                } else {
                    Expr::Namespace(name)
                }
            }
            Token::Ident(name) => {
                if matches!(self.peek(), Token::LParen) {
                    self.bump();
                    let mut args = Vec::new();
                    if !matches!(self.peek(), Token::RParen) {
                        loop {
                            args.push(self.parse_expr(0)?);
                            if matches!(self.peek(), Token::Comma) {
                                self.bump();
                                continue;
                            }
                            break;
                        }
                    }
                    self.expect(Token::RParen, "')'")?;
                    Expr::Call(name, args)
                } else {
                    // Bare identifiers are treated as string-like field access
                    // is not supported outside a namespace; surface as an error
                    // at evaluation time by representing as a namespace lookup
                    // of the same name (keeps grammar forgiving for bareword
                    // literals used inside function args, e.g. contains(x, y)).
                    Expr::Namespace(name)
                }
            }
            other => {
                return Err(ExprError::UnexpectedToken {
                    expected: "an expression",
                    found: format!("{other:?}"),
                    pos,
                });
            }
        };

        // Postfix: `.field` and `[index]`, left-associative, highest precedence.
        loop {
            match self.peek() {
                Token::Dot => {
                    self.bump();
                    let name = match self.bump() {
                        Token::Ident(n) => n,
                        other => {
                            return Err(ExprError::UnexpectedToken {
                                expected: "a field name",
                                found: format!("{other:?}"),
                                pos: self.peek_pos(),
                            });
                        }
                    };
                    expr = Expr::Field(Box::new(expr), name);
                }
                Token::LBracket => {
                    self.bump();
                    let index = self.parse_expr(0)?;
                    self.expect(Token::RBracket, "']'")?;
                    expr = Expr::Index(Box::new(expr), Box::new(index));
                }
                _ => break,
            }
        }

        Ok(expr)
    }
}

/// Returns `(op, left_binding_power, right_binding_power)` for a binary
/// operator token, or `None` if the token doesn't start a binary operator.
fn binop(tok: &Token) -> Option<(BinOp, u8, u8)> {
    Some(match tok {
        Token::OrOr => (BinOp::Or, 10, 11),
        Token::AndAnd => (BinOp::And, 20, 21),
        Token::EqEq => (BinOp::Eq, 30, 31),
        Token::NotEq => (BinOp::NotEq, 30, 31),
        Token::Lt => (BinOp::Lt, 40, 41),
        Token::LtEq => (BinOp::LtEq, 40, 41),
        Token::Gt => (BinOp::Gt, 40, 41),
        Token::GtEq => (BinOp::GtEq, 40, 41),
        Token::Plus => (BinOp::Add, 50, 51),
        Token::Minus => (BinOp::Sub, 50, 51),
        Token::Star => (BinOp::Mul, 60, 61),
        Token::Slash => (BinOp::Div, 60, 61),
        Token::Percent => (BinOp::Rem, 60, 61),
        _ => return None,
    })
}
