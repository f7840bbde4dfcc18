use num_bigint::BigInt;

use crate::diagnostics::Diagnostic;
use crate::syntax::{
    expression::{Expression, InfixOp, KvcEntry, PrefixOp},
    lexer::Lexer,
    precedence::{Precedence, token_precedence},
    token::Token,
    token_type::TokenType,
};

pub struct Parser {
    lexer: Lexer,
    current_token: Token,
    peek_token: Token,
    pub errors: Vec<Diagnostic>,
}

struct Snapshot {
    lexer: Lexer,
    current_token: Token,
    peek_token: Token,
    error_count: usize,
}

impl Parser {
    pub fn new(lexer: Lexer) -> Self {
        let mut parser = Parser {
            lexer,
            current_token: Token::new(TokenType::Eof, "", 0, 0),
            peek_token: Token::new(TokenType::Eof, "", 0, 0),
            errors: Vec::new(),
        };
        parser.next_token();
        parser.next_token();
        parser
    }

    /// Parse a whole source text into a single expression.
    ///
    /// A source whose top level looks like `key: value, ...` (optionally with a
    /// `return` entry) is treated as a brace-less key-value block, matching the
    /// script form `a: 1; b: 2; return a + b`.
    pub fn parse_source(&mut self) -> Option<Expression> {
        let expression = if self.is_naked_kvc_root() {
            self.parse_naked_kvc_root()?
        } else {
            let expr = self.parse_expression(Precedence::Lowest)?;
            if self.is_peek_token(TokenType::Semicolon) {
                self.next_token();
            }
            expr
        };

        if !self.is_peek_token(TokenType::Eof) {
            self.errors.push(
                Diagnostic::error(format!(
                    "unexpected trailing token `{}`",
                    self.peek_token.literal
                ))
                .with_code("E1000")
                .with_position(self.peek_token.position),
            );
            return None;
        }
        Some(expression)
    }

    fn is_naked_kvc_root(&self) -> bool {
        match self.current_token.token_type {
            TokenType::Return => true,
            TokenType::Ident | TokenType::String => {
                self.peek_token.token_type == TokenType::Colon
            }
            _ => false,
        }
    }

    fn parse_naked_kvc_root(&mut self) -> Option<Expression> {
        let position = self.current_token.position;
        let mut entries = vec![self.parse_kvc_entry()?];
        while self.is_peek_token(TokenType::Comma) || self.is_peek_token(TokenType::Semicolon) {
            self.next_token();
            if self.is_peek_token(TokenType::Eof) {
                break;
            }
            self.next_token();
            entries.push(self.parse_kvc_entry()?);
        }
        Some(Expression::KvcLiteral { entries, position })
    }

    fn next_token(&mut self) {
        self.current_token = self.peek_token.clone();
        self.peek_token = self.lexer.next_token();
    }

    fn snapshot(&self) -> Snapshot {
        Snapshot {
            lexer: self.lexer.clone(),
            current_token: self.current_token.clone(),
            peek_token: self.peek_token.clone(),
            error_count: self.errors.len(),
        }
    }

    fn restore(&mut self, snapshot: Snapshot) {
        self.lexer = snapshot.lexer;
        self.current_token = snapshot.current_token;
        self.peek_token = snapshot.peek_token;
        self.errors.truncate(snapshot.error_count);
    }

    fn parse_expression(&mut self, precedence: Precedence) -> Option<Expression> {
        let mut left = self.parse_prefix()?;

        while !self.is_peek_token(TokenType::Semicolon)
            && precedence < token_precedence(&self.peek_token.token_type)
        {
            left = match self.peek_token.token_type {
                TokenType::Plus
                | TokenType::Minus
                | TokenType::Asterisk
                | TokenType::Slash
                | TokenType::Percent
                | TokenType::Lt
                | TokenType::Lte
                | TokenType::Gt
                | TokenType::Gte
                | TokenType::Eq
                | TokenType::NotEq
                | TokenType::And
                | TokenType::Or => {
                    self.next_token();
                    self.parse_infix_expression(left)?
                }
                TokenType::LParen => {
                    self.next_token();
                    self.parse_call_expression(left)?
                }
                TokenType::LBracket => {
                    self.next_token();
                    self.parse_index_expression(left)?
                }
                TokenType::Dot => {
                    self.next_token();
                    self.parse_member_expression(left)?
                }
                _ => return Some(left),
            };
        }

        Some(left)
    }

    fn parse_prefix(&mut self) -> Option<Expression> {
        let position = self.current_token.position;
        match self.current_token.token_type {
            TokenType::Int => self.parse_integer_literal(),
            TokenType::Float => self.parse_float_literal(),
            TokenType::String => Some(Expression::StringLiteral {
                value: self.current_token.literal.clone(),
                position,
            }),
            TokenType::True => Some(Expression::BoolLiteral {
                value: true,
                position,
            }),
            TokenType::False => Some(Expression::BoolLiteral {
                value: false,
                position,
            }),
            TokenType::Nil => Some(Expression::NilLiteral { position }),
            TokenType::Ident => Some(Expression::Identifier {
                name: self.current_token.literal.clone(),
                position,
            }),
            TokenType::Minus => self.parse_prefix_expression(PrefixOp::Neg),
            TokenType::Bang | TokenType::Not => self.parse_prefix_expression(PrefixOp::Not),
            TokenType::LParen => self.parse_group_or_lambda(),
            TokenType::LBracket => self.parse_list_literal(),
            TokenType::LBrace => self.parse_kvc_literal(),
            TokenType::If => self.parse_if_expression(),
            _ => {
                self.errors.push(
                    Diagnostic::error(format!(
                        "unexpected token `{}`",
                        self.current_token.literal
                    ))
                    .with_code("E1000")
                    .with_position(position),
                );
                None
            }
        }
    }

    fn parse_integer_literal(&mut self) -> Option<Expression> {
        let position = self.current_token.position;
        let literal = &self.current_token.literal;
        if let Ok(value) = literal.parse::<i64>() {
            return Some(Expression::IntLiteral { value, position });
        }
        // Literals wider than i64 become arbitrary-precision integers.
        match BigInt::parse_bytes(literal.as_bytes(), 10) {
            Some(value) => Some(Expression::BigIntLiteral { value, position }),
            None => {
                self.errors.push(
                    Diagnostic::error(format!("invalid integer literal `{}`", literal))
                        .with_code("E1000")
                        .with_position(position),
                );
                None
            }
        }
    }

    fn parse_float_literal(&mut self) -> Option<Expression> {
        let position = self.current_token.position;
        match self.current_token.literal.parse::<f64>() {
            Ok(value) => Some(Expression::FloatLiteral { value, position }),
            Err(_) => {
                self.errors.push(
                    Diagnostic::error(format!(
                        "invalid number literal `{}`",
                        self.current_token.literal
                    ))
                    .with_code("E1000")
                    .with_position(position),
                );
                None
            }
        }
    }

    fn parse_prefix_expression(&mut self, operator: PrefixOp) -> Option<Expression> {
        let position = self.current_token.position;
        self.next_token();
        let right = self.parse_expression(Precedence::Prefix)?;
        Some(Expression::Prefix {
            operator,
            right: Box::new(right),
            position,
        })
    }

    fn parse_infix_expression(&mut self, left: Expression) -> Option<Expression> {
        let position = self.current_token.position;
        let operator = match self.current_token.token_type {
            TokenType::Plus => InfixOp::Add,
            TokenType::Minus => InfixOp::Sub,
            TokenType::Asterisk => InfixOp::Mul,
            TokenType::Slash => InfixOp::Div,
            TokenType::Percent => InfixOp::Mod,
            TokenType::Lt => InfixOp::Lt,
            TokenType::Lte => InfixOp::Lte,
            TokenType::Gt => InfixOp::Gt,
            TokenType::Gte => InfixOp::Gte,
            TokenType::Eq => InfixOp::Eq,
            TokenType::NotEq => InfixOp::NotEq,
            TokenType::And => InfixOp::And,
            TokenType::Or => InfixOp::Or,
            _ => return None,
        };
        let precedence = token_precedence(&self.current_token.token_type);
        self.next_token();
        let right = self.parse_expression(precedence)?;
        Some(Expression::Infix {
            operator,
            left: Box::new(left),
            right: Box::new(right),
            position,
        })
    }

    fn parse_group_or_lambda(&mut self) -> Option<Expression> {
        if let Some(lambda) = self.try_parse_lambda() {
            return Some(lambda);
        }
        self.next_token();
        let expr = self.parse_expression(Precedence::Lowest)?;
        if !self.expect_peek(TokenType::RParen) {
            return None;
        }
        Some(expr)
    }

    /// Attempt `(a, b) => body`; rolls back without reporting when the
    /// parenthesized form turns out to be a grouped expression.
    fn try_parse_lambda(&mut self) -> Option<Expression> {
        let snapshot = self.snapshot();
        let position = self.current_token.position;

        let mut parameters = Vec::new();
        if self.is_peek_token(TokenType::RParen) {
            self.next_token();
        } else {
            loop {
                if !self.is_peek_token(TokenType::Ident) {
                    self.restore(snapshot);
                    return None;
                }
                self.next_token();
                parameters.push(self.current_token.literal.clone());
                if self.is_peek_token(TokenType::Comma) {
                    self.next_token();
                    continue;
                }
                break;
            }
            if !self.is_peek_token(TokenType::RParen) {
                self.restore(snapshot);
                return None;
            }
            self.next_token();
        }

        if !self.is_peek_token(TokenType::FatArrow) {
            self.restore(snapshot);
            return None;
        }
        self.next_token();
        self.next_token();

        match self.parse_expression(Precedence::Lowest) {
            Some(body) => Some(Expression::Lambda {
                parameters,
                body: Box::new(body),
                position,
            }),
            None => {
                // The arrow made this unambiguously a lambda; keep the
                // reported body error instead of re-parsing as a group.
                None
            }
        }
    }

    fn parse_list_literal(&mut self) -> Option<Expression> {
        let position = self.current_token.position;
        let elements = self.parse_expression_list(TokenType::RBracket)?;
        Some(Expression::ListLiteral { elements, position })
    }

    fn parse_kvc_literal(&mut self) -> Option<Expression> {
        let position = self.current_token.position;
        let mut entries = Vec::new();

        while !self.is_peek_token(TokenType::RBrace) {
            if self.is_peek_token(TokenType::Eof) {
                self.errors.push(
                    Diagnostic::error("unterminated key-value block")
                        .with_code("E1000")
                        .with_position(position),
                );
                return None;
            }
            self.next_token();
            entries.push(self.parse_kvc_entry()?);
            if self.is_peek_token(TokenType::Comma) || self.is_peek_token(TokenType::Semicolon) {
                self.next_token();
            } else {
                break;
            }
        }

        if !self.expect_peek(TokenType::RBrace) {
            return None;
        }
        Some(Expression::KvcLiteral { entries, position })
    }

    fn parse_kvc_entry(&mut self) -> Option<KvcEntry> {
        let position = self.current_token.position;
        match self.current_token.token_type {
            TokenType::Return => {
                self.next_token();
                let value = self.parse_expression(Precedence::Lowest)?;
                Some(KvcEntry::Return { value, position })
            }
            TokenType::Ident | TokenType::String => {
                let key = self.current_token.literal.clone();
                if !self.expect_peek(TokenType::Colon) {
                    return None;
                }
                self.next_token();
                let value = self.parse_expression(Precedence::Lowest)?;
                Some(KvcEntry::Pair {
                    key,
                    value,
                    position,
                })
            }
            _ => {
                self.errors.push(
                    Diagnostic::error(format!(
                        "expected a key or `return`, found `{}`",
                        self.current_token.literal
                    ))
                    .with_code("E1000")
                    .with_position(position),
                );
                None
            }
        }
    }

    fn parse_if_expression(&mut self) -> Option<Expression> {
        let position = self.current_token.position;
        self.next_token();
        let condition = self.parse_expression(Precedence::Lowest)?;
        if !self.expect_peek(TokenType::Then) {
            return None;
        }
        self.next_token();
        let consequence = self.parse_expression(Precedence::Lowest)?;
        if !self.expect_peek(TokenType::Else) {
            return None;
        }
        self.next_token();
        let alternative = self.parse_expression(Precedence::Lowest)?;
        Some(Expression::If {
            condition: Box::new(condition),
            consequence: Box::new(consequence),
            alternative: Box::new(alternative),
            position,
        })
    }

    fn parse_call_expression(&mut self, callee: Expression) -> Option<Expression> {
        let position = self.current_token.position;
        let arguments = self.parse_expression_list(TokenType::RParen)?;
        Some(Expression::Call {
            callee: Box::new(callee),
            arguments,
            position,
        })
    }

    fn parse_index_expression(&mut self, receiver: Expression) -> Option<Expression> {
        let position = self.current_token.position;
        self.next_token();
        let index = self.parse_expression(Precedence::Lowest)?;
        if !self.expect_peek(TokenType::RBracket) {
            return None;
        }
        Some(Expression::Index {
            receiver: Box::new(receiver),
            index: Box::new(index),
            position,
        })
    }

    fn parse_member_expression(&mut self, receiver: Expression) -> Option<Expression> {
        let position = self.current_token.position;
        if !self.expect_peek(TokenType::Ident) {
            return None;
        }
        Some(Expression::Member {
            receiver: Box::new(receiver),
            key: self.current_token.literal.clone(),
            position,
        })
    }

    fn parse_expression_list(&mut self, end: TokenType) -> Option<Vec<Expression>> {
        let mut list = Vec::new();
        if self.is_peek_token(end) {
            self.next_token();
            return Some(list);
        }

        self.next_token();
        list.push(self.parse_expression(Precedence::Lowest)?);

        while self.is_peek_token(TokenType::Comma) {
            self.next_token();
            self.next_token();
            list.push(self.parse_expression(Precedence::Lowest)?);
        }

        if !self.expect_peek(end) {
            return None;
        }
        Some(list)
    }

    fn is_peek_token(&self, token_type: TokenType) -> bool {
        self.peek_token.token_type == token_type
    }

    fn expect_peek(&mut self, token_type: TokenType) -> bool {
        if self.is_peek_token(token_type) {
            self.next_token();
            true
        } else {
            self.errors.push(
                Diagnostic::error(format!(
                    "expected `{}`, found `{}`",
                    token_type, self.peek_token.literal
                ))
                .with_code("E1000")
                .with_position(self.peek_token.position),
            );
            false
        }
    }
}
