//=============================================
// solvra_main/parser.rs
//=============================================
// Author: SolvraOS Contributors
// License: Duality Public License (DPL v1.0)
// Goal: Main-script recursive descent parser implementation
// Objective: Transform token streams into AST nodes consumed by the resolver
// Formatting: Zobie.format (.solvraformat)
//=============================================

//=============================================
//            Section 1: Imports
//=============================================

use crate::ast::{
    BinaryOp, Expr, FieldDecl, FieldInit, FunctionDecl, ImportDecl, LetDecl, Literal, Parameter,
    Program, Stmt, StructDecl, TypeExpr, TypeNode,
};
use crate::tokenizer::{Position, Token, TokenKind};
use thiserror::Error;

//=============================================
//            Section 2: Parse Errors
//=============================================

/// Parser error types
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParseError {
    #[error("Expected {expected} but found {found} at line {}, column {}", .position.line, .position.column)]
    UnexpectedToken {
        expected: String,
        found: TokenKind,
        position: Position,
    },
    #[error("Invalid syntax: {message} at line {}, column {}", .position.line, .position.column)]
    InvalidSyntax { message: String, position: Position },
}

impl ParseError {
    pub fn position(&self) -> Position {
        match self {
            ParseError::UnexpectedToken { position, .. }
            | ParseError::InvalidSyntax { position, .. } => *position,
        }
    }
}

//=============================================
//            Section 3: Parser State
//=============================================

/// Where a statement is being parsed; imports are file-scope only,
/// `return` and nested declarations are function-scope only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StatementScope {
    File,
    Function,
}

/// Recursive descent parser for main scripts
pub struct Parser {
    tokens: Vec<Token>,
    current: usize,
    /// Recursion depth of the expression and type parsers.
    nesting: usize,
    /// Depth of the expression tree most recently returned.
    tree_depth: usize,
}

/// Deepest expression or type tree a script may contain. The checker and
/// the interpreter walk trees recursively and must fit a default thread
/// stack at this depth.
pub const MAX_NESTING_DEPTH: usize = 64;

const NESTING_TOO_DEEP: &str = "expression nesting too deep";

impl Parser {
    pub fn new(tokens: Vec<Token>) -> Self {
        Self {
            tokens,
            current: 0,
            nesting: 0,
            tree_depth: 0,
        }
    }

    //=============================================
    //            Section 4: Statement Parsing
    //=============================================

    /// Parse a complete script
    pub fn parse(&mut self) -> Result<Program, ParseError> {
        let position = self.current_position();
        let mut statements = Vec::new();
        while !self.is_at_end() {
            statements.push(self.parse_statement(StatementScope::File)?);
        }
        Ok(Program::new(statements, position))
    }

    fn parse_statement(&mut self, scope: StatementScope) -> Result<Stmt, ParseError> {
        match &self.peek().kind {
            TokenKind::Import if scope == StatementScope::File => self.parse_import_declaration(),
            TokenKind::Import => Err(ParseError::InvalidSyntax {
                message: "imports are only allowed at file scope".to_string(),
                position: self.current_position(),
            }),
            TokenKind::Struct => self.parse_struct_declaration(),
            TokenKind::Fn if scope == StatementScope::File => self.parse_function_declaration(),
            TokenKind::Fn => Err(ParseError::InvalidSyntax {
                message: "nested functions are not supported".to_string(),
                position: self.current_position(),
            }),
            TokenKind::Let => self.parse_let_declaration(),
            TokenKind::Return if scope == StatementScope::Function => self.parse_return_statement(),
            TokenKind::Return => Err(ParseError::InvalidSyntax {
                message: "'return' outside of a function".to_string(),
                position: self.current_position(),
            }),
            _ => self.parse_expression_statement(),
        }
    }

    /// Parse import declaration: import "path";
    fn parse_import_declaration(&mut self) -> Result<Stmt, ParseError> {
        let position = self.current_position();
        self.consume(&TokenKind::Import)?;
        let path = match &self.peek().kind {
            TokenKind::String(path) => path.clone(),
            other => {
                return Err(ParseError::UnexpectedToken {
                    expected: "script path string".to_string(),
                    found: other.clone(),
                    position: self.current_position(),
                });
            }
        };
        self.advance();
        self.consume_statement_terminator()?;
        Ok(Stmt::Import {
            decl: ImportDecl { path, position },
        })
    }

    /// Parse struct declaration: struct Name<T> { field: type, ... }
    fn parse_struct_declaration(&mut self) -> Result<Stmt, ParseError> {
        let position = self.current_position();
        self.consume(&TokenKind::Struct)?;
        let name = self.consume_identifier()?;

        let mut type_params = Vec::new();
        if self.check(&TokenKind::Less) {
            self.advance();
            loop {
                type_params.push(self.consume_identifier()?);
                if !self.check(&TokenKind::Comma) {
                    break;
                }
                self.advance();
            }
            self.consume(&TokenKind::Greater)?;
        }

        self.consume(&TokenKind::LeftBrace)?;
        let mut fields = Vec::new();
        while !self.check(&TokenKind::RightBrace) {
            let field_pos = self.current_position();
            let field_name = self.consume_identifier()?;
            self.consume(&TokenKind::Colon)?;
            let ty = self.parse_type()?;
            fields.push(FieldDecl {
                name: field_name,
                ty,
                position: field_pos,
            });
            if !self.check(&TokenKind::Comma) {
                break;
            }
            self.advance();
        }
        self.consume(&TokenKind::RightBrace)?;

        Ok(Stmt::Struct {
            decl: StructDecl {
                name,
                type_params,
                fields,
                position,
            },
        })
    }

    /// Parse function declaration: fn name(params) [-> return_type] { body }
    fn parse_function_declaration(&mut self) -> Result<Stmt, ParseError> {
        let position = self.current_position();
        self.consume(&TokenKind::Fn)?;
        let name = self.consume_identifier()?;

        self.consume(&TokenKind::LeftParen)?;
        let mut params = Vec::new();
        if !self.check(&TokenKind::RightParen) {
            loop {
                let param_pos = self.current_position();
                let param_name = self.consume_identifier()?;
                self.consume(&TokenKind::Colon)?;
                let ty = self.parse_type()?;
                params.push(Parameter {
                    name: param_name,
                    ty,
                    position: param_pos,
                });
                if !self.check(&TokenKind::Comma) {
                    break;
                }
                self.advance();
            }
        }
        self.consume(&TokenKind::RightParen)?;

        let return_type = if self.check(&TokenKind::Arrow) {
            self.advance();
            Some(self.parse_type()?)
        } else {
            None
        };

        self.consume(&TokenKind::LeftBrace)?;
        let mut body = Vec::new();
        while !self.check(&TokenKind::RightBrace) {
            if self.is_at_end() {
                return Err(ParseError::UnexpectedToken {
                    expected: "'}' to close function body".to_string(),
                    found: TokenKind::Eof,
                    position: self.current_position(),
                });
            }
            body.push(self.parse_statement(StatementScope::Function)?);
        }
        self.consume(&TokenKind::RightBrace)?;

        Ok(Stmt::Function {
            decl: FunctionDecl {
                name,
                params,
                return_type,
                body,
                position,
            },
        })
    }

    /// Parse variable declaration: let name [: type] = value;
    fn parse_let_declaration(&mut self) -> Result<Stmt, ParseError> {
        let position = self.current_position();
        self.consume(&TokenKind::Let)?;
        let name = self.consume_identifier()?;
        let ty = if self.check(&TokenKind::Colon) {
            self.advance();
            Some(self.parse_type()?)
        } else {
            None
        };
        if !self.check(&TokenKind::Equal) {
            return Err(ParseError::InvalidSyntax {
                message: format!("'let {}' requires an initializer", name),
                position: self.current_position(),
            });
        }
        self.advance();
        let initializer = self.parse_expression()?;
        self.consume_statement_terminator()?;
        Ok(Stmt::Let {
            decl: LetDecl {
                name,
                ty,
                initializer,
                position,
            },
        })
    }

    fn parse_return_statement(&mut self) -> Result<Stmt, ParseError> {
        let position = self.current_position();
        self.consume(&TokenKind::Return)?;
        let value = if self.check(&TokenKind::Semicolon) || self.check(&TokenKind::RightBrace) {
            None
        } else {
            Some(self.parse_expression()?)
        };
        self.consume_statement_terminator()?;
        Ok(Stmt::Return { value, position })
    }

    fn parse_expression_statement(&mut self) -> Result<Stmt, ParseError> {
        let position = self.current_position();
        let expr = self.parse_expression()?;
        self.consume_statement_terminator()?;
        Ok(Stmt::Expression { expr, position })
    }

    //=============================================
    //            Section 5: Expression Parsing
    //=============================================

    // Parsing stops at the first error, so the depth counters are only
    // unwound on success.
    fn enter(&mut self) -> Result<(), ParseError> {
        if self.nesting >= MAX_NESTING_DEPTH {
            return Err(ParseError::InvalidSyntax {
                message: NESTING_TOO_DEEP.to_string(),
                position: self.current_position(),
            });
        }
        self.nesting += 1;
        Ok(())
    }

    fn leave(&mut self) {
        self.nesting -= 1;
    }

    /// Record a node built over children at most `child_depth` deep.
    fn record_depth(&mut self, child_depth: usize, position: Position) -> Result<(), ParseError> {
        let depth = child_depth + 1;
        if depth > MAX_NESTING_DEPTH {
            return Err(ParseError::InvalidSyntax {
                message: NESTING_TOO_DEEP.to_string(),
                position,
            });
        }
        self.tree_depth = depth;
        Ok(())
    }

    fn parse_expression(&mut self) -> Result<Expr, ParseError> {
        self.enter()?;
        let expr = self.parse_equality()?;
        self.leave();
        Ok(expr)
    }

    fn parse_equality(&mut self) -> Result<Expr, ParseError> {
        self.parse_binary_level(
            &[TokenKind::EqualEqual, TokenKind::NotEqual],
            Self::parse_term,
        )
    }

    fn parse_term(&mut self) -> Result<Expr, ParseError> {
        self.parse_binary_level(&[TokenKind::Plus, TokenKind::Minus], Self::parse_factor)
    }

    fn parse_factor(&mut self) -> Result<Expr, ParseError> {
        self.parse_binary_level(&[TokenKind::Star, TokenKind::Slash], Self::parse_unary)
    }

    /// Fold a left-associative chain; every fold deepens the tree by one.
    fn parse_binary_level(
        &mut self,
        kinds: &[TokenKind],
        operand: fn(&mut Self) -> Result<Expr, ParseError>,
    ) -> Result<Expr, ParseError> {
        let mut expr = operand(self)?;
        while let Some(operator) = self.match_binary_op(kinds) {
            let left_depth = self.tree_depth;
            let right = operand(self)?;
            self.record_depth(left_depth.max(self.tree_depth), right.position())?;
            expr = Self::binary(expr, operator, right);
        }
        Ok(expr)
    }

    fn parse_unary(&mut self) -> Result<Expr, ParseError> {
        if self.check(&TokenKind::Minus) {
            let position = self.current_position();
            self.advance();
            self.enter()?;
            let operand = self.parse_unary()?;
            self.leave();
            self.record_depth(self.tree_depth, position)?;
            return Ok(Expr::Negate {
                operand: Box::new(operand),
                position,
            });
        }
        self.parse_call()
    }

    fn parse_call(&mut self) -> Result<Expr, ParseError> {
        let mut expr = self.parse_primary()?;
        loop {
            if self.check(&TokenKind::LeftParen) {
                let position = self.current_position();
                self.advance();
                let mut depth = self.tree_depth;
                let mut args = Vec::new();
                if !self.check(&TokenKind::RightParen) {
                    loop {
                        args.push(self.parse_expression()?);
                        depth = depth.max(self.tree_depth);
                        if !self.check(&TokenKind::Comma) {
                            break;
                        }
                        self.advance();
                    }
                }
                self.consume(&TokenKind::RightParen)?;
                self.record_depth(depth, position)?;
                expr = Expr::Call {
                    callee: Box::new(expr),
                    args,
                    position,
                };
            } else if self.check(&TokenKind::Dot) {
                let position = self.current_position();
                self.advance();
                let property = self.consume_identifier()?;
                self.record_depth(self.tree_depth, position)?;
                expr = Expr::Member {
                    object: Box::new(expr),
                    property,
                    position,
                };
            } else {
                break;
            }
        }
        Ok(expr)
    }

    /// Parse primary expression: literals, identifiers, references, struct literals
    fn parse_primary(&mut self) -> Result<Expr, ParseError> {
        let token = self.peek().clone();
        let position = token.position;
        self.tree_depth = 1;

        match token.kind {
            TokenKind::Integer(n) => {
                self.advance();
                Ok(Expr::Literal {
                    value: Literal::Integer(n),
                    position,
                })
            }
            TokenKind::String(s) => {
                self.advance();
                Ok(Expr::Literal {
                    value: Literal::String(s),
                    position,
                })
            }
            TokenKind::Boolean(b) => {
                self.advance();
                Ok(Expr::Literal {
                    value: Literal::Boolean(b),
                    position,
                })
            }
            TokenKind::DoubleColon => {
                self.advance();
                let name = self.consume_identifier()?;
                Ok(Expr::FunctionRef { name, position })
            }
            TokenKind::Identifier(name) => {
                self.advance();
                if self.check(&TokenKind::LeftBrace) || self.check(&TokenKind::Less) {
                    self.parse_struct_literal(name, position)
                } else {
                    Ok(Expr::Identifier { name, position })
                }
            }
            TokenKind::LeftParen => {
                self.advance();
                let expr = self.parse_expression()?;
                self.consume(&TokenKind::RightParen)?;
                Ok(expr)
            }
            TokenKind::LeftBracket => {
                self.advance();
                let mut depth = 0;
                let mut elements = Vec::new();
                if !self.check(&TokenKind::RightBracket) {
                    loop {
                        elements.push(self.parse_expression()?);
                        depth = depth.max(self.tree_depth);
                        if !self.check(&TokenKind::Comma) {
                            break;
                        }
                        self.advance();
                    }
                }
                self.consume(&TokenKind::RightBracket)?;
                self.record_depth(depth, position)?;
                Ok(Expr::List { elements, position })
            }
            other => Err(ParseError::UnexpectedToken {
                expected: "expression".to_string(),
                found: other,
                position,
            }),
        }
    }

    /// Parse struct literal after its name: [<types>] { field: value, ... }
    fn parse_struct_literal(&mut self, name: String, position: Position) -> Result<Expr, ParseError> {
        let type_args = if self.check(&TokenKind::Less) {
            self.parse_type_arguments()?
        } else {
            Vec::new()
        };

        self.consume(&TokenKind::LeftBrace)?;
        let mut depth = 0;
        let mut fields = Vec::new();
        while !self.check(&TokenKind::RightBrace) {
            let field_pos = self.current_position();
            let field_name = self.consume_identifier()?;
            self.consume(&TokenKind::Colon)?;
            let value = self.parse_expression()?;
            depth = depth.max(self.tree_depth);
            fields.push(FieldInit {
                name: field_name,
                value,
                position: field_pos,
            });
            if !self.check(&TokenKind::Comma) {
                break;
            }
            self.advance();
        }
        self.consume(&TokenKind::RightBrace)?;
        self.record_depth(depth, position)?;

        Ok(Expr::StructLiteral {
            name,
            type_args,
            fields,
            position,
        })
    }

    // Utility: match binary operator and return BinaryOp
    fn match_binary_op(&mut self, kinds: &[TokenKind]) -> Option<BinaryOp> {
        for kind in kinds {
            if self.check(kind) {
                self.advance();
                return Some(match kind {
                    TokenKind::Plus => BinaryOp::Add,
                    TokenKind::Minus => BinaryOp::Subtract,
                    TokenKind::Star => BinaryOp::Multiply,
                    TokenKind::Slash => BinaryOp::Divide,
                    TokenKind::EqualEqual => BinaryOp::Equal,
                    TokenKind::NotEqual => BinaryOp::NotEqual,
                    _ => continue,
                });
            }
        }
        None
    }

    fn binary(left: Expr, operator: BinaryOp, right: Expr) -> Expr {
        let position = left.position();
        Expr::Binary {
            left: Box::new(left),
            operator,
            right: Box::new(right),
            position,
        }
    }

    //=============================================
    //            Section 6: Type Parsing
    //=============================================

    fn parse_type(&mut self) -> Result<TypeNode, ParseError> {
        self.enter()?;
        let node = self.parse_type_node()?;
        self.leave();
        Ok(node)
    }

    fn parse_type_node(&mut self) -> Result<TypeNode, ParseError> {
        let position = self.current_position();
        match self.peek().kind.clone() {
            TokenKind::LeftBracket => {
                self.advance();
                let inner = self.parse_type()?;
                self.consume(&TokenKind::RightBracket)?;
                Ok(TypeNode {
                    ty: TypeExpr::List(Box::new(inner)),
                    position,
                })
            }
            TokenKind::Fn => {
                self.advance();
                self.consume(&TokenKind::LeftParen)?;
                let mut params = Vec::new();
                if !self.check(&TokenKind::RightParen) {
                    loop {
                        params.push(self.parse_type()?);
                        if !self.check(&TokenKind::Comma) {
                            break;
                        }
                        self.advance();
                    }
                }
                self.consume(&TokenKind::RightParen)?;
                self.consume(&TokenKind::Arrow)?;
                let return_type = self.parse_type()?;
                Ok(TypeNode {
                    ty: TypeExpr::Function {
                        params,
                        return_type: Box::new(return_type),
                    },
                    position,
                })
            }
            TokenKind::Identifier(name) => {
                self.advance();
                let args = if self.check(&TokenKind::Less) {
                    self.parse_type_arguments()?
                } else {
                    Vec::new()
                };
                Ok(TypeNode {
                    ty: TypeExpr::Named { name, args },
                    position,
                })
            }
            other => Err(ParseError::UnexpectedToken {
                expected: "type annotation".to_string(),
                found: other,
                position,
            }),
        }
    }

    fn parse_type_arguments(&mut self) -> Result<Vec<TypeNode>, ParseError> {
        self.consume(&TokenKind::Less)?;
        let mut args = Vec::new();
        loop {
            args.push(self.parse_type()?);
            if !self.check(&TokenKind::Comma) {
                break;
            }
            self.advance();
        }
        self.consume(&TokenKind::Greater)?;
        Ok(args)
    }

    //=============================================
    //            Section 7: Token Navigation
    //=============================================

    fn peek(&self) -> &Token {
        let index = self.current.min(self.tokens.len().saturating_sub(1));
        &self.tokens[index]
    }

    fn advance(&mut self) {
        if !self.is_at_end() {
            self.current += 1;
        }
    }

    fn check(&self, kind: &TokenKind) -> bool {
        &self.peek().kind == kind
    }

    fn consume(&mut self, kind: &TokenKind) -> Result<(), ParseError> {
        if self.check(kind) {
            self.advance();
            Ok(())
        } else {
            Err(ParseError::UnexpectedToken {
                expected: kind.to_string(),
                found: self.peek().kind.clone(),
                position: self.current_position(),
            })
        }
    }

    fn consume_identifier(&mut self) -> Result<String, ParseError> {
        match &self.peek().kind {
            TokenKind::Identifier(name) => {
                let name = name.clone();
                self.advance();
                Ok(name)
            }
            other => Err(ParseError::UnexpectedToken {
                expected: "identifier".to_string(),
                found: other.clone(),
                position: self.current_position(),
            }),
        }
    }

    // A statement ends with ';', or implicitly before '}' or end of input
    fn consume_statement_terminator(&mut self) -> Result<(), ParseError> {
        if self.check(&TokenKind::Semicolon) {
            self.advance();
            Ok(())
        } else if self.check(&TokenKind::RightBrace) || self.is_at_end() {
            Ok(())
        } else {
            Err(ParseError::UnexpectedToken {
                expected: "';'".to_string(),
                found: self.peek().kind.clone(),
                position: self.current_position(),
            })
        }
    }

    fn is_at_end(&self) -> bool {
        matches!(self.peek().kind, TokenKind::Eof)
    }

    fn current_position(&self) -> Position {
        self.peek().position
    }
}

//=============================================
// End Of solvra_main/parser.rs
//=============================================
