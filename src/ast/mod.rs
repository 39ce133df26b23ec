//=====================================================
// File: ast.rs
//=====================================================
// Author: ZobieLabs
// License: Duality Public License (DPL v1.0)
// Goal: Main-script Abstract Syntax Tree definitions
// Objective: Define AST node types for programs, declarations, expressions,
//            and type annotations of main scripts
//=====================================================

use crate::tokenizer::Position;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A type annotation with its source position
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeNode {
    pub ty: TypeExpr,
    pub position: Position,
}

/// Unresolved type annotation as written in the script
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TypeExpr {
    Named { name: String, args: Vec<TypeNode> },
    List(Box<TypeNode>),
    Function {
        params: Vec<TypeNode>,
        return_type: Box<TypeNode>,
    },
}

impl fmt::Display for TypeNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.ty {
            TypeExpr::Named { name, args } if args.is_empty() => f.write_str(name),
            TypeExpr::Named { name, args } => {
                let parts: Vec<String> = args.iter().map(ToString::to_string).collect();
                write!(f, "{}<{}>", name, parts.join(", "))
            }
            TypeExpr::List(inner) => write!(f, "[{}]", inner),
            TypeExpr::Function {
                params,
                return_type,
            } => {
                let parts: Vec<String> = params.iter().map(ToString::to_string).collect();
                write!(f, "fn({}) -> {}", parts.join(", "), return_type)
            }
        }
    }
}

/// Binary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinaryOp {
    Add,
    Subtract,
    Multiply,
    Divide,
    Equal,
    NotEqual,
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let symbol = match self {
            BinaryOp::Add => "+",
            BinaryOp::Subtract => "-",
            BinaryOp::Multiply => "*",
            BinaryOp::Divide => "/",
            BinaryOp::Equal => "==",
            BinaryOp::NotEqual => "!=",
        };
        f.write_str(symbol)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Literal {
    Integer(i64),
    String(String),
    Boolean(bool),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldInit {
    pub name: String,
    pub value: Expr,
    pub position: Position,
}

/// Expression nodes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    Literal {
        value: Literal,
        position: Position,
    },
    Identifier {
        name: String,
        position: Position,
    },
    /// `::name`, a reference to a declared function
    FunctionRef {
        name: String,
        position: Position,
    },
    Call {
        callee: Box<Expr>,
        args: Vec<Expr>,
        position: Position,
    },
    Member {
        object: Box<Expr>,
        property: String,
        position: Position,
    },
    StructLiteral {
        name: String,
        type_args: Vec<TypeNode>,
        fields: Vec<FieldInit>,
        position: Position,
    },
    List {
        elements: Vec<Expr>,
        position: Position,
    },
    Negate {
        operand: Box<Expr>,
        position: Position,
    },
    Binary {
        left: Box<Expr>,
        operator: BinaryOp,
        right: Box<Expr>,
        position: Position,
    },
}

impl Expr {
    pub fn position(&self) -> Position {
        match self {
            Expr::Literal { position, .. }
            | Expr::Identifier { position, .. }
            | Expr::FunctionRef { position, .. }
            | Expr::Call { position, .. }
            | Expr::Member { position, .. }
            | Expr::StructLiteral { position, .. }
            | Expr::List { position, .. }
            | Expr::Negate { position, .. }
            | Expr::Binary { position, .. } => *position,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportDecl {
    pub path: String,
    pub position: Position,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDecl {
    pub name: String,
    pub ty: TypeNode,
    pub position: Position,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructDecl {
    pub name: String,
    pub type_params: Vec<String>,
    pub fields: Vec<FieldDecl>,
    pub position: Position,
}

impl StructDecl {
    pub fn field(&self, name: &str) -> Option<&FieldDecl> {
        self.fields.iter().find(|field| field.name == name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    pub ty: TypeNode,
    pub position: Position,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionDecl {
    pub name: String,
    pub params: Vec<Parameter>,
    pub return_type: Option<TypeNode>,
    pub body: Vec<Stmt>,
    pub position: Position,
}

impl FunctionDecl {
    /// Structs declared directly inside the function body.
    pub fn local_structs(&self) -> impl Iterator<Item = &StructDecl> {
        self.body.iter().filter_map(|stmt| match stmt {
            Stmt::Struct { decl } => Some(decl),
            _ => None,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LetDecl {
    pub name: String,
    pub ty: Option<TypeNode>,
    pub initializer: Expr,
    pub position: Position,
}

/// Statement nodes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Stmt {
    Import { decl: ImportDecl },
    Struct { decl: StructDecl },
    Function { decl: FunctionDecl },
    Let { decl: LetDecl },
    Return { value: Option<Expr>, position: Position },
    Expression { expr: Expr, position: Position },
}

impl Stmt {
    pub fn position(&self) -> Position {
        match self {
            Stmt::Import { decl } => decl.position,
            Stmt::Struct { decl } => decl.position,
            Stmt::Function { decl } => decl.position,
            Stmt::Let { decl } => decl.position,
            Stmt::Return { position, .. } | Stmt::Expression { position, .. } => *position,
        }
    }
}

/// A parsed main script
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Program {
    pub statements: Vec<Stmt>,
    pub position: Position,
}

impl Program {
    pub fn new(statements: Vec<Stmt>, position: Position) -> Self {
        Self {
            statements,
            position,
        }
    }

    /// Find all import declarations in source order
    pub fn find_imports(&self) -> Vec<&ImportDecl> {
        let mut imports = Vec::new();
        for stmt in &self.statements {
            if let Stmt::Import { decl } = stmt {
                imports.push(decl);
            }
        }
        imports
    }

    /// Find all file-scope struct declarations
    pub fn find_structs(&self) -> Vec<&StructDecl> {
        let mut structs = Vec::new();
        for stmt in &self.statements {
            if let Stmt::Struct { decl } = stmt {
                structs.push(decl);
            }
        }
        structs
    }

    /// Find all file-scope function declarations
    pub fn find_functions(&self) -> Vec<&FunctionDecl> {
        let mut functions = Vec::new();
        for stmt in &self.statements {
            if let Stmt::Function { decl } = stmt {
                functions.push(decl);
            }
        }
        functions
    }

    /// The expression whose value becomes the script result, if any.
    pub fn result_expression(&self) -> Option<&Expr> {
        match self.statements.last() {
            Some(Stmt::Expression { expr, .. }) => Some(expr),
            _ => None,
        }
    }
}
