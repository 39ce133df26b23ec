//=====================================================
// File: resolver.rs
//=====================================================
// Author: ZobieLabs
// License: Duality Public License (DPL v1.0)
// Goal: Name and type resolution for main-script graphs
// Objective: Resolve struct, function and binding names across imports and
//            check that every expression is used at a compatible type
//=====================================================

use crate::ast::{
    BinaryOp, Expr, FieldInit, FunctionDecl, LetDecl, Literal, Stmt, StructDecl, TypeExpr, TypeNode,
};
use crate::diagnostics::{Diagnostic, ErrorCode};
use crate::interpreter::{ARGS_BINDING, Builtin};
use crate::modules::{LoadedScript, ScriptGraph};
use crate::tokenizer::Position;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::Path;
use thiserror::Error;

/// Identity of a struct: the script declaring it, the function enclosing
/// it when local, and its name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TypeId {
    pub script: String,
    pub function: Option<String>,
    pub name: String,
}

impl TypeId {
    fn new(script: &str, function: Option<&str>, name: &str) -> Self {
        Self {
            script: script.to_string(),
            function: function.map(str::to_string),
            name: name.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Type {
    Int,
    Str,
    Bool,
    Unit,
    Any,
    List(Box<Type>),
    Struct { id: TypeId, args: Vec<Type> },
    /// A struct's type parameter, inside its own field declarations
    Param(String),
    Function { params: Vec<Type>, ret: Box<Type> },
}

impl Type {
    fn primitive(name: &str) -> Option<Type> {
        match name {
            "int" => Some(Type::Int),
            "string" => Some(Type::Str),
            "bool" => Some(Type::Bool),
            "unit" => Some(Type::Unit),
            "any" => Some(Type::Any),
            _ => None,
        }
    }

    /// Whether a value of type `actual` may be used where `self` is expected.
    pub fn accepts(&self, actual: &Type) -> bool {
        match (self, actual) {
            (Type::Any, _) | (_, Type::Any) => true,
            (Type::Param(_), _) | (_, Type::Param(_)) => true,
            (Type::List(expected), Type::List(actual)) => expected.accepts(actual),
            (
                Type::Struct { id, args },
                Type::Struct {
                    id: actual_id,
                    args: actual_args,
                },
            ) => {
                id == actual_id
                    && args.len() == actual_args.len()
                    && args.iter().zip(actual_args).all(|(e, a)| e.accepts(a))
            }
            (
                Type::Function { params, ret },
                Type::Function {
                    params: actual_params,
                    ret: actual_ret,
                },
            ) => {
                params.len() == actual_params.len()
                    && params.iter().zip(actual_params).all(|(e, a)| a.accepts(e))
                    && ret.accepts(actual_ret)
            }
            (expected, actual) => expected == actual,
        }
    }

    fn substitute(&self, bindings: &HashMap<String, Type>) -> Type {
        match self {
            Type::Param(name) => bindings.get(name).cloned().unwrap_or(Type::Any),
            Type::List(inner) => Type::List(Box::new(inner.substitute(bindings))),
            Type::Struct { id, args } => Type::Struct {
                id: id.clone(),
                args: args.iter().map(|arg| arg.substitute(bindings)).collect(),
            },
            Type::Function { params, ret } => Type::Function {
                params: params.iter().map(|p| p.substitute(bindings)).collect(),
                ret: Box::new(ret.substitute(bindings)),
            },
            other => other.clone(),
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Int => f.write_str("int"),
            Type::Str => f.write_str("string"),
            Type::Bool => f.write_str("bool"),
            Type::Unit => f.write_str("unit"),
            Type::Any => f.write_str("any"),
            Type::List(inner) => write!(f, "[{}]", inner),
            Type::Struct { id, args } if args.is_empty() => f.write_str(&id.name),
            Type::Struct { id, args } => {
                let parts: Vec<String> = args.iter().map(ToString::to_string).collect();
                write!(f, "{}<{}>", id.name, parts.join(", "))
            }
            Type::Param(name) => f.write_str(name),
            Type::Function { params, ret } => {
                let parts: Vec<String> = params.iter().map(ToString::to_string).collect();
                write!(f, "fn({}) -> {}", parts.join(", "), ret)
            }
        }
    }
}

pub fn builtin_signature(builtin: Builtin) -> Type {
    let (params, ret) = match builtin {
        Builtin::Println => (vec![Type::Any], Type::Unit),
        Builtin::Len => (vec![Type::List(Box::new(Type::Any))], Type::Int),
        Builtin::Fail => (vec![Type::Str], Type::Any),
    };
    Type::Function {
        params,
        ret: Box::new(ret),
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CheckError {
    #[error("Unresolved type '{name}'")]
    UnresolvedType { name: String, position: Position },
    #[error("Unresolved name '{name}'")]
    UnresolvedName { name: String, position: Position },
    #[error("Ambiguous reference '{name}': declared by {candidates}")]
    Ambiguous {
        name: String,
        candidates: String,
        position: Position,
    },
    #[error("Duplicate declaration of '{name}'")]
    DuplicateDeclaration { name: String, position: Position },
    #[error("Type '{name}' expects {expected} type argument(s), found {found}")]
    GenericArity {
        name: String,
        expected: usize,
        found: usize,
        position: Position,
    },
    #[error("Type '{ty}' has no field '{field}'")]
    UnknownField {
        ty: String,
        field: String,
        position: Position,
    },
    #[error("Missing field '{field}' in '{ty}' literal")]
    MissingField {
        ty: String,
        field: String,
        position: Position,
    },
    #[error("Function '{name}' expects {expected} argument(s), found {found}")]
    CallArity {
        name: String,
        expected: usize,
        found: usize,
        position: Position,
    },
    #[error("Type mismatch: expected {expected}, found {found}")]
    TypeMismatch {
        expected: String,
        found: String,
        position: Position,
    },
    #[error("Value of type {found} is not callable")]
    NotCallable { found: String, position: Position },
    #[error("Operator '{operator}' cannot be applied to {operands}")]
    InvalidOperands {
        operator: String,
        operands: String,
        position: Position,
    },
}

impl CheckError {
    pub fn position(&self) -> Position {
        match self {
            CheckError::UnresolvedType { position, .. }
            | CheckError::UnresolvedName { position, .. }
            | CheckError::Ambiguous { position, .. }
            | CheckError::DuplicateDeclaration { position, .. }
            | CheckError::GenericArity { position, .. }
            | CheckError::UnknownField { position, .. }
            | CheckError::MissingField { position, .. }
            | CheckError::CallArity { position, .. }
            | CheckError::TypeMismatch { position, .. }
            | CheckError::NotCallable { position, .. }
            | CheckError::InvalidOperands { position, .. } => *position,
        }
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            CheckError::CallArity { .. }
            | CheckError::NotCallable { .. }
            | CheckError::InvalidOperands { .. } => ErrorCode::InvalidOperation,
            _ => ErrorCode::TypeMismatch,
        }
    }

    pub fn to_diagnostic(&self, script: &Path) -> Diagnostic {
        let position = self.position();
        Diagnostic::error(self.code(), self.to_string()).at(script, position.line, position.column)
    }
}

/// Checks every script of a loaded graph; returns one error diagnostic per
/// problem found, empty when the graph is well typed.
pub fn check_graph(graph: &ScriptGraph, builtins: &[Builtin], bind_args: bool) -> Vec<Diagnostic> {
    let mut checker = Checker::new(graph, builtins, bind_args);
    checker.collect_structs();
    checker.resolve_struct_fields();
    checker.check_scripts();
    checker.errors
}

#[derive(Debug, Clone)]
struct StructInfo {
    type_params: Vec<String>,
    fields: Vec<(String, Type)>,
}

impl StructInfo {
    fn field(&self, name: &str) -> Option<&Type> {
        self.fields
            .iter()
            .find(|(field, _)| field == name)
            .map(|(_, ty)| ty)
    }
}

struct PendingStruct<'g> {
    id: TypeId,
    script: &'g LoadedScript,
    function: Option<&'g FunctionDecl>,
    decl: &'g StructDecl,
}

#[derive(Clone, Copy)]
struct Context<'g> {
    script: &'g LoadedScript,
    function: Option<&'g FunctionDecl>,
    type_params: &'g [String],
}

impl<'g> Context<'g> {
    fn top_level(script: &'g LoadedScript) -> Self {
        Self {
            script,
            function: None,
            type_params: &[],
        }
    }

    fn function(script: &'g LoadedScript, function: &'g FunctionDecl) -> Self {
        Self {
            script,
            function: Some(function),
            type_params: &[],
        }
    }
}

type FunctionKey = (String, String);
type Scope = HashMap<String, Type>;

struct Checker<'g> {
    graph: &'g ScriptGraph,
    builtins: Vec<Builtin>,
    bind_args: bool,
    visible: HashMap<String, Vec<String>>,
    pending: Vec<PendingStruct<'g>>,
    structs: HashMap<TypeId, StructInfo>,
    signatures: HashMap<FunctionKey, Type>,
    in_progress: HashSet<FunctionKey>,
    globals: HashMap<String, Scope>,
    errors: Vec<Diagnostic>,
}

impl<'g> Checker<'g> {
    fn new(graph: &'g ScriptGraph, builtins: &[Builtin], bind_args: bool) -> Self {
        let visible = graph
            .order
            .iter()
            .map(|id| {
                let mut imports = graph.transitive_imports(id);
                imports.sort();
                (id.clone(), imports)
            })
            .collect();
        Self {
            graph,
            builtins: builtins.to_vec(),
            bind_args,
            visible,
            pending: Vec::new(),
            structs: HashMap::new(),
            signatures: HashMap::new(),
            in_progress: HashSet::new(),
            globals: HashMap::new(),
            errors: Vec::new(),
        }
    }

    fn report(&mut self, script: &LoadedScript, error: CheckError) {
        self.errors.push(error.to_diagnostic(&script.path));
    }

    fn visible_from(&self, script: &str) -> &[String] {
        self.visible.get(script).map(Vec::as_slice).unwrap_or(&[])
    }

    //=============================================
    //            Section 1: Declarations
    //=============================================

    fn collect_structs(&mut self) {
        let graph = self.graph;
        for id in &graph.order {
            let Some(script) = graph.script(id) else {
                continue;
            };
            let mut file_scope = HashSet::new();
            for decl in script.program.find_structs() {
                self.register_struct(script, None, decl, &mut file_scope);
            }
            let mut functions = HashSet::new();
            for function in script.program.find_functions() {
                if !functions.insert(function.name.as_str()) {
                    self.report(
                        script,
                        CheckError::DuplicateDeclaration {
                            name: function.name.clone(),
                            position: function.position,
                        },
                    );
                    continue;
                }
                let mut local_scope = HashSet::new();
                for decl in function.local_structs() {
                    self.register_struct(script, Some(function), decl, &mut local_scope);
                }
            }
        }
    }

    fn register_struct(
        &mut self,
        script: &'g LoadedScript,
        function: Option<&'g FunctionDecl>,
        decl: &'g StructDecl,
        seen: &mut HashSet<String>,
    ) {
        if !seen.insert(decl.name.clone()) {
            self.report(
                script,
                CheckError::DuplicateDeclaration {
                    name: decl.name.clone(),
                    position: decl.position,
                },
            );
            return;
        }
        let id = TypeId::new(&script.id, function.map(|f| f.name.as_str()), &decl.name);
        self.structs.insert(
            id.clone(),
            StructInfo {
                type_params: decl.type_params.clone(),
                fields: Vec::new(),
            },
        );
        self.pending.push(PendingStruct {
            id,
            script,
            function,
            decl,
        });
    }

    fn resolve_struct_fields(&mut self) {
        for entry in std::mem::take(&mut self.pending) {
            let decl = entry.decl;
            let ctx = Context {
                script: entry.script,
                function: entry.function,
                type_params: &decl.type_params,
            };
            let mut fields = Vec::with_capacity(decl.fields.len());
            for field in &decl.fields {
                if fields.iter().any(|(name, _)| name == &field.name) {
                    self.report(
                        entry.script,
                        CheckError::DuplicateDeclaration {
                            name: field.name.clone(),
                            position: field.position,
                        },
                    );
                    continue;
                }
                let ty = self.resolve_or_report(&field.ty, ctx);
                fields.push((field.name.clone(), ty));
            }
            if let Some(info) = self.structs.get_mut(&entry.id) {
                info.fields = fields;
            }
        }
    }

    //=============================================
    //            Section 2: Type resolution
    //=============================================

    fn resolve_or_report(&mut self, node: &TypeNode, ctx: Context<'g>) -> Type {
        match self.resolve_type(node, ctx) {
            Ok(ty) => ty,
            Err(error) => {
                self.report(ctx.script, error);
                Type::Any
            }
        }
    }

    fn resolve_type(&self, node: &TypeNode, ctx: Context<'g>) -> Result<Type, CheckError> {
        match &node.ty {
            TypeExpr::List(inner) => Ok(Type::List(Box::new(self.resolve_type(inner, ctx)?))),
            TypeExpr::Function {
                params,
                return_type,
            } => {
                let params = params
                    .iter()
                    .map(|param| self.resolve_type(param, ctx))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Type::Function {
                    params,
                    ret: Box::new(self.resolve_type(return_type, ctx)?),
                })
            }
            TypeExpr::Named { name, args } => {
                if let Some(primitive) = Type::primitive(name) {
                    if !args.is_empty() {
                        return Err(CheckError::GenericArity {
                            name: name.clone(),
                            expected: 0,
                            found: args.len(),
                            position: node.position,
                        });
                    }
                    return Ok(primitive);
                }
                if args.is_empty() && ctx.type_params.iter().any(|param| param == name) {
                    return Ok(Type::Param(name.clone()));
                }
                let id = self.lookup_type(name, ctx, node.position)?;
                let arity = self
                    .structs
                    .get(&id)
                    .map_or(0, |info| info.type_params.len());
                let args = if args.is_empty() {
                    vec![Type::Any; arity]
                } else if args.len() != arity {
                    return Err(CheckError::GenericArity {
                        name: name.clone(),
                        expected: arity,
                        found: args.len(),
                        position: node.position,
                    });
                } else {
                    args.iter()
                        .map(|arg| self.resolve_type(arg, ctx))
                        .collect::<Result<Vec<_>, _>>()?
                };
                Ok(Type::Struct { id, args })
            }
        }
    }

    // Local structs shadow file-scope ones, which shadow imported ones.
    fn lookup_type(&self, name: &str, ctx: Context<'g>, position: Position) -> Result<TypeId, CheckError> {
        if let Some(function) = ctx.function {
            if function.local_structs().any(|decl| decl.name == name) {
                return Ok(TypeId::new(&ctx.script.id, Some(&function.name), name));
            }
        }
        if ctx.script.program.find_structs().iter().any(|decl| decl.name == name) {
            return Ok(TypeId::new(&ctx.script.id, None, name));
        }

        let mut found: Vec<TypeId> = self
            .visible_from(&ctx.script.id)
            .iter()
            .filter(|import| {
                self.graph.script(import).is_some_and(|script| {
                    script.program.find_structs().iter().any(|decl| decl.name == name)
                })
            })
            .map(|import| TypeId::new(import, None, name))
            .collect();

        match found.len() {
            0 => Err(CheckError::UnresolvedType {
                name: name.to_string(),
                position,
            }),
            1 => Ok(found.remove(0)),
            _ => Err(CheckError::Ambiguous {
                name: name.to_string(),
                candidates: found
                    .iter()
                    .map(|id| id.script.as_str())
                    .collect::<Vec<_>>()
                    .join(", "),
                position,
            }),
        }
    }

    fn lookup_function(
        &self,
        name: &str,
        script: &'g LoadedScript,
        position: Position,
    ) -> Result<Option<(&'g LoadedScript, &'g FunctionDecl)>, CheckError> {
        let graph = self.graph;
        if let Some(decl) = script
            .program
            .find_functions()
            .into_iter()
            .find(|decl| decl.name == name)
        {
            return Ok(Some((script, decl)));
        }

        let mut found = Vec::new();
        for import in self.visible_from(&script.id) {
            let Some(imported) = graph.script(import) else {
                continue;
            };
            if let Some(decl) = imported
                .program
                .find_functions()
                .into_iter()
                .find(|decl| decl.name == name)
            {
                found.push((imported, decl));
            }
        }
        if found.len() > 1 {
            return Err(CheckError::Ambiguous {
                name: name.to_string(),
                candidates: found
                    .iter()
                    .map(|(script, _)| script.id.as_str())
                    .collect::<Vec<_>>()
                    .join(", "),
                position,
            });
        }
        Ok(found.pop())
    }

    fn lookup_imported_global(
        &self,
        name: &str,
        script: &str,
        position: Position,
    ) -> Result<Option<Type>, CheckError> {
        let found: Vec<(&String, &Type)> = self
            .visible_from(script)
            .iter()
            .filter_map(|import| {
                self.globals
                    .get(import)
                    .and_then(|scope| scope.get(name))
                    .map(|ty| (import, ty))
            })
            .collect();
        match found.as_slice() {
            [] => Ok(None),
            [(_, ty)] => Ok(Some((*ty).clone())),
            _ => Err(CheckError::Ambiguous {
                name: name.to_string(),
                candidates: found
                    .iter()
                    .map(|(import, _)| import.as_str())
                    .collect::<Vec<_>>()
                    .join(", "),
                position,
            }),
        }
    }

    fn lookup_callable(
        &mut self,
        name: &str,
        ctx: Context<'g>,
        position: Position,
    ) -> Result<Option<Type>, CheckError> {
        if let Some((script, decl)) = self.lookup_function(name, ctx.script, position)? {
            return Ok(Some(self.ensure_function(script, decl)));
        }
        Ok(Builtin::from_name(name)
            .filter(|builtin| self.builtins.contains(builtin))
            .map(builtin_signature))
    }

    //=============================================
    //            Section 3: Functions
    //=============================================

    fn declared_signature(&self, decl: &FunctionDecl, ctx: Context<'g>) -> Type {
        let params = decl
            .params
            .iter()
            .map(|param| self.resolve_type(&param.ty, ctx).unwrap_or(Type::Any))
            .collect();
        let ret = decl
            .return_type
            .as_ref()
            .and_then(|node| self.resolve_type(node, ctx).ok())
            .unwrap_or(Type::Any);
        Type::Function {
            params,
            ret: Box::new(ret),
        }
    }

    /// Checks a function body once and returns its signature; a function
    /// without a declared return type gets the type of its `return`s.
    fn ensure_function(&mut self, script: &'g LoadedScript, decl: &'g FunctionDecl) -> Type {
        let key = (script.id.clone(), decl.name.clone());
        if let Some(signature) = self.signatures.get(&key) {
            return signature.clone();
        }
        let ctx = Context::function(script, decl);
        if !self.in_progress.insert(key.clone()) {
            return self.declared_signature(decl, ctx);
        }

        let mut scope = Scope::new();
        let mut params = Vec::with_capacity(decl.params.len());
        for param in &decl.params {
            let ty = self.resolve_or_report(&param.ty, ctx);
            scope.insert(param.name.clone(), ty.clone());
            params.push(ty);
        }
        let declared = decl
            .return_type
            .as_ref()
            .map(|node| self.resolve_or_report(node, ctx));

        let mut scopes = vec![scope];
        let mut returns = Vec::new();
        for stmt in &decl.body {
            self.check_statement(stmt, ctx, &mut scopes, declared.as_ref(), &mut returns);
        }
        self.in_progress.remove(&key);

        let ret = declared.unwrap_or_else(|| unify(returns));
        let signature = Type::Function {
            params,
            ret: Box::new(ret),
        };
        self.signatures.insert(key, signature.clone());
        signature
    }

    //=============================================
    //            Section 4: Statements
    //=============================================

    fn check_scripts(&mut self) {
        let graph = self.graph;
        for id in &graph.order {
            let Some(script) = graph.script(id) else {
                continue;
            };
            let ctx = Context::top_level(script);
            let mut scopes = vec![Scope::new()];
            let mut returns = Vec::new();
            for stmt in &script.program.statements {
                self.check_statement(stmt, ctx, &mut scopes, None, &mut returns);
            }
            self.globals
                .insert(id.clone(), scopes.pop().unwrap_or_default());
            for function in script.program.find_functions() {
                self.ensure_function(script, function);
            }
        }
    }

    fn check_statement(
        &mut self,
        stmt: &Stmt,
        ctx: Context<'g>,
        scopes: &mut Vec<Scope>,
        expected_return: Option<&Type>,
        returns: &mut Vec<Type>,
    ) {
        match stmt {
            Stmt::Import { .. } | Stmt::Struct { .. } | Stmt::Function { .. } => {}
            Stmt::Let { decl } => {
                let ty = self.check_let(decl, ctx, scopes);
                if let Some(scope) = scopes.last_mut() {
                    scope.insert(decl.name.clone(), ty);
                }
            }
            Stmt::Return { value, position } => {
                let ty = match value {
                    Some(expr) => self.expr_or_report(expr, ctx, scopes),
                    None => Type::Unit,
                };
                if let Some(expected) = expected_return {
                    if !expected.accepts(&ty) {
                        self.report(
                            ctx.script,
                            CheckError::TypeMismatch {
                                expected: expected.to_string(),
                                found: ty.to_string(),
                                position: *position,
                            },
                        );
                    }
                }
                returns.push(ty);
            }
            Stmt::Expression { expr, .. } => {
                self.expr_or_report(expr, ctx, scopes);
            }
        }
    }

    fn check_let(&mut self, decl: &LetDecl, ctx: Context<'g>, scopes: &[Scope]) -> Type {
        let actual = self.expr_or_report(&decl.initializer, ctx, scopes);
        let Some(annotation) = &decl.ty else {
            return actual;
        };
        let expected = self.resolve_or_report(annotation, ctx);
        if !expected.accepts(&actual) {
            self.report(
                ctx.script,
                CheckError::TypeMismatch {
                    expected: expected.to_string(),
                    found: actual.to_string(),
                    position: decl.initializer.position(),
                },
            );
        }
        expected
    }

    //=============================================
    //            Section 5: Expressions
    //=============================================

    fn expr_or_report(&mut self, expr: &Expr, ctx: Context<'g>, scopes: &[Scope]) -> Type {
        match self.check_expr(expr, ctx, scopes) {
            Ok(ty) => ty,
            Err(error) => {
                self.report(ctx.script, error);
                Type::Any
            }
        }
    }

    fn check_expr(&mut self, expr: &Expr, ctx: Context<'g>, scopes: &[Scope]) -> Result<Type, CheckError> {
        match expr {
            Expr::Literal { value, .. } => Ok(match value {
                Literal::Integer(_) => Type::Int,
                Literal::String(_) => Type::Str,
                Literal::Boolean(_) => Type::Bool,
            }),
            Expr::Identifier { name, position } => {
                if let Some(ty) = scopes.iter().rev().find_map(|scope| scope.get(name)) {
                    return Ok(ty.clone());
                }
                if self.bind_args && name == ARGS_BINDING && ctx.script.id == self.graph.root {
                    return Ok(Type::List(Box::new(Type::Str)));
                }
                if let Some(ty) = self.lookup_callable(name, ctx, *position)? {
                    return Ok(ty);
                }
                if let Some(ty) = self.lookup_imported_global(name, &ctx.script.id, *position)? {
                    return Ok(ty);
                }
                Err(CheckError::UnresolvedName {
                    name: name.clone(),
                    position: *position,
                })
            }
            Expr::FunctionRef { name, position } => self
                .lookup_callable(name, ctx, *position)?
                .ok_or_else(|| CheckError::UnresolvedName {
                    name: format!("::{}", name),
                    position: *position,
                }),
            Expr::Call {
                callee,
                args,
                position,
            } => self.check_call(callee, args, *position, ctx, scopes),
            Expr::Member {
                object,
                property,
                position,
            } => self.check_member(object, property, *position, ctx, scopes),
            Expr::StructLiteral {
                name,
                type_args,
                fields,
                position,
            } => self.check_struct_literal(name, type_args, fields, *position, ctx, scopes),
            Expr::List { elements, .. } => {
                let mut element_types = Vec::with_capacity(elements.len());
                for element in elements {
                    element_types.push(self.check_expr(element, ctx, scopes)?);
                }
                let element = if element_types.is_empty() {
                    Type::Any
                } else {
                    unify(element_types)
                };
                Ok(Type::List(Box::new(element)))
            }
            Expr::Negate { operand, position } => match self.check_expr(operand, ctx, scopes)? {
                Type::Int | Type::Any => Ok(Type::Int),
                other => Err(CheckError::InvalidOperands {
                    operator: "-".to_string(),
                    operands: other.to_string(),
                    position: *position,
                }),
            },
            Expr::Binary {
                left,
                operator,
                right,
                position,
            } => {
                let left_ty = self.check_expr(left, ctx, scopes)?;
                let right_ty = self.check_expr(right, ctx, scopes)?;
                binary_result(*operator, &left_ty, &right_ty).ok_or_else(|| {
                    CheckError::InvalidOperands {
                        operator: operator.to_string(),
                        operands: format!("{} and {}", left_ty, right_ty),
                        position: *position,
                    }
                })
            }
        }
    }

    // The larger arms of `check_expr` live in their own frames so deep
    // expression trees recurse through a small stack frame.

    fn check_call(
        &mut self,
        callee: &Expr,
        args: &[Expr],
        position: Position,
        ctx: Context<'g>,
        scopes: &[Scope],
    ) -> Result<Type, CheckError> {
        let callee_ty = self.check_expr(callee, ctx, scopes)?;
        let mut arg_types = Vec::with_capacity(args.len());
        for arg in args {
            arg_types.push(self.check_expr(arg, ctx, scopes)?);
        }
        match callee_ty {
            Type::Any => Ok(Type::Any),
            Type::Function { params, ret } => {
                if params.len() != arg_types.len() {
                    return Err(CheckError::CallArity {
                        name: callee_name(callee),
                        expected: params.len(),
                        found: arg_types.len(),
                        position,
                    });
                }
                for ((expected, actual), arg) in params.iter().zip(&arg_types).zip(args) {
                    if !expected.accepts(actual) {
                        return Err(CheckError::TypeMismatch {
                            expected: expected.to_string(),
                            found: actual.to_string(),
                            position: arg.position(),
                        });
                    }
                }
                Ok(*ret)
            }
            other => Err(CheckError::NotCallable {
                found: other.to_string(),
                position,
            }),
        }
    }

    fn check_member(
        &mut self,
        object: &Expr,
        property: &str,
        position: Position,
        ctx: Context<'g>,
        scopes: &[Scope],
    ) -> Result<Type, CheckError> {
        let object_ty = self.check_expr(object, ctx, scopes)?;
        let unknown = || CheckError::UnknownField {
            ty: object_ty.to_string(),
            field: property.to_string(),
            position,
        };
        match &object_ty {
            Type::Any => Ok(Type::Any),
            Type::Struct { id, args } => {
                let info = self.structs.get(id).ok_or_else(unknown)?;
                let field = info.field(property).ok_or_else(unknown)?;
                let bindings: HashMap<String, Type> = info
                    .type_params
                    .iter()
                    .cloned()
                    .zip(args.iter().cloned())
                    .collect();
                Ok(field.substitute(&bindings))
            }
            _ => Err(unknown()),
        }
    }

    fn check_struct_literal(
        &mut self,
        name: &str,
        type_args: &[TypeNode],
        fields: &[FieldInit],
        position: Position,
        ctx: Context<'g>,
        scopes: &[Scope],
    ) -> Result<Type, CheckError> {
        let id = self.lookup_type(name, ctx, position)?;
        let info = self
            .structs
            .get(&id)
            .cloned()
            .ok_or_else(|| CheckError::UnresolvedType {
                name: name.to_string(),
                position,
            })?;

        let mut bindings: HashMap<String, Type> = HashMap::new();
        if !type_args.is_empty() {
            if type_args.len() != info.type_params.len() {
                return Err(CheckError::GenericArity {
                    name: name.to_string(),
                    expected: info.type_params.len(),
                    found: type_args.len(),
                    position,
                });
            }
            for (param, arg) in info.type_params.iter().zip(type_args) {
                bindings.insert(param.clone(), self.resolve_type(arg, ctx)?);
            }
        }

        let mut values = Vec::with_capacity(fields.len());
        for init in fields {
            let declared = info.field(&init.name).ok_or_else(|| CheckError::UnknownField {
                ty: name.to_string(),
                field: init.name.clone(),
                position: init.position,
            })?;
            let actual = self.check_expr(&init.value, ctx, scopes)?;
            if let Type::Param(param) = declared {
                bindings
                    .entry(param.clone())
                    .or_insert_with(|| actual.clone());
            }
            values.push((declared, actual, init.value.position()));
        }
        if let Some((missing, _)) = info
            .fields
            .iter()
            .find(|(field, _)| !fields.iter().any(|init| &init.name == field))
        {
            return Err(CheckError::MissingField {
                ty: name.to_string(),
                field: missing.clone(),
                position,
            });
        }
        for (declared, actual, value_position) in values {
            let expected = declared.substitute(&bindings);
            if !expected.accepts(&actual) {
                return Err(CheckError::TypeMismatch {
                    expected: expected.to_string(),
                    found: actual.to_string(),
                    position: value_position,
                });
            }
        }

        let args = info
            .type_params
            .iter()
            .map(|param| bindings.get(param).cloned().unwrap_or(Type::Any))
            .collect();
        Ok(Type::Struct { id, args })
    }
}

fn callee_name(callee: &Expr) -> String {
    match callee {
        Expr::Identifier { name, .. } | Expr::FunctionRef { name, .. } => name.clone(),
        _ => "<expression>".to_string(),
    }
}

// All equal collapses to that type; anything mixed is `any`.
fn unify(types: Vec<Type>) -> Type {
    let mut iter = types.into_iter();
    let Some(first) = iter.next() else {
        return Type::Unit;
    };
    if iter.all(|ty| ty == first) {
        first
    } else {
        Type::Any
    }
}

fn binary_result(operator: BinaryOp, left: &Type, right: &Type) -> Option<Type> {
    match operator {
        BinaryOp::Equal | BinaryOp::NotEqual => Some(Type::Bool),
        BinaryOp::Add => match (left, right) {
            (Type::Str, _) | (_, Type::Str) => Some(Type::Str),
            (Type::Int, Type::Int) => Some(Type::Int),
            (Type::Any, Type::Int | Type::Any) | (Type::Int, Type::Any) => Some(Type::Any),
            _ => None,
        },
        BinaryOp::Subtract | BinaryOp::Multiply | BinaryOp::Divide => match (left, right) {
            (Type::Int | Type::Any, Type::Int | Type::Any) => Some(Type::Int),
            _ => None,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::{ScriptLoader, ScriptSource};
    use std::fs;

    fn check_text(text: &str) -> Vec<Diagnostic> {
        let mut loader = ScriptLoader::new("smain.svs", None);
        let graph = loader
            .load(&ScriptSource::from_text("test.smain.svs", text))
            .expect("load script");
        check_graph(&graph, &Builtin::ALL, true)
    }

    fn messages(diagnostics: &[Diagnostic]) -> Vec<String> {
        diagnostics.iter().map(|d| d.message.clone()).collect()
    }

    #[test]
    fn local_generic_struct_can_be_returned() {
        let errors = check_text(
            "fn run() {\n  struct Model<T> { value: T }\n  return Model { value: 1 };\n}\nlet v: int = run().value;",
        );
        assert!(errors.is_empty(), "{:?}", messages(&errors));
    }

    #[test]
    fn local_struct_is_invisible_to_other_functions() {
        let errors = check_text(
            "fn a() { struct Local { n: int } return Local { n: 1 }; }\nfn b() -> Local { return a(); }",
        );
        assert_eq!(messages(&errors), vec!["Unresolved type 'Local'".to_string()]);
    }

    #[test]
    fn local_struct_differs_from_file_scope_struct() {
        let errors = check_text(
            "struct Model { id: int }\nfn local() { struct Model { id: int } return Model { id: 1 }; }\nlet m: Model = local();",
        );
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.starts_with("Type mismatch"));
    }

    #[test]
    fn let_annotation_must_match() {
        let errors = check_text("let x: string = 1;");
        assert_eq!(
            messages(&errors),
            vec!["Type mismatch: expected string, found int".to_string()]
        );
        assert_eq!(errors[0].code, Some(ErrorCode::TypeMismatch));
    }

    #[test]
    fn generic_arity_is_checked() {
        let errors = check_text("struct Boxed<T> { v: T }\nlet b: Boxed<int, int> = Boxed { v: 1 };");
        assert_eq!(
            messages(&errors),
            vec!["Type 'Boxed' expects 1 type argument(s), found 2".to_string()]
        );
    }

    #[test]
    fn explicit_type_arguments_check_fields() {
        let errors = check_text("struct Boxed<T> { v: T }\nBoxed<string> { v: 1 }");
        assert_eq!(
            messages(&errors),
            vec!["Type mismatch: expected string, found int".to_string()]
        );
    }

    #[test]
    fn struct_literals_need_every_field() {
        let errors = check_text("struct P { x: int, y: int }\nP { x: 1 };\nP { x: 1, y: 2, z: 3 }");
        assert_eq!(
            messages(&errors),
            vec![
                "Missing field 'y' in 'P' literal".to_string(),
                "Type 'P' has no field 'z'".to_string(),
            ]
        );
    }

    #[test]
    fn call_arity_and_callability() {
        let errors = check_text("fn one(a: int) -> int { return a; }\none(1, 2);\nlet n = 3;\nn()");
        assert_eq!(errors.len(), 2);
        assert_eq!(errors[0].code, Some(ErrorCode::InvalidOperation));
        assert!(errors[1].message.contains("not callable"));
    }

    #[test]
    fn errors_carry_locations() {
        let errors = check_text("\nlet x = missing;");
        let location = errors[0].location.clone().expect("location");
        assert_eq!((location.line, location.column), (2, 9));
    }

    #[test]
    fn builtins_and_args_are_visible() {
        let errors = check_text("println(len(args));\nlet s: [string] = args;");
        assert!(errors.is_empty(), "{:?}", messages(&errors));
    }

    #[test]
    fn len_accepts_only_lists() {
        let errors = check_text("len(\"abc\")");
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.starts_with("Type mismatch"));
        assert_eq!(errors[0].code, Some(ErrorCode::TypeMismatch));
    }

    #[test]
    fn deepest_accepted_sum_is_checked() {
        let sum = format!("1{}", " + 1".repeat(crate::parser::MAX_NESTING_DEPTH - 1));
        let errors = check_text(&format!("let total: int = {sum};"));
        assert!(errors.is_empty(), "{:?}", messages(&errors));
    }

    #[test]
    fn recursion_without_declared_return_type_is_accepted() {
        let errors = check_text("fn loop_forever(n: int) { return loop_forever(n - 1); }\nloop_forever(3)");
        assert!(errors.is_empty(), "{:?}", messages(&errors));
    }

    #[test]
    fn diamond_imports_share_one_type_and_distinct_imports_are_ambiguous() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("model.smain.svs"), "struct Model { id: int }").unwrap();
        fs::write(dir.path().join("a.smain.svs"), "import \"model.smain.svs\";").unwrap();
        fs::write(dir.path().join("b.smain.svs"), "import \"model.smain.svs\";").unwrap();
        fs::write(dir.path().join("other.smain.svs"), "struct Model { id: int }").unwrap();
        let diamond = dir.path().join("diamond.smain.svs");
        fs::write(
            &diamond,
            "import \"a.smain.svs\";\nimport \"b.smain.svs\";\nlet m: Model = Model { id: 1 };",
        )
        .unwrap();
        let clash = dir.path().join("clash.smain.svs");
        fs::write(
            &clash,
            "import \"model.smain.svs\";\nimport \"other.smain.svs\";\nModel { id: 1 }",
        )
        .unwrap();

        let check = |path: &std::path::Path| {
            let mut loader = ScriptLoader::new("smain.svs", None);
            let graph = loader.load(&ScriptSource::from_file(path)).expect("load");
            check_graph(&graph, &Builtin::ALL, false)
        };
        assert!(check(&diamond).is_empty());
        let errors = check(&clash);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.starts_with("Ambiguous reference 'Model'"));
    }
}
