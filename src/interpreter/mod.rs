//=====================================================
// File: interpreter.rs
//=====================================================
// Author: ZobieLabs
// License: Duality Public License (DPL v1.0)
// Goal: Tree-walking evaluation of checked main scripts
// Objective: Instantiate a script graph dependencies-first, share instances
//            through a registry when asked, and capture printed output
//=====================================================

pub mod builtins;
pub mod errors;

pub use builtins::Builtin;
pub use errors::{EVALUATION_FAILED, RuntimeError};

use crate::ast::{BinaryOp, Expr, Literal, Stmt};
use crate::modules::ScriptGraph;
use crate::tokenizer::Position;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Name under which the main script sees its constructor arguments.
pub const ARGS_BINDING: &str = "args";

const MAX_CALL_DEPTH: usize = 128;

//=============================================
//            Section 1: Values
//=============================================

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Unit,
    Int(i64),
    Str(String),
    Bool(bool),
    List(Vec<Value>),
    Struct(StructValue),
    Function(Callable),
}

impl Value {
    pub fn type_name(&self) -> String {
        match self {
            Value::Unit => "unit".to_string(),
            Value::Int(_) => "int".to_string(),
            Value::Str(_) => "string".to_string(),
            Value::Bool(_) => "bool".to_string(),
            Value::List(_) => "list".to_string(),
            Value::Struct(instance) => instance.name.clone(),
            Value::Function(_) => "function".to_string(),
        }
    }

    fn fmt_nested(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Str(text) => write!(f, "{:?}", text),
            other => write!(f, "{}", other),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Unit => f.write_str("unit"),
            Value::Int(n) => write!(f, "{}", n),
            Value::Str(text) => f.write_str(text),
            Value::Bool(b) => write!(f, "{}", b),
            Value::List(items) => {
                f.write_str("[")?;
                for (index, item) in items.iter().enumerate() {
                    if index > 0 {
                        f.write_str(", ")?;
                    }
                    item.fmt_nested(f)?;
                }
                f.write_str("]")
            }
            Value::Struct(instance) => {
                write!(f, "{} {{", instance.name)?;
                for (index, (name, value)) in instance.fields.iter().enumerate() {
                    f.write_str(if index == 0 { " " } else { ", " })?;
                    write!(f, "{}: ", name)?;
                    value.fmt_nested(f)?;
                }
                f.write_str(" }")
            }
            Value::Function(callable) => write!(f, "{}", callable),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StructValue {
    pub name: String,
    pub fields: Vec<(String, Value)>,
}

impl StructValue {
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields
            .iter()
            .find(|(field, _)| field == name)
            .map(|(_, value)| value)
    }
}

/// A function value: a script function bound to the instance context it
/// was declared in, or a template builtin.
#[derive(Debug, Clone)]
pub enum Callable {
    Script {
        context: Arc<ScriptContext>,
        name: String,
    },
    Builtin(Builtin),
}

impl PartialEq for Callable {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (
                Callable::Script { context, name },
                Callable::Script {
                    context: other_context,
                    name: other_name,
                },
            ) => context.script == other_context.script && name == other_name,
            (Callable::Builtin(a), Callable::Builtin(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Display for Callable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Callable::Script { name, .. } => write!(f, "fn {}", name),
            Callable::Builtin(builtin) => write!(f, "builtin {}", builtin.name()),
        }
    }
}

//=============================================
//            Section 2: Script instances
//=============================================

/// What a script instance sees besides its own locals: the instances of
/// the scripts it imports.
#[derive(Debug)]
pub struct ScriptContext {
    pub script: String,
    pub imports: Vec<Arc<ScriptInstance>>,
}

/// An evaluated script: its top-level bindings and result value.
#[derive(Debug)]
pub struct ScriptInstance {
    pub script: String,
    pub context: Arc<ScriptContext>,
    pub globals: HashMap<String, Value>,
    pub result: Value,
}

/// Script instances shared between importers, keyed by script id and
/// source fingerprint.
#[derive(Debug, Clone, Default)]
pub struct InstanceRegistry {
    instances: Arc<Mutex<HashMap<String, Arc<ScriptInstance>>>>,
}

impl InstanceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<Arc<ScriptInstance>> {
        self.instances.lock().get(key).cloned()
    }

    pub fn insert(&self, key: String, instance: Arc<ScriptInstance>) {
        self.instances.lock().insert(key, instance);
    }

    pub fn len(&self) -> usize {
        self.instances.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.instances.lock().clear();
    }
}

/// Outcome of running the root script.
#[derive(Debug)]
pub struct Evaluation {
    pub value: Value,
    pub output: Vec<String>,
    pub instance: Arc<ScriptInstance>,
}

//=============================================
//            Section 3: Interpreter
//=============================================

enum Flow {
    Next(Value),
    Return(Value),
}

struct Frame {
    context: Arc<ScriptContext>,
    locals: HashMap<String, Value>,
}

impl Frame {
    fn new(context: Arc<ScriptContext>) -> Self {
        Self {
            context,
            locals: HashMap::new(),
        }
    }
}

pub struct Interpreter<'g> {
    graph: &'g ScriptGraph,
    builtins: Vec<Builtin>,
    args: Option<Vec<String>>,
    shared: Option<InstanceRegistry>,
    output: Vec<String>,
    depth: usize,
}

impl<'g> Interpreter<'g> {
    pub fn new(graph: &'g ScriptGraph) -> Self {
        Self {
            graph,
            builtins: Builtin::ALL.to_vec(),
            args: None,
            shared: None,
            output: Vec::new(),
            depth: 0,
        }
    }

    pub fn with_builtins(mut self, builtins: &[Builtin]) -> Self {
        self.builtins = builtins.to_vec();
        self
    }

    /// Binds `args` in the root script.
    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = Some(args);
        self
    }

    pub fn with_shared_instances(mut self, registry: InstanceRegistry) -> Self {
        self.shared = Some(registry);
        self
    }

    pub fn run(mut self) -> Result<Evaluation, RuntimeError> {
        let root = self.graph.root.clone();
        let instance = self.instantiate(&root)?;
        Ok(Evaluation {
            value: instance.result.clone(),
            output: self.output,
            instance,
        })
    }

    fn instantiate(&mut self, id: &str) -> Result<Arc<ScriptInstance>, RuntimeError> {
        let graph = self.graph;
        let script = graph
            .script(id)
            .ok_or_else(|| RuntimeError::MissingScript {
                script: id.to_string(),
            })?;

        let mut imports = Vec::with_capacity(script.imports.len());
        for import in &script.imports {
            imports.push(self.import_instance(import)?);
        }

        let context = Arc::new(ScriptContext {
            script: id.to_string(),
            imports,
        });
        let mut frame = Frame::new(Arc::clone(&context));
        let mut result = Value::Unit;
        for stmt in &script.program.statements {
            result = match self.execute(stmt, &mut frame)? {
                Flow::Next(value) | Flow::Return(value) => value,
            };
        }
        debug!(script = id, "script instance evaluated");

        Ok(Arc::new(ScriptInstance {
            script: id.to_string(),
            context,
            globals: frame.locals,
            result,
        }))
    }

    fn import_instance(&mut self, id: &str) -> Result<Arc<ScriptInstance>, RuntimeError> {
        let Some(registry) = self.shared.clone() else {
            return self.instantiate(id);
        };
        let key = match self.graph.script(id) {
            Some(script) => format!("{}#{}", id, script.fingerprint),
            None => id.to_string(),
        };
        if let Some(instance) = registry.get(&key) {
            debug!(script = id, "reusing shared script instance");
            return Ok(instance);
        }
        let instance = self.instantiate(id)?;
        registry.insert(key, Arc::clone(&instance));
        Ok(instance)
    }

    //=============================================
    //            Section 4: Statements
    //=============================================

    fn execute(&mut self, stmt: &Stmt, frame: &mut Frame) -> Result<Flow, RuntimeError> {
        match stmt {
            Stmt::Import { .. } | Stmt::Struct { .. } | Stmt::Function { .. } => {
                Ok(Flow::Next(Value::Unit))
            }
            Stmt::Let { decl } => {
                let value = self.evaluate(&decl.initializer, frame)?;
                frame.locals.insert(decl.name.clone(), value);
                Ok(Flow::Next(Value::Unit))
            }
            Stmt::Return { value, .. } => {
                let value = match value {
                    Some(expr) => self.evaluate(expr, frame)?,
                    None => Value::Unit,
                };
                Ok(Flow::Return(value))
            }
            Stmt::Expression { expr, .. } => Ok(Flow::Next(self.evaluate(expr, frame)?)),
        }
    }

    //=============================================
    //            Section 5: Expressions
    //=============================================

    fn evaluate(&mut self, expr: &Expr, frame: &Frame) -> Result<Value, RuntimeError> {
        match expr {
            Expr::Literal { value, .. } => Ok(match value {
                Literal::Integer(n) => Value::Int(*n),
                Literal::String(s) => Value::Str(s.clone()),
                Literal::Boolean(b) => Value::Bool(*b),
            }),
            Expr::Identifier { name, position } => self.lookup(name, frame, *position),
            Expr::FunctionRef { name, position } => self
                .find_function(&frame.context, name)
                .or_else(|| self.builtin(name).map(Callable::Builtin))
                .map(Value::Function)
                .ok_or_else(|| RuntimeError::UndefinedVariable {
                    name: name.clone(),
                    position: *position,
                }),
            Expr::Call {
                callee,
                args,
                position,
            } => {
                let callee = self.evaluate(callee, frame)?;
                let mut values = Vec::with_capacity(args.len());
                for arg in args {
                    values.push(self.evaluate(arg, frame)?);
                }
                self.call(callee, values, *position)
            }
            Expr::Member {
                object,
                property,
                position,
            } => match self.evaluate(object, frame)? {
                Value::Struct(instance) => instance.field(property).cloned().ok_or_else(|| {
                    RuntimeError::UnknownField {
                        found: instance.name.clone(),
                        field: property.clone(),
                        position: *position,
                    }
                }),
                other => Err(RuntimeError::UnknownField {
                    found: other.type_name(),
                    field: property.clone(),
                    position: *position,
                }),
            },
            Expr::StructLiteral { name, fields, .. } => {
                let mut values = Vec::with_capacity(fields.len());
                for field in fields {
                    values.push((field.name.clone(), self.evaluate(&field.value, frame)?));
                }
                Ok(Value::Struct(StructValue {
                    name: name.clone(),
                    fields: values,
                }))
            }
            Expr::List { elements, .. } => {
                let mut values = Vec::with_capacity(elements.len());
                for element in elements {
                    values.push(self.evaluate(element, frame)?);
                }
                Ok(Value::List(values))
            }
            Expr::Negate { operand, position } => match self.evaluate(operand, frame)? {
                Value::Int(n) => n
                    .checked_neg()
                    .map(Value::Int)
                    .ok_or(RuntimeError::IntegerOverflow {
                        position: *position,
                    }),
                other => Err(RuntimeError::InvalidOperands {
                    operator: "-".to_string(),
                    left: "unit".to_string(),
                    right: other.type_name(),
                    position: *position,
                }),
            },
            Expr::Binary {
                left,
                operator,
                right,
                position,
            } => {
                let left = self.evaluate(left, frame)?;
                let right = self.evaluate(right, frame)?;
                binary_op(*operator, left, right, *position)
            }
        }
    }

    fn lookup(&self, name: &str, frame: &Frame, position: Position) -> Result<Value, RuntimeError> {
        if let Some(value) = frame.locals.get(name) {
            return Ok(value.clone());
        }
        if name == ARGS_BINDING && frame.context.script == self.graph.root {
            if let Some(args) = &self.args {
                return Ok(Value::List(args.iter().cloned().map(Value::Str).collect()));
            }
        }
        if let Some(callable) = self.find_function(&frame.context, name) {
            return Ok(Value::Function(callable));
        }
        if let Some(value) = find_global(&frame.context, name) {
            return Ok(value);
        }
        if let Some(builtin) = self.builtin(name) {
            return Ok(Value::Function(Callable::Builtin(builtin)));
        }
        Err(RuntimeError::UndefinedVariable {
            name: name.to_string(),
            position,
        })
    }

    fn builtin(&self, name: &str) -> Option<Builtin> {
        Builtin::from_name(name).filter(|builtin| self.builtins.contains(builtin))
    }

    // Own functions first, then those of imported instances, depth first.
    fn find_function(&self, context: &Arc<ScriptContext>, name: &str) -> Option<Callable> {
        let declared = self
            .graph
            .script(&context.script)
            .is_some_and(|script| script.program.find_functions().iter().any(|f| f.name == name));
        if declared {
            return Some(Callable::Script {
                context: Arc::clone(context),
                name: name.to_string(),
            });
        }
        context
            .imports
            .iter()
            .find_map(|import| self.find_function(&import.context, name))
    }

    //=============================================
    //            Section 6: Calls
    //=============================================

    fn call(&mut self, callee: Value, args: Vec<Value>, position: Position) -> Result<Value, RuntimeError> {
        match callee {
            Value::Function(Callable::Builtin(builtin)) => builtin.call(args, &mut self.output),
            Value::Function(Callable::Script { context, name }) => {
                self.call_script_function(context, &name, args, position)
            }
            other => Err(RuntimeError::NotCallable {
                found: other.type_name(),
                position,
            }),
        }
    }

    fn call_script_function(
        &mut self,
        context: Arc<ScriptContext>,
        name: &str,
        args: Vec<Value>,
        position: Position,
    ) -> Result<Value, RuntimeError> {
        let graph = self.graph;
        let decl = graph
            .script(&context.script)
            .and_then(|script| {
                script
                    .program
                    .find_functions()
                    .into_iter()
                    .find(|f| f.name == name)
            })
            .ok_or_else(|| RuntimeError::UndefinedVariable {
                name: name.to_string(),
                position,
            })?;

        if decl.params.len() != args.len() {
            return Err(RuntimeError::ArityMismatch {
                name: name.to_string(),
                expected: decl.params.len(),
                found: args.len(),
            });
        }
        if self.depth >= MAX_CALL_DEPTH {
            return Err(RuntimeError::StackOverflow {
                limit: MAX_CALL_DEPTH,
            });
        }

        let mut frame = Frame::new(context);
        for (param, value) in decl.params.iter().zip(args) {
            frame.locals.insert(param.name.clone(), value);
        }

        self.depth += 1;
        let mut result = Ok(Value::Unit);
        for stmt in &decl.body {
            match self.execute(stmt, &mut frame) {
                Ok(Flow::Next(_)) => {}
                Ok(Flow::Return(value)) => {
                    result = Ok(value);
                    break;
                }
                Err(error) => {
                    result = Err(error);
                    break;
                }
            }
        }
        self.depth -= 1;
        result
    }
}

fn find_global(context: &ScriptContext, name: &str) -> Option<Value> {
    context.imports.iter().find_map(|import| {
        import
            .globals
            .get(name)
            .cloned()
            .or_else(|| find_global(&import.context, name))
    })
}

fn binary_op(
    operator: BinaryOp,
    left: Value,
    right: Value,
    position: Position,
) -> Result<Value, RuntimeError> {
    let overflow = RuntimeError::IntegerOverflow { position };
    match (operator, left, right) {
        (BinaryOp::Equal, left, right) => Ok(Value::Bool(left == right)),
        (BinaryOp::NotEqual, left, right) => Ok(Value::Bool(left != right)),
        (BinaryOp::Add, Value::Int(a), Value::Int(b)) => {
            a.checked_add(b).map(Value::Int).ok_or(overflow)
        }
        (BinaryOp::Add, Value::Str(a), right) => Ok(Value::Str(format!("{}{}", a, right))),
        (BinaryOp::Add, left, Value::Str(b)) => Ok(Value::Str(format!("{}{}", left, b))),
        (BinaryOp::Subtract, Value::Int(a), Value::Int(b)) => {
            a.checked_sub(b).map(Value::Int).ok_or(overflow)
        }
        (BinaryOp::Multiply, Value::Int(a), Value::Int(b)) => {
            a.checked_mul(b).map(Value::Int).ok_or(overflow)
        }
        (BinaryOp::Divide, Value::Int(_), Value::Int(0)) => {
            Err(RuntimeError::DivisionByZero { position })
        }
        (BinaryOp::Divide, Value::Int(a), Value::Int(b)) => {
            a.checked_div(b).map(Value::Int).ok_or(overflow)
        }
        (operator, left, right) => Err(RuntimeError::InvalidOperands {
            operator: operator.to_string(),
            left: left.type_name(),
            right: right.type_name(),
            position,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::{ScriptLoader, ScriptSource};
    use std::fs;
    use std::path::Path;

    fn run_text(text: &str) -> Result<Evaluation, RuntimeError> {
        let mut loader = ScriptLoader::new("smain.svs", None);
        let graph = loader
            .load(&ScriptSource::from_text("test.smain.svs", text))
            .expect("load script");
        Interpreter::new(&graph).with_args(vec!["first".to_string()]).run()
    }

    fn run_file(path: &Path, shared: Option<InstanceRegistry>) -> Evaluation {
        let mut loader = ScriptLoader::new("smain.svs", None);
        let graph = loader.load(&ScriptSource::from_file(path)).expect("load graph");
        let interpreter = Interpreter::new(&graph);
        let interpreter = match shared {
            Some(registry) => interpreter.with_shared_instances(registry),
            None => interpreter,
        };
        interpreter.run().expect("run graph")
    }

    #[test]
    fn final_expression_is_the_result() {
        let evaluation = run_text("fn add(a: int, b: int) -> int { return a + b; }\nadd(2, 3)").unwrap();
        assert_eq!(evaluation.value, Value::Int(5));
    }

    #[test]
    fn deepest_accepted_sum_evaluates() {
        let depth = crate::parser::MAX_NESTING_DEPTH;
        let evaluation = run_text(&format!("1{}", " + 1".repeat(depth - 1))).unwrap();
        assert_eq!(evaluation.value, Value::Int(depth as i64));
    }

    #[test]
    fn trailing_declaration_yields_unit() {
        let evaluation = run_text("let x = 1;").unwrap();
        assert_eq!(evaluation.value, Value::Unit);
    }

    #[test]
    fn function_reference_is_callable() {
        let evaluation = run_text("fn seven() -> int { return 7; }\nlet f = ::seven;\nf()").unwrap();
        assert_eq!(evaluation.value, Value::Int(7));
    }

    #[test]
    fn structs_expose_their_fields() {
        let evaluation = run_text(
            "fn make() { struct Pair<T> { left: T, right: T } return Pair { left: 1, right: 2 }; }\nmake().right",
        )
        .unwrap();
        assert_eq!(evaluation.value, Value::Int(2));
    }

    #[test]
    fn println_output_is_captured() {
        let evaluation = run_text("println(\"total: \" + 40 + 2)").unwrap();
        assert_eq!(evaluation.output, vec!["total: 402".to_string()]);
    }

    #[test]
    fn args_are_bound_in_the_main_script() {
        let evaluation = run_text("len(args)").unwrap();
        assert_eq!(evaluation.value, Value::Int(1));
    }

    #[test]
    fn division_by_zero_is_reported() {
        let error = run_text("fn f(n: int) -> int { return 10 / n; }\nf(0)").unwrap_err();
        assert!(matches!(error, RuntimeError::DivisionByZero { .. }));
    }

    #[test]
    fn runaway_recursion_is_stopped() {
        let error = run_text("fn spin() -> int { return spin(); }\nspin()").unwrap_err();
        assert_eq!(error, RuntimeError::StackOverflow { limit: MAX_CALL_DEPTH });
    }

    #[test]
    fn struct_display_quotes_nested_strings() {
        let value = Value::Struct(StructValue {
            name: "Model".to_string(),
            fields: vec![
                ("id".to_string(), Value::Int(1)),
                ("name".to_string(), Value::Str("a".to_string())),
            ],
        });
        assert_eq!(value.to_string(), "Model { id: 1, name: \"a\" }");
    }

    fn write_diamond(dir: &Path) -> std::path::PathBuf {
        fs::write(dir.join("base.smain.svs"), "println(\"base\");\nlet shared = 1;").unwrap();
        fs::write(dir.join("left.smain.svs"), "import \"base.smain.svs\";").unwrap();
        fs::write(dir.join("right.smain.svs"), "import \"base.smain.svs\";").unwrap();
        let root = dir.join("top.smain.svs");
        fs::write(
            &root,
            "import \"left.smain.svs\";\nimport \"right.smain.svs\";\nshared + 1",
        )
        .unwrap();
        root
    }

    #[test]
    fn shared_instances_run_a_diamond_dependency_once() {
        let dir = tempfile::tempdir().unwrap();
        let root = write_diamond(dir.path());
        let registry = InstanceRegistry::new();
        let evaluation = run_file(&root, Some(registry.clone()));
        assert_eq!(evaluation.output, vec!["base".to_string()]);
        assert_eq!(evaluation.value, Value::Int(2));
        assert_eq!(registry.len(), 3);
    }

    #[test]
    fn unshared_instances_run_per_importer() {
        let dir = tempfile::tempdir().unwrap();
        let root = write_diamond(dir.path());
        let evaluation = run_file(&root, None);
        assert_eq!(evaluation.output, vec!["base".to_string(), "base".to_string()]);
    }
}
