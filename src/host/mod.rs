//=====================================================
// File: host.rs
//=====================================================
// Author: ZobieLabs
// License: Duality Public License (DPL v1.0)
// Goal: Scripting host boundary for main scripts
// Objective: Turn a script source plus compilation and evaluation
//            configurations into a result-or-diagnostics outcome
//=====================================================

use crate::cache_dir;
use crate::diagnostics::{Diagnostic, EvaluationOutcome};
use crate::interpreter::{Builtin, InstanceRegistry, Interpreter, Value};
use crate::modules::{ScriptGraph, ScriptLoader};
use crate::resolver::check_graph;
use std::path::PathBuf;
use tracing::{debug, info, warn};

pub use crate::modules::ScriptSource;

/// File extension of main scripts, without the leading dot.
pub const MAIN_SCRIPT_EXTENSION: &str = "smain.svs";

/// Describes a family of scripts: how they are named and what the host
/// provides to them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptTemplate {
    pub display_name: String,
    pub file_extension: String,
    pub builtins: Vec<Builtin>,
    pub binds_args: bool,
}

impl ScriptTemplate {
    pub fn simple_main() -> Self {
        Self {
            display_name: "Simple main script".to_string(),
            file_extension: MAIN_SCRIPT_EXTENSION.to_string(),
            builtins: Builtin::ALL.to_vec(),
            binds_args: true,
        }
    }
}

impl Default for ScriptTemplate {
    fn default() -> Self {
        Self::simple_main()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompilationConfiguration {
    pub template: ScriptTemplate,
}

impl CompilationConfiguration {
    pub fn from_template(template: ScriptTemplate) -> Self {
        Self { template }
    }
}

/// Where imports are looked up besides the importing script's directory.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum LoadingRoot {
    /// Nothing outside the script's own directory tree.
    #[default]
    Isolated,
    Inherited(Vec<PathBuf>),
}

#[derive(Debug, Clone, Default)]
pub struct EvaluationConfiguration {
    pub loading_root: LoadingRoot,
    pub constructor_args: Vec<String>,
    pub share_script_instances: bool,
    instances: InstanceRegistry,
}

impl EvaluationConfiguration {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_loading_root(mut self, loading_root: LoadingRoot) -> Self {
        self.loading_root = loading_root;
        self
    }

    pub fn with_constructor_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.constructor_args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn enable_script_instances_sharing(mut self) -> Self {
        self.share_script_instances = true;
        self
    }

    /// Instances reused by every evaluation run with this configuration
    /// while sharing is enabled.
    pub fn shared_instances(&self) -> &InstanceRegistry {
        &self.instances
    }
}

#[derive(Debug, Clone)]
pub struct EvaluationResult {
    pub value: Value,
    pub output: Vec<String>,
    /// Id of the evaluated root script.
    pub script: String,
}

pub trait ScriptingHost {
    fn eval(
        &self,
        source: &ScriptSource,
        compilation: &CompilationConfiguration,
        evaluation: &EvaluationConfiguration,
    ) -> EvaluationOutcome<EvaluationResult>;
}

/// Loads, checks and runs scripts in-process.
#[derive(Debug, Default, Clone, Copy)]
pub struct BasicScriptingHost;

impl BasicScriptingHost {
    pub fn new() -> Self {
        Self
    }

    /// Loads and checks `source` with its imports without running anything.
    pub fn compile(
        &self,
        source: &ScriptSource,
        compilation: &CompilationConfiguration,
        evaluation: &EvaluationConfiguration,
    ) -> EvaluationOutcome<ScriptGraph> {
        let template = &compilation.template;
        let mut reports = Vec::new();

        if let ScriptSource::File(path) = source {
            let expected = format!(".{}", template.file_extension);
            if !path.to_string_lossy().ends_with(&expected) {
                reports.push(Diagnostic::warning(format!(
                    "Script file name '{}' does not end with '{}' expected by {}",
                    path.display(),
                    expected,
                    template.display_name
                )));
            }
        }

        let cache_dir = cache_dir::setting().resolve();
        debug!(cache_dir = ?cache_dir, "compiled scripts cache");
        let mut loader = ScriptLoader::new(template.file_extension.clone(), cache_dir);
        if let LoadingRoot::Inherited(roots) = &evaluation.loading_root {
            for root in roots {
                loader.add_search_root(root.clone());
            }
        }

        let loaded = loader.load(source);
        reports.extend(loader.take_reports());
        let graph = match loaded {
            Ok(graph) => graph,
            Err(error) => {
                warn!(script = %source.name(), %error, "script loading failed");
                reports.push(error.to_diagnostic());
                return EvaluationOutcome::failure(reports);
            }
        };

        let errors = check_graph(&graph, &template.builtins, template.binds_args);
        if !errors.is_empty() {
            warn!(script = %source.name(), errors = errors.len(), "script failed to compile");
            reports.extend(errors);
            return EvaluationOutcome::failure(reports);
        }
        EvaluationOutcome::success(graph, reports)
    }
}

impl ScriptingHost for BasicScriptingHost {
    fn eval(
        &self,
        source: &ScriptSource,
        compilation: &CompilationConfiguration,
        evaluation: &EvaluationConfiguration,
    ) -> EvaluationOutcome<EvaluationResult> {
        info!(script = %source.name(), "evaluating script");
        let (graph, mut reports) = match self.compile(source, compilation, evaluation) {
            EvaluationOutcome::Success { value, reports } => (value, reports),
            EvaluationOutcome::Failure { reports } => return EvaluationOutcome::failure(reports),
        };

        let template = &compilation.template;
        let mut interpreter = Interpreter::new(&graph).with_builtins(&template.builtins);
        if template.binds_args {
            interpreter = interpreter.with_args(evaluation.constructor_args.clone());
        }
        if evaluation.share_script_instances {
            interpreter = interpreter.with_shared_instances(evaluation.shared_instances().clone());
        }

        match interpreter.run() {
            Ok(run) => {
                info!(script = %graph.root, lines = run.output.len(), "script evaluated");
                EvaluationOutcome::success(
                    EvaluationResult {
                        value: run.value,
                        output: run.output,
                        script: graph.root.clone(),
                    },
                    reports,
                )
            }
            Err(error) => {
                warn!(script = %graph.root, %error, "script evaluation failed");
                reports.push(error.to_diagnostic());
                EvaluationOutcome::failure(reports)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache_dir::{TEST_ENV_LOCK, with_cache_dir};
    use std::fs;

    fn eval_text(text: &str, evaluation: &EvaluationConfiguration) -> EvaluationOutcome<EvaluationResult> {
        let _lock = TEST_ENV_LOCK.lock();
        with_cache_dir(Some(""), || {
            BasicScriptingHost::new().eval(
                &ScriptSource::from_text("inline.smain.svs", text),
                &CompilationConfiguration::from_template(ScriptTemplate::simple_main()),
                evaluation,
            )
        })
    }

    #[test]
    fn constructor_args_reach_the_script() {
        let evaluation = EvaluationConfiguration::new().with_constructor_args(["a", "b"]);
        let outcome = eval_text("args", &evaluation);
        let value = outcome.into_value().expect("success").value;
        assert_eq!(
            value,
            Value::List(vec![Value::Str("a".to_string()), Value::Str("b".to_string())])
        );
    }

    #[test]
    fn type_errors_fail_before_running() {
        let outcome = eval_text("println(\"ran\");\nlet x: int = \"no\";", &EvaluationConfiguration::new());
        assert!(!outcome.is_success());
        assert_eq!(outcome.reports().len(), 1);
    }

    #[test]
    fn runtime_failure_has_a_cause() {
        let outcome = eval_text("fail(\"stop here\")", &EvaluationConfiguration::new());
        let reports = outcome.reports();
        assert!(!outcome.is_success());
        assert_eq!(reports[0].message, "Error evaluating script");
        assert_eq!(reports[0].cause.as_deref(), Some("Script failed: stop here"));
    }

    #[test]
    fn mismatched_file_extension_is_a_warning() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let path = dir.path().join("plain.svs");
        fs::write(&path, "1 + 1").expect("write script");
        let _lock = TEST_ENV_LOCK.lock();
        let outcome = with_cache_dir(Some(""), || {
            BasicScriptingHost::new().eval(
                &ScriptSource::from_file(&path),
                &CompilationConfiguration::from_template(ScriptTemplate::simple_main()),
                &EvaluationConfiguration::new(),
            )
        });
        assert!(outcome.is_success());
        assert_eq!(outcome.reports().len(), 1);
        assert_eq!(outcome.value().map(|r| r.value.clone()), Some(Value::Int(2)));
    }

    #[test]
    fn inherited_roots_resolve_imports() {
        let lib = tempfile::tempdir().expect("create lib dir");
        let app = tempfile::tempdir().expect("create app dir");
        fs::write(lib.path().join("shared.smain.svs"), "fn answer() -> int { return 42; }")
            .expect("write library");
        let main = app.path().join("main.smain.svs");
        fs::write(&main, "import \"shared.smain.svs\";\nanswer()").expect("write main");

        let compilation = CompilationConfiguration::from_template(ScriptTemplate::simple_main());
        let _lock = TEST_ENV_LOCK.lock();
        let (isolated, inherited) = with_cache_dir(Some(""), || {
            let host = BasicScriptingHost::new();
            let source = ScriptSource::from_file(&main);
            let isolated = host.eval(&source, &compilation, &EvaluationConfiguration::new());
            let inherited = host.eval(
                &source,
                &compilation,
                &EvaluationConfiguration::new()
                    .with_loading_root(LoadingRoot::Inherited(vec![lib.path().to_path_buf()])),
            );
            (isolated, inherited)
        });
        assert!(!isolated.is_success());
        assert_eq!(inherited.into_value().map(|r| r.value), Some(Value::Int(42)));
    }
}
