pub mod ast;
pub mod cache_dir;
pub mod diagnostics;
pub mod harness;
pub mod host;
pub mod interpreter;
pub mod modules;
pub mod parser;
pub mod resolver;
pub mod tokenizer;

pub use cache_dir::{COMPILED_SCRIPTS_CACHE_DIR_VAR, CacheDirOverride, with_cache_dir};
pub use diagnostics::{Diagnostic, ErrorCode, EvaluationOutcome, Severity};
pub use host::{
    BasicScriptingHost, CompilationConfiguration, EvaluationConfiguration, EvaluationResult,
    LoadingRoot, ScriptSource, ScriptTemplate, ScriptingHost,
};
