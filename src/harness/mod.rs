//=====================================================
// File: harness.rs
//=====================================================
// Author: ZobieLabs
// License: Duality Public License (DPL v1.0)
// Goal: Fixture-driven harness for the main-script host
// Objective: Evaluate fixture scripts under a scoped cache-dir override and
//            turn failed outcomes into readable test failures
//=====================================================

pub mod scenarios;

pub use scenarios::{FixtureScenario, SCENARIOS, scenario};

use crate::cache_dir::with_cache_dir;
use crate::diagnostics::{Diagnostic, EvaluationOutcome};
use crate::host::{
    BasicScriptingHost, CompilationConfiguration, EvaluationConfiguration, EvaluationResult,
    LoadingRoot, ScriptSource, ScriptTemplate, ScriptingHost,
};
use std::env;
use std::ffi::OsString;
use std::path::{self, Path};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::{MakeWriter, TestWriter};

/// Directory holding the fixture corpus, relative to the crate root.
pub const TEST_DATA_ROOT: &str = "testData";

const FAILURE_HEADER: &str = "test failed:";

/// Evaluates one script file the way every fixture is evaluated: simple main
/// template, isolated loading root, no constructor arguments, instance
/// sharing on. `cache_dir` of `None` disables compiled-script caching.
pub fn evaluate_file(script: &Path, cache_dir: Option<&Path>) -> EvaluationOutcome<EvaluationResult> {
    let cache_value: OsString = cache_dir
        .map(|dir| {
            path::absolute(dir)
                .unwrap_or_else(|_| dir.to_path_buf())
                .into_os_string()
        })
        .unwrap_or_default();

    with_cache_dir(Some(cache_value), || {
        let compilation = CompilationConfiguration::from_template(ScriptTemplate::simple_main());
        let evaluation = EvaluationConfiguration::new()
            .with_loading_root(LoadingRoot::Isolated)
            .with_constructor_args(Vec::<String>::new())
            .enable_script_instances_sharing();
        BasicScriptingHost::new().eval(&ScriptSource::from_file(script), &compilation, &evaluation)
    })
}

/// The assertion message for a failed outcome, `None` on success.
pub fn failure_message<T>(outcome: &EvaluationOutcome<T>) -> Option<String> {
    if outcome.is_success() {
        return None;
    }
    let lines: Vec<String> = outcome.reports().iter().map(Diagnostic::summary).collect();
    Some(format!("{}\n  {}", FAILURE_HEADER, lines.join("\n  ")))
}

/// Panics with every diagnostic unless `outcome` is a success.
#[track_caller]
pub fn assert_succeeded<T>(outcome: &EvaluationOutcome<T>) {
    if let Some(message) = failure_message(outcome) {
        panic!("{}", message);
    }
}

/// Installs a test-friendly subscriber once; later calls are no-ops.
pub fn install_tracing() {
    install_tracing_with(TestWriter::default());
}

/// Installs the global fmt subscriber writing to `writer`, unless one is
/// already set. `RUST_LOG` wins; otherwise `SOLVRA_TRACE=1` raises the
/// default level from info to debug.
pub fn install_tracing_with<W>(writer: W)
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let default_level = match env::var("SOLVRA_TRACE") {
        Ok(value) if value == "1" => "debug",
        _ => "info",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::ErrorCode;

    #[test]
    fn success_has_no_failure_message() {
        let outcome = EvaluationOutcome::success((), vec![Diagnostic::warning("ignored")]);
        assert_eq!(failure_message(&outcome), None);
        assert_succeeded(&outcome);
    }

    #[test]
    fn failure_message_lists_every_diagnostic_in_order() {
        let outcome: EvaluationOutcome<()> = EvaluationOutcome::failure(vec![
            Diagnostic::error(ErrorCode::TypeMismatch, "Unresolved type 'Model'"),
            Diagnostic::error(ErrorCode::RuntimePanic, "Error evaluating script")
                .with_cause("Division by zero at 3:7"),
        ]);
        assert_eq!(
            failure_message(&outcome).as_deref(),
            Some(
                "test failed:\n  Unresolved type 'Model'\n  Error evaluating script: Division by zero at 3:7"
            )
        );
    }

    #[test]
    #[should_panic(expected = "test failed:")]
    fn assert_succeeded_panics_on_failure() {
        let outcome: EvaluationOutcome<()> =
            EvaluationOutcome::failure(vec![Diagnostic::warning("nothing ran")]);
        assert_succeeded(&outcome);
    }

    #[test]
    fn install_tracing_is_idempotent() {
        install_tracing();
        install_tracing();
        install_tracing_with(std::io::sink);
    }
}
