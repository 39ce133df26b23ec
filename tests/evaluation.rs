mod util;

use solvra_main::cache_dir::with_cache_dir;
use solvra_main::diagnostics::ErrorCode;
use solvra_main::harness::{evaluate_file, failure_message};
use solvra_main::interpreter::Value;
use solvra_main::{
    BasicScriptingHost, CompilationConfiguration, EvaluationConfiguration, EvaluationOutcome,
    ScriptSource, ScriptTemplate, ScriptingHost,
};

#[test]
fn compiled_scripts_are_cached_and_reused() {
    let _lock = util::env_lock();
    let cache = tempfile::tempdir().expect("create cache dir");
    let script = util::fixture("exampleD/runner_with_model_import.smain.svs");

    let first = evaluate_file(&script, Some(cache.path()));
    assert!(first.is_success(), "{:?}", failure_message(&first));
    let artifacts = util::cache_artifacts(cache.path());
    assert_eq!(artifacts.len(), 3);

    let second = evaluate_file(&script, Some(cache.path()));
    assert!(second.is_success(), "{:?}", failure_message(&second));
    assert_eq!(util::cache_artifacts(cache.path()), artifacts);

    let compilation = CompilationConfiguration::from_template(ScriptTemplate::simple_main());
    let compiled = with_cache_dir(Some(cache.path()), || {
        BasicScriptingHost::new().compile(
            &ScriptSource::from_file(&script),
            &compilation,
            &EvaluationConfiguration::new(),
        )
    });
    let graph = compiled.into_value().expect("compiles");
    assert!(graph.scripts.values().all(|loaded| loaded.from_cache));
}

#[test]
fn uncached_evaluation_writes_no_artifacts() {
    let _lock = util::env_lock();
    let scratch = tempfile::tempdir().expect("create scratch dir");
    let script = util::write_script(scratch.path(), "solo.smain.svs", "1 + 2");
    let outcome = evaluate_file(&script, None);
    assert_eq!(outcome.into_value().map(|r| r.value), Some(Value::Int(3)));
    assert!(util::cache_artifacts(scratch.path()).is_empty());
}

#[test]
fn shared_instances_run_diamond_dependency_once() {
    let _lock = util::env_lock();
    let outcome = evaluate_file(&util::fixture("diamond/top.smain.svs"), None);
    let result = outcome.into_value().expect("diamond evaluates");
    assert_eq!(result.output, vec!["base instantiated".to_string()]);
    assert_eq!(result.value, Value::Int(43));
}

#[test]
fn unshared_instances_run_diamond_dependency_per_importer() {
    let _lock = util::env_lock();
    let outcome = with_cache_dir(Some(""), || {
        BasicScriptingHost::new().eval(
            &ScriptSource::from_file(util::fixture("diamond/top.smain.svs")),
            &CompilationConfiguration::from_template(ScriptTemplate::simple_main()),
            &EvaluationConfiguration::new(),
        )
    });
    let result = outcome.into_value().expect("diamond evaluates");
    assert_eq!(result.output.len(), 2);
}

#[test]
fn runtime_failure_reports_its_cause() {
    let _lock = util::env_lock();
    let outcome = evaluate_file(&util::fixture("failures/runtime_failure.smain.svs"), None);
    assert!(!outcome.is_success());
    let diagnostic = &outcome.reports()[0];
    assert_eq!(diagnostic.message, "Error evaluating script");
    assert_eq!(diagnostic.code, Some(ErrorCode::InvalidOperation));
    let cause = diagnostic.cause.as_deref().expect("cause");
    assert!(cause.starts_with("Division by zero"), "{}", cause);

    let message = failure_message(&outcome).expect("failure message");
    assert!(message.contains("Error evaluating script: Division by zero"));
}

#[test]
fn syntax_error_is_located() {
    let _lock = util::env_lock();
    let outcome = evaluate_file(&util::fixture("failures/syntax_error.smain.svs"), None);
    assert!(!outcome.is_success());
    let diagnostic = &outcome.reports()[0];
    assert_eq!(diagnostic.code, Some(ErrorCode::Syntax));
    let location = diagnostic.location.as_ref().expect("location");
    assert_eq!(location.line, 2);
    assert!(location.script.ends_with("syntax_error.smain.svs"));
}

#[test]
fn very_long_sum_is_a_located_syntax_error() {
    let _lock = util::env_lock();
    let scratch = tempfile::tempdir().expect("create scratch dir");
    let source = format!("1{}", " + 1".repeat(500));
    let script = util::write_script(scratch.path(), "long_sum.smain.svs", &source);
    match evaluate_file(&script, None) {
        EvaluationOutcome::Success { value, .. } => assert_eq!(value.value, Value::Int(501)),
        EvaluationOutcome::Failure { reports } => {
            assert_eq!(reports[0].code, Some(ErrorCode::Syntax));
            let location = reports[0].location.as_ref().expect("location");
            assert_eq!(location.line, 1);
            assert!(location.script.ends_with("long_sum.smain.svs"));
        }
    }
}

#[test]
fn long_negation_chain_does_not_abort() {
    let _lock = util::env_lock();
    let scratch = tempfile::tempdir().expect("create scratch dir");
    let source = format!("{}1", "-".repeat(200_000));
    let script = util::write_script(scratch.path(), "negations.smain.svs", &source);
    let outcome = evaluate_file(&script, None);
    assert!(!outcome.is_success());
    assert_eq!(outcome.reports()[0].code, Some(ErrorCode::Syntax));
}

#[test]
fn sum_within_the_nesting_limit_evaluates() {
    let _lock = util::env_lock();
    let scratch = tempfile::tempdir().expect("create scratch dir");
    let source = format!("1{}", " + 1".repeat(59));
    let script = util::write_script(scratch.path(), "sum.smain.svs", &source);
    let outcome = evaluate_file(&script, None);
    assert_eq!(outcome.into_value().map(|r| r.value), Some(Value::Int(60)));
}

#[test]
fn type_error_fails_compilation() {
    let _lock = util::env_lock();
    let outcome = evaluate_file(&util::fixture("failures/type_error.smain.svs"), None);
    assert!(!outcome.is_success());
    assert_eq!(outcome.reports().len(), 1);
    assert_eq!(outcome.reports()[0].code, Some(ErrorCode::TypeMismatch));
    assert_eq!(
        outcome.reports()[0].message,
        "Type mismatch: expected Model<string>, found Model<int>"
    );
}

#[test]
fn missing_import_is_a_module_error() {
    let _lock = util::env_lock();
    let outcome = evaluate_file(&util::fixture("failures/missing_import.smain.svs"), None);
    assert!(!outcome.is_success());
    assert_eq!(outcome.reports()[0].code, Some(ErrorCode::ModuleResolution));
}

#[test]
fn failure_message_contains_every_diagnostic_in_order() {
    let _lock = util::env_lock();
    let scratch = tempfile::tempdir().expect("create scratch dir");
    let script = util::write_script(
        scratch.path(),
        "many.smain.svs",
        "let a: int = \"one\";\nlet b = missing;\nlet c: Ghost = 1;",
    );
    let outcome = evaluate_file(&script, None);
    let EvaluationOutcome::Failure { reports } = &outcome else {
        panic!("expected failure");
    };
    assert_eq!(reports.len(), 3);

    let message = failure_message(&outcome).expect("failure message");
    let mut offset = 0;
    for diagnostic in reports {
        let found = message[offset..]
            .find(&diagnostic.summary())
            .unwrap_or_else(|| panic!("'{}' missing from message", diagnostic.message));
        offset += found + diagnostic.summary().len();
    }
}

#[test]
fn warnings_do_not_fail_an_evaluation() {
    let _lock = util::env_lock();
    let scratch = tempfile::tempdir().expect("create scratch dir");
    util::write_script(scratch.path(), "dep.smain.svs", "let shared = 5;");
    let script = util::write_script(
        scratch.path(),
        "twice.smain.svs",
        "import \"dep.smain.svs\";\nimport \"dep.smain.svs\";\nshared",
    );
    let outcome = evaluate_file(&script, None);
    assert!(outcome.is_success());
    assert_eq!(outcome.reports().len(), 1);
    assert_eq!(failure_message(&outcome), None);
}
