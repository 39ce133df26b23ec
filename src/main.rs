//================================================
// [Solvra Main Runner]
//================================================
// Author: ZobieLabs
// License: Duality Public License (DPL v1.0)
// Goal: Command line runner for main scripts
// Objective: Evaluate one script with the basic host and report the outcome
//================================================

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser};
use serde::Serialize;
use solvra_main::cache_dir::CacheDirOverride;
use solvra_main::harness::install_tracing_with;
use solvra_main::{
    BasicScriptingHost, CompilationConfiguration, Diagnostic, EvaluationConfiguration,
    EvaluationOutcome, EvaluationResult, LoadingRoot, ScriptSource, ScriptTemplate, ScriptingHost,
};

#[derive(Parser)]
#[command(author, version, about = "Evaluate SolvraScript main scripts", long_about = None)]
struct Cli {
    /// Main script to evaluate
    script: PathBuf,
    /// Directory for compiled-script cache artifacts
    #[arg(long, conflicts_with = "no_cache")]
    cache_dir: Option<PathBuf>,
    /// Disable the compiled-script cache
    #[arg(long)]
    no_cache: bool,
    /// Reuse one instance of a dependency for every importer
    #[arg(long, default_value_t = true, action = ArgAction::Set)]
    share_instances: bool,
    /// Additional directory searched for imports (repeatable)
    #[arg(long = "search-root")]
    search_roots: Vec<PathBuf>,
    /// Print the outcome as JSON
    #[arg(long)]
    json: bool,
    /// Arguments bound to `args` inside the script
    #[arg(last = true)]
    args: Vec<String>,
}

#[derive(Serialize)]
struct Report<'a> {
    success: bool,
    value: Option<String>,
    output: &'a [String],
    diagnostics: &'a [Diagnostic],
}

impl<'a> Report<'a> {
    fn new(outcome: &'a EvaluationOutcome<EvaluationResult>) -> Self {
        let result = outcome.value();
        Self {
            success: outcome.is_success(),
            value: result.map(|r| r.value.to_string()),
            output: result.map(|r| r.output.as_slice()).unwrap_or_default(),
            diagnostics: outcome.reports(),
        }
    }
}

fn main() -> Result<ExitCode> {
    install_tracing_with(std::io::stderr);
    let cli = Cli::parse();

    let _cache_override = if cli.no_cache {
        Some(CacheDirOverride::install(Some("")))
    } else {
        cli.cache_dir
            .as_ref()
            .map(|dir| CacheDirOverride::install(Some(dir.as_os_str())))
    };

    let script = cli
        .script
        .canonicalize()
        .with_context(|| format!("failed to locate {}", cli.script.display()))?;

    let loading_root = if cli.search_roots.is_empty() {
        LoadingRoot::Isolated
    } else {
        LoadingRoot::Inherited(cli.search_roots.clone())
    };
    let mut evaluation = EvaluationConfiguration::new()
        .with_loading_root(loading_root)
        .with_constructor_args(cli.args.clone());
    if cli.share_instances {
        evaluation = evaluation.enable_script_instances_sharing();
    }
    let compilation = CompilationConfiguration::from_template(ScriptTemplate::simple_main());

    let outcome = BasicScriptingHost::new().eval(&ScriptSource::from_file(script), &compilation, &evaluation);

    if cli.json {
        let report = serde_json::to_string_pretty(&Report::new(&outcome))
            .context("failed to encode outcome report")?;
        println!("{}", report);
    } else {
        if let Some(result) = outcome.value() {
            for line in &result.output {
                println!("{}", line);
            }
            println!("=> {}", result.value);
        }
        for diagnostic in outcome.reports() {
            eprintln!("{}", diagnostic);
        }
    }

    Ok(if outcome.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(1)
    })
}
