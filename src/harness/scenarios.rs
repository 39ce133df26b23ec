use super::TEST_DATA_ROOT;
use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// One known-good fixture script.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixtureScenario {
    pub name: &'static str,
    /// Relative to [`TEST_DATA_ROOT`].
    pub script_path: &'static str,
}

impl FixtureScenario {
    pub fn path(&self) -> PathBuf {
        Path::new(TEST_DATA_ROOT).join(self.script_path)
    }
}

// exampleA/B: the dependant's function returns `any`; exampleC/D: it returns
// the shared generic `Model`. A and C dependants end in unit, B and D in a
// function reference.
pub static SCENARIOS: &[FixtureScenario] = &[
    FixtureScenario {
        name: "dependant_returns_unit_function_returns_any",
        script_path: "exampleA/runner.smain.svs",
    },
    FixtureScenario {
        name: "dependant_returns_function_ref_function_returns_any",
        script_path: "exampleB/runner.smain.svs",
    },
    FixtureScenario {
        name: "dependant_returns_unit_function_returns_model",
        script_path: "exampleC/runner.smain.svs",
    },
    FixtureScenario {
        name: "dependant_returns_unit_function_returns_model_runner_returns_model",
        script_path: "exampleC/runner_with_model_return.smain.svs",
    },
    FixtureScenario {
        name: "dependant_returns_unit_function_returns_model_runner_returns_local_model",
        script_path: "exampleC/runner_with_local_model_return.smain.svs",
    },
    FixtureScenario {
        name: "dependant_returns_function_ref_function_returns_model",
        script_path: "exampleD/runner.smain.svs",
    },
    FixtureScenario {
        name: "dependant_returns_function_ref_function_returns_model_runner_returns_local_model",
        script_path: "exampleD/runner_with_local_model_return.smain.svs",
    },
    FixtureScenario {
        name: "dependant_returns_function_ref_function_returns_model_runner_imports_model",
        script_path: "exampleD/runner_with_model_import.smain.svs",
    },
    FixtureScenario {
        name: "dependant_returns_function_ref_runner_returns_local_model_with_model_import",
        script_path: "exampleD/runner_with_local_model_return_and_model_script_import.smain.svs",
    },
    FixtureScenario {
        name: "dependant_returns_function_ref_runner_returns_local_model_with_model_import_not_first",
        script_path: "exampleD/runner_with_local_model_return_and_model_script_import_not_first_position.smain.svs",
    },
    FixtureScenario {
        name: "dependant_returns_function_ref_runner_returns_local_non_generic_model_with_model_import",
        script_path: "exampleD/runner_with_local_non_generic_model_return_and_model_script_import.smain.svs",
    },
];

static BY_NAME: Lazy<HashMap<&'static str, &'static FixtureScenario>> =
    Lazy::new(|| SCENARIOS.iter().map(|scenario| (scenario.name, scenario)).collect());

pub fn scenario(name: &str) -> Option<&'static FixtureScenario> {
    BY_NAME.get(name).copied()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn names_and_paths_are_unique() {
        let names: HashSet<_> = SCENARIOS.iter().map(|s| s.name).collect();
        let paths: HashSet<_> = SCENARIOS.iter().map(|s| s.script_path).collect();
        assert_eq!(names.len(), SCENARIOS.len());
        assert_eq!(paths.len(), SCENARIOS.len());
    }

    #[test]
    fn lookup_by_name() {
        let found = scenario("dependant_returns_function_ref_function_returns_any").expect("registered");
        assert_eq!(found.path(), Path::new("testData/exampleB/runner.smain.svs"));
        assert!(scenario("no_such_scenario").is_none());
    }

    #[test]
    fn every_fixture_exists() {
        let root = Path::new(env!("CARGO_MANIFEST_DIR"));
        for scenario in SCENARIOS {
            assert!(root.join(scenario.path()).is_file(), "{}", scenario.name);
        }
    }
}
