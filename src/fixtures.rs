//! Loader for the on-disk program fixtures under `tests/programs/`.
//!
//! Each case is a directory with a `case.yaml` describing the expected
//! outcome, a `program.my` source file, and the expectation files the case
//! refers to. The integration harness and the benches both load cases
//! through this module.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, ensure};
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CaseClass {
    /// Program runs to completion; stdout must match.
    RuntimeSuccess,
    /// Lexing or parsing fails; stderr must contain the expected fragment.
    FrontendError,
    /// Execution fails; stderr must contain the expected fragment.
    RuntimeError,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BenchConfig {
    pub enabled: bool,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ExpectedOutcome {
    pub exit_code: i32,
    #[serde(default)]
    pub stdout_file: Option<String>,
    #[serde(default)]
    pub stderr_contains_file: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CaseSpec {
    pub class: CaseClass,
    pub bench: BenchConfig,
    pub expected: ExpectedOutcome,
}

#[derive(Debug, Clone)]
pub struct Case {
    pub name: String,
    pub dir: PathBuf,
    pub program_path: PathBuf,
    pub spec: CaseSpec,
}

impl Case {
    pub fn read_text(&self, relative_path: &str) -> Result<String> {
        fs::read_to_string(self.dir.join(relative_path))
            .with_context(|| format!("Reading {} fixture file {}", self.name, relative_path))
    }

    pub fn source(&self) -> Result<String> {
        fs::read_to_string(&self.program_path)
            .with_context(|| format!("Reading program for {}", self.name))
    }
}

pub fn load_cases(programs_dir: &Path) -> Result<Vec<Case>> {
    let entries = fs::read_dir(programs_dir)
        .with_context(|| format!("Reading {}", programs_dir.display()))?;

    let mut cases = Vec::new();
    for entry in entries {
        let dir = entry?.path();
        let spec_path = dir.join("case.yaml");
        if !dir.is_dir() || !spec_path.exists() {
            continue;
        }

        let name = dir
            .file_name()
            .and_then(|value| value.to_str())
            .map(str::to_string)
            .with_context(|| format!("Invalid case directory name {}", dir.display()))?;
        let raw = fs::read_to_string(&spec_path)
            .with_context(|| format!("Reading {}", spec_path.display()))?;
        let spec: CaseSpec = serde_yaml::from_str(&raw)
            .with_context(|| format!("Parsing {}", spec_path.display()))?;

        let program_path = dir.join("program.my");
        ensure!(
            program_path.exists(),
            "Missing program.my for case {}",
            dir.display()
        );

        cases.push(Case {
            name,
            dir,
            program_path,
            spec,
        });
    }

    ensure!(
        !cases.is_empty(),
        "No test cases found in {}",
        programs_dir.display()
    );
    cases.sort_by(|left, right| left.name.cmp(&right.name));
    Ok(cases)
}
