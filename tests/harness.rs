use std::path::Path;

use anyhow::{Context, Result, ensure};
use mython::fixtures::{Case, CaseClass, load_cases};
use mython::{interpreter, lexer, parser};

fn normalize_output(output: &str) -> String {
    output.replace("\r\n", "\n").trim_end().to_string()
}

fn expected_error_fragment(case: &Case) -> Result<String> {
    let expected_file = case
        .spec
        .expected
        .stderr_contains_file
        .as_deref()
        .with_context(|| format!("Missing stderr expectation file in {}", case.name))?;
    Ok(case.read_text(expected_file)?.trim().to_string())
}

#[test]
fn runs_programs() -> Result<()> {
    let cases = load_cases(Path::new("tests/programs"))?;

    for case in cases {
        if case.spec.bench.enabled {
            ensure!(
                !case.spec.bench.tags.is_empty(),
                "Case {} has bench enabled but no tags",
                case.name
            );
        }
        let source = case.source()?;
        match case.spec.class {
            CaseClass::RuntimeSuccess => {
                ensure!(
                    case.spec.expected.exit_code == 0,
                    "Case {} expected exit code must be 0 for runtime_success",
                    case.name
                );
                let stdout_file = case
                    .spec
                    .expected
                    .stdout_file
                    .as_deref()
                    .with_context(|| format!("Missing stdout_file in {}", case.name))?;
                let expected = case.read_text(stdout_file)?;

                let mut output = Vec::new();
                interpreter::run(&source, &mut output)
                    .with_context(|| format!("Running {}", case.name))?;
                let actual = String::from_utf8_lossy(&output);
                assert_eq!(
                    normalize_output(&actual),
                    normalize_output(&expected),
                    "Output mismatch for {}",
                    case.name
                );
            }
            CaseClass::FrontendError => {
                ensure!(
                    case.spec.expected.exit_code == 1,
                    "Case {} expected exit code must be 1 for frontend_error",
                    case.name
                );
                let expected_error = expected_error_fragment(&case)?;
                let result = lexer::tokenize(&source)
                    .map_err(anyhow::Error::from)
                    .and_then(parser::parse_tokens);
                ensure!(
                    result.is_err(),
                    "Expected frontend error in {}, but parsing succeeded",
                    case.name
                );
                let actual = result.expect_err("result checked as err").to_string();
                ensure!(
                    actual.contains(&expected_error),
                    "Expected frontend error containing '{expected_error}' in {}, got '{actual}'",
                    case.name
                );
            }
            CaseClass::RuntimeError => {
                ensure!(
                    case.spec.expected.exit_code == 1,
                    "Case {} expected exit code must be 1 for runtime_error",
                    case.name
                );
                let expected_error = expected_error_fragment(&case)?;
                let mut output = Vec::new();
                let result = interpreter::run(&source, &mut output);
                ensure!(
                    result.is_err(),
                    "Expected runtime error in {}, but the program succeeded",
                    case.name
                );
                let actual = result.expect_err("result checked as err").to_string();
                ensure!(
                    actual.contains(&expected_error),
                    "Expected runtime error containing '{expected_error}' in {}, got '{actual}'",
                    case.name
                );
            }
        }
    }

    Ok(())
}
