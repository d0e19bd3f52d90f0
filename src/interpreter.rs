//! Glue that wires the frontend to the evaluator.
//!
//! `run` takes a whole Mython source text, executes it against an empty
//! top-level closure, and writes program output to the given stream.

use std::io::Write;

use anyhow::Result;

use crate::runtime::{Closure, Executable, Interrupt, RuntimeError, SimpleContext};
use crate::{lexer, parser};

/// Runs a Mython program, writing its output to `output`.
pub fn run(source: &str, output: &mut dyn Write) -> Result<()> {
    let tokens = lexer::tokenize(source)?;
    let program = parser::parse_tokens(tokens)?;

    let mut globals = Closure::new();
    let mut context = SimpleContext::new(output);
    match program.execute(&mut globals, &mut context) {
        Ok(_) => Ok(()),
        // A return signal escaping the whole program means a stray
        // top-level `return`.
        Err(Interrupt::Return(_)) => Err(RuntimeError::ReturnOutsideMethod.into()),
        Err(Interrupt::Error(error)) => Err(error.into()),
    }
}
