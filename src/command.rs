use crate::env::Environment;
use anyhow::Result;
use std::io::Write;

/// Conventional process exit code type used by this crate.
///
/// A value of 0 indicates success; any non-zero value indicates failure.
pub type ExitCode = i32;

/// Status of a child that could not be set up or could not execute its program.
pub const EXIT_LAUNCH_FAILURE: ExitCode = 127;

/// Result of a pipeline that could not be built, or whose last process did not exit normally.
pub const PIPELINE_FAILURE: ExitCode = -1;

/// A command executed inside the interpreter process.
///
/// Builtins never fork. They get the cleaned argument vector without the command name.
pub trait BuiltinCommand: Sized {
    /// Canonical name of the command, e.g. "echo" or "cd".
    fn name() -> &'static str;

    /// Hand-written rather than `argh::FromArgs`: `echo` must pass `-n`/`--help`
    /// through verbatim and `cd`/`exit` ignore extra arguments, which argh rejects.
    fn from_args(args: &[String]) -> Self;

    /// Return value follows shell conventions: 0 for success, non-zero for error.
    fn execute(self, stdout: &mut dyn Write, env: &mut Environment) -> Result<ExitCode>;
}
