use crate::command::{BuiltinCommand, ExitCode};
use crate::env::Environment;
use anyhow::{Context, Result, anyhow};
use std::env;
use std::fs;
use std::io::Write;
use std::path::PathBuf;

/// Returns true if `name` is executed in-process rather than spawned.
pub fn is_builtin(name: &str) -> bool {
    [Cd::name(), Pwd::name(), Echo::name(), Exit::name()].contains(&name)
}

/// Runs `argv` as a builtin if its name is one.
///
/// Returns `None` for any other command so the caller can fall through to
/// external execution. A failing builtin is reported on stderr and still
/// counts as handled.
pub fn run_builtin(
    argv: &[String],
    stdout: &mut dyn Write,
    env: &mut Environment,
) -> Option<ExitCode> {
    let (name, args) = argv.split_first()?;
    let code = match name.as_str() {
        "cd" => run::<Cd>(args, stdout, env),
        "pwd" => run::<Pwd>(args, stdout, env),
        "echo" => run::<Echo>(args, stdout, env),
        "exit" => run::<Exit>(args, stdout, env),
        _ => return None,
    };
    Some(code)
}

fn run<T: BuiltinCommand>(args: &[String], stdout: &mut dyn Write, env: &mut Environment) -> ExitCode {
    match T::from_args(args).execute(stdout, env) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("pipeshell: {:#}", e);
            1
        }
    }
}

/// Print the current working directory to standard output.
pub struct Pwd;

impl BuiltinCommand for Pwd {
    fn name() -> &'static str {
        "pwd"
    }

    fn from_args(_args: &[String]) -> Self {
        Pwd
    }

    fn execute(self, stdout: &mut dyn Write, env: &mut Environment) -> Result<ExitCode> {
        writeln!(stdout, "{}", env.current_dir.to_string_lossy())?;
        Ok(0)
    }
}

/// Change the current working directory.
/// If no target is provided, changes to the directory specified by the HOME variable.
pub struct Cd {
    /// Only the first argument is used; the rest are ignored.
    pub target: Option<String>,
}

impl BuiltinCommand for Cd {
    fn name() -> &'static str {
        "cd"
    }

    fn from_args(args: &[String]) -> Self {
        Cd {
            target: args.first().cloned(),
        }
    }

    fn execute(self, _stdout: &mut dyn Write, env: &mut Environment) -> Result<ExitCode> {
        let target = match self.target {
            Some(t) => PathBuf::from(t),
            None => match env.get_var("HOME") {
                Some(home) if !home.is_empty() => PathBuf::from(home),
                _ => return Err(anyhow!("cd: HOME not set")),
            },
        };

        let new_dir = if target.is_absolute() || target.as_os_str().is_empty() {
            target
        } else {
            env.current_dir.join(target)
        };

        let canonical = fs::canonicalize(&new_dir)
            .with_context(|| format!("cd: can't canonicalize {}", new_dir.display()))?;

        env::set_current_dir(&canonical)
            .with_context(|| format!("cd: can't chdir to {}", canonical.display()))?;
        env.current_dir = canonical;
        Ok(0)
    }
}

/// Ends the session when typed alone; the read loop does the actual exiting.
pub struct Exit;

impl BuiltinCommand for Exit {
    fn name() -> &'static str {
        "exit"
    }

    fn from_args(_args: &[String]) -> Self {
        Exit
    }

    fn execute(self, _stdout: &mut dyn Write, _env: &mut Environment) -> Result<ExitCode> {
        Ok(0)
    }
}

/// Write the arguments to standard output, separated by spaces, with a trailing newline.
///
/// An argument starting with `$` is replaced by the value of the variable named
/// by the rest of it, or by nothing if that variable is unset.
pub struct Echo {
    pub args: Vec<String>,
}

impl BuiltinCommand for Echo {
    fn name() -> &'static str {
        "echo"
    }

    fn from_args(args: &[String]) -> Self {
        Echo {
            args: args.to_vec(),
        }
    }

    fn execute(self, stdout: &mut dyn Write, env: &mut Environment) -> Result<ExitCode> {
        let expanded: Vec<String> = self
            .args
            .into_iter()
            .map(|arg| match arg.strip_prefix('$') {
                Some(name) => env.get_var(name).unwrap_or_default(),
                None => arg,
            })
            .collect();
        writeln!(stdout, "{}", expanded.join(" "))?;
        Ok(0)
    }
}
