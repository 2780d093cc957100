use crate::command::ExitCode;
use std::collections::HashMap;
use std::env as stdenv;
use std::path::PathBuf;

/// State owned by one interpreter instance.
///
/// Builtins read and mutate it; spawned programs only inherit the process
/// environment and working directory.
#[derive(Debug, Clone)]
pub struct Environment {
    /// Snapshot of the environment variables, consulted by `cd` and `echo $NAME`.
    pub vars: HashMap<String, String>,
    /// The current working directory, kept in sync with the process by `cd`.
    pub current_dir: PathBuf,
    /// Set once the session should end.
    pub should_exit: bool,
    /// Status of the most recently executed line, if it produced one.
    pub last_status: Option<ExitCode>,
}

impl Environment {
    /// Capture the current process state into a new `Environment` instance.
    pub fn new() -> Self {
        let vars = stdenv::vars().collect();
        let current_dir = stdenv::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        Self {
            vars,
            current_dir,
            should_exit: false,
            last_status: None,
        }
    }

    /// Get the value of a variable from the snapshot.
    pub fn get_var(&self, key: &str) -> Option<String> {
        self.vars.get(key).cloned()
    }

    /// Set or override a variable in the snapshot.
    pub fn set_var(&mut self, key: impl Into<String>, val: impl Into<String>) {
        self.vars.insert(key.into(), val.into());
    }

    pub fn remove_var(&mut self, key: &str) -> Option<String> {
        self.vars.remove(key)
    }
}

impl Default for Environment {
    fn default() -> Self {
        Self::new()
    }
}
