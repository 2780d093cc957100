use crate::builtin;
use crate::command::ExitCode;
use crate::env::Environment;
use crate::executor;
use crate::lexer::{self, Token};
use crate::parser;
use crate::redirect::{self, RedirectionSpec};
use log::{debug, warn};
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use std::io::{self, Write};
use std::path::PathBuf;

/// Settings of the interactive read loop.
#[derive(Debug, Clone)]
pub struct ReplConfig {
    pub prompt: String,
    /// File to load history from at start and save it to at exit.
    pub history: Option<PathBuf>,
}

impl Default for ReplConfig {
    fn default() -> Self {
        Self {
            prompt: "pipeshell> ".to_string(),
            history: None,
        }
    }
}

/// A line-oriented command interpreter.
///
/// Each line is tokenized, split into pipeline stages and either handled by a
/// builtin (single-stage lines only) or run as a tree of child processes.
///
/// Example
/// ```no_run
/// use pipeshell::Interpreter;
/// let mut sh = Interpreter::new();
/// let code = sh.execute_line("ls -l | wc -l");
/// assert_eq!(code, Some(0));
/// ```
pub struct Interpreter {
    env: Environment,
}

impl Interpreter {
    /// Create an interpreter over a snapshot of the current process state.
    pub fn new() -> Self {
        Self::with_env(Environment::new())
    }

    pub fn with_env(env: Environment) -> Self {
        Self { env }
    }

    pub fn env(&self) -> &Environment {
        &self.env
    }

    pub fn should_exit(&self) -> bool {
        self.env.should_exit
    }

    /// Executes one input line.
    ///
    /// Returns the status of what ran, or `None` when nothing did: a blank
    /// line, a line with no command in it, or a bare `exit`, which ends the
    /// session instead.
    pub fn execute_line(&mut self, line: &str) -> Option<ExitCode> {
        if line.trim().is_empty() {
            return None;
        }

        let tokens = lexer::split_into_tokens(line);
        debug!("tokens: {:?}", tokens);
        if matches!(tokens.as_slice(), [Token::Word(word)] if word == "exit") {
            self.env.should_exit = true;
            return None;
        }

        let pipeline = parser::construct_pipeline(tokens);
        if !pipeline.has_commands() {
            return None;
        }
        debug!("pipeline: {:?}", pipeline);

        let status = match pipeline.stages() {
            [stage] => {
                let (argv, spec) = redirect::extract_redirections(stage);
                if argv.is_empty() {
                    return None;
                }
                if builtin::is_builtin(&argv[0]) {
                    self.run_builtin(&argv, &spec)
                } else {
                    executor::run_pipeline(&pipeline)
                }
            }
            _ => executor::run_pipeline(&pipeline),
        };

        debug!("line finished with status {}", status);
        self.env.last_status = Some(status);
        Some(status)
    }

    /// Builtin output goes to the redirection target if the stage has one.
    fn run_builtin(&mut self, argv: &[String], spec: &RedirectionSpec) -> ExitCode {
        let code = match &spec.output {
            Some(path) => match redirect::open_output_file(path, spec.append) {
                Ok(mut file) => builtin::run_builtin(argv, &mut file, &mut self.env),
                Err(e) => {
                    eprintln!("pipeshell: {}: {}", path, e);
                    return 1;
                }
            },
            None => {
                let mut stdout = io::stdout().lock();
                let code = builtin::run_builtin(argv, &mut stdout, &mut self.env);
                let _ = stdout.flush();
                code
            }
        };
        code.unwrap_or(0)
    }

    /// Reads and executes lines until end of input or a bare `exit`.
    pub fn repl(&mut self, config: &ReplConfig) -> rustyline::Result<()> {
        let mut rl = DefaultEditor::new()?;
        if let Some(path) = &config.history {
            if let Err(e) = rl.load_history(path) {
                debug!("no history loaded from {}: {}", path.display(), e);
            }
        }

        while !self.env.should_exit {
            match rl.readline(&config.prompt) {
                Ok(line) => {
                    if !line.trim().is_empty() {
                        rl.add_history_entry(line.as_str())?;
                    }
                    self.execute_line(&line);
                }
                Err(ReadlineError::Interrupted) => continue,
                Err(ReadlineError::Eof) => {
                    println!();
                    break;
                }
                Err(err) => {
                    eprintln!("pipeshell: {}", err);
                    break;
                }
            }
        }

        if let Some(path) = &config.history {
            if let Err(e) = rl.save_history(path) {
                warn!("could not save history to {}: {}", path.display(), e);
            }
        }
        Ok(())
    }
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new()
    }
}
