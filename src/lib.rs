//! A small line-oriented command interpreter.
//!
//! A line goes through a fixed pipeline: [`lexer`] turns it into words and
//! operators, [`parser`] splits those into stages on `|`, [`redirect`] pulls
//! `<`, `>` and `>>` out of each stage, and then either a [`builtin`] runs
//! inside this process or the [`executor`] forks one child per stage, wires
//! them together with pipes and waits for all of them.
//!
//! The main entry point is [`Interpreter`], which drives one line at a time
//! and owns the [`Environment`] that builtins act on.

pub mod builtin;
pub mod command;
pub mod env;
pub mod executor;
mod interpreter;
pub mod lexer;
pub mod logging;
pub mod parser;
pub mod redirect;

pub use command::ExitCode;
pub use env::Environment;
pub use interpreter::{Interpreter, ReplConfig};
