use crate::lexer::{Operator, Token};
use crate::parser::Stage;
use std::fs::{File, OpenOptions};
use std::io;
use std::os::unix::fs::OpenOptionsExt;

/// Permission bits for files created by output redirection (`rw-r--r--`).
pub const OUTPUT_FILE_MODE: u32 = 0o644;

/// Input/output redirections of one stage.
///
/// At most one of each direction is honoured; a later redirection of the same
/// direction overwrites an earlier one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RedirectionSpec {
    /// File to read standard input from (`< file`).
    pub input: Option<String>,
    /// File to write standard output to (`> file` or `>> file`).
    pub output: Option<String>,
    /// Append to `output` instead of truncating it.
    pub append: bool,
}

impl RedirectionSpec {
    pub fn is_empty(&self) -> bool {
        self.input.is_none() && self.output.is_none()
    }
}

/// Opens a redirection target for writing: created if absent, truncated unless `append`.
pub fn open_output_file(path: &str, append: bool) -> io::Result<File> {
    let mut options = OpenOptions::new();
    options.write(true).create(true).mode(OUTPUT_FILE_MODE);
    if append {
        options.append(true);
    } else {
        options.truncate(true);
    }
    options.open(path)
}

fn target_path(word: &str) -> Option<String> {
    let trimmed = word.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Separates a stage into its argument vector and its redirections.
///
/// An operator that is not followed by a word (`cat <`) is ignored.
pub fn extract_redirections(stage: &Stage) -> (Vec<String>, RedirectionSpec) {
    let mut argv = Vec::new();
    let mut spec = RedirectionSpec::default();
    let mut tokens = stage.tokens().iter().peekable();

    while let Some(token) = tokens.next() {
        match token {
            Token::Word(word) => argv.push(word.clone()),
            Token::Op(op @ (Operator::RedirectIn | Operator::RedirectOut | Operator::RedirectAppend)) => {
                let Some(Token::Word(target)) = tokens.peek() else {
                    continue;
                };
                let target = target_path(target);
                tokens.next();
                if *op == Operator::RedirectIn {
                    spec.input = target;
                } else {
                    spec.output = target;
                    spec.append = *op == Operator::RedirectAppend;
                }
            }
            Token::Op(_) => {}
        }
    }

    (argv, spec)
}
