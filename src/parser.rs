use crate::lexer::{Operator, Token};
use log::warn;

/// One command position of a pipeline, bounded by pipe operators.
///
/// Holds words and redirection operators in source order. Redirections are kept
/// as typed [`Token::Op`] items so that a quoted `'<'` stays an ordinary word.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Stage {
    tokens: Vec<Token>,
}

impl Stage {
    pub fn new(tokens: Vec<Token>) -> Self {
        Self { tokens }
    }

    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }

    /// A stage with nothing in it, e.g. the middle of `a || b`. Never spawned.
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    fn push(&mut self, token: Token) {
        self.tokens.push(token);
    }
}

/// The ordered stages of one input line.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Pipeline {
    stages: Vec<Stage>,
}

impl Pipeline {
    pub fn new(stages: Vec<Stage>) -> Self {
        Self { stages }
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Number of pipes needed to connect the stages.
    pub fn pipe_count(&self) -> usize {
        self.stages.len().saturating_sub(1)
    }

    /// False when every stage is empty, so the line is a no-op.
    pub fn has_commands(&self) -> bool {
        self.stages.iter().any(|s| !s.is_empty())
    }
}

struct PipelineBuilder {
    stages: Vec<Stage>,
    current: Stage,
}

impl PipelineBuilder {
    fn new() -> Self {
        PipelineBuilder {
            stages: Vec::new(),
            current: Stage::default(),
        }
    }

    fn feed(&mut self, token: Token) {
        match token {
            // `|` always closes the stage, even an empty one.
            Token::Op(Operator::Pipe) => {
                let stage = std::mem::take(&mut self.current);
                self.stages.push(stage);
            }
            Token::Op(op @ (Operator::Background | Operator::Sequence)) => {
                warn!("operator `{}` is not supported, ignoring it", op.as_str());
            }
            token => self.current.push(token),
        }
    }

    fn build(mut self) -> Pipeline {
        // A trailing `|` leaves an empty stage behind; drop it.
        if !self.current.is_empty() {
            self.stages.push(self.current);
        }
        Pipeline::new(self.stages)
    }
}

/// Groups a token sequence into pipeline stages, splitting on `|`.
///
/// Words and redirection operators go to the current stage unchanged.
/// `&` and `;` have no execution semantics and are dropped with a warning.
pub fn construct_pipeline(tokens: Vec<Token>) -> Pipeline {
    let mut builder = PipelineBuilder::new();
    for token in tokens {
        builder.feed(token);
    }
    builder.build()
}
