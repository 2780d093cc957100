//! Lexical analysis (tokenization) of a single input line.
//!
//! The lexer is a small character-driven state machine. It never fails: an
//! unterminated quote simply runs to the end of the line and a trailing
//! backslash is dropped.

use std::fmt;

/// Operators recognised by the lexer.
///
/// Only [`Operator::Pipe`] and the three redirections take part in execution.
/// `&` and `;` are lexically valid but have no execution semantics yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    /// The pipe operator, `|`.
    Pipe,
    /// Input redirection, `<`.
    RedirectIn,
    /// Output redirection that truncates the target, `>`.
    RedirectOut,
    /// Output redirection that appends to the target, `>>`.
    RedirectAppend,
    /// Background execution, `&`. Recognised but not implemented.
    Background,
    /// Command sequencing, `;`. Recognised but not implemented.
    Sequence,
}

impl Operator {
    /// The source text of the operator.
    pub fn as_str(self) -> &'static str {
        match self {
            Operator::Pipe => "|",
            Operator::RedirectIn => "<",
            Operator::RedirectOut => ">",
            Operator::RedirectAppend => ">>",
            Operator::Background => "&",
            Operator::Sequence => ";",
        }
    }
}

/// Represents a token resulting from lexical analysis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    /// A word with quotes and escapes already resolved.
    Word(String),
    /// One of the shell operators.
    Op(Operator),
}

impl Token {
    /// Text of the token as it would be passed on: the resolved word, or the operator symbol.
    pub fn text(&self) -> &str {
        match self {
            Token::Word(w) => w,
            Token::Op(op) => op.as_str(),
        }
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Word(w) => write!(f, "{:?} Word", w),
            Token::Op(op) => write!(f, "{} Op", op.as_str()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LexingState {
    Start,
    ReadingWord,
    ReadingSingleQuote,
    ReadingDoubleQuote,
}

struct LexingFSM {
    input: Vec<char>,
    pos: usize,
    state: LexingState,
    /// The word under construction. `Some("")` is a real (empty) word, e.g. from `''`.
    current_word: Option<String>,
}

impl LexingFSM {
    fn new(line: &str) -> Self {
        LexingFSM {
            input: line.chars().collect(),
            pos: 0,
            state: LexingState::Start,
            current_word: None,
        }
    }

    /// Runs the machine over the whole line and returns the tokens in order.
    fn make_tokens(&mut self) -> Vec<Token> {
        let mut out = Vec::new();

        while let Some(ch) = self.read_char() {
            match self.state {
                LexingState::Start => self.handle_start(ch, &mut out),
                LexingState::ReadingWord => self.handle_word(ch, &mut out),
                LexingState::ReadingSingleQuote => self.handle_single_quote(ch),
                LexingState::ReadingDoubleQuote => self.handle_double_quote(ch),
            }
        }

        // Unterminated quotes have consumed the rest of the line.
        self.finish_word(&mut out);
        out
    }

    fn read_char(&mut self) -> Option<char> {
        let ch = self.input.get(self.pos).copied();
        if ch.is_some() {
            self.pos += 1;
        }
        ch
    }

    fn peek_char(&self) -> Option<char> {
        self.input.get(self.pos).copied()
    }

    fn is_operator_start(ch: char) -> bool {
        matches!(ch, '|' | '<' | '>' | '&' | ';')
    }

    fn word(&mut self) -> &mut String {
        self.current_word.get_or_insert_with(String::new)
    }

    fn finish_word(&mut self, out: &mut Vec<Token>) {
        if let Some(word) = self.current_word.take() {
            out.push(Token::Word(word));
        }
    }

    /// `ch` has already been consumed. `>>` is the only two-character operator.
    fn read_operator(&mut self, ch: char) -> Operator {
        match ch {
            '|' => Operator::Pipe,
            '<' => Operator::RedirectIn,
            '>' if self.peek_char() == Some('>') => {
                self.read_char();
                Operator::RedirectAppend
            }
            '>' => Operator::RedirectOut,
            '&' => Operator::Background,
            ';' => Operator::Sequence,
            _ => unreachable!("not an operator start: {ch:?}"),
        }
    }

    /// Backslash outside quotes: take the next character literally, drop a trailing one.
    fn handle_escape(&mut self) {
        if let Some(next) = self.read_char() {
            self.word().push(next);
            self.state = LexingState::ReadingWord;
        }
    }

    fn handle_start(&mut self, ch: char, out: &mut Vec<Token>) {
        match ch {
            c if c.is_whitespace() => {}
            c if Self::is_operator_start(c) => {
                let op = self.read_operator(c);
                out.push(Token::Op(op));
            }
            '\'' => {
                self.word();
                self.state = LexingState::ReadingSingleQuote;
            }
            '"' => {
                self.word();
                self.state = LexingState::ReadingDoubleQuote;
            }
            '\\' => self.handle_escape(),
            c => {
                self.word().push(c);
                self.state = LexingState::ReadingWord;
            }
        }
    }

    fn handle_word(&mut self, ch: char, out: &mut Vec<Token>) {
        match ch {
            c if c.is_whitespace() => {
                self.finish_word(out);
                self.state = LexingState::Start;
            }
            c if Self::is_operator_start(c) => {
                self.finish_word(out);
                let op = self.read_operator(c);
                out.push(Token::Op(op));
                self.state = LexingState::Start;
            }
            '\'' => self.state = LexingState::ReadingSingleQuote,
            '"' => self.state = LexingState::ReadingDoubleQuote,
            '\\' => self.handle_escape(),
            c => self.word().push(c),
        }
    }

    fn handle_single_quote(&mut self, ch: char) {
        match ch {
            '\'' => self.state = LexingState::ReadingWord,
            c => self.word().push(c),
        }
    }

    fn handle_double_quote(&mut self, ch: char) {
        match ch {
            '"' => self.state = LexingState::ReadingWord,
            '\\' => match self.read_char() {
                Some(next) => self.word().push(next),
                None => self.word().push('\\'),
            },
            c => self.word().push(c),
        }
    }
}

/// The main entry point function to perform lexical analysis.
///
/// Whitespace outside quotes separates words. `| < > >> & ;` are operators
/// wherever they appear unquoted, even in the middle of a word. Single quotes
/// are fully literal. Inside double quotes a backslash escapes the next
/// character. Quoted and unquoted pieces that touch join into one word.
pub fn split_into_tokens(line: &str) -> Vec<Token> {
    let mut lexer = LexingFSM::new(line);
    lexer.make_tokens()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn w(s: &str) -> Token {
        Token::Word(s.to_string())
    }

    fn words(line: &str) -> Vec<String> {
        split_into_tokens(line)
            .into_iter()
            .map(|t| match t {
                Token::Word(s) => s,
                Token::Op(op) => panic!("unexpected operator {:?}", op),
            })
            .collect()
    }

    #[test]
    fn test_quotes_group_words() {
        assert_eq!(words(r#"echo "a b" 'c d' e"#), vec!["echo", "a b", "c d", "e"]);
    }

    #[test]
    fn test_escaped_space_joins_word() {
        assert_eq!(words(r"echo a\ b"), vec!["echo", "a b"]);
    }

    #[test]
    fn test_mid_word_quoting_concatenates() {
        assert_eq!(words("fo'o'bar"), vec!["foobar"]);
        assert_eq!(words(r#"a"b c"'d'"#), vec!["ab cd"]);
    }

    #[test]
    fn test_single_quotes_are_literal() {
        assert_eq!(words(r#"'a\"b'"#), vec![r#"a\"b"#]);
    }

    #[test]
    fn test_double_quote_escape() {
        assert_eq!(words(r#""say \"hi\"""#), vec![r#"say "hi""#]);
        assert_eq!(words(r#""a\\b""#), vec![r"a\b"]);
    }

    #[test]
    fn test_unterminated_quotes_read_to_end() {
        assert_eq!(words("echo 'abc | def"), vec!["echo", "abc | def"]);
        assert_eq!(words("echo \"x > y"), vec!["echo", "x > y"]);
    }

    #[test]
    fn test_trailing_backslash_is_dropped() {
        assert_eq!(words(r"echo abc\"), vec!["echo", "abc"]);
        assert_eq!(words(r"echo \"), vec!["echo"]);
    }

    #[test]
    fn test_empty_quotes_produce_empty_word() {
        assert_eq!(words("echo ''"), vec!["echo", ""]);
    }

    #[test]
    fn test_operators() {
        let tokens = split_into_tokens("cat<in|sort>>out > x & ;");
        assert_eq!(
            tokens,
            vec![
                w("cat"),
                Token::Op(Operator::RedirectIn),
                w("in"),
                Token::Op(Operator::Pipe),
                w("sort"),
                Token::Op(Operator::RedirectAppend),
                w("out"),
                Token::Op(Operator::RedirectOut),
                w("x"),
                Token::Op(Operator::Background),
                Token::Op(Operator::Sequence),
            ]
        );
    }

    #[test]
    fn test_quoted_operators_are_words() {
        assert_eq!(
            split_into_tokens(r#"echo '|' ">" \<"#),
            vec![w("echo"), w("|"), w(">"), w("<")]
        );
    }

    #[test]
    fn test_whitespace_only_line_has_no_tokens() {
        assert!(split_into_tokens(" \t  ").is_empty());
    }

    #[test]
    fn test_token_text() {
        assert_eq!(Token::Op(Operator::RedirectAppend).text(), ">>");
        assert_eq!(w("ls").text(), "ls");
    }
}
