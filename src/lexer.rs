use std::fmt;

use serde::Serialize;

use crate::token::{Literal, Span, Token, TokenKind};

/// Classifies a lexer error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LexErrorKind {
    /// Double-quoted string not closed before the end of the line.
    UnterminatedString,
    /// `/*` without a matching `*/`.
    UnterminatedBlockComment,
    /// `<<` without a matching `>>`.
    UnterminatedScript,
    /// Integer literal that does not fit in 64 bits.
    InvalidNumber(String),
}

impl fmt::Display for LexErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnterminatedString => write!(f, "unterminated string literal"),
            Self::UnterminatedBlockComment => write!(f, "unterminated block comment"),
            Self::UnterminatedScript => {
                write!(f, "unterminated embedded script block, expected '>>'")
            }
            Self::InvalidNumber(text) => write!(f, "number literal out of range: {text}"),
        }
    }
}

/// Error recorded during lexing. Lexing never stops on one of these.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind} at line {}, column {}", span.line, span.column)]
pub struct LexError {
    pub kind: LexErrorKind,
    pub span: Span,
}

impl LexError {
    /// True for strings, comments, and script blocks that never closed.
    #[must_use]
    pub const fn is_unterminated(&self) -> bool {
        !matches!(self.kind, LexErrorKind::InvalidNumber(_))
    }
}

/// Output of [`tokenize`]: the full token stream plus every error found.
#[derive(Debug, Clone, PartialEq)]
pub struct Lexed {
    pub tokens: Vec<Token>,
    pub errors: Vec<LexError>,
}

/// Tokenize story source into a sequence of tokens ending in `Eof`.
///
/// The lexer is error tolerant: an unterminated string, block comment,
/// or script block becomes an `Error` token and is also recorded in
/// [`Lexed::errors`], then scanning continues.
#[must_use]
pub fn tokenize(source: &str, filename: &str) -> Lexed {
    let normalized = normalize_line_endings(source);
    let lexed = Lexer::new(&normalized).run();
    log::debug!(
        "{}: lexed {} tokens, {} lexical errors",
        crate::report::display_name(filename),
        lexed.tokens.len(),
        lexed.errors.len()
    );
    lexed
}

/// Strip a UTF-8 BOM and turn CRLF and lone CR into LF.
#[must_use]
pub fn normalize_line_endings(source: &str) -> String {
    let source = source.strip_prefix('\u{FEFF}').unwrap_or(source);
    source.replace("\r\n", "\n").replace('\r', "\n")
}

/// Operators and punctuation, longest spelling first so that the
/// first match is also the longest one.
const SYMBOLS: &[(&str, TokenKind)] = &[
    ("{else}", TokenKind::BlockElse),
    ("{/}", TokenKind::BlockClose),
    ("==", TokenKind::Eq),
    ("!=", TokenKind::NotEq),
    ("<=", TokenKind::Le),
    (">=", TokenKind::Ge),
    ("&&", TokenKind::And),
    ("||", TokenKind::Or),
    ("+=", TokenKind::PlusAssign),
    ("-=", TokenKind::MinusAssign),
    ("*=", TokenKind::StarAssign),
    ("/=", TokenKind::SlashAssign),
    ("{", TokenKind::LBrace),
    ("}", TokenKind::RBrace),
    ("[", TokenKind::LBracket),
    ("]", TokenKind::RBracket),
    ("(", TokenKind::LParen),
    (")", TokenKind::RParen),
    ("<", TokenKind::Lt),
    (">", TokenKind::Gt),
    ("!", TokenKind::Not),
    ("+", TokenKind::Plus),
    ("-", TokenKind::Minus),
    ("*", TokenKind::Star),
    ("/", TokenKind::Slash),
    ("%", TokenKind::Percent),
    ("=", TokenKind::Assign),
    ("$", TokenKind::Dollar),
];

const KEYWORDS: &[(&str, TokenKind)] = &[
    ("true", TokenKind::True),
    ("false", TokenKind::False),
    ("and", TokenKind::And),
    ("or", TokenKind::Or),
    ("not", TokenKind::Not),
];

/// What kind of line the scanner is in; decides how `[` is read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LineMode {
    Code,
    Passage,
    Choice,
}

#[derive(Debug, Clone, Copy)]
struct Mark {
    pos: usize,
    span: Span,
}

const fn is_blank(c: char) -> bool {
    matches!(c, ' ' | '\t')
}

const fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

const fn is_ident_continue(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

fn starts_token(c: char) -> bool {
    is_ident_continue(c) || "\"{}[]()<>=!&|+-*/%$".contains(c)
}

struct Lexer {
    chars: Vec<char>,
    pos: usize,
    line: usize,
    col: usize,
    depth: usize,
    tokens: Vec<Token>,
    errors: Vec<LexError>,
}

impl Lexer {
    fn new(input: &str) -> Self {
        Self {
            chars: input.chars().collect(),
            pos: 0,
            line: 1,
            col: 1,
            depth: 0,
            tokens: Vec::new(),
            errors: Vec::new(),
        }
    }

    fn run(mut self) -> Lexed {
        while self.peek().is_some() {
            self.scan_line();
        }
        let end = self.mark();
        self.push(TokenKind::Eof, None, end);
        Lexed {
            tokens: self.tokens,
            errors: self.errors,
        }
    }

    // -- primitives --

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn advance(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        if c == '\n' {
            self.line += 1;
            self.col = 1;
        } else {
            self.col += 1;
        }
        Some(c)
    }

    fn starts_with(&self, expected: &str) -> bool {
        expected
            .chars()
            .enumerate()
            .all(|(i, c)| self.peek_at(i) == Some(c))
    }

    fn match_str(&mut self, expected: &str) -> bool {
        if !self.starts_with(expected) {
            return false;
        }
        for _ in expected.chars() {
            self.advance();
        }
        true
    }

    fn consume_while(&mut self, predicate: impl Fn(char) -> bool) -> String {
        let mut out = String::new();
        while let Some(c) = self.peek() {
            if !predicate(c) {
                break;
            }
            out.push(c);
            self.advance();
        }
        out
    }

    fn skip_blanks(&mut self) {
        while self.peek().is_some_and(is_blank) {
            self.advance();
        }
    }

    const fn mark(&self) -> Mark {
        Mark {
            pos: self.pos,
            span: Span {
                line: self.line,
                column: self.col,
            },
        }
    }

    fn push(&mut self, kind: TokenKind, value: Option<Literal>, start: Mark) {
        self.tokens.push(Token {
            kind,
            value,
            span: start.span,
            length: self.pos - start.pos,
            raw: self.chars[start.pos..self.pos].iter().collect(),
        });
    }

    fn push_error(&mut self, kind: LexErrorKind, start: Mark) {
        log::trace!("lex error at {}:{}: {kind}", start.span.line, start.span.column);
        let message = kind.to_string();
        self.push(TokenKind::Error { message }, None, start);
        self.errors.push(LexError {
            kind,
            span: start.span,
        });
    }

    // -- line dispatch --

    fn scan_line(&mut self) {
        self.depth = 0;
        self.skip_blanks();
        let Some(c) = self.peek() else {
            return;
        };
        match c {
            '\n' => self.newline(),
            ':' if self.peek_at(1) == Some(':') => self.scan_passage_line(),
            '*' if matches!(self.peek_at(1), None | Some(' ' | '\t' | '[' | '{' | '\n')) => {
                let start = self.mark();
                self.advance();
                self.push(TokenKind::ChoiceMarker, None, start);
                self.scan_code(LineMode::Choice);
            }
            '$' | '{' => self.scan_code(LineMode::Code),
            '-' if self.peek_at(1) == Some('>') => self.scan_code(LineMode::Code),
            '<' if self.peek_at(1) == Some('<') => self.scan_code(LineMode::Code),
            '/' if matches!(self.peek_at(1), Some('/' | '*')) => self.scan_code(LineMode::Code),
            '@' => self.scan_metadata_line(),
            '\\' => self.scan_escaped_text(),
            _ => self.scan_text_line(),
        }
    }

    fn newline(&mut self) {
        let start = self.mark();
        self.advance();
        self.push(TokenKind::Newline, None, start);
    }

    fn scan_passage_line(&mut self) {
        let start = self.mark();
        self.match_str("::");
        self.push(TokenKind::PassageMarker, None, start);
        self.scan_raw_name();
        self.scan_code(LineMode::Passage);
    }

    fn scan_metadata_line(&mut self) {
        let start = self.mark();
        self.advance(); // @
        let key = self.consume_while(|c| is_ident_continue(c) || c == '-');
        self.push(TokenKind::MetaKey, Some(Literal::Str(key)), start);
        self.skip_blanks();
        let value_start = self.mark();
        let rest = self.consume_while(|c| c != '\n');
        let value = rest.trim_end();
        if !value.is_empty() {
            let value = value.to_string();
            self.push(TokenKind::Text, Some(Literal::Str(value)), value_start);
        }
    }

    fn scan_text_line(&mut self) {
        let start = self.mark();
        let content = self.consume_while(|c| c != '\n');
        let text = content.trim_end().to_string();
        self.push(TokenKind::Text, Some(Literal::Str(text)), start);
    }

    fn scan_escaped_text(&mut self) {
        let start = self.mark();
        self.advance(); // backslash
        let content = self.consume_while(|c| c != '\n');
        let text = content.trim_end().to_string();
        self.push(TokenKind::Text, Some(Literal::Str(text)), start);
    }

    /// Passage names and arrow targets: raw text up to a bracket, brace,
    /// comment, or end of line, with surrounding blanks trimmed.
    fn scan_raw_name(&mut self) {
        self.skip_blanks();
        let mut i = 0;
        let mut len = 0;
        while let Some(c) = self.peek_at(i) {
            let comment = c == '/' && matches!(self.peek_at(i + 1), Some('/' | '*'));
            if matches!(c, '\n' | '[' | '{') || comment {
                break;
            }
            i += 1;
            if !is_blank(c) {
                len = i;
            }
        }
        if len == 0 {
            return;
        }
        let start = self.mark();
        for _ in 0..len {
            self.advance();
        }
        self.push(TokenKind::Identifier, None, start);
    }

    // -- code lines --

    fn scan_code(&mut self, mode: LineMode) {
        let mut display_seen = false;
        loop {
            self.skip_blanks();
            let Some(c) = self.peek() else {
                return;
            };
            let start = self.mark();
            match c {
                '\n' => {
                    if self.depth > 0 && !self.next_line_is_passage() {
                        self.advance();
                        continue;
                    }
                    self.depth = 0;
                    self.newline();
                    return;
                }
                '/' if self.peek_at(1) == Some('/') => {
                    self.consume_while(|c| c != '\n');
                    self.push(TokenKind::LineComment, None, start);
                }
                '/' if self.peek_at(1) == Some('*') => self.scan_block_comment(start),
                '<' if self.peek_at(1) == Some('<') => self.scan_script(start),
                '-' if self.peek_at(1) == Some('>') => {
                    self.match_str("->");
                    self.push(TokenKind::Arrow, None, start);
                    self.scan_raw_name();
                }
                '"' => self.scan_string(start),
                c if c.is_ascii_digit() => self.scan_number(start),
                c if is_ident_start(c) => self.scan_identifier(start),
                '[' if mode == LineMode::Choice && self.depth == 0 && !display_seen => {
                    display_seen = true;
                    self.scan_display_text(start);
                }
                '[' if mode == LineMode::Passage && self.depth == 0 => {
                    self.scan_tag_list(start);
                }
                _ => self.scan_symbol(start),
            }
        }
    }

    fn next_line_is_passage(&self) -> bool {
        let mut i = 1;
        while self.peek_at(i).is_some_and(is_blank) {
            i += 1;
        }
        self.peek_at(i) == Some(':') && self.peek_at(i + 1) == Some(':')
    }

    fn scan_block_comment(&mut self, start: Mark) {
        self.match_str("/*");
        loop {
            if self.match_str("*/") {
                self.push(TokenKind::BlockComment, None, start);
                return;
            }
            if self.advance().is_none() {
                self.push_error(LexErrorKind::UnterminatedBlockComment, start);
                return;
            }
        }
    }

    fn scan_script(&mut self, start: Mark) {
        self.match_str("<<");
        let code_start = self.pos;
        loop {
            if self.starts_with(">>") {
                let code: String = self.chars[code_start..self.pos].iter().collect();
                self.match_str(">>");
                self.push(TokenKind::EmbeddedScript, Some(Literal::Str(code)), start);
                return;
            }
            if self.advance().is_none() {
                self.push_error(LexErrorKind::UnterminatedScript, start);
                return;
            }
        }
    }

    fn scan_string(&mut self, start: Mark) {
        self.advance(); // opening quote
        let mut value = String::new();
        loop {
            match self.peek() {
                None | Some('\n') => {
                    self.push_error(LexErrorKind::UnterminatedString, start);
                    return;
                }
                Some('"') => {
                    self.advance();
                    break;
                }
                Some('\\') => {
                    self.advance();
                    match self.peek() {
                        Some('n') => value.push('\n'),
                        Some('t') => value.push('\t'),
                        Some('"') => value.push('"'),
                        Some('\\') => value.push('\\'),
                        Some(c) if c != '\n' => {
                            value.push('\\');
                            value.push(c);
                        }
                        _ => {
                            value.push('\\');
                            continue;
                        }
                    }
                    self.advance();
                }
                Some(c) => {
                    value.push(c);
                    self.advance();
                }
            }
        }
        self.push(TokenKind::String, Some(Literal::Str(value)), start);
    }

    fn scan_number(&mut self, start: Mark) {
        self.consume_while(|c| c.is_ascii_digit());
        let decimal = self.peek() == Some('.') && self.peek_at(1).is_some_and(|c| c.is_ascii_digit());
        if decimal {
            self.advance();
            self.consume_while(|c| c.is_ascii_digit());
        }
        let text: String = self.chars[start.pos..self.pos].iter().collect();
        let value = if decimal {
            text.parse::<f64>().ok().map(Literal::Float)
        } else {
            text.parse::<i64>().ok().map(Literal::Int)
        };
        match value {
            Some(value) => self.push(TokenKind::Number, Some(value), start),
            None => self.push_error(LexErrorKind::InvalidNumber(text), start),
        }
    }

    fn scan_identifier(&mut self, start: Mark) {
        let word = self.consume_while(is_ident_continue);
        let keyword = KEYWORDS
            .iter()
            .find(|(spelling, _)| *spelling == word)
            .map(|(_, kind)| kind.clone());
        match keyword {
            Some(TokenKind::True) => self.push(TokenKind::True, Some(Literal::Bool(true)), start),
            Some(TokenKind::False) => {
                self.push(TokenKind::False, Some(Literal::Bool(false)), start);
            }
            Some(kind) => self.push(kind, None, start),
            None => self.push(TokenKind::Identifier, None, start),
        }
    }

    /// Choice display text: everything up to the closing `]` on the
    /// same line. `\]`, `\[`, and `\\` escape.
    fn scan_display_text(&mut self, start: Mark) {
        self.advance();
        self.push(TokenKind::LBracket, None, start);

        let text_start = self.mark();
        let mut text = String::new();
        loop {
            match self.peek() {
                None | Some('\n' | ']') => break,
                Some('\\') if matches!(self.peek_at(1), Some(']' | '[' | '\\')) => {
                    self.advance();
                    if let Some(c) = self.advance() {
                        text.push(c);
                    }
                }
                Some(c) => {
                    text.push(c);
                    self.advance();
                }
            }
        }
        let trimmed = text.trim();
        if !trimmed.is_empty() {
            let value = trimmed.to_string();
            self.push(TokenKind::Text, Some(Literal::Str(value)), text_start);
        }

        if self.peek() == Some(']') {
            let close = self.mark();
            self.advance();
            self.push(TokenKind::RBracket, None, close);
        }
    }

    /// Passage tags: whitespace-separated words between brackets.
    fn scan_tag_list(&mut self, start: Mark) {
        self.advance();
        self.push(TokenKind::LBracket, None, start);
        loop {
            self.skip_blanks();
            let word_start = self.mark();
            match self.peek() {
                None | Some('\n') => return,
                Some(']') => {
                    self.advance();
                    self.push(TokenKind::RBracket, None, word_start);
                    return;
                }
                Some(_) => {
                    self.consume_while(|c| !is_blank(c) && c != ']' && c != '\n');
                    self.push(TokenKind::Identifier, None, word_start);
                }
            }
        }
    }

    fn scan_symbol(&mut self, start: Mark) {
        let matched = SYMBOLS
            .iter()
            .find(|(spelling, _)| self.starts_with(spelling))
            .map(|(spelling, kind)| (*spelling, kind.clone()));

        let Some((spelling, kind)) = matched else {
            // Catch-all: at least one character, then anything that
            // cannot start a more specific token.
            self.advance();
            let _ = self.consume_while(|c| !is_blank(c) && c != '\n' && !starts_token(c));
            let text: String = self.chars[start.pos..self.pos].iter().collect();
            self.push(TokenKind::Text, Some(Literal::Str(text)), start);
            return;
        };

        self.match_str(spelling);
        match kind {
            TokenKind::LBrace | TokenKind::LBracket | TokenKind::LParen => self.depth += 1,
            TokenKind::RBrace | TokenKind::RBracket | TokenKind::RParen => {
                self.depth = self.depth.saturating_sub(1);
            }
            _ => {}
        }
        self.push(kind, None, start);
    }
}
