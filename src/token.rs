use std::fmt;

/// Source location for error reporting. Both fields are 1-based;
/// `Span::default()` marks nodes that were built in code.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Span {
    pub line: usize,
    pub column: usize,
}

impl Span {
    #[must_use]
    pub const fn new(line: usize, column: usize) -> Self {
        Self { line, column }
    }
}

/// Literal value carried by number, string, and boolean tokens.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Int(i64),
    Float(f64),
    Str(String),
    Bool(bool),
}

/// Token kinds produced by the lexer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenKind {
    /// Passage start marker `::`.
    PassageMarker,
    /// Metadata key `@name` (value carries the key without `@`).
    MetaKey,
    /// Choice marker `*` at the start of a line.
    ChoiceMarker,
    /// Variable name, passage name, or tag.
    Identifier,
    /// Integer or decimal number.
    Number,
    /// Double-quoted string (`"..."`).
    String,
    /// `true`
    True,
    /// `false`
    False,
    /// Prose, choice display text, or any run not matched by another rule.
    Text,
    /// Variable sigil `$`.
    Dollar,
    /// "Goes to" arrow `->`.
    Arrow,
    /// `{`
    LBrace,
    /// `}`
    RBrace,
    /// `[`
    LBracket,
    /// `]`
    RBracket,
    /// `(`
    LParen,
    /// `)`
    RParen,
    /// Conditional close marker `{/}`.
    BlockClose,
    /// Conditional else marker `{else}`.
    BlockElse,
    /// `==`
    Eq,
    /// `!=`
    NotEq,
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `>`
    Gt,
    /// `>=`
    Ge,
    /// `&&` or `and`
    And,
    /// `||` or `or`
    Or,
    /// `!` or `not`
    Not,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    /// `=`
    Assign,
    /// `+=`
    PlusAssign,
    /// `-=`
    MinusAssign,
    /// `*=`
    StarAssign,
    /// `/=`
    SlashAssign,
    /// Embedded script block (`<< ... >>`), raw contents in the value.
    EmbeddedScript,
    /// Line comment (`// ...`).
    LineComment,
    /// Block comment (`/* ... */`).
    BlockComment,
    /// Significant line break.
    Newline,
    /// Lexical error; scanning continues after it.
    Error { message: String },
    /// End of input. Always the last token.
    Eof,
}

impl TokenKind {
    /// Comments carry no grammar and are skipped by the parser.
    #[must_use]
    pub const fn is_trivia(&self) -> bool {
        matches!(self, Self::LineComment | Self::BlockComment)
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::PassageMarker => "'::'",
            Self::MetaKey => "metadata key",
            Self::ChoiceMarker => "'*'",
            Self::Identifier => "identifier",
            Self::Number => "number",
            Self::String => "string",
            Self::True => "'true'",
            Self::False => "'false'",
            Self::Text => "text",
            Self::Dollar => "'$'",
            Self::Arrow => "'->'",
            Self::LBrace => "'{'",
            Self::RBrace => "'}'",
            Self::LBracket => "'['",
            Self::RBracket => "']'",
            Self::LParen => "'('",
            Self::RParen => "')'",
            Self::BlockClose => "'{/}'",
            Self::BlockElse => "'{else}'",
            Self::Eq => "'=='",
            Self::NotEq => "'!='",
            Self::Lt => "'<'",
            Self::Le => "'<='",
            Self::Gt => "'>'",
            Self::Ge => "'>='",
            Self::And => "'&&'",
            Self::Or => "'||'",
            Self::Not => "'!'",
            Self::Plus => "'+'",
            Self::Minus => "'-'",
            Self::Star => "'*'",
            Self::Slash => "'/'",
            Self::Percent => "'%'",
            Self::Assign => "'='",
            Self::PlusAssign => "'+='",
            Self::MinusAssign => "'-='",
            Self::StarAssign => "'*='",
            Self::SlashAssign => "'/='",
            Self::EmbeddedScript => "embedded script",
            Self::LineComment | Self::BlockComment => "comment",
            Self::Newline => "end of line",
            Self::Error { .. } => "invalid token",
            Self::Eof => "end of input",
        };
        f.write_str(s)
    }
}

/// A single token with its kind, literal value, and source location.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub value: Option<Literal>,
    pub span: Span,
    /// Number of source characters the token covers.
    pub length: usize,
    /// Source text exactly as written.
    pub raw: String,
}

impl Token {
    /// Short human description used in parser messages,
    /// e.g. `identifier 'gold'` or `'=='`.
    #[must_use]
    pub fn describe(&self) -> String {
        match self.kind {
            TokenKind::Identifier | TokenKind::Number | TokenKind::Text | TokenKind::String => {
                format!("{} '{}'", self.kind, self.raw)
            }
            _ => self.kind.to_string(),
        }
    }
}
