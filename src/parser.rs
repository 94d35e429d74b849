use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::ast::{
    AssignOp, Assignment, BinaryOp, Choice, Conditional, Expr, Marker, Node, Passage, Precedence,
    Story, UnaryOp,
};
use crate::diagnostic::{Code, Diagnostic};
use crate::token::{Literal, Span, Token, TokenKind};

/// Classifies a parser error. `found: None` means the line ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseErrorKind {
    /// `::` or `->` not followed by a name.
    ExpectedPassageName { found: Option<String> },
    /// `$` not followed by a name.
    ExpectedVariableName { found: Option<String> },
    /// `$name` not followed by `=`, `+=`, `-=`, `*=`, or `/=`.
    ExpectedAssignOp { found: Option<String> },
    /// An operand was missing.
    ExpectedExpression { found: Option<String> },
    /// A specific token was missing.
    Expected {
        expected: &'static str,
        found: Option<String>,
    },
    /// A line that starts with something no statement starts with.
    UnexpectedToken { found: String },
    /// Prose or statements before the first `::`.
    ContentOutsidePassage,
    /// `@key` after the first passage.
    MetadataAfterPassage { key: String },
    /// `@` with no key.
    EmptyMetadataKey,
    /// Conditionals or expressions nested past [`MAX_NESTING`].
    NestingTooDeep,
}

impl fmt::Display for ParseErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn found_suffix(found: Option<&String>) -> String {
            found.map_or_else(|| ", found end of line".to_string(), |t| format!(", found {t}"))
        }

        match self {
            Self::ExpectedPassageName { found } => {
                write!(f, "expected passage name{}", found_suffix(found.as_ref()))
            }
            Self::ExpectedVariableName { found } => {
                write!(f, "expected variable name after '$'{}", found_suffix(found.as_ref()))
            }
            Self::ExpectedAssignOp { found } => {
                write!(f, "expected assignment operator{}", found_suffix(found.as_ref()))
            }
            Self::ExpectedExpression { found } => {
                write!(f, "expected expression{}", found_suffix(found.as_ref()))
            }
            Self::Expected { expected, found } => {
                write!(f, "expected {expected}{}", found_suffix(found.as_ref()))
            }
            Self::UnexpectedToken { found } => write!(f, "unexpected {found}"),
            Self::ContentOutsidePassage => {
                write!(f, "content before the first passage, start one with ':: Name'")
            }
            Self::MetadataAfterPassage { key } => {
                write!(f, "metadata '@{key}' must appear before the first passage")
            }
            Self::EmptyMetadataKey => write!(f, "expected metadata key after '@'"),
            Self::NestingTooDeep => write!(f, "nesting deeper than {MAX_NESTING} levels"),
        }
    }
}

/// Syntax error produced during parsing.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind} at line {}, column {}", span.line, span.column)]
pub struct ParseError {
    pub kind: ParseErrorKind,
    pub span: Span,
}

impl From<&ParseError> for Diagnostic {
    fn from(err: &ParseError) -> Self {
        Self::error(Code::Syntax, err.span, err.kind.to_string())
    }
}

/// Parse a token stream into a best-effort `Story` plus every syntax
/// error found.
///
/// Lines holding a lexer `Error` token are skipped without a second
/// report.
#[must_use]
pub fn parse_tokens(tokens: &[Token]) -> (Story, Vec<ParseError>) {
    let mut parser = Parser::new(tokens);
    let story = parser.parse_story();
    (story, parser.errors)
}

/// Parse with statement-level error recovery, reporting syntax errors
/// as diagnostics.
#[must_use]
pub fn parse_with_recovery(tokens: &[Token], filename: &str) -> (Story, Vec<Diagnostic>) {
    let (story, errors) = parse_tokens(tokens);
    log::debug!(
        "{}: parsed {} passages, {} syntax errors",
        crate::report::display_name(filename),
        story.passages.len(),
        errors.len()
    );
    let diagnostics = errors.iter().map(Diagnostic::from).collect();
    (story, diagnostics)
}

/// Deepest conditional block, and tallest expression tree, the parser
/// accepts. Later stages recurse over the tree.
pub const MAX_NESTING: usize = 128;

const EOF: &TokenKind = &TokenKind::Eof;

/// How a statement block ended.
enum BlockEnd {
    Passage,
    Close(Span),
    Else(Span),
}

const fn binary_op(kind: &TokenKind) -> Option<BinaryOp> {
    Some(match kind {
        TokenKind::Or => BinaryOp::Or,
        TokenKind::And => BinaryOp::And,
        TokenKind::Eq => BinaryOp::Eq,
        TokenKind::NotEq => BinaryOp::NotEq,
        TokenKind::Lt => BinaryOp::Lt,
        TokenKind::Le => BinaryOp::Le,
        TokenKind::Gt => BinaryOp::Gt,
        TokenKind::Ge => BinaryOp::Ge,
        TokenKind::Plus => BinaryOp::Add,
        TokenKind::Minus => BinaryOp::Sub,
        TokenKind::Star => BinaryOp::Mul,
        TokenKind::Slash => BinaryOp::Div,
        TokenKind::Percent => BinaryOp::Mod,
        _ => return None,
    })
}

fn text_value(token: &Token) -> String {
    match &token.value {
        Some(Literal::Str(s)) => s.clone(),
        _ => token.raw.clone(),
    }
}

struct Parser<'a> {
    tokens: Vec<&'a Token>,
    pos: usize,
    errors: Vec<ParseError>,
    /// Open conditionals around the current statement.
    blocks: usize,
    /// Unary operators and parentheses around the current operand.
    depth: usize,
}

impl<'a> Parser<'a> {
    fn new(tokens: &'a [Token]) -> Self {
        Self {
            tokens: tokens.iter().filter(|t| !t.kind.is_trivia()).collect(),
            pos: 0,
            errors: Vec::new(),
            blocks: 0,
            depth: 0,
        }
    }

    // -- token access --

    fn current(&self) -> Option<&'a Token> {
        self.tokens.get(self.pos).copied()
    }

    fn kind(&self) -> &'a TokenKind {
        self.current().map_or(EOF, |t| &t.kind)
    }

    fn check(&self, kind: &TokenKind) -> bool {
        self.kind() == kind
    }

    fn advance(&mut self) -> Option<&'a Token> {
        let token = self.current()?;
        if token.kind != TokenKind::Eof {
            self.pos += 1;
        }
        Some(token)
    }

    fn span(&self) -> Span {
        self.current()
            .or_else(|| self.tokens.last().copied())
            .map_or(Span::new(1, 1), |t| t.span)
    }

    fn found(&self) -> Option<String> {
        match self.kind() {
            TokenKind::Newline | TokenKind::Eof => None,
            _ => self.current().map(Token::describe),
        }
    }

    fn error(&self, kind: ParseErrorKind) -> ParseError {
        ParseError {
            kind,
            span: self.span(),
        }
    }

    fn expect(&mut self, kind: &TokenKind, expected: &'static str) -> Result<(), ParseError> {
        if self.check(kind) {
            self.advance();
            Ok(())
        } else {
            Err(self.error(ParseErrorKind::Expected {
                expected,
                found: self.found(),
            }))
        }
    }

    fn expect_line_end(&mut self) -> Result<(), ParseError> {
        match self.kind() {
            TokenKind::Newline => {
                self.advance();
                Ok(())
            }
            TokenKind::Eof | TokenKind::PassageMarker => Ok(()),
            _ => Err(self.error(ParseErrorKind::Expected {
                expected: "end of line",
                found: self.found(),
            })),
        }
    }

    fn expect_passage_name(&mut self) -> Result<String, ParseError> {
        if self.check(&TokenKind::Identifier) {
            Ok(self.advance().map(|t| t.raw.clone()).unwrap_or_default())
        } else {
            Err(self.error(ParseErrorKind::ExpectedPassageName {
                found: self.found(),
            }))
        }
    }

    fn skip_newlines(&mut self) {
        while self.check(&TokenKind::Newline) {
            self.advance();
        }
    }

    // -- recovery --

    /// Skip to the next statement boundary. Returns true when a lexer
    /// error token was skipped on the way.
    fn synchronize(&mut self) -> bool {
        let mut saw_lex_error = false;
        loop {
            match self.kind() {
                TokenKind::Eof | TokenKind::PassageMarker => break,
                TokenKind::Newline => {
                    self.advance();
                    break;
                }
                TokenKind::Error { .. } => saw_lex_error = true,
                _ => {}
            }
            self.advance();
        }
        saw_lex_error
    }

    fn recover(&mut self, start: usize, err: ParseError) {
        let earlier = self.tokens[start..self.pos]
            .iter()
            .any(|t| matches!(t.kind, TokenKind::Error { .. }));
        let later = self.synchronize();
        if earlier || later {
            log::trace!("suppressed syntax error on a line with a lexical error: {err}");
        } else {
            log::trace!("syntax error: {err}");
            self.errors.push(err);
        }
    }

    // -- story structure --

    fn parse_story(&mut self) -> Story {
        let mut story = Story {
            title: None,
            author: None,
            metadata: BTreeMap::new(),
            passages: Vec::new(),
        };

        loop {
            self.skip_newlines();
            let start = self.pos;
            match self.kind() {
                TokenKind::Eof => break,
                TokenKind::PassageMarker => {
                    if let Some(passage) = self.parse_passage() {
                        story.passages.push(passage);
                    }
                }
                TokenKind::MetaKey => {
                    if let Err(err) = self.parse_metadata(&mut story) {
                        self.recover(start, err);
                    }
                }
                TokenKind::Error { .. } => {
                    self.synchronize();
                }
                _ => {
                    let err = self.error(ParseErrorKind::ContentOutsidePassage);
                    self.errors.push(err);
                    while !matches!(self.kind(), TokenKind::Eof | TokenKind::PassageMarker) {
                        self.advance();
                    }
                }
            }
        }

        story
    }

    fn parse_metadata(&mut self, story: &mut Story) -> Result<(), ParseError> {
        let span = self.span();
        let key = self.advance().map(text_value).unwrap_or_default();
        if key.is_empty() {
            return Err(ParseError {
                kind: ParseErrorKind::EmptyMetadataKey,
                span,
            });
        }
        let value = if self.check(&TokenKind::Text) {
            self.advance().map(text_value).unwrap_or_default()
        } else {
            String::new()
        };
        self.expect_line_end()?;

        match key.as_str() {
            "title" => story.title = Some(value),
            "author" => story.author = Some(value),
            _ => {
                story.metadata.insert(key, value);
            }
        }
        Ok(())
    }

    /// A header error after the name keeps the passage with the tags
    /// read so far. Without a name the body is still parsed, so its
    /// statements do not cascade into further errors, and then dropped.
    fn parse_passage(&mut self) -> Option<Passage> {
        let start = self.pos;
        let span = self.span();
        self.advance(); // ::

        let name = match self.expect_passage_name() {
            Ok(name) => Some(name),
            Err(err) => {
                self.recover(start, err);
                None
            }
        };
        let mut tags = BTreeSet::new();
        if name.is_some() {
            if let Err(err) = self.parse_passage_tags(&mut tags) {
                self.recover(start, err);
            }
        }

        let (body, _) = self.parse_block(false);
        name.map(|name| Passage {
            name,
            tags,
            body,
            span,
        })
    }

    fn parse_passage_tags(&mut self, tags: &mut BTreeSet<String>) -> Result<(), ParseError> {
        if self.check(&TokenKind::LBracket) {
            self.advance();
            while self.check(&TokenKind::Identifier) {
                if let Some(tag) = self.advance() {
                    tags.insert(tag.raw.clone());
                }
            }
            self.expect(&TokenKind::RBracket, "']'")?;
        }
        self.expect_line_end()
    }

    /// Statements until the passage ends or, when `nested`, until a
    /// `{/}` or `{else}` closes the enclosing conditional.
    fn parse_block(&mut self, nested: bool) -> (Vec<Node>, BlockEnd) {
        let mut nodes = Vec::new();
        loop {
            self.skip_newlines();
            let start = self.pos;
            let span = self.span();
            let marker = match self.kind() {
                TokenKind::Eof | TokenKind::PassageMarker => return (nodes, BlockEnd::Passage),
                TokenKind::BlockClose => Some(Marker::Close),
                TokenKind::BlockElse => Some(Marker::Else),
                _ => None,
            };

            if let Some(marker) = marker {
                self.advance();
                if let Err(err) = self.expect_line_end() {
                    self.recover(start, err);
                }
                if nested {
                    let end = match marker {
                        Marker::Close => BlockEnd::Close(span),
                        Marker::Else => BlockEnd::Else(span),
                    };
                    return (nodes, end);
                }
                nodes.push(Node::StrayMarker { marker, span });
                continue;
            }

            match self.parse_statement() {
                Ok(Some(node)) => nodes.push(node),
                Ok(None) => {}
                Err(err) => self.recover(start, err),
            }
        }
    }

    // -- statements --

    fn parse_statement(&mut self) -> Result<Option<Node>, ParseError> {
        let span = self.span();
        match self.kind() {
            TokenKind::Text => {
                let content = self.advance().map(text_value).unwrap_or_default();
                self.expect_line_end()?;
                Ok(Some(Node::Text { content, span }))
            }
            TokenKind::EmbeddedScript => {
                let code = self.advance().map(text_value).unwrap_or_default();
                self.expect_line_end()?;
                Ok(Some(Node::EmbeddedScript { code, span }))
            }
            TokenKind::Dollar => self.parse_assignment().map(Some),
            TokenKind::ChoiceMarker => self.parse_choice().map(Some),
            TokenKind::LBrace => Ok(self.parse_conditional()),
            TokenKind::Arrow => {
                self.advance();
                let target = self.expect_passage_name()?;
                self.expect_line_end()?;
                Ok(Some(Node::Divert { target, span }))
            }
            TokenKind::MetaKey => {
                let key = self.current().map(text_value).unwrap_or_default();
                Err(self.error(ParseErrorKind::MetadataAfterPassage { key }))
            }
            _ => Err(self.error(ParseErrorKind::UnexpectedToken {
                found: self
                    .current()
                    .map_or_else(|| EOF.to_string(), Token::describe),
            })),
        }
    }

    fn parse_assignment(&mut self) -> Result<Node, ParseError> {
        let span = self.span();
        self.advance(); // $
        let variable = self.parse_variable_name()?;

        let op = match self.kind() {
            TokenKind::Assign => AssignOp::Set,
            TokenKind::PlusAssign => AssignOp::Add,
            TokenKind::MinusAssign => AssignOp::Sub,
            TokenKind::StarAssign => AssignOp::Mul,
            TokenKind::SlashAssign => AssignOp::Div,
            _ => {
                return Err(self.error(ParseErrorKind::ExpectedAssignOp {
                    found: self.found(),
                }));
            }
        };
        self.advance();

        let value = self.parse_expr()?;
        self.expect_line_end()?;
        Ok(Node::Assignment(Assignment {
            variable,
            op,
            value,
            span,
        }))
    }

    fn parse_choice(&mut self) -> Result<Node, ParseError> {
        let span = self.span();
        self.advance(); // *

        let guard = if self.check(&TokenKind::LBrace) {
            self.advance();
            let guard = self.parse_expr()?;
            self.expect(&TokenKind::RBrace, "'}' after choice condition")?;
            Some(guard)
        } else {
            None
        };

        self.expect(&TokenKind::LBracket, "'[' before choice text")?;
        let text = if self.check(&TokenKind::Text) {
            self.advance().map(text_value).unwrap_or_default()
        } else {
            String::new()
        };
        self.expect(&TokenKind::RBracket, "']' after choice text")?;

        let target = if self.check(&TokenKind::Arrow) {
            self.advance();
            Some(self.expect_passage_name()?)
        } else {
            None
        };
        self.expect_line_end()?;

        Ok(Node::Choice(Choice {
            text,
            guard,
            target,
            span,
        }))
    }

    /// A broken guard is reported and replaced by `false` so the body
    /// and its `{/}` still parse as one block. A conditional opened past
    /// [`MAX_NESTING`] is reported and skipped through its `{/}`.
    fn parse_conditional(&mut self) -> Option<Node> {
        let start = self.pos;
        let open = self.span();
        if self.blocks >= MAX_NESTING {
            let err = self.error(ParseErrorKind::NestingTooDeep);
            self.errors.push(err);
            self.skip_conditional();
            return None;
        }

        let guard = match self.parse_conditional_header() {
            Ok(guard) => guard,
            Err(err) => {
                self.recover(start, err);
                Expr::Literal(Literal::Bool(false))
            }
        };

        self.blocks += 1;
        let (body, end) = self.parse_block(true);
        let (else_body, close) = match end {
            BlockEnd::Passage => (None, None),
            BlockEnd::Close(span) => (None, Some(span)),
            BlockEnd::Else(_) => {
                let (else_body, close) = self.parse_else_block();
                (Some(else_body), close)
            }
        };
        self.blocks -= 1;

        Some(Node::Conditional(Conditional {
            guard,
            body,
            else_body,
            open,
            close,
        }))
    }

    /// Skip from a `{` at line start through its matching `{/}`, or to
    /// the end of the passage.
    fn skip_conditional(&mut self) {
        let mut open = 0usize;
        let mut line_start = true;
        loop {
            match self.kind() {
                TokenKind::Eof | TokenKind::PassageMarker => return,
                TokenKind::LBrace if line_start => open += 1,
                TokenKind::BlockClose => {
                    open = open.saturating_sub(1);
                    if open == 0 {
                        self.advance();
                        if self.check(&TokenKind::Newline) {
                            self.advance();
                        }
                        return;
                    }
                }
                _ => {}
            }
            line_start = self.check(&TokenKind::Newline);
            self.advance();
        }
    }

    fn parse_conditional_header(&mut self) -> Result<Expr, ParseError> {
        self.advance(); // {
        let guard = self.parse_expr()?;
        self.expect(&TokenKind::RBrace, "'}' after condition")?;
        self.expect_line_end()?;
        Ok(guard)
    }

    fn parse_else_block(&mut self) -> (Vec<Node>, Option<Span>) {
        let mut else_body = Vec::new();
        loop {
            let (mut nodes, end) = self.parse_block(true);
            else_body.append(&mut nodes);
            match end {
                BlockEnd::Passage => return (else_body, None),
                BlockEnd::Close(span) => return (else_body, Some(span)),
                BlockEnd::Else(span) => else_body.push(Node::StrayMarker {
                    marker: Marker::Else,
                    span,
                }),
            }
        }
    }

    fn parse_variable_name(&mut self) -> Result<String, ParseError> {
        if self.check(&TokenKind::Identifier) {
            Ok(self.advance().map(|t| t.raw.clone()).unwrap_or_default())
        } else {
            Err(self.error(ParseErrorKind::ExpectedVariableName {
                found: self.found(),
            }))
        }
    }

    // -- expressions --

    fn parse_expr(&mut self) -> Result<Expr, ParseError> {
        self.parse_binary(Precedence::Or)
    }

    /// Left-associative chains grow the tree without recursing, so
    /// their height is checked as they are built.
    fn parse_binary(&mut self, min: Precedence) -> Result<Expr, ParseError> {
        let mut left = self.parse_unary()?;
        let mut height = left.depth();
        while let Some(op) = binary_op(self.kind()) {
            let precedence = op.precedence();
            if precedence < min {
                break;
            }
            self.advance();
            let right = self.parse_binary(precedence.tighter())?;
            height = height.max(right.depth()) + 1;
            if height > MAX_NESTING {
                return Err(self.error(ParseErrorKind::NestingTooDeep));
            }
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    /// Run `parse` one operand level deeper, failing past [`MAX_NESTING`].
    fn nested(
        &mut self,
        parse: impl FnOnce(&mut Self) -> Result<Expr, ParseError>,
    ) -> Result<Expr, ParseError> {
        if self.depth >= MAX_NESTING {
            return Err(self.error(ParseErrorKind::NestingTooDeep));
        }
        self.depth += 1;
        let result = parse(self);
        self.depth -= 1;
        result
    }

    fn parse_unary(&mut self) -> Result<Expr, ParseError> {
        let op = match self.kind() {
            TokenKind::Not => UnaryOp::Not,
            TokenKind::Minus => UnaryOp::Neg,
            _ => return self.parse_primary(),
        };
        self.advance();
        let operand = self.nested(Self::parse_unary)?;
        Ok(Expr::Unary {
            op,
            operand: Box::new(operand),
        })
    }

    fn parse_primary(&mut self) -> Result<Expr, ParseError> {
        let span = self.span();
        match self.kind() {
            TokenKind::Number | TokenKind::String | TokenKind::True | TokenKind::False => {
                let literal = self.current().and_then(|t| t.value.clone());
                match literal {
                    Some(literal) => {
                        self.advance();
                        Ok(Expr::Literal(literal))
                    }
                    None => Err(self.error(ParseErrorKind::ExpectedExpression {
                        found: self.found(),
                    })),
                }
            }
            TokenKind::Dollar => {
                self.advance();
                let name = self.parse_variable_name()?;
                Ok(Expr::Var { name, span })
            }
            TokenKind::LParen => {
                self.advance();
                let inner = self.nested(Self::parse_expr)?;
                self.expect(&TokenKind::RParen, "')'")?;
                Ok(inner)
            }
            _ => Err(self.error(ParseErrorKind::ExpectedExpression {
                found: self.found(),
            })),
        }
    }
}
