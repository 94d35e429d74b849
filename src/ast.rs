use std::collections::{BTreeMap, BTreeSet};

use crate::token::{Literal, Span};

/// Name of the passage a story starts in unless `@start` says otherwise.
pub const DEFAULT_ENTRY: &str = "Start";

/// Complete story: metadata plus passages in source order.
#[derive(Debug, Clone, PartialEq)]
pub struct Story {
    pub title: Option<String>,
    pub author: Option<String>,
    /// Every other `@key value` line.
    pub metadata: BTreeMap<String, String>,
    pub passages: Vec<Passage>,
}

/// A named unit of story content.
#[derive(Debug, Clone, PartialEq)]
pub struct Passage {
    pub name: String,
    pub tags: BTreeSet<String>,
    pub body: Vec<Node>,
    pub span: Span,
}

/// A statement inside a passage body.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    /// A line of prose.
    Text { content: String, span: Span },
    /// `* {guard} [text] -> target`
    Choice(Choice),
    /// `$name op value`
    Assignment(Assignment),
    /// `{guard}` body `{else}` body `{/}`
    Conditional(Conditional),
    /// `<< ... >>`, passed through to the generated code untouched.
    EmbeddedScript { code: String, span: Span },
    /// `-> target`
    Divert { target: String, span: Span },
    /// A close or else marker with no open conditional.
    StrayMarker { marker: Marker, span: Span },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Choice {
    pub text: String,
    pub guard: Option<Expr>,
    pub target: Option<String>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Assignment {
    pub variable: String,
    pub op: AssignOp,
    pub value: Expr,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Conditional {
    pub guard: Expr,
    pub body: Vec<Node>,
    pub else_body: Option<Vec<Node>>,
    /// Position of the opening `{guard}`.
    pub open: Span,
    /// Position of the `{/}`; `None` when the passage ended first.
    pub close: Option<Span>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Marker {
    Close,
    Else,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignOp {
    Set,
    Add,
    Sub,
    Mul,
    Div,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Literal),
    Var { name: String, span: Span },
    Unary { op: UnaryOp, operand: Box<Self> },
    Binary { op: BinaryOp, left: Box<Self>, right: Box<Self> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Neg,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Or,
    And,
    Eq,
    NotEq,
    Lt,
    Le,
    Gt,
    Ge,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

/// Binding strength of binary operators, loosest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Precedence {
    Or,
    And,
    Equality,
    Relational,
    Additive,
    Multiplicative,
    Unary,
}

impl Precedence {
    /// The next tighter level; used for the right operand so equal
    /// precedence associates to the left.
    #[must_use]
    pub const fn tighter(self) -> Self {
        match self {
            Self::Or => Self::And,
            Self::And => Self::Equality,
            Self::Equality => Self::Relational,
            Self::Relational => Self::Additive,
            Self::Additive => Self::Multiplicative,
            Self::Multiplicative | Self::Unary => Self::Unary,
        }
    }
}

impl BinaryOp {
    #[must_use]
    pub const fn precedence(self) -> Precedence {
        match self {
            Self::Or => Precedence::Or,
            Self::And => Precedence::And,
            Self::Eq | Self::NotEq => Precedence::Equality,
            Self::Lt | Self::Le | Self::Gt | Self::Ge => Precedence::Relational,
            Self::Add | Self::Sub => Precedence::Additive,
            Self::Mul | Self::Div | Self::Mod => Precedence::Multiplicative,
        }
    }

    /// Canonical story-script spelling.
    #[must_use]
    pub const fn symbol(self) -> &'static str {
        match self {
            Self::Or => "||",
            Self::And => "&&",
            Self::Eq => "==",
            Self::NotEq => "!=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
            Self::Mod => "%",
        }
    }
}

impl AssignOp {
    #[must_use]
    pub const fn symbol(self) -> &'static str {
        match self {
            Self::Set => "=",
            Self::Add => "+=",
            Self::Sub => "-=",
            Self::Mul => "*=",
            Self::Div => "/=",
        }
    }

    /// The arithmetic a compound assignment performs, if any.
    #[must_use]
    pub const fn binary(self) -> Option<BinaryOp> {
        match self {
            Self::Set => None,
            Self::Add => Some(BinaryOp::Add),
            Self::Sub => Some(BinaryOp::Sub),
            Self::Mul => Some(BinaryOp::Mul),
            Self::Div => Some(BinaryOp::Div),
        }
    }
}

impl Story {
    /// Name of the entry passage: the `start` metadata key, or `Start`.
    #[must_use]
    pub fn entry_name(&self) -> &str {
        self.metadata.get("start").map_or(DEFAULT_ENTRY, String::as_str)
    }

    #[must_use]
    pub fn find_passage(&self, name: &str) -> Option<&Passage> {
        self.passages.iter().find(|p| p.name == name)
    }

    /// Every variable that some passage assigns to.
    #[must_use]
    pub fn assigned_variables(&self) -> BTreeSet<&str> {
        let mut assigned = BTreeSet::new();
        for passage in &self.passages {
            walk_nodes(&passage.body, &mut |node| {
                if let Node::Assignment(assignment) = node {
                    assigned.insert(assignment.variable.as_str());
                }
            });
        }
        assigned
    }
}

impl Expr {
    #[must_use]
    pub const fn literal(&self) -> Option<&Literal> {
        match self {
            Self::Literal(lit) => Some(lit),
            _ => None,
        }
    }

    /// Height of the tree; a literal or variable is 1.
    #[must_use]
    pub fn depth(&self) -> usize {
        match self {
            Self::Literal(_) | Self::Var { .. } => 1,
            Self::Unary { operand, .. } => operand.depth() + 1,
            Self::Binary { left, right, .. } => left.depth().max(right.depth()) + 1,
        }
    }

    /// Every variable this expression reads, left to right.
    #[must_use]
    pub fn reads(&self) -> Vec<(&str, Span)> {
        let mut out = Vec::new();
        self.collect_reads(&mut out);
        out
    }

    fn collect_reads<'a>(&'a self, out: &mut Vec<(&'a str, Span)>) {
        match self {
            Self::Literal(_) => {}
            Self::Var { name, span } => out.push((name.as_str(), *span)),
            Self::Unary { operand, .. } => operand.collect_reads(out),
            Self::Binary { left, right, .. } => {
                left.collect_reads(out);
                right.collect_reads(out);
            }
        }
    }
}

/// Walk `nodes` depth-first, visiting conditional bodies and else
/// branches after their conditional.
pub fn walk_nodes<'a>(nodes: &'a [Node], f: &mut impl FnMut(&'a Node)) {
    for node in nodes {
        f(node);
        if let Node::Conditional(cond) = node {
            walk_nodes(&cond.body, f);
            if let Some(else_body) = &cond.else_body {
                walk_nodes(else_body, f);
            }
        }
    }
}
