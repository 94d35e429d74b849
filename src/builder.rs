//! Fluent constructors for building stories in code.
//!
//! Nodes built here carry `Span::default()` positions.

use std::collections::{BTreeMap, BTreeSet};

use crate::ast::{
    AssignOp, Assignment, BinaryOp, Choice, Conditional, Expr, Node, Passage, Story, UnaryOp,
};
use crate::token::{Literal, Span};

impl Story {
    /// Create a new empty story.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            title: None,
            author: None,
            metadata: BTreeMap::new(),
            passages: Vec::new(),
        }
    }

    /// Set the story title.
    #[must_use]
    pub fn title(mut self, title: &str) -> Self {
        self.title = Some(title.to_string());
        self
    }

    /// Set the story author.
    #[must_use]
    pub fn author(mut self, author: &str) -> Self {
        self.author = Some(author.to_string());
        self
    }

    /// Add a metadata entry.
    #[must_use]
    pub fn meta(mut self, key: &str, value: &str) -> Self {
        self.metadata.insert(key.to_string(), value.to_string());
        self
    }

    /// Make `name` the entry passage.
    #[must_use]
    pub fn start(self, name: &str) -> Self {
        self.meta("start", name)
    }

    /// Add a passage.
    #[must_use]
    pub fn passage(mut self, passage: Passage) -> Self {
        self.passages.push(passage);
        self
    }
}

impl Default for Story {
    fn default() -> Self {
        Self::new()
    }
}

impl Passage {
    /// Create an empty passage.
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            tags: BTreeSet::new(),
            body: Vec::new(),
            span: Span::default(),
        }
    }

    #[must_use]
    pub fn tag(mut self, tag: &str) -> Self {
        self.tags.insert(tag.to_string());
        self
    }

    /// Append any node to the body.
    #[must_use]
    pub fn node(mut self, node: Node) -> Self {
        self.body.push(node);
        self
    }

    /// Append a line of prose.
    #[must_use]
    pub fn text(self, content: &str) -> Self {
        self.node(Node::Text {
            content: content.to_string(),
            span: Span::default(),
        })
    }

    #[must_use]
    pub fn choice(self, choice: Choice) -> Self {
        self.node(Node::Choice(choice))
    }

    /// Append `$variable = value`.
    #[must_use]
    pub fn set(self, variable: &str, value: Expr) -> Self {
        self.assign(variable, AssignOp::Set, value)
    }

    /// Append an assignment with any operator.
    #[must_use]
    pub fn assign(self, variable: &str, op: AssignOp, value: Expr) -> Self {
        self.node(Node::Assignment(Assignment {
            variable: variable.to_string(),
            op,
            value,
            span: Span::default(),
        }))
    }

    #[must_use]
    pub fn conditional(self, conditional: Conditional) -> Self {
        self.node(Node::Conditional(conditional))
    }

    /// Append an embedded script block.
    #[must_use]
    pub fn script(self, code: &str) -> Self {
        self.node(Node::EmbeddedScript {
            code: code.to_string(),
            span: Span::default(),
        })
    }

    /// Append `-> target`.
    #[must_use]
    pub fn divert(self, target: &str) -> Self {
        self.node(Node::Divert {
            target: target.to_string(),
            span: Span::default(),
        })
    }
}

impl Choice {
    /// A choice with display text and no guard or target.
    #[must_use]
    pub fn new(text: &str) -> Self {
        Self {
            text: text.to_string(),
            guard: None,
            target: None,
            span: Span::default(),
        }
    }

    /// Set the passage the choice leads to.
    #[must_use]
    pub fn to(mut self, target: &str) -> Self {
        self.target = Some(target.to_string());
        self
    }

    /// Only offer the choice while `guard` holds.
    #[must_use]
    pub fn when(mut self, guard: Expr) -> Self {
        self.guard = Some(guard);
        self
    }
}

impl Conditional {
    /// A closed conditional with empty branches.
    #[must_use]
    pub const fn new(guard: Expr) -> Self {
        Self {
            guard,
            body: Vec::new(),
            else_body: None,
            open: Span::new(0, 0),
            close: Some(Span::new(0, 0)),
        }
    }

    /// Append a node to the branch taken when the guard holds.
    #[must_use]
    pub fn then(mut self, node: Node) -> Self {
        self.body.push(node);
        self
    }

    /// Append a node to the else branch, creating it if needed.
    #[must_use]
    pub fn otherwise(mut self, node: Node) -> Self {
        self.else_body.get_or_insert_with(Vec::new).push(node);
        self
    }
}

impl Expr {
    /// `$name`
    #[must_use]
    pub fn var(name: &str) -> Self {
        Self::Var {
            name: name.to_string(),
            span: Span::default(),
        }
    }

    #[must_use]
    pub const fn int(value: i64) -> Self {
        Self::Literal(Literal::Int(value))
    }

    #[must_use]
    pub const fn float(value: f64) -> Self {
        Self::Literal(Literal::Float(value))
    }

    #[must_use]
    pub fn string(value: &str) -> Self {
        Self::Literal(Literal::Str(value.to_string()))
    }

    #[must_use]
    pub const fn bool(value: bool) -> Self {
        Self::Literal(Literal::Bool(value))
    }

    #[must_use]
    pub fn unary(op: UnaryOp, operand: Self) -> Self {
        Self::Unary {
            op,
            operand: Box::new(operand),
        }
    }

    #[must_use]
    pub fn binary(op: BinaryOp, left: Self, right: Self) -> Self {
        Self::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }
}
