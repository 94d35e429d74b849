#![allow(dead_code)]

use storyscript::{
    Assignment, Choice, Conditional, Expr, Node, Passage, Span, Story, parse_str, write,
};

/// Parse `input`, write it back, and require the exact same text.
pub fn roundtrip(input: &str) {
    let story = parse_str(input).expect("parse failed");
    let output = write(&story);
    assert_eq!(
        output, input,
        "round-trip mismatch:\n--- expected ---\n{input}\n--- got ---\n{output}"
    );
}

/// Helper: write a story, parse it back, assert structural equality
/// ignoring positions and passage order.
pub fn assert_story_roundtrip(original: &Story) {
    let written = write(original);
    let parsed = parse_str(&written).unwrap_or_else(|e| {
        panic!(
            "failed to re-parse written output: {e}\n\
             --- written ---\n{written}"
        )
    });

    let original = normalize(original.clone());
    let parsed = normalize(parsed);
    assert_eq!(
        (&original.title, &original.author, &original.metadata),
        (&parsed.title, &parsed.author, &parsed.metadata),
        "metadata mismatch\n--- written ---\n{written}"
    );
    assert_eq!(
        original.passages, parsed.passages,
        "passages mismatch\n--- written ---\n{written}"
    );
}

/// Drop every position and sort passages by name so that stories built
/// in code compare equal to parsed ones.
pub fn normalize(story: Story) -> Story {
    let mut passages: Vec<Passage> = story
        .passages
        .into_iter()
        .map(|passage| Passage {
            body: passage.body.into_iter().map(strip_node).collect(),
            span: Span::default(),
            ..passage
        })
        .collect();
    passages.sort_by(|a, b| a.name.cmp(&b.name));
    Story { passages, ..story }
}

fn strip_node(node: Node) -> Node {
    match node {
        Node::Text { content, .. } => Node::Text {
            content,
            span: Span::default(),
        },
        Node::Choice(choice) => Node::Choice(Choice {
            guard: choice.guard.map(strip_expr),
            span: Span::default(),
            ..choice
        }),
        Node::Assignment(assignment) => Node::Assignment(Assignment {
            value: strip_expr(assignment.value),
            span: Span::default(),
            ..assignment
        }),
        Node::Conditional(cond) => Node::Conditional(Conditional {
            guard: strip_expr(cond.guard),
            body: cond.body.into_iter().map(strip_node).collect(),
            else_body: cond
                .else_body
                .map(|nodes| nodes.into_iter().map(strip_node).collect()),
            open: Span::default(),
            close: cond.close.map(|_| Span::default()),
        }),
        Node::EmbeddedScript { code, .. } => Node::EmbeddedScript {
            code,
            span: Span::default(),
        },
        Node::Divert { target, .. } => Node::Divert {
            target,
            span: Span::default(),
        },
        Node::StrayMarker { marker, .. } => Node::StrayMarker {
            marker,
            span: Span::default(),
        },
    }
}

pub fn strip_expr(expr: Expr) -> Expr {
    match expr {
        Expr::Var { name, .. } => Expr::Var {
            name,
            span: Span::default(),
        },
        Expr::Unary { op, operand } => Expr::Unary {
            op,
            operand: Box::new(strip_expr(*operand)),
        },
        Expr::Binary { op, left, right } => Expr::Binary {
            op,
            left: Box::new(strip_expr(*left)),
            right: Box::new(strip_expr(*right)),
        },
        lit @ Expr::Literal(_) => lit,
    }
}
