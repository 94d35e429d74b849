//! Serializes a story back into canonical story-script text.
//!
//! Output is stable: parsing it and writing again gives the same text.

use std::fmt::Write as _;

use crate::ast::{Choice, Conditional, Expr, Marker, Node, Passage, Precedence, Story, UnaryOp};
use crate::token::Literal;

/// Line prefixes the lexer would read as something other than prose.
const SYNTAX_PREFIXES: &[&str] = &["::", "$", "*", "{", "@", "\\", "->", "<<", "//", "/*"];

/// Write `story` in canonical form: metadata, then the entry passage,
/// then the remaining passages by name.
#[must_use]
pub fn write(story: &Story) -> String {
    let mut out = String::new();
    write_metadata(&mut out, story);

    let entry = story.entry_name();
    let mut passages: Vec<&Passage> = story.passages.iter().collect();
    passages.sort_by(|a, b| {
        (a.name != entry)
            .cmp(&(b.name != entry))
            .then_with(|| a.name.cmp(&b.name))
    });

    for passage in passages {
        if !out.is_empty() {
            out.push('\n');
        }
        write_passage(&mut out, passage);
    }

    if !out.ends_with('\n') {
        out.push('\n');
    }
    out
}

fn write_metadata(out: &mut String, story: &Story) {
    let fixed = [("title", &story.title), ("author", &story.author)];
    for (key, value) in fixed {
        if let Some(value) = value {
            write_meta_line(out, key, value);
        }
    }
    for (key, value) in &story.metadata {
        write_meta_line(out, key, value);
    }
}

fn write_meta_line(out: &mut String, key: &str, value: &str) {
    if value.is_empty() {
        let _ = writeln!(out, "@{key}");
    } else {
        let _ = writeln!(out, "@{key} {value}");
    }
}

fn write_passage(out: &mut String, passage: &Passage) {
    let _ = write!(out, ":: {}", passage.name);
    if !passage.tags.is_empty() {
        let tags: Vec<&str> = passage.tags.iter().map(String::as_str).collect();
        let _ = write!(out, " [{}]", tags.join(" "));
    }
    out.push('\n');
    write_nodes(out, &passage.body, 0);
}

fn write_nodes(out: &mut String, nodes: &[Node], depth: usize) {
    for node in nodes {
        write_node(out, node, depth);
    }
}

fn write_node(out: &mut String, node: &Node, depth: usize) {
    let indent = "  ".repeat(depth);
    match node {
        Node::Text { content, .. } => {
            for line in content.split('\n') {
                let _ = writeln!(out, "{indent}{}", prose_line(line));
            }
        }
        Node::Choice(choice) => write_choice(out, choice, &indent),
        Node::Assignment(assignment) => {
            let _ = writeln!(
                out,
                "{indent}${} {} {}",
                assignment.variable,
                assignment.op.symbol(),
                write_expr(&assignment.value)
            );
        }
        Node::Conditional(cond) => write_conditional(out, cond, depth),
        Node::EmbeddedScript { code, .. } => {
            let _ = writeln!(out, "{indent}<<{code}>>");
        }
        Node::Divert { target, .. } => {
            let _ = writeln!(out, "{indent}-> {target}");
        }
        Node::StrayMarker { marker, .. } => {
            let spelling = match marker {
                Marker::Close => "{/}",
                Marker::Else => "{else}",
            };
            let _ = writeln!(out, "{indent}{spelling}");
        }
    }
}

/// A prose line, escaped with `\` when it would otherwise lex as
/// syntax, start with a blank, or be empty.
fn prose_line(line: &str) -> String {
    let line = line.trim_end();
    let needs_escape = line.is_empty()
        || line.starts_with([' ', '\t'])
        || SYNTAX_PREFIXES.iter().any(|prefix| line.starts_with(prefix));
    if needs_escape {
        format!("\\{line}")
    } else {
        line.to_string()
    }
}

fn write_choice(out: &mut String, choice: &Choice, indent: &str) {
    out.push_str(indent);
    out.push('*');
    if let Some(guard) = &choice.guard {
        let _ = write!(out, " {{{}}}", write_expr(guard));
    }
    let _ = write!(out, " [{}]", escape_display_text(&choice.text));
    if let Some(target) = &choice.target {
        let _ = write!(out, " -> {target}");
    }
    out.push('\n');
}

fn escape_display_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.trim().chars() {
        if matches!(ch, '[' | ']' | '\\') {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}

fn write_conditional(out: &mut String, cond: &Conditional, depth: usize) {
    let indent = "  ".repeat(depth);
    let _ = writeln!(out, "{indent}{{{}}}", write_expr(&cond.guard));
    write_nodes(out, &cond.body, depth + 1);
    if let Some(else_body) = &cond.else_body {
        let _ = writeln!(out, "{indent}{{else}}");
        write_nodes(out, else_body, depth + 1);
    }
    // An unterminated conditional stays unterminated.
    if cond.close.is_some() {
        let _ = writeln!(out, "{indent}{{/}}");
    }
}

// -- expressions --

const fn precedence(expr: &Expr) -> Precedence {
    match expr {
        Expr::Binary { op, .. } => op.precedence(),
        _ => Precedence::Unary,
    }
}

/// Write an expression with the fewest parentheses that parse back to
/// the same tree.
#[must_use]
pub fn write_expr(expr: &Expr) -> String {
    match expr {
        Expr::Literal(lit) => write_literal(lit),
        Expr::Var { name, .. } => format!("${name}"),
        Expr::Unary { op, operand } => {
            let symbol = match op {
                UnaryOp::Not => "!",
                UnaryOp::Neg => "-",
            };
            let inner = write_expr(operand);
            if matches!(**operand, Expr::Binary { .. }) {
                format!("{symbol}({inner})")
            } else {
                format!("{symbol}{inner}")
            }
        }
        Expr::Binary { op, left, right } => {
            let own = op.precedence();
            let left_text = write_expr(left);
            let right_text = write_expr(right);
            let left_text = if precedence(left) < own {
                format!("({left_text})")
            } else {
                left_text
            };
            let right_text = if precedence(right) <= own {
                format!("({right_text})")
            } else {
                right_text
            };
            format!("{left_text} {} {right_text}", op.symbol())
        }
    }
}

#[allow(clippy::float_cmp)]
fn write_literal(lit: &Literal) -> String {
    match lit {
        // The lexer reads digits only, and 9223372036854775808 overflows.
        Literal::Int(i64::MIN) => "(-9223372036854775807 - 1)".to_string(),
        Literal::Int(n) => n.to_string(),
        Literal::Float(f) if f.fract() == 0.0 => format!("{f:.1}"),
        Literal::Float(f) => f.to_string(),
        Literal::Bool(b) => b.to_string(),
        Literal::Str(s) => {
            let mut out = String::with_capacity(s.len() + 2);
            out.push('"');
            for ch in s.chars() {
                match ch {
                    '"' => out.push_str("\\\""),
                    '\\' => out.push_str("\\\\"),
                    '\n' => out.push_str("\\n"),
                    '\t' => out.push_str("\\t"),
                    c => out.push(c),
                }
            }
            out.push('"');
            out
        }
    }
}
