//! Lua back end: one routine per passage, driven by a host runtime `rt`.
//!
//! The generated module calls `rt:text`, `rt:choice`, `rt:set`, `rt:get`
//! and `rt:divert`; what they do is up to the host. Embedded scripts are
//! copied through unchanged.

use std::fmt::Write as _;

use crate::ast::{Assignment, BinaryOp, Choice, Conditional, Expr, Node, Passage, Story, UnaryOp};
use crate::token::{Literal, Span};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodegenError {
    /// The tree holds something only an unvalidated story can contain.
    #[error("cannot generate code for {what} at line {}, column {}", span.line, span.column)]
    InvalidAst { what: String, span: Span },
}

/// Generate a Lua module for `story`.
///
/// # Errors
///
/// Returns [`CodegenError::InvalidAst`] for an unmatched `{/}` or
/// `{else}`, which validation reports as an error first.
pub fn compile(story: &Story) -> Result<String, CodegenError> {
    let mut out = String::new();
    emit_header(story, &mut out);
    for passage in &story.passages {
        emit_passage(passage, &mut out)?;
    }
    out.push_str("\nreturn story\n");
    log::debug!(
        "generated {} passage routines, {} bytes",
        story.passages.len(),
        out.len()
    );
    Ok(out)
}

// ---------------------------------------------------------------------------
// Module header
// ---------------------------------------------------------------------------

fn emit_header(story: &Story, out: &mut String) {
    out.push_str("-- Generated by storyc. Do not edit.\n");
    out.push_str("local story = {}\n\n");
    let _ = writeln!(out, "story.title = {}", optional_string(story.title.as_deref()));
    let _ = writeln!(out, "story.author = {}", optional_string(story.author.as_deref()));

    if story.metadata.is_empty() {
        out.push_str("story.meta = {}\n");
    } else {
        out.push_str("story.meta = {\n");
        for (key, value) in &story.metadata {
            let _ = writeln!(out, "  [{}] = {},", lua_string(key), lua_string(value));
        }
        out.push_str("}\n");
    }

    let _ = writeln!(out, "story.start = {}", lua_string(story.entry_name()));

    let tagged: Vec<&Passage> = story
        .passages
        .iter()
        .filter(|p| !p.tags.is_empty())
        .collect();
    if tagged.is_empty() {
        out.push_str("story.tags = {}\n");
    } else {
        out.push_str("story.tags = {\n");
        for passage in tagged {
            let tags: Vec<String> = passage.tags.iter().map(|t| lua_string(t)).collect();
            let _ = writeln!(
                out,
                "  [{}] = {{ {} }},",
                lua_string(&passage.name),
                tags.join(", ")
            );
        }
        out.push_str("}\n");
    }
    out.push_str("story.passages = {}\n");
}

fn optional_string(value: Option<&str>) -> String {
    value.map_or_else(|| "nil".to_string(), lua_string)
}

// ---------------------------------------------------------------------------
// Passages and statements
// ---------------------------------------------------------------------------

fn emit_passage(passage: &Passage, out: &mut String) -> Result<(), CodegenError> {
    let _ = writeln!(
        out,
        "\nstory.passages[{}] = function(rt)",
        lua_string(&passage.name)
    );
    emit_block(&passage.body, 1, out)?;
    out.push_str("end\n");
    Ok(())
}

fn emit_block(nodes: &[Node], depth: usize, out: &mut String) -> Result<(), CodegenError> {
    for node in nodes {
        emit_node(node, depth, out)?;
    }
    Ok(())
}

fn emit_node(node: &Node, depth: usize, out: &mut String) -> Result<(), CodegenError> {
    let indent = "  ".repeat(depth);
    match node {
        Node::Text { content, .. } => {
            let _ = writeln!(out, "{indent}rt:text({})", lua_string(content));
        }
        Node::Choice(choice) => emit_choice(choice, &indent, out),
        Node::Assignment(assignment) => emit_assignment(assignment, &indent, out),
        Node::Conditional(cond) => emit_conditional(cond, depth, out)?,
        Node::EmbeddedScript { code, .. } => {
            let _ = writeln!(out, "{indent}{code}");
        }
        // `do ... end` lets the jump sit anywhere in a block.
        Node::Divert { target, .. } => {
            let _ = writeln!(out, "{indent}do return rt:divert({}) end", lua_string(target));
        }
        Node::StrayMarker { marker, span } => {
            return Err(CodegenError::InvalidAst {
                what: format!("unmatched {marker:?} marker").to_lowercase(),
                span: *span,
            });
        }
    }
    Ok(())
}

fn emit_choice(choice: &Choice, indent: &str, out: &mut String) {
    let guard = choice.guard.as_ref().map_or_else(
        || "nil".to_string(),
        |guard| format!("function() return {} end", lower_expr(guard)),
    );
    let target = optional_string(choice.target.as_deref());
    let _ = writeln!(
        out,
        "{indent}rt:choice({}, {guard}, {target})",
        lua_string(&choice.text)
    );
}

fn emit_assignment(assignment: &Assignment, indent: &str, out: &mut String) {
    let value = match assignment.op.binary() {
        None => lower_expr(&assignment.value),
        Some(op) => lower_expr(&Expr::Binary {
            op,
            left: Box::new(Expr::Var {
                name: assignment.variable.clone(),
                span: assignment.span,
            }),
            right: Box::new(assignment.value.clone()),
        }),
    };
    let _ = writeln!(
        out,
        "{indent}rt:set({}, {value})",
        lua_string(&assignment.variable)
    );
}

fn emit_conditional(cond: &Conditional, depth: usize, out: &mut String) -> Result<(), CodegenError> {
    let indent = "  ".repeat(depth);
    let _ = writeln!(out, "{indent}if {} then", lower_expr(&cond.guard));
    emit_block(&cond.body, depth + 1, out)?;
    if let Some(else_body) = &cond.else_body {
        let _ = writeln!(out, "{indent}else");
        emit_block(else_body, depth + 1, out)?;
    }
    let _ = writeln!(out, "{indent}end");
    Ok(())
}

// ---------------------------------------------------------------------------
// Expressions
// ---------------------------------------------------------------------------

/// Lua binding strength. All six comparisons share one level in Lua,
/// so equality over a comparison needs explicit parentheses.
const fn lua_precedence(expr: &Expr) -> u8 {
    match expr {
        Expr::Literal(_) | Expr::Var { .. } => 8,
        Expr::Unary { .. } => 7,
        Expr::Binary { op, .. } => match op {
            BinaryOp::Or => 1,
            BinaryOp::And => 2,
            BinaryOp::Eq
            | BinaryOp::NotEq
            | BinaryOp::Lt
            | BinaryOp::Le
            | BinaryOp::Gt
            | BinaryOp::Ge => 3,
            BinaryOp::Add | BinaryOp::Sub => 5,
            BinaryOp::Mul | BinaryOp::Div | BinaryOp::Mod => 6,
        },
    }
}

const fn lua_operator(op: BinaryOp) -> &'static str {
    match op {
        BinaryOp::Or => "or",
        BinaryOp::And => "and",
        BinaryOp::Eq => "==",
        BinaryOp::NotEq => "~=",
        BinaryOp::Lt => "<",
        BinaryOp::Le => "<=",
        BinaryOp::Gt => ">",
        BinaryOp::Ge => ">=",
        BinaryOp::Add => "+",
        BinaryOp::Sub => "-",
        BinaryOp::Mul => "*",
        BinaryOp::Div => "/",
        BinaryOp::Mod => "%",
    }
}

/// Lower an expression to Lua source with the parentheses Lua needs.
#[must_use]
pub fn lower_expr(expr: &Expr) -> String {
    match expr {
        Expr::Literal(lit) => lua_literal(lit),
        Expr::Var { name, .. } => format!("rt:get({})", lua_string(name)),
        Expr::Unary { op, operand } => {
            let inner = lower_operand(operand, 7);
            match op {
                UnaryOp::Not => format!("not {inner}"),
                // `--` would start a Lua comment.
                UnaryOp::Neg if inner.starts_with('-') => format!("-({inner})"),
                UnaryOp::Neg => format!("-{inner}"),
            }
        }
        Expr::Binary { op, left, right } => {
            let precedence = lua_precedence(expr);
            format!(
                "{} {} {}",
                lower_operand(left, precedence),
                lua_operator(*op),
                lower_operand(right, precedence + 1)
            )
        }
    }
}

fn lower_operand(expr: &Expr, min: u8) -> String {
    let lowered = lower_expr(expr);
    if lua_precedence(expr) < min {
        format!("({lowered})")
    } else {
        lowered
    }
}

fn lua_literal(lit: &Literal) -> String {
    match lit {
        // Lua reads 9223372036854775808 as a float.
        Literal::Int(i64::MIN) => "math.mininteger".to_string(),
        Literal::Int(n) => n.to_string(),
        Literal::Float(f) => format_float(*f),
        Literal::Str(s) => lua_string(s),
        Literal::Bool(b) => b.to_string(),
    }
}

#[allow(clippy::float_cmp)]
fn format_float(f: f64) -> String {
    if f.fract() == 0.0 && f.is_finite() {
        format!("{f:.1}")
    } else {
        format!("{f}")
    }
}

/// Double-quoted Lua string literal.
#[must_use]
pub fn lua_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for ch in s.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c.is_control() && c.is_ascii() => {
                let _ = write!(out, "\\{:03}", u32::from(c));
            }
            c if c.is_control() => {
                let _ = write!(out, "\\u{{{:X}}}", u32::from(c));
            }
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::tokenize;
    use crate::parser::parse_tokens;

    fn generate(input: &str) -> String {
        let lexed = tokenize(input, "test.story");
        let (story, errors) = parse_tokens(&lexed.tokens);
        assert!(errors.is_empty(), "{errors:?}");
        compile(&story).unwrap()
    }

    fn guard(input: &str) -> String {
        let lexed = tokenize(&format!(":: A\n{{{input}}}\n{{/}}\n"), "");
        let (story, _) = parse_tokens(&lexed.tokens);
        match &story.passages[0].body[0] {
            Node::Conditional(cond) => lower_expr(&cond.guard),
            other => panic!("expected conditional, got {other:?}"),
        }
    }

    #[test]
    fn one_routine_one_choice() {
        let lua = generate(":: Start\n* [Go on] -> End\n:: End\n");
        assert_eq!(lua.matches("= function(rt)").count(), 2);
        assert_eq!(lua.matches("rt:choice(").count(), 1);
        assert!(lua.contains("  rt:choice(\"Go on\", nil, \"End\")\n"));
        assert!(lua.ends_with("return story\n"));
    }

    #[test]
    fn header_fields() {
        let lua = generate("@title The Cave\n@ifid abc\n:: Start [dark intro]\n");
        assert!(lua.contains("story.title = \"The Cave\"\n"));
        assert!(lua.contains("story.author = nil\n"));
        assert!(lua.contains("  [\"ifid\"] = \"abc\",\n"));
        assert!(lua.contains("story.start = \"Start\"\n"));
        assert!(lua.contains("  [\"Start\"] = { \"dark\", \"intro\" },\n"));
    }

    #[test]
    fn statements() {
        let lua = generate(
            ":: Start\nHello \"you\".\n$gold = 10\n$gold -= 2 + 1\n{$gold != 7}\nodd\n{else}\n-> End\n{/}\n* {$gold >= 1} [Pay] -> End\n:: End\n",
        );
        let expected = "\
story.passages[\"Start\"] = function(rt)
  rt:text(\"Hello \\\"you\\\".\")
  rt:set(\"gold\", 10)
  rt:set(\"gold\", rt:get(\"gold\") - (2 + 1))
  if rt:get(\"gold\") ~= 7 then
    rt:text(\"odd\")
  else
    do return rt:divert(\"End\") end
  end
  rt:choice(\"Pay\", function() return rt:get(\"gold\") >= 1 end, \"End\")
end
";
        assert!(lua.contains(expected), "{lua}");
    }

    #[test]
    fn embedded_script_is_verbatim() {
        let lua = generate(":: Start\n<<\nrt:sound(\"drip\") -- ok\n  rt:wait(2)\n>>\n");
        assert!(lua.contains("\nrt:sound(\"drip\") -- ok\n  rt:wait(2)\n\nend\n"), "{lua}");
    }

    #[test]
    fn stray_marker_is_invalid() {
        let lexed = tokenize(":: Start\n{/}\n", "");
        let (story, _) = parse_tokens(&lexed.tokens);
        let err = compile(&story).unwrap_err();
        assert!(matches!(err, CodegenError::InvalidAst { span, .. } if span.line == 2));
    }

    #[test]
    fn operators_lower_to_lua() {
        assert_eq!(
            guard("not $a and $b or $c"),
            "not rt:get(\"a\") and rt:get(\"b\") or rt:get(\"c\")"
        );
        assert_eq!(guard("!($a || $b)"), "not (rt:get(\"a\") or rt:get(\"b\"))");
    }

    #[test]
    fn comparison_levels_get_parentheses() {
        assert_eq!(
            guard("$a == $b < $c"),
            "rt:get(\"a\") == (rt:get(\"b\") < rt:get(\"c\"))"
        );
        assert_eq!(guard("$a - ($b - $c)"), "rt:get(\"a\") - (rt:get(\"b\") - rt:get(\"c\"))");
        assert_eq!(guard("($a - $b) - $c"), "rt:get(\"a\") - rt:get(\"b\") - rt:get(\"c\")");
    }

    #[test]
    fn double_negation_is_not_a_comment() {
        assert_eq!(guard("- -1 > 0"), "-(-1) > 0");
    }

    #[test]
    fn literals() {
        assert_eq!(lua_literal(&Literal::Float(2.0)), "2.0");
        assert_eq!(lua_literal(&Literal::Float(0.25)), "0.25");
        assert_eq!(lua_string("a\u{1}2"), "\"a\\0012\"");
        assert_eq!(lua_string("a\u{85}b"), "\"a\\u{85}b\"");
        assert_eq!(lua_string("a\u{9f}"), "\"a\\u{9F}\"");
    }

    #[test]
    fn deterministic() {
        let input = "@b 2\n@a 1\n:: Start [x y]\n* [a] -> B\n:: B [z]\n";
        assert_eq!(generate(input), generate(input));
    }
}
