//! Writer-specific tests.

use storyscript::writer::write_expr;
use storyscript::{
    BinaryOp, Choice, Conditional, Expr, Node, Passage, Span, Story, UnaryOp, write,
};

#[test]
fn write_trailing_newline() {
    assert!(write(&Story::new()).ends_with('\n'));
    assert!(write(&Story::new().passage(Passage::new("Start"))).ends_with('\n'));
}

#[test]
fn write_blank_line_between_passages() {
    let story = Story::new()
        .passage(Passage::new("Start").text("a"))
        .passage(Passage::new("Next").text("b"));
    assert_eq!(write(&story), ":: Start\na\n\n:: Next\nb\n");
}

#[test]
fn write_entry_first_then_by_name() {
    let story = Story::new()
        .passage(Passage::new("Cellar"))
        .passage(Passage::new("Attic"))
        .passage(Passage::new("Start"));
    assert_eq!(write(&story), ":: Start\n\n:: Attic\n\n:: Cellar\n");
}

#[test]
fn write_metadata_order() {
    let story = Story::new()
        .meta("ifid", "X")
        .author("Ada")
        .title("Cave")
        .passage(Passage::new("Start"));
    assert_eq!(
        write(&story),
        "@title Cave\n@author Ada\n@ifid X\n\n:: Start\n"
    );
}

#[test]
fn write_nested_indentation() {
    let inner = Conditional::new(Expr::var("b")).then(Node::Text {
        content: "deep".to_string(),
        span: Span::default(),
    });
    let outer = Conditional::new(Expr::var("a")).then(Node::Conditional(inner));
    let story = Story::new().passage(Passage::new("Start").conditional(outer));
    assert_eq!(
        write(&story),
        ":: Start\n{$a}\n  {$b}\n    deep\n  {/}\n{/}\n"
    );
}

#[test]
fn write_multiline_text_node() {
    let story = Story::new().passage(Passage::new("Start").text("one\n\n* two"));
    assert_eq!(write(&story), ":: Start\none\n\\\n\\* two\n");
}

#[test]
fn write_prose_with_leading_blank_is_escaped() {
    let story = Story::new().passage(Passage::new("Start").text("  indented"));
    assert_eq!(write(&story), ":: Start\n\\  indented\n");
}

#[test]
fn write_choice_forms() {
    let story = Story::new().passage(
        Passage::new("Start")
            .choice(Choice::new("Wait"))
            .choice(Choice::new("Run").to("Start"))
            .choice(
                Choice::new("Pay")
                    .when(Expr::binary(BinaryOp::Ge, Expr::var("gold"), Expr::int(3)))
                    .to("Start"),
            ),
    );
    assert_eq!(
        write(&story),
        ":: Start\n* [Wait]\n* [Run] -> Start\n* {$gold >= 3} [Pay] -> Start\n"
    );
}

#[test]
fn write_expression_parentheses() {
    let sum = Expr::binary(BinaryOp::Add, Expr::var("a"), Expr::var("b"));
    assert_eq!(
        write_expr(&Expr::binary(BinaryOp::Mul, sum.clone(), Expr::int(2))),
        "($a + $b) * 2"
    );
    assert_eq!(
        write_expr(&Expr::binary(BinaryOp::Sub, Expr::int(1), sum.clone())),
        "1 - ($a + $b)"
    );
    assert_eq!(write_expr(&Expr::unary(UnaryOp::Neg, sum)), "-($a + $b)");
    assert_eq!(
        write_expr(&Expr::binary(
            BinaryOp::Or,
            Expr::bool(true),
            Expr::binary(BinaryOp::And, Expr::bool(false), Expr::string("s")),
        )),
        "true || false && \"s\""
    );
}

#[test]
fn write_smallest_integer_reparses() {
    let story = Story::new().passage(Passage::new("Start").assign(
        "x",
        storyscript::AssignOp::Set,
        Expr::binary(BinaryOp::Mul, Expr::var("y"), Expr::int(i64::MIN)),
    ));
    let written = write(&story);
    assert_eq!(written, ":: Start\n$x = $y * (-9223372036854775807 - 1)\n");
    assert!(storyscript::parse_str(&written).is_ok());
}
