//! Constant folding and dead-branch removal on parsed stories.

use storyscript::optimizer::fold;
use storyscript::{
    BinaryOp, Conditional, Expr, Node, Passage, Story, codegen, optimize, parse_str, write,
};

fn optimized(input: &str) -> String {
    write(&optimize(parse_str(input).expect("parse failed")))
}

#[test]
fn folds_assignment_values() {
    assert_eq!(
        optimized(":: Start\n$x = 2 * 3 + 4\n$y = \"a\" == \"a\"\n$z = 3 - 10\n$m = 7 % 4\n"),
        ":: Start\n$x = 10\n$y = true\n$z = -7\n$m = 7 % 4\n"
    );
}

#[test]
fn keeps_live_branch_only() {
    assert_eq!(
        optimized(":: Start\n{1 > 2}\n  never\n{else}\n  always\n{/}\n{!false}\n  yes\n{/}\n"),
        ":: Start\nalways\nyes\n"
    );
}

#[test]
fn false_guard_without_else_disappears() {
    assert_eq!(optimized(":: Start\nbefore\n{false}\n  gone\n{/}\nafter\n"), ":: Start\nbefore\nafter\n");
}

#[test]
fn choice_guards() {
    assert_eq!(
        optimized(":: Start\n* {1 == 1} [Always] -> Start\n* {2 < 1} [Never] -> Start\n* {$gold > 1 + 1} [Maybe] -> Start\n"),
        ":: Start\n* [Always] -> Start\n* {$gold > 2} [Maybe] -> Start\n"
    );
}

#[test]
fn short_circuit_with_variables() {
    assert_eq!(
        optimized(":: Start\n$a = false && $b\n$c = true || $d\n$e = $f && true\n"),
        ":: Start\n$a = false\n$c = true\n$e = $f && true\n"
    );
}

#[test]
fn unsafe_arithmetic_is_left_alone() {
    assert_eq!(
        optimized(":: Start\n$a = 1 / 0\n$b = 9223372036854775807 + 1\n$c = 1 + \"x\"\n"),
        ":: Start\n$a = 1 / 0\n$b = 9223372036854775807 + 1\n$c = 1 + \"x\"\n"
    );
}

#[test]
fn smallest_integer_is_not_folded() {
    let source = ":: Start\n$x = -9223372036854775807 - 1\n";
    let written = optimized(source);
    assert_eq!(written, source);
    assert_eq!(write(&optimize(parse_str(&written).unwrap())), written);
}

#[test]
fn unterminated_conditional_is_kept() {
    let source = ":: Start\n{true}\n  open\n";
    assert_eq!(optimized(source), source);
}

#[test]
fn optimize_is_idempotent() {
    let source = "\
@title Fold
:: Start
$gold = 2 * 50
{$gold > 10 * 2 && true}
  {false}
    gone
  {else}
    * {3 >= 3} [Shop] -> Shop
  {/}
{/}
:: Shop
$gold -= 1 + 1
";
    let once = optimize(parse_str(source).unwrap());
    let twice = optimize(once.clone());
    assert_eq!(once, twice);
    assert_eq!(write(&once), write(&twice));
}

#[test]
fn optimized_story_generates_less_code() {
    let story = Story::new().passage(
        Passage::new("Start").conditional(
            Conditional::new(Expr::binary(BinaryOp::Eq, Expr::int(1), Expr::int(1))).then(
                Node::Divert {
                    target: "Start".to_string(),
                    span: storyscript::Span::default(),
                },
            ),
        ),
    );
    let plain = codegen::compile(&story).unwrap();
    let folded = codegen::compile(&optimize(story)).unwrap();
    assert!(plain.contains("if 1 == 1 then"));
    assert!(!folded.contains("if "));
    assert!(folded.contains("do return rt:divert(\"Start\") end"));
}

#[test]
fn fold_is_bottom_up() {
    let expr = Expr::binary(
        BinaryOp::Mul,
        Expr::var("n"),
        Expr::binary(BinaryOp::Add, Expr::int(1), Expr::int(2)),
    );
    assert_eq!(
        fold(expr),
        Expr::binary(BinaryOp::Mul, Expr::var("n"), Expr::int(3))
    );
}
