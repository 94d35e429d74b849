//! Constant folding and dead-branch removal over the story tree.

use crate::ast::{BinaryOp, Choice, Conditional, Expr, Node, Passage, Story, UnaryOp};
use crate::token::Literal;

/// Fold constant expressions and drop branches whose guard is a
/// boolean literal. Running it twice gives the same story as once.
#[must_use]
pub fn optimize(story: Story) -> Story {
    let passages = story
        .passages
        .into_iter()
        .map(|passage| Passage {
            body: optimize_nodes(passage.body),
            ..passage
        })
        .collect();
    log::debug!("optimized story");
    Story { passages, ..story }
}

fn optimize_nodes(nodes: Vec<Node>) -> Vec<Node> {
    let mut out = Vec::with_capacity(nodes.len());
    for node in nodes {
        match node {
            Node::Conditional(cond) => optimize_conditional(cond, &mut out),
            Node::Choice(choice) => {
                if let Some(choice) = optimize_choice(choice) {
                    out.push(Node::Choice(choice));
                }
            }
            Node::Assignment(mut assignment) => {
                assignment.value = fold(assignment.value);
                out.push(Node::Assignment(assignment));
            }
            other => out.push(other),
        }
    }
    out
}

/// Splices the live branch into `out` when the guard is constant.
/// An unterminated conditional is left in place for the validator.
fn optimize_conditional(cond: Conditional, out: &mut Vec<Node>) {
    let guard = fold(cond.guard);
    let body = optimize_nodes(cond.body);
    let else_body = cond.else_body.map(optimize_nodes);

    match (guard.literal(), cond.close) {
        (Some(Literal::Bool(true)), Some(_)) => {
            log::trace!("removed always-true conditional at line {}", cond.open.line);
            out.extend(body);
        }
        (Some(Literal::Bool(false)), Some(_)) => {
            log::trace!("removed always-false conditional at line {}", cond.open.line);
            out.extend(else_body.unwrap_or_default());
        }
        _ => out.push(Node::Conditional(Conditional {
            guard,
            body,
            else_body,
            open: cond.open,
            close: cond.close,
        })),
    }
}

fn optimize_choice(choice: Choice) -> Option<Choice> {
    let guard = choice.guard.map(fold);
    match guard.as_ref().and_then(Expr::literal) {
        Some(Literal::Bool(true)) => Some(Choice {
            guard: None,
            ..choice
        }),
        Some(Literal::Bool(false)) => {
            log::trace!("removed never-available choice at line {}", choice.span.line);
            None
        }
        _ => Some(Choice { guard, ..choice }),
    }
}

/// Fold `expr` bottom-up. Anything that cannot be evaluated safely at
/// compile time is rebuilt unchanged.
#[must_use]
pub fn fold(expr: Expr) -> Expr {
    match expr {
        Expr::Unary { op, operand } => {
            let operand = fold(*operand);
            match operand.literal().and_then(|lit| fold_unary(op, lit)) {
                Some(lit) => Expr::Literal(lit),
                None => Expr::Unary {
                    op,
                    operand: Box::new(operand),
                },
            }
        }
        Expr::Binary { op, left, right } => {
            let left = fold(*left);
            let right = fold(*right);
            if let Some(short) = short_circuit(op, &left) {
                return short;
            }
            let folded = match (left.literal(), right.literal()) {
                (Some(a), Some(b)) => fold_binary(op, a, b),
                _ => None,
            };
            folded.map_or_else(
                || Expr::Binary {
                    op,
                    left: Box::new(left),
                    right: Box::new(right),
                },
                Expr::Literal,
            )
        }
        other => other,
    }
}

fn short_circuit(op: BinaryOp, left: &Expr) -> Option<Expr> {
    match (op, left.literal()) {
        (BinaryOp::And, Some(Literal::Bool(false))) => Some(Expr::Literal(Literal::Bool(false))),
        (BinaryOp::Or, Some(Literal::Bool(true))) => Some(Expr::Literal(Literal::Bool(true))),
        _ => None,
    }
}

fn fold_unary(op: UnaryOp, operand: &Literal) -> Option<Literal> {
    match (op, operand) {
        (UnaryOp::Not, Literal::Bool(b)) => Some(Literal::Bool(!b)),
        (UnaryOp::Neg, Literal::Int(n)) => n.checked_neg().map(Literal::Int),
        (UnaryOp::Neg, Literal::Float(x)) => Some(Literal::Float(-x)),
        _ => None,
    }
}

fn fold_binary(op: BinaryOp, a: &Literal, b: &Literal) -> Option<Literal> {
    match op {
        BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul => fold_arith(op, a, b),
        BinaryOp::Div | BinaryOp::Mod => None,
        BinaryOp::Eq => literal_eq(a, b).map(Literal::Bool),
        BinaryOp::NotEq => literal_eq(a, b).map(|eq| Literal::Bool(!eq)),
        BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => fold_cmp(op, a, b),
        BinaryOp::And | BinaryOp::Or => match (a, b) {
            (Literal::Bool(x), Literal::Bool(y)) => Some(Literal::Bool(if op == BinaryOp::And {
                *x && *y
            } else {
                *x || *y
            })),
            _ => None,
        },
    }
}

/// Integer arithmetic is checked; an overflow leaves the expression
/// for the runtime to evaluate. So does `i64::MIN`, which has no
/// literal spelling.
#[allow(clippy::cast_precision_loss)]
fn fold_arith(op: BinaryOp, a: &Literal, b: &Literal) -> Option<Literal> {
    match (a, b) {
        (Literal::Int(x), Literal::Int(y)) => match op {
            BinaryOp::Add => x.checked_add(*y),
            BinaryOp::Sub => x.checked_sub(*y),
            BinaryOp::Mul => x.checked_mul(*y),
            _ => None,
        }
        .filter(|n| *n != i64::MIN)
        .map(Literal::Int),
        (Literal::Float(x), Literal::Float(y)) => float_arith(op, *x, *y),
        (Literal::Int(x), Literal::Float(y)) => float_arith(op, *x as f64, *y),
        (Literal::Float(x), Literal::Int(y)) => float_arith(op, *x, *y as f64),
        _ => None,
    }
}

fn float_arith(op: BinaryOp, x: f64, y: f64) -> Option<Literal> {
    let value = match op {
        BinaryOp::Add => x + y,
        BinaryOp::Sub => x - y,
        BinaryOp::Mul => x * y,
        _ => return None,
    };
    value.is_finite().then_some(Literal::Float(value))
}

/// Equality between literals of the same kind. Floats and mixed kinds
/// are left for the runtime.
fn literal_eq(a: &Literal, b: &Literal) -> Option<bool> {
    match (a, b) {
        (Literal::Int(x), Literal::Int(y)) => Some(x == y),
        (Literal::Str(x), Literal::Str(y)) => Some(x == y),
        (Literal::Bool(x), Literal::Bool(y)) => Some(x == y),
        _ => None,
    }
}

fn fold_cmp(op: BinaryOp, a: &Literal, b: &Literal) -> Option<Literal> {
    let ordering = match (a, b) {
        (Literal::Int(x), Literal::Int(y)) => x.cmp(y),
        (Literal::Str(x), Literal::Str(y)) => x.cmp(y),
        _ => return None,
    };
    let result = match op {
        BinaryOp::Lt => ordering.is_lt(),
        BinaryOp::Le => ordering.is_le(),
        BinaryOp::Gt => ordering.is_gt(),
        BinaryOp::Ge => ordering.is_ge(),
        _ => return None,
    };
    Some(Literal::Bool(result))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::tokenize;
    use crate::parser::parse_tokens;
    use crate::token::Span;

    fn parse(input: &str) -> Story {
        let lexed = tokenize(input, "test.story");
        let (story, errors) = parse_tokens(&lexed.tokens);
        assert!(errors.is_empty(), "{errors:?}");
        story
    }

    fn int(n: i64) -> Expr {
        Expr::Literal(Literal::Int(n))
    }

    fn binary(op: BinaryOp, left: Expr, right: Expr) -> Expr {
        Expr::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    fn var(name: &str) -> Expr {
        Expr::Var {
            name: name.to_string(),
            span: Span::default(),
        }
    }

    #[test]
    fn folds_integer_arithmetic() {
        let expr = binary(BinaryOp::Add, int(2), binary(BinaryOp::Mul, int(3), int(4)));
        assert_eq!(fold(expr), int(14));
    }

    #[test]
    fn overflow_is_not_folded() {
        let expr = binary(BinaryOp::Add, int(i64::MAX), int(1));
        assert_eq!(fold(expr.clone()), expr);
    }

    #[test]
    fn division_is_not_folded() {
        let expr = binary(BinaryOp::Div, int(7), int(2));
        assert_eq!(fold(expr.clone()), expr);
        let expr = binary(BinaryOp::Mod, int(7), int(2));
        assert_eq!(fold(expr.clone()), expr);
    }

    #[test]
    fn short_circuit_keeps_no_variable() {
        let expr = binary(
            BinaryOp::And,
            Expr::Literal(Literal::Bool(false)),
            var("x"),
        );
        assert_eq!(fold(expr), Expr::Literal(Literal::Bool(false)));
        let expr = binary(BinaryOp::Or, Expr::Literal(Literal::Bool(true)), var("x"));
        assert_eq!(fold(expr), Expr::Literal(Literal::Bool(true)));
    }

    #[test]
    fn comparisons_and_negation() {
        assert_eq!(
            fold(binary(BinaryOp::Le, int(3), int(3))),
            Expr::Literal(Literal::Bool(true))
        );
        let neg = Expr::Unary {
            op: UnaryOp::Neg,
            operand: Box::new(int(5)),
        };
        assert_eq!(fold(neg), int(-5));
    }

    #[test]
    fn variables_are_untouched() {
        let expr = binary(BinaryOp::Add, var("x"), int(1));
        assert_eq!(fold(expr.clone()), expr);
    }

    #[test]
    fn true_conditional_is_spliced() {
        let story = optimize(parse(":: A\nbefore\n{1 < 2}\ninside\n{else}\nother\n{/}\nafter\n"));
        let texts: Vec<&str> = story.passages[0]
            .body
            .iter()
            .filter_map(|node| match node {
                Node::Text { content, .. } => Some(content.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(texts, vec!["before", "inside", "after"]);
    }

    #[test]
    fn false_conditional_without_else_disappears() {
        let story = optimize(parse(":: A\n{false}\ninside\n{/}\n"));
        assert!(story.passages[0].body.is_empty());
    }

    #[test]
    fn unterminated_conditional_is_kept() {
        let story = optimize(parse(":: A\n{true}\ninside\n"));
        assert!(matches!(story.passages[0].body[0], Node::Conditional(_)));
    }

    #[test]
    fn choice_guards() {
        let story = optimize(parse(
            ":: A\n* {true} [Always] -> A\n* {1 > 2} [Never] -> A\n* {$x} [Maybe] -> A\n",
        ));
        let body = &story.passages[0].body;
        assert_eq!(body.len(), 2);
        let Node::Choice(always) = &body[0] else {
            panic!("expected choice");
        };
        assert_eq!(always.guard, None);
        let Node::Choice(maybe) = &body[1] else {
            panic!("expected choice");
        };
        assert!(maybe.guard.is_some());
    }

    #[test]
    fn idempotent() {
        let story = parse(
            ":: A\n$x = 1 + 2 * 3\n{not false}\n{$x > 1 + 1}\nhi\n{/}\n{/}\n* {true && $x == 7} [Go] -> A\n",
        );
        let once = optimize(story);
        let twice = optimize(once.clone());
        assert_eq!(once, twice);
    }
}
