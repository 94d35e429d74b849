//! Semantic checks over parsed and built stories.

use storyscript::{
    BinaryOp, Choice, Code, Conditional, Diagnostic, Expr, Node, Passage, Severity, Span, Story,
    parse_str, validate,
};

fn check(input: &str) -> Vec<Diagnostic> {
    validate(&parse_str(input).expect("parse failed"))
}

fn errors(diagnostics: &[Diagnostic]) -> Vec<&Code> {
    diagnostics
        .iter()
        .filter(|d| d.severity == Severity::Error)
        .map(|d| &d.code)
        .collect()
}

// -----------------------------------------------------------
// Passage references.
// -----------------------------------------------------------

#[test]
fn unknown_target_reported_once_then_fixed() {
    let broken = ":: Start\n* [Go] -> Cellar\n";
    let diagnostics = check(broken);
    assert_eq!(
        errors(&diagnostics),
        vec![&Code::UnknownPassage {
            name: "Cellar".to_string()
        }]
    );
    assert_eq!((diagnostics[0].line, diagnostics[0].column), (2, 1));

    let fixed = format!("{broken}:: Cellar\nDamp.\n");
    assert!(check(&fixed).is_empty());
}

#[test]
fn every_unknown_reference_is_reported() {
    let diagnostics = check(":: Start\n-> Nowhere\n* [Again] -> Nowhere\n");
    assert_eq!(errors(&diagnostics).len(), 2);
    assert_eq!(diagnostics[0].line, 2);
    assert_eq!(diagnostics[1].line, 3);
}

#[test]
fn references_inside_conditionals_count() {
    let diagnostics = check(":: Start\n{true}\n  -> Hidden\n{else}\n  -> Missing\n{/}\n:: Hidden\n");
    assert_eq!(
        errors(&diagnostics),
        vec![&Code::UnknownPassage {
            name: "Missing".to_string()
        }]
    );
    // Hidden is referenced from inside the conditional, so it is reachable.
    assert!(
        !diagnostics
            .iter()
            .any(|d| matches!(d.code, Code::UnreachablePassage { .. }))
    );
}

#[test]
fn duplicate_passage_points_at_second_definition() {
    let diagnostics = check(":: Start\n-> Room\n:: Room\n:: Room\n");
    assert_eq!(
        errors(&diagnostics),
        vec![&Code::DuplicatePassage {
            name: "Room".to_string()
        }]
    );
    assert_eq!(diagnostics[0].line, 4);
    assert!(diagnostics[0].message.contains("first defined at line 3"));
}

// -----------------------------------------------------------
// Structure.
// -----------------------------------------------------------

#[test]
fn unterminated_and_stray_markers() {
    let diagnostics = check(":: Start\n{else}\n{true}\nopen\n");
    assert_eq!(
        errors(&diagnostics),
        vec![&Code::UnmatchedElse, &Code::UnterminatedConditional]
    );
    assert_eq!(diagnostics[1].line, 3);
}

#[test]
fn nested_conditionals_close_independently() {
    let diagnostics = check(":: Start\n{true}\n  {false}\n    x\n  {/}\n{/}\n{/}\n");
    assert_eq!(errors(&diagnostics), vec![&Code::UnmatchedClose]);
    assert_eq!(diagnostics[0].line, 7);
}

// -----------------------------------------------------------
// Warnings.
// -----------------------------------------------------------

#[test]
fn warnings_do_not_block() {
    let diagnostics = check(":: Start\n{$gold > 1}\nrich\n{/}\n:: Orphan\n* []\n");
    assert!(diagnostics.iter().all(|d| d.severity == Severity::Warning));
    let codes: Vec<&Code> = diagnostics.iter().map(|d| &d.code).collect();
    assert!(codes.contains(&&Code::UnassignedVariable {
        name: "gold".to_string()
    }));
    assert!(codes.contains(&&Code::UnreachablePassage {
        name: "Orphan".to_string()
    }));
    assert!(codes.contains(&&Code::EmptyChoiceText));
}

#[test]
fn assignment_anywhere_counts() {
    // Assigned in a later passage is still assigned.
    let diagnostics = check(":: Start\n{$gold > 1}\nrich\n{/}\n-> Bank\n:: Bank\n$gold = 5\n");
    assert!(diagnostics.is_empty(), "{diagnostics:?}");
}

#[test]
fn custom_entry_passage() {
    let missing = check("@start Intro\n:: Start\n");
    assert!(missing.iter().any(|d| d.code
        == Code::MissingEntry {
            name: "Intro".to_string()
        }));

    let present = check("@start Intro\n:: Intro\n");
    assert!(present.is_empty());
}

#[test]
fn empty_story_has_nothing_to_report() {
    assert!(validate(&Story::new()).is_empty());
}

// -----------------------------------------------------------
// Built stories.
// -----------------------------------------------------------

#[test]
fn built_story_with_problems() {
    let story = Story::new()
        .passage(
            Passage::new("Start")
                .choice(Choice::new("Go").to("Nowhere"))
                .conditional(
                    Conditional::new(Expr::binary(
                        BinaryOp::Lt,
                        Expr::var("torch"),
                        Expr::int(1),
                    ))
                    .then(Node::Divert {
                        target: "Start".to_string(),
                        span: Span::default(),
                    }),
                ),
        )
        .passage(Passage::new("Start"));

    let diagnostics = validate(&story);
    let codes: Vec<&Code> = diagnostics.iter().map(|d| &d.code).collect();
    assert!(codes.contains(&&Code::UnknownPassage {
        name: "Nowhere".to_string()
    }));
    assert!(codes.contains(&&Code::DuplicatePassage {
        name: "Start".to_string()
    }));
    assert!(codes.contains(&&Code::UnassignedVariable {
        name: "torch".to_string()
    }));
}
