use std::collections::{BTreeMap, BTreeSet};

use crate::ast::{Expr, Marker, Node, Story};
use crate::diagnostic::{Code, Diagnostic};
use crate::token::Span;

/// Run every referential and structural check over `story`.
///
/// Works on partial stories too: the pipeline validates whatever the
/// parser managed to recover. Never fails; problems come back as
/// diagnostics in passage order.
#[must_use]
pub fn validate(story: &Story) -> Vec<Diagnostic> {
    let mut checker = Checker {
        defined: BTreeMap::new(),
        assigned: story.assigned_variables(),
        referenced: BTreeSet::new(),
        reported_vars: BTreeSet::new(),
        diagnostics: Vec::new(),
    };

    for passage in &story.passages {
        if let Some(first) = checker.defined.get(passage.name.as_str()) {
            let message = format!(
                "duplicate passage '{}' (first defined at line {})",
                passage.name, first.line
            );
            checker.diagnostics.push(Diagnostic::error(
                Code::DuplicatePassage {
                    name: passage.name.clone(),
                },
                passage.span,
                message,
            ));
        } else {
            checker.defined.insert(passage.name.as_str(), passage.span);
        }
    }

    for passage in &story.passages {
        checker.check_nodes(&passage.body);
    }

    let entry = story.entry_name();
    if let Some(first) = story.passages.first() {
        if story.find_passage(entry).is_none() {
            checker.diagnostics.push(Diagnostic::warning(
                Code::MissingEntry {
                    name: entry.to_string(),
                },
                first.span,
                format!("story has no entry passage '{entry}'"),
            ));
        }
    }

    for passage in &story.passages {
        let first_definition = checker.defined.get(passage.name.as_str()) == Some(&passage.span);
        if first_definition
            && passage.name != entry
            && !checker.referenced.contains(passage.name.as_str())
        {
            checker.diagnostics.push(Diagnostic::warning(
                Code::UnreachablePassage {
                    name: passage.name.clone(),
                },
                passage.span,
                format!("passage '{}' is never referenced", passage.name),
            ));
        }
    }

    log::debug!(
        "validated {} passages: {} diagnostics",
        story.passages.len(),
        checker.diagnostics.len()
    );
    checker.diagnostics
}

struct Checker<'a> {
    defined: BTreeMap<&'a str, Span>,
    assigned: BTreeSet<&'a str>,
    referenced: BTreeSet<&'a str>,
    reported_vars: BTreeSet<&'a str>,
    diagnostics: Vec<Diagnostic>,
}

impl<'a> Checker<'a> {
    fn check_nodes(&mut self, nodes: &'a [Node]) {
        for node in nodes {
            self.check_node(node);
        }
    }

    fn check_node(&mut self, node: &'a Node) {
        match node {
            Node::Text { .. } | Node::EmbeddedScript { .. } => {}
            Node::Choice(choice) => {
                if let Some(guard) = &choice.guard {
                    self.check_reads(guard);
                }
                if choice.text.trim().is_empty() {
                    self.diagnostics.push(Diagnostic::warning(
                        Code::EmptyChoiceText,
                        choice.span,
                        "choice has no display text",
                    ));
                }
                if let Some(target) = &choice.target {
                    self.reference(target, choice.span);
                }
            }
            Node::Assignment(assignment) => self.check_reads(&assignment.value),
            Node::Conditional(cond) => {
                self.check_reads(&cond.guard);
                if cond.close.is_none() {
                    self.diagnostics.push(Diagnostic::error(
                        Code::UnterminatedConditional,
                        cond.open,
                        "conditional is never closed",
                    ));
                }
                self.check_nodes(&cond.body);
                if let Some(else_body) = &cond.else_body {
                    self.check_nodes(else_body);
                }
            }
            Node::Divert { target, span } => self.reference(target, *span),
            Node::StrayMarker { marker, span } => {
                let (code, message) = match marker {
                    Marker::Close => (Code::UnmatchedClose, "'{/}' has no open conditional"),
                    Marker::Else => (Code::UnmatchedElse, "'{else}' has no open conditional"),
                };
                self.diagnostics.push(Diagnostic::error(code, *span, message));
            }
        }
    }

    fn reference(&mut self, target: &'a str, span: Span) {
        self.referenced.insert(target);
        if !self.defined.contains_key(target) {
            log::trace!("unknown passage '{target}' at line {}", span.line);
            self.diagnostics.push(Diagnostic::error(
                Code::UnknownPassage {
                    name: target.to_string(),
                },
                span,
                format!("unknown passage '{target}'"),
            ));
        }
    }

    /// Report each never-assigned variable once, at its first read.
    fn check_reads(&mut self, expr: &'a Expr) {
        for (name, span) in expr.reads() {
            if !self.assigned.contains(name) && self.reported_vars.insert(name) {
                self.diagnostics.push(Diagnostic::warning(
                    Code::UnassignedVariable {
                        name: name.to_string(),
                    },
                    span,
                    format!("variable '${name}' is read but never assigned"),
                ));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostic::Severity;
    use crate::lexer::tokenize;
    use crate::parser::parse_tokens;

    fn check(input: &str) -> Vec<Diagnostic> {
        let lexed = tokenize(input, "test.story");
        let (story, errors) = parse_tokens(&lexed.tokens);
        assert!(errors.is_empty(), "unexpected syntax errors: {errors:?}");
        validate(&story)
    }

    fn codes(diagnostics: &[Diagnostic]) -> Vec<&Code> {
        diagnostics.iter().map(|d| &d.code).collect()
    }

    #[test]
    fn clean_story() {
        let diags = check(":: Start\n$gold = 1\n* {$gold > 0} [Go] -> End\n:: End\nDone.\n");
        assert!(diags.is_empty(), "{diags:?}");
    }

    #[test]
    fn unknown_choice_target_reported_once() {
        let diags = check(":: Start\nHello\n* [Go] -> Nowhere\n");
        assert_eq!(diags.len(), 1);
        assert_eq!(
            diags[0].code,
            Code::UnknownPassage {
                name: "Nowhere".to_string()
            }
        );
        assert_eq!(diags[0].line, 3);
        assert_eq!(diags[0].severity, Severity::Error);
    }

    #[test]
    fn adding_the_target_clears_the_error() {
        let diags = check(":: Start\n* [Go] -> Nowhere\n:: Nowhere\n");
        assert!(diags.is_empty(), "{diags:?}");
    }

    #[test]
    fn unknown_divert_target() {
        let diags = check(":: Start\n-> Elsewhere\n");
        assert_eq!(
            codes(&diags),
            vec![&Code::UnknownPassage {
                name: "Elsewhere".to_string()
            }]
        );
    }

    #[test]
    fn duplicate_passage_at_second_occurrence() {
        let diags = check(":: Start\n-> Room\n:: Room\n:: Room\n");
        assert_eq!(diags.len(), 1);
        assert_eq!(
            diags[0].code,
            Code::DuplicatePassage {
                name: "Room".to_string()
            }
        );
        assert_eq!(diags[0].line, 4);
        assert!(diags[0].message.contains("line 3"));
    }

    #[test]
    fn unterminated_conditional_at_open() {
        let diags = check(":: Start\n$x = 1\n{$x}\nyes\n");
        assert_eq!(codes(&diags), vec![&Code::UnterminatedConditional]);
        assert_eq!((diags[0].line, diags[0].column), (3, 1));
    }

    #[test]
    fn stray_markers() {
        let diags = check(":: Start\n{/}\n{else}\n");
        assert_eq!(
            codes(&diags),
            vec![&Code::UnmatchedClose, &Code::UnmatchedElse]
        );
    }

    #[test]
    fn warnings() {
        let diags = check(":: Start\n* {$key} []\n:: Attic\n");
        assert_eq!(
            codes(&diags),
            vec![
                &Code::UnassignedVariable {
                    name: "key".to_string()
                },
                &Code::EmptyChoiceText,
                &Code::UnreachablePassage {
                    name: "Attic".to_string()
                },
            ]
        );
        assert!(diags.iter().all(|d| d.severity == Severity::Warning));
    }

    #[test]
    fn unassigned_variable_reported_once() {
        let diags = check(":: Start\n{$a && $a}\n{/}\n{$a}\n{/}\n");
        assert_eq!(diags.len(), 1);
    }

    #[test]
    fn missing_entry_uses_start_metadata() {
        let diags = check("@start Intro\n:: Start\n");
        assert!(diags.iter().any(|d| d.code
            == Code::MissingEntry {
                name: "Intro".to_string()
            }));

        let diags = check("@start Intro\n:: Intro\n");
        assert!(diags.is_empty(), "{diags:?}");
    }

    #[test]
    fn empty_story_is_valid() {
        assert!(check("").is_empty());
    }
}
