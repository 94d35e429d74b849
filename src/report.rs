//! Human-readable rendering of diagnostics and "did you mean" hints.

use std::fmt::Write as _;

use crate::ast::Story;
use crate::diagnostic::{Code, Diagnostic};
use crate::lexer::{LexErrorKind, normalize_line_endings};

/// Name shown for a source with no file name.
#[must_use]
pub fn display_name(filename: &str) -> &str {
    if filename.is_empty() {
        "<input>"
    } else {
        filename
    }
}

/// Render one diagnostic with its location, the offending source line,
/// a caret under the column, and the suggestion if there is one.
///
/// ```text
/// error: unknown passage 'Tunel'
///  --> cave.story:4:1
/// * [Go deeper] -> Tunel
/// ^
///  = help: did you mean 'Tunnel'?
/// ```
#[must_use]
pub fn format(diagnostic: &Diagnostic, source: &str, filename: &str) -> String {
    let mut out = format!(
        "{}: {}\n --> {}:{}:{}",
        diagnostic.severity,
        diagnostic.message,
        display_name(filename),
        diagnostic.line,
        diagnostic.column
    );

    let normalized = normalize_line_endings(source);
    if let Some(text) = line_text(&normalized, diagnostic.line) {
        let _ = write!(out, "\n{text}\n{}", caret_line(text, diagnostic.column));
    }
    if let Some(suggestion) = &diagnostic.suggestion {
        let _ = write!(out, "\n = help: {suggestion}");
    }
    out
}

/// `"2 errors, 1 warning"`, or `"no problems found"`.
#[must_use]
pub fn summarize(diagnostics: &[Diagnostic]) -> String {
    let errors = diagnostics.iter().filter(|d| d.is_error()).count();
    let warnings = diagnostics.len() - errors;
    if errors == 0 && warnings == 0 {
        return "no problems found".to_string();
    }
    format!(
        "{errors} {}, {warnings} {}",
        plural(errors, "error"),
        plural(warnings, "warning")
    )
}

/// Fill in `suggestion` on every diagnostic that has none and for
/// which a useful hint exists.
#[must_use]
pub fn suggest(mut diagnostics: Vec<Diagnostic>, story: &Story) -> Vec<Diagnostic> {
    let passages: Vec<&str> = story.passages.iter().map(|p| p.name.as_str()).collect();
    let variables = story.assigned_variables();

    for diagnostic in &mut diagnostics {
        if diagnostic.suggestion.is_some() {
            continue;
        }
        diagnostic.suggestion = match &diagnostic.code {
            Code::UnknownPassage { name } => closest_match(name, passages.iter().copied())
                .map(|candidate| format!("did you mean '{candidate}'?")),
            Code::UnassignedVariable { name } => Some(
                closest_match(name, variables.iter().copied()).map_or_else(
                    || format!("assign it before reading it, e.g. '${name} = 0'"),
                    |candidate| format!("did you mean '${candidate}'?"),
                ),
            ),
            Code::DuplicatePassage { name } => {
                Some(format!("rename one of the passages called '{name}'"))
            }
            Code::MissingEntry { name } => Some(format!(
                "add a passage named '{name}' or point '@start' at an existing one"
            )),
            Code::UnterminatedConditional => Some("close the conditional with '{/}'".to_string()),
            Code::UnmatchedClose => {
                Some("remove this '{/}' or open a conditional above it".to_string())
            }
            Code::UnmatchedElse => {
                Some("'{else}' belongs between a '{condition}' line and its '{/}'".to_string())
            }
            Code::EmptyChoiceText => {
                Some("write the text the player sees between '[' and ']'".to_string())
            }
            Code::Lexical { error } => lexical_hint(error),
            Code::Syntax | Code::UnreachablePassage { .. } => None,
        };
    }
    diagnostics
}

/// Copy the source line each diagnostic points at into its `snippet`.
pub fn attach_snippets(diagnostics: &mut [Diagnostic], source: &str) {
    let normalized = normalize_line_endings(source);
    for diagnostic in diagnostics {
        if diagnostic.snippet.is_none() {
            diagnostic.snippet = line_text(&normalized, diagnostic.line).map(str::to_string);
        }
    }
}

fn lexical_hint(error: &LexErrorKind) -> Option<String> {
    let hint = match error {
        LexErrorKind::UnterminatedString => "close the string with '\"' before the end of the line",
        LexErrorKind::UnterminatedBlockComment => "close the comment with '*/'",
        LexErrorKind::UnterminatedScript => "close the script block with '>>'",
        LexErrorKind::InvalidNumber(_) => return None,
    };
    Some(hint.to_string())
}

fn plural(count: usize, noun: &str) -> String {
    if count == 1 {
        noun.to_string()
    } else {
        format!("{noun}s")
    }
}

fn line_text(source: &str, line: usize) -> Option<&str> {
    line.checked_sub(1).and_then(|index| source.split('\n').nth(index))
}

/// Spaces up to the column, keeping tabs so the caret lines up with
/// the source line above it.
fn caret_line(text: &str, column: usize) -> String {
    let mut out: String = text
        .chars()
        .take(column.saturating_sub(1))
        .map(|c| if c == '\t' { '\t' } else { ' ' })
        .collect();
    out.push('^');
    out
}

/// Closest candidate by edit distance, ignoring case, if it is close
/// enough to be a plausible typo. Ties go to the earliest candidate.
fn closest_match<'a>(name: &str, candidates: impl Iterator<Item = &'a str>) -> Option<&'a str> {
    let limit = (name.chars().count() / 3).max(2);
    let lowered = name.to_lowercase();
    candidates
        .filter(|candidate| *candidate != name)
        .map(|candidate| (candidate, levenshtein(&lowered, &candidate.to_lowercase())))
        .filter(|(_, distance)| *distance <= limit)
        .min_by_key(|(_, distance)| *distance)
        .map(|(candidate, _)| candidate)
}

fn levenshtein(a: &str, b: &str) -> usize {
    let b: Vec<char> = b.chars().collect();
    let mut previous: Vec<usize> = (0..=b.len()).collect();
    let mut current = vec![0; b.len() + 1];
    for (i, ca) in a.chars().enumerate() {
        current[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let substitution = previous[j] + usize::from(ca != *cb);
            current[j + 1] = substitution.min(previous[j + 1] + 1).min(current[j] + 1);
        }
        std::mem::swap(&mut previous, &mut current);
    }
    previous[b.len()]
}
