//! Pure single-edit application with the unique-match contract.

use crate::core::plan::EditOperation;

/// Outcome of applying one [`EditOperation`] to a content buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditOutcome {
    /// Exactly one occurrence was found and replaced.
    Applied(String),
    /// `match_text` does not occur in the content; nothing changed.
    NoMatch,
    /// `match_text` occurs more than once; the engine never guesses which
    /// occurrence was intended, so nothing changed.
    Ambiguous(usize),
}

/// Apply one edit to `content`, enforcing the exactly-once occurrence rule.
pub fn apply_edit(content: &str, op: &EditOperation) -> EditOutcome {
    match count_occurrences(content, &op.match_text) {
        0 => EditOutcome::NoMatch,
        1 => EditOutcome::Applied(content.replacen(&op.match_text, &op.replacement_text, 1)),
        n => EditOutcome::Ambiguous(n),
    }
}

/// Count non-overlapping exact occurrences. An empty needle matches nothing.
fn count_occurrences(haystack: &str, needle: &str) -> usize {
    if needle.is_empty() {
        return 0;
    }
    haystack.matches(needle).count()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn op(match_text: &str, replacement_text: &str) -> EditOperation {
        EditOperation {
            match_text: match_text.to_string(),
            replacement_text: replacement_text.to_string(),
        }
    }

    #[test]
    fn unique_match_replaces_exactly_the_matched_span() {
        let content = "name = \"demo\"\nversion = 1.0\n";
        let outcome = apply_edit(content, &op("version = 1.0", "version = 2.0"));
        assert_eq!(
            outcome,
            EditOutcome::Applied("name = \"demo\"\nversion = 2.0\n".to_string())
        );
    }

    #[test]
    fn zero_occurrences_is_a_no_op() {
        let content = "x = 1\n";
        assert_eq!(apply_edit(content, &op("y = 2", "y = 3")), EditOutcome::NoMatch);
    }

    #[test]
    fn multiple_occurrences_are_ambiguous() {
        let content = "x = 1\nx = 1\n";
        assert_eq!(
            apply_edit(content, &op("x = 1", "x = 2")),
            EditOutcome::Ambiguous(2)
        );
    }

    /// Re-applying a successful edit must fail with zero matches: the original
    /// text no longer exists, so the engine cannot double-apply.
    #[test]
    fn reapplying_an_applied_edit_yields_no_match() {
        let edit = op("version = 1.0", "version = 2.0");
        let EditOutcome::Applied(next) = apply_edit("version = 1.0\n", &edit) else {
            panic!("first application should succeed");
        };
        assert_eq!(apply_edit(&next, &edit), EditOutcome::NoMatch);
    }

    #[test]
    fn empty_match_text_never_matches() {
        assert_eq!(apply_edit("anything", &op("", "x")), EditOutcome::NoMatch);
    }

    #[test]
    fn overlapping_needles_count_non_overlapping() {
        // "aaa" contains one non-overlapping "aa" plus a trailing "a".
        assert_eq!(apply_edit("aaa", &op("aa", "b")), EditOutcome::Applied("ba".to_string()));
    }
}
