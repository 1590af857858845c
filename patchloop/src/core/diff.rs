//! Unified diff rendering for applied mutations.

use similar::TextDiff;

/// Render a unified diff between the previous and new content of `path`.
///
/// Returns an empty string when the contents are identical.
pub fn unified_diff(path: &str, old: &str, new: &str) -> String {
    let diff = TextDiff::from_lines(old, new);
    diff.unified_diff()
        .context_radius(3)
        .header(&format!("a/{path}"), &format!("b/{path}"))
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diff_shows_removed_and_added_lines() {
        let rendered = unified_diff("app.py", "version = 1.0\n", "version = 2.0\n");
        assert!(rendered.contains("--- a/app.py"));
        assert!(rendered.contains("+++ b/app.py"));
        assert!(rendered.contains("-version = 1.0"));
        assert!(rendered.contains("+version = 2.0"));
        assert!(rendered.contains("@@"));
    }

    #[test]
    fn identical_content_yields_empty_diff() {
        assert_eq!(unified_diff("app.py", "same\n", "same\n"), "");
    }
}
