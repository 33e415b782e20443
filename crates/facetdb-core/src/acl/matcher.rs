//! Path-glob matching for authorization rules.
//!
//! Paths and patterns are `/`-separated; empty segments are ignored, so
//! `/site/1`, `site/1` and `/site//1/` are the same path. In patterns `*`
//! matches exactly one segment and `**` matches zero or more.

const ANY_ONE: &str = "*";
const ANY_MANY: &str = "**";

/// Split a path into its non-empty segments.
#[must_use]
pub fn segments(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}

/// Whether `path` is selected by `pattern`.
#[must_use]
pub fn path_matches(pattern: &str, path: &str) -> bool {
    match_segments(&segments(pattern), &segments(path))
}

/// Ordering key for overlapping patterns: literal segments outrank `*`,
/// which outranks `**`. Greater is more specific.
#[must_use]
pub fn specificity(pattern: &str) -> (usize, usize) {
    let segs = segments(pattern);
    let literals = segs
        .iter()
        .filter(|s| **s != ANY_ONE && **s != ANY_MANY)
        .count();
    let singles = segs.iter().filter(|s| **s == ANY_ONE).count();

    (literals, singles)
}

fn match_segments(pattern: &[&str], path: &[&str]) -> bool {
    let Some((head, rest)) = pattern.split_first() else {
        return path.is_empty();
    };

    match *head {
        ANY_MANY => {
            // consecutive globstars collapse
            if rest.first() == Some(&ANY_MANY) {
                return match_segments(rest, path);
            }
            (0..=path.len()).any(|skip| match_segments(rest, &path[skip..]))
        }
        ANY_ONE => !path.is_empty() && match_segments(rest, &path[1..]),
        literal => path.first() == Some(&literal) && match_segments(rest, &path[1..]),
    }
}
