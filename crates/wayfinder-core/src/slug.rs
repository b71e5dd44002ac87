//! Deterministic slugs used for topic thread ids and panel ids.

use regex::Regex;
use std::sync::LazyLock;

static NON_ALNUM: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^a-z0-9]+").unwrap());

/// Lowercases `input` and collapses every run of non-alphanumeric characters
/// into a single `-`, trimming dashes at both ends.
///
/// ```
/// use wayfinder_core::slug::slugify;
///
/// assert_eq!(slugify("Shadow Realm"), "shadow-realm");
/// assert_eq!(slugify("  Boss: The Final  Tower!! "), "boss-the-final-tower");
/// ```
pub fn slugify(input: &str) -> String {
    let lowered = input.to_lowercase();
    NON_ALNUM
        .replace_all(&lowered, "-")
        .trim_matches('-')
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slugify_is_case_insensitive() {
        assert_eq!(slugify("Story So Far"), slugify("story so far"));
    }

    #[test]
    fn test_slugify_empty_and_symbol_only() {
        assert_eq!(slugify(""), "");
        assert_eq!(slugify("!!!"), "");
    }

    #[test]
    fn test_slugify_keeps_digits() {
        assert_eq!(slugify("Act 2: Ruins"), "act-2-ruins");
    }
}
