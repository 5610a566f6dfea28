//! Subject identity.
//!
//! Subjects are keyed by slug throughout the curriculum. A slug is the
//! lowercased name with every run of non-alphanumeric characters collapsed
//! to a single hyphen. Collisions within one list are resolved with numeric
//! suffixes in input order.

use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::model::Subject;

/// Slug used when a name has no alphanumeric characters.
pub const FALLBACK_SLUG: &str = "subject";

static NON_ALPHANUMERIC: Lazy<Regex> = Lazy::new(|| {
    #[allow(clippy::expect_used)]
    Regex::new(r"[^a-z0-9]+").expect("slug pattern is valid")
});

/// Converts a display name into a slug.
///
/// Idempotent: `slugify(&slugify(x)) == slugify(x)`.
///
/// # Examples
///
/// ```
/// use graspy_content::slug::slugify;
///
/// assert_eq!(slugify("Social Studies & Civics"), "social-studies-civics");
/// assert_eq!(slugify("!!!"), "subject");
/// ```
#[must_use]
pub fn slugify(name: &str) -> String {
    let lowered = name.to_lowercase();
    let slug = NON_ALPHANUMERIC.replace_all(&lowered, "-");
    let slug = slug.trim_matches('-');
    if slug.is_empty() {
        FALLBACK_SLUG.to_string()
    } else {
        slug.to_string()
    }
}

/// Trims entries, drops blanks and keeps at most `limit` values in order.
#[must_use]
pub fn sanitize_sequence<S: AsRef<str>>(values: &[S], limit: usize) -> Vec<String> {
    values
        .iter()
        .map(|value| value.as_ref().trim())
        .filter(|value| !value.is_empty())
        .take(limit)
        .map(str::to_string)
        .collect()
}

/// Builds subjects with unique slugs.
///
/// The first occurrence keeps the bare slug; later collisions become
/// `slug-2`, `slug-3` and so on.
#[must_use]
pub fn normalize_subjects<S: AsRef<str>>(names: &[S]) -> Vec<Subject> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut subjects = Vec::with_capacity(names.len());

    for name in names {
        let name = name.as_ref().trim();
        let base = slugify(name);
        let mut slug = base.clone();
        let mut suffix = 2;
        while seen.contains(&slug) {
            slug = format!("{base}-{suffix}");
            suffix += 1;
        }
        seen.insert(slug.clone());
        subjects.push(Subject {
            name: name.to_string(),
            slug,
        });
    }

    subjects
}

/// Keeps the first subject for each slug, preserving order.
#[must_use]
pub fn dedupe_by_slug<T, F>(items: Vec<T>, slug_of: F) -> Vec<T>
where
    F: Fn(&T) -> String,
{
    let mut seen = HashSet::new();
    items
        .into_iter()
        .filter(|item| seen.insert(slug_of(item)))
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_slugify_basic() {
        assert_eq!(slugify("Biology"), "biology");
        assert_eq!(slugify("  Home Economics  "), "home-economics");
        assert_eq!(slugify("ICT / Computing"), "ict-computing");
    }

    #[test]
    fn test_slugify_fallback() {
        assert_eq!(slugify(""), FALLBACK_SLUG);
        assert_eq!(slugify("---"), FALLBACK_SLUG);
    }

    #[test]
    fn test_slugify_non_ascii_letters_are_separators() {
        assert_eq!(slugify("Français 2"), "fran-ais-2");
    }

    #[test]
    fn test_slugify_idempotent() {
        for name in ["Biology", "Social Studies & Civics", "!!!", "Maths-2", "A  b"] {
            let once = slugify(name);
            assert_eq!(slugify(&once), once, "not idempotent for {name:?}");
        }
    }

    #[test]
    fn test_sanitize_sequence() {
        let values = ["Biology", "  ", " Chemistry ", "", "Physics"];
        assert_eq!(
            sanitize_sequence(&values, 2),
            vec!["Biology".to_string(), "Chemistry".to_string()]
        );
    }

    #[test]
    fn test_normalize_subjects_resolves_collisions() {
        let names = sanitize_sequence(&["Biology", "biology!", "  "], 20);
        let subjects = normalize_subjects(&names);
        assert_eq!(subjects.len(), 2);
        assert_eq!(subjects[0].slug, "biology");
        assert_eq!(subjects[0].name, "Biology");
        assert_eq!(subjects[1].slug, "biology-2");
        assert_eq!(subjects[1].name, "biology!");
    }

    #[test]
    fn test_normalize_subjects_suffix_chain() {
        let subjects = normalize_subjects(&["Art", "art", "ART", "art-2"]);
        let slugs: Vec<&str> = subjects.iter().map(|s| s.slug.as_str()).collect();
        assert_eq!(slugs, vec!["art", "art-2", "art-3", "art-2-2"]);
    }

    #[test]
    fn test_dedupe_by_slug_keeps_first() {
        let items = vec!["Maths", "maths", "History"];
        let kept = dedupe_by_slug(items, |name| slugify(name));
        assert_eq!(kept, vec!["Maths", "History"]);
    }
}
