//! Text cleanup for generated strings.
//!
//! Models occasionally emit raw control bytes where a LaTeX command was
//! intended (`\t` in `\times`, `\f` in `\frac`, `\b` in `\beta`, `\r` in
//! `\rightarrow`). Restoring the two-character escape keeps math markup
//! intact for the renderer. Nothing else is rewritten: `$ ... $` and
//! `$$ ... $$` delimiters pass through untouched.

/// Trims surrounding whitespace and restores control characters to their
/// literal escape sequences.
///
/// Total and pure: empty input yields empty output.
///
/// # Examples
///
/// ```
/// use graspy_content::normalize;
///
/// assert_eq!(normalize("  $\x0crac{1}{2}$ "), "$\\frac{1}{2}$");
/// assert_eq!(normalize(""), "");
/// ```
#[must_use]
pub fn normalize(text: &str) -> String {
    let trimmed = text.trim();
    let mut out = String::with_capacity(trimmed.len());
    for ch in trimmed.chars() {
        match ch {
            '\t' => out.push_str("\\t"),
            '\u{8}' => out.push_str("\\b"),
            '\u{c}' => out.push_str("\\f"),
            '\r' => out.push_str("\\r"),
            other => out.push(other),
        }
    }
    out
}

/// Returns `true` if the text is empty once normalized.
#[must_use]
pub fn is_blank(text: &str) -> bool {
    text.trim().is_empty()
}
