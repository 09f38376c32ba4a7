//! URL slug generation shared by articles, publishers and categories

use anyhow::Result;
use std::future::Future;

/// Upper bound on numeric suffixes tried before giving up
const MAX_SLUG_SUFFIX: u32 = 10_000;

/// Generate a URL-friendly slug.
///
/// Lowercases the input, turns whitespace, underscores and ASCII punctuation
/// into hyphens, drops apostrophes and keeps non-ASCII letters as they are.
/// Runs of hyphens collapse into one and hyphens at either end are trimmed.
pub fn slugify(text: &str) -> String {
    let mut result = String::with_capacity(text.len());
    let mut prev_hyphen = false;

    for c in text.to_lowercase().chars() {
        if c == '\'' || c == '\u{2019}' {
            continue;
        }
        if c.is_ascii_alphanumeric() || (!c.is_ascii() && c.is_alphanumeric()) {
            result.push(c);
            prev_hyphen = false;
        } else if !prev_hyphen && !result.is_empty() {
            result.push('-');
            prev_hyphen = true;
        }
    }

    result.trim_end_matches('-').to_string()
}

/// Slugify `text` and make the result unique with `-1`, `-2`, ... suffixes.
///
/// `exists` reports whether a candidate is already taken. `fallback` is used
/// as the base when the text has nothing sluggable in it.
pub async fn unique_slug<F, Fut>(text: &str, fallback: &str, exists: F) -> Result<String>
where
    F: Fn(String) -> Fut,
    Fut: Future<Output = Result<bool>>,
{
    let mut base = slugify(text);
    if base.is_empty() {
        base = fallback.to_string();
    }

    if !exists(base.clone()).await? {
        return Ok(base);
    }

    for n in 1..=MAX_SLUG_SUFFIX {
        let candidate = format!("{}-{}", base, n);
        if !exists(candidate.clone()).await? {
            return Ok(candidate);
        }
    }

    anyhow::bail!("Could not find a free slug for '{}'", base)
}
