//! Ordered pattern fallback.
//!
//! Candidates are evaluated lazily and strictly in order; the first one
//! producing a non-empty result wins and the rest are never evaluated.

use scraper::{ElementRef, Selector};

use super::patterns::Role;

/// Matches produced by the winning pattern.
#[derive(Debug, Clone)]
pub struct Resolved<'p, T> {
    pub matches: Vec<T>,
    pub pattern: &'p str,
}

/// Walks `patterns` in order, calling `query` until one returns a
/// non-empty result. `None` when every pattern came back empty.
pub fn first_match<'p, T, F>(role: Role, patterns: &'p [String], mut query: F) -> Option<Resolved<'p, T>>
where
    F: FnMut(&str) -> Vec<T>,
{
    for pattern in patterns {
        let matches = query(pattern);
        if !matches.is_empty() {
            tracing::trace!(role = %role, pattern = %pattern, count = matches.len(), "pattern matched");
            return Some(Resolved {
                matches,
                pattern: pattern.as_str(),
            });
        }
    }
    tracing::debug!(role = %role, tried = patterns.len(), "no pattern matched");
    None
}

/// Descendants of `scope` matching `pattern`. Invalid CSS matches nothing.
pub fn select_all<'a>(scope: ElementRef<'a>, pattern: &str) -> Vec<ElementRef<'a>> {
    match Selector::parse(pattern) {
        Ok(selector) => scope.select(&selector).collect(),
        Err(e) => {
            tracing::warn!(pattern = %pattern, error = ?e, "invalid selector pattern");
            Vec::new()
        }
    }
}

/// DOM form of [`first_match`].
pub fn resolve<'a, 'p>(
    scope: ElementRef<'a>,
    role: Role,
    patterns: &'p [String],
) -> Option<Resolved<'p, ElementRef<'a>>> {
    first_match(role, patterns, |pattern| select_all(scope, pattern))
}

/// Resolves a text field: the first pattern whose first match has
/// non-blank text wins. Returns the normalized text and the pattern.
pub fn resolve_text<'p>(
    scope: ElementRef<'_>,
    role: Role,
    patterns: &'p [String],
) -> Option<(String, &'p str)> {
    let resolved = first_match(role, patterns, |pattern| {
        select_all(scope, pattern)
            .into_iter()
            .map(element_text)
            .filter(|t| !t.is_empty())
            .take(1)
            .collect()
    })?;
    let text = resolved.matches.into_iter().next()?;
    Some((text, resolved.pattern))
}

/// Text content with whitespace runs collapsed to single spaces.
pub fn element_text(el: ElementRef<'_>) -> String {
    el.text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}
