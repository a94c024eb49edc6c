//! Per-channel content filters.

use crate::domain::{Filter, FilterKind};

/// Evaluate `filters` in order against `text`. The first rejecting filter wins.
///
/// Matching is a case-insensitive substring test; an empty keyword never matches.
/// `ByAuthor` filters are accepted but currently always pass.
pub fn passes(filters: &[Filter], text: &str) -> bool {
    if filters.is_empty() {
        return true;
    }

    let haystack = text.to_lowercase();
    for filter in filters.iter().filter(|f| f.enabled) {
        match filter.kind {
            FilterKind::IncludeKeywords => {
                if !any_keyword(&filter.keywords, &haystack) {
                    return false;
                }
            }
            FilterKind::ExcludeKeywords => {
                if any_keyword(&filter.keywords, &haystack) {
                    return false;
                }
            }
            FilterKind::ByAuthor => {}
        }
    }
    true
}

fn any_keyword(keywords: &[String], haystack: &str) -> bool {
    keywords
        .iter()
        .filter(|k| !k.is_empty())
        .any(|k| haystack.contains(&k.to_lowercase()))
}
