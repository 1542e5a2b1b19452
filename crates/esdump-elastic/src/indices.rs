//! Index selection by exact name or glob pattern

use esdump_core::{ExportError, SearchClient};
use glob::Pattern;

fn is_pattern(selector: &str) -> bool {
    selector.contains(['*', '?', '['])
}

/// Filter `available` by `selector`: exact name, or a glob such as `logs-*`.
///
/// Result is sorted and deduplicated. Errors on a malformed pattern.
pub fn match_indices(selector: &str, available: &[String]) -> Result<Vec<String>, ExportError> {
    let mut matched: Vec<String> = if is_pattern(selector) {
        let pattern = Pattern::new(selector).map_err(|e| {
            ExportError::Decode(format!("invalid index pattern '{selector}': {e}"))
        })?;
        available
            .iter()
            .filter(|name| pattern.matches(name))
            .cloned()
            .collect()
    } else {
        available
            .iter()
            .filter(|name| name.as_str() == selector)
            .cloned()
            .collect()
    };
    matched.sort();
    matched.dedup();
    Ok(matched)
}

/// Resolve a selector against the live index list.
///
/// Exact names must appear in the listing too, so unknown and system
/// indices resolve to nothing.
pub fn resolve_indices<C: SearchClient + ?Sized>(
    client: &C,
    selector: &str,
) -> Result<Vec<String>, ExportError> {
    let available = client.list_indices()?;
    let matched = match_indices(selector, &available)?;
    log::debug!(
        "'{selector}' matched {} of {} indices",
        matched.len(),
        available.len()
    );
    Ok(matched)
}
