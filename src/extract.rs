//! URL extraction from tabular input.
//!
//! Scans every cell of every column of every sheet for whitespace-delimited
//! tokens carrying the `http` marker, deduplicating while preserving
//! first-seen order. Tokens are compared after whitespace trimming only.
//! There is no scheme or host canonicalization, so `http://a` and
//! `http://a/` are distinct links on purpose.

use std::collections::HashSet;

use crate::tabular::Workbook;

const MARKER: &str = "http";

/// Which whitespace tokens of a qualifying cell count as links.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MatchPolicy {
    /// A token qualifies when it contains the marker anywhere (default).
    #[default]
    Contains,
    /// A token qualifies only when it starts with the marker
    /// (`strict_prefix_links` in config).
    StrictPrefix,
}

impl MatchPolicy {
    fn qualifies(self, token: &str) -> bool {
        let lower = token.to_ascii_lowercase();
        match self {
            MatchPolicy::Contains => lower.contains(MARKER),
            MatchPolicy::StrictPrefix => lower.starts_with(MARKER),
        }
    }
}

/// Extract the deduplicated, order-stable link list from a workbook.
///
/// Emission order follows sheet order, then column order, then row order;
/// the first occurrence of a token wins and later duplicates are dropped.
pub fn extract_links(workbook: &Workbook, policy: MatchPolicy) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut links = Vec::new();
    for sheet in &workbook.sheets {
        for column in &sheet.columns {
            for cell in &column.cells {
                if !cell.to_ascii_lowercase().contains(MARKER) {
                    continue;
                }
                for token in cell.split_whitespace() {
                    let token = token.trim();
                    if policy.qualifies(token) && seen.insert(token.to_string()) {
                        links.push(token.to_string());
                    }
                }
            }
        }
    }
    links
}
