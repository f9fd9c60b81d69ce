//! Filter/search pipeline: (superset, query, notes-only) → displayed order.
//!
//! Pure and synchronous. A blank query passes the superset through in its
//! recency order; a non-blank query goes through the [`FuzzyIndex`] and
//! yields relevance order. The notes-only predicate is applied last.

use crate::fuzzy::FuzzyIndex;
use crate::models::BookmarkRecord;

/// The user-controlled inputs to the pipeline.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterInput {
    pub query: String,
    pub notes_only: bool,
}

impl FilterInput {
    pub fn new(query: impl Into<String>, notes_only: bool) -> Self {
        Self {
            query: query.into(),
            notes_only,
        }
    }

    /// True when the query is non-blank after trimming.
    pub fn is_searching(&self) -> bool {
        is_active_query(&self.query)
    }
}

/// Whitespace-only queries count as no query.
pub fn is_active_query(query: &str) -> bool {
    !query.trim().is_empty()
}

/// Retains records without a non-blank URL when `notes_only` is set.
pub fn apply_predicate<'a, I>(records: I, notes_only: bool) -> Vec<BookmarkRecord>
where
    I: IntoIterator<Item = &'a BookmarkRecord>,
{
    records
        .into_iter()
        .filter(|r| !notes_only || !r.has_url())
        .cloned()
        .collect()
}

/// Runs the pipeline over the index's snapshot.
pub fn apply(index: &FuzzyIndex, input: &FilterInput) -> Vec<BookmarkRecord> {
    if input.is_searching() {
        apply_predicate(index.search(&input.query), input.notes_only)
    } else {
        apply_predicate(index.records(), input.notes_only)
    }
}
