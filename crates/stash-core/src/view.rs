//! `DisplayState`: the single owner of what the client currently shows.
//!
//! Holds the superset, its fuzzy index, the filter inputs, the filtered
//! sequence and the reveal cursor. Every input change recomputes the
//! filtered sequence in full and resets the cursor.

use std::collections::BTreeMap;
use std::time::Instant;

use crate::filter::{self, FilterInput};
use crate::fuzzy::{FuzzyIndex, FuzzyOptions};
use crate::models::BookmarkRecord;
use crate::pagination::{group_by_domain, Reveal, RevealConfig, RevealController};

pub struct DisplayState {
    index: FuzzyIndex,
    fuzzy_options: FuzzyOptions,
    input: FilterInput,
    filtered: Vec<BookmarkRecord>,
    reveal: RevealController,
}

impl DisplayState {
    pub fn new(fuzzy_options: FuzzyOptions, reveal: RevealConfig) -> Self {
        Self {
            index: FuzzyIndex::with_options(Vec::new(), fuzzy_options.clone()),
            fuzzy_options,
            input: FilterInput::default(),
            filtered: Vec::new(),
            reveal: RevealController::new(reveal),
        }
    }

    /// Replaces the superset wholesale and rebuilds the index.
    pub fn replace_superset(&mut self, records: Vec<BookmarkRecord>) {
        self.index = FuzzyIndex::with_options(records, self.fuzzy_options.clone());
        self.recompute();
    }

    /// Drops all records, keeping the filter inputs.
    pub fn clear(&mut self) {
        self.replace_superset(Vec::new());
    }

    pub fn set_query(&mut self, query: impl Into<String>) {
        let query = query.into();
        if query == self.input.query {
            return;
        }
        self.input.query = query;
        self.recompute();
    }

    pub fn set_notes_only(&mut self, notes_only: bool) {
        if notes_only == self.input.notes_only {
            return;
        }
        self.input.notes_only = notes_only;
        self.recompute();
    }

    pub fn reveal_more(&mut self, now: Instant) -> Reveal {
        self.reveal.reveal_more(self.input.is_searching(), now)
    }

    pub fn superset(&self) -> &[BookmarkRecord] {
        self.index.records()
    }

    pub fn query(&self) -> &str {
        &self.input.query
    }

    pub fn notes_only(&self) -> bool {
        self.input.notes_only
    }

    pub fn is_searching(&self) -> bool {
        self.input.is_searching()
    }

    pub fn filtered(&self) -> &[BookmarkRecord] {
        &self.filtered
    }

    pub fn visible_count(&self) -> usize {
        self.visible().len()
    }

    pub fn visible(&self) -> &[BookmarkRecord] {
        self.reveal.visible(&self.filtered, self.input.is_searching())
    }

    /// The visible prefix grouped by domain.
    pub fn groups(&self) -> BTreeMap<String, Vec<BookmarkRecord>> {
        group_by_domain(self.visible())
    }

    fn recompute(&mut self) {
        self.filtered = filter::apply(&self.index, &self.input);
        self.reveal.reset(self.filtered.len());
    }
}

impl Default for DisplayState {
    fn default() -> Self {
        Self::new(FuzzyOptions::default(), RevealConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn records(n: usize) -> Vec<BookmarkRecord> {
        let now = Utc::now();
        (0..n)
            .map(|i| {
                let url = format!("https://site{}.dev/page", i % 3);
                BookmarkRecord {
                    id: i as i64 + 1,
                    domain: crate::models::derive_domain(Some(&url)),
                    url: Some(url),
                    title: format!("Page {}", i),
                    notes: String::new(),
                    tags: String::new(),
                    created_at: now - Duration::minutes(i as i64),
                }
            })
            .collect()
    }

    fn note(id: i64, text: &str) -> BookmarkRecord {
        BookmarkRecord {
            id,
            url: None,
            title: "Oct 1, 2026, 10:00 AM".into(),
            notes: text.into(),
            tags: String::new(),
            domain: crate::models::NOTES_DOMAIN.into(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn twenty_five_records_reveal_scenario() {
        let mut state = DisplayState::default();
        state.replace_superset(records(25));
        assert_eq!(state.visible_count(), 20);
        assert_eq!(state.groups().len(), 3);

        assert_eq!(state.reveal_more(Instant::now()), Reveal::Grew(25));
        assert_eq!(state.visible_count(), 25);
        let grouped: usize = state.groups().values().map(Vec::len).sum();
        assert_eq!(grouped, 25);
    }

    #[test]
    fn notes_only_scenario() {
        let mut superset = records(5);
        superset.push(note(100, "buy milk"));
        let mut state = DisplayState::default();
        state.replace_superset(superset);
        state.set_notes_only(true);
        assert_eq!(state.filtered().len(), 1);
        assert_eq!(state.filtered()[0].id, 100);

        state.set_query("page");
        assert!(state.filtered().is_empty());
    }

    #[test]
    fn search_shows_all_results_and_blank_query_resets() {
        let mut state = DisplayState::default();
        state.replace_superset(records(60));
        state.reveal_more(Instant::now());
        assert_eq!(state.visible_count(), 30);

        state.set_query("page");
        assert_eq!(state.visible_count(), state.filtered().len());
        assert!(state.visible_count() > 20);
        assert_eq!(state.reveal_more(Instant::now()), Reveal::Searching);

        state.set_query("   ");
        assert!(!state.is_searching());
        assert_eq!(state.visible_count(), 20);
        assert_eq!(state.filtered().len(), 60);
    }

    #[test]
    fn superset_replacement_reruns_active_search() {
        let mut state = DisplayState::default();
        state.replace_superset(records(3));
        state.set_query("foo");
        assert!(state.filtered().is_empty());

        let mut bigger = records(3);
        bigger.insert(0, note(50, "foo bar"));
        state.replace_superset(bigger);
        assert_eq!(state.filtered().len(), 1);
        assert_eq!(state.filtered()[0].id, 50);
    }

    #[test]
    fn clear_keeps_inputs() {
        let mut state = DisplayState::default();
        state.replace_superset(records(4));
        state.set_notes_only(true);
        state.clear();
        assert!(state.superset().is_empty());
        assert!(state.notes_only());
        assert_eq!(state.visible_count(), 0);
    }
}
