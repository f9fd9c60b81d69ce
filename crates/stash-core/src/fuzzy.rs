//! Typo-tolerant ranked search over a snapshot of bookmarks.
//!
//! # Scoring
//!
//! Each searched field is scored independently. A field's score is the
//! smallest edit distance between the (lowercased) query and any substring
//! of the field, divided by the query length, so `0.0` is an exact
//! substring hit and `1.0` means nothing lines up. A field matches when its
//! score is at most the configured threshold (default `0.3`).
//!
//! A record matches when any field matches. Its overall score is the
//! product of `score^(weight * norm)` over the matching fields, where the
//! four fields share equal weight and `norm = 1 / sqrt(token count)`
//! favors hits in short fields. Exact hits use `f64::EPSILON` instead of
//! zero so the product still discriminates. Results sort by ascending score,
//! ties by snapshot position, which keeps the order deterministic.
//!
//! Queries longer than [`MAX_PATTERN_LEN`] characters are scored in
//! fixed-size chunks; the field score is the summed chunk distance over
//! the full query length, so every chunk counts against the threshold.

use crate::models::BookmarkRecord;

/// Default match-quality floor.
pub const DEFAULT_THRESHOLD: f64 = 0.3;

/// Longest query scored as one pattern.
pub const MAX_PATTERN_LEN: usize = 32;

/// The text fields a record is searched on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchField {
    Title,
    Url,
    Notes,
    Tags,
}

impl SearchField {
    pub const ALL: [SearchField; 4] = [
        SearchField::Title,
        SearchField::Url,
        SearchField::Notes,
        SearchField::Tags,
    ];

    fn text(self, record: &BookmarkRecord) -> Option<&str> {
        match self {
            SearchField::Title => Some(record.title.as_str()),
            SearchField::Url => record.url.as_deref(),
            SearchField::Notes => Some(record.notes.as_str()),
            SearchField::Tags => Some(record.tags.as_str()),
        }
    }
}

/// Index tuning.
#[derive(Debug, Clone)]
pub struct FuzzyOptions {
    /// Largest field score that still counts as a match, in `(0, 1]`.
    pub threshold: f64,
    pub fields: Vec<SearchField>,
}

impl Default for FuzzyOptions {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
            fields: SearchField::ALL.to_vec(),
        }
    }
}

struct PreparedField {
    chars: Vec<char>,
    norm: f64,
}

struct PreparedRecord {
    fields: Vec<PreparedField>,
}

/// A search hit: the record and its overall score (lower is better).
#[derive(Debug, Clone)]
pub struct FuzzyMatch<'a> {
    pub record: &'a BookmarkRecord,
    pub score: f64,
}

/// Searchable snapshot of a record set.
///
/// Built once per snapshot; never updated in place. Rebuild with
/// [`FuzzyIndex::build`] whenever the snapshot is replaced.
pub struct FuzzyIndex {
    records: Vec<BookmarkRecord>,
    prepared: Vec<PreparedRecord>,
    options: FuzzyOptions,
}

impl FuzzyIndex {
    pub fn build(records: Vec<BookmarkRecord>) -> Self {
        Self::with_options(records, FuzzyOptions::default())
    }

    pub fn with_options(records: Vec<BookmarkRecord>, options: FuzzyOptions) -> Self {
        let prepared = records
            .iter()
            .map(|record| PreparedRecord {
                fields: options
                    .fields
                    .iter()
                    .filter_map(|&field| {
                        let text = field.text(record)?;
                        if text.trim().is_empty() {
                            return None;
                        }
                        Some(PreparedField {
                            chars: text.to_lowercase().chars().collect(),
                            norm: field_norm(text),
                        })
                    })
                    .collect(),
            })
            .collect();

        Self {
            records,
            prepared,
            options,
        }
    }

    /// The snapshot this index was built over, in original order.
    pub fn records(&self) -> &[BookmarkRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Ranked matches for `query`. A blank query returns no matches;
    /// callers wanting "everything" for a blank query must short-circuit.
    pub fn search(&self, query: &str) -> Vec<&BookmarkRecord> {
        self.search_scored(query)
            .into_iter()
            .map(|m| m.record)
            .collect()
    }

    /// Like [`search`](Self::search) but keeps scores.
    pub fn search_scored(&self, query: &str) -> Vec<FuzzyMatch<'_>> {
        let pattern: Vec<char> = query.trim().to_lowercase().chars().collect();
        if pattern.is_empty() {
            return Vec::new();
        }
        let chunks: Vec<&[char]> = pattern.chunks(MAX_PATTERN_LEN).collect();
        let weight = 1.0 / self.options.fields.len().max(1) as f64;

        let mut hits: Vec<(usize, FuzzyMatch<'_>)> = self
            .prepared
            .iter()
            .enumerate()
            .filter_map(|(idx, prepared)| {
                let mut total = 1.0_f64;
                let mut any_field = false;
                for field in &prepared.fields {
                    let Some(score) = field_score(&chunks, &field.chars, self.options.threshold)
                    else {
                        continue;
                    };
                    let base = if score == 0.0 { f64::EPSILON } else { score };
                    total *= base.powf(weight * field.norm);
                    any_field = true;
                }
                if !any_field {
                    return None;
                }
                Some((
                    idx,
                    FuzzyMatch {
                        record: &self.records[idx],
                        score: total,
                    },
                ))
            })
            .collect();

        hits.sort_by(|(ia, a), (ib, b)| {
            a.score
                .partial_cmp(&b.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(ia.cmp(ib))
        });
        hits.into_iter().map(|(_, m)| m).collect()
    }
}

/// Score of one field against the chunked pattern, or `None` if it does
/// not clear the threshold.
fn field_score(chunks: &[&[char]], text: &[char], threshold: f64) -> Option<f64> {
    let mut distance = 0;
    let mut len = 0;
    for chunk in chunks {
        if *chunk != text {
            distance += approximate_distance(chunk, text);
        }
        len += chunk.len();
    }
    let score = distance as f64 / len.max(1) as f64;
    (score <= threshold).then_some(score)
}

/// Smallest edit distance between `pattern` and any substring of `text`
/// (Sellers' variant of Levenshtein: the match may start and end anywhere
/// in `text` at no cost).
pub fn approximate_distance(pattern: &[char], text: &[char]) -> usize {
    let m = pattern.len();
    if m == 0 {
        return 0;
    }
    if text.is_empty() {
        return m;
    }

    // prev[i] = distance of pattern[..i] ending at the previous text column.
    let mut prev: Vec<usize> = (0..=m).collect();
    let mut curr: Vec<usize> = vec![0; m + 1];
    let mut best = prev[m];

    for &tc in text {
        curr[0] = 0;
        for i in 1..=m {
            let substitute = prev[i - 1] + usize::from(pattern[i - 1] != tc);
            let delete = prev[i] + 1;
            let insert = curr[i - 1] + 1;
            curr[i] = substitute.min(delete).min(insert);
        }
        best = best.min(curr[m]);
        if best == 0 {
            return 0;
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    best
}

fn field_norm(text: &str) -> f64 {
    let tokens = text.split(' ').filter(|t| !t.is_empty()).count().max(1);
    let norm = 1.0 / (tokens as f64).sqrt();
    (norm * 1000.0).round() / 1000.0
}
