//! Reveal controller: a growing visible prefix of the filtered sequence.
//!
//! The controller only tracks a count. It never holds records; callers
//! pass the filtered length in and slice with [`RevealController::visible`].

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use crate::models::BookmarkRecord;

pub const DEFAULT_PAGE_SIZE: usize = 20;
pub const DEFAULT_REVEAL_STEP: usize = 10;
pub const DEFAULT_REVEAL_COOLDOWN: Duration = Duration::from_millis(150);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RevealConfig {
    /// Visible count after any reset.
    pub page_size: usize,
    /// Added per reveal-more trigger.
    pub step: usize,
    /// Triggers closer together than this are ignored.
    pub cooldown: Duration,
}

impl Default for RevealConfig {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            step: DEFAULT_REVEAL_STEP,
            cooldown: DEFAULT_REVEAL_COOLDOWN,
        }
    }
}

/// Outcome of a reveal-more trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reveal {
    /// The visible count grew to the contained value.
    Grew(usize),
    /// Everything is already visible.
    Exhausted,
    /// A search is active; results are shown in full.
    Searching,
    /// Too soon after the previous trigger.
    CoolingDown,
}

#[derive(Debug, Clone)]
pub struct RevealController {
    config: RevealConfig,
    visible: usize,
    len: usize,
    last_reveal: Option<Instant>,
}

impl RevealController {
    pub fn new(config: RevealConfig) -> Self {
        Self {
            config,
            visible: 0,
            len: 0,
            last_reveal: None,
        }
    }

    pub fn config(&self) -> &RevealConfig {
        &self.config
    }

    pub fn visible_count(&self) -> usize {
        self.visible
    }

    /// Called after every change of the filtered sequence.
    pub fn reset(&mut self, len: usize) {
        self.len = len;
        self.visible = self.config.page_size.min(len);
        self.last_reveal = None;
    }

    /// Handles a proximity-to-end signal from the presentation layer.
    pub fn reveal_more(&mut self, searching: bool, now: Instant) -> Reveal {
        if searching {
            return Reveal::Searching;
        }
        if self.visible >= self.len {
            return Reveal::Exhausted;
        }
        if let Some(last) = self.last_reveal {
            if now.saturating_duration_since(last) < self.config.cooldown {
                return Reveal::CoolingDown;
            }
        }
        self.visible = (self.visible + self.config.step).min(self.len);
        self.last_reveal = Some(now);
        Reveal::Grew(self.visible)
    }

    /// The visible prefix of `filtered`.
    ///
    /// While searching the whole filtered sequence is visible.
    pub fn visible<'a>(&self, filtered: &'a [BookmarkRecord], searching: bool) -> &'a [BookmarkRecord] {
        if searching {
            filtered
        } else {
            &filtered[..self.visible.min(filtered.len())]
        }
    }
}

impl Default for RevealController {
    fn default() -> Self {
        Self::new(RevealConfig::default())
    }
}

/// Partitions `prefix` by domain, groups keyed in ascending order, members
/// kept in prefix order.
pub fn group_by_domain(prefix: &[BookmarkRecord]) -> BTreeMap<String, Vec<BookmarkRecord>> {
    let mut groups: BTreeMap<String, Vec<BookmarkRecord>> = BTreeMap::new();
    for record in prefix {
        groups
            .entry(record.domain.clone())
            .or_default()
            .push(record.clone());
    }
    groups
}
