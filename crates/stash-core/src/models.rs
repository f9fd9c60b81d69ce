//! Bookmark data model and the derivation rules shared by every store.
//!
//! A [`BookmarkRecord`] is what stores hand back to clients. A
//! [`BookmarkDraft`] is the user-supplied part of a record (url, notes,
//! tags); `title` and `domain` are never user-settable and are recomputed
//! from the draft on every insert and update.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::store::StoreError;

/// Grouping key for records without a URL.
pub const NOTES_DOMAIN: &str = "Notes";

/// Grouping key for URLs that do not parse or carry no host.
pub const UNKNOWN_DOMAIN: &str = "unknown";

/// A persisted bookmark or note.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookmarkRecord {
    /// Store-assigned, immutable.
    pub id: i64,
    /// Absent for pure notes.
    #[serde(default)]
    pub url: Option<String>,
    pub title: String,
    #[serde(default)]
    pub notes: String,
    /// Comma-separated; empty means no tags.
    #[serde(default)]
    pub tags: String,
    pub domain: String,
    pub created_at: DateTime<Utc>,
}

impl BookmarkRecord {
    /// True when the record has a non-blank URL.
    pub fn has_url(&self) -> bool {
        self.url.as_deref().is_some_and(|u| !u.trim().is_empty())
    }

    /// Individual tags, trimmed, empties dropped.
    pub fn tag_list(&self) -> Vec<&str> {
        self.tags
            .split(',')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .collect()
    }
}

/// The user-editable fields of a record, as submitted on add or edit.
///
/// Construct with [`BookmarkDraft::new`] to get trimmed fields and a
/// blank URL collapsed to `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookmarkDraft {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub tags: String,
}

impl BookmarkDraft {
    pub fn new(url: Option<&str>, notes: &str, tags: &str) -> Self {
        let url = url
            .map(str::trim)
            .filter(|u| !u.is_empty())
            .map(str::to_string);
        Self {
            url,
            notes: notes.trim().to_string(),
            tags: tags.trim().to_string(),
        }
    }

    /// Re-applies the trimming rules to a draft that arrived over the wire.
    pub fn normalized(&self) -> Self {
        Self::new(self.url.as_deref(), &self.notes, &self.tags)
    }

    /// Rejects drafts with neither a URL nor notes.
    ///
    /// Must be called before any store call; stores call it again on
    /// their side of the boundary.
    pub fn validate(&self) -> Result<(), StoreError> {
        let has_url = self.url.as_deref().is_some_and(|u| !u.trim().is_empty());
        if !has_url && self.notes.trim().is_empty() {
            return Err(StoreError::Validation(
                "either a URL or notes is required".to_string(),
            ));
        }
        Ok(())
    }

    /// The domain this draft would be grouped under once stored.
    pub fn domain(&self) -> String {
        derive_domain(self.url.as_deref())
    }
}

/// Grouping key for a URL: its host, [`NOTES_DOMAIN`] when absent.
pub fn derive_domain(url: Option<&str>) -> String {
    match url.map(str::trim).filter(|u| !u.is_empty()) {
        None => NOTES_DOMAIN.to_string(),
        Some(raw) => url::Url::parse(raw)
            .ok()
            .and_then(|u| u.host_str().map(str::to_string))
            .filter(|h| !h.is_empty())
            .unwrap_or_else(|| UNKNOWN_DOMAIN.to_string()),
    }
}

/// Title for a note without a URL, e.g. `Oct 16, 2026, 09:41 AM`.
pub fn note_title(at: DateTime<Utc>) -> String {
    at.format("%b %-d, %Y, %I:%M %p").to_string()
}
