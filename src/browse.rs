//! Plain-text rendering of the display state for `stash list` and
//! `stash find`.
//!
//! Browsing output is grouped by domain (groups in name order, records
//! newest first within a group). An active search is printed as a flat
//! ranked list instead, since grouping would scramble the ranking.

use std::fmt::Write;

use stash_core::models::BookmarkRecord;
use stash_core::view::DisplayState;

/// Renders whatever `state` currently makes visible, followed by a
/// `showing X of Y` footer.
pub fn render(state: &DisplayState) -> String {
    let mut out = String::new();
    if state.visible().is_empty() {
        out.push_str(if state.is_searching() {
            "No results.\n"
        } else {
            "No bookmarks.\n"
        });
        return out;
    }

    if state.is_searching() {
        render_ranked(&mut out, state.visible());
    } else {
        render_groups(&mut out, state);
    }

    let _ = writeln!(
        out,
        "showing {} of {}",
        state.visible_count(),
        state.filtered().len()
    );
    out
}

fn render_groups(out: &mut String, state: &DisplayState) {
    for (domain, records) in state.groups() {
        let _ = writeln!(out, "{} ({})", domain, records.len());
        for record in &records {
            write_record(out, record, "  ");
        }
        out.push('\n');
    }
}

fn render_ranked(out: &mut String, records: &[BookmarkRecord]) {
    for (i, record) in records.iter().enumerate() {
        let _ = write!(out, "{}. ", i + 1);
        write_record(out, record, "");
    }
    out.push('\n');
}

/// Renders a bare list of records, as returned by a substring search.
pub fn render_list(records: &[BookmarkRecord]) -> String {
    let mut out = String::new();
    if records.is_empty() {
        out.push_str("No results.\n");
        return out;
    }
    render_ranked(&mut out, records);
    out
}

fn write_record(out: &mut String, record: &BookmarkRecord, indent: &str) {
    let _ = writeln!(
        out,
        "{}[{}] {}",
        indent,
        record.id,
        record.title.replace('\n', " ")
    );
    let detail = format!("{}    ", indent);
    if let Some(url) = &record.url {
        let _ = writeln!(out, "{}url: {}", detail, url);
    }
    if !record.notes.is_empty() {
        let _ = writeln!(
            out,
            "{}notes: \"{}\"",
            detail,
            excerpt(&record.notes, 120)
        );
    }
    let tags = record.tag_list();
    if !tags.is_empty() {
        let _ = writeln!(out, "{}tags: {}", detail, tags.join(", "));
    }
    let _ = writeln!(
        out,
        "{}added: {}",
        detail,
        record.created_at.format("%Y-%m-%d")
    );
}

/// First line-folded `max` characters of `text`, with an ellipsis when cut.
fn excerpt(text: &str, max: usize) -> String {
    let flat = text.replace('\n', " ");
    let flat = flat.trim();
    if flat.chars().count() <= max {
        return flat.to_string();
    }
    let mut cut: String = flat.chars().take(max).collect();
    cut.push('…');
    cut
}
