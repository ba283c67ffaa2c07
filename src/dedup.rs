//! Cross-source deduplication.
//!
//! Records are keyed by their resolved id, or by a normalized URL when the id
//! is the sentinel. The first record seen for a key is kept unchanged and
//! later ones are dropped without merging, so callers must feed records in
//! registry order for the tie-break to be deterministic.

use indexmap::IndexMap;
use indexmap::map::Entry;
use tracing::trace;
use url::Url;

use crate::model::{CourseId, CourseRecord};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DedupKey {
    Id(String),
    Url(String),
}

impl DedupKey {
    pub fn of(record: &CourseRecord) -> Self {
        match &record.id {
            CourseId::Resolved(id) => Self::Id(id.clone()),
            CourseId::Unresolved => Self::Url(normalize_url(&record.url)),
        }
    }
}

/// Comparison form of a URL: lowercase host, no fragment, no trailing slash,
/// no default port. The query is kept since many portals identify courses by it.
pub fn normalize_url(url: &Url) -> String {
    let host = url.host_str().unwrap_or_default().to_ascii_lowercase();
    let port = url.port().map(|p| format!(":{p}")).unwrap_or_default();
    let path = url.path().trim_end_matches('/');
    let mut out = format!("{}://{host}{port}{path}", url.scheme());
    if let Some(query) = url.query().filter(|q| !q.is_empty()) {
        out.push('?');
        out.push_str(query);
    }
    out
}

/// Keep the first record per key. Returns the survivors in first-seen order
/// and the number of dropped duplicates.
pub fn dedup(records: impl IntoIterator<Item = CourseRecord>) -> (Vec<CourseRecord>, usize) {
    let mut seen: IndexMap<DedupKey, CourseRecord> = IndexMap::new();
    let mut dropped = 0;

    for record in records {
        match seen.entry(DedupKey::of(&record)) {
            Entry::Vacant(slot) => {
                slot.insert(record);
            }
            Entry::Occupied(kept) => {
                trace!(
                    key = ?kept.key(),
                    kept_source = kept.get().source_label.as_str(),
                    dropped_source = record.source_label.as_str(),
                    "Duplicate course dropped"
                );
                dropped += 1;
            }
        }
    }

    (seen.into_values().collect(), dropped)
}
