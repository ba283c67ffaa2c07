//! Validity filter: promotes normalized candidates to [`CourseRecord`]s.
//!
//! Rejections are the expected path for a heuristic extractor, so they are
//! counted in [`FilterStats`] and traced, never reported as errors.

use chrono::NaiveDate;
use serde::Serialize;
use tracing::trace;

use crate::model::{CourseRecord, NormalizedCandidate};

/// Why a candidate did not make it into the catalogue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    NoTitle,
    BadUrl,
    Expired,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FilterStats {
    pub kept: usize,
    pub rejected_no_title: usize,
    pub rejected_bad_url: usize,
    pub rejected_expired: usize,
}

impl FilterStats {
    fn record(&mut self, rejection: Rejection) {
        match rejection {
            Rejection::NoTitle => self.rejected_no_title += 1,
            Rejection::BadUrl => self.rejected_bad_url += 1,
            Rejection::Expired => self.rejected_expired += 1,
        }
    }

    pub fn rejected(&self) -> usize {
        self.rejected_no_title + self.rejected_bad_url + self.rejected_expired
    }
}

/// A title is usable when it has at least one letter or digit.
fn usable_title(title: &str) -> bool {
    title.chars().any(char::is_alphanumeric)
}

/// Filters candidates against the date the run started.
#[derive(Debug, Clone, Copy)]
pub struct ValidityFilter {
    run_date: NaiveDate,
}

impl ValidityFilter {
    pub fn new(run_date: NaiveDate) -> Self {
        Self { run_date }
    }

    /// Validate one candidate. A course expiring on the run date is still valid.
    pub fn check(&self, candidate: NormalizedCandidate) -> Result<CourseRecord, Rejection> {
        let title = candidate.title.trim();
        if !usable_title(title) {
            return Err(Rejection::NoTitle);
        }

        let url = match candidate.url {
            Some(url)
                if matches!(url.scheme(), "http" | "https") && url.host_str().is_some() =>
            {
                url
            }
            _ => return Err(Rejection::BadUrl),
        };

        if candidate
            .expiry_date
            .is_some_and(|expiry| expiry < self.run_date)
        {
            return Err(Rejection::Expired);
        }

        Ok(CourseRecord {
            id: candidate.id,
            title: title.to_string(),
            url,
            source_label: candidate.source_label,
            school_level: candidate.school_level,
            topic: candidate.topic,
            competency_area: candidate.competency_area,
            expiry_date: candidate.expiry_date,
        })
    }

    /// Validate a batch, keeping input order.
    pub fn apply(
        &self,
        candidates: impl IntoIterator<Item = NormalizedCandidate>,
    ) -> (Vec<CourseRecord>, FilterStats) {
        let mut stats = FilterStats::default();
        let mut kept = Vec::new();

        for candidate in candidates {
            let id = candidate.id.clone();
            match self.check(candidate) {
                Ok(record) => kept.push(record),
                Err(rejection) => {
                    trace!(id = %id, reason = ?rejection, "Candidate dropped");
                    stats.record(rejection);
                }
            }
        }

        stats.kept = kept.len();
        (kept, stats)
    }
}
