//! Field normalizer: turns a raw [`Candidate`] into a fully populated
//! [`NormalizedCandidate`]. Every step is total; missing information becomes
//! a sentinel or a default, never an error.

use chrono::NaiveDate;
use regex::Regex;
use std::sync::LazyLock;
use url::{ParseError, Url};

use crate::model::{Candidate, CourseId, NormalizedCandidate};
use crate::registry::Source;
use crate::rules::Rules;

/// Query parameters treated as explicit course identifiers.
const ID_PARAMS: &[&str] = &[
    "id",
    "idcorso",
    "id_corso",
    "courseid",
    "course_id",
    "corso",
    "percorso",
];

static DIGITS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d+").unwrap());

static DATE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(\d{1,2})[/.\-](\d{1,2})[/.\-](\d{4})\b").unwrap()
});

/// Resolve `href` against the page it was found on.
///
/// Absolute hrefs (scheme present) are kept as they are; anything else is
/// joined onto `base`. Returns `None` when the href cannot form a URL at all.
pub fn resolve_link(base: &Url, href: &str) -> Option<Url> {
    let href = href.trim();
    match Url::parse(href) {
        Ok(url) => Some(url),
        Err(ParseError::RelativeUrlWithoutBase) => base.join(href).ok(),
        Err(_) => None,
    }
}

/// Extract a course identifier from a resolved URL.
///
/// A numeric value of a known id parameter (`?id=`, `?idCorso=`, ...) wins.
/// Otherwise the first run of at least `min_digits` digits in the path or
/// query is used. The host is never searched.
pub fn extract_id(url: &Url, min_digits: usize) -> CourseId {
    let named = url.query_pairs().find(|(key, value)| {
        ID_PARAMS.contains(&key.to_ascii_lowercase().as_str())
            && !value.is_empty()
            && value.chars().all(|c| c.is_ascii_digit())
    });
    if let Some((_, value)) = named {
        return CourseId::Resolved(value.into_owned());
    }

    let mut haystack = url.path().to_string();
    if let Some(query) = url.query() {
        haystack.push('?');
        haystack.push_str(query);
    }

    DIGITS_RE
        .find_iter(&haystack)
        .find(|m| m.as_str().len() >= min_digits)
        .map(|m| CourseId::Resolved(m.as_str().to_string()))
        .unwrap_or(CourseId::Unresolved)
}

/// Find the expiry date in free text.
///
/// Looks for `DD/MM/YYYY` tokens (also `-` or `.` separated). When several
/// valid dates appear, e.g. "dal 01/02/2025 al 15/03/2025", the latest one is
/// taken as the expiry. Impossible dates like `31/02/2025` are ignored.
pub fn extract_expiry(text: &str) -> Option<NaiveDate> {
    DATE_RE
        .captures_iter(text)
        .filter_map(|caps| {
            let day: u32 = caps[1].parse().ok()?;
            let month: u32 = caps[2].parse().ok()?;
            let year: i32 = caps[3].parse().ok()?;
            NaiveDate::from_ymd_opt(year, month, day)
        })
        .max()
}

/// Decode leftover HTML entities and collapse whitespace.
pub fn clean_title(raw: &str) -> String {
    let decoded = if raw.contains('&') {
        htmlize::unescape(raw).to_string()
    } else {
        raw.to_string()
    };
    decoded.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Applies link resolution, id extraction, inference and date parsing.
#[derive(Debug, Clone)]
pub struct Normalizer<'a> {
    rules: &'a Rules,
    min_id_digits: usize,
}

impl<'a> Normalizer<'a> {
    pub fn new(rules: &'a Rules, min_id_digits: usize) -> Self {
        Self {
            rules,
            min_id_digits,
        }
    }

    pub fn normalize(&self, source: &Source, candidate: Candidate) -> NormalizedCandidate {
        let title = clean_title(&candidate.title);
        let url = resolve_link(&source.endpoint, &candidate.href);

        let id = match candidate.explicit_id {
            Some(explicit) => CourseId::Resolved(explicit),
            None => url
                .as_ref()
                .map(|u| extract_id(u, self.min_id_digits))
                .unwrap_or(CourseId::Unresolved),
        };

        let haystack = format!("{title} {}", candidate.context);

        NormalizedCandidate {
            id,
            school_level: self.rules.school_level.infer(&haystack),
            topic: self.rules.topic.infer(&haystack),
            competency_area: self.rules.competency.infer(&haystack).label().to_string(),
            expiry_date: extract_expiry(&candidate.context),
            title,
            url,
            source_label: source.label.clone(),
        }
    }
}
