//! Record extractor: finds anchors that look like course-detail links.
//!
//! Portals share no markup conventions, so selection is heuristic: an anchor
//! qualifies when its visible text is long enough to be a course title and
//! its `href` carries one of a few course-detail signatures. Precision is
//! tuned by adjusting [`DETAIL_SIGNATURES`], not by per-site parsers.

use html_scraper::{ElementRef, Html, Selector};
use regex::RegexSet;
use std::sync::LazyLock;

use crate::model::Candidate;

/// `href` patterns that identify course-detail pages.
pub const DETAIL_SIGNATURES: &[&str] = &[
    r"(?i)course[/_-]?detail",
    r"(?i)dettaglio[-_]?(corso|percorso)",
    r"(?i)scheda[-_]?corso",
    r"(?i)/(corso|corsi|percorso|percorsi|course|courses)/[^/?#]*\d",
    r"(?i)[?&](id|idcorso|id_corso|courseid|course_id|corso|percorso)=\d+",
];

/// Elements whose text is taken as a candidate's surrounding context.
const BLOCK_TAGS: &[&str] = &[
    "li", "tr", "td", "dd", "article", "section", "div", "p",
];

/// A block with more text than this is a page container, not a course card.
const MAX_CONTEXT_CHARS: usize = 600;

/// `data-*` attributes some portals use to carry the course id.
const ID_ATTRIBUTES: &[&str] = &["data-id", "data-course-id", "data-id-corso"];

static ANCHOR_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("a[href]").unwrap());

static DETAIL_HREF: LazyLock<RegexSet> =
    LazyLock::new(|| RegexSet::new(DETAIL_SIGNATURES).unwrap());

/// Whether `href` matches at least one course-detail signature.
pub fn looks_like_course_link(href: &str) -> bool {
    let href = href.trim();
    if href.is_empty() || href.starts_with('#') {
        return false;
    }
    let lower = href.to_ascii_lowercase();
    if lower.starts_with("javascript:") || lower.starts_with("mailto:") {
        return false;
    }
    DETAIL_HREF.is_match(href)
}

fn collapse_text<'a>(parts: impl Iterator<Item = &'a str>) -> String {
    parts
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Extracts [`Candidate`]s from a parsed listing page.
#[derive(Debug, Clone)]
pub struct Extractor {
    min_title_len: usize,
}

impl Extractor {
    pub fn new(min_title_len: usize) -> Self {
        Self { min_title_len }
    }

    /// Lazily yield the candidates of one page, in document order.
    pub fn candidates<'a>(&'a self, html: &'a Html) -> impl Iterator<Item = Candidate> + 'a {
        html.select(&ANCHOR_SEL)
            .filter_map(move |anchor| self.candidate(anchor))
    }

    fn candidate(&self, anchor: ElementRef<'_>) -> Option<Candidate> {
        let href = anchor.attr("href")?.trim();
        if !looks_like_course_link(href) {
            return None;
        }

        let mut title = collapse_text(anchor.text());
        if title.chars().count() <= self.min_title_len
            && let Some(attr_title) = anchor.attr("title")
        {
            // Icon links sometimes carry the course name only in `title`.
            title = collapse_text(std::iter::once(attr_title));
        }
        if title.chars().count() <= self.min_title_len {
            return None;
        }

        let explicit_id = ID_ATTRIBUTES
            .iter()
            .filter_map(|name| anchor.attr(name))
            .map(str::trim)
            .find(|v| !v.is_empty() && v.chars().all(|c| c.is_ascii_digit()))
            .map(str::to_string);

        let context = block_context(anchor, &title);

        Some(Candidate {
            title,
            href: href.to_string(),
            context,
            explicit_id,
        })
    }
}

/// Whether `block` holds a course link other than `anchor`.
fn holds_other_course(block: ElementRef<'_>, anchor: ElementRef<'_>) -> bool {
    block.select(&ANCHOR_SEL).any(|other| {
        other.id() != anchor.id() && other.attr("href").is_some_and(looks_like_course_link)
    })
}

/// Text of the nearest block ancestor that says more than the anchor itself.
///
/// Climbing stops at `body`/`main`, at a block too large to be a single
/// course card, or at a block that also holds another course, so dates from
/// neighbouring courses don't bleed in.
fn block_context(anchor: ElementRef<'_>, title: &str) -> String {
    let mut context = String::new();
    for node in anchor.ancestors() {
        let Some(element) = ElementRef::wrap(node) else {
            continue;
        };
        let name = element.value().name();
        if matches!(name, "body" | "html" | "main") {
            break;
        }
        if !BLOCK_TAGS.contains(&name) {
            continue;
        }
        if holds_other_course(element, anchor) {
            break;
        }
        let text = collapse_text(element.text());
        if text.chars().count() > MAX_CONTEXT_CHARS {
            break;
        }
        context = text;
        if context.len() > title.len() {
            break;
        }
    }
    context
}
