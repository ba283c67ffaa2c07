//! Downstream helper over the published catalogue.
//!
//! Filters rows by a search profile, renders them as a Markdown table,
//! and asks an opaque text generator for a recommendation built on that
//! table. No generator backend lives in this crate.

use async_trait::async_trait;
use std::fmt::Write as _;

use crate::model::{CourseRecord, SchoolLevel, Topic};
use crate::rules::fold;

/// Label of sources that serve every region.
pub const NATIONAL_LABEL: &str = "Nazionale";

/// Reply used when no course matches, without calling the generator.
pub const NO_MATCH_REPLY: &str =
    "Nessun corso attivo corrisponde ai criteri indicati. Prova ad ampliare la ricerca.";

/// A search profile. Unset fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CatalogueQuery {
    pub school_level: Option<SchoolLevel>,
    pub topic: Option<Topic>,
    pub region: Option<String>,
    pub text: Option<String>,
}

impl CatalogueQuery {
    /// Whether `record` fits this profile.
    ///
    /// Courses tagged for every school level or with a mixed topic match any
    /// level or topic; national courses match any region.
    pub fn matches(&self, record: &CourseRecord) -> bool {
        let level_ok = self.school_level.is_none_or(|level| {
            record.school_level == level || record.school_level == SchoolLevel::Tutti
        });
        let topic_ok = self
            .topic
            .is_none_or(|topic| record.topic == topic || record.topic == Topic::Misto);
        let region_ok = self.region.as_deref().is_none_or(|region| {
            let source = fold(&record.source_label);
            source == fold(region) || source == fold(NATIONAL_LABEL)
        });
        let text_ok = self.text.as_deref().is_none_or(|text| {
            let title = fold(&record.title);
            fold(text).split(' ').all(|word| title.contains(word))
        });

        level_ok && topic_ok && region_ok && text_ok
    }

    /// Human description of the profile, for the prompt.
    fn describe(&self) -> String {
        let mut parts = Vec::new();
        if let Some(level) = self.school_level {
            parts.push(format!("ordine di scuola: {level}"));
        }
        if let Some(topic) = self.topic {
            parts.push(format!("tema: {topic}"));
        }
        if let Some(region) = &self.region {
            parts.push(format!("regione: {region}"));
        }
        if let Some(text) = &self.text {
            parts.push(format!("parole chiave: {text}"));
        }
        if parts.is_empty() {
            "nessun vincolo".to_string()
        } else {
            parts.join("; ")
        }
    }
}

/// Records matching `query`, in catalogue order.
pub fn select<'a>(records: &'a [CourseRecord], query: &CatalogueQuery) -> Vec<&'a CourseRecord> {
    records.iter().filter(|r| query.matches(r)).collect()
}

fn cell(text: &str) -> String {
    text.replace('|', "\\|").replace(['\n', '\r'], " ")
}

/// Render records as a Markdown table, keeping at most `max_rows` rows.
///
/// A trailing line reports how many rows were left out.
pub fn render_table(records: &[&CourseRecord], max_rows: usize) -> String {
    let mut out = String::from(
        "| ID | Titolo | Ordine di scuola | Tema | Area DigCompEdu | Fonte | Scadenza | Link |\n\
         |---|---|---|---|---|---|---|---|\n",
    );

    for record in records.iter().take(max_rows) {
        let expiry = record
            .expiry_date
            .map(|d| d.format("%d/%m/%Y").to_string())
            .unwrap_or_else(|| "-".to_string());
        let _ = writeln!(
            out,
            "| {} | {} | {} | {} | {} | {} | {} | {} |",
            record.id,
            cell(&record.title),
            record.school_level,
            record.topic,
            cell(&record.competency_area),
            cell(&record.source_label),
            expiry,
            record.url,
        );
    }

    if records.len() > max_rows {
        let _ = writeln!(out, "\n_... e altri {} corsi._", records.len() - max_rows);
    }
    out
}

/// Build the prompt sent to the text generator.
pub fn build_prompt(query: &CatalogueQuery, records: &[&CourseRecord], max_rows: usize) -> String {
    format!(
        "Sei un consulente per la formazione dei docenti della scuola italiana.\n\
         Profilo del docente: {profile}.\n\n\
         Usa esclusivamente i corsi elencati nella tabella seguente. Consiglia al \
         massimo cinque corsi, spiegando in una frase perché ciascuno è adatto al \
         profilo, e riporta per ognuno il link. Non inventare corsi o link.\n\n\
         {table}",
        profile = query.describe(),
        table = render_table(records, max_rows),
    )
}

#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum GeneratorError {
    #[error("text generator unavailable: {0}")]
    Unavailable(String),
}

/// Opaque text-generation collaborator: prompt in, text out.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String, GeneratorError>;
}

/// Filter the catalogue, build the prompt and ask `generator` for advice.
///
/// When nothing matches, the generator is not called.
pub async fn recommend(
    records: &[CourseRecord],
    query: &CatalogueQuery,
    generator: &dyn TextGenerator,
    max_rows: usize,
) -> Result<String, GeneratorError> {
    let selected = select(records, query);
    if selected.is_empty() {
        return Ok(NO_MATCH_REPLY.to_string());
    }
    tracing::debug!(matched = selected.len(), "Requesting recommendation");
    generator
        .generate(&build_prompt(query, &selected, max_rows))
        .await
}
