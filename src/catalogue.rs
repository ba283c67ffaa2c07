//! Catalogue persistence: the published CSV file and its fallback policy.
//!
//! Downstream readers must always find a non-empty, schema-valid file. A
//! publish therefore either replaces the file atomically with fresh records,
//! leaves a valid previous file untouched, or, when neither is available,
//! writes a single placeholder row.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use url::Url;

use crate::model::{COLUMNS, CompetencyArea, CourseId, CourseRecord, SchoolLevel, Topic};

/// Landing page used by the placeholder row.
pub const PLACEHOLDER_URL: &str = "https://scuolafutura.pubblica.istruzione.it/";

const DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Debug, thiserror::Error)]
pub enum CatalogueError {
    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("failed to replace {}: {source}", .path.display())]
    Persist {
        path: PathBuf,
        #[source]
        source: tempfile::PersistError,
    },
    #[error("invalid catalogue: {0}")]
    Schema(String),
}

fn io_error(path: &Path) -> impl FnOnce(io::Error) -> CatalogueError + '_ {
    move |source| CatalogueError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Which fallback tier a publish ended up in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "tier", rename_all = "snake_case")]
pub enum WriteOutcome {
    /// Fresh records replaced the file.
    Written { rows: usize },
    /// Nothing fresh; the valid previous file was left as is.
    KeptPrevious { rows: usize },
    /// Nothing fresh and nothing usable on disk; a placeholder was written.
    Placeholder,
}

/// On-disk row shape. Field order matches [`COLUMNS`].
#[derive(Debug, Serialize, Deserialize)]
struct CatalogueRow {
    id: String,
    title: String,
    url: String,
    source_label: String,
    school_level: String,
    topic: String,
    competency_area: String,
    expiry_date: String,
}

impl From<&CourseRecord> for CatalogueRow {
    fn from(record: &CourseRecord) -> Self {
        Self {
            id: record.id.to_string(),
            title: record.title.clone(),
            url: record.url.to_string(),
            source_label: record.source_label.clone(),
            school_level: record.school_level.label().to_string(),
            topic: record.topic.label().to_string(),
            competency_area: record.competency_area.clone(),
            expiry_date: record
                .expiry_date
                .map(|d| d.format(DATE_FORMAT).to_string())
                .unwrap_or_default(),
        }
    }
}

impl TryFrom<CatalogueRow> for CourseRecord {
    type Error = CatalogueError;

    fn try_from(row: CatalogueRow) -> Result<Self, Self::Error> {
        let title = row.title.trim().to_string();
        if title.is_empty() {
            return Err(CatalogueError::Schema("row with empty title".into()));
        }
        let url = Url::parse(row.url.trim())
            .map_err(|e| CatalogueError::Schema(format!("bad url {:?}: {e}", row.url)))?;
        let school_level: SchoolLevel = row.school_level.parse().map_err(CatalogueError::Schema)?;
        let topic: Topic = row.topic.parse().map_err(CatalogueError::Schema)?;
        let expiry_date = match row.expiry_date.trim() {
            "" => None,
            raw => Some(NaiveDate::parse_from_str(raw, DATE_FORMAT).map_err(|e| {
                CatalogueError::Schema(format!("bad expiry_date {raw:?}: {e}"))
            })?),
        };
        let competency_area = match row.competency_area.trim() {
            "" => CompetencyArea::default().label().to_string(),
            tag => tag.to_string(),
        };

        Ok(CourseRecord {
            id: CourseId::parse(&row.id),
            title,
            url,
            source_label: row.source_label,
            school_level,
            topic,
            competency_area,
            expiry_date,
        })
    }
}

/// The single row written when no real data exists anywhere.
pub fn placeholder_record() -> CourseRecord {
    CourseRecord {
        id: CourseId::Unresolved,
        title: "Catalogo corsi Scuola Futura (aggiornamento in corso)".to_string(),
        url: Url::parse(PLACEHOLDER_URL).expect("placeholder URL is valid"),
        source_label: "Nazionale".to_string(),
        school_level: SchoolLevel::Tutti,
        topic: Topic::Misto,
        competency_area: CompetencyArea::default().label().to_string(),
        expiry_date: None,
    }
}

/// Read and validate a published catalogue.
///
/// Fails when the file is missing, the header differs from [`COLUMNS`], or
/// any row does not parse. An empty (header-only) file reads as `Ok(vec![])`.
pub fn read_catalogue(path: &Path) -> Result<Vec<CourseRecord>, CatalogueError> {
    let file = fs::File::open(path).map_err(io_error(path))?;
    let mut reader = csv::ReaderBuilder::new().has_headers(true).from_reader(file);

    let headers = reader.headers()?;
    if !headers.iter().eq(COLUMNS.iter().copied()) {
        return Err(CatalogueError::Schema(format!(
            "unexpected header {:?}",
            headers.iter().collect::<Vec<_>>()
        )));
    }

    reader
        .deserialize::<CatalogueRow>()
        .map(|row| CourseRecord::try_from(row?))
        .collect()
}

/// Serialize records to CSV text with the fixed header.
pub fn to_csv_string(records: &[CourseRecord]) -> Result<String, CatalogueError> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(Vec::new());
    write_rows(&mut writer, records)?;
    let bytes = writer
        .into_inner()
        .map_err(|e| CatalogueError::Schema(format!("failed to finish CSV buffer: {e}")))?;
    String::from_utf8(bytes).map_err(|e| CatalogueError::Schema(e.to_string()))
}

fn write_rows<W: io::Write>(
    writer: &mut csv::Writer<W>,
    records: &[CourseRecord],
) -> Result<(), CatalogueError> {
    writer.write_record(COLUMNS)?;
    for record in records {
        writer.serialize(CatalogueRow::from(record))?;
    }
    Ok(())
}

/// Publishes the catalogue to one fixed path.
#[derive(Debug, Clone)]
pub struct CatalogueWriter {
    path: PathBuf,
}

impl CatalogueWriter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Publish `records`, applying the fallback policy when it is empty.
    ///
    /// The only error is failing to write when a write is required; a
    /// previously good file is never truncated or partially overwritten.
    pub fn publish(&self, records: &[CourseRecord]) -> Result<WriteOutcome, CatalogueError> {
        if !records.is_empty() {
            self.write_atomic(records)?;
            info!(path = %self.path.display(), rows = records.len(), "Catalogue written");
            return Ok(WriteOutcome::Written {
                rows: records.len(),
            });
        }

        match read_catalogue(&self.path) {
            Ok(previous) if !previous.is_empty() => {
                warn!(
                    path = %self.path.display(),
                    rows = previous.len(),
                    "No fresh records; keeping previous catalogue"
                );
                return Ok(WriteOutcome::KeptPrevious {
                    rows: previous.len(),
                });
            }
            Ok(_) => debug!(path = %self.path.display(), "Previous catalogue has no rows"),
            Err(CatalogueError::Io { source, .. }) if source.kind() == io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "No previous catalogue")
            }
            Err(e) => warn!(path = %self.path.display(), error = %e, "Previous catalogue unusable"),
        }

        warn!(path = %self.path.display(), "No data available; writing placeholder catalogue");
        self.write_atomic(&[placeholder_record()])?;
        Ok(WriteOutcome::Placeholder)
    }

    /// Write to a temporary file beside the target, then rename over it.
    fn write_atomic(&self, records: &[CourseRecord]) -> Result<(), CatalogueError> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        fs::create_dir_all(dir).map_err(io_error(dir))?;

        let mut tmp = tempfile::Builder::new()
            .prefix(".catalogo-")
            .suffix(".csv.tmp")
            .tempfile_in(dir)
            .map_err(io_error(dir))?;

        {
            let mut writer = csv::WriterBuilder::new()
                .has_headers(false)
                .from_writer(tmp.as_file_mut());
            write_rows(&mut writer, records)?;
            writer.flush().map_err(io_error(&self.path))?;
        }
        tmp.as_file().sync_all().map_err(io_error(&self.path))?;

        // Temp files are created owner-only; the catalogue is read by other users.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(tmp.path(), fs::Permissions::from_mode(0o644))
                .map_err(io_error(tmp.path()))?;
        }

        tmp.persist(&self.path)
            .map_err(|source| CatalogueError::Persist {
                path: self.path.clone(),
                source,
            })?;
        Ok(())
    }
}
