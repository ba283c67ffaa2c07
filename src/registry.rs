//! Source registry: the ordered list of portals a run visits.
//!
//! Registry order is the deduplication tie-break: when the same course is
//! listed by several portals, the one appearing first here wins. The built-in
//! list therefore starts with the national listing, then the regional offices.

use serde::Deserialize;
use url::Url;

/// One portal publishing a course listing.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Source {
    pub endpoint: Url,
    pub label: String,
}

impl Source {
    pub fn new(endpoint: &str, label: &str) -> Result<Self, RegistryError> {
        let endpoint = Url::parse(endpoint).map_err(|e| RegistryError::InvalidEndpoint {
            endpoint: endpoint.to_string(),
            reason: e.to_string(),
        })?;
        Ok(Self {
            endpoint,
            label: label.to_string(),
        })
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("source registry is empty")]
    Empty,
    #[error("invalid source endpoint {endpoint:?}: {reason}")]
    InvalidEndpoint { endpoint: String, reason: String },
    #[error("source {label:?} has an empty label or a non-http endpoint")]
    InvalidSource { label: String },
}

/// Validated, ordered set of sources.
#[derive(Debug, Clone)]
pub struct Registry {
    sources: Vec<Source>,
}

impl Registry {
    pub fn new(sources: Vec<Source>) -> Result<Self, RegistryError> {
        if sources.is_empty() {
            return Err(RegistryError::Empty);
        }
        for source in &sources {
            let http = matches!(source.endpoint.scheme(), "http" | "https");
            if !http || source.endpoint.host_str().is_none() || source.label.trim().is_empty() {
                return Err(RegistryError::InvalidSource {
                    label: source.label.clone(),
                });
            }
        }
        Ok(Self { sources })
    }

    pub fn sources(&self) -> &[Source] {
        &self.sources
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

/// (endpoint, label) pairs of the built-in registry, national listing first.
const DEFAULT_SOURCES: &[(&str, &str)] = &[
    (
        "https://scuolafutura.pubblica.istruzione.it/didattica-digitale",
        "Nazionale",
    ),
    ("https://www.istruzione.lombardia.gov.it/formazione/", "Lombardia"),
    ("https://www.istruzionepiemonte.it/formazione/", "Piemonte"),
    ("https://www.istruzioneveneto.gov.it/formazione/", "Veneto"),
    ("https://www.istruzioneer.gov.it/formazione/", "Emilia-Romagna"),
    ("https://www.toscana.istruzione.it/formazione/", "Toscana"),
    ("https://www.usrlazio.it/formazione/", "Lazio"),
    ("https://www.campania.istruzione.it/formazione/", "Campania"),
    ("https://www.pugliausr.gov.it/formazione/", "Puglia"),
    ("https://www.usr.sicilia.it/formazione/", "Sicilia"),
];

/// The built-in sources, used when the config does not list any.
pub fn default_sources() -> Vec<Source> {
    DEFAULT_SOURCES
        .iter()
        .filter_map(|(endpoint, label)| Source::new(endpoint, label).ok())
        .collect()
}
