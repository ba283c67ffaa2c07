//! Course catalogue entities.
//!
//! A [`Candidate`] is what the extractor pulls out of a listing page. The
//! normalizer turns it into a [`NormalizedCandidate`], and only the validity
//! filter can promote one of those into a [`CourseRecord`], which guarantees
//! a usable title and an absolute http(s) URL.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use url::Url;

/// Sentinel written in the `id` column when no identifier could be resolved.
pub const UNRESOLVED_ID: &str = "N/D";

/// Fixed column order of the published catalogue.
pub const COLUMNS: [&str; 8] = [
    "id",
    "title",
    "url",
    "source_label",
    "school_level",
    "topic",
    "competency_area",
    "expiry_date",
];

/// Identifier of a course as exposed by its source portal.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CourseId {
    Resolved(String),
    Unresolved,
}

impl CourseId {
    /// Parse a persisted `id` cell. Empty cells and the sentinel are unresolved.
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        if raw.is_empty() || raw == UNRESOLVED_ID {
            Self::Unresolved
        } else {
            Self::Resolved(raw.to_string())
        }
    }

    pub fn is_resolved(&self) -> bool {
        matches!(self, Self::Resolved(_))
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Resolved(id) => id,
            Self::Unresolved => UNRESOLVED_ID,
        }
    }
}

impl fmt::Display for CourseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Implements `label()`, `Display`, `FromStr` and label-based serde for a
/// categorical enum. `FromStr` accepts the label or any alias, ignoring case.
macro_rules! categorical {
    ($ty:ident { $($variant:ident => $label:literal $(| $alias:literal)*),+ $(,)? }) => {
        impl $ty {
            pub const ALL: &'static [$ty] = &[$($ty::$variant),+];

            pub fn label(self) -> &'static str {
                match self {
                    $($ty::$variant => $label),+
                }
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.label())
            }
        }

        impl FromStr for $ty {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let needle = s.trim();
                $(
                    if needle.eq_ignore_ascii_case($label)
                        $(|| needle.eq_ignore_ascii_case($alias))*
                    {
                        return Ok($ty::$variant);
                    }
                )+
                Err(format!("unknown {}: {needle:?}", stringify!($ty)))
            }
        }

        impl Serialize for $ty {
            fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(self.label())
            }
        }

        impl<'de> Deserialize<'de> for $ty {
            fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let raw = String::deserialize(deserializer)?;
                raw.parse().map_err(serde::de::Error::custom)
            }
        }
    };
}

/// School level a course is aimed at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SchoolLevel {
    Infanzia,
    Primaria,
    SecondariaPrimoGrado,
    SecondariaSecondoGrado,
    #[default]
    Tutti,
}

categorical!(SchoolLevel {
    Infanzia => "Infanzia",
    Primaria => "Primaria",
    SecondariaPrimoGrado => "Secondaria I grado" | "secondaria-1" | "media",
    SecondariaSecondoGrado => "Secondaria II grado" | "secondaria-2" | "superiore",
    Tutti => "Misto/Tutti" | "tutti" | "misto",
});

/// Thematic area of a course.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Topic {
    IntelligenzaArtificiale,
    StemRobotica,
    Inclusione,
    CittadinanzaDigitale,
    Lingue,
    Metodologie,
    #[default]
    Misto,
}

categorical!(Topic {
    IntelligenzaArtificiale => "Intelligenza Artificiale" | "ia" | "ai",
    StemRobotica => "STEM e Robotica" | "stem" | "robotica",
    Inclusione => "Inclusione",
    CittadinanzaDigitale => "Cittadinanza Digitale",
    Lingue => "Lingue Straniere" | "lingue",
    Metodologie => "Metodologie",
    Misto => "Misto" | "tutti",
});

/// DigCompEdu competency area, used only as a tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CompetencyArea {
    CoinvolgimentoProfessionale,
    RisorseDigitali,
    InsegnamentoApprendimento,
    Valutazione,
    ValorizzazioneStudenti,
    CompetenzeDigitaliStudenti,
    #[default]
    DaDefinire,
}

categorical!(CompetencyArea {
    CoinvolgimentoProfessionale => "1. Coinvolgimento e valorizzazione professionale" | "area 1",
    RisorseDigitali => "2. Risorse digitali" | "area 2",
    InsegnamentoApprendimento => "3. Pratiche di insegnamento e apprendimento" | "area 3",
    Valutazione => "4. Valutazione dell'apprendimento" | "area 4",
    ValorizzazioneStudenti => "5. Valorizzazione delle potenzialità degli studenti" | "area 5",
    CompetenzeDigitaliStudenti => "6. Competenze digitali degli studenti" | "area 6",
    DaDefinire => "Da definire",
});

/// A raw course reference pulled from a listing page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    /// Visible anchor text, whitespace-collapsed.
    pub title: String,
    /// The `href` exactly as found in the markup.
    pub href: String,
    /// Text of the nearest enclosing block, used for inference and dates.
    pub context: String,
    /// Identifier carried by a `data-*` attribute on the anchor, if any.
    pub explicit_id: Option<String>,
}

/// A candidate with every field filled in, possibly with sentinels.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedCandidate {
    pub id: CourseId,
    pub title: String,
    pub url: Option<Url>,
    pub source_label: String,
    pub school_level: SchoolLevel,
    pub topic: Topic,
    pub competency_area: String,
    pub expiry_date: Option<NaiveDate>,
}

/// A validated course, ready to be published.
#[derive(Debug, Clone, PartialEq)]
pub struct CourseRecord {
    pub id: CourseId,
    pub title: String,
    pub url: Url,
    pub source_label: String,
    pub school_level: SchoolLevel,
    pub topic: Topic,
    pub competency_area: String,
    pub expiry_date: Option<NaiveDate>,
}
