//! Ordered keyword rule tables for categorical inference.
//!
//! Each table is a list of `(category, keywords)` rules tested in order; the
//! first rule with a keyword present in the text wins. Tables are plain data
//! and can be replaced wholesale from the config file.

use serde::Deserialize;
use unicode_normalization::UnicodeNormalization;
use unicode_normalization::char::is_combining_mark;

use crate::model::{CompetencyArea, SchoolLevel, Topic};

/// Lowercase `text`, strip diacritics and collapse whitespace.
///
/// `"  Attività  STEM "` -> `"attivita stem"`
pub fn fold(text: &str) -> String {
    let stripped: String = text
        .nfd()
        .filter(|c| !is_combining_mark(*c))
        .collect::<String>()
        .to_lowercase();
    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Whether `needle` occurs in `haystack` on word boundaries.
///
/// Both arguments must already be folded. Short keywords like `"ia"` would
/// otherwise match inside unrelated words ("d*ia*logo").
fn contains_word(haystack: &str, needle: &str) -> bool {
    if needle.is_empty() {
        return false;
    }
    haystack.match_indices(needle).any(|(start, _)| {
        let end = start + needle.len();
        let before_ok = haystack[..start]
            .chars()
            .next_back()
            .is_none_or(|c| !c.is_alphanumeric());
        let after_ok = haystack[end..]
            .chars()
            .next()
            .is_none_or(|c| !c.is_alphanumeric());
        before_ok && after_ok
    })
}

/// One rule: any of `keywords` maps the text to `category`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Rule<C> {
    pub category: C,
    pub keywords: Vec<String>,
}

impl<C> Rule<C> {
    fn new(category: C, keywords: &[&str]) -> Self {
        Self {
            category,
            keywords: keywords.iter().map(|k| k.to_string()).collect(),
        }
    }

    /// Test the rule against already-folded text.
    pub fn matches(&self, folded: &str) -> bool {
        self.keywords
            .iter()
            .any(|keyword| contains_word(folded, &fold(keyword)))
    }
}

/// An ordered list of rules for one category.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(transparent)]
pub struct RuleTable<C> {
    rules: Vec<Rule<C>>,
}

impl<C: Copy + Default> RuleTable<C> {
    pub fn new(rules: Vec<Rule<C>>) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &[Rule<C>] {
        &self.rules
    }

    /// The category of the first matching rule, if any.
    pub fn classify(&self, text: &str) -> Option<C> {
        let folded = fold(text);
        self.rules
            .iter()
            .find(|rule| rule.matches(&folded))
            .map(|rule| rule.category)
    }

    /// Like [`classify`](Self::classify) but falls back to the category's default.
    pub fn infer(&self, text: &str) -> C {
        self.classify(text).unwrap_or_default()
    }
}

/// All inference tables used by the normalizer.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Rules {
    pub school_level: RuleTable<SchoolLevel>,
    pub topic: RuleTable<Topic>,
    pub competency: RuleTable<CompetencyArea>,
}

impl Default for Rules {
    fn default() -> Self {
        Self {
            school_level: default_school_level_rules(),
            topic: default_topic_rules(),
            competency: default_competency_rules(),
        }
    }
}

impl Default for RuleTable<SchoolLevel> {
    fn default() -> Self {
        default_school_level_rules()
    }
}

impl Default for RuleTable<Topic> {
    fn default() -> Self {
        default_topic_rules()
    }
}

impl Default for RuleTable<CompetencyArea> {
    fn default() -> Self {
        default_competency_rules()
    }
}

// Upper secondary goes first: its keywords are more specific than "secondaria".
fn default_school_level_rules() -> RuleTable<SchoolLevel> {
    RuleTable::new(vec![
        Rule::new(
            SchoolLevel::SecondariaSecondoGrado,
            &[
                "secondaria di secondo grado",
                "secondaria di ii grado",
                "secondaria ii grado",
                "scuola superiore",
                "licei",
                "liceo",
                "istituti tecnici",
                "istituto tecnico",
                "istituti professionali",
                "istituto professionale",
            ],
        ),
        Rule::new(
            SchoolLevel::SecondariaPrimoGrado,
            &[
                "secondaria di primo grado",
                "secondaria di i grado",
                "secondaria i grado",
                "scuola media",
                "scuole medie",
            ],
        ),
        Rule::new(
            SchoolLevel::Primaria,
            &["scuola primaria", "primaria", "elementare", "elementari"],
        ),
        Rule::new(
            SchoolLevel::Infanzia,
            &["infanzia", "scuola materna", "zerosei", "0-6"],
        ),
    ])
}

// Metodologie is last: "didattica" shows up in almost every title.
fn default_topic_rules() -> RuleTable<Topic> {
    RuleTable::new(vec![
        Rule::new(
            Topic::IntelligenzaArtificiale,
            &[
                "intelligenza artificiale",
                "ia generativa",
                "ia",
                "chatgpt",
                "machine learning",
                "prompt",
            ],
        ),
        Rule::new(
            Topic::StemRobotica,
            &[
                "stem",
                "steam",
                "robotica",
                "coding",
                "tinkering",
                "making",
                "stampa 3d",
                "pensiero computazionale",
                "matematica",
                "scienze",
            ],
        ),
        Rule::new(
            Topic::Inclusione,
            &[
                "inclusione",
                "inclusiva",
                "inclusivo",
                "bes",
                "dsa",
                "disabilita",
                "sostegno",
                "dispersione",
            ],
        ),
        Rule::new(
            Topic::CittadinanzaDigitale,
            &[
                "cittadinanza digitale",
                "cyberbullismo",
                "media education",
                "sicurezza online",
                "educazione civica digitale",
            ],
        ),
        Rule::new(
            Topic::Lingue,
            &["clil", "lingua inglese", "lingue straniere", "english"],
        ),
        Rule::new(
            Topic::Metodologie,
            &[
                "metodologie",
                "metodologia",
                "didattica",
                "flipped",
                "debate",
                "cooperative",
                "gamification",
                "laboratoriale",
            ],
        ),
    ])
}

fn default_competency_rules() -> RuleTable<CompetencyArea> {
    RuleTable::new(vec![
        Rule::new(
            CompetencyArea::Valutazione,
            &["valutazione", "feedback", "learning analytics", "e-portfolio"],
        ),
        Rule::new(
            CompetencyArea::ValorizzazioneStudenti,
            &[
                "inclusione",
                "accessibilita",
                "personalizzazione",
                "apprendimento attivo",
                "bes",
                "dsa",
            ],
        ),
        Rule::new(
            CompetencyArea::CompetenzeDigitaliStudenti,
            &[
                "competenze digitali degli studenti",
                "cittadinanza digitale",
                "alfabetizzazione mediatica",
                "pensiero computazionale",
                "coding",
                "intelligenza artificiale",
                "problem solving",
            ],
        ),
        Rule::new(
            CompetencyArea::RisorseDigitali,
            &[
                "risorse digitali",
                "contenuti digitali",
                "oer",
                "creazione di contenuti",
                "licenze",
            ],
        ),
        Rule::new(
            CompetencyArea::CoinvolgimentoProfessionale,
            &[
                "comunicazione",
                "collaborazione professionale",
                "pratica riflessiva",
                "sviluppo professionale",
                "comunita di pratica",
            ],
        ),
        Rule::new(
            CompetencyArea::InsegnamentoApprendimento,
            &[
                "didattica",
                "insegnamento",
                "apprendimento collaborativo",
                "metodologie",
                "laboratorio",
            ],
        ),
    ])
}
