//! Extraction configuration
//!
//! Label alternatives, section scopes, the government pattern bank and the
//! CPV whitelist live here as data. Defaults target BOAMP award notices; any
//! table can be overridden from a TOML file.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use crate::record::Field;
use crate::{Error, Result};

/// Extraction configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    /// Regex with one capture group, matched against the source URL path
    pub notice_id_pattern: String,
    /// Element id holding the notice type banner
    pub notice_type_element_id: String,
    /// Named document sections
    pub sections: BTreeMap<String, SectionScope>,
    /// Field name -> label alternatives
    pub fields: BTreeMap<String, LabelSpec>,
    /// Government naming conventions
    pub government: GovernmentBank,
    /// Classification code discovery
    pub cpv: CpvConfig,
    /// CSS selectors tried in order when no title label is found
    pub title_selectors: Vec<String>,
    /// Suggestion provider limits
    pub suggestion: SuggestionConfig,
}

/// How to find a section sub-tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionScope {
    /// Fragment of the container element's `id` attribute
    #[serde(default)]
    pub id: Option<String>,
    /// Heading texts; the nearest enclosing `div`/`section` is the scope
    #[serde(default)]
    pub headings: Vec<String>,
}

impl SectionScope {
    pub fn new(id: &str, headings: &[&str]) -> Self {
        Self {
            id: Some(id.to_string()),
            headings: headings.iter().map(ToString::to_string).collect(),
        }
    }
}

/// Ordered caption synonyms for one field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelSpec {
    pub labels: Vec<String>,
    #[serde(default)]
    pub section: Option<String>,
}

impl LabelSpec {
    pub fn new(labels: &[&str], section: Option<&str>) -> Self {
        Self {
            labels: labels.iter().map(ToString::to_string).collect(),
            section: section.map(ToString::to_string),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GovernmentBank {
    /// Anchored patterns, matched against the lowercased name
    pub patterns: Vec<String>,
    /// Substring fallback
    pub keywords: Vec<String>,
}

impl Default for GovernmentBank {
    fn default() -> Self {
        let patterns = [
            // municipal and intercommunal
            r"^mairie\b",
            r"^commune\b",
            r"^ville\b",
            r"^communaut[ée]\b",
            r"^m[ée]tropole\b",
            r"^agglom[ée]ration\b",
            r"^syndicat\b",
            r"^sivom\b",
            r"^sivu\b",
            r"^siaep\b",
            // regional and state
            r"^r[ée]gion\b",
            r"^d[ée]partement\b",
            r"^conseil\s+(?:r[ée]gional|d[ée]partemental|g[ée]n[ée]ral|municipal)",
            r"^minist[èe]re\b",
            r"^pr[ée]fecture\b",
            r"^sous-pr[ée]fecture\b",
            r"^direction\s+(?:r[ée]gionale|d[ée]partementale|g[ée]n[ée]rale)",
            r"^service\s+(?:d[ée]partemental|r[ée]gional)",
            // judicial
            r"^tribunal\b",
            r"^cour\s+(?:d['’]appel|administrative|des\s+comptes)",
            // health and social
            r"^centre\s+hospitalier",
            r"^h[ôo]pital\b",
            r"^chu\b",
            r"^chru\b",
            r"^centre\s+communal",
            r"^ccas\b",
            r"^cias\b",
            r"^caisse\b",
            // education
            r"^universit[ée]\b",
            r"^lyc[ée]e\b",
            r"^coll[èe]ge\b",
            r"^[ée]cole\b",
            r"^acad[ée]mie\b",
            r"^rectorat\b",
            // public establishments and housing
            r"^[ée]tablissement\s+public",
            r"^office\s+(?:public|hlm)",
            r"^opac\b",
            r"^oph\b",
            r"^chambre\s+(?:de\s+commerce|des\s+m[ée]tiers|d['’]agriculture)",
            // emergency services
            r"^sdis\b",
            r"^service\s+d[ée]partemental\s+d['’]incendie",
            // public enterprises
            r"^port\s+(?:autonome|de)\b",
            r"^a[ée]roport\b",
            r"^r[ée]gie\b",
            r"^sem\b",
            r"^epl\b",
        ];
        let keywords = [
            "mairie",
            "commune",
            "ville",
            "région",
            "region",
            "département",
            "departement",
            "préfecture",
            "prefecture",
            "ministère",
            "ministere",
            "conseil",
            "tribunal",
            "hôpital",
            "hopital",
            "centre hospitalier",
            "université",
            "universite",
            "lycée",
            "lycee",
            "collège",
            "college",
            "école",
            "ecole",
            "syndicat",
            "office public",
            "établissement public",
            "etablissement public",
            "service public",
            "incendie et de secours",
        ];

        Self {
            patterns: patterns.iter().map(ToString::to_string).collect(),
            keywords: keywords.iter().map(ToString::to_string).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CpvConfig {
    /// Lowercase texts that mark a classification label
    pub markers: Vec<String>,
    /// Two-digit leading divisions accepted as real codes
    pub valid_divisions: Vec<String>,
    /// Sections scanned for standalone codes
    pub sections: Vec<String>,
    /// Text nodes inspected after a label
    pub window: usize,
    pub max_codes: usize,
}

impl Default for CpvConfig {
    fn default() -> Self {
        let divisions = [
            "03", "09", "14", "15", "16", "18", "19", "22", "24", "30", "31", "32", "33", "34",
            "35", "37", "38", "39", "42", "43", "44", "45", "48", "50", "51", "55", "60", "63",
            "64", "65", "66", "70", "71", "72", "73", "75", "76", "77", "79", "80", "85", "90",
            "92", "98",
        ];

        Self {
            markers: vec!["cpv".to_string()],
            valid_divisions: divisions.iter().map(ToString::to_string).collect(),
            sections: vec!["procedure".to_string()],
            window: 4,
            max_codes: 10,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SuggestionConfig {
    /// Characters of visible text handed to the provider
    pub max_chars: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

impl Default for SuggestionConfig {
    fn default() -> Self {
        Self {
            max_chars: 15_000,
            timeout_secs: Some(30),
        }
    }
}

pub const BUYER_SECTION: &str = "buyer";
pub const PROCEDURE_SECTION: &str = "procedure";
pub const RESULT_SECTION: &str = "result";

impl Default for ExtractionConfig {
    fn default() -> Self {
        let mut sections = BTreeMap::new();
        sections.insert(
            BUYER_SECTION.to_string(),
            SectionScope::new("section_1", &["SECTION 1", "IDENTIFICATION", "ACHETEUR"]),
        );
        sections.insert(
            PROCEDURE_SECTION.to_string(),
            SectionScope::new("section_2", &["SECTION 2", "OBJET"]),
        );
        sections.insert(
            RESULT_SECTION.to_string(),
            SectionScope::new(
                "section_4",
                &["SECTION 4", "RÉSULTAT", "RESULTAT", "ATTRIBUTION"],
            ),
        );

        let buyer = Some(BUYER_SECTION);
        let procedure = Some(PROCEDURE_SECTION);
        let result = Some(RESULT_SECTION);

        let mut fields = BTreeMap::new();
        let mut add = |field: Field, labels: &[&str], section: Option<&str>| {
            fields.insert(field.as_str().to_string(), LabelSpec::new(labels, section));
        };

        add(
            Field::Title,
            &["Titre", "Intitulé du marché", "Objet du marché"],
            procedure,
        );
        add(Field::ShortDescription, &["Description"], procedure);
        add(Field::ProcedureType, &["Type de procédure"], None);
        add(Field::Department, &["Département de publication", "Département"], None);
        add(
            Field::BuyerName,
            &[
                "Nom officiel",
                "Nom de l'acheteur",
                "Pouvoir adjudicateur",
                "Acheteur",
            ],
            buyer,
        );
        add(Field::BuyerAddress, &["Adresse postale", "Adresse"], buyer);
        add(Field::BuyerCity, &["Ville"], buyer);
        add(
            Field::WinnerName,
            &["Titulaire", "Attributaire", "Nom du titulaire"],
            result,
        );
        add(Field::WinnerAddress, &["Adresse postale", "Adresse"], result);
        add(Field::WinnerCity, &["Ville"], result);
        add(
            Field::AwardValue,
            &[
                "Montant du marché",
                "Montant total",
                "Montant HT",
                "Montant",
                "Valeur totale",
            ],
            result,
        );
        add(Field::EstimatedValue, &["Valeur estimée hors TVA"], None);
        add(
            Field::PublishedAt,
            &["Date d'envoi de l'avis", "Date de publication"],
            None,
        );

        Self {
            notice_id_pattern: r"/avis/detail/([A-Za-z0-9]+(?:-[A-Za-z0-9]+)*)".to_string(),
            notice_type_element_id: "doc_titre".to_string(),
            sections,
            fields,
            government: GovernmentBank::default(),
            cpv: CpvConfig::default(),
            title_selectors: vec![
                "h1.notice-title".to_string(),
                "h1".to_string(),
                ".titre-avis".to_string(),
                "[class*=\"title\"]".to_string(),
            ],
            suggestion: SuggestionConfig::default(),
        }
    }
}

impl ExtractionConfig {
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    #[must_use]
    pub fn labels(&self, field: Field) -> Option<&LabelSpec> {
        self.fields.get(field.as_str())
    }

    /// Every label across all fields, deduplicated, in table order.
    pub fn known_labels(&self) -> Vec<&str> {
        let mut labels: Vec<&str> = Vec::new();
        for spec in self.fields.values() {
            for label in &spec.labels {
                if !labels.contains(&label.as_str()) {
                    labels.push(label);
                }
            }
        }
        labels
    }

    pub fn validate(&self) -> Result<()> {
        for (name, spec) in &self.fields {
            if spec.labels.iter().all(|l| l.trim().is_empty()) {
                return Err(Error::Config(format!("field `{name}` has no labels")));
            }
            if let Some(section) = &spec.section {
                if !self.sections.contains_key(section) {
                    return Err(Error::Config(format!(
                        "field `{name}` refers to unknown section `{section}`"
                    )));
                }
            }
        }

        for section in &self.cpv.sections {
            if !self.sections.contains_key(section) {
                return Err(Error::Config(format!(
                    "cpv scan refers to unknown section `{section}`"
                )));
            }
        }

        for (name, scope) in &self.sections {
            if scope.id.is_none() && scope.headings.is_empty() {
                return Err(Error::Config(format!(
                    "section `{name}` needs an id or at least one heading"
                )));
            }
        }

        if self.cpv.max_codes == 0 {
            return Err(Error::Config("cpv.max_codes must be positive".into()));
        }

        if self
            .cpv
            .valid_divisions
            .iter()
            .any(|d| d.len() != 2 || !d.bytes().all(|b| b.is_ascii_digit()))
        {
            return Err(Error::Config(
                "cpv.valid_divisions must be two-digit strings".into(),
            ));
        }

        Ok(())
    }
}
