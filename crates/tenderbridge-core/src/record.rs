use std::collections::BTreeMap;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Logical fields of an award notice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    Title,
    NoticeType,
    ProcedureType,
    Department,
    BuyerName,
    BuyerAddress,
    BuyerCity,
    WinnerName,
    WinnerAddress,
    WinnerCity,
    AwardValue,
    EstimatedValue,
    CpvCodes,
    PublishedAt,
    ShortDescription,
}

impl Field {
    pub const ALL: [Self; 15] = [
        Self::Title,
        Self::NoticeType,
        Self::ProcedureType,
        Self::Department,
        Self::BuyerName,
        Self::BuyerAddress,
        Self::BuyerCity,
        Self::WinnerName,
        Self::WinnerAddress,
        Self::WinnerCity,
        Self::AwardValue,
        Self::EstimatedValue,
        Self::CpvCodes,
        Self::PublishedAt,
        Self::ShortDescription,
    ];

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Title => "title",
            Self::NoticeType => "notice_type",
            Self::ProcedureType => "procedure_type",
            Self::Department => "department",
            Self::BuyerName => "buyer_name",
            Self::BuyerAddress => "buyer_address",
            Self::BuyerCity => "buyer_city",
            Self::WinnerName => "winner_name",
            Self::WinnerAddress => "winner_address",
            Self::WinnerCity => "winner_city",
            Self::AwardValue => "award_value",
            Self::EstimatedValue => "estimated_value",
            Self::CpvCodes => "cpv_codes",
            Self::PublishedAt => "published_at",
            Self::ShortDescription => "short_description",
        }
    }
}

impl std::fmt::Display for Field {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a field value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldSource {
    AdjacentSibling,
    ParentSibling,
    ContainerScan,
    SplitByLabel,
    /// Regex over the flattened text of a section.
    SectionPattern,
    TitleElement,
    ElementId,
    LabelAdjacent,
    RawPattern,
    SectionDigits,
    Suggestion,
}

impl FieldSource {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AdjacentSibling => "adjacent_sibling",
            Self::ParentSibling => "parent_sibling",
            Self::ContainerScan => "container_scan",
            Self::SplitByLabel => "split_by_label",
            Self::SectionPattern => "section_pattern",
            Self::TitleElement => "title_element",
            Self::ElementId => "element_id",
            Self::LabelAdjacent => "label_adjacent",
            Self::RawPattern => "raw_pattern",
            Self::SectionDigits => "section_digits",
            Self::Suggestion => "suggestion",
        }
    }
}

impl std::fmt::Display for FieldSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A value paired with the strategy that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sourced<T> {
    pub value: T,
    pub source: FieldSource,
}

impl<T> Sourced<T> {
    pub fn new(value: T, source: FieldSource) -> Self {
        Self { value, source }
    }
}

/// Degraded states met while extracting one document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExtractionIssue {
    SectionNotFound { section: String },
    MalformedValue { field: Field, raw: String },
}

/// Output of the deterministic pass, before any suggestion is merged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CandidateRecord {
    pub notice_id: Option<String>,
    pub source_url: String,
    pub title: Option<Sourced<String>>,
    pub notice_type: Option<Sourced<String>>,
    pub procedure_type: Option<Sourced<String>>,
    pub department: Option<Sourced<String>>,
    pub buyer_name: Option<Sourced<String>>,
    pub buyer_address: Option<Sourced<String>>,
    pub buyer_city: Option<Sourced<String>>,
    pub winner_name: Option<Sourced<String>>,
    pub winner_address: Option<Sourced<String>>,
    pub winner_city: Option<Sourced<String>>,
    pub award_value: Option<Sourced<f64>>,
    pub estimated_value: Option<Sourced<f64>>,
    pub cpv_codes: Option<Sourced<Vec<String>>>,
    pub published_at: Option<Sourced<NaiveDateTime>>,
    pub short_description: Option<Sourced<String>>,
    pub issues: Vec<ExtractionIssue>,
}

impl CandidateRecord {
    #[must_use]
    pub fn new(source_url: impl Into<String>, notice_id: Option<String>) -> Self {
        Self {
            notice_id,
            source_url: source_url.into(),
            ..Self::default()
        }
    }
}

/// Natural key plus content fingerprint handed to the store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DedupKey {
    pub notice_id: String,
    pub content_hash: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedRecord {
    pub notice_id: String,
    pub source_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notice_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub procedure_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub department: Option<String>,
    pub buyer_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub buyer_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub buyer_city: Option<String>,
    pub winner_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub winner_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub winner_city: Option<String>,
    pub award_value: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimated_value: Option<f64>,
    pub currency: String,
    /// ISO country of the winner; notices carry French companies unless stated.
    pub winner_country: String,
    /// Feed the notice came from.
    pub source: String,
    #[serde(default)]
    pub cpv_codes: Vec<String>,
    pub cpv_primary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub published_at: Option<NaiveDateTime>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub short_description: Option<String>,
    pub roles_swapped: bool,
    pub content_hash: String,
    #[serde(default)]
    pub provenance: BTreeMap<Field, FieldSource>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub issues: Vec<ExtractionIssue>,
}

impl NormalizedRecord {
    #[must_use]
    pub fn dedup_key(&self) -> DedupKey {
        DedupKey {
            notice_id: self.notice_id.clone(),
            content_hash: self.content_hash.clone(),
        }
    }

    /// A record naming neither party is not worth storing.
    #[must_use]
    pub fn has_parties(&self) -> bool {
        self.buyer_name.is_some() || self.winner_name.is_some()
    }

    #[must_use]
    pub fn source_of(&self, field: Field) -> Option<FieldSource> {
        self.provenance.get(&field).copied()
    }
}

/// SHA-256 of the raw document, hex encoded.
#[must_use]
pub fn content_hash(raw: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(raw);
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_hash() {
        let hash1 = content_hash(b"<html>a</html>");
        let hash2 = content_hash(b"<html>a</html>");
        let hash3 = content_hash(b"<html>b</html>");

        assert_eq!(hash1, hash2);
        assert_ne!(hash1, hash3);
        assert_eq!(hash1.len(), 64);
    }

    #[test]
    fn test_field_names_are_unique() {
        let mut names: Vec<_> = Field::ALL.iter().map(Field::as_str).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), Field::ALL.len());
    }

    #[test]
    fn test_field_serializes_as_snake_case() {
        let json = serde_json::to_string(&Field::BuyerName).unwrap();
        assert_eq!(json, "\"buyer_name\"");
    }
}
