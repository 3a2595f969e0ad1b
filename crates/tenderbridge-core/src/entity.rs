use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::config::GovernmentBank;
use crate::{Error, Result};

/// Decides whether an organization name denotes a public body.
///
/// Anchored patterns are tried first; the keyword list is a looser
/// substring fallback.
#[derive(Debug, Clone)]
pub struct GovernmentClassifier {
    patterns: Vec<Regex>,
    keywords: Vec<String>,
}

impl GovernmentClassifier {
    pub fn from_bank(bank: &GovernmentBank) -> Result<Self> {
        let patterns = bank
            .patterns
            .iter()
            .map(|p| Regex::new(p).map_err(|e| Error::pattern(p, e)))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            patterns,
            keywords: bank.keywords.iter().map(|k| k.to_lowercase()).collect(),
        })
    }

    #[must_use]
    pub fn is_government(&self, name: &str) -> bool {
        let normalized = normalize_name(name);
        if normalized.is_empty() {
            return false;
        }

        if self.patterns.iter().any(|p| p.is_match(&normalized)) {
            return true;
        }

        self.keywords
            .iter()
            .any(|k| !k.is_empty() && normalized.contains(k.as_str()))
    }

    #[must_use]
    pub fn classify(&self, name: &str) -> OrganizationKind {
        if self.is_government(name) {
            OrganizationKind::Government
        } else {
            OrganizationKind::Private
        }
    }
}

impl Default for GovernmentClassifier {
    fn default() -> Self {
        let bank = GovernmentBank::default();
        let mut classifier = Self {
            patterns: Vec::new(),
            keywords: bank.keywords.iter().map(|k| k.to_lowercase()).collect(),
        };

        for pattern in &bank.patterns {
            if let Ok(p) = Regex::new(pattern) {
                classifier.patterns.push(p);
            }
        }

        classifier
    }
}

fn normalize_name(name: &str) -> String {
    name.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrganizationKind {
    Government,
    Private,
}

impl OrganizationKind {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Government => "government",
            Self::Private => "private",
        }
    }
}

impl std::fmt::Display for OrganizationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A raw organization name as found in a notice.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrganizationName(String);

impl OrganizationName {
    /// Blank names are not names.
    #[must_use]
    pub fn parse(raw: Option<&str>) -> Option<Self> {
        let trimmed = raw?.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Self(trimmed.to_string()))
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }

    #[must_use]
    pub fn is_government(&self, classifier: &GovernmentClassifier) -> bool {
        classifier.is_government(&self.0)
    }
}

impl std::fmt::Display for OrganizationName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
