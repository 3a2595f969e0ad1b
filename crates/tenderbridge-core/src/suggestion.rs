//! Optional field suggestions from an external model.
//!
//! Providers are never authoritative: every suggestion is merged under the
//! deterministic result and re-validated. A provider that fails, times out
//! or answers garbage degrades the record to deterministic-only.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::ingest::normalizer::parse_amount;

#[derive(Debug, Error)]
pub enum SuggestionError {
    #[error("Suggestion provider unavailable: {0}")]
    Unavailable(String),
    #[error("Suggestion provider timed out")]
    Timeout,
    #[error("Malformed suggestion: {0}")]
    Malformed(String),
}

pub type SuggestionResult<T> = Result<T, SuggestionError>;

/// Partial field map; every field may be absent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AiSuggestion {
    pub buyer_name: Option<String>,
    pub buyer_address: Option<String>,
    pub buyer_city: Option<String>,
    pub winner_name: Option<String>,
    pub winner_address: Option<String>,
    pub winner_city: Option<String>,
    pub award_value: Option<f64>,
    pub cpv_codes: Vec<String>,
    pub title: Option<String>,
    pub short_description: Option<String>,
}

impl AiSuggestion {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

/// What a provider gets to look at.
#[derive(Debug, Clone)]
pub struct SuggestionRequest {
    pub notice_id: String,
    pub source_url: String,
    /// Visible page text, already truncated.
    pub text: String,
}

#[async_trait::async_trait]
pub trait SuggestionProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn suggest(&self, request: &SuggestionRequest)
        -> SuggestionResult<Option<AiSuggestion>>;
}

/// Deterministic-only extraction.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoSuggestions;

#[async_trait::async_trait]
impl SuggestionProvider for NoSuggestions {
    fn name(&self) -> &str {
        "none"
    }

    async fn suggest(&self, _request: &SuggestionRequest) -> SuggestionResult<Option<AiSuggestion>> {
        Ok(None)
    }
}

/// Canned suggestions keyed by notice id, e.g. replayed from an earlier run.
#[derive(Debug, Clone, Default)]
pub struct StaticSuggestions {
    by_notice: HashMap<String, AiSuggestion>,
}

impl StaticSuggestions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_suggestion(mut self, notice_id: impl Into<String>, suggestion: AiSuggestion) -> Self {
        self.by_notice.insert(notice_id.into(), suggestion);
        self
    }

    /// Load a JSON object of `notice_id -> suggestion`.
    pub fn from_json(json: &str) -> crate::Result<Self> {
        let by_notice: HashMap<String, AiSuggestion> = serde_json::from_str(json)?;
        Ok(Self { by_notice })
    }

    pub fn from_file(path: &Path) -> crate::Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.by_notice.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_notice.is_empty()
    }
}

#[async_trait::async_trait]
impl SuggestionProvider for StaticSuggestions {
    fn name(&self) -> &str {
        "static"
    }

    async fn suggest(&self, request: &SuggestionRequest) -> SuggestionResult<Option<AiSuggestion>> {
        Ok(self.by_notice.get(&request.notice_id).cloned())
    }
}

/// Parse a free-text model reply.
///
/// The first `{` to the last `}` is read as JSON. Amounts may be numbers or
/// French-formatted strings; codes may be numbers or strings.
pub fn parse_suggestion_response(reply: &str) -> SuggestionResult<AiSuggestion> {
    let start = reply
        .find('{')
        .ok_or_else(|| SuggestionError::Malformed("no JSON object in reply".into()))?;
    let end = reply
        .rfind('}')
        .filter(|&end| end > start)
        .ok_or_else(|| SuggestionError::Malformed("unterminated JSON object".into()))?;

    let value: Value = serde_json::from_str(&reply[start..=end])
        .map_err(|e| SuggestionError::Malformed(e.to_string()))?;
    let Value::Object(map) = value else {
        return Err(SuggestionError::Malformed("reply is not an object".into()));
    };

    let text = |key: &str| -> Option<String> {
        match map.get(key)? {
            Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
            _ => None,
        }
    };

    let award_value = match map.get("award_value") {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => parse_amount(s),
        _ => None,
    };

    let cpv_codes = match map.get("cpv_codes") {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|item| match item {
                Value::String(s) => Some(s.trim().to_string()),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            })
            .collect(),
        Some(Value::String(s)) => s
            .split([',', ';'])
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(ToString::to_string)
            .collect(),
        _ => Vec::new(),
    };

    Ok(AiSuggestion {
        buyer_name: text("buyer_name"),
        buyer_address: text("buyer_address"),
        buyer_city: text("buyer_city"),
        winner_name: text("winner_name"),
        winner_address: text("winner_address"),
        winner_city: text("winner_city"),
        award_value,
        cpv_codes,
        title: text("title"),
        short_description: text("short_description"),
    })
}
