use std::collections::BTreeSet;
use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::Selector;
use serde::Serialize;
use thiserror::Error;

use super::cpv::CpvCodeExtractor;
use super::document::Document;
use super::extractor::{FieldExtractor, LabelSet};
use super::identity::NoticeIdentity;
use super::merger::ExtractionMerger;
use super::normalizer::{clean_text, find_amount_in_text, find_postal_city, parse_amount, parse_date};
use super::section::SectionLocator;
use crate::config::{ExtractionConfig, SuggestionConfig, BUYER_SECTION, RESULT_SECTION};
use crate::entity::GovernmentClassifier;
use crate::record::{CandidateRecord, ExtractionIssue, Field, FieldSource, NormalizedRecord, Sourced};
use crate::roles::{RoleOutcome, RoleResolver};
use crate::suggestion::{
    AiSuggestion, NoSuggestions, SuggestionError, SuggestionProvider, SuggestionRequest,
};
use crate::{Error, Result};

const MIN_SELECTOR_TITLE_CHARS: usize = 10;
const MAX_TITLE_CHARS: usize = 500;

static CONTRACT_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?im)^[ \t]*march[ée]\s+n\s*[°o]?[^:\n]*:[ \t]*([^\n]*)").unwrap()
});

/// A bare contract number; the parties then sit on the next line.
static CONTRACT_NUMBER: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[\d./\- ]*$").unwrap());

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("No notice id in {0}")]
    IdentityMissing(String),
}

pub type IngestResult<T> = std::result::Result<T, IngestError>;

/// Counters for one run, folded across documents by the caller.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExtractionStats {
    pub parsed: usize,
    pub identity_missing: usize,
    pub promoted: usize,
    pub swapped: usize,
    pub winner_discarded: usize,
    pub suggestion_unavailable: usize,
    pub suggestion_rejected: usize,
    pub sections_widened: usize,
    pub malformed_values: usize,
    pub skipped: usize,
    pub saved: usize,
    pub unchanged: usize,
}

impl ExtractionStats {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_outcome(&mut self, outcome: RoleOutcome) {
        match outcome {
            RoleOutcome::Unchanged => {}
            RoleOutcome::PromotedToBuyer => self.promoted += 1,
            RoleOutcome::Swapped => self.swapped += 1,
            RoleOutcome::WinnerDiscarded => self.winner_discarded += 1,
        }
    }

    pub fn record_issues(&mut self, issues: &[ExtractionIssue]) {
        for issue in issues {
            match issue {
                ExtractionIssue::SectionNotFound { .. } => self.sections_widened += 1,
                ExtractionIssue::MalformedValue { .. } => self.malformed_values += 1,
            }
        }
    }

    pub fn merge(&mut self, other: &Self) {
        self.parsed += other.parsed;
        self.identity_missing += other.identity_missing;
        self.promoted += other.promoted;
        self.swapped += other.swapped;
        self.winner_discarded += other.winner_discarded;
        self.suggestion_unavailable += other.suggestion_unavailable;
        self.suggestion_rejected += other.suggestion_rejected;
        self.sections_widened += other.sections_widened;
        self.malformed_values += other.malformed_values;
        self.skipped += other.skipped;
        self.saved += other.saved;
        self.unchanged += other.unchanged;
    }

    /// Documents that produced no record.
    #[must_use]
    pub fn errors(&self) -> usize {
        self.identity_missing
    }
}

pub struct BatchResult {
    pub records: Vec<NormalizedRecord>,
    pub failed: Vec<(String, IngestError)>,
    pub stats: ExtractionStats,
}

impl BatchResult {
    #[must_use]
    pub fn new() -> Self {
        Self {
            records: Vec::new(),
            failed: Vec::new(),
            stats: ExtractionStats::new(),
        }
    }

    pub fn success_count(&self) -> usize {
        self.records.len()
    }

    pub fn failure_count(&self) -> usize {
        self.failed.len()
    }
}

impl Default for BatchResult {
    fn default() -> Self {
        Self::new()
    }
}

struct FieldRule {
    field: Field,
    labels: LabelSet,
    section: Option<String>,
}

/// Document in, normalized record out.
///
/// Everything is compiled from an [`ExtractionConfig`] once; the pipeline
/// itself holds no per-document state.
pub struct NoticePipeline {
    identity: NoticeIdentity,
    locator: SectionLocator,
    extractor: FieldExtractor,
    rules: Vec<FieldRule>,
    cpv: CpvCodeExtractor,
    notice_type_id: String,
    title_selectors: Vec<Selector>,
    page_title: Selector,
    merger: ExtractionMerger,
    provider: Box<dyn SuggestionProvider>,
    suggestion: SuggestionConfig,
}

impl NoticePipeline {
    pub fn from_config(config: &ExtractionConfig) -> Result<Self> {
        config.validate()?;

        let classifier = GovernmentClassifier::from_bank(&config.government)?;

        let mut rules = Vec::new();
        for field in Field::ALL {
            if field == Field::CpvCodes {
                continue;
            }
            if let Some(spec) = config.labels(field) {
                rules.push(FieldRule {
                    field,
                    labels: LabelSet::compile(&spec.labels)?,
                    section: spec.section.clone(),
                });
            }
        }

        let title_selectors = config
            .title_selectors
            .iter()
            .map(|s| parse_selector(s))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            identity: NoticeIdentity::from_pattern(&config.notice_id_pattern)?,
            locator: SectionLocator::new(&config.sections),
            extractor: FieldExtractor::new(&config.known_labels())?,
            rules,
            cpv: CpvCodeExtractor::from_config(&config.cpv)?,
            notice_type_id: config.notice_type_element_id.clone(),
            title_selectors,
            page_title: parse_selector("title")?,
            merger: ExtractionMerger::new(RoleResolver::new(classifier), &config.cpv),
            provider: Box::new(NoSuggestions),
            suggestion: config.suggestion.clone(),
        })
    }

    #[must_use]
    pub fn with_provider(mut self, provider: Box<dyn SuggestionProvider>) -> Self {
        self.provider = provider;
        self
    }

    #[must_use]
    pub fn resolver(&self) -> &RoleResolver {
        self.merger.resolver()
    }

    #[must_use]
    pub fn notice_id(&self, source_url: &str) -> Option<String> {
        self.identity.derive(source_url)
    }

    /// Deterministic pass over one parsed document.
    #[must_use]
    pub fn extract_deterministic(&self, doc: &Document) -> CandidateRecord {
        let mut candidate =
            CandidateRecord::new(doc.source_url(), self.identity.derive(doc.source_url()));
        let mut widened = BTreeSet::new();
        let mut widened_fields = BTreeSet::new();

        for rule in &self.rules {
            let scope = self.locator.resolve(doc, rule.section.as_deref());
            if scope.widened {
                widened_fields.insert(rule.field);
                if let Some(section) = &rule.section {
                    widened.insert(section.clone());
                }
            }

            if let Some(found) = self.extractor.extract(doc, scope.root, &rule.labels) {
                tracing::debug!("{}: '{}' via {:?}", rule.field, found.value, found.strategy);
                assign(&mut candidate, rule.field, found.value, found.strategy.into());
            }
        }

        drop_buyer_echoes(&mut candidate, &widened_fields);

        candidate.issues.extend(
            widened
                .into_iter()
                .map(|section| ExtractionIssue::SectionNotFound { section }),
        );

        self.apply_fallbacks(doc, &mut candidate);
        candidate.cpv_codes = self.cpv.extract(doc, &self.locator);

        candidate
    }

    fn apply_fallbacks(&self, doc: &Document, candidate: &mut CandidateRecord) {
        if candidate.notice_type.is_none() && !self.notice_type_id.is_empty() {
            candidate.notice_type = doc
                .element_with_id_containing(&self.notice_type_id)
                .and_then(|el| clean_text(&doc.text_of(el)))
                .map(|t| Sourced::new(t, FieldSource::ElementId));
        }

        if candidate.title.is_none() {
            candidate.title = self.title_from_elements(doc);
        }

        let result = self.locator.find(doc, RESULT_SECTION).map(|root| doc.block_text(root));

        if let Some(text) = result.as_deref() {
            if candidate.winner_name.is_none() || candidate.winner_city.is_none() {
                self.contract_line(text, candidate);
            }
            if candidate.award_value.is_none() {
                candidate.award_value = find_amount_in_text(text)
                    .map(|v| Sourced::new(v, FieldSource::SectionPattern));
            }
        }

        if candidate.buyer_city.is_none() {
            candidate.buyer_city = self
                .locator
                .find(doc, BUYER_SECTION)
                .and_then(|root| find_postal_city(&doc.block_text(root)))
                .map(|c| Sourced::new(c, FieldSource::SectionPattern));
        }
    }

    fn title_from_elements(&self, doc: &Document) -> Option<Sourced<String>> {
        let from_selectors = self.title_selectors.iter().find_map(|selector| {
            doc.select_texts(selector)
                .into_iter()
                .find(|t| t.chars().count() > MIN_SELECTOR_TITLE_CHARS)
        });

        from_selectors
            .or_else(|| doc.select_text(&self.page_title))
            .map(|t| Sourced::new(t.chars().take(MAX_TITLE_CHARS).collect(), FieldSource::TitleElement))
    }

    /// `Marché n° 1 : ACME SAS, 1 rue X, 75001 Paris` style lines, or
    /// `Marche n : 2024.01` followed by the parties on the next line.
    fn contract_line(&self, text: &str, candidate: &mut CandidateRecord) {
        let classifier = self.resolver().classifier();

        for caps in CONTRACT_LINE.captures_iter(text) {
            let (Some(line), Some(tail)) = (caps.get(0), caps.get(1)) else {
                continue;
            };
            let body = if CONTRACT_NUMBER.is_match(tail.as_str().trim()) {
                text[line.end()..]
                    .lines()
                    .map(str::trim)
                    .find(|l| !l.is_empty())
                    .unwrap_or_default()
            } else {
                tail.as_str()
            };

            let parts: Vec<&str> = body
                .split(',')
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .collect();

            if candidate.winner_name.is_none() {
                candidate.winner_name = parts
                    .iter()
                    .find(|p| {
                        !classifier.is_government(p) && !p.starts_with(|c: char| c.is_ascii_digit())
                    })
                    .map(|p| Sourced::new((*p).to_string(), FieldSource::SectionPattern));
            }

            if candidate.winner_city.is_none() && parts.len() > 1 {
                candidate.winner_city = parts
                    .last()
                    .and_then(|p| find_postal_city(p))
                    .map(|c| Sourced::new(c, FieldSource::SectionPattern));
            }

            if candidate.winner_name.is_some() {
                break;
            }
        }
    }

    /// Full pass for one document: identity, deterministic extraction,
    /// optional suggestion, merge and role validation.
    pub async fn process(
        &self,
        source_url: &str,
        html: &str,
        stats: &mut ExtractionStats,
    ) -> IngestResult<NormalizedRecord> {
        let Some(notice_id) = self.identity.derive(source_url) else {
            tracing::warn!("No notice id in {}, skipping", source_url);
            stats.identity_missing += 1;
            return Err(IngestError::IdentityMissing(source_url.to_string()));
        };

        // The parsed tree must not live across the await below.
        let (candidate, text) = {
            let doc = Document::parse(source_url, html);
            let candidate = self.extract_deterministic(&doc);
            (candidate, doc.visible_text(self.suggestion.max_chars))
        };
        stats.parsed += 1;

        let request = SuggestionRequest {
            notice_id,
            source_url: source_url.to_string(),
            text,
        };
        let suggestion = self.suggest(&request, stats).await;

        let merged = self
            .merger
            .merge(&candidate, suggestion.as_ref(), html.as_bytes())?;

        stats.record_outcome(merged.outcome);
        stats.record_issues(&merged.record.issues);
        if merged.suggestion_rejected {
            stats.suggestion_rejected += 1;
        }

        Ok(merged.record)
    }

    async fn suggest(
        &self,
        request: &SuggestionRequest,
        stats: &mut ExtractionStats,
    ) -> Option<AiSuggestion> {
        let call = self.provider.suggest(request);
        let result = match self.suggestion.timeout_secs {
            Some(secs) => tokio::time::timeout(Duration::from_secs(secs), call)
                .await
                .unwrap_or(Err(SuggestionError::Timeout)),
            None => call.await,
        };

        match result {
            Ok(suggestion) => suggestion.filter(|s| !s.is_empty()),
            Err(e) => {
                tracing::warn!(
                    "Suggestions from '{}' unavailable for {}: {}",
                    self.provider.name(),
                    request.notice_id,
                    e
                );
                stats.suggestion_unavailable += 1;
                None
            }
        }
    }

    /// Processes documents one after another; failures are collected, not
    /// propagated.
    pub async fn process_batch<'a, I>(&self, inputs: I) -> BatchResult
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut result = BatchResult::new();

        for (source_url, html) in inputs {
            match self.process(source_url, html, &mut result.stats).await {
                Ok(record) => result.records.push(record),
                Err(e) => result.failed.push((source_url.to_string(), e)),
            }
        }

        result
    }
}

fn parse_selector(selector: &str) -> Result<Selector> {
    Selector::parse(selector).map_err(|e| Error::InvalidSelector {
        selector: selector.to_string(),
        reason: format!("{e:?}"),
    })
}

fn assign(candidate: &mut CandidateRecord, field: Field, value: String, source: FieldSource) {
    let text = || Some(Sourced::new(value.clone(), source));

    match field {
        Field::Title => candidate.title = text(),
        Field::NoticeType => candidate.notice_type = text(),
        Field::ProcedureType => candidate.procedure_type = text(),
        Field::Department => candidate.department = text(),
        Field::BuyerName => candidate.buyer_name = text(),
        Field::BuyerAddress => candidate.buyer_address = text(),
        Field::BuyerCity => candidate.buyer_city = text(),
        Field::WinnerName => candidate.winner_name = text(),
        Field::WinnerAddress => candidate.winner_address = text(),
        Field::WinnerCity => candidate.winner_city = text(),
        Field::ShortDescription => candidate.short_description = text(),
        Field::AwardValue | Field::EstimatedValue => match parse_amount(&value) {
            Some(amount) => {
                let amount = Some(Sourced::new(amount, source));
                if field == Field::AwardValue {
                    candidate.award_value = amount;
                } else {
                    candidate.estimated_value = amount;
                }
            }
            None => malformed(candidate, field, value),
        },
        Field::PublishedAt => match parse_date(&value) {
            Some(date) => candidate.published_at = Some(Sourced::new(date, source)),
            None => malformed(candidate, field, value),
        },
        Field::CpvCodes => {}
    }
}

/// A winner lookup that had to search the whole page can land on the
/// buyer's own captions. Such values are dropped.
fn drop_buyer_echoes(candidate: &mut CandidateRecord, widened: &BTreeSet<Field>) {
    let pairs = [
        (&candidate.buyer_name, &mut candidate.winner_name, Field::WinnerName),
        (&candidate.buyer_address, &mut candidate.winner_address, Field::WinnerAddress),
        (&candidate.buyer_city, &mut candidate.winner_city, Field::WinnerCity),
    ];

    for (buyer, winner, field) in pairs {
        if !widened.contains(&field) {
            continue;
        }
        let echoed = match (buyer, winner.as_ref()) {
            (Some(b), Some(w)) => b.value == w.value,
            _ => false,
        };
        if echoed {
            tracing::debug!("Dropping {} that repeats the buyer's value", field);
            *winner = None;
        }
    }
}

fn malformed(candidate: &mut CandidateRecord, field: Field, raw: String) {
    tracing::debug!("Unparsable {} value '{}'", field, raw);
    candidate
        .issues
        .push(ExtractionIssue::MalformedValue { field, raw });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::suggestion::{StaticSuggestions, SuggestionResult};

    const VERNON: &str = r#"<html><head><title>Avis d'attribution - BOAMP</title></head><body>
<div id="doc_titre">Avis d'attribution</div>
<div class="section" id="section_1">
  <h2>SECTION 1 : IDENTIFICATION DE L'ACHETEUR</h2>
  <p><span>Nom officiel</span> : <span>Commune de Vernon</span></p>
  <p><span>Adresse postale</span> : <span>Hôtel de ville, 27200 Vernon</span></p>
</div>
<div class="section" id="section_2">
  <h2>SECTION 2 : OBJET</h2>
  <p><strong>Titre :</strong> Refonte du site internet de la ville</p>
  <p>Code CPV principal : <span>72413000</span></p>
  <p>Date d'envoi de l'avis : 15/03/2024 à 10h30</p>
</div>
<div class="section" id="section_4">
  <h2>SECTION 4 : RÉSULTAT</h2>
  <p><span>Titulaire</span><span>:</span><span>Atelier Numérique SARL</span></p>
  <p>Montant HT : 48 500,00 EUR</p>
</div>
</body></html>"#;

    const SYNDICAT: &str = r#"<html><body>
<div id="section_4"><h2>SECTION 4 : RÉSULTAT</h2>
<p><span>Titulaire</span> : <span>Syndicat Intercommunal</span></p></div>
</body></html>"#;

    const GISORS: &str = r#"<html><body>
<div class="section" id="section_1">
  <h2>SECTION 1 : IDENTIFICATION DE L'ACHETEUR</h2>
  <p><span>Nom officiel</span> : <span>Commune de Gisors</span></p>
  <p><span>Adresse postale</span> : <span>1 place de la Mairie</span></p>
</div>
</body></html>"#;

    const URL: &str = "https://www.boamp.fr/avis/detail/24-123456";

    fn pipeline() -> NoticePipeline {
        NoticePipeline::from_config(&ExtractionConfig::default()).unwrap()
    }

    struct FailingProvider;

    #[async_trait::async_trait]
    impl SuggestionProvider for FailingProvider {
        fn name(&self) -> &str {
            "failing"
        }

        async fn suggest(&self, _request: &SuggestionRequest) -> SuggestionResult<Option<AiSuggestion>> {
            Err(SuggestionError::Unavailable("connection refused".into()))
        }
    }

    struct SlowProvider;

    #[async_trait::async_trait]
    impl SuggestionProvider for SlowProvider {
        fn name(&self) -> &str {
            "slow"
        }

        async fn suggest(&self, _request: &SuggestionRequest) -> SuggestionResult<Option<AiSuggestion>> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(Some(AiSuggestion {
                winner_name: Some("Too Late SAS".into()),
                ..Default::default()
            }))
        }
    }

    #[tokio::test]
    async fn test_buyer_and_winner_in_their_sections() {
        let mut stats = ExtractionStats::new();
        let record = pipeline().process(URL, VERNON, &mut stats).await.unwrap();

        assert_eq!(record.notice_id, "24-123456");
        assert_eq!(record.buyer_name.as_deref(), Some("Commune de Vernon"));
        assert_eq!(record.winner_name.as_deref(), Some("Atelier Numérique SARL"));
        assert!(!record.roles_swapped);

        assert_eq!(record.title.as_deref(), Some("Refonte du site internet de la ville"));
        assert_eq!(record.notice_type.as_deref(), Some("Avis d'attribution"));
        assert_eq!(record.buyer_address.as_deref(), Some("Hôtel de ville, 27200 Vernon"));
        assert_eq!(record.buyer_city.as_deref(), Some("Vernon"));
        assert_eq!(record.award_value, Some(48_500.0));
        assert_eq!(record.cpv_codes, vec!["72413000"]);
        assert_eq!(record.cpv_primary.as_deref(), Some("72413000"));
        assert_eq!(
            record.published_at.map(|d| d.to_string()).as_deref(),
            Some("2024-03-15 10:30:00")
        );

        assert_eq!(record.source_of(Field::BuyerName), Some(FieldSource::AdjacentSibling));
        assert_eq!(record.source_of(Field::AwardValue), Some(FieldSource::SplitByLabel));
        assert_eq!(record.source_of(Field::BuyerCity), Some(FieldSource::SectionPattern));
        assert_eq!(record.source_of(Field::CpvCodes), Some(FieldSource::LabelAdjacent));
        assert_eq!(record.source_of(Field::NoticeType), Some(FieldSource::ElementId));

        assert!(record.issues.is_empty());
        assert_eq!(stats.parsed, 1);
        assert_eq!(stats.swapped + stats.promoted + stats.winner_discarded, 0);
    }

    #[tokio::test]
    async fn test_lone_public_winner_is_promoted() {
        let mut stats = ExtractionStats::new();
        let record = pipeline().process(URL, SYNDICAT, &mut stats).await.unwrap();

        assert_eq!(record.buyer_name.as_deref(), Some("Syndicat Intercommunal"));
        assert_eq!(record.winner_name, None);
        assert!(record.roles_swapped);
        assert_eq!(stats.promoted, 1);

        assert!(record.issues.contains(&ExtractionIssue::SectionNotFound {
            section: BUYER_SECTION.into()
        }));
        assert_eq!(stats.sections_widened, record.issues.len());
    }

    #[tokio::test]
    async fn test_buyer_only_page_has_no_winner() {
        let mut stats = ExtractionStats::new();
        let record = pipeline().process(URL, GISORS, &mut stats).await.unwrap();

        assert_eq!(record.buyer_name.as_deref(), Some("Commune de Gisors"));
        assert_eq!(record.buyer_address.as_deref(), Some("1 place de la Mairie"));
        assert_eq!(record.winner_name, None);
        assert_eq!(record.winner_address, None);
        assert!(!record.roles_swapped);
        assert_eq!(stats.winner_discarded, 0);
        assert!(record.issues.contains(&ExtractionIssue::SectionNotFound {
            section: RESULT_SECTION.into()
        }));
    }

    #[tokio::test]
    async fn test_buyer_only_page_takes_suggested_winner() {
        let provider = StaticSuggestions::new().with_suggestion(
            "24-123456",
            AiSuggestion {
                winner_name: Some("SARL Dupont".into()),
                ..Default::default()
            },
        );
        let mut stats = ExtractionStats::new();
        let record = pipeline()
            .with_provider(Box::new(provider))
            .process(URL, GISORS, &mut stats)
            .await
            .unwrap();

        assert_eq!(record.buyer_name.as_deref(), Some("Commune de Gisors"));
        assert_eq!(record.winner_name.as_deref(), Some("SARL Dupont"));
        assert_eq!(record.source_of(Field::WinnerName), Some(FieldSource::Suggestion));
        assert_eq!(record.winner_address, None);
        assert_eq!(stats.winner_discarded, 0);
    }

    #[tokio::test]
    async fn test_private_buyer_is_not_its_own_winner() {
        let html = GISORS.replace("Commune de Gisors", "Grand Paris Aménagement");
        let mut stats = ExtractionStats::new();
        let record = pipeline().process(URL, &html, &mut stats).await.unwrap();

        assert_eq!(record.buyer_name.as_deref(), Some("Grand Paris Aménagement"));
        assert_eq!(record.winner_name, None);
    }

    #[test]
    fn test_widened_winner_address_skips_buyer_address() {
        let html = GISORS.replace(
            "</body>",
            "<p><span>Titulaire</span> : <span>ACME SAS</span></p></body>",
        );
        let doc = Document::parse(URL, &html);
        let candidate = pipeline().extract_deterministic(&doc);

        assert_eq!(candidate.winner_name.unwrap().value, "ACME SAS");
        assert_eq!(candidate.winner_address, None);
        assert_eq!(candidate.buyer_address.unwrap().value, "1 place de la Mairie");
    }

    #[tokio::test]
    async fn test_identity_missing_fails_fast() {
        let mut stats = ExtractionStats::new();
        let err = pipeline()
            .process("https://www.boamp.fr/recherche", VERNON, &mut stats)
            .await
            .unwrap_err();

        assert!(matches!(err, IngestError::IdentityMissing(_)));
        assert_eq!(stats.identity_missing, 1);
        assert_eq!(stats.parsed, 0);
    }

    #[tokio::test]
    async fn test_suggestion_fills_gaps_only() {
        let provider = StaticSuggestions::new().with_suggestion(
            "24-123456",
            AiSuggestion {
                buyer_name: Some("Mairie de Vernon".into()),
                short_description: Some("Refonte complète".into()),
                ..Default::default()
            },
        );
        let mut stats = ExtractionStats::new();
        let record = pipeline()
            .with_provider(Box::new(provider))
            .process(URL, VERNON, &mut stats)
            .await
            .unwrap();

        assert_eq!(record.buyer_name.as_deref(), Some("Commune de Vernon"));
        assert_eq!(record.short_description.as_deref(), Some("Refonte complète"));
        assert_eq!(record.source_of(Field::ShortDescription), Some(FieldSource::Suggestion));
    }

    #[tokio::test]
    async fn test_public_winner_suggestion_is_counted() {
        let provider = StaticSuggestions::new().with_suggestion(
            "24-123456",
            AiSuggestion {
                winner_name: Some("Syndicat Intercommunal".into()),
                ..Default::default()
            },
        );
        let html = r#"<html><body><div id="section_1"><p><span>Nom officiel</span><span>Mairie de X</span></p></div></body></html>"#;

        let mut stats = ExtractionStats::new();
        let record = pipeline()
            .with_provider(Box::new(provider))
            .process(URL, html, &mut stats)
            .await
            .unwrap();

        assert_eq!(record.buyer_name.as_deref(), Some("Mairie de X"));
        assert_eq!(record.winner_name, None);
        assert_eq!(stats.suggestion_rejected, 1);
    }

    #[tokio::test]
    async fn test_failing_provider_degrades() {
        let mut stats = ExtractionStats::new();
        let record = pipeline()
            .with_provider(Box::new(FailingProvider))
            .process(URL, VERNON, &mut stats)
            .await
            .unwrap();

        assert_eq!(record.winner_name.as_deref(), Some("Atelier Numérique SARL"));
        assert_eq!(stats.suggestion_unavailable, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_provider_times_out() {
        let mut stats = ExtractionStats::new();
        let record = pipeline()
            .with_provider(Box::new(SlowProvider))
            .process(URL, SYNDICAT, &mut stats)
            .await
            .unwrap();

        assert_eq!(record.buyer_name.as_deref(), Some("Syndicat Intercommunal"));
        assert_eq!(stats.suggestion_unavailable, 1);
    }

    #[tokio::test]
    async fn test_merge_idempotent_across_runs() {
        let p = pipeline();
        let mut stats = ExtractionStats::new();

        let first = p.process(URL, VERNON, &mut stats).await.unwrap();
        let second = p.process(URL, VERNON, &mut stats).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(first.dedup_key(), second.dedup_key());
    }

    #[test]
    fn test_malformed_amount_is_reported() {
        let html = r#"<html><body><div id="section_4">
            <p><span>Montant du marché</span><span>voir annexe</span></p>
        </div></body></html>"#;

        let doc = Document::parse(URL, html);
        let candidate = pipeline().extract_deterministic(&doc);

        assert_eq!(candidate.award_value, None);
        assert!(candidate.issues.contains(&ExtractionIssue::MalformedValue {
            field: Field::AwardValue,
            raw: "voir annexe".into(),
        }));
    }

    #[test]
    fn test_contract_line_fallback() {
        let html = r#"<html><body><div id="section_4">
            <p>Marché n° 2024-01 : Mairie de Gisors, BTP Normandie SAS, 12 rue du Port, 27140 Gisors</p>
        </div></body></html>"#;

        let doc = Document::parse(URL, html);
        let candidate = pipeline().extract_deterministic(&doc);

        let winner = candidate.winner_name.unwrap();
        assert_eq!(winner.value, "BTP Normandie SAS");
        assert_eq!(winner.source, FieldSource::SectionPattern);
        assert_eq!(candidate.winner_city.unwrap().value, "Gisors");
    }

    #[test]
    fn test_contract_number_then_parties_line() {
        let html = r#"<html><body><div id="section_4">
            <p>Marche n : 2024.01</p>
            <p>BTP Normandie SAS, 12 rue du Port, 27140 Gisors</p>
        </div></body></html>"#;

        let doc = Document::parse(URL, html);
        let candidate = pipeline().extract_deterministic(&doc);

        assert_eq!(candidate.winner_name.unwrap().value, "BTP Normandie SAS");
        assert_eq!(candidate.winner_city.unwrap().value, "Gisors");
    }

    #[test]
    fn test_title_selector_fallback() {
        let html = r#"<html><head><title>BOAMP</title></head><body>
            <h1>Court</h1>
            <div class="titre-avis">Travaux de voirie communale 2024</div>
        </body></html>"#;

        let doc = Document::parse(URL, html);
        let title = pipeline().extract_deterministic(&doc).title.unwrap();

        assert_eq!(title.value, "Travaux de voirie communale 2024");
        assert_eq!(title.source, FieldSource::TitleElement);
    }

    #[tokio::test]
    async fn test_batch_collects_failures() {
        let inputs = [
            (URL, VERNON),
            ("https://www.boamp.fr/recherche", VERNON),
            ("https://www.boamp.fr/avis/detail/24-2", SYNDICAT),
        ];

        let result = pipeline().process_batch(inputs).await;

        assert_eq!(result.success_count(), 2);
        assert_eq!(result.failure_count(), 1);
        assert_eq!(result.stats.parsed, 2);
        assert_eq!(result.stats.errors(), 1);
        assert_eq!(result.stats.promoted, 1);
    }

    #[test]
    fn test_stats_merge() {
        let mut total = ExtractionStats::new();
        let mut run = ExtractionStats::new();
        run.parsed = 3;
        run.swapped = 1;
        run.record_outcome(RoleOutcome::WinnerDiscarded);

        total.merge(&run);
        total.merge(&run);

        assert_eq!(total.parsed, 6);
        assert_eq!(total.swapped, 2);
        assert_eq!(total.winner_discarded, 2);
    }

    #[test]
    fn test_bad_selector_rejected() {
        let config = ExtractionConfig {
            title_selectors: vec!["h1[".into()],
            ..ExtractionConfig::default()
        };
        assert!(matches!(
            NoticePipeline::from_config(&config),
            Err(Error::InvalidSelector { .. })
        ));
    }
}
