use std::collections::BTreeMap;

use super::normalizer::{clean_city, clean_organization_name, clean_text, normalize_cpv_codes};
use super::pipeline::{IngestError, IngestResult};
use crate::config::CpvConfig;
use crate::record::{content_hash, CandidateRecord, Field, FieldSource, NormalizedRecord, Sourced};
use crate::roles::{RoleOutcome, RoleResolver};
use crate::suggestion::AiSuggestion;

const CURRENCY: &str = "EUR";
const WINNER_COUNTRY: &str = "FR";
const SOURCE: &str = "boamp_daily";

#[derive(Debug, Clone, PartialEq)]
pub struct MergeOutput {
    pub record: NormalizedRecord,
    pub outcome: RoleOutcome,
    /// The suggestion named a public body as winner and that name was dropped.
    pub suggestion_rejected: bool,
}

/// Reconciles the deterministic candidate with an optional suggestion.
///
/// Deterministic values win; the suggestion only fills gaps. The merged
/// buyer/winner pair then goes through the resolver exactly once.
#[derive(Debug, Clone)]
pub struct ExtractionMerger {
    resolver: RoleResolver,
    valid_divisions: Vec<String>,
    max_codes: usize,
}

impl ExtractionMerger {
    #[must_use]
    pub fn new(resolver: RoleResolver, cpv: &CpvConfig) -> Self {
        Self {
            resolver,
            valid_divisions: cpv.valid_divisions.clone(),
            max_codes: cpv.max_codes,
        }
    }

    #[must_use]
    pub fn resolver(&self) -> &RoleResolver {
        &self.resolver
    }

    pub fn merge(
        &self,
        candidate: &CandidateRecord,
        suggestion: Option<&AiSuggestion>,
        raw: &[u8],
    ) -> IngestResult<MergeOutput> {
        let notice_id = candidate
            .notice_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| IngestError::IdentityMissing(candidate.source_url.clone()))?
            .to_string();

        let empty = AiSuggestion::default();
        let mut ai = suggestion.unwrap_or(&empty).clone();

        let mut suggestion_rejected = false;
        if let Some(winner) = ai.winner_name.as_deref() {
            if self.resolver.classifier().is_government(winner) {
                tracing::warn!(
                    "Rejecting suggested winner '{}' for {}: public body",
                    winner,
                    notice_id
                );
                ai.winner_name = None;
                ai.winner_address = None;
                ai.winner_city = None;
                suggestion_rejected = true;
            }
        }

        let mut provenance = BTreeMap::new();
        let p = &mut provenance;

        let mut buyer = Party {
            name: fill_text(p, Field::BuyerName, candidate.buyer_name.as_ref(), ai.buyer_name, clean_organization_name),
            address: fill_text(p, Field::BuyerAddress, candidate.buyer_address.as_ref(), ai.buyer_address, clean_text),
            city: fill_text(p, Field::BuyerCity, candidate.buyer_city.as_ref(), ai.buyer_city, clean_city),
        };
        let mut winner = Party {
            name: fill_text(p, Field::WinnerName, candidate.winner_name.as_ref(), ai.winner_name, clean_organization_name),
            address: fill_text(p, Field::WinnerAddress, candidate.winner_address.as_ref(), ai.winner_address, clean_text),
            city: fill_text(p, Field::WinnerCity, candidate.winner_city.as_ref(), ai.winner_city, clean_city),
        };

        let resolution = self
            .resolver
            .resolve(buyer.name.as_deref(), winner.name.as_deref());

        // Address and city follow their organization.
        match resolution.outcome {
            RoleOutcome::Unchanged => {}
            RoleOutcome::Swapped => {
                std::mem::swap(&mut buyer, &mut winner);
                for (b, w) in Party::FIELDS {
                    swap_source(p, b, w);
                }
            }
            RoleOutcome::PromotedToBuyer => {
                let promoted = std::mem::take(&mut winner);
                move_source(p, Field::WinnerName, Field::BuyerName);
                if promoted.address.is_some() {
                    buyer.address = promoted.address;
                    move_source(p, Field::WinnerAddress, Field::BuyerAddress);
                }
                if promoted.city.is_some() {
                    buyer.city = promoted.city;
                    move_source(p, Field::WinnerCity, Field::BuyerCity);
                }
                clear_winner_sources(p);
            }
            RoleOutcome::WinnerDiscarded => {
                winner = Party::default();
                clear_winner_sources(p);
            }
        }
        buyer.name = resolution.assignment.buyer_name;
        winner.name = resolution.assignment.winner_name;

        let award_value = fill_value(p, Field::AwardValue, candidate.award_value.as_ref(), ai.award_value);
        let cpv_codes = self.merge_codes(p, candidate.cpv_codes.as_ref(), &ai.cpv_codes);

        let title = fill_text(p, Field::Title, candidate.title.as_ref(), ai.title, clean_text);
        let short_description = fill_text(
            p,
            Field::ShortDescription,
            candidate.short_description.as_ref(),
            ai.short_description,
            clean_text,
        );

        let notice_type = keep_text(p, Field::NoticeType, candidate.notice_type.as_ref(), clean_text);
        let procedure_type = keep_text(p, Field::ProcedureType, candidate.procedure_type.as_ref(), clean_text);
        let department = keep_text(p, Field::Department, candidate.department.as_ref(), clean_text);
        let estimated_value = fill_value(p, Field::EstimatedValue, candidate.estimated_value.as_ref(), None);
        let published_at = fill_value(p, Field::PublishedAt, candidate.published_at.as_ref(), None);

        let record = NormalizedRecord {
            notice_id,
            source_url: candidate.source_url.clone(),
            title,
            notice_type,
            procedure_type,
            department,
            buyer_name: buyer.name,
            buyer_address: buyer.address,
            buyer_city: buyer.city,
            winner_name: winner.name,
            winner_address: winner.address,
            winner_city: winner.city,
            award_value,
            estimated_value,
            currency: CURRENCY.to_string(),
            winner_country: WINNER_COUNTRY.to_string(),
            source: SOURCE.to_string(),
            cpv_primary: cpv_codes.first().cloned(),
            cpv_codes,
            published_at,
            short_description,
            roles_swapped: resolution.assignment.swapped,
            content_hash: content_hash(raw),
            provenance,
            issues: candidate.issues.clone(),
        };

        Ok(MergeOutput {
            record,
            outcome: resolution.outcome,
            suggestion_rejected,
        })
    }

    fn merge_codes(
        &self,
        provenance: &mut BTreeMap<Field, FieldSource>,
        deterministic: Option<&Sourced<Vec<String>>>,
        suggested: &[String],
    ) -> Vec<String> {
        if let Some(found) = deterministic.filter(|f| !f.value.is_empty()) {
            provenance.insert(Field::CpvCodes, found.source);
            return found.value.clone();
        }

        let codes = normalize_cpv_codes(suggested, &self.valid_divisions, self.max_codes);
        if !codes.is_empty() {
            provenance.insert(Field::CpvCodes, FieldSource::Suggestion);
        }
        codes
    }
}

#[derive(Debug, Default)]
struct Party {
    name: Option<String>,
    address: Option<String>,
    city: Option<String>,
}

impl Party {
    const FIELDS: [(Field, Field); 3] = [
        (Field::BuyerName, Field::WinnerName),
        (Field::BuyerAddress, Field::WinnerAddress),
        (Field::BuyerCity, Field::WinnerCity),
    ];
}

/// Deterministic text when it survives cleaning, otherwise the suggestion.
fn fill_text(
    provenance: &mut BTreeMap<Field, FieldSource>,
    field: Field,
    deterministic: Option<&Sourced<String>>,
    suggested: Option<String>,
    clean: fn(&str) -> Option<String>,
) -> Option<String> {
    if let Some(value) = keep_text(provenance, field, deterministic, clean) {
        return Some(value);
    }

    let value = suggested.as_deref().and_then(clean)?;
    provenance.insert(field, FieldSource::Suggestion);
    Some(value)
}

fn keep_text(
    provenance: &mut BTreeMap<Field, FieldSource>,
    field: Field,
    deterministic: Option<&Sourced<String>>,
    clean: fn(&str) -> Option<String>,
) -> Option<String> {
    let found = deterministic?;
    let value = clean(&found.value)?;
    provenance.insert(field, found.source);
    Some(value)
}

fn fill_value<T: Copy>(
    provenance: &mut BTreeMap<Field, FieldSource>,
    field: Field,
    deterministic: Option<&Sourced<T>>,
    suggested: Option<T>,
) -> Option<T> {
    if let Some(found) = deterministic {
        provenance.insert(field, found.source);
        return Some(found.value);
    }

    let value = suggested?;
    provenance.insert(field, FieldSource::Suggestion);
    Some(value)
}

fn swap_source(provenance: &mut BTreeMap<Field, FieldSource>, a: Field, b: Field) {
    let from_a = provenance.remove(&a);
    let from_b = provenance.remove(&b);
    if let Some(source) = from_a {
        provenance.insert(b, source);
    }
    if let Some(source) = from_b {
        provenance.insert(a, source);
    }
}

fn move_source(provenance: &mut BTreeMap<Field, FieldSource>, from: Field, to: Field) {
    if let Some(source) = provenance.remove(&from) {
        provenance.insert(to, source);
    }
}

fn clear_winner_sources(provenance: &mut BTreeMap<Field, FieldSource>) {
    for (_, winner_field) in Party::FIELDS {
        provenance.remove(&winner_field);
    }
}
