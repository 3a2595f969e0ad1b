#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod entity;
pub mod error;
pub mod ingest;
pub mod record;
pub mod roles;
pub mod storage;
pub mod suggestion;

pub use config::{CpvConfig, ExtractionConfig, GovernmentBank, LabelSpec, SectionScope, SuggestionConfig};
pub use entity::{GovernmentClassifier, OrganizationKind, OrganizationName};
pub use error::{Error, Result};
pub use ingest::{BatchResult, Document, ExtractionStats, IngestError, IngestResult, NoticePipeline};
pub use record::{
    content_hash, CandidateRecord, DedupKey, ExtractionIssue, Field, FieldSource, NormalizedRecord,
    Sourced,
};
pub use roles::{Resolution, RoleAssignment, RoleOutcome, RoleResolver};
pub use storage::{Storage, StoredAward, UpsertOutcome};
pub use suggestion::{
    parse_suggestion_response, AiSuggestion, NoSuggestions, StaticSuggestions, SuggestionError,
    SuggestionProvider, SuggestionRequest, SuggestionResult,
};
