mod cpv;
mod document;
mod extractor;
mod identity;
mod merger;
pub mod normalizer;
mod pipeline;
mod section;

pub use cpv::CpvCodeExtractor;
pub use document::{Document, DomNode, NodeKind};
pub use extractor::{ExtractionCandidate, ExtractionStrategy, FieldExtractor, LabelSet};
pub use identity::NoticeIdentity;
pub use merger::{ExtractionMerger, MergeOutput};
pub use pipeline::{BatchResult, ExtractionStats, IngestError, IngestResult, NoticePipeline};
pub use section::{Scope, SectionLocator};
