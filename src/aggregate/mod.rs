//! Chunk aggregation: folding per-page extraction fragments into one result
//!
//! Fragments arrive in page order from a `FragmentSource` or from the
//! `ExtractionPipeline`, and `ChunkAggregator` folds them sequentially.

mod aggregator;
mod error;
mod fragment;
mod pipeline;
mod reorder;
mod source;
mod types;

pub use aggregator::{Aggregation, ChunkAggregator, Diagnostic, FoldOutcome};
pub use error::AggregateError;
pub use fragment::{strip_fences, Fragment, FragmentFlags, FragmentParseError, FragmentSummary};
pub use pipeline::{ChunkExtractor, ExtractionPipeline, ExtractorError, MockExtractor, PageChunk};
pub use reorder::ReorderBuffer;
pub use source::{DirectoryFragments, FragmentSource, MemoryFragments, RawFragment};
pub use types::{
    AggregateResult, CategoryCounts, FlagsAndObservations, PageAnalysis, RiskLevel, Rule, RuleKey,
    RulesSummary, RULE_CATEGORIES,
};
