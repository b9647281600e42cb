//! Concurrent chunk extraction feeding the sequential aggregator
//!
//! Chunks are extracted in parallel (bounded by a semaphore), but the
//! aggregator folds strictly in page order: finished extractions wait in a
//! `ReorderBuffer` until every earlier chunk has been folded.

use super::aggregator::{Aggregation, ChunkAggregator};
use super::error::AggregateError;
use super::reorder::ReorderBuffer;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::debug;

/// One page-sized chunk of a source document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageChunk {
    pub chunk_id: u64,
    pub page_number: u32,
    pub text: String,
    #[serde(default)]
    pub previous_overlap: Option<String>,
    #[serde(default)]
    pub next_overlap: Option<String>,
}

impl PageChunk {
    pub fn new(chunk_id: u64, page_number: u32, text: impl Into<String>) -> Self {
        Self {
            chunk_id,
            page_number,
            text: text.into(),
            previous_overlap: None,
            next_overlap: None,
        }
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum ExtractorError {
    #[error("extractor unavailable: {0}")]
    Unavailable(String),
    #[error("extraction failed: {0}")]
    Failed(String),
}

/// Client for the external extraction service.
///
/// Build one per process and share it through `Arc`; the pipeline holds no
/// global client state.
#[async_trait]
pub trait ChunkExtractor: Send + Sync {
    /// Produce the fragment text for one chunk.
    async fn extract(&self, chunk: &PageChunk) -> Result<String, ExtractorError>;
}

/// Mock extractor for testing, returns preconfigured per-chunk responses.
pub struct MockExtractor {
    responses: HashMap<u64, Result<String, ExtractorError>>,
    delays: HashMap<u64, std::time::Duration>,
}

impl MockExtractor {
    pub fn new() -> Self {
        Self {
            responses: HashMap::new(),
            delays: HashMap::new(),
        }
    }

    /// Register the fragment text returned for a chunk id.
    pub fn with_response(mut self, chunk_id: u64, text: impl Into<String>) -> Self {
        self.responses.insert(chunk_id, Ok(text.into()));
        self
    }

    /// Register a failure for a chunk id.
    pub fn with_error(mut self, chunk_id: u64, error: ExtractorError) -> Self {
        self.responses.insert(chunk_id, Err(error));
        self
    }

    /// Delay the response for a chunk id (to force out-of-order completion).
    pub fn with_delay(mut self, chunk_id: u64, delay: std::time::Duration) -> Self {
        self.delays.insert(chunk_id, delay);
        self
    }
}

impl Default for MockExtractor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChunkExtractor for MockExtractor {
    async fn extract(&self, chunk: &PageChunk) -> Result<String, ExtractorError> {
        if let Some(delay) = self.delays.get(&chunk.chunk_id) {
            tokio::time::sleep(*delay).await;
        }
        match self.responses.get(&chunk.chunk_id) {
            Some(response) => response.clone(),
            None => Err(ExtractorError::Failed(format!(
                "no mock response for chunk {}",
                chunk.chunk_id
            ))),
        }
    }
}

/// Extracts a document's chunks concurrently and folds them in order.
pub struct ExtractionPipeline {
    extractor: Arc<dyn ChunkExtractor>,
    semaphore: Arc<Semaphore>,
}

impl ExtractionPipeline {
    pub fn new(extractor: Arc<dyn ChunkExtractor>) -> Self {
        Self {
            extractor,
            semaphore: Arc::new(Semaphore::new(4)),
        }
    }

    /// Set the maximum number of in-flight extractions.
    pub fn with_concurrency(mut self, limit: usize) -> Self {
        self.semaphore = Arc::new(Semaphore::new(limit.max(1)));
        self
    }

    /// Extract every chunk and fold the fragments in chunk order.
    ///
    /// The fold sequence is the chunk's position in `chunks`. A failed
    /// extraction is recorded as a diagnostic for its position.
    pub async fn run(&self, chunks: Vec<PageChunk>) -> Result<Aggregation, AggregateError> {
        let total = chunks.len();
        let mut tasks = JoinSet::new();
        for (position, chunk) in chunks.into_iter().enumerate() {
            let extractor = self.extractor.clone();
            let semaphore = self.semaphore.clone();
            let sequence = position as u64;
            tasks.spawn(async move {
                let outcome = match semaphore.acquire_owned().await {
                    Ok(_permit) => extractor.extract(&chunk).await,
                    Err(_) => Err(ExtractorError::Unavailable("pipeline closed".into())),
                };
                (sequence, outcome)
            });
        }

        let mut aggregator = ChunkAggregator::new();
        let mut buffer = ReorderBuffer::new(0);
        let mut delivered = vec![false; total];
        while let Some(joined) = tasks.join_next().await {
            let (sequence, outcome) = match joined {
                Ok(done) => done,
                Err(e) => {
                    // Position unknown here; the gap is filled once all tasks are in
                    debug!(error = %e, "extraction task failed to join");
                    continue;
                }
            };
            delivered[sequence as usize] = true;
            for (sequence, outcome) in buffer.push(sequence, outcome)? {
                fold_outcome(&mut aggregator, sequence, outcome)?;
            }
        }
        let aborted: Vec<u64> = (0..total as u64)
            .filter(|position| !delivered[*position as usize])
            .collect();
        for position in aborted {
            let outcome = Err(ExtractorError::Failed("extraction task aborted".into()));
            for (sequence, outcome) in buffer.push(position, outcome)? {
                fold_outcome(&mut aggregator, sequence, outcome)?;
            }
        }
        for (sequence, outcome) in buffer.finish() {
            fold_outcome(&mut aggregator, sequence, outcome)?;
        }

        Ok(aggregator.finalize())
    }
}

fn fold_outcome(
    aggregator: &mut ChunkAggregator,
    sequence: u64,
    outcome: Result<String, ExtractorError>,
) -> Result<(), AggregateError> {
    match outcome {
        Ok(text) => {
            aggregator.fold(sequence, &text)?;
        }
        Err(e) => aggregator.skip(sequence, e.to_string())?,
    }
    Ok(())
}
