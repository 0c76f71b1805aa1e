//! Error taxonomy for the ingestion loop
//!
//! Per-message conditions are `SkipReason`s carried inside a normal
//! outcome; they never abort the stream. Only storage and source failures
//! surface as `IngestError` and stop the run.

use thiserror::Error;

use crate::source::SourceError;
use crate::store::StoreError;

/// Why a message produced no persisted data. All of these are recoverable;
/// the driver logs them and moves on.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SkipReason {
    #[error("call is missing pair or entry")]
    MalformedCall,
    #[error("update has no pair or no events")]
    EmptyUpdate,
    #[error("no owning call found for {pair}")]
    Unresolved { pair: String },
    #[error("edit is not newer than the stored version")]
    StaleEdit,
    #[error("not signal content")]
    NotSignalContent,
}

/// Fatal to the current run. The checkpoint only covers messages processed
/// before the failure, so a retry resumes at the failed message.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("storage failure: {0}")]
    Storage(#[from] StoreError),
    #[error("source failure: {0}")]
    Source(#[from] SourceError),
}
