//! Error types for the editor

use crate::mutations::MutationError;
use cardboard_model::{ObjectId, StoreError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EditorError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Mutation error: {0}")]
    Mutation(#[from] MutationError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Object is not a field: {0}")]
    NotAField(ObjectId),

    #[error("Field {0} is not placed on a card")]
    NoExampleCard(ObjectId),

    #[error("Document is not file-backed")]
    NotFileBacked,
}
