use crate::ObjectId;
use thiserror::Error;

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    #[error("Object not found: {0}")]
    ObjectNotFound(ObjectId),

    #[error("Object is not a card: {0}")]
    NotACard(ObjectId),

    #[error("The root card cannot be copied, moved or destroyed")]
    RootCard,

    #[error("Moving {node} into {parent} would create a cycle")]
    CycleDetected { node: ObjectId, parent: ObjectId },

    #[error("Invalid document: {0}")]
    InvalidDocument(String),
}

impl StoreError {
    pub fn invalid_document(message: impl Into<String>) -> Self {
        Self::InvalidDocument(message.into())
    }
}
