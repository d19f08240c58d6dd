//! Error types.
//!
//! Each component owns a narrow `thiserror` enum; [`CoreError`] aggregates
//! them at the crate boundary so callers (the HTTP layer in particular) have
//! one type to match on. Error-type slugs mirror the original domain error
//! codes so HTTP Problem Details stay stable across the rewrite.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("embedding model unavailable: {0}")]
    ModelInit(String),
    #[error("embedding generation failed: {0}")]
    EmbeddingFailed(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("unsupported embedding dimension: {0}")]
    InvalidDimension(usize),
}

#[derive(Debug, Error)]
pub enum VectorSearchError {
    #[error("failed to create index: {0}")]
    IndexCreation(String),
    #[error("failed to add vector: {0}")]
    IndexAdd(String),
    #[error("search failed: {0}")]
    IndexSearch(String),
    #[error("failed to persist index: {0}")]
    IndexPersistence(String),
    #[error("invalid dimensions: expected {expected}, got {actual}")]
    InvalidDimensions { expected: usize, actual: usize },
    #[error("key not found: {0}")]
    KeyNotFound(i64),
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("already exists: {0}")]
    AlreadyExists(String),
    #[error("initialization error: {0}")]
    Init(String),
}

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("value out of range: {0}")]
    InvalidRange(String),
    #[error("invalid embedding dimension: {0}")]
    InvalidDimension(String),
}

#[derive(Debug, Error)]
pub enum WebhookError {
    #[error("http request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("signing failed: {0}")]
    Signing(String),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config fetch failed: {0}")]
    FetchFailed(String),
}

/// Crate-wide error aggregate. Each variant keeps a `kind()` slug used
/// verbatim as the RFC 9457 Problem Details `type` suffix by the HTTP layer.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Embedding(#[from] EmbeddingError),
    #[error(transparent)]
    VectorSearch(#[from] VectorSearchError),
    #[error(transparent)]
    Webhook(#[from] WebhookError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("unauthorized")]
    Unauthorized,
    #[error("forbidden")]
    Forbidden,
}

impl CoreError {
    /// Short machine-readable slug, stable across releases, matching the
    /// original system's domain error codes (e.g. `not-found`, `conflict`).
    pub fn kind(&self) -> &'static str {
        match self {
            CoreError::Validation(ValidationError::InvalidRange(_)) => "invalid-range",
            CoreError::Validation(ValidationError::InvalidDimension(_)) => "invalid-dimension",
            CoreError::Validation(ValidationError::InvalidInput(_)) => "validation-error",
            CoreError::Storage(StorageError::NotFound(_)) => "not-found",
            CoreError::Storage(StorageError::AlreadyExists(_)) => "already-exists",
            CoreError::Storage(_) => "repository-error",
            CoreError::Embedding(_) => "embedding-service-error",
            CoreError::VectorSearch(_) => "repository-error",
            CoreError::Webhook(_) => "external-service-error",
            CoreError::Config(_) => "configuration-error",
            CoreError::NotFound(_) => "not-found",
            CoreError::Conflict(_) => "conflict",
            CoreError::Unauthorized => "unauthorized",
            CoreError::Forbidden => "forbidden",
        }
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;
