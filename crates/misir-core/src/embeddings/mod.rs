//! Semantic Embeddings (C1)
//!
//! Local embedding generation using fastembed (ONNX-based nomic-embed-text-v1.5,
//! 768 dimensions, 8192 token context). No external API calls — inference runs
//! in-process.
//!
//! Callers ask for one of the supported Matryoshka dimensions
//! (768/384/256/128/64); the model always runs at full 768d and smaller
//! requests are served by truncating + L2-renormalizing the cached full
//! vector, per Matryoshka Representation Learning.

mod local;

pub use local::{
    cosine_similarity, dot_product, euclidean_distance, matryoshka_truncate, EmbeddingService,
    MAX_TEXT_LENGTH, NATIVE_DIMENSIONS, SUPPORTED_DIMENSIONS,
};

pub use crate::error::EmbeddingError;
