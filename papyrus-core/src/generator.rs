//! Artifact generator seam.
//!
//! The generator is a slow remote procedure that turns a paper key into a
//! question/answer pair. Implementations live in papyrus-llm; test doubles in
//! papyrus-test-utils.

use crate::{GeneratorError, PaperKey};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Payload returned by a successful generation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedArtifact {
    /// Prompt content (the paper text).
    pub question: String,
    /// Generated answer content.
    pub answer: String,
}

/// External generator of paper answers.
///
/// Callers are expected to bound each call with their own timeout; an
/// implementation may also enforce one internally.
#[async_trait]
pub trait ArtifactGenerator: Send + Sync {
    async fn generate(&self, key: PaperKey) -> Result<GeneratedArtifact, GeneratorError>;
}
