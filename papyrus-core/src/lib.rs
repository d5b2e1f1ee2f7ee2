//! Papyrus Core - Entity Types
//!
//! Pure data structures shared by every other crate: typed identifiers,
//! persisted entities, validated keys, the error taxonomy, and the
//! `ArtifactGenerator` seam for the remote answer generator.

pub mod entities;
pub mod error;
pub mod generator;
pub mod identity;

pub use entities::{
    AccessLog, Account, AccountLogin, AccountProfile, ActivationCode, ClaimOutcome, NewPaperAnswer,
    PaperAnswer, PaperKey, ProfileUpdate, ACTIVATION_CODE_ALPHABET, ACTIVATION_CODE_LEN,
};
pub use error::{
    ActivationError, ConfigError, ErrorKind, GeneratorError, IdentityError, PapyrusError,
    PapyrusResult, StorageError, ValidationError,
};
pub use generator::{ArtifactGenerator, GeneratedArtifact};
pub use identity::{new_entity_id, AccountId, EntityId, EntityType, Timestamp};
