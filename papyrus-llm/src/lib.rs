//! Papyrus LLM - Remote Question/Answer Generator Client
//!
//! The answer for a paper is produced by a slow external service. This crate
//! holds the HTTP implementation of [`papyrus_core::ArtifactGenerator`] that
//! talks to it, plus the configuration needed to reach it.

pub mod client;
pub mod config;
mod types;

pub use client::HttpArtifactGenerator;
pub use config::{GeneratorConfig, DEFAULT_GENERATOR_TIMEOUT_SECS};
