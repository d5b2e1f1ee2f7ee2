//! Papyrus Test Utilities
//!
//! Shared test infrastructure for the Papyrus workspace:
//! - A scriptable mock for the artifact generator
//! - Proptest strategies for keys, codes and subject ids
//! - Fixtures for common account states

// Re-export the in-memory store from its source crate
pub use papyrus_storage::InMemoryStore;

// Re-export core types for convenience
pub use papyrus_core::{
    Account, AccountId, AccountLogin, ActivationCode, ArtifactGenerator, GeneratedArtifact,
    GeneratorError, PaperAnswer, PaperKey, PapyrusError, PapyrusResult,
    ACTIVATION_CODE_ALPHABET, ACTIVATION_CODE_LEN,
};

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

// ============================================================================
// MOCK GENERATOR
// ============================================================================

/// Deterministic stand-in for the remote generator.
///
/// Answers `"question {key}"` / `"answer {key}"`, counts calls, and can be
/// told to sleep or fail a number of times first. Clones share counters.
#[derive(Debug, Clone, Default)]
pub struct MockArtifactGenerator {
    calls: Arc<AtomicUsize>,
    failures_left: Arc<AtomicUsize>,
    delay: Option<Duration>,
}

impl MockArtifactGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleep this long inside every call.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Fail the next `count` calls with a 500 from the "remote".
    pub fn failing(self, count: usize) -> Self {
        self.failures_left.store(count, Ordering::SeqCst);
        self
    }

    /// Number of `generate` calls so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Expected answer text for a key.
    pub fn answer_for(key: PaperKey) -> String {
        format!("answer {}", key)
    }

    /// Expected question text for a key.
    pub fn question_for(key: PaperKey) -> String {
        format!("question {}", key)
    }
}

#[async_trait]
impl ArtifactGenerator for MockArtifactGenerator {
    async fn generate(&self, key: PaperKey) -> Result<GeneratedArtifact, GeneratorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let failed = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failed {
            return Err(GeneratorError::RequestFailed {
                status: 500,
                message: format!("mock failure for {}", key),
            });
        }

        Ok(GeneratedArtifact {
            question: Self::question_for(key),
            answer: Self::answer_for(key),
        })
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for Papyrus inputs.

    use super::*;
    use proptest::prelude::*;

    /// Any valid paper key.
    pub fn arb_paper_key() -> impl Strategy<Value = PaperKey> {
        (1i64..10_000, 1i64..100_000)
            .prop_filter_map("positive ids", |(school, paper)| PaperKey::new(school, paper).ok())
    }

    /// `(school, paper)` pairs where at least one side is not positive.
    pub fn arb_invalid_key_parts() -> impl Strategy<Value = (i64, i64)> {
        prop_oneof![
            (i64::MIN..=0, any::<i64>()),
            (1i64..10_000, i64::MIN..=0),
        ]
    }

    /// Well-formed activation code.
    pub fn arb_activation_code() -> impl Strategy<Value = String> {
        proptest::collection::vec(
            proptest::sample::select(ACTIVATION_CODE_ALPHABET),
            ACTIVATION_CODE_LEN,
        )
        .prop_map(|bytes| bytes.into_iter().map(char::from).collect())
    }

    /// Strings that can never normalize into a code.
    pub fn arb_malformed_code() -> impl Strategy<Value = String> {
        prop_oneof![
            "[A-Z0-9]{1,3}",
            "[A-Z0-9]{5,8}",
            "[A-Z0-9]{0,3}[^A-Za-z0-9 ][A-Z0-9]{0,3}",
        ]
        .prop_filter("must not be a valid code after trimming", |s| {
            papyrus_core::ActivationCode::normalize(s).is_err()
        })
    }

    /// Identity provider subject ids.
    pub fn arb_openid() -> impl Strategy<Value = String> {
        "o[A-Za-z0-9_-]{8,27}"
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    //! Pre-built inputs for common scenarios.

    use super::*;
    use papyrus_storage::Store;

    /// Login result for a subject id.
    pub fn login(openid: &str) -> AccountLogin {
        AccountLogin {
            openid: openid.to_string(),
            unionid: None,
            session_key: format!("session-{}", openid),
        }
    }

    /// The key used across examples: school 7, paper 101.
    pub fn sample_key() -> PaperKey {
        PaperKey::new(7, 101).expect("valid key")
    }

    /// Create an account that has not linked a code.
    pub async fn inactive_account(store: &dyn Store, openid: &str) -> PapyrusResult<Account> {
        store.account_upsert_login(&login(openid)).await
    }

    /// Create an account bound to a freshly inserted code.
    pub async fn activated_account(
        store: &dyn Store,
        openid: &str,
        code: &str,
    ) -> PapyrusResult<Account> {
        let account = inactive_account(store, openid).await?;
        store.activation_code_insert(code).await?;
        store
            .activation_code_claim(code, account.account_id)
            .await?;
        store
            .account_get_by_openid(openid)
            .await?
            .ok_or_else(|| PapyrusError::account_not_found(openid))
    }
}
