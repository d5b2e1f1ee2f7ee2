//! Activation Code Service
//!
//! Issuing fresh codes and binding a code to the account that redeems it.
//!
//! A code's owner moves from empty to one account exactly once. Re-linking
//! the same pair is a no-op success; linking to any other account is refused.
//! The ownership check and the write happen in one store transaction
//! ([`Store::activation_code_claim`]), so concurrent redemptions of the same
//! code cannot both win.

use std::sync::Arc;

use papyrus_core::{
    AccountId, ActivationCode, ActivationError, ClaimOutcome, EntityType, PapyrusError,
    PapyrusResult, StorageError, ACTIVATION_CODE_ALPHABET, ACTIVATION_CODE_LEN,
};
use papyrus_storage::Store;
use rand::Rng;

use crate::config::DEFAULT_CODE_MAX_ATTEMPTS;

// ============================================================================
// CODE SOURCE
// ============================================================================

/// Produces candidate code strings.
pub trait CodeSource: Send + Sync {
    fn next_code(&self) -> String;
}

/// Uniform random draws over `A-Z0-9` from the thread-local generator.
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomCodeSource;

impl CodeSource for RandomCodeSource {
    fn next_code(&self) -> String {
        let mut rng = rand::rng();
        (0..ACTIVATION_CODE_LEN)
            .map(|_| {
                let idx = rng.random_range(0..ACTIVATION_CODE_ALPHABET.len());
                char::from(ACTIVATION_CODE_ALPHABET[idx])
            })
            .collect()
    }
}

// ============================================================================
// ALLOCATOR
// ============================================================================

/// Issues new, never-before-seen activation codes.
#[derive(Clone)]
pub struct ActivationCodeAllocator {
    store: Arc<dyn Store>,
    source: Arc<dyn CodeSource>,
    max_attempts: u32,
}

impl ActivationCodeAllocator {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            store,
            source: Arc::new(RandomCodeSource),
            max_attempts: DEFAULT_CODE_MAX_ATTEMPTS,
        }
    }

    pub fn with_source(mut self, source: Arc<dyn CodeSource>) -> Self {
        self.source = source;
        self
    }

    /// Set the retry ceiling. Values below 1 are raised to 1.
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Draw candidates until one inserts cleanly.
    ///
    /// A candidate already present, or one that loses an insert race, counts
    /// as a collision. After `max_attempts` collisions the call fails with
    /// [`ActivationError::CodeSpaceExhausted`].
    pub async fn allocate(&self) -> PapyrusResult<ActivationCode> {
        for attempt in 1..=self.max_attempts {
            let candidate = self.source.next_code();

            if self.store.activation_code_get(&candidate).await?.is_some() {
                tracing::debug!(attempt, "activation code collision");
                continue;
            }

            match self.store.activation_code_insert(&candidate).await {
                Ok(code) => {
                    tracing::info!(code = %code.code, attempt, "activation code issued");
                    return Ok(code);
                }
                Err(PapyrusError::Storage(StorageError::UniqueViolation { .. })) => {
                    tracing::debug!(attempt, "activation code insert lost a race");
                }
                Err(e) => return Err(e),
            }
        }

        tracing::error!(
            attempts = self.max_attempts,
            "activation code space exhausted; no free code found"
        );
        Err(ActivationError::CodeSpaceExhausted {
            attempts: self.max_attempts,
        }
        .into())
    }
}

// ============================================================================
// LINKER
// ============================================================================

/// Result of a successful link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkOutcome {
    /// The code was free and now belongs to the account.
    Linked,
    /// The code already belonged to this account.
    AlreadyLinked,
}

/// Binds activation codes to accounts.
#[derive(Clone)]
pub struct ActivationLinker {
    store: Arc<dyn Store>,
}

impl ActivationLinker {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Bind `raw_code` to `account_id`.
    ///
    /// The code is trimmed and uppercased first. Errors:
    /// - malformed code: `ValidationError`
    /// - code never issued: [`ActivationError::UnknownCode`]
    /// - code owned by someone else: [`ActivationError::CodeAlreadyClaimed`]
    /// - account already holds another code: [`ActivationError::AccountAlreadyActivated`]
    pub async fn link(&self, account_id: AccountId, raw_code: &str) -> PapyrusResult<LinkOutcome> {
        let code = ActivationCode::normalize(raw_code)?;

        let row = self
            .store
            .activation_code_get(&code)
            .await?
            .ok_or_else(|| ActivationError::UnknownCode { code: code.clone() })?;

        match row.owner {
            Some(owner) if owner == account_id => return Ok(LinkOutcome::AlreadyLinked),
            Some(_) => return Err(ActivationError::CodeAlreadyClaimed { code }.into()),
            None => {}
        }

        // The read above is only a fast path; the claim re-checks under lock.
        let outcome = match self.store.activation_code_claim(&code, account_id).await {
            Ok(outcome) => outcome,
            Err(PapyrusError::Storage(StorageError::NotFound {
                entity_type: EntityType::ActivationCode,
                ..
            })) => return Err(ActivationError::UnknownCode { code }.into()),
            Err(e) => return Err(e),
        };

        match outcome {
            ClaimOutcome::Claimed(_) => {
                tracing::info!(%account_id, %code, "activation code linked");
                Ok(LinkOutcome::Linked)
            }
            ClaimOutcome::AlreadyOwned { owner } if owner == account_id => {
                Ok(LinkOutcome::AlreadyLinked)
            }
            ClaimOutcome::AlreadyOwned { .. } => {
                tracing::info!(%account_id, %code, "activation code claimed concurrently");
                Err(ActivationError::CodeAlreadyClaimed { code }.into())
            }
            ClaimOutcome::AccountBound { bound_code } => {
                Err(ActivationError::AccountAlreadyActivated {
                    account_id,
                    bound_code,
                }
                .into())
            }
        }
    }
}
