//! Cache-aside layer for generated paper answers.
//!
//! Reads go to the store first. On a miss exactly one caller per key (per
//! process) runs the generator, persists the result, and shares the outcome
//! with every concurrent caller for that key. Failures are shared the same
//! way but never cached.

use std::sync::Arc;
use std::time::{Duration, Instant};

use papyrus_core::{
    AccessLog, AccountId, ArtifactGenerator, EntityType, GeneratorError, NewPaperAnswer,
    PaperAnswer, PaperKey, PapyrusError, PapyrusResult, StorageError,
};

use super::single_flight::SingleFlight;
use crate::Store;

/// Default upper bound on a single generation call.
pub const DEFAULT_GENERATION_TIMEOUT: Duration = Duration::from_secs(600);

/// Configuration for the paper answer cache.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// How long the elected caller waits for the generator.
    pub generation_timeout: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            generation_timeout: DEFAULT_GENERATION_TIMEOUT,
        }
    }
}

impl CacheConfig {
    /// Create a new cache config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the generation timeout.
    pub fn with_generation_timeout(mut self, timeout: Duration) -> Self {
        self.generation_timeout = timeout;
        self
    }
}

/// Read-through cache over the store and the remote generator.
///
/// Built once at startup and shared; clones share the in-flight map.
#[derive(Clone)]
pub struct PaperAnswerCache {
    store: Arc<dyn Store>,
    generator: Arc<dyn ArtifactGenerator>,
    flights: SingleFlight<PaperKey, PapyrusResult<PaperAnswer>>,
    config: CacheConfig,
}

impl PaperAnswerCache {
    pub fn new(
        store: Arc<dyn Store>,
        generator: Arc<dyn ArtifactGenerator>,
        config: CacheConfig,
    ) -> Self {
        Self {
            store,
            generator,
            flights: SingleFlight::new(),
            config,
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Number of keys currently being generated by this process.
    pub fn in_flight(&self) -> usize {
        self.flights.in_flight()
    }

    /// Return the answer for `key`, generating and persisting it on a miss.
    ///
    /// When `requester` is known an access log entry is appended on its own
    /// task. The answer does not wait for it, and a failure there is only
    /// logged.
    pub async fn get_or_create(
        &self,
        key: PaperKey,
        requester: Option<AccountId>,
    ) -> PapyrusResult<PaperAnswer> {
        let answer = self.lookup_or_generate(key).await?;
        if let Some(account_id) = requester {
            self.record_access(account_id, key);
        }
        Ok(answer)
    }

    async fn lookup_or_generate(&self, key: PaperKey) -> PapyrusResult<PaperAnswer> {
        if let Some(hit) = self.store.paper_answer_get(key).await? {
            tracing::debug!(%key, "paper answer cache hit");
            return Ok(hit);
        }

        tracing::debug!(%key, "paper answer cache miss");
        let store = Arc::clone(&self.store);
        let generator = Arc::clone(&self.generator);
        let timeout = self.config.generation_timeout;

        self.flights
            .run(key, move || generate_and_persist(store, generator, key, timeout))
            .await
            .unwrap_or_else(|| {
                Err(GeneratorError::Aborted {
                    reason: format!("generation for {} ended without a result", key),
                }
                .into())
            })
    }

    fn record_access(&self, account_id: AccountId, key: PaperKey) {
        let store = Arc::clone(&self.store);
        tokio::spawn(async move {
            let log = AccessLog::paper_lookup(account_id, key);
            if let Err(e) = store.access_log_append(&log).await {
                tracing::warn!(%account_id, %key, error = %e, "failed to record access log");
            }
        });
    }
}

/// Body of a single flight. Runs on its own task.
async fn generate_and_persist(
    store: Arc<dyn Store>,
    generator: Arc<dyn ArtifactGenerator>,
    key: PaperKey,
    timeout: Duration,
) -> PapyrusResult<PaperAnswer> {
    // A previous flight may have finished between our miss and our election.
    if let Some(existing) = store.paper_answer_get(key).await? {
        return Ok(existing);
    }

    tracing::info!(%key, "generating paper answer");
    let started = Instant::now();
    let generated = match tokio::time::timeout(timeout, generator.generate(key)).await {
        Ok(Ok(generated)) => generated,
        Ok(Err(e)) => {
            tracing::warn!(%key, error = %e, "paper answer generation failed");
            return Err(e.into());
        }
        Err(_) => {
            tracing::warn!(%key, ?timeout, "paper answer generation timed out");
            return Err(GeneratorError::Timeout { timeout }.into());
        }
    };
    tracing::info!(
        %key,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "paper answer generated"
    );

    let row = NewPaperAnswer {
        key,
        question: generated.question,
        answer: generated.answer,
    };
    match store.paper_answer_insert(&row).await {
        Ok(inserted) => Ok(inserted),
        Err(PapyrusError::Storage(StorageError::UniqueViolation { .. })) => {
            tracing::debug!(%key, "paper answer written concurrently; using stored row");
            store.paper_answer_get(key).await?.ok_or_else(|| {
                StorageError::NotFound {
                    entity_type: EntityType::PaperAnswer,
                    key: key.to_string(),
                }
                .into()
            })
        }
        Err(e) => Err(e),
    }
}
