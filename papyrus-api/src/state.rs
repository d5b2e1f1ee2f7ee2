//! Shared application state for Axum routers.

use std::sync::Arc;
use std::time::Instant;

use papyrus_core::ArtifactGenerator;
use papyrus_storage::{CacheConfig, PaperAnswerCache, Store};

use crate::config::ApiConfig;
use crate::identity::IdentityProvider;
use crate::services::{AccountService, ActivationCodeAllocator};

/// Application-wide state shared across all routes.
///
/// Built once in `main` (or a test) and cloned into every handler; there is
/// no process-global registry.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub accounts: AccountService,
    pub allocator: ActivationCodeAllocator,
    pub answers: PaperAnswerCache,
    pub start_time: Instant,
}

impl AppState {
    /// Wire the services around a store, an identity provider and a generator.
    pub fn new(
        store: Arc<dyn Store>,
        identity: Arc<dyn IdentityProvider>,
        generator: Arc<dyn ArtifactGenerator>,
        api_config: &ApiConfig,
        cache_config: CacheConfig,
    ) -> Self {
        Self {
            accounts: AccountService::new(Arc::clone(&store), identity),
            allocator: ActivationCodeAllocator::new(Arc::clone(&store))
                .with_max_attempts(api_config.code_max_attempts),
            answers: PaperAnswerCache::new(Arc::clone(&store), generator, cache_config),
            store,
            start_time: Instant::now(),
        }
    }
}

crate::impl_from_ref!(Arc<dyn Store>, store);
crate::impl_from_ref!(AccountService, accounts);
crate::impl_from_ref!(ActivationCodeAllocator, allocator);
crate::impl_from_ref!(PaperAnswerCache, answers);
crate::impl_from_ref!(Instant, start_time);
