//! Account Service
//!
//! Login, profile reads and writes, and the activation gate in front of
//! answer lookups.

use std::sync::Arc;

use papyrus_core::{
    Account, AccountProfile, ActivationError, PapyrusError, PapyrusResult, ProfileUpdate,
    ValidationError,
};
use papyrus_storage::Store;

use super::activation::{ActivationLinker, LinkOutcome};
use crate::identity::IdentityProvider;

/// Account operations over the store and the identity provider.
#[derive(Clone)]
pub struct AccountService {
    store: Arc<dyn Store>,
    identity: Arc<dyn IdentityProvider>,
    linker: ActivationLinker,
}

impl AccountService {
    pub fn new(store: Arc<dyn Store>, identity: Arc<dyn IdentityProvider>) -> Self {
        Self {
            linker: ActivationLinker::new(Arc::clone(&store)),
            store,
            identity,
        }
    }

    pub fn linker(&self) -> &ActivationLinker {
        &self.linker
    }

    /// Exchange a login code and create or refresh the matching account.
    pub async fn login(&self, js_code: &str) -> PapyrusResult<Account> {
        let js_code = required("code", js_code)?;
        let session = self.identity.exchange(js_code).await?;
        let account = self.store.account_upsert_login(&session).await?;
        tracing::info!(openid = %account.openid, account_id = %account.account_id, "login");
        Ok(account)
    }

    pub async fn get_profile(&self, openid: &str) -> PapyrusResult<AccountProfile> {
        let account = self.find(openid).await?;
        Ok(account.profile())
    }

    /// Apply a profile update.
    ///
    /// A supplied activation code is linked first. If linking fails the
    /// display fields are left as they were.
    pub async fn update_profile(&self, update: &ProfileUpdate) -> PapyrusResult<Account> {
        let account = self.find(&update.openid).await?;

        if let Some(code) = update.activation_code() {
            let outcome = self.linker.link(account.account_id, code).await?;
            if outcome == LinkOutcome::AlreadyLinked {
                tracing::debug!(openid = %account.openid, "activation code already linked");
            }
        }

        self.store
            .account_update_profile(update)
            .await?
            .ok_or_else(|| PapyrusError::account_not_found(&update.openid))
    }

    /// Return the account if it exists and owns a claimed activation code.
    pub async fn require_activated(&self, openid: &str) -> PapyrusResult<Account> {
        let account = self.find(openid).await?;
        let owned = self
            .store
            .activation_code_find_by_owner(account.account_id)
            .await?;
        if owned.is_none() {
            tracing::info!(%openid, "lookup refused for inactive account");
            return Err(ActivationError::AccountNotActivated {
                openid: account.openid,
            }
            .into());
        }
        Ok(account)
    }

    async fn find(&self, openid: &str) -> PapyrusResult<Account> {
        let openid = required("openid", openid)?;
        self.store
            .account_get_by_openid(openid)
            .await?
            .ok_or_else(|| PapyrusError::account_not_found(openid))
    }
}

fn required<'a>(field: &str, value: &'a str) -> Result<&'a str, ValidationError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(ValidationError::RequiredFieldMissing {
            field: field.to_string(),
        });
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::StaticIdentityProvider;
    use papyrus_core::ErrorKind;
    use papyrus_storage::InMemoryStore;
    use papyrus_test_utils::generators;
    use proptest::prelude::*;

    fn service(store: &InMemoryStore) -> AccountService {
        let identity = StaticIdentityProvider::new()
            .with_code("code-a", "o-a")
            .with_code("code-b", "o-b");
        AccountService::new(Arc::new(store.clone()), Arc::new(identity))
    }

    fn update(openid: &str) -> ProfileUpdate {
        ProfileUpdate {
            openid: openid.to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_login_creates_then_reuses_account() {
        let store = InMemoryStore::new();
        let service = service(&store);

        let first = service.login("code-a").await.unwrap();
        let second = service.login(" code-a ").await.unwrap();

        assert_eq!(first.openid, "o-a");
        assert_eq!(first.account_id, second.account_id);
        assert_eq!(second.session_key.as_deref(), Some("session-code-a"));
    }

    #[tokio::test]
    async fn test_login_errors() {
        let service = service(&InMemoryStore::new());

        let err = service.login("").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);

        let err = service.login("stale").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UpstreamFailure);
    }

    #[tokio::test]
    async fn test_profile_unknown_account() {
        let service = service(&InMemoryStore::new());

        let err = service.get_profile("ghost").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        let err = service.update_profile(&update("ghost")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_update_profile_with_code_links_and_writes_fields() {
        let store = InMemoryStore::new();
        store.activation_code_insert("AB12").await.unwrap();
        let service = service(&store);
        service.login("code-a").await.unwrap();

        let account = service
            .update_profile(&ProfileUpdate {
                nickname: Some("Ann".to_string()),
                realname: Some("Ann Lee".to_string()),
                activate_code: Some("ab12".to_string()),
                ..update("o-a")
            })
            .await
            .unwrap();

        assert_eq!(account.nickname.as_deref(), Some("Ann"));
        assert_eq!(account.realname.as_deref(), Some("Ann Lee"));
        assert_eq!(account.activation_code.as_deref(), Some("AB12"));

        let profile = service.get_profile("o-a").await.unwrap();
        assert_eq!(profile.activate_code, "AB12");
    }

    #[tokio::test]
    async fn test_failed_link_leaves_profile_untouched() {
        let store = InMemoryStore::new();
        let service = service(&store);
        service.login("code-a").await.unwrap();

        let err = service
            .update_profile(&ProfileUpdate {
                nickname: Some("Mallory".to_string()),
                activate_code: Some("ZZZZ".to_string()),
                ..update("o-a")
            })
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        let profile = service.get_profile("o-a").await.unwrap();
        assert_eq!(profile.nickname, "");
        assert_eq!(profile.activate_code, "");
    }

    #[tokio::test]
    async fn test_require_activated() {
        let store = InMemoryStore::new();
        store.activation_code_insert("AB12").await.unwrap();
        let service = service(&store);
        service.login("code-a").await.unwrap();

        let err = service.require_activated("o-a").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);

        let err = service.require_activated("o-none").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        service
            .update_profile(&ProfileUpdate {
                activate_code: Some("AB12".to_string()),
                ..update("o-a")
            })
            .await
            .unwrap();
        let account = service.require_activated("o-a").await.unwrap();
        assert_eq!(account.openid, "o-a");
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn prop_login_then_profile_round_trips(openid in generators::arb_openid()) {
            let rt = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .unwrap();
            let (first, second, profile) = rt.block_on(async {
                let store = InMemoryStore::new();
                let identity = StaticIdentityProvider::new().with_code("js-code", &openid);
                let service = AccountService::new(Arc::new(store), Arc::new(identity));

                let first = service.login("js-code").await.unwrap();
                let second = service.login("js-code").await.unwrap();
                let profile = service.get_profile(&openid).await.unwrap();
                (first, second, profile)
            });

            prop_assert_eq!(first.account_id, second.account_id);
            prop_assert_eq!(&profile.openid, &openid);
            prop_assert!(profile.activate_code.is_empty());
        }
    }
}
