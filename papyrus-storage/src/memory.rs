//! In-memory [`Store`] implementation.
//!
//! All tables sit behind one lock, so every method observes and mutates a
//! consistent snapshot. That single lock is what makes
//! [`Store::activation_code_claim`] a linearizable compare-and-set here.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use papyrus_core::{
    AccessLog, Account, AccountId, AccountLogin, ActivationCode, ClaimOutcome, EntityType,
    NewPaperAnswer, PaperAnswer, PaperKey, PapyrusError, PapyrusResult, ProfileUpdate,
    StorageError,
};

use crate::Store;

#[derive(Debug, Default)]
struct Tables {
    accounts: HashMap<AccountId, Account>,
    openid_index: HashMap<String, AccountId>,
    codes: HashMap<String, ActivationCode>,
    papers: HashMap<PaperKey, PaperAnswer>,
    access_logs: Vec<AccessLog>,
}

/// Thread-safe in-memory store. Cloning shares the underlying tables.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    tables: Arc<RwLock<Tables>>,
    fail_access_log: Arc<AtomicBool>,
    access_log_delay_ms: Arc<AtomicU64>,
    fail_ping: Arc<AtomicBool>,
}

impl InMemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent access-log append fail (or succeed again).
    pub fn set_access_log_failing(&self, failing: bool) {
        self.fail_access_log.store(failing, Ordering::SeqCst);
    }

    /// Make `ping` report the store as unreachable (or reachable again).
    pub fn set_ping_failing(&self, failing: bool) {
        self.fail_ping.store(failing, Ordering::SeqCst);
    }

    /// Sleep this long inside every access-log append.
    pub fn set_access_log_delay(&self, delay: Duration) {
        let millis = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        self.access_log_delay_ms.store(millis, Ordering::SeqCst);
    }

    pub fn paper_answer_count(&self) -> usize {
        self.read().map(|t| t.papers.len()).unwrap_or_default()
    }

    pub fn activation_code_count(&self) -> usize {
        self.read().map(|t| t.codes.len()).unwrap_or_default()
    }

    pub fn access_logs(&self) -> Vec<AccessLog> {
        self.read()
            .map(|t| t.access_logs.clone())
            .unwrap_or_default()
    }

    fn read(&self) -> PapyrusResult<RwLockReadGuard<'_, Tables>> {
        self.tables
            .read()
            .map_err(|_| PapyrusError::Storage(StorageError::LockPoisoned))
    }

    fn write(&self) -> PapyrusResult<RwLockWriteGuard<'_, Tables>> {
        self.tables
            .write()
            .map_err(|_| PapyrusError::Storage(StorageError::LockPoisoned))
    }
}

fn not_found(entity_type: EntityType, key: impl Into<String>) -> PapyrusError {
    PapyrusError::Storage(StorageError::NotFound {
        entity_type,
        key: key.into(),
    })
}

fn unique_violation(entity_type: EntityType, key: impl Into<String>) -> PapyrusError {
    PapyrusError::Storage(StorageError::UniqueViolation {
        entity_type,
        key: key.into(),
    })
}

#[async_trait]
impl Store for InMemoryStore {
    async fn account_get_by_openid(&self, openid: &str) -> PapyrusResult<Option<Account>> {
        let tables = self.read()?;
        Ok(tables
            .openid_index
            .get(openid)
            .and_then(|id| tables.accounts.get(id))
            .cloned())
    }

    async fn account_upsert_login(&self, login: &AccountLogin) -> PapyrusResult<Account> {
        let mut tables = self.write()?;
        let now = Utc::now();

        if let Some(id) = tables.openid_index.get(&login.openid).copied() {
            let account = tables
                .accounts
                .get_mut(&id)
                .ok_or_else(|| not_found(EntityType::Account, login.openid.clone()))?;
            account.session_key = Some(login.session_key.clone());
            account.unionid = login.unionid.clone();
            account.updated_at = now;
            return Ok(account.clone());
        }

        let account = Account {
            account_id: AccountId::now_v7(),
            openid: login.openid.clone(),
            unionid: login.unionid.clone(),
            session_key: Some(login.session_key.clone()),
            nickname: None,
            avatar_url: None,
            realname: None,
            mobile: None,
            activation_code: None,
            created_at: now,
            updated_at: now,
        };
        tables
            .openid_index
            .insert(account.openid.clone(), account.account_id);
        tables.accounts.insert(account.account_id, account.clone());
        Ok(account)
    }

    async fn account_update_profile(
        &self,
        update: &ProfileUpdate,
    ) -> PapyrusResult<Option<Account>> {
        let mut tables = self.write()?;
        let Some(id) = tables.openid_index.get(&update.openid).copied() else {
            return Ok(None);
        };
        let Some(account) = tables.accounts.get_mut(&id) else {
            return Ok(None);
        };

        if let Some(nickname) = ProfileUpdate::non_empty(&update.nickname) {
            account.nickname = Some(nickname.to_string());
        }
        if let Some(avatar_url) = ProfileUpdate::non_empty(&update.avatar_url) {
            account.avatar_url = Some(avatar_url.to_string());
        }
        if let Some(realname) = ProfileUpdate::non_empty(&update.realname) {
            account.realname = Some(realname.to_string());
        }
        account.updated_at = Utc::now();
        Ok(Some(account.clone()))
    }

    async fn activation_code_get(&self, code: &str) -> PapyrusResult<Option<ActivationCode>> {
        Ok(self.read()?.codes.get(code).cloned())
    }

    async fn activation_code_insert(&self, code: &str) -> PapyrusResult<ActivationCode> {
        let mut tables = self.write()?;
        if tables.codes.contains_key(code) {
            return Err(unique_violation(EntityType::ActivationCode, code));
        }
        let row = ActivationCode::unowned(code, Utc::now());
        tables.codes.insert(code.to_string(), row.clone());
        Ok(row)
    }

    async fn activation_code_find_by_owner(
        &self,
        owner: AccountId,
    ) -> PapyrusResult<Option<ActivationCode>> {
        Ok(self
            .read()?
            .codes
            .values()
            .find(|c| c.owner == Some(owner))
            .cloned())
    }

    async fn activation_code_claim(
        &self,
        code: &str,
        account_id: AccountId,
    ) -> PapyrusResult<ClaimOutcome> {
        let mut tables = self.write()?;
        let tables = &mut *tables;

        let account = tables
            .accounts
            .get_mut(&account_id)
            .ok_or_else(|| not_found(EntityType::Account, account_id.to_string()))?;
        let row = tables
            .codes
            .get_mut(code)
            .ok_or_else(|| not_found(EntityType::ActivationCode, code))?;

        if let Some(owner) = row.owner {
            return Ok(ClaimOutcome::AlreadyOwned { owner });
        }
        if let Some(bound) = account.activation_code.as_ref().filter(|b| *b != code) {
            return Ok(ClaimOutcome::AccountBound {
                bound_code: bound.clone(),
            });
        }

        let now = Utc::now();
        row.owner = Some(account_id);
        row.claimed_at = Some(now);
        account.activation_code = Some(code.to_string());
        account.updated_at = now;
        Ok(ClaimOutcome::Claimed(row.clone()))
    }

    async fn paper_answer_get(&self, key: PaperKey) -> PapyrusResult<Option<PaperAnswer>> {
        Ok(self.read()?.papers.get(&key).cloned())
    }

    async fn paper_answer_insert(&self, answer: &NewPaperAnswer) -> PapyrusResult<PaperAnswer> {
        let mut tables = self.write()?;
        if tables.papers.contains_key(&answer.key) {
            return Err(unique_violation(
                EntityType::PaperAnswer,
                answer.key.to_string(),
            ));
        }
        let row = PaperAnswer {
            school: answer.key.school(),
            paper_id: answer.key.paper(),
            question: answer.question.clone(),
            answer: answer.answer.clone(),
            created_at: Utc::now(),
        };
        tables.papers.insert(answer.key, row.clone());
        Ok(row)
    }

    async fn access_log_append(&self, log: &AccessLog) -> PapyrusResult<()> {
        let delay_ms = self.access_log_delay_ms.load(Ordering::SeqCst);
        if delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
        }
        if self.fail_access_log.load(Ordering::SeqCst) {
            return Err(PapyrusError::Storage(StorageError::Unavailable {
                reason: "access log table unavailable".to_string(),
            }));
        }
        self.write()?.access_logs.push(log.clone());
        Ok(())
    }

    async fn ping(&self) -> PapyrusResult<()> {
        if self.fail_ping.load(Ordering::SeqCst) {
            return Err(PapyrusError::Storage(StorageError::Unavailable {
                reason: "connection refused by 10.0.0.5:5432".to_string(),
            }));
        }
        self.read().map(|_| ())
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use papyrus_core::ErrorKind;

    fn login(openid: &str) -> AccountLogin {
        AccountLogin {
            openid: openid.to_string(),
            unionid: Some(format!("union-{}", openid)),
            session_key: "sk-1".to_string(),
        }
    }

    #[tokio::test]
    async fn test_upsert_creates_then_refreshes() {
        let store = InMemoryStore::new();
        let created = store.account_upsert_login(&login("o-1")).await.unwrap();

        let refreshed = store
            .account_upsert_login(&AccountLogin {
                session_key: "sk-2".to_string(),
                ..login("o-1")
            })
            .await
            .unwrap();

        assert_eq!(created.account_id, refreshed.account_id);
        assert_eq!(refreshed.session_key.as_deref(), Some("sk-2"));
    }

    #[tokio::test]
    async fn test_profile_update_skips_empty_fields() {
        let store = InMemoryStore::new();
        store.account_upsert_login(&login("o-1")).await.unwrap();

        let first = ProfileUpdate {
            openid: "o-1".to_string(),
            nickname: Some("Ann".to_string()),
            avatar_url: Some("https://img/a.png".to_string()),
            ..Default::default()
        };
        store.account_update_profile(&first).await.unwrap();

        let second = ProfileUpdate {
            openid: "o-1".to_string(),
            nickname: Some(String::new()),
            realname: Some("Ann Lee".to_string()),
            ..Default::default()
        };
        let account = store.account_update_profile(&second).await.unwrap().unwrap();

        assert_eq!(account.nickname.as_deref(), Some("Ann"));
        assert_eq!(account.avatar_url.as_deref(), Some("https://img/a.png"));
        assert_eq!(account.realname.as_deref(), Some("Ann Lee"));
    }

    #[tokio::test]
    async fn test_profile_update_unknown_account() {
        let store = InMemoryStore::new();
        let update = ProfileUpdate {
            openid: "missing".to_string(),
            ..Default::default()
        };
        assert!(store.account_update_profile(&update).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_code_insert_is_unique() {
        let store = InMemoryStore::new();
        store.activation_code_insert("AB12").await.unwrap();
        let err = store.activation_code_insert("AB12").await.unwrap_err();
        assert!(matches!(
            err,
            PapyrusError::Storage(StorageError::UniqueViolation { .. })
        ));
        assert_eq!(store.activation_code_count(), 1);
    }

    #[tokio::test]
    async fn test_claim_binds_both_rows() {
        let store = InMemoryStore::new();
        let account = store.account_upsert_login(&login("o-1")).await.unwrap();
        store.activation_code_insert("AB12").await.unwrap();

        let outcome = store
            .activation_code_claim("AB12", account.account_id)
            .await
            .unwrap();
        assert!(matches!(outcome, ClaimOutcome::Claimed(ref c) if c.owner == Some(account.account_id)));

        let reloaded = store.account_get_by_openid("o-1").await.unwrap().unwrap();
        assert_eq!(reloaded.activation_code.as_deref(), Some("AB12"));
        let owned = store
            .activation_code_find_by_owner(account.account_id)
            .await
            .unwrap();
        assert_eq!(owned.map(|c| c.code), Some("AB12".to_string()));
    }

    #[tokio::test]
    async fn test_claim_reports_existing_owner() {
        let store = InMemoryStore::new();
        let a = store.account_upsert_login(&login("o-a")).await.unwrap();
        let b = store.account_upsert_login(&login("o-b")).await.unwrap();
        store.activation_code_insert("AB12").await.unwrap();

        store.activation_code_claim("AB12", a.account_id).await.unwrap();
        let outcome = store.activation_code_claim("AB12", b.account_id).await.unwrap();

        assert_eq!(
            outcome,
            ClaimOutcome::AlreadyOwned {
                owner: a.account_id
            }
        );
        let b_reloaded = store.account_get_by_openid("o-b").await.unwrap().unwrap();
        assert!(b_reloaded.activation_code.is_none());
    }

    #[tokio::test]
    async fn test_claim_refuses_second_code_for_account() {
        let store = InMemoryStore::new();
        let a = store.account_upsert_login(&login("o-a")).await.unwrap();
        store.activation_code_insert("AB12").await.unwrap();
        store.activation_code_insert("CD34").await.unwrap();

        store.activation_code_claim("AB12", a.account_id).await.unwrap();
        let outcome = store.activation_code_claim("CD34", a.account_id).await.unwrap();

        assert_eq!(
            outcome,
            ClaimOutcome::AccountBound {
                bound_code: "AB12".to_string()
            }
        );
        let cd34 = store.activation_code_get("CD34").await.unwrap().unwrap();
        assert!(cd34.owner.is_none());
    }

    #[tokio::test]
    async fn test_claim_missing_rows() {
        let store = InMemoryStore::new();
        let a = store.account_upsert_login(&login("o-a")).await.unwrap();
        let err = store.activation_code_claim("ZZZZ", a.account_id).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_paper_insert_never_overwrites() {
        let store = InMemoryStore::new();
        let key = PaperKey::new(7, 101).unwrap();
        let first = NewPaperAnswer {
            key,
            question: "q1".to_string(),
            answer: "a1".to_string(),
        };
        store.paper_answer_insert(&first).await.unwrap();

        let second = NewPaperAnswer {
            answer: "a2".to_string(),
            ..first.clone()
        };
        let err = store.paper_answer_insert(&second).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);

        let stored = store.paper_answer_get(key).await.unwrap().unwrap();
        assert_eq!(stored.answer, "a1");
    }

    #[tokio::test]
    async fn test_access_log_failure_toggle() {
        let store = InMemoryStore::new();
        let log = AccessLog::paper_lookup(AccountId::now_v7(), PaperKey::new(1, 1).unwrap());

        store.set_access_log_failing(true);
        assert!(store.access_log_append(&log).await.is_err());

        store.set_access_log_failing(false);
        store.access_log_append(&log).await.unwrap();
        assert_eq!(store.access_logs().len(), 1);
    }
}
