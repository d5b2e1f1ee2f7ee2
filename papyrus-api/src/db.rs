//! Database Connection Pool and Postgres Store
//!
//! PostgreSQL connection pooling with deadpool-postgres, and [`PgStore`], the
//! production implementation of [`papyrus_storage::Store`].
//!
//! Unique constraints live in the schema (`migrations/001_init.sql`); a
//! violated constraint surfaces as [`StorageError::UniqueViolation`] so that
//! callers racing on the same key can tell "lost the race" from "failed".

use async_trait::async_trait;
use deadpool_postgres::{
    Config, ManagerConfig, Pool, PoolConfig, RecyclingMethod, Runtime, Timeouts,
};
use papyrus_core::{
    AccessLog, Account, AccountId, AccountLogin, ActivationCode, ClaimOutcome, EntityType,
    NewPaperAnswer, PaperAnswer, PaperKey, PapyrusError, PapyrusResult, ProfileUpdate,
    StorageError,
};
use papyrus_storage::Store;
use std::time::Duration;
use tokio_postgres::error::SqlState;
use tokio_postgres::{NoTls, Row};
use uuid::Uuid;

use crate::config::{parse_or, required};
use crate::error::{ApiError, ApiResult};

const SCHEMA: &str = include_str!("../migrations/001_init.sql");

// ============================================================================
// CONNECTION POOL CONFIGURATION
// ============================================================================

/// Database connection pool configuration.
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// PostgreSQL host
    pub host: String,
    /// PostgreSQL port
    pub port: u16,
    /// Database name
    pub dbname: String,
    /// Database user
    pub user: String,
    /// Database password
    pub password: String,
    /// Maximum pool size
    pub max_size: usize,
    /// Wait, create and recycle timeout for pooled connections
    pub timeout: Duration,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            dbname: "papyrus".to_string(),
            user: "postgres".to_string(),
            password: "".to_string(),
            max_size: 16,
            timeout: Duration::from_secs(30),
        }
    }
}

impl DbConfig {
    /// Create a new database configuration from environment variables.
    ///
    /// - `PAPYRUS_DB_HOST` (default: localhost)
    /// - `PAPYRUS_DB_PORT` (default: 5432)
    /// - `PAPYRUS_DB_NAME` (default: papyrus)
    /// - `PAPYRUS_DB_USER` (default: postgres)
    /// - `PAPYRUS_DB_PASSWORD` (default: empty)
    /// - `PAPYRUS_DB_POOL_SIZE` (default: 16)
    /// - `PAPYRUS_DB_TIMEOUT` seconds (default: 30)
    pub fn from_env() -> Result<Self, papyrus_core::ConfigError> {
        let defaults = Self::default();
        Ok(Self {
            host: required("PAPYRUS_DB_HOST").unwrap_or(defaults.host),
            port: parse_or("PAPYRUS_DB_PORT", defaults.port)?,
            dbname: required("PAPYRUS_DB_NAME").unwrap_or(defaults.dbname),
            user: required("PAPYRUS_DB_USER").unwrap_or(defaults.user),
            password: std::env::var("PAPYRUS_DB_PASSWORD").unwrap_or_default(),
            max_size: parse_or("PAPYRUS_DB_POOL_SIZE", defaults.max_size)?,
            timeout: Duration::from_secs(parse_or("PAPYRUS_DB_TIMEOUT", 30u64)?),
        })
    }

    /// Create a connection pool from this configuration.
    pub fn create_pool(&self) -> ApiResult<Pool> {
        let mut cfg = Config::new();
        cfg.host = Some(self.host.clone());
        cfg.port = Some(self.port);
        cfg.dbname = Some(self.dbname.clone());
        cfg.user = Some(self.user.clone());
        cfg.password = Some(self.password.clone());

        cfg.manager = Some(ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        });

        let mut pool_cfg = PoolConfig::new(self.max_size);
        pool_cfg.timeouts = Timeouts {
            wait: Some(self.timeout),
            create: Some(self.timeout),
            recycle: Some(self.timeout),
        };
        cfg.pool = Some(pool_cfg);

        let pool = cfg
            .create_pool(Some(Runtime::Tokio1), NoTls)
            .map_err(|e| ApiError::database_error(format!("Failed to create pool: {}", e)))?;

        Ok(pool)
    }
}

// ============================================================================
// ERROR MAPPING
// ============================================================================

fn pool_error(err: deadpool_postgres::PoolError) -> PapyrusError {
    tracing::error!("Connection pool error: {:?}", err);
    StorageError::Unavailable {
        reason: format!("failed to acquire connection: {}", err),
    }
    .into()
}

/// Map a query error, recognising unique violations against `entity_type`.
fn query_error(err: tokio_postgres::Error, entity_type: EntityType, key: &str) -> PapyrusError {
    if let Some(db_error) = err.as_db_error() {
        if db_error.code() == &SqlState::UNIQUE_VIOLATION {
            return StorageError::UniqueViolation {
                entity_type,
                key: key.to_string(),
            }
            .into();
        }
    }
    tracing::error!(%entity_type, key, "Database error: {:?}", err);
    StorageError::TransactionFailed {
        reason: err.to_string(),
    }
    .into()
}

fn decode_error(err: tokio_postgres::Error) -> PapyrusError {
    StorageError::TransactionFailed {
        reason: format!("failed to decode row: {}", err),
    }
    .into()
}

// ============================================================================
// ROW DECODING
// ============================================================================

const ACCOUNT_COLUMNS: &str = "account_id, openid, unionid, session_key, nickname, avatar_url, \
     realname, mobile, activation_code, created_at, updated_at";

fn account_from_row(row: &Row) -> PapyrusResult<Account> {
    Ok(Account {
        account_id: AccountId::new(row.try_get::<_, Uuid>("account_id").map_err(decode_error)?),
        openid: row.try_get("openid").map_err(decode_error)?,
        unionid: row.try_get("unionid").map_err(decode_error)?,
        session_key: row.try_get("session_key").map_err(decode_error)?,
        nickname: row.try_get("nickname").map_err(decode_error)?,
        avatar_url: row.try_get("avatar_url").map_err(decode_error)?,
        realname: row.try_get("realname").map_err(decode_error)?,
        mobile: row.try_get("mobile").map_err(decode_error)?,
        activation_code: row.try_get("activation_code").map_err(decode_error)?,
        created_at: row.try_get("created_at").map_err(decode_error)?,
        updated_at: row.try_get("updated_at").map_err(decode_error)?,
    })
}

fn code_from_row(row: &Row) -> PapyrusResult<ActivationCode> {
    let owner: Option<Uuid> = row.try_get("owner").map_err(decode_error)?;
    Ok(ActivationCode {
        code: row.try_get("code").map_err(decode_error)?,
        owner: owner.map(AccountId::new),
        created_at: row.try_get("created_at").map_err(decode_error)?,
        claimed_at: row.try_get("claimed_at").map_err(decode_error)?,
    })
}

fn paper_from_row(row: &Row) -> PapyrusResult<PaperAnswer> {
    Ok(PaperAnswer {
        school: row.try_get("school").map_err(decode_error)?,
        paper_id: row.try_get("paper_id").map_err(decode_error)?,
        question: row.try_get("question").map_err(decode_error)?,
        answer: row.try_get("answer").map_err(decode_error)?,
        created_at: row.try_get("created_at").map_err(decode_error)?,
    })
}

// ============================================================================
// POSTGRES STORE
// ============================================================================

/// [`Store`] backed by a PostgreSQL connection pool.
#[derive(Clone)]
pub struct PgStore {
    pool: Pool,
}

impl PgStore {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    /// Create tables and indexes if they do not exist yet.
    pub async fn migrate(&self) -> PapyrusResult<()> {
        let client = self.pool.get().await.map_err(pool_error)?;
        client
            .batch_execute(SCHEMA)
            .await
            .map_err(|e| query_error(e, EntityType::Account, "schema"))?;
        tracing::info!("database schema ready");
        Ok(())
    }
}

#[async_trait]
impl Store for PgStore {
    async fn account_get_by_openid(&self, openid: &str) -> PapyrusResult<Option<Account>> {
        let client = self.pool.get().await.map_err(pool_error)?;
        let sql = format!("SELECT {} FROM accounts WHERE openid = $1", ACCOUNT_COLUMNS);
        let row = client
            .query_opt(sql.as_str(), &[&openid])
            .await
            .map_err(|e| query_error(e, EntityType::Account, openid))?;
        row.as_ref().map(account_from_row).transpose()
    }

    async fn account_upsert_login(&self, login: &AccountLogin) -> PapyrusResult<Account> {
        let client = self.pool.get().await.map_err(pool_error)?;
        let sql = format!(
            "INSERT INTO accounts (account_id, openid, unionid, session_key) \
             VALUES ($1, $2, $3, $4) \
             ON CONFLICT (openid) DO UPDATE \
             SET session_key = EXCLUDED.session_key, \
                 unionid = EXCLUDED.unionid, \
                 updated_at = now() \
             RETURNING {}",
            ACCOUNT_COLUMNS
        );
        let row = client
            .query_one(
                sql.as_str(),
                &[
                    &AccountId::now_v7().as_uuid(),
                    &login.openid,
                    &login.unionid,
                    &login.session_key,
                ],
            )
            .await
            .map_err(|e| query_error(e, EntityType::Account, &login.openid))?;
        account_from_row(&row)
    }

    async fn account_update_profile(
        &self,
        update: &ProfileUpdate,
    ) -> PapyrusResult<Option<Account>> {
        let client = self.pool.get().await.map_err(pool_error)?;
        // COALESCE keeps the stored value when the update carries nothing.
        let sql = format!(
            "UPDATE accounts \
             SET nickname = COALESCE($2, nickname), \
                 avatar_url = COALESCE($3, avatar_url), \
                 realname = COALESCE($4, realname), \
                 updated_at = now() \
             WHERE openid = $1 \
             RETURNING {}",
            ACCOUNT_COLUMNS
        );
        let row = client
            .query_opt(
                sql.as_str(),
                &[
                    &update.openid,
                    &ProfileUpdate::non_empty(&update.nickname),
                    &ProfileUpdate::non_empty(&update.avatar_url),
                    &ProfileUpdate::non_empty(&update.realname),
                ],
            )
            .await
            .map_err(|e| query_error(e, EntityType::Account, &update.openid))?;
        row.as_ref().map(account_from_row).transpose()
    }

    async fn activation_code_get(&self, code: &str) -> PapyrusResult<Option<ActivationCode>> {
        let client = self.pool.get().await.map_err(pool_error)?;
        let row = client
            .query_opt(
                "SELECT code, owner, created_at, claimed_at FROM activation_codes WHERE code = $1",
                &[&code],
            )
            .await
            .map_err(|e| query_error(e, EntityType::ActivationCode, code))?;
        row.as_ref().map(code_from_row).transpose()
    }

    async fn activation_code_insert(&self, code: &str) -> PapyrusResult<ActivationCode> {
        let client = self.pool.get().await.map_err(pool_error)?;
        let row = client
            .query_one(
                "INSERT INTO activation_codes (code) VALUES ($1) \
                 RETURNING code, owner, created_at, claimed_at",
                &[&code],
            )
            .await
            .map_err(|e| query_error(e, EntityType::ActivationCode, code))?;
        code_from_row(&row)
    }

    async fn activation_code_find_by_owner(
        &self,
        owner: AccountId,
    ) -> PapyrusResult<Option<ActivationCode>> {
        let client = self.pool.get().await.map_err(pool_error)?;
        let row = client
            .query_opt(
                "SELECT code, owner, created_at, claimed_at FROM activation_codes \
                 WHERE owner = $1 LIMIT 1",
                &[&owner.as_uuid()],
            )
            .await
            .map_err(|e| query_error(e, EntityType::ActivationCode, &owner.to_string()))?;
        row.as_ref().map(code_from_row).transpose()
    }

    async fn activation_code_claim(
        &self,
        code: &str,
        account_id: AccountId,
    ) -> PapyrusResult<ClaimOutcome> {
        let mut client = self.pool.get().await.map_err(pool_error)?;
        let tx = client
            .transaction()
            .await
            .map_err(|e| query_error(e, EntityType::ActivationCode, code))?;

        // Lock order is always code row, then account row.
        let code_row = tx
            .query_opt(
                "SELECT owner FROM activation_codes WHERE code = $1 FOR UPDATE",
                &[&code],
            )
            .await
            .map_err(|e| query_error(e, EntityType::ActivationCode, code))?
            .ok_or_else(|| StorageError::NotFound {
                entity_type: EntityType::ActivationCode,
                key: code.to_string(),
            })?;
        let account_row = tx
            .query_opt(
                "SELECT activation_code FROM accounts WHERE account_id = $1 FOR UPDATE",
                &[&account_id.as_uuid()],
            )
            .await
            .map_err(|e| query_error(e, EntityType::Account, &account_id.to_string()))?
            .ok_or_else(|| StorageError::NotFound {
                entity_type: EntityType::Account,
                key: account_id.to_string(),
            })?;

        let owner: Option<Uuid> = code_row.try_get("owner").map_err(decode_error)?;
        if let Some(owner) = owner {
            // Dropping the transaction rolls it back and releases the locks.
            return Ok(ClaimOutcome::AlreadyOwned {
                owner: AccountId::new(owner),
            });
        }
        let bound: Option<String> = account_row
            .try_get("activation_code")
            .map_err(decode_error)?;
        if let Some(bound_code) = bound.filter(|b| b != code) {
            return Ok(ClaimOutcome::AccountBound { bound_code });
        }

        let claimed = tx
            .query_one(
                "UPDATE activation_codes SET owner = $2, claimed_at = now() \
                 WHERE code = $1 \
                 RETURNING code, owner, created_at, claimed_at",
                &[&code, &account_id.as_uuid()],
            )
            .await
            .map_err(|e| query_error(e, EntityType::ActivationCode, code))?;
        tx.execute(
            "UPDATE accounts SET activation_code = $2, updated_at = now() WHERE account_id = $1",
            &[&account_id.as_uuid(), &code],
        )
        .await
        .map_err(|e| query_error(e, EntityType::Account, &account_id.to_string()))?;

        tx.commit()
            .await
            .map_err(|e| query_error(e, EntityType::ActivationCode, code))?;

        Ok(ClaimOutcome::Claimed(code_from_row(&claimed)?))
    }

    async fn paper_answer_get(&self, key: PaperKey) -> PapyrusResult<Option<PaperAnswer>> {
        let client = self.pool.get().await.map_err(pool_error)?;
        let row = client
            .query_opt(
                "SELECT school, paper_id, question, answer, created_at FROM paper_answers \
                 WHERE school = $1 AND paper_id = $2",
                &[&key.school(), &key.paper()],
            )
            .await
            .map_err(|e| query_error(e, EntityType::PaperAnswer, &key.to_string()))?;
        row.as_ref().map(paper_from_row).transpose()
    }

    async fn paper_answer_insert(&self, answer: &NewPaperAnswer) -> PapyrusResult<PaperAnswer> {
        let client = self.pool.get().await.map_err(pool_error)?;
        let key = answer.key;
        let row = client
            .query_one(
                "INSERT INTO paper_answers (school, paper_id, question, answer) \
                 VALUES ($1, $2, $3, $4) \
                 RETURNING school, paper_id, question, answer, created_at",
                &[&key.school(), &key.paper(), &answer.question, &answer.answer],
            )
            .await
            .map_err(|e| query_error(e, EntityType::PaperAnswer, &key.to_string()))?;
        paper_from_row(&row)
    }

    async fn access_log_append(&self, log: &AccessLog) -> PapyrusResult<()> {
        let client = self.pool.get().await.map_err(pool_error)?;
        client
            .execute(
                "INSERT INTO access_logs (log_id, account_id, action, detail, created_at) \
                 VALUES ($1, $2, $3, $4, $5)",
                &[
                    &log.log_id,
                    &log.account_id.as_uuid(),
                    &log.action,
                    &log.detail,
                    &log.created_at,
                ],
            )
            .await
            .map_err(|e| query_error(e, EntityType::AccessLog, &log.log_id.to_string()))?;
        Ok(())
    }

    async fn ping(&self) -> PapyrusResult<()> {
        let client = self.pool.get().await.map_err(pool_error)?;
        client
            .simple_query("SELECT 1")
            .await
            .map_err(|e| query_error(e, EntityType::Account, "ping"))?;
        Ok(())
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_db_config_defaults() {
        let config = DbConfig::default();
        assert_eq!(config.port, 5432);
        assert_eq!(config.dbname, "papyrus");
        assert_eq!(config.max_size, 16);
        assert_eq!(config.timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_schema_declares_unique_constraints() {
        assert!(SCHEMA.contains("openid          TEXT NOT NULL UNIQUE"));
        assert!(SCHEMA.contains("mobile          TEXT UNIQUE"));
        assert!(SCHEMA.contains("activation_code TEXT UNIQUE"));
        assert!(SCHEMA.contains("code       TEXT PRIMARY KEY"));
        assert!(SCHEMA.contains("UNIQUE (school, paper_id)"));
    }

    #[tokio::test]
    async fn test_create_pool_is_lazy() {
        // No connection is attempted until the first checkout.
        let pool = DbConfig::default().create_pool();
        assert!(pool.is_ok());
    }
}
