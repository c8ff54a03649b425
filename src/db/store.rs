/// Account storage capability and its SQLite implementation
use crate::{
    db::account::{Account, Gender},
    error::{ApiError, ApiResult},
};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};
use uuid::Uuid;

/// Credential store
///
/// Exclusive owner of persisted account state. Every method is atomic for
/// the single record it touches.
#[async_trait]
pub trait AccountStore: Send + Sync {
    /// Find an account by login, whatever its lifecycle state
    async fn find_by_login(&self, login: &str) -> ApiResult<Option<Account>>;

    /// Insert a new account; fails with `DuplicateLogin` when the login is taken
    async fn insert(&self, account: &Account) -> ApiResult<()>;

    /// Persist an in-place mutation of an existing account
    async fn save(&self, account: &Account) -> ApiResult<()>;

    /// Permanently delete an account
    async fn remove(&self, account: &Account) -> ApiResult<()>;

    /// Active accounts ordered by creation time
    async fn list_active(&self) -> ApiResult<Vec<Account>>;

    /// Active accounts with a birthday on or before `cutoff`
    async fn list_active_born_on_or_before(&self, cutoff: NaiveDate) -> ApiResult<Vec<Account>>;

    /// Number of stored accounts in any state
    async fn count(&self) -> ApiResult<i64>;
}

const ACCOUNT_COLUMNS: &str = "id, login, password_hash, name, gender, birthday, admin, \
     created_on, created_by, modified_on, modified_by, revoked_on, revoked_by";

/// SQLite-backed account store
#[derive(Clone)]
pub struct SqliteAccountStore {
    db: SqlitePool,
}

impl SqliteAccountStore {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    fn account_from_row(row: &SqliteRow) -> ApiResult<Account> {
        let id: String = row.try_get("id")?;
        let id = Uuid::parse_str(&id)
            .map_err(|e| ApiError::Internal(format!("Corrupt account id '{}': {}", id, e)))?;
        let gender: i64 = row.try_get("gender")?;
        let gender = Gender::try_from(gender).map_err(ApiError::Internal)?;

        Ok(Account {
            id,
            login: row.try_get("login")?,
            password_hash: row.try_get("password_hash")?,
            name: row.try_get("name")?,
            gender,
            birthday: row.try_get::<Option<NaiveDate>, _>("birthday")?,
            admin: row.try_get("admin")?,
            created_on: row.try_get::<DateTime<Utc>, _>("created_on")?,
            created_by: row.try_get("created_by")?,
            modified_on: row.try_get::<DateTime<Utc>, _>("modified_on")?,
            modified_by: row.try_get("modified_by")?,
            revoked_on: row.try_get::<Option<DateTime<Utc>>, _>("revoked_on")?,
            revoked_by: row.try_get("revoked_by")?,
        })
    }
}

/// The login uniqueness constraint is the authoritative duplicate check;
/// concurrent writers that both passed the pre-check land here.
fn map_write_error(err: sqlx::Error, login: &str) -> ApiError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.is_unique_violation() && db_err.message().contains("login") {
            return ApiError::DuplicateLogin(login.to_string());
        }
    }
    ApiError::Store(err)
}

#[async_trait]
impl AccountStore for SqliteAccountStore {
    async fn find_by_login(&self, login: &str) -> ApiResult<Option<Account>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM users WHERE login = ?1",
            ACCOUNT_COLUMNS
        ))
        .bind(login)
        .fetch_optional(&self.db)
        .await?;

        row.as_ref().map(Self::account_from_row).transpose()
    }

    async fn insert(&self, account: &Account) -> ApiResult<()> {
        sqlx::query(
            "INSERT INTO users (id, login, password_hash, name, gender, birthday, admin,
                                created_on, created_by, modified_on, modified_by, revoked_on, revoked_by)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
        )
        .bind(account.id.to_string())
        .bind(&account.login)
        .bind(&account.password_hash)
        .bind(&account.name)
        .bind(i64::from(account.gender))
        .bind(account.birthday)
        .bind(account.admin)
        .bind(account.created_on)
        .bind(&account.created_by)
        .bind(account.modified_on)
        .bind(&account.modified_by)
        .bind(account.revoked_on)
        .bind(&account.revoked_by)
        .execute(&self.db)
        .await
        .map_err(|e| map_write_error(e, &account.login))?;

        Ok(())
    }

    async fn save(&self, account: &Account) -> ApiResult<()> {
        let result = sqlx::query(
            "UPDATE users
             SET login = ?1, password_hash = ?2, name = ?3, gender = ?4, birthday = ?5,
                 admin = ?6, modified_on = ?7, modified_by = ?8, revoked_on = ?9, revoked_by = ?10
             WHERE id = ?11",
        )
        .bind(&account.login)
        .bind(&account.password_hash)
        .bind(&account.name)
        .bind(i64::from(account.gender))
        .bind(account.birthday)
        .bind(account.admin)
        .bind(account.modified_on)
        .bind(&account.modified_by)
        .bind(account.revoked_on)
        .bind(&account.revoked_by)
        .bind(account.id.to_string())
        .execute(&self.db)
        .await
        .map_err(|e| map_write_error(e, &account.login))?;

        if result.rows_affected() == 0 {
            return Err(ApiError::NotFound);
        }

        Ok(())
    }

    async fn remove(&self, account: &Account) -> ApiResult<()> {
        let result = sqlx::query("DELETE FROM users WHERE id = ?1")
            .bind(account.id.to_string())
            .execute(&self.db)
            .await?;

        if result.rows_affected() == 0 {
            return Err(ApiError::NotFound);
        }

        Ok(())
    }

    async fn list_active(&self) -> ApiResult<Vec<Account>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM users WHERE revoked_on IS NULL ORDER BY created_on, login",
            ACCOUNT_COLUMNS
        ))
        .fetch_all(&self.db)
        .await?;

        rows.iter().map(Self::account_from_row).collect()
    }

    async fn list_active_born_on_or_before(&self, cutoff: NaiveDate) -> ApiResult<Vec<Account>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM users
             WHERE revoked_on IS NULL AND birthday IS NOT NULL AND birthday <= ?1
             ORDER BY created_on, login",
            ACCOUNT_COLUMNS
        ))
        .bind(cutoff)
        .fetch_all(&self.db)
        .await?;

        rows.iter().map(Self::account_from_row).collect()
    }

    async fn count(&self) -> ApiResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
            .fetch_one(&self.db)
            .await?;
        Ok(count)
    }
}
