/// Account rows and the account store
///
/// All writes touching the refresh-token pointer are single-row statements.
/// Rotation goes through `replace_refresh_token`, which only succeeds while
/// the stored value still equals the one the caller read.
use crate::{
    admin::Role,
    error::{AppError, AppResult, ErrorCode},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};
use uuid::Uuid;

const ACCOUNT_COLUMNS: &str = "id, email, name, password_hash, role, active, deleted, \
     activated_at, refresh_token, created_by, created_at, updated_at";

/// Account record in the database
#[derive(Debug, Clone)]
pub struct Account {
    pub id: String,
    pub email: String,
    pub name: String,
    pub password_hash: Option<String>,
    pub role: Role,
    pub active: bool,
    pub deleted: bool,
    /// First successful activation; distinguishes deactivated from never activated
    pub activated_at: Option<DateTime<Utc>>,
    pub refresh_token: Option<String>,
    pub created_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Account {
    pub fn has_password(&self) -> bool {
        self.password_hash.is_some()
    }
}

/// Fields supplied when inserting an account
#[derive(Debug, Clone)]
pub struct NewAccount {
    pub email: String,
    pub name: String,
    pub password_hash: Option<String>,
    pub role: Role,
    /// Accounts from an external identity provider start active
    pub active: bool,
    pub created_by: Option<String>,
}

/// Short reference to the account that provisioned another
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatorSummary {
    pub id: String,
    pub name: String,
    pub email: String,
}

/// Admin listing row
#[derive(Debug, Clone)]
pub struct AccountListing {
    pub account: Account,
    pub creator: Option<CreatorSummary>,
}

/// Filter for the admin user listing
#[derive(Debug, Clone)]
pub struct AccountFilter {
    pub name: String,
    pub role: Role,
    pub page: i64,
    pub items_per_page: i64,
}

impl Default for AccountFilter {
    fn default() -> Self {
        Self {
            name: String::new(),
            role: Role::Client,
            page: 1,
            items_per_page: 10,
        }
    }
}

impl AccountFilter {
    pub fn offset(&self) -> i64 {
        (self.page.max(1) - 1) * self.items_per_page
    }
}

/// Lowercased, trimmed email used for storage and lookup
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn account_from_row(row: &SqliteRow) -> AppResult<Account> {
    let role: String = row.try_get("role")?;

    Ok(Account {
        id: row.try_get("id")?,
        email: row.try_get("email")?,
        name: row.try_get("name")?,
        password_hash: row.try_get("password_hash")?,
        role: role.parse()?,
        active: row.try_get("active")?,
        deleted: row.try_get("deleted")?,
        activated_at: row.try_get("activated_at")?,
        refresh_token: row.try_get("refresh_token")?,
        created_by: row.try_get("created_by")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}

/// Typed access to the `account` table
#[derive(Clone)]
pub struct AccountStore {
    db: SqlitePool,
}

impl AccountStore {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.db
    }

    async fn fetch_one_where(&self, clause: &str, value: &str) -> AppResult<Option<Account>> {
        let sql = format!("SELECT {} FROM account WHERE {} = ?1", ACCOUNT_COLUMNS, clause);
        let row = sqlx::query(&sql)
            .bind(value)
            .fetch_optional(&self.db)
            .await?;

        row.as_ref().map(account_from_row).transpose()
    }

    pub async fn find_by_id(&self, id: &str) -> AppResult<Option<Account>> {
        self.fetch_one_where("id", id).await
    }

    pub async fn find_by_email(&self, email: &str) -> AppResult<Option<Account>> {
        self.fetch_one_where("email", &normalize_email(email)).await
    }

    /// Account whose current refresh pointer equals `token`
    pub async fn find_by_refresh_token(&self, token: &str) -> AppResult<Option<Account>> {
        self.fetch_one_where("refresh_token", token).await
    }

    /// Insert an unbounded-role account
    pub async fn insert(&self, new: NewAccount) -> AppResult<Account> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now();
        let email = normalize_email(&new.email);
        let activated_at = new.active.then_some(now);

        sqlx::query(
            "INSERT INTO account (id, email, name, password_hash, role, active, deleted,
                                  activated_at, created_by, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0, ?7, ?8, ?9, ?10)",
        )
        .bind(&id)
        .bind(&email)
        .bind(&new.name)
        .bind(&new.password_hash)
        .bind(new.role.as_str())
        .bind(new.active)
        .bind(activated_at)
        .bind(&new.created_by)
        .bind(now)
        .bind(now)
        .execute(&self.db)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                AppError::conflict(ErrorCode::EmailInUse, "Email exist already in use")
            } else {
                AppError::Database(e)
            }
        })?;

        self.find_by_id(&id)
            .await?
            .ok_or_else(|| AppError::Internal("Inserted account vanished".to_string()))
    }

    /// Insert an account only while fewer than `ceiling` non-deleted accounts
    /// hold its role. The count and the insert are one statement, so two
    /// concurrent creations cannot both slip under the ceiling.
    ///
    /// Returns `None` when the quota is full.
    pub async fn insert_within_quota(
        &self,
        new: NewAccount,
        ceiling: i64,
    ) -> AppResult<Option<Account>> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now();
        let email = normalize_email(&new.email);
        let activated_at = new.active.then_some(now);

        let result = sqlx::query(
            "INSERT INTO account (id, email, name, password_hash, role, active, deleted,
                                  activated_at, created_by, created_at, updated_at)
             SELECT ?1, ?2, ?3, ?4, ?5, ?6, 0, ?7, ?8, ?9, ?10
             WHERE (SELECT COUNT(*) FROM account WHERE role = ?11 AND deleted = 0) < ?12",
        )
        .bind(&id)
        .bind(&email)
        .bind(&new.name)
        .bind(&new.password_hash)
        .bind(new.role.as_str())
        .bind(new.active)
        .bind(activated_at)
        .bind(&new.created_by)
        .bind(now)
        .bind(now)
        .bind(new.role.as_str())
        .bind(ceiling)
        .execute(&self.db)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                AppError::conflict(ErrorCode::EmailInUse, "Email exist already in use")
            } else {
                AppError::Database(e)
            }
        })?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }

        self.find_by_id(&id).await
    }

    /// Count non-deleted accounts holding `role`
    pub async fn count_live_by_role(&self, role: Role) -> AppResult<i64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM account WHERE role = ?1 AND deleted = 0")
                .bind(role.as_str())
                .fetch_one(&self.db)
                .await?;

        Ok(count)
    }

    /// Unconditionally overwrite the refresh pointer
    pub async fn set_refresh_token(&self, id: &str, token: &str) -> AppResult<bool> {
        let result =
            sqlx::query("UPDATE account SET refresh_token = ?1, updated_at = ?2 WHERE id = ?3")
                .bind(token)
                .bind(Utc::now())
                .bind(id)
                .execute(&self.db)
                .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Swap the refresh pointer from `expected` to `replacement`.
    ///
    /// Returns `false` when the stored value no longer equals `expected`,
    /// meaning another request rotated or revoked it first.
    pub async fn replace_refresh_token(
        &self,
        id: &str,
        expected: &str,
        replacement: &str,
    ) -> AppResult<bool> {
        let result = sqlx::query(
            "UPDATE account SET refresh_token = ?1, updated_at = ?2
             WHERE id = ?3 AND refresh_token = ?4",
        )
        .bind(replacement)
        .bind(Utc::now())
        .bind(id)
        .bind(expected)
        .execute(&self.db)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Drop the refresh pointer, ending the account's session
    pub async fn clear_refresh_token(&self, id: &str) -> AppResult<bool> {
        let result =
            sqlx::query("UPDATE account SET refresh_token = NULL, updated_at = ?1 WHERE id = ?2")
                .bind(Utc::now())
                .bind(id)
                .execute(&self.db)
                .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Mark active; the first activation timestamp is kept
    pub async fn activate(&self, id: &str) -> AppResult<bool> {
        let now = Utc::now();
        let result = sqlx::query(
            "UPDATE account SET active = 1, activated_at = COALESCE(activated_at, ?1), updated_at = ?2
             WHERE id = ?3",
        )
        .bind(now)
        .bind(now)
        .bind(id)
        .execute(&self.db)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Mark inactive and revoke the session in the same write
    pub async fn deactivate(&self, id: &str) -> AppResult<bool> {
        let result = sqlx::query(
            "UPDATE account SET active = 0, refresh_token = NULL, updated_at = ?1 WHERE id = ?2",
        )
        .bind(Utc::now())
        .bind(id)
        .execute(&self.db)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Soft-delete and revoke the session in the same write
    pub async fn mark_deleted(&self, id: &str) -> AppResult<bool> {
        let result = sqlx::query(
            "UPDATE account SET deleted = 1, refresh_token = NULL, updated_at = ?1 WHERE id = ?2",
        )
        .bind(Utc::now())
        .bind(id)
        .execute(&self.db)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Clear the deleted flag of an unbounded-role account
    pub async fn restore(&self, id: &str) -> AppResult<bool> {
        let result = sqlx::query(
            "UPDATE account SET deleted = 0, updated_at = ?1 WHERE id = ?2 AND deleted = 1",
        )
        .bind(Utc::now())
        .bind(id)
        .execute(&self.db)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Clear the deleted flag only while the account's role is below `ceiling`.
    ///
    /// Returns `false` when the quota is full (or the account is not deleted).
    pub async fn restore_within_quota(&self, id: &str, role: Role, ceiling: i64) -> AppResult<bool> {
        let result = sqlx::query(
            "UPDATE account SET deleted = 0, updated_at = ?1
             WHERE id = ?2 AND deleted = 1
               AND (SELECT COUNT(*) FROM account WHERE role = ?3 AND deleted = 0) < ?4",
        )
        .bind(Utc::now())
        .bind(id)
        .bind(role.as_str())
        .bind(ceiling)
        .execute(&self.db)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn set_password_hash(&self, id: &str, password_hash: &str) -> AppResult<bool> {
        let result =
            sqlx::query("UPDATE account SET password_hash = ?1, updated_at = ?2 WHERE id = ?3")
                .bind(password_hash)
                .bind(Utc::now())
                .bind(id)
                .execute(&self.db)
                .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn update_name(&self, id: &str, name: &str) -> AppResult<bool> {
        let result = sqlx::query("UPDATE account SET name = ?1, updated_at = ?2 WHERE id = ?3")
            .bind(name)
            .bind(Utc::now())
            .bind(id)
            .execute(&self.db)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Page through accounts of one role, filtered by a case-insensitive name fragment.
    ///
    /// Returns the page and the total number of matches.
    pub async fn list(&self, filter: &AccountFilter) -> AppResult<(Vec<AccountListing>, i64)> {
        let sql = format!(
            "SELECT {columns},
                    c.id AS creator_id, c.name AS creator_name, c.email AS creator_email
             FROM account a
             LEFT JOIN account c ON c.id = a.created_by
             WHERE a.role = ?1 AND a.name LIKE '%' || ?2 || '%'
             ORDER BY a.created_at DESC, a.id
             LIMIT ?3 OFFSET ?4",
            columns = ACCOUNT_COLUMNS
                .split(", ")
                .map(|c| format!("a.{}", c.trim()))
                .collect::<Vec<_>>()
                .join(", ")
        );

        let rows = sqlx::query(&sql)
            .bind(filter.role.as_str())
            .bind(&filter.name)
            .bind(filter.items_per_page)
            .bind(filter.offset())
            .fetch_all(&self.db)
            .await?;

        let mut items = Vec::with_capacity(rows.len());
        for row in &rows {
            let creator_id: Option<String> = row.try_get("creator_id")?;
            let creator = match creator_id {
                Some(id) => Some(CreatorSummary {
                    id,
                    name: row.try_get("creator_name")?,
                    email: row.try_get("creator_email")?,
                }),
                None => None,
            };

            items.push(AccountListing {
                account: account_from_row(row)?,
                creator,
            });
        }

        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM account WHERE role = ?1 AND name LIKE '%' || ?2 || '%'",
        )
        .bind(filter.role.as_str())
        .bind(&filter.name)
        .fetch_one(&self.db)
        .await?;

        Ok((items, count))
    }
}
