//! Postgres-backed user store.
//!
//! Works against the `user_accounts` table:
//!
//! ```sql
//! CREATE TABLE user_accounts (
//!     id                 BIGSERIAL PRIMARY KEY,
//!     username           TEXT NOT NULL UNIQUE,
//!     email              TEXT,
//!     enabled            BOOLEAN NOT NULL DEFAULT TRUE,
//!     locked             BOOLEAN NOT NULL DEFAULT FALSE,
//!     confirmed          BOOLEAN NOT NULL DEFAULT FALSE,
//!     roles              TEXT[] NOT NULL DEFAULT '{}',
//!     ldap_id            TEXT UNIQUE,
//!     keycloak_id        TEXT UNIQUE,
//!     ldap_synced_at     TIMESTAMPTZ,
//!     keycloak_synced_at TIMESTAMPTZ,
//!     created_at         TIMESTAMPTZ NOT NULL DEFAULT NOW(),
//!     updated_at         TIMESTAMPTZ NOT NULL DEFAULT NOW()
//! );
//! ```

use std::collections::BTreeSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use folio_model::{NewUserAccount, Provider, UserAccount, UserRole};
use sqlx::{FromRow, PgPool};
use tracing::warn;

use super::{StoreError, StoreResult, UserStore};

const SAVE_SQL: &str = r#"
    UPDATE user_accounts
    SET username = $2, email = $3, enabled = $4, locked = $5, confirmed = $6,
        roles = $7, ldap_id = $8, keycloak_id = $9,
        ldap_synced_at = $10, keycloak_synced_at = $11, updated_at = NOW()
    WHERE id = $1
"#;

const INSERT_SQL: &str = r#"
    INSERT INTO user_accounts
        (username, email, enabled, locked, confirmed, roles,
         ldap_id, keycloak_id, ldap_synced_at, keycloak_synced_at)
    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
    RETURNING *
"#;

/// [`UserStore`] over a Postgres pool.
#[derive(Debug, Clone)]
pub struct PgUserStore {
    pool: PgPool,
}

impl PgUserStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Row shape of `user_accounts`.
#[derive(FromRow)]
struct UserAccountRow {
    id: i64,
    username: String,
    email: Option<String>,
    enabled: bool,
    locked: bool,
    confirmed: bool,
    roles: Vec<String>,
    ldap_id: Option<String>,
    keycloak_id: Option<String>,
    ldap_synced_at: Option<DateTime<Utc>>,
    keycloak_synced_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl UserAccountRow {
    fn into_account(self) -> UserAccount {
        let roles = self
            .roles
            .iter()
            .filter_map(|value| match value.parse::<UserRole>() {
                Ok(role) => Some(role),
                Err(_) => {
                    warn!(role = %value, "ignoring unknown role value in user_accounts.roles");
                    None
                }
            })
            .collect();

        UserAccount {
            id: self.id,
            username: self.username,
            email: self.email,
            enabled: self.enabled,
            locked: self.locked,
            confirmed: self.confirmed,
            roles,
            ldap_id: self.ldap_id,
            keycloak_id: self.keycloak_id,
            ldap_synced_at: self.ldap_synced_at,
            keycloak_synced_at: self.keycloak_synced_at,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

fn external_id_column(provider: Provider) -> &'static str {
    match provider {
        Provider::Ldap => "ldap_id",
        Provider::Keycloak => "keycloak_id",
    }
}

fn synced_at_column(provider: Provider) -> &'static str {
    match provider {
        Provider::Ldap => "ldap_synced_at",
        Provider::Keycloak => "keycloak_synced_at",
    }
}

fn roles_to_text(account_roles: &BTreeSet<UserRole>) -> Vec<String> {
    account_roles
        .iter()
        .map(|role| role.as_str().to_string())
        .collect()
}

/// Maps a unique violation on a write to [`StoreError::DuplicateUsername`].
fn map_write_error(error: sqlx::Error, username: &str) -> StoreError {
    match &error {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            StoreError::duplicate_username(username)
        }
        _ => StoreError::Database(error),
    }
}

fn rows_to_accounts(rows: Vec<UserAccountRow>) -> Vec<UserAccount> {
    rows.into_iter().map(UserAccountRow::into_account).collect()
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn find_by_external_ids(
        &self,
        provider: Provider,
        external_ids: &[String],
    ) -> StoreResult<Vec<UserAccount>> {
        if external_ids.is_empty() {
            return Ok(Vec::new());
        }

        let sql = format!(
            "SELECT * FROM user_accounts WHERE {} = ANY($1) ORDER BY id",
            external_id_column(provider)
        );
        let rows: Vec<UserAccountRow> = sqlx::query_as(&sql)
            .bind(external_ids)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows_to_accounts(rows))
    }

    async fn find_by_usernames(&self, usernames: &[String]) -> StoreResult<Vec<UserAccount>> {
        if usernames.is_empty() {
            return Ok(Vec::new());
        }

        let rows: Vec<UserAccountRow> =
            sqlx::query_as("SELECT * FROM user_accounts WHERE username = ANY($1) ORDER BY id")
                .bind(usernames)
                .fetch_all(&self.pool)
                .await?;
        Ok(rows_to_accounts(rows))
    }

    async fn find_stale_older_than(
        &self,
        provider: Provider,
        cutoff: DateTime<Utc>,
        limit: u32,
        offset: u32,
    ) -> StoreResult<Vec<UserAccount>> {
        let id_column = external_id_column(provider);
        let synced_column = synced_at_column(provider);
        let sql = format!(
            r#"
            SELECT * FROM user_accounts
            WHERE {id_column} IS NOT NULL
              AND ({synced_column} IS NULL OR {synced_column} < $1)
            ORDER BY id
            LIMIT $2 OFFSET $3
            "#
        );
        let rows: Vec<UserAccountRow> = sqlx::query_as(&sql)
            .bind(cutoff)
            .bind(i64::from(limit))
            .bind(i64::from(offset))
            .fetch_all(&self.pool)
            .await?;
        Ok(rows_to_accounts(rows))
    }

    async fn find_by_role(
        &self,
        provider: Provider,
        role: UserRole,
        limit: u32,
        offset: u32,
    ) -> StoreResult<Vec<UserAccount>> {
        let sql = format!(
            r#"
            SELECT * FROM user_accounts
            WHERE {} IS NOT NULL AND $1 = ANY(roles)
            ORDER BY id
            LIMIT $2 OFFSET $3
            "#,
            external_id_column(provider)
        );
        let rows: Vec<UserAccountRow> = sqlx::query_as(&sql)
            .bind(role.as_str())
            .bind(i64::from(limit))
            .bind(i64::from(offset))
            .fetch_all(&self.pool)
            .await?;
        Ok(rows_to_accounts(rows))
    }

    async fn save(&self, account: &UserAccount) -> StoreResult<()> {
        let result = sqlx::query(SAVE_SQL)
            .bind(account.id)
            .bind(&account.username)
            .bind(&account.email)
            .bind(account.enabled)
            .bind(account.locked)
            .bind(account.confirmed)
            .bind(roles_to_text(&account.roles))
            .bind(&account.ldap_id)
            .bind(&account.keycloak_id)
            .bind(account.ldap_synced_at)
            .bind(account.keycloak_synced_at)
            .execute(&self.pool)
            .await
            .map_err(|error| map_write_error(error, &account.username))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound { id: account.id });
        }
        Ok(())
    }

    async fn save_all(&self, accounts: &[UserAccount]) -> StoreResult<()> {
        if accounts.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;
        for account in accounts {
            let result = sqlx::query(SAVE_SQL)
                .bind(account.id)
                .bind(&account.username)
                .bind(&account.email)
                .bind(account.enabled)
                .bind(account.locked)
                .bind(account.confirmed)
                .bind(roles_to_text(&account.roles))
                .bind(&account.ldap_id)
                .bind(&account.keycloak_id)
                .bind(account.ldap_synced_at)
                .bind(account.keycloak_synced_at)
                .execute(&mut *tx)
                .await
                .map_err(|error| map_write_error(error, &account.username))?;

            if result.rows_affected() == 0 {
                return Err(StoreError::NotFound { id: account.id });
            }
        }
        tx.commit().await?;
        Ok(())
    }

    async fn mark_all_synced(
        &self,
        ids: &[i64],
        provider: Provider,
        synced_at: DateTime<Utc>,
    ) -> StoreResult<()> {
        if ids.is_empty() {
            return Ok(());
        }

        let sql = format!(
            "UPDATE user_accounts SET {} = $1 WHERE id = ANY($2)",
            synced_at_column(provider)
        );
        sqlx::query(&sql)
            .bind(synced_at)
            .bind(ids)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn insert_all(&self, accounts: Vec<NewUserAccount>) -> StoreResult<Vec<UserAccount>> {
        if accounts.is_empty() {
            return Ok(Vec::new());
        }

        let mut tx = self.pool.begin().await?;
        let mut inserted = Vec::with_capacity(accounts.len());
        for account in accounts {
            let row: UserAccountRow = sqlx::query_as(INSERT_SQL)
                .bind(&account.username)
                .bind(&account.email)
                .bind(account.enabled)
                .bind(account.locked)
                .bind(account.confirmed)
                .bind(roles_to_text(&account.roles))
                .bind(&account.ldap_id)
                .bind(&account.keycloak_id)
                .bind(account.ldap_synced_at)
                .bind(account.keycloak_synced_at)
                .fetch_one(&mut *tx)
                .await
                .map_err(|error| map_write_error(error, &account.username))?;
            inserted.push(row.into_account());
        }
        tx.commit().await?;
        Ok(inserted)
    }

    async fn delete_by_id(&self, id: i64) -> StoreResult<()> {
        sqlx::query("DELETE FROM user_accounts WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn delete_all_by_id(&self, ids: &[i64]) -> StoreResult<()> {
        if ids.is_empty() {
            return Ok(());
        }

        sqlx::query("DELETE FROM user_accounts WHERE id = ANY($1)")
            .bind(ids)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
