//! The local user account store.
//!
//! Synchronization talks to the store through [`UserStore`];
//! [`PgUserStore`] is the production implementation and
//! [`MemoryUserStore`] backs tests and local development.

mod memory;
mod postgres;

pub use memory::MemoryUserStore;
pub use postgres::PgUserStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use folio_model::{NewUserAccount, Provider, UserAccount, UserRole};
use thiserror::Error;

/// Error raised by a user store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A write would leave two accounts with the same username.
    #[error("username {username:?} is already taken")]
    DuplicateUsername { username: String },

    /// An update or delete targeted an account that does not exist.
    #[error("user account {id} not found")]
    NotFound { id: i64 },
}

impl StoreError {
    pub fn duplicate_username(username: impl Into<String>) -> Self {
        StoreError::DuplicateUsername {
            username: username.into(),
        }
    }

    /// Whether retrying later could succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Database(_))
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Repository over local user accounts, scoped to what synchronization
/// needs.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Accounts bound to any of `external_ids` for `provider`.
    async fn find_by_external_ids(
        &self,
        provider: Provider,
        external_ids: &[String],
    ) -> StoreResult<Vec<UserAccount>>;

    /// Accounts currently holding any of `usernames`.
    async fn find_by_usernames(&self, usernames: &[String]) -> StoreResult<Vec<UserAccount>>;

    /// One page of accounts bound to `provider` whose sync watermark is
    /// older than `cutoff` or was never set, ordered by id.
    async fn find_stale_older_than(
        &self,
        provider: Provider,
        cutoff: DateTime<Utc>,
        limit: u32,
        offset: u32,
    ) -> StoreResult<Vec<UserAccount>>;

    /// One page of accounts bound to `provider` that hold `role`,
    /// ordered by id.
    async fn find_by_role(
        &self,
        provider: Provider,
        role: UserRole,
        limit: u32,
        offset: u32,
    ) -> StoreResult<Vec<UserAccount>>;

    /// Persist every field of an existing account.
    async fn save(&self, account: &UserAccount) -> StoreResult<()>;

    /// Persist a batch of existing accounts in one transaction.
    async fn save_all(&self, accounts: &[UserAccount]) -> StoreResult<()>;

    /// Stamp the `provider` sync watermark on `ids` without touching
    /// any other field. Ids that no longer exist are ignored.
    async fn mark_all_synced(
        &self,
        ids: &[i64],
        provider: Provider,
        synced_at: DateTime<Utc>,
    ) -> StoreResult<()>;

    /// Insert new accounts in one transaction, returning them with
    /// their store-assigned ids.
    async fn insert_all(&self, accounts: Vec<NewUserAccount>) -> StoreResult<Vec<UserAccount>>;

    /// Delete one account. Deleting an id that is already gone is not
    /// an error.
    async fn delete_by_id(&self, id: i64) -> StoreResult<()>;

    /// Delete a batch of accounts by id.
    async fn delete_all_by_id(&self, ids: &[i64]) -> StoreResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let error = StoreError::duplicate_username("alice");
        assert_eq!(error.to_string(), "username \"alice\" is already taken");
        assert!(!error.is_transient());

        let error = StoreError::NotFound { id: 12 };
        assert_eq!(error.to_string(), "user account 12 not found");
    }

    #[test]
    fn test_database_errors_are_transient() {
        let error = StoreError::from(sqlx::Error::PoolTimedOut);
        assert!(error.is_transient());
    }
}
