//! Run locking.
//!
//! At most one synchronization run per provider may be in flight
//! across all service instances. [`PgSyncLock`] enforces that with
//! Postgres advisory locks; [`MemorySyncLock`] covers tests and
//! single-process deployments.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use folio_model::Provider;
use sqlx::pool::PoolConnection;
use sqlx::{PgPool, Postgres};
use tracing::{debug, error, info, warn};

use crate::error::SyncResult;
use crate::orchestrator::SyncOrchestrator;
use crate::summary::RunSummary;

/// Advisory lock namespace for sync runs, distinct from other users of
/// `pg_advisory_lock` on the same database.
const SYNC_LOCK_NAMESPACE: i32 = 7301;

/// The lock name guarding runs for `provider`.
pub fn sync_lock_name(provider: Provider) -> String {
    format!("folio.sync.{provider}")
}

/// Named lock with try-acquire semantics.
#[async_trait]
pub trait SyncLock: Send + Sync {
    /// Try to take the lock; `false` means another holder has it.
    async fn try_acquire(&self, lock_name: &str) -> SyncResult<bool>;

    /// Give the lock back.
    async fn release(&self, lock_name: &str) -> SyncResult<()>;
}

/// [`SyncLock`] over Postgres session advisory locks.
///
/// The acquiring connection is checked out of the pool and held until
/// release, because advisory locks belong to the session that took
/// them. If the process dies, the session closes and Postgres frees
/// the lock on its own.
pub struct PgSyncLock {
    pool: PgPool,
    held: Mutex<HashMap<String, PoolConnection<Postgres>>>,
}

impl PgSyncLock {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            held: Mutex::new(HashMap::new()),
        }
    }
}

impl std::fmt::Debug for PgSyncLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PgSyncLock").finish_non_exhaustive()
    }
}

/// Stable 64-bit key for a lock name (FNV-1a).
fn lock_key(lock_name: &str) -> i64 {
    const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

    let mut hash = FNV_OFFSET;
    for byte in lock_name.as_bytes() {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    i64::from_be_bytes(hash.to_be_bytes())
}

#[async_trait]
impl SyncLock for PgSyncLock {
    async fn try_acquire(&self, lock_name: &str) -> SyncResult<bool> {
        let key = lock_key(lock_name);
        let mut conn = self.pool.acquire().await?;
        let row: (bool,) = sqlx::query_as("SELECT pg_try_advisory_lock($1, $2)")
            .bind(SYNC_LOCK_NAMESPACE)
            .bind(key)
            .fetch_one(&mut *conn)
            .await?;

        if row.0 {
            debug!(lock_name, key, "acquired sync lock");
            let mut held = self.held.lock().unwrap_or_else(|e| e.into_inner());
            held.insert(lock_name.to_string(), conn);
        } else {
            debug!(lock_name, key, "sync lock already held");
        }
        Ok(row.0)
    }

    async fn release(&self, lock_name: &str) -> SyncResult<()> {
        let conn = {
            let mut held = self.held.lock().unwrap_or_else(|e| e.into_inner());
            held.remove(lock_name)
        };
        let Some(mut conn) = conn else {
            warn!(lock_name, "releasing a sync lock that is not held");
            return Ok(());
        };

        let key = lock_key(lock_name);
        // An error here still drops the connection, which frees the
        // lock when the session closes.
        let row: (bool,) = sqlx::query_as("SELECT pg_advisory_unlock($1, $2)")
            .bind(SYNC_LOCK_NAMESPACE)
            .bind(key)
            .fetch_one(&mut *conn)
            .await?;

        if !row.0 {
            warn!(lock_name, key, "advisory unlock reported no lock held");
        } else {
            debug!(lock_name, key, "released sync lock");
        }
        Ok(())
    }
}

/// In-memory [`SyncLock`].
#[derive(Debug, Default)]
pub struct MemorySyncLock {
    held: Mutex<HashSet<String>>,
}

impl MemorySyncLock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_held(&self, lock_name: &str) -> bool {
        self.held
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(lock_name)
    }
}

#[async_trait]
impl SyncLock for MemorySyncLock {
    async fn try_acquire(&self, lock_name: &str) -> SyncResult<bool> {
        let mut held = self.held.lock().unwrap_or_else(|e| e.into_inner());
        Ok(held.insert(lock_name.to_string()))
    }

    async fn release(&self, lock_name: &str) -> SyncResult<()> {
        let mut held = self.held.lock().unwrap_or_else(|e| e.into_inner());
        if !held.remove(lock_name) {
            warn!(lock_name, "releasing a sync lock that is not held");
        }
        Ok(())
    }
}

/// Run one synchronization under the provider's lock.
///
/// A busy lock skips the run rather than waiting; the next scheduled
/// tick will try again.
pub async fn run_guarded(lock: &dyn SyncLock, orchestrator: &SyncOrchestrator) -> RunSummary {
    let provider = orchestrator.provider();
    let lock_name = sync_lock_name(provider);

    match lock.try_acquire(&lock_name).await {
        Ok(true) => {}
        Ok(false) => {
            info!(lock_name, "another sync run holds the lock, skipping");
            return RunSummary::skipped(provider);
        }
        Err(lock_error) => {
            error!(lock_name, error = %lock_error, "could not acquire sync lock");
            let mut summary = RunSummary::started(provider, Utc::now());
            summary.fail(format!("could not acquire sync lock: {lock_error}"));
            return summary;
        }
    }

    let summary = orchestrator.run_sync().await;

    if let Err(release_error) = lock.release(&lock_name).await {
        warn!(lock_name, error = %release_error, "failed to release sync lock");
    }

    summary
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_lock_is_exclusive() {
        let lock = MemorySyncLock::new();
        let name = sync_lock_name(Provider::Ldap);

        assert!(lock.try_acquire(&name).await.unwrap());
        assert!(!lock.try_acquire(&name).await.unwrap());
        assert!(lock.is_held(&name));

        lock.release(&name).await.unwrap();
        assert!(lock.try_acquire(&name).await.unwrap());
    }

    #[tokio::test]
    async fn test_locks_are_independent_per_name() {
        let lock = MemorySyncLock::new();

        assert!(lock.try_acquire("folio.sync.ldap").await.unwrap());
        assert!(lock.try_acquire("folio.sync.keycloak").await.unwrap());
    }

    #[tokio::test]
    async fn test_releasing_unheld_lock_is_harmless() {
        let lock = MemorySyncLock::new();
        assert!(lock.release("folio.sync.ldap").await.is_ok());
    }

    #[test]
    fn test_lock_names() {
        assert_eq!(sync_lock_name(Provider::Ldap), "folio.sync.ldap");
        assert_eq!(sync_lock_name(Provider::Keycloak), "folio.sync.keycloak");
    }

    #[test]
    fn test_lock_key_is_stable() {
        let first = lock_key("folio.sync.ldap");
        let second = lock_key("folio.sync.ldap");
        let other = lock_key("folio.sync.keycloak");

        assert_eq!(first, second);
        assert_ne!(first, other);
    }
}
