//! In-memory user store for tests and local development.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use folio_model::{NewUserAccount, Provider, UserAccount, UserRole};

use super::{StoreError, StoreResult, UserStore};

/// [`UserStore`] over a locked map.
///
/// Mutations are counted per operation family so tests can assert that
/// a run wrote nothing.
#[derive(Debug)]
pub struct MemoryUserStore {
    accounts: RwLock<HashMap<i64, UserAccount>>,
    next_id: AtomicI64,
    saves: AtomicUsize,
    batch_saves: AtomicUsize,
    inserts: AtomicUsize,
    deletes: AtomicUsize,
    touches: AtomicUsize,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self {
            accounts: RwLock::new(HashMap::new()),
            next_id: AtomicI64::new(1),
            saves: AtomicUsize::new(0),
            batch_saves: AtomicUsize::new(0),
            inserts: AtomicUsize::new(0),
            deletes: AtomicUsize::new(0),
            touches: AtomicUsize::new(0),
        }
    }

    /// A store seeded with `accounts`; the id sequence continues past
    /// the highest seeded id.
    pub fn with_accounts(accounts: Vec<UserAccount>) -> Self {
        let store = Self::new();
        let max_id = accounts.iter().map(|account| account.id).max().unwrap_or(0);
        store.next_id.store(max_id + 1, Ordering::SeqCst);
        {
            let mut map = store.accounts.write().unwrap_or_else(|e| e.into_inner());
            for account in accounts {
                map.insert(account.id, account);
            }
        }
        store
    }

    /// All accounts, ordered by id.
    pub fn accounts(&self) -> Vec<UserAccount> {
        let map = self.accounts.read().unwrap_or_else(|e| e.into_inner());
        let mut all: Vec<UserAccount> = map.values().cloned().collect();
        all.sort_by_key(|account| account.id);
        all
    }

    pub fn find_by_username(&self, username: &str) -> Option<UserAccount> {
        let map = self.accounts.read().unwrap_or_else(|e| e.into_inner());
        map.values()
            .find(|account| account.username == username)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.accounts
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// `save` calls so far.
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    /// `save_all` calls so far.
    pub fn batch_save_count(&self) -> usize {
        self.batch_saves.load(Ordering::SeqCst)
    }

    /// Rows inserted so far.
    pub fn insert_count(&self) -> usize {
        self.inserts.load(Ordering::SeqCst)
    }

    /// Rows deleted so far.
    pub fn delete_count(&self) -> usize {
        self.deletes.load(Ordering::SeqCst)
    }

    /// `mark_all_synced` calls so far.
    pub fn touch_count(&self) -> usize {
        self.touches.load(Ordering::SeqCst)
    }

    /// All record mutations so far; watermark touches are not counted.
    pub fn write_count(&self) -> usize {
        self.save_count() + self.batch_save_count() + self.insert_count() + self.delete_count()
    }

    fn page<F>(&self, provider: Provider, limit: u32, offset: u32, keep: F) -> Vec<UserAccount>
    where
        F: Fn(&UserAccount) -> bool,
    {
        let map = self.accounts.read().unwrap_or_else(|e| e.into_inner());
        let mut matching: Vec<UserAccount> = map
            .values()
            .filter(|account| account.external_id(provider).is_some() && keep(account))
            .cloned()
            .collect();
        matching.sort_by_key(|account| account.id);
        matching
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .collect()
    }
}

impl Default for MemoryUserStore {
    fn default() -> Self {
        Self::new()
    }
}

fn materialize(account: NewUserAccount, id: i64, now: DateTime<Utc>) -> UserAccount {
    UserAccount {
        id,
        username: account.username,
        email: account.email,
        enabled: account.enabled,
        locked: account.locked,
        confirmed: account.confirmed,
        roles: account.roles,
        ldap_id: account.ldap_id,
        keycloak_id: account.keycloak_id,
        ldap_synced_at: account.ldap_synced_at,
        keycloak_synced_at: account.keycloak_synced_at,
        created_at: now,
        updated_at: now,
    }
}

fn username_taken(map: &HashMap<i64, UserAccount>, username: &str, except: Option<i64>) -> bool {
    map.values()
        .any(|account| Some(account.id) != except && account.username == username)
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn find_by_external_ids(
        &self,
        provider: Provider,
        external_ids: &[String],
    ) -> StoreResult<Vec<UserAccount>> {
        let map = self.accounts.read().unwrap_or_else(|e| e.into_inner());
        let mut found: Vec<UserAccount> = map
            .values()
            .filter(|account| {
                account
                    .external_id(provider)
                    .is_some_and(|id| external_ids.iter().any(|wanted| wanted == id))
            })
            .cloned()
            .collect();
        found.sort_by_key(|account| account.id);
        Ok(found)
    }

    async fn find_by_usernames(&self, usernames: &[String]) -> StoreResult<Vec<UserAccount>> {
        let map = self.accounts.read().unwrap_or_else(|e| e.into_inner());
        let mut found: Vec<UserAccount> = map
            .values()
            .filter(|account| usernames.iter().any(|wanted| *wanted == account.username))
            .cloned()
            .collect();
        found.sort_by_key(|account| account.id);
        Ok(found)
    }

    async fn find_stale_older_than(
        &self,
        provider: Provider,
        cutoff: DateTime<Utc>,
        limit: u32,
        offset: u32,
    ) -> StoreResult<Vec<UserAccount>> {
        Ok(self.page(provider, limit, offset, |account| {
            account
                .last_sync_time(provider)
                .is_none_or(|synced_at| synced_at < cutoff)
        }))
    }

    async fn find_by_role(
        &self,
        provider: Provider,
        role: UserRole,
        limit: u32,
        offset: u32,
    ) -> StoreResult<Vec<UserAccount>> {
        Ok(self.page(provider, limit, offset, |account| account.has_role(role)))
    }

    async fn save(&self, account: &UserAccount) -> StoreResult<()> {
        let mut map = self.accounts.write().unwrap_or_else(|e| e.into_inner());
        if !map.contains_key(&account.id) {
            return Err(StoreError::NotFound { id: account.id });
        }
        if username_taken(&map, &account.username, Some(account.id)) {
            return Err(StoreError::duplicate_username(&account.username));
        }

        let mut updated = account.clone();
        updated.updated_at = Utc::now();
        map.insert(updated.id, updated);
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn save_all(&self, accounts: &[UserAccount]) -> StoreResult<()> {
        if accounts.is_empty() {
            return Ok(());
        }

        let mut map = self.accounts.write().unwrap_or_else(|e| e.into_inner());
        // Validate against a copy so a bad batch leaves nothing behind.
        let mut staged = map.clone();
        for account in accounts {
            if !staged.contains_key(&account.id) {
                return Err(StoreError::NotFound { id: account.id });
            }
            if username_taken(&staged, &account.username, Some(account.id)) {
                return Err(StoreError::duplicate_username(&account.username));
            }
            let mut updated = account.clone();
            updated.updated_at = Utc::now();
            staged.insert(updated.id, updated);
        }

        *map = staged;
        self.batch_saves.fetch_add(1, Ordering::SeqCst);
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

        let mut map = self.accounts.write().unwrap_or_else(|e| e.into_inner());
        for id in ids {
            if let Some(account) = map.get_mut(id) {
                account.mark_synced(provider, synced_at);
            }
        }
        self.touches.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn insert_all(&self, accounts: Vec<NewUserAccount>) -> StoreResult<Vec<UserAccount>> {
        if accounts.is_empty() {
            return Ok(Vec::new());
        }

        let now = Utc::now();
        let mut map = self.accounts.write().unwrap_or_else(|e| e.into_inner());
        let mut staged = map.clone();
        let mut inserted = Vec::with_capacity(accounts.len());

        for account in accounts {
            if username_taken(&staged, &account.username, None) {
                return Err(StoreError::duplicate_username(&account.username));
            }
            let id = self.next_id.fetch_add(1, Ordering::SeqCst);
            let materialized = materialize(account, id, now);
            staged.insert(id, materialized.clone());
            inserted.push(materialized);
        }

        *map = staged;
        self.inserts.fetch_add(inserted.len(), Ordering::SeqCst);
        Ok(inserted)
    }

    async fn delete_by_id(&self, id: i64) -> StoreResult<()> {
        let mut map = self.accounts.write().unwrap_or_else(|e| e.into_inner());
        if map.remove(&id).is_some() {
            self.deletes.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }

    async fn delete_all_by_id(&self, ids: &[i64]) -> StoreResult<()> {
        let mut map = self.accounts.write().unwrap_or_else(|e| e.into_inner());
        let mut removed = 0;
        for id in ids {
            if map.remove(id).is_some() {
                removed += 1;
            }
        }
        self.deletes.fetch_add(removed, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use chrono::Duration;

    use super::*;

    fn account(id: i64, username: &str) -> UserAccount {
        UserAccount {
            id,
            username: username.to_string(),
            email: None,
            enabled: true,
            locked: false,
            confirmed: false,
            roles: BTreeSet::new(),
            ldap_id: None,
            keycloak_id: None,
            ldap_synced_at: None,
            keycloak_synced_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn bound(id: i64, username: &str, external_id: &str) -> UserAccount {
        let mut account = account(id, username);
        account.ldap_id = Some(external_id.to_string());
        account
    }

    #[tokio::test]
    async fn test_find_by_external_ids() {
        let store = MemoryUserStore::with_accounts(vec![
            bound(1, "alice", "u1"),
            bound(2, "bob", "u2"),
            account(3, "carol"),
        ]);

        let found = store
            .find_by_external_ids(Provider::Ldap, &["u2".to_string(), "u9".to_string()])
            .await
            .unwrap();

        assert_eq!(found.len(), 1);
        assert_eq!(found[0].username, "bob");

        let none = store
            .find_by_external_ids(Provider::Keycloak, &["u1".to_string()])
            .await
            .unwrap();
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn test_find_stale_filters_and_pages() {
        let cutoff = Utc::now();
        let mut fresh = bound(1, "fresh", "u1");
        fresh.ldap_synced_at = Some(cutoff + Duration::seconds(5));
        let mut stale = bound(2, "stale", "u2");
        stale.ldap_synced_at = Some(cutoff - Duration::hours(1));
        let never = bound(3, "never", "u3");
        let unbound = account(4, "local");

        let store = MemoryUserStore::with_accounts(vec![fresh, stale, never, unbound]);

        let orphans = store
            .find_stale_older_than(Provider::Ldap, cutoff, 10, 0)
            .await
            .unwrap();
        let usernames: Vec<&str> = orphans.iter().map(|a| a.username.as_str()).collect();
        assert_eq!(usernames, vec!["stale", "never"]);

        let second_page = store
            .find_stale_older_than(Provider::Ldap, cutoff, 1, 1)
            .await
            .unwrap();
        assert_eq!(second_page[0].username, "never");
    }

    #[tokio::test]
    async fn test_find_by_role_requires_binding() {
        let mut bound_editor = bound(1, "alice", "u1");
        bound_editor.roles.insert(UserRole::Editor);
        let mut local_editor = account(2, "bob");
        local_editor.roles.insert(UserRole::Editor);

        let store = MemoryUserStore::with_accounts(vec![bound_editor, local_editor]);

        let holders = store
            .find_by_role(Provider::Ldap, UserRole::Editor, 10, 0)
            .await
            .unwrap();

        assert_eq!(holders.len(), 1);
        assert_eq!(holders[0].username, "alice");
    }

    #[tokio::test]
    async fn test_save_rejects_duplicate_username() {
        let store = MemoryUserStore::with_accounts(vec![account(1, "alice"), account(2, "bob")]);

        let mut renamed = store.find_by_username("bob").unwrap();
        renamed.username = "alice".to_string();

        let err = store.save(&renamed).await.unwrap_err();
        assert!(matches!(err, StoreError::DuplicateUsername { .. }));
        assert_eq!(store.find_by_username("bob").unwrap().id, 2);
    }

    #[tokio::test]
    async fn test_save_missing_account() {
        let store = MemoryUserStore::new();
        let err = store.save(&account(9, "ghost")).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound { id: 9 }));
    }

    #[tokio::test]
    async fn test_save_all_is_atomic() {
        let store = MemoryUserStore::with_accounts(vec![account(1, "alice"), account(2, "bob")]);

        let mut first = store.find_by_username("alice").unwrap();
        first.email = Some("alice@example.com".to_string());
        let mut second = store.find_by_username("bob").unwrap();
        second.username = "alice".to_string();

        let err = store.save_all(&[first, second]).await.unwrap_err();
        assert!(matches!(err, StoreError::DuplicateUsername { .. }));
        // The valid first update must not have landed.
        assert_eq!(store.find_by_username("alice").unwrap().email, None);
        assert_eq!(store.batch_save_count(), 0);
    }

    #[tokio::test]
    async fn test_insert_assigns_increasing_ids() {
        let store = MemoryUserStore::with_accounts(vec![account(7, "alice")]);

        let inserted = store
            .insert_all(vec![
                NewUserAccount::new("bob"),
                NewUserAccount::new("carol"),
            ])
            .await
            .unwrap();

        assert_eq!(inserted[0].id, 8);
        assert_eq!(inserted[1].id, 9);
        assert_eq!(store.len(), 3);
        assert_eq!(store.insert_count(), 2);
    }

    #[tokio::test]
    async fn test_insert_rejects_taken_username() {
        let store = MemoryUserStore::with_accounts(vec![account(1, "alice")]);

        let err = store
            .insert_all(vec![
                NewUserAccount::new("bob"),
                NewUserAccount::new("alice"),
            ])
            .await
            .unwrap_err();

        assert!(matches!(err, StoreError::DuplicateUsername { .. }));
        // Atomic: bob must not have landed either.
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_mark_all_synced_touches_only_watermark() {
        let seeded = bound(1, "alice", "u1");
        let before = seeded.updated_at;
        let store = MemoryUserStore::with_accounts(vec![seeded]);
        let synced_at = Utc::now();

        store
            .mark_all_synced(&[1, 999], Provider::Ldap, synced_at)
            .await
            .unwrap();

        let stored = store.find_by_username("alice").unwrap();
        assert_eq!(stored.ldap_synced_at, Some(synced_at));
        assert_eq!(stored.updated_at, before);
        assert_eq!(store.touch_count(), 1);
        assert_eq!(store.write_count(), 0);
    }

    #[tokio::test]
    async fn test_delete_counts_removed_rows() {
        let store = MemoryUserStore::with_accounts(vec![account(1, "alice"), account(2, "bob")]);

        store.delete_all_by_id(&[1, 2, 3]).await.unwrap();

        assert!(store.is_empty());
        assert_eq!(store.delete_count(), 2);

        store.delete_by_id(1).await.unwrap();
        assert_eq!(store.delete_count(), 2);
    }
}
