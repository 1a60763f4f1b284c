//! Username collision handling for staged inserts.

use std::collections::{HashMap, HashSet};

use folio_model::{NewUserAccount, Provider, UserAccount};
use serde::Deserialize;
use tracing::{debug, warn};

/// What happens when a staged insert's username is already held by a
/// local account that is not bound to the same external identity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictStrategy {
    /// Keep the local account, skip the insert.
    #[default]
    Ignore,
    /// Delete the local account and insert the incoming one.
    WriteNewAndRemoveOld,
    /// Rename the local account with the provider's username prefix
    /// and insert the incoming one.
    WriteNewAndRenameOld,
}

impl ConflictStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConflictStrategy::Ignore => "ignore",
            ConflictStrategy::WriteNewAndRemoveOld => "write_new_and_remove_old",
            ConflictStrategy::WriteNewAndRenameOld => "write_new_and_rename_old",
        }
    }
}

impl std::fmt::Display for ConflictStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The executable outcome of resolving one batch of staged inserts.
#[derive(Debug, Default)]
pub struct ConflictPlan {
    /// Records to insert, in staged order.
    pub inserts: Vec<NewUserAccount>,
    /// Colliding local accounts to delete before inserting.
    pub removals: Vec<UserAccount>,
    /// Colliding local accounts to persist under their new prefixed
    /// username.
    pub renames: Vec<UserAccount>,
    /// Staged records dropped by resolution.
    pub skipped: Vec<NewUserAccount>,
}

/// Plans how staged inserts are admitted against existing accounts.
///
/// Resolution is pure: it reads the colliding accounts and produces a
/// [`ConflictPlan`], leaving all writes to the caller. The outcome for
/// one record never depends on how another record was resolved.
#[derive(Debug, Clone)]
pub struct ConflictResolver {
    provider: Provider,
    strategy: ConflictStrategy,
}

impl ConflictResolver {
    pub fn new(provider: Provider, strategy: ConflictStrategy) -> Self {
        Self { provider, strategy }
    }

    pub fn strategy(&self) -> ConflictStrategy {
        self.strategy
    }

    /// Resolve one batch of staged inserts against the accounts that
    /// currently hold their usernames.
    ///
    /// A username staged twice in the same batch keeps the first record
    /// and skips the rest. A holder bound to the same external id is
    /// not a conflict; the staged record is dropped because the update
    /// path owns that account.
    pub fn resolve(
        &self,
        staged: Vec<NewUserAccount>,
        existing: &HashMap<String, UserAccount>,
    ) -> ConflictPlan {
        let mut plan = ConflictPlan::default();
        let mut claimed: HashSet<String> = HashSet::new();

        for candidate in staged {
            if !claimed.insert(candidate.username.clone()) {
                warn!(
                    username = %candidate.username,
                    "username staged twice in one batch, keeping the first"
                );
                plan.skipped.push(candidate);
                continue;
            }

            match existing.get(&candidate.username) {
                None => plan.inserts.push(candidate),
                Some(holder)
                    if holder.external_id(self.provider)
                        == candidate.external_id(self.provider) =>
                {
                    debug!(
                        username = %candidate.username,
                        "holder already bound to this identity, not a conflict"
                    );
                    plan.skipped.push(candidate);
                }
                Some(holder) => self.resolve_collision(candidate, holder, &mut plan),
            }
        }

        plan
    }

    fn resolve_collision(
        &self,
        candidate: NewUserAccount,
        holder: &UserAccount,
        plan: &mut ConflictPlan,
    ) {
        match self.strategy {
            ConflictStrategy::Ignore => {
                warn!(
                    username = %candidate.username,
                    holder_id = holder.id,
                    "username collision, keeping the local account"
                );
                plan.skipped.push(candidate);
            }
            ConflictStrategy::WriteNewAndRemoveOld => {
                warn!(
                    username = %candidate.username,
                    holder_id = holder.id,
                    "username collision, removing the local account"
                );
                plan.removals.push(holder.clone());
                plan.inserts.push(candidate);
            }
            ConflictStrategy::WriteNewAndRenameOld => {
                let mut renamed = holder.clone();
                renamed.username = format!(
                    "{}{}",
                    self.provider.username_prefix(),
                    renamed.username
                );
                warn!(
                    username = %candidate.username,
                    holder_id = holder.id,
                    renamed_to = %renamed.username,
                    "username collision, renaming the local account"
                );
                plan.renames.push(renamed);
                plan.inserts.push(candidate);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use chrono::Utc;

    use super::*;

    fn holder(id: i64, username: &str) -> UserAccount {
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

    fn staged(username: &str, external_id: &str) -> NewUserAccount {
        let mut account = NewUserAccount::new(username);
        account.set_external_id(Provider::Ldap, external_id);
        account
    }

    fn existing(accounts: Vec<UserAccount>) -> HashMap<String, UserAccount> {
        accounts
            .into_iter()
            .map(|account| (account.username.clone(), account))
            .collect()
    }

    #[test]
    fn test_free_username_is_inserted() {
        let resolver = ConflictResolver::new(Provider::Ldap, ConflictStrategy::Ignore);

        let plan = resolver.resolve(vec![staged("alice", "u1")], &existing(vec![]));

        assert_eq!(plan.inserts.len(), 1);
        assert!(plan.removals.is_empty());
        assert!(plan.renames.is_empty());
        assert!(plan.skipped.is_empty());
    }

    #[test]
    fn test_ignore_keeps_local_account() {
        let resolver = ConflictResolver::new(Provider::Ldap, ConflictStrategy::Ignore);

        let plan = resolver.resolve(
            vec![staged("bob", "u2")],
            &existing(vec![holder(1, "bob")]),
        );

        assert!(plan.inserts.is_empty());
        assert_eq!(plan.skipped.len(), 1);
    }

    #[test]
    fn test_remove_old_deletes_holder() {
        let resolver =
            ConflictResolver::new(Provider::Ldap, ConflictStrategy::WriteNewAndRemoveOld);

        let plan = resolver.resolve(
            vec![staged("bob", "u2")],
            &existing(vec![holder(1, "bob")]),
        );

        assert_eq!(plan.removals.len(), 1);
        assert_eq!(plan.removals[0].id, 1);
        assert_eq!(plan.inserts.len(), 1);
    }

    #[test]
    fn test_rename_old_prefixes_username() {
        let resolver =
            ConflictResolver::new(Provider::Ldap, ConflictStrategy::WriteNewAndRenameOld);
        let mut local = holder(1, "bob");
        local.keycloak_id = Some("kc-9".to_string());

        let plan = resolver.resolve(vec![staged("bob", "u2")], &existing(vec![local]));

        assert_eq!(plan.renames.len(), 1);
        assert_eq!(plan.renames[0].username, "ldap_bob");
        // The renamed account keeps its other bindings.
        assert_eq!(plan.renames[0].keycloak_id.as_deref(), Some("kc-9"));
        assert_eq!(plan.inserts[0].username, "bob");
    }

    #[test]
    fn test_keycloak_prefix() {
        let resolver =
            ConflictResolver::new(Provider::Keycloak, ConflictStrategy::WriteNewAndRenameOld);
        let mut candidate = NewUserAccount::new("bob");
        candidate.set_external_id(Provider::Keycloak, "kc-2");

        let plan = resolver.resolve(vec![candidate], &existing(vec![holder(1, "bob")]));

        assert_eq!(plan.renames[0].username, "keycloak_bob");
    }

    #[test]
    fn test_same_binding_is_not_a_conflict() {
        let resolver =
            ConflictResolver::new(Provider::Ldap, ConflictStrategy::WriteNewAndRemoveOld);
        let mut local = holder(1, "bob");
        local.ldap_id = Some("u2".to_string());

        let plan = resolver.resolve(vec![staged("bob", "u2")], &existing(vec![local]));

        assert!(plan.inserts.is_empty());
        assert!(plan.removals.is_empty());
        assert_eq!(plan.skipped.len(), 1);
    }

    #[test]
    fn test_duplicate_staged_username_keeps_first() {
        let resolver = ConflictResolver::new(Provider::Ldap, ConflictStrategy::Ignore);

        let plan = resolver.resolve(
            vec![staged("sam", "u1"), staged("sam", "u2")],
            &existing(vec![]),
        );

        assert_eq!(plan.inserts.len(), 1);
        assert_eq!(plan.inserts[0].external_id(Provider::Ldap), Some("u1"));
        assert_eq!(plan.skipped.len(), 1);
    }

    #[test]
    fn test_resolution_is_order_independent() {
        let resolver =
            ConflictResolver::new(Provider::Ldap, ConflictStrategy::WriteNewAndRenameOld);
        let locals = existing(vec![holder(1, "ann"), holder(2, "ben")]);

        let forward = resolver.resolve(vec![staged("ann", "u1"), staged("ben", "u2")], &locals);
        let reverse = resolver.resolve(vec![staged("ben", "u2"), staged("ann", "u1")], &locals);

        assert_eq!(forward.inserts.len(), 2);
        assert_eq!(reverse.inserts.len(), 2);
        let mut forward_renames: Vec<String> =
            forward.renames.iter().map(|a| a.username.clone()).collect();
        let mut reverse_renames: Vec<String> =
            reverse.renames.iter().map(|a| a.username.clone()).collect();
        forward_renames.sort();
        reverse_renames.sort();
        assert_eq!(forward_renames, reverse_renames);
    }

    #[test]
    fn test_strategy_deserialization() {
        let strategy: ConflictStrategy =
            serde_json::from_str("\"write_new_and_remove_old\"").unwrap();
        assert_eq!(strategy, ConflictStrategy::WriteNewAndRemoveOld);
        assert_eq!(strategy.to_string(), "write_new_and_remove_old");
    }
}
