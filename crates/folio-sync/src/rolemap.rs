//! Mapping of provider role tokens onto internal roles.

use std::collections::{BTreeMap, BTreeSet};

use folio_model::UserRole;
use serde::Deserialize;
use tracing::debug;

/// One row of the role mapping table: the provider's name for a role
/// and the internal role it grants.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RoleMapEntry {
    /// The provider-side token (an LDAP group CN, a Keycloak role name).
    pub their: String,

    /// The internal role granted for it.
    pub our: UserRole,
}

impl RoleMapEntry {
    pub fn new(their: impl Into<String>, our: UserRole) -> Self {
        Self {
            their: their.into(),
            our,
        }
    }
}

/// Declarative translation of provider role tokens.
///
/// Several tokens may grant the same internal role; tokens without an
/// entry are dropped.
#[derive(Debug, Clone, Default)]
pub struct RoleMapper {
    entries: Vec<RoleMapEntry>,
}

impl RoleMapper {
    pub fn new(entries: Vec<RoleMapEntry>) -> Self {
        Self { entries }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The internal role for one token, if mapped.
    pub fn map_token(&self, token: &str) -> Option<UserRole> {
        self.entries
            .iter()
            .find(|entry| entry.their == token)
            .map(|entry| entry.our)
    }

    /// Translate a whole token set into internal roles.
    pub fn map(&self, tokens: &BTreeSet<String>) -> BTreeSet<UserRole> {
        let mut roles = BTreeSet::new();
        for token in tokens {
            match self.map_token(token) {
                Some(role) => {
                    roles.insert(role);
                }
                None => debug!(token = %token, "dropping unmapped role token"),
            }
        }
        roles
    }

    /// The table grouped by internal role, for membership sweeps.
    pub fn by_role(&self) -> BTreeMap<UserRole, Vec<&str>> {
        let mut grouped: BTreeMap<UserRole, Vec<&str>> = BTreeMap::new();
        for entry in &self.entries {
            grouped
                .entry(entry.our)
                .or_default()
                .push(entry.their.as_str());
        }
        grouped
    }
}
