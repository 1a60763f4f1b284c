//! Public projection of an account.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::role::UserRole;

/// The slice of an account that downstream consumers may see.
///
/// Never carries credentials, external provider bindings or sync
/// bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicProfile {
    pub id: i64,
    pub username: String,
    pub email: Option<String>,
    pub roles: BTreeSet<UserRole>,
    pub enabled: bool,
    pub locked: bool,
    pub confirmed: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profile_serialization() {
        let profile = PublicProfile {
            id: 7,
            username: "alice".to_string(),
            email: Some("a@x.com".to_string()),
            roles: BTreeSet::from([UserRole::Reader]),
            enabled: true,
            locked: false,
            confirmed: true,
        };

        let json = serde_json::to_string(&profile).unwrap();
        assert!(json.contains("\"username\":\"alice\""));
        assert!(json.contains("\"reader\""));

        let restored: PublicProfile = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, profile);
    }
}
