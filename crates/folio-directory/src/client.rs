//! The directory client trait.

use async_trait::async_trait;
use folio_model::Provider;

use crate::error::DirectoryResult;
use crate::identity::ExternalIdentity;
use crate::page::PageRequest;

/// A directory provider that can list its user identities.
///
/// Implementations own their transport and credential lifecycle; every
/// method must be callable at any time without an explicit connect
/// step. Listings must be stable for the duration of one run: the same
/// offset-based paging walked twice without directory changes yields
/// the same pages.
#[async_trait]
pub trait DirectoryClient: Send + Sync {
    /// Which provider this client speaks for.
    fn provider(&self) -> Provider;

    /// List one page of user identities.
    ///
    /// Returning fewer than `page.page_size` entries marks the final
    /// page.
    async fn list_page(&self, page: PageRequest) -> DirectoryResult<Vec<ExternalIdentity>>;

    /// List one page of members of a provider-side role or group.
    ///
    /// `role_token` is the provider's name for the role (an LDAP group
    /// CN, a Keycloak realm role name). Only `external_id` is guaranteed
    /// to be populated on the returned identities.
    async fn list_role_members_page(
        &self,
        role_token: &str,
        page: PageRequest,
    ) -> DirectoryResult<Vec<ExternalIdentity>>;

    /// Verify connectivity and credentials without listing users.
    async fn test_connection(&self) -> DirectoryResult<()>;
}
