//! # folio-directory
//!
//! Provider abstraction for directory synchronization.
//!
//! A directory (LDAP, Keycloak, ...) is anything that can list its user
//! identities page by page. Implementations live in their own crates
//! (`folio-directory-ldap`, `folio-directory-keycloak`); the sync
//! engine only sees the [`DirectoryClient`] trait.

pub mod client;
pub mod error;
pub mod identity;
pub mod page;

pub use client::DirectoryClient;
pub use error::{DirectoryError, DirectoryResult};
pub use identity::ExternalIdentity;
pub use page::PageRequest;
