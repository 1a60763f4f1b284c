//! # folio-directory-keycloak
//!
//! Keycloak adapter for the folio directory abstraction.
//!
//! Talks to the Keycloak admin REST API of one realm, authenticating
//! with a confidential client via the client-credentials grant. Access
//! tokens are cached and refreshed ahead of expiry; a `401` from the
//! admin API drops the cached token so the next call starts from a
//! fresh grant.

pub mod auth;
pub mod config;
pub mod directory;

pub use auth::TokenCache;
pub use config::KeycloakDirectoryConfig;
pub use directory::KeycloakDirectory;
