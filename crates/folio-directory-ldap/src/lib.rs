//! # folio-directory-ldap
//!
//! LDAP adapter for the folio directory abstraction.
//!
//! Lists users beneath a configurable base DN, maps entries to
//! [`folio_directory::ExternalIdentity`] via configurable attribute
//! names (`entryUUID`, `uid`, `mail` by default) and resolves
//! provider-side roles from `memberOf` group DNs. The adapter keeps
//! one bound connection and rebinds when the bind outlives
//! `max_bind_age_secs`.

pub mod config;
pub mod directory;

pub use config::LdapDirectoryConfig;
pub use directory::LdapDirectory;
