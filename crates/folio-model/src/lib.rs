//! Core identity types shared across the folio platform.
//!
//! This crate defines the local account model, the provider and role
//! enumerations, and the public projection used in outbound event payloads.
//! It carries no persistence or transport concerns.

pub mod account;
pub mod profile;
pub mod provider;
pub mod role;

pub use account::{NewUserAccount, UserAccount};
pub use profile::PublicProfile;
pub use provider::Provider;
pub use role::UserRole;
