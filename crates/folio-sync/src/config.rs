//! Per-provider sync configuration.

use serde::Deserialize;

use crate::conflict::ConflictStrategy;
use crate::error::{SyncError, SyncResult};
use crate::rolemap::RoleMapEntry;
use crate::schedule::SyncSchedule;

/// Configuration for synchronizing one provider.
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderSyncConfig {
    /// Whether runs for this provider do anything at all.
    #[serde(default)]
    pub enabled: bool,

    /// Page size for directory listings and store sweeps.
    #[serde(default = "default_batch_size")]
    pub batch_size: u32,

    /// How username collisions on insert are resolved.
    #[serde(default)]
    pub conflict_strategy: ConflictStrategy,

    /// Mirror the provider's email-verified flag into `confirmed`.
    #[serde(default)]
    pub sync_email_verified: bool,

    /// Run the role membership phase after the account phases.
    #[serde(default)]
    pub sync_roles: bool,

    /// Provider role tokens and the internal roles they grant.
    #[serde(default)]
    pub role_map: Vec<RoleMapEntry>,

    /// When scheduled runs happen.
    #[serde(default)]
    pub schedule: SyncSchedule,
}

fn default_batch_size() -> u32 {
    100
}

impl Default for ProviderSyncConfig {
    /// A disabled configuration with stock settings.
    fn default() -> Self {
        Self {
            enabled: false,
            batch_size: default_batch_size(),
            conflict_strategy: ConflictStrategy::default(),
            sync_email_verified: false,
            sync_roles: false,
            role_map: Vec::new(),
            schedule: SyncSchedule::default(),
        }
    }
}

impl ProviderSyncConfig {
    /// Create an enabled configuration with stock settings.
    pub fn new() -> Self {
        Self {
            enabled: true,
            ..Self::default()
        }
    }

    /// Set the page size.
    pub fn with_batch_size(mut self, batch_size: u32) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Set the conflict strategy.
    pub fn with_conflict_strategy(mut self, strategy: ConflictStrategy) -> Self {
        self.conflict_strategy = strategy;
        self
    }

    /// Mirror the provider's email-verified flag into `confirmed`.
    #[must_use]
    pub fn with_email_verified_sync(mut self) -> Self {
        self.sync_email_verified = true;
        self
    }

    /// Enable the role membership phase.
    #[must_use]
    pub fn with_role_sync(mut self) -> Self {
        self.sync_roles = true;
        self
    }

    /// Set the role mapping table.
    pub fn with_role_map(mut self, role_map: Vec<RoleMapEntry>) -> Self {
        self.role_map = role_map;
        self
    }

    /// Set the run schedule.
    pub fn with_schedule(mut self, schedule: SyncSchedule) -> Self {
        self.schedule = schedule;
        self
    }

    pub fn validate(&self) -> SyncResult<()> {
        if self.batch_size == 0 {
            return Err(SyncError::configuration("batch_size must be positive"));
        }

        self.schedule.validate().map_err(SyncError::configuration)?;

        Ok(())
    }
}
