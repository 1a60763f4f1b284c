//! # folio-sync
//!
//! Directory synchronization engine: reconciles the local user store
//! with an external identity provider and announces every change it
//! makes.
//!
//! A run works through three phases against one provider. The upsert
//! phase pages through the directory and creates or updates local
//! accounts, stamping each visited record with the run's start time.
//! The orphan phase deletes provider-bound accounts the run did not
//! see. The optional role phase reconciles role membership from the
//! provider's groups. Events are buffered per page and flushed only
//! after the page's writes have landed.
//!
//! ```rust,ignore
//! let config = ProviderSyncConfig::new().with_batch_size(200);
//! let orchestrator = SyncOrchestrator::new(directory, store, sink, config)?;
//! let summary = run_guarded(&lock, &orchestrator).await;
//! ```

pub mod config;
pub mod conflict;
pub mod error;
pub mod lock;
pub mod orchestrator;
pub mod rolemap;
pub mod schedule;
pub mod scheduler;
pub mod store;
pub mod summary;

pub use config::ProviderSyncConfig;
pub use conflict::{ConflictPlan, ConflictResolver, ConflictStrategy};
pub use error::{SyncError, SyncResult};
pub use lock::{run_guarded, sync_lock_name, MemorySyncLock, PgSyncLock, SyncLock};
pub use orchestrator::SyncOrchestrator;
pub use rolemap::{RoleMapEntry, RoleMapper};
pub use schedule::{ScheduleFrequency, SyncSchedule};
pub use scheduler::SyncScheduler;
pub use store::{MemoryUserStore, PgUserStore, StoreError, StoreResult, UserStore};
pub use summary::{RunError, RunStatus, RunSummary};
