//! The synchronization run.
//!
//! [`SyncOrchestrator::run_sync`] drives one full run against one
//! provider: upsert the directory's listing page by page, delete
//! accounts the run did not see, then reconcile role membership when
//! enabled. Every change lands in the store before its event is
//! flushed, and every visited record gets the run's start time as its
//! new sync watermark.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use folio_directory::{DirectoryClient, ExternalIdentity, PageRequest};
use folio_events::{EventBuffer, EventSink, ProfileEvent};
use folio_model::{NewUserAccount, Provider, UserAccount, UserRole};
use tracing::{debug, error, info, instrument, warn};

use crate::config::ProviderSyncConfig;
use crate::conflict::ConflictResolver;
use crate::error::SyncResult;
use crate::rolemap::RoleMapper;
use crate::store::{StoreError, UserStore};
use crate::summary::RunSummary;

/// Mutable state of one run: the watermark, the event buffer, and the
/// summary under construction.
struct RunContext {
    started_at: DateTime<Utc>,
    events: EventBuffer,
    summary: RunSummary,
}

impl RunContext {
    fn new(provider: Provider) -> Self {
        let started_at = Utc::now();
        Self {
            started_at,
            events: EventBuffer::new(),
            summary: RunSummary::started(provider, started_at),
        }
    }
}

/// Synchronizes one provider into the local user store.
pub struct SyncOrchestrator {
    directory: Arc<dyn DirectoryClient>,
    store: Arc<dyn UserStore>,
    sink: Arc<dyn EventSink>,
    config: ProviderSyncConfig,
    mapper: RoleMapper,
    resolver: ConflictResolver,
}

impl SyncOrchestrator {
    /// Build an orchestrator, rejecting unusable configuration.
    pub fn new(
        directory: Arc<dyn DirectoryClient>,
        store: Arc<dyn UserStore>,
        sink: Arc<dyn EventSink>,
        config: ProviderSyncConfig,
    ) -> SyncResult<Self> {
        config.validate()?;

        let provider = directory.provider();
        let mapper = RoleMapper::new(config.role_map.clone());
        let resolver = ConflictResolver::new(provider, config.conflict_strategy);

        Ok(Self {
            directory,
            store,
            sink,
            config,
            mapper,
            resolver,
        })
    }

    pub fn provider(&self) -> Provider {
        self.directory.provider()
    }

    pub fn config(&self) -> &ProviderSyncConfig {
        &self.config
    }

    /// Run one full synchronization.
    ///
    /// Never returns an error: an abort is recorded in the summary,
    /// pages committed before it stand, and buffered events are
    /// flushed either way.
    #[instrument(skip(self), fields(provider = %self.provider()))]
    pub async fn run_sync(&self) -> RunSummary {
        if !self.config.enabled {
            debug!("sync disabled for this provider");
            return RunSummary::skipped(self.provider());
        }

        let mut ctx = RunContext::new(self.provider());
        info!(started_at = %ctx.started_at, "sync run starting");

        let outcome = self.run_phases(&mut ctx).await;

        // Changes committed right before an abort still get announced.
        ctx.events.flush_remaining(self.sink.as_ref()).await;

        match outcome {
            Ok(()) => {
                ctx.summary.complete();
                info!(
                    pages = ctx.summary.pages,
                    fetched = ctx.summary.fetched,
                    created = ctx.summary.created,
                    updated = ctx.summary.updated,
                    touched = ctx.summary.touched,
                    deleted = ctx.summary.deleted,
                    skipped = ctx.summary.skipped,
                    failed = ctx.summary.failed,
                    "sync run completed"
                );
            }
            Err(run_error) => {
                error!(error = %run_error, "sync run aborted");
                ctx.summary.fail(run_error.to_string());
            }
        }

        ctx.summary
    }

    async fn run_phases(&self, ctx: &mut RunContext) -> SyncResult<()> {
        self.upsert_phase(ctx).await?;
        self.orphan_phase(ctx).await?;
        if self.config.sync_roles {
            self.role_phase(ctx).await?;
        }
        Ok(())
    }

    /// Pull directory pages and reconcile each against the store until
    /// a short page signals the end of the listing.
    async fn upsert_phase(&self, ctx: &mut RunContext) -> SyncResult<()> {
        let mut page = PageRequest::new(self.config.batch_size);

        loop {
            let identities = self.directory.list_page(page).await?;
            let returned = identities.len();
            ctx.summary.record_page(returned);
            debug!(offset = page.offset, returned, "processing directory page");

            self.process_page(ctx, identities).await?;
            ctx.events.flush(self.sink.as_ref()).await;

            if page.is_last(returned) {
                break;
            }
            page = page.next();
        }

        Ok(())
    }

    async fn process_page(
        &self,
        ctx: &mut RunContext,
        identities: Vec<ExternalIdentity>,
    ) -> SyncResult<()> {
        let provider = self.provider();

        let mut usable: Vec<ExternalIdentity> = Vec::with_capacity(identities.len());
        for identity in identities {
            if identity.external_id.trim().is_empty() {
                warn!(username = %identity.username, "directory record has a blank external id, skipping");
                ctx.summary.record_skipped(1);
                continue;
            }
            usable.push(identity);
        }

        let external_ids: Vec<String> = usable
            .iter()
            .map(|identity| identity.external_id.clone())
            .collect();
        let mut by_external_id: HashMap<String, UserAccount> = HashMap::new();
        for account in self
            .store
            .find_by_external_ids(provider, &external_ids)
            .await?
        {
            if let Some(id) = account.external_id(provider) {
                let id = id.to_string();
                by_external_id.insert(id, account);
            }
        }

        let mut touch_ids: Vec<i64> = Vec::new();
        let mut staged: Vec<NewUserAccount> = Vec::new();

        for identity in usable {
            match by_external_id.remove(&identity.external_id) {
                Some(account) => {
                    self.reconcile_existing(ctx, &mut touch_ids, account, &identity)
                        .await?;
                }
                None => staged.push(self.new_account(&identity, ctx.started_at)),
            }
        }

        if !touch_ids.is_empty() {
            self.store
                .mark_all_synced(&touch_ids, provider, ctx.started_at)
                .await?;
            ctx.summary.record_touched(touch_ids.len());
        }

        if !staged.is_empty() {
            self.insert_staged(ctx, staged).await?;
        }

        Ok(())
    }

    /// Diff one bound account against its directory record. A changed
    /// account is saved and announced; an unchanged one only queues a
    /// watermark touch.
    async fn reconcile_existing(
        &self,
        ctx: &mut RunContext,
        touch_ids: &mut Vec<i64>,
        mut account: UserAccount,
        identity: &ExternalIdentity,
    ) -> SyncResult<()> {
        if !self.apply_identity(&mut account, identity) {
            touch_ids.push(account.id);
            return Ok(());
        }

        let provider = self.provider();
        account.mark_synced(provider, ctx.started_at);

        match self.store.save(&account).await {
            Ok(()) => {
                ctx.summary.record_updated();
                ctx.events.push(ProfileEvent::updated(provider, &account));
            }
            Err(StoreError::Database(db_error)) => {
                return Err(StoreError::Database(db_error).into());
            }
            Err(save_error) => {
                warn!(username = %account.username, error = %save_error, "could not persist account update");
                ctx.summary.record_failure(
                    account.external_id(provider).map(String::from),
                    Some(account.username.clone()),
                    save_error.to_string(),
                );
            }
        }

        Ok(())
    }

    /// Apply the provider's view of one identity onto the account.
    /// Returns whether anything changed.
    fn apply_identity(&self, account: &mut UserAccount, identity: &ExternalIdentity) -> bool {
        let mut changed = false;

        if account.username != identity.username {
            account.username = identity.username.clone();
            changed = true;
        }

        // A directory without emails never erases a local one.
        if let Some(ref email) = identity.email {
            if account.email.as_ref() != Some(email) {
                account.email = Some(email.clone());
                changed = true;
            }
        }

        if account.enabled != identity.enabled {
            account.enabled = identity.enabled;
            changed = true;
        }

        if self.config.sync_email_verified {
            if let Some(verified) = identity.email_verified {
                if account.confirmed != verified {
                    account.confirmed = verified;
                    changed = true;
                }
            }
        }

        // Providers that do not report role tokens leave roles alone.
        if let Some(ref tokens) = identity.role_tokens {
            let roles = self.mapper.map(tokens);
            if account.roles != roles {
                account.roles = roles;
                changed = true;
            }
        }

        changed
    }

    /// The insert shape for a directory record with no local account.
    fn new_account(&self, identity: &ExternalIdentity, watermark: DateTime<Utc>) -> NewUserAccount {
        let provider = self.provider();

        let mut account = NewUserAccount::new(identity.username.clone());
        account.email = identity.email.clone();
        account.enabled = identity.enabled;
        if self.config.sync_email_verified {
            if let Some(verified) = identity.email_verified {
                account.confirmed = verified;
            }
        }
        if let Some(ref tokens) = identity.role_tokens {
            account.roles = self.mapper.map(tokens);
        }
        account.set_external_id(provider, identity.external_id.clone());
        account.mark_synced(provider, watermark);
        account
    }

    /// Resolve username collisions for the staged inserts, then apply
    /// the plan: removals, renames, inserts, in that order.
    async fn insert_staged(
        &self,
        ctx: &mut RunContext,
        staged: Vec<NewUserAccount>,
    ) -> SyncResult<()> {
        let provider = self.provider();

        let usernames: Vec<String> = staged
            .iter()
            .map(|account| account.username.clone())
            .collect();
        let holders: HashMap<String, UserAccount> = self
            .store
            .find_by_usernames(&usernames)
            .await?
            .into_iter()
            .map(|account| (account.username.clone(), account))
            .collect();

        let plan = self.resolver.resolve(staged, &holders);
        ctx.summary.record_skipped(plan.skipped.len());

        if !plan.removals.is_empty() {
            let ids: Vec<i64> = plan.removals.iter().map(|account| account.id).collect();
            self.store.delete_all_by_id(&ids).await?;
            ctx.summary.record_deleted(plan.removals.len());
            for account in &plan.removals {
                ctx.events.push(ProfileEvent::deleted(provider, account));
            }
        }

        for account in &plan.renames {
            match self.store.save(account).await {
                Ok(()) => {
                    ctx.summary.record_updated();
                    ctx.events.push(ProfileEvent::updated(provider, account));
                }
                Err(StoreError::Database(db_error)) => {
                    return Err(StoreError::Database(db_error).into());
                }
                Err(save_error) => {
                    warn!(username = %account.username, error = %save_error, "could not rename colliding account");
                    ctx.summary.record_failure(
                        None,
                        Some(account.username.clone()),
                        save_error.to_string(),
                    );
                }
            }
        }

        if plan.inserts.is_empty() {
            return Ok(());
        }

        match self.store.insert_all(plan.inserts.clone()).await {
            Ok(inserted) => {
                ctx.summary.record_created(inserted.len());
                for account in &inserted {
                    ctx.events.push(ProfileEvent::created(provider, account));
                }
            }
            Err(StoreError::Database(db_error)) => {
                return Err(StoreError::Database(db_error).into());
            }
            Err(batch_error) => {
                // One bad record fails the whole batch; retry row by
                // row so the rest of the page still lands.
                warn!(error = %batch_error, "batch insert failed, retrying records individually");
                for account in plan.inserts {
                    let username = account.username.clone();
                    let external_id = account.external_id(provider).map(String::from);
                    match self.store.insert_all(vec![account]).await {
                        Ok(inserted) => {
                            ctx.summary.record_created(inserted.len());
                            for account in &inserted {
                                ctx.events.push(ProfileEvent::created(provider, account));
                            }
                        }
                        Err(StoreError::Database(db_error)) => {
                            return Err(StoreError::Database(db_error).into());
                        }
                        Err(insert_error) => {
                            warn!(username = %username, error = %insert_error, "could not insert account");
                            ctx.summary.record_failure(
                                external_id,
                                Some(username),
                                insert_error.to_string(),
                            );
                        }
                    }
                }
            }
        }

        Ok(())
    }

    /// Delete accounts bound to this provider that the run did not
    /// visit: watermark older than the run start, or never set.
    async fn orphan_phase(&self, ctx: &mut RunContext) -> SyncResult<()> {
        let provider = self.provider();
        let limit = self.config.batch_size;

        loop {
            // Deleted rows leave the result set, so every query scans
            // from the top.
            let orphans = self
                .store
                .find_stale_older_than(provider, ctx.started_at, limit, 0)
                .await?;
            if orphans.is_empty() {
                break;
            }

            let ids: Vec<i64> = orphans.iter().map(|account| account.id).collect();
            self.store.delete_all_by_id(&ids).await?;
            ctx.summary.record_deleted(orphans.len());

            for account in &orphans {
                debug!(username = %account.username, "deleted orphaned account");
                ctx.events.push(ProfileEvent::deleted(provider, account));
            }
            ctx.events.flush(self.sink.as_ref()).await;

            if orphans.len() < limit as usize {
                break;
            }
        }

        Ok(())
    }

    /// Reconcile role membership for every mapped internal role.
    async fn role_phase(&self, ctx: &mut RunContext) -> SyncResult<()> {
        let grouped = self.mapper.by_role();
        if grouped.is_empty() {
            debug!("role sync enabled but the role map is empty");
            return Ok(());
        }

        for (role, tokens) in grouped {
            let members = self.fetch_role_members(&tokens).await?;
            self.grant_role(ctx, role, &members).await?;
            self.revoke_role(ctx, role, &members).await?;
            ctx.events.flush(self.sink.as_ref()).await;
        }

        Ok(())
    }

    /// The union of member external ids across all of a role's tokens.
    async fn fetch_role_members(&self, tokens: &[&str]) -> SyncResult<BTreeSet<String>> {
        let mut members = BTreeSet::new();

        for token in tokens {
            let mut page = PageRequest::new(self.config.batch_size);
            loop {
                let batch = self.directory.list_role_members_page(token, page).await?;
                let returned = batch.len();
                for identity in batch {
                    if identity.external_id.trim().is_empty() {
                        continue;
                    }
                    members.insert(identity.external_id);
                }
                if page.is_last(returned) {
                    break;
                }
                page = page.next();
            }
        }

        Ok(members)
    }

    /// Grant `role` to current members that lack it.
    async fn grant_role(
        &self,
        ctx: &mut RunContext,
        role: UserRole,
        members: &BTreeSet<String>,
    ) -> SyncResult<()> {
        let provider = self.provider();
        let member_ids: Vec<String> = members.iter().cloned().collect();

        for chunk in member_ids.chunks(self.config.batch_size as usize) {
            let accounts = self.store.find_by_external_ids(provider, chunk).await?;
            let mut granted: Vec<UserAccount> = Vec::new();

            for mut account in accounts {
                if account.grant_role(role) {
                    granted.push(account);
                }
            }

            if granted.is_empty() {
                continue;
            }

            self.store.save_all(&granted).await?;
            ctx.summary.record_role_grants(granted.len());
            for account in &granted {
                debug!(username = %account.username, %role, "granted role");
                ctx.events.push(ProfileEvent::updated(provider, account));
            }
        }

        Ok(())
    }

    /// Revoke `role` from provider-bound holders that are no longer
    /// members.
    async fn revoke_role(
        &self,
        ctx: &mut RunContext,
        role: UserRole,
        members: &BTreeSet<String>,
    ) -> SyncResult<()> {
        let provider = self.provider();
        let limit = self.config.batch_size;
        let mut offset = 0u32;

        loop {
            let holders = self.store.find_by_role(provider, role, limit, offset).await?;
            let returned = holders.len();

            let mut revoked: Vec<UserAccount> = Vec::new();
            let mut kept = 0u32;

            for mut account in holders {
                let is_member = account
                    .external_id(provider)
                    .is_some_and(|id| members.contains(id));
                if is_member {
                    kept += 1;
                    continue;
                }
                if account.revoke_role(role) {
                    revoked.push(account);
                }
            }

            if !revoked.is_empty() {
                self.store.save_all(&revoked).await?;
                ctx.summary.record_role_revocations(revoked.len());
                for account in &revoked {
                    debug!(username = %account.username, %role, "revoked role");
                    ctx.events.push(ProfileEvent::updated(provider, account));
                }
            }

            // Revoked rows leave the result set; only the kept ones
            // advance the offset.
            offset += kept;

            if returned < limit as usize {
                break;
            }
        }

        Ok(())
    }
}
