// Reconciliation between local state and the remote store.
//
// Every state-changing action runs in two halves. The local half updates the
// in-memory cache and the SQLite repository immediately and queues the
// matching remote writes. The remote half (`sync`) replays that queue and
// reloads the remote stores, merging what comes back with local state.

pub mod merge;
pub mod retry;

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::Result;
use tracing::{debug, info, warn};

use crate::backend::{AvailabilityBatch, ChampionBackend};
use crate::db::Database;
use crate::draft::pool::{ChampionPool, ChampionRoles, RoleIndex};
use crate::draft::role::Role;
use crate::draft::session::LockIn;
use crate::draft::team::{now_millis, sort_newest_first, RoleMapping, SavedTeam};

use merge::merge_by_key;
use retry::{retry_decision, PendingWrite, RetryDecision};

/// In-memory view of the remote stores with local writes applied on top.
struct Cache {
    pool: ChampionPool,
    index: RoleIndex,
    /// Last availability read per role. Roles never read successfully are
    /// absent and computed from the pool instead.
    availability: BTreeMap<Role, Vec<String>>,
    /// Newest first.
    saved_teams: Vec<SavedTeam>,
}

impl Cache {
    fn set_pool(&mut self, pool: ChampionPool) {
        self.index = RoleIndex::from_pool(&pool);
        self.pool = pool;
    }

    fn mark_available(&mut self, role: Role, champion: &str) {
        if !self.pool.contains(role, champion) {
            return;
        }
        if let Some(list) = self.availability.get_mut(&role) {
            if !list.iter().any(|c| c == champion) {
                list.push(champion.to_string());
                list.sort();
            }
        }
    }

    fn mark_unavailable(&mut self, role: Role, champion: &str) {
        if let Some(list) = self.availability.get_mut(&role) {
            list.retain(|c| c != champion);
        }
    }

    /// Local effect of `write`. Applying the same queue twice leaves the
    /// cache as applying it once.
    fn apply(&mut self, write: &PendingWrite) {
        match write {
            PendingWrite::RemoveAvailable { role, champion } => {
                self.mark_unavailable(*role, champion)
            }
            PendingWrite::RestoreAvailable { role, champion } => {
                self.mark_available(*role, champion)
            }
            PendingWrite::SetUnavailable {
                champion,
                drafted_as,
            } => {
                for role in self.index.fan_out(champion, Some(*drafted_as)) {
                    self.mark_unavailable(role, champion);
                }
            }
            PendingWrite::ResetRole { role } => {
                let champions = self.pool.champions(*role).to_vec();
                for champion in &champions {
                    for r in self.index.roles_for(champion) {
                        self.mark_available(r, champion);
                    }
                }
            }
            PendingWrite::SaveTeam { team } => {
                self.saved_teams.retain(|t| t.timestamp != team.timestamp);
                self.saved_teams.push(team.clone());
                sort_newest_first(&mut self.saved_teams);
            }
            PendingWrite::DeleteTeam { timestamp } => {
                self.saved_teams.retain(|t| t.timestamp != *timestamp)
            }
            PendingWrite::DeleteAllTeams => self.saved_teams.clear(),
            PendingWrite::SaveChampionRoles { roles } => {
                let pool = ChampionPool::from_champion_roles(roles);
                if !pool.is_empty() {
                    self.set_pool(pool);
                }
            }
        }
    }
}

/// Local-first gateway to the availability store and the team ledger.
pub struct Reconciler {
    backend: Arc<dyn ChampionBackend>,
    db: Arc<Database>,
    cache: Mutex<Cache>,
    /// Held by every local mutation and by every install of remote data,
    /// so a reload never overlays a queue that is missing a staged write.
    local_lock: Mutex<()>,
    /// Held across a queue replay and the reloads that follow it, so no
    /// write is sent twice and no stale read lands after a newer flush.
    remote_lock: tokio::sync::Mutex<()>,
    max_write_attempts: u32,
    /// Mark locked champions unavailable with one `set_champion_unavailable`
    /// call instead of one removal per role.
    server_side_fan_out: bool,
}

impl Reconciler {
    /// Build a reconciler over `db`'s cached ledger. `fallback` is the pool
    /// used until champion roles are loaded from the backend.
    pub fn new(
        backend: Arc<dyn ChampionBackend>,
        db: Arc<Database>,
        fallback: ChampionPool,
        max_write_attempts: u32,
    ) -> Result<Self> {
        let mut cache = Cache {
            pool: ChampionPool::default(),
            index: RoleIndex::default(),
            availability: BTreeMap::new(),
            saved_teams: db.load_saved_teams()?,
        };
        cache.set_pool(fallback);

        // Writes queued by a previous run still shape local state.
        let pending = db.load_pending_writes()?;
        for queued in &pending {
            cache.apply(&queued.write);
        }
        if !pending.is_empty() {
            info!(count = pending.len(), "pending writes carried over from last run");
        }

        Ok(Self {
            backend,
            db,
            cache: Mutex::new(cache),
            local_lock: Mutex::new(()),
            remote_lock: tokio::sync::Mutex::new(()),
            max_write_attempts: max_write_attempts.max(1),
            server_side_fan_out: false,
        })
    }

    /// Let the store fan a lock-in out across the champion's roles.
    pub fn with_server_side_fan_out(mut self, enabled: bool) -> Self {
        self.server_side_fan_out = enabled;
        self
    }

    fn cache(&self) -> MutexGuard<'_, Cache> {
        self.cache.lock().expect("reconciler cache mutex poisoned")
    }

    fn local(&self) -> MutexGuard<'_, ()> {
        self.local_lock.lock().expect("reconciler local mutex poisoned")
    }

    pub fn database(&self) -> &Arc<Database> {
        &self.db
    }

    pub fn pool(&self) -> ChampionPool {
        self.cache().pool.clone()
    }

    pub fn roles_for(&self, champion: &str) -> Vec<Role> {
        self.cache().index.roles_for(champion)
    }

    /// Cached ledger, newest first.
    pub fn saved_teams(&self) -> Vec<SavedTeam> {
        self.cache().saved_teams.clone()
    }

    pub fn pending_write_count(&self) -> Result<usize> {
        Ok(self.db.load_pending_writes()?.len())
    }

    /// A lock-in timestamp no cached team already uses.
    pub fn next_timestamp(&self) -> i64 {
        let cache = self.cache();
        let mut timestamp = now_millis();
        while cache.saved_teams.iter().any(|t| t.timestamp == timestamp) {
            timestamp += 1;
        }
        timestamp
    }

    // ------------------------------------------------------------------
    // Candidates
    // ------------------------------------------------------------------

    /// Available champions for `role` without a network call: the last
    /// remote read with local writes applied, or, if the role was never
    /// read, the pool minus champions this device has played since the
    /// last reset.
    pub fn cached_availability(&self, role: Role) -> Result<Vec<String>> {
        if let Some(list) = self.cache().availability.get(&role) {
            return Ok(list.clone());
        }
        let played = self.live_played()?;
        let cache = self.cache();
        Ok(cache
            .pool
            .champions(role)
            .iter()
            .filter(|c| !played.contains(c.as_str()))
            .cloned()
            .collect())
    }

    /// Played champions not yet brought back by a reset of any role they
    /// can play.
    fn live_played(&self) -> Result<BTreeSet<String>> {
        let mut markers = BTreeMap::new();
        for role in Role::ALL {
            if let Some(at) = self.db.reset_marker(role)? {
                markers.insert(role, at);
            }
        }
        let played = self.db.played_champions()?;
        let cache = self.cache();
        Ok(played
            .into_iter()
            .filter(|(champion, role, played_at)| {
                !cache
                    .index
                    .fan_out(champion, Some(*role))
                    .iter()
                    .any(|r| markers.get(r).is_some_and(|reset_at| reset_at > played_at))
            })
            .map(|(champion, _, _)| champion)
            .collect())
    }

    /// Pick candidates for `role`: cached availability minus every champion
    /// held by another session's incomplete team on this device.
    pub fn available_champions(&self, role: Role, own_session: Option<&str>) -> Result<Vec<String>> {
        let base = self.cached_availability(role)?;
        let mut held = BTreeSet::new();
        for snapshot in self.db.load_incomplete_teams()? {
            if Some(snapshot.session_id.as_str()) == own_session {
                continue;
            }
            held.extend(snapshot.held_champions());
        }
        Ok(base.into_iter().filter(|c| !held.contains(c)).collect())
    }

    // ------------------------------------------------------------------
    // Local half of each action
    // ------------------------------------------------------------------

    /// Queue `writes` for the remote store, then apply them to the cache.
    /// Callers hold the local lock.
    fn stage(&self, writes: &[PendingWrite]) -> Result<()> {
        for write in writes {
            self.db.enqueue_write(write)?;
        }
        let mut cache = self.cache();
        for write in writes {
            cache.apply(write);
        }
        Ok(())
    }

    /// One write per (role, champion) for every pick of `team`, across all
    /// roles each champion can play.
    fn fan_out_writes<F>(&self, team: &SavedTeam, make: F) -> Vec<PendingWrite>
    where
        F: Fn(Role, &str) -> PendingWrite,
    {
        let cache = self.cache();
        let mut writes = Vec::new();
        for (drafted_as, champion) in team.picks() {
            for role in cache.index.fan_out(champion, Some(drafted_as)) {
                writes.push(make(role, champion));
            }
        }
        writes
    }

    fn removal_writes(&self, team: &SavedTeam) -> Vec<PendingWrite> {
        self.fan_out_writes(team, |role, champion| PendingWrite::RemoveAvailable {
            role,
            champion: champion.to_string(),
        })
    }

    fn restore_writes(&self, team: &SavedTeam) -> Vec<PendingWrite> {
        self.fan_out_writes(team, |role, champion| PendingWrite::RestoreAvailable {
            role,
            champion: champion.to_string(),
        })
    }

    fn unavailable_writes(&self, team: &SavedTeam) -> Vec<PendingWrite> {
        team.picks()
            .map(|(drafted_as, champion)| PendingWrite::SetUnavailable {
                champion: champion.to_string(),
                drafted_as,
            })
            .collect()
    }

    /// Consume a team's champions and append it to the ledger.
    fn record_team(&self, team: &SavedTeam) -> Result<()> {
        let _local = self.local();
        let mut writes = if self.server_side_fan_out {
            self.unavailable_writes(team)
        } else {
            self.removal_writes(team)
        };
        writes.push(PendingWrite::SaveTeam { team: team.clone() });

        for (role, champion) in team.picks() {
            self.db.record_played(champion, role, team.timestamp)?;
        }
        self.db.upsert_saved_team(team)?;
        self.stage(&writes)
    }

    /// Local half of lock-in: drop the session's snapshot, record the team
    /// and its champions, queue the remote writes.
    pub fn commit_lock_in(&self, lock_in: &LockIn) -> Result<()> {
        self.db.delete_incomplete_team(&lock_in.session_id)?;
        self.record_team(&lock_in.team)?;
        info!(
            timestamp = lock_in.team.timestamp,
            session_id = %lock_in.session_id,
            "team locked in"
        );
        Ok(())
    }

    /// Admin path: write a team flagged as admin-created. Consumes its
    /// champions like a lock-in. Returns `None` for an empty mapping.
    pub fn create_admin_team(&self, roles: &RoleMapping) -> Result<Option<SavedTeam>> {
        let team = SavedTeam::new(self.next_timestamp(), roles, true);
        if team.is_empty() {
            debug!("admin team ignored: no champions");
            return Ok(None);
        }
        self.record_team(&team)?;
        info!(timestamp = team.timestamp, "admin team created");
        Ok(Some(team))
    }

    /// Remove one team from the ledger and make its champions available in
    /// every role they can play. Returns `false` if the team is unknown.
    pub fn delete_saved_team(&self, timestamp: i64) -> Result<bool> {
        let team = self
            .cache()
            .saved_teams
            .iter()
            .find(|t| t.timestamp == timestamp)
            .cloned();
        let Some(team) = team else {
            debug!(timestamp, "delete ignored: no such team");
            return Ok(false);
        };

        let _local = self.local();
        let mut writes = vec![PendingWrite::DeleteTeam { timestamp }];
        writes.extend(self.restore_writes(&team));

        let champions: Vec<&str> = team.picks().map(|(_, c)| c).collect();
        self.db.delete_saved_team(timestamp)?;
        self.db.clear_played(&champions)?;
        self.stage(&writes)?;
        info!(timestamp, "saved team deleted");
        Ok(true)
    }

    /// Empty the ledger and restore every champion it referenced.
    pub fn clear_ledger(&self) -> Result<()> {
        let _local = self.local();
        let teams = self.saved_teams();
        let mut writes = vec![PendingWrite::DeleteAllTeams];
        let mut champions = BTreeSet::new();
        for team in &teams {
            writes.extend(self.restore_writes(team));
            champions.extend(team.picks().map(|(_, c)| c.to_string()));
        }

        let champions: Vec<String> = champions.into_iter().collect();
        self.db.clear_saved_teams()?;
        self.db.clear_played(&champions)?;
        self.stage(&writes)?;
        info!(teams = teams.len(), "ledger cleared");
        Ok(())
    }

    /// Make every champion of `roles` available again, whatever the ledger
    /// says.
    pub fn reset_by_roles(&self, roles: &[Role]) -> Result<()> {
        let roles: BTreeSet<Role> = roles.iter().copied().collect();
        if roles.is_empty() {
            return Ok(());
        }
        let _local = self.local();
        // Lock-in timestamps can run ahead of the clock; a reset must still
        // come after every champion already played.
        let latest_played = self
            .db
            .played_champions()?
            .iter()
            .map(|(_, _, played_at)| *played_at)
            .max();
        let reset_at = latest_played.map_or(now_millis(), |at| now_millis().max(at + 1));
        let mut writes = Vec::with_capacity(roles.len());
        for role in &roles {
            self.db.set_reset_marker(*role, reset_at)?;
            writes.push(PendingWrite::ResetRole { role: *role });
        }
        self.stage(&writes)?;
        info!(?roles, "roles reset");
        Ok(())
    }

    /// Replace the champion-role configuration. The pool and role index are
    /// rebuilt at once. An empty configuration is refused.
    pub fn save_champion_roles(&self, roles: &ChampionRoles) -> Result<bool> {
        if ChampionPool::from_champion_roles(roles).is_empty() {
            warn!("refusing to save an empty champion-role configuration");
            return Ok(false);
        }
        let _local = self.local();
        self.stage(&[PendingWrite::SaveChampionRoles {
            roles: roles.clone(),
        }])?;
        info!(champions = roles.len(), "champion roles updated");
        Ok(true)
    }

    // ------------------------------------------------------------------
    // Remote half
    // ------------------------------------------------------------------

    /// Install freshly loaded remote data with `install`, then re-apply the
    /// queued writes over it. Runs under the local lock so a write is never
    /// half staged while the queue is read.
    fn install_remote<F>(&self, install: F) -> Result<()>
    where
        F: FnOnce(&mut Cache),
    {
        let _local = self.local();
        let mut cache = self.cache();
        install(&mut *cache);
        for queued in self.db.load_pending_writes()? {
            cache.apply(&queued.write);
        }
        Ok(())
    }

    /// Replay the write queue in order. Stops at the first transient
    /// failure so later writes never overtake it. Returns how many writes
    /// were delivered.
    pub async fn flush_pending(&self) -> Result<usize> {
        let _remote = self.remote_lock.lock().await;
        self.flush_locked().await
    }

    async fn flush_locked(&self) -> Result<usize> {
        let queued = self.db.load_pending_writes()?;
        let mut delivered = 0;

        for entry in queued {
            let description = entry.write.describe();
            match entry.write.apply(self.backend.as_ref()).await {
                Ok(()) => {
                    self.db.delete_pending_write(entry.id)?;
                    delivered += 1;
                    debug!(write = %description, "pending write delivered");
                }
                Err(e) => match retry_decision(&e) {
                    RetryDecision::NoRetry => {
                        warn!(write = %description, "dropping rejected write: {e}");
                        self.db.delete_pending_write(entry.id)?;
                    }
                    RetryDecision::Retry => {
                        let attempts = self.db.bump_write_attempts(entry.id)?;
                        if attempts >= self.max_write_attempts {
                            warn!(write = %description, attempts, "giving up on write: {e}");
                            self.db.delete_pending_write(entry.id)?;
                            continue;
                        }
                        debug!(write = %description, attempts, "write failed, will retry: {e}");
                        break;
                    }
                },
            }
        }
        Ok(delivered)
    }

    /// Fetch the champion-role configuration and rebuild the pool from it.
    /// An empty configuration falls back to the per-role pools endpoint;
    /// the current pool is kept when neither yields anything.
    pub async fn load_champion_roles(&self) -> Result<ChampionRoles> {
        let _remote = self.remote_lock.lock().await;
        self.load_champion_roles_locked().await
    }

    async fn load_champion_roles_locked(&self) -> Result<ChampionRoles> {
        let pool = match self.backend.get_champion_roles().await {
            Ok(roles) => {
                let pool = ChampionPool::from_champion_roles(&roles);
                if pool.is_empty() {
                    self.load_champion_pools().await
                } else {
                    Some(pool)
                }
            }
            Err(e) => {
                warn!("failed to load champion roles, keeping current pool: {e}");
                None
            }
        };
        if let Some(pool) = pool {
            debug!(champions = pool.champion_count(), "champion pool reloaded");
            self.install_remote(|cache| cache.set_pool(pool))?;
        }
        Ok(self.cache().pool.to_champion_roles())
    }

    async fn load_champion_pools(&self) -> Option<ChampionPool> {
        match self.backend.get_champion_pools().await {
            Ok(pool) if !pool.is_empty() => Some(pool),
            Ok(_) => {
                warn!("remote champion pools are empty, keeping current pool");
                None
            }
            Err(e) => {
                warn!("failed to load champion pools, keeping current pool: {e}");
                None
            }
        }
    }

    /// Availability for one role. Falls back to cached data on failure.
    pub async fn load_availability(&self, role: Role) -> Result<Vec<String>> {
        let _remote = self.remote_lock.lock().await;
        match self.backend.get_available_champions(role).await {
            Ok(list) => self.install_remote(|cache| {
                cache.availability.insert(role, list);
            })?,
            Err(e) => warn!(%role, "failed to load availability, using cached list: {e}"),
        }
        self.cached_availability(role)
    }

    /// Availability for every role in one round trip.
    pub async fn load_availability_batch(&self) -> Result<AvailabilityBatch> {
        let _remote = self.remote_lock.lock().await;
        self.load_availability_batch_locked().await
    }

    async fn load_availability_batch_locked(&self) -> Result<AvailabilityBatch> {
        match self.backend.get_available_champions_batch().await {
            Ok(batch) => self.install_remote(|cache| cache.availability.extend(batch))?,
            Err(e) => warn!("failed to load availability batch, using cached lists: {e}"),
        }
        let mut out = AvailabilityBatch::new();
        for role in Role::ALL {
            out.insert(role, self.cached_availability(role)?);
        }
        Ok(out)
    }

    /// Fetch the ledger and merge it into the local cache by timestamp,
    /// remote winning. On failure the local cache is returned unchanged.
    pub async fn load_saved_teams(&self) -> Result<Vec<SavedTeam>> {
        let _remote = self.remote_lock.lock().await;
        self.load_saved_teams_locked().await
    }

    async fn load_saved_teams_locked(&self) -> Result<Vec<SavedTeam>> {
        let remote = match self.backend.get_saved_teams().await {
            Ok(teams) => teams,
            Err(e) => {
                warn!("failed to load saved teams, keeping local cache: {e}");
                return Ok(self.saved_teams());
            }
        };

        // Read, merge and write back under one local lock so a team locked
        // in meanwhile is neither missed nor overwritten.
        let _local = self.local();
        let local = self.db.load_saved_teams()?;
        let mut merged = merge_by_key(local, remote, |t| t.timestamp);
        sort_newest_first(&mut merged);

        let teams = {
            let mut cache = self.cache();
            cache.saved_teams = merged;
            for queued in self.db.load_pending_writes()? {
                cache.apply(&queued.write);
            }
            cache.saved_teams.clone()
        };
        self.db.replace_saved_teams(&teams)?;
        debug!(count = teams.len(), "saved teams reloaded");
        Ok(teams)
    }

    /// Full reconcile: replay queued writes, then reload champion roles,
    /// availability and the ledger.
    pub async fn sync(&self) -> Result<()> {
        let _remote = self.remote_lock.lock().await;
        let delivered = self.flush_locked().await?;
        self.load_champion_roles_locked().await?;
        self.load_availability_batch_locked().await?;
        self.load_saved_teams_locked().await?;
        debug!(delivered, "sync complete");
        Ok(())
    }
}
