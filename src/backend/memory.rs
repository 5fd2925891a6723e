// In-process backend: offline mode when no server is configured, and the
// stand-in store for tests (including simulated outages).

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;

use super::{AvailabilityBatch, BackendError, ChampionBackend};
use crate::draft::pool::{ChampionPool, ChampionRoles};
use crate::draft::role::Role;
use crate::draft::team::SavedTeam;

struct Inner {
    champion_roles: ChampionRoles,
    /// Per-champion availability records. Absence means available.
    availability: BTreeMap<String, bool>,
    teams: Vec<SavedTeam>,
}

impl Inner {
    fn pool(&self) -> ChampionPool {
        ChampionPool::from_champion_roles(&self.champion_roles)
    }

    fn is_available(&self, champion: &str) -> bool {
        self.availability.get(champion).copied().unwrap_or(true)
    }

    fn available_for(&self, role: Role) -> Vec<String> {
        self.pool()
            .champions(role)
            .iter()
            .filter(|c| self.is_available(c))
            .cloned()
            .collect()
    }
}

pub struct InMemoryBackend {
    inner: Mutex<Inner>,
    offline: AtomicBool,
    writes_failing: AtomicBool,
}

impl InMemoryBackend {
    pub fn new(champion_roles: ChampionRoles) -> Self {
        Self {
            inner: Mutex::new(Inner {
                champion_roles,
                availability: BTreeMap::new(),
                teams: Vec::new(),
            }),
            offline: AtomicBool::new(false),
            writes_failing: AtomicBool::new(false),
        }
    }

    pub fn from_pool(pool: &ChampionPool) -> Self {
        Self::new(pool.to_champion_roles())
    }

    /// Make every call fail with `BackendError::Unavailable`.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Make only mutating calls fail; reads keep working.
    pub fn set_writes_failing(&self, failing: bool) {
        self.writes_failing.store(failing, Ordering::SeqCst);
    }

    pub fn is_available(&self, champion: &str) -> bool {
        self.inner().is_available(champion)
    }

    pub fn teams(&self) -> Vec<SavedTeam> {
        self.inner().teams.clone()
    }

    fn inner(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().expect("backend mutex poisoned")
    }

    fn read(&self) -> Result<MutexGuard<'_, Inner>, BackendError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(BackendError::Unavailable);
        }
        Ok(self.inner())
    }

    fn write(&self) -> Result<MutexGuard<'_, Inner>, BackendError> {
        if self.writes_failing.load(Ordering::SeqCst) {
            return Err(BackendError::Unavailable);
        }
        self.read()
    }
}

#[async_trait]
impl ChampionBackend for InMemoryBackend {
    async fn get_champion_pools(&self) -> Result<ChampionPool, BackendError> {
        Ok(self.read()?.pool())
    }

    async fn get_available_champions(&self, role: Role) -> Result<Vec<String>, BackendError> {
        Ok(self.read()?.available_for(role))
    }

    async fn get_available_champions_batch(&self) -> Result<AvailabilityBatch, BackendError> {
        let inner = self.read()?;
        Ok(Role::ALL
            .iter()
            .map(|role| (*role, inner.available_for(*role)))
            .collect())
    }

    async fn remove_available_champion(
        &self,
        _role: Role,
        champion: &str,
    ) -> Result<(), BackendError> {
        self.write()?.availability.insert(champion.to_string(), false);
        Ok(())
    }

    async fn restore_available_champion(
        &self,
        _role: Role,
        champion: &str,
    ) -> Result<(), BackendError> {
        self.write()?.availability.insert(champion.to_string(), true);
        Ok(())
    }

    async fn reset_available_champions(&self, role: Role) -> Result<(), BackendError> {
        let mut inner = self.write()?;
        let pool = inner.pool();
        for champion in pool.champions(role) {
            inner.availability.insert(champion.clone(), true);
        }
        Ok(())
    }

    async fn set_champion_unavailable(&self, champion: &str) -> Result<(), BackendError> {
        self.write()?.availability.insert(champion.to_string(), false);
        Ok(())
    }

    async fn get_saved_teams(&self) -> Result<Vec<SavedTeam>, BackendError> {
        Ok(self.read()?.teams.clone())
    }

    async fn save_team(&self, team: &SavedTeam) -> Result<SavedTeam, BackendError> {
        self.write()?.teams.push(team.clone());
        Ok(team.clone())
    }

    async fn delete_team(&self, timestamp: i64) -> Result<(), BackendError> {
        self.write()?.teams.retain(|t| t.timestamp != timestamp);
        Ok(())
    }

    async fn delete_all_teams(&self) -> Result<(), BackendError> {
        self.write()?.teams.clear();
        Ok(())
    }

    async fn get_champion_roles(&self) -> Result<ChampionRoles, BackendError> {
        Ok(self.read()?.champion_roles.clone())
    }

    async fn save_champion_roles(&self, roles: &ChampionRoles) -> Result<(), BackendError> {
        self.write()?.champion_roles = roles.clone();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::draft::team::RoleMapping;

    fn backend() -> InMemoryBackend {
        let mut roles = ChampionRoles::new();
        roles.insert("Garen".into(), vec![Role::Top]);
        roles.insert("Sett".into(), vec![Role::Top, Role::Support]);
        roles.insert("Thresh".into(), vec![Role::Support]);
        InMemoryBackend::new(roles)
    }

    #[tokio::test]
    async fn unavailable_champion_disappears_from_every_role() {
        let backend = backend();
        backend.set_champion_unavailable("Sett").await.unwrap();

        assert_eq!(
            backend.get_available_champions(Role::Top).await.unwrap(),
            vec!["Garen".to_string()]
        );
        assert_eq!(
            backend.get_available_champions(Role::Support).await.unwrap(),
            vec!["Thresh".to_string()]
        );
    }

    #[tokio::test]
    async fn reset_role_restores_its_champions() {
        let backend = backend();
        backend.remove_available_champion(Role::Top, "Sett").await.unwrap();
        backend.remove_available_champion(Role::Support, "Thresh").await.unwrap();

        backend.reset_available_champions(Role::Top).await.unwrap();

        assert!(backend.is_available("Sett"));
        assert!(!backend.is_available("Thresh"));
    }

    #[tokio::test]
    async fn offline_fails_reads_and_writes() {
        let backend = backend();
        backend.set_offline(true);
        assert!(matches!(
            backend.get_saved_teams().await,
            Err(BackendError::Unavailable)
        ));
        assert!(backend.delete_all_teams().await.is_err());
    }

    #[tokio::test]
    async fn failing_writes_keep_reads_working() {
        let backend = backend();
        backend.set_writes_failing(true);
        let team = SavedTeam::new(1, &RoleMapping::new(), false);

        assert!(backend.save_team(&team).await.is_err());
        assert!(backend.get_saved_teams().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn batch_covers_every_role() {
        let batch = backend().get_available_champions_batch().await.unwrap();
        assert_eq!(batch.len(), 5);
        assert!(batch[&Role::Mid].is_empty());
        assert_eq!(batch[&Role::Support], vec!["Sett".to_string(), "Thresh".to_string()]);
    }
}
