// Remote collaborator contract: availability store, team ledger and
// champion-role configuration.

pub mod http;
pub mod memory;

use std::collections::BTreeMap;

use async_trait::async_trait;
use thiserror::Error;

use crate::draft::pool::{ChampionPool, ChampionRoles};
use crate::draft::role::Role;
use crate::draft::team::SavedTeam;

pub use http::HttpBackend;
pub use memory::InMemoryBackend;

/// Role -> available champions, as returned by the batch endpoint.
pub type AvailabilityBatch = BTreeMap<Role, Vec<String>>;

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("network error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("backend returned status {status}: {message}")]
    Status { status: u16, message: String },

    #[error("invalid backend url: {0}")]
    Url(String),

    #[error("backend unavailable")]
    Unavailable,
}

/// Operations the draft core needs from the remote store.
///
/// Every call is idempotent-safe to retry except `save_team` and
/// `remove_available_champion`, which may double-apply.
#[async_trait]
pub trait ChampionBackend: Send + Sync {
    async fn get_champion_pools(&self) -> Result<ChampionPool, BackendError>;

    async fn get_available_champions(&self, role: Role) -> Result<Vec<String>, BackendError>;

    /// All roles in one round trip.
    async fn get_available_champions_batch(&self) -> Result<AvailabilityBatch, BackendError>;

    async fn remove_available_champion(&self, role: Role, champion: &str)
        -> Result<(), BackendError>;

    async fn restore_available_champion(
        &self,
        role: Role,
        champion: &str,
    ) -> Result<(), BackendError>;

    /// Mark every champion of `role` available again.
    async fn reset_available_champions(&self, role: Role) -> Result<(), BackendError>;

    /// Server-side fan-out across all of the champion's roles.
    async fn set_champion_unavailable(&self, champion: &str) -> Result<(), BackendError>;

    async fn get_saved_teams(&self) -> Result<Vec<SavedTeam>, BackendError>;

    /// Append a team to the ledger. The returned copy may be
    /// server-normalized.
    async fn save_team(&self, team: &SavedTeam) -> Result<SavedTeam, BackendError>;

    async fn delete_team(&self, timestamp: i64) -> Result<(), BackendError>;

    async fn delete_all_teams(&self) -> Result<(), BackendError>;

    async fn get_champion_roles(&self) -> Result<ChampionRoles, BackendError>;

    async fn save_champion_roles(&self, roles: &ChampionRoles) -> Result<(), BackendError>;
}
