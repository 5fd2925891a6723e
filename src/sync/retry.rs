//! Outbox of remote writes.
//!
//! Every state-changing action is applied to local state first and then
//! recorded here as one or more [`PendingWrite`]s. The reconciler replays the
//! queue in insertion order; a write leaves the queue when it succeeds, when
//! the store rejects it permanently, or after the configured number of
//! failed attempts.

use serde::{Deserialize, Serialize};

use crate::backend::{BackendError, ChampionBackend};
use crate::draft::pool::ChampionRoles;
use crate::draft::role::Role;
use crate::draft::team::SavedTeam;

/// One remote mutation, serialized into the local `pending_writes` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PendingWrite {
    RemoveAvailable { role: Role, champion: String },
    RestoreAvailable { role: Role, champion: String },
    /// Store-side fan-out. `drafted_as` only shapes the local effect.
    SetUnavailable { champion: String, drafted_as: Role },
    ResetRole { role: Role },
    SaveTeam { team: SavedTeam },
    DeleteTeam { timestamp: i64 },
    DeleteAllTeams,
    SaveChampionRoles { roles: ChampionRoles },
}

impl PendingWrite {
    /// Send this write to the backend.
    pub async fn apply(&self, backend: &dyn ChampionBackend) -> Result<(), BackendError> {
        match self {
            PendingWrite::RemoveAvailable { role, champion } => {
                backend.remove_available_champion(*role, champion).await
            }
            PendingWrite::RestoreAvailable { role, champion } => {
                backend.restore_available_champion(*role, champion).await
            }
            PendingWrite::SetUnavailable { champion, .. } => {
                backend.set_champion_unavailable(champion).await
            }
            PendingWrite::ResetRole { role } => backend.reset_available_champions(*role).await,
            PendingWrite::SaveTeam { team } => backend.save_team(team).await.map(|_| ()),
            PendingWrite::DeleteTeam { timestamp } => backend.delete_team(*timestamp).await,
            PendingWrite::DeleteAllTeams => backend.delete_all_teams().await,
            PendingWrite::SaveChampionRoles { roles } => backend.save_champion_roles(roles).await,
        }
    }

    /// Short label for log lines.
    pub fn describe(&self) -> String {
        match self {
            PendingWrite::RemoveAvailable { role, champion } => {
                format!("remove {champion} from {role}")
            }
            PendingWrite::RestoreAvailable { role, champion } => {
                format!("restore {champion} to {role}")
            }
            PendingWrite::SetUnavailable { champion, .. } => {
                format!("mark {champion} unavailable everywhere")
            }
            PendingWrite::ResetRole { role } => format!("reset {role}"),
            PendingWrite::SaveTeam { team } => format!("save team {}", team.timestamp),
            PendingWrite::DeleteTeam { timestamp } => format!("delete team {timestamp}"),
            PendingWrite::DeleteAllTeams => "delete all teams".to_string(),
            PendingWrite::SaveChampionRoles { roles } => {
                format!("save roles for {} champions", roles.len())
            }
        }
    }
}

/// A pending write as stored in the queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedWrite {
    pub id: i64,
    pub write: PendingWrite,
    pub attempts: u32,
}

/// What to do with a write after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Keep it queued for the next sync.
    Retry,
    /// The store rejected it; retrying cannot help.
    NoRetry,
}

/// Classify a backend failure. Transport errors, timeouts, throttling and
/// server errors are transient; any other 4xx is permanent.
pub fn retry_decision(err: &BackendError) -> RetryDecision {
    match err {
        BackendError::Transport(_) | BackendError::Unavailable => RetryDecision::Retry,
        BackendError::Status { status, .. } => match *status {
            408 | 429 => RetryDecision::Retry,
            s if s >= 500 => RetryDecision::Retry,
            _ => RetryDecision::NoRetry,
        },
        BackendError::Url(_) => RetryDecision::NoRetry,
    }
}
