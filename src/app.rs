// Application state and orchestration logic.
//
// The central event loop that applies user commands to the draft session,
// persists every transition locally, and kicks off background reconciles
// with the remote store. Pushes UI updates to the front end.

use std::sync::Arc;
use std::time::Duration;

use rand::rngs::StdRng;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::db::Database;
use crate::draft::role::Role;
use crate::draft::session::{DraftSession, IncompleteTeam, RerollOffer};
use crate::draft::team::{RoleMapping, SavedTeam};
use crate::protocol::{SessionView, UiUpdate, UserCommand};
use crate::sync::Reconciler;

// ---------------------------------------------------------------------------
// AppState
// ---------------------------------------------------------------------------

/// The complete application state.
pub struct AppState {
    pub config: Config,
    pub session: DraftSession,
    pub reconciler: Arc<Reconciler>,
    pub db: Arc<Database>,
    rng: StdRng,
    /// Most recently spawned background reconcile.
    sync_task: Option<JoinHandle<()>>,
}

impl AppState {
    pub fn new(config: Config, reconciler: Arc<Reconciler>, rng: StdRng) -> Self {
        let db = reconciler.database().clone();
        AppState {
            config,
            session: DraftSession::new(),
            reconciler,
            db,
            rng,
            sync_task: None,
        }
    }

    pub fn session_view(&self) -> SessionView {
        SessionView {
            session_id: self.session.session_id().map(str::to_string),
            phase: self.session.phase(),
            selections: self.session.selections().clone(),
            reroll: self.session.reroll_offer().cloned(),
            has_used_reroll: self.session.has_used_reroll(),
            can_lock_in: self.session.can_lock_in(),
        }
    }

    /// Persist the session snapshot and remember it as this device's active
    /// session.
    fn persist_snapshot(&self) -> anyhow::Result<()> {
        if let Some(snapshot) = self.session.snapshot() {
            self.db.save_incomplete_team(&snapshot)?;
            self.db.set_session_id(&snapshot.session_id)?;
        }
        Ok(())
    }

    fn candidates(&self, role: Role) -> anyhow::Result<Vec<String>> {
        self.reconciler
            .available_champions(role, self.session.session_id())
    }

    /// Randomly fill `role`. `None` when the role was already randomized or
    /// nothing is left to pick.
    pub fn pick(&mut self, role: Role) -> anyhow::Result<Option<String>> {
        let candidates = self.candidates(role)?;
        let picked = self.session.pick(role, &candidates, &mut self.rng);
        if let Some(champion) = &picked {
            info!(%role, champion = %champion, "picked");
            self.persist_snapshot()?;
        }
        Ok(picked)
    }

    pub fn reroll(&mut self, role: Role) -> anyhow::Result<Option<RerollOffer>> {
        let candidates = self.candidates(role)?;
        let offer = self.session.reroll(role, &candidates, &mut self.rng);
        if let Some(offer) = &offer {
            info!(%role, original = %offer.original, rerolled = %offer.rerolled, "reroll offered");
            self.persist_snapshot()?;
        }
        Ok(offer)
    }

    pub fn choose_pending(&mut self, role: Role, champion: &str) -> anyhow::Result<bool> {
        let chosen = self.session.choose_pending(role, champion);
        if chosen {
            self.persist_snapshot()?;
        }
        Ok(chosen)
    }

    pub fn resolve_reroll(&mut self, role: Role, champion: &str) -> anyhow::Result<bool> {
        let resolved = self.session.resolve_reroll(role, champion);
        if resolved {
            info!(%role, champion, "reroll resolved");
            self.persist_snapshot()?;
        }
        Ok(resolved)
    }

    /// Lock the session in. The local half completes before this returns;
    /// the caller schedules the remote half.
    pub fn lock_in(&mut self) -> anyhow::Result<Option<SavedTeam>> {
        let timestamp = self.reconciler.next_timestamp();
        let Some(lock_in) = self.session.lock_in(timestamp) else {
            return Ok(None);
        };
        self.reconciler.commit_lock_in(&lock_in)?;
        self.db.clear_session_id()?;
        Ok(Some(lock_in.team))
    }

    /// Drop the in-progress session without touching remote state.
    pub fn discard(&mut self) -> anyhow::Result<bool> {
        let Some(session_id) = self.session.discard() else {
            return Ok(false);
        };
        self.db.delete_incomplete_team(&session_id)?;
        self.db.clear_session_id()?;
        info!(session_id = %session_id, "session discarded");
        Ok(true)
    }

    /// Drop a snapshot by id: this device's own session, or one left behind
    /// by another session on the same storage.
    pub fn discard_session(&mut self, session_id: &str) -> anyhow::Result<bool> {
        if self.session.session_id() == Some(session_id) {
            return self.discard();
        }
        if !self.db.delete_incomplete_team(session_id)? {
            return Ok(false);
        }
        if self.db.get_session_id()?.as_deref() == Some(session_id) {
            self.db.clear_session_id()?;
        }
        info!(session_id = %session_id, "orphaned session discarded");
        Ok(true)
    }

    /// Every in-progress session on this storage, this device's included.
    pub fn incomplete_sessions(&self) -> anyhow::Result<Vec<IncompleteTeam>> {
        self.db.load_incomplete_teams()
    }

    /// Drop snapshots older than `sync.snapshot_max_age_secs`, keeping the
    /// session this device is drafting. Returns how many were dropped.
    pub fn purge_stale_snapshots(&self) -> anyhow::Result<usize> {
        let max_age = self.config.sync.snapshot_max_age_secs;
        if max_age == 0 {
            return Ok(0);
        }
        let keep = match self.session.session_id() {
            Some(id) => Some(id.to_string()),
            None => self.db.get_session_id()?,
        };
        let purged = self.db.purge_incomplete_teams(max_age, keep.as_deref())?;
        for session_id in &purged {
            info!(session_id = %session_id, "stale session snapshot purged");
        }
        Ok(purged.len())
    }

    /// Start a background reconcile. Runs alongside any earlier one; the
    /// reconciler serializes queue replays itself.
    pub fn spawn_sync(&mut self, ui_tx: &mpsc::Sender<UiUpdate>) {
        let reconciler = Arc::clone(&self.reconciler);
        let ui_tx = ui_tx.clone();
        self.sync_task = Some(tokio::spawn(async move {
            if let Err(e) = reconciler.sync().await {
                warn!("Background sync failed: {e:#}");
                return;
            }
            match reconciler.pending_write_count() {
                Ok(pending_writes) => {
                    let _ = ui_tx.send(UiUpdate::Synced { pending_writes }).await;
                }
                Err(e) => warn!("Failed to count pending writes: {e:#}"),
            }
        }));
    }

    /// Wait for the last background reconcile to finish.
    pub async fn finish_sync(&mut self) {
        if let Some(handle) = self.sync_task.take() {
            let _ = handle.await;
        }
    }
}

// ---------------------------------------------------------------------------
// Main event loop
// ---------------------------------------------------------------------------

/// Run the main application event loop.
///
/// Listens on two sources using `tokio::select!`:
/// 1. User commands from the front end
/// 2. The periodic reload interval
///
/// Pushes UI updates through `ui_tx`.
pub async fn run(
    mut cmd_rx: mpsc::Receiver<UserCommand>,
    ui_tx: mpsc::Sender<UiUpdate>,
    mut state: AppState,
) -> anyhow::Result<()> {
    info!("Application event loop started");

    let mut reload_interval =
        tokio::time::interval(Duration::from_secs(state.config.sync.reload_interval_secs));
    // The first tick completes immediately; consume it so the first
    // periodic reload happens after one full interval.
    reload_interval.tick().await;

    // Initial reload on startup.
    state.spawn_sync(&ui_tx);
    let _ = ui_tx.send(UiUpdate::Session(state.session_view())).await;

    loop {
        tokio::select! {
            // --- User commands ---
            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(UserCommand::Quit) => {
                        info!("Quit command received, shutting down");
                        break;
                    }
                    Some(cmd) => {
                        handle_user_command(&mut state, cmd, &ui_tx).await;
                    }
                    None => {
                        info!("Command channel closed, shutting down");
                        break;
                    }
                }
            }

            // --- Periodic reload ---
            _ = reload_interval.tick() => {
                debug!("Periodic reload");
                if let Err(e) = state.purge_stale_snapshots() {
                    warn!("Failed to purge stale snapshots: {e:#}");
                }
                state.spawn_sync(&ui_tx);
            }
        }
    }

    // Let an in-flight lock-in fan-out finish rather than cancel it.
    state.finish_sync().await;
    info!("Application event loop exiting");
    Ok(())
}

/// Handle a user command from the front end.
pub async fn handle_user_command(
    state: &mut AppState,
    cmd: UserCommand,
    ui_tx: &mpsc::Sender<UiUpdate>,
) {
    match apply_command(state, cmd, ui_tx) {
        Ok(updates) => {
            for update in updates {
                let _ = ui_tx.send(update).await;
            }
        }
        Err(e) => {
            warn!("Command failed: {e:#}");
            let _ = ui_tx.send(UiUpdate::Error(format!("{e:#}"))).await;
        }
    }
}

/// Apply one command and collect the updates it produces. State-changing
/// commands end by scheduling a background reconcile.
fn apply_command(
    state: &mut AppState,
    cmd: UserCommand,
    ui_tx: &mpsc::Sender<UiUpdate>,
) -> anyhow::Result<Vec<UiUpdate>> {
    let mut updates = Vec::new();
    match cmd {
        UserCommand::Pick(role) => match state.pick(role)? {
            Some(champion) => {
                updates.push(UiUpdate::Picked { role, champion });
                updates.push(UiUpdate::Session(state.session_view()));
            }
            None => updates.push(UiUpdate::Ignored(format!(
                "{role} already picked or no champions available"
            ))),
        },
        UserCommand::Reroll(role) => match state.reroll(role)? {
            Some(offer) => {
                updates.push(UiUpdate::RerollOffered(offer));
                updates.push(UiUpdate::Session(state.session_view()));
            }
            None => updates.push(UiUpdate::Ignored(format!(
                "cannot reroll {role}: reroll used, role empty, or no alternative"
            ))),
        },
        UserCommand::ChoosePending { role, champion } => {
            if state.choose_pending(role, &champion)? {
                updates.push(UiUpdate::Session(state.session_view()));
            } else {
                updates.push(UiUpdate::Ignored(format!(
                    "{champion} is not on offer for {role}"
                )));
            }
        }
        UserCommand::ResolveReroll { role, champion } => {
            if state.resolve_reroll(role, &champion)? {
                updates.push(UiUpdate::Session(state.session_view()));
            } else {
                updates.push(UiUpdate::Ignored(format!(
                    "{champion} is not on offer for {role}"
                )));
            }
        }
        UserCommand::LockIn => match state.lock_in()? {
            Some(team) => {
                updates.push(UiUpdate::LockedIn(team));
                updates.push(UiUpdate::Session(state.session_view()));
                state.spawn_sync(ui_tx);
            }
            None => updates.push(UiUpdate::Ignored(
                "nothing to lock in, or a reroll is unresolved".into(),
            )),
        },
        UserCommand::Discard => {
            if state.discard()? {
                updates.push(UiUpdate::Session(state.session_view()));
            } else {
                updates.push(UiUpdate::Ignored("no session to discard".into()));
            }
        }
        UserCommand::DiscardSession(session_id) => {
            if state.discard_session(&session_id)? {
                updates.push(UiUpdate::Sessions(state.incomplete_sessions()?));
            } else {
                updates.push(UiUpdate::Ignored(format!("no session {session_id}")));
            }
        }
        UserCommand::ShowSession => updates.push(UiUpdate::Session(state.session_view())),
        UserCommand::ShowSessions => {
            updates.push(UiUpdate::Sessions(state.incomplete_sessions()?));
        }
        UserCommand::ShowTeams => {
            updates.push(UiUpdate::Teams(state.reconciler.saved_teams()));
        }
        UserCommand::ShowAvailable(role) => {
            let champions = state.candidates(role)?;
            updates.push(UiUpdate::Available { role, champions });
        }
        UserCommand::DeleteTeam(timestamp) => {
            if state.reconciler.delete_saved_team(timestamp)? {
                updates.push(UiUpdate::Teams(state.reconciler.saved_teams()));
                state.spawn_sync(ui_tx);
            } else {
                updates.push(UiUpdate::Ignored(format!("no team with timestamp {timestamp}")));
            }
        }
        UserCommand::ResetRoles(roles) => {
            state.reconciler.reset_by_roles(&roles)?;
            state.spawn_sync(ui_tx);
        }
        UserCommand::CreateAdminTeam(mapping) => match create_admin_team(state, &mapping)? {
            Some(team) => {
                updates.push(UiUpdate::LockedIn(team));
                state.spawn_sync(ui_tx);
            }
            None => updates.push(UiUpdate::Ignored("admin team has no champions".into())),
        },
        UserCommand::ClearLedger => {
            state.reconciler.clear_ledger()?;
            updates.push(UiUpdate::Teams(Vec::new()));
            state.spawn_sync(ui_tx);
        }
        UserCommand::Sync => state.spawn_sync(ui_tx),
        UserCommand::Quit => {
            // Handled in the main loop
        }
    }
    Ok(updates)
}

fn create_admin_team(state: &AppState, mapping: &RoleMapping) -> anyhow::Result<Option<SavedTeam>> {
    if state.config.credentials.admin_passphrase.is_none() {
        warn!("Creating admin team without a configured passphrase");
    }
    state.reconciler.create_admin_team(mapping)
}

// ---------------------------------------------------------------------------
// Crash recovery
// ---------------------------------------------------------------------------

/// Restore the in-progress session from the database after a crash/restart.
///
/// Returns `true` if a snapshot was found for the stored session id.
pub fn recover_from_db(state: &mut AppState) -> anyhow::Result<bool> {
    let purged = state.purge_stale_snapshots()?;
    if purged > 0 {
        info!("Dropped {} stale session snapshots", purged);
    }

    let Some(session_id) = state.db.get_session_id()? else {
        info!("No session in progress, starting fresh");
        return Ok(false);
    };

    match state.db.load_incomplete_team(&session_id)? {
        Some(snapshot) => {
            info!(
                "Crash recovery: restoring session {} with {} picks",
                session_id,
                snapshot.selections.values().flatten().count()
            );
            state.session = DraftSession::restore(snapshot);
            Ok(true)
        }
        None => {
            warn!("Session {} has no snapshot, starting fresh", session_id);
            state.db.clear_session_id()?;
            Ok(false)
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
