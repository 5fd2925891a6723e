// SQLite persistence for the local side of the draft: ledger cache,
// incomplete-team snapshots, played champions, reset markers and the
// retry queue of failed remote writes.

use std::sync::{Mutex, MutexGuard};

use anyhow::{Context, Result};
use rusqlite::{params, Connection, OptionalExtension};
use tracing::warn;

use crate::draft::role::Role;
use crate::draft::session::IncompleteTeam;
use crate::draft::team::{RoleMapping, SavedTeam};
use crate::sync::retry::{PendingWrite, QueuedWrite};

/// Shape version written alongside every incomplete-team snapshot. Rows with
/// any other version are skipped on load.
pub const SNAPSHOT_SCHEMA_VERSION: i64 = 1;

/// SQLite-backed local repository. Everything here survives a restart and
/// is merged with remote state on load rather than overwritten by it.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open (or create) a SQLite database at `path` and ensure all tables
    /// exist. Pass `":memory:"` for an ephemeral in-memory database (useful
    /// for tests).
    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("failed to open database at {path}"))?;

        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA busy_timeout = 5000;",
        )
        .context("failed to set database pragmas")?;

        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS saved_teams (
                timestamp        INTEGER PRIMARY KEY,
                roles            TEXT NOT NULL,
                is_admin_created INTEGER NOT NULL DEFAULT 0
            );

            CREATE TABLE IF NOT EXISTS incomplete_teams (
                session_id     TEXT PRIMARY KEY,
                schema_version INTEGER NOT NULL,
                snapshot       TEXT NOT NULL,
                updated_at     TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
            );

            CREATE TABLE IF NOT EXISTS played_champions (
                champion  TEXT PRIMARY KEY,
                role      TEXT NOT NULL,
                played_at INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS reset_markers (
                role     TEXT PRIMARY KEY,
                reset_at INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS pending_writes (
                id         INTEGER PRIMARY KEY AUTOINCREMENT,
                write      TEXT NOT NULL,
                attempts   INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
            );

            CREATE TABLE IF NOT EXISTS draft_state (
                key   TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );
            ",
        )
        .context("failed to create database schema")?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Acquire the database connection.
    ///
    /// Panics if the mutex is poisoned (another thread panicked while
    /// holding the lock). This should never happen in normal operation.
    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().expect("database mutex poisoned")
    }

    // ------------------------------------------------------------------
    // Saved-team cache
    // ------------------------------------------------------------------

    /// Cached ledger, newest first.
    pub fn load_saved_teams(&self) -> Result<Vec<SavedTeam>> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare(
                "SELECT timestamp, roles, is_admin_created FROM saved_teams
                 ORDER BY timestamp DESC",
            )
            .context("failed to prepare load_saved_teams query")?;

        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, bool>(2)?,
                ))
            })
            .context("failed to query saved teams")?
            .collect::<std::result::Result<Vec<_>, _>>()
            .context("failed to map saved team rows")?;

        let mut teams = Vec::with_capacity(rows.len());
        for (timestamp, roles_json, is_admin_created) in rows {
            let roles: RoleMapping = serde_json::from_str(&roles_json)
                .with_context(|| format!("corrupt roles for saved team {timestamp}"))?;
            teams.push(SavedTeam {
                timestamp,
                roles,
                is_admin_created,
            });
        }
        Ok(teams)
    }

    /// Insert or overwrite one cached team, keyed by timestamp.
    pub fn upsert_saved_team(&self, team: &SavedTeam) -> Result<()> {
        let conn = self.conn();
        let roles_json = serde_json::to_string(&team.roles).context("failed to serialize roles")?;
        conn.execute(
            "INSERT OR REPLACE INTO saved_teams (timestamp, roles, is_admin_created)
             VALUES (?1, ?2, ?3)",
            params![team.timestamp, roles_json, team.is_admin_created],
        )
        .context("failed to upsert saved team")?;
        Ok(())
    }

    /// Replace the whole cache with `teams` in one transaction.
    pub fn replace_saved_teams(&self, teams: &[SavedTeam]) -> Result<()> {
        let mut conn = self.conn();
        let tx = conn.transaction().context("failed to begin transaction")?;
        tx.execute("DELETE FROM saved_teams", [])
            .context("failed to clear saved teams")?;
        for team in teams {
            let roles_json =
                serde_json::to_string(&team.roles).context("failed to serialize roles")?;
            tx.execute(
                "INSERT OR REPLACE INTO saved_teams (timestamp, roles, is_admin_created)
                 VALUES (?1, ?2, ?3)",
                params![team.timestamp, roles_json, team.is_admin_created],
            )
            .context("failed to insert saved team")?;
        }
        tx.commit().context("failed to commit replace_saved_teams")?;
        Ok(())
    }

    /// Remove one cached team. Returns `true` if it existed.
    pub fn delete_saved_team(&self, timestamp: i64) -> Result<bool> {
        let conn = self.conn();
        let removed = conn
            .execute(
                "DELETE FROM saved_teams WHERE timestamp = ?1",
                params![timestamp],
            )
            .context("failed to delete saved team")?;
        Ok(removed > 0)
    }

    pub fn clear_saved_teams(&self) -> Result<()> {
        self.conn()
            .execute("DELETE FROM saved_teams", [])
            .context("failed to clear saved teams")?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Incomplete-team snapshots
    // ------------------------------------------------------------------

    /// Create or update the snapshot for `team.session_id`.
    pub fn save_incomplete_team(&self, team: &IncompleteTeam) -> Result<()> {
        let conn = self.conn();
        let json = serde_json::to_string(team).context("failed to serialize snapshot")?;
        conn.execute(
            "INSERT INTO incomplete_teams (session_id, schema_version, snapshot)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(session_id) DO UPDATE SET
                schema_version = excluded.schema_version,
                snapshot       = excluded.snapshot,
                updated_at     = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')",
            params![team.session_id, SNAPSHOT_SCHEMA_VERSION, json],
        )
        .context("failed to save incomplete team")?;
        Ok(())
    }

    pub fn load_incomplete_team(&self, session_id: &str) -> Result<Option<IncompleteTeam>> {
        Ok(self
            .load_incomplete_teams()?
            .into_iter()
            .find(|t| t.session_id == session_id))
    }

    /// Every readable snapshot. Rows with an unknown schema version or a
    /// body that no longer parses are skipped with a warning.
    pub fn load_incomplete_teams(&self) -> Result<Vec<IncompleteTeam>> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare(
                "SELECT session_id, schema_version, snapshot FROM incomplete_teams
                 ORDER BY updated_at",
            )
            .context("failed to prepare load_incomplete_teams query")?;

        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, String>(2)?,
                ))
            })
            .context("failed to query incomplete teams")?
            .collect::<std::result::Result<Vec<_>, _>>()
            .context("failed to map incomplete team rows")?;

        let mut teams = Vec::with_capacity(rows.len());
        for (session_id, version, json) in rows {
            if version != SNAPSHOT_SCHEMA_VERSION {
                warn!(session_id = %session_id, version, "skipping snapshot with unknown schema version");
                continue;
            }
            match serde_json::from_str::<IncompleteTeam>(&json) {
                Ok(team) => teams.push(team),
                Err(e) => warn!(session_id = %session_id, "skipping unreadable snapshot: {e}"),
            }
        }
        Ok(teams)
    }

    /// Returns `false` if no snapshot had that id.
    pub fn delete_incomplete_team(&self, session_id: &str) -> Result<bool> {
        let deleted = self
            .conn()
            .execute(
                "DELETE FROM incomplete_teams WHERE session_id = ?1",
                params![session_id],
            )
            .context("failed to delete incomplete team")?;
        Ok(deleted > 0)
    }

    /// Delete snapshots not updated in the last `max_age_secs` seconds,
    /// except `keep`. Returns the ids removed.
    pub fn purge_incomplete_teams(
        &self,
        max_age_secs: u64,
        keep: Option<&str>,
    ) -> Result<Vec<String>> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare(
                "DELETE FROM incomplete_teams
                 WHERE updated_at < strftime('%Y-%m-%dT%H:%M:%fZ', 'now', ?1)
                   AND session_id IS NOT ?2
                 RETURNING session_id",
            )
            .context("failed to prepare purge_incomplete_teams query")?;
        let purged = stmt
            .query_map(params![format!("-{max_age_secs} seconds"), keep], |row| {
                row.get::<_, String>(0)
            })
            .context("failed to purge incomplete teams")?
            .collect::<std::result::Result<Vec<_>, _>>()
            .context("failed to map purged session ids")?;
        Ok(purged)
    }

    // ------------------------------------------------------------------
    // Played-champion cache and reset markers
    // ------------------------------------------------------------------

    /// Remember that `champion` was locked in as `role` at `played_at`.
    pub fn record_played(&self, champion: &str, role: Role, played_at: i64) -> Result<()> {
        self.conn()
            .execute(
                "INSERT OR REPLACE INTO played_champions (champion, role, played_at)
                 VALUES (?1, ?2, ?3)",
                params![champion, role.as_str(), played_at],
            )
            .context("failed to record played champion")?;
        Ok(())
    }

    /// Forget the given champions (they were restored to availability).
    pub fn clear_played<S: AsRef<str>>(&self, champions: &[S]) -> Result<()> {
        let mut conn = self.conn();
        let tx = conn.transaction().context("failed to begin transaction")?;
        for champion in champions {
            tx.execute(
                "DELETE FROM played_champions WHERE champion = ?1",
                params![champion.as_ref()],
            )
            .context("failed to clear played champion")?;
        }
        tx.commit().context("failed to commit clear_played")?;
        Ok(())
    }

    /// Every played champion with the role it was locked in as and when.
    pub fn played_champions(&self) -> Result<Vec<(String, Role, i64)>> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare("SELECT champion, role, played_at FROM played_champions ORDER BY champion")
            .context("failed to prepare played_champions query")?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, i64>(2)?,
                ))
            })
            .context("failed to query played champions")?
            .collect::<std::result::Result<Vec<_>, _>>()
            .context("failed to map played champion rows")?;

        Ok(rows
            .into_iter()
            .filter_map(|(champion, role, at)| {
                Role::from_str_role(&role).map(|r| (champion, r, at))
            })
            .collect())
    }

    pub fn set_reset_marker(&self, role: Role, reset_at: i64) -> Result<()> {
        self.conn()
            .execute(
                "INSERT OR REPLACE INTO reset_markers (role, reset_at) VALUES (?1, ?2)",
                params![role.as_str(), reset_at],
            )
            .context("failed to set reset marker")?;
        Ok(())
    }

    pub fn reset_marker(&self, role: Role) -> Result<Option<i64>> {
        self.conn()
            .query_row(
                "SELECT reset_at FROM reset_markers WHERE role = ?1",
                params![role.as_str()],
                |row| row.get(0),
            )
            .optional()
            .context("failed to read reset marker")
    }

    // ------------------------------------------------------------------
    // Retry queue
    // ------------------------------------------------------------------

    pub fn enqueue_write(&self, write: &PendingWrite) -> Result<i64> {
        let conn = self.conn();
        let json = serde_json::to_string(write).context("failed to serialize pending write")?;
        conn.execute(
            "INSERT INTO pending_writes (write) VALUES (?1)",
            params![json],
        )
        .context("failed to enqueue pending write")?;
        Ok(conn.last_insert_rowid())
    }

    /// Queued writes in insertion order.
    pub fn load_pending_writes(&self) -> Result<Vec<QueuedWrite>> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare("SELECT id, write, attempts FROM pending_writes ORDER BY id")
            .context("failed to prepare load_pending_writes query")?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, u32>(2)?,
                ))
            })
            .context("failed to query pending writes")?
            .collect::<std::result::Result<Vec<_>, _>>()
            .context("failed to map pending write rows")?;

        let mut queued = Vec::with_capacity(rows.len());
        for (id, json, attempts) in rows {
            match serde_json::from_str::<PendingWrite>(&json) {
                Ok(write) => queued.push(QueuedWrite {
                    id,
                    write,
                    attempts,
                }),
                Err(e) => warn!(id, "dropping unreadable pending write: {e}"),
            }
        }
        Ok(queued)
    }

    /// Count one more failed attempt; returns the new total.
    pub fn bump_write_attempts(&self, id: i64) -> Result<u32> {
        let conn = self.conn();
        conn.query_row(
            "UPDATE pending_writes SET attempts = attempts + 1 WHERE id = ?1 RETURNING attempts",
            params![id],
            |row| row.get(0),
        )
        .context("failed to bump pending write attempts")
    }

    pub fn delete_pending_write(&self, id: i64) -> Result<()> {
        self.conn()
            .execute("DELETE FROM pending_writes WHERE id = ?1", params![id])
            .context("failed to delete pending write")?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Key-value state
    // ------------------------------------------------------------------

    /// Persist an arbitrary JSON value under `key`. Uses INSERT OR REPLACE so
    /// repeated saves overwrite the previous value.
    pub fn save_state(&self, key: &str, value: &serde_json::Value) -> Result<()> {
        let conn = self.conn();
        let json_str =
            serde_json::to_string(value).context("failed to serialize state value")?;
        conn.execute(
            "INSERT OR REPLACE INTO draft_state (key, value) VALUES (?1, ?2)",
            params![key, json_str],
        )
        .context("failed to save state")?;
        Ok(())
    }

    /// Load a previously saved JSON value by `key`. Returns `None` if the key
    /// does not exist.
    pub fn load_state(&self, key: &str) -> Result<Option<serde_json::Value>> {
        let conn = self.conn();
        let json_str: Option<String> = conn
            .query_row(
                "SELECT value FROM draft_state WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()
            .context("failed to query draft state")?;

        match json_str {
            Some(s) => Ok(Some(
                serde_json::from_str(&s).context("failed to deserialize state value")?,
            )),
            None => Ok(None),
        }
    }

    pub fn delete_state(&self, key: &str) -> Result<()> {
        self.conn()
            .execute("DELETE FROM draft_state WHERE key = ?1", params![key])
            .context("failed to delete state")?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Current session id
    // ------------------------------------------------------------------

    /// Key used in the draft_state table to store this device's active
    /// session id.
    const SESSION_ID_KEY: &'static str = "current_session_id";

    /// The session this device was drafting when it last stopped, if any.
    pub fn get_session_id(&self) -> Result<Option<String>> {
        let value = self.load_state(Self::SESSION_ID_KEY)?;
        Ok(value.and_then(|v| v.as_str().map(|s| s.to_string())))
    }

    pub fn set_session_id(&self, session_id: &str) -> Result<()> {
        self.save_state(
            Self::SESSION_ID_KEY,
            &serde_json::Value::String(session_id.to_string()),
        )
    }

    pub fn clear_session_id(&self) -> Result<()> {
        self.delete_state(Self::SESSION_ID_KEY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    /// Helper: create a fresh in-memory database for each test.
    fn test_db() -> Database {
        Database::open(":memory:").expect("in-memory database should open")
    }

    fn team(timestamp: i64, top: &str) -> SavedTeam {
        let mut roles = RoleMapping::new();
        roles.insert(Role::Top, Some(top.to_string()));
        SavedTeam::new(timestamp, &roles, false)
    }

    fn snapshot(session_id: &str, top: &str) -> IncompleteTeam {
        let mut selections = RoleMapping::new();
        selections.insert(Role::Top, Some(top.to_string()));
        IncompleteTeam {
            session_id: session_id.to_string(),
            selections,
            randomized_roles: [Role::Top].into_iter().collect(),
            reroll: None,
            pending_selection: Default::default(),
            has_used_reroll: false,
        }
    }

    // ------------------------------------------------------------------
    // Schema / open
    // ------------------------------------------------------------------

    #[test]
    fn open_creates_tables() {
        let db = test_db();
        let conn = db.conn();

        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<Result<Vec<_>, _>>()
            .unwrap();

        for expected in [
            "saved_teams",
            "incomplete_teams",
            "played_champions",
            "reset_markers",
            "pending_writes",
            "draft_state",
        ] {
            assert!(tables.contains(&expected.to_string()), "missing {expected}");
        }
    }

    // ------------------------------------------------------------------
    // Saved teams
    // ------------------------------------------------------------------

    #[test]
    fn saved_teams_load_newest_first() {
        let db = test_db();
        db.upsert_saved_team(&team(1, "Garen")).unwrap();
        db.upsert_saved_team(&team(3, "Darius")).unwrap();
        db.upsert_saved_team(&team(2, "Sett")).unwrap();

        let teams = db.load_saved_teams().unwrap();
        let order: Vec<i64> = teams.iter().map(|t| t.timestamp).collect();
        assert_eq!(order, vec![3, 2, 1]);
        assert_eq!(teams[0].champion(Role::Top), Some("Darius"));
        assert_eq!(teams[0].champion(Role::Mid), None);
    }

    #[test]
    fn upsert_saved_team_overwrites_same_timestamp() {
        let db = test_db();
        db.upsert_saved_team(&team(1, "Garen")).unwrap();
        db.upsert_saved_team(&team(1, "Darius")).unwrap();

        let teams = db.load_saved_teams().unwrap();
        assert_eq!(teams.len(), 1);
        assert_eq!(teams[0].champion(Role::Top), Some("Darius"));
    }

    #[test]
    fn replace_saved_teams_swaps_whole_cache() {
        let db = test_db();
        db.upsert_saved_team(&team(1, "Garen")).unwrap();
        db.replace_saved_teams(&[team(5, "Jax"), team(6, "Fiora")]).unwrap();

        let stamps: Vec<i64> = db.load_saved_teams().unwrap().iter().map(|t| t.timestamp).collect();
        assert_eq!(stamps, vec![6, 5]);
    }

    #[test]
    fn delete_saved_team_reports_existence() {
        let db = test_db();
        db.upsert_saved_team(&team(1, "Garen")).unwrap();
        assert!(db.delete_saved_team(1).unwrap());
        assert!(!db.delete_saved_team(1).unwrap());
        assert!(db.load_saved_teams().unwrap().is_empty());
    }

    #[test]
    fn admin_flag_persists() {
        let db = test_db();
        let admin = SavedTeam::new(9, &RoleMapping::new(), true);
        db.upsert_saved_team(&admin).unwrap();
        assert!(db.load_saved_teams().unwrap()[0].is_admin_created);
    }

    // ------------------------------------------------------------------
    // Incomplete teams
    // ------------------------------------------------------------------

    #[test]
    fn incomplete_team_save_update_delete() {
        let db = test_db();
        db.save_incomplete_team(&snapshot("s1", "Garen")).unwrap();
        db.save_incomplete_team(&snapshot("s1", "Darius")).unwrap();
        db.save_incomplete_team(&snapshot("s2", "Sett")).unwrap();

        let all = db.load_incomplete_teams().unwrap();
        assert_eq!(all.len(), 2);
        let s1 = db.load_incomplete_team("s1").unwrap().unwrap();
        assert_eq!(s1.selections[&Role::Top].as_deref(), Some("Darius"));

        db.delete_incomplete_team("s1").unwrap();
        assert!(db.load_incomplete_team("s1").unwrap().is_none());
        assert_eq!(db.load_incomplete_teams().unwrap().len(), 1);
    }

    #[test]
    fn purge_drops_only_stale_snapshots() {
        let db = test_db();
        db.save_incomplete_team(&snapshot("stale", "Garen")).unwrap();
        db.save_incomplete_team(&snapshot("stale_own", "Darius")).unwrap();
        db.save_incomplete_team(&snapshot("fresh", "Sett")).unwrap();
        db.conn()
            .execute(
                "UPDATE incomplete_teams SET updated_at = '2000-01-01T00:00:00.000Z'
                 WHERE session_id != 'fresh'",
                [],
            )
            .unwrap();

        let purged = db.purge_incomplete_teams(3600, Some("stale_own")).unwrap();
        assert_eq!(purged, vec!["stale".to_string()]);

        let left: Vec<String> = db
            .load_incomplete_teams()
            .unwrap()
            .into_iter()
            .map(|t| t.session_id)
            .collect();
        assert_eq!(left, vec!["stale_own".to_string(), "fresh".to_string()]);

        assert_eq!(db.purge_incomplete_teams(3600, None).unwrap(), vec!["stale_own".to_string()]);
        assert!(!db.delete_incomplete_team("stale").unwrap());
        assert!(db.delete_incomplete_team("fresh").unwrap());
    }

    #[test]
    fn snapshots_with_unknown_version_are_skipped() {
        let db = test_db();
        db.save_incomplete_team(&snapshot("s1", "Garen")).unwrap();
        db.conn()
            .execute(
                "INSERT INTO incomplete_teams (session_id, schema_version, snapshot)
                 VALUES ('future', 99, '{}')",
                [],
            )
            .unwrap();
        db.conn()
            .execute(
                "INSERT INTO incomplete_teams (session_id, schema_version, snapshot)
                 VALUES ('broken', 1, 'not json')",
                [],
            )
            .unwrap();

        let all = db.load_incomplete_teams().unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].session_id, "s1");
    }

    // ------------------------------------------------------------------
    // Played champions / reset markers
    // ------------------------------------------------------------------

    #[test]
    fn played_champions_record_and_clear() {
        let db = test_db();
        db.record_played("Garen", Role::Top, 10).unwrap();
        db.record_played("Jinx", Role::Adc, 11).unwrap();

        let played = db.played_champions().unwrap();
        assert_eq!(
            played,
            vec![
                ("Garen".to_string(), Role::Top, 10),
                ("Jinx".to_string(), Role::Adc, 11)
            ]
        );

        db.clear_played(&["Garen"]).unwrap();
        assert_eq!(db.played_champions().unwrap().len(), 1);
    }

    #[test]
    fn reset_marker_round_trip() {
        let db = test_db();
        assert_eq!(db.reset_marker(Role::Mid).unwrap(), None);
        db.set_reset_marker(Role::Mid, 100).unwrap();
        db.set_reset_marker(Role::Mid, 200).unwrap();
        assert_eq!(db.reset_marker(Role::Mid).unwrap(), Some(200));
    }

    // ------------------------------------------------------------------
    // Retry queue
    // ------------------------------------------------------------------

    #[test]
    fn pending_writes_queue_in_order() {
        let db = test_db();
        let first = db
            .enqueue_write(&PendingWrite::DeleteTeam { timestamp: 1 })
            .unwrap();
        db.enqueue_write(&PendingWrite::DeleteAllTeams).unwrap();

        let queued = db.load_pending_writes().unwrap();
        assert_eq!(queued.len(), 2);
        assert_eq!(queued[0].id, first);
        assert_eq!(queued[0].write, PendingWrite::DeleteTeam { timestamp: 1 });
        assert_eq!(queued[0].attempts, 0);

        assert_eq!(db.bump_write_attempts(first).unwrap(), 1);
        assert_eq!(db.bump_write_attempts(first).unwrap(), 2);

        db.delete_pending_write(first).unwrap();
        let queued = db.load_pending_writes().unwrap();
        assert_eq!(queued.len(), 1);
        assert_eq!(queued[0].write, PendingWrite::DeleteAllTeams);
    }

    // ------------------------------------------------------------------
    // Key-value state
    // ------------------------------------------------------------------

    #[test]
    fn save_and_load_state_round_trip() {
        let db = test_db();
        let value = json!({"picked": ["A", "B"]});
        db.save_state("k", &value).unwrap();
        assert_eq!(db.load_state("k").unwrap(), Some(value));
        assert!(db.load_state("missing").unwrap().is_none());
    }

    #[test]
    fn session_id_set_get_clear() {
        let db = test_db();
        assert!(db.get_session_id().unwrap().is_none());
        db.set_session_id("session_1").unwrap();
        assert_eq!(db.get_session_id().unwrap().as_deref(), Some("session_1"));
        db.clear_session_id().unwrap();
        assert!(db.get_session_id().unwrap().is_none());
    }
}
