// Draft session state machine: random picks, the one-shot reroll, lock-in.
//
// Every transition is synchronous and local. Callers pass in the candidate
// list computed by the reconciliation layer and persist the returned snapshot;
// this module never touches storage or the network.

use std::collections::{BTreeMap, BTreeSet};

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::role::Role;
use super::team::{RoleMapping, SavedTeam};

/// An alternate pick offered by a reroll, awaiting the user's decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RerollOffer {
    pub role: Role,
    pub original: String,
    pub rerolled: String,
}

impl RerollOffer {
    fn offers(&self, champion: &str) -> bool {
        self.original == champion || self.rerolled == champion
    }
}

/// Coarse position of a session in its lifecycle.
///
/// `Locked` never appears here: lock-in hands the team off and resets the
/// session to `Empty` in the same step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Empty,
    Picking,
    AllRolesFilled,
    RerollOffered,
    PendingChoice,
    Resolved,
}

/// Local-only record of an in-progress draft, keyed by `session_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncompleteTeam {
    pub session_id: String,
    pub selections: RoleMapping,
    #[serde(default)]
    pub randomized_roles: BTreeSet<Role>,
    #[serde(default)]
    pub reroll: Option<RerollOffer>,
    #[serde(default)]
    pub pending_selection: BTreeMap<Role, Option<String>>,
    #[serde(default)]
    pub has_used_reroll: bool,
}

impl IncompleteTeam {
    /// Every champion this draft currently holds: its selections, the
    /// champion offered by an open reroll, and any tentative choice.
    pub fn held_champions(&self) -> BTreeSet<String> {
        let mut held: BTreeSet<String> = self.selections.values().flatten().cloned().collect();
        if let Some(offer) = &self.reroll {
            held.insert(offer.original.clone());
            held.insert(offer.rerolled.clone());
        }
        held.extend(self.pending_selection.values().flatten().cloned());
        held
    }
}

/// Output of a successful lock-in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockIn {
    /// Session whose incomplete-team snapshot must now be deleted.
    pub session_id: String,
    pub team: SavedTeam,
}

/// The current user's in-progress selection state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DraftSession {
    session_id: Option<String>,
    selections: RoleMapping,
    randomized_roles: BTreeSet<Role>,
    reroll: Option<RerollOffer>,
    pending_selection: BTreeMap<Role, Option<String>>,
    has_used_reroll: bool,
}

impl DraftSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a session from its persisted snapshot (crash recovery).
    pub fn restore(snapshot: IncompleteTeam) -> Self {
        Self {
            session_id: Some(snapshot.session_id),
            selections: snapshot.selections,
            randomized_roles: snapshot.randomized_roles,
            reroll: snapshot.reroll,
            pending_selection: snapshot.pending_selection,
            has_used_reroll: snapshot.has_used_reroll,
        }
    }

    /// Snapshot to persist locally, or `None` before the first pick.
    pub fn snapshot(&self) -> Option<IncompleteTeam> {
        let session_id = self.session_id.clone()?;
        Some(IncompleteTeam {
            session_id,
            selections: self.selections.clone(),
            randomized_roles: self.randomized_roles.clone(),
            reroll: self.reroll.clone(),
            pending_selection: self.pending_selection.clone(),
            has_used_reroll: self.has_used_reroll,
        })
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    pub fn selection(&self, role: Role) -> Option<&str> {
        self.selections.get(&role).and_then(|c| c.as_deref())
    }

    pub fn selections(&self) -> &RoleMapping {
        &self.selections
    }

    pub fn is_randomized(&self, role: Role) -> bool {
        self.randomized_roles.contains(&role)
    }

    pub fn reroll_offer(&self) -> Option<&RerollOffer> {
        self.reroll.as_ref()
    }

    pub fn pending_selection(&self, role: Role) -> Option<Option<&str>> {
        self.pending_selection.get(&role).map(|c| c.as_deref())
    }

    pub fn has_used_reroll(&self) -> bool {
        self.has_used_reroll
    }

    pub fn is_complete(&self) -> bool {
        Role::ALL.iter().all(|r| self.selection(*r).is_some())
    }

    pub fn phase(&self) -> SessionPhase {
        if self.session_id.is_none() {
            return SessionPhase::Empty;
        }
        if let Some(offer) = &self.reroll {
            return match self.pending_selection.get(&offer.role) {
                Some(Some(_)) => SessionPhase::PendingChoice,
                _ => SessionPhase::RerollOffered,
            };
        }
        if !self.is_complete() {
            SessionPhase::Picking
        } else if self.has_used_reroll {
            SessionPhase::Resolved
        } else {
            SessionPhase::AllRolesFilled
        }
    }

    /// Champions held by this session in roles other than `role`. A team
    /// never fields the same champion twice.
    fn held_elsewhere(&self, role: Role) -> BTreeSet<&str> {
        let mut held: BTreeSet<&str> = self
            .selections
            .iter()
            .filter(|(r, _)| **r != role)
            .filter_map(|(_, c)| c.as_deref())
            .collect();
        if let Some(offer) = self.reroll.as_ref().filter(|o| o.role != role) {
            held.insert(offer.original.as_str());
            held.insert(offer.rerolled.as_str());
        }
        held
    }

    /// Randomly fill `role` from `candidates`.
    ///
    /// No-op (returns `None`) if the role was already randomized in this
    /// session or no usable candidate remains.
    pub fn pick<R: Rng>(
        &mut self,
        role: Role,
        candidates: &[String],
        rng: &mut R,
    ) -> Option<String> {
        if self.is_randomized(role) {
            debug!(%role, "pick ignored: role already randomized");
            return None;
        }
        let held = self.held_elsewhere(role);
        let usable: Vec<&String> = candidates
            .iter()
            .filter(|c| !held.contains(c.as_str()))
            .collect();
        if usable.is_empty() {
            debug!(%role, "pick ignored: no candidates");
            return None;
        }

        let champion = usable[rng.random_range(0..usable.len())].clone();
        if self.session_id.is_none() {
            self.session_id = Some(generate_session_id(rng));
        }
        self.selections.insert(role, Some(champion.clone()));
        self.randomized_roles.insert(role);
        Some(champion)
    }

    /// Offer one alternative for an already-picked role. Allowed once per
    /// session; the offer must be resolved before lock-in.
    pub fn reroll<R: Rng>(
        &mut self,
        role: Role,
        candidates: &[String],
        rng: &mut R,
    ) -> Option<RerollOffer> {
        if self.has_used_reroll {
            debug!(%role, "reroll ignored: already used this session");
            return None;
        }
        let original = self.selection(role)?.to_string();
        let held = self.held_elsewhere(role);
        let alternatives: Vec<&String> = candidates
            .iter()
            .filter(|c| **c != original && !held.contains(c.as_str()))
            .collect();
        if alternatives.is_empty() {
            debug!(%role, "reroll ignored: no alternative candidates");
            return None;
        }

        let rerolled = alternatives[rng.random_range(0..alternatives.len())].clone();
        let offer = RerollOffer {
            role,
            original,
            rerolled,
        };
        self.reroll = Some(offer.clone());
        self.pending_selection.insert(role, None);
        self.has_used_reroll = true;
        Some(offer)
    }

    /// Tentatively choose between the two offered champions without closing
    /// the offer. Lock-in applies the choice.
    pub fn choose_pending(&mut self, role: Role, choice: &str) -> bool {
        match &self.reroll {
            Some(offer) if offer.role == role && offer.offers(choice) => {
                self.pending_selection.insert(role, Some(choice.to_string()));
                true
            }
            _ => false,
        }
    }

    /// Settle a reroll: `choice` becomes the role's final selection and the
    /// offer is forgotten.
    pub fn resolve_reroll(&mut self, role: Role, choice: &str) -> bool {
        match &self.reroll {
            Some(offer) if offer.role == role && offer.offers(choice) => {
                self.selections.insert(role, Some(choice.to_string()));
                self.pending_selection.remove(&role);
                self.reroll = None;
                true
            }
            _ => false,
        }
    }

    /// True iff no role is waiting on an unresolved reroll.
    pub fn can_lock_in(&self) -> bool {
        !self.pending_selection.values().any(Option::is_none)
    }

    /// Convert the session into a saved team stamped `timestamp` and reset to
    /// `Empty`. Returns `None`, leaving the session untouched, when a reroll
    /// is unresolved or nothing has been picked.
    pub fn lock_in(&mut self, timestamp: i64) -> Option<LockIn> {
        if !self.can_lock_in() {
            debug!("lock-in rejected: unresolved reroll");
            return None;
        }
        if self.selections.values().all(Option::is_none) {
            debug!("lock-in rejected: nothing picked");
            return None;
        }
        let session_id = self.session_id.clone()?;

        let mut selections = self.selections.clone();
        for (role, choice) in &self.pending_selection {
            if let Some(champion) = choice {
                selections.insert(*role, Some(champion.clone()));
            }
        }

        let team = SavedTeam::new(timestamp, &selections, false);
        *self = Self::default();
        Some(LockIn { session_id, team })
    }

    /// Abandon the session. Returns the id whose snapshot should be dropped.
    pub fn discard(&mut self) -> Option<String> {
        let session_id = self.session_id.take();
        *self = Self::default();
        session_id
    }
}

/// Generate a session id: UTC timestamp plus a random suffix so that two
/// sessions started in the same millisecond on one device stay distinct.
///
/// Format: `session_YYYYMMDD_HHMMSS_SSS_xxxx`.
pub fn generate_session_id<R: Rng>(rng: &mut R) -> String {
    let now = chrono::Utc::now();
    let suffix: u16 = rng.random();
    format!("{}_{suffix:04x}", now.format("session_%Y%m%d_%H%M%S_%3f"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn rng() -> StdRng {
        StdRng::seed_from_u64(7)
    }

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn new_session_is_empty_and_lockable() {
        let session = DraftSession::new();
        assert_eq!(session.phase(), SessionPhase::Empty);
        assert!(session.can_lock_in());
        assert!(session.snapshot().is_none());
    }

    #[test]
    fn first_pick_allocates_session_id() {
        let mut session = DraftSession::new();
        let mut rng = rng();
        let champ = session.pick(Role::Top, &names(&["A", "B"]), &mut rng).unwrap();

        assert!(champ == "A" || champ == "B");
        assert!(session.session_id().unwrap().starts_with("session_"));
        assert_eq!(session.selection(Role::Top), Some(champ.as_str()));
        assert!(session.is_randomized(Role::Top));
        assert_eq!(session.phase(), SessionPhase::Picking);
    }

    #[test]
    fn pick_twice_same_role_is_noop() {
        let mut session = DraftSession::new();
        let mut rng = rng();
        session.pick(Role::Top, &names(&["A"]), &mut rng).unwrap();
        let before = session.clone();

        assert!(session.pick(Role::Top, &names(&["B"]), &mut rng).is_none());
        assert_eq!(session, before);
    }

    #[test]
    fn pick_with_no_candidates_is_noop() {
        let mut session = DraftSession::new();
        let mut rng = rng();
        assert!(session.pick(Role::Mid, &[], &mut rng).is_none());
        assert_eq!(session.phase(), SessionPhase::Empty);
        assert!(!session.is_randomized(Role::Mid));
    }

    #[test]
    fn pick_skips_champion_held_in_other_role() {
        let mut session = DraftSession::new();
        let mut rng = rng();
        session.pick(Role::Top, &names(&["Sett"]), &mut rng).unwrap();

        assert!(session.pick(Role::Jungle, &names(&["Sett"]), &mut rng).is_none());
        let champ = session
            .pick(Role::Jungle, &names(&["Sett", "Vi"]), &mut rng)
            .unwrap();
        assert_eq!(champ, "Vi");
    }

    #[test]
    fn pick_draws_every_candidate_over_many_trials() {
        let mut rng = rng();
        let mut seen_a = 0;
        let mut seen_b = 0;
        for _ in 0..1000 {
            let mut session = DraftSession::new();
            match session.pick(Role::Top, &names(&["A", "B"]), &mut rng).as_deref() {
                Some("A") => seen_a += 1,
                Some("B") => seen_b += 1,
                other => panic!("unexpected pick {other:?}"),
            }
        }
        assert!(seen_a > 350 && seen_b > 350, "a={seen_a} b={seen_b}");
    }

    #[test]
    fn filling_all_roles_reaches_all_roles_filled() {
        let mut session = DraftSession::new();
        let mut rng = rng();
        for (i, role) in Role::ALL.iter().enumerate() {
            session.pick(*role, &[format!("C{i}")], &mut rng).unwrap();
        }
        assert!(session.is_complete());
        assert_eq!(session.phase(), SessionPhase::AllRolesFilled);
    }

    #[test]
    fn reroll_offers_alternative_and_blocks_lock_in() {
        let mut session = DraftSession::new();
        let mut rng = rng();
        session.pick(Role::Top, &names(&["A"]), &mut rng).unwrap();

        let offer = session
            .reroll(Role::Top, &names(&["A", "B"]), &mut rng)
            .unwrap();
        assert_eq!(offer.original, "A");
        assert_eq!(offer.rerolled, "B");
        assert!(session.has_used_reroll());
        assert_eq!(session.pending_selection(Role::Top), Some(None));
        assert_eq!(session.phase(), SessionPhase::RerollOffered);
        assert!(!session.can_lock_in());

        let before = session.clone();
        assert!(session.lock_in(1).is_none());
        assert_eq!(session, before);
    }

    #[test]
    fn second_reroll_is_noop() {
        let mut session = DraftSession::new();
        let mut rng = rng();
        session.pick(Role::Top, &names(&["A"]), &mut rng).unwrap();
        session.pick(Role::Mid, &names(&["M"]), &mut rng).unwrap();
        session.reroll(Role::Top, &names(&["A", "B"]), &mut rng).unwrap();
        session.resolve_reroll(Role::Top, "A");
        let before = session.clone();

        assert!(session.reroll(Role::Mid, &names(&["M", "N"]), &mut rng).is_none());
        assert_eq!(session, before);
    }

    #[test]
    fn reroll_requires_selection_and_alternative() {
        let mut session = DraftSession::new();
        let mut rng = rng();
        assert!(session.reroll(Role::Top, &names(&["A", "B"]), &mut rng).is_none());

        session.pick(Role::Top, &names(&["A"]), &mut rng).unwrap();
        assert!(session.reroll(Role::Top, &names(&["A"]), &mut rng).is_none());
        assert!(!session.has_used_reroll());
    }

    #[test]
    fn resolve_reroll_sets_final_choice() {
        let mut session = DraftSession::new();
        let mut rng = rng();
        session.pick(Role::Top, &names(&["A"]), &mut rng).unwrap();
        session.reroll(Role::Top, &names(&["A", "B"]), &mut rng).unwrap();

        assert!(!session.resolve_reroll(Role::Top, "Z"));
        assert!(!session.resolve_reroll(Role::Mid, "B"));
        assert!(!session.can_lock_in());

        assert!(session.resolve_reroll(Role::Top, "B"));
        assert!(session.can_lock_in());
        assert_eq!(session.selection(Role::Top), Some("B"));
        assert!(session.reroll_offer().is_none());
        assert_eq!(session.pending_selection(Role::Top), None);
        assert_eq!(session.phase(), SessionPhase::Picking);
    }

    #[test]
    fn choose_pending_makes_session_lockable_and_lock_in_applies_it() {
        let mut session = DraftSession::new();
        let mut rng = rng();
        session.pick(Role::Top, &names(&["A"]), &mut rng).unwrap();
        session.reroll(Role::Top, &names(&["A", "B"]), &mut rng).unwrap();

        assert!(session.choose_pending(Role::Top, "B"));
        assert_eq!(session.phase(), SessionPhase::PendingChoice);
        assert!(session.can_lock_in());

        let lock = session.lock_in(99).unwrap();
        assert_eq!(lock.team.champion(Role::Top), Some("B"));
        assert_eq!(lock.team.timestamp, 99);
        assert_eq!(session.phase(), SessionPhase::Empty);
    }

    #[test]
    fn lock_in_resets_session_and_returns_team() {
        let mut session = DraftSession::new();
        let mut rng = rng();
        session.pick(Role::Top, &names(&["A"]), &mut rng).unwrap();
        session.pick(Role::Adc, &names(&["Jinx"]), &mut rng).unwrap();
        let id = session.session_id().unwrap().to_string();

        let lock = session.lock_in(1234).unwrap();
        assert_eq!(lock.session_id, id);
        assert_eq!(lock.team.champion(Role::Top), Some("A"));
        assert_eq!(lock.team.champion(Role::Adc), Some("Jinx"));
        assert_eq!(lock.team.champion(Role::Mid), None);
        assert!(!lock.team.is_admin_created);
        assert_eq!(session, DraftSession::new());
    }

    #[test]
    fn lock_in_of_empty_session_is_rejected() {
        let mut session = DraftSession::new();
        assert!(session.lock_in(1).is_none());
    }

    #[test]
    fn discard_returns_session_id_and_resets() {
        let mut session = DraftSession::new();
        let mut rng = rng();
        session.pick(Role::Top, &names(&["A"]), &mut rng).unwrap();
        let id = session.session_id().unwrap().to_string();

        assert_eq!(session.discard(), Some(id));
        assert_eq!(session.phase(), SessionPhase::Empty);
        assert_eq!(session.discard(), None);
    }

    #[test]
    fn snapshot_restore_round_trip_preserves_reroll() {
        let mut session = DraftSession::new();
        let mut rng = rng();
        session.pick(Role::Top, &names(&["A"]), &mut rng).unwrap();
        session.reroll(Role::Top, &names(&["A", "B"]), &mut rng).unwrap();

        let snapshot = session.snapshot().unwrap();
        assert_eq!(
            snapshot.held_champions(),
            ["A", "B"].iter().map(|s| s.to_string()).collect::<BTreeSet<String>>()
        );
        let restored = DraftSession::restore(snapshot);
        assert_eq!(restored, session);
        assert_eq!(restored.phase(), SessionPhase::RerollOffered);
    }

    #[test]
    fn generate_session_id_format() {
        let mut rng = rng();
        let id = generate_session_id(&mut rng);
        // session_YYYYMMDD_HHMMSS_SSS_xxxx
        assert!(id.starts_with("session_"));
        assert_eq!(id.len(), "session_20260101_120000_000_abcd".len());
    }
}
