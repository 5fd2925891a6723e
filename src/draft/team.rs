// Locked team snapshots (Team Ledger entries).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::role::Role;

/// Role -> champion (or `None` when the role was never filled).
pub type RoleMapping = BTreeMap<Role, Option<String>>;

/// A locked team. Immutable once created; `timestamp` is its unique key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedTeam {
    /// Milliseconds since the Unix epoch at lock-in.
    pub timestamp: i64,
    #[serde(default)]
    pub roles: RoleMapping,
    #[serde(default)]
    pub is_admin_created: bool,
}

impl SavedTeam {
    /// Build a team stamped with `timestamp`. Every role gets an entry so
    /// that unfilled roles are explicit `None`s on the wire.
    pub fn new(timestamp: i64, selections: &RoleMapping, is_admin_created: bool) -> Self {
        let roles = Role::ALL
            .iter()
            .map(|role| (*role, selections.get(role).cloned().flatten()))
            .collect();
        Self {
            timestamp,
            roles,
            is_admin_created,
        }
    }

    /// Non-null (role, champion) pairs.
    pub fn picks(&self) -> impl Iterator<Item = (Role, &str)> + '_ {
        self.roles
            .iter()
            .filter_map(|(role, champ)| champ.as_deref().map(|c| (*role, c)))
    }

    pub fn champion(&self, role: Role) -> Option<&str> {
        self.roles.get(&role).and_then(|c| c.as_deref())
    }

    pub fn is_empty(&self) -> bool {
        self.picks().next().is_none()
    }
}

/// Current wall-clock time as a ledger timestamp.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Sort teams newest first.
pub fn sort_newest_first(teams: &mut [SavedTeam]) {
    teams.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_fills_missing_roles_with_none() {
        let mut selections = RoleMapping::new();
        selections.insert(Role::Top, Some("Garen".into()));
        let team = SavedTeam::new(42, &selections, false);

        assert_eq!(team.roles.len(), 5);
        assert_eq!(team.champion(Role::Top), Some("Garen"));
        assert_eq!(team.champion(Role::Mid), None);
        assert_eq!(team.picks().collect::<Vec<_>>(), vec![(Role::Top, "Garen")]);
    }

    #[test]
    fn json_shape_is_camel_case() {
        let mut selections = RoleMapping::new();
        selections.insert(Role::Adc, Some("Jinx".into()));
        let team = SavedTeam::new(1_700_000_000_000, &selections, true);

        let value = serde_json::to_value(&team).unwrap();
        assert_eq!(value["timestamp"], 1_700_000_000_000i64);
        assert_eq!(value["isAdminCreated"], true);
        assert_eq!(value["roles"]["adc"], "Jinx");
        assert!(value["roles"]["top"].is_null());
    }

    #[test]
    fn missing_optional_fields_default() {
        let team: SavedTeam = serde_json::from_str(r#"{"timestamp": 5}"#).unwrap();
        assert!(team.is_empty());
        assert!(!team.is_admin_created);
    }

    #[test]
    fn sort_newest_first_orders_descending() {
        let mut teams = vec![
            SavedTeam::new(1, &RoleMapping::new(), false),
            SavedTeam::new(3, &RoleMapping::new(), false),
            SavedTeam::new(2, &RoleMapping::new(), false),
        ];
        sort_newest_first(&mut teams);
        let order: Vec<i64> = teams.iter().map(|t| t.timestamp).collect();
        assert_eq!(order, vec![3, 2, 1]);
    }
}
