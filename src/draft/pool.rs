// Champion pools per role and the derived champion -> roles index.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use super::role::Role;

/// Champion-role configuration as stored remotely: champion -> playable roles.
pub type ChampionRoles = BTreeMap<String, Vec<Role>>;

/// Role -> ordered set of champion names.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChampionPool {
    roles: BTreeMap<Role, Vec<String>>,
}

impl ChampionPool {
    /// Build a pool from per-role champion lists. Names are trimmed, blank
    /// names dropped, and each role's list is sorted and de-duplicated.
    pub fn from_lists(lists: HashMap<Role, Vec<String>>) -> Self {
        let mut roles = BTreeMap::new();
        for (role, names) in lists {
            let set: BTreeSet<String> = names
                .into_iter()
                .map(|n| n.trim().to_string())
                .filter(|n| !n.is_empty())
                .collect();
            roles.insert(role, set.into_iter().collect());
        }
        Self { roles }
    }

    /// Invert a champion-role configuration into a pool.
    pub fn from_champion_roles(config: &ChampionRoles) -> Self {
        let mut lists: HashMap<Role, Vec<String>> = HashMap::new();
        for (champion, roles) in config {
            for role in roles {
                lists.entry(*role).or_default().push(champion.clone());
            }
        }
        Self::from_lists(lists)
    }

    /// Champions eligible for `role`, in pool order. Unknown roles are empty.
    pub fn champions(&self, role: Role) -> &[String] {
        self.roles.get(&role).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn contains(&self, role: Role, champion: &str) -> bool {
        self.champions(role).iter().any(|c| c == champion)
    }

    pub fn is_empty(&self) -> bool {
        self.roles.values().all(Vec::is_empty)
    }

    /// Total number of distinct champions across all roles.
    pub fn champion_count(&self) -> usize {
        self.roles
            .values()
            .flatten()
            .collect::<BTreeSet<_>>()
            .len()
    }

    /// Flatten back into a champion-role configuration.
    pub fn to_champion_roles(&self) -> ChampionRoles {
        let mut config = ChampionRoles::new();
        for (role, champions) in &self.roles {
            for champion in champions {
                config.entry(champion.clone()).or_default().push(*role);
            }
        }
        config
    }
}

/// Derived index: champion -> every role it can be played in.
///
/// Built once from the champion-role configuration and rebuilt whenever that
/// configuration changes, so availability fan-outs never scan the pool.
#[derive(Debug, Clone, Default)]
pub struct RoleIndex {
    index: HashMap<String, BTreeSet<Role>>,
}

impl RoleIndex {
    pub fn from_pool(pool: &ChampionPool) -> Self {
        let mut index: HashMap<String, BTreeSet<Role>> = HashMap::new();
        for role in Role::ALL {
            for champion in pool.champions(role) {
                index.entry(champion.clone()).or_default().insert(role);
            }
        }
        Self { index }
    }

    /// Roles `champion` can play. Empty for champions missing from the
    /// configuration.
    pub fn roles_for(&self, champion: &str) -> Vec<Role> {
        self.index
            .get(champion)
            .map(|roles| roles.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Roles for a fan-out write: the configured roles plus the role the
    /// champion was actually drafted into, which may be missing from a stale
    /// configuration.
    pub fn fan_out(&self, champion: &str, drafted_as: Option<Role>) -> Vec<Role> {
        let mut roles: BTreeSet<Role> = self
            .index
            .get(champion)
            .cloned()
            .unwrap_or_default();
        if let Some(role) = drafted_as {
            roles.insert(role);
        }
        roles.into_iter().collect()
    }
}
