// Role labels for the five draft slots.

use serde::{Deserialize, Serialize};
use std::fmt;

/// One of the five fixed positional slots a team is drafted for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Top,
    Jungle,
    Mid,
    Adc,
    Support,
}

impl Role {
    /// Every role, in draft display order.
    pub const ALL: [Role; 5] = [Role::Top, Role::Jungle, Role::Mid, Role::Adc, Role::Support];

    /// Parse a role label.
    ///
    /// Accepts the canonical lowercase labels plus the common aliases used in
    /// champion-role configuration files ("jg", "middle", "bot", "sup", ...).
    pub fn from_str_role(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "top" => Some(Role::Top),
            "jungle" | "jg" | "jng" => Some(Role::Jungle),
            "mid" | "middle" => Some(Role::Mid),
            "adc" | "bot" | "bottom" | "carry" => Some(Role::Adc),
            "support" | "sup" | "supp" | "utility" => Some(Role::Support),
            _ => None,
        }
    }

    /// Canonical wire label for this role.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Top => "top",
            Role::Jungle => "jungle",
            Role::Mid => "mid",
            Role::Adc => "adc",
            Role::Support => "support",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}
