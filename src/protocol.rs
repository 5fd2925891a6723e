// Messages exchanged between the command front end and the app event loop.

use crate::draft::role::Role;
use crate::draft::session::{IncompleteTeam, RerollOffer, SessionPhase};
use crate::draft::team::{RoleMapping, SavedTeam};

/// Commands from the front end to the app loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserCommand {
    Pick(Role),
    Reroll(Role),
    /// Tentatively take one of the two offered champions.
    ChoosePending { role: Role, champion: String },
    /// Settle the reroll for good.
    ResolveReroll { role: Role, champion: String },
    LockIn,
    Discard,
    /// Drop any session's snapshot by id, e.g. one abandoned on this storage.
    DiscardSession(String),
    ShowSession,
    ShowSessions,
    ShowTeams,
    ShowAvailable(Role),
    DeleteTeam(i64),
    ResetRoles(Vec<Role>),
    CreateAdminTeam(RoleMapping),
    ClearLedger,
    Sync,
    Quit,
}

/// Read-only view of the current draft session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionView {
    pub session_id: Option<String>,
    pub phase: SessionPhase,
    pub selections: RoleMapping,
    pub reroll: Option<RerollOffer>,
    pub has_used_reroll: bool,
    pub can_lock_in: bool,
}

/// Updates from the app loop to the front end.
#[derive(Debug, Clone, PartialEq)]
pub enum UiUpdate {
    Session(SessionView),
    Picked { role: Role, champion: String },
    RerollOffered(RerollOffer),
    LockedIn(SavedTeam),
    Teams(Vec<SavedTeam>),
    Available { role: Role, champions: Vec<String> },
    /// Every in-progress session on this storage.
    Sessions(Vec<IncompleteTeam>),
    /// A background reconcile finished.
    Synced { pending_writes: usize },
    /// A command was ignored; the text says why.
    Ignored(String),
    Error(String),
}

/// Parse one line of driver input into a command.
///
/// Grammar (roles accept the usual aliases):
///
/// ```text
/// pick <role>             reroll <role>
/// choose <role> <champ>   resolve <role> <champ>
/// lock | discard [<session id>] | session | sessions
/// teams | available <role>
/// delete <timestamp>      reset <role>...
/// admin <role>=<champ>... clear | sync | quit
/// ```
pub fn parse_command(line: &str) -> Result<UserCommand, String> {
    let line = line.trim();
    let (verb, rest) = match line.split_once(char::is_whitespace) {
        Some((verb, rest)) => (verb, rest.trim()),
        None => (line, ""),
    };

    match verb.to_lowercase().as_str() {
        "pick" => Ok(UserCommand::Pick(parse_role(rest)?)),
        "reroll" => Ok(UserCommand::Reroll(parse_role(rest)?)),
        "choose" => {
            let (role, champion) = parse_role_and_champion(rest)?;
            Ok(UserCommand::ChoosePending { role, champion })
        }
        "resolve" => {
            let (role, champion) = parse_role_and_champion(rest)?;
            Ok(UserCommand::ResolveReroll { role, champion })
        }
        "lock" | "lockin" => Ok(UserCommand::LockIn),
        "discard" if rest.is_empty() => Ok(UserCommand::Discard),
        "discard" => Ok(UserCommand::DiscardSession(rest.to_string())),
        "session" | "status" => Ok(UserCommand::ShowSession),
        "sessions" => Ok(UserCommand::ShowSessions),
        "teams" => Ok(UserCommand::ShowTeams),
        "available" => Ok(UserCommand::ShowAvailable(parse_role(rest)?)),
        "delete" => rest
            .parse::<i64>()
            .map(UserCommand::DeleteTeam)
            .map_err(|_| format!("expected a team timestamp, got `{rest}`")),
        "reset" => {
            let roles = rest
                .split_whitespace()
                .map(parse_role)
                .collect::<Result<Vec<_>, _>>()?;
            if roles.is_empty() {
                return Err("reset needs at least one role".into());
            }
            Ok(UserCommand::ResetRoles(roles))
        }
        "admin" => parse_admin_mapping(rest).map(UserCommand::CreateAdminTeam),
        "clear" => Ok(UserCommand::ClearLedger),
        "sync" => Ok(UserCommand::Sync),
        "quit" | "exit" | "q" => Ok(UserCommand::Quit),
        "" => Err("empty command".into()),
        other => Err(format!("unknown command `{other}`")),
    }
}

fn parse_role(s: &str) -> Result<Role, String> {
    Role::from_str_role(s).ok_or_else(|| format!("unknown role `{s}`"))
}

fn parse_role_and_champion(s: &str) -> Result<(Role, String), String> {
    let (role, champion) = s
        .split_once(char::is_whitespace)
        .ok_or_else(|| "expected <role> <champion>".to_string())?;
    let champion = champion.trim();
    if champion.is_empty() {
        return Err("expected <role> <champion>".into());
    }
    Ok((parse_role(role)?, champion.to_string()))
}

/// `top=Garen mid=Ahri` style pairs. Champion names with spaces use `_`
/// (`jungle=Lee_Sin`).
fn parse_admin_mapping(s: &str) -> Result<RoleMapping, String> {
    let mut mapping = RoleMapping::new();
    for pair in s.split_whitespace() {
        let (role, champion) = pair
            .split_once('=')
            .ok_or_else(|| format!("expected <role>=<champion>, got `{pair}`"))?;
        let champion = champion.replace('_', " ");
        if champion.trim().is_empty() {
            return Err(format!("missing champion for `{role}`"));
        }
        mapping.insert(parse_role(role)?, Some(champion));
    }
    if mapping.is_empty() {
        return Err("admin needs at least one <role>=<champion>".into());
    }
    Ok(mapping)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_role_commands_with_aliases() {
        assert_eq!(parse_command("pick top"), Ok(UserCommand::Pick(Role::Top)));
        assert_eq!(parse_command("  REROLL jg "), Ok(UserCommand::Reroll(Role::Jungle)));
        assert_eq!(
            parse_command("available bot"),
            Ok(UserCommand::ShowAvailable(Role::Adc))
        );
    }

    #[test]
    fn parses_champion_names_with_spaces() {
        assert_eq!(
            parse_command("resolve jungle Lee Sin"),
            Ok(UserCommand::ResolveReroll {
                role: Role::Jungle,
                champion: "Lee Sin".into()
            })
        );
        assert_eq!(
            parse_command("choose adc Kai'Sa"),
            Ok(UserCommand::ChoosePending {
                role: Role::Adc,
                champion: "Kai'Sa".into()
            })
        );
        assert!(parse_command("choose adc").is_err());
    }

    #[test]
    fn discard_takes_an_optional_session_id() {
        assert_eq!(parse_command("discard"), Ok(UserCommand::Discard));
        assert_eq!(
            parse_command("discard session_20261019_abcd"),
            Ok(UserCommand::DiscardSession("session_20261019_abcd".into()))
        );
        assert_eq!(parse_command("sessions"), Ok(UserCommand::ShowSessions));
    }

    #[test]
    fn parses_reset_and_delete() {
        assert_eq!(
            parse_command("reset top sup"),
            Ok(UserCommand::ResetRoles(vec![Role::Top, Role::Support]))
        );
        assert!(parse_command("reset").is_err());
        assert_eq!(
            parse_command("delete 1700000000000"),
            Ok(UserCommand::DeleteTeam(1_700_000_000_000))
        );
        assert!(parse_command("delete yesterday").is_err());
    }

    #[test]
    fn parses_admin_mapping() {
        let cmd = parse_command("admin top=Garen jungle=Lee_Sin").unwrap();
        let UserCommand::CreateAdminTeam(mapping) = cmd else {
            panic!("expected admin command");
        };
        assert_eq!(mapping[&Role::Top].as_deref(), Some("Garen"));
        assert_eq!(mapping[&Role::Jungle].as_deref(), Some("Lee Sin"));
        assert!(parse_command("admin").is_err());
        assert!(parse_command("admin top").is_err());
    }

    #[test]
    fn rejects_unknown_input() {
        assert!(parse_command("").is_err());
        assert!(parse_command("dance").is_err());
        assert!(parse_command("pick feeder").is_err());
    }
}
