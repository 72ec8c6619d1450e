//! Interactive input of `flightgroup connect`.

use crate::runtime::Command;

/// What a line typed during a session asks for.
#[derive(Debug, Clone, PartialEq)]
pub enum Input {
    /// Forward to the runtime.
    Command(Command),
    /// End the session.
    Quit,
    /// Show the input help.
    Help,
}

/// Help text for the slash commands.
pub const HELP: &str = "\
/join <id>          join a group, or the group of a pilot
/leave              fly solo
/split              leave into a fresh group
/status             refresh who is online
/name <name>        change your display name
/wp <n>|none        select waypoint n of the plan
/quit               disconnect
anything else       chat with the group";

/// Interpret one line. Blank lines and unknown slash commands give `None`.
#[must_use]
pub fn parse_line(line: &str) -> Option<Input> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    let Some(rest) = line.strip_prefix('/') else {
        return Some(Input::Command(Command::Chat(line.to_string())));
    };

    let (word, arg) = match rest.split_once(char::is_whitespace) {
        Some((word, arg)) => (word, arg.trim()),
        None => (rest, ""),
    };
    let command = match (word, arg) {
        ("join", target) if !target.is_empty() => Command::JoinGroup(target.to_string()),
        ("leave", "") => Command::LeaveGroup { split: false },
        ("split", "") => Command::LeaveGroup { split: true },
        ("status", "") => Command::PollStatus,
        ("name", name) if !name.is_empty() => Command::UpdateProfile {
            name: name.to_string(),
            avatar: None,
        },
        ("wp", "none") => Command::SelectWaypoint(None),
        ("wp", index) => Command::SelectWaypoint(Some(index.parse().ok()?)),
        ("quit" | "exit", "") => return Some(Input::Quit),
        ("help", "") => return Some(Input::Help),
        _ => return None,
    };
    Some(Input::Command(command))
}
