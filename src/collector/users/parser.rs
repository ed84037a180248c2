//! Parsers for the `HostSource` line protocol.

use thiserror::Error;

use crate::codec::VarInt;

use super::model::{Group, Sudoer, User};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("malformed {kind} line: {line:?}")]
pub struct LineError {
    pub kind: &'static str,
    pub line: String,
}

impl LineError {
    fn new(kind: &'static str, line: &str) -> Self {
        Self {
            kind,
            line: line.to_string(),
        }
    }
}

/// Parses an id that fits in a `VarInt`.
fn parse_id(field: &str) -> Option<u64> {
    field.trim().parse::<u64>().ok().filter(|id| *id <= VarInt::MAX)
}

/// Parses `<uid>(<name>):<gid>,<gid>,...`.
pub fn parse_user_line(line: &str) -> Result<User, LineError> {
    let err = || LineError::new("user", line);

    let (account, groups) = line.trim().split_once(':').ok_or_else(err)?;
    let (uid, name) = account.split_once('(').ok_or_else(err)?;
    let name = name.strip_suffix(')').ok_or_else(err)?;
    let uid = parse_id(uid).ok_or_else(err)?;

    let groups = groups
        .split(',')
        .map(str::trim)
        .filter(|g| !g.is_empty())
        .map(|g| parse_id(g).ok_or_else(err))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(User::new(uid, name, groups))
}

/// Parses `<name>:<gid>`.
pub fn parse_group_line(line: &str) -> Result<Group, LineError> {
    let err = || LineError::new("group", line);

    let (name, gid) = line.trim().rsplit_once(':').ok_or_else(err)?;
    let gid = parse_id(gid).ok_or_else(err)?;
    Ok(Group::new(gid, name))
}

/// Parses `<uid>`.
pub fn parse_sudoer_line(line: &str) -> Result<Sudoer, LineError> {
    parse_id(line)
        .map(Sudoer::new)
        .ok_or_else(|| LineError::new("sudoer", line))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_user_line() {
        assert_eq!(
            parse_user_line("1000(alice):1000,27,2000").unwrap(),
            User::new(1000, "alice", vec![1000, 27, 2000])
        );
        assert_eq!(
            parse_user_line("0(root):0\n").unwrap(),
            User::new(0, "root", vec![0])
        );
        assert_eq!(
            parse_user_line("5(lonely):").unwrap(),
            User::new(5, "lonely", vec![])
        );
    }

    #[test]
    fn test_parse_user_line_rejects_garbage() {
        assert!(parse_user_line("alice:1000").is_err());
        assert!(parse_user_line("x(alice):1000").is_err());
        assert!(parse_user_line("1000(alice:1000").is_err());
        let err = parse_user_line("1000(alice):abc").unwrap_err();
        assert_eq!(err.kind, "user");
        assert_eq!(err.to_string(), "malformed user line: \"1000(alice):abc\"");
    }

    #[test]
    fn test_parse_group_line() {
        assert_eq!(parse_group_line("sudo:27").unwrap(), Group::new(27, "sudo"));
        assert!(parse_group_line("sudo").is_err());
        assert!(parse_group_line("sudo:-1").is_err());
    }

    #[test]
    fn test_parse_sudoer_line() {
        assert_eq!(parse_sudoer_line("1000").unwrap(), Sudoer::new(1000));
        assert!(parse_sudoer_line("alice").is_err());
    }

    #[test]
    fn test_ids_past_varint_range_are_malformed() {
        let max = VarInt::MAX;
        assert_eq!(
            parse_user_line(&format!("{}(edge):{}", max, max)).unwrap(),
            User::new(max, "edge", vec![max])
        );
        assert!(parse_user_line(&format!("{}(ghost):0", max + 1)).is_err());
        assert!(parse_user_line(&format!("7(ghost):0,{}", max + 1)).is_err());
        assert!(parse_group_line(&format!("ghosts:{}", max + 1)).is_err());
        assert!(parse_sudoer_line(&(max + 1).to_string()).is_err());
        assert_eq!(parse_sudoer_line(&max.to_string()).unwrap(), Sudoer::new(max));
    }
}
