//! Host-side data source for the users collector.
//!
//! `HostSource` is the boundary with the operating system: it yields raw
//! text lines describing accounts and a 16-byte digest per configuration
//! file. The collector only parses those lines, so any backend (local
//! files, a remote agent, scripted fixtures) can stand behind it.
//!
//! Line protocol:
//! - users:   `<uid>(<name>):<gid>,<gid>,...` (primary group first)
//! - groups:  `<name>:<gid>`
//! - sudoers: `<uid>`

use std::collections::HashSet;
use std::io;
use std::path::Path;

use xxhash_rust::xxh3::xxh3_128;

use crate::collector::traits::FileSystem;

pub const PASSWD_PATH: &str = "/etc/passwd";
pub const GROUP_PATH: &str = "/etc/group";

/// Groups whose members are granted administrative rights.
const ADMIN_GROUPS: [&str; 3] = ["sudo", "wheel", "admin"];

pub trait HostSource: Send + Sync {
    fn user_lines(&self) -> io::Result<Vec<String>>;

    fn group_lines(&self) -> io::Result<Vec<String>>;

    fn sudoer_lines(&self) -> io::Result<Vec<String>>;

    /// Content digest of a host file.
    fn digest(&self, path: &Path) -> io::Result<[u8; 16]>;
}

/// One `/etc/passwd` entry.
#[derive(Debug, Clone, PartialEq, Eq)]
struct PasswdEntry {
    name: String,
    uid: u32,
    gid: u32,
}

/// One `/etc/group` entry.
#[derive(Debug, Clone, PartialEq, Eq)]
struct GroupEntry {
    name: String,
    gid: u32,
    members: Vec<String>,
}

fn parse_passwd(content: &str) -> Vec<PasswdEntry> {
    let mut entries = Vec::new();
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let parts: Vec<&str> = line.split(':').collect();
        if parts.len() < 4 {
            continue;
        }
        if let (Ok(uid), Ok(gid)) = (parts[2].parse::<u32>(), parts[3].parse::<u32>()) {
            entries.push(PasswdEntry {
                name: parts[0].to_string(),
                uid,
                gid,
            });
        }
    }
    entries
}

fn parse_group(content: &str) -> Vec<GroupEntry> {
    let mut entries = Vec::new();
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let parts: Vec<&str> = line.split(':').collect();
        if parts.len() < 3 {
            continue;
        }
        let Ok(gid) = parts[2].parse::<u32>() else {
            continue;
        };
        let members = parts
            .get(3)
            .map(|m| {
                m.split(',')
                    .map(str::trim)
                    .filter(|m| !m.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();
        entries.push(GroupEntry {
            name: parts[0].to_string(),
            gid,
            members,
        });
    }
    entries
}

/// Derives the line protocol from `/etc/passwd` and `/etc/group`.
#[derive(Debug, Clone, Default)]
pub struct SystemSource<F: FileSystem> {
    fs: F,
}

impl<F: FileSystem> SystemSource<F> {
    pub fn new(fs: F) -> Self {
        Self { fs }
    }

    fn passwd(&self) -> io::Result<Vec<PasswdEntry>> {
        Ok(parse_passwd(&self.fs.read_to_string(Path::new(PASSWD_PATH))?))
    }

    fn groups(&self) -> io::Result<Vec<GroupEntry>> {
        Ok(parse_group(&self.fs.read_to_string(Path::new(GROUP_PATH))?))
    }
}

impl<F: FileSystem> HostSource for SystemSource<F> {
    fn user_lines(&self) -> io::Result<Vec<String>> {
        let users = self.passwd()?;
        let groups = self.groups()?;

        Ok(users
            .iter()
            .map(|user| {
                let mut gids = vec![user.gid];
                gids.extend(
                    groups
                        .iter()
                        .filter(|g| g.gid != user.gid && g.members.contains(&user.name))
                        .map(|g| g.gid),
                );
                let gids: Vec<String> = gids.iter().map(u32::to_string).collect();
                format!("{}({}):{}", user.uid, user.name, gids.join(","))
            })
            .collect())
    }

    fn group_lines(&self) -> io::Result<Vec<String>> {
        Ok(self
            .groups()?
            .iter()
            .map(|g| format!("{}:{}", g.name, g.gid))
            .collect())
    }

    fn sudoer_lines(&self) -> io::Result<Vec<String>> {
        let users = self.passwd()?;
        let groups = self.groups()?;

        let admin: Vec<&GroupEntry> = groups
            .iter()
            .filter(|g| ADMIN_GROUPS.contains(&g.name.as_str()))
            .collect();
        let admin_gids: HashSet<u32> = admin.iter().map(|g| g.gid).collect();

        let mut seen = HashSet::new();
        Ok(users
            .iter()
            .filter(|u| {
                admin_gids.contains(&u.gid) || admin.iter().any(|g| g.members.contains(&u.name))
            })
            .filter(|u| seen.insert(u.uid))
            .map(|u| u.uid.to_string())
            .collect())
    }

    fn digest(&self, path: &Path) -> io::Result<[u8; 16]> {
        Ok(xxh3_128(&self.fs.read(path)?).to_be_bytes())
    }
}
