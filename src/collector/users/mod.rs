//! Users, groups and sudoers collector.
//!
//! Content layout (after the `0x00` tag and the content length):
//!
//! ```text
//! VarInt(n) User*n  VarInt(n) Group*n  VarInt(n) Sudoer*n
//! passwd_digest[16] group_digest[16]
//! ```

mod model;
mod parser;
mod relational;

use std::path::Path;
use std::sync::Arc;
use std::thread;

use postgres::GenericClient;
use tracing::{debug, error, warn};

use crate::codec::{put_len, take_array, take_varint};
use crate::collector::source::{GROUP_PATH, HostSource, PASSWD_PATH};
use crate::collector::{Collectible, CollectibleItem, CollectibleKind, Collector};
use crate::diff::{CollectorDiff, DiffReport};
use crate::error::{EncodingError, FormatError, Result};

pub use model::{Group, Sudoer, User};
pub use parser::{LineError, parse_group_line, parse_sudoer_line, parse_user_line};

const DIGEST_LEN: usize = 16;

/// Raw result of one run. A field is `None` when its sub-fact could not be
/// gathered; it is then encoded as an empty list or an all-zero digest.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UsersSnapshot {
    pub users: Option<Vec<User>>,
    pub groups: Option<Vec<Group>>,
    pub sudoers: Option<Vec<Sudoer>>,
    pub passwd_digest: Option<[u8; DIGEST_LEN]>,
    pub group_digest: Option<[u8; DIGEST_LEN]>,
}

impl UsersSnapshot {
    pub fn users(&self) -> &[User] {
        self.users.as_deref().unwrap_or_default()
    }

    pub fn groups(&self) -> &[Group] {
        self.groups.as_deref().unwrap_or_default()
    }

    pub fn sudoers(&self) -> &[Sudoer] {
        self.sudoers.as_deref().unwrap_or_default()
    }

    pub fn encode_content(&self) -> Result<Vec<u8>, EncodingError> {
        let mut buf = Vec::new();
        encode_list(&mut buf, self.users())?;
        encode_list(&mut buf, self.groups())?;
        encode_list(&mut buf, self.sudoers())?;
        buf.extend_from_slice(&self.passwd_digest.unwrap_or_default());
        buf.extend_from_slice(&self.group_digest.unwrap_or_default());
        Ok(buf)
    }

    /// Decodes content bytes and returns what follows them.
    pub fn decode_content(data: &[u8]) -> Result<(Self, &[u8]), FormatError> {
        let (users, rest) = decode_list::<User>(data)?;
        let (groups, rest) = decode_list::<Group>(rest)?;
        let (sudoers, rest) = decode_list::<Sudoer>(rest)?;
        let (passwd_digest, rest) = take_array::<DIGEST_LEN>(rest)?;
        let (group_digest, rest) = take_array::<DIGEST_LEN>(rest)?;
        Ok((
            Self {
                users: Some(users),
                groups: Some(groups),
                sudoers: Some(sudoers),
                passwd_digest: Some(passwd_digest),
                group_digest: Some(group_digest),
            },
            rest,
        ))
    }
}

fn encode_list<T: Collectible>(buf: &mut Vec<u8>, items: &[T]) -> Result<(), EncodingError> {
    put_len(buf, items.len())?;
    for item in items {
        item.encode_into(buf)?;
    }
    Ok(())
}

fn decode_list<T: Collectible>(data: &[u8]) -> Result<(Vec<T>, &[u8]), FormatError> {
    let (count, mut rest) = take_varint(data)?;
    let mut items = Vec::new();
    for _ in 0..count {
        let (item, next) = T::from_bytes(rest)?;
        items.push(item);
        rest = next;
    }
    Ok((items, rest))
}

/// Reads lines from the source and parses them, skipping malformed ones.
fn gather<T>(
    what: &'static str,
    lines: std::io::Result<Vec<String>>,
    parse: impl Fn(&str) -> std::result::Result<T, LineError>,
) -> Option<Vec<T>> {
    let lines = match lines {
        Ok(lines) => lines,
        Err(e) => {
            warn!(collector = UsersCollector::NAME, error = %e, "cannot gather {}", what);
            return None;
        }
    };
    let items: Vec<T> = lines
        .iter()
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| match parse(line) {
            Ok(item) => Some(item),
            Err(e) => {
                warn!(collector = UsersCollector::NAME, error = %e, "skipping line");
                None
            }
        })
        .collect();
    debug!(collector = UsersCollector::NAME, count = items.len(), "gathered {}", what);
    Some(items)
}

fn digest(source: &dyn HostSource, path: &str) -> Option<[u8; DIGEST_LEN]> {
    match source.digest(Path::new(path)) {
        Ok(d) => Some(d),
        Err(e) => {
            warn!(collector = UsersCollector::NAME, path, error = %e, "cannot digest file");
            None
        }
    }
}

fn joined<T>(what: &str, handle: thread::ScopedJoinHandle<'_, Option<T>>) -> Option<T> {
    handle.join().unwrap_or_else(|_| {
        error!(collector = UsersCollector::NAME, "{} worker panicked", what);
        None
    })
}

pub struct UsersCollector {
    source: Arc<dyn HostSource>,
    running: bool,
    raw: Option<UsersSnapshot>,
    formatted: Option<Vec<u8>>,
}

impl std::fmt::Debug for UsersCollector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UsersCollector")
            .field("running", &self.running)
            .field("raw", &self.raw)
            .field("formatted", &self.formatted.as_ref().map(Vec::len))
            .finish()
    }
}

impl UsersCollector {
    pub fn new(source: Arc<dyn HostSource>) -> Self {
        Self {
            source,
            running: false,
            raw: None,
            formatted: None,
        }
    }

    /// A collector holding an already gathered result.
    pub fn with_snapshot(source: Arc<dyn HostSource>, snapshot: UsersSnapshot) -> Self {
        Self {
            raw: Some(snapshot),
            ..Self::new(source)
        }
    }

    pub fn snapshot(&self) -> Option<&UsersSnapshot> {
        self.raw.as_ref()
    }

    fn set_snapshot(&mut self, snapshot: UsersSnapshot) {
        self.raw = Some(snapshot);
        self.formatted = None;
    }
}

impl Collector for UsersCollector {
    const NAME: &'static str = "Users Collector";
    const DESCRIPTION: &'static str = "For Linux/Unix platforms only. \
        Collects all the users and groups available on this machine as well as the sudoers.";
    const TYPE_TAG: u8 = 0x00;
    const REPORT_TREE: &'static [CollectibleKind] = &[
        CollectibleKind::User,
        CollectibleKind::Group,
        CollectibleKind::Sudoer,
    ];

    fn run(&mut self) {
        self.running = true;
        let source: &dyn HostSource = &*self.source;

        let snapshot = thread::scope(|s| {
            let users = s.spawn(|| gather("users", source.user_lines(), parse_user_line));
            let groups = s.spawn(|| gather("groups", source.group_lines(), parse_group_line));
            let sudoers = s.spawn(|| gather("sudoers", source.sudoer_lines(), parse_sudoer_line));
            let passwd = s.spawn(|| digest(source, PASSWD_PATH));
            let group = s.spawn(|| digest(source, GROUP_PATH));

            UsersSnapshot {
                users: joined("users", users),
                groups: joined("groups", groups),
                sudoers: joined("sudoers", sudoers),
                passwd_digest: joined("passwd digest", passwd),
                group_digest: joined("group digest", group),
            }
        });

        self.set_snapshot(snapshot);
        self.running = false;
    }

    fn is_running(&self) -> bool {
        self.running
    }

    fn has_result(&self) -> bool {
        self.raw.is_some()
    }

    fn format(&mut self) -> Result<(), EncodingError> {
        let Some(raw) = &self.raw else {
            return Ok(());
        };
        let content = raw.encode_content()?;
        let mut out = Vec::with_capacity(content.len() + 9);
        out.push(Self::TYPE_TAG);
        put_len(&mut out, content.len())?;
        out.extend_from_slice(&content);
        self.formatted = Some(out);
        Ok(())
    }

    fn formatted(&self) -> Option<&[u8]> {
        self.formatted.as_deref()
    }

    fn import_binary<'a>(&mut self, data: &'a [u8]) -> Result<&'a [u8]> {
        let (snapshot, rest) = UsersSnapshot::decode_content(data)?;
        self.set_snapshot(snapshot);
        Ok(rest)
    }

    fn export_relational<C: GenericClient>(&self, client: &mut C, run_id: &str) -> Result<()> {
        let empty = UsersSnapshot::default();
        relational::export_snapshot(client, run_id, self.raw.as_ref().unwrap_or(&empty))
    }

    fn import_relational<C: GenericClient>(&mut self, client: &mut C, run_id: &str) -> Result<()> {
        let snapshot = relational::import_snapshot(client, run_id)?;
        self.set_snapshot(snapshot);
        Ok(())
    }

    fn collectibles(&self, kind: CollectibleKind) -> Vec<CollectibleItem> {
        let Some(raw) = &self.raw else {
            return Vec::new();
        };
        match kind {
            CollectibleKind::User => raw.users().iter().cloned().map(User::into_item).collect(),
            CollectibleKind::Group => raw.groups().iter().cloned().map(Group::into_item).collect(),
            CollectibleKind::Sudoer => raw.sudoers().iter().copied().map(Sudoer::into_item).collect(),
        }
    }

    fn same_state(&self, other: &Self) -> bool {
        match (&self.raw, &other.raw) {
            (Some(a), Some(b)) => match (a.encode_content(), b.encode_content()) {
                (Ok(a), Ok(b)) => a == b,
                _ => false,
            },
            _ => false,
        }
    }

    fn export_diff_relational<C: GenericClient>(
        client: &mut C,
        report_id: &str,
        diff: &CollectorDiff,
        run_ids: [&str; 2],
    ) -> Result<()> {
        relational::export_diff(client, report_id, diff, run_ids)
    }

    fn import_diff_relational<C: GenericClient>(
        client: &mut C,
        report_id: &str,
        run_ids: [&str; 2],
        report: &mut DiffReport,
    ) -> Result<()> {
        relational::import_diff(client, report_id, run_ids, report)
    }
}
