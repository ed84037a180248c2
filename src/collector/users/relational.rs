//! PostgreSQL tables of the users collector.
//!
//! Snapshot rows are keyed by `run_id`, report rows by `report_id`. A
//! `position` column keeps list order so a reload yields the exact same
//! encoded content. Saving the same id twice replaces the earlier rows.

use std::collections::HashMap;

use postgres::GenericClient;
use tracing::debug;

use super::model::{Group, Sudoer, User};
use super::{UsersCollector, UsersSnapshot};
use crate::collector::{CollectibleItem, CollectibleKind, Collector};
use crate::diff::{ChangeKind, CollectorDiff, DiffElement, DiffReport};
use crate::error::{AuditError, FormatError, Result};
use crate::storage::relational::{from_sql_int, to_sql_int};

pub(super) const SNAPSHOT_SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS users_collector (
    run_id TEXT PRIMARY KEY,
    passwd_digest BYTEA,
    group_digest BYTEA
);
CREATE TABLE IF NOT EXISTS collected_users (
    run_id TEXT NOT NULL,
    position BIGINT NOT NULL,
    uid BIGINT NOT NULL,
    name TEXT NOT NULL,
    PRIMARY KEY (run_id, position)
);
CREATE TABLE IF NOT EXISTS collected_user_groups (
    run_id TEXT NOT NULL,
    user_position BIGINT NOT NULL,
    position BIGINT NOT NULL,
    gid BIGINT NOT NULL,
    PRIMARY KEY (run_id, user_position, position)
);
CREATE TABLE IF NOT EXISTS collected_groups (
    run_id TEXT NOT NULL,
    position BIGINT NOT NULL,
    gid BIGINT NOT NULL,
    name TEXT NOT NULL,
    PRIMARY KEY (run_id, position)
);
CREATE TABLE IF NOT EXISTS collected_sudoers (
    run_id TEXT NOT NULL,
    position BIGINT NOT NULL,
    uid BIGINT NOT NULL,
    PRIMARY KEY (run_id, position)
);
";

pub(super) const REPORT_SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS report_users (
    report_id TEXT NOT NULL,
    position BIGINT NOT NULL,
    run_id TEXT NOT NULL,
    change SMALLINT NOT NULL,
    uid BIGINT NOT NULL,
    name TEXT NOT NULL,
    PRIMARY KEY (report_id, position)
);
CREATE TABLE IF NOT EXISTS report_user_groups (
    report_id TEXT NOT NULL,
    user_position BIGINT NOT NULL,
    position BIGINT NOT NULL,
    gid BIGINT NOT NULL,
    PRIMARY KEY (report_id, user_position, position)
);
CREATE TABLE IF NOT EXISTS report_groups (
    report_id TEXT NOT NULL,
    position BIGINT NOT NULL,
    run_id TEXT NOT NULL,
    change SMALLINT NOT NULL,
    gid BIGINT NOT NULL,
    name TEXT NOT NULL,
    PRIMARY KEY (report_id, position)
);
CREATE TABLE IF NOT EXISTS report_sudoers (
    report_id TEXT NOT NULL,
    position BIGINT NOT NULL,
    run_id TEXT NOT NULL,
    change SMALLINT NOT NULL,
    uid BIGINT NOT NULL,
    PRIMARY KEY (report_id, position)
);
";

const SNAPSHOT_TABLES: [&str; 5] = [
    "users_collector",
    "collected_users",
    "collected_user_groups",
    "collected_groups",
    "collected_sudoers",
];

const REPORT_TABLES: [&str; 4] = [
    "report_users",
    "report_user_groups",
    "report_groups",
    "report_sudoers",
];

fn digest_from_column(value: Option<Vec<u8>>) -> Result<Option<[u8; 16]>, FormatError> {
    value
        .map(|bytes| {
            <[u8; 16]>::try_from(bytes.as_slice()).map_err(|_| FormatError::Truncated {
                needed: 16,
                available: bytes.len(),
            })
        })
        .transpose()
}

fn change_from_column(value: i16) -> Result<ChangeKind> {
    let code = from_sql_int(i64::from(value))?;
    Ok(ChangeKind::from_code(code)?)
}

pub(super) fn export_snapshot<C: GenericClient>(
    client: &mut C,
    run_id: &str,
    snapshot: &UsersSnapshot,
) -> Result<()> {
    client.batch_execute(SNAPSHOT_SCHEMA)?;
    for table in SNAPSHOT_TABLES {
        client.execute(
            format!("DELETE FROM {table} WHERE run_id = $1").as_str(),
            &[&run_id],
        )?;
    }

    client.execute(
        "INSERT INTO users_collector (run_id, passwd_digest, group_digest) VALUES ($1, $2, $3)",
        &[
            &run_id,
            &snapshot.passwd_digest.map(|d| d.to_vec()),
            &snapshot.group_digest.map(|d| d.to_vec()),
        ],
    )?;

    for (position, user) in snapshot.users().iter().enumerate() {
        let position = position as i64;
        client.execute(
            "INSERT INTO collected_users (run_id, position, uid, name) VALUES ($1, $2, $3, $4)",
            &[&run_id, &position, &to_sql_int(user.uid)?, &user.name],
        )?;
        for (group_position, gid) in user.groups.iter().enumerate() {
            client.execute(
                "INSERT INTO collected_user_groups (run_id, user_position, position, gid) \
                 VALUES ($1, $2, $3, $4)",
                &[&run_id, &position, &(group_position as i64), &to_sql_int(*gid)?],
            )?;
        }
    }

    for (position, group) in snapshot.groups().iter().enumerate() {
        client.execute(
            "INSERT INTO collected_groups (run_id, position, gid, name) VALUES ($1, $2, $3, $4)",
            &[&run_id, &(position as i64), &to_sql_int(group.gid)?, &group.name],
        )?;
    }

    for (position, sudoer) in snapshot.sudoers().iter().enumerate() {
        client.execute(
            "INSERT INTO collected_sudoers (run_id, position, uid) VALUES ($1, $2, $3)",
            &[&run_id, &(position as i64), &to_sql_int(sudoer.uid)?],
        )?;
    }

    debug!(
        collector = UsersCollector::NAME,
        run_id,
        users = snapshot.users().len(),
        "exported snapshot rows"
    );
    Ok(())
}

/// Loads the rows of `run_id`; fails with `UnknownRun` when none exist.
pub(super) fn import_snapshot<C: GenericClient>(client: &mut C, run_id: &str) -> Result<UsersSnapshot> {
    client.batch_execute(SNAPSHOT_SCHEMA)?;

    let Some(row) = client.query_opt(
        "SELECT passwd_digest, group_digest FROM users_collector WHERE run_id = $1",
        &[&run_id],
    )?
    else {
        return Err(AuditError::UnknownRun(run_id.to_string()));
    };
    let passwd_digest = digest_from_column(row.get("passwd_digest"))?;
    let group_digest = digest_from_column(row.get("group_digest"))?;

    let mut memberships: HashMap<i64, Vec<u64>> = HashMap::new();
    for row in client.query(
        "SELECT user_position, gid FROM collected_user_groups WHERE run_id = $1 \
         ORDER BY user_position, position",
        &[&run_id],
    )? {
        memberships
            .entry(row.get("user_position"))
            .or_default()
            .push(from_sql_int(row.get("gid"))?);
    }

    let mut users = Vec::new();
    for row in client.query(
        "SELECT position, uid, name FROM collected_users WHERE run_id = $1 ORDER BY position",
        &[&run_id],
    )? {
        let position: i64 = row.get("position");
        users.push(User::new(
            from_sql_int(row.get("uid"))?,
            row.get::<_, String>("name"),
            memberships.remove(&position).unwrap_or_default(),
        ));
    }

    let mut groups = Vec::new();
    for row in client.query(
        "SELECT gid, name FROM collected_groups WHERE run_id = $1 ORDER BY position",
        &[&run_id],
    )? {
        groups.push(Group::new(
            from_sql_int(row.get("gid"))?,
            row.get::<_, String>("name"),
        ));
    }

    let mut sudoers = Vec::new();
    for row in client.query(
        "SELECT uid FROM collected_sudoers WHERE run_id = $1 ORDER BY position",
        &[&run_id],
    )? {
        sudoers.push(Sudoer::new(from_sql_int(row.get("uid"))?));
    }

    Ok(UsersSnapshot {
        users: Some(users),
        groups: Some(groups),
        sudoers: Some(sudoers),
        passwd_digest,
        group_digest,
    })
}

pub(super) fn export_diff<C: GenericClient>(
    client: &mut C,
    report_id: &str,
    diff: &CollectorDiff,
    run_ids: [&str; 2],
) -> Result<()> {
    client.batch_execute(REPORT_SCHEMA)?;
    for table in REPORT_TABLES {
        client.execute(
            format!("DELETE FROM {table} WHERE report_id = $1").as_str(),
            &[&report_id],
        )?;
    }

    for elements in diff.values() {
        for (position, element) in elements.iter().enumerate() {
            if !run_ids.contains(&element.run_id.as_str()) {
                return Err(AuditError::ForeignRun {
                    run_id: element.run_id.clone(),
                    first: run_ids[0].to_string(),
                    second: run_ids[1].to_string(),
                });
            }
            let position = position as i64;
            let change = i16::from(element.change.code());
            match &element.item {
                CollectibleItem::User(user) => {
                    client.execute(
                        "INSERT INTO report_users (report_id, position, run_id, change, uid, name) \
                         VALUES ($1, $2, $3, $4, $5, $6)",
                        &[
                            &report_id,
                            &position,
                            &element.run_id,
                            &change,
                            &to_sql_int(user.uid)?,
                            &user.name,
                        ],
                    )?;
                    for (group_position, gid) in user.groups.iter().enumerate() {
                        client.execute(
                            "INSERT INTO report_user_groups (report_id, user_position, position, gid) \
                             VALUES ($1, $2, $3, $4)",
                            &[
                                &report_id,
                                &position,
                                &(group_position as i64),
                                &to_sql_int(*gid)?,
                            ],
                        )?;
                    }
                }
                CollectibleItem::Group(group) => {
                    client.execute(
                        "INSERT INTO report_groups (report_id, position, run_id, change, gid, name) \
                         VALUES ($1, $2, $3, $4, $5, $6)",
                        &[
                            &report_id,
                            &position,
                            &element.run_id,
                            &change,
                            &to_sql_int(group.gid)?,
                            &group.name,
                        ],
                    )?;
                }
                CollectibleItem::Sudoer(sudoer) => {
                    client.execute(
                        "INSERT INTO report_sudoers (report_id, position, run_id, change, uid) \
                         VALUES ($1, $2, $3, $4, $5)",
                        &[
                            &report_id,
                            &position,
                            &element.run_id,
                            &change,
                            &to_sql_int(sudoer.uid)?,
                        ],
                    )?;
                }
            }
        }
    }
    Ok(())
}

/// Rebuilds this collector's subtree of `report_id`. Kinds without rows
/// come back as empty lists.
pub(super) fn import_diff<C: GenericClient>(
    client: &mut C,
    report_id: &str,
    run_ids: [&str; 2],
    report: &mut DiffReport,
) -> Result<()> {
    client.batch_execute(REPORT_SCHEMA)?;
    let mut diff = UsersCollector::report_tree_structure();

    let mut memberships: HashMap<i64, Vec<u64>> = HashMap::new();
    for row in client.query(
        "SELECT user_position, gid FROM report_user_groups WHERE report_id = $1 \
         ORDER BY user_position, position",
        &[&report_id],
    )? {
        memberships
            .entry(row.get("user_position"))
            .or_default()
            .push(from_sql_int(row.get("gid"))?);
    }

    let mut elements = Vec::new();
    for row in client.query(
        "SELECT position, run_id, change, uid, name FROM report_users \
         WHERE report_id = $1 ORDER BY position",
        &[&report_id],
    )? {
        let position: i64 = row.get("position");
        let user = User::new(
            from_sql_int(row.get("uid"))?,
            row.get::<_, String>("name"),
            memberships.remove(&position).unwrap_or_default(),
        );
        elements.push(DiffElement::new(
            row.get::<_, String>("run_id"),
            user,
            change_from_column(row.get("change"))?,
        ));
    }
    diff.insert(CollectibleKind::User, elements);

    let mut elements = Vec::new();
    for row in client.query(
        "SELECT run_id, change, gid, name FROM report_groups \
         WHERE report_id = $1 ORDER BY position",
        &[&report_id],
    )? {
        let group = Group::new(from_sql_int(row.get("gid"))?, row.get::<_, String>("name"));
        elements.push(DiffElement::new(
            row.get::<_, String>("run_id"),
            group,
            change_from_column(row.get("change"))?,
        ));
    }
    diff.insert(CollectibleKind::Group, elements);

    let mut elements = Vec::new();
    for row in client.query(
        "SELECT run_id, change, uid FROM report_sudoers WHERE report_id = $1 ORDER BY position",
        &[&report_id],
    )? {
        elements.push(DiffElement::new(
            row.get::<_, String>("run_id"),
            Sudoer::new(from_sql_int(row.get("uid"))?),
            change_from_column(row.get("change"))?,
        ));
    }
    diff.insert(CollectibleKind::Sudoer, elements);

    if let Some(foreign) = diff
        .values()
        .flatten()
        .find(|e| !run_ids.contains(&e.run_id.as_str()))
    {
        return Err(AuditError::ForeignRun {
            run_id: foreign.run_id.clone(),
            first: run_ids[0].to_string(),
            second: run_ids[1].to_string(),
        });
    }

    report.insert_collector(UsersCollector::NAME, diff)
}
