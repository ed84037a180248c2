//! PostgreSQL backend: connection target and the catalog tables that list
//! which collectors a saved run or report contains.
//!
//! Collector payloads live in per-collector tables owned by each collector;
//! this module only knows the catalog:
//!
//! - `snapshots(run_id, collector_type)`
//! - `reports(report_id, run_id_a, run_id_b)`
//! - `reports_collectors(report_id, collector_type)`

use postgres::{Client, GenericClient, NoTls};
use tracing::debug;

use crate::error::{AuditError, EncodingError, Result};

pub const CATALOG_SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS snapshots (
    run_id TEXT NOT NULL,
    collector_type SMALLINT NOT NULL,
    PRIMARY KEY (run_id, collector_type)
);
CREATE TABLE IF NOT EXISTS reports (
    report_id TEXT PRIMARY KEY,
    run_id_a TEXT NOT NULL,
    run_id_b TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS reports_collectors (
    report_id TEXT NOT NULL,
    collector_type SMALLINT NOT NULL,
    PRIMARY KEY (report_id, collector_type)
);
";

/// Where the relational backend lives.
#[derive(Clone, PartialEq, Eq)]
pub struct DbTarget {
    connection_string: String,
}

impl std::fmt::Debug for DbTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // The connection string may carry a password.
        f.debug_struct("DbTarget").finish_non_exhaustive()
    }
}

impl DbTarget {
    pub fn new(connection_string: impl Into<String>) -> Self {
        Self {
            connection_string: connection_string.into(),
        }
    }

    /// Builds a target from the standard libpq environment variables:
    /// - PGHOST (default: localhost)
    /// - PGPORT (default: 5432)
    /// - PGUSER (default: $USER)
    /// - PGPASSWORD (default: empty)
    /// - PGDATABASE (default: same as PGUSER)
    ///
    /// Returns `None` when no user can be determined.
    pub fn from_env() -> Option<Self> {
        let user = std::env::var("PGUSER")
            .or_else(|_| std::env::var("USER"))
            .ok()?;
        let host = std::env::var("PGHOST").unwrap_or_else(|_| "localhost".to_string());
        let port = std::env::var("PGPORT").unwrap_or_else(|_| "5432".to_string());
        let password = std::env::var("PGPASSWORD").unwrap_or_default();
        let database = std::env::var("PGDATABASE").unwrap_or_else(|_| user.clone());

        Some(Self::from_parts(&host, &port, &user, &password, &database))
    }

    pub fn from_parts(host: &str, port: &str, user: &str, password: &str, database: &str) -> Self {
        let connection_string = if password.is_empty() {
            format!("host={} port={} user={} dbname={}", host, port, user, database)
        } else {
            format!(
                "host={} port={} user={} password={} dbname={}",
                host, port, user, password, database
            )
        };
        Self { connection_string }
    }

    pub fn connection_string(&self) -> &str {
        &self.connection_string
    }

    /// Opens a fresh connection. Every backend call owns its own.
    pub fn connect(&self) -> Result<Client> {
        debug!("connecting to relational backend");
        Ok(Client::connect(&self.connection_string, NoTls)?)
    }
}

/// Converts an unsigned fact field to a `BIGINT` column value.
pub fn to_sql_int(value: u64) -> Result<i64, EncodingError> {
    i64::try_from(value).map_err(|_| EncodingError::OutOfRange(value))
}

pub fn from_sql_int(value: i64) -> Result<u64, EncodingError> {
    u64::try_from(value).map_err(|_| EncodingError::Negative(value))
}

pub fn create_catalog<C: GenericClient>(client: &mut C) -> Result<()> {
    client.batch_execute(CATALOG_SCHEMA)?;
    Ok(())
}

/// Replaces the collector list of `run_id`.
pub fn record_snapshot<C: GenericClient>(client: &mut C, run_id: &str, tags: &[u8]) -> Result<()> {
    create_catalog(client)?;
    client.execute("DELETE FROM snapshots WHERE run_id = $1", &[&run_id])?;
    for tag in tags {
        client.execute(
            "INSERT INTO snapshots (run_id, collector_type) VALUES ($1, $2)",
            &[&run_id, &i16::from(*tag)],
        )?;
    }
    Ok(())
}

/// Collector tags saved for `run_id`, empty when the run is unknown.
pub fn snapshot_collectors<C: GenericClient>(client: &mut C, run_id: &str) -> Result<Vec<u8>> {
    create_catalog(client)?;
    let rows = client.query(
        "SELECT collector_type FROM snapshots WHERE run_id = $1 ORDER BY collector_type",
        &[&run_id],
    )?;
    rows.iter()
        .map(|row| tag_from_column(row.get("collector_type")))
        .collect()
}

/// Replaces the catalog entry of `report_id`.
pub fn record_report<C: GenericClient>(
    client: &mut C,
    report_id: &str,
    run_ids: [&str; 2],
    tags: &[u8],
) -> Result<()> {
    create_catalog(client)?;
    client.execute("DELETE FROM reports_collectors WHERE report_id = $1", &[&report_id])?;
    client.execute("DELETE FROM reports WHERE report_id = $1", &[&report_id])?;
    client.execute(
        "INSERT INTO reports (report_id, run_id_a, run_id_b) VALUES ($1, $2, $3)",
        &[&report_id, &run_ids[0], &run_ids[1]],
    )?;
    for tag in tags {
        client.execute(
            "INSERT INTO reports_collectors (report_id, collector_type) VALUES ($1, $2)",
            &[&report_id, &i16::from(*tag)],
        )?;
    }
    Ok(())
}

/// Run ids and collector tags of a saved report.
pub fn report_catalog<C: GenericClient>(
    client: &mut C,
    report_id: &str,
) -> Result<Option<(String, String, Vec<u8>)>> {
    create_catalog(client)?;
    let Some(row) = client.query_opt(
        "SELECT run_id_a, run_id_b FROM reports WHERE report_id = $1",
        &[&report_id],
    )?
    else {
        return Ok(None);
    };
    let run_id_a: String = row.get("run_id_a");
    let run_id_b: String = row.get("run_id_b");

    let tags = client
        .query(
            "SELECT collector_type FROM reports_collectors WHERE report_id = $1 ORDER BY collector_type",
            &[&report_id],
        )?
        .iter()
        .map(|row| tag_from_column(row.get("collector_type")))
        .collect::<Result<Vec<u8>>>()?;

    Ok(Some((run_id_a, run_id_b, tags)))
}

fn tag_from_column(value: i16) -> Result<u8> {
    u8::try_from(value).map_err(|_| {
        let e = if value < 0 {
            EncodingError::Negative(i64::from(value))
        } else {
            EncodingError::OutOfRange(value as u64)
        };
        AuditError::Encoding(e)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_string_without_password() {
        let target = DbTarget::from_parts("db.local", "5433", "audit", "", "audit");
        assert_eq!(
            target.connection_string(),
            "host=db.local port=5433 user=audit dbname=audit"
        );
    }

    #[test]
    fn test_connection_string_with_password() {
        let target = DbTarget::from_parts("localhost", "5432", "audit", "s3cret", "hosts");
        assert_eq!(
            target.connection_string(),
            "host=localhost port=5432 user=audit password=s3cret dbname=hosts"
        );
        assert!(!format!("{target:?}").contains("s3cret"));
    }

    #[test]
    fn test_sql_int_conversions() {
        assert_eq!(to_sql_int(1000), Ok(1000));
        assert_eq!(to_sql_int(u64::MAX), Err(EncodingError::OutOfRange(u64::MAX)));
        assert_eq!(from_sql_int(27), Ok(27));
        assert_eq!(from_sql_int(-1), Err(EncodingError::Negative(-1)));
    }

    #[test]
    fn test_catalog_schema_is_idempotent() {
        assert_eq!(CATALOG_SCHEMA.matches("CREATE TABLE IF NOT EXISTS").count(), 3);
        assert_eq!(CATALOG_SCHEMA.matches("CREATE TABLE").count(), 3);
    }

    #[test]
    fn test_tag_from_column() {
        assert_eq!(tag_from_column(0).unwrap(), 0);
        assert!(tag_from_column(-3).is_err());
        assert!(tag_from_column(300).is_err());
    }
}
