//! Embedded DuckDB driver for quotegate.
//!
//! The database file is named by the descriptor's `database` key (`:memory:` for an
//! in-process scratch database). File databases are opened read-only. The descriptor
//! timeout is checked while rows are fetched, so a single long prepare or execute is
//! not interrupted.

use std::path::Path;
use std::time::{Duration, Instant};

use ::duckdb::types::Value as DuckValue;
use ::duckdb::{AccessMode, Config, Connection, ToSql};
use quotegate_core::session::decode_access_token;
use quotegate_core::{
    ConnectAttribute, ConnectRequest, ConnectTarget, ConnectionDescriptor, RawRow, Session,
    SqlValue, StoreDriver, StoreError, StoreQuery,
};
use time::Date;
use tracing::{debug, warn};

use quotegate_core::session::SQL_COPT_SS_ACCESS_TOKEN;

const IN_MEMORY: &str = ":memory:";
// Julian day number of 1970-01-01.
const UNIX_EPOCH_JULIAN_DAY: i32 = 2_440_588;

#[derive(Debug, Default, Clone, Copy)]
pub struct EmbeddedDriver;

impl EmbeddedDriver {
    pub fn new() -> Self {
        Self
    }
}

impl StoreDriver for EmbeddedDriver {
    fn name(&self) -> &'static str {
        "duckdb"
    }

    fn connect(&self, request: &ConnectRequest) -> Result<Box<dyn Session>, StoreError> {
        let database = match &request.target {
            ConnectTarget::ConnectionString {
                connection_string,
                attributes,
            } => {
                check_attributes(attributes)?;
                let descriptor = ConnectionDescriptor::parse(connection_string)
                    .map_err(|e| StoreError::Connect(e.to_string()))?;
                descriptor
                    .database()
                    .map(str::to_owned)
                    .ok_or_else(|| StoreError::Connect(String::from("descriptor names no database")))?
            }
            ConnectTarget::Fields(fields) => {
                debug!(
                    host = %fields.host,
                    port = fields.port,
                    encrypt = fields.encrypt,
                    trust_server_certificate = fields.trust_server_certificate,
                    "embedded driver ignores network fields"
                );
                fields.database.clone()
            }
        };

        let connection = open_connection(&database)?;
        Ok(Box::new(DuckSession {
            connection,
            timeout: request.timeout,
        }))
    }
}

fn check_attributes(attributes: &[ConnectAttribute]) -> Result<(), StoreError> {
    for attribute in attributes {
        if attribute.key == SQL_COPT_SS_ACCESS_TOKEN {
            if decode_access_token(&attribute.value).is_none() {
                return Err(StoreError::Connect(String::from(
                    "malformed access token attribute",
                )));
            }
            // Embedded files carry no server-side principal to authenticate against.
            debug!("access token attribute accepted");
        } else {
            warn!(key = attribute.key, "ignoring unknown pre-connect attribute");
        }
    }
    Ok(())
}

/// Open a database and apply session settings. Files are opened read-only.
fn open_connection(database: &str) -> Result<Connection, StoreError> {
    let connection = if database == IN_MEMORY {
        Connection::open_in_memory()
    } else {
        let path = Path::new(database);
        if !path.exists() {
            return Err(StoreError::Connect(format!(
                "database file not found: {}",
                path.display()
            )));
        }
        Config::default()
            .access_mode(AccessMode::ReadOnly)
            .and_then(|config| Connection::open_with_flags(path, config))
    }
    .map_err(|e| StoreError::Connect(e.to_string()))?;

    configure_connection(&connection).map_err(|e| StoreError::Connect(e.to_string()))?;
    Ok(connection)
}

fn configure_connection(connection: &Connection) -> Result<(), ::duckdb::Error> {
    connection.execute_batch("PRAGMA disable_progress_bar;")
}

pub struct DuckSession {
    connection: Connection,
    timeout: Duration,
}

impl DuckSession {
    /// Session over an existing connection, used when the caller owns the database.
    pub fn from_connection(connection: Connection, timeout: Duration) -> Self {
        Self {
            connection,
            timeout,
        }
    }
}

impl Session for DuckSession {
    fn query(&mut self, query: &StoreQuery) -> Result<Vec<RawRow>, StoreError> {
        let started = Instant::now();
        let params: Vec<DuckValue> = query.params.iter().map(to_duck_value).collect();
        let bound: Vec<&dyn ToSql> = params.iter().map(|value| value as &dyn ToSql).collect();

        let mut statement = self.connection.prepare(&query.sql).map_err(query_error)?;
        let mut cursor = statement.query(bound.as_slice()).map_err(query_error)?;

        let mut rows = Vec::new();
        while let Some(row) = cursor.next().map_err(query_error)? {
            ensure_timeout(started, self.timeout)?;
            let mut raw = RawRow::new();
            for (index, column) in query.columns.iter().enumerate() {
                let value: DuckValue = row.get(index).map_err(query_error)?;
                raw.insert(column, to_sql_value(value));
            }
            rows.push(raw);
        }

        ensure_timeout(started, self.timeout)?;
        debug!(rows = rows.len(), elapsed_ms = started.elapsed().as_millis() as u64, "duckdb query finished");
        Ok(rows)
    }
}

fn query_error(error: ::duckdb::Error) -> StoreError {
    StoreError::Query(error.to_string())
}

fn to_duck_value(value: &SqlValue) -> DuckValue {
    match value {
        SqlValue::Null => DuckValue::Null,
        SqlValue::Int(value) => DuckValue::BigInt(*value),
        SqlValue::Float(value) => DuckValue::Double(*value),
        SqlValue::Text(value) => DuckValue::Text(value.clone()),
        SqlValue::Date(value) => DuckValue::Text(value.to_string()),
    }
}

fn to_sql_value(value: DuckValue) -> SqlValue {
    match value {
        DuckValue::Null => SqlValue::Null,
        DuckValue::Boolean(value) => SqlValue::Int(i64::from(value)),
        DuckValue::TinyInt(value) => SqlValue::Int(i64::from(value)),
        DuckValue::SmallInt(value) => SqlValue::Int(i64::from(value)),
        DuckValue::Int(value) => SqlValue::Int(i64::from(value)),
        DuckValue::BigInt(value) => SqlValue::Int(value),
        DuckValue::UTinyInt(value) => SqlValue::Int(i64::from(value)),
        DuckValue::USmallInt(value) => SqlValue::Int(i64::from(value)),
        DuckValue::UInt(value) => SqlValue::Int(i64::from(value)),
        DuckValue::UBigInt(value) => {
            i64::try_from(value).map_or(SqlValue::Float(value as f64), SqlValue::Int)
        }
        DuckValue::Float(value) => SqlValue::Float(f64::from(value)),
        DuckValue::Double(value) => SqlValue::Float(value),
        DuckValue::Text(value) => SqlValue::Text(value),
        DuckValue::Blob(value) => SqlValue::Text(hex::encode(value)),
        DuckValue::Date32(days) => date_from_epoch_days(days).map_or(SqlValue::Null, SqlValue::Date),
        other => SqlValue::Text(format!("{other:?}")),
    }
}

fn date_from_epoch_days(days: i32) -> Option<Date> {
    let julian = UNIX_EPOCH_JULIAN_DAY.checked_add(days)?;
    Date::from_julian_day(julian).ok()
}

fn ensure_timeout(started: Instant, timeout: Duration) -> Result<(), StoreError> {
    if started.elapsed() > timeout {
        return Err(StoreError::Timeout {
            timeout_secs: timeout.as_secs(),
        });
    }
    Ok(())
}
