//! Store sessions and the variant-specific ways of opening them.
//!
//! A [`StoreDriver`] knows how to turn a [`ConnectRequest`] into a live [`Session`].
//! A [`SessionProvider`] decides what that request looks like for one backend variant:
//! bearer token, verbatim connection string, or discrete fields.

mod access_token;
mod providers;

use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use time::Date;

use crate::config::BackendVariant;
use crate::domain::iso_date;
use crate::{GatewayError, StoreError};

pub use access_token::{decode_access_token, encode_access_token, SQL_COPT_SS_ACCESS_TOKEN};
pub use providers::{
    ConnectionStringSessionProvider, DiscreteFieldsSessionProvider, TokenSessionProvider,
};

/// Scalar read from, or bound into, a store query.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Int(i64),
    Float(f64),
    Text(String),
    Date(Date),
}

impl SqlValue {
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Numeric view; numeric text is accepted since some stores return decimals as text.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(value) => Some(*value as f64),
            Self::Float(value) => Some(*value),
            Self::Text(value) => value.trim().parse().ok(),
            Self::Null | Self::Date(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(value) => Some(value.as_str()),
            _ => None,
        }
    }

    /// Date view; text is read from its leading `YYYY-MM-DD`, so timestamps qualify.
    pub fn as_date(&self) -> Option<Date> {
        match self {
            Self::Date(value) => Some(*value),
            Self::Text(value) => value.get(..10).and_then(iso_date::parse),
            _ => None,
        }
    }
}

impl From<&str> for SqlValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_owned())
    }
}

impl From<Date> for SqlValue {
    fn from(value: Date) -> Self {
        Self::Date(value)
    }
}

static NULL: SqlValue = SqlValue::Null;

/// One result row keyed by output column name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawRow {
    columns: BTreeMap<String, SqlValue>,
}

impl RawRow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, column: &str, value: SqlValue) -> Self {
        self.insert(column, value);
        self
    }

    pub fn insert(&mut self, column: &str, value: SqlValue) {
        self.columns.insert(column.to_ascii_lowercase(), value);
    }

    /// Missing columns read as `Null`.
    pub fn get(&self, column: &str) -> &SqlValue {
        self.columns
            .get(&column.to_ascii_lowercase())
            .unwrap_or(&NULL)
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

/// Parametrised statement. `columns` names the result columns in select-list order.
#[derive(Debug, Clone, PartialEq)]
pub struct StoreQuery {
    pub sql: String,
    pub params: Vec<SqlValue>,
    pub columns: &'static [&'static str],
}

impl StoreQuery {
    pub fn new(sql: impl Into<String>, columns: &'static [&'static str]) -> Self {
        Self {
            sql: sql.into(),
            params: Vec::new(),
            columns,
        }
    }

    pub fn bind(mut self, value: impl Into<SqlValue>) -> Self {
        self.params.push(value.into());
        self
    }
}

/// An open, query-capable connection. Not shared between concurrent callers.
pub trait Session: Send {
    fn query(&mut self, query: &StoreQuery) -> Result<Vec<RawRow>, StoreError>;
}

/// Pre-connect attribute handed to the driver before the session is established.
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectAttribute {
    pub key: i32,
    pub value: Vec<u8>,
}

impl std::fmt::Debug for ConnectAttribute {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectAttribute")
            .field("key", &self.key)
            .field("len", &self.value.len())
            .finish()
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct DiscreteFields {
    pub host: String,
    pub port: u16,
    pub user: Option<String>,
    pub password: Option<String>,
    pub database: String,
    pub encrypt: bool,
    pub trust_server_certificate: bool,
}

impl std::fmt::Debug for DiscreteFields {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiscreteFields")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("database", &self.database)
            .field("encrypt", &self.encrypt)
            .field("trust_server_certificate", &self.trust_server_certificate)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectTarget {
    ConnectionString {
        connection_string: String,
        attributes: Vec<ConnectAttribute>,
    },
    Fields(DiscreteFields),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectRequest {
    pub target: ConnectTarget,
    pub timeout: Duration,
}

/// Driver seam: the embedded DuckDB driver ships in `quotegate-store`.
pub trait StoreDriver: Send + Sync {
    fn name(&self) -> &'static str;

    fn connect(&self, request: &ConnectRequest) -> Result<Box<dyn Session>, StoreError>;
}

/// Opens sessions for one backend variant.
pub trait SessionProvider: Send + Sync {
    fn variant(&self) -> BackendVariant;

    fn open<'a>(
        &'a self,
    ) -> Pin<Box<dyn Future<Output = Result<Box<dyn Session>, GatewayError>> + Send + 'a>>;
}
