//! Environment-driven configuration.
//!
//! `DC_DB_STRING` is mandatory. When it (or `ODBCSYSINI`) is missing from the process
//! environment, a local override file is consulted: `QUOTEGATE_ENV_FILE`, or `.env` in
//! the working directory.

use std::collections::HashMap;
use std::env;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use crate::credential::{CredentialCache, DeviceCodeProvider, DeviceCodeSettings, TokenFile};
use crate::http_client::ReqwestHttpClient;
use crate::schema::RowShape;
use crate::{ConfigError, ConnectionDescriptor};

pub const DESCRIPTOR_VAR: &str = "DC_DB_STRING";
pub const DRIVER_SEARCH_PATH_VAR: &str = "ODBCSYSINI";
const BACKEND_VAR: &str = "QUOTEGATE_BACKEND";
const SCHEMA_VAR: &str = "QUOTEGATE_SCHEMA";
const TOKEN_CACHE_VAR: &str = "QUOTEGATE_TOKEN_CACHE";
const ENV_FILE_VAR: &str = "QUOTEGATE_ENV_FILE";
const TENANT_VAR: &str = "QUOTEGATE_TENANT_ID";
const CLIENT_ID_VAR: &str = "QUOTEGATE_CLIENT_ID";
const DEFAULT_ENV_FILE: &str = ".env";
const TOKEN_FILE_NAME: &str = ".sql_token.json";

/// Session-opening strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendVariant {
    /// Bearer credential attached as a pre-connect attribute.
    TokenAuthenticated,
    /// Descriptor handed to the driver verbatim.
    DirectConnectionString,
    /// Server/user/password/database passed as discrete fields.
    UserPasswordDriver,
}

impl BackendVariant {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::TokenAuthenticated => "token",
            Self::DirectConnectionString => "direct",
            Self::UserPasswordDriver => "discrete",
        }
    }

    /// Physical row layout each variant has historically been deployed against.
    pub const fn default_shape(self) -> RowShape {
        match self {
            Self::TokenAuthenticated => RowShape::PrecomputedChange,
            Self::DirectConnectionString | Self::UserPasswordDriver => RowShape::Ohlcv,
        }
    }
}

impl Display for BackendVariant {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendVariant {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "token" | "entra" => Ok(Self::TokenAuthenticated),
            "direct" | "odbc" => Ok(Self::DirectConnectionString),
            "discrete" | "pymssql" => Ok(Self::UserPasswordDriver),
            _ => Err(ConfigError::InvalidSetting {
                key: BACKEND_VAR,
                value: value.to_owned(),
                expected: "token, direct, discrete",
            }),
        }
    }
}

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub descriptor: ConnectionDescriptor,
    pub variant: BackendVariant,
    pub shape: RowShape,
    pub token_cache_path: PathBuf,
    pub identity: DeviceCodeSettings,
    pub driver_search_path: Option<PathBuf>,
}

impl GatewayConfig {
    pub fn new(descriptor: ConnectionDescriptor, variant: BackendVariant) -> Self {
        Self {
            descriptor,
            variant,
            shape: variant.default_shape(),
            token_cache_path: default_token_cache_path(),
            identity: DeviceCodeSettings::default(),
            driver_search_path: None,
        }
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        let override_path = env::var_os(ENV_FILE_VAR)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_ENV_FILE));
        Self::from_sources(|key| env::var(key).ok(), &override_path)
    }

    /// Resolve settings from `lookup`, falling back to `override_file` for the descriptor
    /// and driver search path.
    pub fn from_sources(
        lookup: impl Fn(&str) -> Option<String>,
        override_file: &Path,
    ) -> Result<Self, ConfigError> {
        let lookup = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let mut overrides = None;
        let mut from_override = |key: &str| -> Result<Option<String>, ConfigError> {
            if overrides.is_none() {
                overrides = Some(read_override_file(override_file)?);
            }
            Ok(overrides.as_ref().and_then(|values| values.get(key).cloned()))
        };

        let descriptor = match lookup(DESCRIPTOR_VAR) {
            Some(value) => value,
            None => from_override(DESCRIPTOR_VAR)?.ok_or_else(|| ConfigError::MissingDescriptor {
                override_file: override_file.display().to_string(),
            })?,
        };
        let driver_search_path = match lookup(DRIVER_SEARCH_PATH_VAR) {
            Some(value) => Some(value),
            None => from_override(DRIVER_SEARCH_PATH_VAR)?,
        };

        let descriptor = ConnectionDescriptor::parse_validated(&descriptor)?;
        let variant = lookup(BACKEND_VAR)
            .map(|value| value.parse::<BackendVariant>())
            .transpose()?
            .unwrap_or(BackendVariant::TokenAuthenticated);
        let shape = lookup(SCHEMA_VAR)
            .map(|value| parse_shape(&value))
            .transpose()?
            .unwrap_or_else(|| variant.default_shape());

        let mut identity = DeviceCodeSettings::default();
        if let Some(tenant) = lookup(TENANT_VAR) {
            identity.tenant = tenant;
        }
        if let Some(client_id) = lookup(CLIENT_ID_VAR) {
            identity.client_id = client_id;
        }

        Ok(Self {
            descriptor,
            variant,
            shape,
            token_cache_path: lookup(TOKEN_CACHE_VAR)
                .map(PathBuf::from)
                .unwrap_or_else(|| token_cache_path_from_home(lookup("HOME"))),
            identity,
            driver_search_path: driver_search_path.map(PathBuf::from),
        })
    }

    /// Device-code credential cache persisted at `token_cache_path`.
    pub fn credential_cache(&self) -> CredentialCache {
        let provider = DeviceCodeProvider::new(
            Arc::new(ReqwestHttpClient::new()),
            self.identity.clone(),
        );
        CredentialCache::new(Arc::new(provider))
            .with_token_file(TokenFile::new(&self.token_cache_path))
    }
}

fn parse_shape(value: &str) -> Result<RowShape, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "a" | "precomputed" => Ok(RowShape::PrecomputedChange),
        "b" | "ohlcv" => Ok(RowShape::Ohlcv),
        _ => Err(ConfigError::InvalidSetting {
            key: SCHEMA_VAR,
            value: value.to_owned(),
            expected: "a, b",
        }),
    }
}

fn read_override_file(path: &Path) -> Result<HashMap<String, String>, ConfigError> {
    if !path.exists() {
        return Ok(HashMap::new());
    }
    let iter = dotenvy::from_path_iter(path).map_err(|e| ConfigError::OverrideFile {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;

    iter.map(|item| {
        item.map_err(|e| ConfigError::OverrideFile {
            path: path.display().to_string(),
            message: e.to_string(),
        })
    })
    .collect()
}

fn default_token_cache_path() -> PathBuf {
    token_cache_path_from_home(env::var("HOME").ok())
}

fn token_cache_path_from_home(home: Option<String>) -> PathBuf {
    match home.filter(|home| !home.is_empty()) {
        Some(home) => PathBuf::from(home).join(TOKEN_FILE_NAME),
        None => PathBuf::from(TOKEN_FILE_NAME),
    }
}
