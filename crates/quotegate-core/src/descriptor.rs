//! Semicolon-delimited connection descriptor (`SERVER=...;DATABASE=...;`).

use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};
use std::time::Duration;

use crate::DescriptorError;

const DEFAULT_PORT: u16 = 1433;
const DEFAULT_TIMEOUT_SECS: u64 = 30;
const TIMEOUT_KEYS: [&str; 3] = ["connection timeout", "connect timeout", "timeout"];

/// Parsed connection descriptor.
///
/// The original string is kept verbatim for variants that hand it straight to a driver.
/// Keys are matched case-insensitively.
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectionDescriptor {
    raw: String,
    pairs: BTreeMap<String, String>,
}

impl ConnectionDescriptor {
    /// Split `key=value` pairs; never fails on missing keys, use [`Self::validate`] for that.
    pub fn parse(input: &str) -> Result<Self, DescriptorError> {
        let raw = input.trim();
        if raw.is_empty() {
            return Err(DescriptorError::Empty);
        }

        let mut pairs = BTreeMap::new();
        for segment in raw.split(';') {
            let Some((key, value)) = segment.split_once('=') else {
                continue;
            };
            let key = key.trim().to_ascii_lowercase();
            if key.is_empty() {
                continue;
            }
            pairs.insert(key, strip_braces(value.trim()).to_owned());
        }

        Ok(Self {
            raw: raw.to_owned(),
            pairs,
        })
    }

    /// Parse and require `server` and `database`.
    pub fn parse_validated(input: &str) -> Result<Self, DescriptorError> {
        let descriptor = Self::parse(input)?;
        descriptor.validate()?;
        Ok(descriptor)
    }

    pub fn validate(&self) -> Result<(), DescriptorError> {
        for key in ["server", "database"] {
            if self.get(key).map_or(true, str::is_empty) {
                return Err(DescriptorError::MissingKey { key });
            }
        }
        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.pairs
            .get(&key.to_ascii_lowercase())
            .map(String::as_str)
    }

    pub fn as_connection_string(&self) -> &str {
        &self.raw
    }

    pub fn server(&self) -> Option<&str> {
        self.get("server")
    }

    /// Host part of `server`, without the `tcp:` prefix or `,port` suffix.
    pub fn host(&self) -> Option<&str> {
        let server = self.server()?;
        let server = server
            .strip_prefix("tcp:")
            .or_else(|| server.strip_prefix("TCP:"))
            .unwrap_or(server);
        Some(server.split(',').next().unwrap_or(server).trim())
    }

    pub fn port(&self) -> Result<u16, DescriptorError> {
        let Some(port) = self.server().and_then(|server| server.split_once(',')) else {
            return Ok(DEFAULT_PORT);
        };
        let value = port.1.trim();
        value
            .parse::<u16>()
            .map_err(|_| DescriptorError::InvalidValue {
                key: String::from("server"),
                value: value.to_owned(),
            })
    }

    pub fn database(&self) -> Option<&str> {
        self.get("database")
    }

    pub fn user(&self) -> Option<&str> {
        self.get("uid").or_else(|| self.get("user id"))
    }

    pub fn password(&self) -> Option<&str> {
        self.get("pwd").or_else(|| self.get("password"))
    }

    pub fn timeout(&self) -> Result<Duration, DescriptorError> {
        for key in TIMEOUT_KEYS {
            if let Some(value) = self.get(key) {
                let secs = value
                    .parse::<u64>()
                    .map_err(|_| DescriptorError::InvalidValue {
                        key: key.to_owned(),
                        value: value.to_owned(),
                    })?;
                return Ok(Duration::from_secs(secs));
            }
        }
        Ok(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
    }

    pub fn encrypt(&self) -> Result<bool, DescriptorError> {
        self.flag("encrypt", true)
    }

    pub fn trust_server_certificate(&self) -> Result<bool, DescriptorError> {
        self.flag("trustservercertificate", false)
    }

    /// Descriptor text with the password masked, for logs.
    pub fn redacted(&self) -> String {
        self.pairs
            .iter()
            .map(|(key, value)| {
                if key == "pwd" || key == "password" {
                    format!("{key}=***")
                } else {
                    format!("{key}={value}")
                }
            })
            .collect::<Vec<_>>()
            .join(";")
    }

    fn flag(&self, key: &str, default: bool) -> Result<bool, DescriptorError> {
        let Some(value) = self.get(key) else {
            return Ok(default);
        };
        match value.to_ascii_lowercase().as_str() {
            "yes" | "true" | "1" | "mandatory" => Ok(true),
            "no" | "false" | "0" | "optional" => Ok(false),
            _ => Err(DescriptorError::InvalidValue {
                key: key.to_owned(),
                value: value.to_owned(),
            }),
        }
    }
}

impl Display for ConnectionDescriptor {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.redacted())
    }
}

impl std::fmt::Debug for ConnectionDescriptor {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("ConnectionDescriptor")
            .field(&self.redacted())
            .finish()
    }
}

fn strip_braces(value: &str) -> &str {
    value
        .strip_prefix('{')
        .and_then(|inner| inner.strip_suffix('}'))
        .unwrap_or(value)
}
