use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tracing::warn;

use super::Credential;

#[derive(Debug, Serialize, Deserialize)]
struct TokenFileBody {
    token: String,
    #[serde(with = "expiry")]
    expires_at: OffsetDateTime,
    #[serde(default, with = "time::serde::rfc3339::option", skip_serializing_if = "Option::is_none")]
    issued_at: Option<OffsetDateTime>,
}

/// Written as RFC 3339. Read as any ISO 8601 date-time; a missing offset means UTC.
mod expiry {
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serializer};
    use time::format_description::well_known::Rfc3339;
    use time::macros::format_description;
    use time::{OffsetDateTime, PrimitiveDateTime};

    pub fn serialize<S>(value: &OffsetDateTime, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        time::serde::rfc3339::serialize(value, serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<OffsetDateTime, D::Error>
    where
        D: Deserializer<'de>,
    {
        let text = String::deserialize(deserializer)?;
        parse(&text).ok_or_else(|| D::Error::custom(format!("invalid expiry '{text}'")))
    }

    pub(super) fn parse(text: &str) -> Option<OffsetDateTime> {
        let text = text.trim();
        if let Ok(value) = OffsetDateTime::parse(text, &Rfc3339) {
            return Some(value);
        }
        let naive =
            format_description!("[year]-[month]-[day]T[hour]:[minute]:[second][optional [.[subsecond]]]");
        PrimitiveDateTime::parse(&text.replacen(' ', "T", 1), naive)
            .ok()
            .map(PrimitiveDateTime::assume_utc)
    }
}

/// Durable credential cache: `{"token": "...", "expires_at": "<RFC 3339>"}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenFile {
    path: PathBuf,
}

impl TokenFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Missing, unreadable, or corrupt files all read as a cache miss.
    pub fn load(&self) -> Option<Credential> {
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(error) if error.kind() == io::ErrorKind::NotFound => return None,
            Err(error) => {
                warn!(path = %self.path.display(), %error, "error reading token cache");
                return None;
            }
        };

        match serde_json::from_str::<TokenFileBody>(&text) {
            Ok(body) => Some(Credential::new(
                body.token,
                body.issued_at.unwrap_or(body.expires_at),
                body.expires_at,
            )),
            Err(error) => {
                warn!(path = %self.path.display(), %error, "ignoring corrupt token cache");
                None
            }
        }
    }

    /// Write to a sibling temp file, then rename over the target.
    pub fn save(&self, credential: &Credential) -> io::Result<()> {
        let body = TokenFileBody {
            token: credential.token().to_owned(),
            expires_at: credential.expires_at(),
            issued_at: Some(credential.issued_at()),
        };
        let json = serde_json::to_vec(&body).map_err(io::Error::other)?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let temp = self.temp_path();
        {
            let mut file = open_private(&temp)?;
            file.write_all(&json)?;
            file.sync_all()?;
        }
        fs::rename(&temp, &self.path)
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|name| name.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[cfg(unix)]
fn open_private(path: &Path) -> io::Result<fs::File> {
    use std::os::unix::fs::OpenOptionsExt;

    fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)
}

#[cfg(not(unix))]
fn open_private(path: &Path) -> io::Result<fs::File> {
    fs::File::create(path)
}
