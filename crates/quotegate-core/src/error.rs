use thiserror::Error;

/// Input validation errors raised before any query reaches the store.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("symbol cannot be empty")]
    EmptySymbol,
    #[error("symbol length {len} exceeds max {max}")]
    SymbolTooLong { len: usize, max: usize },
    #[error("symbol must start with an ASCII letter: '{ch}'")]
    SymbolInvalidStart { ch: char },
    #[error("symbol contains invalid character '{ch}' at index {index}")]
    SymbolInvalidChar { ch: char, index: usize },

    #[error("symbols array is required")]
    EmptySymbolList,

    #[error("days must be between {min} and {max}, got {value}")]
    DaysOutOfRange { value: i64, min: u16, max: u16 },
    #[error("date must be formatted YYYY-MM-DD: '{value}'")]
    InvalidDate { value: String },
    #[error("start date {start} is after end date {end}")]
    InvertedRange { start: String, end: String },
    #[error("date range spans {days} days, max {max}")]
    RangeTooWide { days: i64, max: u16 },

    #[error("Invalid market. Must be one of: {valid}")]
    InvalidMarket { value: String, valid: String },

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

/// Connection descriptor problems detectable without touching the network.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DescriptorError {
    #[error("connection descriptor is empty")]
    Empty,
    #[error("connection descriptor is missing mandatory key '{key}'")]
    MissingKey { key: &'static str },
    #[error("connection descriptor key '{key}' has invalid value '{value}'")]
    InvalidValue { key: String, value: String },
}

/// Configuration loading errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("DC_DB_STRING not found in environment or {override_file}")]
    MissingDescriptor { override_file: String },

    #[error("invalid value '{value}' for {key}, expected one of {expected}")]
    InvalidSetting {
        key: &'static str,
        value: String,
        expected: &'static str,
    },

    #[error(transparent)]
    Descriptor(#[from] DescriptorError),

    #[error("failed to read override file {path}: {message}")]
    OverrideFile { path: String, message: String },
}

/// Credential acquisition and persistence failures.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CredentialError {
    #[error("identity provider request failed: {0}")]
    Transport(String),

    #[error("identity provider rejected the request: {code}: {description}")]
    Provider { code: String, description: String },

    #[error("interactive sign-in was declined")]
    Declined,

    #[error("device code expired before sign-in completed")]
    ConsentExpired,

    #[error("identity provider response could not be parsed: {0}")]
    MalformedResponse(String),

    #[error("refreshed credential expires at {expires_at}, inside the safety margin")]
    ShortLived { expires_at: String },
}

/// Failures surfaced by a store driver or an open session.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("failed to open session: {0}")]
    Connect(String),

    #[error("query failed: {0}")]
    Query(String),

    #[error("query timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    #[error("unsupported connect target: {0}")]
    UnsupportedTarget(String),
}

/// Failure taxonomy exposed by the fetch facade.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GatewayError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("{message}")]
    NotFound { message: String },

    #[error("{message}")]
    Upstream { message: String, detail: String },

    #[error("{operation} is not implemented by the {variant} backend")]
    Unsupported {
        operation: &'static str,
        variant: &'static str,
    },
}

impl GatewayError {
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
        }
    }

    pub fn upstream(message: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::Upstream {
            message: message.into(),
            detail: detail.into(),
        }
    }

    pub const fn status_code(&self) -> u16 {
        match self {
            Self::Validation(_) => 400,
            Self::NotFound { .. } => 404,
            Self::Upstream { .. } => 500,
            Self::Unsupported { .. } => 501,
        }
    }

    pub const fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "gateway.validation",
            Self::NotFound { .. } => "gateway.not_found",
            Self::Upstream { .. } => "gateway.upstream",
            Self::Unsupported { .. } => "gateway.unsupported",
        }
    }

    /// Raw diagnostic text forwarded to callers alongside the message.
    pub fn detail(&self) -> Option<&str> {
        match self {
            Self::Upstream { detail, .. } => Some(detail.as_str()),
            _ => None,
        }
    }
}

impl From<StoreError> for GatewayError {
    fn from(error: StoreError) -> Self {
        let message = match &error {
            StoreError::Connect(_) | StoreError::UnsupportedTarget(_) => "database connection failed",
            StoreError::Query(_) => "database query failed",
            StoreError::Timeout { .. } => "database query timed out",
        };
        Self::upstream(message, error.to_string())
    }
}

impl From<CredentialError> for GatewayError {
    fn from(error: CredentialError) -> Self {
        Self::upstream("credential acquisition failed", error.to_string())
    }
}

impl From<DescriptorError> for GatewayError {
    fn from(error: DescriptorError) -> Self {
        Self::upstream("connection descriptor is invalid", error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_map_to_http_status() {
        assert_eq!(GatewayError::from(ValidationError::EmptySymbol).status_code(), 400);
        assert_eq!(GatewayError::not_found("none").status_code(), 404);
        assert_eq!(GatewayError::upstream("boom", "raw").status_code(), 500);
        let unsupported = GatewayError::Unsupported {
            operation: "market snapshot",
            variant: "direct",
        };
        assert_eq!(unsupported.status_code(), 501);
        assert_eq!(unsupported.code(), "gateway.unsupported");
    }

    #[test]
    fn store_errors_keep_raw_detail() {
        let error = GatewayError::from(StoreError::Query(String::from("Invalid object name")));
        assert_eq!(error.to_string(), "database query failed");
        assert_eq!(error.detail(), Some("query failed: Invalid object name"));
    }
}
