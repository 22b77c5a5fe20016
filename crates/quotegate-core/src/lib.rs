//! Core contracts for quotegate.
//!
//! This crate contains:
//! - Canonical price record and input validation
//! - Error taxonomy shared by every surface
//! - Connection descriptor parsing and environment configuration
//! - Bearer credential lifecycle (cache, durable token file, device-code sign-in)
//! - Session providers per backend variant and the row-shape mapper
//! - The fetch facade the HTTP gateway binds to

pub mod config;
pub mod credential;
pub mod descriptor;
pub mod domain;
pub mod error;
pub mod facade;
pub mod http_client;
pub mod schema;
pub mod session;

pub use config::{BackendVariant, GatewayConfig};
pub use credential::{
    AccessToken, Clock, Credential, CredentialCache, DeviceCodeProvider, DeviceCodeSettings,
    IdentityProvider, SystemClock, TokenFile, SAFETY_MARGIN,
};
pub use descriptor::ConnectionDescriptor;
pub use domain::{
    round2, HistoryQuery, HistoryWindow, Market, PriceRecord, Symbol, DEFAULT_HISTORY_DAYS,
    MAX_HISTORY_DAYS, MIN_HISTORY_DAYS,
};
pub use error::{
    ConfigError, CredentialError, DescriptorError, GatewayError, StoreError, ValidationError,
};
pub use facade::{FetchFacade, HealthReport};
pub use http_client::{FormRequest, HttpClient, HttpError, HttpResponse, ReqwestHttpClient};
pub use schema::RowShape;
pub use session::{
    ConnectAttribute, ConnectRequest, ConnectTarget, DiscreteFields, RawRow, Session,
    SessionProvider, SqlValue, StoreDriver, StoreQuery,
};
