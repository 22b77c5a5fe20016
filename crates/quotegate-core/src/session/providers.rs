use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tracing::{debug, info};

use super::{
    encode_access_token, ConnectAttribute, ConnectRequest, ConnectTarget, DiscreteFields,
    Session, SessionProvider, StoreDriver, SQL_COPT_SS_ACCESS_TOKEN,
};
use crate::config::BackendVariant;
use crate::credential::CredentialCache;
use crate::{ConnectionDescriptor, DescriptorError, GatewayError};

type OpenFuture<'a> =
    Pin<Box<dyn Future<Output = Result<Box<dyn Session>, GatewayError>> + Send + 'a>>;

fn connect(
    driver: &dyn StoreDriver,
    variant: BackendVariant,
    request: ConnectRequest,
) -> Result<Box<dyn Session>, GatewayError> {
    debug!(driver = driver.name(), %variant, timeout_secs = request.timeout.as_secs(), "opening session");
    let session = driver.connect(&request)?;
    info!(driver = driver.name(), %variant, "session opened");
    Ok(session)
}

/// Attaches a bearer credential as a pre-connect attribute.
pub struct TokenSessionProvider {
    driver: Arc<dyn StoreDriver>,
    descriptor: ConnectionDescriptor,
    credentials: Arc<CredentialCache>,
}

impl TokenSessionProvider {
    pub fn new(
        driver: Arc<dyn StoreDriver>,
        descriptor: ConnectionDescriptor,
        credentials: Arc<CredentialCache>,
    ) -> Self {
        Self {
            driver,
            descriptor,
            credentials,
        }
    }
}

impl SessionProvider for TokenSessionProvider {
    fn variant(&self) -> BackendVariant {
        BackendVariant::TokenAuthenticated
    }

    fn open<'a>(&'a self) -> OpenFuture<'a> {
        Box::pin(async move {
            let timeout = self.descriptor.timeout()?;
            let credential = self.credentials.get().await?;
            let request = ConnectRequest {
                target: ConnectTarget::ConnectionString {
                    connection_string: self.descriptor.as_connection_string().to_owned(),
                    attributes: vec![ConnectAttribute {
                        key: SQL_COPT_SS_ACCESS_TOKEN,
                        value: encode_access_token(credential.token()),
                    }],
                },
                timeout,
            };
            connect(self.driver.as_ref(), self.variant(), request)
        })
    }
}

/// Hands the descriptor to the driver verbatim.
pub struct ConnectionStringSessionProvider {
    driver: Arc<dyn StoreDriver>,
    descriptor: ConnectionDescriptor,
}

impl ConnectionStringSessionProvider {
    pub fn new(driver: Arc<dyn StoreDriver>, descriptor: ConnectionDescriptor) -> Self {
        Self { driver, descriptor }
    }
}

impl SessionProvider for ConnectionStringSessionProvider {
    fn variant(&self) -> BackendVariant {
        BackendVariant::DirectConnectionString
    }

    fn open<'a>(&'a self) -> OpenFuture<'a> {
        Box::pin(async move {
            let request = ConnectRequest {
                target: ConnectTarget::ConnectionString {
                    connection_string: self.descriptor.as_connection_string().to_owned(),
                    attributes: Vec::new(),
                },
                timeout: self.descriptor.timeout()?,
            };
            connect(self.driver.as_ref(), self.variant(), request)
        })
    }
}

/// For drivers that take host, credentials, and database as separate arguments.
pub struct DiscreteFieldsSessionProvider {
    driver: Arc<dyn StoreDriver>,
    descriptor: ConnectionDescriptor,
}

impl DiscreteFieldsSessionProvider {
    pub fn new(driver: Arc<dyn StoreDriver>, descriptor: ConnectionDescriptor) -> Self {
        Self { driver, descriptor }
    }

    fn fields(&self) -> Result<DiscreteFields, DescriptorError> {
        self.descriptor.validate()?;
        let host = self
            .descriptor
            .host()
            .filter(|host| !host.is_empty())
            .ok_or(DescriptorError::MissingKey { key: "server" })?;
        let database = self
            .descriptor
            .database()
            .ok_or(DescriptorError::MissingKey { key: "database" })?;

        Ok(DiscreteFields {
            host: host.to_owned(),
            port: self.descriptor.port()?,
            user: self.descriptor.user().map(str::to_owned),
            password: self.descriptor.password().map(str::to_owned),
            database: database.to_owned(),
            encrypt: self.descriptor.encrypt()?,
            trust_server_certificate: self.descriptor.trust_server_certificate()?,
        })
    }
}

impl SessionProvider for DiscreteFieldsSessionProvider {
    fn variant(&self) -> BackendVariant {
        BackendVariant::UserPasswordDriver
    }

    fn open<'a>(&'a self) -> OpenFuture<'a> {
        Box::pin(async move {
            let request = ConnectRequest {
                target: ConnectTarget::Fields(self.fields()?),
                timeout: self.descriptor.timeout()?,
            };
            connect(self.driver.as_ref(), self.variant(), request)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credential::{AccessToken, Clock, IdentityProvider};
    use crate::session::{decode_access_token, RawRow, StoreQuery};
    use crate::{CredentialError, StoreError};
    use std::sync::Mutex;
    use std::time::Duration;
    use time::macros::datetime;
    use time::OffsetDateTime;

    #[derive(Default)]
    struct RecordingDriver {
        requests: Mutex<Vec<ConnectRequest>>,
    }

    struct NullSession;

    impl Session for NullSession {
        fn query(&mut self, _query: &StoreQuery) -> Result<Vec<RawRow>, StoreError> {
            Ok(Vec::new())
        }
    }

    impl StoreDriver for RecordingDriver {
        fn name(&self) -> &'static str {
            "recording"
        }

        fn connect(&self, request: &ConnectRequest) -> Result<Box<dyn Session>, StoreError> {
            self.requests.lock().expect("lock").push(request.clone());
            Ok(Box::new(NullSession))
        }
    }

    struct FixedClock;

    impl Clock for FixedClock {
        fn now(&self) -> OffsetDateTime {
            datetime!(2024-03-07 08:00 UTC)
        }
    }

    struct StaticProvider;

    impl IdentityProvider for StaticProvider {
        fn acquire<'a>(
            &'a self,
        ) -> Pin<Box<dyn Future<Output = Result<AccessToken, CredentialError>> + Send + 'a>> {
            Box::pin(async {
                Ok(AccessToken {
                    token: String::from("bearer-token"),
                    expires_on: datetime!(2024-03-07 09:00 UTC),
                })
            })
        }
    }

    const DESCRIPTOR: &str =
        "Driver={ODBC Driver 18 for SQL Server};Server=tcp:db.example,1444;Database=prices;Uid=reader;Pwd=s3cret;Connection Timeout=45";

    fn descriptor() -> ConnectionDescriptor {
        ConnectionDescriptor::parse_validated(DESCRIPTOR).expect("descriptor")
    }

    fn last_request(driver: &RecordingDriver) -> ConnectRequest {
        driver
            .requests
            .lock()
            .expect("lock")
            .last()
            .cloned()
            .expect("connect called")
    }

    #[tokio::test]
    async fn token_variant_attaches_encoded_credential() {
        let driver = Arc::new(RecordingDriver::default());
        let cache = Arc::new(
            CredentialCache::new(Arc::new(StaticProvider)).with_clock(Arc::new(FixedClock)),
        );
        let provider = TokenSessionProvider::new(driver.clone(), descriptor(), cache);

        provider.open().await.expect("open");

        let request = last_request(&driver);
        assert_eq!(request.timeout, Duration::from_secs(45));
        let ConnectTarget::ConnectionString { connection_string, attributes } = request.target
        else {
            panic!("expected connection string target");
        };
        assert_eq!(connection_string, DESCRIPTOR);
        assert_eq!(attributes.len(), 1);
        assert_eq!(attributes[0].key, SQL_COPT_SS_ACCESS_TOKEN);
        assert_eq!(
            decode_access_token(&attributes[0].value).as_deref(),
            Some("bearer-token")
        );
    }

    #[tokio::test]
    async fn direct_variant_passes_descriptor_verbatim() {
        let driver = Arc::new(RecordingDriver::default());
        ConnectionStringSessionProvider::new(driver.clone(), descriptor())
            .open()
            .await
            .expect("open");

        assert_eq!(
            last_request(&driver).target,
            ConnectTarget::ConnectionString {
                connection_string: String::from(DESCRIPTOR),
                attributes: Vec::new(),
            }
        );
    }

    #[tokio::test]
    async fn discrete_variant_splits_server_into_host_and_port() {
        let driver = Arc::new(RecordingDriver::default());
        DiscreteFieldsSessionProvider::new(driver.clone(), descriptor())
            .open()
            .await
            .expect("open");

        let ConnectTarget::Fields(fields) = last_request(&driver).target else {
            panic!("expected discrete fields");
        };
        assert_eq!(fields.host, "db.example");
        assert_eq!(fields.port, 1444);
        assert_eq!(fields.user.as_deref(), Some("reader"));
        assert_eq!(fields.password.as_deref(), Some("s3cret"));
        assert_eq!(fields.database, "prices");
        assert!(fields.encrypt);
        assert!(!fields.trust_server_certificate);
    }

    #[tokio::test]
    async fn discrete_variant_carries_tls_flags() {
        let driver = Arc::new(RecordingDriver::default());
        let descriptor = ConnectionDescriptor::parse_validated(
            "Server=db;Database=prices;Encrypt=no;TrustServerCertificate=yes",
        )
        .expect("descriptor");

        DiscreteFieldsSessionProvider::new(driver.clone(), descriptor)
            .open()
            .await
            .expect("open");

        let ConnectTarget::Fields(fields) = last_request(&driver).target else {
            panic!("expected discrete fields");
        };
        assert!(!fields.encrypt);
        assert!(fields.trust_server_certificate);
    }

    #[tokio::test]
    async fn malformed_tls_flag_never_reaches_the_driver() {
        let driver = Arc::new(RecordingDriver::default());
        let descriptor =
            ConnectionDescriptor::parse_validated("Server=db;Database=prices;Encrypt=sometimes")
                .expect("descriptor");

        let result = DiscreteFieldsSessionProvider::new(driver.clone(), descriptor)
            .open()
            .await;

        assert!(matches!(result, Err(GatewayError::Upstream { .. })));
        assert!(driver.requests.lock().expect("lock").is_empty());
    }

    #[tokio::test]
    async fn invalid_timeout_is_an_upstream_error() {
        let driver = Arc::new(RecordingDriver::default());
        let descriptor =
            ConnectionDescriptor::parse("Server=db;Database=prices;Timeout=soon").expect("parse");

        let err = match ConnectionStringSessionProvider::new(driver.clone(), descriptor)
            .open()
            .await
        {
            Ok(_) => panic!("timeout must be numeric"),
            Err(err) => err,
        };
        assert_eq!(err.status_code(), 500);
        assert!(driver.requests.lock().expect("lock").is_empty());
    }
}
