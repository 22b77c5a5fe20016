use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use serde::{Deserialize, Deserializer};
use time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::{AccessToken, Clock, IdentityProvider, SystemClock};
use crate::http_client::{FormRequest, HttpClient, HttpResponse};
use crate::CredentialError;

/// Scope required for bearer-token SQL authentication.
pub const AZURE_SQL_SCOPE: &str = "https://database.windows.net/.default";

const DEFAULT_AUTHORITY: &str = "https://login.microsoftonline.com";
const DEFAULT_TENANT: &str = "organizations";
// Public client registration of the Azure CLI.
const DEFAULT_CLIENT_ID: &str = "04b07795-8ddb-461a-bbee-02f9e1bf7b46";
const DEVICE_CODE_GRANT: &str = "urn:ietf:params:oauth:grant-type:device_code";
const SLOW_DOWN_STEP_SECS: u64 = 5;
const MIN_INTERVAL_SECS: u64 = 1;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceCodeSettings {
    pub authority: String,
    pub tenant: String,
    pub client_id: String,
    pub scope: String,
}

impl Default for DeviceCodeSettings {
    fn default() -> Self {
        Self {
            authority: String::from(DEFAULT_AUTHORITY),
            tenant: String::from(DEFAULT_TENANT),
            client_id: String::from(DEFAULT_CLIENT_ID),
            scope: String::from(AZURE_SQL_SCOPE),
        }
    }
}

impl DeviceCodeSettings {
    fn endpoint(&self, leaf: &str) -> String {
        format!(
            "{}/{}/oauth2/v2.0/{leaf}",
            self.authority.trim_end_matches('/'),
            self.tenant
        )
    }
}

/// What the user must do to complete sign-in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceCodePrompt {
    pub verification_uri: String,
    pub user_code: String,
    pub message: String,
}

type PromptSink = Arc<dyn Fn(&DeviceCodePrompt) + Send + Sync>;

#[derive(Debug, Deserialize)]
struct DeviceCodeResponse {
    device_code: String,
    user_code: String,
    verification_uri: String,
    #[serde(deserialize_with = "seconds")]
    expires_in: u64,
    #[serde(default = "default_interval", deserialize_with = "seconds")]
    interval: u64,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(deserialize_with = "seconds")]
    expires_in: u64,
}

#[derive(Debug, Deserialize)]
struct OAuthErrorBody {
    error: String,
    #[serde(default)]
    error_description: String,
}

const fn default_interval() -> u64 {
    5
}

// Some endpoints report durations as strings.
fn seconds<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Seconds {
        Number(u64),
        Text(String),
    }

    match Seconds::deserialize(deserializer)? {
        Seconds::Number(value) => Ok(value),
        Seconds::Text(value) => value.trim().parse().map_err(serde::de::Error::custom),
    }
}

/// OAuth 2.0 device authorization grant against the Microsoft identity platform.
///
/// The user completes consent out of band in a browser; this provider polls until the
/// grant succeeds, is declined, or the device code expires.
pub struct DeviceCodeProvider {
    http: Arc<dyn HttpClient>,
    settings: DeviceCodeSettings,
    clock: Arc<dyn Clock>,
    prompt: PromptSink,
}

impl DeviceCodeProvider {
    pub fn new(http: Arc<dyn HttpClient>, settings: DeviceCodeSettings) -> Self {
        Self {
            http,
            settings,
            clock: Arc::new(SystemClock),
            prompt: Arc::new(|prompt: &DeviceCodePrompt| eprintln!("{}", prompt.message)),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_prompt(mut self, prompt: impl Fn(&DeviceCodePrompt) + Send + Sync + 'static) -> Self {
        self.prompt = Arc::new(prompt);
        self
    }

    async fn request_device_code(&self) -> Result<DeviceCodeResponse, CredentialError> {
        let request = FormRequest::new(self.settings.endpoint("devicecode"))
            .with_field("client_id", &self.settings.client_id)
            .with_field("scope", &self.settings.scope);
        let response = self.send(request).await?;
        if !response.is_success() {
            return Err(provider_error(&response));
        }
        parse_body(&response)
    }

    async fn poll_token(&self, device: &DeviceCodeResponse) -> Result<AccessToken, CredentialError> {
        // None when `expires_in` is past what the clock can represent; polling then
        // ends only on a provider answer.
        let deadline = Instant::now().checked_add(StdDuration::from_secs(device.expires_in));
        let mut interval = device.interval.max(MIN_INTERVAL_SECS);

        loop {
            tokio::time::sleep(StdDuration::from_secs(interval)).await;
            if deadline.is_some_and(|deadline| Instant::now() > deadline) {
                return Err(CredentialError::ConsentExpired);
            }

            let request = FormRequest::new(self.settings.endpoint("token"))
                .with_field("grant_type", DEVICE_CODE_GRANT)
                .with_field("client_id", &self.settings.client_id)
                .with_field("device_code", &device.device_code);
            let response = self.send(request).await?;

            if response.is_success() {
                let token: TokenResponse = parse_body(&response)?;
                let lifetime = i64::try_from(token.expires_in).unwrap_or(i64::MAX);
                return Ok(AccessToken {
                    token: token.access_token,
                    expires_on: self.clock.now().saturating_add(Duration::seconds(lifetime)),
                });
            }

            let error: OAuthErrorBody = parse_body(&response)?;
            match error.error.as_str() {
                "authorization_pending" => debug!("waiting for device sign-in"),
                "slow_down" => {
                    interval = interval.saturating_add(SLOW_DOWN_STEP_SECS);
                    warn!(interval_secs = interval, "identity provider asked to slow down");
                }
                "authorization_declined" | "access_denied" => return Err(CredentialError::Declined),
                "expired_token" | "code_expired" => return Err(CredentialError::ConsentExpired),
                _ => {
                    return Err(CredentialError::Provider {
                        code: error.error,
                        description: error.error_description,
                    })
                }
            }
        }
    }

    async fn send(&self, request: FormRequest) -> Result<HttpResponse, CredentialError> {
        self.http
            .post_form(request)
            .await
            .map_err(|e| CredentialError::Transport(e.to_string()))
    }
}

impl IdentityProvider for DeviceCodeProvider {
    fn acquire<'a>(
        &'a self,
    ) -> Pin<Box<dyn Future<Output = Result<AccessToken, CredentialError>> + Send + 'a>> {
        Box::pin(async move {
            let device = self.request_device_code().await?;
            let prompt = DeviceCodePrompt {
                message: device.message.clone().unwrap_or_else(|| {
                    format!(
                        "To sign in, open {} and enter the code {}",
                        device.verification_uri, device.user_code
                    )
                }),
                verification_uri: device.verification_uri.clone(),
                user_code: device.user_code.clone(),
            };
            info!(verification_uri = %prompt.verification_uri, "interactive sign-in required");
            (self.prompt)(&prompt);

            self.poll_token(&device).await
        })
    }
}

fn parse_body<T: for<'de> Deserialize<'de>>(response: &HttpResponse) -> Result<T, CredentialError> {
    serde_json::from_str(&response.body).map_err(|e| CredentialError::MalformedResponse(e.to_string()))
}

fn provider_error(response: &HttpResponse) -> CredentialError {
    match serde_json::from_str::<OAuthErrorBody>(&response.body) {
        Ok(body) => CredentialError::Provider {
            code: body.error,
            description: body.error_description,
        },
        Err(_) => CredentialError::Provider {
            code: format!("http_{}", response.status),
            description: response.body.chars().take(200).collect(),
        },
    }
}
