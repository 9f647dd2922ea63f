use oauth2::basic::BasicClient;
use oauth2::reqwest::async_http_client;
use oauth2::{AuthUrl, ClientId, ClientSecret, TokenResponse, TokenUrl};
use std::fmt;
use tracing::{debug, error, info};
use tweetfeed_core::{ApiConfig, ConfigError, CoreError, TwitterApiError, ENV_BEARER_TOKEN};

// Required by the oauth2 client but never visited for app-only auth.
const AUTHORIZE_URL: &str = "https://twitter.com/i/oauth2/authorize";

/// App-only credentials: a ready bearer token, or a client id/secret pair
/// exchanged for one.
#[derive(Clone, PartialEq)]
pub enum Credentials {
    Bearer(String),
    ClientCredentials {
        client_id: String,
        client_secret: String,
        token_url: String,
    },
}

impl Credentials {
    /// A configured bearer token wins over a client id/secret pair.
    pub fn from_config(config: &ApiConfig) -> Result<Self, ConfigError> {
        if let Some(token) = config.bearer_token.as_ref().filter(|t| !t.trim().is_empty()) {
            return Ok(Credentials::Bearer(token.trim().to_string()));
        }

        match (&config.client_id, &config.client_secret) {
            (Some(client_id), Some(client_secret)) => Ok(Credentials::ClientCredentials {
                client_id: client_id.clone(),
                client_secret: client_secret.clone(),
                token_url: config.token_url.clone(),
            }),
            (Some(_), None) => Err(ConfigError::MissingField {
                field: "api.client_secret".to_string(),
            }),
            (None, Some(_)) => Err(ConfigError::MissingField {
                field: "api.client_id".to_string(),
            }),
            (None, None) => Err(ConfigError::MissingEnvironmentVariable {
                var_name: ENV_BEARER_TOKEN.to_string(),
            }),
        }
    }

    /// Returns the token to send as `Authorization: Bearer`, exchanging the
    /// client credentials first when needed.
    pub async fn bearer_token(&self) -> Result<String, CoreError> {
        match self {
            Credentials::Bearer(token) => {
                debug!("Using configured bearer token");
                Ok(token.clone())
            }
            Credentials::ClientCredentials {
                client_id,
                client_secret,
                token_url,
            } => {
                let client = BasicClient::new(
                    ClientId::new(client_id.clone()),
                    Some(ClientSecret::new(client_secret.clone())),
                    AuthUrl::new(AUTHORIZE_URL.to_string()).map_err(|e| {
                        auth_failed(format!("Invalid authorize URL: {}", e))
                    })?,
                    Some(TokenUrl::new(token_url.clone()).map_err(|e| {
                        auth_failed(format!("Invalid token URL {}: {}", token_url, e))
                    })?),
                );

                info!("Exchanging client credentials for a bearer token");
                let token = client
                    .exchange_client_credentials()
                    .request_async(async_http_client)
                    .await
                    .map_err(|e| {
                        error!("Client credentials exchange failed: {}", e);
                        auth_failed(format!("Token exchange failed: {}", e))
                    })?;

                Ok(token.access_token().secret().clone())
            }
        }
    }
}

// Keeps secrets out of logs.
impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credentials::Bearer(_) => f.write_str("Credentials::Bearer(<redacted>)"),
            Credentials::ClientCredentials {
                client_id,
                token_url,
                ..
            } => f
                .debug_struct("Credentials::ClientCredentials")
                .field("client_id", client_id)
                .field("client_secret", &"<redacted>")
                .field("token_url", token_url)
                .finish(),
        }
    }
}

fn auth_failed(reason: String) -> CoreError {
    CoreError::TwitterApi(TwitterApiError::AuthenticationFailed { reason })
}
