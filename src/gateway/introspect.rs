//! Remote introspection of opaque tokens against the identity provider.
//!
//! A provider that says `active=false` (or omits the subject) is a caller
//! problem and maps to a 401-class rejection. A provider that is
//! unreachable or answers with garbage is an infrastructure fault and maps
//! to a 500-class failure. The two are never conflated.

use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error};

use super::{
    expiry,
    principal::{Principal, TokenClaims, UserLookup},
};
use crate::APP_USER_AGENT;

/// Fixed hint sent with every introspection request.
const TOKEN_TYPE_HINT: &str = "access_token";

/// Outbound timeout. The reference behavior leaves this undefined; a
/// bounded conservative default is used instead of none.
pub const INTROSPECTION_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum IntrospectionError {
    /// The caller's token is invalid. Client-facing 401 class.
    #[error("invalid opaque token: {0}")]
    BadToken(&'static str),
    /// The provider could not be reached or answered malformed data.
    /// Infrastructure 500 class.
    #[error("token introspection failed: {0}")]
    Provider(String),
}

/// Provider response for `POST <introspection-uri>`.
#[derive(Clone, Debug, Deserialize)]
pub struct IntrospectionResponse {
    pub active: bool,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub client_type: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub exp: Option<i64>,
    #[serde(default)]
    pub sub: Option<String>,
    #[serde(default)]
    pub aud: Option<serde_json::Value>,
    #[serde(default)]
    pub group_type: Option<String>,
}

/// Validates opaque tokens by asking the issuing identity provider.
pub struct OpaqueTokenIntrospector {
    client: Client,
    introspection_uri: String,
    client_id: String,
    client_secret: SecretString,
    default_token_expires_in: Duration,
    minimum_token_validity: Option<Duration>,
    user_lookup: Arc<dyn UserLookup>,
}

impl OpaqueTokenIntrospector {
    /// Build the introspector and its HTTP client.
    ///
    /// # Errors
    /// Returns an error when the HTTP client cannot be constructed.
    pub fn new(
        introspection_uri: String,
        client_id: String,
        client_secret: SecretString,
        default_token_expires_in: Duration,
        minimum_token_validity: Option<Duration>,
        user_lookup: Arc<dyn UserLookup>,
    ) -> anyhow::Result<Self> {
        let client = Client::builder()
            .user_agent(APP_USER_AGENT)
            .timeout(INTROSPECTION_TIMEOUT)
            .build()?;
        Ok(Self {
            client,
            introspection_uri,
            client_id,
            client_secret,
            default_token_expires_in,
            minimum_token_validity,
            user_lookup,
        })
    }

    /// Introspect an opaque token and establish the caller's principal.
    ///
    /// # Errors
    /// [`IntrospectionError::BadToken`] for blank, inactive, expired, or
    /// subject-less tokens; [`IntrospectionError::Provider`] for transport
    /// failures and malformed responses.
    pub async fn introspect(&self, token: &str) -> Result<Principal, IntrospectionError> {
        if token.trim().is_empty() {
            return Err(IntrospectionError::BadToken("token is empty"));
        }

        let response = self
            .client
            .post(&self.introspection_uri)
            .basic_auth(&self.client_id, Some(self.client_secret.expose_secret()))
            .form(&[("token", token), ("token_type_hint", TOKEN_TYPE_HINT)])
            .send()
            .await
            .map_err(|err| {
                error!("introspection request failed: {err}");
                IntrospectionError::Provider(err.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            error!("introspection endpoint answered {status}");
            return Err(IntrospectionError::Provider(format!(
                "introspection endpoint answered {status}"
            )));
        }

        let introspection: IntrospectionResponse = response.json().await.map_err(|err| {
            error!("could not decode introspection response: {err}");
            IntrospectionError::Provider("malformed introspection response".to_string())
        })?;

        self.map_response(introspection, expiry::epoch_seconds_now())
    }

    /// Map a provider response into a principal. Pure except for the
    /// user-lookup collaborator.
    fn map_response(
        &self,
        response: IntrospectionResponse,
        now: i64,
    ) -> Result<Principal, IntrospectionError> {
        let expires_at = expiry::compute_access_window(
            now,
            self.default_token_expires_in,
            response.exp,
            self.minimum_token_validity,
        );

        if expiry::is_expired(Some(expires_at), now) {
            return Err(IntrospectionError::BadToken("token is expired"));
        }

        if !response.active {
            return Err(IntrospectionError::BadToken("token is not active"));
        }

        let subject = match response.sub.as_deref() {
            Some(subject) if !subject.is_empty() => subject,
            _ => return Err(IntrospectionError::BadToken("subject is missing")),
        };

        let Some(account) = self.user_lookup.lookup(subject) else {
            debug!("introspection subject has no account");
            return Err(IntrospectionError::BadToken("unknown subject"));
        };

        Ok(Principal {
            subject: subject.to_string(),
            username: account.username,
            authorities: account.authorities,
            claims: TokenClaims {
                scope: response.scope,
                client_id: response.client_id,
                username: response.username,
                token_type: response.token_type,
                issued_at: now,
                expires_at,
                audience: response.aud.map(|aud| match aud.as_str() {
                    Some(text) => text.to_string(),
                    None => aud.to_string(),
                }),
            },
        })
    }
}

impl std::fmt::Debug for OpaqueTokenIntrospector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpaqueTokenIntrospector")
            .field("introspection_uri", &self.introspection_uri)
            .field("client_id", &self.client_id)
            .finish_non_exhaustive()
    }
}
