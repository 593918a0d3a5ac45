//! Local validation of signed tokens against a remote JWK set.
//!
//! The JWT resource-server mode: signatures are checked in-process, so no
//! per-request round trip to the identity provider is needed. The JWK set
//! is fetched from the configured URI and cached for a short window.

use jsonwebtoken::{
    decode, decode_header,
    jwk::{AlgorithmParameters, Jwk, JwkSet, KeyAlgorithm},
    Algorithm, DecodingKey, Validation,
};
use reqwest::Client;
use serde::Deserialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, error};

use super::principal::{Principal, TokenClaims, UserLookup};
use crate::APP_USER_AGENT;

/// How long a fetched JWK set stays fresh.
const JWKS_CACHE_TTL: Duration = Duration::from_secs(300);

/// Clock skew tolerance for issuance/expiry checks.
const CLOCK_SKEW_LEEWAY: u64 = 60;

#[derive(Debug, Error)]
pub enum JwtError {
    /// The caller's token failed validation. Client-facing 401 class.
    #[error("invalid signed token")]
    BadToken,
    /// The JWK set could not be fetched or contained no usable key.
    /// Infrastructure 500 class.
    #[error("JWK set unavailable: {0}")]
    Provider(String),
}

#[derive(Debug, Deserialize)]
struct SignedTokenClaims {
    sub: String,
    exp: i64,
    #[serde(default)]
    iat: Option<i64>,
    #[serde(default)]
    scope: Option<String>,
    #[serde(default)]
    client_id: Option<String>,
    #[serde(default)]
    aud: Option<serde_json::Value>,
}

struct CachedJwks {
    jwks: JwkSet,
    fetched_at: Instant,
}

/// Validates signed bearer tokens against the configured JWK set URI.
pub struct JwtValidator {
    jwk_set_uri: String,
    client: Client,
    cache: RwLock<Option<CachedJwks>>,
    user_lookup: Arc<dyn UserLookup>,
}

impl JwtValidator {
    /// Build the validator and its HTTP client.
    ///
    /// # Errors
    /// Returns an error when the HTTP client cannot be constructed.
    pub fn new(jwk_set_uri: String, user_lookup: Arc<dyn UserLookup>) -> anyhow::Result<Self> {
        let client = Client::builder()
            .user_agent(APP_USER_AGENT)
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            jwk_set_uri,
            client,
            cache: RwLock::new(None),
            user_lookup,
        })
    }

    /// Validate a signed token and establish the caller's principal.
    ///
    /// # Errors
    /// [`JwtError::BadToken`] for any token that fails signature or claim
    /// validation (including the missing-token sentinel);
    /// [`JwtError::Provider`] when the JWK set cannot be obtained.
    pub async fn validate(&self, token: &str) -> Result<Principal, JwtError> {
        let header = decode_header(token).map_err(|_| JwtError::BadToken)?;
        let jwks = self.jwks().await?;
        let jwk = select_key(&jwks, header.kid.as_deref())?;

        let (decoding_key, algorithm) = decoding_key_for(jwk)
            .ok_or_else(|| JwtError::Provider("unsupported key type in JWK set".to_string()))?;

        let mut validation = Validation::new(algorithm);
        validation.leeway = CLOCK_SKEW_LEEWAY;
        validation.validate_aud = false;

        let data = decode::<SignedTokenClaims>(token, &decoding_key, &validation).map_err(|err| {
            debug!("token validation failed: {err}");
            JwtError::BadToken
        })?;
        let claims = data.claims;

        if claims.sub.is_empty() {
            return Err(JwtError::BadToken);
        }
        let account = self.user_lookup.lookup(&claims.sub).ok_or(JwtError::BadToken)?;

        Ok(Principal {
            subject: claims.sub.clone(),
            username: account.username,
            authorities: account.authorities,
            claims: TokenClaims {
                scope: claims.scope,
                client_id: claims.client_id,
                username: Some(claims.sub),
                token_type: Some("Bearer".to_string()),
                issued_at: claims.iat.unwrap_or_else(super::expiry::epoch_seconds_now),
                expires_at: claims.exp,
                audience: claims.aud.map(|aud| match aud.as_str() {
                    Some(text) => text.to_string(),
                    None => aud.to_string(),
                }),
            },
        })
    }

    async fn jwks(&self) -> Result<JwkSet, JwtError> {
        {
            let cache = self.cache.read().await;
            if let Some(entry) = &*cache {
                if entry.fetched_at.elapsed() < JWKS_CACHE_TTL {
                    return Ok(entry.jwks.clone());
                }
            }
        }

        let jwks = self.fetch_jwks().await?;

        let mut cache = self.cache.write().await;
        *cache = Some(CachedJwks {
            jwks: jwks.clone(),
            fetched_at: Instant::now(),
        });
        Ok(jwks)
    }

    async fn fetch_jwks(&self) -> Result<JwkSet, JwtError> {
        let response = self
            .client
            .get(&self.jwk_set_uri)
            .send()
            .await
            .map_err(|err| {
                error!("JWK set fetch failed: {err}");
                JwtError::Provider(err.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            error!("JWK set endpoint answered {status}");
            return Err(JwtError::Provider(format!(
                "JWK set endpoint answered {status}"
            )));
        }

        response.json().await.map_err(|err| {
            error!("could not decode JWK set: {err}");
            JwtError::Provider("malformed JWK set".to_string())
        })
    }
}

impl std::fmt::Debug for JwtValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtValidator")
            .field("jwk_set_uri", &self.jwk_set_uri)
            .finish_non_exhaustive()
    }
}

/// Pick the key a token names. The `kid` is caller-controlled input, so a
/// token naming an unknown key is a bad token, not a provider fault; an
/// empty JWK set is the provider's problem.
fn select_key<'a>(jwks: &'a JwkSet, kid: Option<&str>) -> Result<&'a Jwk, JwtError> {
    match kid {
        Some(kid) => jwks
            .keys
            .iter()
            .find(|key| key.common.key_id.as_deref() == Some(kid))
            .ok_or(JwtError::BadToken),
        None => jwks
            .keys
            .first()
            .ok_or_else(|| JwtError::Provider("JWK set is empty".to_string())),
    }
}

fn decoding_key_for(jwk: &Jwk) -> Option<(DecodingKey, Algorithm)> {
    match &jwk.algorithm {
        AlgorithmParameters::RSA(rsa) => {
            let key = DecodingKey::from_rsa_components(&rsa.n, &rsa.e).ok()?;
            let algorithm = match jwk.common.key_algorithm {
                Some(KeyAlgorithm::RS384) => Algorithm::RS384,
                Some(KeyAlgorithm::RS512) => Algorithm::RS512,
                _ => Algorithm::RS256,
            };
            Some((key, algorithm))
        }
        AlgorithmParameters::EllipticCurve(ec) => {
            let key = DecodingKey::from_ec_components(&ec.x, &ec.y).ok()?;
            let algorithm = match jwk.common.key_algorithm {
                Some(KeyAlgorithm::ES384) => Algorithm::ES384,
                _ => Algorithm::ES256,
            };
            Some((key, algorithm))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::principal::StaticUserLookup;

    fn validator() -> JwtValidator {
        let users = StaticUserLookup::from_entries(["alice:pw:ROLE_USER"]).expect("users");
        JwtValidator::new(
            "https://idp.example/.well-known/jwks.json".to_string(),
            Arc::new(users),
        )
        .expect("validator")
    }

    #[tokio::test]
    async fn sentinel_token_is_rejected_without_jwks_fetch() {
        // "missing-token" is not even parseable as a JWT, so validation
        // fails before any network access.
        let err = validator()
            .validate("missing-token")
            .await
            .expect_err("must reject");
        assert!(matches!(err, JwtError::BadToken));
    }

    #[tokio::test]
    async fn garbage_token_is_rejected() {
        let err = validator()
            .validate("not.a.token")
            .await
            .expect_err("must reject");
        assert!(matches!(err, JwtError::BadToken));
    }

    #[test]
    fn unknown_kid_is_a_bad_token_not_a_provider_fault() {
        let jwks: JwkSet = serde_json::from_str(
            r#"{"keys": [{"kty": "RSA", "n": "0vx7agoebGcQSuuPiLJXZpt", "e": "AQAB", "kid": "good"}]}"#,
        )
        .expect("jwk set");

        assert!(select_key(&jwks, Some("good")).is_ok());
        assert!(matches!(
            select_key(&jwks, Some("evil")),
            Err(JwtError::BadToken)
        ));
        assert!(select_key(&jwks, None).is_ok());
    }

    #[test]
    fn empty_jwk_set_is_a_provider_fault() {
        let jwks: JwkSet = serde_json::from_str(r#"{"keys": []}"#).expect("jwk set");
        assert!(matches!(
            select_key(&jwks, None),
            Err(JwtError::Provider(_))
        ));
    }

    #[test]
    fn claims_parse_with_optional_fields_absent() {
        let parsed: SignedTokenClaims =
            serde_json::from_str(r#"{"sub": "alice", "exp": 1700000600}"#).expect("parse");
        assert_eq!(parsed.sub, "alice");
        assert!(parsed.scope.is_none());
        assert!(parsed.iat.is_none());
    }

    #[test]
    fn debug_output_names_only_the_uri() {
        let printed = format!("{:?}", validator());
        assert!(printed.contains("jwks.json"));
    }
}
