//! In-flight OAuth2 authorization requests, stored in an encrypted cookie.
//!
//! Nothing is kept in server memory between the redirect to the identity
//! provider and its callback: the whole record travels in a short-lived
//! encrypted cookie and is read back (and deleted) exactly once.

use axum::http::{header::SET_COOKIE, HeaderMap};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;
use tracing::trace;

use super::{cookies, crypto::TokenCodec};

/// Cookie TTL for the in-flight request. If the round trip to the identity
/// provider takes longer, the flow is lost and must restart.
pub const FLOW_COOKIE_TTL_SECONDS: i64 = 60;

/// Enum-like field serialized as a `{"value": ...}` wrapper object. The
/// wrapper shape is part of the wire contract and must survive round trips
/// unchanged.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseType {
    pub value: String,
}

impl ResponseType {
    #[must_use]
    pub fn code() -> Self {
        Self {
            value: "code".to_string(),
        }
    }
}

/// See [`ResponseType`]; same wrapper contract.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrantType {
    pub value: String,
}

impl GrantType {
    #[must_use]
    pub fn authorization_code() -> Self {
        Self {
            value: "authorization_code".to_string(),
        }
    }
}

/// One in-flight authorization request, created when a login flow starts
/// and consumed when the provider redirects back.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorizationFlowRecord {
    pub authorization_uri: String,
    pub response_type: ResponseType,
    pub client_id: String,
    pub redirect_uri: String,
    pub scopes: BTreeSet<String>,
    pub state: String,
    pub additional_parameters: BTreeMap<String, String>,
    pub authorization_request_uri: String,
    pub attributes: BTreeMap<String, String>,
    pub grant_type: GrantType,
}

/// A corrupted flow cookie means tampering or truncation, so load/remove
/// failures surface as service errors rather than an empty result.
#[derive(Debug, Error)]
pub enum FlowStoreError {
    #[error("could not serialize authorization request")]
    Serialize,
    #[error("could not encrypt authorization request")]
    Encrypt,
    #[error("could not deserialize authorization request")]
    Deserialize,
    #[error("could not decrypt authorization request cookie")]
    Decrypt,
    #[error("could not build authorization request cookie")]
    Cookie,
}

/// Stateless store for [`AuthorizationFlowRecord`]s backed by an encrypted
/// cookie instead of session memory.
#[derive(Debug)]
pub struct AuthorizationFlowStore<'a> {
    codec: &'a TokenCodec,
}

impl<'a> AuthorizationFlowStore<'a> {
    #[must_use]
    pub fn new(codec: &'a TokenCodec) -> Self {
        Self { codec }
    }

    /// Serialize, encrypt, and write the flow as a short-lived cookie on
    /// `response_headers`.
    ///
    /// # Errors
    /// Returns a [`FlowStoreError`] when serialization or encryption fails.
    pub fn save(
        &self,
        flow: &AuthorizationFlowRecord,
        response_headers: &mut HeaderMap,
    ) -> Result<(), FlowStoreError> {
        let serialized = serde_json::to_string(flow).map_err(|_| FlowStoreError::Serialize)?;
        let sealed = self
            .codec
            .seal(&serialized)
            .map_err(|_| FlowStoreError::Encrypt)?;
        let cookie = cookies::build(
            cookies::AUTHORIZATION_REQUEST_COOKIE,
            &sealed,
            FLOW_COOKIE_TTL_SECONDS,
        )
        .map_err(|_| FlowStoreError::Cookie)?;
        trace!(
            cookie = cookies::AUTHORIZATION_REQUEST_COOKIE,
            "saving authorization request cookie"
        );
        response_headers.append(SET_COOKIE, cookie);
        Ok(())
    }

    /// Read the flow back from the request cookie.
    ///
    /// Returns `Ok(None)` when no cookie is present; a present but
    /// undecryptable or undeserializable cookie is an error.
    ///
    /// # Errors
    /// Returns a [`FlowStoreError`] when the cookie is corrupted.
    pub fn load(
        &self,
        request_headers: &HeaderMap,
    ) -> Result<Option<AuthorizationFlowRecord>, FlowStoreError> {
        let Some(value) = cookies::get(request_headers, cookies::AUTHORIZATION_REQUEST_COOKIE)
        else {
            trace!("no authorization request cookie found");
            return Ok(None);
        };
        let serialized = self
            .codec
            .open(&value)
            .map_err(|_| FlowStoreError::Decrypt)?;
        let flow = serde_json::from_str(&serialized).map_err(|_| FlowStoreError::Deserialize)?;
        Ok(Some(flow))
    }

    /// Load the flow and clear its cookie on the response.
    ///
    /// # Errors
    /// Returns a [`FlowStoreError`] when the cookie is corrupted.
    pub fn remove(
        &self,
        request_headers: &HeaderMap,
        response_headers: &mut HeaderMap,
    ) -> Result<Option<AuthorizationFlowRecord>, FlowStoreError> {
        let flow = self.load(request_headers)?;
        if flow.is_some() {
            let cookie = cookies::clear(cookies::AUTHORIZATION_REQUEST_COOKIE)
                .map_err(|_| FlowStoreError::Cookie)?;
            response_headers.append(SET_COOKIE, cookie);
        }
        Ok(flow)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::crypto::{CipherKey, SymmetricCipherBox};
    use axum::http::header::COOKIE;
    use axum::http::HeaderValue;

    fn codec() -> TokenCodec {
        let key = CipherKey::from_secret("0123456789abcdef0123456789abcdef").expect("valid key");
        TokenCodec::new(SymmetricCipherBox::new(key))
    }

    fn sample_flow() -> AuthorizationFlowRecord {
        AuthorizationFlowRecord {
            authorization_uri: "https://idp.example/oauth2/authorize".to_string(),
            response_type: ResponseType::code(),
            client_id: "gateway".to_string(),
            redirect_uri: "https://gateway.example/login/oauth2/code".to_string(),
            scopes: BTreeSet::from(["openid".to_string()]),
            state: "opaque-state".to_string(),
            additional_parameters: BTreeMap::from([(
                "prompt".to_string(),
                "consent".to_string(),
            )]),
            authorization_request_uri: "https://idp.example/oauth2/authorize?client_id=gateway"
                .to_string(),
            attributes: BTreeMap::new(),
            grant_type: GrantType::authorization_code(),
        }
    }

    fn request_headers_from(response_headers: &HeaderMap) -> HeaderMap {
        let set_cookie = response_headers
            .get(SET_COOKIE)
            .expect("set-cookie present")
            .to_str()
            .expect("ascii");
        let pair = set_cookie.split(';').next().expect("cookie pair");
        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, HeaderValue::from_str(pair).expect("cookie header"));
        headers
    }

    #[test]
    fn wrapper_fields_serialize_as_value_objects() {
        let serialized = serde_json::to_value(sample_flow()).expect("serialize");
        assert_eq!(serialized["responseType"]["value"], "code");
        assert_eq!(serialized["grantType"]["value"], "authorization_code");
        assert_eq!(serialized["authorizationUri"], sample_flow().authorization_uri);
    }

    #[test]
    fn save_load_remove_round_trip() {
        let codec = codec();
        let store = AuthorizationFlowStore::new(&codec);
        let flow = sample_flow();

        let mut response_headers = HeaderMap::new();
        store.save(&flow, &mut response_headers).expect("save");
        let set_cookie = response_headers
            .get(SET_COOKIE)
            .expect("set-cookie")
            .to_str()
            .expect("ascii");
        assert!(set_cookie.contains("Max-Age=60"));
        assert!(set_cookie.contains("HttpOnly"));

        let request_headers = request_headers_from(&response_headers);
        let loaded = store.load(&request_headers).expect("load");
        assert_eq!(loaded.as_ref(), Some(&flow));
        assert_eq!(
            loaded.expect("flow").grant_type.value,
            "authorization_code"
        );

        let mut removal_headers = HeaderMap::new();
        let removed = store
            .remove(&request_headers, &mut removal_headers)
            .expect("remove");
        assert_eq!(removed, Some(flow));
        let cleared = removal_headers
            .get(SET_COOKIE)
            .expect("clear cookie")
            .to_str()
            .expect("ascii");
        assert!(cleared.contains("Max-Age=0"));
    }

    #[test]
    fn load_without_cookie_is_empty() {
        let codec = codec();
        let store = AuthorizationFlowStore::new(&codec);
        assert!(store.load(&HeaderMap::new()).expect("load").is_none());
    }

    #[test]
    fn corrupted_cookie_is_an_error_not_empty() {
        let codec = codec();
        let store = AuthorizationFlowStore::new(&codec);
        let mut headers = HeaderMap::new();
        headers.insert(
            COOKIE,
            HeaderValue::from_static("CUSTODE_OAUTH2_AUTHORIZATION_REQUEST=dGFtcGVyZWQ="),
        );
        assert!(matches!(
            store.load(&headers),
            Err(FlowStoreError::Decrypt)
        ));
    }

    #[test]
    fn remove_without_cookie_clears_nothing() {
        let codec = codec();
        let store = AuthorizationFlowStore::new(&codec);
        let mut response_headers = HeaderMap::new();
        let removed = store
            .remove(&HeaderMap::new(), &mut response_headers)
            .expect("remove");
        assert!(removed.is_none());
        assert!(response_headers.get(SET_COOKIE).is_none());
    }
}
