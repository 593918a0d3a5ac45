//! # Custode (Stateless Authentication Gateway)
//!
//! `custode` decides, per inbound request, who the caller is, without any
//! server-side session storage. Three credential schemes coexist:
//!
//! - **Classic auth**: username/password carried in an encrypted cookie and
//!   bridged into a standard `Authorization: Basic` header.
//! - **OAuth2 bearer tokens**: presented in the `Authorization` header or in
//!   an encrypted cookie, with header precedence.
//! - **Resource-server validation**: either local verification of signed
//!   tokens against a JWK set, or remote introspection of opaque tokens.
//!   Exactly one of the two is selected at startup.
//!
//! In-flight OAuth2 authorization requests survive the redirect round trip
//! inside a short-lived encrypted cookie, so the gateway keeps zero state
//! between requests. Restarting the process with a new secret key
//! invalidates every previously issued cookie; there is no key rotation.

pub mod cli;
pub mod gateway;

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_app_user_agent_format() {
        assert!(APP_USER_AGENT.starts_with(env!("CARGO_PKG_NAME")));
        assert!(APP_USER_AGENT.contains(env!("CARGO_PKG_VERSION")));
    }
}
