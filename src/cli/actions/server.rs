use crate::cli::actions::Action;
use crate::gateway::{
    self,
    crypto::{CipherKey, SymmetricCipherBox, TokenCodec},
    handlers,
    introspect::OpaqueTokenIntrospector,
    jwt::JwtValidator,
    principal::{StaticUserLookup, UserLookup},
    state::{GatewayConfig, GatewayState, ResourceServerMode, TokenValidator},
};
use anyhow::Result;
use axum::{routing::get, Router};
use secrecy::ExposeSecret;
use std::sync::Arc;

/// Handle the server action
pub async fn handle(action: Action) -> Result<()> {
    match action {
        Action::Server {
            port,
            management_port,
            secret_key,
            resource_server,
            login,
            users,
        } => {
            let mut config = GatewayConfig::new(port, resource_server, login);
            if let Some(management_port) = management_port {
                config = config.with_management_port(management_port);
            }
            config.validate()?;

            let key = CipherKey::from_secret(secret_key.expose_secret())?;
            let codec = TokenCodec::new(SymmetricCipherBox::new(key));

            let user_lookup: Arc<dyn UserLookup> = Arc::new(StaticUserLookup::from_entries(
                users.iter().map(String::as_str),
            )?);

            let validator = match config.resource_server() {
                ResourceServerMode::Jwt { jwk_set_uri } => TokenValidator::Jwt(
                    JwtValidator::new(jwk_set_uri.clone(), user_lookup.clone())?,
                ),
                ResourceServerMode::OpaqueToken {
                    introspection_uri,
                    client_id,
                    client_secret,
                    default_token_expires_in,
                    minimum_token_validity,
                    ..
                } => TokenValidator::Opaque(OpaqueTokenIntrospector::new(
                    introspection_uri.clone(),
                    client_id.clone(),
                    client_secret.clone(),
                    *default_token_expires_in,
                    *minimum_token_validity,
                    user_lookup.clone(),
                )?),
            };

            let state = Arc::new(GatewayState::new(config, codec, validator, user_lookup));

            let downstream = Router::new().route("/whoami", get(handlers::whoami));

            gateway::new(state, downstream).await?;
        }
    }

    Ok(())
}
