use crate::cli::actions::Action;
use crate::gateway::state::{
    ClassicLoginConfig, LoginConfig, OAuth2LoginConfig, ResourceServerMode,
};
use anyhow::{Context, Result};
use secrecy::SecretString;
use std::time::Duration;

pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let required = |name: &str| -> Result<String> {
        matches
            .get_one(name)
            .map(|s: &String| s.to_string())
            .with_context(|| format!("missing required argument: --{name}"))
    };

    let resource_server = match required("mode")?.as_str() {
        "jwt" => ResourceServerMode::Jwt {
            jwk_set_uri: required("jwk-set-uri")?,
        },
        "opaque-token" => ResourceServerMode::OpaqueToken {
            introspection_uri: required("introspection-uri")?,
            client_id: required("client-id")?,
            client_secret: SecretString::from(required("client-secret")?),
            default_token_expires_in: Duration::from_secs(
                matches
                    .get_one::<u64>("default-token-expires-in")
                    .copied()
                    .unwrap_or(86400),
            ),
            max_cache_duration: Duration::from_secs(
                matches
                    .get_one::<u64>("max-cache-duration")
                    .copied()
                    .unwrap_or(86400),
            ),
            minimum_token_validity: matches
                .get_one::<u64>("minimum-token-validity")
                .copied()
                .map(Duration::from_secs),
        },
        other => anyhow::bail!("unsupported mode: {other}"),
    };

    let login = if matches.get_flag("login-enabled") {
        let mut login = LoginConfig::enabled(required("default-redirect-uri")?);

        if let Some(page) = matches.get_one::<String>("login-page") {
            login = login.with_login_page(page.to_string());
        }

        let modes: Vec<&str> = matches
            .get_many::<String>("login-modes")
            .map(|values| values.map(String::as_str).collect())
            .unwrap_or_default();

        if modes.contains(&"classic") {
            let mut classic = ClassicLoginConfig::new();
            if let Some(ttl) = matches.get_one::<i64>("classic-cookie-ttl") {
                classic = classic.with_cookie_ttl_seconds(*ttl);
            }
            if let Some(theme) = matches.get_one::<String>("login-theme") {
                classic = classic.with_theme(theme.to_string());
            }
            login = login.with_classic(classic);
        }

        if modes.contains(&"oauth2") {
            login = login.with_oauth2(OAuth2LoginConfig {
                provider: required("oauth2-provider")?,
                client_id: required("oauth2-client-id")?,
                client_secret: SecretString::from(required("oauth2-client-secret")?),
                authorization_uri: required("oauth2-authorization-uri")?,
                token_uri: required("oauth2-token-uri")?,
                redirect_uri: required("oauth2-redirect-uri")?,
                post_login_redirect_uri: required("oauth2-post-login-redirect-uri")?,
                scopes: matches
                    .get_many::<String>("oauth2-scopes")
                    .map(|values| values.map(ToString::to_string).collect())
                    .unwrap_or_default(),
            });
        }

        login
    } else {
        LoginConfig::disabled()
    };

    Ok(Action::Server {
        port: matches.get_one::<u16>("port").copied().unwrap_or(8080),
        management_port: matches.get_one::<u16>("management-port").copied(),
        secret_key: SecretString::from(required("secret-key")?),
        resource_server,
        login,
        users: matches
            .get_many::<String>("users")
            .map(|values| values.map(ToString::to_string).collect())
            .unwrap_or_default(),
    })
}
