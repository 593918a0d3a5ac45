//! Gateway configuration and shared per-process state.

use secrecy::SecretString;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use super::{
    crypto::TokenCodec, introspect::OpaqueTokenIntrospector, jwt::JwtValidator,
    principal::UserLookup,
};

const DEFAULT_CLASSIC_COOKIE_TTL_SECONDS: i64 = 24 * 60 * 60;
const DEFAULT_LOGIN_PAGE: &str = "/login";
const DEFAULT_THEME: &str = "default";

/// Exactly one resource-server validation strategy is active per process.
#[derive(Clone, Debug)]
pub enum ResourceServerMode {
    /// Locally verified signed tokens, keys from a JWK set URI.
    Jwt { jwk_set_uri: String },
    /// Remote introspection of opaque tokens.
    OpaqueToken {
        introspection_uri: String,
        client_id: String,
        client_secret: SecretString,
        default_token_expires_in: Duration,
        /// Accepted and validated, but no introspection cache is built yet.
        max_cache_duration: Duration,
        minimum_token_validity: Option<Duration>,
    },
}

impl ResourceServerMode {
    /// Validate mode-specific required properties. Fatal at startup.
    ///
    /// # Errors
    /// Returns an error naming the missing property.
    pub fn validate(&self) -> anyhow::Result<()> {
        match self {
            Self::Jwt { jwk_set_uri } => {
                if jwk_set_uri.is_empty() {
                    anyhow::bail!("jwt mode requires a JWK set URI");
                }
            }
            Self::OpaqueToken {
                introspection_uri,
                client_id,
                max_cache_duration,
                ..
            } => {
                if introspection_uri.is_empty() {
                    anyhow::bail!("opaque-token mode requires an introspection URI");
                }
                if client_id.is_empty() {
                    anyhow::bail!("opaque-token mode requires a client id");
                }
                // No cache is implemented; surface the knob so operators
                // know it is read but inert.
                info!(
                    max_cache_duration_seconds = max_cache_duration.as_secs(),
                    "introspection caching is not active; max-cache-duration is recorded only"
                );
            }
        }
        Ok(())
    }
}

/// Classic (username/password) login sub-configuration.
#[derive(Clone, Debug)]
pub struct ClassicLoginConfig {
    cookie_ttl_seconds: i64,
    theme: String,
}

impl ClassicLoginConfig {
    #[must_use]
    pub fn new() -> Self {
        Self {
            cookie_ttl_seconds: DEFAULT_CLASSIC_COOKIE_TTL_SECONDS,
            theme: DEFAULT_THEME.to_string(),
        }
    }

    #[must_use]
    pub fn with_cookie_ttl_seconds(mut self, seconds: i64) -> Self {
        self.cookie_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_theme(mut self, theme: String) -> Self {
        self.theme = theme;
        self
    }

    #[must_use]
    pub fn cookie_ttl_seconds(&self) -> i64 {
        self.cookie_ttl_seconds
    }

    #[must_use]
    pub fn theme(&self) -> &str {
        &self.theme
    }
}

impl Default for ClassicLoginConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// OAuth2 login sub-configuration (authorization-code client).
#[derive(Clone, Debug)]
pub struct OAuth2LoginConfig {
    pub provider: String,
    pub client_id: String,
    pub client_secret: SecretString,
    pub authorization_uri: String,
    pub token_uri: String,
    pub redirect_uri: String,
    pub post_login_redirect_uri: String,
    pub scopes: Vec<String>,
}

/// Login feature configuration.
#[derive(Clone, Debug, Default)]
pub struct LoginConfig {
    enabled: bool,
    login_page: Option<String>,
    default_redirect_uri: Option<String>,
    classic: Option<ClassicLoginConfig>,
    oauth2: Option<OAuth2LoginConfig>,
}

impl LoginConfig {
    #[must_use]
    pub fn disabled() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn enabled(default_redirect_uri: String) -> Self {
        Self {
            enabled: true,
            login_page: Some(DEFAULT_LOGIN_PAGE.to_string()),
            default_redirect_uri: Some(default_redirect_uri),
            classic: None,
            oauth2: None,
        }
    }

    #[must_use]
    pub fn with_login_page(mut self, path: String) -> Self {
        self.login_page = Some(path);
        self
    }

    #[must_use]
    pub fn with_classic(mut self, classic: ClassicLoginConfig) -> Self {
        self.classic = Some(classic);
        self
    }

    #[must_use]
    pub fn with_oauth2(mut self, oauth2: OAuth2LoginConfig) -> Self {
        self.oauth2 = Some(oauth2);
        self
    }

    /// Validate the login feature. Fatal at startup.
    ///
    /// # Errors
    /// Returns an error when the feature is enabled without a mode or a
    /// redirect target.
    pub fn validate(&self) -> anyhow::Result<()> {
        if !self.enabled {
            return Ok(());
        }
        if self.classic.is_none() && self.oauth2.is_none() {
            anyhow::bail!("login is enabled but no login mode (classic, oauth2) is configured");
        }
        if self
            .default_redirect_uri
            .as_deref()
            .map_or(true, str::is_empty)
        {
            anyhow::bail!("login is enabled but no default redirect URI is configured");
        }
        Ok(())
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    #[must_use]
    pub fn login_page(&self) -> &str {
        self.login_page.as_deref().unwrap_or(DEFAULT_LOGIN_PAGE)
    }

    #[must_use]
    pub fn default_redirect_uri(&self) -> Option<&str> {
        self.default_redirect_uri.as_deref()
    }

    #[must_use]
    pub fn classic(&self) -> Option<&ClassicLoginConfig> {
        self.classic.as_ref()
    }

    #[must_use]
    pub fn oauth2(&self) -> Option<&OAuth2LoginConfig> {
        self.oauth2.as_ref()
    }
}

/// Full gateway configuration, assembled by the CLI layer.
#[derive(Clone, Debug)]
pub struct GatewayConfig {
    port: u16,
    management_port: Option<u16>,
    resource_server: ResourceServerMode,
    login: LoginConfig,
}

impl GatewayConfig {
    #[must_use]
    pub fn new(port: u16, resource_server: ResourceServerMode, login: LoginConfig) -> Self {
        Self {
            port,
            management_port: None,
            resource_server,
            login,
        }
    }

    /// Serve health on a separate listener. API traffic arriving on the
    /// management port is refused by the port guard.
    #[must_use]
    pub fn with_management_port(mut self, port: u16) -> Self {
        self.management_port = Some(port);
        self
    }

    /// Validate every feature block. Fatal at startup, never recovered.
    ///
    /// # Errors
    /// Returns the first configuration error found.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.management_port == Some(self.port) {
            anyhow::bail!("management port must differ from the service port");
        }
        self.resource_server.validate()?;
        self.login.validate()?;
        Ok(())
    }

    #[must_use]
    pub fn port(&self) -> u16 {
        self.port
    }

    #[must_use]
    pub fn management_port(&self) -> Option<u16> {
        self.management_port
    }

    #[must_use]
    pub fn resource_server(&self) -> &ResourceServerMode {
        &self.resource_server
    }

    #[must_use]
    pub fn login(&self) -> &LoginConfig {
        &self.login
    }
}

/// The active validation strategy, constructed once at startup.
#[derive(Debug)]
pub enum TokenValidator {
    Jwt(JwtValidator),
    Opaque(OpaqueTokenIntrospector),
}

/// Everything request handlers and middleware share, one instance per
/// process behind an `Arc`.
pub struct GatewayState {
    config: GatewayConfig,
    codec: TokenCodec,
    validator: TokenValidator,
    user_lookup: Arc<dyn UserLookup>,
}

impl GatewayState {
    #[must_use]
    pub fn new(
        config: GatewayConfig,
        codec: TokenCodec,
        validator: TokenValidator,
        user_lookup: Arc<dyn UserLookup>,
    ) -> Self {
        Self {
            config,
            codec,
            validator,
            user_lookup,
        }
    }

    #[must_use]
    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    #[must_use]
    pub fn codec(&self) -> &TokenCodec {
        &self.codec
    }

    #[must_use]
    pub fn validator(&self) -> &TokenValidator {
        &self.validator
    }

    #[must_use]
    pub fn user_lookup(&self) -> &Arc<dyn UserLookup> {
        &self.user_lookup
    }
}

impl std::fmt::Debug for GatewayState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayState")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
