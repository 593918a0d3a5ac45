use clap::{
    builder::{
        styling::{AnsiColor, Effects, Styles},
        PossibleValuesParser, ValueParser,
    },
    Arg, ArgAction, ColorChoice, Command,
};

pub fn validator_log_level() -> ValueParser {
    ValueParser::from(move |level: &str| -> std::result::Result<u8, String> {
        if let Ok(parsed) = level.parse::<u8>() {
            // Successfully parsed as a number
            if parsed <= 5 {
                return Ok(parsed);
            }
        }

        match level.to_lowercase().as_str() {
            "error" => Ok(0),
            "warn" => Ok(1),
            "info" => Ok(2),
            "debug" => Ok(3),
            "trace" => Ok(4),
            _ => Err("invalid log level".to_string()),
        }
    })
}

#[allow(clippy::too_many_lines)]
pub fn new() -> Command {
    let styles = Styles::styled()
        .header(AnsiColor::Yellow.on_default() | Effects::BOLD)
        .usage(AnsiColor::Green.on_default() | Effects::BOLD)
        .literal(AnsiColor::Blue.on_default() | Effects::BOLD)
        .placeholder(AnsiColor::Green.on_default());

    Command::new("custode")
        .about("Stateless multi-mode authentication gateway")
        .version(env!("CARGO_PKG_VERSION"))
        .color(ColorChoice::Auto)
        .styles(styles)
        .arg(
            Arg::new("port")
                .short('p')
                .long("port")
                .help("Port to listen on")
                .default_value("8080")
                .env("CUSTODE_PORT")
                .value_parser(clap::value_parser!(u16)),
        )
        .arg(
            Arg::new("management-port")
                .long("management-port")
                .help("Optional separate port serving only the health endpoint")
                .env("CUSTODE_MANAGEMENT_PORT")
                .value_parser(clap::value_parser!(u16)),
        )
        .arg(
            Arg::new("secret-key")
                .short('k')
                .long("secret-key")
                .help("32-byte key used to encrypt cookie payloads")
                .env("CUSTODE_SECRET_KEY")
                .required(true),
        )
        .arg(
            Arg::new("mode")
                .short('m')
                .long("mode")
                .help("Resource server validation mode")
                .env("CUSTODE_MODE")
                .value_parser(PossibleValuesParser::new(["jwt", "opaque-token"]))
                .required(true),
        )
        .arg(
            Arg::new("jwk-set-uri")
                .long("jwk-set-uri")
                .help("JWK set URI, example: https://idp.tld/.well-known/jwks.json")
                .env("CUSTODE_JWK_SET_URI")
                .required_if_eq("mode", "jwt"),
        )
        .arg(
            Arg::new("introspection-uri")
                .long("introspection-uri")
                .help("Token introspection endpoint (RFC 7662)")
                .env("CUSTODE_INTROSPECTION_URI")
                .required_if_eq("mode", "opaque-token"),
        )
        .arg(
            Arg::new("client-id")
                .long("client-id")
                .help("Client id for the introspection endpoint")
                .env("CUSTODE_CLIENT_ID")
                .required_if_eq("mode", "opaque-token"),
        )
        .arg(
            Arg::new("client-secret")
                .long("client-secret")
                .help("Client secret for the introspection endpoint")
                .env("CUSTODE_CLIENT_SECRET")
                .required_if_eq("mode", "opaque-token"),
        )
        .arg(
            Arg::new("default-token-expires-in")
                .long("default-token-expires-in")
                .help("Fallback token lifetime in seconds when the provider reports none")
                .default_value("86400")
                .env("CUSTODE_DEFAULT_TOKEN_EXPIRES_IN")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new("max-cache-duration")
                .long("max-cache-duration")
                .help("Upper bound in seconds for caching introspection results")
                .default_value("86400")
                .env("CUSTODE_MAX_CACHE_DURATION")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new("minimum-token-validity")
                .long("minimum-token-validity")
                .help("Floor in seconds applied to the computed token lifetime")
                .env("CUSTODE_MINIMUM_TOKEN_VALIDITY")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new("login-enabled")
                .long("login-enabled")
                .help("Expose the login endpoints")
                .env("CUSTODE_LOGIN_ENABLED")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("login-page")
                .long("login-page")
                .help("Path of the login page")
                .default_value("/login")
                .env("CUSTODE_LOGIN_PAGE"),
        )
        .arg(
            Arg::new("default-redirect-uri")
                .long("default-redirect-uri")
                .help("Relative path users land on after login when no redirect is requested")
                .env("CUSTODE_DEFAULT_REDIRECT_URI")
                .required_if_eq("login-enabled", "true"),
        )
        .arg(
            Arg::new("login-modes")
                .long("login-modes")
                .help("Login modes to enable, comma separated")
                .env("CUSTODE_LOGIN_MODES")
                .value_delimiter(',')
                .value_parser(PossibleValuesParser::new(["classic", "oauth2"])),
        )
        .arg(
            Arg::new("classic-cookie-ttl")
                .long("classic-cookie-ttl")
                .help("Lifetime in seconds of the classic credentials cookie")
                .default_value("86400")
                .env("CUSTODE_CLASSIC_COOKIE_TTL")
                .value_parser(clap::value_parser!(i64)),
        )
        .arg(
            Arg::new("login-theme")
                .long("login-theme")
                .help("Theme query parameter appended to the post-login redirect")
                .default_value("default")
                .env("CUSTODE_LOGIN_THEME"),
        )
        .arg(
            Arg::new("oauth2-provider")
                .long("oauth2-provider")
                .help("Registration id of the OAuth2 provider")
                .env("CUSTODE_OAUTH2_PROVIDER"),
        )
        .arg(
            Arg::new("oauth2-client-id")
                .long("oauth2-client-id")
                .help("OAuth2 login client id")
                .env("CUSTODE_OAUTH2_CLIENT_ID"),
        )
        .arg(
            Arg::new("oauth2-client-secret")
                .long("oauth2-client-secret")
                .help("OAuth2 login client secret")
                .env("CUSTODE_OAUTH2_CLIENT_SECRET"),
        )
        .arg(
            Arg::new("oauth2-authorization-uri")
                .long("oauth2-authorization-uri")
                .help("Provider authorization endpoint")
                .env("CUSTODE_OAUTH2_AUTHORIZATION_URI"),
        )
        .arg(
            Arg::new("oauth2-token-uri")
                .long("oauth2-token-uri")
                .help("Provider token endpoint")
                .env("CUSTODE_OAUTH2_TOKEN_URI"),
        )
        .arg(
            Arg::new("oauth2-redirect-uri")
                .long("oauth2-redirect-uri")
                .help("Redirect URI registered with the provider")
                .env("CUSTODE_OAUTH2_REDIRECT_URI"),
        )
        .arg(
            Arg::new("oauth2-post-login-redirect-uri")
                .long("oauth2-post-login-redirect-uri")
                .help("Relative path users land on after the OAuth2 flow completes")
                .env("CUSTODE_OAUTH2_POST_LOGIN_REDIRECT_URI"),
        )
        .arg(
            Arg::new("oauth2-scopes")
                .long("oauth2-scopes")
                .help("Scopes requested during the OAuth2 flow, comma separated")
                .env("CUSTODE_OAUTH2_SCOPES")
                .value_delimiter(','),
        )
        .arg(
            Arg::new("users")
                .long("users")
                .help("Static accounts, name:password:role1|role2, comma separated")
                .env("CUSTODE_USERS")
                .value_delimiter(','),
        )
        .arg(
            Arg::new("verbosity")
                .short('v')
                .long("verbose")
                .help("Verbosity level: ERROR, WARN, INFO, DEBUG, TRACE (default: ERROR)")
                .env("CUSTODE_LOG_LEVEL")
                .global(true)
                .action(ArgAction::Count)
                .value_parser(validator_log_level()),
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new() {
        let command = new();

        assert_eq!(command.get_name(), "custode");
        assert_eq!(
            command.get_about().unwrap().to_string(),
            "Stateless multi-mode authentication gateway"
        );
        assert_eq!(
            command.get_version().unwrap().to_string(),
            env!("CARGO_PKG_VERSION")
        );
    }

    #[test]
    fn test_check_jwt_mode() {
        let command = new();
        let matches = command.get_matches_from(vec![
            "custode",
            "--port",
            "8080",
            "--secret-key",
            "0123456789abcdef0123456789abcdef",
            "--mode",
            "jwt",
            "--jwk-set-uri",
            "https://idp.tld/.well-known/jwks.json",
        ]);

        assert_eq!(matches.get_one::<u16>("port").map(|s| *s), Some(8080));
        assert_eq!(
            matches.get_one::<String>("mode").map(|s| s.to_string()),
            Some("jwt".to_string())
        );
        assert_eq!(
            matches
                .get_one::<String>("jwk-set-uri")
                .map(|s| s.to_string()),
            Some("https://idp.tld/.well-known/jwks.json".to_string())
        );
        assert!(!matches.get_flag("login-enabled"));
    }

    #[test]
    fn test_check_opaque_mode() {
        let command = new();
        let matches = command.get_matches_from(vec![
            "custode",
            "--secret-key",
            "0123456789abcdef0123456789abcdef",
            "--mode",
            "opaque-token",
            "--introspection-uri",
            "https://idp.tld/introspect",
            "--client-id",
            "gateway",
            "--client-secret",
            "hush",
            "--minimum-token-validity",
            "120",
        ]);

        assert_eq!(
            matches
                .get_one::<String>("introspection-uri")
                .map(|s| s.to_string()),
            Some("https://idp.tld/introspect".to_string())
        );
        assert_eq!(
            matches
                .get_one::<u64>("default-token-expires-in")
                .map(|s| *s),
            Some(86400)
        );
        assert_eq!(
            matches.get_one::<u64>("minimum-token-validity").map(|s| *s),
            Some(120)
        );
    }

    #[test]
    fn test_opaque_mode_requires_introspection_uri() {
        let command = new();
        let result = command.try_get_matches_from(vec![
            "custode",
            "--secret-key",
            "0123456789abcdef0123456789abcdef",
            "--mode",
            "opaque-token",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_check_login_args() {
        let command = new();
        let matches = command.get_matches_from(vec![
            "custode",
            "--secret-key",
            "0123456789abcdef0123456789abcdef",
            "--mode",
            "jwt",
            "--jwk-set-uri",
            "https://idp.tld/jwks.json",
            "--login-enabled",
            "--default-redirect-uri",
            "/index.html",
            "--login-modes",
            "classic,oauth2",
            "--users",
            "admin:hunter2:superadmin,auditor::auditor",
        ]);

        assert!(matches.get_flag("login-enabled"));
        let modes: Vec<String> = matches
            .get_many::<String>("login-modes")
            .unwrap()
            .map(ToString::to_string)
            .collect();
        assert_eq!(modes, vec!["classic".to_string(), "oauth2".to_string()]);
        let users: Vec<String> = matches
            .get_many::<String>("users")
            .unwrap()
            .map(ToString::to_string)
            .collect();
        assert_eq!(users.len(), 2);
        assert_eq!(
            matches.get_one::<i64>("classic-cookie-ttl").map(|s| *s),
            Some(86400)
        );
        assert_eq!(
            matches.get_one::<String>("login-theme").map(|s| s.to_string()),
            Some("default".to_string())
        );
    }

    #[test]
    fn test_check_env() {
        temp_env::with_vars(
            [
                ("CUSTODE_PORT", Some("443")),
                ("CUSTODE_SECRET_KEY", Some("0123456789abcdef0123456789abcdef")),
                ("CUSTODE_MODE", Some("jwt")),
                ("CUSTODE_JWK_SET_URI", Some("https://idp.tld/jwks.json")),
                ("CUSTODE_LOG_LEVEL", Some("info")),
            ],
            || {
                let command = new();
                let matches = command.get_matches_from(vec!["custode"]);
                assert_eq!(matches.get_one::<u16>("port").map(|s| *s), Some(443));
                assert_eq!(
                    matches.get_one::<String>("mode").map(|s| s.to_string()),
                    Some("jwt".to_string())
                );
                assert_eq!(
                    matches
                        .get_one::<String>("jwk-set-uri")
                        .map(|s| s.to_string()),
                    Some("https://idp.tld/jwks.json".to_string())
                );
                assert_eq!(matches.get_one::<u8>("verbosity").map(|s| *s), Some(2));
            },
        );
    }

    #[test]
    fn test_check_log_level_env() {
        // loop cover all possible value_parse
        let levels = vec!["error", "warn", "info", "debug", "trace"];
        for (index, &level) in levels.iter().enumerate() {
            temp_env::with_vars(
                [
                    ("CUSTODE_LOG_LEVEL", Some(level)),
                    (
                        "CUSTODE_SECRET_KEY",
                        Some("0123456789abcdef0123456789abcdef"),
                    ),
                    ("CUSTODE_MODE", Some("jwt")),
                    ("CUSTODE_JWK_SET_URI", Some("https://idp.tld/jwks.json")),
                ],
                || {
                    let command = new();
                    let matches = command.get_matches_from(vec!["custode"]);
                    assert_eq!(
                        matches.get_one::<u8>("verbosity").map(|s| *s),
                        Some(u8::try_from(index).unwrap())
                    );
                },
            );
        }
    }

    #[test]
    fn test_invalid_log_level() {
        temp_env::with_vars(
            [
                ("CUSTODE_LOG_LEVEL", Some("verbose")),
                (
                    "CUSTODE_SECRET_KEY",
                    Some("0123456789abcdef0123456789abcdef"),
                ),
                ("CUSTODE_MODE", Some("jwt")),
                ("CUSTODE_JWK_SET_URI", Some("https://idp.tld/jwks.json")),
            ],
            || {
                let command = new();
                let result = command.try_get_matches_from(vec!["custode"]);
                assert!(result.is_err());
            },
        );
    }
}
