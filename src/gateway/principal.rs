//! Authenticated principal and the external user-lookup collaborator.
//!
//! Persistent account storage and role management live outside this core;
//! the gateway only needs authorities for a subject and a password check
//! for classic login, both behind [`UserLookup`].

use std::collections::BTreeMap;

/// Claims established for the caller after validation.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TokenClaims {
    pub scope: Option<String>,
    pub client_id: Option<String>,
    pub username: Option<String>,
    pub token_type: Option<String>,
    pub issued_at: i64,
    pub expires_at: i64,
    pub audience: Option<String>,
}

/// Authenticated caller context inserted into request extensions.
#[derive(Clone, Debug, PartialEq)]
pub struct Principal {
    pub subject: String,
    pub username: String,
    pub authorities: Vec<String>,
    pub claims: TokenClaims,
}

/// Account data the gateway needs from the surrounding system.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UserAccount {
    pub username: String,
    pub authorities: Vec<String>,
}

/// External collaborator for account and role lookup.
pub trait UserLookup: Send + Sync {
    /// Resolve a subject to an account, or `None` when unknown.
    fn lookup(&self, subject: &str) -> Option<UserAccount>;

    /// Verify classic-login credentials.
    fn verify_credentials(&self, username: &str, password: &str) -> bool;
}

/// In-memory lookup backed by startup configuration. Suitable for
/// deployments that delegate real account storage to the identity provider
/// and only map subjects to roles here.
#[derive(Clone, Debug, Default)]
pub struct StaticUserLookup {
    accounts: BTreeMap<String, StaticAccount>,
}

#[derive(Clone, Debug)]
struct StaticAccount {
    password: Option<String>,
    authorities: Vec<String>,
}

impl StaticUserLookup {
    /// Parse `name:password:role1|role2` entries. The password segment may
    /// be empty for accounts that only authenticate via OAuth2.
    ///
    /// # Errors
    /// Returns an error for entries without a username.
    pub fn from_entries<'a, I>(entries: I) -> anyhow::Result<Self>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut accounts = BTreeMap::new();
        for entry in entries {
            let mut parts = entry.splitn(3, ':');
            let username = parts.next().unwrap_or_default().trim();
            if username.is_empty() {
                anyhow::bail!("user entry is missing a username: {entry:?}");
            }
            let password = parts
                .next()
                .map(str::trim)
                .filter(|password| !password.is_empty())
                .map(str::to_string);
            let authorities = parts
                .next()
                .unwrap_or_default()
                .split('|')
                .map(str::trim)
                .filter(|role| !role.is_empty())
                .map(str::to_string)
                .collect();
            accounts.insert(
                username.to_string(),
                StaticAccount {
                    password,
                    authorities,
                },
            );
        }
        Ok(Self { accounts })
    }
}

impl UserLookup for StaticUserLookup {
    fn lookup(&self, subject: &str) -> Option<UserAccount> {
        self.accounts.get(subject).map(|account| UserAccount {
            username: subject.to_string(),
            authorities: account.authorities.clone(),
        })
    }

    fn verify_credentials(&self, username: &str, password: &str) -> bool {
        self.accounts
            .get(username)
            .and_then(|account| account.password.as_deref())
            .is_some_and(|stored| stored == password)
    }
}
