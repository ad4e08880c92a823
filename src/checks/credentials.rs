//! Credential lookup seam.

use std::collections::HashMap;
use std::fmt;

/// Supplies secrets by opaque key. The engine never stores what it returns.
pub trait CredentialProvider: Send + Sync {
    /// Look up one field (`"username"` or `"password"`) for a credential key.
    fn get_credential(&self, key: &str, field: &str) -> Option<String>;
}

impl<F> CredentialProvider for F
where
    F: Fn(&str, &str) -> Option<String> + Send + Sync,
{
    fn get_credential(&self, key: &str, field: &str) -> Option<String> {
        self(key, field)
    }
}

/// Reads `<KEY>_USERNAME` / `<KEY>_PASSWORD` from the environment.
///
/// The key is upper-cased and non-alphanumeric characters become `_`, so
/// `portal-prod` reads `PORTAL_PROD_USERNAME`.
#[derive(Debug, Clone, Default)]
pub struct EnvCredentials {
    prefix: Option<String>,
}

impl EnvCredentials {
    pub fn new() -> Self {
        Self::default()
    }

    /// Prepend a prefix, e.g. `SITEWATCH` gives `SITEWATCH_PORTAL_USERNAME`.
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: Some(prefix.into()),
        }
    }

    pub fn variable_name(&self, key: &str, field: &str) -> String {
        let key: String = key
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() {
                    c.to_ascii_uppercase()
                } else {
                    '_'
                }
            })
            .collect();
        let field = field.to_ascii_uppercase();
        match &self.prefix {
            Some(prefix) => format!("{}_{}_{}", prefix, key, field),
            None => format!("{}_{}", key, field),
        }
    }
}

impl CredentialProvider for EnvCredentials {
    fn get_credential(&self, key: &str, field: &str) -> Option<String> {
        std::env::var(self.variable_name(key, field))
            .ok()
            .filter(|v| !v.is_empty())
    }
}

/// In-memory credentials, mostly for embedding and tests.
#[derive(Clone, Default)]
pub struct StaticCredentials {
    entries: HashMap<String, (String, String)>,
}

impl StaticCredentials {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(
        mut self,
        key: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.entries
            .insert(key.into(), (username.into(), password.into()));
        self
    }
}

impl fmt::Debug for StaticCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StaticCredentials")
            .field("keys", &self.entries.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl CredentialProvider for StaticCredentials {
    fn get_credential(&self, key: &str, field: &str) -> Option<String> {
        let (username, password) = self.entries.get(key)?;
        match field {
            "username" => Some(username.clone()),
            "password" => Some(password.clone()),
            _ => None,
        }
    }
}

/// A username/password pair fetched for one login attempt.
pub(crate) struct LoginCredentials {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for LoginCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoginCredentials")
            .field("username", &crate::logging::mask_secret(&self.username))
            .field("password", &"[REDACTED]")
            .finish()
    }
}

impl LoginCredentials {
    pub(crate) fn lookup(provider: &dyn CredentialProvider, key: &str) -> Option<Self> {
        Some(Self {
            username: provider.get_credential(key, "username")?,
            password: provider.get_credential(key, "password")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_variable_names() {
        let creds = EnvCredentials::new();
        assert_eq!(creds.variable_name("portal-prod", "username"), "PORTAL_PROD_USERNAME");
        let creds = EnvCredentials::with_prefix("SITEWATCH");
        assert_eq!(creds.variable_name("crm", "password"), "SITEWATCH_CRM_PASSWORD");
    }

    #[test]
    fn test_env_credentials_lookup() {
        std::env::set_var("SWTEST_CREDS_USERNAME", "alice");
        std::env::set_var("SWTEST_CREDS_PASSWORD", "");
        let creds = EnvCredentials::new();
        assert_eq!(
            creds.get_credential("swtest-creds", "username"),
            Some("alice".to_string())
        );
        // Empty values count as missing
        assert_eq!(creds.get_credential("swtest-creds", "password"), None);
        std::env::remove_var("SWTEST_CREDS_USERNAME");
        std::env::remove_var("SWTEST_CREDS_PASSWORD");
    }

    #[test]
    fn test_static_credentials_and_pair_lookup() {
        let creds = StaticCredentials::new().with("crm", "bob", "hunter22");
        let pair = LoginCredentials::lookup(&creds, "crm").unwrap();
        assert_eq!(pair.username, "bob");
        assert_eq!(pair.password, "hunter22");
        assert!(LoginCredentials::lookup(&creds, "other").is_none());

        let debug = format!("{:?}", pair);
        assert!(!debug.contains("hunter22"));
    }

    #[test]
    fn test_closure_provider() {
        let provider = |key: &str, field: &str| {
            (key == "k" && field == "username").then(|| "u".to_string())
        };
        assert_eq!(provider.get_credential("k", "username"), Some("u".to_string()));
        assert!(LoginCredentials::lookup(&provider, "k").is_none());
    }
}
