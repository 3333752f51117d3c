use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Deserializer};

use super::{
    cipher::CipherMethod,
    error::{Error, Result},
};

/// Source name that selects the ticket cookie instead of a header.
pub const COOKIE_SOURCE: &str = "cookie";

pub const DEFAULT_COOKIE_NAME: &str = "pubtkt";
pub const DEFAULT_BACK_ARG_NAME: &str = "back";

/// How `required_tokens` is matched against the ticket tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenPolicy {
    /// Every required token must be carried.
    #[default]
    AllOf,
    /// One carried required token is enough.
    AnyOf,
}

/// Validator and middleware configuration.
///
/// Field names follow the `mod_auth_pubtkt` directives they stand for
/// (`TKTAuthPublicKey`, `TKTAuthCookieName`, `TKTAuthHeader`, ...).
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct AuthPubTktOptions {
    /// PEM public key used to verify ticket signatures.
    pub public_key: String,
    /// PEM private key, only needed to issue tickets.
    #[serde(deserialize_with = "deserialize_secret")]
    pub private_key: Option<SecretString>,
    pub cookie_name: String,
    /// Ordered ticket sources; `cookie` or a header name.
    pub sources: Vec<String>,
    #[serde(deserialize_with = "deserialize_secret")]
    pub cipher_passphrase: Option<SecretString>,
    pub cipher_method: CipherMethod,
    pub check_ip: bool,
    /// Take the client address from `X-Forwarded-For` when present.
    pub check_x_forwarded_ip: bool,
    pub required_tokens: Vec<String>,
    pub token_policy: TokenPolicy,
    pub require_tls: bool,
    pub login_url: String,
    pub timeout_url: String,
    pub post_timeout_url: String,
    pub refresh_url: String,
    pub unauth_url: String,
    pub back_arg_name: String,
    pub fake_basic_auth: bool,
    pub passthru_basic_auth: bool,
    /// 16-byte AES key the `bauth` field is encrypted with, if any.
    #[serde(deserialize_with = "deserialize_secret")]
    pub passthru_basic_key: Option<SecretString>,
}

impl Default for AuthPubTktOptions {
    fn default() -> Self {
        Self {
            public_key: String::new(),
            private_key: None,
            cookie_name: DEFAULT_COOKIE_NAME.to_string(),
            sources: vec![COOKIE_SOURCE.to_string()],
            cipher_passphrase: None,
            cipher_method: CipherMethod::default(),
            check_ip: false,
            check_x_forwarded_ip: false,
            required_tokens: Vec::new(),
            token_policy: TokenPolicy::default(),
            require_tls: false,
            login_url: String::new(),
            timeout_url: String::new(),
            post_timeout_url: String::new(),
            refresh_url: String::new(),
            unauth_url: String::new(),
            back_arg_name: DEFAULT_BACK_ARG_NAME.to_string(),
            fake_basic_auth: false,
            passthru_basic_auth: false,
            passthru_basic_key: None,
        }
    }
}

impl AuthPubTktOptions {
    /// Check the options a validator cannot work without.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Options`] naming the first problem found.
    pub fn validate(&self) -> Result<()> {
        if self.public_key.trim().is_empty() {
            return Err(Error::Options("public key is required".to_string()));
        }

        if self.sources.is_empty() {
            return Err(Error::Options(
                "at least one ticket source is required".to_string(),
            ));
        }

        if self.sources.iter().any(|s| s.trim().is_empty()) {
            return Err(Error::Options("ticket source name is empty".to_string()));
        }

        if self.uses_cookie() && self.cookie_name.trim().is_empty() {
            return Err(Error::Options(
                "cookie name is required when reading tickets from a cookie".to_string(),
            ));
        }

        if let Some(key) = self.passthru_basic_key() {
            if key.len() != 16 {
                return Err(Error::Options(format!(
                    "passthrough basic auth key must be 16 bytes, got {}",
                    key.len()
                )));
            }
        }

        Ok(())
    }

    #[must_use]
    pub fn uses_cookie(&self) -> bool {
        self.sources
            .iter()
            .any(|s| s.eq_ignore_ascii_case(COOKIE_SOURCE))
    }

    /// Passphrase for whole-ticket encryption; empty means disabled.
    #[must_use]
    pub fn cipher_passphrase(&self) -> Option<&str> {
        non_empty_secret(self.cipher_passphrase.as_ref())
    }

    #[must_use]
    pub fn passthru_basic_key(&self) -> Option<&str> {
        non_empty_secret(self.passthru_basic_key.as_ref())
    }

    #[must_use]
    pub fn private_key(&self) -> Option<&str> {
        non_empty_secret(self.private_key.as_ref())
    }
}

fn non_empty_secret(secret: Option<&SecretString>) -> Option<&str> {
    secret.map(|s| s.expose_secret()).filter(|s| !s.is_empty())
}

fn deserialize_secret<'de, D>(deserializer: D) -> Result<Option<SecretString>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.map(SecretString::from))
}
