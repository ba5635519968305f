use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

use crate::auth::Claims;
use crate::config::{KeySource, SessionConfig};

const MAX_KEY_LEN: usize = 128;

/// Opaque identity grouping the live connections of one principal.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionKey(String);

impl SessionKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for SessionKey {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SessionKey {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for SessionKey {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// What is known about a connection when it is opened.
#[derive(Debug, Clone, Default)]
pub struct HandshakeContext {
    pub query: HashMap<String, String>,
    /// Header names are lower-cased
    pub headers: HashMap<String, String>,
    /// Present when the upgrade carried a validated token
    pub claims: Option<Claims>,
}

impl HandshakeContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.insert(name.into(), value.into());
        self
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    pub fn with_claims(mut self, claims: Claims) -> Self {
        self.claims = Some(claims);
        self
    }

    pub fn query_param(&self, name: &str) -> Option<&str> {
        self.query.get(name).map(String::as_str)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum HandshakeError {
    #[error("No authenticated principal")]
    MissingPrincipal,

    #[error("Missing query parameter: {0}")]
    MissingParameter(String),

    #[error("Invalid session key: {0}")]
    InvalidKey(String),
}

/// Computes the session key of a new connection. Pure: no I/O, no state.
pub trait SessionKeyGenerator: Send + Sync {
    fn generate(&self, ctx: &HandshakeContext) -> Result<SessionKey, HandshakeError>;
}

/// Keys connections by the `sub` claim of their token.
#[derive(Debug, Default, Clone, Copy)]
pub struct PrincipalKeyGenerator;

impl SessionKeyGenerator for PrincipalKeyGenerator {
    fn generate(&self, ctx: &HandshakeContext) -> Result<SessionKey, HandshakeError> {
        match ctx.claims.as_ref().map(|c| c.principal()) {
            Some(sub) if !sub.is_empty() => Ok(SessionKey::from(sub)),
            _ => Err(HandshakeError::MissingPrincipal),
        }
    }
}

/// Keys connections by a query parameter of the upgrade request.
#[derive(Debug, Clone)]
pub struct QueryParameterKeyGenerator {
    param: String,
}

impl QueryParameterKeyGenerator {
    pub fn new(param: impl Into<String>) -> Self {
        Self {
            param: param.into(),
        }
    }
}

impl SessionKeyGenerator for QueryParameterKeyGenerator {
    fn generate(&self, ctx: &HandshakeContext) -> Result<SessionKey, HandshakeError> {
        let value = ctx
            .query_param(&self.param)
            .ok_or_else(|| HandshakeError::MissingParameter(self.param.clone()))?;

        if !is_valid_key(value) {
            return Err(HandshakeError::InvalidKey(value.to_string()));
        }

        Ok(SessionKey::from(value))
    }
}

fn is_valid_key(key: &str) -> bool {
    if key.is_empty() || key.len() > MAX_KEY_LEN {
        return false;
    }

    key.chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | ':' | '@' | '-'))
}

pub fn create_key_generator(config: &SessionConfig) -> Arc<dyn SessionKeyGenerator> {
    match config.key_source {
        KeySource::Principal => Arc::new(PrincipalKeyGenerator),
        KeySource::Query => Arc::new(QueryParameterKeyGenerator::new(&config.query_param)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn claims(sub: &str) -> Claims {
        Claims {
            sub: sub.to_string(),
            exp: 0,
            iat: 0,
            roles: vec![],
            extra: Default::default(),
        }
    }

    #[test]
    fn test_principal_generator() {
        let ctx = HandshakeContext::new().with_claims(claims("user-42"));
        assert_eq!(
            PrincipalKeyGenerator.generate(&ctx),
            Ok(SessionKey::from("user-42"))
        );

        assert_eq!(
            PrincipalKeyGenerator.generate(&HandshakeContext::new()),
            Err(HandshakeError::MissingPrincipal)
        );
        let empty = HandshakeContext::new().with_claims(claims(""));
        assert_eq!(
            PrincipalKeyGenerator.generate(&empty),
            Err(HandshakeError::MissingPrincipal)
        );
    }

    #[test]
    fn test_query_generator() {
        let generator = QueryParameterKeyGenerator::new("session");

        let ctx = HandshakeContext::new().with_query("session", "device:tablet-1");
        assert_eq!(
            generator.generate(&ctx).unwrap().as_str(),
            "device:tablet-1"
        );

        assert_eq!(
            generator.generate(&HandshakeContext::new()),
            Err(HandshakeError::MissingParameter("session".into()))
        );
    }

    #[test]
    fn test_invalid_keys() {
        assert!(is_valid_key("user-42"));
        assert!(is_valid_key("alice@example.com"));
        assert!(!is_valid_key(""));
        assert!(!is_valid_key("has space"));
        assert!(!is_valid_key("a/b"));
        assert!(!is_valid_key(&"a".repeat(MAX_KEY_LEN + 1)));
    }

    #[test]
    fn test_headers_are_case_insensitive() {
        let ctx = HandshakeContext::new().with_header("X-Device", "phone");
        assert_eq!(ctx.header("x-device"), Some("phone"));
        assert_eq!(ctx.header("X-DEVICE"), Some("phone"));
    }

    #[test]
    fn test_factory_follows_config() {
        let config = SessionConfig {
            key_source: KeySource::Query,
            query_param: "sid".into(),
        };
        let generator = create_key_generator(&config);
        let ctx = HandshakeContext::new().with_query("sid", "abc");
        assert_eq!(generator.generate(&ctx), Ok(SessionKey::from("abc")));
    }
}
