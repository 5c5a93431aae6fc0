use std::fmt;

/// A bearer token extracted from an inbound `Authorization` header. Carried
/// opaquely and replayed to the upstream push endpoint.
#[derive(Clone, PartialEq, Eq)]
pub struct AuthToken(String);

impl AuthToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Parse an `Authorization` header value. The scheme must be `Bearer`;
    /// the token is everything after the single space.
    pub fn from_authorization_header(value: &str) -> anyhow::Result<Self> {
        let token = value
            .strip_prefix("Bearer ")
            .ok_or_else(|| anyhow::anyhow!("Authorization header must start with \"Bearer \""))?;
        anyhow::ensure!(!token.is_empty(), "Authorization header has an empty token");
        Ok(Self(token.to_owned()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

// Tokens are credentials; keep them out of logs.
impl fmt::Debug for AuthToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AuthToken(<redacted>)")
    }
}
