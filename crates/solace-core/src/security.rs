use secrecy::{ExposeSecret, SecretString};

/// Wraps an API key with secrecy protection (zeroized on drop, redacted in Debug).
#[derive(Clone)]
pub struct ApiKey(SecretString);

impl ApiKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(SecretString::from(key.into()))
    }

    /// Read the key from an environment variable. Blank values count as absent.
    pub fn from_env(var: &str) -> Option<Self> {
        std::env::var(var)
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .map(Self::new)
    }

    pub fn expose(&self) -> &str {
        self.0.expose_secret()
    }
}

impl std::fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ApiKey([REDACTED])")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_is_redacted() {
        let key = ApiKey::new("AIza-very-secret");
        let dbg = format!("{key:?}");
        assert_eq!(dbg, "ApiKey([REDACTED])");
        assert!(!dbg.contains("secret"));
    }

    #[test]
    fn expose_returns_value() {
        assert_eq!(ApiKey::new("k").expose(), "k");
    }

    #[test]
    fn missing_env_is_none() {
        assert!(ApiKey::from_env("SOLACE_TEST_KEY_THAT_IS_NEVER_SET").is_none());
    }
}
