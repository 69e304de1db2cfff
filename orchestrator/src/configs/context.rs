use std::{env, fmt};

use serde::Deserialize;

use crate::{OrchestratorError, Result};

/// The credentials a `Context` is initialized with.
#[derive(Clone, Deserialize)]
pub struct ContextConfig {
    pub username: String,
    pub token: String,
}

impl ContextConfig {
    pub const USERNAME_VAR: &'static str = "ORCHESTRATOR_USERNAME";
    pub const TOKEN_VAR: &'static str = "ORCHESTRATOR_TOKEN";

    /// Creates a new `ContextConfig`.
    pub fn new<U, T>(username: U, token: T) -> Self
    where
        U: Into<String>,
        T: Into<String>,
    {
        Self {
            username: username.into(),
            token: token.into(),
        }
    }

    /// Reads the credentials from the `ORCHESTRATOR_USERNAME` and `ORCHESTRATOR_TOKEN`
    /// environment variables.
    ///
    /// # Errors
    /// Returns `InvalidConfig` if either variable is unset or not unicode.
    pub fn from_env() -> Result<Self> {
        let read = |key: &str| {
            env::var(key).map_err(|e| OrchestratorError::InvalidConfig(format!("{key}: {e}")))
        };

        Ok(Self::new(read(Self::USERNAME_VAR)?, read(Self::TOKEN_VAR)?))
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.username.trim().is_empty() {
            return Err(OrchestratorError::InvalidConfig(
                "username must not be empty".into(),
            ));
        }
        if self.token.trim().is_empty() {
            return Err(OrchestratorError::InvalidConfig(
                "token must not be empty".into(),
            ));
        }
        Ok(())
    }
}

impl fmt::Debug for ContextConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextConfig")
            .field("username", &self.username)
            .field("token", &"<redacted>")
            .finish()
    }
}
