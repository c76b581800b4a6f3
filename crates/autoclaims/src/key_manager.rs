use keyring::Entry;
use std::env;
use thiserror::Error;
use tracing::debug;

#[cfg(test)]
use mockall::automock;

use crate::config::ProviderSettings;

const KEYRING_SERVICE: &str = "autoclaims";

pub const OPENAI_API_KEY: &str = "OPENAI_API_KEY";
pub const DATABRICKS_TOKEN: &str = "DATABRICKS_TOKEN";

#[derive(Error, Debug)]
pub enum KeyManagerError {
    #[error("Failed to access keyring: {0}")]
    KeyringAccess(String),

    #[error("Failed to access environment variable: {0}")]
    EnvVarAccess(String),
}

impl From<keyring::Error> for KeyManagerError {
    fn from(err: keyring::Error) -> Self {
        KeyManagerError::KeyringAccess(err.to_string())
    }
}

impl From<env::VarError> for KeyManagerError {
    fn from(err: env::VarError) -> Self {
        KeyManagerError::EnvVarAccess(err.to_string())
    }
}

#[cfg_attr(test, automock)]
pub trait Keyring: Send + Sync {
    fn get_password(&self, key_name: &str) -> Result<String, KeyManagerError>;
}

#[cfg_attr(test, automock)]
pub trait Environment: Send + Sync {
    fn get_var(&self, key: &str) -> Result<String, env::VarError>;
}

pub struct RealEnvironment;

impl Environment for RealEnvironment {
    fn get_var(&self, key: &str) -> Result<String, env::VarError> {
        env::var(key)
    }
}

/// The operating system keyring, one entry per key under the `autoclaims` service
pub struct SystemKeyring;

impl Keyring for SystemKeyring {
    fn get_password(&self, key_name: &str) -> Result<String, KeyManagerError> {
        Ok(Entry::new(KEYRING_SERVICE, key_name)?.get_password()?)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub enum KeyRetrievalStrategy {
    /// Only look in environment variables
    EnvironmentOnly,
    /// Only look in system keyring
    KeyringOnly,
    /// Try keyring first, then environment variables
    #[default]
    Both,
}

pub fn get_api_key(
    key_name: &str,
    strategy: KeyRetrievalStrategy,
    keyring: &dyn Keyring,
    env: &dyn Environment,
) -> Result<String, KeyManagerError> {
    match strategy {
        KeyRetrievalStrategy::EnvironmentOnly => Ok(env.get_var(key_name)?),
        KeyRetrievalStrategy::KeyringOnly => keyring.get_password(key_name),
        KeyRetrievalStrategy::Both => match keyring.get_password(key_name) {
            Ok(key) => Ok(key),
            Err(e) => {
                debug!("Could not retrieve {} from keyring: {}", key_name, e);
                env.get_var(key_name).map_err(|_| {
                    KeyManagerError::EnvVarAccess(format!(
                        "Could not find {} key in keyring or environment variables",
                        key_name
                    ))
                })
            }
        },
    }
}

/// Credentials resolved once at startup and passed to whatever needs them
#[derive(Clone)]
pub struct Secrets {
    pub openai_api_key: Option<String>,
    pub databricks_token: String,
}

impl std::fmt::Debug for Secrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Secrets")
            .field("openai_api_key", &self.openai_api_key.as_ref().map(|_| "***"))
            .field("databricks_token", &"***")
            .finish()
    }
}

impl Secrets {
    pub fn load(
        strategy: KeyRetrievalStrategy,
        provider: &ProviderSettings,
    ) -> Result<Self, KeyManagerError> {
        Self::load_from(strategy, provider, &SystemKeyring, &RealEnvironment)
    }

    /// The OpenAI key is only fetched when the OpenAI provider is configured.
    /// The workspace token is always required for the governed functions.
    pub fn load_from(
        strategy: KeyRetrievalStrategy,
        provider: &ProviderSettings,
        keyring: &dyn Keyring,
        env: &dyn Environment,
    ) -> Result<Self, KeyManagerError> {
        let openai_api_key = if provider.is_openai() {
            Some(get_api_key(OPENAI_API_KEY, strategy, keyring, env)?)
        } else {
            None
        };
        let databricks_token = get_api_key(DATABRICKS_TOKEN, strategy, keyring, env)?;

        Ok(Self {
            openai_api_key,
            databricks_token,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockall::predicate::*;

    const TEST_KEY: &str = "TEST_KEY";

    fn openai() -> ProviderSettings {
        ProviderSettings::OpenAi {
            host: "https://api.openai.com".to_string(),
            model: "gpt-4o".to_string(),
            temperature: None,
            max_tokens: None,
        }
    }

    #[test]
    fn test_get_api_key_environment_only() {
        let mut mock_env = MockEnvironment::new();
        let mut mock_keyring = MockKeyring::new();

        mock_env
            .expect_get_var()
            .with(eq(TEST_KEY))
            .times(1)
            .return_once(|_| Ok("env_value".to_string()));
        mock_keyring.expect_get_password().times(0);

        let result = get_api_key(
            TEST_KEY,
            KeyRetrievalStrategy::EnvironmentOnly,
            &mock_keyring,
            &mock_env,
        );

        assert!(matches!(result.as_deref(), Ok("env_value")));
    }

    #[test]
    fn test_get_api_key_environment_only_missing() {
        let mut mock_env = MockEnvironment::new();
        let mut mock_keyring = MockKeyring::new();

        mock_env
            .expect_get_var()
            .with(eq(TEST_KEY))
            .times(1)
            .return_once(|_| Err(env::VarError::NotPresent));
        mock_keyring.expect_get_password().times(0);

        let result = get_api_key(
            TEST_KEY,
            KeyRetrievalStrategy::EnvironmentOnly,
            &mock_keyring,
            &mock_env,
        );

        assert!(matches!(result, Err(KeyManagerError::EnvVarAccess(_))));
    }

    #[test]
    fn test_get_api_key_keyring_only() {
        let mut mock_env = MockEnvironment::new();
        let mut mock_keyring = MockKeyring::new();

        mock_keyring
            .expect_get_password()
            .with(eq(TEST_KEY))
            .times(1)
            .return_once(|_| Ok("keyring_value".to_string()));
        mock_env.expect_get_var().times(0);

        let result = get_api_key(
            TEST_KEY,
            KeyRetrievalStrategy::KeyringOnly,
            &mock_keyring,
            &mock_env,
        );

        assert!(matches!(result.as_deref(), Ok("keyring_value")));
    }

    #[test]
    fn test_get_api_key_both_keyring_fails_env_succeeds() {
        let mut mock_env = MockEnvironment::new();
        let mut mock_keyring = MockKeyring::new();

        mock_keyring
            .expect_get_password()
            .times(1)
            .return_once(|_| Err(KeyManagerError::KeyringAccess("Failed".to_string())));
        mock_env
            .expect_get_var()
            .with(eq(TEST_KEY))
            .times(1)
            .return_once(|_| Ok("env_value".to_string()));

        let result = get_api_key(
            TEST_KEY,
            KeyRetrievalStrategy::Both,
            &mock_keyring,
            &mock_env,
        );

        assert!(matches!(result.as_deref(), Ok("env_value")));
    }

    #[test]
    fn test_get_api_key_both_all_fail() {
        let mut mock_env = MockEnvironment::new();
        let mut mock_keyring = MockKeyring::new();

        mock_keyring
            .expect_get_password()
            .times(1)
            .return_once(|_| Err(KeyManagerError::KeyringAccess("Failed".to_string())));
        mock_env
            .expect_get_var()
            .times(1)
            .return_once(|_| Err(env::VarError::NotPresent));

        let err = get_api_key(
            TEST_KEY,
            KeyRetrievalStrategy::Both,
            &mock_keyring,
            &mock_env,
        )
        .unwrap_err();

        assert!(err.to_string().contains("TEST_KEY"));
    }

    #[test]
    fn test_secrets_for_openai_provider() {
        let mut mock_env = MockEnvironment::new();
        let mock_keyring = MockKeyring::new();

        mock_env
            .expect_get_var()
            .with(eq(OPENAI_API_KEY))
            .times(1)
            .return_once(|_| Ok("sk-test".to_string()));
        mock_env
            .expect_get_var()
            .with(eq(DATABRICKS_TOKEN))
            .times(1)
            .return_once(|_| Ok("dapi-test".to_string()));

        let secrets = Secrets::load_from(
            KeyRetrievalStrategy::EnvironmentOnly,
            &openai(),
            &mock_keyring,
            &mock_env,
        )
        .unwrap();

        assert_eq!(secrets.openai_api_key.as_deref(), Some("sk-test"));
        assert_eq!(secrets.databricks_token, "dapi-test");
        assert!(!format!("{:?}", secrets).contains("sk-test"));
    }

    #[test]
    fn test_secrets_for_databricks_provider_skip_openai_key() {
        let mut mock_env = MockEnvironment::new();
        let mut mock_keyring = MockKeyring::new();

        mock_keyring
            .expect_get_password()
            .with(eq(DATABRICKS_TOKEN))
            .times(1)
            .return_once(|_| Ok("dapi-keyring".to_string()));
        mock_env.expect_get_var().times(0);

        let provider = ProviderSettings::Databricks {
            host: None,
            model: "databricks-claude-sonnet".to_string(),
            temperature: None,
            max_tokens: None,
        };
        let secrets = Secrets::load_from(
            KeyRetrievalStrategy::Both,
            &provider,
            &mock_keyring,
            &mock_env,
        )
        .unwrap();

        assert_eq!(secrets.openai_api_key, None);
        assert_eq!(secrets.databricks_token, "dapi-keyring");
    }

    #[test]
    fn test_missing_token_fails() {
        let mut mock_env = MockEnvironment::new();
        let mock_keyring = MockKeyring::new();

        mock_env
            .expect_get_var()
            .with(eq(OPENAI_API_KEY))
            .return_once(|_| Ok("sk-test".to_string()));
        mock_env
            .expect_get_var()
            .with(eq(DATABRICKS_TOKEN))
            .return_once(|_| Err(env::VarError::NotPresent));

        let result = Secrets::load_from(
            KeyRetrievalStrategy::EnvironmentOnly,
            &openai(),
            &mock_keyring,
            &mock_env,
        );
        assert!(result.is_err());
    }
}
