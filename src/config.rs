use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct Config {
    #[serde(default)]
    pub listen: ListenConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub users: Vec<UserConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ListenConfig {
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default = "default_port")]
    pub port: String,
    #[serde(default)]
    pub tlscert: Option<String>,
    #[serde(default)]
    pub tlskey: Option<String>,
}

impl Default for ListenConfig {
    fn default() -> Self {
        Self {
            address: None,
            port: default_port(),
            tlscert: None,
            tlskey: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct DatabaseConfig {
    #[serde(default)]
    pub sqlite: Option<SqliteConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SqliteConfig {
    pub filename: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AuthConfig {
    #[serde(default = "default_token_lifetime")]
    pub token_lifetime_hours: i64,
    /// Static key accepted in the `x-api-key` header. Grants admin rights.
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub api_key_user_id: Option<String>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            token_lifetime_hours: default_token_lifetime(),
            api_key: None,
            api_key_user_id: None,
        }
    }
}

/// A user seeded into the database at startup. `password` is a bcrypt hash.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct UserConfig {
    #[serde(default)]
    pub id: Option<String>,
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub admin: bool,
    #[serde(default, alias = "trustedmember")]
    pub trusted_member: bool,
}

fn default_port() -> String {
    "8080".to_string()
}

fn default_token_lifetime() -> i64 {
    8
}

impl Config {
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadError(path.to_string(), e))?;

        let config =
            Self::from_yaml(&content).map_err(|e| ConfigError::ParseError(path.to_string(), e))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values that parse but cannot be used at runtime.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let hours = self.auth.token_lifetime_hours;
        if hours < 1 || chrono::Duration::try_hours(hours).is_none() {
            return Err(ConfigError::Invalid(format!(
                "auth.token_lifetime_hours must be a positive number of hours, got {}",
                hours
            )));
        }
        Ok(())
    }

    pub fn from_yaml(content: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(content)
    }

    pub fn get_database_path(&self) -> Option<String> {
        self.database
            .sqlite
            .as_ref()
            .map(|sqlite| sqlite.filename.clone())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {0}: {1}")]
    ReadError(String, std::io::Error),
    #[error("Failed to parse config file {0}: {1}")]
    ParseError(String, serde_yaml::Error),
    #[error("Invalid config: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = Config::from_yaml("database:\n  sqlite:\n    filename: movies.db\n").unwrap();
        assert_eq!(config.listen.port, "8080");
        assert_eq!(config.auth.token_lifetime_hours, 8);
        assert!(config.auth.api_key.is_none());
        assert!(config.users.is_empty());
        assert_eq!(config.get_database_path().as_deref(), Some("movies.db"));
    }

    #[test]
    fn test_users_and_auth() {
        let yaml = r#"
listen:
  port: "9000"
auth:
  token_lifetime_hours: 1
  api_key: letmein
users:
  - username: alice
    password: "$2b$04$abc"
    admin: true
  - username: bob
    password: "$2b$04$def"
    trustedmember: true
"#;
        let config = Config::from_yaml(yaml).unwrap();
        assert_eq!(config.listen.port, "9000");
        assert_eq!(config.auth.token_lifetime_hours, 1);
        assert_eq!(config.auth.api_key.as_deref(), Some("letmein"));
        assert_eq!(config.users.len(), 2);
        assert!(config.users[0].admin);
        assert!(!config.users[0].trusted_member);
        assert!(config.users[1].trusted_member);
        assert!(config.get_database_path().is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_token_lifetime_out_of_range() {
        for hours in ["0", "-3", "9223372036854775807"] {
            let yaml = format!("auth:\n  token_lifetime_hours: {}\n", hours);
            let config = Config::from_yaml(&yaml).unwrap();
            assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))), "{}", hours);
        }
    }
}
