//! Server configuration as loaded from a toml file.
//!
//! ```toml
//! password_hash = ["{SSHA512}", "{ARGON2}"]
//! password_crypt_salt_format = "$1$%.8s"
//! require_authentication = true
//! allow_old_password = true
//! default_referral = ["ldap://primary.example.com"]
//! log_level = "info"
//! ```

use std::fs::File;
use std::io::Read;
use std::path::Path;

use pwmod_lib_crypto::{CryptAdapter, DEFAULT_CRYPT_SALT_FORMAT};
use pwmod_proto::PasswdModifyAllow;
use serde::Deserialize;
use sketching::LogLevel;
use thiserror::Error;

use crate::prelude::*;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unable to read config: {0}")]
    Io(#[from] std::io::Error),
    #[error("unable to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("password hash scheme not supported: {0}")]
    UnknownScheme(String),
    #[error("invalid crypt salt format: {0}")]
    InvalidSaltFormat(String),
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    /// Schemes every new password is hashed with, in order. All of them are
    /// stored. Empty selects the built in default.
    #[serde(default)]
    pub password_hash: Vec<String>,
    /// Salt format for `{CRYPT}`. Only `%s` and `%.Ns` are expanded.
    pub password_crypt_salt_format: Option<String>,
    /// Anonymous callers are refused outright. When false an anonymous caller
    /// may change a password by naming the target and proving the old one.
    #[serde(default = "default_true")]
    pub require_authentication: bool,
    #[serde(default = "default_true")]
    pub allow_target_identity: bool,
    #[serde(default = "default_true")]
    pub allow_old_password: bool,
    #[serde(default = "default_true")]
    pub allow_new_password: bool,
    /// Used for shadow backends that have no update references of their own.
    #[serde(default)]
    pub default_referral: Vec<String>,
    pub log_level: Option<LogLevel>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            password_hash: Vec::new(),
            password_crypt_salt_format: None,
            require_authentication: true,
            allow_target_identity: true,
            allow_old_password: true,
            allow_new_password: true,
            default_referral: Vec::new(),
            log_level: None,
        }
    }
}

impl ServerConfig {
    pub fn new<P: AsRef<Path>>(config_path: P) -> Result<Self, ConfigError> {
        let mut f = File::open(config_path.as_ref()).map_err(|e| {
            eprintln!(
                "Unable to open config file {:?} - {:?}",
                config_path.as_ref(),
                e
            );
            e
        })?;

        let mut contents = String::new();
        f.read_to_string(&mut contents).map_err(|e| {
            eprintln!("unable to read contents {:?}", e);
            e
        })?;

        Self::from_toml(contents.as_str())
    }

    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        let config: ServerConfig = toml::from_str(contents).map_err(|e| {
            eprintln!("unable to parse config {:?}", e);
            e
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Reject anything that would only fail once the first request arrives.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(fmt) = &self.password_crypt_salt_format {
            if !fmt.contains("%s") && !fmt.contains("%.") {
                return Err(ConfigError::InvalidSaltFormat(fmt.clone()));
            }
        }
        self.hash_registry().map(|_| ())
    }

    pub fn crypt_salt_format(&self) -> &str {
        self.password_crypt_salt_format
            .as_deref()
            .unwrap_or(DEFAULT_CRYPT_SALT_FORMAT)
    }

    /// Build the scheme registry with the configured active schemes.
    pub fn hash_registry(&self) -> Result<HashSchemeRegistry, ConfigError> {
        let mut registry =
            HashSchemeRegistry::with_crypt(CryptAdapter::default(), self.crypt_salt_format());
        registry.set_active(self.password_hash.as_slice()).map_err(|_| {
            let unknown = self
                .password_hash
                .iter()
                .find(|s| !registry.is_supported(s))
                .cloned()
                .unwrap_or_default();
            ConfigError::UnknownScheme(unknown)
        })?;
        Ok(registry)
    }

    /// Which request fields are accepted.
    pub fn allow(&self) -> PasswdModifyAllow {
        PasswdModifyAllow {
            identity: self.allow_target_identity,
            old_password: self.allow_old_password,
            new_password: self.allow_new_password,
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = ServerConfig::from_toml("").unwrap();
        assert_eq!(config, ServerConfig::default());
        assert!(config.require_authentication);
        assert_eq!(config.allow(), PasswdModifyAllow::default());
        assert_eq!(config.crypt_salt_format(), "$1$%.8s");

        let registry = config.hash_registry().unwrap();
        assert_eq!(
            registry.active_schemes(),
            vec![HashSchemeRegistry::default_scheme()]
        );
    }

    #[test]
    fn test_config_parse() {
        let config = ServerConfig::from_toml(
            r#"
            password_hash = ["{SSHA512}", "{crypt}"]
            require_authentication = false
            allow_old_password = false
            default_referral = ["ldap://primary"]
            log_level = "debug"
            "#,
        )
        .unwrap();

        assert!(!config.require_authentication);
        assert!(!config.allow().old_password);
        assert!(config.allow().identity);
        assert_eq!(config.default_referral, vec!["ldap://primary".to_string()]);
        assert_eq!(config.log_level, Some(LogLevel::Debug));
        assert_eq!(
            config.hash_registry().unwrap().active_schemes(),
            vec!["{SSHA512}", "{CRYPT}"]
        );
    }

    #[test]
    fn test_config_rejects() {
        assert!(matches!(
            ServerConfig::from_toml(r#"password_hash = ["{ROT13}"]"#),
            Err(ConfigError::UnknownScheme(s)) if s == "{ROT13}"
        ));
        assert!(matches!(
            ServerConfig::from_toml("not_an_option = 1"),
            Err(ConfigError::Parse(_))
        ));
        assert!(matches!(
            ServerConfig::from_toml(r#"password_crypt_salt_format = "$1$""#),
            Err(ConfigError::InvalidSaltFormat(_))
        ));
    }

    #[test]
    fn test_config_missing_file() {
        assert!(matches!(
            ServerConfig::new("/nonexistent/pwmodd.toml"),
            Err(ConfigError::Io(_))
        ));
    }
}
