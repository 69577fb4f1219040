//! `$HYVE_HOME/.local/hyve/db.yml` configuration schema.

use std::path::Path;

use fernet::Fernet;
use serde::Deserialize;
use thiserror::Error;

/// Fields longer than this are assumed to be fernet ciphertext rather
/// than a plaintext secret (spec §6).
const CIPHERTEXT_LEN_THRESHOLD: usize = 52;
/// A fernet key, base64-encoded, is always this many bytes (spec §6).
const FERNET_KEY_LEN: usize = 44;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(rename = "DB")]
    pub db: DbConfig,
    #[serde(rename = "HydraRPC")]
    pub hydra_rpc: Endpoint,
    #[serde(rename = "HyDbClient")]
    pub hy_db_client: Endpoint,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Endpoint {
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DbConfig {
    pub url: String,
    #[serde(default)]
    pub wallet: Option<String>,
    pub passphrase: String,
    pub address: String,
    pub privkey: String,
    pub fernet: String,
    #[serde(default)]
    pub debug: bool,
}

/// Wallet-name/passphrase/private-key with ciphertext fields decrypted.
#[derive(Debug, Clone)]
pub struct DecryptedSecrets {
    pub passphrase: String,
    pub privkey: String,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot parse config, reason: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("DB.fernet must decode to a {FERNET_KEY_LEN}-byte key, got {0} bytes")]
    InvalidFernetKeyLen(usize),
    #[error("invalid fernet key: {0}")]
    InvalidFernetKey(String),
    #[error("failed to decrypt {field}: ciphertext is invalid or the fernet key does not match")]
    Decrypt { field: &'static str },
}

impl Config {
    /// Loads and parses the YAML config at `path`. Any missing required
    /// field is a parse failure, surfaced as `Fatal` per spec §7 before
    /// any I/O against the node or the store happens.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path_ref = path.as_ref();
        let contents = std::fs::read_to_string(path_ref).map_err(|source| ConfigError::Io {
            path: path_ref.display().to_string(),
            source,
        })?;
        let config: Config = serde_yaml::from_str(&contents)?;
        config.db.validate_fernet_key()?;
        Ok(config)
    }
}

impl DbConfig {
    fn validate_fernet_key(&self) -> Result<(), ConfigError> {
        if self.fernet.len() != FERNET_KEY_LEN {
            return Err(ConfigError::InvalidFernetKeyLen(self.fernet.len()));
        }
        Fernet::new(&self.fernet).ok_or_else(|| ConfigError::InvalidFernetKey(self.fernet.clone()))?;
        Ok(())
    }

    /// Decrypts `passphrase`/`privkey` in-memory when they look like
    /// ciphertext (longer than 52 characters); otherwise passes them
    /// through as already-plaintext values.
    pub fn decrypt_secrets(&self) -> Result<DecryptedSecrets, ConfigError> {
        let fernet = Fernet::new(&self.fernet)
            .ok_or_else(|| ConfigError::InvalidFernetKey(self.fernet.clone()))?;

        Ok(DecryptedSecrets {
            passphrase: decrypt_field(&fernet, &self.passphrase, "DB.passphrase")?,
            privkey: decrypt_field(&fernet, &self.privkey, "DB.privkey")?,
        })
    }
}

fn decrypt_field(fernet: &Fernet, value: &str, field: &'static str) -> Result<String, ConfigError> {
    if value.len() <= CIPHERTEXT_LEN_THRESHOLD {
        return Ok(value.to_string());
    }
    let decrypted = fernet
        .decrypt(value)
        .map_err(|_| ConfigError::Decrypt { field })?;
    String::from_utf8(decrypted).map_err(|_| ConfigError::Decrypt { field })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn sample_yaml(fernet_key: &str) -> String {
        format!(
            r#"
DB:
  url: "postgres://localhost/hyve"
  passphrase: "short-plaintext"
  address: "TX1abc"
  privkey: "short-plaintext-key"
  fernet: "{fernet_key}"
HydraRPC:
  url: "http://localhost:3389"
HyDbClient:
  url: "http://localhost:8000"
"#
        )
    }

    #[test]
    fn loads_valid_config() {
        let key = Fernet::generate_key();
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(sample_yaml(&key).as_bytes()).unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.db.url, "postgres://localhost/hyve");
        assert_eq!(config.hydra_rpc.url, "http://localhost:3389");
    }

    #[test]
    fn rejects_fernet_key_of_wrong_length() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(sample_yaml("too-short").as_bytes()).unwrap();

        let err = Config::load(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidFernetKeyLen(_)));
    }

    #[test]
    fn passthrough_for_short_secrets_decrypt_for_long_ones() {
        let key = Fernet::generate_key();
        let fernet = Fernet::new(&key).unwrap();
        let ciphertext = fernet.encrypt(b"super-secret-private-key-material");
        assert!(ciphertext.len() > CIPHERTEXT_LEN_THRESHOLD);

        let db = DbConfig {
            url: "postgres://localhost/hyve".into(),
            wallet: None,
            passphrase: "short".into(),
            address: "TX1abc".into(),
            privkey: ciphertext,
            fernet: key,
            debug: false,
        };

        let secrets = db.decrypt_secrets().unwrap();
        assert_eq!(secrets.passphrase, "short");
        assert_eq!(secrets.privkey, "super-secret-private-key-material");
    }

    #[test]
    fn missing_required_field_fails_fast() {
        let yaml = r#"
DB:
  url: "postgres://localhost/hyve"
HydraRPC:
  url: "http://localhost:3389"
HyDbClient:
  url: "http://localhost:8000"
"#;
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(yaml.as_bytes()).unwrap();
        assert!(matches!(Config::load(file.path()), Err(ConfigError::Parse(_))));
    }
}
