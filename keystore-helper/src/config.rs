// Copyright (c) Microsoft. All rights reserved.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::Error;

/// Default configuration path, relative to the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "conf/keystore-helper.toml";

/// Helper configuration. Keys are camelCase in the file
/// (`keyStorePath = "..."`); a missing required key fails the load.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Config {
    pub key_store_path: PathBuf,
    pub key_store_pass: String,
    pub key_pass: String,
    pub trust_store_path: PathBuf,
    pub trust_store_pass: String,
    pub key_store_type: KeyStoreType,
    #[serde(default = "default_key_alias")]
    pub key_alias: String,
    #[serde(default)]
    pub spiffe_socket_path: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyStoreType {
    Jks,
    Pkcs12,
}

fn default_key_alias() -> String {
    "spiffe".to_string()
}

impl Config {
    pub fn load_config(filename: impl AsRef<Path>) -> Result<Config, Error> {
        let raw = fs::read_to_string(&filename).map_err(|source| Error::ReadConfig {
            path: filename.as_ref().to_path_buf(),
            source,
        })?;

        let config: Config = toml::from_str(&raw).map_err(Error::ParseConfig)?;
        config.validate()?;

        Ok(config)
    }

    fn validate(&self) -> Result<(), Error> {
        if self.key_store_path == self.trust_store_path {
            return Err(Error::SameStoreFile);
        }

        // JKS is a Java-proprietary container; only PKCS#12 is produced.
        if self.key_store_type == KeyStoreType::Jks {
            return Err(Error::UnsupportedKeyStoreType(self.key_store_type));
        }

        // A PKCS#12 container carries one password; entry and store
        // passwords cannot differ.
        if self.key_pass != self.key_store_pass {
            return Err(Error::KeyPassMismatch);
        }

        Ok(())
    }
}
