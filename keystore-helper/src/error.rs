// Copyright (c) Microsoft. All rights reserved.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::config::KeyStoreType;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Error reading configuration file {path}: {source}")]
    ReadConfig { path: PathBuf, source: io::Error },
    #[error("Error parsing configuration: {0}")]
    ParseConfig(#[source] toml::de::Error),
    #[error("keyStorePath and trustStorePath must be different files")]
    SameStoreFile,
    #[error("key store type {0:?} is not supported, use pkcs12")]
    UnsupportedKeyStoreType(KeyStoreType),
    #[error("keyPass must match keyStorePass for pkcs12 key stores")]
    KeyPassMismatch,
    #[error("key entry requires a non-empty certificate chain")]
    EmptyChain,
    #[error("Error building keystore: {0}")]
    KeyStoreBuild(#[source] openssl::error::ErrorStack),
    #[error("Error writing keystore file {path}: {source}")]
    WriteStore { path: PathBuf, source: io::Error },
    #[error("Error reading keystore file {path}: {source}")]
    ReadStore { path: PathBuf, source: io::Error },
    #[error("Error parsing keystore file: {0}")]
    KeyStoreParse(#[source] openssl::error::ErrorStack),
    #[error(transparent)]
    Bundle(#[from] bundles::Error),
    #[error("Error from identity source: {0}")]
    Source(#[source] svid_source::Error),
    #[error("Workload API updates terminated")]
    UpdatesTerminated,
}
