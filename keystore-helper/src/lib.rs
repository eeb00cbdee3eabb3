// Copyright (c) Microsoft. All rights reserved.

#![deny(rust_2018_idioms)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(
    clippy::default_trait_access,
    clippy::let_unit_value,
    clippy::missing_errors_doc,
    clippy::similar_names,
    clippy::too_many_lines
)]

//! Supervisor that owns an X.509 source and mirrors its rotating
//! materials into two PKCS#12 files: a keystore holding the leaf key and
//! chain under a single alias, and a truststore holding every trust
//! domain's authorities aliased `<trust-domain>.<n>`.

pub mod config;
mod error;
pub mod store;

use log::{info, warn};

use bundles::X509BundleSet;
use svid::X509Svid;
use svid_source::{X509Source, X509SourceConfig};

pub use crate::config::{Config, KeyStoreType, DEFAULT_CONFIG_PATH};
pub use crate::error::Error;
pub use crate::store::{KeyStore, Pkcs12KeyStore};

/// Builds an X.509 source from the configuration and rewrites both store
/// files on startup and after every identity rotation. Runs until the
/// Workload API watch terminates.
pub async fn run(config: Config) -> Result<(), Error> {
    let source = X509Source::new(X509SourceConfig {
        endpoint: config.spiffe_socket_path.clone(),
        ..Default::default()
    })
    .await
    .map_err(Error::Source)?;

    let result = run_with_source(&config, &source).await;
    source.close().await;
    result
}

async fn run_with_source(config: &Config, source: &X509Source) -> Result<(), Error> {
    let mut updates = source.updates();

    loop {
        persist_identity(config, source).await?;
        info!(
            "Stored identity materials to {} and {}",
            config.key_store_path.display(),
            config.trust_store_path.display()
        );

        if updates.changed().await.is_err() {
            warn!("Workload API updates terminated, keeping last stored materials");
            return Err(Error::UpdatesTerminated);
        }
    }
}

/// Takes the source's current snapshot and rewrites both files.
pub async fn persist_identity(config: &Config, source: &X509Source) -> Result<(), Error> {
    let svid = source.x509_svid().await.map_err(Error::Source)?;
    let bundles = source.bundle_set().await.map_err(Error::Source)?;

    write_key_store(config, &svid)?;
    write_trust_store(config, &bundles)?;

    Ok(())
}

pub fn write_key_store(config: &Config, svid: &X509Svid) -> Result<(), Error> {
    let mut store = Pkcs12KeyStore::new(&config.key_store_pass);
    store.set_key_entry(&config.key_alias, svid.private_key(), svid.cert_chain())?;
    store.store(&config.key_store_path)
}

/// One entry per authority, aliased `<trust-domain>.<n>` with `n`
/// counting from 0 in authority order; trust domains are written in
/// sorted order so the alias mapping is a function of the bundle set.
pub fn write_trust_store(config: &Config, bundles: &X509BundleSet) -> Result<(), Error> {
    let mut store = Pkcs12KeyStore::new(&config.trust_store_pass);

    for trust_domain in bundles.trust_domains() {
        let bundle = bundles.get_bundle_for_trust_domain(&trust_domain)?;
        for (index, authority) in bundle.authorities().iter().enumerate() {
            store.set_certificate_entry(&format!("{trust_domain}.{index}"), authority)?;
        }
    }

    store.store(&config.trust_store_path)
}
