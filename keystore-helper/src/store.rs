// Copyright (c) Microsoft. All rights reserved.

//! On-disk keystore container. The container format itself is an
//! external concern; this module exposes the `set-key-entry` /
//! `set-certificate-entry` / `load` / `store` surface and backs it with
//! PKCS#12. `store` always rewrites the whole file so readers never
//! observe a partially-updated container.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use openssl::pkcs12::Pkcs12;
use openssl::pkey::{PKey, PKeyRef, Private};
use openssl::stack::Stack;
use openssl::x509::X509;

use crate::error::Error;

pub trait KeyStore: Sized {
    /// Replaces the private-key entry (one per store) with the given
    /// alias, key and chain (leaf first).
    fn set_key_entry(
        &mut self,
        alias: &str,
        key: &PKeyRef<Private>,
        chain: &[X509],
    ) -> Result<(), Error>;

    /// Adds or replaces a trusted-certificate entry.
    fn set_certificate_entry(&mut self, alias: &str, cert: &X509) -> Result<(), Error>;

    /// Aliases of all entries, sorted.
    fn aliases(&self) -> Vec<String>;

    /// Serializes the container and rewrites `path` in full.
    fn store(&self, path: &Path) -> Result<(), Error>;

    fn load(path: &Path, password: &str) -> Result<Self, Error>;
}

struct KeyEntry {
    alias: String,
    key: PKey<Private>,
    chain: Vec<X509>,
}

pub struct Pkcs12KeyStore {
    password: String,
    key_entry: Option<KeyEntry>,
    certificate_entries: BTreeMap<String, X509>,
}

impl Pkcs12KeyStore {
    #[must_use]
    pub fn new(password: &str) -> Self {
        Pkcs12KeyStore {
            password: password.to_string(),
            key_entry: None,
            certificate_entries: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn key_entry_chain(&self) -> Option<&[X509]> {
        self.key_entry.as_ref().map(|entry| entry.chain.as_slice())
    }

    #[must_use]
    pub fn certificate_entries(&self) -> &BTreeMap<String, X509> {
        &self.certificate_entries
    }
}

impl KeyStore for Pkcs12KeyStore {
    fn set_key_entry(
        &mut self,
        alias: &str,
        key: &PKeyRef<Private>,
        chain: &[X509],
    ) -> Result<(), Error> {
        if chain.is_empty() {
            return Err(Error::EmptyChain);
        }

        self.key_entry = Some(KeyEntry {
            // Aliases are case-insensitive; stored lowercased.
            alias: alias.to_lowercase(),
            key: key.to_owned(),
            chain: chain.to_vec(),
        });
        Ok(())
    }

    fn set_certificate_entry(&mut self, alias: &str, cert: &X509) -> Result<(), Error> {
        self.certificate_entries
            .insert(alias.to_lowercase(), cert.clone());
        Ok(())
    }

    fn aliases(&self) -> Vec<String> {
        let mut aliases: Vec<String> = self
            .key_entry
            .iter()
            .map(|entry| entry.alias.clone())
            .chain(self.certificate_entries.keys().cloned())
            .collect();
        aliases.sort();
        aliases
    }

    fn store(&self, path: &Path) -> Result<(), Error> {
        let mut builder = Pkcs12::builder();

        // Extra certificates: the chain above the leaf, then the trusted
        // entries in alias order.
        let mut extra = Stack::new().map_err(Error::KeyStoreBuild)?;

        if let Some(entry) = &self.key_entry {
            builder.name(&entry.alias);
            builder.pkey(&entry.key);
            builder.cert(&entry.chain[0]);
            for cert in &entry.chain[1..] {
                extra.push(cert.clone()).map_err(Error::KeyStoreBuild)?;
            }
        }
        for cert in self.certificate_entries.values() {
            extra.push(cert.clone()).map_err(Error::KeyStoreBuild)?;
        }
        if extra.len() > 0 {
            builder.ca(extra);
        }

        let pkcs12 = builder.build2(&self.password).map_err(Error::KeyStoreBuild)?;
        let der = pkcs12.to_der().map_err(Error::KeyStoreBuild)?;

        fs::write(path, der).map_err(|source| Error::WriteStore {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Reads a container back. Certificates beyond the key entry's leaf
    /// are returned as certificate entries with positional aliases; the
    /// container does not record per-certificate aliases.
    fn load(path: &Path, password: &str) -> Result<Self, Error> {
        let der = fs::read(path).map_err(|source| Error::ReadStore {
            path: path.to_path_buf(),
            source,
        })?;

        let parsed = Pkcs12::from_der(&der)
            .map_err(Error::KeyStoreParse)?
            .parse2(password)
            .map_err(Error::KeyStoreParse)?;

        let mut store = Pkcs12KeyStore::new(password);

        if let (Some(key), Some(cert)) = (parsed.pkey, parsed.cert) {
            store.key_entry = Some(KeyEntry {
                alias: String::new(),
                key,
                chain: vec![cert],
            });
        }

        if let Some(extra) = parsed.ca {
            for (index, cert) in extra.into_iter().enumerate() {
                store.certificate_entries.insert(format!("{index}"), cert);
            }
        }

        Ok(store)
    }
}
