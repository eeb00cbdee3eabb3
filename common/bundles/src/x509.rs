// Copyright (c) Microsoft. All rights reserved.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;

use core_objects::TrustDomain;
use openssl::x509::{X509Ref, X509};

use crate::cert;
use crate::error::Error;

/// The X.509 trust anchors of one trust domain.
#[derive(Clone)]
pub struct X509Bundle {
    trust_domain: TrustDomain,
    authorities: Vec<X509>,
    der_index: HashSet<Vec<u8>>,
}

impl X509Bundle {
    #[must_use]
    pub fn new(trust_domain: TrustDomain) -> Self {
        X509Bundle {
            trust_domain,
            authorities: Vec::new(),
            der_index: HashSet::new(),
        }
    }

    /// Decodes a bundle from a PEM or concatenated-DER certificate
    /// sequence. At least one certificate is required.
    pub fn parse(trust_domain: TrustDomain, bytes: &[u8]) -> Result<Self, Error> {
        let certs = cert::parse_certificates(bytes).map_err(Error::X509BundleParse)?;

        let mut bundle = X509Bundle::new(trust_domain);
        for cert in certs {
            bundle.add_authority(cert)?;
        }
        Ok(bundle)
    }

    pub fn load(trust_domain: TrustDomain, path: impl AsRef<Path>) -> Result<Self, Error> {
        let bytes = fs::read(&path).map_err(|source| Error::FileRead {
            path: path.as_ref().to_path_buf(),
            source,
        })?;
        Self::parse(trust_domain, &bytes)
    }

    pub fn add_authority(&mut self, authority: X509) -> Result<(), Error> {
        let der = authority.to_der().map_err(Error::CertificateEncode)?;
        if self.der_index.insert(der) {
            self.authorities.push(authority);
        }
        Ok(())
    }

    pub fn remove_authority(&mut self, authority: &X509Ref) -> Result<(), Error> {
        let der = authority.to_der().map_err(Error::CertificateEncode)?;
        if self.der_index.remove(&der) {
            self.authorities.retain(|cert| {
                cert.to_der().map_or(true, |existing| existing != der)
            });
        }
        Ok(())
    }

    pub fn has_authority(&self, authority: &X509Ref) -> Result<bool, Error> {
        let der = authority.to_der().map_err(Error::CertificateEncode)?;
        Ok(self.der_index.contains(&der))
    }

    #[must_use]
    pub fn trust_domain(&self) -> &TrustDomain {
        &self.trust_domain
    }

    #[must_use]
    pub fn authorities(&self) -> &[X509] {
        &self.authorities
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.authorities.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.authorities.is_empty()
    }

    /// DER of every authority, in insertion order. The encoded set is the
    /// bundle's canonical content representation.
    pub fn to_der_blocks(&self) -> Result<Vec<Vec<u8>>, Error> {
        self.authorities
            .iter()
            .map(|cert| cert.to_der().map_err(Error::CertificateEncode))
            .collect()
    }
}

impl PartialEq for X509Bundle {
    fn eq(&self, other: &Self) -> bool {
        self.trust_domain == other.trust_domain && self.der_index == other.der_index
    }
}

/// Trust-domain-keyed collection of [`X509Bundle`]s.
#[derive(Clone, Default)]
pub struct X509BundleSet {
    bundles: HashMap<TrustDomain, X509Bundle>,
}

impl X509BundleSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Collects bundles, deduplicating by trust domain; the last bundle
    /// for a given trust domain wins.
    #[must_use]
    pub fn of(bundles: Vec<X509Bundle>) -> Self {
        let mut set = Self::new();
        for bundle in bundles {
            set.put(bundle);
        }
        set
    }

    pub fn put(&mut self, bundle: X509Bundle) {
        self.bundles.insert(bundle.trust_domain().clone(), bundle);
    }

    pub fn get_bundle_for_trust_domain(
        &self,
        trust_domain: &TrustDomain,
    ) -> Result<&X509Bundle, Error> {
        self.bundles
            .get(trust_domain)
            .ok_or_else(|| Error::BundleNotFound(trust_domain.clone()))
    }

    #[must_use]
    pub fn has_bundle_for_trust_domain(&self, trust_domain: &TrustDomain) -> bool {
        self.bundles.contains_key(trust_domain)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&TrustDomain, &X509Bundle)> {
        self.bundles.iter()
    }

    /// Trust domains in the set, sorted for deterministic iteration.
    #[must_use]
    pub fn trust_domains(&self) -> Vec<TrustDomain> {
        let mut domains: Vec<_> = self.bundles.keys().cloned().collect();
        domains.sort();
        domains
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.bundles.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bundles.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use crate::test_util::{ec_key, issue_cert, CertOptions};

    use super::*;

    fn trust_domain(name: &str) -> TrustDomain {
        TrustDomain::parse(name).unwrap()
    }

    fn self_signed_ca(cn: &str) -> X509 {
        let key = ec_key();
        issue_cert(
            None,
            &key,
            &CertOptions {
                subject_cn: cn,
                ca: true,
                key_cert_sign: true,
                ..Default::default()
            },
        )
    }

    #[test]
    fn parse_der_sequence() {
        let ca_a = self_signed_ca("root-a");
        let ca_b = self_signed_ca("root-b");

        let mut bytes = ca_a.to_der().unwrap();
        bytes.extend(ca_b.to_der().unwrap());

        let bundle = X509Bundle::parse(trust_domain("example.org"), &bytes).unwrap();
        assert_eq!(bundle.len(), 2);
        assert!(bundle.has_authority(&ca_a).unwrap());
        assert!(bundle.has_authority(&ca_b).unwrap());
    }

    #[test]
    fn parse_pem_document() {
        let ca = self_signed_ca("root");
        let pem = ca.to_pem().unwrap();

        let bundle = X509Bundle::parse(trust_domain("example.org"), &pem).unwrap();
        assert_eq!(bundle.len(), 1);
    }

    #[test]
    fn parse_rejects_empty_input() {
        let error = X509Bundle::parse(trust_domain("example.org"), b"").unwrap_err();
        assert_matches!(error, Error::X509BundleParse(_));
    }

    #[test]
    fn parse_rejects_garbage() {
        let error =
            X509Bundle::parse(trust_domain("example.org"), b"not a certificate").unwrap_err();
        assert_matches!(error, Error::X509BundleParse(_));
    }

    #[test]
    fn parse_preserves_certificate_set_on_reencode() {
        let ca_a = self_signed_ca("root-a");
        let ca_b = self_signed_ca("root-b");

        let mut bytes = ca_a.to_der().unwrap();
        bytes.extend(ca_b.to_der().unwrap());

        let bundle = X509Bundle::parse(trust_domain("example.org"), &bytes).unwrap();
        let blocks = bundle.to_der_blocks().unwrap();
        assert_eq!(blocks, vec![ca_a.to_der().unwrap(), ca_b.to_der().unwrap()]);
    }

    #[test]
    fn add_and_remove_authority() {
        let ca_a = self_signed_ca("root-a");
        let ca_b = self_signed_ca("root-b");

        let mut bundle = X509Bundle::new(trust_domain("example.org"));
        bundle.add_authority(ca_a.clone()).unwrap();
        bundle.add_authority(ca_b.clone()).unwrap();
        // Re-adding the same certificate is a no-op.
        bundle.add_authority(ca_a.clone()).unwrap();
        assert_eq!(bundle.len(), 2);

        bundle.remove_authority(&ca_a).unwrap();
        assert_eq!(bundle.len(), 1);
        assert!(!bundle.has_authority(&ca_a).unwrap());
        assert!(bundle.has_authority(&ca_b).unwrap());
    }

    #[test]
    fn set_deduplicates_by_trust_domain_last_wins() {
        let ca_a = self_signed_ca("root-a");
        let ca_b = self_signed_ca("root-b");

        let mut first = X509Bundle::new(trust_domain("example.org"));
        first.add_authority(ca_a).unwrap();
        let mut second = X509Bundle::new(trust_domain("example.org"));
        second.add_authority(ca_b.clone()).unwrap();

        let set = X509BundleSet::of(vec![first, second.clone()]);
        assert_eq!(set.len(), 1);
        let found = set
            .get_bundle_for_trust_domain(&trust_domain("example.org"))
            .unwrap();
        assert_eq!(found, &second);
    }

    #[test]
    fn set_lookup_miss_is_bundle_not_found() {
        let set = X509BundleSet::new();
        let error = set
            .get_bundle_for_trust_domain(&trust_domain("missing.org"))
            .unwrap_err();
        assert_matches!(error, Error::BundleNotFound(td) if td.name() == "missing.org");
    }
}
