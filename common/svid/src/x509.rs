// Copyright (c) Microsoft. All rights reserved.

use core_objects::SpiffeId;
use openssl::hash::MessageDigest;
use openssl::pkey::{Id, PKey, Private};
use openssl::sign::{Signer, Verifier};
use openssl::x509::{X509Ref, X509};
use x509_parser::prelude::GeneralName;

use bundles::cert;

use crate::error::X509SvidError;

const KEY_MATCH_CHALLENGE_LEN: usize = 100;

/// An X.509 SVID: SPIFFE ID, certificate chain (leaf first) and the
/// leaf's private key. All document invariants are enforced by [`parse`],
/// after which the value is immutable.
///
/// [`parse`]: X509Svid::parse
#[derive(Clone)]
pub struct X509Svid {
    spiffe_id: SpiffeId,
    chain: Vec<X509>,
    private_key: PKey<Private>,
}

impl X509Svid {
    /// Parses an SVID from a certificate chain (PEM or concatenated DER,
    /// leaf first) and a private key (PKCS#8 DER or PEM, EC or RSA).
    pub fn parse(cert_bytes: &[u8], key_bytes: &[u8]) -> Result<Self, X509SvidError> {
        let chain = cert::parse_certificates(cert_bytes).map_err(X509SvidError::ChainParse)?;

        let private_key = parse_private_key(key_bytes)?;

        let leaf = &chain[0];
        let spiffe_id = spiffe_id_from_cert(leaf)?;
        check_leaf(leaf)?;
        for signing_cert in &chain[1..] {
            check_signing_cert(signing_cert)?;
        }

        check_key_match(leaf, &private_key)?;

        Ok(X509Svid {
            spiffe_id,
            chain,
            private_key,
        })
    }

    #[must_use]
    pub fn spiffe_id(&self) -> &SpiffeId {
        &self.spiffe_id
    }

    /// The full chain, leaf first.
    #[must_use]
    pub fn cert_chain(&self) -> &[X509] {
        &self.chain
    }

    #[must_use]
    pub fn leaf(&self) -> &X509 {
        &self.chain[0]
    }

    #[must_use]
    pub fn private_key(&self) -> &PKey<Private> {
        &self.private_key
    }
}

impl PartialEq for X509Svid {
    fn eq(&self, other: &Self) -> bool {
        if self.spiffe_id != other.spiffe_id || self.chain.len() != other.chain.len() {
            return false;
        }

        let ders = |chain: &[X509]| -> Option<Vec<Vec<u8>>> {
            chain.iter().map(|cert| cert.to_der().ok()).collect()
        };

        match (
            ders(&self.chain),
            ders(&other.chain),
            self.private_key.private_key_to_pkcs8().ok(),
            other.private_key.private_key_to_pkcs8().ok(),
        ) {
            (Some(a), Some(b), Some(ka), Some(kb)) => a == b && ka == kb,
            _ => false,
        }
    }
}

/// Extracts the single SPIFFE URI SAN of a certificate. Exactly one URI
/// SAN is required.
pub fn spiffe_id_from_cert(cert: &X509Ref) -> Result<SpiffeId, X509SvidError> {
    let der = cert
        .to_der()
        .map_err(|err| X509SvidError::CertIntrospection(err.to_string()))?;
    let (_, parsed) = x509_parser::parse_x509_certificate(&der)
        .map_err(|err| X509SvidError::CertIntrospection(err.to_string()))?;

    let san = parsed
        .subject_alternative_name()
        .map_err(|err| X509SvidError::CertIntrospection(err.to_string()))?;

    let uris: Vec<&str> = san
        .map(|ext| {
            ext.value
                .general_names
                .iter()
                .filter_map(|name| match name {
                    GeneralName::URI(uri) => Some(*uri),
                    _ => None,
                })
                .collect()
        })
        .unwrap_or_default();

    match uris.as_slice() {
        [] => Err(X509SvidError::MissingSpiffeId),
        [uri] => SpiffeId::parse(uri).map_err(X509SvidError::SpiffeId),
        _ => Err(X509SvidError::MultipleSpiffeIds),
    }
}

fn parse_private_key(key_bytes: &[u8]) -> Result<PKey<Private>, X509SvidError> {
    let key = if key_bytes.starts_with(b"-----BEGIN") {
        PKey::private_key_from_pem(key_bytes)
    } else {
        PKey::private_key_from_pkcs8(key_bytes)
    }
    .map_err(X509SvidError::PrivateKeyParse)?;

    match key.id() {
        Id::EC | Id::RSA => Ok(key),
        _ => Err(X509SvidError::PrivateKeyTypeNotSupported),
    }
}

struct CertFacts {
    ca: bool,
    digital_signature: bool,
    key_cert_sign: bool,
    crl_sign: bool,
}

fn cert_facts(cert: &X509Ref) -> Result<CertFacts, X509SvidError> {
    let der = cert
        .to_der()
        .map_err(|err| X509SvidError::CertIntrospection(err.to_string()))?;
    let (_, parsed) = x509_parser::parse_x509_certificate(&der)
        .map_err(|err| X509SvidError::CertIntrospection(err.to_string()))?;

    let ca = parsed
        .basic_constraints()
        .map_err(|err| X509SvidError::CertIntrospection(err.to_string()))?
        .map_or(false, |ext| ext.value.ca);

    let key_usage = parsed
        .key_usage()
        .map_err(|err| X509SvidError::CertIntrospection(err.to_string()))?;

    let (digital_signature, key_cert_sign, crl_sign) = match &key_usage {
        Some(ext) => (
            ext.value.digital_signature(),
            ext.value.key_cert_sign(),
            ext.value.crl_sign(),
        ),
        None => (false, false, false),
    };

    Ok(CertFacts {
        ca,
        digital_signature,
        key_cert_sign,
        crl_sign,
    })
}

fn check_leaf(leaf: &X509Ref) -> Result<(), X509SvidError> {
    let facts = cert_facts(leaf)?;

    if facts.ca {
        return Err(X509SvidError::LeafIsCa);
    }
    if !facts.digital_signature {
        return Err(X509SvidError::LeafMissingDigitalSignature);
    }
    if facts.key_cert_sign {
        return Err(X509SvidError::LeafHasKeyCertSign);
    }
    if facts.crl_sign {
        return Err(X509SvidError::LeafHasCrlSign);
    }

    Ok(())
}

fn check_signing_cert(cert: &X509Ref) -> Result<(), X509SvidError> {
    let facts = cert_facts(cert)?;

    if !facts.ca {
        return Err(X509SvidError::SigningCertNotCa);
    }
    if !facts.key_cert_sign {
        return Err(X509SvidError::SigningCertMissingKeyCertSign);
    }

    Ok(())
}

/// Proves the private key belongs to the leaf by signing a fresh random
/// challenge and verifying with the leaf public key (SHA-512, ECDSA or
/// RSA according to the key type).
fn check_key_match(leaf: &X509Ref, private_key: &PKey<Private>) -> Result<(), X509SvidError> {
    let mut challenge = [0_u8; KEY_MATCH_CHALLENGE_LEN];
    openssl::rand::rand_bytes(&mut challenge).map_err(X509SvidError::KeyChallenge)?;

    let signature = Signer::new(MessageDigest::sha512(), private_key)
        .and_then(|mut signer| signer.sign_oneshot_to_vec(&challenge))
        .map_err(X509SvidError::KeyChallenge)?;

    let leaf_public = leaf.public_key().map_err(X509SvidError::KeyChallenge)?;
    let verified = Verifier::new(MessageDigest::sha512(), &leaf_public)
        .and_then(|mut verifier| verifier.verify_oneshot(&signature, &challenge))
        .unwrap_or(false);

    if verified {
        Ok(())
    } else {
        Err(X509SvidError::KeyMismatch)
    }
}
