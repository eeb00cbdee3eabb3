// Copyright (c) Microsoft. All rights reserved.

//! Generates X.509 material and JWKS documents for tests. Only compiled
//! with the `tests` feature; unwraps freely.

#![allow(clippy::missing_panics_doc, clippy::must_use_candidate)]

use openssl::asn1::Asn1Time;
use openssl::bn::{BigNum, BigNumContext, MsbOption};
use openssl::ec::{EcGroup, EcKey};
use openssl::hash::MessageDigest;
use openssl::nid::Nid;
use openssl::pkey::{PKey, PKeyRef, Private};
use openssl::rsa::Rsa;
use openssl::x509::extension::{BasicConstraints, KeyUsage, SubjectAlternativeName};
use openssl::x509::{X509NameBuilder, X509Ref, X509};

pub fn ec_key() -> PKey<Private> {
    let group = EcGroup::from_curve_name(Nid::X9_62_PRIME256V1).unwrap();
    let key = EcKey::generate(&group).unwrap();
    PKey::from_ec_key(key).unwrap()
}

pub fn rsa_key() -> PKey<Private> {
    let rsa = Rsa::generate(2048).unwrap();
    PKey::from_rsa(rsa).unwrap()
}

pub struct CertOptions<'a> {
    pub subject_cn: &'a str,
    pub ca: bool,
    pub digital_signature: bool,
    pub key_cert_sign: bool,
    pub crl_sign: bool,
    pub uri_sans: &'a [&'a str],
    pub not_after_days: u32,
}

impl Default for CertOptions<'_> {
    fn default() -> Self {
        CertOptions {
            subject_cn: "test",
            ca: false,
            digital_signature: false,
            key_cert_sign: false,
            crl_sign: false,
            uri_sans: &[],
            not_after_days: 30,
        }
    }
}

/// Issues a certificate for `subject_key`. Self-signed when `issuer` is
/// `None`, otherwise signed by the issuer's key with the issuer's subject
/// as issuer name.
pub fn issue_cert(
    issuer: Option<(&X509Ref, &PKeyRef<Private>)>,
    subject_key: &PKeyRef<Private>,
    options: &CertOptions<'_>,
) -> X509 {
    let mut builder = X509::builder().unwrap();
    builder.set_version(2).unwrap();

    let mut serial = BigNum::new().unwrap();
    serial.rand(64, MsbOption::MAYBE_ZERO, false).unwrap();
    builder
        .set_serial_number(&serial.to_asn1_integer().unwrap())
        .unwrap();

    let mut name = X509NameBuilder::new().unwrap();
    name.append_entry_by_text("CN", options.subject_cn).unwrap();
    let name = name.build();
    builder.set_subject_name(&name).unwrap();

    match issuer {
        Some((issuer_cert, _)) => builder.set_issuer_name(issuer_cert.subject_name()).unwrap(),
        None => builder.set_issuer_name(&name).unwrap(),
    }

    builder.set_pubkey(subject_key).unwrap();
    builder
        .set_not_before(&Asn1Time::days_from_now(0).unwrap())
        .unwrap();
    builder
        .set_not_after(&Asn1Time::days_from_now(options.not_after_days).unwrap())
        .unwrap();

    let mut basic_constraints = BasicConstraints::new();
    basic_constraints.critical();
    if options.ca {
        basic_constraints.ca();
    }
    builder
        .append_extension(basic_constraints.build().unwrap())
        .unwrap();

    if options.digital_signature || options.key_cert_sign || options.crl_sign {
        let mut key_usage = KeyUsage::new();
        key_usage.critical();
        if options.digital_signature {
            key_usage.digital_signature();
        }
        if options.key_cert_sign {
            key_usage.key_cert_sign();
        }
        if options.crl_sign {
            key_usage.crl_sign();
        }
        builder.append_extension(key_usage.build().unwrap()).unwrap();
    }

    if !options.uri_sans.is_empty() {
        let mut san = SubjectAlternativeName::new();
        for uri in options.uri_sans {
            san.uri(uri);
        }
        let san = {
            let ctx = builder.x509v3_context(issuer.map(|(cert, _)| cert), None);
            san.build(&ctx).unwrap()
        };
        builder.append_extension(san).unwrap();
    }

    let signing_key = issuer.map_or(subject_key, |(_, key)| key);
    builder.sign(signing_key, MessageDigest::sha256()).unwrap();

    builder.build()
}

/// Base64url (no padding) as used by JOSE.
pub fn b64url(bytes: &[u8]) -> String {
    base64::encode_config(bytes, base64::URL_SAFE_NO_PAD)
}

/// P-256 public coordinates of an EC private key, padded to 32 octets.
pub fn ec_public_coordinates(key: &PKeyRef<Private>) -> (Vec<u8>, Vec<u8>) {
    let ec = key.ec_key().unwrap();
    let mut ctx = BigNumContext::new().unwrap();
    let mut x = BigNum::new().unwrap();
    let mut y = BigNum::new().unwrap();
    ec.public_key()
        .affine_coordinates_gfp(ec.group(), &mut x, &mut y, &mut ctx)
        .unwrap();
    (x.to_vec_padded(32).unwrap(), y.to_vec_padded(32).unwrap())
}

/// A JWKS document holding the given P-256 keys.
pub fn jwks_document(keys: &[(&str, &PKey<Private>)]) -> String {
    let keys: Vec<_> = keys
        .iter()
        .map(|(kid, key)| {
            let (x, y) = ec_public_coordinates(key);
            serde_json::json!({
                "kty": "EC",
                "kid": kid,
                "crv": "P-256",
                "x": b64url(&x),
                "y": b64url(&y),
            })
        })
        .collect();

    serde_json::json!({ "keys": keys }).to_string()
}
