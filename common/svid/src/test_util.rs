// Copyright (c) Microsoft. All rights reserved.

//! SVID material and JWT token generation for tests. Only compiled with
//! the `tests` feature; unwraps freely.

#![allow(clippy::missing_panics_doc, clippy::must_use_candidate)]

use openssl::ecdsa::EcdsaSig;
use openssl::pkey::{PKey, Private};
use openssl::sha::sha256;
use openssl::x509::X509;
use serde_json::Value;

pub use bundles::test_util::{b64url, ec_key, issue_cert, jwks_document, rsa_key, CertOptions};

/// A root → intermediate → leaf chain with a SPIFFE leaf, plus the wire
/// encodings the Workload API would deliver.
pub struct SvidMaterials {
    pub root: X509,
    pub root_key: PKey<Private>,
    pub intermediate: X509,
    pub intermediate_key: PKey<Private>,
    pub leaf: X509,
    pub leaf_key: PKey<Private>,
    /// Concatenated DER, leaf first.
    pub chain_der: Vec<u8>,
    /// PKCS#8 DER of the leaf key.
    pub key_der: Vec<u8>,
}

impl SvidMaterials {
    pub fn generate(spiffe_id: &str) -> Self {
        let root_key = ec_key();
        let root = issue_cert(
            None,
            &root_key,
            &CertOptions {
                subject_cn: "root",
                ca: true,
                key_cert_sign: true,
                crl_sign: true,
                ..Default::default()
            },
        );

        let intermediate_key = ec_key();
        let intermediate = issue_cert(
            Some((&root, &root_key)),
            &intermediate_key,
            &CertOptions {
                subject_cn: "intermediate",
                ca: true,
                key_cert_sign: true,
                ..Default::default()
            },
        );

        let leaf_key = ec_key();
        let leaf = issue_cert(
            Some((&intermediate, &intermediate_key)),
            &leaf_key,
            &CertOptions {
                subject_cn: "leaf",
                digital_signature: true,
                uri_sans: &[spiffe_id],
                ..Default::default()
            },
        );

        let mut chain_der = leaf.to_der().unwrap();
        chain_der.extend(intermediate.to_der().unwrap());
        let key_der = leaf_key.private_key_to_pkcs8().unwrap();

        SvidMaterials {
            root,
            root_key,
            intermediate,
            intermediate_key,
            leaf,
            leaf_key,
            chain_der,
            key_der,
        }
    }

    /// The authorities a bundle for this chain's trust domain would hold.
    pub fn root_bundle_der(&self) -> Vec<u8> {
        self.root.to_der().unwrap()
    }
}

/// Standard SPIFFE JWT claims.
pub fn jwt_claims(sub: &str, aud: &[&str], exp: u64) -> Value {
    serde_json::json!({
        "sub": sub,
        "aud": aud,
        "exp": exp,
        "iat": 0,
    })
}

/// Signs `claims` as an ES256 JWS compact token with the given P-256 key.
pub fn jwt_es256(key: &PKey<Private>, kid: &str, claims: &Value) -> String {
    let header = serde_json::json!({ "alg": "ES256", "kid": kid, "typ": "JWT" });
    let signing_input = format!(
        "{}.{}",
        b64url(header.to_string().as_bytes()),
        b64url(claims.to_string().as_bytes())
    );

    let digest = sha256(signing_input.as_bytes());
    let ec = key.ec_key().unwrap();
    let signature = EcdsaSig::sign(&digest, &ec).unwrap();

    let mut raw = signature.r().to_vec_padded(32).unwrap();
    raw.extend(signature.s().to_vec_padded(32).unwrap());

    format!("{signing_input}.{}", b64url(&raw))
}

/// Assembles a token with an arbitrary header and signature; for tests
/// that need malformed or unsupported tokens.
pub fn jwt_with_header(header: &Value, claims: &Value, signature: &[u8]) -> String {
    format!(
        "{}.{}.{}",
        b64url(header.to_string().as_bytes()),
        b64url(claims.to_string().as_bytes()),
        b64url(signature)
    )
}
