// Copyright (c) Microsoft. All rights reserved.

use std::io;
use std::path::PathBuf;

use core_objects::TrustDomain;
use thiserror::Error;

use crate::cert::CertParseError;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Error reading bundle file {path}: {source}")]
    FileRead { path: PathBuf, source: io::Error },
    #[error("Error parsing X.509 bundle: {0}")]
    X509BundleParse(#[source] CertParseError),
    #[error("Error encoding certificate: {0}")]
    CertificateEncode(#[source] openssl::error::ErrorStack),
    #[error("Error parsing JWKS document: {0}")]
    JwtBundleParse(#[source] serde_json::Error),
    #[error("Error adding authority of JWKS: keyID cannot be empty")]
    EmptyKeyId,
    #[error("Key type not supported: {0}")]
    UnsupportedKeyType(String),
    #[error("EC curve not supported: {0}")]
    UnsupportedCurve(String),
    #[error("JWKS entry {kid} is missing the {param} parameter")]
    MissingKeyParameter { kid: String, param: &'static str },
    #[error("Error decoding JWKS key parameter of entry {kid}: {source}")]
    KeyParameterDecode { kid: String, source: base64::DecodeError },
    #[error("Error building public key for JWKS entry {kid}: {source}")]
    AuthorityKeyBuild {
        kid: String,
        source: openssl::error::ErrorStack,
    },
    #[error("No bundle found for trust domain {0}")]
    BundleNotFound(TrustDomain),
    #[error("No authority found for key ID {0}")]
    AuthorityNotFound(String),
}
