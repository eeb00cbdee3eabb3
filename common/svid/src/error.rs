// Copyright (c) Microsoft. All rights reserved.

use thiserror::Error;

use bundles::cert::CertParseError;

#[derive(Error, Debug)]
pub enum X509SvidError {
    #[error("Error parsing certificate chain: {0}")]
    ChainParse(#[source] CertParseError),
    #[error("Error parsing private key: {0}")]
    PrivateKeyParse(#[source] openssl::error::ErrorStack),
    #[error("private key type not supported")]
    PrivateKeyTypeNotSupported,
    #[error("Error introspecting certificate: {0}")]
    CertIntrospection(String),
    #[error("no SPIFFE ID found in the leaf certificate")]
    MissingSpiffeId,
    #[error("the leaf certificate contains more than one SPIFFE ID")]
    MultipleSpiffeIds,
    #[error("Error parsing SPIFFE ID from the leaf certificate: {0}")]
    SpiffeId(#[source] core_objects::Error),
    #[error("the leaf certificate must not have the CA flag set")]
    LeafIsCa,
    #[error("the leaf certificate must have 'digitalSignature' as key usage")]
    LeafMissingDigitalSignature,
    #[error("the leaf certificate must not have 'keyCertSign' as key usage")]
    LeafHasKeyCertSign,
    #[error("the leaf certificate must not have 'cRLSign' as key usage")]
    LeafHasCrlSign,
    #[error("signing certificate must have the CA flag set")]
    SigningCertNotCa,
    #[error("signing certificate must have 'keyCertSign' as key usage")]
    SigningCertMissingKeyCertSign,
    #[error("the private key does not match the leaf certificate public key")]
    KeyMismatch,
    #[error("Error verifying that the private key matches the certificate: {0}")]
    KeyChallenge(#[source] openssl::error::ErrorStack),
}

#[derive(Error, Debug)]
pub enum JwtSvidError {
    #[error("token is not a JWS compact serialization: found {0} segments")]
    InvalidCompactEncoding(usize),
    #[error("Error decoding token segment: {0}")]
    SegmentDecode(#[source] base64::DecodeError),
    #[error("Error deserializing token JSON: {0}")]
    DeserializeJson(#[source] serde_json::Error),
    #[error("token header 'typ' must be 'JWT' or 'JOSE', found {0:?}")]
    InvalidTyp(String),
    #[error("token header is missing the key ID")]
    MissingKeyId,
    #[error("token is missing the 'sub' claim")]
    MissingSubject,
    #[error("token 'sub' claim is not a valid SPIFFE ID: {0}")]
    InvalidSubject(#[source] core_objects::Error),
    #[error("token is missing the 'exp' claim")]
    MissingExpiry,
    #[error("token claim {0:?} has an unexpected type")]
    InvalidClaim(&'static str),
    #[error("token has expired: expiry {expiry}, current time {current}")]
    Expired { expiry: u64, current: u64 },
    #[error("expected audience {expected:?} is not in the token audience {found:?}")]
    AudienceMismatch {
        expected: Vec<String>,
        found: Vec<String>,
    },
    #[error(transparent)]
    Bundle(#[from] bundles::Error),
    #[error("token algorithm not supported: {0}")]
    UnsupportedAlgorithm(String),
    #[error("Error verifying token signature: {0}")]
    SignatureVerify(#[source] openssl::error::ErrorStack),
    #[error("token signature is invalid")]
    InvalidSignature,
}
