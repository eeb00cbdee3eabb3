// Copyright (c) Microsoft. All rights reserved.

//! Certificate sequence decoding shared by bundles and SVIDs. Accepts
//! either a PEM document or a concatenated ASN.1 DER sequence (leaf or
//! first authority first).

use openssl::x509::X509;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CertParseError {
    #[error("input contains no certificates")]
    Empty,
    #[error("malformed DER certificate at offset {0}")]
    MalformedDer(usize),
    #[error("malformed PEM certificate document: {0}")]
    MalformedPem(#[source] openssl::error::ErrorStack),
    #[error("certificate rejected at offset {offset}: {source}")]
    Rejected {
        offset: usize,
        source: openssl::error::ErrorStack,
    },
}

/// Decodes one or more certificates from `bytes`, sniffing PEM by its
/// armor header and treating everything else as concatenated DER.
pub fn parse_certificates(bytes: &[u8]) -> Result<Vec<X509>, CertParseError> {
    if looks_like_pem(bytes) {
        parse_pem_certificates(bytes)
    } else {
        parse_der_certificates(bytes)
    }
}

pub fn parse_pem_certificates(bytes: &[u8]) -> Result<Vec<X509>, CertParseError> {
    let certs = X509::stack_from_pem(bytes).map_err(CertParseError::MalformedPem)?;
    if certs.is_empty() {
        return Err(CertParseError::Empty);
    }
    Ok(certs)
}

/// Splits a concatenated DER sequence by letting the parser report the
/// unconsumed remainder after each certificate.
pub fn parse_der_certificates(bytes: &[u8]) -> Result<Vec<X509>, CertParseError> {
    let mut certs = Vec::new();
    let mut input = bytes;

    while !input.is_empty() {
        let offset = bytes.len() - input.len();
        let (rest, _) = x509_parser::parse_x509_certificate(input)
            .map_err(|_| CertParseError::MalformedDer(offset))?;
        let consumed = input.len() - rest.len();
        let cert = X509::from_der(&input[..consumed])
            .map_err(|source| CertParseError::Rejected { offset, source })?;
        certs.push(cert);
        input = rest;
    }

    if certs.is_empty() {
        return Err(CertParseError::Empty);
    }

    Ok(certs)
}

fn looks_like_pem(bytes: &[u8]) -> bool {
    // Tolerate leading whitespace before the armor header.
    let start = bytes
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(0);
    bytes[start..].starts_with(b"-----BEGIN")
}
