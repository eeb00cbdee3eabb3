// Copyright (c) Microsoft. All rights reserved.

use core_objects::{get_epoch_time, SpiffeId};
use openssl::bn::BigNum;
use openssl::ecdsa::EcdsaSig;
use openssl::hash::{hash, MessageDigest};
use openssl::pkey::{PKey, Public};
use openssl::sign::Verifier;
use serde::Deserialize;
use serde_json::{Map, Value};

use bundles::JwtBundleSet;

use crate::error::JwtSvidError;

#[derive(Debug, Clone, Deserialize)]
struct JoseHeader {
    alg: String,
    #[serde(default)]
    kid: Option<String>,
    #[serde(default)]
    typ: Option<String>,
}

/// A JWT SVID: the parsed subject, audiences and expiry of a JWS compact
/// token, plus the raw token and the full claims mapping.
#[derive(Clone, Debug, PartialEq)]
pub struct JwtSvid {
    spiffe_id: SpiffeId,
    audience: Vec<String>,
    expiry: u64,
    issued_at: Option<u64>,
    claims: Map<String, Value>,
    token: String,
}

impl JwtSvid {
    /// Decodes the token, checks its claims (subject, expiry, audience)
    /// and verifies the signature against the JWT authority selected by
    /// the token's `kid` from the subject trust domain's bundle.
    pub fn parse_and_validate<A: AsRef<str>>(
        token: &str,
        expected_audiences: &[A],
        bundles: &JwtBundleSet,
    ) -> Result<Self, JwtSvidError> {
        let decoded = decode(token)?;
        let svid = build_from_claims(token, &decoded, expected_audiences, get_epoch_time())?;

        let kid = decoded
            .header
            .kid
            .as_deref()
            .filter(|kid| !kid.is_empty())
            .ok_or(JwtSvidError::MissingKeyId)?;

        let bundle = bundles.get_bundle_for_trust_domain(svid.spiffe_id.trust_domain())?;
        let authority = bundle.find_jwt_authority(kid)?;

        verify_signature(
            &decoded.header.alg,
            authority,
            decoded.signing_input.as_bytes(),
            &decoded.signature,
        )?;

        Ok(svid)
    }

    /// Decodes the token and checks its claims without verifying the
    /// signature. Used for tokens the Workload API itself issued or
    /// already validated.
    pub fn parse_insecure<A: AsRef<str>>(
        token: &str,
        expected_audiences: &[A],
    ) -> Result<Self, JwtSvidError> {
        let decoded = decode(token)?;
        build_from_claims(token, &decoded, expected_audiences, get_epoch_time())
    }

    #[must_use]
    pub fn spiffe_id(&self) -> &SpiffeId {
        &self.spiffe_id
    }

    #[must_use]
    pub fn audience(&self) -> &[String] {
        &self.audience
    }

    /// Expiry as seconds since the Unix epoch.
    #[must_use]
    pub fn expiry(&self) -> u64 {
        self.expiry
    }

    #[must_use]
    pub fn issued_at(&self) -> Option<u64> {
        self.issued_at
    }

    #[must_use]
    pub fn claims(&self) -> &Map<String, Value> {
        &self.claims
    }

    #[must_use]
    pub fn token(&self) -> &str {
        &self.token
    }
}

struct DecodedToken {
    header: JoseHeader,
    claims: Map<String, Value>,
    signing_input: String,
    signature: Vec<u8>,
}

fn decode(token: &str) -> Result<DecodedToken, JwtSvidError> {
    let segments: Vec<&str> = token.split('.').collect();
    if segments.len() != 3 {
        return Err(JwtSvidError::InvalidCompactEncoding(segments.len()));
    }

    let header_bytes = base64::decode_config(segments[0], base64::URL_SAFE_NO_PAD)
        .map_err(JwtSvidError::SegmentDecode)?;
    let claims_bytes = base64::decode_config(segments[1], base64::URL_SAFE_NO_PAD)
        .map_err(JwtSvidError::SegmentDecode)?;
    let signature = base64::decode_config(segments[2], base64::URL_SAFE_NO_PAD)
        .map_err(JwtSvidError::SegmentDecode)?;

    let header: JoseHeader =
        serde_json::from_slice(&header_bytes).map_err(JwtSvidError::DeserializeJson)?;
    let claims: Map<String, Value> =
        serde_json::from_slice(&claims_bytes).map_err(JwtSvidError::DeserializeJson)?;

    match header.typ.as_deref() {
        None | Some("JWT" | "JOSE") => {}
        Some(other) => return Err(JwtSvidError::InvalidTyp(other.to_string())),
    }

    Ok(DecodedToken {
        header,
        claims,
        signing_input: format!("{}.{}", segments[0], segments[1]),
        signature,
    })
}

fn build_from_claims<A: AsRef<str>>(
    token: &str,
    decoded: &DecodedToken,
    expected_audiences: &[A],
    now: u64,
) -> Result<JwtSvid, JwtSvidError> {
    let claims = &decoded.claims;

    let subject = claims
        .get("sub")
        .and_then(Value::as_str)
        .ok_or(JwtSvidError::MissingSubject)?;
    let spiffe_id = SpiffeId::parse(subject).map_err(JwtSvidError::InvalidSubject)?;

    let expiry = claims
        .get("exp")
        .ok_or(JwtSvidError::MissingExpiry)?
        .as_u64()
        .ok_or(JwtSvidError::InvalidClaim("exp"))?;

    if expiry < now {
        return Err(JwtSvidError::Expired {
            expiry,
            current: now,
        });
    }

    let audience = audiences_from_claims(claims)?;

    // An empty expectation means the caller checks audiences itself.
    if !expected_audiences.is_empty()
        && !expected_audiences
            .iter()
            .any(|expected| audience.iter().any(|aud| aud == expected.as_ref()))
    {
        return Err(JwtSvidError::AudienceMismatch {
            expected: expected_audiences
                .iter()
                .map(|aud| aud.as_ref().to_string())
                .collect(),
            found: audience,
        });
    }

    let issued_at = claims.get("iat").and_then(Value::as_u64);

    Ok(JwtSvid {
        spiffe_id,
        audience,
        expiry,
        issued_at,
        claims: claims.clone(),
        token: token.to_string(),
    })
}

fn audiences_from_claims(claims: &Map<String, Value>) -> Result<Vec<String>, JwtSvidError> {
    match claims.get("aud") {
        None => Ok(Vec::new()),
        Some(Value::String(aud)) => Ok(vec![aud.clone()]),
        Some(Value::Array(entries)) => entries
            .iter()
            .map(|entry| {
                entry
                    .as_str()
                    .map(ToString::to_string)
                    .ok_or(JwtSvidError::InvalidClaim("aud"))
            })
            .collect(),
        Some(_) => Err(JwtSvidError::InvalidClaim("aud")),
    }
}

fn verify_signature(
    alg: &str,
    authority: &PKey<Public>,
    signing_input: &[u8],
    signature: &[u8],
) -> Result<(), JwtSvidError> {
    match alg {
        "RS256" | "RS384" | "RS512" => {
            let digest = match alg {
                "RS256" => MessageDigest::sha256(),
                "RS384" => MessageDigest::sha384(),
                _ => MessageDigest::sha512(),
            };

            let verified = Verifier::new(digest, authority)
                .and_then(|mut verifier| verifier.verify_oneshot(signature, signing_input))
                .map_err(JwtSvidError::SignatureVerify)?;

            if verified {
                Ok(())
            } else {
                Err(JwtSvidError::InvalidSignature)
            }
        }
        "ES256" | "ES384" | "ES512" => {
            let (digest, coordinate_len) = match alg {
                "ES256" => (MessageDigest::sha256(), 32),
                "ES384" => (MessageDigest::sha384(), 48),
                _ => (MessageDigest::sha512(), 66),
            };

            // JWS ECDSA signatures are the raw r ‖ s concatenation.
            if signature.len() != coordinate_len * 2 {
                return Err(JwtSvidError::InvalidSignature);
            }

            let verified = (|| -> Result<bool, openssl::error::ErrorStack> {
                let r = BigNum::from_slice(&signature[..coordinate_len])?;
                let s = BigNum::from_slice(&signature[coordinate_len..])?;
                let ecdsa = EcdsaSig::from_private_components(r, s)?;
                let digest = hash(digest, signing_input)?;
                let ec_key = authority.ec_key()?;
                ecdsa.verify(&digest, &ec_key)
            })()
            .map_err(JwtSvidError::SignatureVerify)?;

            if verified {
                Ok(())
            } else {
                Err(JwtSvidError::InvalidSignature)
            }
        }
        other => Err(JwtSvidError::UnsupportedAlgorithm(other.to_string())),
    }
}
