// Copyright (c) Microsoft. All rights reserved.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;

use core_objects::TrustDomain;
use openssl::bn::BigNum;
use openssl::ec::{EcGroup, EcKey};
use openssl::nid::Nid;
use openssl::pkey::{PKey, Public};
use openssl::rsa::Rsa;
use serde::{Deserialize, Serialize};

use crate::error::Error;

/// JWKS document as delivered by the Workload API, one per trust domain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JwkSet {
    pub keys: Vec<Jwk>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spiffe_refresh_hint: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spiffe_sequence: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Jwk {
    pub kty: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kid: Option<String>,
    #[serde(default, rename = "use", skip_serializing_if = "Option::is_none")]
    pub key_use: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crv: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub n: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub e: Option<String>,
}

/// The JWT signing authorities of one trust domain, keyed by key ID.
#[derive(Clone)]
pub struct JwtBundle {
    trust_domain: TrustDomain,
    authorities: BTreeMap<String, PKey<Public>>,
}

impl JwtBundle {
    #[must_use]
    pub fn new(trust_domain: TrustDomain) -> Self {
        JwtBundle {
            trust_domain,
            authorities: BTreeMap::new(),
        }
    }

    /// Decodes a JWKS document. Every key needs a non-empty key ID and a
    /// key type of `EC` or `RSA`; anything else fails the whole document.
    pub fn parse(trust_domain: TrustDomain, bytes: &[u8]) -> Result<Self, Error> {
        let set: JwkSet = serde_json::from_slice(bytes).map_err(Error::JwtBundleParse)?;

        let mut bundle = JwtBundle::new(trust_domain);
        for jwk in &set.keys {
            let kid = jwk
                .kid
                .as_deref()
                .filter(|kid| !kid.is_empty())
                .ok_or(Error::EmptyKeyId)?;
            let authority = authority_from_jwk(kid, jwk)?;
            bundle.add_jwt_authority(kid, authority)?;
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

    pub fn add_jwt_authority(&mut self, kid: &str, key: PKey<Public>) -> Result<(), Error> {
        if kid.is_empty() {
            return Err(Error::EmptyKeyId);
        }
        self.authorities.insert(kid.to_string(), key);
        Ok(())
    }

    pub fn remove_jwt_authority(&mut self, kid: &str) {
        self.authorities.remove(kid);
    }

    pub fn find_jwt_authority(&self, kid: &str) -> Result<&PKey<Public>, Error> {
        self.authorities
            .get(kid)
            .ok_or_else(|| Error::AuthorityNotFound(kid.to_string()))
    }

    pub fn jwt_authorities(&self) -> impl Iterator<Item = (&str, &PKey<Public>)> {
        self.authorities.iter().map(|(kid, key)| (kid.as_str(), key))
    }

    #[must_use]
    pub fn trust_domain(&self) -> &TrustDomain {
        &self.trust_domain
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.authorities.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.authorities.is_empty()
    }
}

fn authority_from_jwk(kid: &str, jwk: &Jwk) -> Result<PKey<Public>, Error> {
    match jwk.kty.as_str() {
        "EC" => {
            let crv = require_param(kid, jwk.crv.as_deref(), "crv")?;
            let nid = match crv {
                "P-256" => Nid::X9_62_PRIME256V1,
                "P-384" => Nid::SECP384R1,
                "P-521" => Nid::SECP521R1,
                other => return Err(Error::UnsupportedCurve(other.to_string())),
            };

            let x = decode_param(kid, require_param(kid, jwk.x.as_deref(), "x")?)?;
            let y = decode_param(kid, require_param(kid, jwk.y.as_deref(), "y")?)?;

            build_ec_authority(kid, nid, &x, &y)
        }
        "RSA" => {
            let n = decode_param(kid, require_param(kid, jwk.n.as_deref(), "n")?)?;
            let e = decode_param(kid, require_param(kid, jwk.e.as_deref(), "e")?)?;

            build_rsa_authority(kid, &n, &e)
        }
        other => Err(Error::UnsupportedKeyType(other.to_string())),
    }
}

fn require_param<'a>(kid: &str, value: Option<&'a str>, param: &'static str) -> Result<&'a str, Error> {
    value.ok_or_else(|| Error::MissingKeyParameter {
        kid: kid.to_string(),
        param,
    })
}

fn decode_param(kid: &str, value: &str) -> Result<Vec<u8>, Error> {
    base64::decode_config(value, base64::URL_SAFE_NO_PAD).map_err(|source| {
        Error::KeyParameterDecode {
            kid: kid.to_string(),
            source,
        }
    })
}

fn build_ec_authority(kid: &str, nid: Nid, x: &[u8], y: &[u8]) -> Result<PKey<Public>, Error> {
    let build = || -> Result<PKey<Public>, openssl::error::ErrorStack> {
        let group = EcGroup::from_curve_name(nid)?;
        let x = BigNum::from_slice(x)?;
        let y = BigNum::from_slice(y)?;
        let key = EcKey::from_public_key_affine_coordinates(&group, &x, &y)?;
        PKey::from_ec_key(key)
    };

    build().map_err(|source| Error::AuthorityKeyBuild {
        kid: kid.to_string(),
        source,
    })
}

fn build_rsa_authority(kid: &str, n: &[u8], e: &[u8]) -> Result<PKey<Public>, Error> {
    let build = || -> Result<PKey<Public>, openssl::error::ErrorStack> {
        let n = BigNum::from_slice(n)?;
        let e = BigNum::from_slice(e)?;
        let key = Rsa::from_public_components(n, e)?;
        PKey::from_rsa(key)
    };

    build().map_err(|source| Error::AuthorityKeyBuild {
        kid: kid.to_string(),
        source,
    })
}

/// Trust-domain-keyed collection of [`JwtBundle`]s.
#[derive(Clone, Default)]
pub struct JwtBundleSet {
    bundles: HashMap<TrustDomain, JwtBundle>,
}

impl JwtBundleSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn of(bundles: Vec<JwtBundle>) -> Self {
        let mut set = Self::new();
        for bundle in bundles {
            set.put(bundle);
        }
        set
    }

    pub fn put(&mut self, bundle: JwtBundle) {
        self.bundles.insert(bundle.trust_domain().clone(), bundle);
    }

    pub fn get_bundle_for_trust_domain(
        &self,
        trust_domain: &TrustDomain,
    ) -> Result<&JwtBundle, Error> {
        self.bundles
            .get(trust_domain)
            .ok_or_else(|| Error::BundleNotFound(trust_domain.clone()))
    }

    #[must_use]
    pub fn has_bundle_for_trust_domain(&self, trust_domain: &TrustDomain) -> bool {
        self.bundles.contains_key(trust_domain)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&TrustDomain, &JwtBundle)> {
        self.bundles.iter()
    }

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
