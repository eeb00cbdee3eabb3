// Copyright (c) Microsoft. All rights reserved.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::Error;
use crate::trust_domain::TrustDomain;

pub(crate) const SPIFFE_SCHEME_PREFIX: &str = "spiffe://";

const MAX_SPIFFE_ID_LENGTH: usize = 2048;

/// A SPIFFE ID names a workload: `spiffe://<trust-domain><path>` where the
/// path is empty or a sequence of `/`-prefixed segments. Value equality,
/// immutable once parsed.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct SpiffeId {
    trust_domain: TrustDomain,
    path: String,
}

impl SpiffeId {
    /// Parses a SPIFFE ID from its URI form.
    pub fn parse(input: &str) -> Result<Self, Error> {
        let input = input.trim();

        if input.is_empty() {
            return Err(Error::InvalidSpiffeId(
                "SPIFFE ID cannot be empty".to_string(),
            ));
        }

        if input.len() > MAX_SPIFFE_ID_LENGTH {
            return Err(Error::InvalidSpiffeId(format!(
                "SPIFFE ID cannot be longer than {MAX_SPIFFE_ID_LENGTH} bytes"
            )));
        }

        let rest = strip_scheme(input)?;

        let (authority, path) = match rest.find('/') {
            Some(at) => (&rest[..at], &rest[at..]),
            None => (rest, ""),
        };

        if authority.is_empty() {
            return Err(Error::InvalidSpiffeId(
                "trust domain component cannot be empty".to_string(),
            ));
        }

        if authority.contains('@') {
            return Err(Error::InvalidSpiffeId(
                "SPIFFE ID cannot contain userinfo".to_string(),
            ));
        }

        if authority.contains(':') {
            return Err(Error::InvalidSpiffeId(
                "SPIFFE ID cannot contain a port".to_string(),
            ));
        }

        let authority = authority.to_lowercase();
        TrustDomain::validate_name(&authority)
            .map_err(|err| Error::InvalidSpiffeId(err.to_string()))?;

        validate_path(path)?;

        Ok(SpiffeId {
            trust_domain: TrustDomain::from_validated(authority),
            path: path.to_string(),
        })
    }

    /// Builds a SPIFFE ID from a trust domain and path segments. Blank
    /// segments are dropped, the rest are trimmed and joined with `/`.
    pub fn of(trust_domain: TrustDomain, segments: &[&str]) -> Result<Self, Error> {
        let mut path = String::new();
        for segment in segments {
            let segment = segment.trim();
            if segment.is_empty() {
                continue;
            }
            path.push('/');
            path.push_str(segment);
        }

        validate_path(&path)?;

        let id = SpiffeId { trust_domain, path };
        if id.to_string().len() > MAX_SPIFFE_ID_LENGTH {
            return Err(Error::InvalidSpiffeId(format!(
                "SPIFFE ID cannot be longer than {MAX_SPIFFE_ID_LENGTH} bytes"
            )));
        }

        Ok(id)
    }

    #[must_use]
    pub fn trust_domain(&self) -> &TrustDomain {
        &self.trust_domain
    }

    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    #[must_use]
    pub fn member_of(&self, trust_domain: &TrustDomain) -> bool {
        &self.trust_domain == trust_domain
    }
}

fn strip_scheme(input: &str) -> Result<&str, Error> {
    let scheme = input
        .get(..SPIFFE_SCHEME_PREFIX.len())
        .filter(|scheme| scheme.eq_ignore_ascii_case(SPIFFE_SCHEME_PREFIX))
        .ok_or_else(|| Error::InvalidSpiffeId("scheme must be 'spiffe'".to_string()))?;

    Ok(&input[scheme.len()..])
}

fn validate_path(path: &str) -> Result<(), Error> {
    if path.is_empty() {
        return Ok(());
    }

    for segment in path[1..].split('/') {
        if segment.is_empty() {
            return Err(Error::InvalidSpiffeId(
                "path cannot contain empty segments".to_string(),
            ));
        }
        if segment == "." || segment == ".." {
            return Err(Error::InvalidSpiffeId(
                "path cannot contain relative segments".to_string(),
            ));
        }
        if let Some(bad) = segment
            .chars()
            .find(|c| !matches!(c, 'a'..='z' | 'A'..='Z' | '0'..='9' | '.' | '_' | '-'))
        {
            return Err(Error::InvalidSpiffeId(format!(
                "path contains invalid character {bad:?}"
            )));
        }
    }

    Ok(())
}

impl fmt::Display for SpiffeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{SPIFFE_SCHEME_PREFIX}{}{}", self.trust_domain, self.path)
    }
}

impl FromStr for SpiffeId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SpiffeId::parse(s)
    }
}

impl Serialize for SpiffeId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for SpiffeId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        SpiffeId::parse(&raw).map_err(serde::de::Error::custom)
    }
}
