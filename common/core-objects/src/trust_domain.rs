// Copyright (c) Microsoft. All rights reserved.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::Error;
use crate::spiffe_id::{SpiffeId, SPIFFE_SCHEME_PREFIX};

const MAX_TRUST_DOMAIN_LENGTH: usize = 255;

/// The name of an administrative boundary: a set of workloads sharing a
/// root of trust. Canonical form is lowercase, `[a-z0-9._-]`, at most 255
/// octets. Immutable once parsed.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TrustDomain {
    name: String,
}

impl TrustDomain {
    /// Parses a trust domain from either a bare name (`example.org`) or a
    /// full SPIFFE URI (`spiffe://example.org/workload`). Input is trimmed
    /// and lowercased before validation.
    pub fn parse(input: &str) -> Result<Self, Error> {
        let input = input.trim().to_lowercase();

        if input.is_empty() {
            return Err(Error::InvalidTrustDomain(
                "trust domain cannot be empty".to_string(),
            ));
        }

        if input.starts_with(SPIFFE_SCHEME_PREFIX) {
            return Ok(SpiffeId::parse(&input)?.trust_domain().clone());
        }

        Self::validate_name(&input)?;

        Ok(TrustDomain { name: input })
    }

    /// Validates an already-normalized bare name. Shared with the SPIFFE ID
    /// parser, which extracts the authority component itself.
    pub(crate) fn validate_name(name: &str) -> Result<(), Error> {
        if name.is_empty() {
            return Err(Error::InvalidTrustDomain(
                "trust domain cannot be empty".to_string(),
            ));
        }

        if name.len() > MAX_TRUST_DOMAIN_LENGTH {
            return Err(Error::InvalidTrustDomain(format!(
                "trust domain cannot be longer than {MAX_TRUST_DOMAIN_LENGTH} octets"
            )));
        }

        if let Some(bad) = name
            .chars()
            .find(|c| !matches!(c, 'a'..='z' | '0'..='9' | '.' | '_' | '-'))
        {
            return Err(Error::InvalidTrustDomain(format!(
                "trust domain contains invalid character {bad:?}"
            )));
        }

        Ok(())
    }

    pub(crate) fn from_validated(name: String) -> Self {
        TrustDomain { name }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for TrustDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

impl FromStr for TrustDomain {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TrustDomain::parse(s)
    }
}

impl Serialize for TrustDomain {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.name)
    }
}

impl<'de> Deserialize<'de> for TrustDomain {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        TrustDomain::parse(&raw).map_err(serde::de::Error::custom)
    }
}
