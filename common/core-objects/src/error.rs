// Copyright (c) Microsoft. All rights reserved.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("Invalid trust domain: {0}")]
    InvalidTrustDomain(String),
    #[error("Invalid SPIFFE ID: {0}")]
    InvalidSpiffeId(String),
}
