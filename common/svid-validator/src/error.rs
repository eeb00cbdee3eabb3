// Copyright (c) Microsoft. All rights reserved.

use core_objects::SpiffeId;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("certificate chain cannot be empty")]
    EmptyChain,
    #[error("trust bundle contains no authorities")]
    EmptyTrustSet,
    #[error("accepted SPIFFE ID set cannot be empty")]
    EmptyAcceptedSet,
    #[error(transparent)]
    Bundle(#[from] bundles::Error),
    #[error("Error extracting SPIFFE ID from certificate: {0}")]
    SpiffeId(#[source] svid::X509SvidError),
    #[error("SPIFFE ID {0} in X.509 certificate is not accepted")]
    SpiffeIdNotAccepted(SpiffeId),
    #[error("Error verifying certificate chain: {0}")]
    ChainDoesNotVerify(String),
    #[error("Error building certificate verification path: {0}")]
    PathBuild(#[source] openssl::error::ErrorStack),
}
