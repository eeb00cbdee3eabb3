// Copyright (c) Microsoft. All rights reserved.

use thiserror::Error;

use crate::address::AddressError;

#[derive(Error, Debug)]
pub enum Error {
    #[error("socket endpoint address not configured: set SPIFFE_ENDPOINT_SOCKET or pass an address")]
    MissingEndpointAddress,
    #[error("socket endpoint address error: {0}")]
    SocketEndpointAddress(#[from] AddressError),
    #[error("Error connecting to the Workload API: {0}")]
    Connect(#[source] tonic::transport::Error),
    #[error("at least one audience is required")]
    MissingAudience,
    #[error("Error fetching X.509 context: {0}")]
    X509ContextFetch(#[source] tonic::Status),
    #[error("the X.509 context stream closed without an update")]
    EmptyX509Stream,
    #[error("the Workload API returned no SVID")]
    EmptySvidResponse,
    #[error("Error parsing X.509 SVID from update: {0}")]
    X509SvidParse(#[source] svid::X509SvidError),
    #[error("Error parsing bundle from update: {0}")]
    BundleParse(#[source] bundles::Error),
    #[error("invalid trust domain in update: {0}")]
    UpdateTrustDomain(#[source] core_objects::Error),
    #[error("Error fetching JWT bundles: {0}")]
    JwtBundleFetch(#[source] tonic::Status),
    #[error("the JWT bundles stream closed without an update")]
    EmptyJwtBundleStream,
    #[error("Error fetching JWT SVID: {0}")]
    JwtSvidFetch(#[source] tonic::Status),
    #[error("Error parsing JWT SVID: {0}")]
    JwtSvidParse(#[source] svid::JwtSvidError),
    #[error("Error validating JWT SVID")]
    JwtSvidValidation(#[source] tonic::Status),
    #[error("retries exhausted after {0} attempts")]
    RetriesExhausted(u32),
    #[error("client is closed")]
    ClientClosed,
}
