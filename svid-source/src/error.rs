// Copyright (c) Microsoft. All rights reserved.

use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Error initializing source: {0}")]
    SourceInitialization(#[source] workload_api_client::Error),
    #[error("source initialization timed out after {0:?}")]
    InitTimeout(Duration),
    #[error("the Workload API watch ended before the first update")]
    InitStreamClosed,
    #[error("source is closed")]
    SourceClosed,
    #[error("source has not received an update yet")]
    NotInitialized,
    #[error(transparent)]
    Bundle(#[from] bundles::Error),
    #[error("Error fetching JWT SVID: {0}")]
    FetchJwtSvid(#[source] workload_api_client::Error),
}
