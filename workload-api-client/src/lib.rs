// Copyright (c) Microsoft. All rights reserved.

#![deny(rust_2018_idioms)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(
    clippy::default_trait_access,
    clippy::let_unit_value,
    clippy::missing_errors_doc,
    clippy::similar_names,
    clippy::too_many_lines
)]

//! Streaming client for the SPIFFE Workload API. One-shot fetches block
//! until the first server message; watches run on spawned tasks that
//! resubscribe with exponential backoff and deliver parsed updates over a
//! channel. Invalid-argument responses (missing security header, bad
//! request) are terminal and end the watch.

pub mod address;
pub mod backoff;
mod error;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::{info, warn};
use tokio::net::UnixStream;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tonic::metadata::MetadataValue;
use tonic::transport::{Channel, Endpoint, Uri};
use tonic::{Code, Request};
use tower::service_fn;

use bundles::{JwtBundle, JwtBundleSet, X509Bundle, X509BundleSet};
use core_objects::{SpiffeId, TrustDomain};
use svid::{JwtSvid, X509Context, X509Svid};
use workload_api::spiffe_workload_api_client::SpiffeWorkloadApiClient;
use workload_api::{
    JwtBundlesRequest, JwtBundlesResponse, JwtsvidRequest, ValidateJwtsvidRequest,
    X509svidRequest, X509svidResponse,
};

pub use crate::address::{parse_endpoint_address, EndpointAddress, ENDPOINT_SOCKET_ENV};
pub use crate::backoff::{BackoffConfig, RetryHandler};
pub use crate::error::Error;

/// Metadata header every Workload API request must carry.
pub const SECURITY_HEADER: &str = "workload.spiffe.io";

/// Buffered updates per watch before backpressure reaches the stream.
const WATCH_CHANNEL_CAPACITY: usize = 8;

#[derive(Clone, Default)]
pub struct ClientConfig {
    /// Endpoint address; `SPIFFE_ENDPOINT_SOCKET` is used when absent.
    pub endpoint: Option<String>,
    pub backoff: BackoffConfig,
}

pub struct WorkloadApiClient {
    channel: Channel,
    address: EndpointAddress,
    backoff: BackoffConfig,
    closed: Arc<AtomicBool>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl WorkloadApiClient {
    /// Resolves the endpoint address (explicit option first, then the
    /// environment, read once here) and connects the transport.
    pub async fn connect(config: ClientConfig) -> Result<Self, Error> {
        let address = match config.endpoint.as_deref() {
            Some(explicit) => parse_endpoint_address(explicit)?,
            None => {
                let from_env =
                    std::env::var(ENDPOINT_SOCKET_ENV).map_err(|_| Error::MissingEndpointAddress)?;
                parse_endpoint_address(&from_env)?
            }
        };

        let channel = open_channel(&address).await?;
        info!("Connected to the Workload API at {:?}", address);

        Ok(WorkloadApiClient {
            channel,
            address,
            backoff: config.backoff,
            closed: Arc::new(AtomicBool::new(false)),
            tasks: Mutex::new(Vec::new()),
        })
    }

    #[must_use]
    pub fn endpoint_address(&self) -> &EndpointAddress {
        &self.address
    }

    /// Fetches the first message of the X.509 stream and returns it as a
    /// parsed context.
    pub async fn fetch_x509_context(&self) -> Result<X509Context, Error> {
        self.ensure_open()?;

        let mut client = self.grpc();
        let response = client
            .fetch_x509svid(security_request(X509svidRequest {}))
            .await
            .map_err(Error::X509ContextFetch)?;

        let mut stream = response.into_inner();
        let message = stream
            .message()
            .await
            .map_err(Error::X509ContextFetch)?
            .ok_or(Error::EmptyX509Stream)?;

        parse_x509_context(&message)
    }

    /// Fetches the first message of the JWT bundles stream.
    pub async fn fetch_jwt_bundles(&self) -> Result<JwtBundleSet, Error> {
        self.ensure_open()?;

        let mut client = self.grpc();
        let response = client
            .fetch_jwt_bundles(security_request(JwtBundlesRequest {}))
            .await
            .map_err(Error::JwtBundleFetch)?;

        let mut stream = response.into_inner();
        let message = stream
            .message()
            .await
            .map_err(Error::JwtBundleFetch)?
            .ok_or(Error::EmptyJwtBundleStream)?;

        parse_jwt_bundle_set(&message)
    }

    /// Fetches a JWT SVID for the given audiences, optionally pinned to a
    /// subject. The returned token is decoded without re-verifying the
    /// signature; the Workload API is its issuer.
    pub async fn fetch_jwt_svid(
        &self,
        subject: Option<&SpiffeId>,
        audiences: &[&str],
    ) -> Result<JwtSvid, Error> {
        self.ensure_open()?;

        if audiences.is_empty() {
            return Err(Error::MissingAudience);
        }

        let request = JwtsvidRequest {
            audience: audiences.iter().map(ToString::to_string).collect(),
            spiffe_id: subject.map(ToString::to_string).unwrap_or_default(),
        };

        let mut client = self.grpc();
        let response = client
            .fetch_jwtsvid(security_request(request))
            .await
            .map_err(Error::JwtSvidFetch)?;

        let svids = response.into_inner().svids;
        let record = match subject {
            Some(subject) => {
                let wanted = subject.to_string();
                svids.into_iter().find(|record| record.spiffe_id == wanted)
            }
            None => svids.into_iter().next(),
        }
        .ok_or(Error::EmptySvidResponse)?;

        JwtSvid::parse_insecure(&record.svid, audiences).map_err(Error::JwtSvidParse)
    }

    /// Validates a token server-side for the given audience, then decodes
    /// it (signature already verified by the Workload API).
    pub async fn validate_jwt_svid(&self, token: &str, audience: &str) -> Result<JwtSvid, Error> {
        self.ensure_open()?;

        let request = ValidateJwtsvidRequest {
            audience: audience.to_string(),
            svid: token.to_string(),
        };

        let mut client = self.grpc();
        client
            .validate_jwtsvid(security_request(request))
            .await
            .map_err(Error::JwtSvidValidation)?;

        JwtSvid::parse_insecure(token, &[audience]).map_err(Error::JwtSvidParse)
    }

    /// Starts a watch on the X.509 stream. Updates arrive in server
    /// order; the watch resubscribes on transport errors and ends only on
    /// a terminal error (delivered as the final `Err` item) or when the
    /// receiver is dropped.
    pub async fn watch_x509_contexts(
        &self,
    ) -> Result<mpsc::Receiver<Result<X509Context, Error>>, Error> {
        self.ensure_open()?;

        let (tx, rx) = mpsc::channel(WATCH_CHANNEL_CAPACITY);
        let task = tokio::spawn(run_x509_watch(
            self.channel.clone(),
            self.backoff.clone(),
            self.closed.clone(),
            tx,
        ));
        self.tasks.lock().await.push(task);

        Ok(rx)
    }

    /// Starts a watch on the JWT bundles stream; same semantics as
    /// [`watch_x509_contexts`](Self::watch_x509_contexts).
    pub async fn watch_jwt_bundles(
        &self,
    ) -> Result<mpsc::Receiver<Result<JwtBundleSet, Error>>, Error> {
        self.ensure_open()?;

        let (tx, rx) = mpsc::channel(WATCH_CHANNEL_CAPACITY);
        let task = tokio::spawn(run_jwt_bundles_watch(
            self.channel.clone(),
            self.backoff.clone(),
            self.closed.clone(),
            tx,
        ));
        self.tasks.lock().await.push(task);

        Ok(rx)
    }

    /// Cancels all watches and awaits their termination. One-shot calls
    /// made afterwards fail with a closed-client error.
    pub async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);

        let mut tasks = self.tasks.lock().await;
        for task in tasks.drain(..) {
            task.abort();
            let _ = task.await;
        }
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn ensure_open(&self) -> Result<(), Error> {
        if self.is_closed() {
            return Err(Error::ClientClosed);
        }
        Ok(())
    }

    fn grpc(&self) -> SpiffeWorkloadApiClient<Channel> {
        SpiffeWorkloadApiClient::new(self.channel.clone())
    }
}

async fn open_channel(address: &EndpointAddress) -> Result<Channel, Error> {
    match address {
        EndpointAddress::Unix(path) => {
            let path = path.clone();
            // The endpoint URI is required by the transport but unused;
            // the connector dials the socket itself.
            Endpoint::from_static("http://[::]:50051")
                .connect_with_connector(service_fn(move |_: Uri| {
                    UnixStream::connect(path.clone())
                }))
                .await
                .map_err(Error::Connect)
        }
        EndpointAddress::Tcp(addr) => Endpoint::from_shared(format!("http://{addr}"))
            .map_err(Error::Connect)?
            .connect()
            .await
            .map_err(Error::Connect),
    }
}

/// Wraps a message in a request carrying the mandatory security header.
fn security_request<T>(message: T) -> Request<T> {
    let mut request = Request::new(message);
    request
        .metadata_mut()
        .insert(SECURITY_HEADER, MetadataValue::from_static("true"));
    request
}

fn is_terminal(status: &tonic::Status) -> bool {
    status.code() == Code::InvalidArgument
}

async fn run_x509_watch(
    channel: Channel,
    backoff: BackoffConfig,
    closed: Arc<AtomicBool>,
    tx: mpsc::Sender<Result<X509Context, Error>>,
) {
    let mut retry = RetryHandler::new(backoff);

    loop {
        if closed.load(Ordering::SeqCst) {
            return;
        }

        let mut client = SpiffeWorkloadApiClient::new(channel.clone());
        match client
            .fetch_x509svid(security_request(X509svidRequest {}))
            .await
        {
            Ok(response) => {
                let mut stream = response.into_inner();
                loop {
                    match stream.message().await {
                        Ok(Some(message)) => match parse_x509_context(&message) {
                            Ok(context) => {
                                retry.reset();
                                if tx.send(Ok(context)).await.is_err() {
                                    return;
                                }
                            }
                            Err(err) => {
                                warn!("Discarding malformed X.509 context update: {}", err);
                            }
                        },
                        Ok(None) => {
                            warn!("X.509 context stream completed, resubscribing");
                            break;
                        }
                        Err(status) if is_terminal(&status) => {
                            let _ = tx.send(Err(Error::X509ContextFetch(status))).await;
                            return;
                        }
                        Err(status) => {
                            warn!("X.509 context stream failed: {}, resubscribing", status);
                            break;
                        }
                    }
                }
            }
            Err(status) if is_terminal(&status) => {
                let _ = tx.send(Err(Error::X509ContextFetch(status))).await;
                return;
            }
            Err(status) => {
                warn!("Error opening X.509 context stream: {}", status);
            }
        }

        match retry.next_delay() {
            Some(delay) => sleep(delay).await,
            None => {
                let _ = tx
                    .send(Err(Error::RetriesExhausted(retry.retry_count())))
                    .await;
                return;
            }
        }
    }
}

async fn run_jwt_bundles_watch(
    channel: Channel,
    backoff: BackoffConfig,
    closed: Arc<AtomicBool>,
    tx: mpsc::Sender<Result<JwtBundleSet, Error>>,
) {
    let mut retry = RetryHandler::new(backoff);

    loop {
        if closed.load(Ordering::SeqCst) {
            return;
        }

        let mut client = SpiffeWorkloadApiClient::new(channel.clone());
        match client
            .fetch_jwt_bundles(security_request(JwtBundlesRequest {}))
            .await
        {
            Ok(response) => {
                let mut stream = response.into_inner();
                loop {
                    match stream.message().await {
                        Ok(Some(message)) => match parse_jwt_bundle_set(&message) {
                            Ok(bundle_set) => {
                                retry.reset();
                                if tx.send(Ok(bundle_set)).await.is_err() {
                                    return;
                                }
                            }
                            Err(err) => {
                                warn!("Discarding malformed JWT bundles update: {}", err);
                            }
                        },
                        Ok(None) => {
                            warn!("JWT bundles stream completed, resubscribing");
                            break;
                        }
                        Err(status) if is_terminal(&status) => {
                            let _ = tx.send(Err(Error::JwtBundleFetch(status))).await;
                            return;
                        }
                        Err(status) => {
                            warn!("JWT bundles stream failed: {}, resubscribing", status);
                            break;
                        }
                    }
                }
            }
            Err(status) if is_terminal(&status) => {
                let _ = tx.send(Err(Error::JwtBundleFetch(status))).await;
                return;
            }
            Err(status) => {
                warn!("Error opening JWT bundles stream: {}", status);
            }
        }

        match retry.next_delay() {
            Some(delay) => sleep(delay).await,
            None => {
                let _ = tx
                    .send(Err(Error::RetriesExhausted(retry.retry_count())))
                    .await;
                return;
            }
        }
    }
}

/// Parses one X.509 stream message. Every SVID record contributes its
/// trust domain's bundle; federated bundles are merged into the same set
/// keyed by their trust domain.
fn parse_x509_context(message: &X509svidResponse) -> Result<X509Context, Error> {
    if message.svids.is_empty() {
        return Err(Error::EmptySvidResponse);
    }

    let mut svids = Vec::with_capacity(message.svids.len());
    let mut bundle_set = X509BundleSet::new();

    for record in &message.svids {
        let parsed =
            X509Svid::parse(&record.x509_svid, &record.x509_svid_key).map_err(Error::X509SvidParse)?;
        let trust_domain = parsed.spiffe_id().trust_domain().clone();
        let bundle = X509Bundle::parse(trust_domain, &record.bundle).map_err(Error::BundleParse)?;
        bundle_set.put(bundle);
        svids.push(parsed);
    }

    for (trust_domain, bytes) in &message.federated_bundles {
        let trust_domain = TrustDomain::parse(trust_domain).map_err(Error::UpdateTrustDomain)?;
        let bundle = X509Bundle::parse(trust_domain, bytes).map_err(Error::BundleParse)?;
        bundle_set.put(bundle);
    }

    Ok(X509Context::new(svids, bundle_set))
}

fn parse_jwt_bundle_set(message: &JwtBundlesResponse) -> Result<JwtBundleSet, Error> {
    let mut bundle_set = JwtBundleSet::new();

    for (trust_domain, bytes) in &message.bundles {
        let trust_domain = TrustDomain::parse(trust_domain).map_err(Error::UpdateTrustDomain)?;
        let bundle = JwtBundle::parse(trust_domain, bytes).map_err(Error::BundleParse)?;
        bundle_set.put(bundle);
    }

    Ok(bundle_set)
}
