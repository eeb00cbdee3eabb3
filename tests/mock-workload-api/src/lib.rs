// Copyright (c) Microsoft. All rights reserved.

#![deny(rust_2018_idioms)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(
    clippy::default_trait_access,
    clippy::let_unit_value,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::similar_names,
    clippy::too_many_lines
)]

//! In-process Workload API server for tests: state is programmable from
//! the test body, streams replay the current state to new subscribers and
//! then follow pushed updates.

use core::pin::Pin;
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use futures_util::Stream;
use tokio::net::UnixListener;
use tokio::sync::{broadcast, RwLock};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::UnixListenerStream;
use tonic::transport::Server;
use tonic::{Code, Request, Response, Status};

use workload_api::spiffe_workload_api_server::{SpiffeWorkloadApi, SpiffeWorkloadApiServer};
use workload_api::{
    JwtBundlesRequest, JwtBundlesResponse, Jwtsvid, JwtsvidRequest, JwtsvidResponse,
    ValidateJwtsvidRequest, ValidateJwtsvidResponse, X509svidRequest, X509svidResponse,
};

const SECURITY_HEADER: &str = "workload.spiffe.io";
const UPDATE_CHANNEL_CAPACITY: usize = 16;

type X509ResponseStream =
    Pin<Box<dyn Stream<Item = Result<X509svidResponse, Status>> + Send>>;
type JwtBundlesResponseStream =
    Pin<Box<dyn Stream<Item = Result<JwtBundlesResponse, Status>> + Send>>;

#[derive(Clone)]
enum StreamEvent<T> {
    Update(T),
    Close,
}

struct Inner {
    x509_state: RwLock<Option<X509svidResponse>>,
    x509_updates: broadcast::Sender<StreamEvent<X509svidResponse>>,
    jwt_state: RwLock<Option<JwtBundlesResponse>>,
    jwt_updates: broadcast::Sender<StreamEvent<JwtBundlesResponse>>,
    jwt_svids: RwLock<Vec<Jwtsvid>>,
    valid_audiences: RwLock<HashSet<String>>,
    validate_subject: RwLock<String>,
    failure: RwLock<Option<(Code, String)>>,
}

#[derive(Clone)]
pub struct MockWorkloadApi {
    inner: Arc<Inner>,
}

impl Default for MockWorkloadApi {
    fn default() -> Self {
        Self::new()
    }
}

impl MockWorkloadApi {
    #[must_use]
    pub fn new() -> Self {
        let (x509_updates, _) = broadcast::channel(UPDATE_CHANNEL_CAPACITY);
        let (jwt_updates, _) = broadcast::channel(UPDATE_CHANNEL_CAPACITY);

        MockWorkloadApi {
            inner: Arc::new(Inner {
                x509_state: RwLock::new(None),
                x509_updates,
                jwt_state: RwLock::new(None),
                jwt_updates,
                jwt_svids: RwLock::new(Vec::new()),
                valid_audiences: RwLock::new(HashSet::new()),
                validate_subject: RwLock::new(String::new()),
                failure: RwLock::new(None),
            }),
        }
    }

    /// Sets the current X.509 state and pushes it to open streams.
    pub async fn set_x509_response(&self, response: X509svidResponse) {
        *self.inner.x509_state.write().await = Some(response.clone());
        let _ = self
            .inner
            .x509_updates
            .send(StreamEvent::Update(response));
    }

    /// Sets the current JWT bundles state and pushes it to open streams.
    pub async fn set_jwt_bundles_response(&self, response: JwtBundlesResponse) {
        *self.inner.jwt_state.write().await = Some(response.clone());
        let _ = self.inner.jwt_updates.send(StreamEvent::Update(response));
    }

    pub async fn set_jwt_svids(&self, svids: Vec<Jwtsvid>) {
        *self.inner.jwt_svids.write().await = svids;
    }

    pub async fn add_valid_audience(&self, audience: &str) {
        self.inner
            .valid_audiences
            .write()
            .await
            .insert(audience.to_string());
    }

    pub async fn set_validate_subject(&self, spiffe_id: &str) {
        *self.inner.validate_subject.write().await = spiffe_id.to_string();
    }

    /// Makes every subsequent RPC fail with the given status until
    /// cleared with `clear_failure`.
    pub async fn set_failure(&self, code: Code, message: &str) {
        *self.inner.failure.write().await = Some((code, message.to_string()));
    }

    pub async fn clear_failure(&self) {
        *self.inner.failure.write().await = None;
    }

    /// Completes all open streams, as an agent restart would.
    pub fn close_streams(&self) {
        let _ = self.inner.x509_updates.send(StreamEvent::Close);
        let _ = self.inner.jwt_updates.send(StreamEvent::Close);
    }

    async fn check_call<T>(&self, request: &Request<T>) -> Result<(), Status> {
        if let Some((code, message)) = self.inner.failure.read().await.clone() {
            return Err(Status::new(code, message));
        }
        check_security_header(request)
    }
}

fn check_security_header<T>(request: &Request<T>) -> Result<(), Status> {
    let present = request
        .metadata()
        .get(SECURITY_HEADER)
        .and_then(|value| value.to_str().ok())
        .map_or(false, |value| value == "true");

    if present {
        Ok(())
    } else {
        Err(Status::invalid_argument(
            "security header missing from request",
        ))
    }
}

fn event_stream<T: Clone + Send + 'static>(
    current: Option<T>,
    mut updates: broadcast::Receiver<StreamEvent<T>>,
) -> Pin<Box<dyn Stream<Item = Result<T, Status>> + Send>> {
    Box::pin(async_stream::stream! {
        if let Some(current) = current {
            yield Ok(current);
        }
        loop {
            match updates.recv().await {
                Ok(StreamEvent::Update(update)) => yield Ok(update),
                Ok(StreamEvent::Close) | Err(broadcast::error::RecvError::Closed) => break,
                Err(broadcast::error::RecvError::Lagged(_)) => {}
            }
        }
    })
}

#[tonic::async_trait]
impl SpiffeWorkloadApi for MockWorkloadApi {
    type FetchX509SVIDStream = X509ResponseStream;

    async fn fetch_x509svid(
        &self,
        request: Request<X509svidRequest>,
    ) -> Result<Response<Self::FetchX509SVIDStream>, Status> {
        self.check_call(&request).await?;

        // Subscribe before snapshotting: an update racing this call is
        // then delivered twice rather than lost.
        let updates = self.inner.x509_updates.subscribe();
        let current = self.inner.x509_state.read().await.clone();
        Ok(Response::new(event_stream(current, updates)))
    }

    async fn fetch_jwtsvid(
        &self,
        request: Request<JwtsvidRequest>,
    ) -> Result<Response<JwtsvidResponse>, Status> {
        self.check_call(&request).await?;

        if request.get_ref().audience.is_empty() {
            return Err(Status::invalid_argument("audience is required"));
        }

        let svids = self.inner.jwt_svids.read().await;
        let wanted = &request.get_ref().spiffe_id;
        let svids: Vec<Jwtsvid> = svids
            .iter()
            .filter(|svid| wanted.is_empty() || &svid.spiffe_id == wanted)
            .cloned()
            .collect();

        Ok(Response::new(JwtsvidResponse { svids }))
    }

    type FetchJWTBundlesStream = JwtBundlesResponseStream;

    async fn fetch_jwt_bundles(
        &self,
        request: Request<JwtBundlesRequest>,
    ) -> Result<Response<Self::FetchJWTBundlesStream>, Status> {
        self.check_call(&request).await?;

        let updates = self.inner.jwt_updates.subscribe();
        let current = self.inner.jwt_state.read().await.clone();
        Ok(Response::new(event_stream(current, updates)))
    }

    async fn validate_jwtsvid(
        &self,
        request: Request<ValidateJwtsvidRequest>,
    ) -> Result<Response<ValidateJwtsvidResponse>, Status> {
        self.check_call(&request).await?;

        let audience = &request.get_ref().audience;
        if !self.inner.valid_audiences.read().await.contains(audience) {
            return Err(Status::invalid_argument("audience is not accepted"));
        }

        Ok(Response::new(ValidateJwtsvidResponse {
            spiffe_id: self.inner.validate_subject.read().await.clone(),
            claims: None,
        }))
    }
}

/// Serves the mock over a Unix-domain socket until the returned task is
/// aborted or the process ends.
pub fn serve_uds(api: MockWorkloadApi, socket_path: &Path) -> JoinHandle<()> {
    let listener = UnixListener::bind(socket_path).expect("binding the mock socket cannot fail");
    let incoming = UnixListenerStream::new(listener);

    tokio::spawn(async move {
        let _ = Server::builder()
            .add_service(SpiffeWorkloadApiServer::new(api))
            .serve_with_incoming(incoming)
            .await;
    })
}
