// Copyright (c) Microsoft. All rights reserved.

#![deny(rust_2018_idioms)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::similar_names, clippy::too_many_lines)]

use std::path::PathBuf;
use std::time::Duration;

use assert_matches::assert_matches;
use tempdir::TempDir;
use tokio::time::timeout;
use uuid::Uuid;

use bundles::test_util::{ec_key, jwks_document};
use core_objects::{get_epoch_time, TrustDomain};
use mock_workload_api::{serve_uds, MockWorkloadApi};
use svid::test_util::{jwt_claims, jwt_es256, SvidMaterials};
use workload_api::{Jwtsvid, JwtBundlesResponse, X509svid, X509svidResponse};
use workload_api_client::{BackoffConfig, ClientConfig, Error, WorkloadApiClient};

const RECV_TIMEOUT: Duration = Duration::from_secs(10);

fn fast_backoff() -> BackoffConfig {
    BackoffConfig {
        initial_delay: Duration::from_millis(10),
        max_delay: Duration::from_millis(100),
        backoff_multiplier: 2.0,
        max_retries: None,
    }
}

fn x509_response(materials: &SvidMaterials, spiffe_id: &str) -> X509svidResponse {
    X509svidResponse {
        svids: vec![X509svid {
            spiffe_id: spiffe_id.to_string(),
            x509_svid: materials.chain_der.clone(),
            x509_svid_key: materials.key_der.clone(),
            bundle: materials.root_bundle_der(),
        }],
        crl: Vec::new(),
        federated_bundles: Default::default(),
    }
}

struct TestApi {
    api: MockWorkloadApi,
    socket: PathBuf,
    // Held so the socket directory outlives the test.
    _dir: TempDir,
    _server: tokio::task::JoinHandle<()>,
}

fn start_api() -> TestApi {
    let dir = TempDir::new("workload-api-test").unwrap();
    let socket = dir.path().join(format!("{}.sock", Uuid::new_v4()));
    let api = MockWorkloadApi::new();
    let server = serve_uds(api.clone(), &socket);

    TestApi {
        api,
        socket,
        _dir: dir,
        _server: server,
    }
}

async fn connect(test_api: &TestApi) -> WorkloadApiClient {
    WorkloadApiClient::connect(ClientConfig {
        endpoint: Some(format!("unix:{}", test_api.socket.display())),
        backoff: fast_backoff(),
    })
    .await
    .unwrap()
}

#[tokio::test]
async fn fetch_x509_context_happy_path() {
    let test_api = start_api();
    let materials = SvidMaterials::generate("spiffe://example.org/myservice");
    test_api
        .api
        .set_x509_response(x509_response(&materials, "spiffe://example.org/myservice"))
        .await;

    let client = connect(&test_api).await;
    let context = client.fetch_x509_context().await.unwrap();

    assert_eq!(
        context.default_svid().unwrap().spiffe_id().to_string(),
        "spiffe://example.org/myservice"
    );
    let trust_domain = TrustDomain::parse("example.org").unwrap();
    assert_eq!(
        context
            .bundle_set()
            .get_bundle_for_trust_domain(&trust_domain)
            .unwrap()
            .len(),
        1
    );

    client.close().await;
}

#[tokio::test]
async fn fetch_and_validate_jwt_svid() {
    let test_api = start_api();
    let key = ec_key();
    let claims = jwt_claims(
        "spiffe://example.org/myservice",
        &["audience1", "audience2"],
        get_epoch_time() + 3600,
    );
    let token = jwt_es256(&key, "kid-1", &claims);

    test_api
        .api
        .set_jwt_svids(vec![Jwtsvid {
            spiffe_id: "spiffe://example.org/myservice".to_string(),
            svid: token.clone(),
        }])
        .await;
    test_api.api.add_valid_audience("audience1").await;
    test_api
        .api
        .set_validate_subject("spiffe://example.org/myservice")
        .await;

    let client = connect(&test_api).await;

    let svid = client
        .fetch_jwt_svid(None, &["audience1", "audience2"])
        .await
        .unwrap();
    assert_eq!(
        svid.spiffe_id().to_string(),
        "spiffe://example.org/myservice"
    );
    assert!(svid.audience().contains(&"audience1".to_string()));
    assert!(svid.audience().contains(&"audience2".to_string()));

    let validated = client.validate_jwt_svid(&token, "audience1").await.unwrap();
    assert_eq!(
        validated.spiffe_id().to_string(),
        "spiffe://example.org/myservice"
    );

    let error = client.validate_jwt_svid(&token, "other").await.unwrap_err();
    assert_matches!(error, Error::JwtSvidValidation(_));
    assert_eq!(error.to_string(), "Error validating JWT SVID");

    client.close().await;
}

#[tokio::test]
async fn fetch_jwt_svid_requires_audience() {
    let test_api = start_api();
    let client = connect(&test_api).await;

    let error = client.fetch_jwt_svid(None, &[]).await.unwrap_err();
    assert_matches!(error, Error::MissingAudience);

    client.close().await;
}

#[tokio::test]
async fn fetch_jwt_bundles_happy_path() {
    let test_api = start_api();
    let key = ec_key();
    let mut response = JwtBundlesResponse {
        bundles: Default::default(),
    };
    response.bundles.insert(
        "example.org".to_string(),
        jwks_document(&[("kid-1", &key)]).into_bytes(),
    );
    test_api.api.set_jwt_bundles_response(response).await;

    let client = connect(&test_api).await;
    let bundle_set = client.fetch_jwt_bundles().await.unwrap();

    let trust_domain = TrustDomain::parse("example.org").unwrap();
    let bundle = bundle_set
        .get_bundle_for_trust_domain(&trust_domain)
        .unwrap();
    assert!(bundle.find_jwt_authority("kid-1").is_ok());

    client.close().await;
}

#[tokio::test]
async fn watch_delivers_updates_in_order() {
    let test_api = start_api();
    let first = SvidMaterials::generate("spiffe://example.org/a");
    test_api
        .api
        .set_x509_response(x509_response(&first, "spiffe://example.org/a"))
        .await;

    let client = connect(&test_api).await;
    let mut updates = client.watch_x509_contexts().await.unwrap();

    let context = timeout(RECV_TIMEOUT, updates.recv())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(
        context.default_svid().unwrap().spiffe_id().to_string(),
        "spiffe://example.org/a"
    );

    let second = SvidMaterials::generate("spiffe://example.org/b");
    test_api
        .api
        .set_x509_response(x509_response(&second, "spiffe://example.org/b"))
        .await;

    let context = timeout(RECV_TIMEOUT, updates.recv())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(
        context.default_svid().unwrap().spiffe_id().to_string(),
        "spiffe://example.org/b"
    );

    client.close().await;
}

#[tokio::test]
async fn watch_resubscribes_after_stream_completion() {
    let test_api = start_api();
    let first = SvidMaterials::generate("spiffe://example.org/a");
    test_api
        .api
        .set_x509_response(x509_response(&first, "spiffe://example.org/a"))
        .await;

    let client = connect(&test_api).await;
    let mut updates = client.watch_x509_contexts().await.unwrap();

    let context = timeout(RECV_TIMEOUT, updates.recv())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(
        context.default_svid().unwrap().spiffe_id().to_string(),
        "spiffe://example.org/a"
    );

    // The server completes the stream; the watch must resubscribe and
    // pick up the state published afterwards.
    test_api.api.close_streams();
    let second = SvidMaterials::generate("spiffe://example.org/b");
    test_api
        .api
        .set_x509_response(x509_response(&second, "spiffe://example.org/b"))
        .await;

    // The resubscribed stream may replay the old state first.
    let deadline = tokio::time::Instant::now() + RECV_TIMEOUT;
    loop {
        let remaining = deadline - tokio::time::Instant::now();
        let context = timeout(remaining, updates.recv())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        if context.default_svid().unwrap().spiffe_id().to_string() == "spiffe://example.org/b" {
            break;
        }
    }

    client.close().await;
}

#[tokio::test]
async fn watch_treats_invalid_argument_as_terminal() {
    let test_api = start_api();
    test_api
        .api
        .set_failure(tonic::Code::InvalidArgument, "security header missing")
        .await;

    let client = connect(&test_api).await;
    let mut updates = client.watch_x509_contexts().await.unwrap();

    let event = timeout(RECV_TIMEOUT, updates.recv()).await.unwrap().unwrap();
    let error = event.unwrap_err();
    assert_matches!(error, Error::X509ContextFetch(status)
        if status.code() == tonic::Code::InvalidArgument);

    // Terminal: the watch ends instead of retrying.
    let next = timeout(RECV_TIMEOUT, updates.recv()).await.unwrap();
    assert!(next.is_none());

    client.close().await;
}

#[tokio::test]
async fn requests_without_security_header_are_rejected() {
    let test_api = start_api();
    let materials = SvidMaterials::generate("spiffe://example.org/a");
    test_api
        .api
        .set_x509_response(x509_response(&materials, "spiffe://example.org/a"))
        .await;

    // Bypass WorkloadApiClient and call the raw stub with no metadata.
    let socket = test_api.socket.clone();
    let channel = tonic::transport::Endpoint::from_static("http://[::]:50051")
        .connect_with_connector(tower::service_fn(move |_: tonic::transport::Uri| {
            tokio::net::UnixStream::connect(socket.clone())
        }))
        .await
        .unwrap();
    let mut raw = workload_api::spiffe_workload_api_client::SpiffeWorkloadApiClient::new(channel);

    let status = raw
        .fetch_x509svid(tonic::Request::new(workload_api::X509svidRequest {}))
        .await
        .unwrap_err();
    assert_eq!(status.code(), tonic::Code::InvalidArgument);
}

#[tokio::test]
async fn closed_client_rejects_calls() {
    let test_api = start_api();
    let client = connect(&test_api).await;
    client.close().await;

    assert_matches!(
        client.fetch_x509_context().await.unwrap_err(),
        Error::ClientClosed
    );
    assert_matches!(
        client.fetch_jwt_bundles().await.unwrap_err(),
        Error::ClientClosed
    );
    assert_matches!(
        client.watch_x509_contexts().await.unwrap_err(),
        Error::ClientClosed
    );
}

#[tokio::test]
async fn retries_exhausted_surfaces_terminally() {
    let test_api = start_api();
    test_api
        .api
        .set_failure(tonic::Code::Unavailable, "agent restarting")
        .await;

    let client = WorkloadApiClient::connect(ClientConfig {
        endpoint: Some(format!("unix:{}", test_api.socket.display())),
        backoff: BackoffConfig {
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
            backoff_multiplier: 2.0,
            max_retries: Some(2),
        },
    })
    .await
    .unwrap();

    let mut updates = client.watch_x509_contexts().await.unwrap();
    let event = timeout(RECV_TIMEOUT, updates.recv()).await.unwrap().unwrap();
    assert_matches!(event.unwrap_err(), Error::RetriesExhausted(2));

    client.close().await;
}
