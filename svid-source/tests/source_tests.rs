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
use svid_source::{Error, JwtSource, JwtSourceConfig, X509Source, X509SourceConfig};
use workload_api::{Jwtsvid, JwtBundlesResponse, X509svid, X509svidResponse};
use workload_api_client::BackoffConfig;

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
    _dir: TempDir,
    _server: tokio::task::JoinHandle<()>,
}

fn start_api() -> TestApi {
    let dir = TempDir::new("svid-source-test").unwrap();
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

fn x509_config(test_api: &TestApi) -> X509SourceConfig {
    X509SourceConfig {
        endpoint: Some(format!("unix:{}", test_api.socket.display())),
        backoff: fast_backoff(),
        init_timeout: Some(Duration::from_secs(10)),
        svid_picker: None,
    }
}

#[tokio::test]
async fn source_serves_and_rotates_identity() {
    let test_api = start_api();
    let first = SvidMaterials::generate("spiffe://example.org/a");
    test_api
        .api
        .set_x509_response(x509_response(&first, "spiffe://example.org/a"))
        .await;

    let source = X509Source::new(x509_config(&test_api)).await.unwrap();

    let svid = source.x509_svid().await.unwrap();
    assert_eq!(svid.spiffe_id().to_string(), "spiffe://example.org/a");
    let first_generation = source.generation().await.unwrap();

    let mut updates = source.updates();
    let second = SvidMaterials::generate("spiffe://example.org/b");
    test_api
        .api
        .set_x509_response(x509_response(&second, "spiffe://example.org/b"))
        .await;
    timeout(RECV_TIMEOUT, updates.changed())
        .await
        .unwrap()
        .unwrap();

    let svid = source.x509_svid().await.unwrap();
    assert_eq!(svid.spiffe_id().to_string(), "spiffe://example.org/b");
    assert!(source.generation().await.unwrap() > first_generation);

    source.close().await;
    assert_matches!(source.x509_svid().await.unwrap_err(), Error::SourceClosed);
}

#[tokio::test]
async fn readers_see_consistent_snapshots() {
    let test_api = start_api();
    let materials = SvidMaterials::generate("spiffe://example.org/a");
    test_api
        .api
        .set_x509_response(x509_response(&materials, "spiffe://example.org/a"))
        .await;

    let source = X509Source::new(x509_config(&test_api)).await.unwrap();

    // The bundle set of the snapshot must contain the bundle of the
    // served SVID's trust domain.
    let svid = source.x509_svid().await.unwrap();
    let bundle = source
        .bundle_for_trust_domain(svid.spiffe_id().trust_domain())
        .await
        .unwrap();
    assert_eq!(bundle.len(), 1);

    let missing = TrustDomain::parse("missing.org").unwrap();
    let error = source.bundle_for_trust_domain(&missing).await.unwrap_err();
    assert_matches!(error, Error::Bundle(bundles::Error::BundleNotFound(_)));

    source.close().await;
}

#[tokio::test]
async fn init_times_out_without_updates() {
    let test_api = start_api();

    let config = X509SourceConfig {
        init_timeout: Some(Duration::from_millis(200)),
        ..x509_config(&test_api)
    };

    let error = X509Source::new(config).await.unwrap_err();
    assert_matches!(error, Error::InitTimeout(_));
}

#[tokio::test]
async fn svid_picker_selects_identity() {
    let test_api = start_api();
    let first = SvidMaterials::generate("spiffe://example.org/a");
    let second = SvidMaterials::generate("spiffe://example.org/b");

    let response = X509svidResponse {
        svids: vec![
            X509svid {
                spiffe_id: "spiffe://example.org/a".to_string(),
                x509_svid: first.chain_der.clone(),
                x509_svid_key: first.key_der.clone(),
                bundle: first.root_bundle_der(),
            },
            X509svid {
                spiffe_id: "spiffe://example.org/b".to_string(),
                x509_svid: second.chain_der.clone(),
                x509_svid_key: second.key_der.clone(),
                bundle: second.root_bundle_der(),
            },
        ],
        crl: Vec::new(),
        federated_bundles: Default::default(),
    };
    test_api.api.set_x509_response(response).await;

    let config = X509SourceConfig {
        svid_picker: Some(Box::new(|svids| svids.get(1).cloned())),
        ..x509_config(&test_api)
    };

    let source = X509Source::new(config).await.unwrap();
    let svid = source.x509_svid().await.unwrap();
    assert_eq!(svid.spiffe_id().to_string(), "spiffe://example.org/b");

    source.close().await;
}

#[tokio::test]
async fn applying_identical_updates_keeps_identity_stable() {
    let test_api = start_api();
    let materials = SvidMaterials::generate("spiffe://example.org/a");
    let response = x509_response(&materials, "spiffe://example.org/a");
    test_api.api.set_x509_response(response.clone()).await;

    let source = X509Source::new(x509_config(&test_api)).await.unwrap();
    let before = source.x509_svid().await.unwrap();

    let mut updates = source.updates();
    test_api.api.set_x509_response(response).await;
    timeout(RECV_TIMEOUT, updates.changed())
        .await
        .unwrap()
        .unwrap();

    let after = source.x509_svid().await.unwrap();
    assert_eq!(before, after);

    source.close().await;
}

#[tokio::test]
async fn jwt_source_serves_bundles_and_fetches_svids() {
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

    let claims = jwt_claims(
        "spiffe://example.org/myservice",
        &["audience1"],
        get_epoch_time() + 3600,
    );
    let token = jwt_es256(&key, "kid-1", &claims);
    test_api
        .api
        .set_jwt_svids(vec![Jwtsvid {
            spiffe_id: "spiffe://example.org/myservice".to_string(),
            svid: token,
        }])
        .await;

    let source = JwtSource::new(JwtSourceConfig {
        endpoint: Some(format!("unix:{}", test_api.socket.display())),
        backoff: fast_backoff(),
        init_timeout: Some(Duration::from_secs(10)),
    })
    .await
    .unwrap();

    let trust_domain = TrustDomain::parse("example.org").unwrap();
    let bundle = source.bundle_for_trust_domain(&trust_domain).await.unwrap();
    assert!(bundle.find_jwt_authority("kid-1").is_ok());

    let svid = source
        .fetch_jwt_svid(None, &["audience1"])
        .await
        .unwrap();
    assert_eq!(
        svid.spiffe_id().to_string(),
        "spiffe://example.org/myservice"
    );

    source.close().await;
    assert_matches!(source.bundle_set().await.unwrap_err(), Error::SourceClosed);
}
