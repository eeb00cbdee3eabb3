// Copyright (c) Microsoft. All rights reserved.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use log::{debug, error};
use tokio::sync::{mpsc, watch, Mutex, RwLock};
use tokio::task::JoinHandle;

use bundles::{JwtBundle, JwtBundleSet};
use core_objects::{SpiffeId, TrustDomain};
use svid::JwtSvid;
use workload_api_client::{BackoffConfig, ClientConfig, WorkloadApiClient};

use crate::error::Error;
use crate::wait_for_first_update;

#[derive(Default)]
pub struct JwtSourceConfig {
    /// Endpoint address; `SPIFFE_ENDPOINT_SOCKET` is used when absent.
    pub endpoint: Option<String>,
    pub backoff: BackoffConfig,
    /// `None` reads the environment; a zero duration waits forever.
    pub init_timeout: Option<Duration>,
}

struct JwtShared {
    state: RwLock<Option<(JwtBundleSet, u64)>>,
    closed: AtomicBool,
}

/// A rotating JWT source: serves the latest JWT bundle set and fetches
/// JWT SVIDs through its client.
pub struct JwtSource {
    shared: Arc<JwtShared>,
    client: Arc<WorkloadApiClient>,
    generation_rx: watch::Receiver<u64>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl JwtSource {
    pub async fn new(config: JwtSourceConfig) -> Result<Self, Error> {
        let client = WorkloadApiClient::connect(ClientConfig {
            endpoint: config.endpoint.clone(),
            backoff: config.backoff.clone(),
        })
        .await
        .map_err(Error::SourceInitialization)?;

        Self::new_with_client(Arc::new(client), config).await
    }

    pub async fn new_with_client(
        client: Arc<WorkloadApiClient>,
        config: JwtSourceConfig,
    ) -> Result<Self, Error> {
        let updates = match client.watch_jwt_bundles().await {
            Ok(updates) => updates,
            Err(err) => {
                client.close().await;
                return Err(Error::SourceInitialization(err));
            }
        };

        let (generation_tx, generation_rx) = watch::channel(0_u64);
        let shared = Arc::new(JwtShared {
            state: RwLock::new(None),
            closed: AtomicBool::new(false),
        });

        let task = tokio::spawn(drain_updates(shared.clone(), updates, generation_tx));

        let source = JwtSource {
            shared,
            client,
            generation_rx: generation_rx.clone(),
            task: Mutex::new(Some(task)),
        };

        if let Err(err) = wait_for_first_update(generation_rx, config.init_timeout).await {
            source.close().await;
            return Err(err);
        }

        Ok(source)
    }

    /// Fetches a JWT SVID through the owning client.
    pub async fn fetch_jwt_svid(
        &self,
        subject: Option<&SpiffeId>,
        audiences: &[&str],
    ) -> Result<JwtSvid, Error> {
        self.ensure_open()?;
        self.client
            .fetch_jwt_svid(subject, audiences)
            .await
            .map_err(Error::FetchJwtSvid)
    }

    pub async fn bundle_for_trust_domain(
        &self,
        trust_domain: &TrustDomain,
    ) -> Result<JwtBundle, Error> {
        self.ensure_open()?;
        let state = self.shared.state.read().await;
        let (bundles, _) = state.as_ref().ok_or(Error::NotInitialized)?;
        Ok(bundles.get_bundle_for_trust_domain(trust_domain)?.clone())
    }

    pub async fn bundle_set(&self) -> Result<JwtBundleSet, Error> {
        self.ensure_open()?;
        self.shared
            .state
            .read()
            .await
            .as_ref()
            .map(|(bundles, _)| bundles.clone())
            .ok_or(Error::NotInitialized)
    }

    #[must_use]
    pub fn updates(&self) -> watch::Receiver<u64> {
        let mut updates = self.generation_rx.clone();
        updates.borrow_and_update();
        updates
    }

    pub async fn close(&self) {
        self.shared.closed.store(true, Ordering::SeqCst);
        if let Some(task) = self.task.lock().await.take() {
            task.abort();
            let _ = task.await;
        }
        self.client.close().await;
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::SeqCst)
    }

    fn ensure_open(&self) -> Result<(), Error> {
        if self.is_closed() {
            return Err(Error::SourceClosed);
        }
        Ok(())
    }
}

async fn drain_updates(
    shared: Arc<JwtShared>,
    mut updates: mpsc::Receiver<Result<JwtBundleSet, workload_api_client::Error>>,
    generation_tx: watch::Sender<u64>,
) {
    while let Some(event) = updates.recv().await {
        match event {
            Ok(bundles) => {
                let generation = {
                    let mut state = shared.state.write().await;
                    let generation = state.as_ref().map_or(1, |(_, generation)| generation + 1);
                    *state = Some((bundles, generation));
                    generation
                };

                let _ = generation_tx.send(generation);
                debug!("Applied JWT bundles update, generation {}", generation);
            }
            Err(err) => {
                error!("JWT bundles watch terminated: {}", err);
                break;
            }
        }
    }
}
