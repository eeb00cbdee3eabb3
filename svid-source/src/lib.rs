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

//! Rotating in-memory identity sources. A source owns a Workload API
//! watch, applies every update to a single atomically-swapped snapshot,
//! and keeps serving the last good snapshot across stream failures.

mod error;
mod jwt;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use log::{debug, error, warn};
use tokio::sync::{mpsc, watch, Mutex, RwLock};
use tokio::task::JoinHandle;

use bundles::{X509Bundle, X509BundleSet};
use core_objects::TrustDomain;
use svid::{X509Context, X509Svid};
use workload_api_client::{BackoffConfig, ClientConfig, WorkloadApiClient};

pub use error::Error;
pub use jwt::{JwtSource, JwtSourceConfig};

/// Environment variable supplying the default init timeout in seconds;
/// `0` means wait forever.
pub const INIT_TIMEOUT_ENV: &str = "SPIFFE_SOURCE_INIT_TIMEOUT_SECS";

/// Selects the SVID to serve from an update's SVID list; `None` keeps the
/// current snapshot.
pub type SvidPicker = Box<dyn Fn(&[X509Svid]) -> Option<X509Svid> + Send + Sync>;

#[derive(Default)]
pub struct X509SourceConfig {
    /// Endpoint address; `SPIFFE_ENDPOINT_SOCKET` is used when absent.
    pub endpoint: Option<String>,
    pub backoff: BackoffConfig,
    /// `None` reads the environment; a zero duration waits forever.
    pub init_timeout: Option<Duration>,
    pub svid_picker: Option<SvidPicker>,
}

struct Snapshot {
    svid: X509Svid,
    bundles: X509BundleSet,
    generation: u64,
}

struct Shared {
    state: RwLock<Option<Snapshot>>,
    closed: AtomicBool,
    picker: Option<SvidPicker>,
}

/// A rotating X.509 identity source. Readers always observe a consistent
/// `(svid, bundle set)` pair, and generations only move forward.
pub struct X509Source {
    shared: Arc<Shared>,
    client: Arc<WorkloadApiClient>,
    generation_rx: watch::Receiver<u64>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl X509Source {
    /// Connects a client, subscribes to the X.509 watch and blocks until
    /// the first update has been applied or the init timeout elapses. On
    /// failure the client is closed and an initialization error returned.
    pub async fn new(config: X509SourceConfig) -> Result<Self, Error> {
        let client = WorkloadApiClient::connect(ClientConfig {
            endpoint: config.endpoint.clone(),
            backoff: config.backoff.clone(),
        })
        .await
        .map_err(Error::SourceInitialization)?;

        Self::new_with_client(Arc::new(client), config).await
    }

    /// Adopts an existing client. The source takes responsibility for
    /// closing it.
    pub async fn new_with_client(
        client: Arc<WorkloadApiClient>,
        config: X509SourceConfig,
    ) -> Result<Self, Error> {
        let updates = match client.watch_x509_contexts().await {
            Ok(updates) => updates,
            Err(err) => {
                client.close().await;
                return Err(Error::SourceInitialization(err));
            }
        };

        let (generation_tx, generation_rx) = watch::channel(0_u64);
        let shared = Arc::new(Shared {
            state: RwLock::new(None),
            closed: AtomicBool::new(false),
            picker: config.svid_picker,
        });

        let task = tokio::spawn(drain_updates(shared.clone(), updates, generation_tx));

        let source = X509Source {
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

    /// The currently-selected SVID.
    pub async fn x509_svid(&self) -> Result<X509Svid, Error> {
        self.ensure_open()?;
        self.shared
            .state
            .read()
            .await
            .as_ref()
            .map(|snapshot| snapshot.svid.clone())
            .ok_or(Error::NotInitialized)
    }

    pub async fn bundle_for_trust_domain(
        &self,
        trust_domain: &TrustDomain,
    ) -> Result<X509Bundle, Error> {
        self.ensure_open()?;
        let state = self.shared.state.read().await;
        let snapshot = state.as_ref().ok_or(Error::NotInitialized)?;
        Ok(snapshot
            .bundles
            .get_bundle_for_trust_domain(trust_domain)?
            .clone())
    }

    /// The full bundle set of the current snapshot.
    pub async fn bundle_set(&self) -> Result<X509BundleSet, Error> {
        self.ensure_open()?;
        self.shared
            .state
            .read()
            .await
            .as_ref()
            .map(|snapshot| snapshot.bundles.clone())
            .ok_or(Error::NotInitialized)
    }

    /// The generation of the current snapshot; strictly increasing.
    pub async fn generation(&self) -> Result<u64, Error> {
        self.ensure_open()?;
        self.shared
            .state
            .read()
            .await
            .as_ref()
            .map(|snapshot| snapshot.generation)
            .ok_or(Error::NotInitialized)
    }

    /// A receiver carrying the latest applied generation; subscribers
    /// learn about rotations without polling. The current generation is
    /// marked seen, so the first wakeup is a real rotation. The channel
    /// ends when the watch terminates.
    #[must_use]
    pub fn updates(&self) -> watch::Receiver<u64> {
        let mut updates = self.generation_rx.clone();
        updates.borrow_and_update();
        updates
    }

    /// Closes the source and its client. Later reads fail with a
    /// source-closed error.
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
    shared: Arc<Shared>,
    mut updates: mpsc::Receiver<Result<X509Context, workload_api_client::Error>>,
    generation_tx: watch::Sender<u64>,
) {
    while let Some(event) = updates.recv().await {
        match event {
            Ok(context) => {
                let selected = match &shared.picker {
                    Some(picker) => picker(context.svids()),
                    None => context.svids().first().cloned(),
                };

                let svid = match selected {
                    Some(svid) => svid,
                    None => {
                        warn!("No SVID selected from update, keeping current identity");
                        continue;
                    }
                };

                let generation = {
                    let mut state = shared.state.write().await;
                    let generation = state.as_ref().map_or(1, |s| s.generation + 1);
                    *state = Some(Snapshot {
                        svid,
                        bundles: context.bundle_set().clone(),
                        generation,
                    });
                    generation
                };

                let _ = generation_tx.send(generation);
                debug!("Applied X.509 context update, generation {}", generation);
            }
            Err(err) => {
                error!("X.509 context watch terminated: {}", err);
                break;
            }
        }
    }
    // Dropping generation_tx ends the update channel for subscribers; the
    // last snapshot stays readable.
}

/// Blocks until the generation moves off zero, subject to the resolved
/// init timeout.
pub(crate) async fn wait_for_first_update(
    mut generation_rx: watch::Receiver<u64>,
    init_timeout: Option<Duration>,
) -> Result<(), Error> {
    let wait = async move {
        while *generation_rx.borrow() == 0 {
            generation_rx
                .changed()
                .await
                .map_err(|_| Error::InitStreamClosed)?;
        }
        Ok(())
    };

    match resolve_init_timeout(init_timeout) {
        Some(limit) => tokio::time::timeout(limit, wait)
            .await
            .map_err(|_| Error::InitTimeout(limit))?,
        None => wait.await,
    }
}

fn resolve_init_timeout(configured: Option<Duration>) -> Option<Duration> {
    let timeout = configured.unwrap_or_else(|| {
        std::env::var(INIT_TIMEOUT_ENV)
            .ok()
            .and_then(|value| value.parse::<u64>().ok())
            .map_or(Duration::ZERO, Duration::from_secs)
    });

    if timeout.is_zero() {
        None
    } else {
        Some(timeout)
    }
}
