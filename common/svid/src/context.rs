// Copyright (c) Microsoft. All rights reserved.

use bundles::X509BundleSet;

use crate::x509::X509Svid;

/// One X.509 update as delivered by the Workload API: the workload's
/// SVIDs plus the trust bundles in effect, immutable once built.
#[derive(Clone)]
pub struct X509Context {
    svids: Vec<X509Svid>,
    bundle_set: X509BundleSet,
}

impl X509Context {
    #[must_use]
    pub fn new(svids: Vec<X509Svid>, bundle_set: X509BundleSet) -> Self {
        X509Context { svids, bundle_set }
    }

    /// The default SVID is the first one in the update.
    #[must_use]
    pub fn default_svid(&self) -> Option<&X509Svid> {
        self.svids.first()
    }

    #[must_use]
    pub fn svids(&self) -> &[X509Svid] {
        &self.svids
    }

    #[must_use]
    pub fn bundle_set(&self) -> &X509BundleSet {
        &self.bundle_set
    }
}
