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

//! Peer authentication checks: PKIX path validation of a presented chain
//! against the trust domain's bundle, and the accepted-SPIFFE-ID filter.
//! Validation is synchronous and never retries.

mod error;

use std::collections::HashSet;

use openssl::stack::Stack;
use openssl::x509::store::X509StoreBuilder;
use openssl::x509::{X509Ref, X509StoreContext, X509};

use bundles::X509BundleSet;
use core_objects::SpiffeId;
use svid::spiffe_id_from_cert;

pub use error::Error;

/// Verifies `chain` (leaf first, optional intermediates after) against
/// the authorities of the leaf's trust domain in `bundle_set`. Revocation
/// checking is disabled; a missing bundle propagates as not-found.
pub fn verify_chain(chain: &[X509], bundle_set: &X509BundleSet) -> Result<(), Error> {
    let leaf = chain.first().ok_or(Error::EmptyChain)?;

    let spiffe_id = spiffe_id_from_cert(leaf).map_err(Error::SpiffeId)?;
    let bundle = bundle_set.get_bundle_for_trust_domain(spiffe_id.trust_domain())?;

    if bundle.is_empty() {
        return Err(Error::EmptyTrustSet);
    }

    let mut store = X509StoreBuilder::new().map_err(Error::PathBuild)?;
    for authority in bundle.authorities() {
        store
            .add_cert(authority.clone())
            .map_err(Error::PathBuild)?;
    }
    let store = store.build();

    let mut intermediates = Stack::new().map_err(Error::PathBuild)?;
    for cert in &chain[1..] {
        intermediates.push(cert.clone()).map_err(Error::PathBuild)?;
    }

    let mut context = X509StoreContext::new().map_err(Error::PathBuild)?;
    let (verified, reason) = context
        .init(&store, leaf, &intermediates, |ctx| {
            let verified = ctx.verify_cert()?;
            Ok((verified, ctx.error()))
        })
        .map_err(Error::PathBuild)?;

    if verified {
        Ok(())
    } else {
        Err(Error::ChainDoesNotVerify(
            reason.error_string().to_string(),
        ))
    }
}

/// Extracts the certificate's SPIFFE ID and requires membership in
/// `accepted`. An empty accepted set rejects everything.
pub fn verify_spiffe_id(cert: &X509Ref, accepted: &HashSet<SpiffeId>) -> Result<(), Error> {
    if accepted.is_empty() {
        return Err(Error::EmptyAcceptedSet);
    }

    let spiffe_id = spiffe_id_from_cert(cert).map_err(Error::SpiffeId)?;
    if accepted.contains(&spiffe_id) {
        Ok(())
    } else {
        Err(Error::SpiffeIdNotAccepted(spiffe_id))
    }
}
