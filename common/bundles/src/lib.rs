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

pub mod cert;
mod error;
mod jwt;
mod x509;

#[cfg(any(test, feature = "tests"))]
pub mod test_util;

pub use error::Error;
pub use jwt::{Jwk, JwkSet, JwtBundle, JwtBundleSet};
pub use x509::{X509Bundle, X509BundleSet};
