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

mod context;
mod error;
mod jwt;
mod x509;

#[cfg(any(test, feature = "tests"))]
pub mod test_util;

pub use context::X509Context;
pub use error::{JwtSvidError, X509SvidError};
pub use jwt::JwtSvid;
pub use x509::{spiffe_id_from_cert, X509Svid};
